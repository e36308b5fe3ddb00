//! Renders an event stream as XML text.
//!
//! [`XmlWriter`] is an [`XmlHandler`], so it can sit at the end of a
//! [`PullSerializer`](super::PullSerializer), behind a builder's pass-through,
//! or directly on an [`EventSource`](crate::event::EventSource) via
//! [`pump`](crate::event::pump).

use std::fmt::Write as _;

use crate::error::StreamError;
use crate::event::{XmlEvent, XmlHandler};

#[derive(Debug)]
enum Open {
    Element(String),
    Comment,
    ProcessingInstruction,
    CData,
}

/// Writes events as XML text into a `String`.
///
/// Start tags are left open until the next event so that an element without
/// content is written as `<e/>`.
///
/// # Examples
///
/// ```
/// use xmlaxon::event::{pump, ReplaySource, XmlEvent};
/// use xmlaxon::serial::XmlWriter;
///
/// let mut source = ReplaySource::new(vec![
///     XmlEvent::start_document(),
///     XmlEvent::start_element("", "a", ""),
///     XmlEvent::attribute("k", "x<y"),
///     XmlEvent::AttributesCompleted,
///     XmlEvent::EndElement,
///     XmlEvent::Completed,
/// ]);
/// let mut writer = XmlWriter::new();
/// pump(&mut source, &mut writer).unwrap();
/// assert_eq!(writer.as_str(), r#"<a k="x&lt;y"/>"#);
/// ```
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
    open: Vec<Open>,
    tag_open: bool,
    pi_has_data: bool,
    declaration: bool,
}

impl XmlWriter {
    /// Creates a writer that omits the XML declaration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an XML declaration when the start of the document carries a
    /// version.
    #[must_use]
    pub fn with_declaration(mut self, yes: bool) -> Self {
        self.declaration = yes;
        self
    }

    /// The text written so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Consumes the writer and returns the text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.out
    }

    fn close_start_tag(&mut self) {
        if self.tag_open {
            self.out.push('>');
            self.tag_open = false;
        }
    }

    fn in_markup(&self) -> bool {
        matches!(
            self.open.last(),
            Some(Open::Comment | Open::ProcessingInstruction | Open::CData)
        )
    }

    fn pop(&mut self, expected: &str) -> Result<Open, StreamError> {
        self.open
            .pop()
            .ok_or_else(|| StreamError::Handler(format!("{expected} with nothing open")))
    }

    fn write_declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        let _ = write!(self.out, "<?xml version=\"{version}\"");
        if let Some(encoding) = encoding {
            let _ = write!(self.out, " encoding=\"{encoding}\"");
        }
        if let Some(standalone) = standalone {
            let _ = write!(self.out, " standalone=\"{}\"", if standalone { "yes" } else { "no" });
        }
        self.out.push_str("?>\n");
    }

    fn write_doctype(&mut self, root_name: &str, public_id: Option<&str>, system_id: Option<&str>, subset: Option<&str>) {
        self.out.push_str("<!DOCTYPE ");
        self.out.push_str(root_name);
        match (public_id, system_id) {
            (Some(public_id), Some(system_id)) => {
                let _ = write!(self.out, " PUBLIC \"{public_id}\" \"{system_id}\"");
            }
            (None, Some(system_id)) => {
                let _ = write!(self.out, " SYSTEM \"{system_id}\"");
            }
            _ => {}
        }
        if let Some(subset) = subset {
            let _ = write!(self.out, " [{subset}]");
        }
        self.out.push('>');
    }
}

fn qualified(prefix: &str, local_name: &str) -> String {
    if prefix.is_empty() {
        local_name.to_string()
    } else {
        format!("{prefix}:{local_name}")
    }
}

impl XmlHandler for XmlWriter {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        match event {
            XmlEvent::StartDocument {
                xml_version,
                xml_encoding,
                standalone,
                ..
            } => {
                if let (true, Some(version)) = (self.declaration, xml_version.as_deref()) {
                    self.write_declaration(version, xml_encoding.as_deref(), standalone);
                }
            }
            XmlEvent::DocumentTypeDeclaration {
                root_name,
                public_id,
                system_id,
                internal_subset,
            } => self.write_doctype(
                &root_name,
                public_id.as_deref(),
                system_id.as_deref(),
                internal_subset.as_deref(),
            ),
            XmlEvent::StartElement {
                local_name, prefix, ..
            } => {
                self.close_start_tag();
                let name = qualified(&prefix, &local_name);
                self.out.push('<');
                self.out.push_str(&name);
                self.open.push(Open::Element(name));
                self.tag_open = true;
            }
            XmlEvent::Attribute {
                local_name,
                prefix,
                value,
                ..
            } => {
                if !self.tag_open {
                    return Err(StreamError::Handler("attribute outside a start tag".to_string()));
                }
                let _ = write!(self.out, " {}=\"", qualified(&prefix, &local_name));
                write_escaped_attr(&mut self.out, &value);
                self.out.push('"');
            }
            XmlEvent::NamespaceDeclaration { prefix, namespace_uri } => {
                if !self.tag_open {
                    return Err(StreamError::Handler(
                        "namespace declaration outside a start tag".to_string(),
                    ));
                }
                if prefix.is_empty() {
                    self.out.push_str(" xmlns=\"");
                } else {
                    let _ = write!(self.out, " xmlns:{prefix}=\"");
                }
                write_escaped_attr(&mut self.out, &namespace_uri);
                self.out.push('"');
            }
            XmlEvent::AttributesCompleted => {}
            XmlEvent::CharacterData { data, .. } => {
                self.close_start_tag();
                let text = data.to_text();
                if matches!(self.open.last(), Some(Open::ProcessingInstruction)) && !text.is_empty() {
                    if !self.pi_has_data {
                        self.out.push(' ');
                        self.pi_has_data = true;
                    }
                    self.out.push_str(&text);
                } else if self.in_markup() {
                    self.out.push_str(&text);
                } else {
                    write_escaped_text(&mut self.out, &text);
                }
            }
            XmlEvent::StartProcessingInstruction { target } => {
                self.close_start_tag();
                let _ = write!(self.out, "<?{target}");
                self.open.push(Open::ProcessingInstruction);
                self.pi_has_data = false;
            }
            XmlEvent::EndProcessingInstruction => {
                self.pop("end of processing instruction")?;
                self.out.push_str("?>");
            }
            XmlEvent::StartComment => {
                self.close_start_tag();
                self.out.push_str("<!--");
                self.open.push(Open::Comment);
            }
            XmlEvent::EndComment => {
                self.pop("end of comment")?;
                self.out.push_str("-->");
            }
            XmlEvent::StartCData => {
                self.close_start_tag();
                self.out.push_str("<![CDATA[");
                self.open.push(Open::CData);
            }
            XmlEvent::EndCData => {
                self.pop("end of CDATA section")?;
                self.out.push_str("]]>");
            }
            XmlEvent::EntityReference { name, .. } => {
                self.close_start_tag();
                let _ = write!(self.out, "&{name};");
            }
            XmlEvent::EndElement => match self.pop("end tag")? {
                Open::Element(name) => {
                    if self.tag_open {
                        self.out.push_str("/>");
                        self.tag_open = false;
                    } else {
                        let _ = write!(self.out, "</{name}>");
                    }
                }
                other => {
                    return Err(StreamError::Handler(format!("end tag inside {other:?}")));
                }
            },
            XmlEvent::Completed => {
                if !self.open.is_empty() {
                    return Err(StreamError::Handler(format!(
                        "end of document with {} open constructs",
                        self.open.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Writes a hexadecimal character reference (`&#xHH;`).
fn write_hex_char_ref(out: &mut String, ch: char) {
    let _ = write!(out, "&#x{:X};", ch as u32);
}

/// Escapes element text: `<`, `>` and `&` by name, `\r` as `&#13;`, other
/// control characters except tab and newline as hex references.
fn write_escaped_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            '\t' | '\n' => out.push(ch),
            c if (c as u32) < 0x20 => write_hex_char_ref(out, c),
            _ => out.push(ch),
        }
    }
}

/// Escapes an attribute value. Whitespace other than the space character is
/// written as a reference so it survives attribute value normalization.
fn write_escaped_attr(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if (c as u32) < 0x20 => write_hex_char_ref(out, c),
            _ => out.push(ch),
        }
    }
}
