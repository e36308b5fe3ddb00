//! A pull tokenizer producing [`XmlEvent`]s from XML text.
//!
//! The tokenizer reads one markup construct per refill and queues the events
//! it produces, so pulling an event never reads further ahead than the
//! construct that event belongs to. A start tag yields its `StartElement`,
//! namespace declarations, attributes and `AttributesCompleted` together.

use std::collections::{HashSet, VecDeque};

use log::trace;

use super::input::{
    is_name_start_char, parse_cdata_content, parse_comment_content, parse_pi_content,
    parse_xml_decl, NamespaceResolver, ParserInput, Reference, XML_NAMESPACE,
};
use super::ParseOptions;
use crate::encoding::decode_input;
use crate::error::{ParseError, StreamError};
use crate::event::{EventSource, TextContent, XmlEvent};
use crate::util::qname::split_qname;

const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Prolog,
    Content,
    Epilog,
    Finished,
    Closed,
}

/// An [`EventSource`] over XML text.
///
/// # Examples
///
/// ```
/// use xmlaxon::event::{EventSource, XmlEvent};
/// use xmlaxon::parser::{ParseOptions, XmlTokenizer};
///
/// let mut tokenizer = XmlTokenizer::new("<a/>", &ParseOptions::default());
/// assert!(matches!(tokenizer.next_event().unwrap(), XmlEvent::StartDocument { .. }));
/// assert_eq!(tokenizer.next_event().unwrap(), XmlEvent::start_element("", "a", ""));
/// ```
pub struct XmlTokenizer {
    input: ParserInput,
    options: ParseOptions,
    queue: VecDeque<XmlEvent>,
    phase: Phase,
    open: Vec<String>,
    namespaces: NamespaceResolver,
    seen_doctype: bool,
    input_encoding: Option<String>,
    failed: Option<ParseError>,
}

impl std::fmt::Debug for XmlTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlTokenizer")
            .field("phase", &self.phase)
            .field("location", &self.input.location())
            .field("open", &self.open)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl XmlTokenizer {
    /// Creates a tokenizer over already decoded text.
    pub fn new(text: impl Into<String>, options: &ParseOptions) -> Self {
        let mut text = text.into();
        if text.starts_with('\u{FEFF}') {
            text.replace_range(..'\u{FEFF}'.len_utf8(), "");
        }
        let mut input = ParserInput::new(text);
        input.set_max_depth(options.max_depth);
        input.set_max_name_length(options.max_name_length);
        input.set_max_entity_expansions(options.max_entity_expansions);
        Self {
            input,
            options: options.clone(),
            queue: VecDeque::new(),
            phase: Phase::Start,
            open: Vec::new(),
            namespaces: NamespaceResolver::new(),
            seen_doctype: false,
            input_encoding: None,
            failed: None,
        }
    }

    /// Creates a tokenizer over raw bytes, detecting their encoding.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Encoding` if the bytes cannot be decoded.
    pub fn from_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Self, StreamError> {
        let decoded = decode_input(bytes)?;
        let mut tokenizer = Self::new(decoded.text, options);
        tokenizer.input_encoding = Some(decoded.encoding.to_string());
        Ok(tokenizer)
    }

    /// Returns the location of the next unread character.
    #[must_use]
    pub fn location(&self) -> crate::error::SourceLocation {
        self.input.location()
    }

    /// Reads the next construct and queues its events.
    fn fill(&mut self) -> Result<(), ParseError> {
        match self.phase {
            Phase::Start => self.read_start(),
            Phase::Prolog | Phase::Epilog => self.read_misc(),
            Phase::Content => self.read_content(),
            Phase::Finished | Phase::Closed => Ok(()),
        }
    }

    fn read_start(&mut self) -> Result<(), ParseError> {
        let decl = if self.input.looking_at(b"<?xml")
            && matches!(self.input.peek_at(5), Some(b' ' | b'\t' | b'\r' | b'\n'))
        {
            Some(parse_xml_decl(&mut self.input)?)
        } else {
            None
        };
        let (xml_version, xml_encoding, standalone) = match decl {
            Some(d) => (Some(d.version), d.encoding, d.standalone),
            None => (None, None, None),
        };
        self.queue.push_back(XmlEvent::StartDocument {
            input_encoding: self.input_encoding.clone(),
            xml_version,
            xml_encoding,
            standalone,
        });
        self.phase = Phase::Prolog;
        Ok(())
    }

    fn read_misc(&mut self) -> Result<(), ParseError> {
        self.input.skip_whitespace();
        if self.input.at_end() {
            if self.phase == Phase::Prolog {
                return Err(self.input.fatal("document has no root element"));
            }
            self.queue.push_back(XmlEvent::Completed);
            self.phase = Phase::Finished;
            return Ok(());
        }
        if self.input.looking_at(b"<!--") {
            self.read_comment()
        } else if self.input.looking_at(b"<?") {
            self.read_pi()
        } else if self.input.looking_at(b"<!DOCTYPE") {
            if self.phase == Phase::Epilog || self.seen_doctype {
                return Err(self.input.fatal("DOCTYPE declaration not allowed here"));
            }
            self.read_doctype()
        } else if self.input.peek() == Some(b'<') && self.phase == Phase::Prolog {
            self.read_start_tag()
        } else if self.input.peek() == Some(b'<') {
            Err(self.input.fatal("extra content after the root element"))
        } else {
            Err(self.input.fatal("text is not allowed outside the root element"))
        }
    }

    fn read_content(&mut self) -> Result<(), ParseError> {
        if self.input.at_end() {
            let name = self.open.last().cloned().unwrap_or_default();
            return Err(self
                .input
                .fatal(format!("unexpected end of input: element <{name}> is not closed")));
        }
        if self.input.looking_at(b"</") {
            self.read_end_tag()
        } else if self.input.looking_at(b"<!--") {
            self.read_comment()
        } else if self.input.looking_at(b"<![CDATA[") {
            self.read_cdata()
        } else if self.input.looking_at(b"<?") {
            self.read_pi()
        } else if self.input.looking_at(b"<!") {
            Err(self.input.fatal("markup declaration not allowed in content"))
        } else if self.input.peek() == Some(b'<') {
            self.read_start_tag()
        } else {
            self.read_text()
        }
    }

    // -- Elements --

    fn read_start_tag(&mut self) -> Result<(), ParseError> {
        self.input.expect_byte(b'<')?;
        if !self.input.peek_char().is_some_and(is_name_start_char) {
            return Err(self.input.fatal("expected element name after '<'"));
        }
        let qname = self.input.parse_name()?;
        self.input.increment_depth()?;

        let mut raw: Vec<(String, String)> = Vec::new();
        let empty = loop {
            let had_ws = self.input.skip_whitespace();
            match self.input.peek() {
                Some(b'>') => {
                    self.input.advance(1);
                    break false;
                }
                Some(b'/') => {
                    self.input.expect_str(b"/>")?;
                    break true;
                }
                None => return Err(self.input.fatal("unexpected end of input in start tag")),
                Some(_) => {
                    if !had_ws {
                        return Err(self.input.fatal("whitespace required between attributes"));
                    }
                    let name = self.input.parse_name()?;
                    self.input.skip_whitespace();
                    self.input.expect_byte(b'=')?;
                    self.input.skip_whitespace();
                    let value = self.input.parse_attribute_value()?;
                    if raw.iter().any(|(n, _)| *n == name) {
                        return Err(self.input.fatal(format!("duplicate attribute '{name}'")));
                    }
                    if raw.len() >= self.options.max_attributes as usize {
                        return Err(self.input.fatal(format!(
                            "too many attributes on <{qname}> (maximum {})",
                            self.options.max_attributes
                        )));
                    }
                    raw.push((name, value));
                }
            }
        };

        self.namespaces.push_scope();
        let mut declarations = Vec::new();
        let mut attributes = Vec::new();
        for (name, value) in raw {
            if name == "xmlns" {
                self.namespaces.bind(None, value.clone());
                declarations.push(XmlEvent::NamespaceDeclaration {
                    prefix: String::new(),
                    namespace_uri: value,
                });
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(self
                        .input
                        .fatal(format!("namespace prefix '{prefix}' bound to an empty URI")));
                }
                if prefix == "xmlns" || (prefix == "xml" && value != XML_NAMESPACE) {
                    return Err(self.input.fatal(format!("reserved prefix '{prefix}' cannot be rebound")));
                }
                self.namespaces.bind(Some(prefix.to_string()), value.clone());
                declarations.push(XmlEvent::NamespaceDeclaration {
                    prefix: prefix.to_string(),
                    namespace_uri: value,
                });
            } else {
                attributes.push((name, value));
            }
        }

        let (prefix, local) = split_qname(&qname);
        let namespace_uri = self.resolve_prefix(prefix, true)?;
        self.queue.push_back(XmlEvent::StartElement {
            namespace_uri,
            local_name: local.to_string(),
            prefix: prefix.unwrap_or_default().to_string(),
        });
        self.queue.extend(declarations);

        let mut expanded = HashSet::new();
        for (name, value) in attributes {
            let (prefix, local) = split_qname(&name);
            let namespace_uri = self.resolve_prefix(prefix, false)?;
            if !expanded.insert((namespace_uri.clone(), local.to_string())) {
                return Err(self
                    .input
                    .fatal(format!("attribute '{name}' duplicates another after namespace expansion")));
            }
            self.queue.push_back(XmlEvent::Attribute {
                namespace_uri,
                local_name: local.to_string(),
                prefix: prefix.unwrap_or_default().to_string(),
                value,
                attr_type: "CDATA".to_string(),
                specified: true,
            });
        }
        self.queue.push_back(XmlEvent::AttributesCompleted);

        if empty {
            self.close_element();
        } else {
            self.open.push(qname);
            self.phase = Phase::Content;
        }
        Ok(())
    }

    /// Resolves a prefix in the current scope. Unprefixed attributes are in
    /// no namespace.
    fn resolve_prefix(&self, prefix: Option<&str>, is_element: bool) -> Result<String, ParseError> {
        match prefix {
            Some("xmlns") => Ok(XMLNS_NAMESPACE.to_string()),
            Some(p) => self
                .namespaces
                .resolve(Some(p))
                .map(str::to_string)
                .ok_or_else(|| self.input.fatal(format!("namespace prefix '{p}' is not bound"))),
            None if is_element => Ok(self.namespaces.resolve(None).unwrap_or_default().to_string()),
            None => Ok(String::new()),
        }
    }

    fn read_end_tag(&mut self) -> Result<(), ParseError> {
        self.input.expect_str(b"</")?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace();
        self.input.expect_byte(b'>')?;
        match self.open.pop() {
            Some(expected) if expected == name => {}
            Some(expected) => {
                return Err(self.input.fatal(format!(
                    "mismatched end tag: expected </{expected}>, found </{name}>"
                )));
            }
            None => return Err(self.input.fatal(format!("unexpected end tag </{name}>"))),
        }
        self.close_element();
        Ok(())
    }

    fn close_element(&mut self) {
        self.queue.push_back(XmlEvent::EndElement);
        self.namespaces.pop_scope();
        self.input.decrement_depth();
        if self.open.is_empty() {
            self.phase = Phase::Epilog;
        }
    }

    // -- Character data --

    fn read_text(&mut self) -> Result<(), ParseError> {
        let mut text = String::new();
        while let Some(b) = self.input.peek() {
            match b {
                b'<' => break,
                b'&' => match self.input.parse_reference()? {
                    Reference::Text(s) => text.push_str(&s),
                    Reference::Entity { name, replacement } => {
                        if self.options.expand_entities {
                            if replacement.contains('<') {
                                return Err(self.input.fatal(format!(
                                    "entity '{name}' contains markup, which is not supported"
                                )));
                            }
                            text.push_str(&replacement);
                        } else {
                            self.push_text(text);
                            self.queue.push_back(XmlEvent::EntityReference {
                                name,
                                replacement_text: Some(replacement),
                            });
                            return Ok(());
                        }
                    }
                },
                b']' if self.input.looking_at(b"]]>") => {
                    return Err(self.input.fatal("']]>' not allowed in content"));
                }
                _ => text.push(self.input.next_char()?),
            }
        }
        self.push_text(text);
        Ok(())
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let data = TextContent::Text(text);
        let ignorable = self.options.ignorable_whitespace && data.is_whitespace();
        self.queue.push_back(XmlEvent::CharacterData { data, ignorable });
    }

    // -- Other markup --

    fn read_comment(&mut self) -> Result<(), ParseError> {
        let content = parse_comment_content(&mut self.input)?;
        self.queue.push_back(XmlEvent::StartComment);
        if !content.is_empty() {
            self.queue.push_back(XmlEvent::text(&content));
        }
        self.queue.push_back(XmlEvent::EndComment);
        Ok(())
    }

    fn read_pi(&mut self) -> Result<(), ParseError> {
        if self.input.looking_at(b"<?xml")
            && matches!(self.input.peek_at(5), Some(b' ' | b'\t' | b'\r' | b'\n' | b'?'))
        {
            return Err(self.input.fatal("XML declaration allowed only at the start of the document"));
        }
        let (target, data) = parse_pi_content(&mut self.input)?;
        self.queue.push_back(XmlEvent::StartProcessingInstruction { target });
        if let Some(data) = data {
            self.queue.push_back(XmlEvent::text(&data));
        }
        self.queue.push_back(XmlEvent::EndProcessingInstruction);
        Ok(())
    }

    fn read_cdata(&mut self) -> Result<(), ParseError> {
        let content = parse_cdata_content(&mut self.input)?;
        if self.options.coalesce_cdata {
            if !content.is_empty() {
                self.queue.push_back(XmlEvent::text(&content));
            }
            return Ok(());
        }
        self.queue.push_back(XmlEvent::StartCData);
        if !content.is_empty() {
            self.queue.push_back(XmlEvent::text(&content));
        }
        self.queue.push_back(XmlEvent::EndCData);
        Ok(())
    }

    fn read_doctype(&mut self) -> Result<(), ParseError> {
        self.input.expect_str(b"<!DOCTYPE")?;
        self.input.skip_whitespace_required()?;
        let root_name = self.input.parse_name()?;
        self.input.skip_whitespace();

        let mut system_id = None;
        let mut public_id = None;
        if self.input.looking_at(b"SYSTEM") {
            self.input.expect_str(b"SYSTEM")?;
            self.input.skip_whitespace_required()?;
            system_id = Some(self.input.parse_quoted_value()?);
            self.input.skip_whitespace();
        } else if self.input.looking_at(b"PUBLIC") {
            self.input.expect_str(b"PUBLIC")?;
            self.input.skip_whitespace_required()?;
            public_id = Some(self.input.parse_quoted_value()?);
            self.input.skip_whitespace_required()?;
            system_id = Some(self.input.parse_quoted_value()?);
            self.input.skip_whitespace();
        }

        let mut internal_subset = None;
        if self.input.peek() == Some(b'[') {
            self.input.advance(1);
            let start = self.input.pos();
            // Brackets inside quoted literals and comments do not count.
            let mut depth: u32 = 1;
            while !self.input.at_end() && depth > 0 {
                if self.input.looking_at(b"<!--") {
                    self.input.advance(4);
                    while !self.input.at_end() && !self.input.looking_at(b"-->") {
                        self.input.advance(1);
                    }
                    self.input.advance(3);
                } else if let Some(quote @ (b'"' | b'\'')) = self.input.peek() {
                    self.input.advance(1);
                    while !self.input.at_end() && self.input.peek() != Some(quote) {
                        self.input.advance(1);
                    }
                    self.input.advance(1);
                } else {
                    match self.input.peek() {
                        Some(b'[') => depth += 1,
                        Some(b']') => depth -= 1,
                        _ => {}
                    }
                    self.input.advance(1);
                }
            }
            if depth > 0 {
                return Err(self.input.fatal("unexpected end of input in internal subset"));
            }
            let subset = self.input.slice(start, self.input.pos() - 1).to_string();
            self.declare_entities(&subset)?;
            internal_subset = Some(subset);
            self.input.skip_whitespace();
        }
        self.input.expect_byte(b'>')?;

        self.seen_doctype = true;
        self.queue.push_back(XmlEvent::DocumentTypeDeclaration {
            root_name,
            public_id,
            system_id,
            internal_subset,
        });
        Ok(())
    }

    /// Records the general entities declared in an internal subset. The
    /// first declaration of a name wins; parameter entities are ignored.
    fn declare_entities(&mut self, subset: &str) -> Result<(), ParseError> {
        let mut scan = ParserInput::new(subset.to_string());
        let result = (|| -> Result<(), ParseError> {
            while !scan.at_end() {
                if scan.looking_at(b"<!--") {
                    parse_comment_content(&mut scan)?;
                } else if scan.looking_at(b"<!ENTITY") {
                    scan.expect_str(b"<!ENTITY")?;
                    scan.skip_whitespace_required()?;
                    if scan.peek() != Some(b'%') {
                        let name = scan.parse_name()?;
                        scan.skip_whitespace_required()?;
                        if scan.looking_at(b"SYSTEM") || scan.looking_at(b"PUBLIC") {
                            self.input.entity_external.insert(name);
                        } else {
                            let value = scan.parse_quoted_value()?;
                            self.input.entity_map.entry(name).or_insert(value);
                        }
                    }
                    skip_declaration(&mut scan)?;
                } else if let Some(b'"' | b'\'') = scan.peek() {
                    scan.parse_quoted_value()?;
                } else if let Some(ch) = scan.peek_char() {
                    scan.advance_char(ch);
                }
            }
            Ok(())
        })();
        result.map_err(|e| {
            self.input
                .fatal(format!("error in DTD internal subset: {}", e.message))
        })?;
        trace!("internal subset declares {} entities", self.input.entity_map.len());
        Ok(())
    }
}

/// Skips to just past the `>` that ends a markup declaration.
fn skip_declaration(scan: &mut ParserInput) -> Result<(), ParseError> {
    loop {
        match scan.peek() {
            None => return Err(scan.fatal("unterminated markup declaration")),
            Some(b'>') => {
                scan.advance(1);
                return Ok(());
            }
            Some(b'"' | b'\'') => {
                scan.parse_quoted_value()?;
            }
            Some(_) => {
                if let Some(ch) = scan.peek_char() {
                    scan.advance_char(ch);
                }
            }
        }
    }
}

impl EventSource for XmlTokenizer {
    fn next_event(&mut self) -> Result<XmlEvent, StreamError> {
        if self.phase == Phase::Closed {
            return Err(StreamError::Closed);
        }
        if let Some(e) = &self.failed {
            return Err(StreamError::Parse(e.clone()));
        }
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(event);
            }
            if self.phase == Phase::Finished {
                return Err(StreamError::Closed);
            }
            if let Err(e) = self.fill() {
                self.failed = Some(e.clone());
                return Err(StreamError::Parse(e));
            }
        }
    }

    fn close(&mut self) {
        if self.phase != Phase::Closed {
            trace!("closing tokenizer at {}", self.input.location());
            self.phase = Phase::Closed;
            self.queue.clear();
            self.input.release();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn events_with(xml: &str, options: &ParseOptions) -> Vec<XmlEvent> {
        let mut tokenizer = XmlTokenizer::new(xml, options);
        let mut events = Vec::new();
        loop {
            let event = tokenizer.next_event().unwrap();
            let done = event == XmlEvent::Completed;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn events(xml: &str) -> Vec<XmlEvent> {
        events_with(xml, &ParseOptions::default())
    }

    fn error(xml: &str) -> String {
        let mut tokenizer = XmlTokenizer::new(xml, &ParseOptions::default());
        loop {
            match tokenizer.next_event() {
                Ok(XmlEvent::Completed) => panic!("expected an error for {xml}"),
                Ok(_) => {}
                Err(e) => return e.to_string(),
            }
        }
    }

    #[test]
    fn test_simple_element() {
        assert_eq!(
            events("<a>hi</a>"),
            vec![
                XmlEvent::start_document(),
                XmlEvent::start_element("", "a", ""),
                XmlEvent::AttributesCompleted,
                XmlEvent::text("hi"),
                XmlEvent::EndElement,
                XmlEvent::Completed,
            ]
        );
    }

    #[test]
    fn test_xml_declaration_is_reported() {
        let first = events("<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>").remove(0);
        assert_eq!(
            first,
            XmlEvent::StartDocument {
                input_encoding: None,
                xml_version: Some("1.0".into()),
                xml_encoding: Some("UTF-8".into()),
                standalone: None,
            }
        );
    }

    #[test]
    fn test_input_encoding_from_bytes() {
        let mut tokenizer =
            XmlTokenizer::from_bytes(b"\xEF\xBB\xBF<a/>", &ParseOptions::default()).unwrap();
        match tokenizer.next_event().unwrap() {
            XmlEvent::StartDocument { input_encoding, .. } => {
                assert_eq!(input_encoding.as_deref(), Some("UTF-8"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_namespaces_precede_attributes() {
        let evs = events("<p:a xmlns:p=\"urn:p\" x=\"1\" p:y=\"2\"/>");
        assert_eq!(
            evs[1..7].to_vec(),
            vec![
                XmlEvent::start_element("urn:p", "a", "p"),
                XmlEvent::NamespaceDeclaration {
                    prefix: "p".into(),
                    namespace_uri: "urn:p".into()
                },
                XmlEvent::attribute("x", "1"),
                XmlEvent::Attribute {
                    namespace_uri: "urn:p".into(),
                    local_name: "y".into(),
                    prefix: "p".into(),
                    value: "2".into(),
                    attr_type: "CDATA".into(),
                    specified: true,
                },
                XmlEvent::AttributesCompleted,
                XmlEvent::EndElement,
            ]
        );
    }

    #[test]
    fn test_default_namespace_scoping() {
        let evs = events("<a xmlns=\"urn:a\"><b/><c xmlns=\"\"/></a>");
        assert!(evs.contains(&XmlEvent::start_element("urn:a", "b", "")));
        assert!(evs.contains(&XmlEvent::start_element("", "c", "")));
    }

    #[test]
    fn test_comment_pi_and_cdata_triples() {
        let evs = events("<a><!--c--><?t d?><![CDATA[<x>]]></a>");
        assert_eq!(
            evs[3..12].to_vec(),
            vec![
                XmlEvent::StartComment,
                XmlEvent::text("c"),
                XmlEvent::EndComment,
                XmlEvent::StartProcessingInstruction { target: "t".into() },
                XmlEvent::text("d"),
                XmlEvent::EndProcessingInstruction,
                XmlEvent::StartCData,
                XmlEvent::text("<x>"),
                XmlEvent::EndCData,
            ]
        );
    }

    #[test]
    fn test_coalesced_cdata() {
        let evs = events_with("<a><![CDATA[x]]></a>", &ParseOptions::default().coalesce_cdata(true));
        assert_eq!(evs[3], XmlEvent::text("x"));
        assert_eq!(evs[4], XmlEvent::EndElement);
    }

    #[test]
    fn test_references_expand_into_text() {
        let evs = events("<!DOCTYPE a [<!ENTITY e \"ent\">]><a>x&amp;&e;&#33;</a>");
        assert!(evs.contains(&XmlEvent::text("x&ent!")));
    }

    #[test]
    fn test_unexpanded_entity_reference() {
        let opts = ParseOptions::default().expand_entities(false);
        let evs = events_with("<!DOCTYPE a [<!ENTITY e \"ent\">]><a>x&e;y</a>", &opts);
        assert_eq!(
            evs[4..7].to_vec(),
            vec![
                XmlEvent::text("x"),
                XmlEvent::EntityReference {
                    name: "e".into(),
                    replacement_text: Some("ent".into())
                },
                XmlEvent::text("y"),
            ]
        );
    }

    #[test]
    fn test_doctype_event() {
        let evs = events("<!DOCTYPE a SYSTEM \"a.dtd\" [<!ELEMENT a ANY>]><a/>");
        assert_eq!(
            evs[1],
            XmlEvent::DocumentTypeDeclaration {
                root_name: "a".into(),
                public_id: None,
                system_id: Some("a.dtd".into()),
                internal_subset: Some("<!ELEMENT a ANY>".into()),
            }
        );
    }

    #[test]
    fn test_ignorable_whitespace_flag() {
        let opts = ParseOptions::default().ignorable_whitespace(true);
        let evs = events_with("<a> <b/></a>", &opts);
        assert_eq!(
            evs[3],
            XmlEvent::CharacterData {
                data: TextContent::from(" "),
                ignorable: true
            }
        );
    }

    #[test]
    fn test_prolog_whitespace_is_skipped() {
        let evs = events("  <!--p-->\n<a/>\n<?after?>  ");
        assert_eq!(evs[1], XmlEvent::StartComment);
        assert_eq!(evs[evs.len() - 3], XmlEvent::StartProcessingInstruction { target: "after".into() });
    }

    #[test]
    fn test_well_formedness_errors() {
        assert!(error("<a></b>").contains("mismatched end tag"));
        assert!(error("<a>").contains("not closed"));
        assert!(error("").contains("no root element"));
        assert!(error("<a/><b/>").contains("extra content"));
        assert!(error("<a x='1' x='2'/>").contains("duplicate attribute"));
        assert!(error("<p:a/>").contains("not bound"));
        assert!(error("<a>]]></a>").contains("']]>'"));
        assert!(error("<a/>text").contains("outside the root"));
    }

    #[test]
    fn test_attribute_limit() {
        let opts = ParseOptions::default().max_attributes(1);
        let mut tokenizer = XmlTokenizer::new("<a x='1' y='2'/>", &opts);
        tokenizer.next_event().unwrap();
        assert!(tokenizer.next_event().is_err());
    }

    #[test]
    fn test_errors_are_sticky() {
        let mut tokenizer = XmlTokenizer::new("<a></b>", &ParseOptions::default());
        for _ in 0..3 {
            tokenizer.next_event().unwrap();
        }
        assert!(matches!(tokenizer.next_event(), Err(StreamError::Parse(_))));
        assert!(matches!(tokenizer.next_event(), Err(StreamError::Parse(_))));
    }

    #[test]
    fn test_read_past_completed_and_after_close() {
        let mut tokenizer = XmlTokenizer::new("<a/>", &ParseOptions::default());
        while tokenizer.next_event().unwrap() != XmlEvent::Completed {}
        assert!(matches!(tokenizer.next_event(), Err(StreamError::Closed)));

        let mut tokenizer = XmlTokenizer::new("<a/>", &ParseOptions::default());
        tokenizer.next_event().unwrap();
        tokenizer.close();
        tokenizer.close();
        assert!(matches!(tokenizer.next_event(), Err(StreamError::Closed)));
    }

    #[test]
    fn test_reads_lazily() {
        let mut tokenizer = XmlTokenizer::new("<a><b/>not well formed</c>", &ParseOptions::default());
        for _ in 0..6 {
            tokenizer.next_event().unwrap();
        }
        assert!(tokenizer.location().byte_offset < 10);
    }
}
