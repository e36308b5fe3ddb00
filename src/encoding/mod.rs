//! Input encoding detection for the text tokenizer.
//!
//! Byte input is sniffed for a byte order mark, then the `encoding="..."`
//! pseudo-attribute of the XML declaration is consulted, and the bytes are
//! decoded to UTF-8 through `encoding_rs`. The name of the encoding that was
//! actually used becomes the *input encoding* reported by the
//! `StartDocument` event.

use std::fmt;

/// The input bytes could not be decoded.
#[derive(Debug, Clone)]
pub struct EncodingError {
    /// A human-readable description of the problem.
    pub message: String,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encoding error: {}", self.message)
    }
}

impl std::error::Error for EncodingError {}

/// Decoded input text together with the encoding it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    /// The input as UTF-8, without any byte order mark.
    pub text: String,
    /// Canonical name of the encoding the bytes were decoded from.
    pub encoding: &'static str,
}

/// Detects a byte order mark.
///
/// Returns the encoding it indicates and the number of bytes it occupies,
/// or `None` when the input has no BOM.
///
/// # Examples
///
/// ```
/// use xmlaxon::encoding::detect_bom;
///
/// assert_eq!(detect_bom(b"\xEF\xBB\xBF<a/>"), Some(("UTF-8", 3)));
/// assert_eq!(detect_bom(b"\xFF\xFE<\0"), Some(("UTF-16LE", 2)));
/// assert_eq!(detect_bom(b"<a/>"), None);
/// ```
#[must_use]
pub fn detect_bom(bytes: &[u8]) -> Option<(&'static str, usize)> {
    match bytes {
        [0xEF, 0xBB, 0xBF, ..] => Some(("UTF-8", 3)),
        [0xFE, 0xFF, ..] => Some(("UTF-16BE", 2)),
        [0xFF, 0xFE, ..] => Some(("UTF-16LE", 2)),
        _ => None,
    }
}

/// Decodes raw XML bytes, detecting the encoding from the BOM and the XML
/// declaration.
///
/// A BOM wins over the declaration, except that a declaration of plain
/// `UTF-16` is compatible with either UTF-16 BOM. Without a BOM the
/// declaration decides, and without either the input must be UTF-8.
///
/// # Errors
///
/// Returns `EncodingError` if the declared encoding is unknown to
/// `encoding_rs` or the bytes are malformed for the chosen encoding.
///
/// # Examples
///
/// ```
/// use xmlaxon::encoding::decode_input;
///
/// let decoded = decode_input(b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>").unwrap();
/// assert_eq!(decoded.encoding, "windows-1252");
/// assert!(decoded.text.ends_with("<a>\u{e9}</a>"));
/// ```
pub fn decode_input(bytes: &[u8]) -> Result<DecodedInput, EncodingError> {
    if let Some((bom_label, skip)) = detect_bom(bytes) {
        let encoding = lookup(bom_label)?;
        let text = decode_with(encoding, &bytes[skip..])?;
        if let Some(declared) = declared_encoding(text.as_bytes()) {
            let same = (declared.eq_ignore_ascii_case("UTF-16") && bom_label.starts_with("UTF-16"))
                || lookup(&declared).map_or(false, |d| d == encoding);
            if !same {
                return Err(EncodingError::new(format!(
                    "byte order mark indicates {bom_label} but the declaration says {declared}"
                )));
            }
        }
        return Ok(DecodedInput {
            text,
            encoding: encoding.name(),
        });
    }

    let encoding = match declared_encoding(bytes) {
        Some(declared) => lookup(&declared)?,
        None => encoding_rs::UTF_8,
    };
    let text = decode_with(encoding, bytes)?;
    Ok(DecodedInput {
        text,
        encoding: encoding.name(),
    })
}

fn lookup(label: &str) -> Result<&'static encoding_rs::Encoding, EncodingError> {
    encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| EncodingError::new(format!("unsupported encoding: {label}")))
}

fn decode_with(
    encoding: &'static encoding_rs::Encoding,
    bytes: &[u8],
) -> Result<String, EncodingError> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(EncodingError::new(format!(
            "malformed byte sequence for encoding {}",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

/// Reads the `encoding` pseudo-attribute from an XML declaration.
///
/// The declaration is ASCII in every encoding this detects, so the bytes are
/// scanned directly.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    if !bytes.starts_with(b"<?xml") {
        return None;
    }
    let scan = &bytes[..bytes.len().min(256)];
    let end = scan.windows(2).position(|w| w == b"?>")?;
    let decl = &scan[..end];
    let at = decl.windows(8).position(|w| w == b"encoding")?;
    let rest = trim_ascii_start(&decl[at + 8..]);
    let rest = trim_ascii_start(rest.strip_prefix(b"=")?);
    let (&quote, rest) = rest.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let close = rest.iter().position(|&b| b == quote)?;
    String::from_utf8(rest[..close].to_vec()).ok()
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
