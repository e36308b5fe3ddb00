//! Low-level input handling for the tokenizer.
//!
//! [`ParserInput`] owns the decoded document text and provides the parsing
//! primitives the tokenizer is built from: peeking, advancing with line and
//! column tracking, name parsing, and reference resolution.
//!
//! # Security
//!
//! `ParserInput` tracks nesting depth and entity expansion count:
//!
//! - **Depth limit**: bounds the element stack.
//! - **Entity expansion limit**: caps the number of references expanded,
//!   which also bounds nested internal entities.
//! - **Name length limit**: prevents memory exhaustion from huge names.
//!
//! No external entity loading is performed.

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::error::{ParseError, SourceLocation};

/// Default maximum element nesting depth.
pub(crate) const DEFAULT_MAX_DEPTH: u32 = 256;

/// Default maximum number of attributes on a single element.
pub(crate) const DEFAULT_MAX_ATTRIBUTES: u32 = 256;

/// Default maximum length (in bytes) of an element or attribute name.
pub(crate) const DEFAULT_MAX_NAME_LENGTH: usize = 50_000;

/// Default maximum number of entity expansions per document.
pub(crate) const DEFAULT_MAX_ENTITY_EXPANSIONS: u32 = 10_000;

/// Internal entities may reference each other at most this deep.
const MAX_ENTITY_NESTING: u32 = 16;

// -------------------------------------------------------------------------
// XML Name character classes (XML 1.0 §2.3)
// -------------------------------------------------------------------------

/// Returns `true` if `c` is a valid `Char` per XML 1.0 §2.2 `[2]`.
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x0001_0000..=0x0010_FFFF
    )
}

/// Returns `true` if `c` is a valid `NameStartChar` per XML 1.0 §2.3 `[4]`.
pub(crate) fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` is a valid `NameChar` per XML 1.0 §2.3 `[4a]`.
pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// The outcome of parsing a `&...;` reference in content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reference {
    /// A character reference or one of the five built-in entities.
    Text(String),
    /// A reference to an entity declared in the internal subset, with its
    /// fully expanded replacement text.
    Entity { name: String, replacement: String },
}

/// Low-level input state for the tokenizer.
pub(crate) struct ParserInput {
    /// The decoded document text.
    input: String,

    /// Current byte offset in `input`.
    pos: usize,

    /// Current line number (1-based).
    line: u32,

    /// Current column number (1-based).
    column: u32,

    depth: u32,
    max_depth: u32,
    max_name_length: usize,
    entity_expansions: u32,
    max_entity_expansions: u32,

    /// Replacement text of internal general entities from the DTD.
    pub(crate) entity_map: HashMap<String, String>,

    /// Names of entities declared as external (SYSTEM/PUBLIC).
    pub(crate) entity_external: HashSet<String>,
}

impl ParserInput {
    /// Creates an input over `input` with default limits.
    pub fn new(input: String) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            entity_expansions: 0,
            max_entity_expansions: DEFAULT_MAX_ENTITY_EXPANSIONS,
            entity_map: HashMap::new(),
            entity_external: HashSet::new(),
        }
    }

    pub fn set_max_depth(&mut self, max: u32) {
        self.max_depth = max;
    }

    pub fn set_max_name_length(&mut self, max: usize) {
        self.max_name_length = max;
    }

    pub fn set_max_entity_expansions(&mut self, max: u32) {
        self.max_entity_expansions = max;
    }

    /// Drops the remaining input.
    pub fn release(&mut self) {
        self.input = String::new();
        self.pos = 0;
    }

    // -- Depth tracking --

    /// Increments the nesting depth. Returns an error if the limit is exceeded.
    pub fn increment_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.fatal(format!(
                "maximum nesting depth exceeded ({})",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Decrements the nesting depth (saturating at 0).
    pub fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // -- Position queries --

    /// Returns the current source location.
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_offset: self.pos,
        }
    }

    /// Returns `true` if all input has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Returns the current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Returns the input between two byte offsets.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        self.input.get(start..end).unwrap_or_default()
    }

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    // -- Peek operations --

    /// Returns the byte at the current position without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    /// Returns the byte at `current_position + offset` without consuming.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.pos + offset).copied()
    }

    /// Returns the character at the current position without consuming it.
    pub fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos..).and_then(|s| s.chars().next())
    }

    // -- Advance operations --

    /// Advances the position by `count` ASCII bytes, updating line/column.
    pub fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(b) = self.peek() {
                if b == b'\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
                self.pos += 1;
            }
        }
    }

    /// Advances by one character, updating line/column.
    pub fn advance_char(&mut self, ch: char) {
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += ch.len_utf8();
    }

    /// Consumes and returns the next byte, or returns an error at EOF.
    pub fn next_byte(&mut self) -> Result<u8, ParseError> {
        let b = self.peek().ok_or_else(|| self.fatal("unexpected end of input"))?;
        self.advance(1);
        Ok(b)
    }

    /// Consumes and returns the next character with `\r\n` normalization
    /// (XML 1.0 §2.11) and character validation (XML 1.0 §2.2).
    pub fn next_char(&mut self) -> Result<char, ParseError> {
        let ch = self
            .peek_char()
            .ok_or_else(|| self.fatal("unexpected end of input"))?;
        self.advance_char(ch);
        if ch == '\r' {
            if self.peek() == Some(b'\n') {
                self.advance(1);
            }
            return Ok('\n');
        }
        if !is_xml_char(ch) {
            return Err(self.fatal(format!("invalid XML character: U+{:04X}", ch as u32)));
        }
        Ok(ch)
    }

    // -- Expect operations --

    /// Consumes the next byte and asserts it matches `expected`.
    pub fn expect_byte(&mut self, expected: u8) -> Result<(), ParseError> {
        let b = self.next_byte()?;
        if b != expected {
            return Err(self.fatal(format!(
                "expected '{}', found '{}'",
                expected as char, b as char
            )));
        }
        Ok(())
    }

    /// Consumes bytes and asserts they match the `expected` sequence.
    pub fn expect_str(&mut self, expected: &[u8]) -> Result<(), ParseError> {
        for &b in expected {
            self.expect_byte(b)?;
        }
        Ok(())
    }

    /// Returns `true` if the remaining input starts with `s`.
    pub fn looking_at(&self, s: &[u8]) -> bool {
        self.bytes().get(self.pos..).is_some_and(|rest| rest.starts_with(s))
    }

    // -- Whitespace --

    /// Skips whitespace characters. Returns `true` if any were consumed.
    pub fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while let Some(b' ' | b'\t' | b'\r' | b'\n') = self.peek() {
            self.advance(1);
        }
        self.pos > start
    }

    /// Skips whitespace, returning an error if none is found.
    pub fn skip_whitespace_required(&mut self) -> Result<(), ParseError> {
        if !self.skip_whitespace() {
            return Err(self.fatal("whitespace required"));
        }
        Ok(())
    }

    /// Consumes ASCII bytes while `pred` returns `true` and returns them.
    pub fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii() && pred(b) {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    // -- Name parsing (XML 1.0 §2.3) --

    /// Parses an XML `Name` per XML 1.0 §2.3 production `[5]`.
    pub fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let first = self
            .peek_char()
            .ok_or_else(|| self.fatal("expected name, found end of input"))?;
        if !is_name_start_char(first) {
            return Err(self.fatal(format!("invalid name start character: '{first}'")));
        }
        self.advance_char(first);
        while let Some(ch) = self.peek_char() {
            if is_name_char(ch) {
                self.advance_char(ch);
            } else {
                break;
            }
        }
        let len = self.pos - start;
        if len > self.max_name_length {
            return Err(self.fatal(format!(
                "name length ({len}) exceeds maximum ({})",
                self.max_name_length
            )));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    // -- Reference parsing (XML 1.0 §4.1) --

    fn count_expansion(&mut self) -> Result<(), ParseError> {
        self.entity_expansions += 1;
        if self.entity_expansions > self.max_entity_expansions {
            return Err(self.fatal(format!(
                "entity expansion limit exceeded ({})",
                self.max_entity_expansions
            )));
        }
        Ok(())
    }

    /// Parses an entity or character reference (`&...;`).
    pub fn parse_reference(&mut self) -> Result<Reference, ParseError> {
        self.count_expansion()?;
        self.expect_byte(b'&')?;

        if self.peek() == Some(b'#') {
            self.advance(1);
            let value = if self.peek() == Some(b'x') {
                self.advance(1);
                let hex = self.take_while(|b| b.is_ascii_hexdigit());
                if hex.is_empty() {
                    return Err(self.fatal("empty hex character reference"));
                }
                u32::from_str_radix(&hex, 16)
                    .map_err(|_| self.fatal("invalid hex character reference"))?
            } else {
                let dec = self.take_while(|b| b.is_ascii_digit());
                if dec.is_empty() {
                    return Err(self.fatal("empty decimal character reference"));
                }
                dec.parse::<u32>()
                    .map_err(|_| self.fatal("invalid decimal character reference"))?
            };
            self.expect_byte(b';')?;
            let ch = char::from_u32(value)
                .filter(|&c| is_xml_char(c))
                .ok_or_else(|| {
                    self.fatal(format!(
                        "character reference &#x{value:X}; does not refer to a valid XML character"
                    ))
                })?;
            return Ok(Reference::Text(ch.to_string()));
        }

        let name = self.parse_name()?;
        self.expect_byte(b';')?;
        if let Some(builtin) = builtin_entity(&name) {
            return Ok(Reference::Text(builtin.to_string()));
        }
        let replacement = self.expand_entity(&name, 0)?;
        Ok(Reference::Entity { name, replacement })
    }

    /// Expands a declared entity, resolving references in its replacement
    /// text.
    fn expand_entity(&mut self, name: &str, nesting: u32) -> Result<String, ParseError> {
        if self.entity_external.contains(name) {
            return Err(self.fatal(format!(
                "reference to external entity '{name}' is not supported"
            )));
        }
        if nesting > MAX_ENTITY_NESTING {
            return Err(self.fatal(format!("entity '{name}' is nested too deeply")));
        }
        let value = self
            .entity_map
            .get(name)
            .cloned()
            .ok_or_else(|| self.fatal(format!("unknown entity reference: &{name};")))?;
        if !value.contains('&') {
            return Ok(value);
        }
        let mut result = String::with_capacity(value.len());
        let mut rest = value.as_str();
        while let Some(amp) = rest.find('&') {
            result.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let end = after
                .find(';')
                .ok_or_else(|| self.fatal(format!("incomplete reference in entity '{name}'")))?;
            let reference = &after[..end];
            self.count_expansion()?;
            if let Some(digits) = reference.strip_prefix('#') {
                let value = match digits.strip_prefix('x') {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => digits.parse::<u32>(),
                }
                .map_err(|_| self.fatal(format!("invalid character reference in entity '{name}'")))?;
                let ch = char::from_u32(value)
                    .filter(|&c| is_xml_char(c))
                    .ok_or_else(|| self.fatal(format!("invalid character reference: U+{value:04X}")))?;
                result.push(ch);
            } else if let Some(builtin) = builtin_entity(reference) {
                result.push_str(builtin);
            } else {
                let nested = self.expand_entity(reference, nesting + 1)?;
                result.push_str(&nested);
            }
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }

    // -- Attribute value parsing (XML 1.0 §3.3.3) --

    /// Parses a quoted attribute value with reference resolution and
    /// whitespace normalization.
    pub fn parse_attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = self.next_byte()?;
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal("attribute value must be quoted"));
        }

        let mut value = String::new();
        loop {
            let b = self
                .peek()
                .ok_or_else(|| self.fatal("unexpected end of input in attribute value"))?;
            if b == quote {
                self.advance(1);
                break;
            }
            match b {
                b'&' => match self.parse_reference()? {
                    Reference::Text(text) => value.push_str(&text),
                    Reference::Entity { replacement, .. } => {
                        if replacement.contains('<') {
                            return Err(self.fatal(
                                "'<' not allowed in attribute values (from entity expansion)",
                            ));
                        }
                        value.push_str(&replacement);
                    }
                },
                b'<' => return Err(self.fatal("'<' not allowed in attribute values")),
                _ => {
                    let ch = self.next_char()?;
                    if ch == '\n' || ch == '\t' {
                        value.push(' ');
                    } else {
                        value.push(ch);
                    }
                }
            }
        }

        Ok(value)
    }

    /// Parses a simple quoted value (single or double quotes, no reference
    /// resolution).
    pub fn parse_quoted_value(&mut self) -> Result<String, ParseError> {
        let quote = self.next_byte()?;
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal("expected quoted value"));
        }
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.fatal("unexpected end of input in quoted value")),
                Some(b) if b == quote => break,
                Some(_) => value.push(self.next_char()?),
            }
        }
        self.expect_byte(quote)?;
        Ok(value)
    }

    // -- Error helpers --

    /// Creates a fatal `ParseError` at the current location.
    pub fn fatal(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.location(),
        }
    }
}

fn builtin_entity(name: &str) -> Option<&'static str> {
    match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

// -------------------------------------------------------------------------
// Namespace resolver
// -------------------------------------------------------------------------

/// The well-known XML namespace URI, pre-bound to the `xml` prefix.
pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Manages namespace scope while tokenizing.
///
/// Maintains a stack of binding frames that mirrors the element nesting.
/// Each frame holds the `xmlns` declarations of one element; resolution
/// walks the stack from top to bottom.
pub(crate) struct NamespaceResolver {
    stack: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceResolver {
    /// Creates a new resolver with the `xml` prefix pre-bound.
    pub fn new() -> Self {
        let initial = vec![(Some("xml".to_string()), XML_NAMESPACE.to_string())];
        Self {
            stack: vec![initial],
        }
    }

    /// Pushes a new (empty) namespace scope for an element.
    pub fn push_scope(&mut self) {
        self.stack.push(Vec::new());
    }

    /// Pops the current namespace scope.
    pub fn pop_scope(&mut self) {
        self.stack.pop();
    }

    /// Binds a prefix to a URI in the current scope. `None` is the default
    /// namespace.
    pub fn bind(&mut self, prefix: Option<String>, uri: String) {
        if let Some(frame) = self.stack.last_mut() {
            frame.push((prefix, uri));
        }
    }

    /// Resolves a prefix to its URI. An empty binding undeclares the
    /// default namespace.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        for frame in self.stack.iter().rev() {
            for (p, uri) in frame.iter().rev() {
                if p.as_deref() == prefix {
                    return (!uri.is_empty()).then_some(uri.as_str());
                }
            }
        }
        None
    }
}

// -------------------------------------------------------------------------
// Markup helpers
// -------------------------------------------------------------------------

/// Parses an XML comment (`<!-- ... -->`), returning the content text.
///
/// See XML 1.0 §2.5 production `[15]`.
pub(crate) fn parse_comment_content(input: &mut ParserInput) -> Result<String, ParseError> {
    input.expect_str(b"<!--")?;
    let mut content = String::new();
    loop {
        if input.at_end() {
            return Err(input.fatal("unexpected end of input in comment"));
        }
        if input.looking_at(b"-->") {
            input.advance(3);
            break;
        }
        if input.looking_at(b"--") {
            return Err(input.fatal("'--' not allowed inside comments"));
        }
        content.push(input.next_char()?);
    }
    Ok(content)
}

/// Parses a CDATA section (`<![CDATA[ ... ]]>`), returning the content text.
///
/// See XML 1.0 §2.7 production `[18]`.
pub(crate) fn parse_cdata_content(input: &mut ParserInput) -> Result<String, ParseError> {
    input.expect_str(b"<![CDATA[")?;
    let mut content = String::new();
    loop {
        if input.at_end() {
            return Err(input.fatal("unexpected end of input in CDATA section"));
        }
        if input.looking_at(b"]]>") {
            input.advance(3);
            break;
        }
        content.push(input.next_char()?);
    }
    Ok(content)
}

/// Parses a processing instruction (`<?target data?>`), returning
/// `(target, optional_data)`.
///
/// See XML 1.0 §2.6 production `[16]`.
pub(crate) fn parse_pi_content(input: &mut ParserInput) -> Result<(String, Option<String>), ParseError> {
    input.expect_str(b"<?")?;
    let target = input.parse_name()?;
    if target.eq_ignore_ascii_case("xml") {
        return Err(input.fatal("PI target 'xml' is reserved"));
    }
    if target.contains(':') {
        return Err(input.fatal("PI target must not contain a colon"));
    }

    if !input.skip_whitespace() {
        input.expect_str(b"?>")?;
        return Ok((target, None));
    }
    let mut data = String::new();
    loop {
        if input.at_end() {
            return Err(input.fatal("unexpected end of input in processing instruction"));
        }
        if input.looking_at(b"?>") {
            input.advance(2);
            break;
        }
        data.push(input.next_char()?);
    }
    Ok((target, (!data.is_empty()).then_some(data)))
}

/// Parsed XML declaration data.
#[derive(Debug, Clone)]
pub(crate) struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
}

/// Parses an XML declaration (`<?xml version="1.0" ...?>`).
///
/// See XML 1.0 §2.8 production `[23]`.
pub(crate) fn parse_xml_decl(input: &mut ParserInput) -> Result<XmlDeclaration, ParseError> {
    input.expect_str(b"<?xml")?;
    input.skip_whitespace_required()?;

    input.expect_str(b"version")?;
    input.skip_whitespace();
    input.expect_byte(b'=')?;
    input.skip_whitespace();
    let version = input.parse_quoted_value()?;
    if !is_valid_version_num(&version) {
        return Err(input.fatal(format!("invalid version number: '{version}'")));
    }
    if version != "1.0" {
        warn!("{}: version {version} is read with XML 1.0 rules", input.location());
    }

    let had_ws = input.skip_whitespace();
    let encoding = if input.looking_at(b"encoding") {
        if !had_ws {
            return Err(input.fatal("whitespace required before encoding"));
        }
        input.expect_str(b"encoding")?;
        input.skip_whitespace();
        input.expect_byte(b'=')?;
        input.skip_whitespace();
        let enc = input.parse_quoted_value()?;
        if !is_valid_encoding_name(&enc) {
            return Err(input.fatal(format!("invalid encoding name: '{enc}'")));
        }
        Some(enc)
    } else {
        None
    };

    let had_ws2 = input.skip_whitespace() || (encoding.is_none() && had_ws);
    let standalone = if input.looking_at(b"standalone") {
        if !had_ws2 {
            return Err(input.fatal("whitespace required before standalone"));
        }
        input.expect_str(b"standalone")?;
        input.skip_whitespace();
        input.expect_byte(b'=')?;
        input.skip_whitespace();
        match input.parse_quoted_value()?.as_str() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => return Err(input.fatal("standalone must be 'yes' or 'no'")),
        }
    } else {
        None
    };

    input.skip_whitespace();
    input.expect_str(b"?>")?;

    Ok(XmlDeclaration {
        version,
        encoding,
        standalone,
    })
}

/// `VersionNum ::= '1.' [0-9]+`
fn is_valid_version_num(s: &str) -> bool {
    s.strip_prefix("1.")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// `EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*`
fn is_valid_encoding_name(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes.split_first() {
        Some((first, rest)) => {
            first.is_ascii_alphabetic()
                && rest
                    .iter()
                    .all(|&b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
        }
        None => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input(s: &str) -> ParserInput {
        ParserInput::new(s.to_string())
    }

    #[test]
    fn test_line_column_tracking() {
        let mut input = input("ab\ncd");
        input.advance(2);
        assert_eq!(input.location().column, 3);
        input.advance(1);
        assert_eq!(input.location().line, 2);
        assert_eq!(input.location().column, 1);
    }

    #[test]
    fn test_next_char_cr_normalization() {
        let mut input = input("a\r\nb");
        assert_eq!(input.next_char().unwrap(), 'a');
        assert_eq!(input.next_char().unwrap(), '\n');
        assert_eq!(input.next_char().unwrap(), 'b');
    }

    #[test]
    fn test_parse_name_length_limit() {
        let mut input = input(&"a".repeat(100));
        input.set_max_name_length(50);
        assert!(input.parse_name().unwrap_err().message.contains("name length"));
    }

    #[test]
    fn test_builtin_and_char_references() {
        assert_eq!(input("&amp;").parse_reference().unwrap(), Reference::Text("&".into()));
        assert_eq!(input("&#65;").parse_reference().unwrap(), Reference::Text("A".into()));
        assert_eq!(input("&#x42;").parse_reference().unwrap(), Reference::Text("B".into()));
        assert!(input("&#0;").parse_reference().is_err());
        assert!(input("&nope;").parse_reference().is_err());
    }

    #[test]
    fn test_declared_entity_expands_recursively() {
        let mut input = input("&outer;");
        input.entity_map.insert("inner".into(), "x&amp;y".into());
        input.entity_map.insert("outer".into(), "[&inner;]".into());
        assert_eq!(
            input.parse_reference().unwrap(),
            Reference::Entity {
                name: "outer".into(),
                replacement: "[x&y]".into()
            }
        );
    }

    #[test]
    fn test_recursive_entity_is_rejected() {
        let mut input = input("&loop;");
        input.entity_map.insert("loop".into(), "&loop;".into());
        assert!(input.parse_reference().is_err());
    }

    #[test]
    fn test_entity_expansion_limit() {
        let mut input = input("&amp;&amp;&amp;");
        input.set_max_entity_expansions(2);
        assert!(input.parse_reference().is_ok());
        assert!(input.parse_reference().is_ok());
        assert!(input.parse_reference().is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut input = input("");
        input.set_max_depth(2);
        assert!(input.increment_depth().is_ok());
        assert!(input.increment_depth().is_ok());
        assert!(input.increment_depth().is_err());
    }

    #[test]
    fn test_attribute_value_normalization() {
        let mut input = input("\"a\tb\nc &lt; d\"");
        assert_eq!(input.parse_attribute_value().unwrap(), "a b c < d");
        assert!(super::ParserInput::new("'<'".into()).parse_attribute_value().is_err());
    }

    #[test]
    fn test_namespace_resolver_scopes() {
        let mut ns = NamespaceResolver::new();
        assert_eq!(ns.resolve(Some("xml")), Some(XML_NAMESPACE));
        ns.push_scope();
        ns.bind(None, "urn:a".into());
        ns.push_scope();
        ns.bind(None, String::new());
        assert_eq!(ns.resolve(None), None);
        ns.pop_scope();
        assert_eq!(ns.resolve(None), Some("urn:a"));
    }

    #[test]
    fn test_pi_and_comment_helpers() {
        let (target, data) = parse_pi_content(&mut input("<?go fast ?>")).unwrap();
        assert_eq!((target.as_str(), data.as_deref()), ("go", Some("fast ")));
        assert_eq!(parse_comment_content(&mut input("<!-- hi -->")).unwrap(), " hi ");
        assert!(parse_comment_content(&mut input("<!-- a -- b -->")).is_err());
    }

    #[test]
    fn test_xml_decl_later_version_is_accepted() {
        let decl = parse_xml_decl(&mut input("<?xml version='1.1'?>")).unwrap();
        assert_eq!(decl.version, "1.1");
        assert_eq!(decl.encoding, None);
    }

    #[test]
    fn test_xml_decl() {
        let decl = parse_xml_decl(&mut input("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>")).unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(decl.standalone, Some(true));
        assert!(parse_xml_decl(&mut input("<?xml version=\"2.0\"?>")).is_err());
    }
}
