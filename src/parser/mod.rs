//! The XML text tokenizer.
//!
//! [`XmlTokenizer`] is a hand-rolled, pull-driven tokenizer for XML 1.0 with
//! namespaces. It is the event source behind documents created from text:
//! the document pulls one event at a time, so only as much of the input is
//! tokenized as the caller actually navigates.
//!
//! ```
//! use xmlaxon::Document;
//!
//! let mut doc = Document::parse_str("<greeting>hello</greeting>");
//! let elem = doc.document_element(false).unwrap().unwrap();
//! assert_eq!(doc.local_name(elem), Some("greeting"));
//! ```

pub(crate) mod input;
mod tokenizer;

pub use tokenizer::XmlTokenizer;

use crate::builder::BuilderOptions;
use crate::error::StreamError;
use crate::tree::Document;

use input::{
    DEFAULT_MAX_ATTRIBUTES, DEFAULT_MAX_DEPTH, DEFAULT_MAX_ENTITY_EXPANSIONS,
    DEFAULT_MAX_NAME_LENGTH,
};

/// Options controlling tokenizer behavior and security limits.
///
/// Use the builder pattern to configure options:
///
/// ```
/// use xmlaxon::parser::ParseOptions;
///
/// let opts = ParseOptions::default()
///     .ignorable_whitespace(true)
///     .max_depth(128);
/// ```
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// If true, whitespace-only text is reported as ignorable.
    pub ignorable_whitespace: bool,
    /// If true (the default), references to entities declared in the
    /// internal subset are replaced by their text. Otherwise they are
    /// reported as `EntityReference` events.
    pub expand_entities: bool,
    /// If true, CDATA sections are reported as plain character data.
    pub coalesce_cdata: bool,

    // -- Security limits --
    /// Maximum element nesting depth (default: 256).
    pub max_depth: u32,
    /// Maximum number of attributes on a single element (default: 256).
    pub max_attributes: u32,
    /// Maximum length in bytes of an element or attribute name (default: 50,000).
    pub max_name_length: usize,
    /// Maximum number of entity reference expansions per document (default: 10,000).
    pub max_entity_expansions: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ignorable_whitespace: false,
            expand_entities: true,
            coalesce_cdata: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_attributes: DEFAULT_MAX_ATTRIBUTES,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            max_entity_expansions: DEFAULT_MAX_ENTITY_EXPANSIONS,
        }
    }
}

impl ParseOptions {
    /// Enables or disables reporting whitespace-only text as ignorable.
    #[must_use]
    pub fn ignorable_whitespace(mut self, yes: bool) -> Self {
        self.ignorable_whitespace = yes;
        self
    }

    /// Enables or disables expansion of declared entities.
    #[must_use]
    pub fn expand_entities(mut self, yes: bool) -> Self {
        self.expand_entities = yes;
        self
    }

    /// Enables or disables reporting CDATA sections as plain text.
    #[must_use]
    pub fn coalesce_cdata(mut self, yes: bool) -> Self {
        self.coalesce_cdata = yes;
        self
    }

    /// Sets the maximum element nesting depth.
    #[must_use]
    pub fn max_depth(mut self, max: u32) -> Self {
        self.max_depth = max;
        self
    }

    /// Sets the maximum number of attributes per element.
    #[must_use]
    pub fn max_attributes(mut self, max: u32) -> Self {
        self.max_attributes = max;
        self
    }

    /// Sets the maximum element/attribute name length in bytes.
    #[must_use]
    pub fn max_name_length(mut self, max: usize) -> Self {
        self.max_name_length = max;
        self
    }

    /// Sets the maximum number of entity reference expansions.
    #[must_use]
    pub fn max_entity_expansions(mut self, max: u32) -> Self {
        self.max_entity_expansions = max;
        self
    }
}

impl Document {
    /// Creates a document built lazily from XML text with default options.
    ///
    /// Nothing is tokenized until the document is navigated; well-formedness
    /// errors surface as [`ModelError::Stream`](crate::error::ModelError)
    /// from the call that reaches them.
    #[must_use]
    pub fn parse_str(input: &str) -> Document {
        Self::parse_str_with_options(input, &ParseOptions::default(), BuilderOptions::default())
    }

    /// Creates a document built lazily from XML text.
    #[must_use]
    pub fn parse_str_with_options(input: &str, options: &ParseOptions, builder: BuilderOptions) -> Document {
        Self::from_source(XmlTokenizer::new(input, options), builder)
    }

    /// Creates a document built lazily from raw bytes, detecting their
    /// encoding.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Encoding` if the bytes cannot be decoded.
    pub fn parse_bytes(input: &[u8], options: &ParseOptions) -> Result<Document, StreamError> {
        let tokenizer = XmlTokenizer::from_bytes(input, options)?;
        Ok(Self::from_source(tokenizer, BuilderOptions::default()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_options() {
        let opts = ParseOptions::default();
        assert!(opts.expand_entities);
        assert!(!opts.ignorable_whitespace);
        assert_eq!(opts.max_depth, 256);
    }

    #[test]
    fn test_parse_str_is_lazy() {
        let mut doc = Document::parse_str("<a/><b/>");
        // The error after the root element is not reached by looking at it.
        let root = doc.document_element(false).unwrap().unwrap();
        assert_eq!(doc.local_name(root), Some("a"));
        let err = doc.build(doc.root()).unwrap_err();
        assert!(matches!(err, ModelError::Stream(StreamError::Parse(_))), "{err}");
    }

    #[test]
    fn test_depth_limit_applies() {
        let opts = ParseOptions::default().max_depth(2);
        let mut doc = Document::parse_str_with_options("<a><b><c/></b></a>", &opts, BuilderOptions::default());
        assert!(doc.build(doc.root()).is_err());
    }

    #[test]
    fn test_parse_bytes_records_encoding() {
        let mut doc = Document::parse_bytes(b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>", &ParseOptions::default()).unwrap();
        let root = doc.root();
        doc.build(root).unwrap();
        assert_eq!(doc.info().input_encoding.as_deref(), Some("windows-1252"));
        let elem = doc.document_element(false).unwrap().unwrap();
        assert_eq!(doc.text_content(elem).unwrap(), "\u{e9}");
    }
}
