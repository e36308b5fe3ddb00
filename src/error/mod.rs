//! Error types for the event source, the builder, the navigator and the
//! serializer.
//!
//! Errors fall into three layers:
//!
//! - [`ParseError`] is produced by the text tokenizer and carries the line,
//!   column and byte offset of the malformed construct.
//! - [`StreamError`] is what any [`EventSource`](crate::event::EventSource) or
//!   [`XmlHandler`](crate::event::XmlHandler) reports. It wraps parse,
//!   encoding and I/O failures.
//! - [`ModelError`] is what the object model reports to its callers. A source
//!   failure surfaces as [`ModelError::Stream`] from whichever call caused the
//!   next event to be read; the other variants are contract violations by the
//!   caller or broken invariants inside the model.
//!
//! None of these are retried. After a failure the nodes built so far remain
//! valid and navigable, but the builder that failed cannot be advanced again.

use std::fmt;

use crate::encoding::EncodingError;
use crate::tree::NodeId;

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The tokenizer found input that is not well-formed XML.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// The primary error message.
    pub message: String,
    /// Where in the source the error occurred.
    pub location: SourceLocation,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}

/// The cause of a stream failure: why an event source could not produce
/// the next event, or why a handler refused one.
#[derive(Debug)]
pub enum StreamError {
    /// The input is not well-formed.
    Parse(ParseError),
    /// The input bytes could not be decoded.
    Encoding(EncodingError),
    /// Reading the underlying input failed.
    Io(std::io::Error),
    /// The source was read after it had been closed.
    Closed,
    /// An event handler rejected an event.
    Handler(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Encoding(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Closed => write!(f, "event source is closed"),
            Self::Handler(msg) => write!(f, "event handler failed: {msg}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Encoding(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Closed | Self::Handler(_) => None,
        }
    }
}

impl From<ParseError> for StreamError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<EncodingError> for StreamError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors reported by the object model.
#[derive(Debug)]
pub enum ModelError {
    /// The event source failed while the model was reading from it.
    Stream(StreamError),
    /// The event sequence itself is unusable: more events were requested
    /// after the end of the document, or events arrived out of grammar.
    MalformedInput(String),
    /// The caller violated an API contract.
    IllegalUse(String),
    /// The serializer was used after it was closed.
    IllegalUseAfterClose,
    /// An invariant of the model itself was violated.
    InternalConsistency(String),
    /// The content of this node was discarded or streamed away and can no
    /// longer be navigated.
    NodeConsumed(NodeId),
}

impl ModelError {
    pub(crate) fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalUse(message.into())
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        Self::InternalConsistency(message.into())
    }

    /// Returns `true` if the error was caused by the event source.
    #[must_use]
    pub fn is_stream_failure(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "stream failure: {e}"),
            Self::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            Self::IllegalUse(msg) => write!(f, "illegal use: {msg}"),
            Self::IllegalUseAfterClose => write!(f, "illegal use: the reader has been closed"),
            Self::InternalConsistency(msg) => write!(f, "internal consistency error: {msg}"),
            Self::NodeConsumed(id) => {
                write!(f, "the content of node {} has been consumed", id.into_raw())
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for ModelError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<ParseError> for ModelError {
    fn from(e: ParseError) -> Self {
        Self::Stream(StreamError::Parse(e))
    }
}
