//! The event vocabulary shared by sources, the builder and the serializer.
//!
//! Every producer of XML structure in this crate speaks the same closed set
//! of [`XmlEvent`]s: the text tokenizer, recorded event lists, data sources
//! behind sourced elements, the builder when it relays a pass-through region,
//! and the [`PullSerializer`](crate::serial::PullSerializer) when it replays a
//! tree. A well-formed stream has this shape:
//!
//! ```text
//! StartDocument
//!   (DocumentTypeDeclaration | comment | PI)*
//!   StartElement (Attribute | NamespaceDeclaration)* AttributesCompleted
//!     (CharacterData | EntityReference | element | comment | PI | CDATA)*
//!   EndElement
//!   (comment | PI)*
//! Completed
//! ```
//!
//! where a comment is `StartComment CharacterData* EndComment`, a PI is
//! `StartProcessingInstruction CharacterData* EndProcessingInstruction` and
//! a CDATA section is `StartCData CharacterData* EndCData`.
//!
//! Sources are pulled through [`EventSource`]; sinks are pushed to through
//! [`XmlHandler`].

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;

mod binary;

pub use binary::BinaryData;

/// Character data carried by a [`XmlEvent::CharacterData`] event or stored
/// in a text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextContent {
    /// Plain text.
    Text(String),
    /// An opaque binary payload, rendered as base64 when read as text.
    Binary(BinaryData),
}

impl TextContent {
    /// Returns the content as text. Binary content is base64 encoded.
    #[must_use]
    pub fn to_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Text(s) => std::borrow::Cow::Borrowed(s),
            Self::Binary(b) => std::borrow::Cow::Owned(b.to_base64()),
        }
    }

    /// Returns the binary payload, if this content is binary.
    #[must_use]
    pub fn as_binary(&self) -> Option<&BinaryData> {
        match self {
            Self::Binary(b) => Some(b),
            Self::Text(_) => None,
        }
    }

    /// Returns `true` if this is plain text made only of XML whitespace.
    #[must_use]
    pub fn is_whitespace(&self) -> bool {
        match self {
            Self::Text(s) => s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')),
            Self::Binary(_) => false,
        }
    }
}

impl From<&str> for TextContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for TextContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A single structural XML event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// Start of the document. Always the first event of a stream.
    StartDocument {
        /// Encoding the input was actually decoded from.
        input_encoding: Option<String>,
        /// Version from the XML declaration.
        xml_version: Option<String>,
        /// Encoding from the XML declaration.
        xml_encoding: Option<String>,
        /// Standalone flag from the XML declaration.
        standalone: Option<bool>,
    },
    /// A `<!DOCTYPE ...>` declaration.
    DocumentTypeDeclaration {
        /// Name of the root element the DTD declares.
        root_name: String,
        /// Public identifier, if any.
        public_id: Option<String>,
        /// System identifier, if any.
        system_id: Option<String>,
        /// Raw text of the internal subset, if any.
        internal_subset: Option<String>,
    },
    /// Start of an element. Followed by its attributes and namespace
    /// declarations and then [`XmlEvent::AttributesCompleted`].
    StartElement {
        /// Namespace URI, empty if none.
        namespace_uri: String,
        /// Local part of the name.
        local_name: String,
        /// Prefix, empty if none.
        prefix: String,
    },
    /// An attribute of the element just started.
    Attribute {
        /// Namespace URI, empty if none.
        namespace_uri: String,
        /// Local part of the name.
        local_name: String,
        /// Prefix, empty if none.
        prefix: String,
        /// Normalized value.
        value: String,
        /// DTD attribute type (`CDATA` when undeclared).
        attr_type: String,
        /// `false` if the value was defaulted from a DTD.
        specified: bool,
    },
    /// An `xmlns` or `xmlns:prefix` declaration on the element just started.
    NamespaceDeclaration {
        /// Declared prefix, empty for the default namespace.
        prefix: String,
        /// Bound namespace URI, empty to undeclare the default namespace.
        namespace_uri: String,
    },
    /// All attributes of the current element have been reported.
    AttributesCompleted,
    /// Text, either element content or the content of a comment, PI or
    /// CDATA section.
    CharacterData {
        /// The data.
        data: TextContent,
        /// Whether the text is ignorable whitespace.
        ignorable: bool,
    },
    /// Start of a processing instruction.
    StartProcessingInstruction {
        /// The PI target.
        target: String,
    },
    /// End of a processing instruction.
    EndProcessingInstruction,
    /// Start of a comment.
    StartComment,
    /// End of a comment.
    EndComment,
    /// Start of a CDATA section.
    StartCData,
    /// End of a CDATA section.
    EndCData,
    /// An entity reference that was not expanded.
    EntityReference {
        /// Entity name.
        name: String,
        /// Replacement text, if known.
        replacement_text: Option<String>,
    },
    /// End of the current element.
    EndElement,
    /// End of the document. Always the last event of a stream.
    Completed,
}

/// The type of an event, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StartDocument,
    DocumentTypeDeclaration,
    StartElement,
    Attribute,
    NamespaceDeclaration,
    AttributesCompleted,
    CharacterData,
    StartProcessingInstruction,
    EndProcessingInstruction,
    StartComment,
    EndComment,
    StartCData,
    EndCData,
    EntityReference,
    EndElement,
    Completed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartDocument => "START_DOCUMENT",
            Self::DocumentTypeDeclaration => "DTD",
            Self::StartElement => "START_ELEMENT",
            Self::Attribute => "ATTRIBUTE",
            Self::NamespaceDeclaration => "NAMESPACE",
            Self::AttributesCompleted => "ATTRIBUTES_COMPLETED",
            Self::CharacterData => "CHARACTERS",
            Self::StartProcessingInstruction => "START_PROCESSING_INSTRUCTION",
            Self::EndProcessingInstruction => "END_PROCESSING_INSTRUCTION",
            Self::StartComment => "START_COMMENT",
            Self::EndComment => "END_COMMENT",
            Self::StartCData => "START_CDATA",
            Self::EndCData => "END_CDATA",
            Self::EntityReference => "ENTITY_REFERENCE",
            Self::EndElement => "END_ELEMENT",
            Self::Completed => "END_DOCUMENT",
        };
        f.write_str(name)
    }
}

impl XmlEvent {
    /// Creates a `StartElement` event.
    #[must_use]
    pub fn start_element(namespace_uri: &str, local_name: &str, prefix: &str) -> Self {
        Self::StartElement {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Creates a specified `CDATA`-typed attribute event with no namespace.
    #[must_use]
    pub fn attribute(local_name: &str, value: &str) -> Self {
        Self::Attribute {
            namespace_uri: String::new(),
            local_name: local_name.to_string(),
            prefix: String::new(),
            value: value.to_string(),
            attr_type: "CDATA".to_string(),
            specified: true,
        }
    }

    /// Creates a non-ignorable `CharacterData` event.
    #[must_use]
    pub fn text(data: &str) -> Self {
        Self::CharacterData {
            data: TextContent::Text(data.to_string()),
            ignorable: false,
        }
    }

    /// Creates a `StartDocument` event with no declaration information.
    #[must_use]
    pub fn start_document() -> Self {
        Self::StartDocument {
            input_encoding: None,
            xml_version: None,
            xml_encoding: None,
            standalone: None,
        }
    }

    /// Returns the type of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StartDocument { .. } => EventKind::StartDocument,
            Self::DocumentTypeDeclaration { .. } => EventKind::DocumentTypeDeclaration,
            Self::StartElement { .. } => EventKind::StartElement,
            Self::Attribute { .. } => EventKind::Attribute,
            Self::NamespaceDeclaration { .. } => EventKind::NamespaceDeclaration,
            Self::AttributesCompleted => EventKind::AttributesCompleted,
            Self::CharacterData { .. } => EventKind::CharacterData,
            Self::StartProcessingInstruction { .. } => EventKind::StartProcessingInstruction,
            Self::EndProcessingInstruction => EventKind::EndProcessingInstruction,
            Self::StartComment => EventKind::StartComment,
            Self::EndComment => EventKind::EndComment,
            Self::StartCData => EventKind::StartCData,
            Self::EndCData => EventKind::EndCData,
            Self::EntityReference { .. } => EventKind::EntityReference,
            Self::EndElement => EventKind::EndElement,
            Self::Completed => EventKind::Completed,
        }
    }

    /// Returns `+1` for events that open a nesting level (element, comment,
    /// PI and CDATA starts), `-1` for the matching end events and `0`
    /// otherwise. Document start and end are not counted.
    #[must_use]
    pub fn depth_delta(&self) -> i32 {
        match self {
            Self::StartElement { .. }
            | Self::StartComment
            | Self::StartProcessingInstruction { .. }
            | Self::StartCData => 1,
            Self::EndElement
            | Self::EndComment
            | Self::EndProcessingInstruction
            | Self::EndCData => -1,
            _ => 0,
        }
    }
}

/// A push-style consumer of events.
pub trait XmlHandler {
    /// Receives the next event.
    ///
    /// # Errors
    ///
    /// Returns `StreamError` if the handler cannot accept the event.
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError>;
}

impl<H: XmlHandler + ?Sized> XmlHandler for &mut H {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        (**self).handle(event)
    }
}

impl<H: XmlHandler + ?Sized> XmlHandler for Box<H> {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        (**self).handle(event)
    }
}

/// A pull-style, forward-only producer of events.
///
/// A source emits each event exactly once, ending with
/// [`XmlEvent::Completed`]. Reading past `Completed` or after [`close`]
/// returns [`StreamError::Closed`].
///
/// [`close`]: EventSource::close
pub trait EventSource {
    /// Returns the next event.
    ///
    /// # Errors
    ///
    /// Returns `StreamError` if the input is malformed, cannot be read, or
    /// the source is exhausted or closed.
    fn next_event(&mut self) -> Result<XmlEvent, StreamError>;

    /// Releases the underlying input. Further reads fail. Closing twice is
    /// a no-op.
    fn close(&mut self);
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_event(&mut self) -> Result<XmlEvent, StreamError> {
        (**self).next_event()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Pulls every event from `source` into `handler`, up to and including
/// [`XmlEvent::Completed`].
///
/// # Errors
///
/// Returns the first error reported by either side.
pub fn pump(source: &mut dyn EventSource, handler: &mut dyn XmlHandler) -> Result<(), StreamError> {
    loop {
        let event = source.next_event()?;
        let done = matches!(event, XmlEvent::Completed);
        handler.handle(event)?;
        if done {
            return Ok(());
        }
    }
}

/// A handler that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl XmlHandler for NullHandler {
    fn handle(&mut self, _event: XmlEvent) -> Result<(), StreamError> {
        Ok(())
    }
}

/// A handler that records every event it receives.
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    events: Vec<XmlEvent>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded so far.
    #[must_use]
    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    /// Consumes the recorder, returning its events.
    #[must_use]
    pub fn into_events(self) -> Vec<XmlEvent> {
        self.events
    }
}

impl XmlHandler for EventRecorder {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        self.events.push(event);
        Ok(())
    }
}

/// A source that replays a fixed list of events.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    events: VecDeque<XmlEvent>,
    closed: bool,
}

impl ReplaySource {
    /// Creates a source replaying `events` in order.
    pub fn new(events: impl IntoIterator<Item = XmlEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            closed: false,
        }
    }

    /// Number of events not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ReplaySource {
    fn next_event(&mut self) -> Result<XmlEvent, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.events.pop_front().ok_or_else(|| {
            StreamError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "event list ended before the document was completed",
            ))
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.events.clear();
    }
}

/// Counters observed by a [`CountingSource`], shared with the caller so they
/// remain readable after the source has been handed to a builder.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    pulled: Rc<Cell<usize>>,
    closed: Rc<Cell<bool>>,
}

impl SourceStats {
    /// Number of events successfully pulled so far.
    #[must_use]
    pub fn pulled(&self) -> usize {
        self.pulled.get()
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Wraps a source and counts how many events are pulled from it.
#[derive(Debug)]
pub struct CountingSource<S> {
    inner: S,
    stats: SourceStats,
}

impl<S: EventSource> CountingSource<S> {
    /// Wraps `inner`, returning the wrapper and a handle on its counters.
    pub fn new(inner: S) -> (Self, SourceStats) {
        let stats = SourceStats::default();
        (
            Self {
                inner,
                stats: stats.clone(),
            },
            stats,
        )
    }
}

impl<S: EventSource> EventSource for CountingSource<S> {
    fn next_event(&mut self) -> Result<XmlEvent, StreamError> {
        let event = self.inner.next_event()?;
        self.stats.pulled.set(self.stats.pulled.get() + 1);
        Ok(event)
    }

    fn close(&mut self) {
        self.stats.closed.set(true);
        self.inner.close();
    }
}
