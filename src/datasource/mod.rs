//! Data sources behind sourced elements.
//!
//! A sourced element stores a [`DataSource`] instead of children. The source
//! is opened when the element is first navigated into (expansion) or when a
//! serializer includes it directly. Every source produces a complete event
//! stream whose root element stands for the sourced element itself.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::error::StreamError;
use crate::event::{EventSource, ReplaySource, XmlEvent};
use crate::parser::{ParseOptions, XmlTokenizer};

/// Opaque content that can be turned into events on demand.
pub trait DataSource: fmt::Debug {
    /// Opens a fresh event stream over the content.
    ///
    /// # Errors
    ///
    /// Returns `StreamError` if the content cannot be read, or if a
    /// destructive source has already been opened.
    fn open(&self) -> Result<Box<dyn EventSource>, StreamError>;

    /// Whether opening the source consumes it, so it can only be read once.
    fn is_destructive(&self) -> bool {
        false
    }
}

/// A source replaying events captured in memory.
///
/// Captured events are shared between every stream opened over them.
#[derive(Debug, Clone)]
pub struct CapturedSource {
    events: Rc<[XmlEvent]>,
}

impl CapturedSource {
    /// Wraps a complete event stream.
    #[must_use]
    pub fn new(events: Vec<XmlEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }

    /// The captured events.
    #[must_use]
    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }
}

impl DataSource for CapturedSource {
    fn open(&self) -> Result<Box<dyn EventSource>, StreamError> {
        Ok(Box::new(ReplaySource::new(self.events.iter().cloned())))
    }
}

/// A source holding XML text, tokenized each time it is opened.
#[derive(Debug, Clone)]
pub struct StringSource {
    xml: Rc<str>,
    options: ParseOptions,
}

impl StringSource {
    /// Wraps XML text, tokenized with default options.
    #[must_use]
    pub fn new(xml: &str) -> Self {
        Self::with_options(xml, ParseOptions::default())
    }

    /// Wraps XML text, tokenized with `options`.
    #[must_use]
    pub fn with_options(xml: &str, options: ParseOptions) -> Self {
        Self {
            xml: xml.into(),
            options,
        }
    }
}

impl DataSource for StringSource {
    fn open(&self) -> Result<Box<dyn EventSource>, StreamError> {
        Ok(Box::new(XmlTokenizer::new(&*self.xml, &self.options)))
    }
}

/// A source wrapping a live event stream. It can be opened only once.
pub struct StreamSource {
    stream: RefCell<Option<Box<dyn EventSource>>>,
}

impl StreamSource {
    /// Wraps `stream`.
    pub fn new<S: EventSource + 'static>(stream: S) -> Self {
        Self {
            stream: RefCell::new(Some(Box::new(stream))),
        }
    }

    /// Whether the stream has already been handed out.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.stream.borrow().is_none()
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

impl DataSource for StreamSource {
    fn open(&self) -> Result<Box<dyn EventSource>, StreamError> {
        let stream = self.stream.borrow_mut().take();
        match stream {
            Some(stream) => {
                debug!("stream source handed out");
                Ok(stream)
            }
            None => Err(StreamError::Closed),
        }
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// Wraps a data source so it can be shared by several sourced elements.
#[must_use]
pub fn shared<D: DataSource + 'static>(source: D) -> Rc<dyn DataSource> {
    Rc::new(source)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::{pump, EventRecorder};
    use pretty_assertions::assert_eq;

    fn drain(source: &dyn DataSource) -> Vec<XmlEvent> {
        let mut stream = source.open().unwrap();
        let mut recorder = EventRecorder::new();
        pump(&mut *stream, &mut recorder).unwrap();
        recorder.into_events()
    }

    #[test]
    fn test_captured_source_reopens() {
        let events = vec![
            XmlEvent::start_document(),
            XmlEvent::start_element("", "x", ""),
            XmlEvent::AttributesCompleted,
            XmlEvent::EndElement,
            XmlEvent::Completed,
        ];
        let source = CapturedSource::new(events.clone());
        assert_eq!(drain(&source), events);
        assert_eq!(drain(&source), events);
        assert!(!source.is_destructive());
    }

    #[test]
    fn test_string_source_tokenizes() {
        let source = StringSource::new("<x a='1'>t</x>");
        let events = drain(&source);
        assert_eq!(events[1], XmlEvent::start_element("", "x", ""));
        assert_eq!(events[2], XmlEvent::attribute("a", "1"));
        assert_eq!(events.len(), 7);
    }

    #[test]
    fn test_stream_source_is_destructive() {
        let source = StreamSource::new(ReplaySource::new(vec![XmlEvent::start_document(), XmlEvent::Completed]));
        assert!(source.is_destructive());
        assert!(!source.is_consumed());
        assert_eq!(drain(&source).len(), 2);
        assert!(source.is_consumed());
        assert!(matches!(source.open(), Err(StreamError::Closed)));
    }
}
