//! Builder lifecycle tests: custom builders, sourced elements, streaming
//! content to handlers, restructuring trees under construction, and error
//! propagation.

#![allow(clippy::unwrap_used)]

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use xmlaxon::builder::{BuilderOptions, CapturingBuilder};
use xmlaxon::datasource::{shared, StringSource};
use xmlaxon::event::{CountingSource, EventKind, EventRecorder};
use xmlaxon::parser::{ParseOptions, XmlTokenizer};
use xmlaxon::serial::{SerializerMode, SerializerOptions};
use xmlaxon::{ContainerState, Document, ModelError, StreamError, XmlEvent, XmlHandler};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records events into a vector the test keeps a handle on.
#[derive(Clone, Default)]
struct SharedRecorder(Rc<RefCell<Vec<XmlEvent>>>);

impl XmlHandler for SharedRecorder {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        self.0.borrow_mut().push(event);
        Ok(())
    }
}

/// Refuses every event.
struct Refusing;

impl XmlHandler for Refusing {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        Err(StreamError::Handler(format!("refused {}", event.kind())))
    }
}

const ENVELOPE: &str = "<env><header>h</header><body a=\"1\"><x>1</x><y>2</y></body><trailer/></env>";

// ---------------------------------------------------------------------------
// Custom builders
// ---------------------------------------------------------------------------

#[test]
fn test_custom_builder_turns_element_into_sourced_element() {
    let mut doc = Document::parse_str(ENVELOPE);
    doc.register_custom_builder(Rc::new(CapturingBuilder::new("", "body").at_depth(2)));
    let root = doc.root();
    doc.build(root).unwrap();

    let env = doc.document_element(false).unwrap().unwrap();
    let children = doc.children(env).unwrap();
    assert_eq!(children.len(), 3);
    let body = children[1];
    assert!(doc.node(body).is_sourced());
    assert_eq!(doc.state(body), Some(ContainerState::Incomplete));
    assert_eq!(doc.first_built_child(body), None);
    // The start tag stays on the node.
    assert_eq!(doc.attribute_value(body, "", "a").unwrap().as_deref(), Some("1"));

    // Navigating into it expands the captured content.
    assert_eq!(doc.text_content(body).unwrap(), "12");
    assert!(!doc.node(body).is_sourced());
    assert!(doc.is_complete(body));
    assert_eq!(doc.attributes(body).unwrap().len(), 1);
}

#[test]
fn test_custom_builder_output_serializes_like_the_input() {
    let mut plain = Document::parse_str(ENVELOPE);
    let plain_root = plain.root();
    let expected = plain.write_xml(plain_root, SerializerOptions::default()).unwrap();

    for cache in [true, false] {
        let mut doc = Document::parse_str(ENVELOPE);
        doc.register_custom_builder(Rc::new(CapturingBuilder::new("", "body")));
        let root = doc.root();
        doc.build(root).unwrap();
        let xml = doc.write_xml(root, SerializerOptions::default().cache(cache)).unwrap();
        assert_eq!(xml, expected);
    }
}

#[test]
fn test_custom_builder_ignores_other_depths() {
    let mut doc = Document::parse_str("<body><body>inner</body></body>");
    doc.register_custom_builder(Rc::new(CapturingBuilder::new("", "body").at_depth(2)));
    let outer = doc.document_element(false).unwrap().unwrap();
    doc.build(outer).unwrap();
    assert!(!doc.node(outer).is_sourced());
    let inner = doc.first_child(outer).unwrap().unwrap();
    assert!(doc.node(inner).is_sourced());
}

// ---------------------------------------------------------------------------
// Sourced elements
// ---------------------------------------------------------------------------

#[test]
fn test_sourced_element_in_a_parsed_tree() {
    let mut doc = Document::parse_str("<r><slot/></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    let slot = doc.first_child(r).unwrap().unwrap();
    let source = shared(StringSource::new("<part n='1'><q>x</q></part>"));
    let part = doc.create_sourced_element("", "part", "", source);
    doc.replace_with(slot, part).unwrap();

    let include = SerializerOptions::default().include_sources(true);
    let mut serializer = doc.pull_serializer(r, include).unwrap();
    let mut included = false;
    let mut recorder = EventRecorder::new();
    while serializer.has_next().unwrap() {
        let event = serializer.next().unwrap().clone();
        included |= serializer.mode() == SerializerMode::Include;
        recorder.handle(event).unwrap();
    }
    drop(serializer);
    assert!(included);
    assert!(doc.node(part).is_sourced());

    let kinds: Vec<EventKind> = recorder.events().iter().map(XmlEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::StartDocument,
            EventKind::StartElement,
            EventKind::AttributesCompleted,
            EventKind::StartElement,
            EventKind::Attribute,
            EventKind::AttributesCompleted,
            EventKind::StartElement,
            EventKind::AttributesCompleted,
            EventKind::CharacterData,
            EventKind::EndElement,
            EventKind::EndElement,
            EventKind::EndElement,
            EventKind::Completed,
        ]
    );

    // Serializing again with caching expands it.
    let xml = doc.write_xml(r, SerializerOptions::default()).unwrap();
    assert_eq!(xml, r#"<r><part n="1"><q>x</q></part></r>"#);
    assert!(!doc.node(part).is_sourced());
}

#[test]
fn test_sourced_element_with_wrong_root_fails_on_expansion() {
    let mut doc = Document::new();
    let source = shared(StringSource::new("<other/>"));
    let part = doc.create_sourced_element("", "part", "", source);
    let err = doc.first_child(part).unwrap_err();
    assert!(matches!(err, ModelError::MalformedInput(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Streaming to a handler
// ---------------------------------------------------------------------------

#[test]
fn test_stream_children_to_handler() {
    let (source, stats) = CountingSource::new(XmlTokenizer::new(
        "<r><a>keep</a><b>x</b><c/></r><!-- after -->",
        &ParseOptions::default(),
    ));
    let mut doc = Document::from_source(source, BuilderOptions::default());
    let r = doc.document_element(false).unwrap().unwrap();
    let a = doc.first_child(r).unwrap().unwrap();
    doc.build(a).unwrap();

    let recorder = SharedRecorder::default();
    doc.stream_children_to(r, Box::new(recorder.clone())).unwrap();
    let events = recorder.0.borrow().clone();
    assert_eq!(events.first(), Some(&XmlEvent::start_element("", "b", "")));
    assert_eq!(events.last(), Some(&XmlEvent::EndElement));
    assert_eq!(events.len(), 8);

    assert_eq!(doc.state(r), Some(ContainerState::Discarded));
    assert_eq!(doc.first_built_child(r), Some(a));
    assert_eq!(doc.next_sibling_if_available(a), None);
    // The document itself goes on building after the streamed element.
    let root = doc.root();
    doc.build(root).unwrap();
    assert!(stats.is_closed());
    let comment = doc.next_sibling(r).unwrap().unwrap();
    assert_eq!(doc.text_content(comment).unwrap(), " after ");
}

#[test]
fn test_stream_children_to_refusing_handler() {
    let mut doc = Document::parse_str("<r><a/></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    let err = doc.stream_children_to(r, Box::new(Refusing)).unwrap_err();
    assert!(matches!(err, ModelError::Stream(StreamError::Handler(_))), "{err}");
}

// ---------------------------------------------------------------------------
// Restructuring trees under construction
// ---------------------------------------------------------------------------

#[test]
fn test_detach_incomplete_element_then_keep_navigating() {
    let mut doc = Document::parse_str("<r><a><deep><deeper/></deep></a><b/></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    let a = doc.first_child(r).unwrap().unwrap();
    assert!(!doc.is_complete(a));
    doc.detach(a).unwrap();
    assert!(doc.is_complete(a));
    assert_eq!(doc.parent(a), None);
    assert_eq!(doc.children(a).unwrap().len(), 1);

    let b = doc.first_child(r).unwrap().unwrap();
    assert_eq!(doc.local_name(b), Some("b"));
    assert_eq!(doc.write_xml(r, SerializerOptions::default()).unwrap(), "<r><b/></r>");
}

#[test]
fn test_move_children_of_incomplete_element() {
    let mut doc = Document::parse_str("<r><from><x/><y/><z/></from></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    let from = doc.first_child(r).unwrap().unwrap();
    doc.first_child(from).unwrap();

    let to = doc.create_element("", "to", "");
    doc.move_children(from, to).unwrap();
    assert!(doc.is_complete(from));
    assert_eq!(doc.first_built_child(from), None);
    // The rest of <from>'s content arrives under <to>.
    let names: Vec<String> = doc
        .children(to)
        .unwrap()
        .into_iter()
        .map(|c| doc.local_name(c).unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["x", "y", "z"]);
    assert_eq!(doc.write_xml(r, SerializerOptions::default()).unwrap(), "<r><from/></r>");
}

#[test]
fn test_clone_of_incomplete_subtree_is_independent() {
    let mut doc = Document::parse_str("<r><a k='v'>t<b/></a></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    let a = doc.first_child(r).unwrap().unwrap();
    let copy = doc.clone_node(a, true).unwrap();
    assert!(doc.is_complete(a));
    assert!(doc.is_complete(copy));
    assert_eq!(doc.parent(copy), None);
    assert_eq!(doc.builder_of(copy), None);
    assert_eq!(
        doc.write_xml(copy, SerializerOptions::default()).unwrap(),
        doc.write_xml(a, SerializerOptions::default()).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn test_stream_failure_keeps_built_nodes() {
    let mut doc = Document::parse_str("<r><a>ok</a><b></c></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    let a = doc.first_child(r).unwrap().unwrap();
    assert_eq!(doc.text_content(a).unwrap(), "ok");

    let err = doc.build(r).unwrap_err();
    assert!(matches!(err, ModelError::Stream(StreamError::Parse(_))), "{err}");
    assert!(err.is_stream_failure());
    let again = doc.build(r).unwrap_err();
    assert!(matches!(again, ModelError::IllegalUse(_)), "{again}");

    assert_eq!(doc.local_name(a), Some("a"));
    assert_eq!(doc.text_content(a).unwrap(), "ok");
}

#[test]
fn test_consume_after_completion_is_malformed() {
    let mut doc = Document::parse_str("<a/>");
    let root = doc.root();
    doc.build(root).unwrap();
    let err = doc.consume_next_event().unwrap_err();
    assert!(matches!(err, ModelError::MalformedInput(_)), "{err}");
}

#[test]
fn test_consume_without_source_is_malformed() {
    let mut doc = Document::new();
    assert!(matches!(doc.consume_next_event(), Err(ModelError::MalformedInput(_))));
}

#[test]
fn test_serializer_reports_stream_failure() {
    let mut doc = Document::parse_str("<r><a/><b></r>");
    let root = doc.root();
    let mut serializer = doc
        .pull_serializer(root, SerializerOptions::default().cache(false))
        .unwrap();
    let mut failure = None;
    while serializer.has_next().unwrap() {
        if let Err(e) = serializer.next() {
            failure = Some(e);
            break;
        }
    }
    let failure = failure.unwrap();
    assert!(failure.is_stream_failure(), "{failure}");
}

#[test]
fn test_navigation_of_consumed_content() {
    let mut doc = Document::parse_str("<r><a/><b/></r>");
    let r = doc.document_element(false).unwrap().unwrap();
    doc.write_xml(r, SerializerOptions::default().cache(false)).unwrap();
    assert_eq!(doc.state(r), Some(ContainerState::Discarded));
    assert!(matches!(doc.first_child(r), Err(ModelError::NodeConsumed(n)) if n == r));
}
