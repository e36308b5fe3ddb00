//! End-to-end checks of the object model's core guarantees: document order
//! round-trips, lazy and eager serialization agree, deferred text is
//! invisible, completed subtrees never read again, and discarding releases
//! the source.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use xmlaxon::builder::BuilderOptions;
use xmlaxon::event::{CountingSource, EventRecorder, ReplaySource, SourceStats};
use xmlaxon::parser::{ParseOptions, XmlTokenizer};
use xmlaxon::serial::{SerializerMode, SerializerOptions};
use xmlaxon::{ContainerState, Document, NodeId, NodeType, XmlEvent};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn counted(xml: &str, options: BuilderOptions) -> (Document, SourceStats) {
    let (source, stats) = CountingSource::new(XmlTokenizer::new(xml, &ParseOptions::default()));
    (Document::from_source(source, options), stats)
}

fn serialize(doc: &mut Document, node: NodeId, options: SerializerOptions) -> Vec<XmlEvent> {
    let mut recorder = EventRecorder::new();
    doc.pull_serializer(node, options)
        .unwrap()
        .pump_to(&mut recorder)
        .unwrap();
    recorder.into_events()
}

fn eager_events(xml: &str) -> Vec<XmlEvent> {
    let mut doc = Document::parse_str(xml);
    let root = doc.root();
    doc.build(root).unwrap();
    serialize(&mut doc, root, SerializerOptions::default())
}

/// A document using every construct of the event vocabulary.
fn rich_events() -> Vec<XmlEvent> {
    vec![
        XmlEvent::StartDocument {
            input_encoding: Some("UTF-8".to_string()),
            xml_version: Some("1.0".to_string()),
            xml_encoding: None,
            standalone: Some(true),
        },
        XmlEvent::DocumentTypeDeclaration {
            root_name: "r".to_string(),
            public_id: None,
            system_id: Some("r.dtd".to_string()),
            internal_subset: None,
        },
        XmlEvent::StartComment,
        XmlEvent::text(" prolog "),
        XmlEvent::EndComment,
        XmlEvent::start_element("urn:r", "r", "p"),
        XmlEvent::NamespaceDeclaration {
            prefix: "p".to_string(),
            namespace_uri: "urn:r".to_string(),
        },
        XmlEvent::attribute("id", "1"),
        XmlEvent::AttributesCompleted,
        XmlEvent::text("a"),
        XmlEvent::start_element("", "b", ""),
        XmlEvent::AttributesCompleted,
        XmlEvent::StartCData,
        XmlEvent::text("x<y"),
        XmlEvent::EndCData,
        XmlEvent::EndElement,
        XmlEvent::StartProcessingInstruction {
            target: "pi".to_string(),
        },
        XmlEvent::text("data"),
        XmlEvent::EndProcessingInstruction,
        XmlEvent::EntityReference {
            name: "ent".to_string(),
            replacement_text: Some("E".to_string()),
        },
        XmlEvent::start_element("", "e", ""),
        XmlEvent::AttributesCompleted,
        XmlEvent::EndElement,
        XmlEvent::text("tail"),
        XmlEvent::EndElement,
        XmlEvent::Completed,
    ]
}

const CATALOG: &str = "<?xml version=\"1.0\"?>\n\
    <!-- catalog -->\n\
    <catalog xmlns=\"urn:c\" xmlns:x=\"urn:x\" version=\"2\">\n\
      <book id=\"1\"><title>First</title><x:note>a &amp; b</x:note></book>\n\
      <book id=\"2\"><title>Second</title><![CDATA[<raw>]]></book>\n\
      <?render fast?>\n\
      <book id=\"3\"><title>Third</title>tail text</book>\n\
    </catalog>\n";

// ---------------------------------------------------------------------------
// Order preservation
// ---------------------------------------------------------------------------

#[test]
fn test_built_tree_replays_its_events() {
    for options in [BuilderOptions::default(), BuilderOptions::default().defer_text(false)] {
        let mut doc = Document::from_source(ReplaySource::new(rich_events()), options);
        let root = doc.root();
        doc.build(root).unwrap();
        assert_eq!(serialize(&mut doc, root, SerializerOptions::default()), rich_events());
    }
}

#[test]
fn test_pull_through_replays_source_events() {
    let mut doc = Document::from_source(ReplaySource::new(rich_events()), BuilderOptions::default());
    let root = doc.root();
    let events = serialize(&mut doc, root, SerializerOptions::default().cache(false));
    assert_eq!(events, rich_events());
}

// ---------------------------------------------------------------------------
// Lazy equivalence
// ---------------------------------------------------------------------------

#[test]
fn test_pull_through_matches_eager_serialization() {
    let mut lazy = Document::parse_str(CATALOG);
    let root = lazy.root();
    let events = serialize(&mut lazy, root, SerializerOptions::default().cache(false));
    assert_eq!(events, eager_events(CATALOG));
    // Nothing below the document node was materialized.
    assert_eq!(lazy.first_built_child(root), None);
}

#[test]
fn test_caching_serialization_matches_eager_serialization() {
    let mut lazy = Document::parse_str(CATALOG);
    let root = lazy.root();
    let events = serialize(&mut lazy, root, SerializerOptions::default());
    assert_eq!(events, eager_events(CATALOG));
    assert!(lazy.is_complete(root));
}

#[test]
fn test_lazy_equivalence_of_written_text() {
    let mut lazy = Document::parse_str(CATALOG);
    let mut eager = Document::parse_str(CATALOG);
    let (lazy_root, eager_root) = (lazy.root(), eager.root());
    eager.build(eager_root).unwrap();
    let lazy_xml = lazy
        .write_xml(lazy_root, SerializerOptions::default().cache(false))
        .unwrap();
    let eager_xml = eager.write_xml(eager_root, SerializerOptions::default()).unwrap();
    assert_eq!(lazy_xml, eager_xml);
    assert!(lazy_xml.starts_with("<!-- catalog --><catalog"), "{lazy_xml}");
}

// ---------------------------------------------------------------------------
// Deferred text
// ---------------------------------------------------------------------------

#[test]
fn test_deferred_text_looks_like_a_text_node() {
    for options in [BuilderOptions::default(), BuilderOptions::default().defer_text(false)] {
        let mut doc = Document::parse_str_with_options("<a>hello</a>", &ParseOptions::default(), options);
        let a = doc.document_element(false).unwrap().unwrap();
        let text = doc.first_child(a).unwrap().unwrap();
        assert_eq!(doc.node_type(text), NodeType::CharacterData);
        assert!(doc.node(text).kind.is_text());
        assert_eq!(doc.text(text), Some("hello"));
        assert_eq!(doc.parent(text), Some(a));
        assert_eq!(doc.next_sibling(text).unwrap(), None);
        assert_eq!(doc.last_child(a).unwrap(), Some(text));
    }
}

// ---------------------------------------------------------------------------
// Idempotent completion
// ---------------------------------------------------------------------------

#[test]
fn test_no_reads_after_completion() {
    let (mut doc, stats) = counted("<a><b>x</b><c/></a>", BuilderOptions::default());
    let root = doc.root();
    doc.build(root).unwrap();
    let pulled = stats.pulled();
    assert!(stats.is_closed());

    let a = doc.document_element(false).unwrap().unwrap();
    assert!(doc.is_complete(a));
    let b = doc.first_child(a).unwrap().unwrap();
    doc.first_child(a).unwrap();
    doc.next_sibling(b).unwrap();
    doc.text_content(a).unwrap();
    serialize(&mut doc, root, SerializerOptions::default());
    serialize(&mut doc, root, SerializerOptions::default().cache(false));
    assert_eq!(stats.pulled(), pulled);
}

// ---------------------------------------------------------------------------
// Active-region cancellation
// ---------------------------------------------------------------------------

#[test]
fn test_discarding_root_closes_source() {
    let body: String = (0..100).map(|i| format!("<item>{i}</item>")).collect();
    let xml = format!("<list>{body}</list>");
    let (mut doc, stats) = counted(&xml, BuilderOptions::default());
    let list = doc.document_element(false).unwrap().unwrap();
    let first = doc.first_child(list).unwrap().unwrap();
    assert_eq!(doc.text_content(first).unwrap(), "0");
    let pulled = stats.pulled();
    assert!(!stats.is_closed());

    let root = doc.root();
    doc.discard(root).unwrap();
    assert!(stats.is_closed());
    assert_eq!(stats.pulled(), pulled);
    assert!(doc.next_sibling(first).is_err());
}

#[test]
fn test_draining_on_release_reads_to_the_end() {
    let (mut doc, stats) = counted("<a><b/><c/><d/></a>", BuilderOptions::default().drain_on_release(true));
    let a = doc.document_element(false).unwrap().unwrap();
    doc.first_child(a).unwrap();
    let root = doc.root();
    doc.discard(root).unwrap();
    // StartDocument, 4 start tags with their completions, 4 ends, Completed.
    assert_eq!(stats.pulled(), 14);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_build_then_serialize() {
    let mut doc = Document::parse_str(r#"<root><child attr="v">text</child></root>"#);
    let root = doc.root();
    doc.build(root).unwrap();
    let events = serialize(&mut doc, root, SerializerOptions::default());
    assert_eq!(
        events,
        vec![
            XmlEvent::start_document(),
            XmlEvent::start_element("", "root", ""),
            XmlEvent::AttributesCompleted,
            XmlEvent::start_element("", "child", ""),
            XmlEvent::attribute("attr", "v"),
            XmlEvent::AttributesCompleted,
            XmlEvent::text("text"),
            XmlEvent::EndElement,
            XmlEvent::EndElement,
            XmlEvent::Completed,
        ]
    );
}

#[test]
fn test_scenario_document_element_with_discard() {
    let (mut doc, stats) = counted("<root><a/><b/></root>", BuilderOptions::default());
    let element = doc.document_element(true).unwrap().unwrap();
    assert_eq!(doc.parent(element), None);
    assert_eq!(doc.first_built_child(doc.root()), None);
    assert!(doc.is_complete(element));
    assert_eq!(doc.children(element).unwrap().len(), 2);
    assert!(stats.is_closed());
}

#[test]
fn test_scenario_first_child_stops_at_comment() {
    let (mut doc, stats) = counted("<a><!--c--><b/></a>", BuilderOptions::default());
    let a = doc.document_element(false).unwrap().unwrap();
    let comment = doc.first_child(a).unwrap().unwrap();
    assert_eq!(doc.node_type(comment), NodeType::Comment);
    assert_eq!(doc.text_content(comment).unwrap(), "c");
    // <b/> has not been read.
    assert_eq!(doc.next_sibling_if_available(comment), None);
    assert_eq!(doc.state(a), Some(ContainerState::Incomplete));
    let pulled = stats.pulled();

    let b = doc.next_sibling(comment).unwrap().unwrap();
    assert_eq!(doc.local_name(b), Some("b"));
    assert!(stats.pulled() > pulled);
}

#[test]
fn test_scenario_navigator_to_pull_through_boundary() {
    let mut doc = Document::parse_str(CATALOG);
    let catalog = doc.document_element(false).unwrap().unwrap();
    // A prior consumer builds the first book completely and reaches into
    // the second one.
    let first = doc.first_child_element(catalog).unwrap().unwrap();
    doc.build(first).unwrap();
    let second = doc.next_sibling_element(first).unwrap().unwrap();
    let title = doc.first_child(second).unwrap().unwrap();
    doc.build(title).unwrap();

    let root = doc.root();
    let mut serializer = doc
        .pull_serializer(root, SerializerOptions::default().cache(false))
        .unwrap();
    let mut events = Vec::new();
    let mut modes = Vec::new();
    while serializer.has_next().unwrap() {
        events.push(serializer.next().unwrap().clone());
        modes.push(serializer.mode());
    }
    drop(serializer);

    assert_eq!(events, eager_events(CATALOG));
    let switched = modes
        .windows(2)
        .filter(|w| w[0] == SerializerMode::Navigator && w[1] == SerializerMode::PullThrough)
        .count();
    assert!(switched >= 1, "{modes:?}");
    assert_eq!(doc.state(second), Some(ContainerState::Discarded));
    assert_eq!(doc.state(catalog), Some(ContainerState::Discarded));
    assert!(doc.is_complete(first));
}
