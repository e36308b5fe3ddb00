//! Turning a possibly incomplete tree back into events.
//!
//! [`PullSerializer`] produces, one call at a time, the event sequence an
//! [`EventSource`] would produce for a subtree: a start of document, the
//! subtree's events, and a completion event. It walks built nodes directly
//! and, for regions nobody has built yet, either builds them on the way
//! (caching) or pulls their events straight through the builder without
//! creating nodes (non-caching). Sourced elements are spliced in from their
//! data source.
//!
//! [`XmlWriter`] renders any event stream as XML text.
//!
//! ```
//! use xmlaxon::serial::SerializerOptions;
//! use xmlaxon::Document;
//!
//! let mut doc = Document::parse_str("<root><child attr='v'>text</child></root>");
//! let root = doc.root();
//! let xml = doc.write_xml(root, SerializerOptions::default().cache(false)).unwrap();
//! assert_eq!(xml, r#"<root><child attr="v">text</child></root>"#);
//! ```

mod writer;

pub use writer::XmlWriter;

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;

use log::{debug, trace, warn};

use crate::builder::BuilderId;
use crate::error::ModelError;
use crate::event::{BinaryData, EventSource, XmlEvent, XmlHandler};
use crate::tree::{ContainerState, DocTypeData, Document, NodeId, NodeKind};

/// Options for a [`PullSerializer`].
///
/// ```
/// use xmlaxon::serial::SerializerOptions;
///
/// let opts = SerializerOptions::default().cache(false).preserve(true);
/// assert!(!opts.caches());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SerializerOptions {
    cache: bool,
    preserve: bool,
    include_sources: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            cache: true,
            preserve: false,
            include_sources: false,
        }
    }
}

impl SerializerOptions {
    /// Build the nodes being serialized (the default). Without caching,
    /// unbuilt regions are pulled straight through and are gone afterwards.
    #[must_use]
    pub fn cache(mut self, yes: bool) -> Self {
        self.cache = yes;
        self
    }

    /// On [`PullSerializer::dispose`], leave unread regions buildable
    /// instead of discarding them.
    #[must_use]
    pub fn preserve(mut self, yes: bool) -> Self {
        self.preserve = yes;
        self
    }

    /// Splice sourced elements from their data source even when caching,
    /// instead of expanding them. Destructive sources are still expanded
    /// when caching.
    #[must_use]
    pub fn include_sources(mut self, yes: bool) -> Self {
        self.include_sources = yes;
        self
    }

    /// Whether nodes are built while serializing.
    #[must_use]
    pub fn caches(&self) -> bool {
        self.cache
    }
}

/// Where the serializer is taking its events from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializerMode {
    /// Replaying built nodes.
    Navigator,
    /// Forwarding events from a builder without building nodes.
    PullThrough,
    /// Splicing the events of a sourced element's data source.
    Include,
    /// The completion event has been returned.
    EndDocument,
    /// Closed.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Nothing returned yet.
    Initial,
    /// The start of document was synthesized for a root that has its own
    /// start event.
    StartFragment,
    /// The node's start event was returned.
    Start,
    /// An attribute event was returned.
    Attribute(NodeId),
    /// `AttributesCompleted` was returned.
    AttributesDone,
    /// The node's end event was returned.
    End,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    node: NodeId,
    position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IncludePhase {
    Prolog,
    StartTag,
    Content,
}

struct Include {
    node: NodeId,
    source: Box<dyn EventSource>,
    phase: IncludePhase,
    depth: usize,
    keep_attributes: bool,
}

enum State {
    Navigator(Cursor),
    PullThrough {
        builder: BuilderId,
        node: NodeId,
        depth: usize,
    },
    Include(Include),
    EndDocument,
    Closed,
}

impl State {
    fn mode(&self) -> SerializerMode {
        match self {
            Self::Navigator(_) => SerializerMode::Navigator,
            Self::PullThrough { .. } => SerializerMode::PullThrough,
            Self::Include(_) => SerializerMode::Include,
            Self::EndDocument => SerializerMode::EndDocument,
            Self::Closed => SerializerMode::Closed,
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigator(cursor) => f.debug_tuple("Navigator").field(cursor).finish(),
            Self::PullThrough { builder, node, depth } => f
                .debug_struct("PullThrough")
                .field("builder", builder)
                .field("node", node)
                .field("depth", depth)
                .finish(),
            Self::Include(include) => f
                .debug_struct("Include")
                .field("node", &include.node)
                .field("phase", &include.phase)
                .field("depth", &include.depth)
                .finish_non_exhaustive(),
            Self::EndDocument => f.write_str("EndDocument"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// A pull-style serializer over a subtree of a [`Document`].
///
/// Each call to [`next`](Self::next) returns one event. The sequence starts
/// with `StartDocument` and ends with `Completed`; for a document node these
/// carry the document's own information, for any other node they are
/// synthesized around it.
///
/// While it walks built nodes the serializer is in
/// [`SerializerMode::Navigator`]. When it reaches a container that is still
/// being built and nothing further is built, a caching serializer builds the
/// next node, while a non-caching one switches the container's build context
/// to relay its remaining events and forwards them
/// ([`SerializerMode::PullThrough`]). The container is `Discarded`
/// afterwards. Sourced elements are spliced from their data source
/// ([`SerializerMode::Include`]) unless the serializer caches.
pub struct PullSerializer<'d> {
    doc: &'d mut Document,
    root: NodeId,
    options: SerializerOptions,
    state: State,
    saved: Option<State>,
    queue: VecDeque<XmlEvent>,
    current: Option<XmlEvent>,
    tag: Vec<XmlEvent>,
}

impl fmt::Debug for PullSerializer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullSerializer")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("saved", &self.saved)
            .field("current", &self.current.as_ref().map(XmlEvent::kind))
            .finish_non_exhaustive()
    }
}

impl<'d> PullSerializer<'d> {
    /// Creates a serializer for the subtree rooted at `root`.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if `root` is an attribute or namespace declaration.
    pub fn new(doc: &'d mut Document, root: NodeId, options: SerializerOptions) -> Result<Self, ModelError> {
        if doc.node(root).kind.is_attribute_like() {
            return Err(ModelError::illegal("attributes cannot be serialized on their own"));
        }
        debug!(
            "serializer: created for node {} (cache: {}, preserve: {})",
            root.into_raw(),
            options.cache,
            options.preserve
        );
        Ok(Self {
            doc,
            root,
            options,
            state: State::Navigator(Cursor {
                node: root,
                position: Position::Initial,
            }),
            saved: None,
            queue: VecDeque::new(),
            current: None,
            tag: Vec::new(),
        })
    }

    /// Where events currently come from.
    #[must_use]
    pub fn mode(&self) -> SerializerMode {
        self.state.mode()
    }

    fn check_open(&self) -> Result<(), ModelError> {
        match self.state {
            State::Closed => Err(ModelError::IllegalUseAfterClose),
            _ => Ok(()),
        }
    }

    /// Whether [`next`](Self::next) will return another event.
    ///
    /// # Errors
    ///
    /// `IllegalUseAfterClose` once closed.
    pub fn has_next(&self) -> Result<bool, ModelError> {
        self.check_open()?;
        Ok(!matches!(self.state, State::EndDocument))
    }

    /// The event most recently returned by [`next`](Self::next).
    ///
    /// # Errors
    ///
    /// `IllegalUseAfterClose` once closed.
    pub fn event(&self) -> Result<Option<&XmlEvent>, ModelError> {
        self.check_open()?;
        Ok(self.current.as_ref())
    }

    /// Returns the next event.
    ///
    /// # Errors
    ///
    /// `IllegalUse` after the completion event, `IllegalUseAfterClose` once
    /// closed, `NodeConsumed` if a container's content was streamed away by
    /// someone else, plus any error raised while building or reading a data
    /// source.
    pub fn next(&mut self) -> Result<&XmlEvent, ModelError> {
        self.check_open()?;
        if matches!(self.state, State::EndDocument) {
            return Err(ModelError::illegal("next() after the end of the document"));
        }
        let event = match self.queue.pop_front() {
            Some(event) => event,
            None => self.step()?,
        };
        match &event {
            XmlEvent::StartElement { .. } => self.tag.clear(),
            XmlEvent::Attribute { .. } | XmlEvent::NamespaceDeclaration { .. } => self.tag.push(event.clone()),
            _ => {}
        }
        trace!("serializer: {}", event.kind());
        Ok(self.current.insert(event))
    }

    /// Sends every remaining event to `handler`.
    ///
    /// # Errors
    ///
    /// The errors of [`next`](Self::next), and `Stream` if the handler
    /// refuses an event.
    pub fn pump_to(&mut self, handler: &mut dyn XmlHandler) -> Result<(), ModelError> {
        while self.has_next()? {
            let event = self.next()?.clone();
            handler.handle(event)?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<XmlEvent, ModelError> {
        match &self.state {
            State::Navigator(cursor) => {
                let cursor = *cursor;
                self.navigate(cursor)
            }
            State::PullThrough { builder, node, depth } => {
                let (builder, node, depth) = (*builder, *node, *depth);
                self.pull_through(builder, node, depth)
            }
            State::Include(_) => self.include_step(),
            State::EndDocument | State::Closed => Err(ModelError::consistency(format!(
                "no transition out of {:?}",
                self.state.mode()
            ))),
        }
    }

    // --- Navigator ---

    /// Document and fragment roots have no start or end event of their own;
    /// the start and end of the document stand for them.
    fn is_transparent(&self, node: NodeId) -> bool {
        node == self.root && matches!(self.doc.node(node).kind, NodeKind::Document(_) | NodeKind::DocumentFragment)
    }

    fn navigate(&mut self, cursor: Cursor) -> Result<XmlEvent, ModelError> {
        let Cursor { node, position } = cursor;
        match position {
            Position::Initial => {
                let event = match &self.doc.node(node).kind {
                    NodeKind::Document(info) => XmlEvent::StartDocument {
                        input_encoding: info.input_encoding.clone(),
                        xml_version: info.xml_version.clone(),
                        xml_encoding: info.xml_encoding.clone(),
                        standalone: info.standalone,
                    },
                    _ => XmlEvent::start_document(),
                };
                let position = if self.is_transparent(node) {
                    Position::Start
                } else {
                    Position::StartFragment
                };
                self.state = State::Navigator(Cursor { node, position });
                Ok(event)
            }
            Position::StartFragment => self.enter(node),
            Position::Start if self.doc.node(node).kind.is_element() => {
                self.doc.build_attributes(node)?;
                let first = self.doc.first_attribute_if_available(node);
                self.attribute_or_done(node, first)
            }
            Position::Attribute(attr) => {
                let next = self.doc.next_attribute(attr);
                self.attribute_or_done(node, next)
            }
            Position::Start | Position::AttributesDone => self.next_child(node, None),
            Position::End => {
                if node == self.root {
                    debug!("serializer: navigator -> end of document");
                    self.state = State::EndDocument;
                    return Ok(XmlEvent::Completed);
                }
                let parent = self
                    .doc
                    .parent(node)
                    .ok_or_else(|| ModelError::illegal("a node was detached while being serialized"))?;
                self.next_child(parent, Some(node))
            }
        }
    }

    fn attribute_or_done(&mut self, element: NodeId, attr: Option<NodeId>) -> Result<XmlEvent, ModelError> {
        let Some(attr) = attr else {
            self.state = State::Navigator(Cursor {
                node: element,
                position: Position::AttributesDone,
            });
            return Ok(XmlEvent::AttributesCompleted);
        };
        let event = self
            .doc
            .attribute_event(attr)
            .ok_or_else(|| ModelError::consistency("an attribute list holds a node that is not an attribute"))?;
        self.state = State::Navigator(Cursor {
            node: element,
            position: Position::Attribute(attr),
        });
        Ok(event)
    }

    /// Returns the start event of `node` and moves onto it.
    fn enter(&mut self, node: NodeId) -> Result<XmlEvent, ModelError> {
        if self.doc.node(node).is_sourced() {
            if self.should_include(node) {
                return self.start_include(node);
            }
            self.doc.expand(node)?;
        }
        let (event, position) = match &self.doc.node(node).kind {
            NodeKind::Element(name) => (
                XmlEvent::start_element(&name.namespace_uri, &name.local_name, &name.prefix),
                Position::Start,
            ),
            NodeKind::Comment => (XmlEvent::StartComment, Position::Start),
            NodeKind::ProcessingInstruction { target } => (
                XmlEvent::StartProcessingInstruction { target: target.clone() },
                Position::Start,
            ),
            NodeKind::CData => (XmlEvent::StartCData, Position::Start),
            NodeKind::Text { content, ignorable } => (
                XmlEvent::CharacterData {
                    data: content.clone(),
                    ignorable: *ignorable,
                },
                Position::End,
            ),
            NodeKind::DocumentType(dtd) => (
                XmlEvent::DocumentTypeDeclaration {
                    root_name: dtd.root_name.clone(),
                    public_id: dtd.public_id.clone(),
                    system_id: dtd.system_id.clone(),
                    internal_subset: dtd.internal_subset.clone(),
                },
                Position::End,
            ),
            NodeKind::EntityReference { name, replacement_text } => (
                XmlEvent::EntityReference {
                    name: name.clone(),
                    replacement_text: replacement_text.clone(),
                },
                Position::End,
            ),
            other => {
                return Err(ModelError::consistency(format!(
                    "{:?} node linked as a child",
                    other.node_type()
                )));
            }
        };
        self.state = State::Navigator(Cursor { node, position });
        Ok(event)
    }

    /// Moves to the child of `parent` after `prev` (or the first child).
    fn next_child(&mut self, parent: NodeId, prev: Option<NodeId>) -> Result<XmlEvent, ModelError> {
        let known = match prev {
            Some(prev) => self.doc.next_sibling_if_available(prev),
            None => self.doc.first_built_child(parent),
        };
        if let Some(child) = known {
            return self.enter(child);
        }
        let data = self.doc.node(parent);
        match (data.state, data.builder) {
            (ContainerState::Discarding | ContainerState::Discarded, _) => {
                return Err(ModelError::NodeConsumed(parent));
            }
            (ContainerState::Complete, _) | (_, None) => return self.end(parent),
            _ => {}
        }
        if !self.options.cache && self.doc.is_innermost_open(parent) {
            return self.start_pull_through(parent);
        }
        let child = match prev {
            Some(prev) => self.doc.next_sibling(prev)?,
            None => self.doc.first_child(parent)?,
        };
        match child {
            Some(child) => self.enter(child),
            None => self.end(parent),
        }
    }

    /// Returns the end event of `node` and moves onto it.
    fn end(&mut self, node: NodeId) -> Result<XmlEvent, ModelError> {
        let event = if self.is_transparent(node) {
            XmlEvent::Completed
        } else {
            match self.doc.node(node).kind {
                NodeKind::Element(_) => XmlEvent::EndElement,
                NodeKind::Comment => XmlEvent::EndComment,
                NodeKind::ProcessingInstruction { .. } => XmlEvent::EndProcessingInstruction,
                NodeKind::CData => XmlEvent::EndCData,
                ref other => {
                    return Err(ModelError::consistency(format!(
                        "{:?} node has no end event",
                        other.node_type()
                    )));
                }
            }
        };
        self.land_on_end(node);
        Ok(event)
    }

    fn land_on_end(&mut self, node: NodeId) {
        self.state = if self.is_transparent(node) {
            debug!("serializer: end of document");
            State::EndDocument
        } else {
            State::Navigator(Cursor {
                node,
                position: Position::End,
            })
        };
    }

    // --- Saved state ---

    fn save(&mut self, state: State) -> Result<(), ModelError> {
        if self.saved.is_some() {
            return Err(ModelError::consistency("a serializer state is already saved"));
        }
        self.saved = Some(state);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), ModelError> {
        match self.saved.take() {
            Some(State::Navigator(Cursor {
                node,
                position: Position::End,
            })) => {
                self.land_on_end(node);
                Ok(())
            }
            Some(State::Navigator(cursor)) => {
                self.state = State::Navigator(cursor);
                Ok(())
            }
            Some(other) => Err(ModelError::consistency(format!("cannot resume {:?}", other.mode()))),
            None => Err(ModelError::consistency("no saved serializer state to resume")),
        }
    }

    // --- Pull-through ---

    fn start_pull_through(&mut self, node: NodeId) -> Result<XmlEvent, ModelError> {
        let (builder, pending) = self.doc.enable_relay(node)?;
        self.save(State::Navigator(Cursor {
            node,
            position: Position::End,
        }))?;
        debug!("serializer: navigator -> pull-through for node {}", node.into_raw());
        self.state = State::PullThrough { builder, node, depth: 0 };
        match pending {
            Some(data) => Ok(XmlEvent::CharacterData { data, ignorable: false }),
            None => self.pull_through(builder, node, 0),
        }
    }

    fn pull_through(&mut self, builder: BuilderId, node: NodeId, mut depth: usize) -> Result<XmlEvent, ModelError> {
        let at_document = matches!(self.doc.node(node).kind, NodeKind::Document(_));
        loop {
            let Some(event) = self.doc.advance_builder(builder)? else {
                if self.doc.node(node).state != ContainerState::Discarding {
                    return Err(ModelError::consistency(
                        "pull-through window closed without its end event",
                    ));
                }
                continue;
            };
            let delta = event.depth_delta();
            if matches!(event, XmlEvent::Completed) || (delta < 0 && depth == 0) {
                debug!("serializer: pull-through -> navigator after node {}", node.into_raw());
                self.resume()?;
                return Ok(event);
            }
            // Whitespace between top-level constructs is never built either.
            if at_document && depth == 0 {
                if let XmlEvent::CharacterData { data, .. } = &event {
                    if data.is_whitespace() {
                        continue;
                    }
                    return Err(ModelError::MalformedInput(
                        "character data outside the document element".to_string(),
                    ));
                }
            }
            if delta > 0 {
                depth += 1;
            } else if delta < 0 {
                depth -= 1;
            }
            self.state = State::PullThrough { builder, node, depth };
            return Ok(event);
        }
    }

    // --- Include ---

    fn should_include(&self, node: NodeId) -> bool {
        let Some(source) = self.doc.node(node).data_source.as_ref() else {
            return false;
        };
        if self.options.cache {
            self.options.include_sources && !source.is_destructive()
        } else {
            true
        }
    }

    fn start_include(&mut self, node: NodeId) -> Result<XmlEvent, ModelError> {
        let data = self.doc.node(node);
        let keep_attributes = data.first_attribute.is_some();
        let source = data
            .data_source
            .clone()
            .ok_or_else(|| ModelError::consistency("included element has no data source"))?;
        let stream = source.open()?;
        if source.is_destructive() {
            let data = self.doc.node_mut(node);
            data.data_source = None;
            data.state = ContainerState::Discarded;
        }
        self.save(State::Navigator(Cursor {
            node,
            position: Position::End,
        }))?;
        debug!("serializer: navigator -> include for node {}", node.into_raw());
        self.state = State::Include(Include {
            node,
            source: stream,
            phase: IncludePhase::Prolog,
            depth: 0,
            keep_attributes,
        });
        self.include_step()
    }

    fn include_step(&mut self) -> Result<XmlEvent, ModelError> {
        let State::Include(include) = &mut self.state else {
            return Err(ModelError::consistency("include step outside the include state"));
        };
        loop {
            let event = include.source.next_event()?;
            match include.phase {
                IncludePhase::Prolog => match &event {
                    XmlEvent::StartElement {
                        namespace_uri,
                        local_name,
                        ..
                    } => {
                        let matches = self
                            .doc
                            .qname(include.node)
                            .is_some_and(|q| q.matches(namespace_uri, local_name));
                        if !matches {
                            return Err(ModelError::MalformedInput(format!(
                                "data source produced <{local_name}> for a different element"
                            )));
                        }
                        include.phase = IncludePhase::StartTag;
                        if include.keep_attributes {
                            let node = include.node;
                            let doc = &*self.doc;
                            self.queue
                                .extend(doc.known_attributes(node).filter_map(|a| doc.attribute_event(a)));
                            self.queue.push_back(XmlEvent::AttributesCompleted);
                        }
                        return Ok(event);
                    }
                    XmlEvent::Completed => {
                        return Err(ModelError::MalformedInput(
                            "data source produced no root element".to_string(),
                        ));
                    }
                    _ => {}
                },
                IncludePhase::StartTag => match event {
                    XmlEvent::Attribute { .. } | XmlEvent::NamespaceDeclaration { .. } => {
                        if !include.keep_attributes {
                            return Ok(event);
                        }
                    }
                    XmlEvent::AttributesCompleted => {
                        include.phase = IncludePhase::Content;
                        if !include.keep_attributes {
                            return Ok(event);
                        }
                    }
                    other => {
                        return Err(ModelError::MalformedInput(format!(
                            "{} inside a start tag",
                            other.kind()
                        )));
                    }
                },
                IncludePhase::Content => {
                    if matches!(event, XmlEvent::Completed) {
                        return Err(ModelError::MalformedInput(
                            "data source ended inside its root element".to_string(),
                        ));
                    }
                    let delta = event.depth_delta();
                    if delta < 0 && include.depth == 0 {
                        include.source.close();
                        debug!("serializer: include -> navigator");
                        self.resume()?;
                        return Ok(event);
                    }
                    if delta > 0 {
                        include.depth += 1;
                    } else if delta < 0 {
                        include.depth -= 1;
                    }
                    return Ok(event);
                }
            }
        }
    }

    // --- Current event accessors ---

    /// The text of the current `CharacterData` event. Binary content is
    /// returned base64-encoded.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if the current event is not character data.
    pub fn text(&self) -> Result<Cow<'_, str>, ModelError> {
        self.check_open()?;
        match &self.current {
            Some(XmlEvent::CharacterData { data, .. }) => Ok(data.to_text()),
            _ => Err(ModelError::illegal("the current event is not character data")),
        }
    }

    /// The binary content of the current `CharacterData` event, if it has
    /// any.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if the current event is not character data.
    pub fn binary_data(&self) -> Result<Option<&BinaryData>, ModelError> {
        self.check_open()?;
        match &self.current {
            Some(XmlEvent::CharacterData { data, .. }) => Ok(data.as_binary()),
            _ => Err(ModelError::illegal("the current event is not character data")),
        }
    }

    /// The fields of the current `DocumentTypeDeclaration` event.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if the current event is not a DTD.
    pub fn dtd_info(&self) -> Result<DocTypeData, ModelError> {
        self.check_open()?;
        match &self.current {
            Some(XmlEvent::DocumentTypeDeclaration {
                root_name,
                public_id,
                system_id,
                internal_subset,
            }) => Ok(DocTypeData {
                root_name: root_name.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
                internal_subset: internal_subset.clone(),
            }),
            _ => Err(ModelError::illegal("the current event is not a DTD")),
        }
    }

    /// The attribute and namespace events of the start tag just completed.
    fn start_tag(&self) -> Result<&[XmlEvent], ModelError> {
        self.check_open()?;
        match self.current {
            Some(XmlEvent::AttributesCompleted) => Ok(&self.tag),
            _ => Err(ModelError::illegal(
                "attributes can only be queried at the end of a start tag",
            )),
        }
    }

    /// Number of attributes of the start tag just completed.
    ///
    /// The attribute accessors are valid while the current event is
    /// `AttributesCompleted`. In the event model a start tag is
    /// `StartElement`, its `Attribute` and `NamespaceDeclaration` events, then
    /// `AttributesCompleted`, so that is the first event at which the whole
    /// tag is known (see [`crate::event`]).
    ///
    /// # Errors
    ///
    /// `IllegalUse` outside that position.
    pub fn attribute_count(&self) -> Result<usize, ModelError> {
        Ok(self
            .start_tag()?
            .iter()
            .filter(|e| matches!(e, XmlEvent::Attribute { .. }))
            .count())
    }

    /// The `index`-th attribute event of the start tag just completed.
    ///
    /// # Errors
    ///
    /// `IllegalUse` outside a completed start tag or if `index` is out of
    /// range.
    pub fn attribute(&self, index: usize) -> Result<&XmlEvent, ModelError> {
        self.start_tag()?
            .iter()
            .filter(|e| matches!(e, XmlEvent::Attribute { .. }))
            .nth(index)
            .ok_or_else(|| ModelError::IllegalUse(format!("no attribute at index {index}")))
    }

    /// The value of attribute `{namespace_uri}local_name` of the start tag
    /// just completed.
    ///
    /// # Errors
    ///
    /// `IllegalUse` outside a completed start tag.
    pub fn attribute_value(&self, namespace_uri: &str, local_name: &str) -> Result<Option<&str>, ModelError> {
        Ok(self.start_tag()?.iter().find_map(|e| match e {
            XmlEvent::Attribute {
                namespace_uri: ns,
                local_name: local,
                value,
                ..
            } if ns == namespace_uri && local == local_name => Some(value.as_str()),
            _ => None,
        }))
    }

    /// Number of namespace declarations of the start tag just completed.
    ///
    /// # Errors
    ///
    /// `IllegalUse` outside a completed start tag.
    pub fn namespace_count(&self) -> Result<usize, ModelError> {
        Ok(self
            .start_tag()?
            .iter()
            .filter(|e| matches!(e, XmlEvent::NamespaceDeclaration { .. }))
            .count())
    }

    /// The `(prefix, namespace URI)` of the `index`-th namespace declaration
    /// of the start tag just completed.
    ///
    /// # Errors
    ///
    /// `IllegalUse` outside a completed start tag or if `index` is out of
    /// range.
    pub fn namespace(&self, index: usize) -> Result<(&str, &str), ModelError> {
        self.start_tag()?
            .iter()
            .filter_map(|e| match e {
                XmlEvent::NamespaceDeclaration { prefix, namespace_uri } => {
                    Some((prefix.as_str(), namespace_uri.as_str()))
                }
                _ => None,
            })
            .nth(index)
            .ok_or_else(|| ModelError::IllegalUse(format!("no namespace declaration at index {index}")))
    }

    // --- Shutdown ---

    /// Closes the serializer. A pull-through in progress is turned into a
    /// discard so the container's builder is usable again; an include in
    /// progress closes its data source. Closing twice does nothing.
    ///
    /// # Errors
    ///
    /// Any error raised while switching the builder to discard.
    pub fn close(&mut self) -> Result<(), ModelError> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => return Ok(()),
            State::PullThrough { node, .. } => self.doc.discard_content(node)?,
            State::Include(mut include) => include.source.close(),
            State::Navigator(_) | State::EndDocument => {}
        }
        self.saved = None;
        self.queue.clear();
        debug!("serializer: closed");
        Ok(())
    }

    /// Closes the serializer and gives up on the rest of the subtree.
    ///
    /// Unless the serializer caches or preserves, every container between
    /// the current position and the serializer's root that is still being
    /// built is discarded, so its builder can release the source.
    ///
    /// # Errors
    ///
    /// Any error raised while discarding.
    pub fn dispose(mut self) -> Result<(), ModelError> {
        let position = match &self.state {
            State::Navigator(cursor) => Some(cursor.node),
            State::PullThrough { node, .. } => Some(*node),
            State::Include(include) => Some(include.node),
            State::EndDocument | State::Closed => None,
        };
        self.close()?;
        let Some(position) = position else {
            return Ok(());
        };
        let mut chain = vec![position];
        if position != self.root {
            for ancestor in self.doc.ancestors(position) {
                chain.push(ancestor);
                if ancestor == self.root {
                    break;
                }
            }
        }
        let unfinished: Vec<NodeId> = chain
            .into_iter()
            .filter(|&n| {
                let data = self.doc.node(n);
                data.builder.is_some()
                    && matches!(
                        data.state,
                        ContainerState::AttributesPending | ContainerState::Incomplete | ContainerState::Discarding
                    )
            })
            .collect();
        if unfinished.is_empty() {
            return Ok(());
        }
        if self.options.cache || self.options.preserve {
            debug!("serializer: disposed, {} containers left buildable", unfinished.len());
            return Ok(());
        }
        warn!(
            "serializer: disposed before the end; discarding {} unfinished containers",
            unfinished.len()
        );
        for node in unfinished {
            self.doc.discard_content(node)?;
        }
        Ok(())
    }
}

impl Drop for PullSerializer<'_> {
    /// A serializer dropped without [`close`](PullSerializer::close) still
    /// hands a relaying builder back, so the document can be built further.
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("serializer: failed to close on drop: {e}");
        }
    }
}

impl Document {
    /// Creates a [`PullSerializer`] for the subtree rooted at `node`.
    ///
    /// # Errors
    ///
    /// The errors of [`PullSerializer::new`].
    pub fn pull_serializer(&mut self, node: NodeId, options: SerializerOptions) -> Result<PullSerializer<'_>, ModelError> {
        PullSerializer::new(self, node, options)
    }

    /// Serializes the subtree rooted at `node` as XML text.
    ///
    /// # Errors
    ///
    /// The errors of [`PullSerializer::next`].
    pub fn write_xml(&mut self, node: NodeId, options: SerializerOptions) -> Result<String, ModelError> {
        let mut writer = XmlWriter::new();
        self.pull_serializer(node, options)?.pump_to(&mut writer)?;
        Ok(writer.into_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builder::BuilderOptions;
    use crate::datasource::{shared, CapturedSource, StreamSource, StringSource};
    use crate::event::{CountingSource, EventKind, EventRecorder, ReplaySource, SourceStats};
    use crate::parser::{ParseOptions, XmlTokenizer};
    use pretty_assertions::assert_eq;

    fn counted(xml: &str) -> (Document, SourceStats) {
        let (source, stats) = CountingSource::new(XmlTokenizer::new(xml, &ParseOptions::default()));
        (Document::from_source(source, BuilderOptions::default()), stats)
    }

    fn drain(doc: &mut Document, node: NodeId, options: SerializerOptions) -> Vec<XmlEvent> {
        let mut recorder = EventRecorder::new();
        doc.pull_serializer(node, options).unwrap().pump_to(&mut recorder).unwrap();
        recorder.into_events()
    }

    fn kinds(events: &[XmlEvent]) -> Vec<EventKind> {
        events.iter().map(XmlEvent::kind).collect()
    }

    #[test]
    fn test_caching_serialization_builds_tree() {
        let (mut doc, stats) = counted("<root><child attr='v'>text</child></root>");
        let root = doc.root();
        let events = drain(&mut doc, root, SerializerOptions::default());
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::StartDocument,
                EventKind::StartElement,
                EventKind::AttributesCompleted,
                EventKind::StartElement,
                EventKind::Attribute,
                EventKind::AttributesCompleted,
                EventKind::CharacterData,
                EventKind::EndElement,
                EventKind::EndElement,
                EventKind::Completed,
            ]
        );
        assert!(doc.is_complete(root));
        assert!(stats.is_closed());
        let again = drain(&mut doc, root, SerializerOptions::default());
        assert_eq!(again, events);
    }

    #[test]
    fn test_non_caching_serialization_builds_nothing() {
        let (mut doc, stats) = counted("<root><a>1</a><b>2</b></root>");
        let root = doc.root();
        let lazy = drain(&mut doc, root, SerializerOptions::default().cache(false));
        assert_eq!(doc.node_count(), 1);
        assert_eq!(doc.state(root), Some(ContainerState::Discarded));
        assert!(stats.is_closed());

        let mut eager = Document::parse_str("<root><a>1</a><b>2</b></root>");
        let eager_root = eager.root();
        eager.build(eager_root).unwrap();
        assert_eq!(drain(&mut eager, eager_root, SerializerOptions::default()), lazy);
    }

    #[test]
    fn test_switches_to_pull_through_after_built_nodes() {
        let mut doc = Document::parse_str("<r><a/><b/><c/></r>");
        let r = doc.document_element(false).unwrap().unwrap();
        let a = doc.first_child(r).unwrap().unwrap();
        doc.build(a).unwrap();
        let mut serializer = doc.pull_serializer(r, SerializerOptions::default().cache(false)).unwrap();
        let mut modes = Vec::new();
        while serializer.has_next().unwrap() {
            serializer.next().unwrap();
            modes.push(serializer.mode());
        }
        assert!(modes.contains(&SerializerMode::PullThrough));
        assert_eq!(modes.last(), Some(&SerializerMode::EndDocument));
        drop(serializer);
        assert_eq!(doc.state(r), Some(ContainerState::Discarded));
        assert_eq!(doc.first_built_child(r), Some(a));
        assert_eq!(doc.next_sibling_if_available(a), None);
    }

    #[test]
    fn test_pending_text_is_relayed_first() {
        let mut doc = Document::parse_str("<a>one<b/>two</a>");
        let a = doc.document_element(false).unwrap().unwrap();
        // Only the start tag of a has been read.
        doc.build_attributes(a).unwrap();
        let xml = doc.write_xml(a, SerializerOptions::default().cache(false)).unwrap();
        assert_eq!(xml, "<a>one<b/>two</a>");
    }

    #[test]
    fn test_element_root_is_wrapped_in_document_events() {
        let mut doc = Document::parse_str("<x><y>t</y></x>");
        let x = doc.document_element(false).unwrap().unwrap();
        let y = doc.first_child(x).unwrap().unwrap();
        let events = drain(&mut doc, y, SerializerOptions::default());
        assert_eq!(events.first(), Some(&XmlEvent::start_document()));
        assert_eq!(events.last(), Some(&XmlEvent::Completed));
        assert_eq!(events[1], XmlEvent::start_element("", "y", ""));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_accessors_follow_current_event() {
        let mut doc = Document::parse_str("<!DOCTYPE r SYSTEM 'r.dtd'><r xmlns:p='urn:p' p:k='v' j='w'>t</r>");
        let root = doc.root();
        let mut s = doc.pull_serializer(root, SerializerOptions::default()).unwrap();
        s.next().unwrap();
        assert!(matches!(s.attribute_count(), Err(ModelError::IllegalUse(_))));
        assert!(s.text().is_err());
        assert_eq!(s.next().unwrap().kind(), EventKind::DocumentTypeDeclaration);
        assert_eq!(s.dtd_info().unwrap().system_id.as_deref(), Some("r.dtd"));
        while s.next().unwrap().kind() != EventKind::AttributesCompleted {}
        assert_eq!(s.attribute_count().unwrap(), 2);
        assert_eq!(s.namespace_count().unwrap(), 1);
        assert_eq!(s.namespace(0).unwrap(), ("p", "urn:p"));
        assert_eq!(s.attribute_value("urn:p", "k").unwrap(), Some("v"));
        assert!(s.attribute(2).is_err());
        s.next().unwrap();
        assert_eq!(s.text().unwrap(), "t");
        assert_eq!(s.binary_data().unwrap(), None);
    }

    #[test]
    fn test_end_document_and_close() {
        let mut doc = Document::parse_str("<a/>");
        let root = doc.root();
        let mut s = doc.pull_serializer(root, SerializerOptions::default()).unwrap();
        while s.has_next().unwrap() {
            s.next().unwrap();
        }
        assert_eq!(s.mode(), SerializerMode::EndDocument);
        assert!(matches!(s.next(), Err(ModelError::IllegalUse(_))));
        assert_eq!(s.event().unwrap(), Some(&XmlEvent::Completed));
        s.close().unwrap();
        s.close().unwrap();
        assert!(matches!(s.next(), Err(ModelError::IllegalUseAfterClose)));
        assert!(matches!(s.has_next(), Err(ModelError::IllegalUseAfterClose)));
        assert!(matches!(s.event(), Err(ModelError::IllegalUseAfterClose)));
    }

    #[test]
    fn test_close_during_pull_through_discards_rest() {
        let (mut doc, stats) = counted("<r><a/><b/></r>");
        let root = doc.root();
        let mut s = doc.pull_serializer(root, SerializerOptions::default().cache(false)).unwrap();
        for _ in 0..3 {
            s.next().unwrap();
        }
        assert_eq!(s.mode(), SerializerMode::PullThrough);
        s.close().unwrap();
        drop(s);
        assert!(stats.is_closed());
        assert_eq!(doc.state(root), Some(ContainerState::Discarded));
    }

    #[test]
    fn test_dropping_during_pull_through_keeps_document_buildable() {
        let (mut doc, stats) = counted("<r><a/><b/><c/></r>");
        let r = doc.document_element(false).unwrap().unwrap();
        doc.build_attributes(r).unwrap();
        let mut s = doc.pull_serializer(r, SerializerOptions::default().cache(false)).unwrap();
        for _ in 0..4 {
            s.next().unwrap();
        }
        assert_eq!(s.mode(), SerializerMode::PullThrough);
        drop(s);
        let root = doc.root();
        doc.build(root).unwrap();
        assert_eq!(doc.state(root), Some(ContainerState::Complete));
        assert_eq!(doc.state(r), Some(ContainerState::Discarded));
        assert_eq!(stats.pulled(), 14);
        assert!(stats.is_closed());
    }

    #[test]
    fn test_text_outside_document_element_fails_either_way() {
        let events = || {
            ReplaySource::new(vec![
                XmlEvent::start_document(),
                XmlEvent::text("junk"),
                XmlEvent::start_element("", "a", ""),
                XmlEvent::AttributesCompleted,
                XmlEvent::EndElement,
                XmlEvent::Completed,
            ])
        };
        let mut eager = Document::from_source(events(), BuilderOptions::default());
        let root = eager.root();
        assert!(matches!(eager.build(root), Err(ModelError::MalformedInput(_))));

        let mut lazy = Document::from_source(events(), BuilderOptions::default());
        let root = lazy.root();
        let mut s = lazy.pull_serializer(root, SerializerOptions::default().cache(false)).unwrap();
        let mut recorder = EventRecorder::new();
        assert!(matches!(s.pump_to(&mut recorder), Err(ModelError::MalformedInput(_))));
    }

    #[test]
    fn test_dispose_discards_unfinished_containers() {
        let (mut doc, stats) = counted("<r><a><x/></a><b/></r>");
        let r = doc.document_element(false).unwrap().unwrap();
        doc.first_child(r).unwrap();
        let root = doc.root();
        let mut s = doc.pull_serializer(root, SerializerOptions::default().cache(false)).unwrap();
        for _ in 0..4 {
            s.next().unwrap();
        }
        s.dispose().unwrap();
        assert!(stats.is_closed());
        assert!(matches!(doc.first_child(r), Err(ModelError::NodeConsumed(_))));
    }

    #[test]
    fn test_dispose_with_preserve_keeps_tree_buildable() {
        let mut doc = Document::parse_str("<r><a/><b/></r>");
        let r = doc.document_element(false).unwrap().unwrap();
        doc.first_child(r).unwrap();
        let root = doc.root();
        let options = SerializerOptions::default().cache(false).preserve(true);
        let mut s = doc.pull_serializer(root, options).unwrap();
        for _ in 0..4 {
            s.next().unwrap();
        }
        assert_eq!(s.mode(), SerializerMode::Navigator);
        s.dispose().unwrap();
        assert_eq!(doc.children(r).unwrap().len(), 2);
    }

    #[test]
    fn test_include_splices_data_source() {
        let mut doc = Document::new();
        let root = doc.root();
        let wrapper = doc.create_element("", "w", "");
        doc.append_child(root, wrapper).unwrap();
        let source = shared(StringSource::new("<?pi?><s k='1'><t>in</t></s>"));
        let sourced = doc.create_sourced_element("", "s", "", source);
        doc.append_child(wrapper, sourced).unwrap();

        let mut s = doc.pull_serializer(root, SerializerOptions::default().cache(false)).unwrap();
        let mut modes = Vec::new();
        let mut writer = XmlWriter::new();
        while s.has_next().unwrap() {
            let event = s.next().unwrap().clone();
            modes.push(s.mode());
            writer.handle(event).unwrap();
        }
        drop(s);
        assert!(modes.contains(&SerializerMode::Include));
        assert_eq!(writer.as_str(), r#"<w><s k="1"><t>in</t></s></w>"#);
        // Not expanded: a reopenable source stays attached.
        assert!(doc.node(sourced).is_sourced());
        assert_eq!(doc.first_built_child(sourced), None);
    }

    #[test]
    fn test_caching_expands_sourced_element() {
        let mut doc = Document::new();
        let source = shared(CapturedSource::new(vec![
            XmlEvent::start_document(),
            XmlEvent::start_element("", "s", ""),
            XmlEvent::AttributesCompleted,
            XmlEvent::text("body"),
            XmlEvent::EndElement,
            XmlEvent::Completed,
        ]));
        let sourced = doc.create_sourced_element("", "s", "", source);
        let xml = doc.write_xml(sourced, SerializerOptions::default()).unwrap();
        assert_eq!(xml, "<s>body</s>");
        assert!(!doc.node(sourced).is_sourced());
        assert_eq!(doc.text_content(sourced).unwrap(), "body");
    }

    #[test]
    fn test_include_keeps_node_attributes() {
        let mut doc = Document::new();
        let source = shared(StreamSource::new(ReplaySource::new(vec![
            XmlEvent::start_document(),
            XmlEvent::start_element("", "s", ""),
            XmlEvent::attribute("k", "from-source"),
            XmlEvent::AttributesCompleted,
            XmlEvent::EndElement,
            XmlEvent::Completed,
        ])));
        let sourced = doc.create_sourced_element("", "s", "", source);
        doc.set_attribute(sourced, "", "k", "", "from-node").unwrap();
        let xml = doc.write_xml(sourced, SerializerOptions::default().cache(false)).unwrap();
        assert_eq!(xml, r#"<s k="from-node"/>"#);
        // A destructive source is used up by the splice.
        assert_eq!(doc.state(sourced), Some(ContainerState::Discarded));
    }

    #[test]
    fn test_include_rejects_mismatched_root() {
        let mut doc = Document::new();
        let source = shared(StringSource::new("<other/>"));
        let sourced = doc.create_sourced_element("", "s", "", source);
        let err = doc.write_xml(sourced, SerializerOptions::default().cache(false)).unwrap_err();
        assert!(matches!(err, ModelError::MalformedInput(_)), "{err}");
    }

    #[test]
    fn test_attribute_root_is_refused() {
        let mut doc = Document::new();
        let e = doc.create_element("", "e", "");
        let attr = doc.set_attribute(e, "", "a", "", "1").unwrap();
        assert!(matches!(
            doc.pull_serializer(attr, SerializerOptions::default()),
            Err(ModelError::IllegalUse(_))
        ));
    }

    #[test]
    fn test_serializing_consumed_content_fails() {
        let mut doc = Document::parse_str("<r><a/></r>");
        let root = doc.root();
        drain(&mut doc, root, SerializerOptions::default().cache(false));
        let mut s = doc.pull_serializer(root, SerializerOptions::default()).unwrap();
        s.next().unwrap();
        assert!(matches!(s.next(), Err(ModelError::NodeConsumed(_))));
    }
}
