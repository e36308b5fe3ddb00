//! The builder: turns an event stream into nodes, one event at a time.
//!
//! A [`Builder`] owns an [`EventSource`] and a stack of contexts, one per
//! open container. Each call to `consume_next` pulls exactly one event and
//! applies it to the innermost context: start events create a node, link it
//! as the last child of the context's target and open a new context; end
//! events mark the target complete and close the context.
//!
//! Builders are owned by the [`Document`] they feed and addressed by
//! [`BuilderId`]. A builder is taken out of its slot while it advances, so an
//! attempt to advance a builder that is already advancing is refused instead
//! of corrupting its context stack.
//!
//! # Deferred text
//!
//! The first character data of an element is held in its context rather than
//! turned into a node. It becomes a node as soon as another child arrives,
//! the element ends, or someone asks for the element's first child.
//!
//! # Active regions
//!
//! The builder counts the regions that still need events: the root plus
//! every open context that is not being discarded. When the count reaches
//! zero nobody can observe further events, so the source is closed (or,
//! with [`BuilderOptions::drain_on_release`], read to its end).
//!
//! # Pass-through
//!
//! A context can stop building and send its remaining events elsewhere: to
//! nowhere (discard), back to the caller (relay, used by the pull-through
//! serializer), to an [`XmlHandler`], or into a buffer for a
//! [`CustomBuilder`]. The context tracks the nesting depth inside its target
//! so it knows which end event closes the window.

mod context;
mod custom;

pub use custom::{CapturingBuilder, CustomBuilder};

use std::fmt;
use std::rc::Rc;

use log::{debug, trace, warn};

use self::context::{ContextKind, ContextStack, PassThrough};
use crate::error::ModelError;
use crate::event::{EventKind, EventSource, TextContent, XmlEvent, XmlHandler};
use crate::tree::{ContainerKind, ContainerState, DocTypeData, Document, DocumentInfo, NodeId, NodeKind};
use crate::util::names::NameTable;
use crate::util::qname::QName;

/// Identifies a builder owned by a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuilderId(usize);

impl fmt::Display for BuilderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options for building a document from an event source.
///
/// # Examples
///
/// ```
/// use xmlaxon::builder::BuilderOptions;
///
/// let opts = BuilderOptions::default().drain_on_release(true);
/// assert!(opts.defers_text());
/// ```
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    drain_on_release: bool,
    defer_text: bool,
    name_table: Option<NameTable>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            drain_on_release: false,
            defer_text: true,
            name_table: None,
        }
    }
}

impl BuilderOptions {
    /// Read the source to its end instead of closing it once no region needs
    /// more events.
    #[must_use]
    pub fn drain_on_release(mut self, yes: bool) -> Self {
        self.drain_on_release = yes;
        self
    }

    /// Hold an element's first text in its context instead of creating a
    /// node for it right away. On by default.
    #[must_use]
    pub fn defer_text(mut self, yes: bool) -> Self {
        self.defer_text = yes;
        self
    }

    /// Intern names into `names` instead of a fresh table.
    #[must_use]
    pub fn name_table(mut self, names: NameTable) -> Self {
        self.name_table = Some(names);
        self
    }

    /// Whether deferred text is enabled.
    #[must_use]
    pub fn defers_text(&self) -> bool {
        self.defer_text
    }
}

/// The container a builder's outermost context fills.
#[derive(Debug, Clone, Copy)]
enum RootKind {
    /// A whole document: events map onto the document node.
    Document(NodeId),
    /// A data source behind a sourced element: the source's root element is
    /// mapped onto the existing element and everything around it is ignored.
    Unwrapping {
        element: NodeId,
        mapped: bool,
        keep_attributes: bool,
    },
}

enum Deferred {
    Release,
    CustomBuild {
        target: NodeId,
        events: Vec<XmlEvent>,
        builder: Rc<dyn CustomBuilder>,
    },
}

/// A builder's entry in its document.
#[derive(Debug)]
pub(crate) enum BuilderSlot {
    Ready(Box<Builder>),
    Advancing,
    Finished,
}

/// Applies events from one source to the node graph.
pub(crate) struct Builder {
    id: BuilderId,
    source: Option<Box<dyn EventSource>>,
    contexts: ContextStack,
    root: RootKind,
    active: usize,
    drain_on_release: bool,
    defer_text: bool,
    started: bool,
    done: bool,
    failed: bool,
    deferred: Vec<Deferred>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("id", &self.id)
            .field("depth", &self.contexts.depth())
            .field("active", &self.active)
            .field("done", &self.done)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl Builder {
    fn new(id: BuilderId, source: Box<dyn EventSource>, root: RootKind, drain_on_release: bool, defer_text: bool) -> Self {
        let mut contexts = ContextStack::default();
        let target = match root {
            RootKind::Document(node) => Some(node),
            RootKind::Unwrapping { .. } => None,
        };
        contexts.push(ContextKind::Root, target);
        Self {
            id,
            source: Some(source),
            contexts,
            root,
            active: 1,
            drain_on_release,
            defer_text,
            started: false,
            done: false,
            failed: false,
            deferred: Vec::new(),
        }
    }

    /// Whether the end of the document has been applied.
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the source has been closed or drained.
    pub(crate) fn is_released(&self) -> bool {
        self.source.is_none()
    }

    /// Pulls one event and applies it. Returns the event if it was relayed.
    ///
    /// A region captured for a custom builder is consumed in one go, so the
    /// custom builder sees the whole element before control returns.
    pub(crate) fn consume_next(&mut self, doc: &mut Document) -> Result<Option<XmlEvent>, ModelError> {
        if self.failed {
            return Err(ModelError::illegal("the builder has failed"));
        }
        if self.done {
            return Err(ModelError::MalformedInput(
                "the document has already been completely built".to_string(),
            ));
        }
        let result = self.step(doc).and_then(|relayed| {
            while self.is_capturing() {
                self.step(doc)?;
            }
            self.run_deferred(doc)?;
            Ok(relayed)
        });
        if let Err(e) = &result {
            debug!("builder {}: failed: {e}", self.id);
            self.failed = true;
        }
        result
    }

    fn step(&mut self, doc: &mut Document) -> Result<Option<XmlEvent>, ModelError> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| ModelError::illegal("the builder has released its event source"))?;
        let event = source.next_event()?;
        trace!("builder {}: {}", self.id, event.kind());
        self.apply(doc, event)
    }

    fn is_capturing(&self) -> bool {
        matches!(
            self.contexts.top().and_then(|c| c.pass_through.as_ref()),
            Some(PassThrough::Capture { .. })
        )
    }

    fn apply(&mut self, doc: &mut Document, event: XmlEvent) -> Result<Option<XmlEvent>, ModelError> {
        if !self.started {
            return match event {
                XmlEvent::StartDocument {
                    input_encoding,
                    xml_version,
                    xml_encoding,
                    standalone,
                } => {
                    self.started = true;
                    if let RootKind::Document(node) = self.root {
                        if let NodeKind::Document(info) = &mut doc.node_mut(node).kind {
                            *info = DocumentInfo {
                                input_encoding,
                                xml_version,
                                xml_encoding,
                                standalone,
                            };
                        }
                    }
                    Ok(None)
                }
                other => Err(ModelError::MalformedInput(format!(
                    "expected START_DOCUMENT, found {}",
                    other.kind()
                ))),
            };
        }
        if self.contexts.top().is_some_and(|c| c.pass_through.is_some()) {
            return self.apply_pass_through(doc, event);
        }
        match event {
            XmlEvent::StartDocument { .. } => Err(ModelError::MalformedInput(
                "START_DOCUMENT inside a document".to_string(),
            )),
            XmlEvent::DocumentTypeDeclaration {
                root_name,
                public_id,
                system_id,
                internal_subset,
            } => {
                if self.contexts.depth() != 1 {
                    return Err(ModelError::MalformedInput(
                        "DTD inside the document element".to_string(),
                    ));
                }
                let data = DocTypeData {
                    root_name,
                    public_id,
                    system_id,
                    internal_subset,
                };
                self.append_leaf(doc, NodeKind::DocumentType(data))
            }
            XmlEvent::StartElement {
                namespace_uri,
                local_name,
                prefix,
            } => self.start_element(doc, &namespace_uri, &local_name, &prefix),
            attr @ (XmlEvent::Attribute { .. } | XmlEvent::NamespaceDeclaration { .. }) => {
                self.attribute(doc, attr)
            }
            XmlEvent::AttributesCompleted => self.attributes_completed(doc),
            XmlEvent::CharacterData { data, ignorable } => self.character_data(doc, data, ignorable),
            XmlEvent::StartProcessingInstruction { target } => self.start_container(
                doc,
                ContextKind::ProcessingInstruction,
                NodeKind::ProcessingInstruction { target },
            ),
            XmlEvent::StartComment => self.start_container(doc, ContextKind::Comment, NodeKind::Comment),
            XmlEvent::StartCData => self.start_container(doc, ContextKind::CData, NodeKind::CData),
            XmlEvent::EntityReference {
                name,
                replacement_text,
            } => self.append_leaf(
                doc,
                NodeKind::EntityReference {
                    name,
                    replacement_text,
                },
            ),
            end @ (XmlEvent::EndElement
            | XmlEvent::EndComment
            | XmlEvent::EndProcessingInstruction
            | XmlEvent::EndCData) => self.end_container(doc, end.kind()),
            XmlEvent::Completed => self.complete(doc),
        }
    }

    /// Returns the node new children go into, after turning any deferred
    /// text into a node. `None` means the region is being skipped.
    fn child_target(&mut self, doc: &mut Document) -> Result<Option<NodeId>, ModelError> {
        let ctx = self
            .contexts
            .top_mut()
            .ok_or_else(|| ModelError::consistency("no open context"))?;
        let Some(target) = ctx.target else {
            return Ok(None);
        };
        if doc.node(target).state == ContainerState::AttributesPending {
            return Err(ModelError::MalformedInput(
                "content before ATTRIBUTES_COMPLETED".to_string(),
            ));
        }
        if let Some(text) = ctx.pending.take() {
            let node = doc.create_node(NodeKind::Text {
                content: text,
                ignorable: false,
            });
            doc.link_last_child(target, node);
        }
        Ok(Some(target))
    }

    fn check_child(doc: &Document, parent: NodeId, kind: &NodeKind) -> Result<(), ModelError> {
        if doc.node(parent).kind.accepts_child(kind) {
            Ok(())
        } else {
            Err(ModelError::MalformedInput(format!(
                "{:?} is not allowed in {:?}",
                kind.node_type(),
                doc.node_type(parent)
            )))
        }
    }

    fn append_leaf(&mut self, doc: &mut Document, kind: NodeKind) -> Result<Option<XmlEvent>, ModelError> {
        if let Some(parent) = self.child_target(doc)? {
            Self::check_child(doc, parent, &kind)?;
            let node = doc.create_node(kind);
            doc.link_last_child(parent, node);
        }
        Ok(None)
    }

    fn open(&mut self, kind: ContextKind, target: Option<NodeId>) {
        self.contexts.push(kind, target);
        self.active += 1;
    }

    fn release_region(&mut self) -> Result<(), ModelError> {
        self.active = self
            .active
            .checked_sub(1)
            .ok_or_else(|| ModelError::consistency("active region count underflow"))?;
        if self.active == 0 {
            debug!("builder {}: no active regions left", self.id);
            self.deferred.push(Deferred::Release);
        }
        Ok(())
    }

    fn start_element(
        &mut self,
        doc: &mut Document,
        namespace_uri: &str,
        local_name: &str,
        prefix: &str,
    ) -> Result<Option<XmlEvent>, ModelError> {
        if let RootKind::Unwrapping { element, mapped, .. } = &mut self.root {
            if self.contexts.depth() == 1 {
                let expected = doc.qname(*element).filter(|q| q.matches(namespace_uri, local_name));
                if expected.is_none() {
                    return Err(ModelError::MalformedInput(format!(
                        "data source produced <{local_name}> for a different element"
                    )));
                }
                *mapped = true;
                let element = *element;
                self.open(ContextKind::Element, Some(element));
                return Ok(None);
            }
        }
        let parent = self.child_target(doc)?;
        let node = match parent {
            Some(parent) => {
                if self.contexts.depth() == 1 && doc.known_children(parent).any(|c| doc.node(c).kind.is_element()) {
                    return Err(ModelError::MalformedInput(
                        "more than one root element".to_string(),
                    ));
                }
                let name = QName::new(&mut doc.names, namespace_uri, local_name, prefix);
                let node = doc.create_node(NodeKind::Element(name));
                let data = doc.node_mut(node);
                data.state = ContainerState::AttributesPending;
                data.builder = Some(self.id);
                doc.link_last_child(parent, node);
                Some(node)
            }
            None => None,
        };
        self.open(ContextKind::Element, node);
        Ok(None)
    }

    fn start_tag_target(&self, doc: &Document) -> Result<Option<NodeId>, ModelError> {
        let ctx = self
            .contexts
            .top()
            .ok_or_else(|| ModelError::consistency("no open context"))?;
        match ctx.target {
            Some(t) if ctx.kind == ContextKind::Element && doc.node(t).state == ContainerState::AttributesPending => {
                Ok(Some(t))
            }
            None if ctx.kind == ContextKind::Element => Ok(None),
            _ => Err(ModelError::MalformedInput(
                "attribute outside a start tag".to_string(),
            )),
        }
    }

    fn attribute(&mut self, doc: &mut Document, event: XmlEvent) -> Result<Option<XmlEvent>, ModelError> {
        let Some(element) = self.start_tag_target(doc)? else {
            return Ok(None);
        };
        if matches!(self.root, RootKind::Unwrapping { keep_attributes: true, .. }) && self.contexts.depth() == 2 {
            return Ok(None);
        }
        let kind = match event {
            XmlEvent::Attribute {
                namespace_uri,
                local_name,
                prefix,
                value,
                attr_type,
                specified,
            } => NodeKind::Attribute(crate::tree::AttributeData {
                name: QName::new(&mut doc.names, &namespace_uri, &local_name, &prefix),
                value,
                attr_type: doc.names.intern(&attr_type),
                specified,
            }),
            XmlEvent::NamespaceDeclaration {
                prefix,
                namespace_uri,
            } => NodeKind::NamespaceDeclaration {
                prefix: doc.names.intern(&prefix),
                namespace_uri: doc.names.intern(&namespace_uri),
            },
            _ => return Err(ModelError::consistency("not an attribute event")),
        };
        let node = doc.create_node(kind);
        doc.link_attribute(element, node);
        Ok(None)
    }

    fn attributes_completed(&mut self, doc: &mut Document) -> Result<Option<XmlEvent>, ModelError> {
        let Some(element) = self.start_tag_target(doc)? else {
            return Ok(None);
        };
        doc.node_mut(element).state = ContainerState::Incomplete;
        if let RootKind::Document(_) = self.root {
            self.offer_to_custom_builders(doc, element);
        }
        Ok(None)
    }

    fn offer_to_custom_builders(&mut self, doc: &mut Document, element: NodeId) {
        let depth = self.contexts.depth() - 1;
        let Some(name) = doc.qname(element).cloned() else {
            return;
        };
        let Some(builder) = doc
            .custom_builders
            .iter()
            .find(|b| b.accepts(depth, &name))
            .map(Rc::clone)
        else {
            return;
        };
        let mut events = vec![
            XmlEvent::start_document(),
            XmlEvent::start_element(&name.namespace_uri, &name.local_name, &name.prefix),
        ];
        events.extend(doc.known_attributes(element).filter_map(|a| doc.attribute_event(a)));
        events.push(XmlEvent::AttributesCompleted);
        debug!("builder {}: capturing <{name}> for a custom builder", self.id);
        doc.node_mut(element).state = ContainerState::Discarding;
        if let Some(ctx) = self.contexts.top_mut() {
            ctx.pass_through = Some(PassThrough::Capture { events, builder });
            ctx.pass_through_depth = 0;
        }
    }

    fn character_data(
        &mut self,
        doc: &mut Document,
        data: TextContent,
        ignorable: bool,
    ) -> Result<Option<XmlEvent>, ModelError> {
        let depth = self.contexts.depth();
        let defer_text = self.defer_text;
        let ctx = self
            .contexts
            .top_mut()
            .ok_or_else(|| ModelError::consistency("no open context"))?;
        let Some(target) = ctx.target else {
            return Ok(None);
        };
        if depth == 1 {
            if data.is_whitespace() {
                return Ok(None);
            }
            return Err(ModelError::MalformedInput(
                "character data outside the document element".to_string(),
            ));
        }
        let target_node = doc.node(target);
        if defer_text
            && !ignorable
            && ctx.pending.is_none()
            && ctx.kind == ContextKind::Element
            && target_node.first_child.is_none()
            && target_node.state == ContainerState::Incomplete
        {
            ctx.pending = Some(data);
            return Ok(None);
        }
        if let Some(parent) = self.child_target(doc)? {
            let node = doc.create_node(NodeKind::Text { content: data, ignorable });
            doc.link_last_child(parent, node);
        }
        Ok(None)
    }

    fn start_container(
        &mut self,
        doc: &mut Document,
        context: ContextKind,
        kind: NodeKind,
    ) -> Result<Option<XmlEvent>, ModelError> {
        let node = match self.child_target(doc)? {
            Some(parent) => {
                Self::check_child(doc, parent, &kind)?;
                let node = doc.create_node(kind);
                let data = doc.node_mut(node);
                data.state = ContainerState::Incomplete;
                data.builder = Some(self.id);
                doc.link_last_child(parent, node);
                Some(node)
            }
            None => None,
        };
        self.open(context, node);
        Ok(None)
    }

    fn check_end(&self, end: EventKind) -> Result<(), ModelError> {
        let ctx = self
            .contexts
            .top()
            .ok_or_else(|| ModelError::consistency("no open context"))?;
        if ctx.kind == ContextKind::Root && end != EventKind::Completed {
            return Err(ModelError::consistency(format!("{end} with no open container")));
        }
        if ctx.kind.end_event() != end {
            return Err(ModelError::consistency(format!(
                "{end} does not close the open {:?} context",
                ctx.kind
            )));
        }
        Ok(())
    }

    fn end_container(&mut self, doc: &mut Document, end: EventKind) -> Result<Option<XmlEvent>, ModelError> {
        self.check_end(end)?;
        if let Some(target) = self.child_target(doc)? {
            let node = doc.node_mut(target);
            node.state = ContainerState::Complete;
            node.builder = None;
        }
        self.contexts.pop();
        self.release_region()?;
        self.finish_unwrapped()?;
        Ok(None)
    }

    /// Ends an unwrapping builder once its mapped element is closed. Nothing
    /// after the source's root element reaches the tree, so the root region
    /// is released and the source closed.
    fn finish_unwrapped(&mut self) -> Result<(), ModelError> {
        if !matches!(self.root, RootKind::Unwrapping { mapped: true, .. }) || self.contexts.depth() != 1 {
            return Ok(());
        }
        let active = self.contexts.top().is_some_and(|c| c.is_active());
        self.contexts.pop();
        self.done = true;
        debug!("builder {}: source root element complete", self.id);
        if active {
            self.release_region()?;
        }
        Ok(())
    }

    fn complete(&mut self, doc: &mut Document) -> Result<Option<XmlEvent>, ModelError> {
        if self.contexts.depth() != 1 {
            return Err(ModelError::consistency(format!(
                "COMPLETED with {} open containers",
                self.contexts.depth().saturating_sub(1)
            )));
        }
        match self.root {
            RootKind::Document(node) => {
                let data = doc.node_mut(node);
                data.state = ContainerState::Complete;
                data.builder = None;
            }
            RootKind::Unwrapping { mapped: false, .. } => {
                return Err(ModelError::MalformedInput(
                    "data source produced no root element".to_string(),
                ));
            }
            RootKind::Unwrapping { .. } => {}
        }
        self.contexts.pop();
        self.done = true;
        debug!("builder {}: document complete", self.id);
        self.release_region()?;
        Ok(None)
    }

    fn apply_pass_through(&mut self, doc: &mut Document, event: XmlEvent) -> Result<Option<XmlEvent>, ModelError> {
        let depth = self.contexts.depth();
        let ctx = self
            .contexts
            .top_mut()
            .ok_or_else(|| ModelError::consistency("no open context"))?;
        let delta = event.depth_delta();
        let completed = matches!(event, XmlEvent::Completed);
        if completed && (depth != 1 || ctx.pass_through_depth != 0) {
            return Err(ModelError::consistency("COMPLETED inside an open container"));
        }
        let closes = completed || (delta < 0 && ctx.pass_through_depth == 0);
        if closes && !completed {
            let end = event.kind();
            if ctx.kind == ContextKind::Root || ctx.kind.end_event() != end {
                return Err(ModelError::consistency(format!(
                    "{end} does not close the open {:?} context",
                    ctx.kind
                )));
            }
        }
        if !closes {
            if delta > 0 {
                ctx.pass_through_depth += 1;
            } else if delta < 0 {
                ctx.pass_through_depth -= 1;
            }
        }
        let relayed = match ctx.pass_through.as_mut() {
            Some(PassThrough::Relay) => Some(event),
            Some(PassThrough::Handler(handler)) => {
                handler.handle(event)?;
                None
            }
            Some(PassThrough::Capture { events, .. }) => {
                events.push(event);
                None
            }
            Some(PassThrough::Discard) | None => None,
        };
        if closes {
            self.close_pass_through(doc, completed)?;
        }
        Ok(relayed)
    }

    fn close_pass_through(&mut self, doc: &mut Document, completed: bool) -> Result<(), ModelError> {
        let Some(ctx) = self.contexts.top_mut() else {
            return Err(ModelError::consistency("no open context"));
        };
        let target = ctx.target.or(match self.root {
            RootKind::Unwrapping { element, .. } if completed => Some(element),
            _ => None,
        });
        let pass_through = ctx.pass_through.take();
        let active = pass_through.as_ref().map_or(true, PassThrough::is_active);
        match pass_through {
            Some(PassThrough::Capture { mut events, builder }) => {
                events.push(XmlEvent::Completed);
                if let Some(target) = target {
                    doc.node_mut(target).builder = None;
                    self.deferred.push(Deferred::CustomBuild {
                        target,
                        events,
                        builder,
                    });
                }
            }
            _ => {
                if let Some(target) = target {
                    let node = doc.node_mut(target);
                    if node.state == ContainerState::Discarding {
                        node.state = ContainerState::Discarded;
                    }
                    node.builder = None;
                }
                debug!("builder {}: pass-through window closed", self.id);
            }
        }
        self.contexts.pop();
        if completed {
            self.done = true;
        }
        if active {
            self.release_region()?;
        }
        if !completed {
            self.finish_unwrapped()?;
        }
        Ok(())
    }

    fn run_deferred(&mut self, doc: &mut Document) -> Result<(), ModelError> {
        for action in std::mem::take(&mut self.deferred) {
            match action {
                Deferred::Release => self.release(doc),
                Deferred::CustomBuild {
                    target,
                    events,
                    builder,
                } => {
                    let name = doc
                        .qname(target)
                        .cloned()
                        .ok_or_else(|| ModelError::consistency("custom builder target is not an element"))?;
                    debug!("builder {}: custom builder took <{name}> ({} events)", self.id, events.len());
                    let source = builder.create(&name, events)?;
                    let node = doc.node_mut(target);
                    node.data_source = Some(source);
                    node.state = ContainerState::Incomplete;
                    node.builder = None;
                }
            }
        }
        Ok(())
    }

    /// Closes or drains the source and detaches the builder from every node
    /// it was still building.
    fn release(&mut self, doc: &mut Document) {
        if let Some(mut source) = self.source.take() {
            if self.done {
                debug!("builder {}: closing exhausted source", self.id);
            } else if self.drain_on_release {
                debug!("builder {}: draining source", self.id);
                loop {
                    match source.next_event() {
                        Ok(XmlEvent::Completed) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("builder {}: error while draining source: {e}", self.id);
                            break;
                        }
                    }
                }
            } else {
                warn!("builder {}: closing source with unread input", self.id);
            }
            source.close();
        }
        for ctx in self.contexts.iter() {
            if let Some(target) = ctx.target {
                let node = doc.node_mut(target);
                if node.state == ContainerState::Discarding {
                    node.state = ContainerState::Discarded;
                }
                node.builder = None;
            }
        }
        if let RootKind::Unwrapping { element, .. } = self.root {
            let node = doc.node_mut(element);
            if node.state == ContainerState::Discarding {
                node.state = ContainerState::Discarded;
            }
            node.builder = None;
        }
        self.contexts.truncate(0);
    }

    /// Index of the context building `target`. Before a data source's root
    /// element has been seen, the root context stands for the element.
    fn context_index(&self, target: NodeId) -> Option<usize> {
        if let RootKind::Unwrapping {
            element,
            mapped: false,
            ..
        } = self.root
        {
            if element == target && self.contexts.depth() > 0 {
                return Some(0);
            }
        }
        self.contexts.position_of(target)
    }

    /// Whether `target` is being built by the innermost open context.
    pub(crate) fn is_innermost(&self, target: NodeId) -> bool {
        self.context_index(target)
            .is_some_and(|i| i + 1 == self.contexts.depth())
    }

    /// Turns the deferred text of `target` into a node. Returns whether there
    /// was any.
    pub(crate) fn flush_pending(&mut self, doc: &mut Document, target: NodeId) -> bool {
        let Some(index) = self.contexts.position_of(target) else {
            return false;
        };
        let Some(text) = self.contexts.get_mut(index).and_then(|c| c.pending.take()) else {
            return false;
        };
        let node = doc.create_node(NodeKind::Text {
            content: text,
            ignorable: false,
        });
        doc.link_last_child(target, node);
        true
    }

    /// Makes the context building `target` skip the rest of its content.
    /// Contexts nested inside it are folded into the skipped region.
    pub(crate) fn discard(&mut self, doc: &mut Document, target: NodeId) -> Result<bool, ModelError> {
        let Some(mut index) = self.context_index(target) else {
            return Ok(false);
        };
        if index == 1 && matches!(self.root, RootKind::Unwrapping { .. }) {
            // The data source has nothing else to offer; skip up to its end.
            index = 0;
        }
        let mut nested = 0;
        let mut released = 0;
        for ctx in self.contexts.iter().skip(index + 1) {
            nested += 1 + ctx.pass_through_depth;
            if ctx.is_active() {
                released += 1;
            }
            if let Some(t) = ctx.target {
                let node = doc.node_mut(t);
                node.state = ContainerState::Discarded;
                node.builder = None;
            }
        }
        self.contexts.truncate(index + 1);
        let ctx = self
            .contexts
            .get_mut(index)
            .ok_or_else(|| ModelError::consistency("discarded context vanished"))?;
        if ctx.is_active() {
            released += 1;
        }
        ctx.pending = None;
        ctx.pass_through = Some(PassThrough::Discard);
        ctx.pass_through_depth += nested;
        doc.node_mut(target).state = ContainerState::Discarding;
        debug!("builder {}: discarding content of node {}", self.id, target.into_raw());
        for _ in 0..released {
            self.release_region()?;
        }
        self.run_deferred(doc)?;
        Ok(true)
    }

    /// Sends the rest of `target`'s content to `pass_through` instead of
    /// building it. Returns the deferred text the caller must deliver first.
    fn set_pass_through(
        &mut self,
        doc: &mut Document,
        target: NodeId,
        pass_through: PassThrough,
    ) -> Result<Option<TextContent>, ModelError> {
        let index = self
            .context_index(target)
            .ok_or_else(|| ModelError::illegal("the node is not being built"))?;
        if index + 1 != self.contexts.depth() {
            return Err(ModelError::illegal(
                "the node has unfinished children; pass-through needs the innermost open node",
            ));
        }
        if doc.node(target).state != ContainerState::Incomplete {
            return Err(ModelError::illegal(
                "pass-through needs a node whose attributes are complete",
            ));
        }
        let ctx = self
            .contexts
            .get_mut(index)
            .ok_or_else(|| ModelError::consistency("context vanished"))?;
        if ctx.pass_through.is_some() {
            return Err(ModelError::illegal("a pass-through handler is already set"));
        }
        debug!("builder {}: pass-through {pass_through:?} for node {}", self.id, target.into_raw());
        ctx.pass_through = Some(pass_through);
        ctx.pass_through_depth = 0;
        let pending = ctx.pending.take();
        doc.node_mut(target).state = ContainerState::Discarding;
        Ok(pending)
    }

    /// Points the context building `from` at `to`.
    pub(crate) fn redirect(&mut self, from: NodeId, to: NodeId) -> bool {
        let Some(index) = self.contexts.position_of(from) else {
            return false;
        };
        if let Some(ctx) = self.contexts.get_mut(index) {
            ctx.target = Some(to);
        }
        true
    }
}

// --- Document-level builder access ---

impl Document {
    /// Creates a document that is built lazily from `source`.
    ///
    /// Nothing is read until the document is navigated, serialized or built.
    pub fn from_source<S: EventSource + 'static>(source: S, options: BuilderOptions) -> Self {
        let BuilderOptions {
            drain_on_release,
            defer_text,
            name_table,
        } = options;
        let mut doc = Self::with_name_table(name_table.unwrap_or_default());
        let root = doc.root();
        let id = BuilderId(doc.builders.len());
        let builder = Builder::new(
            id,
            Box::new(source),
            RootKind::Document(root),
            drain_on_release,
            defer_text,
        );
        let node = doc.node_mut(root);
        node.state = ContainerState::Incomplete;
        node.builder = Some(id);
        doc.builders.push(BuilderSlot::Ready(Box::new(builder)));
        debug!("builder {id}: created for document");
        doc
    }

    /// Registers a custom builder. It is offered every element built from
    /// the document's source from now on.
    pub fn register_custom_builder(&mut self, builder: Rc<dyn CustomBuilder>) {
        self.custom_builders.push(builder);
    }

    /// Returns the builder still delivering content to `node`, if any.
    #[must_use]
    pub fn builder_of(&self, node: NodeId) -> Option<BuilderId> {
        self.node(node).builder
    }

    /// Runs `f` with the builder taken out of its slot.
    pub(crate) fn with_builder<R>(
        &mut self,
        id: BuilderId,
        f: impl FnOnce(&mut Builder, &mut Document) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        let slot = self
            .builders
            .get_mut(id.0)
            .ok_or_else(|| ModelError::consistency(format!("unknown builder {id}")))?;
        let mut builder = match std::mem::replace(slot, BuilderSlot::Advancing) {
            BuilderSlot::Ready(builder) => builder,
            BuilderSlot::Advancing => {
                return Err(ModelError::illegal(format!("builder {id} is already advancing")));
            }
            BuilderSlot::Finished => {
                *slot = BuilderSlot::Finished;
                return Err(ModelError::MalformedInput(format!(
                    "builder {id} has finished reading its source"
                )));
            }
        };
        let result = f(&mut builder, self);
        self.builders[id.0] = if builder.is_released() {
            BuilderSlot::Finished
        } else {
            BuilderSlot::Ready(builder)
        };
        result
    }

    /// Pulls one event from a builder's source and applies it.
    ///
    /// Returns the event if the builder relayed it instead of building it.
    ///
    /// # Errors
    ///
    /// `MalformedInput` once the builder has completed, `Stream` if the
    /// source fails, `IllegalUse` if the builder is already advancing or has
    /// failed, `InternalConsistency` if the events are mis-nested.
    pub fn advance_builder(&mut self, id: BuilderId) -> Result<Option<XmlEvent>, ModelError> {
        self.with_builder(id, |builder, doc| builder.consume_next(doc))
    }

    /// Pulls one event from the document's own builder and applies it.
    ///
    /// # Errors
    ///
    /// `MalformedInput` if the document has been completely built or was
    /// not created from a source, plus the errors of
    /// [`advance_builder`](Self::advance_builder).
    pub fn consume_next_event(&mut self) -> Result<(), ModelError> {
        if self.builders.is_empty() {
            return Err(ModelError::MalformedInput(
                "the document was not created from a source".to_string(),
            ));
        }
        match self.advance_builder(BuilderId(0))? {
            Some(_) => Err(ModelError::consistency("relayed event with no consumer")),
            None => Ok(()),
        }
    }

    /// Whether a builder has applied the end of its document, or has
    /// released its source.
    #[must_use]
    pub fn is_builder_complete(&self, id: BuilderId) -> bool {
        match self.builders.get(id.0) {
            Some(BuilderSlot::Ready(builder)) => builder.is_done(),
            Some(BuilderSlot::Finished) => true,
            Some(BuilderSlot::Advancing) | None => false,
        }
    }

    /// Whether `node` is the innermost node its builder is filling, the only
    /// position where pass-through can start.
    pub(crate) fn is_innermost_open(&self, node: NodeId) -> bool {
        match self.node(node).builder.and_then(|id| self.builders.get(id.0)) {
            Some(BuilderSlot::Ready(builder)) => builder.is_innermost(node),
            _ => false,
        }
    }

    /// Turns any deferred text of `node` into a text node.
    pub(crate) fn flush_pending_text(&mut self, node: NodeId) -> Result<(), ModelError> {
        if let Some(id) = self.node(node).builder {
            self.with_builder(id, |builder, doc| Ok(builder.flush_pending(doc, node)))?;
        }
        Ok(())
    }

    /// Makes `node`'s builder skip the rest of its content. Does nothing for
    /// nodes without a builder.
    pub(crate) fn discard_content(&mut self, node: NodeId) -> Result<(), ModelError> {
        if let Some(id) = self.node(node).builder {
            self.with_builder(id, |builder, doc| builder.discard(doc, node))?;
        }
        Ok(())
    }

    /// Relays the rest of `node`'s content to whoever advances its builder.
    pub(crate) fn enable_relay(&mut self, node: NodeId) -> Result<(BuilderId, Option<TextContent>), ModelError> {
        let id = self
            .node(node)
            .builder
            .ok_or_else(|| ModelError::illegal("the node is not being built"))?;
        let pending = self.with_builder(id, |builder, doc| {
            builder.set_pass_through(doc, node, PassThrough::Relay)
        })?;
        Ok((id, pending))
    }

    /// Points the builder filling `from` at `to`.
    pub(crate) fn redirect_builder(&mut self, from: NodeId, to: NodeId) -> Result<bool, ModelError> {
        match self.node(from).builder {
            Some(id) => self.with_builder(id, |builder, _| Ok(builder.redirect(from, to))),
            None => Ok(false),
        }
    }

    /// Streams the content of `node` that has not been built yet to
    /// `handler`, without building it. The node is left `Discarded`.
    ///
    /// Children that were already built stay in the tree and are not sent.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if the node is not being built or already streams to
    /// another consumer, plus any error raised while advancing the builder
    /// or by the handler.
    pub fn stream_children_to(&mut self, node: NodeId, handler: Box<dyn XmlHandler>) -> Result<(), ModelError> {
        let id = self
            .node(node)
            .builder
            .ok_or_else(|| ModelError::illegal("the node is not being built"))?;
        while self.node(node).state == ContainerState::AttributesPending || !self.is_innermost_open(node) {
            if self.node(node).builder.is_none() {
                return Ok(());
            }
            self.advance_builder(id)?;
        }
        self.with_builder(id, |builder, doc| {
            let pending = builder.set_pass_through(doc, node, PassThrough::Handler(handler))?;
            if let (Some(text), Some(PassThrough::Handler(handler))) = (
                pending,
                builder.contexts.top_mut().and_then(|c| c.pass_through.as_mut()),
            ) {
                handler.handle(XmlEvent::CharacterData {
                    data: text,
                    ignorable: false,
                })?;
            }
            Ok(())
        })?;
        while self.node(node).state == ContainerState::Discarding && self.node(node).builder.is_some() {
            self.advance_builder(id)?;
        }
        Ok(())
    }

    /// Replaces the children of a sourced element with a builder reading its
    /// data source. Returns `false` if the element is not sourced.
    pub(crate) fn expand_sourced(&mut self, node: NodeId) -> Result<bool, ModelError> {
        let Some(source) = self.node_mut(node).data_source.take() else {
            return Ok(false);
        };
        let events = match source.open() {
            Ok(events) => events,
            Err(e) => {
                self.node_mut(node).data_source = Some(source);
                return Err(e.into());
            }
        };
        let id = BuilderId(self.builders.len());
        let keep_attributes = self.node(node).first_attribute.is_some();
        let builder = Builder::new(
            id,
            events,
            RootKind::Unwrapping {
                element: node,
                mapped: false,
                keep_attributes,
            },
            false,
            true,
        );
        let data = self.node_mut(node);
        data.state = ContainerState::AttributesPending;
        data.builder = Some(id);
        self.builders.push(BuilderSlot::Ready(Box::new(builder)));
        debug!("builder {id}: expanding sourced element node {}", node.into_raw());
        Ok(true)
    }

    /// Creates a detached element whose content comes from `source` when it
    /// is first navigated into or serialized.
    pub fn create_sourced_element(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        prefix: &str,
        source: Rc<dyn crate::datasource::DataSource>,
    ) -> NodeId {
        let node = self.create_element(namespace_uri, local_name, prefix);
        let data = self.node_mut(node);
        data.state = ContainerState::Incomplete;
        data.data_source = Some(source);
        node
    }
}
