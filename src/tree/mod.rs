//! The node graph: an arena of partially built XML nodes.
//!
//! All nodes live in a contiguous `Vec<NodeData>` owned by the [`Document`]
//! and are addressed by [`NodeId`], a newtype over `NonZeroU32`. Parent,
//! child, sibling and attribute links are indices into the same arena, so
//! detaching, replacing and inserting nodes are index rewrites.
//!
//! A container node may be only partly built: its `state` says whether more
//! children may still arrive from a builder, and its `builder` field names the
//! builder that will deliver them. The methods in this module never advance a
//! builder. They report exactly what has been built so far (the
//! `*_if_available` and `last_known_*` accessors) and link nodes without
//! forcing construction. The demand-driven accessors that do advance
//! builders live in [`crate::navigator`].
//!
//! # Examples
//!
//! ```
//! use xmlaxon::Document;
//!
//! let mut doc = Document::new();
//! let root = doc.root();
//! let item = doc.create_element("", "item", "");
//! doc.append_child(root, item).unwrap();
//! assert_eq!(doc.first_built_child(root), Some(item));
//! assert_eq!(doc.parent(item), Some(root));
//! ```

mod node;

pub use node::{
    AttributeData, ContainerKind, ContainerState, DocTypeData, DocumentInfo, Named, NodeKind,
    NodeType, TextBearing,
};

use std::num::NonZeroU32;
use std::rc::Rc;

use crate::builder::{BuilderId, BuilderSlot, CustomBuilder};
use crate::datasource::DataSource;
use crate::error::ModelError;
use crate::event::{TextContent, XmlEvent};
use crate::util::names::NameTable;
use crate::util::qname::QName;

/// A typed index into the document's node arena.
///
/// `NodeId` is a newtype over `NonZeroU32`, so `Option<NodeId>` has the same
/// size as `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    #[allow(clippy::expect_used, clippy::cast_possible_truncation)]
    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::new(index as u32).expect("NodeId index must be non-zero"))
    }

    fn as_index(self) -> usize {
        self.0.get() as usize
    }

    /// Returns the raw, always non-zero, index.
    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.0.get()
    }

    /// Creates a `NodeId` from a raw index, if non-zero.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }
}

/// Storage for a single node in the arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// The node's kind and payload.
    pub kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) first_attribute: Option<NodeId>,
    pub(crate) last_attribute: Option<NodeId>,
    pub(crate) next_attribute: Option<NodeId>,
    pub(crate) state: ContainerState,
    pub(crate) builder: Option<BuilderId>,
    pub(crate) data_source: Option<Rc<dyn DataSource>>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
            first_attribute: None,
            last_attribute: None,
            next_attribute: None,
            state: ContainerState::Complete,
            builder: None,
            data_source: None,
        }
    }

    /// The build state, for containers.
    #[must_use]
    pub fn state(&self) -> Option<ContainerState> {
        self.kind.is_container().then_some(self.state)
    }

    /// Whether a builder is still delivering content to this node.
    #[must_use]
    pub fn has_builder(&self) -> bool {
        self.builder.is_some()
    }

    /// Whether this is an element whose content comes from a data source
    /// that has not been expanded yet.
    #[must_use]
    pub fn is_sourced(&self) -> bool {
        self.data_source.is_some()
    }
}

impl Named for NodeData {
    fn qname(&self) -> Option<&QName> {
        self.kind.qname()
    }
}

impl TextBearing for NodeData {
    fn character_data(&self) -> Option<&TextContent> {
        self.kind.character_data()
    }

    fn is_ignorable(&self) -> bool {
        self.kind.is_ignorable()
    }
}

/// A lazily built XML document.
///
/// The `Document` owns the node arena, the builders feeding it, and the
/// name table used to intern names. It starts with a single document node;
/// when created from an event source the document node is `Incomplete` and
/// everything below it is built on demand.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    pub(crate) builders: Vec<BuilderSlot>,
    pub(crate) custom_builders: Vec<Rc<dyn CustomBuilder>>,
    pub(crate) names: NameTable,
}

impl Document {
    /// Creates a new, complete, empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::with_name_table(NameTable::new())
    }

    /// Creates an empty document interning names into `names`.
    #[must_use]
    pub fn with_name_table(names: NameTable) -> Self {
        let mut nodes = Vec::with_capacity(64);
        // Index 0: placeholder, NodeId is non-zero.
        nodes.push(NodeData::new(NodeKind::DocumentFragment));
        nodes.push(NodeData::new(NodeKind::Document(DocumentInfo::default())));
        Self {
            nodes,
            root: NodeId::from_index(1),
            builders: Vec::new(),
            custom_builders: Vec::new(),
            names,
        }
    }

    /// Returns the document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the XML declaration information recorded on the document node.
    #[must_use]
    pub fn info(&self) -> &DocumentInfo {
        match &self.node(self.root).kind {
            NodeKind::Document(info) => info,
            _ => unreachable!("the root node is always a document node"),
        }
    }

    /// Returns the node's storage.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Total number of nodes allocated, including the document node.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns the name table, for interning names up front.
    pub fn name_table(&mut self) -> &mut NameTable {
        &mut self.names
    }

    /// Takes the name table out of the document so it can seed another one.
    pub fn take_name_table(&mut self) -> NameTable {
        std::mem::take(&mut self.names)
    }

    /// Returns the type tag of a node.
    #[must_use]
    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.node(id).kind.node_type()
    }

    /// Returns the build state of a container, or `None` for leaf nodes.
    #[must_use]
    pub fn state(&self, id: NodeId) -> Option<ContainerState> {
        self.node(id).state()
    }

    /// Returns `true` if the node is a leaf or a fully built container.
    ///
    /// This never reads from an event source.
    #[must_use]
    pub fn is_complete(&self, id: NodeId) -> bool {
        let node = self.node(id);
        !node.kind.is_container() || node.state == ContainerState::Complete
    }

    /// Returns the name of an element or attribute.
    #[must_use]
    pub fn qname(&self, id: NodeId) -> Option<&QName> {
        self.node(id).qname()
    }

    /// Returns the local name of an element or attribute.
    #[must_use]
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).local_name()
    }

    /// Returns the character data of a text node.
    #[must_use]
    pub fn character_data(&self, id: NodeId) -> Option<&TextContent> {
        self.node(id).character_data()
    }

    /// Returns the character data of a text node as a string slice, if it is
    /// plain text.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.character_data(id)? {
            TextContent::Text(s) => Some(s),
            TextContent::Binary(_) => None,
        }
    }

    // --- Navigation over built nodes ---

    /// Returns the parent of a node. Attributes report their owner element.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the document that owns the node: the document node at the top
    /// of its ancestor chain, or the arena's document node for detached
    /// nodes while that document has not been discarded.
    #[must_use]
    pub fn owner_document(&self, id: NodeId) -> Option<NodeId> {
        let top = self.ancestors(id).last().unwrap_or(id);
        if matches!(self.node(top).kind, NodeKind::Document(_)) {
            return Some(top);
        }
        match self.node(self.root).state {
            ContainerState::Discarding | ContainerState::Discarded => None,
            _ => Some(self.root),
        }
    }

    /// Returns the first child if it has already been linked. Deferred text
    /// that the builder has not turned into a node yet is not visible here;
    /// see [`Document::first_child_if_available`].
    #[must_use]
    pub fn first_built_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child built so far.
    #[must_use]
    pub fn last_known_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling if it has already been built.
    #[must_use]
    pub fn next_sibling_if_available(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// Returns the previous sibling. Earlier siblings are always built.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    /// Returns the first attribute or namespace declaration built so far.
    #[must_use]
    pub fn first_attribute_if_available(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_attribute
    }

    /// Returns the attribute following `id` in its element's attribute list.
    #[must_use]
    pub fn next_attribute(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_attribute
    }

    /// Iterates over the children built so far.
    pub fn known_children(&self, id: NodeId) -> KnownChildren<'_> {
        KnownChildren {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// Iterates over the attributes and namespace declarations built so far.
    pub fn known_attributes(&self, id: NodeId) -> KnownAttributes<'_> {
        KnownAttributes {
            doc: self,
            next: self.node(id).first_attribute,
        }
    }

    /// Iterates from the node's parent up to the top of its tree.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.node(id).parent,
        }
    }

    // --- Node creation ---

    /// Allocates a new, detached, complete node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind));
        NodeId::from_index(index)
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, namespace_uri: &str, local_name: &str, prefix: &str) -> NodeId {
        let name = QName::new(&mut self.names, namespace_uri, local_name, prefix);
        self.create_node(NodeKind::Element(name))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, content: impl Into<TextContent>) -> NodeId {
        self.create_node(NodeKind::Text {
            content: content.into(),
            ignorable: false,
        })
    }

    /// Creates a detached comment holding `text`.
    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.create_text_container(NodeKind::Comment, text)
    }

    /// Creates a detached CDATA section holding `text`.
    pub fn create_cdata(&mut self, text: &str) -> NodeId {
        self.create_text_container(NodeKind::CData, text)
    }

    /// Creates a detached processing instruction.
    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> NodeId {
        self.create_text_container(
            NodeKind::ProcessingInstruction {
                target: target.to_string(),
            },
            data,
        )
    }

    fn create_text_container(&mut self, kind: NodeKind, text: &str) -> NodeId {
        let container = self.create_node(kind);
        if !text.is_empty() {
            let child = self.create_text(text);
            self.link_last_child(container, child);
        }
        container
    }

    /// Creates an empty document fragment.
    pub fn create_document_fragment(&mut self) -> NodeId {
        self.create_node(NodeKind::DocumentFragment)
    }

    /// Sets an attribute on an element, replacing the value of an existing
    /// attribute with the same namespace URI and local name.
    ///
    /// # Errors
    ///
    /// Returns `IllegalUse` if `element` is not an element.
    pub fn set_attribute(
        &mut self,
        element: NodeId,
        namespace_uri: &str,
        local_name: &str,
        prefix: &str,
        value: &str,
    ) -> Result<NodeId, ModelError> {
        if !self.node(element).kind.is_element() {
            return Err(ModelError::illegal("attributes can only be set on elements"));
        }
        let existing = self.known_attributes(element).find(|&a| {
            matches!(&self.node(a).kind, NodeKind::Attribute(d) if d.name.matches(namespace_uri, local_name))
        });
        if let Some(attr) = existing {
            if let NodeKind::Attribute(data) = &mut self.node_mut(attr).kind {
                data.value = value.to_string();
                data.specified = true;
            }
            return Ok(attr);
        }
        let name = QName::new(&mut self.names, namespace_uri, local_name, prefix);
        let attr_type = self.names.intern("CDATA");
        let attr = self.create_node(NodeKind::Attribute(AttributeData {
            name,
            value: value.to_string(),
            attr_type,
            specified: true,
        }));
        self.link_attribute(element, attr);
        Ok(attr)
    }

    /// Returns the event that reports an attribute or namespace declaration
    /// node, or `None` for other nodes.
    #[must_use]
    pub fn attribute_event(&self, id: NodeId) -> Option<XmlEvent> {
        match &self.node(id).kind {
            NodeKind::Attribute(data) => Some(XmlEvent::Attribute {
                namespace_uri: data.name.namespace_uri.to_string(),
                local_name: data.name.local_name.to_string(),
                prefix: data.name.prefix.to_string(),
                value: data.value.clone(),
                attr_type: data.attr_type.to_string(),
                specified: data.specified,
            }),
            NodeKind::NamespaceDeclaration {
                prefix,
                namespace_uri,
            } => Some(XmlEvent::NamespaceDeclaration {
                prefix: prefix.to_string(),
                namespace_uri: namespace_uri.to_string(),
            }),
            _ => None,
        }
    }

    // --- Linking primitives (never build) ---

    /// Appends `child` to `parent` without building `parent` first. `child`
    /// is unlinked from wherever it was.
    pub(crate) fn link_last_child(&mut self, parent: NodeId, child: NodeId) {
        if self.node(child).parent == Some(parent) && self.node(parent).last_child == Some(child) {
            return;
        }
        self.unlink(child);
        self.node_mut(child).parent = Some(parent);
        match self.node(parent).last_child {
            Some(last) => {
                self.node_mut(last).next_sibling = Some(child);
                self.node_mut(child).prev_sibling = Some(last);
            }
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Appends an attribute or namespace declaration node to an element's
    /// attribute list.
    pub(crate) fn link_attribute(&mut self, element: NodeId, attr: NodeId) {
        self.node_mut(attr).parent = Some(element);
        match self.node(element).last_attribute {
            Some(last) => self.node_mut(last).next_attribute = Some(attr),
            None => self.node_mut(element).first_attribute = Some(attr),
        }
        self.node_mut(element).last_attribute = Some(attr);
    }

    /// Removes a node from its parent's child list. The node keeps its own
    /// children. Does nothing for a node without a parent.
    pub(crate) fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Links `new` immediately before `reference` under the same parent.
    pub(crate) fn link_before(&mut self, reference: NodeId, new: NodeId, parent: NodeId) {
        self.unlink(new);
        let prev = self.node(reference).prev_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = Some(new),
            None => self.node_mut(parent).first_child = Some(new),
        }
        let node = self.node_mut(new);
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = Some(reference);
        self.node_mut(reference).prev_sibling = Some(new);
    }

    /// Links `new` immediately after `reference` under the same parent.
    /// If `reference` is the last known child, `new` becomes the last known
    /// child and later built siblings follow it.
    pub(crate) fn link_after(&mut self, reference: NodeId, new: NodeId, parent: NodeId) {
        self.unlink(new);
        let next = self.node(reference).next_sibling;
        match next {
            Some(n) => self.node_mut(n).prev_sibling = Some(new),
            None => self.node_mut(parent).last_child = Some(new),
        }
        let node = self.node_mut(new);
        node.parent = Some(parent);
        node.prev_sibling = Some(reference);
        node.next_sibling = next;
        self.node_mut(reference).next_sibling = Some(new);
    }

    /// Puts `new` where `old` is and unlinks `old`.
    pub(crate) fn link_replace(&mut self, old: NodeId, new: NodeId, parent: NodeId) {
        self.unlink(new);
        let prev = self.node(old).prev_sibling;
        let next = self.node(old).next_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = Some(new),
            None => self.node_mut(parent).first_child = Some(new),
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = Some(new),
            None => self.node_mut(parent).last_child = Some(new),
        }
        let node = self.node_mut(new);
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = next;
        let old_node = self.node_mut(old);
        old_node.parent = None;
        old_node.prev_sibling = None;
        old_node.next_sibling = None;
    }

    /// Checks that `child` may be linked under `parent`: the kinds must be
    /// compatible and `child` must not be `parent` or one of its ancestors.
    pub(crate) fn check_new_child(&self, parent: NodeId, child: NodeId) -> Result<(), ModelError> {
        if parent == child || self.ancestors(parent).any(|a| a == child) {
            return Err(ModelError::illegal(
                "a node cannot become a descendant of itself",
            ));
        }
        let parent_kind = &self.node(parent).kind;
        let child_kind = &self.node(child).kind;
        if !parent_kind.accepts_child(child_kind) {
            return Err(ModelError::IllegalUse(format!(
                "{:?} nodes cannot contain {:?} nodes",
                parent_kind.node_type(),
                child_kind.node_type()
            )));
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// --- Iterators ---

/// Iterator over the children of a node that have been built so far.
pub struct KnownChildren<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for KnownChildren<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over an element's attribute list.
pub struct KnownAttributes<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for KnownAttributes<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_attribute;
        Some(current)
    }
}

/// Iterator over the ancestors of a node, nearest first.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).parent;
        Some(current)
    }
}
