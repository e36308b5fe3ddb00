//! Demand-driven navigation and mutation.
//!
//! The accessors here answer structural questions about a possibly
//! incomplete tree. When the answer is not known yet because a container is
//! still being built, they advance the container's builder one event at a
//! time until it is, and no further. Once a container is complete they never
//! read from a source again.
//!
//! Mutations keep the tree and its builders consistent: a container that is
//! still receiving events is built to completion before it is detached or
//! replaced, and [`Document::move_children`] points the open build context
//! at the new parent so later events follow the children.
//!
//! ```
//! use xmlaxon::Document;
//!
//! let mut doc = Document::parse_str("<a><!--c--><b/></a>");
//! let a = doc.document_element(false).unwrap().unwrap();
//! let comment = doc.first_child(a).unwrap().unwrap();
//! // Only the comment has been built so far.
//! assert!(doc.next_sibling_if_available(comment).is_none());
//! let b = doc.next_sibling(comment).unwrap().unwrap();
//! assert_eq!(doc.local_name(b), Some("b"));
//! ```

use log::debug;

use crate::builder::BuilderId;
use crate::error::ModelError;
use crate::tree::{ContainerKind, ContainerState, Document, NodeData, NodeId, NodeKind, TextBearing};

impl Document {
    /// Advances a builder for the navigator. Relayed events belong to a
    /// serializer, so the navigator cannot consume them.
    fn pull(&mut self, id: BuilderId) -> Result<(), ModelError> {
        match self.advance_builder(id)? {
            None => Ok(()),
            Some(event) => Err(ModelError::IllegalUse(format!(
                "builder {id} is relaying {} to a serializer",
                event.kind()
            ))),
        }
    }

    /// Expands a sourced element and refuses containers whose content is
    /// gone.
    fn ensure_navigable(&mut self, node: NodeId) -> Result<(), ModelError> {
        if self.node(node).is_sourced() {
            self.expand_sourced(node)?;
        }
        match self.node(node).state() {
            Some(ContainerState::Discarding | ContainerState::Discarded) => Err(ModelError::NodeConsumed(node)),
            _ => Ok(()),
        }
    }

    /// Replaces a sourced element's placeholder with a builder over its data
    /// source. Returns `false` if the element is not sourced.
    ///
    /// # Errors
    ///
    /// Returns `Stream` if the data source cannot be opened.
    pub fn expand(&mut self, node: NodeId) -> Result<bool, ModelError> {
        self.expand_sourced(node)
    }

    /// Returns the first child if it is known without reading from the
    /// source. Deferred text held by the builder is turned into a node first,
    /// so an element's single text child is always visible here.
    ///
    /// # Errors
    ///
    /// Returns an error only if the node's builder is busy or has failed.
    pub fn first_child_if_available(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        if self.node(node).first_child.is_none() && self.node(node).builder.is_some() {
            self.flush_pending_text(node)?;
        }
        Ok(self.first_built_child(node))
    }

    /// Returns the first child, building as far as needed to know it.
    ///
    /// # Errors
    ///
    /// `NodeConsumed` if the content was discarded or streamed away, plus
    /// any error raised while advancing the builder.
    pub fn first_child(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        if !self.node(node).kind.is_container() {
            return Ok(None);
        }
        self.ensure_navigable(node)?;
        loop {
            if let Some(child) = self.first_child_if_available(node)? {
                return Ok(Some(child));
            }
            let data = self.node(node);
            match (data.state, data.builder) {
                (ContainerState::Discarding | ContainerState::Discarded, _) => {
                    return Err(ModelError::NodeConsumed(node));
                }
                (ContainerState::Complete, _) | (_, None) => return Ok(None),
                (ContainerState::AttributesPending | ContainerState::Incomplete, Some(id)) => self.pull(id)?,
            }
        }
    }

    /// Returns the next sibling, building the parent as far as needed to
    /// know it. Returns `None` once the parent is complete or no longer has
    /// a source.
    ///
    /// # Errors
    ///
    /// `NodeConsumed` if the parent's remaining content was discarded or
    /// streamed away, plus any error raised while advancing the builder.
    pub fn next_sibling(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        loop {
            if let Some(next) = self.node(node).next_sibling {
                return Ok(Some(next));
            }
            let Some(parent) = self.node(node).parent else {
                return Ok(None);
            };
            if self.node(node).kind.is_attribute_like() {
                return Ok(None);
            }
            let data = self.node(parent);
            match (data.state, data.builder) {
                (ContainerState::Discarding | ContainerState::Discarded, _) => {
                    return Err(ModelError::NodeConsumed(parent));
                }
                (ContainerState::Complete, _) | (_, None) => return Ok(None),
                (ContainerState::AttributesPending | ContainerState::Incomplete, Some(id)) => self.pull(id)?,
            }
        }
    }

    /// Returns the last child. The node is built completely first.
    ///
    /// # Errors
    ///
    /// The errors of [`build`](Self::build).
    pub fn last_child(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        self.build(node)?;
        Ok(self.last_known_child(node))
    }

    /// Returns the first child accepted by `filter`.
    ///
    /// # Errors
    ///
    /// The errors of [`first_child`](Self::first_child).
    pub fn first_child_matching<F>(&mut self, node: NodeId, mut filter: F) -> Result<Option<NodeId>, ModelError>
    where
        F: FnMut(&NodeData) -> bool,
    {
        let mut child = self.first_child(node)?;
        while let Some(c) = child {
            if filter(self.node(c)) {
                return Ok(Some(c));
            }
            child = self.next_sibling(c)?;
        }
        Ok(None)
    }

    /// Returns the next sibling accepted by `filter`.
    ///
    /// # Errors
    ///
    /// The errors of [`next_sibling`](Self::next_sibling).
    pub fn next_sibling_matching<F>(&mut self, node: NodeId, mut filter: F) -> Result<Option<NodeId>, ModelError>
    where
        F: FnMut(&NodeData) -> bool,
    {
        let mut sibling = self.next_sibling(node)?;
        while let Some(s) = sibling {
            if filter(self.node(s)) {
                return Ok(Some(s));
            }
            sibling = self.next_sibling(s)?;
        }
        Ok(None)
    }

    /// Returns the first child element.
    ///
    /// # Errors
    ///
    /// The errors of [`first_child`](Self::first_child).
    pub fn first_child_element(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        self.first_child_matching(node, |n| n.kind.is_element())
    }

    /// Returns the next sibling element.
    ///
    /// # Errors
    ///
    /// The errors of [`next_sibling`](Self::next_sibling).
    pub fn next_sibling_element(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        self.next_sibling_matching(node, |n| n.kind.is_element())
    }

    /// Returns the next sibling that is not whitespace-only text.
    ///
    /// # Errors
    ///
    /// The errors of [`next_sibling`](Self::next_sibling).
    pub fn next_significant_sibling(&mut self, node: NodeId) -> Result<Option<NodeId>, ModelError> {
        self.next_sibling_matching(node, |n| !n.is_whitespace())
    }

    /// Returns every child of `node`, building it completely.
    ///
    /// # Errors
    ///
    /// The errors of [`build`](Self::build).
    pub fn children(&mut self, node: NodeId) -> Result<Vec<NodeId>, ModelError> {
        let mut cursor = ChildCursor::new(node);
        let mut children = Vec::new();
        while let Some(child) = cursor.advance(self)? {
            children.push(child);
        }
        Ok(children)
    }

    /// Builds `node` completely.
    ///
    /// # Errors
    ///
    /// `NodeConsumed` if the content was discarded or streamed away,
    /// `InternalConsistency` if an incomplete node has lost its builder,
    /// plus any error raised while advancing the builder.
    pub fn build(&mut self, node: NodeId) -> Result<(), ModelError> {
        if !self.node(node).kind.is_container() {
            return Ok(());
        }
        self.ensure_navigable(node)?;
        loop {
            let data = self.node(node);
            match (data.state, data.builder) {
                (ContainerState::Complete, _) => return Ok(()),
                (ContainerState::Discarding | ContainerState::Discarded, _) => {
                    return Err(ModelError::NodeConsumed(node));
                }
                (_, Some(id)) => self.pull(id)?,
                (_, None) => {
                    return Err(ModelError::consistency(format!(
                        "node {} is incomplete but has no builder",
                        node.into_raw()
                    )));
                }
            }
        }
    }

    /// Builds the attributes of an element.
    ///
    /// # Errors
    ///
    /// Any error raised while advancing the builder.
    pub fn build_attributes(&mut self, element: NodeId) -> Result<(), ModelError> {
        if !self.node(element).kind.is_element() {
            return Ok(());
        }
        if self.node(element).is_sourced() && self.node(element).first_attribute.is_none() {
            self.expand_sourced(element)?;
        }
        while self.node(element).state == ContainerState::AttributesPending {
            let Some(id) = self.node(element).builder else {
                break;
            };
            self.pull(id)?;
        }
        Ok(())
    }

    /// Returns the first attribute or namespace declaration of an element.
    ///
    /// # Errors
    ///
    /// The errors of [`build_attributes`](Self::build_attributes).
    pub fn first_attribute(&mut self, element: NodeId) -> Result<Option<NodeId>, ModelError> {
        self.build_attributes(element)?;
        Ok(self.first_attribute_if_available(element))
    }

    /// Returns the attribute nodes of an element, without namespace
    /// declarations.
    ///
    /// # Errors
    ///
    /// The errors of [`build_attributes`](Self::build_attributes).
    pub fn attributes(&mut self, element: NodeId) -> Result<Vec<NodeId>, ModelError> {
        self.build_attributes(element)?;
        Ok(self
            .known_attributes(element)
            .filter(|&a| matches!(self.node(a).kind, NodeKind::Attribute(_)))
            .collect())
    }

    /// Returns the namespace declaration nodes of an element.
    ///
    /// # Errors
    ///
    /// The errors of [`build_attributes`](Self::build_attributes).
    pub fn namespace_declarations(&mut self, element: NodeId) -> Result<Vec<NodeId>, ModelError> {
        self.build_attributes(element)?;
        Ok(self
            .known_attributes(element)
            .filter(|&a| matches!(self.node(a).kind, NodeKind::NamespaceDeclaration { .. }))
            .collect())
    }

    /// Returns the value of the attribute `{namespace_uri}local_name`.
    ///
    /// # Errors
    ///
    /// The errors of [`build_attributes`](Self::build_attributes).
    pub fn attribute_value(
        &mut self,
        element: NodeId,
        namespace_uri: &str,
        local_name: &str,
    ) -> Result<Option<String>, ModelError> {
        self.build_attributes(element)?;
        Ok(self.known_attributes(element).find_map(|a| match &self.node(a).kind {
            NodeKind::Attribute(data) if data.name.matches(namespace_uri, local_name) => Some(data.value.clone()),
            _ => None,
        }))
    }

    /// Returns the text of a node: the data of a text node, the value of an
    /// attribute, or the concatenated descendant text of a container.
    /// Comments and processing instructions inside elements do not count.
    ///
    /// # Errors
    ///
    /// The errors of [`first_child`](Self::first_child) and
    /// [`next_sibling`](Self::next_sibling).
    pub fn text_content(&mut self, node: NodeId) -> Result<String, ModelError> {
        match &self.node(node).kind {
            NodeKind::Text { content, .. } => return Ok(content.to_text().into_owned()),
            NodeKind::Attribute(data) => return Ok(data.value.clone()),
            NodeKind::NamespaceDeclaration { namespace_uri, .. } => return Ok(namespace_uri.to_string()),
            NodeKind::EntityReference { replacement_text, .. } => {
                return Ok(replacement_text.clone().unwrap_or_default());
            }
            NodeKind::DocumentType(_) => return Ok(String::new()),
            _ => {}
        }
        let mut out = String::new();
        self.collect_text(node, &mut out)?;
        Ok(out)
    }

    fn collect_text(&mut self, node: NodeId, out: &mut String) -> Result<(), ModelError> {
        let mut child = self.first_child(node)?;
        while let Some(c) = child {
            match &self.node(c).kind {
                NodeKind::Text { content, .. } => out.push_str(&content.to_text()),
                NodeKind::EntityReference {
                    replacement_text: Some(text),
                    ..
                } => out.push_str(text),
                NodeKind::Element(_) | NodeKind::CData => self.collect_text(c, out)?,
                _ => {}
            }
            child = self.next_sibling(c)?;
        }
        Ok(())
    }

    /// Copies a node into a new detached node. Attributes are always copied;
    /// with `deep` the whole subtree is copied, building it first. Comments,
    /// PIs and CDATA sections always keep their text.
    ///
    /// # Errors
    ///
    /// The errors of [`build`](Self::build).
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> Result<NodeId, ModelError> {
        let deep = deep
            || matches!(
                self.node(node).kind,
                NodeKind::Comment | NodeKind::ProcessingInstruction { .. } | NodeKind::CData
            );
        if deep {
            self.build(node)?;
        } else {
            self.build_attributes(node)?;
        }
        let kind = self.node(node).kind.clone();
        let copy = self.create_node(kind);
        let attributes: Vec<NodeId> = self.known_attributes(node).collect();
        for attr in attributes {
            let kind = self.node(attr).kind.clone();
            let attr_copy = self.create_node(kind);
            self.link_attribute(copy, attr_copy);
        }
        if deep {
            let children: Vec<NodeId> = self.known_children(node).collect();
            for child in children {
                let child_copy = self.clone_node(child, true)?;
                self.link_last_child(copy, child_copy);
            }
        }
        Ok(copy)
    }

    // --- Mutation ---

    /// Builds `node` if it is a container still receiving events.
    fn complete_before_move(&mut self, node: NodeId) -> Result<(), ModelError> {
        let data = self.node(node);
        let building = data.builder.is_some()
            && matches!(data.state, ContainerState::AttributesPending | ContainerState::Incomplete);
        if building {
            self.build(node)?;
        }
        Ok(())
    }

    /// Removes a node from its parent. A container that is still being
    /// built is completed first, so no build context is left pointing at a
    /// detached node. Does nothing for a node without a parent.
    ///
    /// # Errors
    ///
    /// The errors of [`build`](Self::build).
    pub fn detach(&mut self, node: NodeId) -> Result<(), ModelError> {
        if self.node(node).parent.is_none() {
            return Ok(());
        }
        self.complete_before_move(node)?;
        self.unlink(node);
        Ok(())
    }

    /// Puts `new` in the place of `old`, which becomes detached.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if `old` has no parent or `new` may not go there, plus
    /// the errors of [`build`](Self::build).
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) -> Result<(), ModelError> {
        if old == new {
            return Ok(());
        }
        let parent = self
            .node(old)
            .parent
            .ok_or_else(|| ModelError::illegal("the node to replace has no parent"))?;
        self.check_new_child(parent, new)?;
        self.complete_before_move(old)?;
        self.complete_before_move(new)?;
        self.link_replace(old, new, parent);
        Ok(())
    }

    /// Inserts `new` immediately before `node`.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if `new` is `node`, `node` has no parent, or `new` may
    /// not go there.
    pub fn insert_sibling_before(&mut self, node: NodeId, new: NodeId) -> Result<(), ModelError> {
        let parent = self.sibling_parent(node, new)?;
        self.complete_before_move(new)?;
        self.link_before(node, new, parent);
        Ok(())
    }

    /// Inserts `new` immediately after `node`. The following sibling is
    /// built first, so `new` lands between `node` and whatever the source
    /// produces next.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if `new` is `node`, `node` has no parent, or `new` may
    /// not go there, plus any error raised while advancing the builder.
    pub fn insert_sibling_after(&mut self, node: NodeId, new: NodeId) -> Result<(), ModelError> {
        let parent = self.sibling_parent(node, new)?;
        self.next_sibling(node)?;
        self.complete_before_move(new)?;
        self.link_after(node, new, parent);
        Ok(())
    }

    fn sibling_parent(&self, node: NodeId, new: NodeId) -> Result<NodeId, ModelError> {
        if node == new {
            return Err(ModelError::illegal("a node cannot be its own sibling"));
        }
        let parent = self
            .node(node)
            .parent
            .ok_or_else(|| ModelError::illegal("the node has no parent"))?;
        self.check_new_child(parent, new)?;
        Ok(parent)
    }

    /// Appends `child` as the last child of `parent`. The parent is built
    /// completely first. The children of a document fragment are moved
    /// instead of the fragment itself.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if `child` may not go under `parent`, plus the errors of
    /// [`build`](Self::build).
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), ModelError> {
        self.build(parent)?;
        if matches!(self.node(child).kind, NodeKind::DocumentFragment) {
            for c in self.children(child)? {
                self.check_new_child(parent, c)?;
                self.link_last_child(parent, c);
            }
            return Ok(());
        }
        self.check_new_child(parent, child)?;
        self.complete_before_move(child)?;
        self.link_last_child(parent, child);
        Ok(())
    }

    /// Moves every child of `from` to the end of `to`, including children
    /// not built yet: the build context filling `from` is pointed at `to`.
    ///
    /// # Errors
    ///
    /// `IllegalUse` if `to` is `from` or one of its descendants, or is not a
    /// container; `NodeConsumed` if the content of `from` is gone.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> Result<(), ModelError> {
        if !self.node(to).kind.is_container() {
            return Err(ModelError::illegal("the target cannot have children"));
        }
        if to == from || self.ancestors(to).any(|a| a == from) {
            return Err(ModelError::illegal("cannot move children into their own subtree"));
        }
        self.ensure_navigable(from)?;
        self.build_attributes(from)?;
        self.build(to)?;
        self.flush_pending_text(from)?;
        let children: Vec<NodeId> = self.known_children(from).collect();
        for child in children {
            self.check_new_child(to, child)?;
            self.link_last_child(to, child);
        }
        let data = self.node(from);
        if let (ContainerState::Incomplete, Some(id)) = (data.state, data.builder) {
            if self.redirect_builder(from, to)? {
                debug!("builder {id}: now filling node {} instead of {}", to.into_raw(), from.into_raw());
                let target = self.node_mut(to);
                target.state = ContainerState::Incomplete;
                target.builder = Some(id);
            }
            let source = self.node_mut(from);
            source.state = ContainerState::Complete;
            source.builder = None;
        }
        Ok(())
    }

    /// Removes every child of `node`. Content not built yet is skipped
    /// without being built.
    ///
    /// # Errors
    ///
    /// Any error raised by the builder while skipping.
    pub fn remove_children(&mut self, node: NodeId) -> Result<(), ModelError> {
        if !self.node(node).kind.is_container() {
            return Ok(());
        }
        self.node_mut(node).data_source = None;
        self.discard_content(node)?;
        let data = self.node_mut(node);
        data.state = ContainerState::Complete;
        data.builder = None;
        let children: Vec<NodeId> = self.known_children(node).collect();
        for child in children {
            self.unlink(child);
        }
        Ok(())
    }

    /// Detaches a node and drops whatever remains of its content. A
    /// container still receiving events has the rest of them skipped, and
    /// discarding the document node lets its builder close the source.
    ///
    /// # Errors
    ///
    /// Any error raised by the builder while skipping.
    pub fn discard(&mut self, node: NodeId) -> Result<(), ModelError> {
        let data = self.node_mut(node);
        data.data_source = None;
        if data.kind.is_container() {
            if data.builder.is_some() {
                self.discard_content(node)?;
            } else {
                data.state = ContainerState::Discarded;
            }
        }
        self.unlink(node);
        Ok(())
    }

    /// Returns the document element, building until it has been seen.
    ///
    /// With `discard` the element is built completely, detached, and the
    /// document node is discarded so its source can be released.
    ///
    /// # Errors
    ///
    /// The errors of [`build`](Self::build) and
    /// [`discard`](Self::discard).
    pub fn document_element(&mut self, discard: bool) -> Result<Option<NodeId>, ModelError> {
        let root = self.root();
        let Some(element) = self.first_child_matching(root, |n| n.kind.is_element())? else {
            return Ok(None);
        };
        if discard {
            self.build(element)?;
            self.unlink(element);
            self.discard(root)?;
        }
        Ok(Some(element))
    }
}

/// A forward cursor over the children of a node that builds them one at a
/// time.
///
/// It holds no borrow of the document, so the caller can use the document
/// between steps.
///
/// ```
/// use xmlaxon::navigator::ChildCursor;
/// use xmlaxon::Document;
///
/// let mut doc = Document::parse_str("<list><i/><i/><i/></list>");
/// let list = doc.document_element(false).unwrap().unwrap();
/// let mut cursor = ChildCursor::new(list);
/// let mut count = 0;
/// while let Some(_item) = cursor.advance(&mut doc).unwrap() {
///     count += 1;
/// }
/// assert_eq!(count, 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChildCursor {
    parent: NodeId,
    current: Option<NodeId>,
    started: bool,
}

impl ChildCursor {
    /// Creates a cursor positioned before the first child of `parent`.
    #[must_use]
    pub fn new(parent: NodeId) -> Self {
        Self {
            parent,
            current: None,
            started: false,
        }
    }

    /// Moves to the next child and returns it.
    ///
    /// # Errors
    ///
    /// The errors of [`Document::first_child`] and
    /// [`Document::next_sibling`].
    pub fn advance(&mut self, doc: &mut Document) -> Result<Option<NodeId>, ModelError> {
        let next = match (self.started, self.current) {
            (false, _) => doc.first_child(self.parent)?,
            (true, Some(current)) => doc.next_sibling(current)?,
            (true, None) => None,
        };
        self.started = true;
        self.current = next;
        Ok(next)
    }

    /// The child the cursor is on.
    #[must_use]
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }
}
