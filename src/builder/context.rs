//! Per-depth build contexts.
//!
//! A context records which container is receiving the builder's events at a
//! given nesting level. Slots are reused when the builder descends to a depth
//! it has visited before, so a long document with a bounded depth allocates a
//! bounded number of contexts.

use std::fmt;
use std::rc::Rc;

use super::custom::CustomBuilder;
use crate::event::{EventKind, TextContent, XmlEvent, XmlHandler};
use crate::tree::NodeId;

/// What a context is building, which determines the event that closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextKind {
    Root,
    Element,
    Comment,
    ProcessingInstruction,
    CData,
}

impl ContextKind {
    /// The event kind that ends a context of this kind.
    pub(crate) fn end_event(self) -> EventKind {
        match self {
            Self::Root => EventKind::Completed,
            Self::Element => EventKind::EndElement,
            Self::Comment => EventKind::EndComment,
            Self::ProcessingInstruction => EventKind::EndProcessingInstruction,
            Self::CData => EventKind::EndCData,
        }
    }
}

/// Where events go while a context's content is not being built.
pub(crate) enum PassThrough {
    /// Drop every event.
    Discard,
    /// Hand every event back to the caller of `advance_builder`.
    Relay,
    /// Push every event to a consumer.
    Handler(Box<dyn XmlHandler>),
    /// Record the events for a custom builder.
    Capture {
        events: Vec<XmlEvent>,
        builder: Rc<dyn CustomBuilder>,
    },
}

impl PassThrough {
    /// Whether the region still counts towards the builder's active regions.
    /// A discarded region stops counting as soon as it is discarded.
    pub(crate) fn is_active(&self) -> bool {
        !matches!(self, Self::Discard)
    }
}

impl fmt::Debug for PassThrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("Discard"),
            Self::Relay => f.write_str("Relay"),
            Self::Handler(_) => f.write_str("Handler"),
            Self::Capture { events, .. } => f
                .debug_struct("Capture")
                .field("events", &events.len())
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) kind: ContextKind,
    /// `None` for regions whose events are skipped structurally, such as
    /// misc content around a data source's root element.
    pub(crate) target: Option<NodeId>,
    pub(crate) pending: Option<TextContent>,
    pub(crate) pass_through: Option<PassThrough>,
    /// Open nesting levels inside the target while in pass-through.
    pub(crate) pass_through_depth: usize,
}

impl Context {
    fn new(kind: ContextKind, target: Option<NodeId>) -> Self {
        Self {
            kind,
            target,
            pending: None,
            pass_through: None,
            pass_through_depth: 0,
        }
    }

    fn reset(&mut self, kind: ContextKind, target: Option<NodeId>) {
        self.kind = kind;
        self.target = target;
        self.pending = None;
        self.pass_through = None;
        self.pass_through_depth = 0;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.pass_through.as_ref().map_or(true, PassThrough::is_active)
    }
}

/// The builder's stack of open contexts.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    slots: Vec<Context>,
    depth: usize,
}

impl ContextStack {
    pub(crate) fn push(&mut self, kind: ContextKind, target: Option<NodeId>) {
        if let Some(slot) = self.slots.get_mut(self.depth) {
            slot.reset(kind, target);
        } else {
            self.slots.push(Context::new(kind, target));
        }
        self.depth += 1;
    }

    pub(crate) fn pop(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
            let slot = &mut self.slots[self.depth];
            slot.pending = None;
            slot.pass_through = None;
        }
    }

    /// Pops every context above `depth`.
    pub(crate) fn truncate(&mut self, depth: usize) {
        while self.depth > depth {
            self.pop();
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn top(&self) -> Option<&Context> {
        self.depth.checked_sub(1).map(|i| &self.slots[i])
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Context> {
        self.depth.checked_sub(1).map(|i| &mut self.slots[i])
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Context> {
        (index < self.depth).then(|| &mut self.slots[index])
    }

    /// The open contexts, outermost first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Context> {
        self.slots[..self.depth].iter()
    }

    pub(crate) fn position_of(&self, target: NodeId) -> Option<usize> {
        self.iter().position(|c| c.target == Some(target))
    }

    /// Number of slots ever allocated.
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slots_are_reused() {
        let mut stack = ContextStack::default();
        for _ in 0..10 {
            stack.push(ContextKind::Root, None);
            stack.push(ContextKind::Element, None);
            stack.pop();
            stack.pop();
        }
        assert_eq!(stack.capacity(), 2);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_pop_clears_pass_through() {
        let mut stack = ContextStack::default();
        stack.push(ContextKind::Root, None);
        if let Some(top) = stack.top_mut() {
            top.pass_through = Some(PassThrough::Discard);
            top.pending = Some(TextContent::from("x"));
        }
        stack.pop();
        stack.push(ContextKind::Element, None);
        let top = stack.top().map(|c| (c.kind, c.is_active(), c.pending.is_none()));
        assert_eq!(top, Some((ContextKind::Element, true, true)));
    }

    #[test]
    fn test_end_events() {
        assert_eq!(ContextKind::Root.end_event(), EventKind::Completed);
        assert_eq!(ContextKind::CData.end_event(), EventKind::EndCData);
    }
}
