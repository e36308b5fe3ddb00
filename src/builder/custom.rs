//! Custom builders: claiming element content while the tree is built.
//!
//! A [`CustomBuilder`] registered on a document is offered every element as
//! soon as its start tag is complete. If it accepts, the element's content is
//! captured as events instead of being built into nodes and handed to
//! [`CustomBuilder::create`], which returns the [`DataSource`] the element
//! will be backed by from then on. The element stays in the tree as a sourced
//! element and is expanded only if someone navigates into it.

use std::fmt;
use std::rc::Rc;

use crate::datasource::{CapturedSource, DataSource};
use crate::error::StreamError;
use crate::event::XmlEvent;
use crate::util::qname::QName;

/// Turns the captured events of an element into a data source.
pub trait CustomBuilder: fmt::Debug {
    /// Whether this builder claims the element `name` at `depth` (the root
    /// element is at depth 1).
    fn accepts(&self, depth: usize, name: &QName) -> bool;

    /// Builds the data source for a claimed element.
    ///
    /// `events` is a complete stream: `StartDocument`, the element's start
    /// tag with its attributes, its content, `EndElement` and `Completed`.
    ///
    /// # Errors
    ///
    /// Returns `StreamError` if the events cannot be turned into a source.
    fn create(&self, name: &QName, events: Vec<XmlEvent>) -> Result<Rc<dyn DataSource>, StreamError>;
}

/// A custom builder that keeps the captured events in memory.
///
/// It matches on namespace URI and local name, optionally at one depth only.
#[derive(Debug, Clone)]
pub struct CapturingBuilder {
    namespace_uri: String,
    local_name: String,
    depth: Option<usize>,
}

impl CapturingBuilder {
    /// Claims elements named `{namespace_uri}local_name` at any depth.
    #[must_use]
    pub fn new(namespace_uri: &str, local_name: &str) -> Self {
        Self {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            depth: None,
        }
    }

    /// Restricts the builder to elements at `depth`.
    #[must_use]
    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

impl CustomBuilder for CapturingBuilder {
    fn accepts(&self, depth: usize, name: &QName) -> bool {
        self.depth.map_or(true, |d| d == depth) && name.matches(&self.namespace_uri, &self.local_name)
    }

    fn create(&self, _name: &QName, events: Vec<XmlEvent>) -> Result<Rc<dyn DataSource>, StreamError> {
        Ok(Rc::new(CapturedSource::new(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::names::NameTable;

    #[test]
    fn test_capturing_builder_matching() {
        let mut names = NameTable::new();
        let body = QName::new(&mut names, "urn:s", "Body", "s");
        let any_depth = CapturingBuilder::new("urn:s", "Body");
        assert!(any_depth.accepts(2, &body));
        assert!(any_depth.accepts(5, &body));
        let fixed = CapturingBuilder::new("urn:s", "Body").at_depth(2);
        assert!(fixed.accepts(2, &body));
        assert!(!fixed.accepts(3, &body));
        assert!(!CapturingBuilder::new("", "Body").accepts(2, &body));
    }
}
