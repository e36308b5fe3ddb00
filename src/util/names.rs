//! Name interning.
//!
//! Element names, prefixes and namespace URIs repeat constantly in XML. A
//! [`NameTable`] stores each distinct string once and hands out shared
//! `Rc<str>` handles, so nodes with the same name share one allocation and
//! handles from the same table can be compared by pointer.
//!
//! The table is an explicit value: a [`Document`](crate::Document) owns one,
//! and callers that build many documents from similar input can pass a
//! pre-populated table in through
//! [`BuilderOptions::name_table`](crate::builder::BuilderOptions::name_table)
//! and take it back with [`Document::take_name_table`](crate::Document::take_name_table).

use std::collections::HashSet;
use std::rc::Rc;

/// A string interning table producing `Rc<str>` handles.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use xmlaxon::util::names::NameTable;
///
/// let mut names = NameTable::new();
/// let a = names.intern("urn:example");
/// let b = names.intern("urn:example");
/// assert!(Rc::ptr_eq(&a, &b));
/// assert_eq!(names.len(), 2); // the empty string is always present
/// ```
#[derive(Debug, Clone)]
pub struct NameTable {
    names: HashSet<Rc<str>>,
    empty: Rc<str>,
}

impl NameTable {
    /// Creates a table containing only the empty string.
    #[must_use]
    pub fn new() -> Self {
        let empty: Rc<str> = Rc::from("");
        let mut names = HashSet::new();
        names.insert(Rc::clone(&empty));
        Self { names, empty }
    }

    /// Returns the shared handle for `s`, inserting it on first use.
    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if s.is_empty() {
            return Rc::clone(&self.empty);
        }
        if let Some(existing) = self.names.get(s) {
            return Rc::clone(existing);
        }
        let name: Rc<str> = Rc::from(s);
        self.names.insert(Rc::clone(&name));
        name
    }

    /// Returns the shared empty string.
    #[must_use]
    pub fn empty(&self) -> Rc<str> {
        Rc::clone(&self.empty)
    }

    /// Returns `true` if `s` has been interned.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.names.contains(s)
    }

    /// Number of distinct strings, including the empty string.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`: the empty string is interned up front.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}
