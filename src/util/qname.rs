//! Qualified names.
//!
//! A [`QName`] is the namespace URI, local name and prefix triple that every
//! element and attribute carries. All three parts are interned `Rc<str>`
//! handles from a [`NameTable`](super::names::NameTable); an absent namespace
//! or prefix is the empty string.
//!
//! See <https://www.w3.org/TR/xml-names/#NT-QName>

use std::fmt;
use std::rc::Rc;

use super::names::NameTable;

/// A namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace URI, empty if the name is in no namespace.
    pub namespace_uri: Rc<str>,
    /// Local part.
    pub local_name: Rc<str>,
    /// Prefix, empty if unprefixed.
    pub prefix: Rc<str>,
}

impl QName {
    /// Interns the three parts into `names` and builds a name.
    pub fn new(names: &mut NameTable, namespace_uri: &str, local_name: &str, prefix: &str) -> Self {
        Self {
            namespace_uri: names.intern(namespace_uri),
            local_name: names.intern(local_name),
            prefix: names.intern(prefix),
        }
    }

    /// Returns `true` if this name has the given namespace URI and local name.
    #[must_use]
    pub fn matches(&self, namespace_uri: &str, local_name: &str) -> bool {
        &*self.namespace_uri == namespace_uri && &*self.local_name == local_name
    }
}

impl fmt::Display for QName {
    /// Formats the name as it appears in markup, `prefix:local` or `local`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{}:{}", self.prefix, self.local_name)
        }
    }
}

/// Splits a `QName` into its prefix and local name parts.
///
/// Returns `(Some(prefix), localname)` if the name contains a colon,
/// or `(None, localname)` if it does not. Only the first colon splits.
///
/// # Examples
///
/// ```
/// use xmlaxon::util::qname::split_qname;
///
/// assert_eq!(split_qname("soap:Envelope"), (Some("soap"), "Envelope"));
/// assert_eq!(split_qname("Body"), (None, "Body"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("xml:lang"), (Some("xml"), "lang"));
        assert_eq!(split_qname("div"), (None, "div"));
        assert_eq!(split_qname("a:b:c"), (Some("a"), "b:c"));
    }

    #[test]
    fn test_display_and_matches() {
        let mut names = NameTable::new();
        let name = QName::new(&mut names, "urn:s", "Body", "s");
        assert_eq!(name.to_string(), "s:Body");
        assert!(name.matches("urn:s", "Body"));
        assert!(!name.matches("", "Body"));
        let plain = QName::new(&mut names, "", "item", "");
        assert_eq!(plain.to_string(), "item");
    }
}
