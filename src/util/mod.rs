//! Utility modules: name interning and qualified names.

pub mod names;
pub mod qname;
