//! # xmlaxon
//!
//! A lazily built XML object model. A document is backed by a pull event
//! source and is only built as far as it is navigated: asking for the first
//! child of the root element reads the input up to that child and no
//! further. Subtrees can be serialized back into events at any point, either
//! building what they read or pulling unread regions straight through from
//! the source without creating nodes for them.
//!
//! ## Quick Start
//!
//! ```
//! use xmlaxon::Document;
//!
//! let mut doc = Document::parse_str("<root><child>Hello</child><rest/></root>");
//! let root = doc.document_element(false).unwrap().unwrap();
//! let child = doc.first_child(root).unwrap().unwrap();
//! assert_eq!(doc.local_name(child), Some("child"));
//! assert_eq!(doc.text_content(child).unwrap(), "Hello");
//! // <rest/> has not been read yet.
//! assert!(!doc.is_complete(root));
//! ```

pub mod builder;
pub mod datasource;
pub mod encoding;
pub mod error;
pub mod event;
pub mod navigator;
pub mod parser;
pub mod serial;
pub mod tree;
pub mod util;

// Re-export primary types at the crate root for convenience.
pub use builder::{BuilderId, BuilderOptions, CustomBuilder};
pub use error::{ModelError, StreamError};
pub use event::{EventSource, TextContent, XmlEvent, XmlHandler};
pub use serial::{PullSerializer, SerializerOptions};
pub use tree::{ContainerState, Document, NodeId, NodeKind, NodeType};
