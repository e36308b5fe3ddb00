//! Node payloads and the capability traits over them.
//!
//! [`NodeKind`] is the closed set of node variants. Structural links and the
//! build state live in [`NodeData`](super::NodeData); the payload here is
//! only what the variant itself carries. Code that only cares about one
//! capability (having a name, carrying text, having children) goes through
//! the [`Named`], [`TextBearing`] and [`ContainerKind`] traits instead of
//! matching on every variant.

use std::rc::Rc;

use crate::event::TextContent;
use crate::util::qname::QName;

/// How far a container has been built.
///
/// A container that is not `Complete` may have more children than are
/// currently linked; `first_child`/`last_child` being `None` then means
/// "none built yet", not "none exist".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    /// An element whose start tag has been seen but whose attributes are
    /// still arriving.
    AttributesPending,
    /// Attributes are complete but more children may still be built.
    Incomplete,
    /// Every child has been built.
    Complete,
    /// The content is being skipped or streamed to a consumer instead of
    /// being built.
    Discarding,
    /// The content was skipped or streamed away and is gone.
    Discarded,
}

/// The type tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Document,
    DocumentFragment,
    Element,
    Attribute,
    NamespaceDeclaration,
    CharacterData,
    CData,
    Comment,
    ProcessingInstruction,
    DocumentType,
    EntityReference,
}

/// Information from the XML declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Encoding the input was decoded from.
    pub input_encoding: Option<String>,
    /// `version` from the XML declaration.
    pub xml_version: Option<String>,
    /// `encoding` from the XML declaration.
    pub xml_encoding: Option<String>,
    /// `standalone` from the XML declaration.
    pub standalone: Option<bool>,
}

/// An attribute's name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeData {
    /// The attribute name.
    pub name: QName,
    /// The normalized value.
    pub value: String,
    /// DTD attribute type, `CDATA` when undeclared.
    pub attr_type: Rc<str>,
    /// `false` if the value was defaulted rather than written.
    pub specified: bool,
}

/// The fields of a `<!DOCTYPE>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTypeData {
    /// The declared root element name.
    pub root_name: String,
    /// The PUBLIC identifier, if any.
    pub public_id: Option<String>,
    /// The SYSTEM identifier, if any.
    pub system_id: Option<String>,
    /// The raw internal subset, if any.
    pub internal_subset: Option<String>,
}

/// The kind of a node and its payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The document node.
    Document(DocumentInfo),

    /// A lightweight container for moving groups of nodes around.
    DocumentFragment,

    /// An element. Its attributes hang off the node as a linked list of
    /// `Attribute` and `NamespaceDeclaration` nodes.
    Element(QName),

    /// An attribute. Only ever linked into an element's attribute list.
    Attribute(AttributeData),

    /// An `xmlns`/`xmlns:p` declaration, kept in the attribute list.
    NamespaceDeclaration {
        /// Declared prefix, empty for the default namespace.
        prefix: Rc<str>,
        /// Bound URI.
        namespace_uri: Rc<str>,
    },

    /// A run of character data.
    Text {
        /// The data.
        content: TextContent,
        /// Whether it is ignorable whitespace.
        ignorable: bool,
    },

    /// A CDATA section. Its text is held in `Text` children.
    CData,

    /// A comment. Its text is held in `Text` children.
    Comment,

    /// A processing instruction. Its data is held in `Text` children.
    ProcessingInstruction {
        /// The PI target.
        target: String,
    },

    /// A document type declaration.
    DocumentType(DocTypeData),

    /// An unexpanded entity reference.
    EntityReference {
        /// The entity name.
        name: String,
        /// Replacement text, if known.
        replacement_text: Option<String>,
    },
}

impl NodeKind {
    /// Returns the type tag.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Document(_) => NodeType::Document,
            Self::DocumentFragment => NodeType::DocumentFragment,
            Self::Element(_) => NodeType::Element,
            Self::Attribute(_) => NodeType::Attribute,
            Self::NamespaceDeclaration { .. } => NodeType::NamespaceDeclaration,
            Self::Text { .. } => NodeType::CharacterData,
            Self::CData => NodeType::CData,
            Self::Comment => NodeType::Comment,
            Self::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            Self::DocumentType(_) => NodeType::DocumentType,
            Self::EntityReference { .. } => NodeType::EntityReference,
        }
    }

    /// Returns `true` for element nodes.
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self, Self::Element(_))
    }

    /// Returns `true` for character data nodes.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Returns `true` for nodes that live in an attribute list rather than
    /// a child list.
    #[must_use]
    pub fn is_attribute_like(&self) -> bool {
        matches!(self, Self::Attribute(_) | Self::NamespaceDeclaration { .. })
    }
}

/// Nodes that carry a qualified name.
pub trait Named {
    /// The node's name, for elements and attributes.
    fn qname(&self) -> Option<&QName>;

    /// The local part of the name.
    fn local_name(&self) -> Option<&str> {
        self.qname().map(|q| &*q.local_name)
    }

    /// The namespace URI, empty for no namespace.
    fn namespace_uri(&self) -> Option<&str> {
        self.qname().map(|q| &*q.namespace_uri)
    }

    /// The prefix, empty when unprefixed.
    fn prefix(&self) -> Option<&str> {
        self.qname().map(|q| &*q.prefix)
    }
}

impl Named for NodeKind {
    fn qname(&self) -> Option<&QName> {
        match self {
            Self::Element(name) => Some(name),
            Self::Attribute(attr) => Some(&attr.name),
            _ => None,
        }
    }
}

/// Nodes whose own payload is character data.
pub trait TextBearing {
    /// The node's own character data.
    fn character_data(&self) -> Option<&TextContent>;

    /// Whether the data is ignorable whitespace.
    fn is_ignorable(&self) -> bool {
        false
    }

    /// Returns `true` if the node's data is entirely XML whitespace.
    fn is_whitespace(&self) -> bool {
        self.character_data().map_or(false, TextContent::is_whitespace)
    }
}

impl TextBearing for NodeKind {
    fn character_data(&self) -> Option<&TextContent> {
        match self {
            Self::Text { content, .. } => Some(content),
            _ => None,
        }
    }

    fn is_ignorable(&self) -> bool {
        matches!(self, Self::Text { ignorable: true, .. })
    }
}

/// Node kinds that own a child list.
pub trait ContainerKind {
    /// Returns `true` if this kind of node has children.
    fn is_container(&self) -> bool;

    /// Returns `true` if a child of kind `child` may be appended.
    fn accepts_child(&self, child: &NodeKind) -> bool;
}

impl ContainerKind for NodeKind {
    fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Document(_)
                | Self::DocumentFragment
                | Self::Element(_)
                | Self::CData
                | Self::Comment
                | Self::ProcessingInstruction { .. }
        )
    }

    fn accepts_child(&self, child: &NodeKind) -> bool {
        if child.is_attribute_like() || matches!(child, Self::Document(_)) {
            return false;
        }
        match self {
            Self::Document(_) => !matches!(
                child,
                Self::Text { .. } | Self::CData | Self::EntityReference { .. } | Self::DocumentFragment
            ),
            Self::DocumentFragment | Self::Element(_) => {
                !matches!(child, Self::DocumentType(_) | Self::DocumentFragment)
            }
            Self::CData | Self::Comment | Self::ProcessingInstruction { .. } => child.is_text(),
            _ => false,
        }
    }
}
