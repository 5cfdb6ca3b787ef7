//! Node records of an XML tree and the primitives that link, unlink, copy
//! and free them.
//!
//! A tree is a set of [`XmlNode`]s allocated on the heap and linked through
//! [`XmlNodePtr`]. A node without parent is the root of its tree, and the
//! whole tree is released with [`xml_free_node`] on that root. Unlinking a
//! node makes it the root of a tree of its own.
//!
//! Attributes and namespace declarations are nodes too. They hang off their
//! element through `properties` and `ns_def` and have that element as parent.

mod document;
mod namespace;
mod node;

use std::any::type_name;

pub use document::*;
pub use namespace::*;
pub use node::*;

/// This is the namespace for the special xml: prefix predefined in the
/// XML Namespace specification.
pub const XML_XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace of `xmlns` declarations themselves.
pub const XML_XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// The different element types carried by an XML tree.
///
/// # NOTE
/// This is synchronized with DOM Level1 values.
/// See <http://www.w3.org/TR/REC-DOM-Level-1/>
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XmlElementType {
    #[default]
    XmlInvalidNode = 0,
    XmlElementNode = 1,
    XmlAttributeNode = 2,
    XmlTextNode = 3,
    XmlCDATASectionNode = 4,
    XmlEntityRefNode = 5,
    XmlEntityNode = 6,
    XmlPINode = 7,
    XmlCommentNode = 8,
    XmlDocumentNode = 9,
    XmlDocumentTypeNode = 10,
    XmlDocumentFragNode = 11,
    XmlNotationNode = 12,
    XmlHTMLDocumentNode = 13,
    XmlDTDNode = 14,
    XmlElementDecl = 15,
    XmlAttributeDecl = 16,
    XmlEntityDecl = 17,
    XmlNamespaceDecl = 18,
}

impl TryFrom<i32> for XmlElementType {
    type Error = anyhow::Error;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::XmlInvalidNode),
            1 => Ok(Self::XmlElementNode),
            2 => Ok(Self::XmlAttributeNode),
            3 => Ok(Self::XmlTextNode),
            4 => Ok(Self::XmlCDATASectionNode),
            5 => Ok(Self::XmlEntityRefNode),
            6 => Ok(Self::XmlEntityNode),
            7 => Ok(Self::XmlPINode),
            8 => Ok(Self::XmlCommentNode),
            9 => Ok(Self::XmlDocumentNode),
            10 => Ok(Self::XmlDocumentTypeNode),
            11 => Ok(Self::XmlDocumentFragNode),
            12 => Ok(Self::XmlNotationNode),
            13 => Ok(Self::XmlHTMLDocumentNode),
            14 => Ok(Self::XmlDTDNode),
            15 => Ok(Self::XmlElementDecl),
            16 => Ok(Self::XmlAttributeDecl),
            17 => Ok(Self::XmlEntityDecl),
            18 => Ok(Self::XmlNamespaceDecl),
            _ => Err(anyhow::anyhow!(
                "Invalid convert from value '{value}' to {}",
                type_name::<Self>()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_from_i32() {
        assert_eq!(
            XmlElementType::try_from(1).unwrap(),
            XmlElementType::XmlElementNode
        );
        assert_eq!(
            XmlElementType::try_from(18).unwrap(),
            XmlElementType::XmlNamespaceDecl
        );
        assert!(XmlElementType::try_from(42).is_err());
    }
}
