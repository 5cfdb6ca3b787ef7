//! Object-style handles over the nodes of a tree, in the manner of NSXML.
//!
//! A handle ([`NodeRef`](node::NodeRef), [`ElementRef`](element::ElementRef),
//! [`DocumentRef`](document::DocumentRef)) wraps one node of a tree and keeps
//! the whole tree alive. Trees are freed as a unit, so every handle counts
//! itself on the root of the tree it currently lives in, and the tree is
//! released when the last of these handles is dropped, whichever it is.
//!
//! Moving a subtree to another tree (detaching it, or composing it into a new
//! element) moves the counts of the handles inside it along with it. Handles
//! never go stale: a handle to a node of a detached subtree now keeps that
//! subtree alive instead of its old tree.
//!
//! # Note
//! - Handles are neither `Send` nor `Sync`. A tree belongs to one thread.
//! - Child handles are created on demand and never cached.

pub mod document;
pub mod element;
pub mod node;

use std::ops::{BitOr, BitOrAssign};

use anyhow::bail;

pub use crate::error::XmlNodeError;
use crate::{save::XmlSaveOption, tree::XmlElementType};

/// The kind of node a handle wraps.
///
/// Values are those of the corresponding [`XmlElementType`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XmlNodeKind {
    #[default]
    Invalid = 0,
    Document = 9,
    Element = 1,
    Attribute = 2,
    Namespace = 18,
    ProcessingInstruction = 7,
    Comment = 8,
    /// Text, including CDATA sections.
    Text = 3,
    DTD = 14,
    EntityDeclaration = 17,
    AttributeDeclaration = 16,
    ElementDeclaration = 15,
    NotationDeclaration = 12,
}

impl From<XmlElementType> for XmlNodeKind {
    fn from(value: XmlElementType) -> Self {
        match value {
            XmlElementType::XmlDocumentNode | XmlElementType::XmlHTMLDocumentNode => {
                Self::Document
            }
            XmlElementType::XmlElementNode => Self::Element,
            XmlElementType::XmlAttributeNode => Self::Attribute,
            XmlElementType::XmlNamespaceDecl => Self::Namespace,
            XmlElementType::XmlPINode => Self::ProcessingInstruction,
            XmlElementType::XmlCommentNode => Self::Comment,
            XmlElementType::XmlTextNode | XmlElementType::XmlCDATASectionNode => Self::Text,
            XmlElementType::XmlDTDNode => Self::DTD,
            XmlElementType::XmlEntityDecl => Self::EntityDeclaration,
            XmlElementType::XmlAttributeDecl => Self::AttributeDeclaration,
            XmlElementType::XmlElementDecl => Self::ElementDeclaration,
            XmlElementType::XmlNotationNode => Self::NotationDeclaration,
            _ => Self::Invalid,
        }
    }
}

impl TryFrom<u32> for XmlNodeKind {
    type Error = anyhow::Error;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Invalid,
            1 => Self::Element,
            2 => Self::Attribute,
            3 => Self::Text,
            7 => Self::ProcessingInstruction,
            8 => Self::Comment,
            9 => Self::Document,
            12 => Self::NotationDeclaration,
            14 => Self::DTD,
            15 => Self::ElementDeclaration,
            16 => Self::AttributeDeclaration,
            17 => Self::EntityDeclaration,
            18 => Self::Namespace,
            _ => bail!("Invalid convert from value '{value}' to XmlNodeKind"),
        })
    }
}

/// Serialization options of the handles.
///
/// Values are part of the public contract and never change.
/// `EXPAND_EMPTY_ELEMENT` wins over `COMPACT_EMPTY_ELEMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XmlNodeOptions(u32);

impl XmlNodeOptions {
    pub const NONE: Self = Self(0);
    /// Write empty elements as `<x></x>`.
    pub const EXPAND_EMPTY_ELEMENT: Self = Self(1 << 1);
    /// Write empty elements as `<x/>`.
    pub const COMPACT_EMPTY_ELEMENT: Self = Self(1 << 2);
    /// Indent nested elements, one per line.
    pub const PRETTY_PRINT: Self = Self(1 << 17);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The options of the serializer these flags stand for.
    pub(crate) fn save_options(self) -> i32 {
        let mut options = 0;
        if self.contains(Self::PRETTY_PRINT) {
            options |= XmlSaveOption::XmlSaveFormat as i32;
        }
        if self.contains(Self::EXPAND_EMPTY_ELEMENT) {
            options |= XmlSaveOption::XmlSaveNoEmpty as i32;
        }
        options
    }
}

impl BitOr for XmlNodeOptions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for XmlNodeOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_tree_numbering() {
        assert_eq!(XmlNodeKind::from(XmlElementType::XmlElementNode) as u32, 1);
        assert_eq!(
            XmlNodeKind::from(XmlElementType::XmlCDATASectionNode),
            XmlNodeKind::Text
        );
        assert_eq!(
            XmlNodeKind::from(XmlElementType::XmlNamespaceDecl) as u32,
            XmlElementType::XmlNamespaceDecl as u32
        );
        assert_eq!(XmlNodeKind::try_from(17).unwrap(), XmlNodeKind::EntityDeclaration);
        assert!(XmlNodeKind::try_from(4).is_err());
    }

    #[test]
    fn option_values_are_stable() {
        assert_eq!(XmlNodeOptions::EXPAND_EMPTY_ELEMENT.bits(), 2);
        assert_eq!(XmlNodeOptions::COMPACT_EMPTY_ELEMENT.bits(), 4);
        assert_eq!(XmlNodeOptions::PRETTY_PRINT.bits(), 131072);
        let both = XmlNodeOptions::EXPAND_EMPTY_ELEMENT | XmlNodeOptions::COMPACT_EMPTY_ELEMENT;
        assert_eq!(both.save_options(), XmlSaveOption::XmlSaveNoEmpty as i32);
        assert_eq!(XmlNodeOptions::NONE.save_options(), 0);
    }
}
