use std::ops::Deref;

use crate::{
    parser::{xml_read_doc, xml_read_memory},
    save::xml_doc_dump_memory,
    tree::{XmlElementType, xml_new_doc},
};

use super::{
    XmlNodeError, XmlNodeOptions,
    element::ElementRef,
    node::{NodeRef, attach_node, detach_node},
};

/// A handle to a document node.
///
/// Parsing a document gives an owning handle on it. Handles to nodes inside
/// the document keep it alive after this handle is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef(pub(crate) NodeRef);

impl DocumentRef {
    /// Parse a document held in a string.
    ///
    /// `options` is a combination of
    /// [`XmlParserOption`](crate::XmlParserOption) values, usually
    /// [`DDXML_DEFAULT_PARSE_OPTIONS`](crate::DDXML_DEFAULT_PARSE_OPTIONS).
    pub fn parse_str(text: &str, options: i32) -> Result<Self, XmlNodeError> {
        let doc = xml_read_doc(text, options)?;
        Ok(Self(NodeRef::from_raw(doc)))
    }

    /// Parse a document held in memory, decoding it from the encoding given
    /// by its byte order mark or its XML declaration.
    pub fn parse_bytes(data: &[u8], options: i32) -> Result<Self, XmlNodeError> {
        let doc = xml_read_memory(data, None, options)?;
        Ok(Self(NodeRef::from_raw(doc)))
    }

    /// Create a document around `root`, which is detached from its tree
    /// first if it has a parent.
    pub fn with_root_element(root: &ElementRef) -> Self {
        let doc = Self(NodeRef::from_raw(xml_new_doc(None)));
        detach_node(root.as_raw());
        attach_node(doc.as_raw(), root.as_raw());
        doc
    }

    /// The first element child of the document.
    pub fn root_element(&self) -> Option<ElementRef> {
        self.as_raw().get_root_element().map(ElementRef::from_raw)
    }

    /// The document serialized in the encoding it declares.
    pub fn xml_data(&self) -> Vec<u8> {
        self.xml_data_with_options(XmlNodeOptions::NONE)
    }

    pub fn xml_data_with_options(&self, options: XmlNodeOptions) -> Vec<u8> {
        xml_doc_dump_memory(self.as_raw(), options.save_options())
    }

    pub fn version(&self) -> Option<String> {
        self.as_raw().version().map(|v| v.to_owned())
    }

    pub fn character_encoding(&self) -> Option<String> {
        self.as_raw().encoding().map(|e| e.to_owned())
    }

    pub fn is_standalone(&self) -> bool {
        self.as_raw().standalone().unwrap_or(false)
    }
}

impl Deref for DocumentRef {
    type Target = NodeRef;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<NodeRef> for DocumentRef {
    type Error = XmlNodeError;
    fn try_from(value: NodeRef) -> Result<Self, Self::Error> {
        match value.as_raw().element_type() {
            XmlElementType::XmlDocumentNode => Ok(Self(value)),
            _ => Err(value.invalid_operation("DocumentRef::try_from")),
        }
    }
}

impl From<DocumentRef> for NodeRef {
    fn from(value: DocumentRef) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use crate::{DDXML_DEFAULT_PARSE_OPTIONS, XmlNodeKind, XmlParserOption};

    use super::*;

    #[test]
    fn parse_and_declaration() {
        let doc = DocumentRef::parse_str(
            "<?xml version='1.0' encoding='UTF-8' standalone='yes'?><r/>",
            DDXML_DEFAULT_PARSE_OPTIONS,
        )
        .unwrap();
        assert_eq!(doc.kind(), XmlNodeKind::Document);
        assert_eq!(doc.version().as_deref(), Some("1.0"));
        assert_eq!(doc.character_encoding().as_deref(), Some("UTF-8"));
        assert!(doc.is_standalone());
        assert_eq!(doc.root_element().unwrap().name().as_deref(), Some("r"));
        assert!(doc.is_owner());
        assert_eq!(doc.level(), 0);
    }

    #[test]
    fn parse_errors_carry_a_location() {
        let strict = XmlParserOption::XmlParseNoError as i32;
        let err = DocumentRef::parse_str("<r>\n<a></b></r>", strict).unwrap_err();
        match err {
            XmlNodeError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_bytes_decodes_latin1() {
        let data = b"<?xml version='1.0' encoding='ISO-8859-1'?><r>\xe9</r>";
        let doc = DocumentRef::parse_bytes(data, DDXML_DEFAULT_PARSE_OPTIONS).unwrap();
        assert_eq!(doc.root_element().unwrap().string_value(), "\u{e9}");
        let out = doc.xml_data();
        assert!(out.ends_with(b"<r>\xe9</r>\n"));
    }

    #[test]
    fn root_element_skips_other_top_level_nodes() {
        let doc =
            DocumentRef::parse_str("<!--c--><?p?><r/>", DDXML_DEFAULT_PARSE_OPTIONS).unwrap();
        assert_eq!(doc.child_count(), 3);
        assert_eq!(doc.root_element().unwrap().index(), 2);
        assert_eq!(
            doc.xml_string(),
            "<?xml version=\"1.0\"?>\n<!--c-->\n<?p?>\n<r/>\n"
        );
    }

    #[test]
    fn with_root_element_moves_the_element() {
        let r = NodeRef::element_with_string_value("r", "t");
        let doc = DocumentRef::with_root_element(&r);
        assert!(!r.is_owner());
        assert_eq!(r.root_document().unwrap(), doc);
        drop(doc);
        assert_eq!(
            r.owner().xml_string(),
            "<?xml version=\"1.0\"?>\n<r>t</r>\n"
        );
        let node = NodeRef::from(r.owner().as_document().unwrap());
        assert!(DocumentRef::try_from(node).is_ok());
        assert!(DocumentRef::try_from(NodeRef::comment("c")).is_err());
    }
}
