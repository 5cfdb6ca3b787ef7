use super::{XmlElementType, XmlNode, XmlNodePtr};

/// Creates a new XML document.
///
/// If `version` is `None`, `"1.0"` is used.
#[doc(alias = "xmlNewDoc")]
pub fn xml_new_doc(version: Option<&str>) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlDocumentNode,
        version: Some(version.unwrap_or("1.0").to_owned()),
        ..Default::default()
    })
}

/// Create the internal subset of a document.
///
/// `content` is the source text between `<!DOCTYPE` and the closing `>`.
#[doc(alias = "xmlCreateIntSubset")]
pub fn xml_new_dtd(name: &str, content: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlDTDNode,
        name: Some(name.to_owned()),
        content: Some(content.to_owned()),
        ..Default::default()
    })
}

/// Create a markup declaration of the internal subset (`<!ELEMENT`,
/// `<!ATTLIST`, `<!ENTITY` or `<!NOTATION`).
pub fn xml_new_decl(typ: XmlElementType, name: &str, source: &str) -> XmlNodePtr {
    debug_assert!(matches!(
        typ,
        XmlElementType::XmlElementDecl
            | XmlElementType::XmlAttributeDecl
            | XmlElementType::XmlEntityDecl
            | XmlElementType::XmlNotationNode
    ));
    XmlNodePtr::new(XmlNode {
        typ,
        name: Some(name.to_owned()),
        content: Some(source.to_owned()),
        ..Default::default()
    })
}

impl XmlNode {
    /// The version declared by the XML declaration of a document.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The encoding declared by the XML declaration of a document.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// The `standalone` pseudo-attribute of a document, if declared.
    pub fn standalone(&self) -> Option<bool> {
        self.standalone
    }
}

impl XmlNodePtr {
    /// Get the root element of the document: the first element child.
    #[doc(alias = "xmlDocGetRootElement")]
    pub fn get_root_element(self) -> Option<XmlNodePtr> {
        self.children_iter()
            .find(|c| c.typ == XmlElementType::XmlElementNode)
    }

    /// Get the internal subset of a document.
    #[doc(alias = "xmlGetIntSubset")]
    pub fn get_int_subset(self) -> Option<XmlNodePtr> {
        self.children_iter()
            .find(|c| c.typ == XmlElementType::XmlDTDNode)
    }

    /// The document this node belongs to, if its tree is rooted at one.
    pub fn document(self) -> Option<XmlNodePtr> {
        Some(self.tree_root()).filter(|root| root.typ == XmlElementType::XmlDocumentNode)
    }
}
