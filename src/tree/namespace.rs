use super::{XML_XML_NAMESPACE, XmlElementType, XmlNode, XmlNodePtr};

/// A namespace binding: the prefix an element or attribute is written with
/// and the URI it stands for.
///
/// Bindings are kept by value on the node using them, so a subtree that is
/// unlinked from its tree never refers to a declaration it no longer sees.
/// [`XmlNodePtr::reconcile_ns`] re-creates the declarations such a subtree
/// needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlNs {
    pub(crate) prefix: Option<String>,
    pub(crate) href: String,
}

impl XmlNs {
    pub fn new(prefix: Option<&str>, href: &str) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(|p| p.to_owned()),
            href: href.to_owned(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    fn xml() -> Self {
        Self::new(Some("xml"), XML_XML_NAMESPACE)
    }
}

impl XmlNode {
    /// The binding declared by a namespace declaration node.
    pub fn as_ns(&self) -> Option<XmlNs> {
        (self.typ == XmlElementType::XmlNamespaceDecl).then(|| {
            XmlNs::new(self.name.as_deref(), self.content.as_deref().unwrap_or(""))
        })
    }
}

/// Creation of a new namespace declaration which is not attached to any
/// element yet. An empty `prefix` declares the default namespace.
#[doc(alias = "xmlNewNs")]
pub fn xml_new_ns(prefix: Option<&str>, href: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlNamespaceDecl,
        name: prefix.filter(|p| !p.is_empty()).map(|p| p.to_owned()),
        content: Some(href.to_owned()),
        ..Default::default()
    })
}

impl XmlNodePtr {
    /// Search the declaration node binding `prefix` visible from this node,
    /// walking the nearest element first.
    ///
    /// `None` stands for the default namespace.
    pub fn search_ns_decl(self, prefix: Option<&str>) -> Option<XmlNodePtr> {
        let prefix = prefix.filter(|p| !p.is_empty());
        let start = self.owner_element()?;
        start
            .ancestors_or_self()
            .filter(|n| n.typ == XmlElementType::XmlElementNode)
            .find_map(|elem| elem.ns_def_iter().find(|d| d.name.as_deref() == prefix))
    }

    /// Search a namespace binding visible from this node by its prefix.
    ///
    /// The `xml` prefix is always bound. A default namespace undeclared by
    /// `xmlns=""` is not found.
    #[doc(alias = "xmlSearchNs")]
    pub fn search_ns(self, prefix: Option<&str>) -> Option<XmlNs> {
        let prefix = prefix.filter(|p| !p.is_empty());
        if prefix == Some("xml") {
            return Some(XmlNs::xml());
        }
        self.search_ns_decl(prefix)
            .and_then(|decl| decl.as_ns())
            .filter(|ns| !ns.href.is_empty())
    }

    /// Search a namespace binding visible from this node by its URI.
    ///
    /// A binding whose prefix is redeclared closer to this node is skipped.
    /// If `prefixed` is set, the default namespace is not considered, which
    /// is what attributes need.
    #[doc(alias = "xmlSearchNsByHref")]
    pub fn search_ns_by_href(self, href: &str, prefixed: bool) -> Option<XmlNs> {
        if href == XML_XML_NAMESPACE {
            return Some(XmlNs::xml());
        }
        self.ns_in_scope()
            .into_iter()
            .filter_map(|decl| decl.as_ns())
            .find(|ns| ns.href == href && (!prefixed || ns.prefix.is_some()))
    }

    /// The declaration nodes in scope for this node, nearest first, one per
    /// prefix.
    pub fn ns_in_scope(self) -> Vec<XmlNodePtr> {
        let mut seen: Vec<Option<String>> = vec![];
        let mut out = vec![];
        let Some(start) = self.owner_element() else {
            return out;
        };
        for elem in start
            .ancestors_or_self()
            .filter(|n| n.typ == XmlElementType::XmlElementNode)
        {
            for decl in elem.ns_def_iter() {
                if seen.contains(&decl.name) {
                    continue;
                }
                seen.push(decl.name.clone());
                if decl.content.as_deref().is_some_and(|c| !c.is_empty()) {
                    out.push(decl);
                }
            }
        }
        out
    }

    /// The namespace node of the `xml` binding every element has. It is
    /// created on first use and never serialized.
    pub(crate) fn implicit_xml_ns(self) -> XmlNodePtr {
        if let Some(decl) = self.xml_ns {
            return decl;
        }
        let mut decl = xml_new_ns(Some("xml"), XML_XML_NAMESPACE);
        decl.parent = Some(self);
        let mut elem = self;
        elem.xml_ns = Some(decl);
        decl
    }

    /// Declare `prefix` on this element, or change the URI of the existing
    /// declaration of `prefix` on it.
    pub(crate) fn declare_ns(self, prefix: Option<&str>, href: &str) -> XmlNodePtr {
        let prefix = prefix.filter(|p| !p.is_empty());
        if let Some(mut decl) = self.ns_def_iter().find(|d| d.name.as_deref() == prefix) {
            decl.content = Some(href.to_owned());
            return decl;
        }
        self.add_ns_def(xml_new_ns(prefix, href))
    }

    /// A prefix `ns0`, `ns1`, ... that is not visible from this element.
    pub(crate) fn generate_prefix(self) -> String {
        (0..)
            .map(|i| format!("ns{i}"))
            .find(|p| self.search_ns_decl(Some(p)).is_none())
            .unwrap_or_default()
    }

    /// Declare `prefix` again on the elements of this subtree that use it
    /// but no longer see the URI they are bound to.
    pub(crate) fn redeclare_prefix(self, prefix: Option<&str>) {
        for node in self.subtree() {
            if !matches!(
                node.typ,
                XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode
            ) {
                continue;
            }
            let Some(ns) = node.ns.clone().filter(|ns| ns.prefix() == prefix) else {
                continue;
            };
            let Some(elem) = node.owner_element() else {
                continue;
            };
            if ns.href != XML_XML_NAMESPACE && elem.search_ns(prefix).is_none_or(|n| n != ns) {
                elem.declare_ns(prefix, &ns.href);
            }
        }
    }

    /// Make sure every binding used in the subtree rooted at this element is
    /// declared in it.
    ///
    /// Missing declarations are added to this element, or to the element
    /// using the binding if this element already binds the prefix to
    /// another URI. Attributes bound to a namespace without a prefix get a
    /// generated one.
    #[doc(alias = "xmlReconciliateNs")]
    pub(crate) fn reconcile_ns(self) {
        self.reconcile_nodes(self.subtree());
    }

    /// Same as [`reconcile_ns`](Self::reconcile_ns), for `nodes` of the
    /// subtree only.
    pub(crate) fn reconcile_nodes(self, nodes: impl IntoIterator<Item = XmlNodePtr>) {
        if self.typ != XmlElementType::XmlElementNode {
            return;
        }
        for node in nodes {
            if !matches!(
                node.typ,
                XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode
            ) {
                continue;
            }
            let Some(ns) = node.ns.clone() else {
                continue;
            };
            if ns.href == XML_XML_NAMESPACE {
                continue;
            }
            let Some(elem) = node.owner_element() else {
                continue;
            };
            let mut node = node;
            if node.typ == XmlElementType::XmlAttributeNode && ns.prefix.is_none() {
                let bound = elem.search_ns_by_href(&ns.href, true).unwrap_or_else(|| {
                    let prefix = elem.generate_prefix();
                    self.declare_ns(Some(&prefix), &ns.href);
                    XmlNs::new(Some(&prefix), &ns.href)
                });
                node.ns = Some(bound);
                continue;
            }
            match elem.search_ns(ns.prefix()) {
                Some(found) if found.href == ns.href => {}
                found => {
                    let root_binds = self
                        .ns_def_iter()
                        .any(|d| d.name.as_deref() == ns.prefix());
                    let target = if found.is_none() && !root_binds {
                        self
                    } else {
                        elem
                    };
                    target.declare_ns(ns.prefix(), &ns.href);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{xml_free_node, xml_new_node, xml_new_prop};

    use super::*;

    #[test]
    fn search_walks_ancestors() {
        let root = xml_new_node(None, "r");
        root.add_ns_def(xml_new_ns(Some("p"), "urn:p"));
        root.add_ns_def(xml_new_ns(None, "urn:d"));
        let child = root.add_child(xml_new_node(None, "c"));
        child.add_ns_def(xml_new_ns(None, ""));

        assert_eq!(child.search_ns(Some("p")).unwrap().href(), "urn:p");
        assert!(child.search_ns(None).is_none());
        assert_eq!(root.search_ns(None).unwrap().href(), "urn:d");
        assert_eq!(child.search_ns(Some("xml")).unwrap().href(), XML_XML_NAMESPACE);
        assert_eq!(
            child.search_ns_by_href("urn:p", true).unwrap().prefix(),
            Some("p")
        );
        assert!(child.search_ns_by_href("urn:d", false).is_none());
        unsafe { xml_free_node(root) };
    }

    #[test]
    fn reconcile_declares_missing_bindings() {
        let root = xml_new_node(None, "r");
        root.add_ns_def(xml_new_ns(Some("p"), "urn:p"));
        let child = root.add_child(xml_new_node(Some(XmlNs::new(Some("p"), "urn:p")), "c"));
        child.add_child(xml_new_prop(Some(XmlNs::new(None, "urn:a")), "x", "1"));
        child.unlink();
        child.reconcile_ns();

        let decls = child
            .ns_def_iter()
            .filter_map(|d| d.as_ns())
            .collect::<Vec<_>>();
        assert!(decls.contains(&XmlNs::new(Some("p"), "urn:p")));
        assert!(decls.contains(&XmlNs::new(Some("ns0"), "urn:a")));
        let attr = child.properties.unwrap();
        assert_eq!(attr.ns().unwrap().prefix(), Some("ns0"));
        unsafe {
            xml_free_node(root);
            xml_free_node(child);
        }
    }
}
