use std::{collections::HashMap, ops::Deref};

use crate::{
    parser::qname::{local_name_for_name, split_qname2},
    tree::{XmlElementType, XmlNodePtr, xml_new_prop},
};

use super::{
    XmlNodeError, XmlNodeKind, XmlNodeOptions,
    node::{NodeRef, attach_node, bind_qname, detach_node, rebind_prefix},
};

/// A handle to an element node.
///
/// Everything a [`NodeRef`] does is available through `Deref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub(crate) NodeRef);

fn local_name_of(node: &XmlNodePtr) -> &str {
    local_name_for_name(node.name().unwrap_or(""))
}

fn uri_of(node: &XmlNodePtr) -> &str {
    node.ns().map(|ns| ns.href()).unwrap_or("")
}

impl ElementRef {
    pub(crate) fn from_raw(node: XmlNodePtr) -> Self {
        debug_assert_eq!(node.element_type(), XmlElementType::XmlElementNode);
        Self(NodeRef::from_raw(node))
    }

    /// Create an element whose default namespace is `xmlns`.
    pub fn with_xmlns(name: &str, xmlns: &str) -> Self {
        let elem = NodeRef::element(name);
        elem.set_xmlns(xmlns);
        elem
    }

    fn element_children(&self) -> impl Iterator<Item = XmlNodePtr> {
        self.as_raw()
            .children_iter()
            .filter(|child| child.element_type() == XmlElementType::XmlElementNode)
    }

    /// The child elements called `name`.
    ///
    /// An unprefixed `name` matches the local name of the children. A
    /// prefixed one matches the name as written, or the local name and
    /// namespace if the prefix is bound in scope of this element.
    pub fn elements_for_name(&self, name: &str) -> Vec<ElementRef> {
        self.matching_children(name)
            .map(ElementRef::from_raw)
            .collect()
    }

    fn matching_children(&self, name: &str) -> impl Iterator<Item = XmlNodePtr> {
        let qname = split_qname2(name).map(|(prefix, local)| {
            let uri = self.as_raw().search_ns(Some(prefix)).map(|ns| ns.href().to_owned());
            (local.to_owned(), uri)
        });
        let name = name.to_owned();
        self.element_children().filter(move |child| match &qname {
            Some((local, uri)) => {
                child.qualified_name().is_some_and(|q| q == name.as_str())
                    || uri.as_deref().is_some_and(|uri| {
                        local_name_of(child) == local.as_str() && uri_of(child) == uri
                    })
            }
            None => local_name_of(child) == name.as_str(),
        })
    }

    /// The first child element called `name`, see
    /// [`ElementRef::elements_for_name`].
    pub fn element_for_name(&self, name: &str) -> Option<ElementRef> {
        self.matching_children(name).next().map(ElementRef::from_raw)
    }

    /// The first child element called `name` in the namespace `xmlns`.
    pub fn element_for_name_with_xmlns(&self, name: &str, xmlns: &str) -> Option<ElementRef> {
        self.matching_children(name)
            .find(|child| uri_of(child) == xmlns)
            .map(ElementRef::from_raw)
    }

    /// The child elements with local name `local` in the namespace `uri`.
    /// An empty `uri` stands for no namespace.
    pub fn elements_for_local_name(&self, local: &str, uri: &str) -> Vec<ElementRef> {
        self.element_children()
            .filter(|child| local_name_of(child) == local && uri_of(child) == uri)
            .map(ElementRef::from_raw)
            .collect()
    }

    /// Add the attribute `name="value"`, or change the value of the
    /// attribute written `name` if there is one.
    pub fn add_attribute_with_name(&self, name: &str, value: &str) {
        let elem = self.as_raw();
        if let Some(attr) = elem.has_prop(name) {
            attr.set_content(value);
            return;
        }
        let attr = xml_new_prop(None, name, value);
        attach_node(elem, attr);
        bind_qname(attr, name);
    }

    /// Remove the attribute written `name`.
    ///
    /// Handles to it stay valid and own it from now on.
    pub fn remove_attribute_for_name(&self, name: &str) {
        if let Some(attr) = self.as_raw().has_prop(name) {
            detach_node(attr);
        }
    }

    /// The attribute written `name`, or else the first whose local name is
    /// `name`.
    pub fn attribute_for_name(&self, name: &str) -> Option<NodeRef> {
        let elem = self.as_raw();
        elem.has_prop(name)
            .or_else(|| {
                elem.properties_iter()
                    .find(|attr| attr.name() == Some(name))
            })
            .map(NodeRef::from_raw)
    }

    pub fn attributes(&self) -> Vec<NodeRef> {
        self.as_raw()
            .properties_iter()
            .map(NodeRef::from_raw)
            .collect()
    }

    /// The attribute values by the name they are written with.
    pub fn attributes_as_dictionary(&self) -> HashMap<String, String> {
        self.as_raw()
            .properties_iter()
            .map(|attr| {
                let name = attr.qualified_name().unwrap_or_default().into_owned();
                (name, attr.get_content())
            })
            .collect()
    }

    /// The namespace declarations of this element.
    pub fn namespaces(&self) -> Vec<NodeRef> {
        self.as_raw().ns_def_iter().map(NodeRef::from_raw).collect()
    }

    /// The declaration of `prefix` on this element. An empty `prefix` looks
    /// for the default namespace.
    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<NodeRef> {
        let prefix = Some(prefix).filter(|p| !p.is_empty());
        self.as_raw()
            .ns_def_iter()
            .find(|decl| decl.name() == prefix)
            .map(NodeRef::from_raw)
    }

    /// The declaration in scope binding the prefix of the QName `name`, or
    /// the default namespace if `name` has no prefix.
    pub fn resolve_namespace_for_name(&self, name: &str) -> Option<NodeRef> {
        let prefix = split_qname2(name).map(|(prefix, _)| prefix);
        self.as_raw()
            .search_ns_decl(prefix)
            .filter(|decl| decl.content().is_some_and(|uri| !uri.is_empty()))
            .map(NodeRef::from_raw)
    }

    /// A prefix bound to `uri` in scope of this element, empty for the
    /// default namespace.
    pub fn resolve_prefix_for_namespace_uri(&self, uri: &str) -> Option<String> {
        self.as_raw()
            .search_ns_by_href(uri, false)
            .map(|ns| ns.prefix().unwrap_or("").to_owned())
    }

    /// The default namespace declared on this element, empty if there is
    /// none.
    pub fn xmlns(&self) -> String {
        self.namespace_for_prefix("")
            .map(|decl| decl.string_value())
            .unwrap_or_default()
    }

    /// Declare `uri` as the default namespace of this element. An empty
    /// `uri` removes the declaration.
    ///
    /// Unprefixed elements of the subtree that used the old default
    /// namespace follow the change.
    pub fn set_xmlns(&self, uri: &str) {
        let elem = self.as_raw();
        match elem.ns_def_iter().find(|decl| decl.name().is_none()) {
            Some(decl) if uri.is_empty() => detach_node(decl),
            Some(mut decl) => decl.content = Some(uri.to_owned()),
            None if uri.is_empty() => return,
            None => {
                elem.declare_ns(None, uri);
            }
        }
        rebind_prefix(elem, None);
    }

    pub fn pretty_xml_string(&self) -> String {
        self.xml_string_with_options(XmlNodeOptions::PRETTY_PRINT)
    }

    pub fn compact_xml_string(&self) -> String {
        self.xml_string_with_options(XmlNodeOptions::COMPACT_EMPTY_ELEMENT)
    }
}

impl Deref for ElementRef {
    type Target = NodeRef;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<NodeRef> for ElementRef {
    type Error = XmlNodeError;
    fn try_from(value: NodeRef) -> Result<Self, Self::Error> {
        match value.kind() {
            XmlNodeKind::Element => Ok(Self(value)),
            _ => Err(value.invalid_operation("ElementRef::try_from")),
        }
    }
}

impl From<ElementRef> for NodeRef {
    fn from(value: ElementRef) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use crate::{DDXML_DEFAULT_PARSE_OPTIONS, DocumentRef};

    use super::*;

    fn root(text: &str) -> ElementRef {
        DocumentRef::parse_str(text, DDXML_DEFAULT_PARSE_OPTIONS)
            .unwrap()
            .root_element()
            .unwrap()
    }

    #[test]
    fn finds_children_by_name() {
        let r = root("<r xmlns:p='urn:p' xmlns:q='urn:p'><a/><p:a/><q:b/><x:c/></r>");
        assert_eq!(r.elements_for_name("a").len(), 2);
        assert_eq!(r.elements_for_name("p:a").len(), 1);
        // q:b is p:b as far as namespaces go
        assert_eq!(
            r.element_for_name("p:b").unwrap().name().as_deref(),
            Some("q:b")
        );
        assert!(r.element_for_name("x:c").is_some());
        assert!(r.element_for_name("c").is_some());
        assert!(r.element_for_name("d").is_none());
        assert!(r.element_for_name_with_xmlns("a", "urn:p").is_some());
        assert_eq!(r.elements_for_local_name("a", "").len(), 1);
        assert_eq!(r.elements_for_local_name("b", "urn:p").len(), 1);
    }

    #[test]
    fn attribute_dictionary() {
        let r = root("<a x='1' y='2'/>");
        let attrs = r.attributes_as_dictionary();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["x"], "1");
        assert_eq!(attrs["y"], "2");
        assert_eq!(r.attributes().len(), 2);
    }

    #[test]
    fn add_attribute_replaces_in_place() {
        let r = root("<a x='1' y='2'/>");
        r.add_attribute_with_name("x", "3");
        r.add_attribute_with_name("z", "4");
        assert_eq!(r.xml_string(), "<a x=\"3\" y=\"2\" z=\"4\"/>");

        let x = r.attribute_for_name("x").unwrap();
        r.remove_attribute_for_name("x");
        assert!(x.is_owner());
        assert_eq!(x.xml_string(), "x=\"3\"");
        assert_eq!(r.xml_string(), "<a y=\"2\" z=\"4\"/>");
    }

    #[test]
    fn prefixed_attribute_names_bind_in_scope() {
        let r = root("<r xmlns:p='urn:p'/>");
        r.add_attribute_with_name("p:x", "1");
        r.add_attribute_with_name("q:y", "2");
        let x = r.attribute_for_name("p:x").unwrap();
        assert_eq!(x.uri().as_deref(), Some("urn:p"));
        assert_eq!(r.attribute_for_name("x").unwrap(), x);
        let y = r.attribute_for_name("q:y").unwrap();
        assert_eq!(y.uri(), None);
    }

    #[test]
    fn namespace_lookups() {
        let r = root("<r xmlns='urn:d' xmlns:p='urn:p'><c/></r>");
        assert_eq!(r.namespaces().len(), 2);
        assert_eq!(r.namespace_for_prefix("p").unwrap().string_value(), "urn:p");
        assert_eq!(r.namespace_for_prefix("").unwrap().string_value(), "urn:d");
        let c = r.element_for_name("c").unwrap();
        assert!(c.namespace_for_prefix("p").is_none());
        assert_eq!(
            c.resolve_namespace_for_name("p:z").unwrap().string_value(),
            "urn:p"
        );
        assert_eq!(c.resolve_namespace_for_name("z").unwrap().string_value(), "urn:d");
        assert!(c.resolve_namespace_for_name("q:z").is_none());
        assert_eq!(c.resolve_prefix_for_namespace_uri("urn:p").as_deref(), Some("p"));
        assert_eq!(c.resolve_prefix_for_namespace_uri("urn:d").as_deref(), Some(""));
        assert!(c.resolve_prefix_for_namespace_uri("urn:x").is_none());
    }

    #[test]
    fn xmlns_follows_the_default_namespace() {
        let r = root("<r xmlns='urn:a'><c/><p:d xmlns:p='urn:p'/></r>");
        let c = r.element_for_name("c").unwrap();
        assert_eq!(r.xmlns(), "urn:a");
        assert_eq!(c.xmlns(), "");
        assert_eq!(c.uri().as_deref(), Some("urn:a"));

        r.set_xmlns("urn:b");
        assert_eq!(r.uri().as_deref(), Some("urn:b"));
        assert_eq!(c.uri().as_deref(), Some("urn:b"));
        let d = r.element_for_name("p:d").unwrap();
        assert_eq!(d.uri().as_deref(), Some("urn:p"));

        r.set_xmlns("");
        assert_eq!(r.xmlns(), "");
        assert_eq!(c.uri(), None);
        assert_eq!(r.xml_string(), "<r><c/><p:d xmlns:p=\"urn:p\"/></r>");
    }

    #[test]
    fn with_xmlns_and_output_modes() {
        let e = ElementRef::with_xmlns("e", "urn:e");
        assert_eq!(e.uri().as_deref(), Some("urn:e"));
        assert_eq!(e.compact_xml_string(), "<e xmlns=\"urn:e\"/>");

        let r = root("<r><a><b/></a><c>t</c></r>");
        assert_eq!(
            r.pretty_xml_string(),
            "<r>\n  <a>\n    <b/>\n  </a>\n  <c>t</c>\n</r>\n"
        );
    }

    #[test]
    fn conversions() {
        let text = NodeRef::text("t");
        assert!(ElementRef::try_from(text.clone()).is_err());
        assert!(text.as_element().is_none());
        let e = NodeRef::element("e");
        let node = NodeRef::from(e.clone());
        assert_eq!(ElementRef::try_from(node).unwrap(), e);
    }
}
