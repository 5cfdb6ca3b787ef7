#[cfg(feature = "xpath")]
use std::collections::HashMap;
use std::{
    fmt,
    hash::{Hash, Hasher},
    iter::successors,
};

use log::{trace, warn};

#[cfg(feature = "xpath")]
use crate::xpath::{XmlXPathContext, XmlXPathObject, xml_xpath_compile};
use crate::{
    error::XmlNodeError,
    globals,
    parser::qname::{local_name_for_name, prefix_for_name, split_qname2},
    save::xml_node_dump,
    tree::{
        XmlElementType, XmlNodePtr, XmlNs, xml_free_node, xml_new_comment, xml_new_node,
        xml_new_ns, xml_new_pi, xml_new_prop, xml_new_text,
    },
};

use super::{XmlNodeKind, XmlNodeOptions, document::DocumentRef, element::ElementRef};

/// Release the tree rooted at `root`. No handle may point into it.
fn free_tree(root: XmlNodePtr) {
    debug_assert!(root.parent().is_none() && root.tree_refs == 0);
    trace!("freeing the tree rooted at {root:?}");
    // # Safety
    // `root` has no parent and its handle count dropped to zero, so no
    // pointer into the tree survives this call.
    unsafe { xml_free_node(root) }
}

/// Unlink `node` from its parent and make it the root of a tree of its own.
///
/// The handles inside the subtree now count on the new root. Either tree is
/// freed if no handle is left in it.
pub(crate) fn detach_node(node: XmlNodePtr) {
    if node.parent().is_none() {
        return;
    }
    let mut old_root = node.tree_root();
    let moved = node.subtree().iter().map(|n| n.refs).sum::<usize>();
    let declared = (node.element_type() == XmlElementType::XmlNamespaceDecl)
        .then(|| node.parent())
        .flatten();
    node.unlink();
    if let Some(elem) = declared {
        // users of the removed declaration keep their URI
        elem.redeclare_prefix(node.name());
    }
    old_root.tree_refs -= moved;
    let mut node = node;
    node.tree_refs = moved;
    node.reconcile_ns();
    trace!("detached {node:?} with {moved} handle(s)");

    if old_root.tree_refs == 0 {
        free_tree(old_root);
    }
    if moved == 0 {
        free_tree(node);
    }
}

/// Append the tree rooted at `child` to `parent`, moving the handles counted
/// on `child` to the tree of `parent`.
pub(crate) fn attach_node(parent: XmlNodePtr, mut child: XmlNodePtr) {
    debug_assert!(child.parent().is_none());
    let moved = std::mem::take(&mut child.tree_refs);
    parent.add_child(child);
    let mut root = parent.tree_root();
    root.tree_refs += moved;
    trace!("attached {child:?} to {parent:?} with {moved} handle(s)");
}

/// Resolve again the bindings of `prefix` used in the subtree of `elem`,
/// after a declaration of `prefix` on `elem` changed.
///
/// `None` stands for the default namespace, which attributes never use.
pub(crate) fn rebind_prefix(elem: XmlNodePtr, prefix: Option<&str>) {
    for mut node in elem.subtree() {
        let bound = match node.element_type() {
            XmlElementType::XmlElementNode => match node.ns() {
                Some(ns) => ns.prefix() == prefix,
                // a literal `p:x` name is not in the default namespace
                None => prefix.is_none() && node.name().is_some_and(|n| !n.contains(':')),
            },
            XmlElementType::XmlAttributeNode => {
                prefix.is_some() && node.ns().is_some_and(|ns| ns.prefix() == prefix)
            }
            _ => false,
        };
        if !bound {
            continue;
        }
        match node.search_ns(prefix) {
            Some(ns) => node.ns = Some(ns),
            None if prefix.is_none() => node.ns = None,
            None => {}
        }
    }
}

/// Set the name of an element or attribute to the QName `name`, binding it
/// to the namespace of its prefix if that prefix is in scope.
pub(crate) fn bind_qname(mut node: XmlNodePtr, name: &str) {
    let scope = node.owner_element();
    let (local, ns) = match split_qname2(name) {
        Some((prefix, local)) => match scope.and_then(|elem| elem.search_ns(Some(prefix))) {
            Some(ns) => (local, Some(ns)),
            None => (name, None),
        },
        None if node.element_type() == XmlElementType::XmlElementNode => {
            (name, scope.and_then(|elem| elem.search_ns(None)))
        }
        None => (name, None),
    };
    node.name = Some(local.to_owned());
    node.ns = ns;
}

/// A handle to one node of a tree.
///
/// Every handle keeps the whole tree it lives in alive. Two handles are equal
/// if they wrap the same node. The node record itself is never handed out,
/// since a copy of it would not keep the tree alive:
///
/// ```compile_fail
/// let elem = ddxml::NodeRef::element("e");
/// let raw = elem.as_raw();
/// ```
pub struct NodeRef {
    node: XmlNodePtr,
}

impl NodeRef {
    /// Create a handle on `node` and count it on the root of its tree.
    pub(crate) fn from_raw(node: XmlNodePtr) -> Self {
        let mut node = node;
        node.refs += 1;
        let mut root = node.tree_root();
        root.tree_refs += 1;
        trace!("new handle on {node:?}, {} in its tree", root.tree_refs);
        Self { node }
    }

    /// The node record this handle wraps.
    ///
    /// The pointer stays valid as long as this handle lives.
    pub(crate) fn as_raw(&self) -> XmlNodePtr {
        self.node
    }

    /// Create an owning handle on a new one-node tree.
    fn new_tree(node: XmlNodePtr) -> Self {
        trace!("new tree rooted at {node:?}");
        Self::from_raw(node)
    }

    pub fn element(name: &str) -> ElementRef {
        ElementRef(Self::new_tree(xml_new_node(None, name)))
    }

    /// Create an element in the namespace `uri`.
    ///
    /// A prefixed `name` declares its prefix, otherwise `uri` becomes the
    /// default namespace of the element.
    pub fn element_with_uri(name: &str, uri: &str) -> ElementRef {
        match split_qname2(name) {
            Some((prefix, local)) if !uri.is_empty() => {
                let node = xml_new_node(Some(XmlNs::new(Some(prefix), uri)), local);
                node.declare_ns(Some(prefix), uri);
                ElementRef(Self::new_tree(node))
            }
            _ => {
                let elem = Self::element(name);
                elem.set_uri(uri);
                elem
            }
        }
    }

    /// Create an element holding one text node.
    pub fn element_with_string_value(name: &str, value: &str) -> ElementRef {
        let elem = Self::element(name);
        elem.set_string_value(value);
        elem
    }

    /// Create an element and move `children` and `attributes` into it.
    ///
    /// Nodes that have a parent are detached first. The given handles stay
    /// valid and now live in the tree of the new element.
    pub fn element_with_children(
        name: &str,
        children: &[NodeRef],
        attributes: &[NodeRef],
    ) -> Result<ElementRef, XmlNodeError> {
        for child in children {
            if matches!(
                child.kind(),
                XmlNodeKind::Document | XmlNodeKind::Attribute | XmlNodeKind::Namespace
            ) {
                return Err(child.invalid_operation("element_with_children"));
            }
        }
        if let Some(attr) = attributes
            .iter()
            .find(|attr| attr.kind() != XmlNodeKind::Attribute)
        {
            return Err(attr.invalid_operation("element_with_children"));
        }

        let elem = Self::element(name);
        let parent = elem.as_raw();
        for node in children.iter().chain(attributes) {
            if node.node == parent {
                continue;
            }
            detach_node(node.node);
            attach_node(parent, node.node);
        }
        // moved subtrees declare what they use, attributes may not
        parent.reconcile_nodes(parent.properties_iter().collect::<Vec<_>>());
        Ok(elem)
    }

    pub fn attribute(name: &str, value: &str) -> NodeRef {
        Self::new_tree(xml_new_prop(None, name, value))
    }

    /// Create an attribute in the namespace `uri`.
    ///
    /// Without a prefix in `name`, one is chosen when the attribute is added
    /// to an element.
    pub fn attribute_with_uri(name: &str, uri: &str, value: &str) -> NodeRef {
        if uri.is_empty() {
            return Self::attribute(name, value);
        }
        let (prefix, local) = match split_qname2(name) {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name),
        };
        Self::new_tree(xml_new_prop(Some(XmlNs::new(prefix, uri)), local, value))
    }

    /// Create a namespace declaration. An empty `prefix` declares the default
    /// namespace.
    pub fn namespace(prefix: &str, uri: &str) -> NodeRef {
        Self::new_tree(xml_new_ns(Some(prefix), uri))
    }

    pub fn processing_instruction(target: &str, value: &str) -> NodeRef {
        Self::new_tree(xml_new_pi(target, Some(value)))
    }

    pub fn comment(value: &str) -> NodeRef {
        Self::new_tree(xml_new_comment(value))
    }

    pub fn text(value: &str) -> NodeRef {
        Self::new_tree(xml_new_text(value))
    }

    pub(crate) fn invalid_operation(&self, operation: &'static str) -> XmlNodeError {
        XmlNodeError::InvalidOperation {
            kind: self.kind(),
            operation,
        }
    }

    pub fn kind(&self) -> XmlNodeKind {
        XmlNodeKind::from(self.node.element_type())
    }

    /// The name of the node.
    ///
    /// This is the qualified name of elements and attributes, the prefix of
    /// namespaces (empty for the default one) and the target of processing
    /// instructions. Text, comments and documents have none.
    pub fn name(&self) -> Option<String> {
        match self.node.element_type() {
            XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode => {
                self.node.qualified_name().map(|name| name.into_owned())
            }
            XmlElementType::XmlNamespaceDecl => Some(self.node.name().unwrap_or("").to_owned()),
            XmlElementType::XmlPINode
            | XmlElementType::XmlDTDNode
            | XmlElementType::XmlElementDecl
            | XmlElementType::XmlAttributeDecl
            | XmlElementType::XmlEntityDecl
            | XmlElementType::XmlNotationNode => self.node.name().map(|name| name.to_owned()),
            _ => None,
        }
    }

    /// Rename the node.
    ///
    /// For elements and attributes a prefix bound in scope puts the node in
    /// that namespace. A prefix that is not bound is kept as part of the
    /// name.
    pub fn set_name(&self, name: &str) {
        let mut node = self.node;
        match node.element_type() {
            XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode => {
                bind_qname(node, name)
            }
            XmlElementType::XmlNamespaceDecl => {
                let prefix = Some(name.to_owned()).filter(|prefix| !prefix.is_empty());
                let Some(elem) = node.parent() else {
                    node.name = prefix;
                    return;
                };
                let users = elem
                    .subtree()
                    .into_iter()
                    .filter(|n| n.search_ns_decl(node.name()) == Some(node))
                    .filter(|n| n.ns().is_some_and(|ns| ns.prefix() == node.name()))
                    .collect::<Vec<_>>();
                node.name = prefix;
                for mut user in users {
                    user.ns = node.as_ns();
                }
                elem.reconcile_ns();
            }
            XmlElementType::XmlPINode => node.name = Some(name.to_owned()),
            typ => warn!("cannot rename a {typ:?} node"),
        }
    }

    /// The name without its prefix.
    pub fn local_name(&self) -> Option<String> {
        match self.node.element_type() {
            XmlElementType::XmlElementNode
            | XmlElementType::XmlAttributeNode
            | XmlElementType::XmlNamespaceDecl
            | XmlElementType::XmlPINode => {
                Some(local_name_for_name(self.node.name().unwrap_or("")).to_owned())
            }
            _ => None,
        }
    }

    /// The prefix of an element or attribute name, empty if there is none.
    pub fn prefix(&self) -> String {
        match self.node.element_type() {
            XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode => {
                match self.node.ns() {
                    Some(ns) => ns.prefix().unwrap_or("").to_owned(),
                    None => prefix_for_name(self.node.name().unwrap_or("")).to_owned(),
                }
            }
            _ => String::new(),
        }
    }

    /// The text of the node.
    ///
    /// For elements and documents this is the text of all descendants in
    /// document order, for namespaces the URI.
    pub fn string_value(&self) -> String {
        self.node.get_content()
    }

    /// Replace the text of the node.
    ///
    /// The children of an element are replaced by one text node. Handles to
    /// the removed children stay valid, each keeping its subtree alive.
    pub fn set_string_value(&self, value: &str) {
        let mut node = self.node;
        match node.element_type() {
            XmlElementType::XmlElementNode => {
                let children = node.children_iter().collect::<Vec<_>>();
                for child in children {
                    detach_node(child);
                }
                if !value.is_empty() {
                    attach_node(node, xml_new_text(value));
                }
            }
            XmlElementType::XmlNamespaceDecl => {
                node.content = Some(value.to_owned());
                if let Some(elem) = node.parent() {
                    let prefix = node.name().map(|prefix| prefix.to_owned());
                    rebind_prefix(elem, prefix.as_deref());
                }
            }
            XmlElementType::XmlDocumentNode | XmlElementType::XmlHTMLDocumentNode => {
                warn!("cannot set the string value of a document")
            }
            _ => node.set_content(value),
        }
    }

    /// The namespace URI of an element or attribute.
    pub fn uri(&self) -> Option<String> {
        match self.node.element_type() {
            XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode => self
                .node
                .ns()
                .map(|ns| ns.href().to_owned())
                .filter(|href| !href.is_empty()),
            _ => None,
        }
    }

    /// Put an element or attribute in the namespace `uri`, or in no
    /// namespace if `uri` is empty.
    ///
    /// A declaration in scope is reused. Otherwise one is added to the
    /// element: the default namespace for an element if it does not declare
    /// one yet, a generated prefix `ns0`, `ns1`, ... else.
    pub fn set_uri(&self, uri: &str) {
        let mut node = self.node;
        let typ = node.element_type();
        if !matches!(
            typ,
            XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode
        ) {
            warn!("cannot set the namespace of a {typ:?} node");
            return;
        }
        if uri.is_empty() {
            node.ns = None;
            return;
        }
        if node.ns().is_some_and(|ns| ns.href() == uri) {
            return;
        }
        let prefixed = typ == XmlElementType::XmlAttributeNode;
        let ns = match node.owner_element() {
            Some(elem) => elem.search_ns_by_href(uri, prefixed).unwrap_or_else(|| {
                let own_default = elem.ns_def_iter().any(|decl| decl.name().is_none());
                if prefixed || own_default {
                    let prefix = elem.generate_prefix();
                    elem.declare_ns(Some(&prefix), uri);
                    XmlNs::new(Some(&prefix), uri)
                } else {
                    elem.declare_ns(None, uri);
                    XmlNs::new(None, uri)
                }
            }),
            // a freestanding attribute gets its prefix when it is added
            None => XmlNs::new(None, uri),
        };
        node.ns = Some(ns);
    }

    /// The parent node. The parent of an attribute or a namespace is its
    /// element.
    pub fn parent(&self) -> Option<NodeRef> {
        self.node.parent().map(NodeRef::from_raw)
    }

    pub fn child_count(&self) -> usize {
        if self.node.is_property() {
            return 0;
        }
        self.node.child_count()
    }

    pub fn children(&self) -> Vec<NodeRef> {
        if self.node.is_property() {
            return vec![];
        }
        self.node.children_iter().map(NodeRef::from_raw).collect()
    }

    pub fn child_at_index(&self, index: usize) -> Result<NodeRef, XmlNodeError> {
        let count = self.child_count();
        if index >= count {
            return Err(XmlNodeError::OutOfRange { index, count });
        }
        self.node
            .children_iter()
            .nth(index)
            .map(NodeRef::from_raw)
            .ok_or(XmlNodeError::OutOfRange { index, count })
    }

    pub fn previous_sibling(&self) -> Option<NodeRef> {
        self.node.prev().map(NodeRef::from_raw)
    }

    pub fn next_sibling(&self) -> Option<NodeRef> {
        self.node.next().map(NodeRef::from_raw)
    }

    /// The previous node in document order. Attributes and namespaces are
    /// not part of this order.
    pub fn previous_node(&self) -> Option<NodeRef> {
        if self.node.is_property() {
            return None;
        }
        self.node.prev_in_preorder().map(NodeRef::from_raw)
    }

    /// The next node in document order. Attributes and namespaces are not
    /// part of this order.
    pub fn next_node(&self) -> Option<NodeRef> {
        if self.node.is_property() {
            return None;
        }
        self.node.next_in_preorder(None).map(NodeRef::from_raw)
    }

    /// The position of the node in the list it belongs to: the attributes,
    /// the namespaces or the children of its parent. 0 for a tree root.
    pub fn index(&self) -> usize {
        if self.node.parent().is_none() {
            return 0;
        }
        successors(self.node.prev(), |n| n.prev()).count()
    }

    /// The number of ancestors.
    pub fn level(&self) -> usize {
        self.node.ancestors_or_self().count() - 1
    }

    /// The document this node belongs to.
    pub fn root_document(&self) -> Option<DocumentRef> {
        self.node.document().map(|doc| DocumentRef(NodeRef::from_raw(doc)))
    }

    /// A path selecting this node, such as `/r/a[2]/@x`.
    pub fn xpath(&self) -> String {
        self.node.get_node_path()
    }

    /// Remove the node from its parent.
    ///
    /// The node becomes the root of a tree of its own, owned by the handles
    /// into it. Namespace bindings it used from its old ancestors are
    /// declared on it.
    pub fn detach(&self) {
        detach_node(self.node);
    }

    /// Whether this handle wraps the root of its tree.
    pub fn is_owner(&self) -> bool {
        self.node.parent().is_none()
    }

    /// A handle to the root of the tree of this node.
    pub fn owner(&self) -> NodeRef {
        NodeRef::from_raw(self.node.tree_root())
    }

    /// Copy the node and its subtree into a new tree.
    pub fn deep_copy(&self) -> NodeRef {
        let copy = self.node.copy_node(true);
        copy.reconcile_ns();
        Self::new_tree(copy)
    }

    pub fn xml_string(&self) -> String {
        self.xml_string_with_options(XmlNodeOptions::NONE)
    }

    pub fn xml_string_with_options(&self, options: XmlNodeOptions) -> String {
        xml_node_dump(self.node, options.save_options())
    }

    /// Same as [`NodeRef::xml_string`].
    pub fn description(&self) -> String {
        self.xml_string()
    }

    /// Evaluate `expr` with this node as context node and return the
    /// selected nodes in document order.
    #[cfg(feature = "xpath")]
    pub fn nodes_for_xpath(&self, expr: &str) -> Result<Vec<NodeRef>, XmlNodeError> {
        self.nodes_for_xpath_with_namespaces(expr, &HashMap::new())
    }

    /// Same as [`NodeRef::nodes_for_xpath`] with extra prefix bindings. An
    /// empty prefix binds the namespace of unprefixed element names.
    #[cfg(feature = "xpath")]
    pub fn nodes_for_xpath_with_namespaces(
        &self,
        expr: &str,
        mappings: &HashMap<String, String>,
    ) -> Result<Vec<NodeRef>, XmlNodeError> {
        match self.objects_for_xpath(expr, mappings)? {
            XPathValue::Nodes(nodes) => Ok(nodes),
            other => Err(XmlNodeError::EvalKindMismatch {
                expr: expr.to_owned(),
                found: other.type_name(),
            }),
        }
    }

    /// Evaluate `expr` with this node as context node.
    ///
    /// The prefixes declared on the root element are bound, then `mappings`,
    /// which win over them.
    #[cfg(feature = "xpath")]
    pub fn objects_for_xpath(
        &self,
        expr: &str,
        mappings: &HashMap<String, String>,
    ) -> Result<XPathValue, XmlNodeError> {
        let comp = xml_xpath_compile(expr).map_err(|err| XmlNodeError::XPathSyntax {
            expr: expr.to_owned(),
            message: err.to_string(),
        })?;

        let mut ctxt = XmlXPathContext::new(self.node);
        let root = self.node.tree_root();
        let root_element = match root.element_type() {
            XmlElementType::XmlElementNode => Some(root),
            _ => root.get_root_element(),
        };
        for decl in root_element.iter().flat_map(|elem| elem.ns_def_iter()) {
            if let Some(prefix) = decl.name() {
                ctxt.register_ns(prefix, decl.content().unwrap_or(""));
            }
        }
        for (prefix, uri) in mappings {
            ctxt.register_ns(prefix, uri);
        }

        let value = ctxt
            .compiled_eval(&comp)
            .map_err(|err| XmlNodeError::XPathEval {
                expr: expr.to_owned(),
                message: err.to_string(),
            })?;
        Ok(match value {
            XmlXPathObject::NodeSet(nodes) => {
                XPathValue::Nodes(nodes.into_iter().map(NodeRef::from_raw).collect())
            }
            XmlXPathObject::Boolean(b) => XPathValue::Boolean(b),
            XmlXPathObject::Number(n) => XPathValue::Number(n),
            XmlXPathObject::String(s) => XPathValue::String(s),
        })
    }

    /// The part of `name` after the first colon, or `name` itself.
    pub fn local_name_for_name(name: &str) -> &str {
        local_name_for_name(name)
    }

    /// The part of `name` before the first colon, or the empty string.
    pub fn prefix_for_name(name: &str) -> &str {
        prefix_for_name(name)
    }

    /// Capture diagnostics per thread instead of writing them to stderr.
    ///
    /// Process-wide, only the first call has an effect.
    pub fn install_error_handlers() {
        globals::install_error_handlers();
    }

    /// This node as an element handle.
    pub fn as_element(&self) -> Option<ElementRef> {
        ElementRef::try_from(self.clone()).ok()
    }

    /// This node as a document handle.
    pub fn as_document(&self) -> Option<DocumentRef> {
        DocumentRef::try_from(self.clone()).ok()
    }
}

impl Clone for NodeRef {
    fn clone(&self) -> Self {
        Self::from_raw(self.node)
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        let mut node = self.node;
        node.refs -= 1;
        let mut root = node.tree_root();
        root.tree_refs -= 1;
        trace!("dropped a handle on {node:?}, {} left in its tree", root.tree_refs);
        if root.tree_refs == 0 {
            free_tree(root);
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.xml_string())
    }
}

/// The result of [`NodeRef::objects_for_xpath`].
#[cfg(feature = "xpath")]
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    Nodes(Vec<NodeRef>),
    Boolean(bool),
    Number(f64),
    String(String),
}

#[cfg(feature = "xpath")]
impl XPathValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nodes(_) => "node-set",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }
}
