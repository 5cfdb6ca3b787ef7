use std::{
    borrow::Cow,
    fmt,
    iter::successors,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use super::{XmlElementType, XmlNs};

/// One record of an XML tree.
///
/// Which fields are meaningful depends on `typ`:
///
/// | type | `name` | `content` |
/// |------|--------|-----------|
/// | element | local name | - |
/// | attribute | local name | value |
/// | text, CDATA, comment | - | text |
/// | processing instruction | target | data |
/// | namespace declaration | prefix (`None` for the default) | URI |
/// | DTD and declarations | declared name | source text |
///
/// `refs` counts the handles that point at this record and `tree_refs`, which
/// is only kept on a tree root, counts the handles anywhere in the tree.
#[derive(Default)]
pub struct XmlNode {
    pub(crate) typ: XmlElementType,
    pub(crate) name: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) ns: Option<XmlNs>,
    pub(crate) parent: Option<XmlNodePtr>,
    pub(crate) children: Option<XmlNodePtr>,
    pub(crate) last: Option<XmlNodePtr>,
    pub(crate) next: Option<XmlNodePtr>,
    pub(crate) prev: Option<XmlNodePtr>,
    pub(crate) properties: Option<XmlNodePtr>,
    pub(crate) ns_def: Option<XmlNodePtr>,
    /// The namespace node of the implicit `xml` binding, once XPath asked
    /// for it.
    pub(crate) xml_ns: Option<XmlNodePtr>,
    pub(crate) version: Option<String>,
    pub(crate) encoding: Option<String>,
    pub(crate) standalone: Option<bool>,
    pub(crate) line: usize,
    pub(crate) refs: usize,
    pub(crate) tree_refs: usize,
}

impl XmlNode {
    pub fn element_type(&self) -> XmlElementType {
        self.typ
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn ns(&self) -> Option<&XmlNs> {
        self.ns.as_ref()
    }

    pub fn parent(&self) -> Option<XmlNodePtr> {
        self.parent
    }

    pub fn children(&self) -> Option<XmlNodePtr> {
        self.children
    }

    pub fn last(&self) -> Option<XmlNodePtr> {
        self.last
    }

    pub fn next(&self) -> Option<XmlNodePtr> {
        self.next
    }

    pub fn prev(&self) -> Option<XmlNodePtr> {
        self.prev
    }

    pub fn properties(&self) -> Option<XmlNodePtr> {
        self.properties
    }

    pub fn ns_def(&self) -> Option<XmlNodePtr> {
        self.ns_def
    }

    /// Line of the start of this node in the parsed input, 0 if unknown.
    pub fn get_line_no(&self) -> usize {
        self.line
    }

    /// Is this node a Text node (or a CDATA section) ?
    pub fn is_text_node(&self) -> bool {
        matches!(
            self.typ,
            XmlElementType::XmlTextNode | XmlElementType::XmlCDATASectionNode
        )
    }

    /// Checks whether this node is an empty or whitespace only text node.
    pub fn is_blank_node(&self) -> bool {
        self.is_text_node()
            && self
                .content
                .as_deref()
                .is_none_or(|c| c.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')))
    }

    /// Whether this node lives in the attribute or namespace list of an element.
    pub fn is_property(&self) -> bool {
        matches!(
            self.typ,
            XmlElementType::XmlAttributeNode | XmlElementType::XmlNamespaceDecl
        )
    }

    /// Whether this node may have child nodes.
    pub fn is_container(&self) -> bool {
        matches!(
            self.typ,
            XmlElementType::XmlElementNode
                | XmlElementType::XmlDocumentNode
                | XmlElementType::XmlDocumentFragNode
                | XmlElementType::XmlDTDNode
        )
    }

    /// The name as written in a document: `prefix:local` for elements and
    /// attributes bound to a prefixed namespace.
    pub fn qualified_name(&self) -> Option<Cow<'_, str>> {
        let name = self.name.as_deref()?;
        match (self.typ, self.ns.as_ref().and_then(|ns| ns.prefix())) {
            (XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode, Some(prefix)) => {
                Some(Cow::Owned(format!("{prefix}:{name}")))
            }
            _ => Some(Cow::Borrowed(name)),
        }
    }
}

/// A pointer to a heap-allocated [`XmlNode`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct XmlNodePtr(NonNull<XmlNode>);

impl XmlNodePtr {
    /// Allocate new memory and create new `XmlNodePtr` from an owned xml node.
    ///
    /// This method leaks allocated memory.
    /// The tree containing the node must be released by `xml_free_node`.
    pub(crate) fn new(node: XmlNode) -> Self {
        Self(NonNull::from(Box::leak(Box::new(node))))
    }

    pub fn as_ptr(self) -> *mut XmlNode {
        self.0.as_ptr()
    }

    /// Deallocate this record only.
    ///
    /// # Safety
    /// - The record must have been unlinked from every list and must not be
    ///   used after this call.
    unsafe fn free(self) {
        unsafe {
            drop(Box::from_raw(self.0.as_ptr()));
        }
    }

    /// The root of the tree containing this node.
    pub fn tree_root(self) -> XmlNodePtr {
        let mut cur = self;
        while let Some(parent) = cur.parent {
            cur = parent;
        }
        cur
    }

    /// This node if it is an element, otherwise its parent element.
    pub fn owner_element(self) -> Option<XmlNodePtr> {
        match self.typ {
            XmlElementType::XmlElementNode => Some(self),
            _ => self.parent.filter(|p| p.typ == XmlElementType::XmlElementNode),
        }
    }

    pub fn children_iter(self) -> impl Iterator<Item = XmlNodePtr> {
        successors(self.children, |c| c.next)
    }

    pub fn properties_iter(self) -> impl Iterator<Item = XmlNodePtr> {
        successors(self.properties, |c| c.next)
    }

    pub fn ns_def_iter(self) -> impl Iterator<Item = XmlNodePtr> {
        successors(self.ns_def, |c| c.next)
    }

    /// Walk this node and its ancestors.
    pub fn ancestors_or_self(self) -> impl Iterator<Item = XmlNodePtr> {
        successors(Some(self), |c| c.parent)
    }

    pub fn child_count(self) -> usize {
        self.children_iter().count()
    }

    /// The next node in document order within the subtree of `scope`,
    /// attributes and namespace declarations excluded.
    ///
    /// `self` must not be an attribute or a namespace declaration.
    pub fn next_in_preorder(self, scope: Option<XmlNodePtr>) -> Option<XmlNodePtr> {
        if let Some(children) = self.children {
            return Some(children);
        }
        let mut cur = self;
        loop {
            if Some(cur) == scope {
                return None;
            }
            if let Some(next) = cur.next {
                return Some(next);
            }
            cur = cur.parent?;
        }
    }

    /// The previous node in document order, attributes and namespace
    /// declarations excluded.
    pub fn prev_in_preorder(self) -> Option<XmlNodePtr> {
        let Some(mut cur) = self.prev else {
            return self.parent;
        };
        while let Some(last) = cur.last {
            cur = last;
        }
        Some(cur)
    }

    /// All nodes of the subtree rooted at this node in document order,
    /// including namespace declarations and attributes right after their
    /// element.
    pub fn subtree(self) -> Vec<XmlNodePtr> {
        let mut out = vec![];
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            out.extend(node.xml_ns);
            out.extend(node.ns_def_iter());
            out.extend(node.properties_iter());
            let children = node.children_iter().collect::<Vec<_>>();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Add a new node to `self`, at the end of the child (or property) list.
    ///
    /// If the new node is an attribute it is added to `properties`, a
    /// namespace declaration is added to `ns_def`.
    /// `cur` must be the root of its own tree. Adjacent text nodes are not
    /// merged because handles may refer to either of them.
    #[doc(alias = "xmlAddChild")]
    pub(crate) fn add_child(self, mut cur: XmlNodePtr) -> XmlNodePtr {
        debug_assert!(cur.parent.is_none() && cur != self);
        match cur.typ {
            XmlElementType::XmlAttributeNode => return self.add_prop(cur),
            XmlElementType::XmlNamespaceDecl => return self.add_ns_def(cur),
            _ => {}
        }
        let mut parent = self;
        cur.parent = Some(parent);
        cur.next = None;
        cur.prev = parent.last;
        if let Some(mut last) = parent.last {
            last.next = Some(cur);
        } else {
            parent.children = Some(cur);
        }
        parent.last = Some(cur);
        cur
    }

    #[doc(alias = "xmlAddPropSibling")]
    pub(crate) fn add_prop(self, attr: XmlNodePtr) -> XmlNodePtr {
        let mut parent = self;
        let head = parent.properties;
        parent.properties = Some(append_to_list(head, parent, attr));
        attr
    }

    pub(crate) fn add_ns_def(self, decl: XmlNodePtr) -> XmlNodePtr {
        let mut parent = self;
        let head = parent.ns_def;
        parent.ns_def = Some(append_to_list(head, parent, decl));
        decl
    }

    /// Unlink a node from its current context, the node is not freed.
    ///
    /// Afterwards the node is the root of a tree of its own.
    #[doc(alias = "xmlUnlinkNode")]
    pub(crate) fn unlink(self) {
        let mut cur = self;
        if let Some(mut parent) = cur.parent {
            match cur.typ {
                XmlElementType::XmlAttributeNode => {
                    if parent.properties == Some(cur) {
                        parent.properties = cur.next;
                    }
                }
                XmlElementType::XmlNamespaceDecl => {
                    if parent.ns_def == Some(cur) {
                        parent.ns_def = cur.next;
                    }
                    if parent.xml_ns == Some(cur) {
                        parent.xml_ns = None;
                    }
                }
                _ => {
                    if parent.children == Some(cur) {
                        parent.children = cur.next;
                    }
                    if parent.last == Some(cur) {
                        parent.last = cur.prev;
                    }
                }
            }
        }
        if let Some(mut next) = cur.next {
            next.prev = cur.prev;
        }
        if let Some(mut prev) = cur.prev {
            prev.next = cur.next;
        }
        cur.parent = None;
        cur.next = None;
        cur.prev = None;
    }

    /// Read the value of a node, this can be either the text carried directly
    /// by this node if it's a TEXT node or the aggregate string of the values
    /// carried by this node child's (TEXT and CDATA nodes).
    #[doc(alias = "xmlNodeGetContent")]
    pub fn get_content(self) -> String {
        match self.typ {
            XmlElementType::XmlElementNode
            | XmlElementType::XmlDocumentNode
            | XmlElementType::XmlDocumentFragNode => {
                let mut out = String::new();
                let mut cur = self.children;
                while let Some(node) = cur {
                    if node.is_text_node() {
                        out.push_str(node.content.as_deref().unwrap_or(""));
                    }
                    cur = node.next_in_preorder(Some(self));
                }
                out
            }
            _ => self.content.clone().unwrap_or_default(),
        }
    }

    /// Replace the text carried by a leaf node.
    ///
    /// Containers are left untouched; replacing their children needs to take
    /// care of the handles pointing into them.
    #[doc(alias = "xmlNodeSetContent")]
    pub(crate) fn set_content(self, content: &str) {
        let mut cur = self;
        if !cur.is_container() {
            cur.content = Some(content.to_owned());
        }
    }

    /// Search an attribute by the name it is written with.
    #[doc(alias = "xmlHasProp")]
    pub fn has_prop(self, name: &str) -> Option<XmlNodePtr> {
        self.properties_iter()
            .find(|attr| attr.qualified_name().is_some_and(|n| n == name))
    }

    /// Search an attribute by local name and namespace URI.
    #[doc(alias = "xmlHasNsProp")]
    pub fn has_ns_prop(self, name: &str, href: Option<&str>) -> Option<XmlNodePtr> {
        self.properties_iter().find(|attr| {
            attr.name.as_deref() == Some(name)
                && attr.ns.as_ref().map(|ns| ns.href()).filter(|h| !h.is_empty())
                    == href.filter(|h| !h.is_empty())
        })
    }

    #[doc(alias = "xmlGetProp")]
    pub fn get_prop(self, name: &str) -> Option<String> {
        self.has_prop(name).and_then(|attr| attr.content.clone())
    }

    /// Build a structure based Path for the given node.
    #[doc(alias = "xmlGetNodePath")]
    pub fn get_node_path(self) -> String {
        let mut segments = vec![];
        for node in self.ancestors_or_self() {
            let segment = match node.typ {
                XmlElementType::XmlDocumentNode | XmlElementType::XmlHTMLDocumentNode => break,
                XmlElementType::XmlElementNode => {
                    let name = node.qualified_name().unwrap_or_default().into_owned();
                    let same = |n: &XmlNodePtr| {
                        n.typ == XmlElementType::XmlElementNode
                            && n.qualified_name().is_some_and(|q| q == name.as_str())
                    };
                    with_position(node, name.clone(), same)
                }
                XmlElementType::XmlTextNode | XmlElementType::XmlCDATASectionNode => {
                    with_position(node, "text()".to_owned(), |n| n.is_text_node())
                }
                XmlElementType::XmlCommentNode => with_position(node, "comment()".to_owned(), |n| {
                    n.typ == XmlElementType::XmlCommentNode
                }),
                XmlElementType::XmlPINode => {
                    let target = node.name.clone().unwrap_or_default();
                    let base = format!("processing-instruction('{target}')");
                    with_position(node, base, |n| {
                        n.typ == XmlElementType::XmlPINode && n.name.as_deref() == Some(&target)
                    })
                }
                XmlElementType::XmlAttributeNode => {
                    format!("@{}", node.qualified_name().unwrap_or_default())
                }
                XmlElementType::XmlNamespaceDecl => {
                    format!("namespace::{}", node.name.as_deref().unwrap_or(""))
                }
                _ => break,
            };
            segments.push(segment);
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Do a copy of the node.
    ///
    /// Attributes and namespace declarations are always copied, children
    /// only if `recursive` is set. The copy is the root of a new tree.
    #[doc(alias = "xmlCopyNode")]
    pub(crate) fn copy_node(self, recursive: bool) -> XmlNodePtr {
        let root = self.copy_record();
        if recursive {
            let mut stack = vec![(self, root)];
            while let Some((orig, copy)) = stack.pop() {
                for child in orig.children_iter() {
                    stack.push((child, copy.add_child(child.copy_record())));
                }
            }
        }
        root
    }

    /// Copy this node with its attributes and namespace declarations.
    fn copy_record(self) -> XmlNodePtr {
        let copy = XmlNodePtr::new(XmlNode {
            typ: self.typ,
            name: self.name.clone(),
            content: self.content.clone(),
            ns: self.ns.clone(),
            version: self.version.clone(),
            encoding: self.encoding.clone(),
            standalone: self.standalone,
            line: self.line,
            ..Default::default()
        });
        for decl in self.ns_def_iter() {
            copy.add_ns_def(decl.copy_node(false));
        }
        for attr in self.properties_iter() {
            copy.add_prop(attr.copy_node(false));
        }
        copy
    }
}

fn append_to_list(head: Option<XmlNodePtr>, parent: XmlNodePtr, mut cur: XmlNodePtr) -> XmlNodePtr {
    cur.parent = Some(parent);
    cur.next = None;
    let Some(head) = head else {
        cur.prev = None;
        return cur;
    };
    let mut last = head;
    while let Some(next) = last.next {
        last = next;
    }
    last.next = Some(cur);
    cur.prev = Some(last);
    head
}

fn with_position(
    node: XmlNodePtr,
    base: String,
    same: impl Fn(&XmlNodePtr) -> bool,
) -> String {
    let Some(parent) = node.parent else {
        return base;
    };
    let siblings = parent.children_iter().filter(|n| same(n)).collect::<Vec<_>>();
    if siblings.len() < 2 {
        return base;
    }
    let pos = siblings.iter().position(|&n| n == node).unwrap_or(0) + 1;
    format!("{base}[{pos}]")
}

impl Deref for XmlNodePtr {
    type Target = XmlNode;
    fn deref(&self) -> &Self::Target {
        // # Safety
        // A `XmlNodePtr` is only created from a leaked `Box` and is not used
        // after its tree is freed.
        unsafe { self.0.as_ref() }
    }
}

impl DerefMut for XmlNodePtr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // # Safety
        // Same as `Deref`.
        unsafe { self.0.as_mut() }
    }
}

impl fmt::Debug for XmlNodePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlNodePtr")
            .field("ptr", &self.0)
            .field("type", &self.typ)
            .field("name", &self.name)
            .finish()
    }
}

/// Free a node and everything below it: children, attributes and
/// namespace declarations.
///
/// # Safety
/// - `cur` must be the root of its tree, or already unlinked.
/// - No pointer into the subtree may be used afterwards.
#[doc(alias = "xmlFreeNode")]
pub unsafe fn xml_free_node(cur: XmlNodePtr) {
    let mut stack = vec![cur];
    while let Some(node) = stack.pop() {
        for head in [node.children, node.properties, node.ns_def, node.xml_ns] {
            let mut next = head;
            while let Some(child) = next {
                next = child.next;
                stack.push(child);
            }
        }
        unsafe { node.free() };
    }
}

/// Creation of a new element node.
#[doc(alias = "xmlNewNode")]
pub fn xml_new_node(ns: Option<XmlNs>, name: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlElementNode,
        name: Some(name.to_owned()),
        ns,
        ..Default::default()
    })
}

/// Creation of a new text node.
#[doc(alias = "xmlNewText")]
pub fn xml_new_text(content: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlTextNode,
        content: Some(content.to_owned()),
        ..Default::default()
    })
}

/// Creation of a new CDATA section node.
#[doc(alias = "xmlNewCDataBlock")]
pub fn xml_new_cdata_block(content: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlCDATASectionNode,
        content: Some(content.to_owned()),
        ..Default::default()
    })
}

#[doc(alias = "xmlNewComment")]
pub fn xml_new_comment(content: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlCommentNode,
        content: Some(content.to_owned()),
        ..Default::default()
    })
}

/// Creation of a processing instruction element.
#[doc(alias = "xmlNewPI")]
pub fn xml_new_pi(target: &str, content: Option<&str>) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlPINode,
        name: Some(target.to_owned()),
        content: content.map(|c| c.to_owned()),
        ..Default::default()
    })
}

/// Create a new attribute which is not attached to any element yet.
#[doc(alias = "xmlNewNsProp")]
pub fn xml_new_prop(ns: Option<XmlNs>, name: &str, value: &str) -> XmlNodePtr {
    XmlNodePtr::new(XmlNode {
        typ: XmlElementType::XmlAttributeNode,
        name: Some(name.to_owned()),
        content: Some(value.to_owned()),
        ns,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> (XmlNodePtr, XmlNodePtr, XmlNodePtr, XmlNodePtr) {
        let root = xml_new_node(None, "r");
        let a = root.add_child(xml_new_node(None, "a"));
        let t = a.add_child(xml_new_text("x"));
        let b = root.add_child(xml_new_node(None, "a"));
        (root, a, t, b)
    }

    #[test]
    fn link_and_unlink() {
        let (root, a, _, b) = build();
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.children, Some(a));
        assert_eq!(root.last, Some(b));
        a.unlink();
        assert_eq!(root.child_count(), 1);
        assert_eq!(root.children, Some(b));
        assert!(a.parent.is_none() && a.next.is_none() && b.prev.is_none());
        unsafe {
            xml_free_node(a);
            xml_free_node(root);
        }
    }

    #[test]
    fn content_and_paths() {
        let (root, a, t, b) = build();
        let attr = a.add_child(xml_new_prop(None, "x", "1"));
        assert_eq!(root.get_content(), "x");
        assert_eq!(a.get_node_path(), "/r/a[1]");
        assert_eq!(b.get_node_path(), "/r/a[2]");
        assert_eq!(t.get_node_path(), "/r/a[1]/text()");
        assert_eq!(attr.get_node_path(), "/r/a[1]/@x");
        assert_eq!(a.has_prop("x"), Some(attr));
        assert_eq!(a.get_prop("x").as_deref(), Some("1"));
        assert_eq!(attr.tree_root(), root);
        unsafe { xml_free_node(root) };
    }

    #[test]
    fn preorder_walk() {
        let (root, a, t, b) = build();
        assert_eq!(root.next_in_preorder(None), Some(a));
        assert_eq!(a.next_in_preorder(None), Some(t));
        assert_eq!(t.next_in_preorder(None), Some(b));
        assert_eq!(b.next_in_preorder(None), None);
        assert_eq!(t.next_in_preorder(Some(a)), None);
        assert_eq!(b.prev_in_preorder(), Some(t));
        assert_eq!(a.prev_in_preorder(), Some(root));
        unsafe { xml_free_node(root) };
    }

    #[test]
    fn copy_is_independent() {
        let (root, a, _, _) = build();
        a.add_child(xml_new_prop(None, "x", "1"));
        let copy = root.copy_node(true);
        assert_ne!(copy, root);
        assert!(copy.parent.is_none());
        let first = copy.children.unwrap();
        assert_eq!(first.get_prop("x").as_deref(), Some("1"));
        assert_eq!(copy.get_content(), "x");
        unsafe {
            xml_free_node(root);
            xml_free_node(copy);
        }
    }
}
