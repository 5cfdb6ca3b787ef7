use std::{
    collections::{HashMap, HashSet},
    iter::successors,
};

use crate::tree::{XmlElementType, XmlNode, XmlNodePtr};

use super::{
    XPathError, XmlXPathAxisVal, XmlXPathBinaryOp, XmlXPathContext, XmlXPathError, XmlXPathExpr,
    XmlXPathNodeTest, XmlXPathObject, XmlXPathPathStart, XmlXPathStep, XmlXPathTypeVal,
    functions::call_function, xml_xpath_cast_node_to_string,
};

/// The context node with its position in the context node list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Focus {
    pub(crate) node: XmlNodePtr,
    pub(crate) position: usize,
    pub(crate) size: usize,
}

pub(crate) struct Evaluator<'a> {
    ctxt: &'a XmlXPathContext,
    order: HashMap<XmlNodePtr, usize>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(ctxt: &'a XmlXPathContext) -> Self {
        let order = ctxt
            .node
            .tree_root()
            .subtree()
            .into_iter()
            .enumerate()
            .map(|(i, node)| (node, 2 * i))
            .collect();
        Self { ctxt, order }
    }

    /// The position of `node` in document order.
    ///
    /// An implicit `xml` namespace node created while evaluating comes right
    /// after its element.
    fn order_of(&self, node: XmlNodePtr) -> usize {
        if let Some(&pos) = self.order.get(&node) {
            return pos;
        }
        node.parent()
            .filter(|elem| elem.xml_ns == Some(node))
            .and_then(|elem| self.order.get(&elem))
            .map_or(usize::MAX, |&pos| pos + 1)
    }

    pub(crate) fn eval_root(&self, expr: &XmlXPathExpr) -> Result<XmlXPathObject, XPathError> {
        let focus = Focus {
            node: self.ctxt.node,
            position: 1,
            size: 1,
        };
        self.eval(expr, focus)
    }

    /// Sort `nodes` in document order and drop duplicates.
    #[doc(alias = "xmlXPathNodeSetSort")]
    pub(crate) fn sort(&self, nodes: &mut Vec<XmlNodePtr>) {
        nodes.sort_by_key(|&n| self.order_of(n));
        nodes.dedup();
    }

    pub(crate) fn eval(
        &self,
        expr: &XmlXPathExpr,
        focus: Focus,
    ) -> Result<XmlXPathObject, XPathError> {
        match expr {
            XmlXPathExpr::Number(n) => Ok(XmlXPathObject::Number(*n)),
            XmlXPathExpr::Literal(s) => Ok(XmlXPathObject::String(s.clone())),
            XmlXPathExpr::Variable(name) => Err(XPathError::new(
                XmlXPathError::XPathUndefVariableError,
                format!("Undefined variable: ${name}"),
            )),
            XmlXPathExpr::Binary { op, left, right } => self.binary(*op, left, right, focus),
            XmlXPathExpr::Negate(operand) => Ok(XmlXPathObject::Number(
                -self.eval(operand, focus)?.cast_to_number(),
            )),
            XmlXPathExpr::Union(left, right) => {
                let mut nodes = self.node_set(left, focus)?;
                nodes.extend(self.node_set(right, focus)?);
                self.sort(&mut nodes);
                Ok(XmlXPathObject::NodeSet(nodes))
            }
            XmlXPathExpr::Function { name, args } => call_function(self, name, args, focus),
            XmlXPathExpr::Path { start, steps } => {
                let mut nodes = match start {
                    XmlXPathPathStart::Root => vec![focus.node.tree_root()],
                    XmlXPathPathStart::Context => vec![focus.node],
                    XmlXPathPathStart::Filter(filter) => self.node_set(filter, focus)?,
                };
                for step in steps {
                    nodes = self.step(step, &nodes)?;
                }
                Ok(XmlXPathObject::NodeSet(nodes))
            }
            XmlXPathExpr::Filter { expr, predicates } => {
                let mut nodes = self.node_set(expr, focus)?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(XmlXPathObject::NodeSet(nodes))
            }
        }
    }

    /// Evaluate `expr`, which must give a node-set.
    pub(crate) fn node_set(
        &self,
        expr: &XmlXPathExpr,
        focus: Focus,
    ) -> Result<Vec<XmlNodePtr>, XPathError> {
        match self.eval(expr, focus)? {
            XmlXPathObject::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::new(
                XmlXPathError::XPathInvalidType,
                format!("Invalid type: expected a node-set, found a {}", other.type_name()),
            )),
        }
    }

    fn binary(
        &self,
        op: XmlXPathBinaryOp,
        left: &XmlXPathExpr,
        right: &XmlXPathExpr,
        focus: Focus,
    ) -> Result<XmlXPathObject, XPathError> {
        let value = match op {
            XmlXPathBinaryOp::Or => XmlXPathObject::Boolean(
                self.eval(left, focus)?.cast_to_boolean()
                    || self.eval(right, focus)?.cast_to_boolean(),
            ),
            XmlXPathBinaryOp::And => XmlXPathObject::Boolean(
                self.eval(left, focus)?.cast_to_boolean()
                    && self.eval(right, focus)?.cast_to_boolean(),
            ),
            XmlXPathBinaryOp::Eq
            | XmlXPathBinaryOp::Neq
            | XmlXPathBinaryOp::Lt
            | XmlXPathBinaryOp::Lte
            | XmlXPathBinaryOp::Gt
            | XmlXPathBinaryOp::Gte => {
                let left = self.eval(left, focus)?;
                let right = self.eval(right, focus)?;
                XmlXPathObject::Boolean(compare_values(op, &left, &right))
            }
            _ => {
                let x = self.eval(left, focus)?.cast_to_number();
                let y = self.eval(right, focus)?.cast_to_number();
                XmlXPathObject::Number(match op {
                    XmlXPathBinaryOp::Add => x + y,
                    XmlXPathBinaryOp::Sub => x - y,
                    XmlXPathBinaryOp::Mul => x * y,
                    XmlXPathBinaryOp::Div => x / y,
                    _ => x % y,
                })
            }
        };
        Ok(value)
    }

    fn resolve_prefix(&self, prefix: &str) -> Result<&'a str, XPathError> {
        self.ctxt.lookup_ns(prefix).ok_or_else(|| {
            XPathError::new(
                XmlXPathError::XPathUndefPrefixError,
                format!("Undefined namespace prefix: {prefix}"),
            )
        })
    }

    #[doc(alias = "xmlXPathNodeCollectAndTest")]
    fn step(
        &self,
        step: &XmlXPathStep,
        input: &[XmlNodePtr],
    ) -> Result<Vec<XmlNodePtr>, XPathError> {
        let principal = match step.axis {
            XmlXPathAxisVal::AxisAttribute => XmlElementType::XmlAttributeNode,
            XmlXPathAxisVal::AxisNamespace => XmlElementType::XmlNamespaceDecl,
            _ => XmlElementType::XmlElementNode,
        };
        let ns = match &step.test {
            XmlXPathNodeTest::All {
                prefix: Some(prefix),
            }
            | XmlXPathNodeTest::Name {
                prefix: Some(prefix),
                ..
            } => Some(self.resolve_prefix(prefix)?),
            XmlXPathNodeTest::Name { prefix: None, .. }
                if principal == XmlElementType::XmlElementNode =>
            {
                self.ctxt.lookup_ns("")
            }
            _ => None,
        };

        let mut out = vec![];
        for &node in input {
            let mut selected = axis_nodes(step.axis, node)
                .into_iter()
                .filter(|&n| node_test(&step.test, principal, ns, n))
                .collect::<Vec<_>>();
            for predicate in &step.predicates {
                selected = self.filter(selected, predicate)?;
            }
            out.extend(selected);
        }
        self.sort(&mut out);
        Ok(out)
    }

    /// Keep the nodes for which `predicate` holds. `nodes` must be in the
    /// order positions are counted in.
    fn filter(
        &self,
        nodes: Vec<XmlNodePtr>,
        predicate: &XmlXPathExpr,
    ) -> Result<Vec<XmlNodePtr>, XPathError> {
        let size = nodes.len();
        let mut out = vec![];
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, focus)? {
                XmlXPathObject::Number(n) => n == (i + 1) as f64,
                other => other.cast_to_boolean(),
            };
            if keep {
                out.push(node);
            }
        }
        Ok(out)
    }
}

fn descendants(node: XmlNodePtr) -> Vec<XmlNodePtr> {
    let mut out = vec![];
    if node.is_property() {
        return out;
    }
    let mut cur = node.children;
    while let Some(n) = cur {
        out.push(n);
        cur = n.next_in_preorder(Some(node));
    }
    out
}

fn following(node: XmlNodePtr) -> Vec<XmlNodePtr> {
    let mut out = vec![];
    let mut cur = if node.is_property() {
        // the descendants of the owner element follow its attributes
        let Some(parent) = node.parent else {
            return out;
        };
        parent
    } else {
        let mut last = node;
        while let Some(child) = last.last {
            last = child;
        }
        last
    };
    while let Some(next) = cur.next_in_preorder(None) {
        out.push(next);
        cur = next;
    }
    out
}

fn preceding(node: XmlNodePtr) -> Vec<XmlNodePtr> {
    let mut out = vec![];
    let base = if node.is_property() {
        let Some(parent) = node.parent else {
            return out;
        };
        parent
    } else {
        node
    };
    let ancestors = base.ancestors_or_self().collect::<HashSet<_>>();
    let mut cur = base;
    while let Some(prev) = cur.prev_in_preorder() {
        if !ancestors.contains(&prev) {
            out.push(prev);
        }
        cur = prev;
    }
    out
}

/// The nodes of `axis` from `node`, in axis order.
///
/// The internal subset is not part of the XPath data model and never
/// selected.
#[doc(alias = "xmlXPathNextChild")]
fn axis_nodes(axis: XmlXPathAxisVal, node: XmlNodePtr) -> Vec<XmlNodePtr> {
    let is_element = node.element_type() == XmlElementType::XmlElementNode;
    let mut nodes = match axis {
        XmlXPathAxisVal::AxisSelf => vec![node],
        XmlXPathAxisVal::AxisChild if node.is_property() => vec![],
        XmlXPathAxisVal::AxisChild => node.children_iter().collect(),
        XmlXPathAxisVal::AxisDescendant => descendants(node),
        XmlXPathAxisVal::AxisDescendantOrSelf => {
            let mut out = vec![node];
            out.extend(descendants(node));
            out
        }
        XmlXPathAxisVal::AxisParent => node.parent.into_iter().collect(),
        XmlXPathAxisVal::AxisAncestor => node.ancestors_or_self().skip(1).collect(),
        XmlXPathAxisVal::AxisAncestorOrSelf => node.ancestors_or_self().collect(),
        XmlXPathAxisVal::AxisFollowingSibling if node.is_property() => vec![],
        XmlXPathAxisVal::AxisFollowingSibling => successors(node.next, |n| n.next).collect(),
        XmlXPathAxisVal::AxisPrecedingSibling if node.is_property() => vec![],
        XmlXPathAxisVal::AxisPrecedingSibling => successors(node.prev, |n| n.prev).collect(),
        XmlXPathAxisVal::AxisFollowing => following(node),
        XmlXPathAxisVal::AxisPreceding => preceding(node),
        XmlXPathAxisVal::AxisAttribute if is_element => node.properties_iter().collect(),
        XmlXPathAxisVal::AxisNamespace if is_element => {
            let mut out = vec![node.implicit_xml_ns()];
            out.extend(node.ns_in_scope().into_iter().filter(|d| d.name() != Some("xml")));
            out
        }
        XmlXPathAxisVal::AxisAttribute | XmlXPathAxisVal::AxisNamespace => vec![],
    };
    nodes.retain(|n| !is_dtd_record(n.element_type()));
    nodes
}

fn is_dtd_record(typ: XmlElementType) -> bool {
    matches!(
        typ,
        XmlElementType::XmlDTDNode
            | XmlElementType::XmlElementDecl
            | XmlElementType::XmlAttributeDecl
            | XmlElementType::XmlEntityDecl
            | XmlElementType::XmlNotationNode
    )
}

fn node_namespace(node: &XmlNode) -> Option<&str> {
    node.ns().map(|ns| ns.href()).filter(|href| !href.is_empty())
}

/// Test `node` against a node test. `ns` is the namespace URI a name test
/// asks for.
#[doc(alias = "xmlXPathNodeTest")]
fn node_test(
    test: &XmlXPathNodeTest,
    principal: XmlElementType,
    ns: Option<&str>,
    node: XmlNodePtr,
) -> bool {
    let typ = node.element_type();
    match test {
        XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeNode) => true,
        XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeText) => node.is_text_node(),
        XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypeComment) => {
            typ == XmlElementType::XmlCommentNode
        }
        XmlXPathNodeTest::Type(XmlXPathTypeVal::NodeTypePI) => typ == XmlElementType::XmlPINode,
        XmlXPathNodeTest::PI(target) => {
            typ == XmlElementType::XmlPINode && node.name() == Some(target.as_str())
        }
        XmlXPathNodeTest::All { prefix } => {
            typ == principal
                && (prefix.is_none()
                    || (principal != XmlElementType::XmlNamespaceDecl
                        && node_namespace(&node) == ns))
        }
        XmlXPathNodeTest::Name { local, .. } => {
            if typ != principal || node.name() != Some(local.as_str()) {
                return false;
            }
            principal == XmlElementType::XmlNamespaceDecl || node_namespace(&node) == ns
        }
    }
}

/// Compare two values with `=`, `!=`, `<`, `<=`, `>` or `>=`.
///
/// A node-set compares true if one of its nodes does.
#[doc(alias = "xmlXPathCompareValues")]
fn compare_values(op: XmlXPathBinaryOp, left: &XmlXPathObject, right: &XmlXPathObject) -> bool {
    let strings = |nodes: &[XmlNodePtr]| {
        nodes
            .iter()
            .map(|&n| XmlXPathObject::String(xml_xpath_cast_node_to_string(n)))
            .collect::<Vec<_>>()
    };
    match (left, right) {
        (XmlXPathObject::NodeSet(x), XmlXPathObject::NodeSet(y)) => {
            let ys = strings(y);
            strings(x)
                .iter()
                .any(|a| ys.iter().any(|b| compare_atomic(op, a, b)))
        }
        (XmlXPathObject::NodeSet(x), XmlXPathObject::Boolean(_)) => {
            compare_atomic(op, &XmlXPathObject::Boolean(!x.is_empty()), right)
        }
        (XmlXPathObject::Boolean(_), XmlXPathObject::NodeSet(y)) => {
            compare_atomic(op, left, &XmlXPathObject::Boolean(!y.is_empty()))
        }
        (XmlXPathObject::NodeSet(x), _) => strings(x).iter().any(|a| compare_atomic(op, a, right)),
        (_, XmlXPathObject::NodeSet(y)) => strings(y).iter().any(|b| compare_atomic(op, left, b)),
        _ => compare_atomic(op, left, right),
    }
}

fn compare_atomic(op: XmlXPathBinaryOp, left: &XmlXPathObject, right: &XmlXPathObject) -> bool {
    match op {
        XmlXPathBinaryOp::Eq | XmlXPathBinaryOp::Neq => {
            let equal = match (left, right) {
                (XmlXPathObject::Boolean(_), _) | (_, XmlXPathObject::Boolean(_)) => {
                    left.cast_to_boolean() == right.cast_to_boolean()
                }
                (XmlXPathObject::Number(_), _) | (_, XmlXPathObject::Number(_)) => {
                    left.cast_to_number() == right.cast_to_number()
                }
                _ => left.cast_to_string() == right.cast_to_string(),
            };
            equal == (op == XmlXPathBinaryOp::Eq)
        }
        _ => {
            let (x, y) = (left.cast_to_number(), right.cast_to_number());
            match op {
                XmlXPathBinaryOp::Lt => x < y,
                XmlXPathBinaryOp::Lte => x <= y,
                XmlXPathBinaryOp::Gt => x > y,
                _ => x >= y,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        parser::xml_read_doc,
        tree::xml_free_node,
        xpath::{XmlXPathContext, XmlXPathError, XmlXPathObject},
    };

    const DOC: &str = "<r xmlns:p='urn:p'><a id='1'>x</a><a id='2'><b/>y</a><p:c/><!--k--><?t v?></r>";

    fn with_ctxt(f: impl FnOnce(&mut XmlXPathContext)) {
        let doc = xml_read_doc(DOC, 0).unwrap();
        let mut ctxt = XmlXPathContext::new(doc);
        ctxt.register_ns("p", "urn:p");
        f(&mut ctxt);
        unsafe { xml_free_node(doc) };
    }

    fn names(obj: &XmlXPathObject) -> Vec<String> {
        let XmlXPathObject::NodeSet(nodes) = obj else {
            panic!("not a node-set: {obj:?}");
        };
        nodes
            .iter()
            .map(|n| n.qualified_name().unwrap_or_default().into_owned())
            .collect()
    }

    #[test]
    fn child_and_descendant_paths() {
        with_ctxt(|ctxt| {
            assert_eq!(names(&ctxt.evaluate("/r/a").unwrap()), ["a", "a"]);
            assert_eq!(names(&ctxt.evaluate("//b").unwrap()), ["b"]);
            assert_eq!(names(&ctxt.evaluate("//a[2]/b/..").unwrap()), ["a"]);
            assert_eq!(names(&ctxt.evaluate("//a/@id").unwrap()), ["id", "id"]);
            assert_eq!(names(&ctxt.evaluate("//a[@id='2']").unwrap()), ["a"]);
            assert_eq!(names(&ctxt.evaluate("/r/*[last()]").unwrap()), ["p:c"]);
        });
    }

    #[test]
    fn reverse_axes_count_from_the_context_node() {
        with_ctxt(|ctxt| {
            assert_eq!(
                names(&ctxt.evaluate("//b/ancestor::*[1]").unwrap()),
                ["a"]
            );
            assert_eq!(
                names(&ctxt.evaluate("//p:c/preceding-sibling::a[1]/@id").unwrap()),
                ["id"]
            );
            let value = ctxt
                .evaluate("string(//p:c/preceding-sibling::a[1]/@id)")
                .unwrap();
            assert_eq!(value, XmlXPathObject::String("2".into()));
            assert_eq!(
                ctxt.evaluate("count(//b/preceding::node())").unwrap(),
                XmlXPathObject::Number(2.0)
            );
            assert_eq!(
                ctxt.evaluate("count(//b/following::node())").unwrap(),
                XmlXPathObject::Number(4.0)
            );
        });
    }

    #[test]
    fn namespaces_need_a_binding() {
        with_ctxt(|ctxt| {
            let err = ctxt.evaluate("//q:c").unwrap_err();
            assert_eq!(err.code, XmlXPathError::XPathUndefPrefixError);
            ctxt.register_ns("q", "urn:p");
            assert_eq!(names(&ctxt.evaluate("//q:c").unwrap()), ["p:c"]);
            assert_eq!(names(&ctxt.evaluate("//q:*").unwrap()), ["p:c"]);
            assert!(names(&ctxt.evaluate("//c").unwrap()).is_empty());
            assert_eq!(names(&ctxt.evaluate("/r/namespace::*").unwrap()), ["xml", "p"]);
            assert_eq!(names(&ctxt.evaluate("//b/namespace::xml").unwrap()), ["xml"]);
            // the declaration of `p` is shared by the elements in its scope
            assert_eq!(
                ctxt.evaluate("count(//namespace::*)").unwrap(),
                XmlXPathObject::Number(6.0)
            );
            assert_eq!(
                ctxt.evaluate("string(/r/a[2]/namespace::xml)").unwrap(),
                XmlXPathObject::String(crate::tree::XML_XML_NAMESPACE.into())
            );
        });
    }

    #[test]
    fn node_type_tests() {
        with_ctxt(|ctxt| {
            assert_eq!(
                ctxt.evaluate("count(//text())").unwrap(),
                XmlXPathObject::Number(2.0)
            );
            assert_eq!(
                ctxt.evaluate("string(//comment())").unwrap(),
                XmlXPathObject::String("k".into())
            );
            assert_eq!(
                names(&ctxt.evaluate("//processing-instruction('t')").unwrap()),
                ["t"]
            );
        });
    }

    #[test]
    fn comparisons_and_arithmetic() {
        with_ctxt(|ctxt| {
            let eval = |e: &str| ctxt.evaluate(e).unwrap();
            assert_eq!(eval("//a/@id = 2"), XmlXPathObject::Boolean(true));
            assert_eq!(eval("//a/@id != 2"), XmlXPathObject::Boolean(true));
            assert_eq!(eval("//a/@id > 2"), XmlXPathObject::Boolean(false));
            assert_eq!(eval("//a = 'x'"), XmlXPathObject::Boolean(true));
            assert_eq!(eval("//nothing = false()"), XmlXPathObject::Boolean(true));
            assert_eq!(eval("7 mod 3 + 4 div 2 * -1"), XmlXPathObject::Number(-1.0));
            assert_eq!(eval("'1' = 1.0"), XmlXPathObject::Boolean(true));
        });
    }

    #[test]
    fn union_is_in_document_order() {
        with_ctxt(|ctxt| {
            assert_eq!(names(&ctxt.evaluate("//b | /r/a[1]").unwrap()), ["a", "b"]);
            let err = ctxt.evaluate("1 | //a").unwrap_err();
            assert_eq!(err.code, XmlXPathError::XPathInvalidType);
            let err = ctxt.evaluate("$v").unwrap_err();
            assert_eq!(err.code, XmlXPathError::XPathUndefVariableError);
        });
    }
}
