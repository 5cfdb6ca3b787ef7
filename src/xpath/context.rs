use std::collections::HashMap;

use crate::tree::{XML_XML_NAMESPACE, XmlNodePtr};

use super::{XPathError, XmlXPathCompExpr, XmlXPathObject, evaluate::Evaluator, xml_xpath_compile};

/// Expression evaluation occurs with respect to a context.
/// The context consists of:
///    - a node (the context node)
///    - a node list (the context node list)
///    - a set of variable bindings
///    - a function library
///    - the set of namespace declarations in scope for the expression
///
/// Only the context node and the namespace declarations are configurable;
/// the function library is the core one and there are no variables.
#[doc(alias = "xmlXPathContext")]
pub struct XmlXPathContext {
    pub(crate) node: XmlNodePtr,
    namespaces: HashMap<String, String>,
}

impl XmlXPathContext {
    #[doc(alias = "xmlXPathNewContext")]
    pub fn new(node: XmlNodePtr) -> Self {
        Self {
            node,
            namespaces: HashMap::new(),
        }
    }

    pub fn node(&self) -> XmlNodePtr {
        self.node
    }

    pub fn set_node(&mut self, node: XmlNodePtr) {
        self.node = node;
    }

    /// Register a new namespace. If `uri` is empty, unregister it.
    ///
    /// An empty `prefix` binds the namespace of unprefixed element name
    /// tests.
    #[doc(alias = "xmlXPathRegisterNs")]
    pub fn register_ns(&mut self, prefix: &str, uri: &str) {
        if uri.is_empty() {
            self.namespaces.remove(prefix);
        } else {
            self.namespaces.insert(prefix.to_owned(), uri.to_owned());
        }
    }

    #[doc(alias = "xmlXPathRegisteredNsCleanup")]
    pub fn registered_ns_cleanup(&mut self) {
        self.namespaces.clear();
    }

    /// Search in the namespace declaration array of the context for the
    /// given namespace name associated to the given prefix.
    #[doc(alias = "xmlXPathNsLookup")]
    pub fn lookup_ns(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_XML_NAMESPACE);
        }
        self.namespaces.get(prefix).map(|uri| uri.as_str())
    }

    /// Evaluate a compiled expression with this context.
    #[doc(alias = "xmlXPathCompiledEval")]
    pub fn compiled_eval(&self, comp: &XmlXPathCompExpr) -> Result<XmlXPathObject, XPathError> {
        log::debug!("evaluating XPath '{}'", comp.source());
        Evaluator::new(self).eval_root(comp.expr())
    }

    /// Compile and evaluate `expr`.
    #[doc(alias = "xmlXPathEvalExpression")]
    pub fn evaluate(&self, expr: &str) -> Result<XmlXPathObject, XPathError> {
        let comp = xml_xpath_compile(expr)?;
        self.compiled_eval(&comp)
    }
}
