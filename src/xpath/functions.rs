//! The core function library of XPath 1.0.

use crate::tree::{XML_XML_NAMESPACE, XmlElementType, XmlNodePtr};

use super::{
    XPathError, XmlXPathError, XmlXPathExpr, XmlXPathObject,
    evaluate::{Evaluator, Focus},
    xml_xpath_cast_node_to_string, xml_xpath_string_eval_number,
};

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn arity_error(name: &str) -> XPathError {
    XPathError::new(
        XmlXPathError::XPathInvalidArity,
        format!("Invalid number of arguments for {name}()"),
    )
}

/// Argument access with the arity checked up front.
struct Args<'e, 'a> {
    ev: &'e Evaluator<'a>,
    args: &'e [XmlXPathExpr],
    focus: Focus,
}

impl Args<'_, '_> {
    fn object(&self, i: usize) -> Result<XmlXPathObject, XPathError> {
        self.ev.eval(&self.args[i], self.focus)
    }

    fn string(&self, i: usize) -> Result<String, XPathError> {
        Ok(self.object(i)?.cast_to_string())
    }

    fn number(&self, i: usize) -> Result<f64, XPathError> {
        Ok(self.object(i)?.cast_to_number())
    }

    fn nodes(&self, i: usize) -> Result<Vec<XmlNodePtr>, XPathError> {
        self.ev.node_set(&self.args[i], self.focus)
    }

    /// The string argument `i`, or the string-value of the context node.
    fn string_or_context(&self, i: usize) -> Result<String, XPathError> {
        if self.args.len() > i {
            self.string(i)
        } else {
            Ok(xml_xpath_cast_node_to_string(self.focus.node))
        }
    }

    /// The first node of node-set argument `i`, or the context node.
    fn node_or_context(&self, i: usize) -> Result<Option<XmlNodePtr>, XPathError> {
        if self.args.len() > i {
            Ok(self.nodes(i)?.first().copied())
        } else {
            Ok(Some(self.focus.node))
        }
    }
}

/// The accepted argument counts of a core function, `None` if `name` is not
/// one.
fn arity(name: &str) -> Option<(usize, usize)> {
    let range = match name {
        "last" | "position" | "true" | "false" => (0, 0),
        "count" | "id" | "boolean" | "not" | "lang" | "sum" | "floor" | "ceiling" | "round" => {
            (1, 1)
        }
        "local-name" | "namespace-uri" | "name" | "string" | "string-length"
        | "normalize-space" | "number" => (0, 1),
        "starts-with" | "contains" | "substring-before" | "substring-after" => (2, 2),
        "substring" => (2, 3),
        "translate" => (3, 3),
        "concat" => (2, usize::MAX),
        _ => return None,
    };
    Some(range)
}

/// Call the core function `name`.
#[doc(alias = "xmlXPathFunctionLookup")]
pub(crate) fn call_function(
    ev: &Evaluator,
    name: &str,
    args: &[XmlXPathExpr],
    focus: Focus,
) -> Result<XmlXPathObject, XPathError> {
    let unknown = || {
        XPathError::new(
            XmlXPathError::XPathUnknownFuncError,
            format!("Unregistered function: {name}"),
        )
    };
    let (min, max) = arity(name).ok_or_else(unknown)?;
    if args.len() < min || args.len() > max {
        return Err(arity_error(name));
    }
    let a = Args { ev, args, focus };
    let value = match name {
        "last" => XmlXPathObject::Number(focus.size as f64),
        "position" => XmlXPathObject::Number(focus.position as f64),
        "count" => XmlXPathObject::Number(a.nodes(0)?.len() as f64),
        "id" => XmlXPathObject::NodeSet(id_function(ev, &a, focus.node)?),
        "local-name" => {
            let node = a.node_or_context(0)?;
            XmlXPathObject::String(node.map(local_name).unwrap_or_default())
        }
        "namespace-uri" => {
            let node = a.node_or_context(0)?;
            let uri = node
                .filter(|n| {
                    matches!(
                        n.element_type(),
                        XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode
                    )
                })
                .and_then(|n| n.ns().map(|ns| ns.href().to_owned()));
            XmlXPathObject::String(uri.unwrap_or_default())
        }
        "name" => {
            let node = a.node_or_context(0)?;
            XmlXPathObject::String(node.map(qualified_name).unwrap_or_default())
        }
        "string" => XmlXPathObject::String(match args.len() {
            0 => xml_xpath_cast_node_to_string(focus.node),
            _ => a.string(0)?,
        }),
        "concat" => {
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(&a.string(i)?);
            }
            XmlXPathObject::String(out)
        }
        "starts-with" => XmlXPathObject::Boolean(a.string(0)?.starts_with(&a.string(1)?)),
        "contains" => XmlXPathObject::Boolean(a.string(0)?.contains(&a.string(1)?)),
        "substring-before" => {
            let (s, sep) = (a.string(0)?, a.string(1)?);
            let before = s.find(&sep).map(|i| &s[..i]).unwrap_or("");
            XmlXPathObject::String(before.to_owned())
        }
        "substring-after" => {
            let (s, sep) = (a.string(0)?, a.string(1)?);
            let after = s.find(&sep).map(|i| &s[i + sep.len()..]).unwrap_or("");
            XmlXPathObject::String(after.to_owned())
        }
        "substring" => {
            let s = a.string(0)?;
            let start = a.number(1)?;
            let length = match args.len() {
                3 => Some(a.number(2)?),
                _ => None,
            };
            XmlXPathObject::String(substring(&s, start, length))
        }
        "string-length" => {
            XmlXPathObject::Number(a.string_or_context(0)?.chars().count() as f64)
        }
        "normalize-space" => {
            let s = a.string_or_context(0)?;
            let words = s.split(is_blank).filter(|w| !w.is_empty());
            XmlXPathObject::String(words.collect::<Vec<_>>().join(" "))
        }
        "translate" => {
            let (s, from, to) = (a.string(0)?, a.string(1)?, a.string(2)?);
            XmlXPathObject::String(translate(&s, &from, &to))
        }
        "boolean" => XmlXPathObject::Boolean(a.object(0)?.cast_to_boolean()),
        "not" => XmlXPathObject::Boolean(!a.object(0)?.cast_to_boolean()),
        "true" => XmlXPathObject::Boolean(true),
        "false" => XmlXPathObject::Boolean(false),
        "lang" => XmlXPathObject::Boolean(lang(focus.node, &a.string(0)?)),
        "number" => XmlXPathObject::Number(match args.len() {
            0 => xml_xpath_string_eval_number(&xml_xpath_cast_node_to_string(focus.node)),
            _ => a.number(0)?,
        }),
        "sum" => XmlXPathObject::Number(
            a.nodes(0)?
                .into_iter()
                .map(|n| xml_xpath_string_eval_number(&xml_xpath_cast_node_to_string(n)))
                .sum(),
        ),
        "floor" => XmlXPathObject::Number(a.number(0)?.floor()),
        "ceiling" => XmlXPathObject::Number(a.number(0)?.ceil()),
        "round" => XmlXPathObject::Number(round(a.number(0)?)),
        _ => return Err(unknown()),
    };
    Ok(value)
}

fn local_name(node: XmlNodePtr) -> String {
    match node.element_type() {
        XmlElementType::XmlElementNode
        | XmlElementType::XmlAttributeNode
        | XmlElementType::XmlPINode
        | XmlElementType::XmlNamespaceDecl => node.name().unwrap_or("").to_owned(),
        _ => String::new(),
    }
}

fn qualified_name(node: XmlNodePtr) -> String {
    match node.element_type() {
        XmlElementType::XmlElementNode | XmlElementType::XmlAttributeNode => node
            .qualified_name()
            .map(|name| name.into_owned())
            .unwrap_or_default(),
        _ => local_name(node),
    }
}

/// Select the elements of the context tree whose `xml:id` is one of the
/// blank separated tokens of the argument.
#[doc(alias = "xmlXPathIdFunction")]
fn id_function(
    ev: &Evaluator,
    a: &Args,
    context: XmlNodePtr,
) -> Result<Vec<XmlNodePtr>, XPathError> {
    let ids = match a.object(0)? {
        XmlXPathObject::NodeSet(nodes) => nodes
            .into_iter()
            .map(xml_xpath_cast_node_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.cast_to_string(),
    };
    let tokens = ids.split(is_blank).filter(|t| !t.is_empty()).collect::<Vec<_>>();
    let mut out = context
        .tree_root()
        .subtree()
        .into_iter()
        .filter(|n| n.element_type() == XmlElementType::XmlElementNode)
        .filter(|n| {
            n.has_ns_prop("id", Some(XML_XML_NAMESPACE))
                .and_then(|attr| attr.content().map(|v| tokens.contains(&v.trim())))
                .unwrap_or(false)
        })
        .collect();
    ev.sort(&mut out);
    Ok(out)
}

#[doc(alias = "xmlXPathSubstringFunction")]
fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let start = round(start);
    let end = length.map_or(f64::INFINITY, |len| start + round(len));
    s.chars()
        .enumerate()
        .filter(|&(i, _)| {
            let pos = (i + 1) as f64;
            pos >= start && pos < end
        })
        .map(|(_, c)| c)
        .collect()
}

#[doc(alias = "xmlXPathTranslateFunction")]
fn translate(s: &str, from: &str, to: &str) -> String {
    let to = to.chars().collect::<Vec<_>>();
    s.chars()
        .filter_map(|c| match from.chars().position(|f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}

/// Whether the `xml:lang` in scope for `node` is `lang` or a sublanguage of
/// it, ignoring case.
#[doc(alias = "xmlXPathLangFunction")]
fn lang(node: XmlNodePtr, lang: &str) -> bool {
    let Some(value) = node.ancestors_or_self().find_map(|n| {
        n.has_ns_prop("lang", Some(XML_XML_NAMESPACE))
            .and_then(|attr| attr.content().map(|v| v.to_owned()))
    }) else {
        return false;
    };
    let value = value.to_ascii_lowercase();
    let lang = lang.to_ascii_lowercase();
    value == lang
        || value
            .strip_prefix(lang.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Round half up, keeping NaN, infinities and the sign of zero.
#[doc(alias = "xmlXPathRoundFunction")]
fn round(n: f64) -> f64 {
    if !n.is_finite() || n == 0.0 {
        return n;
    }
    if (-0.5..0.0).contains(&n) {
        return -0.0;
    }
    (n + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use crate::{
        parser::xml_read_doc,
        tree::xml_free_node,
        xpath::{XmlXPathContext, XmlXPathError, XmlXPathObject},
    };

    /// Node-sets are cast to their string value while the document is alive.
    fn eval(doc: &str, expr: &str) -> Result<XmlXPathObject, crate::xpath::XPathError> {
        let doc = xml_read_doc(doc, 0).unwrap();
        let res = XmlXPathContext::new(doc).evaluate(expr).map(|obj| match obj {
            XmlXPathObject::NodeSet(_) => XmlXPathObject::String(obj.cast_to_string()),
            other => other,
        });
        unsafe { xml_free_node(doc) };
        res
    }

    fn string(expr: &str) -> String {
        eval("<r/>", expr).unwrap().cast_to_string()
    }

    #[test]
    fn string_functions() {
        assert_eq!(string("concat('a', 1, true())"), "a1true");
        assert_eq!(string("substring('12345', 2, 3)"), "234");
        assert_eq!(string("substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(string("substring('12345', 0, 3)"), "12");
        assert_eq!(string("substring('12345', 0 div 0, 3)"), "");
        assert_eq!(string("substring('12345', -42, 1 div 0)"), "12345");
        assert_eq!(string("substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(string("substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(string("normalize-space('  a \t b\n ')"), "a b");
        assert_eq!(string("translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(string("string-length('héllo')"), "5");
        assert_eq!(string("starts-with('abc', 'ab')"), "true");
        assert_eq!(string("contains('abc', 'd')"), "false");
    }

    #[test]
    fn number_functions() {
        assert_eq!(string("round(2.5)"), "3");
        assert_eq!(string("round(-2.5)"), "-2");
        assert_eq!(string("floor(-1.5)"), "-2");
        assert_eq!(string("ceiling(1.1)"), "2");
        assert_eq!(string("number('x')"), "NaN");
        assert_eq!(string("string(12345678901234567890)"), "12345678901234567000");
        assert_eq!(string("string(0.0000001)"), "0.0000001");
        assert_eq!(string("3000000000 * 2"), "6000000000");
        assert_eq!(
            eval("<r><v>1</v><v>2.5</v></r>", "sum(//v)").unwrap(),
            XmlXPathObject::Number(3.5)
        );
    }

    #[test]
    fn node_functions() {
        let doc = "<r xmlns:p='urn:p' xml:lang='en-GB'><p:a xml:id='k'/><b/><b/></r>";
        let eval = |e| eval(doc, e).unwrap().cast_to_string();
        assert_eq!(eval("name(/r/*[1])"), "p:a");
        assert_eq!(eval("local-name(/r/*[1])"), "a");
        assert_eq!(eval("namespace-uri(/r/*[1])"), "urn:p");
        assert_eq!(eval("count(/r/b)"), "2");
        assert_eq!(eval("/r/b[last()]/preceding-sibling::*[position() = 2]/@xml:id"), "k");
        assert_eq!(eval("local-name(id('x k'))"), "a");
        assert_eq!(eval("boolean(//b[lang('en')])"), "true");
        assert_eq!(eval("boolean(//b[lang('fr')])"), "false");
        assert_eq!(eval("name(/)"), "");
    }

    #[test]
    fn call_errors() {
        let err = eval("<r/>", "nope()").unwrap_err();
        assert_eq!(err.code, XmlXPathError::XPathUnknownFuncError);
        let err = eval("<r/>", "count()").unwrap_err();
        assert_eq!(err.code, XmlXPathError::XPathInvalidArity);
        let err = eval("<r/>", "concat('a')").unwrap_err();
        assert_eq!(err.code, XmlXPathError::XPathInvalidArity);
        let err = eval("<r/>", "count('a')").unwrap_err();
        assert_eq!(err.code, XmlXPathError::XPathInvalidType);
    }
}
