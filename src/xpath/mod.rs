//! XPath 1.0 over the node tree.
//!
//! An expression is compiled once by [`xml_xpath_compile`] into a syntax
//! tree and evaluated against an [`XmlXPathContext`], which holds the
//! context node and the prefix bindings usable by name tests.
//!
//! The document order of a tree is the pre-order walk of its nodes where an
//! element is followed by its namespace declarations, then its attributes,
//! then its children. `/` selects the root of the tree holding the context
//! node, which is a document node for nodes attached to a document.

mod compile;
mod context;
mod evaluate;
mod functions;
mod object;

use std::{borrow::Cow, fmt};

pub use compile::*;
pub use context::*;
pub use object::*;

use crate::tree::{XmlElementType, XmlNodePtr};

/// The set of XPath error codes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum XmlXPathError {
    #[default]
    XPathExpressionOK = 0,
    XPathNumberError,
    XPathUnfinishedLiteralError,
    XPathStartLiteralError,
    XPathVariableRefError,
    XPathUndefVariableError,
    XPathInvalidPredicateError,
    XPathExprError,
    XPathUnclosedError,
    XPathUnknownFuncError,
    XPathInvalidOperand,
    XPathInvalidType,
    XPathInvalidArity,
    XPathInvalidCtxtSize,
    XPathInvalidCtxtPosition,
    XPathUndefPrefixError = 19,
    XPathInvalidCharError = 21,
    XPathInvalidCtxt,
    XPathRecursionLimitExceeded = 26,
}

impl XmlXPathError {
    /// The message libxml2 prints for this code.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::XPathExpressionOK => "Ok",
            Self::XPathNumberError => "Number encoding",
            Self::XPathUnfinishedLiteralError => "Unfinished literal",
            Self::XPathStartLiteralError => "Start of literal",
            Self::XPathVariableRefError => "Expected $ for variable reference",
            Self::XPathUndefVariableError => "Undefined variable",
            Self::XPathInvalidPredicateError => "Invalid predicate",
            Self::XPathExprError => "Invalid expression",
            Self::XPathUnclosedError => "Missing closing curly brace",
            Self::XPathUnknownFuncError => "Unregistered function",
            Self::XPathInvalidOperand => "Invalid operand",
            Self::XPathInvalidType => "Invalid type",
            Self::XPathInvalidArity => "Invalid number of arguments",
            Self::XPathInvalidCtxtSize => "Invalid context size",
            Self::XPathInvalidCtxtPosition => "Invalid context position",
            Self::XPathUndefPrefixError => "Undefined namespace prefix",
            Self::XPathInvalidCharError => "Char out of XML range",
            Self::XPathInvalidCtxt => "Invalid or incomplete context",
            Self::XPathRecursionLimitExceeded => "Recursion limit exceeded",
        }
    }
}

/// An error raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct XPathError {
    pub code: XmlXPathError,
    pub message: String,
    /// Byte offset in the expression, when known.
    pub position: Option<usize>,
}

impl XPathError {
    pub(crate) fn new(code: XmlXPathError, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            position: None,
        }
    }

    pub(crate) fn from_code(code: XmlXPathError) -> Self {
        Self::new(code, code.default_message())
    }

    pub(crate) fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for XPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at offset {pos}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for XPathError {}

pub const XML_XPATH_NAN: f64 = f64::NAN;
pub const XML_XPATH_PINF: f64 = f64::INFINITY;
pub const XML_XPATH_NINF: f64 = f64::NEG_INFINITY;

/// Converts a number to its boolean value
#[doc(alias = "xmlXPathCastNumberToBoolean")]
pub fn xml_xpath_cast_number_to_boolean(val: f64) -> bool {
    !val.is_nan() && val != 0.0
}

#[doc(alias = "xmlXPathCastBooleanToNumber")]
pub fn xml_xpath_cast_boolean_to_number(val: bool) -> f64 {
    if val { 1.0 } else { 0.0 }
}

#[doc(alias = "xmlXPathCastBooleanToString")]
pub fn xml_xpath_cast_boolean_to_string(val: bool) -> &'static str {
    if val { "true" } else { "false" }
}

const DBL_DIG: usize = 15;
const UPPER_DOUBLE: f64 = 1E9;
const LOWER_DOUBLE: f64 = 1E-5;

/// Convert a number that is neither zero, infinite nor an integer.
#[doc(alias = "xmlXPathFormatNumber")]
fn xml_xpath_format_number(number: f64, buffer: &mut String) {
    use std::fmt::Write as _;

    let absolute_value = number.abs();
    if !(LOWER_DOUBLE..=UPPER_DOUBLE).contains(&absolute_value) {
        // XPath has no exponent notation
        // the shortest decimal reading back as `number` is written instead
        write!(buffer, "{number}").ok();
    } else {
        let integer_place = absolute_value.log10().max(0.0) as usize;
        let fraction_place = if integer_place > 0 {
            DBL_DIG - integer_place - 1
        } else {
            DBL_DIG - integer_place
        };
        write!(buffer, "{number:0.fraction_place$}").ok();
        while buffer.ends_with('0') {
            buffer.pop();
        }
        if buffer.ends_with('.') {
            buffer.pop();
        }
    }
    let trimmed = buffer.len() - buffer.trim_start().len();
    buffer.drain(..trimmed);
}

/// Converts a number to its string value.
#[doc(alias = "xmlXPathCastNumberToString")]
pub fn xml_xpath_cast_number_to_string(val: f64) -> Cow<'static, str> {
    if val.is_nan() {
        "NaN".into()
    } else if val == f64::INFINITY {
        "Infinity".into()
    } else if val == f64::NEG_INFINITY {
        "-Infinity".into()
    } else if val == 0.0 {
        // no sign for negative zero
        "0".into()
    } else if val > i32::MIN as f64 && val < i32::MAX as f64 && val == val as i32 as f64 {
        (val as i32).to_string().into()
    } else {
        let mut buf = String::new();
        xml_xpath_format_number(val, &mut buf);
        buf.into()
    }
}

const MAX_FRAC: i32 = 20;

/// Converts a string to its number value.
///
/// Leading and trailing blanks are allowed, as is an exponent. Anything
/// else gives NaN.
#[doc(alias = "xmlXPathStringEvalNumber")]
pub fn xml_xpath_string_eval_number(s: &str) -> f64 {
    let s = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
    let bytes = s.as_bytes();
    let mut cur = 0;
    let negative = bytes.first() == Some(&b'-');
    if negative {
        cur += 1;
    }
    if !bytes.get(cur).is_some_and(|&b| b == b'.' || b.is_ascii_digit()) {
        return XML_XPATH_NAN;
    }
    let mut ret = 0.0;
    let mut ok = false;
    while let Some(&b) = bytes.get(cur).filter(|b| b.is_ascii_digit()) {
        ret = ret * 10.0 + (b - b'0') as f64;
        ok = true;
        cur += 1;
    }
    if bytes.get(cur) == Some(&b'.') {
        cur += 1;
        if !ok && !bytes.get(cur).is_some_and(|b| b.is_ascii_digit()) {
            return XML_XPATH_NAN;
        }
        let mut frac = 0;
        while bytes.get(cur) == Some(&b'0') {
            frac += 1;
            cur += 1;
        }
        let max = frac + MAX_FRAC;
        let mut fraction = 0.0;
        while let Some(&b) = bytes.get(cur).filter(|b| b.is_ascii_digit()) {
            if frac < max {
                fraction = fraction * 10.0 + (b - b'0') as f64;
                frac += 1;
            }
            cur += 1;
        }
        ret += fraction / 10.0f64.powi(frac);
    }
    let mut exponent = 0i32;
    if matches!(bytes.get(cur), Some(b'e' | b'E')) {
        cur += 1;
        let negative_exponent = bytes.get(cur) == Some(&b'-');
        if matches!(bytes.get(cur), Some(b'-' | b'+')) {
            cur += 1;
        }
        while let Some(&b) = bytes.get(cur).filter(|b| b.is_ascii_digit()) {
            if exponent < 1000000 {
                exponent = exponent * 10 + (b - b'0') as i32;
            }
            cur += 1;
        }
        if negative_exponent {
            exponent = -exponent;
        }
    }
    if cur != bytes.len() {
        return XML_XPATH_NAN;
    }
    if negative {
        ret = -ret;
    }
    ret * 10.0f64.powi(exponent)
}

/// The string-value of a node.
#[doc(alias = "xmlXPathCastNodeToString")]
pub fn xml_xpath_cast_node_to_string(node: XmlNodePtr) -> String {
    match node.element_type() {
        XmlElementType::XmlElementNode
        | XmlElementType::XmlDocumentNode
        | XmlElementType::XmlDocumentFragNode => node.get_content(),
        _ => node.content().unwrap_or("").to_owned(),
    }
}

/// Compile and evaluate `expr` with `node` as context node and no prefix
/// bindings but `xml`.
#[doc(alias = "xmlXPathEval")]
pub fn xml_xpath_eval(expr: &str, node: XmlNodePtr) -> Result<XmlXPathObject, XPathError> {
    XmlXPathContext::new(node).evaluate(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_to_string() {
        assert_eq!(xml_xpath_cast_number_to_string(1.0), "1");
        assert_eq!(xml_xpath_cast_number_to_string(-0.0), "0");
        assert_eq!(xml_xpath_cast_number_to_string(0.5), "0.5");
        assert_eq!(xml_xpath_cast_number_to_string(-2.25), "-2.25");
        assert_eq!(xml_xpath_cast_number_to_string(f64::NAN), "NaN");
        assert_eq!(xml_xpath_cast_number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(xml_xpath_cast_number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(xml_xpath_cast_number_to_string(1.0 / 3.0), "0.333333333333333");
        assert_eq!(
            xml_xpath_cast_number_to_string(12345678901234567890.0),
            "12345678901234567000"
        );
        assert_eq!(xml_xpath_cast_number_to_string(4294967296.0), "4294967296");
        assert_eq!(xml_xpath_cast_number_to_string(-2.5e10), "-25000000000");
        assert_eq!(xml_xpath_cast_number_to_string(1.5e-7), "0.00000015");
    }

    #[test]
    fn string_to_number() {
        assert_eq!(xml_xpath_string_eval_number(" 12 "), 12.0);
        assert_eq!(xml_xpath_string_eval_number("-1.5"), -1.5);
        assert_eq!(xml_xpath_string_eval_number(".5"), 0.5);
        assert_eq!(xml_xpath_string_eval_number("5."), 5.0);
        assert_eq!(xml_xpath_string_eval_number("1e3"), 1000.0);
        assert!(xml_xpath_string_eval_number("").is_nan());
        assert!(xml_xpath_string_eval_number("abc").is_nan());
        assert!(xml_xpath_string_eval_number("1 2").is_nan());
        assert!(xml_xpath_string_eval_number(".").is_nan());
        assert!(xml_xpath_string_eval_number("+1").is_nan());
    }
}
