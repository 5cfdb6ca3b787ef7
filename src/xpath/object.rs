use crate::tree::XmlNodePtr;

use super::{
    xml_xpath_cast_boolean_to_number, xml_xpath_cast_boolean_to_string,
    xml_xpath_cast_node_to_string, xml_xpath_cast_number_to_boolean,
    xml_xpath_cast_number_to_string, xml_xpath_string_eval_number,
};

// An expression is evaluated to yield an object, which
// has one of the following four basic types:
//   - node-set
//   - boolean
//   - number
//   - string
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlXPathObjectType {
    XPathNodeset = 1,
    XPathBoolean = 2,
    XPathNumber = 3,
    XPathString = 4,
}

/// The value of an XPath expression.
///
/// Node-sets are kept in document order without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlXPathObject {
    NodeSet(Vec<XmlNodePtr>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl XmlXPathObject {
    pub fn typ(&self) -> XmlXPathObjectType {
        match self {
            Self::NodeSet(_) => XmlXPathObjectType::XPathNodeset,
            Self::Boolean(_) => XmlXPathObjectType::XPathBoolean,
            Self::Number(_) => XmlXPathObjectType::XPathNumber,
            Self::String(_) => XmlXPathObjectType::XPathString,
        }
    }

    /// The name of the value type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NodeSet(_) => "node-set",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// Converts an XPath object to its boolean value
    #[doc(alias = "xmlXPathCastToBoolean")]
    pub fn cast_to_boolean(&self) -> bool {
        match self {
            Self::NodeSet(nodes) => !nodes.is_empty(),
            Self::Boolean(b) => *b,
            Self::Number(n) => xml_xpath_cast_number_to_boolean(*n),
            Self::String(s) => !s.is_empty(),
        }
    }

    /// Converts an XPath object to its number value
    #[doc(alias = "xmlXPathCastToNumber")]
    pub fn cast_to_number(&self) -> f64 {
        match self {
            Self::Boolean(b) => xml_xpath_cast_boolean_to_number(*b),
            Self::Number(n) => *n,
            Self::NodeSet(_) | Self::String(_) => {
                xml_xpath_string_eval_number(&self.cast_to_string())
            }
        }
    }

    /// Converts an existing object to its string() equivalent.
    ///
    /// The string value of a node-set is the one of its first node.
    #[doc(alias = "xmlXPathCastToString")]
    pub fn cast_to_string(&self) -> String {
        match self {
            Self::NodeSet(nodes) => nodes
                .first()
                .map(|&n| xml_xpath_cast_node_to_string(n))
                .unwrap_or_default(),
            Self::Boolean(b) => xml_xpath_cast_boolean_to_string(*b).to_owned(),
            Self::Number(n) => xml_xpath_cast_number_to_string(*n).into_owned(),
            Self::String(s) => s.clone(),
        }
    }
}

impl From<bool> for XmlXPathObject {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for XmlXPathObject {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for XmlXPathObject {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for XmlXPathObject {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casts() {
        assert!(XmlXPathObject::from("x").cast_to_boolean());
        assert!(!XmlXPathObject::from("").cast_to_boolean());
        assert!(!XmlXPathObject::from(f64::NAN).cast_to_boolean());
        assert_eq!(XmlXPathObject::from(true).cast_to_number(), 1.0);
        assert_eq!(XmlXPathObject::from(" 4 ").cast_to_number(), 4.0);
        assert_eq!(XmlXPathObject::from(2.5).cast_to_string(), "2.5");
        assert_eq!(XmlXPathObject::from(false).cast_to_string(), "false");
        assert_eq!(XmlXPathObject::NodeSet(vec![]).cast_to_string(), "");
        assert!(XmlXPathObject::NodeSet(vec![]).cast_to_number().is_nan());
    }
}
