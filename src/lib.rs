//! Object-style XML node handles (in the manner of NSXML/KissXML) over a
//! libxml2-style XML tree.
//!
//! The crate is layered like the library it imitates:
//!
//! - [`tree`]: raw node records linked by [`tree::XmlNodePtr`], freed as a whole tree.
//! - [`parser`]: builds such a tree from text or bytes.
//! - [`save`]: serializes a subtree.
//! - [`xpath`]: compiles and evaluates XPath 1.0 expressions over a tree.
//! - [`dom`]: the public handles. Any number of handles may point into one tree,
//!   and the tree lives exactly as long as the last of them.
//!
//! ```
//! use ddxml::{DocumentRef, XmlNodeOptions, DDXML_DEFAULT_PARSE_OPTIONS};
//!
//! let doc = DocumentRef::parse_str("<r><a/><b/></r>", DDXML_DEFAULT_PARSE_OPTIONS).unwrap();
//! let a = doc.root_element().unwrap().child_at_index(0).unwrap();
//! a.detach();
//! drop(doc);
//! assert_eq!(a.xml_string_with_options(XmlNodeOptions::NONE), "<a/>");
//! ```

#![allow(clippy::missing_safety_doc)]
#![allow(clippy::new_without_default)]
#![warn(unused_imports)]
#![warn(unused_mut)]
#![warn(unused_variables)]

pub mod dom;
pub mod encoding;
pub mod error;
pub mod globals;
pub mod parser;
pub mod save;
pub mod tree;
#[cfg(feature = "xpath")]
pub mod xpath;

pub use dom::{
    XmlNodeError, XmlNodeKind, XmlNodeOptions, document::DocumentRef, element::ElementRef,
    node::NodeRef,
};
#[cfg(feature = "xpath")]
pub use dom::node::XPathValue;
pub use parser::{DDXML_DEFAULT_PARSE_OPTIONS, XmlParserOption};
