//! Serialization of trees back to XML text.

use crate::{
    encoding::{encode_output, is_supported_output_encoding},
    error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
    globals::{indent_tree_output, report_error, save_no_empty_tags, tree_indent_string},
    tree::{XmlElementType, XmlNodePtr},
};

/// This is the set of XML save options that can be passed down
/// to the `xml_*_dump` functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlSaveOption {
    XmlSaveFormat = 1 << 0,  /* format save output */
    XmlSaveNoDecl = 1 << 1,  /* drop the xml declaration */
    XmlSaveNoEmpty = 1 << 2, /* no empty tags */
}

/// Escape character data.
#[doc(alias = "xmlEscapeEntities")]
pub fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
}

/// Escape an attribute value.
///
/// Whitespace other than space is written as character references so that
/// attribute value normalization gives it back unchanged.
#[doc(alias = "xmlAttrSerializeTxtContent")]
pub fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
}

/// Pending work of a serialization.
enum Step {
    Enter(XmlNodePtr, bool),
    /// The newline written after each child of a formatted element.
    Separator,
    /// The end tag of an element and the formatting state to restore.
    Close(XmlNodePtr, bool),
}

/// State of one serialization.
pub struct XmlSaveCtxt {
    buf: String,
    options: i32,
    format: bool,
    level: usize,
    indent: String,
    indent_output: bool,
    encoding: Option<String>,
}

impl XmlSaveCtxt {
    pub fn new(options: i32) -> Self {
        let mut options = options;
        if save_no_empty_tags() {
            options |= XmlSaveOption::XmlSaveNoEmpty as i32;
        }
        Self {
            buf: String::new(),
            options,
            format: options & XmlSaveOption::XmlSaveFormat as i32 != 0,
            level: 0,
            indent: tree_indent_string().into_owned(),
            indent_output: indent_tree_output(),
            encoding: None,
        }
    }

    /// Write `encoding` in the XML declaration instead of the one recorded
    /// on the document.
    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_owned());
        self
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    fn write_indent(&mut self) {
        if self.format && self.indent_output {
            for _ in 0..self.level {
                self.buf.push_str(&self.indent);
            }
        }
    }

    fn write_qname(&mut self, node: XmlNodePtr) {
        if let Some(name) = node.qualified_name() {
            self.buf.push_str(&name);
        }
    }

    fn attribute(&mut self, attr: XmlNodePtr) {
        self.write_qname(attr);
        self.buf.push_str("=\"");
        escape_attribute(&mut self.buf, attr.content.as_deref().unwrap_or(""));
        self.buf.push('"');
    }

    #[doc(alias = "xmlNsDumpOutput")]
    fn ns_decl(&mut self, decl: XmlNodePtr) {
        match decl.name.as_deref() {
            Some(prefix) => {
                self.buf.push_str("xmlns:");
                self.buf.push_str(prefix);
            }
            None => self.buf.push_str("xmlns"),
        }
        self.buf.push_str("=\"");
        escape_attribute(&mut self.buf, decl.content.as_deref().unwrap_or(""));
        self.buf.push('"');
    }

    /// Write the start tag of `cur`.
    ///
    /// Returns the formatting state to restore at its end tag, or `None` if
    /// the element was written as an empty one.
    fn start_tag(&mut self, cur: XmlNodePtr, is_root: bool) -> Option<bool> {
        if !is_root {
            self.write_indent();
        }
        self.buf.push('<');
        self.write_qname(cur);
        for decl in cur.ns_def_iter() {
            self.buf.push(' ');
            self.ns_decl(decl);
        }
        for attr in cur.properties_iter() {
            self.buf.push(' ');
            self.attribute(attr);
        }
        if cur.children.is_none() {
            if self.options & XmlSaveOption::XmlSaveNoEmpty as i32 != 0 {
                self.buf.push_str("></");
                self.write_qname(cur);
                self.buf.push('>');
            } else {
                self.buf.push_str("/>");
            }
            return None;
        }

        let format = self.format;
        if self.format && cur.children_iter().any(|c| c.is_text_node()) {
            self.format = false;
        }
        self.buf.push('>');
        if self.format {
            self.buf.push('\n');
        }
        self.level += 1;
        Some(format)
    }

    fn end_tag(&mut self, cur: XmlNodePtr, format: bool) {
        self.level -= 1;
        self.write_indent();
        self.buf.push_str("</");
        self.write_qname(cur);
        self.buf.push('>');
        self.format = format;
    }

    fn cdata(&mut self, content: &str) {
        if content.is_empty() {
            self.buf.push_str("<![CDATA[]]>");
            return;
        }
        // a "]]>" inside the content is split over two sections
        let mut rest = content;
        while let Some(pos) = rest.find("]]>") {
            self.buf.push_str("<![CDATA[");
            self.buf.push_str(&rest[..pos + 2]);
            self.buf.push_str("]]>");
            rest = &rest[pos + 2..];
        }
        self.buf.push_str("<![CDATA[");
        self.buf.push_str(rest);
        self.buf.push_str("]]>");
    }

    /// Serialize `cur` and its subtree.
    ///
    /// The subtree is walked with an explicit stack, so its depth is only
    /// bounded by memory.
    #[doc(alias = "xmlNodeDumpOutputInternal")]
    fn node(&mut self, cur: XmlNodePtr, is_root: bool) {
        let mut stack = vec![Step::Enter(cur, is_root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node, is_root) => self.enter(node, is_root, &mut stack),
                Step::Separator => {
                    if self.format {
                        self.buf.push('\n');
                    }
                }
                Step::Close(elem, format) => self.end_tag(elem, format),
            }
        }
    }

    /// Write `cur` itself, pushing what remains of its subtree on `stack`.
    fn enter(&mut self, cur: XmlNodePtr, is_root: bool, stack: &mut Vec<Step>) {
        match cur.typ {
            XmlElementType::XmlDocumentNode | XmlElementType::XmlHTMLDocumentNode => {
                self.document(cur)
            }
            XmlElementType::XmlDocumentFragNode => {
                let children = cur.children_iter().collect::<Vec<_>>();
                stack.extend(children.into_iter().rev().map(|c| Step::Enter(c, is_root)));
            }
            XmlElementType::XmlElementNode => {
                if let Some(format) = self.start_tag(cur, is_root) {
                    stack.push(Step::Close(cur, format));
                    let children = cur.children_iter().collect::<Vec<_>>();
                    for child in children.into_iter().rev() {
                        stack.push(Step::Separator);
                        stack.push(Step::Enter(child, false));
                    }
                }
            }
            XmlElementType::XmlTextNode => {
                escape_text(&mut self.buf, cur.content.as_deref().unwrap_or(""))
            }
            XmlElementType::XmlCDATASectionNode => {
                self.cdata(cur.content.as_deref().unwrap_or(""))
            }
            XmlElementType::XmlCommentNode => {
                if !is_root {
                    self.write_indent();
                }
                self.buf.push_str("<!--");
                self.buf.push_str(cur.content.as_deref().unwrap_or(""));
                self.buf.push_str("-->");
            }
            XmlElementType::XmlPINode => {
                if !is_root {
                    self.write_indent();
                }
                self.buf.push_str("<?");
                self.buf.push_str(cur.name.as_deref().unwrap_or(""));
                if let Some(content) = cur.content.as_deref().filter(|c| !c.is_empty()) {
                    self.buf.push(' ');
                    self.buf.push_str(content);
                }
                self.buf.push_str("?>");
            }
            XmlElementType::XmlAttributeNode => self.attribute(cur),
            XmlElementType::XmlNamespaceDecl => self.ns_decl(cur),
            XmlElementType::XmlDTDNode => {
                self.buf.push_str("<!DOCTYPE ");
                self.buf.push_str(cur.content.as_deref().unwrap_or(""));
                self.buf.push('>');
            }
            XmlElementType::XmlElementDecl
            | XmlElementType::XmlAttributeDecl
            | XmlElementType::XmlEntityDecl
            | XmlElementType::XmlNotationNode => {
                self.buf.push_str(cur.content.as_deref().unwrap_or(""));
            }
            _ => {}
        }
    }

    /// Serialize a document: the XML declaration, then each top-level node
    /// on a line of its own.
    #[doc(alias = "xmlDocContentDumpOutput")]
    fn document(&mut self, doc: XmlNodePtr) {
        if self.options & XmlSaveOption::XmlSaveNoDecl as i32 == 0 {
            self.buf.push_str("<?xml version=\"");
            self.buf.push_str(doc.version.as_deref().unwrap_or("1.0"));
            self.buf.push('"');
            if let Some(encoding) = self.encoding.clone().or_else(|| doc.encoding.clone()) {
                self.buf.push_str(" encoding=\"");
                self.buf.push_str(&encoding);
                self.buf.push('"');
            }
            match doc.standalone {
                Some(true) => self.buf.push_str(" standalone=\"yes\""),
                Some(false) => self.buf.push_str(" standalone=\"no\""),
                None => {}
            }
            self.buf.push_str("?>\n");
        }
        for child in doc.children_iter() {
            self.level = 0;
            self.node(child, true);
            self.buf.push('\n');
        }
    }
}

/// Serialize `cur` to a string.
///
/// Formatted elements end with a newline.
#[doc(alias = "xmlNodeDump")]
pub fn xml_node_dump(cur: XmlNodePtr, options: i32) -> String {
    log::debug!("serializing {:?} node, options {options:#x}", cur.typ);
    let mut ctxt = XmlSaveCtxt::new(options);
    ctxt.node(cur, true);
    if ctxt.format && cur.typ == XmlElementType::XmlElementNode {
        ctxt.buf.push('\n');
    }
    ctxt.into_string()
}

/// Serialize a document to bytes in the encoding it declares.
///
/// If that encoding cannot be produced, the output is UTF-8 and says so in
/// its declaration.
#[doc(alias = "xmlDocDumpFormatMemoryEnc")]
pub fn xml_doc_dump_memory(doc: XmlNodePtr, options: i32) -> Vec<u8> {
    let declared = doc.encoding.clone();
    if let Some(encoding) = declared.as_deref() {
        if is_supported_output_encoding(encoding) {
            let mut ctxt = XmlSaveCtxt::new(options);
            ctxt.node(doc, true);
            if let Some(bytes) = encode_output(&ctxt.into_string(), encoding) {
                return bytes;
            }
        }
        report_error(XmlError::new(
            XmlErrorDomain::XmlFromOutput,
            XmlParserErrors::XmlSaveUnknownEncoding,
            XmlErrorLevel::XmlErrWarning,
            format!("unknown encoding {encoding}, writing UTF-8"),
        ));
        let mut ctxt = XmlSaveCtxt::new(options).with_encoding("UTF-8");
        ctxt.node(doc, true);
        return ctxt.into_string().into_bytes();
    }
    let mut ctxt = XmlSaveCtxt::new(options);
    ctxt.node(doc, true);
    ctxt.into_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use crate::{
        parser::{XmlParserOption, xml_read_doc},
        tree::xml_free_node,
    };

    use super::*;

    const FORMAT: i32 = XmlSaveOption::XmlSaveFormat as i32;
    const NO_EMPTY: i32 = XmlSaveOption::XmlSaveNoEmpty as i32;

    fn with_doc(text: &str, f: impl FnOnce(XmlNodePtr)) {
        let doc = xml_read_doc(text, XmlParserOption::XmlParseNoBlanks as i32).unwrap();
        f(doc);
        unsafe { xml_free_node(doc) };
    }

    #[test]
    fn compact_and_expanded_empty_elements() {
        with_doc("<a><b/></a>", |doc| {
            let root = doc.get_root_element().unwrap();
            assert_eq!(xml_node_dump(root, 0), "<a><b/></a>");
            assert_eq!(xml_node_dump(root, NO_EMPTY), "<a><b></b></a>");
        });
    }

    #[test]
    fn formatted_output_is_indented() {
        with_doc("<a><b><c/></b><d>text<e/></d></a>", |doc| {
            let root = doc.get_root_element().unwrap();
            assert_eq!(
                xml_node_dump(root, FORMAT),
                "<a>\n  <b>\n    <c/>\n  </b>\n  <d>text<e/></d>\n</a>\n"
            );
        });
    }

    #[test]
    fn escaping() {
        with_doc("<a x='&lt;&quot;&#9;&#10;'>&amp;&lt;&gt;\"</a>", |doc| {
            let root = doc.get_root_element().unwrap();
            assert_eq!(
                xml_node_dump(root, 0),
                "<a x=\"&lt;&quot;&#9;&#10;\">&amp;&lt;&gt;\"</a>"
            );
        });
    }

    #[test]
    fn namespaces_comments_and_pis() {
        with_doc(
            "<p:a xmlns:p='urn:p' p:x='1'><!--c--><?t d?><?e?><![CDATA[x]]>y</p:a>",
            |doc| {
                let root = doc.get_root_element().unwrap();
                assert_eq!(
                    xml_node_dump(root, 0),
                    "<p:a xmlns:p=\"urn:p\" p:x=\"1\"><!--c--><?t d?><?e?><![CDATA[x]]>y</p:a>"
                );
                let decl = root.ns_def.unwrap();
                assert_eq!(xml_node_dump(decl, 0), "xmlns:p=\"urn:p\"");
                let attr = root.properties.unwrap();
                assert_eq!(xml_node_dump(attr, 0), "p:x=\"1\"");
            },
        );
    }

    #[test]
    fn deep_trees_are_serialized_and_freed() {
        const DEPTH: usize = 30_000;
        let text = format!("{}{}", "<a>".repeat(DEPTH), "</a>".repeat(DEPTH));
        let options = XmlParserOption::XmlParseHuge as i32;
        let doc = xml_read_doc(&text, options).unwrap();
        let root = doc.get_root_element().unwrap();
        let out = xml_node_dump(root, 0);
        assert_eq!(out.len(), 7 * DEPTH - 3);
        assert!(out.ends_with("<a/></a></a>"));
        let copy = root.copy_node(true);
        assert_eq!(xml_node_dump(copy, 0), out);
        unsafe {
            xml_free_node(copy);
            xml_free_node(doc);
        }
    }

    #[test]
    fn cdata_end_marker_is_split() {
        let mut ctxt = XmlSaveCtxt::new(0);
        ctxt.cdata("a]]>b");
        assert_eq!(ctxt.into_string(), "<![CDATA[a]]]]><![CDATA[>b]]>");
    }

    #[test]
    fn documents_have_a_declaration() {
        with_doc(
            "<?xml version='1.0' standalone='yes'?><!--top--><r/>",
            |doc| {
                assert_eq!(
                    xml_node_dump(doc, 0),
                    "<?xml version=\"1.0\" standalone=\"yes\"?>\n<!--top-->\n<r/>\n"
                );
                assert_eq!(
                    xml_node_dump(doc, XmlSaveOption::XmlSaveNoDecl as i32),
                    "<!--top-->\n<r/>\n"
                );
            },
        );
    }

    #[test]
    fn memory_dump_uses_declared_encoding() {
        with_doc(
            "<?xml version='1.0' encoding='ISO-8859-1'?><r>\u{e9}\u{3042}</r>",
            |doc| {
                let bytes = xml_doc_dump_memory(doc, 0);
                assert!(bytes.ends_with(b"<r>\xE9&#12354;</r>\n"));
            },
        );
        with_doc("<?xml version='1.0' encoding='x-unknown'?><r/>", |doc| {
            let bytes = xml_doc_dump_memory(doc, 0);
            assert!(bytes.starts_with(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        });
    }
}
