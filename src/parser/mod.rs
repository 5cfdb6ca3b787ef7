//! Build a tree from XML text or bytes.
//!
//! Tokenizing is done by `quick-xml`. This module turns its events into
//! tree nodes and applies what the tokenizer leaves to the XML processor:
//! namespace binding, entity substitution, attribute value normalization,
//! blank text removal and recovery from well-formedness errors.

mod dtd;
pub mod qname;

use std::{borrow::Cow, collections::HashMap};

use quick_xml::{
    events::{BytesStart, Event},
    reader::Reader,
};

use crate::{
    encoding::decode_input,
    error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
    globals::{keep_blanks_default_value, report_error},
    tree::{
        XML_XML_NAMESPACE, XmlElementType, XmlNodePtr, xml_free_node, xml_new_cdata_block,
        xml_new_comment, xml_new_decl, xml_new_doc, xml_new_dtd, xml_new_node, xml_new_ns,
        xml_new_pi, xml_new_prop, xml_new_text,
    },
};

use self::{dtd::parse_doctype, qname::split_qname2};

/// This is the set of XML parser options that can be passed down
/// to the `xml_read_*` functions.
///
/// Values are those of libxml2's `xmlParserOption`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlParserOption {
    XmlParseRecover = 1 << 0,     /* recover on errors */
    XmlParseNoEnt = 1 << 1,       /* substitute entities */
    XmlParseDTDLoad = 1 << 2,     /* load the external subset */
    XmlParseDTDAttr = 1 << 3,     /* default DTD attributes */
    XmlParseDTDValid = 1 << 4,    /* validate with the DTD */
    XmlParseNoError = 1 << 5,     /* suppress error reports */
    XmlParseNoWarning = 1 << 6,   /* suppress warning reports */
    XmlParsePedantic = 1 << 7,    /* pedantic error reporting */
    XmlParseNoBlanks = 1 << 8,    /* remove blank nodes */
    XmlParseSAX1 = 1 << 9,        /* use the SAX1 interface internally */
    XmlParseXInclude = 1 << 10,   /* Implement XInclude substitution  */
    XmlParseNoNet = 1 << 11,      /* Forbid network access */
    XmlParseNoDict = 1 << 12,     /* Do not reuse the context dictionary */
    XmlParseNsClean = 1 << 13,    /* remove redundant namespaces declarations */
    XmlParseNoCDATA = 1 << 14,    /* merge CDATA as text nodes */
    XmlParseNoXIncNode = 1 << 15, /* do not generate XINCLUDE START/END nodes */
    XmlParseCompact = 1 << 16,    /* compact small text nodes */
    XmlParseOld10 = 1 << 17,      /* parse using XML-1.0 before update 5 */
    XmlParseNoBasefix = 1 << 18,  /* do not fixup XINCLUDE xml:base uris */
    XmlParseHuge = 1 << 19,       /* relax any hardcoded limit from the parser */
    XmlParseOldSAX = 1 << 20,     /* parse using SAX2 interface before 2.7.0 */
    XmlParseIgnoreEnc = 1 << 21,  /* ignore internal document encoding hint */
    XmlParseBigLines = 1 << 22,   /* Store big lines numbers in text PSVI field */
}

/// Options used by the document handles unless told otherwise: recover from
/// minor errors, substitute internal entities, never touch the network and
/// drop blank text nodes.
pub const DDXML_DEFAULT_PARSE_OPTIONS: i32 = XmlParserOption::XmlParseRecover as i32
    | XmlParserOption::XmlParseNoEnt as i32
    | XmlParserOption::XmlParseNoNet as i32
    | XmlParserOption::XmlParseNoBlanks as i32;

/// Maximum element nesting accepted without `XmlParseHuge`.
pub const XML_PARSER_MAX_DEPTH: usize = 256;

/// Maximum nesting of entity references inside entity replacement text.
pub const XML_PARSER_MAX_ENTITY_DEPTH: usize = 40;

// Roughly the maximum ratio between the text copied out of entities and
// the input read so far.
const XML_PARSER_NON_LINEAR: u64 = 5;

// A certain amount of entity text is always allowed.
const XML_PARSER_ALLOWED_EXPANSION: u64 = 1_000_000;

// Charged for every entity reference on top of its length, so that empty or
// very short entities still count.
const XML_ENT_FIXED_COST: u64 = 20;

fn is_blank_str(s: &str) -> bool {
    s.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
}

fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

fn char_ref(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let value = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(value).filter(|&c| c != '\0')
}

/// Replace the character references of an entity literal. Entity references
/// are kept and resolved where the entity is used.
fn expand_char_refs(value: &str) -> Cow<'_, str> {
    if !value.contains("&#") {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("&#") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let resolved = tail
            .find(';')
            .and_then(|end| char_ref(&tail[1..end]).map(|c| (c, end)));
        match resolved {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn new_reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.trim_text(false);
    config.expand_empty_elements = false;
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

fn error_code_for(err: &quick_xml::Error) -> XmlParserErrors {
    use quick_xml::errors::SyntaxError;

    match err {
        quick_xml::Error::Syntax(syntax) => match syntax {
            SyntaxError::UnclosedComment => XmlParserErrors::XmlErrCommentNotFinished,
            SyntaxError::UnclosedCData => XmlParserErrors::XmlErrCDATANotFinished,
            SyntaxError::UnclosedDoctype => XmlParserErrors::XmlErrDocTypeNotFinished,
            _ => XmlParserErrors::XmlErrGtRequired,
        },
        quick_xml::Error::InvalidAttr(_) => XmlParserErrors::XmlErrAttributeNotStarted,
        quick_xml::Error::Escape(_) => XmlParserErrors::XmlErrUndeclaredEntity,
        _ => XmlParserErrors::XmlErrNotWellBalanced,
    }
}

/// The state of one parse.
pub struct XmlParserCtxt<'a> {
    input: &'a str,
    options: i32,
    recovery: bool,
    keep_blanks: bool,
    max_depth: usize,
    well_formed: bool,
    stopped: bool,
    doc: XmlNodePtr,
    node_stack: Vec<XmlNodePtr>,
    // elements below this depth were opened outside the entity being read
    floor: usize,
    space_preserve: Vec<bool>,
    entities: HashMap<String, String>,
    entity_stack: Vec<String>,
    // bytes copied out of entities, plus a fixed cost per reference
    sizeentcopy: u64,
    text: String,
    text_pos: usize,
    seen_root: bool,
    line_cache: (usize, usize),
    errors: Vec<XmlError>,
}

impl<'a> XmlParserCtxt<'a> {
    /// Create a parser context for `input`, which must already have its line
    /// ends normalized.
    pub fn new(input: &'a str, options: i32) -> Self {
        let keep_blanks = if options & XmlParserOption::XmlParseNoBlanks as i32 != 0 {
            false
        } else {
            keep_blanks_default_value()
        };
        let max_depth = if options & XmlParserOption::XmlParseHuge as i32 != 0 {
            usize::MAX
        } else {
            XML_PARSER_MAX_DEPTH
        };
        Self {
            input,
            options,
            recovery: options & XmlParserOption::XmlParseRecover as i32 != 0,
            keep_blanks,
            max_depth,
            well_formed: true,
            stopped: false,
            doc: xml_new_doc(None),
            node_stack: vec![],
            floor: 0,
            space_preserve: vec![false],
            entities: HashMap::new(),
            entity_stack: vec![],
            sizeentcopy: 0,
            text: String::new(),
            text_pos: 0,
            seen_root: false,
            line_cache: (0, 1),
            errors: vec![],
        }
    }

    /// Diagnostics raised so far, in order.
    pub fn errors(&self) -> &[XmlError] {
        &self.errors
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    fn line_at(&mut self, pos: usize) -> usize {
        let pos = pos.min(self.input.len());
        let (cached_pos, cached_line) = self.line_cache;
        let line = if pos >= cached_pos {
            cached_line
                + self.input.as_bytes()[cached_pos..pos]
                    .iter()
                    .filter(|&&b| b == b'\n')
                    .count()
        } else {
            1 + self.input.as_bytes()[..pos]
                .iter()
                .filter(|&&b| b == b'\n')
                .count()
        };
        self.line_cache = (pos, line);
        line
    }

    fn column_at(&self, pos: usize) -> usize {
        let pos = pos.min(self.input.len());
        let bytes = &self.input.as_bytes()[..pos];
        bytes.len() - bytes.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1) + 1
    }

    fn err(
        &mut self,
        domain: XmlErrorDomain,
        code: XmlParserErrors,
        level: XmlErrorLevel,
        msg: impl Into<Cow<'static, str>>,
        pos: usize,
    ) {
        let line = self.line_at(pos);
        let column = self.column_at(pos);
        let err = XmlError::new(domain, code, level, msg).at(line, column);
        if level == XmlErrorLevel::XmlErrFatal {
            self.well_formed = false;
            if !self.recovery {
                self.stopped = true;
            }
        }
        let suppressed = match level {
            XmlErrorLevel::XmlErrWarning => {
                self.options & XmlParserOption::XmlParseNoWarning as i32 != 0
            }
            _ => self.options & XmlParserOption::XmlParseNoError as i32 != 0,
        };
        if !suppressed {
            report_error(err.clone());
        }
        self.errors.push(err);
    }

    /// Handle a fatal parser error, i.e. violating Well-Formedness constraints
    #[doc(alias = "xmlFatalErrMsg")]
    fn fatal_err(&mut self, code: XmlParserErrors, msg: impl Into<Cow<'static, str>>, pos: usize) {
        self.err(
            XmlErrorDomain::XmlFromParser,
            code,
            XmlErrorLevel::XmlErrFatal,
            msg,
            pos,
        );
    }

    /// Handle a namespace error, which never stops the parser.
    #[doc(alias = "xmlNsErr")]
    fn ns_err(&mut self, code: XmlParserErrors, msg: String, pos: usize) {
        self.err(
            XmlErrorDomain::XmlFromNamespace,
            code,
            XmlErrorLevel::XmlErrError,
            msg,
            pos,
        );
    }

    fn current_node(&self) -> XmlNodePtr {
        self.node_stack.last().copied().unwrap_or(self.doc)
    }

    /// Run the parser over the whole input.
    ///
    /// Returns the document if it is well-formed, or if recovery was asked
    /// for and a root element was found. The first fatal error is returned
    /// otherwise.
    pub fn parse(mut self) -> Result<XmlNodePtr, XmlError> {
        let mut reader = new_reader(self.input);
        self.consume(&mut reader, None);
        self.flush_text(false);
        self.finish()
    }

    /// Build nodes from the events of `reader` until its input ends.
    ///
    /// `at` is set while reading entity replacement text and is the position
    /// of the reference, where all diagnostics are located.
    fn consume(&mut self, reader: &mut Reader<&[u8]>, at: Option<usize>) {
        while !self.stopped {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    let pos = at.unwrap_or_else(|| {
                        usize::try_from(reader.error_position()).unwrap_or(usize::MAX)
                    });
                    self.flush_text(false);
                    self.fatal_err(error_code_for(&err), err.to_string(), pos);
                    // the tokenizer cannot be trusted to resume
                    break;
                }
            };
            let pos = at.unwrap_or_else(|| {
                usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
            });
            match event {
                Event::Text(e) => {
                    let text = e.decode().unwrap_or_default();
                    self.characters(&text, pos);
                }
                Event::GeneralRef(e) => {
                    let name = e.decode().unwrap_or_default();
                    self.reference(&name, pos);
                }
                Event::CData(e) => {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    if self.options & XmlParserOption::XmlParseNoCDATA as i32 != 0 {
                        self.characters(&text, pos);
                    } else {
                        self.flush_text(false);
                        self.add_leaf(xml_new_cdata_block(&text), pos);
                    }
                }
                Event::Start(e) => {
                    self.flush_text(false);
                    self.start_element(reader, &e, pos, false);
                }
                Event::Empty(e) => {
                    self.flush_text(false);
                    self.start_element(reader, &e, pos, true);
                }
                Event::End(e) => {
                    self.flush_text(true);
                    let qname = e.name();
                    let name = reader.decoder().decode(qname.as_ref()).unwrap_or_default();
                    self.end_element(&name, pos);
                }
                Event::Comment(e) => {
                    self.flush_text(false);
                    let text = e.decode().unwrap_or_default();
                    self.add_leaf(xml_new_comment(&text), pos);
                }
                Event::PI(e) => {
                    self.flush_text(false);
                    let target = reader.decoder().decode(e.target()).unwrap_or_default();
                    let content = reader.decoder().decode(e.content()).unwrap_or_default();
                    let content = content.trim_start();
                    let content = (!content.is_empty()).then_some(content);
                    self.add_leaf(xml_new_pi(&target, content), pos);
                }
                // a text declaration may open an entity
                Event::Decl(_) if at.is_some() => {}
                Event::Decl(e) => self.xml_decl(&e, pos),
                Event::DocType(_) if at.is_some() => {
                    self.fatal_err(
                        XmlParserErrors::XmlErrNotWellBalanced,
                        "Document type declaration in entity content",
                        pos,
                    );
                }
                Event::DocType(e) => {
                    let content = e.decode().unwrap_or_default();
                    self.doctype(&content, pos);
                }
                Event::Eof => break,
            }
        }
    }

    fn finish(mut self) -> Result<XmlNodePtr, XmlError> {
        let end = self.input.len();
        if !self.stopped {
            while let Some(node) = self.node_stack.pop() {
                let line = node.line;
                let name = node.qualified_name().unwrap_or_default().into_owned();
                self.fatal_err(
                    XmlParserErrors::XmlErrTagNotFinished,
                    format!("Premature end of data in tag {name} line {line}"),
                    end,
                );
            }
        }
        if !self.seen_root && self.well_formed {
            self.fatal_err(
                XmlParserErrors::XmlErrDocumentEmpty,
                "Document is empty",
                end,
            );
        }
        let first_fatal = self.errors.iter().find(|e| e.is_fatal()).cloned();
        match first_fatal {
            Some(err) if !self.recovery || !self.seen_root => {
                log::debug!("parse failed: {err}");
                // # Safety
                // The document was built by this context and never shared.
                unsafe { xml_free_node(self.doc) };
                Err(err)
            }
            _ => Ok(self.doc),
        }
    }

    fn characters(&mut self, text: &str, pos: usize) {
        if self.text.is_empty() {
            self.text_pos = pos.saturating_sub(text.len());
        }
        self.text.push_str(text);
    }

    /// Resolve a reference found in character data.
    fn reference(&mut self, name: &str, pos: usize) {
        if name.starts_with('#') {
            match char_ref(name) {
                Some(c) => {
                    let mut buf = [0; 4];
                    self.characters(c.encode_utf8(&mut buf), pos);
                }
                None => self.fatal_err(
                    XmlParserErrors::XmlErrInvalidCharRef,
                    format!("xmlParseCharRef: invalid xmlChar value {}", &name[1..]),
                    pos,
                ),
            }
        } else if let Some(value) = predefined_entity(name) {
            self.characters(value, pos);
        } else if let Some(value) = self.entities.get(name).cloned() {
            self.entity_content(name, &value, pos);
        } else {
            self.fatal_err(
                XmlParserErrors::XmlErrUndeclaredEntity,
                format!("Entity '{name}' not defined"),
                pos,
            );
        }
    }

    /// Account for `extra` bytes copied out of an entity.
    ///
    /// Once the copied text outgrows the input read so far by too much, a
    /// fatal error is raised, the parser halts and false is returned.
    #[doc(alias = "xmlParserEntityCheck")]
    fn entity_check(&mut self, extra: usize, pos: usize) -> bool {
        self.sizeentcopy = self
            .sizeentcopy
            .saturating_add(extra as u64)
            .saturating_add(XML_ENT_FIXED_COST);
        if self.options & XmlParserOption::XmlParseHuge as i32 != 0 {
            return true;
        }
        let consumed = pos as u64;
        if self.sizeentcopy > XML_PARSER_ALLOWED_EXPANSION
            && (self.sizeentcopy == u64::MAX
                || self.sizeentcopy / XML_PARSER_NON_LINEAR > consumed)
        {
            self.fatal_err(
                XmlParserErrors::XmlErrEntityLoop,
                "Maximum entity amplification factor exceeded",
                pos,
            );
            self.stopped = true;
            return false;
        }
        true
    }

    /// Push `name` on the stack of entities being expanded, unless that
    /// would loop or nest too deep.
    fn enter_entity(&mut self, name: &str, pos: usize) -> bool {
        let msg = if self.entity_stack.iter().any(|n| n == name) {
            format!("Detected an entity reference loop in '{name}'")
        } else if self.entity_stack.len() >= XML_PARSER_MAX_ENTITY_DEPTH {
            format!("Maximum entity nesting depth exceeded in '{name}'")
        } else {
            self.entity_stack.push(name.to_owned());
            return true;
        };
        self.fatal_err(XmlParserErrors::XmlErrEntityLoop, msg, pos);
        self.stopped = true;
        false
    }

    /// Include the replacement text of a declared entity in content.
    ///
    /// Text holding markup or references is parsed under the current
    /// element and must be balanced.
    fn entity_content(&mut self, name: &str, value: &str, pos: usize) {
        if !self.entity_check(value.len(), pos) {
            return;
        }
        if !value.contains(['<', '&']) {
            self.characters(value, pos);
            return;
        }
        if !self.enter_entity(name, pos) {
            return;
        }
        let floor = std::mem::replace(&mut self.floor, self.node_stack.len());
        let mut reader = new_reader(value);
        self.consume(&mut reader, Some(pos));
        if !self.stopped && self.node_stack.len() > self.floor {
            self.flush_text(false);
            self.fatal_err(
                XmlParserErrors::XmlErrNotWellBalanced,
                format!("Entity '{name}' is not well balanced"),
                pos,
            );
            self.node_stack.truncate(self.floor);
            self.space_preserve.truncate(self.floor + 1);
        }
        self.floor = floor;
        self.entity_stack.pop();
    }

    /// Turn the pending character data into a text node.
    ///
    /// `closing` tells whether the next event ends the current element.
    fn flush_text(&mut self, closing: bool) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let pos = self.text_pos;
        let blank = is_blank_str(&text);
        let Some(&parent) = self.node_stack.last() else {
            if !blank {
                let (code, msg) = if self.seen_root {
                    (
                        XmlParserErrors::XmlErrDocumentEnd,
                        "Extra content at the end of the document",
                    )
                } else {
                    (
                        XmlParserErrors::XmlErrDocumentStart,
                        "Start tag expected, '<' not found",
                    )
                };
                self.fatal_err(code, msg, pos);
            }
            return;
        };
        let preserve = self.space_preserve.last().copied().unwrap_or(false);
        if blank && !self.keep_blanks && !preserve {
            // blanks are only kept as the sole content of an element or next
            // to other text
            let sole = closing && parent.children.is_none();
            let mixed = parent.last.is_some_and(|last| last.is_text_node());
            if !sole && !mixed {
                return;
            }
        }
        let mut node = xml_new_text(&text);
        node.line = self.line_at(pos);
        parent.add_child(node);
    }

    fn add_leaf(&mut self, mut node: XmlNodePtr, pos: usize) {
        node.line = self.line_at(pos);
        let parent = self.current_node();
        parent.add_child(node);
    }

    /// Normalize an attribute value and replace its references.
    #[doc(alias = "xmlParseAttValue")]
    fn attribute_value(&mut self, raw: &str, pos: usize) -> String {
        let raw = raw.replace(['\t', '\n'], " ");
        let mut out = String::with_capacity(raw.len());
        self.expand_attribute_text(&raw, pos, &mut out);
        out
    }

    fn expand_attribute_text(&mut self, text: &str, pos: usize, out: &mut String) {
        let mut rest = text;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let Some(semi) = after.find(';') else {
                self.fatal_err(
                    XmlParserErrors::XmlErrEntityRefSemicolMissing,
                    "EntityRef: expecting ';'",
                    pos,
                );
                out.push('&');
                rest = after;
                continue;
            };
            let name = &after[..semi];
            rest = &after[semi + 1..];
            if name.starts_with('#') {
                match char_ref(name) {
                    Some(c) => out.push(c),
                    None => self.fatal_err(
                        XmlParserErrors::XmlErrInvalidCharRef,
                        format!("xmlParseCharRef: invalid xmlChar value {}", &name[1..]),
                        pos,
                    ),
                }
            } else if let Some(value) = predefined_entity(name) {
                out.push_str(value);
            } else if let Some(value) = self.entities.get(name).cloned() {
                if !self.entity_check(value.len(), pos) {
                    return;
                }
                if value.contains('<') {
                    self.fatal_err(
                        XmlParserErrors::XmlErrLtInAttribute,
                        format!("'<' in entity '{name}' is not allowed in attributes values"),
                        pos,
                    );
                } else if self.enter_entity(name, pos) {
                    let value = value.replace(['\t', '\n'], " ");
                    self.expand_attribute_text(&value, pos, out);
                    self.entity_stack.pop();
                }
            } else {
                self.fatal_err(
                    XmlParserErrors::XmlErrUndeclaredEntity,
                    format!("Entity '{name}' not defined"),
                    pos,
                );
            }
            if self.stopped {
                return;
            }
        }
        out.push_str(rest);
    }

    #[doc(alias = "xmlParseStartTag2")]
    fn start_element(&mut self, reader: &Reader<&[u8]>, e: &BytesStart, pos: usize, empty: bool) {
        let qname = reader
            .decoder()
            .decode(e.name().as_ref())
            .unwrap_or_default()
            .into_owned();
        if self.node_stack.len() >= self.max_depth {
            self.fatal_err(
                XmlParserErrors::XmlErrInternalError,
                format!(
                    "Excessive depth in document: {} use XML_PARSE_HUGE option",
                    self.max_depth
                ),
                pos,
            );
            self.stopped = true;
            return;
        }
        let parent = self.current_node();
        if parent == self.doc && self.seen_root {
            self.fatal_err(
                XmlParserErrors::XmlErrDocumentEnd,
                "Extra content at the end of the document",
                pos,
            );
            if self.stopped {
                return;
            }
        }

        let mut attrs = vec![];
        for attr in e.attributes() {
            match attr {
                Ok(attr) => {
                    let key = reader
                        .decoder()
                        .decode(attr.key.as_ref())
                        .unwrap_or_default()
                        .into_owned();
                    let raw = reader.decoder().decode(&attr.value).unwrap_or_default().into_owned();
                    let value = self.attribute_value(&raw, pos);
                    attrs.push((key, value));
                }
                Err(err) => {
                    let code = match err {
                        quick_xml::events::attributes::AttrError::Duplicated(_, _) => {
                            XmlParserErrors::XmlErrAttributeRedefined
                        }
                        _ => XmlParserErrors::XmlErrAttributeNotStarted,
                    };
                    self.fatal_err(code, format!("{err} in element {qname}"), pos);
                    if self.stopped {
                        return;
                    }
                    break;
                }
            }
        }

        let mut elem = xml_new_node(None, &qname);
        elem.line = self.line_at(pos);
        parent.add_child(elem);
        if parent == self.doc {
            self.seen_root = true;
        }

        for (key, value) in &attrs {
            if key == "xmlns" {
                elem.add_ns_def(xml_new_ns(None, value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    self.ns_err(
                        XmlParserErrors::XmlNsErrQname,
                        format!("xmlns:{prefix}: Empty XML namespace is not allowed"),
                        pos,
                    );
                } else {
                    elem.add_ns_def(xml_new_ns(Some(prefix), value));
                }
            }
        }

        match split_qname2(&qname) {
            Some((prefix, local)) => match elem.search_ns(Some(prefix)) {
                Some(ns) => {
                    elem.ns = Some(ns);
                    elem.name = Some(local.to_owned());
                }
                None => self.ns_err(
                    XmlParserErrors::XmlNsErrUndefinedNamespace,
                    format!("Namespace prefix {prefix} on {local} is not defined"),
                    pos,
                ),
            },
            None => elem.ns = elem.search_ns(None),
        }

        for (key, value) in attrs {
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let prop = match split_qname2(&key) {
                Some((prefix, local)) => match elem.search_ns(Some(prefix)) {
                    Some(ns) => xml_new_prop(Some(ns), local, &value),
                    None => {
                        self.ns_err(
                            XmlParserErrors::XmlNsErrUndefinedNamespace,
                            format!("Namespace prefix {prefix} for {local} on {qname} is not defined"),
                            pos,
                        );
                        xml_new_prop(None, &key, &value)
                    }
                },
                None => xml_new_prop(None, &key, &value),
            };
            elem.add_prop(prop);
        }

        let inherited = self.space_preserve.last().copied().unwrap_or(false);
        let preserve = match elem.has_ns_prop("space", Some(XML_XML_NAMESPACE)) {
            Some(attr) => match attr.content.as_deref() {
                Some("preserve") => true,
                Some("default") => false,
                _ => inherited,
            },
            None => inherited,
        };
        if !empty {
            self.node_stack.push(elem);
            self.space_preserve.push(preserve);
        }
    }

    #[doc(alias = "xmlParseEndTag2")]
    fn end_element(&mut self, name: &str, pos: usize) {
        let matches = |node: &XmlNodePtr| node.qualified_name().is_some_and(|q| q == name);
        let open = &self.node_stack[self.floor..];
        let Some(depth) = open.iter().rposition(matches).map(|d| d + self.floor) else {
            let msg = if open.is_empty() {
                format!("Unexpected end tag : {name}")
            } else {
                let top = self.node_stack.last().map_or(String::new(), |n| {
                    format!(
                        "{} line {}",
                        n.qualified_name().unwrap_or_default(),
                        n.line
                    )
                });
                format!("Opening and ending tag mismatch: {top} and {name}")
            };
            self.fatal_err(XmlParserErrors::XmlErrTagNameMismatch, msg, pos);
            return;
        };
        while self.node_stack.len() > depth + 1 {
            let Some(unclosed) = self.node_stack.pop() else {
                break;
            };
            self.space_preserve.pop();
            let msg = format!(
                "Opening and ending tag mismatch: {} line {} and {name}",
                unclosed.qualified_name().unwrap_or_default(),
                unclosed.line
            );
            self.fatal_err(XmlParserErrors::XmlErrTagNameMismatch, msg, pos);
            if self.stopped {
                return;
            }
        }
        self.node_stack.pop();
        self.space_preserve.pop();
    }

    #[doc(alias = "xmlParseXMLDecl")]
    fn xml_decl(&mut self, e: &quick_xml::events::BytesDecl, pos: usize) {
        let mut doc = self.doc;
        match e.version() {
            Ok(version) => doc.version = Some(String::from_utf8_lossy(&version).into_owned()),
            Err(_) => {
                self.fatal_err(
                    XmlParserErrors::XmlErrVersionMissing,
                    "Malformed declaration expecting version",
                    pos,
                );
                return;
            }
        }
        if let Some(Ok(encoding)) = e.encoding() {
            doc.encoding = Some(String::from_utf8_lossy(&encoding).into_owned());
        }
        if let Some(Ok(standalone)) = e.standalone() {
            doc.standalone = Some(standalone.as_ref() == b"yes");
        }
    }

    #[doc(alias = "xmlParseDocTypeDecl")]
    fn doctype(&mut self, content: &str, pos: usize) {
        let decl = parse_doctype(content);
        let mut dtd = xml_new_dtd(&decl.name, content.trim());
        dtd.line = self.line_at(pos);
        for markup in decl.decls {
            if markup.typ == XmlElementType::XmlEntityDecl {
                if let Some(value) = markup.entity_value.as_deref() {
                    let value = expand_char_refs(value).into_owned();
                    self.entities.entry(markup.name.clone()).or_insert(value);
                }
            }
            dtd.add_child(xml_new_decl(markup.typ, &markup.name, &markup.source));
        }
        self.doc.add_child(dtd);
    }
}

/// Normalize line ends as required by XML 1.0 section 2.11.
fn normalize_line_ends(text: &str) -> Cow<'_, str> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Parse an XML document held in a string.
///
/// The returned document must be released with [`xml_free_node`].
#[doc(alias = "xmlReadDoc")]
pub fn xml_read_doc(cur: &str, options: i32) -> Result<XmlNodePtr, XmlError> {
    log::debug!("parsing {} bytes of text, options {options:#x}", cur.len());
    let input = normalize_line_ends(cur);
    XmlParserCtxt::new(&input, options).parse()
}

/// Parse an XML document held in memory.
///
/// `encoding` overrides the encoding declaration. With `XmlParseIgnoreEnc`
/// the input is taken as UTF-8 whatever it declares.
#[doc(alias = "xmlReadMemory")]
pub fn xml_read_memory(
    buffer: &[u8],
    encoding: Option<&str>,
    options: i32,
) -> Result<XmlNodePtr, XmlError> {
    log::debug!("parsing {} bytes, options {options:#x}", buffer.len());
    let encoding = if options & XmlParserOption::XmlParseIgnoreEnc as i32 != 0 {
        Some("UTF-8")
    } else {
        encoding
    };
    let text = decode_input(buffer, encoding).inspect_err(|err| report_error(err.clone()))?;
    xml_read_doc(&text, options)
}
