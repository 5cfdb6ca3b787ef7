use std::collections::HashMap;

use ddxml::{
    DDXML_DEFAULT_PARSE_OPTIONS, DocumentRef, NodeRef, XPathValue, XmlNodeError, XmlNodeKind,
    XmlNodeOptions, globals::take_captured_errors,
};

fn parse(text: &str) -> DocumentRef {
    DocumentRef::parse_str(text, DDXML_DEFAULT_PARSE_OPTIONS).unwrap()
}

fn mappings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|&(prefix, uri)| (prefix.to_owned(), uri.to_owned()))
        .collect()
}

#[test]
fn minimal_parse() {
    let doc = parse("<root/>");
    let root = doc.root_element().unwrap();
    assert_eq!(root.name().as_deref(), Some("root"));
    assert_eq!(root.child_count(), 0);
    assert!(doc.xml_string_with_options(XmlNodeOptions::NONE).contains("<root/>"));
}

#[test]
fn attribute_dictionary() {
    let doc = parse("<a x='1' y='2'/>");
    let attrs = doc.root_element().unwrap().attributes_as_dictionary();
    let expected = HashMap::from([
        ("x".to_owned(), "1".to_owned()),
        ("y".to_owned(), "2".to_owned()),
    ]);
    assert_eq!(attrs, expected);
}

#[test]
fn namespace_resolution() {
    let doc = parse("<r xmlns='urn:x'><c/></r>");
    let found = doc
        .nodes_for_xpath_with_namespaces("//n:c", &mappings(&[("n", "urn:x")]))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].local_name().as_deref(), Some("c"));
    assert!(doc.nodes_for_xpath_with_namespaces("//c", &mappings(&[])).unwrap().is_empty());
    // an empty prefix binds unprefixed name tests
    let found = doc
        .nodes_for_xpath_with_namespaces("//c", &mappings(&[("", "urn:x")]))
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn declared_prefixes_are_usable_in_xpath() {
    let doc = parse("<r xmlns:p='urn:p'><p:c/><p:c/></r>");
    assert_eq!(doc.nodes_for_xpath("//p:c").unwrap().len(), 2);
    // explicit mappings win
    let other = mappings(&[("p", "urn:other")]);
    assert!(doc.nodes_for_xpath_with_namespaces("//p:c", &other).unwrap().is_empty());
}

#[test]
fn pretty_versus_compact() {
    let doc = parse("<a><b/></a>");
    let root = doc.root_element().unwrap();
    let pretty = root.xml_string_with_options(XmlNodeOptions::PRETTY_PRINT);
    assert_eq!(pretty, "<a>\n  <b/>\n</a>\n");
    assert!(pretty.lines().count() > 1);
    assert_eq!(
        root.xml_string_with_options(XmlNodeOptions::EXPAND_EMPTY_ELEMENT),
        "<a><b></b></a>"
    );
    assert_eq!(root.compact_xml_string(), "<a><b/></a>");
}

#[test]
fn detach_and_reuse_releasing_the_document_first() {
    let doc = parse("<r><a/><b/></r>");
    let a = doc.root_element().unwrap().child_at_index(0).unwrap();
    a.detach();
    assert_eq!(doc.root_element().unwrap().xml_string(), "<r><b/></r>");
    drop(doc);
    assert_eq!(a.xml_string(), "<a/>");
}

#[test]
fn detach_and_reuse_releasing_the_detached_node_first() {
    let doc = parse("<r><a/><b/></r>");
    let a = doc.root_element().unwrap().child_at_index(0).unwrap();
    a.detach();
    assert_eq!(a.xml_string(), "<a/>");
    drop(a);
    assert_eq!(doc.root_element().unwrap().xml_string(), "<r><b/></r>");
}

#[test]
fn qname_split() {
    assert_eq!(NodeRef::local_name_for_name("ns:elt"), "elt");
    assert_eq!(NodeRef::prefix_for_name("ns:elt"), "ns");
    assert_eq!(NodeRef::local_name_for_name("x"), "x");
    assert_eq!(NodeRef::prefix_for_name("x"), "");
}

#[test]
fn index_and_parent_agree() {
    let doc = parse("<r a='1' b='2'><x/>text<!--c--><y><z/></y><?p d?></r>");
    let mut cur = doc.next_node();
    while let Some(node) = cur {
        let parent = node.parent().unwrap();
        assert_eq!(parent.child_at_index(node.index()).unwrap(), node);
        cur = node.next_node();
    }
}

#[test]
fn kinds_do_not_change() {
    let doc = parse("<r><a>t</a></r>");
    let a = doc.root_element().unwrap().child_at_index(0).unwrap();
    let t = a.child_at_index(0).unwrap();
    assert_eq!(t.kind(), XmlNodeKind::Text);
    a.set_name("b");
    a.detach();
    t.set_string_value("u");
    assert_eq!(a.kind(), XmlNodeKind::Element);
    assert_eq!(t.kind(), XmlNodeKind::Text);
    assert_eq!(doc.kind(), XmlNodeKind::Document);
}

#[test]
fn xpath_is_deterministic() {
    let doc = parse("<r><a><b/></a><b/><a><b/><b/></a></r>");
    let first = doc.nodes_for_xpath("//b | //a").unwrap();
    let paths = first.iter().map(|n| n.xpath()).collect::<Vec<_>>();
    assert_eq!(
        paths,
        ["/r/a[1]", "/r/a[1]/b", "/r/b", "/r/a[2]", "/r/a[2]/b[1]", "/r/a[2]/b[2]"]
    );
    for _ in 0..3 {
        assert_eq!(doc.nodes_for_xpath("//b | //a").unwrap(), first);
    }
}

#[test]
fn xpath_relative_to_the_handle() {
    let doc = parse("<r><a><b n='1'/></a><a><b n='2'/></a></r>");
    let second = doc.root_element().unwrap().child_at_index(1).unwrap();
    let found = second.nodes_for_xpath("b/@n").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind(), XmlNodeKind::Attribute);
    assert_eq!(found[0].string_value(), "2");
    assert_eq!(second.nodes_for_xpath("//b").unwrap().len(), 2);
}

#[test]
fn xpath_errors() {
    let doc = parse("<r/>");
    assert!(matches!(
        doc.nodes_for_xpath("//["),
        Err(XmlNodeError::XPathSyntax { .. })
    ));
    assert!(matches!(
        doc.nodes_for_xpath("//q:r"),
        Err(XmlNodeError::XPathEval { .. })
    ));
    assert!(matches!(
        doc.nodes_for_xpath("count(//r)"),
        Err(XmlNodeError::EvalKindMismatch { found: "number", .. })
    ));
    let nested = format!("{}/r{}", "(".repeat(50_000), ")".repeat(50_000));
    assert!(matches!(
        doc.nodes_for_xpath(&nested),
        Err(XmlNodeError::XPathSyntax { .. })
    ));
    let value = doc.objects_for_xpath("count(//r)", &HashMap::new()).unwrap();
    assert_eq!(value, XPathValue::Number(1.0));
    let value = doc.objects_for_xpath("name(/*)", &HashMap::new()).unwrap();
    assert_eq!(value, XPathValue::String("r".to_owned()));
}

#[test]
fn xml_namespace_is_in_scope_everywhere() {
    let doc = parse("<r><a/><b/></r>");
    let count = doc.objects_for_xpath("count(//namespace::*)", &HashMap::new());
    assert_eq!(count.unwrap(), XPathValue::Number(3.0));
    let xml = doc.nodes_for_xpath("/r/a/namespace::xml").unwrap();
    assert_eq!(xml.len(), 1);
    assert_eq!(xml[0].kind(), XmlNodeKind::Namespace);
    assert_eq!(xml[0].string_value(), "http://www.w3.org/XML/1998/namespace");
    assert_eq!(xml[0].parent().unwrap().name().as_deref(), Some("a"));
    assert_eq!(doc.root_element().unwrap().xml_string(), "<r><a/><b/></r>");
    let big = doc.objects_for_xpath("string(12345678901234567890)", &HashMap::new());
    assert_eq!(big.unwrap(), XPathValue::String("12345678901234567000".to_owned()));
}

#[test]
fn captured_diagnostics() {
    NodeRef::install_error_handlers();
    NodeRef::install_error_handlers();
    take_captured_errors();
    let doc = parse("<r><a></r>");
    assert_eq!(doc.root_element().unwrap().name().as_deref(), Some("r"));
    assert!(!take_captured_errors().is_empty());
    assert!(take_captured_errors().is_empty());
}

#[test]
fn malformed_input_is_an_error() {
    let strict = ddxml::XmlParserOption::XmlParseNoError as i32;
    let err = DocumentRef::parse_str("<r><a></r>", strict).unwrap_err();
    assert!(matches!(err, XmlNodeError::Parse { line: 1, .. }));
    assert!(!err.to_string().is_empty());
}
