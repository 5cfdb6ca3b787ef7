use std::fs::read;

use ddxml::{DDXML_DEFAULT_PARSE_OPTIONS, DocumentRef, NodeRef, XmlNodeKind, XmlNodeOptions};
use glob::glob;

const FIXTURES: &str = "tests/fixtures/*.xml";

/// Kind, name and text of every node in document order, attributes and
/// namespaces right after their element.
fn shape(doc: &DocumentRef) -> Vec<(XmlNodeKind, Option<String>, String)> {
    let mut out = vec![];
    let mut cur = Some(NodeRef::clone(doc));
    while let Some(node) = cur {
        let text = match node.kind() {
            XmlNodeKind::Element | XmlNodeKind::Document | XmlNodeKind::DTD => String::new(),
            _ => node.string_value(),
        };
        out.push((node.kind(), node.name(), text));
        if let Some(elem) = node.as_element() {
            for prop in elem.namespaces().into_iter().chain(elem.attributes()) {
                out.push((prop.kind(), prop.name(), prop.string_value()));
            }
        }
        cur = node.next_node();
    }
    out
}

fn parse(data: &[u8]) -> DocumentRef {
    DocumentRef::parse_bytes(data, DDXML_DEFAULT_PARSE_OPTIONS).unwrap()
}

fn fixtures() -> Vec<(String, Vec<u8>)> {
    let out = glob(FIXTURES)
        .unwrap()
        .map(|path| {
            let path = path.unwrap();
            let data = read(&path).unwrap();
            (path.display().to_string(), data)
        })
        .collect::<Vec<_>>();
    assert!(!out.is_empty(), "no fixture matches {FIXTURES}");
    out
}

#[test]
fn reparsing_gives_the_same_tree() {
    for (path, data) in fixtures() {
        let doc = parse(&data);
        let again = parse(&doc.xml_data());
        assert_eq!(shape(&doc), shape(&again), "{path}");
    }
}

#[test]
fn serialization_is_idempotent() {
    for options in [
        XmlNodeOptions::NONE,
        XmlNodeOptions::PRETTY_PRINT,
        XmlNodeOptions::PRETTY_PRINT | XmlNodeOptions::EXPAND_EMPTY_ELEMENT,
    ] {
        for (path, data) in fixtures() {
            let first = parse(&data).xml_data_with_options(options);
            let second = parse(&first).xml_data_with_options(options);
            assert_eq!(
                String::from_utf8_lossy(&first),
                String::from_utf8_lossy(&second),
                "{path} with {options:?}"
            );
        }
    }
}

#[test]
fn detached_subtrees_serialize_like_in_place() {
    for (path, data) in fixtures() {
        let doc = parse(&data);
        let root = doc.root_element().unwrap();
        let in_place = root
            .children()
            .iter()
            .map(|child| child.xml_string())
            .collect::<Vec<_>>();
        let children = root.children();
        for child in &children {
            child.detach();
        }
        drop(root);
        drop(doc);
        let detached = children
            .iter()
            .map(|child| {
                assert!(child.is_owner(), "{path}");
                child.xml_string()
            })
            .collect::<Vec<_>>();
        // namespaces used by a subtree are declared on it after detaching
        for (before, after) in in_place.iter().zip(&detached) {
            if before != after {
                assert!(after.contains("xmlns"), "{path}: {before} / {after}");
            }
        }
    }
}

#[test]
fn pretty_print_layout() {
    let doc = parse(b"<r><a x='1'><b/><c>t</c></a><d/></r>");
    let root = doc.root_element().unwrap();
    assert_eq!(
        root.pretty_xml_string(),
        "<r>\n  <a x=\"1\">\n    <b/>\n    <c>t</c>\n  </a>\n  <d/>\n</r>\n"
    );
    assert_eq!(
        root.xml_string_with_options(XmlNodeOptions::EXPAND_EMPTY_ELEMENT),
        "<r><a x=\"1\"><b></b><c>t</c></a><d></d></r>"
    );
    assert_eq!(
        String::from_utf8(doc.xml_data_with_options(XmlNodeOptions::PRETTY_PRINT)).unwrap(),
        "<?xml version=\"1.0\"?>\n<r>\n  <a x=\"1\">\n    <b/>\n    <c>t</c>\n  </a>\n  <d/>\n</r>\n"
    );
}

#[test]
fn escaping() {
    let elem = NodeRef::element_with_string_value("e", "a < b & c > d");
    elem.add_attribute_with_name("v", "\"q\"\t<&>");
    assert_eq!(
        elem.xml_string(),
        "<e v=\"&quot;q&quot;&#9;&lt;&amp;&gt;\">a &lt; b &amp; c &gt; d</e>"
    );
    let doc = parse(elem.xml_string().as_bytes());
    let root = doc.root_element().unwrap();
    assert_eq!(root.string_value(), "a < b & c > d");
    assert_eq!(root.attribute_for_name("v").unwrap().string_value(), "\"q\"\t<&>");
}
