//! Lifetime of trees shared by several handles.
//!
//! Nothing here can observe a freed tree directly, so every test reads the
//! nodes it still holds after the other handles are gone.

use ddxml::{DDXML_DEFAULT_PARSE_OPTIONS, DocumentRef, ElementRef, NodeRef, XmlNodeKind};

const DOC: &str = "<library><shelf n='1'><book>A</book><book>B</book></shelf>\
                   <shelf n='2'><book>C</book></shelf></library>";

fn parse(text: &str) -> DocumentRef {
    DocumentRef::parse_str(text, DDXML_DEFAULT_PARSE_OPTIONS).unwrap()
}

fn shelves(doc: &DocumentRef) -> Vec<ElementRef> {
    doc.root_element().unwrap().elements_for_name("shelf")
}

#[test]
fn interior_handle_outlives_the_document_handle() {
    let doc = parse(DOC);
    let book = shelves(&doc)[1].element_for_name("book").unwrap();
    drop(doc);
    assert_eq!(book.string_value(), "C");
    assert_eq!(book.xpath(), "/library/shelf[2]/book");
    let doc = book.root_document().unwrap();
    assert_eq!(doc.root_element().unwrap().child_count(), 2);
}

#[test]
fn handles_dropped_in_any_order() {
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
    for order in orders {
        let doc = parse(DOC);
        let root = doc.root_element().unwrap();
        let shelf = root.child_at_index(0).unwrap();
        let attr = shelf.as_element().unwrap().attribute_for_name("n").unwrap();
        let mut handles = vec![
            Some(NodeRef::from(doc)),
            Some(NodeRef::from(root)),
            Some(shelf),
            Some(attr),
        ];
        for (step, &i) in order.iter().enumerate() {
            handles[i] = None;
            for survivor in handles.iter().flatten() {
                assert_eq!(survivor.owner().kind(), XmlNodeKind::Document, "{order:?} {step}");
                assert!(!survivor.xml_string().is_empty());
            }
        }
    }
}

#[test]
fn detach_then_drop_the_detached_handle_first() {
    let doc = parse(DOC);
    let shelf = shelves(&doc).remove(0);
    let book = shelf.element_for_name("book").unwrap();
    shelf.detach();
    assert!(shelf.is_owner());
    assert_eq!(book.owner(), *shelf);
    drop(shelf);
    // the book keeps the detached shelf alive
    assert_eq!(book.parent().unwrap().name().as_deref(), Some("shelf"));
    assert_eq!(book.level(), 1);
    assert!(book.root_document().is_none());
    assert_eq!(
        doc.root_element().unwrap().xml_string(),
        "<library><shelf n=\"2\"><book>C</book></shelf></library>"
    );
}

#[test]
fn detach_then_drop_the_document_first() {
    let doc = parse(DOC);
    let shelf = shelves(&doc).remove(0);
    shelf.detach();
    drop(doc);
    assert_eq!(
        shelf.xml_string(),
        "<shelf n=\"1\"><book>A</book><book>B</book></shelf>"
    );
    assert_eq!(shelf.level(), 0);
    assert_eq!(shelf.index(), 0);
}

#[test]
fn detached_node_without_handles_is_released_at_once() {
    let doc = parse(DOC);
    let root = doc.root_element().unwrap();
    root.child_at_index(0).unwrap().detach();
    assert_eq!(root.child_count(), 1);
    assert_eq!(root.child_at_index(0).unwrap().index(), 0);
}

#[test]
fn detach_is_idempotent_on_owners() {
    let elem = NodeRef::element("e");
    elem.detach();
    elem.detach();
    assert!(elem.is_owner());
    let doc = parse(DOC);
    doc.detach();
    assert!(doc.root_element().is_some());
}

#[test]
fn composition_moves_nodes_and_keeps_source_handles() {
    let doc = parse(DOC);
    let book = shelves(&doc)[0].element_for_name("book").unwrap();
    let text = NodeRef::text("loose");
    let attr = NodeRef::attribute("kind", "pile");
    assert!(text.is_owner() && attr.is_owner());

    let pile =
        NodeRef::element_with_children("pile", &[(*book).clone(), text.clone()], &[attr.clone()])
            .unwrap();
    assert!(!book.is_owner() && !text.is_owner() && !attr.is_owner());
    assert_eq!(book.owner(), *pile);
    assert_eq!(attr.parent().unwrap(), *pile);
    assert_eq!(
        pile.xml_string(),
        "<pile kind=\"pile\"><book>A</book>loose</pile>"
    );
    assert_eq!(
        shelves(&doc)[0].xml_string(),
        "<shelf n=\"1\"><book>B</book></shelf>"
    );

    drop(pile);
    drop(doc);
    assert_eq!(book.next_sibling().unwrap(), text);
    assert_eq!(attr.string_value(), "pile");
}

#[test]
fn replaced_children_stay_alive_through_their_handles() {
    let doc = parse(DOC);
    let shelf = shelves(&doc).remove(0);
    let books = shelf.elements_for_name("book");
    shelf.set_string_value("empty");
    assert_eq!(shelf.xml_string(), "<shelf n=\"1\">empty</shelf>");
    drop(shelf);
    drop(doc);
    for (book, text) in books.iter().zip(["A", "B"]) {
        assert!(book.is_owner());
        assert_eq!(book.string_value(), text);
        assert!(book.parent().is_none());
    }
}

#[test]
fn copies_are_independent_trees() {
    let doc = parse(DOC);
    let copy = doc.deep_copy();
    let copied = copy.as_document().unwrap();
    drop(doc);
    assert_eq!(copied.root_element().unwrap().child_count(), 2);
    let shelf = shelves(&copied).remove(1);
    let shelf_copy = shelf.deep_copy();
    shelf.set_string_value("");
    assert_eq!(shelf_copy.xml_string(), "<shelf n=\"2\"><book>C</book></shelf>");
}

#[test]
fn handles_compare_by_node() {
    let doc = parse(DOC);
    let a = doc.root_element().unwrap();
    let b = doc.child_at_index(0).unwrap();
    assert_eq!(*a, b);
    let set = [NodeRef::clone(&a), b, NodeRef::clone(&doc)]
        .into_iter()
        .collect::<std::collections::HashSet<_>>();
    assert_eq!(set.len(), 2);
}

#[test]
fn deeply_nested_trees_are_built_serialized_and_released() {
    const DEPTH: usize = 30_000;
    let mut elem = NodeRef::element("leaf");
    for _ in 0..DEPTH {
        elem = NodeRef::element_with_children("n", &[(*elem).clone()], &[])
            .unwrap();
    }
    let out = elem.xml_string();
    assert!(out.starts_with("<n><n>"));
    assert!(out.contains("<leaf/>"));
    assert_eq!(out.matches("</n>").count(), DEPTH);
    let copy = elem.deep_copy();
    drop(elem);
    assert_eq!(copy.xml_string(), out);
    drop(copy);

    let text = format!("{}{}", "<a>".repeat(DEPTH), "</a>".repeat(DEPTH));
    let options = DDXML_DEFAULT_PARSE_OPTIONS | ddxml::XmlParserOption::XmlParseHuge as i32;
    let doc = DocumentRef::parse_str(&text, options).unwrap();
    assert_eq!(doc.root_element().unwrap().xml_string().len(), 7 * DEPTH - 3);
}

#[cfg(feature = "xpath")]
#[test]
fn xpath_results_keep_the_tree_alive() {
    let doc = parse(DOC);
    let books = doc.nodes_for_xpath("//book").unwrap();
    drop(doc);
    let texts = books.iter().map(|b| b.string_value()).collect::<Vec<_>>();
    assert_eq!(texts, ["A", "B", "C"]);
    assert_eq!(books[2].parent().unwrap().xpath(), "/library/shelf[2]");
}
