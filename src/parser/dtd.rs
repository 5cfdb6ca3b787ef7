//! Scanning of the document type declaration.
//!
//! Only the internal subset is read; external subsets and parameter entities
//! are never loaded. Markup declarations are kept as source text, and
//! internal general entities are collected for substitution.

use crate::tree::XmlElementType;

pub(crate) struct MarkupDecl {
    pub(crate) typ: XmlElementType,
    pub(crate) name: String,
    pub(crate) source: String,
    /// Replacement text of an internal general entity.
    pub(crate) entity_value: Option<String>,
}

pub(crate) struct DocTypeDecl {
    pub(crate) name: String,
    pub(crate) decls: Vec<MarkupDecl>,
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn read_name(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| is_blank(c) || matches!(c, '[' | '>' | '"' | '\''))
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Find the end of a markup declaration starting at `s`, skipping quoted
/// literals. Returns the byte length including the closing `>`.
fn declaration_len(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if q == c => quote = None,
            (None, '>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Parse the content of `<!DOCTYPE ...>` as reported by the tokenizer.
pub(crate) fn parse_doctype(content: &str) -> DocTypeDecl {
    let content = content.trim_start();
    let (name, rest) = read_name(content);
    let mut decls = vec![];
    let subset = rest.find('[').and_then(|start| {
        rest.rfind(']')
            .filter(|&end| end > start)
            .map(|end| &rest[start + 1..end])
    });
    let mut s = subset.unwrap_or("");
    while !s.is_empty() {
        if let Some(rest) = s.strip_prefix("<!--") {
            s = rest.find("-->").map_or("", |end| &rest[end + 3..]);
        } else if let Some(rest) = s.strip_prefix("<?") {
            s = rest.find("?>").map_or("", |end| &rest[end + 2..]);
        } else if s.starts_with("<!") {
            let Some(len) = declaration_len(s) else {
                log::warn!("unterminated markup declaration in internal subset");
                break;
            };
            if let Some(decl) = parse_markup_decl(&s[..len]) {
                decls.push(decl);
            }
            s = &s[len..];
        } else {
            let mut chars = s.chars();
            chars.next();
            s = chars.as_str();
        }
    }
    DocTypeDecl {
        name: name.to_owned(),
        decls,
    }
}

fn parse_markup_decl(source: &str) -> Option<MarkupDecl> {
    let body = source.strip_prefix("<!")?.strip_suffix('>')?;
    let (keyword, rest) = read_name(body);
    let typ = match keyword {
        "ELEMENT" => XmlElementType::XmlElementDecl,
        "ATTLIST" => XmlElementType::XmlAttributeDecl,
        "ENTITY" => XmlElementType::XmlEntityDecl,
        "NOTATION" => XmlElementType::XmlNotationNode,
        _ => return None,
    };
    let mut rest = rest.trim_start();
    let mut parameter = false;
    if typ == XmlElementType::XmlEntityDecl {
        if let Some(r) = rest.strip_prefix('%') {
            parameter = true;
            rest = r.trim_start();
        }
    }
    let (name, rest) = read_name(rest);
    let mut entity_value = None;
    if typ == XmlElementType::XmlEntityDecl && !parameter {
        let rest = rest.trim_start();
        if let Some(quote) = rest.chars().next().filter(|&c| c == '"' || c == '\'') {
            let literal = &rest[1..];
            entity_value = literal.find(quote).map(|end| literal[..end].to_owned());
        }
    }
    Some(MarkupDecl {
        typ,
        name: name.to_owned(),
        source: source.to_owned(),
        entity_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_subset_declarations() {
        let dtd = parse_doctype(
            r#" doc [
  <!ELEMENT doc (#PCDATA)>
  <!-- <!ENTITY hidden "no"> -->
  <!ATTLIST doc a CDATA "x>y">
  <!ENTITY ent 'value "quoted"'>
  <!ENTITY % param "p">
  <!ENTITY ext SYSTEM "ext.xml">
  %param;
]"#,
        );
        assert_eq!(dtd.name, "doc");
        let names = dtd
            .decls
            .iter()
            .map(|d| (d.typ, d.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                (XmlElementType::XmlElementDecl, "doc"),
                (XmlElementType::XmlAttributeDecl, "doc"),
                (XmlElementType::XmlEntityDecl, "ent"),
                (XmlElementType::XmlEntityDecl, "param"),
                (XmlElementType::XmlEntityDecl, "ext"),
            ]
        );
        assert_eq!(dtd.decls[1].source, r#"<!ATTLIST doc a CDATA "x>y">"#);
        assert_eq!(dtd.decls[2].entity_value.as_deref(), Some(r#"value "quoted""#));
        assert!(dtd.decls[3].entity_value.is_none());
        assert!(dtd.decls[4].entity_value.is_none());
    }

    #[test]
    fn doctype_without_subset() {
        let dtd = parse_doctype(r#" html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "x.dtd""#);
        assert_eq!(dtd.name, "html");
        assert!(dtd.decls.is_empty());
    }
}
