use std::borrow::Cow;

/// Parse an XML qualified name string
///
/// ```text
/// [NS 5] QName ::= (Prefix ':')? LocalPart
///
/// [NS 6] Prefix ::= NCName
///
/// [NS 7] LocalPart ::= NCName
/// ```
///
/// Returns `None` if the name doesn't have a prefix.
/// Otherwise, returns `Some((Prefix, LocalPart))`.
///
/// # Note
/// This function does not perform validation.
#[doc(alias = "xmlSplitQName2")]
pub fn split_qname2(name: &str) -> Option<(&str, &str)> {
    // nasty but valid
    if name.starts_with(':') {
        return None;
    }

    // we are not trying to validate but just to cut, and yes it will
    // work even if this is as set of UTF-8 encoded chars
    name.split_once(':').filter(|(_, local)| !local.is_empty())
}

/// Builds the QName `"prefix:ncname"`.
///
/// If `prefix` is `Some` and not empty, return `Cow::Owned(QName)`.
/// Otherwise, return `Cow::Borrowed(ncname)`.
#[doc(alias = "xmlBuildQName")]
pub fn build_qname<'a>(ncname: &'a str, prefix: Option<&str>) -> Cow<'a, str> {
    let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
        return Cow::Borrowed(ncname);
    };
    Cow::Owned(format!("{prefix}:{ncname}"))
}

/// The part of `name` after the first colon, or `name` itself.
///
/// ```
/// use ddxml::parser::qname::local_name_for_name;
///
/// assert_eq!(local_name_for_name("ns:elt"), "elt");
/// assert_eq!(local_name_for_name("x"), "x");
/// ```
pub fn local_name_for_name(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

/// The part of `name` before the first colon, or the empty string.
///
/// ```
/// use ddxml::parser::qname::prefix_for_name;
///
/// assert_eq!(prefix_for_name("ns:elt"), "ns");
/// assert_eq!(prefix_for_name("x"), "");
/// ```
pub fn prefix_for_name(name: &str) -> &str {
    name.split_once(':').map_or("", |(prefix, _)| prefix)
}

/// Check that `name` is an NCName: a name without colon.
pub fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c == '-' || c == '.' || c.is_alphanumeric() || c == '\u{B7}')
}
