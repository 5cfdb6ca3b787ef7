//! Character encoding detection and conversion for parser input and
//! serializer output.
//!
//! Conversions are delegated to `encoding_rs`. UTF-16 output and ISO-8859-1
//! are handled here because `encoding_rs` provides no encoder for the former
//! and maps the label of the latter to windows-1252.

use std::{borrow::Cow, str::FromStr};

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

use crate::error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    Error = -1,
    None = 0,
    UTF8,
    UTF16LE,
    UTF16BE,
    UCS4LE,
    UCS4BE,
    EBCDIC,
    ISO8859_1,
    ISO8859_2,
    ISO8859_15,
    ISO2022JP,
    ShiftJIS,
    EUCJP,
    ASCII,
}

impl XmlCharEncoding {
    pub fn get_name(&self) -> Option<&'static str> {
        match *self {
            Self::UTF8 => Some("UTF-8"),
            Self::UTF16LE => Some("UTF-16"),
            Self::UTF16BE => Some("UTF-16"),
            Self::EBCDIC => Some("EBCDIC"),
            Self::UCS4LE => Some("ISO-10646-UCS-4"),
            Self::UCS4BE => Some("ISO-10646-UCS-4"),
            Self::ISO8859_1 => Some("ISO-8859-1"),
            Self::ISO8859_2 => Some("ISO-8859-2"),
            Self::ISO8859_15 => Some("ISO-8859-15"),
            Self::ISO2022JP => Some("ISO-2022-JP"),
            Self::ShiftJIS => Some("Shift-JIS"),
            Self::EUCJP => Some("EUC-JP"),
            Self::ASCII => Some("ASCII"),
            _ => None,
        }
    }
}

impl FromStr for XmlCharEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "UTF-8" | "UTF8" => Ok(Self::UTF8),
            "UTF-16" | "UTF16" | "UTF-16LE" => Ok(Self::UTF16LE),
            "UTF-16BE" => Ok(Self::UTF16BE),
            "ISO-10646-UCS-4" | "UCS-4" | "UCS4" => Ok(Self::UCS4LE),
            "EBCDIC" => Ok(Self::EBCDIC),
            "ISO-8859-1" | "ISO-LATIN-1" | "ISO LATIN 1" | "LATIN1" => Ok(Self::ISO8859_1),
            "ISO-8859-2" | "ISO-LATIN-2" | "ISO LATIN 2" => Ok(Self::ISO8859_2),
            "ISO-8859-15" => Ok(Self::ISO8859_15),
            "ISO-2022-JP" => Ok(Self::ISO2022JP),
            "SHIFT_JIS" | "SHIFT-JIS" => Ok(Self::ShiftJIS),
            "EUC-JP" => Ok(Self::EUCJP),
            "ASCII" | "US-ASCII" => Ok(Self::ASCII),
            _ => Err(anyhow::anyhow!("Unknown encoding name '{s}'")),
        }
    }
}

/// Guess the encoding of `input` from its first bytes.
///
/// Returns `XmlCharEncoding::None` if nothing can be inferred; the caller
/// then falls back to the encoding declaration or UTF-8.
pub fn detect_encoding(input: &[u8]) -> XmlCharEncoding {
    match input {
        [0x00, 0x00, 0x00, 0x3C, ..] => XmlCharEncoding::UCS4BE,
        [0x3C, 0x00, 0x00, 0x00, ..] => XmlCharEncoding::UCS4LE,
        [0x4C, 0x6F, 0xA7, 0x94, ..] => XmlCharEncoding::EBCDIC,
        [0x3C, 0x3F, 0x78, 0x6D, ..] => XmlCharEncoding::UTF8,
        [0x3C, 0x00, 0x3F, 0x00, ..] => XmlCharEncoding::UTF16LE,
        [0x00, 0x3C, 0x00, 0x3F, ..] => XmlCharEncoding::UTF16BE,
        // UTF-8 BOM
        [0xEF, 0xBB, 0xBF, ..] => XmlCharEncoding::UTF8,
        // UTF-16 BOM (BE)
        [0xFE, 0xFF, ..] => XmlCharEncoding::UTF16BE,
        // UTF-16 BOM (LE)
        [0xFF, 0xFE, ..] => XmlCharEncoding::UTF16LE,
        _ => XmlCharEncoding::None,
    }
}

/// Extract the `encoding` pseudo-attribute of an XML declaration written in
/// an ASCII-compatible encoding.
pub(crate) fn sniff_declared_encoding(input: &[u8]) -> Option<&str> {
    let input = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
    let decl = input.strip_prefix(b"<?xml")?;
    let end = decl.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&decl[..end]).ok()?;
    let (_, rest) = decl.split_once("encoding")?;
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

/// Find the `encoding_rs` decoder for an encoding name.
///
/// `None` means the name is unknown or refers to ISO-8859-1, which is
/// handled without `encoding_rs`.
pub fn find_encoding_handler(name: &str) -> Option<&'static Encoding> {
    if matches!(
        name.parse::<XmlCharEncoding>(),
        Ok(XmlCharEncoding::ISO8859_1)
    ) {
        return None;
    }
    Encoding::for_label(name.trim().as_bytes())
}

fn encoding_error(code: XmlParserErrors, msg: String) -> XmlError {
    XmlError::new(
        XmlErrorDomain::XmlFromI18N,
        code,
        XmlErrorLevel::XmlErrFatal,
        msg,
    )
    .at(1, 1)
}

/// Convert raw parser input to UTF-8.
///
/// The encoding is chosen in this order: the BOM or the layout of the first
/// bytes, then `encoding` if given, then the encoding declaration, then UTF-8.
pub fn decode_input<'a>(input: &'a [u8], encoding: Option<&str>) -> Result<Cow<'a, str>, XmlError> {
    let detected = detect_encoding(input);
    match detected {
        XmlCharEncoding::UTF16LE | XmlCharEncoding::UTF16BE => {
            let encoding = if detected == XmlCharEncoding::UTF16LE {
                UTF_16LE
            } else {
                UTF_16BE
            };
            // `decode` removes a BOM if present.
            let (text, _, malformed) = encoding.decode(input);
            if malformed {
                return Err(encoding_error(
                    XmlParserErrors::XmlI18NConvFailed,
                    "Input is not proper UTF-16, indicate encoding !".to_owned(),
                ));
            }
            return Ok(text);
        }
        XmlCharEncoding::UCS4BE | XmlCharEncoding::UCS4LE | XmlCharEncoding::EBCDIC => {
            return Err(encoding_error(
                XmlParserErrors::XmlErrUnsupportedEncoding,
                format!(
                    "Unsupported encoding {}",
                    detected.get_name().unwrap_or("unknown")
                ),
            ));
        }
        _ => {}
    }

    let input = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
    let name = encoding.or_else(|| sniff_declared_encoding(input));
    let Some(name) = name else {
        return decode_utf8(input);
    };
    if matches!(
        name.parse::<XmlCharEncoding>(),
        Ok(XmlCharEncoding::ISO8859_1)
    ) {
        return Ok(encoding_rs::mem::decode_latin1(input));
    }
    match find_encoding_handler(name) {
        Some(enc) if enc == UTF_8 => decode_utf8(input),
        Some(enc) => enc
            .decode_without_bom_handling_and_without_replacement(input)
            .ok_or_else(|| {
                encoding_error(
                    XmlParserErrors::XmlI18NConvFailed,
                    format!("input conversion failed due to input error for {name}"),
                )
            }),
        None => Err(encoding_error(
            XmlParserErrors::XmlErrUnsupportedEncoding,
            format!("Unsupported encoding {name}"),
        )),
    }
}

fn decode_utf8(input: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    std::str::from_utf8(input).map(Cow::Borrowed).map_err(|e| {
        let prefix = &input[..e.valid_up_to()];
        let line = prefix.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = prefix.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
        let column = prefix.len() - line_start + 1;
        XmlError::new(
            XmlErrorDomain::XmlFromParser,
            XmlParserErrors::XmlErrInvalidChar,
            XmlErrorLevel::XmlErrFatal,
            "Input is not proper UTF-8, indicate encoding !",
        )
        .at(line, column)
    })
}

/// Whether serialized output can be produced in the encoding `name`.
pub fn is_supported_output_encoding(name: &str) -> bool {
    match name.parse::<XmlCharEncoding>() {
        Ok(XmlCharEncoding::ISO8859_1 | XmlCharEncoding::UTF8)
        | Ok(XmlCharEncoding::UTF16LE | XmlCharEncoding::UTF16BE)
        | Ok(XmlCharEncoding::ASCII) => true,
        _ => find_encoding_handler(name).is_some_and(|enc| enc.output_encoding() == enc),
    }
}

/// Encode serialized text for output.
///
/// Characters the target cannot represent are written as numeric character
/// references. Returns `None` if the encoding is unsupported.
pub fn encode_output(text: &str, name: &str) -> Option<Vec<u8>> {
    match name.parse::<XmlCharEncoding>() {
        Ok(XmlCharEncoding::UTF8) => return Some(text.as_bytes().to_vec()),
        Ok(XmlCharEncoding::UTF16LE) | Ok(XmlCharEncoding::UTF16BE) => {
            let big_endian = name.eq_ignore_ascii_case("UTF-16BE");
            let mut out = Vec::with_capacity(text.len() * 2 + 2);
            if !big_endian && !name.eq_ignore_ascii_case("UTF-16LE") {
                out.extend_from_slice(&[0xFF, 0xFE]);
            }
            for unit in text.encode_utf16() {
                if big_endian {
                    out.extend_from_slice(&unit.to_be_bytes());
                } else {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            return Some(out);
        }
        Ok(XmlCharEncoding::ISO8859_1) => return Some(encode_with_char_refs(text, 0xFF)),
        Ok(XmlCharEncoding::ASCII) => return Some(encode_with_char_refs(text, 0x7F)),
        _ => {}
    }
    let enc = find_encoding_handler(name)?;
    if enc.output_encoding() != enc {
        return None;
    }
    let (bytes, _, _) = enc.encode(text);
    Some(bytes.into_owned())
}

fn encode_with_char_refs(text: &str, max: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if c as u32 <= max {
            out.push(c as u32 as u8);
        } else {
            out.extend_from_slice(format!("&#{};", c as u32).as_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_by_bom_and_layout() {
        assert_eq!(detect_encoding(b"\xEF\xBB\xBF<r/>"), XmlCharEncoding::UTF8);
        assert_eq!(detect_encoding(b"\xFF\xFE<\0"), XmlCharEncoding::UTF16LE);
        assert_eq!(detect_encoding(b"<?xml version"), XmlCharEncoding::UTF8);
        assert_eq!(detect_encoding(b"<r/>"), XmlCharEncoding::None);
    }

    #[test]
    fn declared_encoding_is_sniffed() {
        assert_eq!(
            sniff_declared_encoding(b"<?xml version='1.0' encoding='Shift_JIS'?><r/>"),
            Some("Shift_JIS")
        );
        assert_eq!(sniff_declared_encoding(b"<?xml version=\"1.0\"?><r/>"), None);
        assert_eq!(sniff_declared_encoding(b"<r/>"), None);
    }

    #[test]
    fn decode_latin1_and_utf16() {
        let latin1 = b"<?xml version='1.0' encoding='ISO-8859-1'?><r>\xE9</r>";
        assert!(decode_input(latin1, None).unwrap().contains("<r>\u{e9}</r>"));

        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "<r>\u{3042}</r>".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_input(&utf16, None).unwrap(), "<r>\u{3042}</r>");
    }

    #[test]
    fn invalid_utf8_is_reported_with_position() {
        let err = decode_input(b"<r>\n\xFF</r>", None).unwrap_err();
        assert_eq!(err.code(), XmlParserErrors::XmlErrInvalidChar);
        assert_eq!(err.line(), 2);
        assert_eq!(err.column(), 1);
    }

    #[test]
    fn encode_output_uses_char_refs() {
        assert_eq!(encode_output("a\u{e9}\u{3042}", "ISO-8859-1").unwrap(), b"a\xE9&#12354;");
        assert_eq!(encode_output("a", "UTF-8").unwrap(), b"a");
        assert!(encode_output("a", "no-such-encoding").is_none());
        assert!(is_supported_output_encoding("Shift_JIS"));
        assert!(!is_supported_output_encoding("no-such-encoding"));
    }
}
