//! Per-thread configuration and diagnostic routing.
//!
//! Defaults mirror what KissXML sets up at load time: blank text nodes are
//! dropped while parsing, formatted output is indented with two spaces.

use std::{
    borrow::Cow,
    cell::RefCell,
    io::Write,
    sync::{
        Once,
        atomic::{AtomicBool, Ordering},
    },
};

use const_format::concatcp;

use crate::error::{XmlError, generic_error_default};

pub type GenericError = for<'a> fn(Option<&mut (dyn Write + 'static)>, &str);
pub type StructuredError = fn(&XmlError);

const fn zero_pad(part: &str) -> &'static str {
    if part.len() < 2 { "0" } else { "" }
}

const MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
const MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
const PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");
const MAJOR_PAD: &str = zero_pad(MAJOR);
const MINOR_PAD: &str = zero_pad(MINOR);
const PATCH_PAD: &str = zero_pad(PATCH);

/// Version of this crate as a `MMmmpp` string.
pub const DDXML_VERSION: &str = concatcp!(MAJOR_PAD, MAJOR, MINOR_PAD, MINOR, PATCH_PAD, PATCH);

/// Number of diagnostics kept per thread once capturing is on. Older ones
/// are dropped first.
pub const MAX_CAPTURED_ERRORS: usize = 256;

pub struct XmlGlobalState {
    parser_version: Cow<'static, str>,
    pub(crate) generic_error: GenericError,
    pub(crate) generic_error_context: Option<Box<dyn Write>>,
    pub(crate) structured_error: Option<StructuredError>,
    keep_blanks_default_value: bool,
    save_no_empty_tags: bool,
    indent_tree_output: bool,
    tree_indent_string: Cow<'static, str>,
    pub(crate) last_error: XmlError,
    pub(crate) captured_errors: Vec<XmlError>,
}

impl XmlGlobalState {
    fn new() -> Self {
        Self {
            parser_version: Cow::Borrowed(DDXML_VERSION),
            generic_error: generic_error_default,
            generic_error_context: None,
            structured_error: None,
            keep_blanks_default_value: false,
            save_no_empty_tags: false,
            indent_tree_output: true,
            tree_indent_string: Cow::Borrowed("  "),
            last_error: XmlError::default(),
            captured_errors: vec![],
        }
    }
}

thread_local! {
    pub static GLOBAL_STATE: RefCell<XmlGlobalState> = RefCell::new(XmlGlobalState::new());
}

static INSTALL_ERROR_HANDLERS: Once = Once::new();
static CAPTURE_DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

/// Replace the stderr handlers with ones that keep diagnostics in a
/// thread-local buffer.
///
/// This is process-wide and only the first call has an effect.
/// Captured diagnostics are read back with [`take_captured_errors`].
pub fn install_error_handlers() {
    INSTALL_ERROR_HANDLERS.call_once(|| {
        CAPTURE_DIAGNOSTICS.store(true, Ordering::Release);
        log::debug!("diagnostics are now captured per thread");
    });
}

pub fn error_handlers_installed() -> bool {
    CAPTURE_DIAGNOSTICS.load(Ordering::Acquire)
}

/// Set new generic error function and generic error context.
///
/// If `func` is `None`, set `generic_error_default`.
/// If `context` is `None`, current context is clear and no context is set.
pub fn set_generic_error(func: Option<GenericError>, context: Option<impl Write + 'static>) {
    GLOBAL_STATE.with_borrow_mut(|state| {
        state.generic_error = func.unwrap_or(generic_error_default);
        state.generic_error_context = context.map(|context| {
            let boxed: Box<dyn Write + 'static> = Box::new(context);
            boxed
        });
    });
}

/// Set a function receiving every diagnostic of this thread.
///
/// A structured handler takes precedence over both capturing and the generic
/// error function.
pub fn set_structured_error(func: Option<StructuredError>) {
    GLOBAL_STATE.with_borrow_mut(|state| state.structured_error = func);
}

/// Route one diagnostic.
pub(crate) fn report_error(error: XmlError) {
    let (structured, generic, context) = GLOBAL_STATE.with_borrow_mut(|state| {
        state.last_error = error.clone();
        if state.structured_error.is_none() && error_handlers_installed() {
            if state.captured_errors.len() >= MAX_CAPTURED_ERRORS {
                let excess = state.captured_errors.len() + 1 - MAX_CAPTURED_ERRORS;
                state.captured_errors.drain(..excess);
            }
            state.captured_errors.push(error.clone());
            return (None, None, None);
        }
        match state.structured_error {
            Some(structured) => (Some(structured), None, None),
            None => (
                None,
                Some(state.generic_error),
                state.generic_error_context.take(),
            ),
        }
    });
    if let Some(structured) = structured {
        structured(&error);
    } else if let Some(generic) = generic {
        let mut context = context;
        generic(context.as_deref_mut(), &format!("{error}\n"));
        if context.is_some() {
            GLOBAL_STATE.with_borrow_mut(|state| state.generic_error_context = context);
        }
    }
}

/// Drain the diagnostics captured on this thread.
pub fn take_captured_errors() -> Vec<XmlError> {
    GLOBAL_STATE.with_borrow_mut(|state| std::mem::take(&mut state.captured_errors))
}

/// The most recent diagnostic raised on this thread.
pub fn last_error() -> XmlError {
    GLOBAL_STATE.with_borrow(|state| state.last_error.clone())
}

pub fn reset_last_error() {
    GLOBAL_STATE.with_borrow_mut(|state| state.last_error.reset());
}

pub fn parser_version() -> String {
    GLOBAL_STATE.with_borrow(|state| state.parser_version.to_string())
}

/// Whether blank text nodes are kept when a parse does not ask for
/// `XmlParseNoBlanks`.
pub fn keep_blanks_default_value() -> bool {
    GLOBAL_STATE.with_borrow(|state| state.keep_blanks_default_value)
}

/// Set the default for keeping blank text nodes and return the previous value.
#[doc(alias = "xmlKeepBlanksDefault")]
pub fn set_keep_blanks_default_value(keep: bool) -> bool {
    GLOBAL_STATE.with_borrow_mut(|state| {
        std::mem::replace(&mut state.keep_blanks_default_value, keep)
    })
}

pub fn save_no_empty_tags() -> bool {
    GLOBAL_STATE.with_borrow(|state| state.save_no_empty_tags)
}

pub fn set_save_no_empty_tags(value: bool) {
    GLOBAL_STATE.with_borrow_mut(|state| state.save_no_empty_tags = value);
}

pub fn indent_tree_output() -> bool {
    GLOBAL_STATE.with_borrow(|state| state.indent_tree_output)
}

pub fn set_indent_tree_output(value: bool) {
    GLOBAL_STATE.with_borrow_mut(|state| state.indent_tree_output = value);
}

pub fn tree_indent_string() -> Cow<'static, str> {
    GLOBAL_STATE.with_borrow(|state| state.tree_indent_string.clone())
}

pub fn set_tree_indent_string(indent: impl Into<Cow<'static, str>>) {
    let indent = indent.into();
    GLOBAL_STATE.with_borrow_mut(|state| state.tree_indent_string = indent);
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        sync::{Arc, Mutex},
    };

    use crate::error::{XmlErrorDomain, XmlErrorLevel, XmlParserErrors};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn version_string_is_six_digits() {
        assert_eq!(DDXML_VERSION.len(), 6);
        assert!(DDXML_VERSION.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parser_version(), DDXML_VERSION);
    }

    #[test]
    fn generic_error_context_receives_messages() {
        let sink = SharedSink::default();
        set_generic_error(None, Some(sink.clone()));
        set_structured_error(None);
        let err = XmlError::new(
            XmlErrorDomain::XmlFromParser,
            XmlParserErrors::XmlErrDocumentEmpty,
            XmlErrorLevel::XmlErrFatal,
            "Document is empty",
        )
        .at(1, 1);
        report_error(err.clone());
        assert_eq!(last_error(), err);
        if !error_handlers_installed() {
            let written = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
            assert!(written.contains("Document is empty"));
        }
        set_generic_error(None, None::<SharedSink>);
        reset_last_error();
        assert!(last_error().is_ok());
    }

    #[test]
    fn captured_errors_keep_the_most_recent() {
        install_error_handlers();
        set_structured_error(None);
        take_captured_errors();
        for line in 1..=MAX_CAPTURED_ERRORS + 10 {
            let err = XmlError::new(
                XmlErrorDomain::XmlFromParser,
                XmlParserErrors::XmlErrTagNameMismatch,
                XmlErrorLevel::XmlErrError,
                "mismatch",
            )
            .at(line, 1);
            report_error(err);
        }
        let captured = take_captured_errors();
        assert_eq!(captured.len(), MAX_CAPTURED_ERRORS);
        assert_eq!(captured[0].line(), 11);
        assert_eq!(captured.last().unwrap().line(), MAX_CAPTURED_ERRORS + 10);
    }

    #[test]
    fn keep_blanks_returns_previous_value() {
        let old = set_keep_blanks_default_value(true);
        assert!(!old);
        assert!(keep_blanks_default_value());
        set_keep_blanks_default_value(old);
    }
}
