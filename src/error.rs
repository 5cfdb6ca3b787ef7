//! Diagnostics raised while parsing, serializing and walking a tree.
//!
//! Every diagnostic is an [`XmlError`] and is routed through
//! [`crate::globals::report_error`], which either hands it to the generic
//! error function (stderr by default) or captures it in thread-local storage
//! once [`crate::globals::install_error_handlers`] has run.

use std::{borrow::Cow, fmt::Display, io::Write};

use crate::dom::XmlNodeKind;

/// The module that raised a diagnostic.
///
/// Values follow the numbering of libxml2's `xmlErrorDomain`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlErrorDomain {
    #[default]
    XmlFromNone = 0,
    XmlFromParser = 1,
    XmlFromTree = 2,
    XmlFromNamespace = 3,
    XmlFromDTD = 4,
    XmlFromOutput = 7,
    XmlFromIO = 8,
    XmlFromXPath = 12,
    XmlFromI18N = 27,
}

impl Display for XmlErrorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::XmlFromNone => "",
            Self::XmlFromParser => "parser ",
            Self::XmlFromTree => "tree ",
            Self::XmlFromNamespace => "namespace ",
            Self::XmlFromDTD => "validity ",
            Self::XmlFromOutput => "output ",
            Self::XmlFromIO => "I/O ",
            Self::XmlFromXPath => "XPath ",
            Self::XmlFromI18N => "encoding ",
        };
        write!(f, "{s}")
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum XmlErrorLevel {
    #[default]
    XmlErrNone = 0,
    /// A simple warning
    XmlErrWarning = 1,
    /// A recoverable error
    XmlErrError = 2,
    /// A fatal error
    XmlErrFatal = 3,
}

impl Display for XmlErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::XmlErrNone => "",
            Self::XmlErrWarning => "warning",
            Self::XmlErrError | Self::XmlErrFatal => "error",
        };
        write!(f, "{s}")
    }
}

/// Error codes, numbered as libxml2's `xmlParserErrors`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlParserErrors {
    #[default]
    XmlErrOK = 0,
    XmlErrInternalError = 1,
    XmlErrDocumentStart = 3,
    XmlErrDocumentEmpty = 4,
    XmlErrDocumentEnd = 5,
    XmlErrInvalidCharRef = 8,
    XmlErrInvalidChar = 9,
    XmlErrEntityRefSemicolMissing = 23,
    XmlErrUndeclaredEntity = 26,
    XmlWarUndeclaredEntity = 27,
    XmlErrUnknownEncoding = 31,
    XmlErrUnsupportedEncoding = 32,
    XmlErrLtInAttribute = 38,
    XmlErrAttributeNotStarted = 39,
    XmlErrAttributeRedefined = 42,
    XmlErrCommentNotFinished = 45,
    XmlErrPINotFinished = 47,
    XmlErrXMLDeclNotFinished = 57,
    XmlErrDocTypeNotFinished = 61,
    XmlErrCDATANotFinished = 63,
    XmlErrNameRequired = 68,
    XmlErrGtRequired = 73,
    XmlErrTagNameMismatch = 76,
    XmlErrTagNotFinished = 77,
    XmlErrNotWellBalanced = 85,
    XmlErrEntityLoop = 89,
    XmlErrVersionMissing = 96,
    XmlErrUserStop = 111,
    XmlNsErrUndefinedNamespace = 201,
    XmlNsErrQname = 202,
    XmlSaveUnknownEncoding = 1403,
    XmlI18NConvFailed = 6003,
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlError {
    pub(crate) domain: XmlErrorDomain,
    pub(crate) code: XmlParserErrors,
    pub(crate) message: Option<Cow<'static, str>>,
    pub(crate) level: XmlErrorLevel,
    pub(crate) line: usize,
    pub(crate) column: usize,
}

impl XmlError {
    pub(crate) fn new(
        domain: XmlErrorDomain,
        code: XmlParserErrors,
        level: XmlErrorLevel,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            domain,
            code,
            message: Some(message.into()),
            level,
            line: 0,
            column: 0,
        }
    }

    pub(crate) fn at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn domain(&self) -> XmlErrorDomain {
        self.domain
    }

    pub fn code(&self) -> XmlParserErrors {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn level(&self) -> XmlErrorLevel {
        self.level
    }

    /// 1-based line of the diagnostic, or 0 if it is not tied to an input.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn is_ok(&self) -> bool {
        self.code == XmlParserErrors::XmlErrOK
    }

    pub fn is_fatal(&self) -> bool {
        self.level == XmlErrorLevel::XmlErrFatal
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for XmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: ", self.line)?;
        }
        write!(
            f,
            "{}{} : {}",
            self.domain,
            self.level,
            self.message.as_deref().unwrap_or("")
        )
    }
}

impl std::error::Error for XmlError {}

/// Errors returned by the node handles.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNodeError {
    /// The input is not well-formed, or could not be recovered.
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    /// The expression does not compile.
    XPathSyntax { expr: String, message: String },
    /// The expression compiled but its evaluation failed.
    XPathEval { expr: String, message: String },
    OutOfRange { index: usize, count: usize },
    /// The operation does not apply to a node of this kind.
    InvalidOperation {
        kind: XmlNodeKind,
        operation: &'static str,
    },
    /// The expression gave a value where nodes were expected.
    EvalKindMismatch { expr: String, found: &'static str },
}

impl Display for XmlNodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse {
                line,
                column,
                message,
            } => write!(f, "parse error at line {line}, column {column}: {message}"),
            Self::XPathSyntax { expr, message } => {
                write!(f, "invalid XPath expression '{expr}': {message}")
            }
            Self::XPathEval { expr, message } => {
                write!(f, "failed to evaluate XPath expression '{expr}': {message}")
            }
            Self::OutOfRange { index, count } => {
                write!(f, "index {index} is out of range for {count} children")
            }
            Self::InvalidOperation { kind, operation } => {
                write!(f, "{operation} is not supported on {kind:?} nodes")
            }
            Self::EvalKindMismatch { expr, found } => {
                write!(f, "XPath expression '{expr}' gave a {found}, not a node-set")
            }
        }
    }
}

impl std::error::Error for XmlNodeError {}

impl From<XmlError> for XmlNodeError {
    fn from(err: XmlError) -> Self {
        Self::Parse {
            line: err.line,
            column: err.column,
            message: err.message.as_deref().unwrap_or("").trim_end().to_owned(),
        }
    }
}

/// Default generic error function.
///
/// Writes `msg` to `out` if a context is given, otherwise to stderr.
pub fn generic_error_default(out: Option<&mut (dyn Write + 'static)>, msg: &str) {
    if let Some(out) = out {
        write!(out, "{msg}").ok();
    } else {
        eprint!("{msg}");
    }
}
