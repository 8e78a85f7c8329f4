use std::fmt::{self, Display, Formatter};
use std::ops::Range;

use annotate_snippets::display_list::{DisplayList, FormatOptions};
use annotate_snippets::snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation};
use thiserror::Error;

/// A character the lexer couldn't place, as reported to a listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}:{column} {message}")]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn annotation_type(&self) -> AnnotationType {
        match self {
            Severity::Error => AnnotationType::Error,
            Severity::Warning => AnnotationType::Warning,
        }
    }
}

/// The target of a branch that couldn't be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Address(usize),
    Label(String),
    Tag(String),
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Address(address) => write!(f, "target address {:03} is not the start of an instruction", address),
            Reference::Label(label) => write!(f, "target label {} is not defined", label),
            Reference::Tag(name) => write!(f, "target tag @{} is not defined", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagnosticKind {
    #[error("invalid statement: {0}")]
    InvalidStatement(String),
    #[error("{0}")]
    UnresolvedReference(Reference),
    #[error("duplicate label {label}, first defined at {first:03}")]
    DuplicateLabel { label: String, first: usize },
    #[error("duplicate tag @{name}, first defined at {first:03}")]
    DuplicateTag { name: String, first: usize },
    #[error("tag @{name} is never referenced")]
    UnreferencedTag { name: String },
}

impl DiagnosticKind {
    fn hint(&self) -> &'static str {
        match self {
            DiagnosticKind::InvalidStatement(_) => "can't be read as a statement",
            DiagnosticKind::UnresolvedReference(_) => "unresolved",
            DiagnosticKind::DuplicateLabel { .. } | DiagnosticKind::DuplicateTag { .. } => "defined again here",
            DiagnosticKind::UnreferencedTag { .. } => "never used",
        }
    }
}

/// Something wrong with a statement. Nothing is fatal: a program with
/// diagnostics is still fully built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Index into the program's statements.
    pub statement: usize,
    /// Index into that statement's tokens, when one token is to blame.
    pub token: Option<usize>,
    /// Byte range in the source.
    pub span: Range<usize>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, statement: usize, token: Option<usize>, span: Range<usize>) -> Self {
        Diagnostic { kind, severity: Severity::Error, statement, token, span }
    }

    pub fn warning(kind: DiagnosticKind, statement: usize, token: Option<usize>, span: Range<usize>) -> Self {
        Diagnostic { kind, severity: Severity::Warning, statement, token, span }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Renders the diagnostic against the source it came from.
    pub fn report(&self, source: &str, origin: Option<&str>, color: bool) -> String {
        let message = self.message();
        let annotation_type = self.severity.annotation_type();
        let snippet = Snippet {
            title: Some(Annotation {
                label: Some(message.as_str()),
                id: None,
                annotation_type,
            }),
            footer: vec![],
            slices: vec![Slice {
                source,
                line_start: 1,
                origin,
                fold: true,
                annotations: vec![SourceAnnotation {
                    range: char_range(source, &self.span),
                    label: self.kind.hint(),
                    annotation_type,
                }],
            }],
            opt: FormatOptions { color, ..Default::default() },
        };
        DisplayList::from(snippet).to_string()
    }
}

// Snippet ranges count characters, not bytes.
fn char_range(source: &str, span: &Range<usize>) -> (usize, usize) {
    let chars_before = |offset: usize| source.get(..offset).map_or(0, |text| text.chars().count());
    let start = chars_before(span.start);
    let end = chars_before(span.end).max(start + 1);
    (start, end)
}
