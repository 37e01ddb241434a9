pub mod ansi;
pub mod json;

use serde::Serialize;

use crate::lexer::{LexError, LexErrorKind};
use crate::program::{Op, Program, Span};
use crate::vm::VmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    /// Index of the program cell a runtime failure happened at.
    pub cell: Option<usize>,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            cell: None,
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(message) }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// A runtime failure located at the cell that raised it.
    ///
    /// `ip` is the machine's instruction pointer after the failure; the
    /// pointer advances before dispatch, so the failing cell is `ip - 1`.
    pub fn runtime(e: &VmError, program: &Program, ip: usize) -> Self {
        let mut d = Diagnostic::from(e);
        let index = ip.saturating_sub(1);
        if let Some(cell) = program.get(index) {
            let span = program.span(index);
            if span != Span::UNKNOWN {
                d = d.with_span(span, "here");
            }
            d.cell = Some(index);
            d = d.with_note(format!("while executing cell {} `{}`", index, cell));
        }
        d
    }
}

/// Output format for diagnostics, chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticFormat {
    Text { use_color: bool },
    Json,
}

impl DiagnosticFormat {
    /// Render `d`, always ending in a newline.
    pub fn render(self, d: &Diagnostic) -> String {
        match self {
            DiagnosticFormat::Text { use_color } => ansi::AnsiRenderer { use_color }.render(d),
            DiagnosticFormat::Json => json::render(d) + "\n",
        }
    }
}

/// Name of the built-in operator closest to `name`, if any is close enough.
fn closest_op(name: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    for candidate in Op::names() {
        let dist = levenshtein(name, candidate);
        if dist <= 2 && dist < name.len() && best.is_none_or(|(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }
    best.map(|(s, _)| s)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut cur = vec![i; b.len() + 1];
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        prev = cur;
    }
    prev[b.len()]
}

// ---- From impls for error types ----

impl From<&LexError> for Diagnostic {
    fn from(e: &LexError) -> Self {
        let code = match e.kind {
            LexErrorKind::UnterminatedText => "SVM-S001",
            LexErrorKind::MalformedInteger => "SVM-S002",
        };
        let mut d = Diagnostic::error(format!("{} '{}'", e.kind, e.snippet))
            .with_code(code)
            .with_span(e.span(), "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&VmError> for Diagnostic {
    fn from(e: &VmError) -> Self {
        let code = match e {
            VmError::StackUnderflow => "SVM-R001",
            VmError::UnknownOpcode { .. } => "SVM-R002",
            VmError::DivisionByZero => "SVM-R003",
            VmError::IntegerOverflow { .. } => "SVM-R004",
            VmError::TypeError(_) => "SVM-R005",
            VmError::InvalidJumpTarget { .. } => "SVM-R006",
            VmError::EndOfInput => "SVM-R007",
            VmError::Io(_) => "SVM-R008",
        };
        let d = Diagnostic::error(e.to_string()).with_code(code);
        match e {
            VmError::UnknownOpcode { name } => match closest_op(name) {
                Some(op) => d.with_suggestion(format!("did you mean '{op}'?")),
                None => d,
            },
            VmError::InvalidJumpTarget { len, .. } if *len > 0 => {
                d.with_note(format!("jump targets must be integers from 0 to {}", len - 1))
            }
            _ => d,
        }
    }
}
