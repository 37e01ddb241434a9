use serde::Serialize;

use super::{Diagnostic, Severity};
use crate::program::SourceMap;

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cell: Option<usize>,
    labels: Vec<JsonLabel<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonLabel<'a> {
    start: usize,
    end: usize,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    col: Option<usize>,
}

/// Render a diagnostic as a single line of JSON.
///
/// Labels carry `line`/`col` only when the diagnostic has its source attached.
pub fn render(d: &Diagnostic) -> String {
    let map = d.source.as_deref().map(SourceMap::new);
    let labels = d
        .labels
        .iter()
        .map(|label| {
            let position = map.as_ref().map(|m| m.position(label.span.start));
            JsonLabel {
                start: label.span.start,
                end: label.span.end,
                message: &label.message,
                line: position.map(|p| p.line),
                col: position.map(|p| p.col),
            }
        })
        .collect();

    let report = JsonDiagnostic {
        severity: d.severity,
        code: d.code,
        message: &d.message,
        cell: d.cell,
        labels,
        notes: &d.notes,
        suggestion: d.suggestion.as_deref(),
    };
    serde_json::json!(report).to_string()
}
