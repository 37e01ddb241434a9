use super::{Diagnostic, Label, Severity};
use crate::program::{Position, SourceMap};

/// Renders diagnostics as rustc-style text, optionally with ANSI colour.
pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn bold_yellow(&self, s: &str) -> String {
        self.paint("1;33", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let heading = match d.code {
            Some(code) => format!("{severity}[{code}]"),
            None => severity.to_string(),
        };
        let heading = match d.severity {
            Severity::Error => self.bold_red(&heading),
            Severity::Warning => self.bold_yellow(&heading),
        };
        let mut out = format!("{}: {}\n", heading, self.bold(&d.message));

        if let (Some(label), Some(source)) = (d.labels.first(), d.source.as_deref()) {
            out.push_str(&self.snippet(label, source));
        }

        let bullet = self.dim("=");
        for note in &d.notes {
            out.push_str(&format!("  {bullet} note: {note}\n"));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {bullet} suggestion: {suggestion}\n"));
        }
        out
    }

    /// Location line, the offending source line, and carets under the span.
    fn snippet(&self, label: &Label, source: &str) -> String {
        let map = SourceMap::new(source);
        let Position { line, col } = map.position(label.span.start);
        let text = map.line(line);
        // Carets stop at the end of the first line a span touches
        let line_end = map.line_range(line).map_or(label.span.start, |r| r.end);
        let underlined = source
            .get(label.span.start..label.span.end.min(line_end).max(label.span.start))
            .map_or(0, |s| s.chars().count());

        let width = line.to_string().len();
        let pad = " ".repeat(width);
        let pipe = self.cyan("|");
        let number = self.cyan(&format!("{line:>width$}"));
        let indent = " ".repeat(col.saturating_sub(1));
        let carets = "^".repeat(underlined.max(1));
        let marker = if label.message.is_empty() {
            self.bold_red(&carets)
        } else {
            self.bold_red(&format!("{carets} {}", label.message))
        };

        format!(
            "  {arrow} {line}:{col}\n{pad} {pipe}\n{number} {pipe} {text}\n{pad} {pipe} {indent}{marker}\n",
            arrow = self.cyan("-->"),
        )
    }
}
