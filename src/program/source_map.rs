use std::ops::Range;

/// A 1-based line and column. Columns count chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Line index over a program's source text.
///
/// Scripts are tokenized as one program, so a cell's span can land on any line.
pub struct SourceMap<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> SourceMap<'src> {
    pub fn new(source: &'src str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceMap { source, line_starts }
    }

    /// Position of a byte offset. Offsets past the end clamp to the last line.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let index = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[index];
        let col = match self.source.get(start..offset) {
            Some(prefix) => prefix.chars().count(),
            None => offset - start,
        };
        Position { line: index + 1, col: col + 1 }
    }

    /// Byte range of a 1-based line, without its terminator.
    pub fn line_range(&self, line: usize) -> Option<Range<usize>> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map_or(self.source.len(), |next| next - 1);
        let text = &self.source[start..end];
        Some(start..start + text.trim_end_matches('\r').len())
    }

    /// Text of a 1-based line; empty when there is no such line.
    pub fn line(&self, line: usize) -> &'src str {
        self.line_range(line).map_or("", |range| &self.source[range])
    }
}
