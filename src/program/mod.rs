use serde::{Serialize, Serializer};

pub mod source_map;
pub use source_map::{Position, SourceMap};

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        if self == Span::UNKNOWN {
            return other;
        }
        if other == Span::UNKNOWN {
            return self;
        }
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ---- Values ----

/// A runtime value. Booleans are integers: 0 is false, 1 is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Text(String),
}

impl Value {
    /// Integer 0 and empty text are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::Text(s) => !s.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
        }
    }

    pub fn from_bool(b: bool) -> Self {
        Value::Integer(b as i64)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

// ---- Operators ----

/// Built-in operators. Names are resolved to variants once, by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Dup,
    Drop,
    Swap,
    Over,
    Print,
    Println,
    Read,
    CastInt,
    CastStr,
    Jmp,
    If,
    Stack,
    Exit,
    Call,
    Return,
}

const OP_NAMES: &[(&str, Op)] = &[
    ("+", Op::Add),
    ("-", Op::Sub),
    ("*", Op::Mul),
    ("/", Op::Div),
    ("%", Op::Mod),
    ("==", Op::Eq),
    ("!=", Op::Ne),
    ("<", Op::Lt),
    ("<=", Op::Le),
    (">", Op::Gt),
    (">=", Op::Ge),
    ("dup", Op::Dup),
    ("drop", Op::Drop),
    ("swap", Op::Swap),
    ("over", Op::Over),
    ("print", Op::Print),
    ("println", Op::Println),
    ("read", Op::Read),
    ("cast_int", Op::CastInt),
    ("cast_str", Op::CastStr),
    ("jmp", Op::Jmp),
    ("if", Op::If),
    ("stack", Op::Stack),
    ("exit", Op::Exit),
    ("call", Op::Call),
    ("return", Op::Return),
];

impl Op {
    pub fn from_name(name: &str) -> Option<Op> {
        OP_NAMES.iter().find(|(n, _)| *n == name).map(|(_, op)| *op)
    }

    pub fn name(self) -> &'static str {
        OP_NAMES
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    /// Operators the constant folder is allowed to evaluate.
    pub fn is_foldable(self) -> bool {
        matches!(self, Op::Add | Op::Sub | Op::Mul | Op::Div)
    }

    /// Every operator name, in table order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        OP_NAMES.iter().map(|(n, _)| *n)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Op {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ---- Cells ----

/// One slot of a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Cell {
    Int(i64),
    Text(String),
    Op(Op),
    /// A symbol that names no built-in operator. Fails when dispatched.
    Word(String),
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "\"{}\"", s),
            Cell::Op(op) => write!(f, "{}", op),
            Cell::Word(w) => write!(f, "{}", w),
        }
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Int(n)
    }
}

/// Bare strings become operators when they name one, words otherwise.
/// Text literals must be built with `Cell::Text` explicitly.
impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        match Op::from_name(s) {
            Some(op) => Cell::Op(op),
            None => Cell::Word(s.to_string()),
        }
    }
}

// ---- Program ----

/// Flat sequence of cells, each paired with the source span it came from.
///
/// Spans are metadata for diagnostics: equality and serialization only look
/// at the cells.
#[derive(Debug, Clone, Default)]
pub struct Program {
    cells: Vec<Cell>,
    spans: Vec<Span>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn push(&mut self, cell: Cell, span: Span) {
        self.cells.push(cell);
        self.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn span(&self, index: usize) -> Span {
        self.spans.get(index).copied().unwrap_or(Span::UNKNOWN)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Replace `cells[start..end]` with a single cell spanning all of them.
    pub(crate) fn splice_one(&mut self, start: usize, end: usize, cell: Cell) {
        let span = self.spans[start..end]
            .iter()
            .fold(Span::UNKNOWN, |acc, s| acc.merge(*s));
        self.cells.splice(start..end, std::iter::once(cell));
        self.spans.splice(start..end, std::iter::once(span));
    }
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Eq for Program {}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cells.serialize(serializer)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", cell)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<Cell>> for Program {
    fn from(cells: Vec<Cell>) -> Self {
        let spans = vec![Span::UNKNOWN; cells.len()];
        Program { cells, spans }
    }
}

/// Build a program from literals and operator names: `program![2, 3, "+"]`.
#[macro_export]
macro_rules! program {
    ($($cell:expr),* $(,)?) => {
        $crate::program::Program::from(vec![$($crate::program::Cell::from($cell)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_names_round_trip() {
        for name in Op::names() {
            let op = Op::from_name(name).unwrap();
            assert_eq!(op.name(), name);
        }
        assert_eq!(Op::from_name("foo"), None);
    }

    #[test]
    fn str_cells_resolve_ops() {
        assert_eq!(Cell::from("+"), Cell::Op(Op::Add));
        assert_eq!(Cell::from("cast_int"), Cell::Op(Op::CastInt));
        assert_eq!(Cell::from("foo"), Cell::Word("foo".to_string()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(-3).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(Value::Text("0".to_string()).is_truthy());
    }

    #[test]
    fn equality_ignores_spans() {
        let mut a = Program::new();
        a.push(Cell::Int(1), Span { start: 0, end: 1 });
        let b = program![1];
        assert_eq!(a, b);
    }

    #[test]
    fn splice_merges_spans() {
        let mut p = Program::new();
        p.push(Cell::Int(2), Span { start: 0, end: 1 });
        p.push(Cell::Int(3), Span { start: 2, end: 3 });
        p.push(Cell::Op(Op::Add), Span { start: 4, end: 5 });
        p.push(Cell::Op(Op::Println), Span { start: 6, end: 13 });
        p.splice_one(0, 3, Cell::Int(5));
        assert_eq!(p, program![5, "println"]);
        assert_eq!(p.span(0), Span { start: 0, end: 5 });
        assert_eq!(p.span(1), Span { start: 6, end: 13 });
    }

    #[test]
    fn display_program() {
        let mut p = program![2, "dup", "foo"];
        p.push(Cell::Text("hi".to_string()), Span::UNKNOWN);
        assert_eq!(p.to_string(), r#"[2, dup, foo, "hi"]"#);
    }

    #[test]
    fn serialize_cells() {
        let mut p = program![7, "*"];
        p.push(Cell::Text("x".to_string()), Span::UNKNOWN);
        p.push(Cell::Word("nope".to_string()), Span::UNKNOWN);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(
            json,
            r#"[{"kind":"int","value":7},{"kind":"op","value":"*"},{"kind":"text","value":"x"},{"kind":"word","value":"nope"}]"#
        );
    }
}
