//! Constant-folding peephole pass.
//!
//! Collapses `Int Int op` windows (op in `+ - * /`) into the single integer
//! they evaluate to, restarting the scan after every fold until nothing
//! changes.
//!
//! The pass is not jump-aware. Shortening the program shifts every later
//! cell, and absolute jump targets that pointed past a folded window are
//! left as they were. Programs that `jmp` or `call` to absolute addresses
//! should not be folded.

use std::io;

use crate::program::{Cell, Op, Program, Value};
use crate::vm::{Machine, VmError, VmResult};

/// One rewrite performed by the folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folding {
    /// Index of the first cell of the window, before the rewrite.
    pub at: usize,
    pub lhs: i64,
    pub op: Op,
    pub rhs: i64,
    pub result: i64,
}

impl std::fmt::Display for Folding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Constant-folded ({} {} {}) to {}", self.lhs, self.op, self.rhs, self.result)
    }
}

/// Fold `program` to a fixed point and return it.
pub fn fold(mut program: Program) -> Program {
    fold_in_place(&mut program);
    program
}

/// Fold `program` in place, returning every rewrite in the order applied.
///
/// Windows that fail to evaluate (division by zero, overflow) are left
/// untouched so the error surfaces when the program runs.
pub fn fold_in_place(program: &mut Program) -> Vec<Folding> {
    let mut foldings = Vec::new();
    while let Some(folding) = next_folding(program) {
        tracing::debug!(%folding, "fold");
        program.splice_one(folding.at, folding.at + 3, Cell::Int(folding.result));
        foldings.push(folding);
    }
    foldings
}

fn next_folding(program: &Program) -> Option<Folding> {
    program.cells().windows(3).enumerate().find_map(|(at, window)| {
        let (lhs, rhs, op) = match window {
            [Cell::Int(a), Cell::Int(b), Cell::Op(op)] if op.is_foldable() => (*a, *b, *op),
            _ => return None,
        };
        match evaluate(lhs, rhs, op) {
            Ok(result) => Some(Folding { at, lhs, op, rhs, result }),
            Err(e) => {
                tracing::debug!(at, error = %e, "window left unfolded");
                None
            }
        }
    })
}

/// Run `lhs rhs op` on a scratch machine with no input and discarded output.
fn evaluate(lhs: i64, rhs: i64, op: Op) -> VmResult<i64> {
    let window = Program::from(vec![Cell::Int(lhs), Cell::Int(rhs), Cell::Op(op)]);
    let mut input = io::empty();
    let mut output = io::sink();
    let mut machine = Machine::new(window, &mut input, &mut output);
    machine.run()?;
    match machine.pop()? {
        Value::Integer(n) => Ok(n),
        other => Err(VmError::TypeError(format!("folded to {}", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parse;
    use crate::program;
    use crate::vm::Halt;

    #[test]
    fn fold_single_addition() {
        assert_eq!(fold(program![2, 3, "+"]), program![5]);
    }

    #[test]
    fn fold_each_foldable_operator() {
        assert_eq!(fold(program![9, 4, "-"]), program![5]);
        assert_eq!(fold(program![9, 4, "*"]), program![36]);
        assert_eq!(fold(program![9, 4, "/"]), program![2]);
        assert_eq!(fold(program![-9, 4, "/"]), program![-2]);
    }

    #[test]
    fn fold_reports_steps_in_order() {
        let mut p = parse("2 3 + 4 * println").unwrap();
        let steps = fold_in_place(&mut p);
        assert_eq!(p, program![20, "println"]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].to_string(), "Constant-folded (2 + 3) to 5");
        assert_eq!(steps[1].to_string(), "Constant-folded (5 * 4) to 20");
    }

    #[test]
    fn fold_intermediate_state() {
        // One step of the pass on its own: the first window only.
        let mut p = program![2, 3, "+", 4, "*", "println"];
        let first = next_folding(&p).unwrap();
        p.splice_one(first.at, first.at + 3, Cell::Int(first.result));
        assert_eq!(p, program![5, 4, "*", "println"]);
    }

    #[test]
    fn fold_is_idempotent() {
        let sources = [
            "2 3 + 4 * println",
            "1 2 3 * + 4 5 * -",
            r#""a" 1 2 + swap print println"#,
            "7 2 % 1 0 / 3 4 +",
            "dup * 2 + foo",
            "",
        ];
        for source in sources {
            let once = fold(parse(source).unwrap());
            let twice = fold(once.clone());
            assert_eq!(once, twice, "not idempotent for {:?}", source);
        }
    }

    #[test]
    fn fold_nested_windows() {
        assert_eq!(fold(parse("1 2 3 * +").unwrap()), program![7]);
    }

    #[test]
    fn fold_leaves_other_ops_alone() {
        let p = program![7, 2, "%", 3, 3, "==", 1, "dup", "+"];
        assert_eq!(fold(p.clone()), p);
    }

    #[test]
    fn fold_skips_failing_window() {
        let p = program![1, 0, "/", 2, 3, "+"];
        let mut folded = p.clone();
        let steps = fold_in_place(&mut folded);
        assert_eq!(folded, program![1, 0, "/", 5]);
        assert_eq!(steps.len(), 1);

        let overflow = program![i64::MAX, 1, "+"];
        assert_eq!(fold(overflow.clone()), overflow);
    }

    #[test]
    fn fold_preserves_results() {
        let source = "2 3 + 5 * 10 4 - *";
        let original = parse(source).unwrap();
        let folded = fold(original.clone());
        assert_eq!(folded, program![150]);

        let stack_of = |p: Program| {
            let mut input = io::empty();
            let mut output = io::sink();
            let mut m = Machine::new(p, &mut input, &mut output);
            m.run().unwrap();
            m.data_stack().clone()
        };
        assert_eq!(stack_of(original), stack_of(folded));
    }

    #[test]
    fn fold_span_covers_window() {
        let p = fold(parse("x 2 3 +").unwrap());
        assert_eq!(p.span(1), crate::program::Span { start: 2, end: 7 });
    }

    // Known limitation: folding shifts cells without rebasing absolute jump
    // targets, so a jump that was valid before folding can break after it.
    #[test]
    fn fold_does_not_rebase_jump_targets() {
        let source = r#"6 jmp 2 3 + println "end" println"#;
        let run = |p: Program| {
            let mut input = io::empty();
            let mut output = Vec::new();
            let result = Machine::new(p, &mut input, &mut output).run();
            (result, String::from_utf8(output).unwrap())
        };

        let (result, out) = run(parse(source).unwrap());
        assert_eq!(result.unwrap(), Halt::Completed);
        assert_eq!(out, "end\n");

        let folded = fold(parse(source).unwrap());
        assert_eq!(folded.len(), 6);
        let (result, _) = run(folded);
        assert!(matches!(result, Err(VmError::InvalidJumpTarget { .. })));
    }
}
