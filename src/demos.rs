//! Sample programs and the optimizer self-check.

use std::io::{self, BufRead, Write};

use crate::lexer::{self, LexError};
use crate::optimizer;
use crate::program::Program;
use crate::vm::{Halt, Machine, Stack, VmResult};

pub struct Demo {
    pub title: &'static str,
    pub source: &'static str,
}

impl Demo {
    pub fn program(&self) -> Result<Program, LexError> {
        lexer::parse(self.source)
    }
}

pub const DEMOS: &[Demo] = &[
    Demo {
        title: "Program 1: Runs the code for `print((2+3)*4)`",
        source: "2 3 + 4 * println",
    },
    Demo {
        title: "Program 2: Ask for numbers, computes sum and product.",
        source: r#""Enter a number: " print read cast_int
"Enter another number: " print read cast_int
over over
"Their sum is: " print + println
"Their product is: " print * println"#,
    },
    Demo {
        title: "Program 3: Shows branching and looping (end input to stop).",
        source: r#""Enter a number: " print read cast_int
"The number " print dup print " is " print
2 % 0 == "even." "odd." if println
0 jmp"#,
    },
];

/// Run every demo in order, sharing the given streams.
pub fn run_all(input: &mut dyn BufRead, output: &mut dyn Write) -> crate::Result<()> {
    for (i, demo) in DEMOS.iter().enumerate() {
        if i > 0 {
            writeln!(output)?;
        }
        writeln!(output, "** {}", demo.title)?;
        let program = demo.program()?;
        if Machine::new(program, input, output).run()? == Halt::EndOfInput {
            writeln!(output)?;
        }
    }
    Ok(())
}

pub const DEFAULT_CHECK_SOURCE: &str = "2 3 + 5 * println";

/// Fold `program`, run both versions, and compare the final data stacks.
///
/// Both runs get empty input. Returns whether the stacks matched.
pub fn check_folding(program: Program, output: &mut dyn Write) -> VmResult<bool> {
    writeln!(output, "Code before optimization: {}", program)?;
    let mut optimized = program.clone();
    for folding in optimizer::fold_in_place(&mut optimized) {
        writeln!(output, "{}", folding)?;
    }
    writeln!(output, "Code after optimization: {}", optimized)?;

    writeln!(output, "Stack after running original program:")?;
    let before = run_and_dump(program, output)?;
    writeln!(output, "Stack after running optimized program:")?;
    let after = run_and_dump(optimized, output)?;

    let ok = before == after;
    writeln!(output, "Result: {}", if ok { "OK" } else { "FAIL" })?;
    Ok(ok)
}

fn run_and_dump(program: Program, output: &mut dyn Write) -> VmResult<Stack> {
    let mut input = io::empty();
    let mut machine = Machine::new(program, &mut input, output);
    machine.run()?;
    machine.dump_stack()?;
    Ok(machine.data_stack().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demos_parse() {
        for demo in DEMOS {
            assert!(demo.program().is_ok(), "{} failed to parse", demo.title);
        }
    }

    #[test]
    fn run_all_with_scripted_input() {
        let mut input: &[u8] = b"3\n4\n7\n10\n";
        let mut output = Vec::new();
        run_all(&mut input, &mut output).unwrap();
        let out = String::from_utf8(output).unwrap();
        assert!(out.starts_with("** Program 1"), "got:\n{out}");
        assert!(out.contains("20\n"), "got:\n{out}");
        assert!(out.contains("Their sum is: 7\n"), "got:\n{out}");
        assert!(out.contains("Their product is: 12\n"), "got:\n{out}");
        assert!(out.contains("The number 7 is odd.\n"), "got:\n{out}");
        assert!(out.contains("The number 10 is even.\n"), "got:\n{out}");
        assert!(out.ends_with("Enter a number: \n"), "got:\n{out}");
    }

    #[test]
    fn check_default_program() {
        let mut output = Vec::new();
        let program = lexer::parse(DEFAULT_CHECK_SOURCE).unwrap();
        assert!(check_folding(program, &mut output).unwrap());
        let out = String::from_utf8(output).unwrap();
        assert!(out.contains("Code before optimization: [2, 3, +, 5, *, println]"), "got:\n{out}");
        assert!(out.contains("Code after optimization: [25, println]"), "got:\n{out}");
        assert!(out.ends_with("Result: OK\n"), "got:\n{out}");
    }

    #[test]
    fn check_reports_stack_contents() {
        let mut output = Vec::new();
        let program = lexer::parse("10 4 - 2 *").unwrap();
        assert!(check_folding(program, &mut output).unwrap());
        let out = String::from_utf8(output).unwrap();
        assert_eq!(out.matches(" - integer 12").count(), 2, "got:\n{out}");
    }

    #[test]
    fn check_detects_jump_breakage() {
        let mut output = Vec::new();
        let program = lexer::parse(r#"6 jmp 2 3 + println "end" println"#).unwrap();
        assert!(check_folding(program, &mut output).is_err());
    }
}
