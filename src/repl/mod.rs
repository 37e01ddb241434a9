use std::io::{self, BufRead, Write};
use std::sync::atomic::AtomicBool;

use crate::diagnostic::{Diagnostic, DiagnosticFormat};
use crate::vm::{Halt, Machine};
use crate::{interrupt, lexer, optimizer};

/// Settings for an interactive session.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Run the constant folder over every line before executing it.
    pub fold: bool,
    /// Suppress the banner and the folding report.
    pub quiet: bool,
    pub prompt: String,
    pub diagnostics: DiagnosticFormat,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            fold: true,
            quiet: false,
            prompt: "> ".to_string(),
            diagnostics: DiagnosticFormat::Text { use_color: false },
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    EndOfStream,
    Exit,
}

/// Read-tokenize-fold-execute loop over a pair of streams.
///
/// Each line runs in a fresh machine that borrows the session's streams,
/// so `read` consumes the lines that follow the command.
pub struct Session<R, W> {
    input: R,
    output: W,
    config: ReplConfig,
    interrupt: Option<&'static AtomicBool>,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(input: R, output: W, config: ReplConfig) -> Self {
        Session { input, output, config, interrupt: None }
    }

    pub fn with_interrupt(mut self, flag: &'static AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Loop until end of input or `exit`. Only stream failures are errors.
    pub fn run(&mut self) -> io::Result<SessionEnd> {
        if !self.config.quiet {
            writeln!(self.output, "Type \"exit\" to quit.")?;
        }
        loop {
            if !self.config.prompt.is_empty() {
                write!(self.output, "{}", self.config.prompt)?;
            }
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                tracing::debug!("input closed, ending session");
                return Ok(SessionEnd::EndOfStream);
            }
            if self.eval_line(&line)? == Some(SessionEnd::Exit) {
                tracing::debug!("exit requested, ending session");
                return Ok(SessionEnd::Exit);
            }
        }
    }

    /// Tokenize, fold, and execute one line. Errors are reported, not returned.
    pub fn eval_line(&mut self, line: &str) -> io::Result<Option<SessionEnd>> {
        let source = line.trim_end_matches(['\n', '\r']);
        if source.trim().is_empty() {
            return Ok(None);
        }

        let mut program = match lexer::parse(source) {
            Ok(program) => program,
            Err(e) => {
                tracing::debug!(error = %e, "line rejected");
                self.report(&Diagnostic::from(&e).with_source(source))?;
                return Ok(None);
            }
        };

        if self.config.fold {
            for folding in optimizer::fold_in_place(&mut program) {
                if !self.config.quiet {
                    writeln!(self.output, "{}", folding)?;
                }
            }
        }

        let (result, ip, program) = {
            let _guard = self.interrupt.map(|_| interrupt::running());
            let mut machine = Machine::new(program, &mut self.input, &mut self.output);
            if let Some(flag) = self.interrupt {
                machine = machine.with_interrupt(flag);
            }
            let result = machine.run();
            let ip = machine.ip();
            (result, ip, machine.into_program())
        };

        match result {
            Ok(Halt::Completed) | Ok(Halt::EndOfInput) => Ok(None),
            Ok(Halt::Interrupted) => {
                writeln!(self.output, "\ninterrupted")?;
                Ok(None)
            }
            Ok(Halt::Exit) => Ok(Some(SessionEnd::Exit)),
            Err(e) => {
                self.report(&Diagnostic::runtime(&e, &program, ip).with_source(source))?;
                Ok(None)
            }
        }
    }

    fn report(&mut self, d: &Diagnostic) -> io::Result<()> {
        let rendered = self.config.diagnostics.render(d);
        self.output.write_all(rendered.as_bytes())?;
        self.output.flush()
    }
}
