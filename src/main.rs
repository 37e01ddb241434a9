use std::io::{self, BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use stackvm::diagnostic::{Diagnostic, DiagnosticFormat};
use stackvm::repl::{ReplConfig, Session};
use stackvm::{Cell, Halt, Machine, Op, Program, demos, interrupt, lexer, logging, optimizer};

#[derive(Parser, Debug)]
#[command(name = "stackvm", version)]
#[command(about = "A tiny stack machine with a constant-folding optimizer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Print diagnostics as JSON, one object per line
    #[arg(long, global = true)]
    json: bool,

    /// Never colour diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    /// Log more to stderr (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the interactive loop (the default)
    Repl(ReplArgs),

    /// Run a program file as one program; stdin feeds `read`
    Run {
        path: PathBuf,

        /// Constant-fold before running. Breaks absolute jumps past a folded window.
        #[arg(long)]
        fold: bool,
    },

    /// Run the sample programs
    Demo,

    /// Fold a program, run both versions, and compare their final stacks
    Check {
        /// Program text
        #[arg(default_value = demos::DEFAULT_CHECK_SOURCE)]
        source: String,
    },

    /// Print the tokenized program as JSON
    Parse {
        /// Program text
        source: String,

        /// Constant-fold before printing
        #[arg(long)]
        fold: bool,
    },
}

#[derive(Args, Debug)]
struct ReplArgs {
    /// Execute lines exactly as typed
    #[arg(long)]
    no_fold: bool,

    /// No banner and no folding report
    #[arg(short, long)]
    quiet: bool,

    #[arg(long, default_value = "> ")]
    prompt: String,
}

impl Default for ReplArgs {
    fn default() -> Self {
        ReplArgs { no_fold: false, quiet: false, prompt: "> ".to_string() }
    }
}

struct Reporter {
    json: bool,
    no_color: bool,
}

impl Reporter {
    fn format_for(&self, is_terminal: bool) -> DiagnosticFormat {
        if self.json {
            DiagnosticFormat::Json
        } else {
            DiagnosticFormat::Text { use_color: is_terminal && !self.no_color }
        }
    }

    /// Diagnostics outside the REPL go to stderr.
    fn emit(&self, d: &Diagnostic) {
        let rendered = self.format_for(io::stderr().is_terminal()).render(d);
        eprint!("{}", rendered);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let reporter = Reporter { json: cli.json, no_color: cli.no_color };
    let result = match cli.command.unwrap_or(Command::Repl(ReplArgs::default())) {
        Command::Repl(args) => repl(args, &reporter),
        Command::Run { path, fold } => run_file(&path, fold, &reporter),
        Command::Demo => demo(),
        Command::Check { source } => check(&source, &reporter),
        Command::Parse { source, fold } => parse(&source, fold, &reporter),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn repl(args: ReplArgs, reporter: &Reporter) -> stackvm::Result<ExitCode> {
    let config = ReplConfig {
        fold: !args.no_fold,
        quiet: args.quiet,
        prompt: args.prompt,
        diagnostics: reporter.format_for(io::stdout().is_terminal()),
    };
    let flag = interrupt::install();
    let input = BufReader::new(interrupt::Interruptible::new(io::stdin().lock(), flag));
    let mut session = Session::new(input, io::stdout(), config).with_interrupt(flag);
    let end = session.run()?;
    tracing::debug!(?end, "session over");
    Ok(ExitCode::SUCCESS)
}

fn parse_or_report(source: &str, reporter: &Reporter) -> Option<Program> {
    match lexer::parse(source) {
        Ok(program) => Some(program),
        Err(e) => {
            reporter.emit(&Diagnostic::from(&e).with_source(source));
            None
        }
    }
}

fn uses_absolute_jumps(program: &Program) -> bool {
    program
        .cells()
        .iter()
        .any(|c| matches!(c, Cell::Op(Op::Jmp | Op::Call | Op::Return)))
}

fn run_file(path: &Path, fold: bool, reporter: &Reporter) -> stackvm::Result<ExitCode> {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let Some(mut program) = parse_or_report(&source, reporter) else {
        return Ok(ExitCode::FAILURE);
    };

    if fold {
        if uses_absolute_jumps(&program) {
            reporter.emit(
                &Diagnostic::warning("constant folding does not adjust jump targets")
                    .with_code("SVM-W001")
                    .with_note("addresses after a folded window shift left by two per fold"),
            );
        }
        for folding in optimizer::fold_in_place(&mut program) {
            eprintln!("{}", folding);
        }
    }

    let flag = interrupt::install();
    let mut input = BufReader::new(interrupt::Interruptible::new(io::stdin().lock(), flag));
    let mut output = io::stdout().lock();
    let _guard = interrupt::running();
    let mut machine = Machine::new(program, &mut input, &mut output).with_interrupt(flag);
    match machine.run() {
        Ok(Halt::Interrupted) => {
            eprintln!("interrupted");
            Ok(ExitCode::from(130))
        }
        Ok(halt) => {
            tracing::debug!(?halt, "program finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let d = Diagnostic::runtime(&e, machine.program(), machine.ip()).with_source(source.as_str());
            reporter.emit(&d);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn demo() -> stackvm::Result<ExitCode> {
    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();
    demos::run_all(&mut input, &mut output)?;
    output.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn check(source: &str, reporter: &Reporter) -> stackvm::Result<ExitCode> {
    let Some(program) = parse_or_report(source, reporter) else {
        return Ok(ExitCode::FAILURE);
    };
    let mut output = io::stdout().lock();
    match demos::check_folding(program, &mut output) {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            output.flush()?;
            reporter.emit(&Diagnostic::from(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn parse(source: &str, fold: bool, reporter: &Reporter) -> stackvm::Result<ExitCode> {
    let Some(mut program) = parse_or_report(source, reporter) else {
        return Ok(ExitCode::FAILURE);
    };
    if fold {
        optimizer::fold_in_place(&mut program);
    }
    let json = serde_json::to_string_pretty(&program).map_err(io::Error::other)?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}
