use std::cmp::Ordering;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::interrupt;
use crate::program::{Cell, Op, Program, Value};

pub mod stack;
pub use stack::Stack;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("unknown opcode: '{name}'")]
    UnknownOpcode { name: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow: {lhs} {op} {rhs}")]
    IntegerOverflow { op: Op, lhs: i64, rhs: i64 },
    #[error("type error: {0}")]
    TypeError(String),
    #[error("invalid jump target: {target} (program has {len} cells)")]
    InvalidJumpTarget { target: Value, len: usize },
    #[error("end of input")]
    EndOfInput,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VmResult<T> = Result<T, VmError>;

/// How a `run()` ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The instruction pointer reached the end of the program.
    Completed,
    /// `read` hit end of input.
    EndOfInput,
    /// The interrupt flag was raised.
    Interrupted,
    /// The program executed `exit`.
    Exit,
}

/// Stack machine over a flat program.
///
/// Shares the session's input and output streams; everything else
/// (stacks, program, instruction pointer) belongs to the machine.
pub struct Machine<'io> {
    data: Stack,
    returns: Stack<usize>,
    program: Program,
    ip: usize,
    input: &'io mut dyn BufRead,
    output: &'io mut dyn Write,
    interrupt: Option<&'io AtomicBool>,
}

impl<'io> Machine<'io> {
    pub fn new(program: Program, input: &'io mut dyn BufRead, output: &'io mut dyn Write) -> Self {
        Machine {
            data: Stack::new(),
            returns: Stack::new(),
            program,
            ip: 0,
            input,
            output,
            interrupt: None,
        }
    }

    /// Stop at the next fetch boundary once `flag` is set. The flag is cleared when seen.
    pub fn with_interrupt(mut self, flag: &'io AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn data_stack(&self) -> &Stack {
        &self.data
    }

    pub fn return_stack(&self) -> &Stack<usize> {
        &self.returns
    }

    pub fn push(&mut self, value: Value) {
        self.data.push(value);
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.data.pop()
    }

    pub fn top(&self) -> VmResult<&Value> {
        self.data.top()
    }

    /// Move the instruction pointer back to the start. Stacks are kept.
    pub fn rewind(&mut self) {
        self.ip = 0;
    }

    /// Execute until the program ends, halts, or fails.
    ///
    /// `EndOfInput` and interrupts come back as a [`Halt`], not an error.
    /// On error the data stack keeps whatever partial state it reached.
    /// Output is flushed however the run ends.
    pub fn run(&mut self) -> VmResult<Halt> {
        let outcome = self.run_to_halt();
        let flushed = self.output.flush();
        match outcome {
            Ok(halt) => {
                flushed?;
                Ok(halt)
            }
            Err(e) => {
                tracing::debug!(ip = self.ip, error = %e, "run failed");
                Err(e)
            }
        }
    }

    fn run_to_halt(&mut self) -> VmResult<Halt> {
        loop {
            if self.take_interrupt() {
                tracing::debug!(ip = self.ip, "run interrupted");
                return Ok(Halt::Interrupted);
            }
            match self.step() {
                Ok(None) => {}
                Ok(Some(halt)) => return Ok(halt),
                Err(VmError::EndOfInput) => return Ok(Halt::EndOfInput),
                Err(VmError::Io(e)) if interrupt::is_read_interrupted(&e) => {
                    self.take_interrupt();
                    tracing::debug!(ip = self.ip, "read interrupted");
                    return Ok(Halt::Interrupted);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch, advance, and dispatch a single cell.
    ///
    /// Returns `Some(halt)` when the machine stops. Unlike [`run`](Self::run),
    /// end of input surfaces as `Err(VmError::EndOfInput)`.
    pub fn step(&mut self) -> VmResult<Option<Halt>> {
        let cell = match self.program.get(self.ip) {
            Some(cell) => cell.clone(),
            None => return Ok(Some(Halt::Completed)),
        };
        tracing::trace!(ip = self.ip, cell = %cell, "dispatch");
        self.ip += 1;
        match cell {
            Cell::Int(n) => {
                self.data.push(Value::Integer(n));
                Ok(None)
            }
            Cell::Text(s) => {
                self.data.push(Value::Text(s));
                Ok(None)
            }
            Cell::Op(op) => self.exec(op),
            Cell::Word(name) => Err(VmError::UnknownOpcode { name }),
        }
    }

    fn take_interrupt(&self) -> bool {
        self.interrupt
            .is_some_and(|flag| flag.swap(false, AtomicOrdering::SeqCst))
    }

    fn exec(&mut self, op: Op) -> VmResult<Option<Halt>> {
        match op {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                let b = self.data.pop()?;
                let a = self.data.pop()?;
                self.data.push(arithmetic(op, a, b)?);
            }
            Op::Eq | Op::Ne => {
                let b = self.data.pop()?;
                let a = self.data.pop()?;
                let equal = a == b;
                self.data.push(Value::from_bool(if op == Op::Eq { equal } else { !equal }));
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                let b = self.data.pop()?;
                let a = self.data.pop()?;
                let ord = compare(op, &a, &b)?;
                let result = match op {
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                    Op::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                self.data.push(Value::from_bool(result));
            }
            Op::Dup => {
                let v = self.data.top()?.clone();
                self.data.push(v);
            }
            Op::Drop => {
                self.data.pop()?;
            }
            Op::Swap => {
                let b = self.data.pop()?;
                let a = self.data.pop()?;
                self.data.push(b);
                self.data.push(a);
            }
            Op::Over => {
                let b = self.data.pop()?;
                let a = self.data.pop()?;
                self.data.push(a.clone());
                self.data.push(b);
                self.data.push(a);
            }
            Op::Print => {
                let v = self.data.pop()?;
                write!(self.output, "{}", v)?;
                self.output.flush()?;
            }
            Op::Println => {
                let v = self.data.pop()?;
                writeln!(self.output, "{}", v)?;
                self.output.flush()?;
            }
            Op::Read => {
                let line = self.read_line()?;
                self.data.push(Value::Text(line));
            }
            Op::CastInt => {
                let v = self.data.pop()?;
                self.data.push(cast_int(v)?);
            }
            Op::CastStr => {
                let v = self.data.pop()?;
                self.data.push(Value::Text(v.to_string()));
            }
            Op::Jmp => {
                let target = self.data.pop()?;
                self.ip = self.jump_target(target)?;
            }
            Op::If => {
                let false_value = self.data.pop()?;
                let true_value = self.data.pop()?;
                let test = self.data.pop()?;
                self.data.push(if test.is_truthy() { true_value } else { false_value });
            }
            Op::Stack => self.dump_stack()?,
            Op::Exit => return Ok(Some(Halt::Exit)),
            Op::Call => {
                let target = self.data.pop()?;
                let addr = self.jump_target(target)?;
                self.returns.push(self.ip);
                self.ip = addr;
            }
            Op::Return => {
                self.ip = self.returns.pop()?;
            }
        }
        Ok(None)
    }

    fn jump_target(&self, target: Value) -> VmResult<usize> {
        let len = self.program.len();
        match target {
            Value::Integer(n) if n >= 0 && (n as u64) < len as u64 => Ok(n as usize),
            other => Err(VmError::InvalidJumpTarget { target: other, len }),
        }
    }

    fn read_line(&mut self) -> VmResult<String> {
        // Make any pending prompt visible before blocking
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(VmError::EndOfInput);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }

    /// Write the data stack to the output, top first. Same as the `stack` operator.
    pub fn dump_stack(&mut self) -> VmResult<()> {
        writeln!(self.output, "Data stack (top first):")?;
        for v in self.data.iter_top_first() {
            match v {
                Value::Integer(n) => writeln!(self.output, " - integer {}", n)?,
                Value::Text(s) => writeln!(self.output, " - text '{}'", s)?,
            }
        }
        self.output.flush()?;
        Ok(())
    }
}

fn arithmetic(op: Op, a: Value, b: Value) -> VmResult<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => {
            if matches!(op, Op::Div | Op::Mod) && y == 0 {
                return Err(VmError::DivisionByZero);
            }
            let result = match op {
                Op::Add => x.checked_add(y),
                Op::Sub => x.checked_sub(y),
                Op::Mul => x.checked_mul(y),
                Op::Div => x.checked_div(y),
                _ => x.checked_rem(y),
            };
            result
                .map(Value::Integer)
                .ok_or(VmError::IntegerOverflow { op, lhs: x, rhs: y })
        }
        (Value::Text(x), Value::Text(y)) if op == Op::Add => Ok(Value::Text(x + &y)),
        (a, b) => Err(VmError::TypeError(format!(
            "cannot apply '{}' to {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare(op: Op, a: &Value, b: &Value) -> VmResult<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Ok(x.cmp(y)),
        _ => Err(VmError::TypeError(format!(
            "cannot compare {} with {} using '{}'",
            a.type_name(),
            b.type_name(),
            op
        ))),
    }
}

fn cast_int(v: Value) -> VmResult<Value> {
    match v {
        Value::Integer(n) => Ok(Value::Integer(n)),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| VmError::TypeError(format!("cannot convert '{}' to an integer", s))),
    }
}
