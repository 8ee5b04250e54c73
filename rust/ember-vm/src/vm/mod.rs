//! Stack VM dispatch loop for executing EIR programs.

mod intrinsics;
mod ops;

use crate::env::Globals;
use crate::program::{Instruction, Op, Program};
use crate::stack::OperandStack;
use crate::values::Value;
use ops::BinaryOp;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("variable table full")]
    VariableTableFull,
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("type error: {0}")]
    TypeError(String),
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("malformed call target: {0}")]
    MalformedCall(String),
    #[error("method '{method}' expects {expected} arguments, got {got}")]
    ArityMismatch {
        method: String,
        expected: String,
        got: usize,
    },
}

/// Dispatcher state. `Halted` is the normal fallthrough past the last
/// instruction; `Aborted` is terminal with no resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Halted,
    Aborted,
}

/// Execution events delivered to an installed trace sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// One fetched instruction: pointer, mnemonic, raw argument.
    Step { ip: usize, op: String, arg: String },
}

/// Type alias for the trace callback to simplify signatures.
pub type TraceSink = Box<dyn FnMut(&TraceEvent)>;

/// The Ember stack VM: program, operand stack, global table, and the
/// instruction pointer, owned together so no state hides in statics.
pub struct Vm {
    program: Program,
    stack: OperandStack,
    globals: Globals,
    ip: usize,
    state: VmState,
    /// Captured PRINT output (for testing and tracing).
    pub output: Vec<String>,
    trace_sink: Option<TraceSink>,
}

impl Vm {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            stack: OperandStack::new(),
            globals: Globals::new(),
            ip: 0,
            state: VmState::Running,
            output: Vec::new(),
            trace_sink: None,
        }
    }

    /// Binds the `sys` dict that generated programs expect: `argv` holding
    /// the program name plus the optional script argument, and a stderr
    /// placeholder entry.
    pub fn inject_sys(
        &mut self,
        program_name: &str,
        script_arg: Option<&str>,
    ) -> Result<(), VmError> {
        let mut argv = vec![Value::Str(program_name.to_string())];
        if let Some(arg) = script_arg {
            argv.push(Value::Str(arg.to_string()));
        }
        let sys = Value::new_dict();
        if let Value::Dict(d) = &sys {
            let mut d = d.borrow_mut();
            d.insert("argv".to_string(), Value::new_list(argv));
            d.insert("stderr".to_string(), Value::Str("<stderr>".to_string()));
        }
        self.globals.set("sys", sys)
    }

    pub fn set_trace_sink(&mut self, sink: TraceSink) {
        self.trace_sink = Some(sink);
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// Current value of a global (reads through auto-vivification).
    pub fn global(&mut self, name: &str) -> Result<Value, VmError> {
        self.globals.get(name)
    }

    /// Runs to fallthrough past the last instruction. Any error is terminal:
    /// the VM is left `Aborted` and must not be resumed.
    pub fn run(&mut self) -> Result<(), VmError> {
        match self.run_loop() {
            Ok(()) => {
                self.state = VmState::Halted;
                Ok(())
            }
            Err(err) => {
                self.state = VmState::Aborted;
                Err(err)
            }
        }
    }

    fn run_loop(&mut self) -> Result<(), VmError> {
        while self.ip < self.program.len() {
            let Some(instr) = self.program.instruction(self.ip).cloned() else {
                break;
            };
            if let Some(sink) = self.trace_sink.as_mut() {
                sink(&TraceEvent::Step {
                    ip: self.ip,
                    op: instr.op.mnemonic().to_string(),
                    arg: instr.arg.clone(),
                });
            }
            // Fall through to the next instruction unless a handler jumps.
            self.ip += 1;
            self.execute(&instr)?;
        }
        Ok(())
    }

    fn execute(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let arg = instr.arg.as_str();
        match instr.op {
            // Resolved during the load pre-pass.
            Op::Label => {}

            Op::Push => self.stack.push(Value::from_literal(arg))?,

            Op::Store => {
                let value = self.stack.pop()?;
                self.globals.set(arg, value)?;
            }

            Op::Load => {
                let value = self.globals.get(arg)?;
                self.stack.push(value)?;
            }

            Op::Print => {
                let text = self.stack.pop()?.render();
                println!("{}", text);
                self.output.push(text);
            }

            Op::Add => self.binary(BinaryOp::Add)?,
            Op::Sub => self.binary(BinaryOp::Sub)?,
            Op::Mul => self.binary(BinaryOp::Mul)?,
            Op::Div => self.binary(BinaryOp::Div)?,
            Op::Mod => self.binary(BinaryOp::Mod)?,
            Op::Eq => self.binary(BinaryOp::Eq)?,
            Op::Lt => self.binary(BinaryOp::Lt)?,

            Op::Jump => self.ip = self.label_target(arg)?,

            Op::Jzero => {
                let value = self.stack.pop()?;
                // Only an integer zero takes the branch; every other value
                // falls through.
                if matches!(value, Value::Int(0)) {
                    self.ip = self.label_target(arg)?;
                }
            }

            Op::Call => self.call_builtin(arg)?,

            Op::Get => {
                let key = self.stack.pop()?;
                let container = self.stack.pop()?;
                let result = self.container_get(container, key)?;
                self.stack.push(result)?;
            }

            Op::Set => {
                let value = self.stack.pop()?;
                let key = self.stack.pop()?;
                let container = self.stack.pop()?;
                if let Value::Dict(d) = container {
                    // Mutates the shared handle: visible through all aliases.
                    d.borrow_mut().insert(key.render(), value);
                }
                // List and scalar targets are deliberately left untouched.
            }
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp) -> Result<(), VmError> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;
        let result = ops::binary_op(op, left, right)?;
        self.stack.push(result)
    }

    fn container_get(&self, container: Value, key: Value) -> Result<Value, VmError> {
        match container {
            Value::Dict(d) => {
                let key_text = key.render();
                match d.borrow().get(&key_text) {
                    Some(value) => Ok(value.clone()),
                    // A miss echoes the key back rather than failing.
                    None => Ok(Value::Str(key_text)),
                }
            }
            Value::List(l) => {
                let Some(index) = key.as_int() else {
                    return Err(VmError::TypeError(format!(
                        "list index must be an int, got {}",
                        key.type_name()
                    )));
                };
                let items = l.borrow();
                let len = items.len();
                if index < 0 || index as usize >= len {
                    return Err(VmError::IndexOutOfBounds { index, len });
                }
                Ok(items[index as usize].clone())
            }
            other => Err(VmError::TypeError(format!(
                "cannot index into {}",
                other.type_name()
            ))),
        }
    }

    fn label_target(&self, name: &str) -> Result<usize, VmError> {
        self.program
            .label_target(name)
            .ok_or_else(|| VmError::UndefinedLabel(name.to_string()))
    }
}
