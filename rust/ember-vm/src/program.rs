//! EIR program loading: line scanning, opcode decode, and the label pre-pass.
//!
//! The textual format is one instruction per line: a mnemonic, optionally
//! followed by a single space and the remainder of the line as a verbatim
//! argument (interior spaces are preserved, which string literals and format
//! templates rely on). Blank lines are skipped.

use std::str::FromStr;
use thiserror::Error;

/// Maximum number of label definitions.
pub const MAX_LABELS: usize = 100;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown opcode '{mnemonic}' on line {line}")]
    UnknownOpcode { mnemonic: String, line: usize },
    #[error("too many labels (limit {0})")]
    TooManyLabels(usize),
}

/// Instruction mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Label,
    Push,
    Store,
    Load,
    Print,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Lt,
    Jump,
    Jzero,
    Call,
    Get,
    Set,
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Label => "LABEL",
            Op::Push => "PUSH",
            Op::Store => "STORE",
            Op::Load => "LOAD",
            Op::Print => "PRINT",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Eq => "EQ",
            Op::Lt => "LT",
            Op::Jump => "JUMP",
            Op::Jzero => "JZERO",
            Op::Call => "CALL",
            Op::Get => "GET",
            Op::Set => "SET",
        }
    }
}

impl FromStr for Op {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "LABEL" => Op::Label,
            "PUSH" => Op::Push,
            "STORE" => Op::Store,
            "LOAD" => Op::Load,
            "PRINT" => Op::Print,
            "ADD" => Op::Add,
            "SUB" => Op::Sub,
            "MUL" => Op::Mul,
            "DIV" => Op::Div,
            "MOD" => Op::Mod,
            "EQ" => Op::Eq,
            "LT" => Op::Lt,
            "JUMP" => Op::Jump,
            "JZERO" => Op::Jzero,
            "CALL" => Op::Call,
            "GET" => Op::Get,
            "SET" => Op::Set,
            _ => return Err(()),
        })
    }
}

/// One decoded instruction: the opcode plus the rest of the line verbatim.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: Op,
    pub arg: String,
}

/// An immutable instruction sequence with its label table.
#[derive(Debug)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: Vec<(String, usize)>,
}

impl Program {
    /// Two-pass load: this pass scans lines into instructions and registers
    /// label definitions; execution is the second pass.
    pub fn parse(source: &str) -> Result<Self, LoadError> {
        let mut instructions = Vec::new();
        let mut labels: Vec<(String, usize)> = Vec::new();

        for (index, raw) in source.lines().enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() {
                continue;
            }
            let (mnemonic, arg) = match line.split_once(' ') {
                Some((m, rest)) => (m, rest.to_string()),
                None => (line, String::new()),
            };
            let op = mnemonic.parse::<Op>().map_err(|_| LoadError::UnknownOpcode {
                mnemonic: mnemonic.to_string(),
                line: index + 1,
            })?;
            if op == Op::Label && !labels.iter().any(|(n, _)| n == &arg) {
                // First definition wins; a duplicate never shadows it.
                if labels.len() >= MAX_LABELS {
                    return Err(LoadError::TooManyLabels(MAX_LABELS));
                }
                labels.push((arg.clone(), instructions.len()));
            }
            instructions.push(Instruction { op, arg });
        }

        Ok(Self {
            instructions,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, ip: usize) -> Option<&Instruction> {
        self.instructions.get(ip)
    }

    pub fn label_target(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, target)| *target)
    }

    pub fn labels(&self) -> &[(String, usize)] {
        &self.labels
    }
}
