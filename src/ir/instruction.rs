//! The IR opcode set and its program container.

use smallvec::SmallVec;
use std::fmt;

/// How many distinct `(offset, multiplier)` pairs a copy/multiply loop can
/// hold inline before spilling to the heap. Real BF programs essentially
/// never exceed a handful of destination cells per loop.
pub const INLINE_COPY_TARGETS: usize = 4;

/// Offset/multiplier pairs accumulated by a copy/multiply-loop recognizer.
/// Stored inline for the common case instead of behind a `HashMap`.
pub type CopyTable = SmallVec<[(i32, u8); INLINE_COPY_TARGETS]>;

/// The tag of an [`Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Open,
    Close,
    In,
    Out,
    Move,
    Clear,
    Copy,
    ScanR,
    ScanL,
}

/// The opcode-specific payload of an [`Instruction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// No payload (`Clear`, `ScanR`, `ScanL`).
    None,
    /// Repeat count for `Add`/`Sub`.
    Count(u32),
    /// IR index of the matching brace, for `Open`/`Close`.
    Target(usize),
    /// Pointer delta, for `Move`.
    Delta(i32),
    /// Relative-offset-to-multiplier mapping, for `Copy`.
    Multipliers(CopyTable),
}

/// A single IR instruction.
///
/// `offset` is the tape-pointer delta to apply *before* the operation
/// executes, the result of folding runs of `<`/`>` into whatever
/// instruction follows them.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub offset: i32,
    pub arg: Arg,
}

impl Instruction {
    pub fn new(op: Op, offset: i32, arg: Arg) -> Self {
        Instruction { op, offset, arg }
    }

    pub fn add(offset: i32, count: u32) -> Self {
        Instruction::new(Op::Add, offset, Arg::Count(count))
    }

    pub fn sub(offset: i32, count: u32) -> Self {
        Instruction::new(Op::Sub, offset, Arg::Count(count))
    }

    pub fn io_in(offset: i32) -> Self {
        Instruction::new(Op::In, offset, Arg::None)
    }

    pub fn io_out(offset: i32) -> Self {
        Instruction::new(Op::Out, offset, Arg::None)
    }

    pub fn mov(delta: i32) -> Self {
        Instruction::new(Op::Move, 0, Arg::Delta(delta))
    }

    pub fn open_placeholder() -> Self {
        Instruction::new(Op::Open, 0, Arg::Target(usize::MAX))
    }

    pub fn close(offset: i32, target: usize) -> Self {
        Instruction::new(Op::Close, offset, Arg::Target(target))
    }

    pub fn clear(offset: i32) -> Self {
        Instruction::new(Op::Clear, offset, Arg::None)
    }

    pub fn scan_r(offset: i32) -> Self {
        Instruction::new(Op::ScanR, offset, Arg::None)
    }

    pub fn scan_l(offset: i32) -> Self {
        Instruction::new(Op::ScanL, offset, Arg::None)
    }

    pub fn copy(offset: i32, table: CopyTable) -> Self {
        Instruction::new(Op::Copy, offset, Arg::Multipliers(table))
    }

    /// The IR index this instruction jumps to, for `Open`/`Close`.
    pub fn target(&self) -> Option<usize> {
        match self.arg {
            Arg::Target(t) => Some(t),
            _ => None,
        }
    }

    fn op_name(&self) -> &'static str {
        match self.op {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Open => "open",
            Op::Close => "close",
            Op::In => "in",
            Op::Out => "out",
            Op::Move => "move",
            Op::Clear => "clear",
            Op::Copy => "copy",
            Op::ScanR => "scanr",
            Op::ScanL => "scanl",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Arg::None => write!(f, "{} {}", self.op_name(), self.offset),
            Arg::Count(n) => write!(f, "{} {} {n}", self.op_name(), self.offset),
            Arg::Target(t) => write!(f, "{} {} ->{t}", self.op_name(), self.offset),
            Arg::Delta(d) => write!(f, "{} {d}", self.op_name()),
            Arg::Multipliers(table) => {
                write!(f, "{} {} {{", self.op_name(), self.offset)?;
                for (i, (off, mul)) in table.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{off}:{mul}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The assembled, optimized IR program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{i:>5}: {instr}")?;
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for Program {
    type Output = Instruction;
    fn index(&self, idx: usize) -> &Instruction {
        &self.instructions[idx]
    }
}

impl std::ops::IndexMut<usize> for Program {
    fn index_mut(&mut self, idx: usize) -> &mut Instruction {
        &mut self.instructions[idx]
    }
}
