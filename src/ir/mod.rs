//! Optimized intermediate representation: instruction set, loop-shape
//! recognizer, and the single-pass assembler that ties them together.

pub mod assembler;
pub mod instruction;
pub mod loop_shapes;

pub use assembler::assemble;
pub use instruction::{Arg, CopyTable, Instruction, Op, Program};
