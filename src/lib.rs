//! An optimizing Brainfuck interpreter and Cranelift JIT compiler.
//!
//! The pipeline: [`sanitize`] strips everything but the eight instruction
//! bytes, [`ir::assemble`] folds runs and recognizes loop shapes into a
//! [`ir::Program`], and either [`interpreter::Interpreter`] walks that
//! program directly or [`jit::Jit`] compiles the raw sanitized source to
//! native code via Cranelift.

pub mod error;
pub mod interpreter;
pub mod io;
pub mod ir;
pub mod jit;
pub mod sanitize;
pub mod tape;

pub use error::{BfError, Result};

/// Assembles and interprets `source` against `input`, returning whatever
/// was written to `output`.
pub fn interpret<I: io::Input, O: io::Output>(source: &str, input: I, output: O) -> Result<O> {
    let program = ir::assemble(source)?;
    let mut interp = interpreter::Interpreter::new(input, output);
    interp.run(&program);
    Ok(interp.into_output())
}

/// Compiles `source` with the Cranelift JIT back-end and runs it to
/// completion, reading/writing process stdin/stdout directly.
pub fn jit_run(source: &str, opt_level: jit::OptLevel) -> Result<()> {
    let mut jit = jit::Jit::new(opt_level)?;
    jit.compile_and_run(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferedInput, BufferedOutput};

    #[test]
    fn interpret_round_trips_hello_world() {
        let src = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        let out = interpret(src, BufferedInput::empty(), BufferedOutput::default()).unwrap();
        assert_eq!(out.into_string(), "Hello World!\n");
    }

    #[test]
    fn interpret_surfaces_unmatched_bracket_errors() {
        let err = interpret("[+", BufferedInput::empty(), BufferedOutput::default()).unwrap_err();
        assert!(matches!(err, BfError::UnmatchedOpen { count: 1 }));
    }

    #[test]
    fn fixture_hello_matches_inline_copy() {
        let src = include_str!("../fixtures/hello.bf");
        let out = interpret(src, BufferedInput::empty(), BufferedOutput::default()).unwrap();
        assert_eq!(out.into_string(), "Hello World!\n");
    }

    #[test]
    fn fixture_copy_multiply_matches_inline_copy() {
        let src = include_str!("../fixtures/copy_multiply.bf");
        let out = interpret(src, BufferedInput::empty(), BufferedOutput::default()).unwrap();
        assert_eq!(out.into_string(), "\u{6}\u{9}");
    }
}
