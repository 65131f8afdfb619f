//! Run-length scanner (C2) and IR assembler (C4).

use crate::error::{BfError, Result};
use crate::ir::instruction::{Instruction, Program};
use crate::ir::loop_shapes;
use crate::sanitize::sanitize;

/// Returns the count of consecutive occurrences of `code[i]` starting at
/// `i` (always `>= 1`, since `code[i]` itself counts). Only meaningful for
/// `+ - < >`; never called across a `[`/`]` boundary.
fn run_length(code: &[u8], i: usize) -> usize {
    let byte = code[i];
    let mut n = 1;
    while code.get(i + n) == Some(&byte) {
        n += 1;
    }
    n
}

/// Assembles sanitized-or-raw Brainfuck source into an optimized [`Program`].
pub fn assemble(source: &str) -> Result<Program> {
    let code = sanitize(source);
    let code = code.as_bytes();
    let size = code.len();

    let mut instructions: Vec<Instruction> = Vec::new();
    let mut pending_ptr: i32 = 0;
    let mut open_stack: Vec<usize> = Vec::new();

    let mut pc = 0usize;
    while pc < size {
        match code[pc] {
            b'+' => {
                let n = run_length(code, pc);
                instructions.push(Instruction::add(pending_ptr, n as u32));
                pending_ptr = 0;
                pc += n;
            }
            b'-' => {
                let n = run_length(code, pc);
                instructions.push(Instruction::sub(pending_ptr, n as u32));
                pending_ptr = 0;
                pc += n;
            }
            b'>' => {
                let n = run_length(code, pc);
                pending_ptr += n as i32;
                pc += n;
            }
            b'<' => {
                let n = run_length(code, pc);
                pending_ptr -= n as i32;
                pc += n;
            }
            b'.' => {
                instructions.push(Instruction::io_out(pending_ptr));
                pending_ptr = 0;
                pc += 1;
            }
            b',' => {
                instructions.push(Instruction::io_in(pending_ptr));
                pending_ptr = 0;
                pc += 1;
            }
            b'[' => {
                if let Some(shape) = loop_shapes::recognize(code, pc, pending_ptr) {
                    instructions.extend(shape.instructions);
                    pending_ptr = 0;
                    pc += shape.consumed;
                    continue;
                }

                // A pending drift must be materialized before the loop
                // test, since the loop's body may not execute at all and
                // the zero-test has to read the right cell.
                if pending_ptr != 0 {
                    instructions.push(Instruction::mov(pending_ptr));
                    pending_ptr = 0;
                }

                open_stack.push(instructions.len());
                instructions.push(Instruction::open_placeholder());
                pc += 1;
            }
            b']' => {
                let Some(open_idx) = open_stack.pop() else {
                    return Err(BfError::UnmatchedClose { pos: pc });
                };

                let close_idx = instructions.len();
                instructions[open_idx].arg = crate::ir::instruction::Arg::Target(close_idx);
                instructions.push(Instruction::close(pending_ptr, open_idx));
                pending_ptr = 0;
                pc += 1;
            }
            other => unreachable!("sanitize() should only emit instruction bytes, got {other:?}"),
        }
    }

    if !open_stack.is_empty() {
        return Err(BfError::UnmatchedOpen { count: open_stack.len() });
    }

    Ok(Program { instructions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::{Arg, Op};

    #[test]
    fn run_length_counts_consecutive_bytes() {
        assert_eq!(run_length(b"+++--", 0), 3);
        assert_eq!(run_length(b"+++--", 3), 2);
        assert_eq!(run_length(b"+", 0), 1);
    }

    #[test]
    fn folds_motion_into_offset() {
        let prog = assemble(">>>+").unwrap();
        assert_eq!(prog.len(), 1);
        assert_eq!(prog[0].op, Op::Add);
        assert_eq!(prog[0].offset, 3);
    }

    #[test]
    fn brace_pairing_is_well_nested() {
        let prog = assemble("[[-]]").unwrap();
        // outer open/close, inner clear
        let opens: Vec<usize> = prog
            .instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| i.op == Op::Open)
            .map(|(idx, _)| idx)
            .collect();
        for &i in &opens {
            let Arg::Target(j) = prog[i].arg else { panic!() };
            assert_eq!(prog[j].op, Op::Close);
            assert_eq!(prog[j].target(), Some(i));
        }
    }

    #[test]
    fn no_zero_arg_arithmetic_or_move_ever_emitted() {
        // A loop immediately followed by motion that cancels out should
        // never reach here as an Add/Sub/Move with arg 0 -- the sanitizer
        // and run-length scanner never produce a zero count, and Move is
        // only emitted when pending_ptr != 0.
        let prog = assemble("+>[-]<-.").unwrap();
        for instr in &prog.instructions {
            match &instr.arg {
                Arg::Count(0) => panic!("zero-arg arithmetic emitted"),
                Arg::Delta(0) => panic!("zero-arg move emitted"),
                _ => {}
            }
        }
    }

    #[test]
    fn move_emitted_before_loop_when_drift_pending() {
        let prog = assemble(">>>[-]").unwrap();
        assert_eq!(prog[0].op, Op::Move);
        match prog[0].arg {
            Arg::Delta(3) => {}
            _ => panic!("expected Delta(3)"),
        }
        assert_eq!(prog[1].op, Op::Clear);
        assert_eq!(prog[1].offset, 0);
    }

    #[test]
    fn unmatched_close_is_an_error() {
        assert!(matches!(assemble("+]"), Err(BfError::UnmatchedClose { pos: 1 })));
    }

    #[test]
    fn unmatched_open_is_an_error() {
        assert!(matches!(assemble("++["), Err(BfError::UnmatchedOpen { count: 1 })));
        assert!(matches!(assemble("[["), Err(BfError::UnmatchedOpen { count: 2 })));
    }

    #[test]
    fn clear_loop_recognized_inline() {
        let prog = assemble("+++++[-]+.").unwrap();
        assert!(prog.instructions.iter().any(|i| i.op == Op::Clear));
    }
}
