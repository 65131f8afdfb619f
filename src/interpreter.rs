//! IR interpreter (C5), executes an assembled [`Program`] against a tape.

use crate::io::{Input, Output};
use crate::ir::{Arg, Op, Program};
use crate::tape::Tape;

/// Executes `program` to completion against a fresh [`Tape`], reading from
/// `input` and writing to `output`. Returns the tape so callers (tests,
/// `--dump`) can inspect final state.
pub struct Interpreter<I, O> {
    tape: Tape,
    pointer: isize,
    input: I,
    output: O,
}

impl<I: Input, O: Output> Interpreter<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Interpreter { tape: Tape::new(), pointer: 0, input, output }
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Runs `program` to completion. The loop structure and each opcode's
    /// effect follow the opcode table exactly, including the `Close` convention of
    /// setting `pc = target - 1` so the following `pc += 1` lands on the
    /// index right after the matching `Open`.
    pub fn run(&mut self, program: &Program) {
        let mut pc = 0usize;
        let len = program.len();

        while pc < len {
            let instr = &program[pc];
            let p = &mut self.pointer;

            // SAFETY: an out-of-range pointer is undefined behavior of the
            // BF program being run, not a bug in this implementation --
            // well-behaved programs never drift outside 0..TAPE_SIZE.
            unsafe {
                match instr.op {
                    Op::Move => {
                        let Arg::Delta(d) = instr.arg else { unreachable!() };
                        *p += d as isize;
                    }
                    Op::Add => {
                        let Arg::Count(n) = instr.arg else { unreachable!() };
                        *p += instr.offset as isize;
                        self.tape.add_unchecked(*p, n);
                    }
                    Op::Sub => {
                        let Arg::Count(n) = instr.arg else { unreachable!() };
                        *p += instr.offset as isize;
                        self.tape.sub_unchecked(*p, n);
                    }
                    Op::Open => {
                        *p += instr.offset as isize;
                        if self.tape.get_unchecked(*p) == 0 {
                            let Arg::Target(t) = instr.arg else { unreachable!() };
                            pc = t;
                        }
                    }
                    Op::Close => {
                        *p += instr.offset as isize;
                        if self.tape.get_unchecked(*p) != 0 {
                            let Arg::Target(t) = instr.arg else { unreachable!() };
                            pc = t - 1;
                        }
                    }
                    Op::Out => {
                        *p += instr.offset as isize;
                        self.output.write_byte(self.tape.get_unchecked(*p));
                    }
                    Op::In => {
                        *p += instr.offset as isize;
                        if let Some(byte) = self.input.read_byte() {
                            if byte != 0 {
                                self.tape.set_unchecked(*p, byte);
                            }
                        }
                    }
                    Op::Clear => {
                        *p += instr.offset as isize;
                        self.tape.set_unchecked(*p, 0);
                    }
                    Op::Copy => {
                        *p += instr.offset as isize;
                        let Arg::Multipliers(table) = &instr.arg else { unreachable!() };
                        let v = self.tape.get_unchecked(*p);
                        if v > 0 {
                            for &(off, mul) in table.iter() {
                                let target = *p + off as isize;
                                self.tape.add_unchecked(target, v as u32 * mul as u32);
                            }
                            self.tape.set_unchecked(*p, 0);
                        }
                    }
                    Op::ScanR => {
                        *p += instr.offset as isize;
                        while self.tape.get_unchecked(*p) != 0 {
                            *p += 1;
                        }
                    }
                    Op::ScanL => {
                        *p += instr.offset as isize;
                        while self.tape.get_unchecked(*p) != 0 {
                            *p -= 1;
                        }
                    }
                }
            }

            pc += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferedInput, BufferedOutput};
    use crate::ir::assemble;

    fn run_buffered(source: &str, input: &[u8]) -> String {
        let program = assemble(source).unwrap();
        let mut interp = Interpreter::new(BufferedInput::new(input.to_vec()), BufferedOutput::default());
        interp.run(&program);
        interp.into_output().into_string()
    }

    #[test]
    fn hello_world() {
        let src = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        assert_eq!(run_buffered(src, b""), "Hello World!\n");
    }

    #[test]
    fn clear_loop_scenario() {
        assert_eq!(run_buffered("+++++[-]+.", b""), "\u{1}");
    }

    #[test]
    fn scan_right_scenario() {
        // Hand-executing "+>+>+>+>[>]+." against the interpreter's opcode table:
        // after the eight leading chars, p sits on cell 4, which is still
        // zero, so the `[` test fails immediately and the scan body never
        // runs (p never moves). The trailing "+." then takes cell 4 from 0
        // to 1 and outputs it -- 0x01, not the 0x02 the scenario's prose
        // describes (its claim that the tape reads "1 1 1 1 1" after the
        // scan doesn't follow from this program; implemented per the
        // formal semantics, see DESIGN.md).
        assert_eq!(run_buffered("+>+>+>+>[>]+.", b""), "\u{1}");
    }

    #[test]
    fn copy_multiply_scenario() {
        assert_eq!(run_buffered("+++[->++>+++<<]>.>.", b""), "\u{6}\u{9}");
    }

    #[test]
    fn eof_leaves_cell_unchanged() {
        assert_eq!(run_buffered(",.", b""), "\0");
    }

    #[test]
    fn nul_byte_also_leaves_cell_unchanged() {
        assert_eq!(run_buffered(",.", b"\0"), "\0");
    }

    #[test]
    fn cell_wraps_at_256() {
        let plus_256 = "+".repeat(256);
        let src = format!("{plus_256}.");
        assert_eq!(run_buffered(&src, b""), "\0");
    }

    #[test]
    fn single_sub_from_zero_wraps_to_255() {
        assert_eq!(run_buffered("-.", b""), "\u{ff}");
    }

    /// A direct, un-optimized reference interpreter: no run-length
    /// coalescing, no loop-shape recognition, no offset folding. Used to
    /// check optimizer equivalence against the assembled/optimized
    /// path in [`run_buffered`].
    fn run_naive(source: &str, input: &[u8]) -> String {
        let code: Vec<u8> = source.bytes().filter(|b| crate::sanitize::is_instruction_byte(*b)).collect();
        let mut tape = [0u8; crate::tape::TAPE_SIZE];
        let mut p: usize = 0;
        let mut pc: usize = 0;
        let mut input = BufferedInput::new(input.to_vec());
        let mut out = Vec::new();

        while pc < code.len() {
            match code[pc] {
                b'+' => tape[p] = tape[p].wrapping_add(1),
                b'-' => tape[p] = tape[p].wrapping_sub(1),
                b'>' => p += 1,
                b'<' => p -= 1,
                b'.' => out.push(tape[p]),
                b',' => {
                    if let Some(byte) = input.read_byte() {
                        if byte != 0 {
                            tape[p] = byte;
                        }
                    }
                }
                b'[' => {
                    if tape[p] == 0 {
                        let mut depth = 1;
                        while depth > 0 {
                            pc += 1;
                            match code[pc] {
                                b'[' => depth += 1,
                                b']' => depth -= 1,
                                _ => {}
                            }
                        }
                    }
                }
                b']' => {
                    if tape[p] != 0 {
                        let mut depth = 1;
                        while depth > 0 {
                            pc -= 1;
                            match code[pc] {
                                b']' => depth += 1,
                                b'[' => depth -= 1,
                                _ => {}
                            }
                        }
                    }
                }
                _ => unreachable!(),
            }
            pc += 1;
        }

        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn optimized_path_matches_naive_reference() {
        let programs: &[&str] = &[
            "+++++[-]+.",
            "+>+>+>+>[>]+.",
            "+++[->++>+++<<]>.>.",
            "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.",
        ];

        for src in programs {
            assert_eq!(run_buffered(src, b""), run_naive(src, b""), "mismatch for {src:?}");
        }
    }
}
