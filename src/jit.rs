//! Cranelift JIT back-end (C6).
//!
//! The JIT lowers *raw* sanitized Brainfuck straight to Cranelift IR --
//! it does not go through the optimized [`crate::ir`] at all (see
//! DESIGN.md for why). Cranelift's own optimizer, run at the requested
//! [`OptLevel`], does the work the IR's run-length folding and loop-shape
//! recognition do for the interpreter path.
//!
//! `,` and `.` call back into two small `extern "C"` host functions
//! (`bf_getchar`/`bf_putchar`) registered as JIT symbols, the same way the
//! original LLVM-based JIT this crate descends from linked against libc's
//! `getchar`/`putchar`. Zeroing the tape on entry is a single call to a
//! third host function, `bf_memzero`, rather than a store loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

use cranelift::jit::{JITBuilder, JITModule};
use cranelift::module::{default_libcall_names, FuncId, Linkage, Module};
use cranelift::prelude::*;

use crate::error::{BfError, Result};
use crate::sanitize::sanitize;
use crate::tape::TAPE_SIZE;

// Per-thread override for bf_putchar/bf_getchar, used only by tests below
// to capture JIT output and feed JIT input without touching real stdio.
thread_local! {
    static TEST_OUTPUT: RefCell<Option<Vec<u8>>> = RefCell::new(None);
    static TEST_INPUT: RefCell<Option<VecDeque<u8>>> = RefCell::new(None);
}

/// Cranelift optimization level to run the generated IR through. Mirrors
/// the three `cranelift_codegen::settings::OptLevel` variants so the CLI's
/// `--opt-level` flag maps onto it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

extern "C" fn bf_putchar(byte: i64) {
    let captured = TEST_OUTPUT.with(|sink| {
        if let Some(buf) = sink.borrow_mut().as_mut() {
            buf.push(byte as u8);
            true
        } else {
            false
        }
    });
    if captured {
        return;
    }

    let stdout = io::stdout();
    let mut lock = stdout.lock();
    let _ = lock.write_all(&[byte as u8]);
    let _ = lock.flush();
}

/// Returns the byte read as `0..=255`, or `-1` on EOF/read failure -- the
/// sentinel the generated code tests before storing into the tape, since
/// Brainfuck cells can't otherwise distinguish "read a NUL" from "hit EOF".
extern "C" fn bf_getchar() -> i64 {
    let hooked = TEST_INPUT.with(|src| src.borrow_mut().as_mut().map(|q| q.pop_front()));
    if let Some(byte) = hooked {
        return match byte {
            Some(byte) => byte as i64,
            None => -1,
        };
    }

    let mut buf = [0u8; 1];
    match io::stdin().read(&mut buf) {
        Ok(1) => buf[0] as i64,
        _ => -1,
    }
}

extern "C" fn bf_memzero(ptr: *mut u8, len: i64) {
    unsafe { std::ptr::write_bytes(ptr, 0, len as usize) };
}

/// Owns the JIT module across a single compile-and-run. Each invocation
/// builds its own module and compiles once per process, matching the
/// interpreter's own one-shot `Interpreter::run`; there is no cross-run
/// caching.
pub struct Jit {
    module: JITModule,
}

impl Jit {
    pub fn new(opt_level: OptLevel) -> Result<Self> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false").map_err(jit_err)?;
        flag_builder.set("is_pic", "false").map_err(jit_err)?;
        flag_builder.set("opt_level", opt_level.as_setting()).map_err(jit_err)?;

        let isa_builder = cranelift::native::builder().map_err(|msg| BfError::Jit(msg.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(jit_err)?;

        let mut jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
        jit_builder.symbol("bf_putchar", bf_putchar as *const u8);
        jit_builder.symbol("bf_getchar", bf_getchar as *const u8);
        jit_builder.symbol("bf_memzero", bf_memzero as *const u8);

        Ok(Jit { module: JITModule::new(jit_builder) })
    }

    /// Sanitizes, compiles, and runs `source` in one shot, driving output
    /// straight to process stdout via the linked `bf_putchar`/`bf_getchar`
    /// (the JIT path is always streaming).
    pub fn compile_and_run(&mut self, source: &str) -> Result<()> {
        let code = sanitize(source);
        check_balanced(&code)?;

        let func_id = self.declare_and_build(&code)?;
        self.module.finalize_definitions().map_err(jit_err)?;

        let entry = self.module.get_finalized_function(func_id);
        let entry_fn = unsafe { std::mem::transmute::<*const u8, extern "C" fn()>(entry) };
        entry_fn();

        Ok(())
    }

    fn declare_and_build(&mut self, code: &str) -> Result<FuncId> {
        let mut putchar_sig = self.module.make_signature();
        putchar_sig.params.push(AbiParam::new(types::I64));
        let putchar_id = self
            .module
            .declare_function("bf_putchar", Linkage::Import, &putchar_sig)
            .map_err(jit_err)?;

        let mut getchar_sig = self.module.make_signature();
        getchar_sig.returns.push(AbiParam::new(types::I64));
        let getchar_id = self
            .module
            .declare_function("bf_getchar", Linkage::Import, &getchar_sig)
            .map_err(jit_err)?;

        let mut memzero_sig = self.module.make_signature();
        memzero_sig.params.push(AbiParam::new(self.module.target_config().pointer_type()));
        memzero_sig.params.push(AbiParam::new(types::I64));
        let memzero_id = self
            .module
            .declare_function("bf_memzero", Linkage::Import, &memzero_sig)
            .map_err(jit_err)?;

        let sig = self.module.make_signature();
        let func_id = self
            .module
            .declare_function("bf_main", Linkage::Export, &sig)
            .map_err(jit_err)?;

        let mut ctx = self.module.make_context();
        ctx.func.signature = sig;

        let mut fb_ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut fb_ctx);
            let putchar_ref = self.module.declare_func_in_func(putchar_id, builder.func);
            let getchar_ref = self.module.declare_func_in_func(getchar_id, builder.func);
            let memzero_ref = self.module.declare_func_in_func(memzero_id, builder.func);
            let pointer_type = self.module.target_config().pointer_type();

            emit_body(&mut builder, code, pointer_type, putchar_ref, getchar_ref, memzero_ref);
        }

        self.module.define_function(func_id, &mut ctx).map_err(jit_err)?;
        self.module.clear_context(&mut ctx);

        Ok(func_id)
    }
}

fn jit_err(e: impl std::fmt::Display) -> BfError {
    BfError::Jit(e.to_string())
}

/// Re-checks bracket balance ahead of code generation -- the loop lowering
/// below pops an unconditional `expect()` off the block stack at every `]`,
/// so an unbalanced program must be rejected before we ever reach it.
fn check_balanced(code: &str) -> Result<()> {
    let mut depth = 0usize;
    for (i, b) in code.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth = depth.checked_sub(1).ok_or(BfError::UnmatchedClose { pos: i })?;
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(BfError::UnmatchedOpen { count: depth });
    }
    Ok(())
}

/// A stack slot holds the tape and a `Variable` holds the pointer.
/// Straight-line lowering handles `+ - < > . ,`; each `[ ]` pair gets a
/// test block, branched back to on the loop-back edge, and an exit block,
/// fallen through to once the cell reads zero.
fn emit_body(
    builder: &mut FunctionBuilder,
    code: &str,
    pointer_type: Type,
    putchar_ref: cranelift::codegen::ir::FuncRef,
    getchar_ref: cranelift::codegen::ir::FuncRef,
    memzero_ref: cranelift::codegen::ir::FuncRef,
) {
    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);

    let tape_slot = builder.create_sized_stack_slot(StackSlotData::new(
        StackSlotKind::ExplicitSlot,
        TAPE_SIZE as u32,
        0,
    ));
    let tape_addr = builder.ins().stack_addr(pointer_type, tape_slot, 0);
    let tape_len = builder.ins().iconst(types::I64, TAPE_SIZE as i64);
    builder.ins().call(memzero_ref, &[tape_addr, tape_len]);

    let ptr_var = Variable::new(0);
    builder.declare_var(ptr_var, pointer_type);
    let zero_ptr = builder.ins().iconst(pointer_type, 0);
    builder.def_var(ptr_var, zero_ptr);

    // (test_block, exit_block) per open bracket, innermost last.
    let mut loop_stack: Vec<(Block, Block)> = Vec::new();

    for byte in code.bytes() {
        match byte {
            b'>' => bump_pointer(builder, ptr_var, 1),
            b'<' => bump_pointer(builder, ptr_var, -1),
            b'+' => bump_cell(builder, ptr_var, tape_addr, 1),
            b'-' => bump_cell(builder, ptr_var, tape_addr, -1),
            b'.' => {
                let cell = load_cell(builder, ptr_var, tape_addr);
                let widened = builder.ins().uextend(types::I64, cell);
                builder.ins().call(putchar_ref, &[widened]);
            }
            b',' => emit_read(builder, ptr_var, tape_addr, getchar_ref),
            b'[' => {
                let test_block = builder.create_block();
                let body_block = builder.create_block();
                let exit_block = builder.create_block();

                builder.ins().jump(test_block, &[]);
                builder.switch_to_block(test_block);
                let cell = load_cell(builder, ptr_var, tape_addr);
                let zero = builder.ins().iconst(types::I8, 0);
                let is_zero = builder.ins().icmp(IntCC::Equal, cell, zero);
                builder.ins().brif(is_zero, exit_block, &[], body_block, &[]);

                builder.switch_to_block(body_block);
                builder.seal_block(body_block);
                loop_stack.push((test_block, exit_block));
            }
            b']' => {
                let (test_block, exit_block) = loop_stack.pop().expect("balanced by check_balanced");
                builder.ins().jump(test_block, &[]);
                builder.seal_block(test_block);
                builder.seal_block(exit_block);
                builder.switch_to_block(exit_block);
            }
            _ => unreachable!("sanitized source carries only the eight instruction bytes"),
        }
    }

    builder.ins().return_(&[]);
    builder.finalize();
}

fn bump_pointer(builder: &mut FunctionBuilder, ptr_var: Variable, delta: i64) {
    let p = builder.use_var(ptr_var);
    let next = builder.ins().iadd_imm(p, delta);
    builder.def_var(ptr_var, next);
}

fn cell_addr(builder: &mut FunctionBuilder, ptr_var: Variable, tape_addr: Value) -> Value {
    let p = builder.use_var(ptr_var);
    builder.ins().iadd(tape_addr, p)
}

fn load_cell(builder: &mut FunctionBuilder, ptr_var: Variable, tape_addr: Value) -> Value {
    let addr = cell_addr(builder, ptr_var, tape_addr);
    builder.ins().load(types::I8, MemFlags::new(), addr, 0)
}

fn bump_cell(builder: &mut FunctionBuilder, ptr_var: Variable, tape_addr: Value, delta: i64) {
    let addr = cell_addr(builder, ptr_var, tape_addr);
    let cell = builder.ins().load(types::I8, MemFlags::new(), addr, 0);
    let next = builder.ins().iadd_imm(cell, delta);
    builder.ins().store(MemFlags::new(), next, addr, 0);
}

/// `,`: read a host byte; on EOF (sentinel `-1`) leave the cell untouched,
/// on a NUL byte also leave it untouched, otherwise store it.
fn emit_read(
    builder: &mut FunctionBuilder,
    ptr_var: Variable,
    tape_addr: Value,
    getchar_ref: cranelift::codegen::ir::FuncRef,
) {
    let call = builder.ins().call(getchar_ref, &[]);
    let result = builder.inst_results(call)[0];

    let zero = builder.ins().iconst(types::I64, 0);
    let is_positive = builder.ins().icmp(IntCC::SignedGreaterThan, result, zero);

    let store_block = builder.create_block();
    let cont_block = builder.create_block();
    builder.ins().brif(is_positive, store_block, &[], cont_block, &[]);

    builder.switch_to_block(store_block);
    builder.seal_block(store_block);
    let byte = builder.ins().ireduce(types::I8, result);
    let addr = cell_addr(builder, ptr_var, tape_addr);
    builder.ins().store(MemFlags::new(), byte, addr, 0);
    builder.ins().jump(cont_block, &[]);

    builder.switch_to_block(cont_block);
    builder.seal_block(cont_block);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unmatched_close() {
        assert!(matches!(check_balanced("+]"), Err(BfError::UnmatchedClose { pos: 1 })));
    }

    #[test]
    fn rejects_unmatched_open() {
        assert!(matches!(check_balanced("[+"), Err(BfError::UnmatchedOpen { count: 1 })));
    }

    #[test]
    fn accepts_balanced_nested_brackets() {
        assert!(check_balanced("[[-]>[-]]").is_ok());
    }

    #[test]
    fn opt_level_maps_to_cranelift_settings() {
        assert_eq!(OptLevel::None.as_setting(), "none");
        assert_eq!(OptLevel::Speed.as_setting(), "speed");
        assert_eq!(OptLevel::SpeedAndSize.as_setting(), "speed_and_size");
    }

    /// Runs `source` through the JIT, feeding `input` to `bf_getchar` and
    /// capturing everything written through `bf_putchar` instead of
    /// touching the real stdio streams.
    fn run_jit(source: &str, input: &[u8]) -> Vec<u8> {
        TEST_OUTPUT.with(|sink| *sink.borrow_mut() = Some(Vec::new()));
        TEST_INPUT.with(|src| *src.borrow_mut() = Some(input.iter().copied().collect()));

        let mut jit = Jit::new(OptLevel::Speed).unwrap();
        let result = jit.compile_and_run(source);

        let out = TEST_OUTPUT.with(|sink| sink.borrow_mut().take().unwrap());
        TEST_INPUT.with(|src| *src.borrow_mut() = None);

        result.unwrap();
        out
    }

    fn run_interpreted(source: &str, input: &[u8]) -> Vec<u8> {
        use crate::io::{BufferedInput, BufferedOutput};

        let out = crate::interpret(source, BufferedInput::new(input.to_vec()), BufferedOutput::default()).unwrap();
        out.as_bytes().to_vec()
    }

    #[test]
    fn jit_matches_interpreter_on_hello_world() {
        let src = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        assert_eq!(run_jit(src, b""), run_interpreted(src, b""));
        assert_eq!(run_jit(src, b""), b"Hello World!\n");
    }

    #[test]
    fn jit_matches_interpreter_on_clear_loop() {
        let src = "+++++[-]+.";
        assert_eq!(run_jit(src, b""), run_interpreted(src, b""));
    }

    #[test]
    fn jit_matches_interpreter_on_copy_multiply() {
        let src = "+++[->++>+++<<]>.>.";
        assert_eq!(run_jit(src, b""), run_interpreted(src, b""));
    }

    #[test]
    fn jit_matches_interpreter_on_eof() {
        let src = ",.";
        assert_eq!(run_jit(src, b""), run_interpreted(src, b""));
        assert_eq!(run_jit(src, b""), b"\0");
    }
}
