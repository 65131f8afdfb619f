//! Command-line front end: reads a `.bf` file, runs it through the
//! interpreter or the Cranelift JIT, and prints whatever it produced.

use std::fs;
use std::process::ExitCode;

use bfjit::io::{BufferedOutput, StreamingInput, StreamingOutput};
use bfjit::jit::OptLevel;
use clap::{Parser, ValueEnum};
use colored::Colorize;

/// Runs a Brainfuck program, either interpreted or JIT-compiled.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct RunArgs {
    /// Path to the Brainfuck source file
    file_path: String,

    /// Compile and run with the Cranelift JIT instead of the interpreter
    #[arg(long, default_value_t = false)]
    jit: bool,

    /// Cranelift optimization level, only meaningful with --jit
    #[arg(long, value_enum, default_value_t = CliOptLevel::Speed)]
    opt_level: CliOptLevel,

    /// Buffer all output in memory and print it once the program finishes,
    /// instead of streaming it to stdout as it is produced
    #[arg(long, default_value_t = false)]
    buffer: bool,

    /// Print the assembled IR before running it (interpreter path only)
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Emit diagnostic logging on stderr
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliOptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl From<CliOptLevel> for OptLevel {
    fn from(level: CliOptLevel) -> Self {
        match level {
            CliOptLevel::None => OptLevel::None,
            CliOptLevel::Speed => OptLevel::Speed,
            CliOptLevel::SpeedAndSize => OptLevel::SpeedAndSize,
        }
    }
}

fn main() -> ExitCode {
    let args = RunArgs::parse();

    if args.verbose {
        tracing_subscriber::fmt().with_env_filter("bfjit=debug").init();
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    let source = fs::read_to_string(&args.file_path)?;
    tracing::debug!(path = %args.file_path, bytes = source.len(), "read source file");

    if args.jit {
        if args.dump {
            eprintln!("{}", "note: --dump has no effect with --jit".yellow());
        }
        bfjit::jit_run(&source, args.opt_level.into())?;
        return Ok(());
    }

    let program = bfjit::ir::assemble(&source)?;
    if args.dump {
        print!("{program}");
    }

    if args.buffer {
        let out = bfjit::interpret(&source, StreamingInput, BufferedOutput::default())?;
        print!("{}", out.into_string());
    } else {
        bfjit::interpret(&source, StreamingInput, StreamingOutput)?;
    }

    Ok(())
}
