//! `run-program`: loads a program-blob JSON file and runs its `primaryEntry`
//! to completion, the way the teacher's `transactor.rs`/`Transactor` drives
//! a transaction to completion from the outside (spec supplement §2.5 — not
//! a Non-goal collaborator, just the thin driver every interpreter crate
//! ships alongside the library itself).

use std::path::PathBuf;
use std::process::ExitCode;

use tagvm_core::config::VmConfig;
use tagvm_core::error::VmError;
use tagvm_core::evaluator::Evaluator;
use tagvm_core::program::load_program;
use tagvm_core::value;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args_os().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: run-program <program-blob.json> [gc-threshold-bytes]");
        return ExitCode::from(64);
    };
    let gc_threshold_bytes = args
        .next()
        .and_then(|a| a.to_str().map(str::to_string))
        .and_then(|s| s.parse::<u64>().ok());

    let json = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to read {}: {e}", path.display());
            return ExitCode::from(64);
        }
    };

    let program = match load_program(&json) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to load program blob: {e}");
            return ExitCode::from(64);
        }
    };

    let config = match gc_threshold_bytes {
        Some(bytes) => VmConfig::new(bytes, false),
        None => VmConfig::default(),
    };

    let mut evaluator = Evaluator::new(&program, config);
    match evaluator.run() {
        Ok((result_type, bytes)) => {
            // Display before the evaluator (and its heap) drops: a heap-
            // resident result's `bytes` is just an address, meaningless
            // once the objects it points at are gone.
            match value::display(&bytes, result_type, &program.registry, evaluator.heap()) {
                Ok(rendered) => {
                    println!("{rendered}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("failed to render result: {e}");
                    ExitCode::from(5)
                }
            }
        }
        Err(err) => {
            println!("{}", err.report_line());
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &VmError) -> u8 {
    err.exit_code() as u8
}
