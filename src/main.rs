//! procflow - status propagation over process dependency graphs

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = procflow::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
