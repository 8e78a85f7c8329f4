use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use t59_assembler::error::LexError;
use t59_assembler::lexer::Lexer;
use t59_assembler::{parse, LeniencyLevel};

/// Checks TI-58/59 keystroke programs and reports every problem found.
#[derive(Parser)]
#[command(name = "check_t59", version)]
struct Args {
    /// Source files to check.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Reject numeric labels and split addresses.
    #[arg(long)]
    strict: bool,

    /// Print reports without ANSI colors.
    #[arg(long)]
    no_color: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let leniency = if args.strict { LeniencyLevel::Strict } else { LeniencyLevel::Lenient };
    let color = !args.no_color;

    let mut failed = false;
    for path in &args.inputs {
        let src = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let origin = path.display().to_string();

        let lexer = Lexer::new(&src).with_listener(|line: usize, column: usize, message: &str| {
            let error = LexError { line, column, message: message.to_string() };
            eprintln!("{}: {}", origin, error);
        });
        let programs = parse(lexer, leniency);

        let mut errors = 0;
        let mut warnings = 0;
        for program in &programs {
            for diagnostic in program.diagnostics() {
                println!("{}", diagnostic.report(&src, Some(&origin), color));
                if diagnostic.is_error() {
                    errors += 1;
                } else {
                    warnings += 1;
                }
            }
        }

        if errors == 0 && warnings == 0 {
            println!("{}: found no errors", origin);
        } else {
            println!("{}: {} error(s), {} warning(s)", origin, errors, warnings);
        }
        failed |= errors > 0;
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
