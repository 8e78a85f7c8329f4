use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use t59_assembler::listing::{labels, listing};
use t59_assembler::{assemble, LeniencyLevel};

/// Assembles TI-58/59 keystroke programs and prints their listings.
#[derive(Parser)]
#[command(name = "assemble_t59", version)]
struct Args {
    /// Source files to assemble.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Reject numeric labels and split addresses.
    #[arg(long)]
    strict: bool,

    /// Log each stage of the assembly to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Print a table of labels and tags after each listing.
    #[arg(long)]
    labels: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("t59_assembler=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let leniency = if args.strict { LeniencyLevel::Strict } else { LeniencyLevel::Lenient };

    let mut failed = false;
    for path in &args.inputs {
        let src = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let origin = path.display().to_string();
        let programs = assemble(&src, leniency);
        info!(file = %origin, programs = programs.len(), "assembled");

        for (number, program) in programs.iter().enumerate() {
            if programs.len() > 1 {
                println!("--- {} program {} ({} steps)", origin, number + 1, program.size());
            } else {
                println!("--- {} ({} steps)", origin, program.size());
            }
            println!("{}", listing(program));
            if args.labels {
                println!();
                println!("{}", labels(program));
            }
            for diagnostic in program.diagnostics() {
                eprintln!("{}", diagnostic.report(&src, Some(&origin), false));
            }
            failed |= program.has_errors();
        }
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
