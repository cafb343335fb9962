use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bytecode executor for the lazuli language.
///
/// Loads pre-compiled code units, executes them, resolves the dollar
/// bindings they establish, and writes the final value map to stdout
/// between marker lines.
#[derive(Parser)]
#[command(name = "lazuli", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Propagate failures as panics instead of printing them.
    #[arg(long, global = true)]
    pub nocatch: bool,

    /// Trace VM execution and engine resolution to stderr.
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute the given bytecode files.
    Run {
        /// Paths of compiled code units, executed in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Execute a serialized runspec ('-' reads it from stdin).
    Runspec {
        /// Path to the runspec file, or '-' for stdin.
        rsfile: String,
    },
}
