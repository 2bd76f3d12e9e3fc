use clap::{Parser, Subcommand};
use miette::{miette, Result};
use std::path::PathBuf;

use pyc_dec_rs::cli;
use pyc_dec_rs::cli::decompile::OutputFormat;

#[derive(Parser)]
#[command(name = "pyc-dec-rs")]
#[command(about = "Structured control-flow reconstruction for block-stack bytecode")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct the statement tree of one or more instruction listings
    Decompile {
        /// Input JSON listings
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Print per-construct recognition counts to stderr
        #[arg(long)]
        stats: bool,

        /// Skip the instruction consumption check
        #[arg(long)]
        no_verify: bool,

        /// Reject comprehensions with more than one `for` clause
        #[arg(long)]
        single_clause_comprehensions: bool,

        /// Emit nested function and class bodies as `pass`
        #[arg(long)]
        skip_nested: bool,

        /// Keep the trailing `return None` of every routine
        #[arg(long)]
        keep_implicit_return: bool,
    },

    /// Print a dis-style listing
    Disasm {
        /// Input JSON listing
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize basic blocks and back edges
    Cfg {
        /// Input JSON listing
        input: PathBuf,
        /// Output DOT file for visualization (optional)
        #[arg(short, long)]
        dot: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decompile {
            inputs,
            output,
            format,
            stats,
            no_verify,
            single_clause_comprehensions,
            skip_nested,
            keep_implicit_return,
        } => {
            let args = cli::decompile::DecompileArgs {
                input_paths: inputs,
                output_path: output,
                format,
                stats,
                no_verify,
                single_clause_comprehensions,
                skip_nested,
                keep_implicit_return,
            };
            cli::decompile::decompile(&args).map_err(|e| miette!("{}", e))
        }
        Commands::Disasm { input, output } => {
            cli::disasm::disasm(&input, output.as_deref()).map_err(|e| miette!("{}", e))
        }
        Commands::Cfg { input, dot } => {
            cli::cfg::cfg(&input, dot.as_deref()).map_err(|e| miette!("{}", e))
        }
    }
}
