use crate::ast::nodes::Stmt;
use crate::bytecode::CodeObject;
use crate::decompiler::{DecompileOptions, Decompiler, LoggingObserver, PatternStats};
use crate::error::{Error as DecompilerError, Result as DecompilerResult};
use clap::ValueEnum;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::utils::write_output;

/// How the reconstructed tree is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// serde JSON, for an external printer
    Json,
    /// Rust debug dump
    Debug,
}

/// Arguments for the decompile command
#[derive(Debug, Clone)]
pub struct DecompileArgs {
    pub input_paths: Vec<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub format: OutputFormat,
    pub stats: bool,
    pub no_verify: bool,
    pub single_clause_comprehensions: bool,
    pub skip_nested: bool,
    pub keep_implicit_return: bool,
}

impl DecompileArgs {
    /// Convert to DecompileOptions
    pub fn to_options(&self) -> DecompileOptions {
        DecompileOptions::from_cli(
            self.no_verify,
            self.single_clause_comprehensions,
            self.skip_nested,
            self.keep_implicit_return,
        )
    }
}

/// Run the decompile subcommand
pub fn decompile(args: &DecompileArgs) -> DecompilerResult<()> {
    let stats = Arc::new(PatternStats::new());
    let mut decompiler = Decompiler::with_options(args.to_options());
    if args.stats {
        decompiler = decompiler.with_observer(stats.clone());
    } else if log::log_enabled!(log::Level::Info) {
        decompiler = decompiler.with_observer(Arc::new(LoggingObserver));
    }

    let results: Vec<(&PathBuf, DecompilerResult<Vec<Stmt>>)> = args
        .input_paths
        .par_iter()
        .map(|path| (path, decompile_listing(&decompiler, path)))
        .collect();

    let mut rendered = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (path, result) in results {
        match result {
            Ok(module) => rendered.push((path, module)),
            Err(error) => {
                eprintln!("{}: could not be reconstructed: {}", path.display(), error);
                first_error.get_or_insert(error);
            }
        }
    }

    if !rendered.is_empty() {
        let output = render(&rendered, args.format)?;
        write_output(&output, args.output_path.as_deref())?;
    }
    if args.stats {
        eprintln!("{}", stats);
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Load one listing and reconstruct it as a module
pub fn decompile_listing(decompiler: &Decompiler, path: &Path) -> DecompilerResult<Vec<Stmt>> {
    let code = CodeObject::from_path(path)?;
    log::info!(
        "Decompiling {} ({} instructions)",
        path.display(),
        code.instructions.len()
    );
    decompiler.decompile_module(&code)
}

fn render(modules: &[(&PathBuf, Vec<Stmt>)], format: OutputFormat) -> DecompilerResult<String> {
    match (format, modules) {
        (OutputFormat::Json, [(_, module)]) => to_json(module),
        (OutputFormat::Json, _) => {
            let map: serde_json::Map<String, serde_json::Value> = modules
                .iter()
                .map(|(path, module)| {
                    serde_json::to_value(module)
                        .map(|value| (path.display().to_string(), value))
                        .map_err(|e| DecompilerError::internal(e.to_string()))
                })
                .collect::<DecompilerResult<_>>()?;
            serde_json::to_string_pretty(&map).map_err(|e| DecompilerError::internal(e.to_string()))
        }
        (OutputFormat::Debug, [(_, module)]) => Ok(format!("{:#?}", module)),
        (OutputFormat::Debug, _) => Ok(modules
            .iter()
            .map(|(path, module)| format!("# {}\n{:#?}", path.display(), module))
            .collect::<Vec<_>>()
            .join("\n\n")),
    }
}

fn to_json(module: &[Stmt]) -> DecompilerResult<String> {
    serde_json::to_string_pretty(module).map_err(|e| DecompilerError::internal(e.to_string()))
}
