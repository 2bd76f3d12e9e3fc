//! Command-line interface module
//!
//! This module contains the implementations for the CLI subcommands.

pub mod cfg;
pub mod decompile;
pub mod disasm;

/// Common CLI utilities
pub mod utils {
    use crate::error::Result as DecompilerResult;
    use std::path::Path;

    /// Write output to file or stdout
    pub fn write_output(content: &str, output_path: Option<&Path>) -> DecompilerResult<()> {
        match output_path {
            Some(path) => {
                std::fs::write(path, content).map_err(|e| {
                    crate::error::Error::Io(format!("{}: {}", path.display(), e))
                })?;
                log::info!("Output written to {}", path.display());
                Ok(())
            }
            None => {
                println!("{}", content);
                Ok(())
            }
        }
    }
}
