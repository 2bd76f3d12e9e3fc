//! Import statement helpers
//!
//! `IMPORT_NAME` leaves a pending import on the stack. A plain import is
//! completed by the store that binds it; a from-import collects one alias per
//! `IMPORT_FROM`/store pair and is completed by the `POP_TOP` that discards
//! the module.

use super::Frame;
use crate::ast::nodes::{Alias, Expr, PendingImport, Stmt};
use crate::bytecode::{Constant, Instruction};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing import helper methods
pub trait ImportHelpers {
    fn simulate_import_name(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_import_from(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_import_star(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `import module [as name]`
    fn bind_import(
        &self,
        frame: &mut Frame<'_>,
        import: PendingImport,
        target: &Expr,
        instruction: &Instruction,
    ) -> Result<()>;

    /// One `name [as alias]` of a from-import
    fn bind_imported_name(
        &self,
        frame: &mut Frame<'_>,
        name: String,
        target: &Expr,
        instruction: &Instruction,
    ) -> Result<()>;

    /// Emit the collected `from module import ...`
    fn finish_from_import(&self, frame: &mut Frame<'_>, import: PendingImport) -> Result<()>;
}

impl ImportHelpers for Decompiler {
    fn simulate_import_name(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let fromlist = frame.pop(instruction)?;
        let level = match frame.pop(instruction)? {
            Expr::Constant(Constant::Int(level)) => u32::try_from(&level).map_err(|_| {
                Error::pattern(instruction.position, format!("import level {} out of range", level))
            })?,
            other => {
                return Err(Error::pattern(
                    instruction.position,
                    format!("import level must be an integer constant, found {:?}", other),
                ))
            }
        };
        frame.push(Expr::Import(Box::new(PendingImport {
            module: instruction.name()?.to_string(),
            level,
            from_import: !fromlist.is_none_constant(),
            aliased: false,
            names: Vec::new(),
        })));
        Ok(())
    }

    fn simulate_import_from(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        if !matches!(frame.top(), Some(Expr::Import(import)) if import.from_import) {
            return Err(Error::pattern(
                instruction.position,
                "IMPORT_FROM without a from-import on the stack",
            ));
        }
        frame.push(Expr::ImportedName(instruction.name()?.to_string()));
        Ok(())
    }

    fn simulate_import_star(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        match frame.pop(instruction)? {
            Expr::Import(mut import) => {
                import.names = vec![Alias::new("*", None)];
                self.finish_from_import(frame, *import)
            }
            _ => Err(Error::pattern(
                instruction.position,
                "IMPORT_STAR without an import on the stack",
            )),
        }
    }

    fn bind_import(
        &self,
        frame: &mut Frame<'_>,
        import: PendingImport,
        target: &Expr,
        instruction: &Instruction,
    ) -> Result<()> {
        let bound = match target {
            Expr::Name(name) => name,
            _ => {
                return Err(Error::pattern(
                    instruction.position,
                    "module bound to something other than a name",
                ))
            }
        };
        let top_level = import.module.split('.').next().unwrap_or_default();
        let asname = (import.aliased || bound != top_level).then(|| bound.clone());
        frame.emit(Stmt::Import(vec![Alias::new(import.module, asname)]));
        Ok(())
    }

    fn bind_imported_name(
        &self,
        frame: &mut Frame<'_>,
        name: String,
        target: &Expr,
        instruction: &Instruction,
    ) -> Result<()> {
        let bound = match target {
            Expr::Name(bound) => bound,
            _ => {
                return Err(Error::pattern(
                    instruction.position,
                    "imported name bound to something other than a name",
                ))
            }
        };
        match frame.top_mut() {
            Some(Expr::Import(import)) => {
                let asname = (*bound != name).then(|| bound.clone());
                import.names.push(Alias::new(name, asname));
                Ok(())
            }
            _ => Err(Error::pattern(
                instruction.position,
                "imported name outlived its import",
            )),
        }
    }

    fn finish_from_import(&self, frame: &mut Frame<'_>, import: PendingImport) -> Result<()> {
        if !import.from_import {
            frame.emit(Stmt::Import(vec![Alias::new(import.module, None)]));
            return Ok(());
        }
        let module = (!import.module.is_empty()).then_some(import.module);
        frame.emit(Stmt::ImportFrom {
            module,
            names: import.names,
            level: import.level,
        });
        Ok(())
    }
}
