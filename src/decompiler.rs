//! Main decompiler module
//!
//! This module orchestrates reconstruction of one routine: the simulator runs
//! over the full instruction range, the recognizers it calls carve out nested
//! scopes, and the assembler checks that every instruction was consumed
//! exactly once before handing back the statement tree.

use crate::ast::control_flow::PatternFamily;
use crate::ast::nodes::{Arguments, FunctionDef, Stmt};
use crate::ast::simulator::{BlockOutput, FrameContext};
use crate::bytecode::{CodeObject, Instruction};
use crate::cfg::block::Block;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Options controlling reconstruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompileOptions {
    /// Drop the `return None` the compiler appends to every routine
    pub strip_implicit_return: bool,
    /// Accept comprehensions with more than one `for` clause
    pub nested_comprehensions: bool,
    /// Reconstruct the bodies of nested functions and classes; when off they
    /// are emitted as `pass`
    pub decompile_nested: bool,
    /// Check the consumption ledger after every assembled range
    pub verify_consumption: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            strip_implicit_return: true,
            nested_comprehensions: true,
            decompile_nested: true,
            verify_consumption: true,
        }
    }
}

impl DecompileOptions {
    /// Build options from the negative switches of the `decompile` command
    pub fn from_cli(
        no_verify: bool,
        single_clause_comprehensions: bool,
        skip_nested: bool,
        keep_implicit_return: bool,
    ) -> Self {
        Self {
            strip_implicit_return: !keep_implicit_return,
            nested_comprehensions: !single_clause_comprehensions,
            decompile_nested: !skip_nested,
            verify_consumption: !no_verify,
        }
    }
}

/// Receives an event for every construct the recognizers rebuild
pub trait ReconstructionObserver: Send + Sync {
    /// `start` and `end` are the positions of the first and last instruction
    /// of the recognized span
    fn pattern_recognized(&self, family: PatternFamily, start: u32, end: u32);
}

/// Counts recognized constructs per family
#[derive(Debug, Default)]
pub struct PatternStats {
    counts: Mutex<BTreeMap<PatternFamily, usize>>,
}

impl PatternStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counts, with every family present
    pub fn snapshot(&self) -> BTreeMap<PatternFamily, usize> {
        let mut snapshot: BTreeMap<PatternFamily, usize> =
            PatternFamily::ALL.iter().map(|family| (*family, 0)).collect();
        if let Ok(counts) = self.counts.lock() {
            for (family, count) in counts.iter() {
                snapshot.insert(*family, *count);
            }
        }
        snapshot
    }

    pub fn count(&self, family: PatternFamily) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.get(&family).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }
}

impl ReconstructionObserver for PatternStats {
    fn pattern_recognized(&self, family: PatternFamily, _start: u32, _end: u32) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(family).or_insert(0) += 1;
        }
    }
}

impl fmt::Display for PatternStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (family, count) in self.snapshot() {
            writeln!(f, "{:>14}: {}", family, count)?;
        }
        write!(f, "{:>14}: {}", "total", self.total())
    }
}

/// Forwards pattern events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ReconstructionObserver for LoggingObserver {
    fn pattern_recognized(&self, family: PatternFamily, start: u32, end: u32) {
        log::info!("recognized {} construct spanning {}..={}", family, start, end);
    }
}

/// Main decompiler struct
///
/// Holds only configuration; every call works on its own frames, so one
/// instance can serve several threads.
#[derive(Clone, Default)]
pub struct Decompiler {
    options: DecompileOptions,
    observer: Option<Arc<dyn ReconstructionObserver>>,
}

impl fmt::Debug for Decompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decompiler")
            .field("options", &self.options)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Decompiler {
    /// Create a new decompiler with default options
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecompileOptions) -> Self {
        Self {
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ReconstructionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    pub(crate) fn notify(&self, family: PatternFamily, start: u32, end: u32) {
        log::debug!("{} construct at {}..={}", family, start, end);
        if let Some(observer) = &self.observer {
            observer.pattern_recognized(family, start, end);
        }
    }

    /// Reconstruct the statements of one instruction range
    pub fn assemble(&self, instructions: &[Instruction]) -> Result<Vec<Stmt>> {
        let start = instructions.first().map_or(0, |i| i.position);
        self.assemble_output(instructions)?.into_statements(start)
    }

    /// Reconstruct a routine's body, optionally dropping its implicit return
    pub(crate) fn reconstruct(&self, code: &CodeObject, strip_return: bool) -> Result<Vec<Stmt>> {
        Ok(self.reconstruct_scope(code, strip_return)?.0)
    }

    /// Reconstruct the body of a function, class or comprehension code object
    /// with its scope wrapping: implicit return removed, `global` declarations
    /// hoisted, and an empty body replaced by `pass`
    pub fn decompile_code(&self, code: &CodeObject) -> Result<Vec<Stmt>> {
        log::debug!(
            "Decompiling {} ({} instructions)",
            code.name,
            code.instructions.len()
        );
        let (mut body, globals) =
            self.reconstruct_scope(code, self.options.strip_implicit_return)?;
        if !globals.is_empty() {
            body.insert(0, Stmt::Global(globals.into_iter().collect()));
        }
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        Ok(body)
    }

    /// Reconstruct a function definition from its code object
    pub fn decompile_function(&self, code: &CodeObject) -> Result<FunctionDef> {
        code.validate()?;
        Ok(FunctionDef {
            name: code.name.clone(),
            args: Arguments {
                args: code.arg_names.clone(),
                vararg: code.vararg.clone(),
                kwonlyargs: code.kwonly_arg_names.clone(),
                kwarg: code.kwarg.clone(),
                ..Arguments::default()
            },
            body: self.decompile_code(code)?,
            decorators: Vec::new(),
        })
    }

    /// Reconstruct a module; unlike a function body it may be empty
    pub fn decompile_module(&self, code: &CodeObject) -> Result<Vec<Stmt>> {
        code.validate()?;
        let (mut body, globals) =
            self.reconstruct_scope(code, self.options.strip_implicit_return)?;
        if !globals.is_empty() {
            body.insert(0, Stmt::Global(globals.into_iter().collect()));
        }
        Ok(body)
    }

    fn reconstruct_scope(
        &self,
        code: &CodeObject,
        strip_return: bool,
    ) -> Result<(Vec<Stmt>, BTreeSet<String>)> {
        let start = code.instructions.first().map_or(0, |i| i.position);
        let mut output = self.assemble_output(&code.instructions)?;
        let globals = std::mem::take(&mut output.globals);
        let mut body = output.into_statements(start)?;
        if strip_return && is_implicit_return(body.last()) {
            body.pop();
        }
        Ok((body, globals))
    }

    fn assemble_output(&self, instructions: &[Instruction]) -> Result<BlockOutput> {
        let output = self.run(Block::new(instructions), Vec::new(), FrameContext::default())?;
        if !output.stack.is_empty() {
            return Err(Error::stack(format!(
                "routine ended with {} value(s) on the stack: {:?}",
                output.stack.len(),
                output.stack
            )));
        }
        if self.options.verify_consumption {
            verify_ledger(instructions, &output.consumed)?;
        }
        Ok(output)
    }
}

fn is_implicit_return(stmt: Option<&Stmt>) -> bool {
    match stmt {
        Some(Stmt::Return(None)) => true,
        Some(Stmt::Return(Some(value))) => value.is_none_constant(),
        _ => false,
    }
}

/// Compare the consumed positions against the input range
pub fn verify_ledger(instructions: &[Instruction], consumed: &[u32]) -> Result<()> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for position in consumed {
        *counts.entry(*position).or_insert(0) += 1;
    }
    let missing: Vec<u32> = instructions
        .iter()
        .map(|instruction| instruction.position)
        .filter(|position| !counts.contains_key(position))
        .collect();
    let duplicated: Vec<u32> = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(position, _)| *position)
        .collect();

    if missing.is_empty() && duplicated.is_empty() {
        Ok(())
    } else {
        Err(Error::InstructionAccounting {
            missing,
            duplicated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::OperationKind;

    fn listing(positions: &[u32]) -> Vec<Instruction> {
        positions
            .iter()
            .map(|position| Instruction::new(*position, OperationKind::Nop))
            .collect()
    }

    #[test]
    fn ledger_accepts_exact_consumption() {
        assert!(verify_ledger(&listing(&[0, 2, 4]), &[4, 0, 2]).is_ok());
    }

    #[test]
    fn ledger_reports_missing_and_duplicated_positions() {
        let err = verify_ledger(&listing(&[0, 2, 4]), &[0, 0, 4]).unwrap_err();
        assert_eq!(
            err,
            Error::InstructionAccounting {
                missing: vec![2],
                duplicated: vec![0],
            }
        );
    }

    #[test]
    fn cli_switches_invert_defaults() {
        assert_eq!(
            DecompileOptions::from_cli(false, false, false, false),
            DecompileOptions::default()
        );
        let options = DecompileOptions::from_cli(true, true, false, false);
        assert!(!options.verify_consumption);
        assert!(!options.nested_comprehensions);
        assert!(options.decompile_nested);
    }

    #[test]
    fn pattern_stats_counts_every_family() {
        let stats = PatternStats::new();
        stats.pattern_recognized(PatternFamily::Loop, 0, 10);
        stats.pattern_recognized(PatternFamily::Loop, 12, 20);
        stats.pattern_recognized(PatternFamily::With, 22, 30);
        assert_eq!(stats.count(PatternFamily::Loop), 2);
        assert_eq!(stats.total(), 3);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.len(), PatternFamily::ALL.len());
        assert_eq!(snapshot[&PatternFamily::Boolean], 0);
    }
}
