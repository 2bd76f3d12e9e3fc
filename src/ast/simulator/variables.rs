//! Variable access and stack-shuffle helpers
//!
//! Stores are where most statements come from: a store pops its value and
//! either binds a pending definition (function, class, import), completes an
//! augmented assignment, or emits an assignment. Chained assignments
//! (`a = b = x`) are recognized from a `DUP_TOP` that feeds a store, and the
//! rotations the compiler emits for `a, b = b, a` become a tuple assignment.

use super::{Frame, ImportHelpers};
use crate::ast::nodes::{Expr, Stmt};
use crate::bytecode::{Instruction, OperationCategory, OperationKind};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing load, store and stack manipulation helpers
pub trait VariableHelpers {
    fn simulate_load_const(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_load_name(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `STORE_*` of a name, attribute or subscript
    fn simulate_store(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// Bind a popped value to a store target
    fn bind(
        &self,
        frame: &mut Frame<'_>,
        target: Expr,
        value: Expr,
        instruction: &Instruction,
    ) -> Result<()>;

    fn simulate_delete(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `UNPACK_SEQUENCE n` followed by the `n` stores of its targets
    fn simulate_unpack(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_pop_top(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_rot_two(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_rot_three(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_dup_top(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_dup_top_two(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;
}

impl VariableHelpers for Decompiler {
    fn simulate_load_const(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let constant = instruction.constant()?.clone();
        frame.push(Expr::Constant(constant));
        Ok(())
    }

    fn simulate_load_name(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        frame.push(Expr::name(instruction.name()?));
        Ok(())
    }

    fn simulate_store(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let target = store_target(frame, instruction)?;
        let value = frame.pop(instruction)?;
        self.bind(frame, target, value, instruction)
    }

    fn bind(
        &self,
        frame: &mut Frame<'_>,
        target: Expr,
        value: Expr,
        instruction: &Instruction,
    ) -> Result<()> {
        match value {
            Expr::Function(mut function) => {
                function.name = definition_name(&target, instruction)?;
                frame.emit(Stmt::FunctionDef(*function));
            }
            Expr::Class(mut class) => {
                class.name = definition_name(&target, instruction)?;
                frame.emit(Stmt::ClassDef(*class));
            }
            Expr::Import(import) => self.bind_import(frame, *import, &target, instruction)?,
            Expr::ImportedName(name) => self.bind_imported_name(frame, name, &target, instruction)?,
            Expr::InPlace { op, value, .. } => frame.emit(Stmt::AugAssign {
                target,
                op,
                value: *value,
            }),
            Expr::BuildClass => {
                return Err(Error::pattern(
                    instruction.position,
                    "class builder stored before it was called",
                ))
            }
            value => frame.emit_assign(target, value),
        }
        Ok(())
    }

    fn simulate_delete(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let target = match instruction.kind {
            OperationKind::DeleteAttr => {
                let object = frame.pop(instruction)?;
                Expr::attribute(object, instruction.name()?)
            }
            OperationKind::DeleteSubscr => {
                let index = frame.pop(instruction)?;
                let object = frame.pop(instruction)?;
                Expr::Subscript {
                    value: Box::new(object),
                    index: Box::new(index),
                }
            }
            OperationKind::DeleteGlobal => {
                let name = instruction.name()?;
                frame.globals.insert(name.to_string());
                Expr::name(name)
            }
            _ => Expr::name(instruction.name()?),
        };
        frame.emit(Stmt::Delete(vec![target]));
        Ok(())
    }

    fn simulate_unpack(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let count = instruction.count()? as usize;
        let value = frame.pop(instruction)?;

        // The element stores must not see an enclosing assignment chain
        let chain_open = std::mem::take(&mut frame.chain_open);
        let dup_feeds_store = std::mem::take(&mut frame.dup_feeds_store);

        let base = frame.statements.len();
        for _ in 0..count {
            frame.push(Expr::Placeholder);
        }
        while frame.statements.len() < base + count {
            if frame.stream.is_empty() {
                return Err(Error::pattern(
                    instruction.position,
                    format!("unpacking into {} targets ran out of stores", count),
                ));
            }
            self.step(frame)?;
        }

        let targets = frame
            .statements
            .split_off(base)
            .into_iter()
            .map(|stmt| {
                stmt.placeholder_target().cloned().ok_or_else(|| {
                    Error::pattern(
                        instruction.position,
                        "unpacked element was not bound to a target",
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        frame.chain_open = chain_open;
        frame.dup_feeds_store = dup_feeds_store;
        frame.emit_assign(Expr::Tuple(targets), value);
        Ok(())
    }

    fn simulate_pop_top(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        match frame.pop(instruction)? {
            Expr::Import(import) => self.finish_from_import(frame, *import),
            value if value.is_transient() => Err(Error::pattern(
                instruction.position,
                "incomplete definition discarded",
            )),
            value => {
                frame.emit(Stmt::Expr(value));
                Ok(())
            }
        }
    }

    fn simulate_rot_two(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        if let Some(stores) = swap_stores(frame, 2) {
            return self.swap_assign(frame, instruction, stores);
        }
        let top = frame.pop(instruction)?;
        let second = frame.pop(instruction)?;
        frame.push(top);
        frame.push(second);
        Ok(())
    }

    fn simulate_rot_three(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        if frame.stream.peek_kind() == Some(OperationKind::RotTwo) {
            if let Some(stores) = swap_stores_after(frame, 1, 3) {
                let rot_two = frame.take_expected(OperationKind::RotTwo)?;
                log::trace!("three-way swap through {}", rot_two.position);
                return self.swap_assign(frame, instruction, stores);
            }
        }
        let top = frame.pop(instruction)?;
        let below = frame.pop_n(2, instruction)?;
        frame.push(top);
        frame.stack.extend(below);
        Ok(())
    }

    fn simulate_dup_top(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let top = frame
            .top()
            .cloned()
            .ok_or_else(|| Error::stack(format!("DUP_TOP at {} on an empty stack", instruction.position)))?;
        frame.push(top);
        if frame.stream.peek_kind().map_or(false, |kind| {
            kind.category() == OperationCategory::Store
        }) {
            frame.dup_feeds_store = true;
        }
        Ok(())
    }

    fn simulate_dup_top_two(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let pair = frame.pop_n(2, instruction)?;
        frame.stack.extend(pair.iter().cloned());
        frame.stack.extend(pair);
        Ok(())
    }
}

impl Decompiler {
    /// Emit `t1, t2[, t3] = v1, v2[, v3]` for a rotation feeding name stores
    fn swap_assign(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
        stores: usize,
    ) -> Result<()> {
        let values = frame.pop_n(stores, instruction)?;
        let mut targets = Vec::with_capacity(stores);
        for _ in 0..stores {
            let store = frame
                .take()
                .ok_or_else(|| Error::internal("swap store vanished"))?;
            targets.push(store_target(frame, store)?);
        }
        frame.emit_assign(Expr::Tuple(targets), Expr::Tuple(values));
        Ok(())
    }
}

/// Target of a store, popping the object and index operands it needs
fn store_target(frame: &mut Frame<'_>, instruction: &Instruction) -> Result<Expr> {
    let target = match instruction.kind {
        OperationKind::StoreAttr => {
            let object = frame.pop(instruction)?;
            Expr::attribute(object, instruction.name()?)
        }
        OperationKind::StoreSubscr => {
            let index = frame.pop(instruction)?;
            let object = frame.pop(instruction)?;
            Expr::Subscript {
                value: Box::new(object),
                index: Box::new(index),
            }
        }
        OperationKind::StoreGlobal => {
            let name = instruction.name()?;
            frame.globals.insert(name.to_string());
            Expr::name(name)
        }
        kind if kind.is_name_store() => Expr::name(instruction.name()?),
        other => {
            return Err(Error::internal(format!("{} is not a store", other)));
        }
    };
    Ok(target)
}

fn definition_name(target: &Expr, instruction: &Instruction) -> Result<String> {
    match target {
        Expr::Name(name) => Ok(name.clone()),
        _ => Err(Error::pattern(
            instruction.position,
            "definition bound to something other than a name",
        )),
    }
}

/// Whether the next `count` instructions are plain name stores
fn swap_stores(frame: &Frame<'_>, count: usize) -> Option<usize> {
    swap_stores_after(frame, 0, count)
}

fn swap_stores_after(frame: &Frame<'_>, skip: usize, count: usize) -> Option<usize> {
    if frame.stack.len() < count {
        return None;
    }
    (0..count)
        .all(|n| {
            frame
                .stream
                .peek_nth(skip + n)
                .map_or(false, |instruction| instruction.kind.is_name_store())
        })
        .then_some(count)
}
