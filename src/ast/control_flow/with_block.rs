//! `with` statement recognition

use super::exceptions::is_load_none;
use super::PatternFamily;
use crate::ast::nodes::{Expr, Stmt};
use crate::ast::simulator::Frame;
use crate::bytecode::{Instruction, OperationKind};
use crate::cfg::block::Boundary;
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing `with` recognition
pub trait WithRecognizer {
    /// `SETUP_WITH cleanup (STORE target | POP_TOP) <body> POP_BLOCK
    /// LOAD_CONST None cleanup: WITH_CLEANUP_START WITH_CLEANUP_FINISH
    /// END_FINALLY`
    fn recognize_with<'i>(&self, frame: &mut Frame<'i>, setup: &'i Instruction) -> Result<()>;
}

impl WithRecognizer for Decompiler {
    fn recognize_with<'i>(&self, frame: &mut Frame<'i>, setup: &'i Instruction) -> Result<()> {
        let context = frame.pop(setup)?;
        let cleanup = setup.target()?;
        let block = frame.stream.make_block(cleanup, false, Boundary::Required)?;

        let (block, load_none) = block.strip_last(|i| is_load_none(i));
        let (block, pop_block) = block.strip_last(|i| i.is(OperationKind::PopBlock));
        match (pop_block, load_none) {
            (Some(pop_block), Some(load_none)) => {
                frame.mark(pop_block);
                frame.mark(load_none);
            }
            _ => {
                return Err(Error::pattern(
                    setup.position,
                    "with body does not end in POP_BLOCK LOAD_CONST None",
                ))
            }
        }

        if frame.accept(OperationKind::WithCleanupStart).is_some() {
            frame.take_expected(OperationKind::WithCleanupFinish)?;
        } else {
            frame.take_expected(OperationKind::WithCleanup)?;
        }
        let end_finally = frame.take_expected(OperationKind::EndFinally)?;

        let mut body = self
            .descend(frame, block, vec![Expr::Placeholder])?
            .into_statements(setup.position)?;
        let bound_name = match body.first() {
            Some(Stmt::Expr(Expr::Placeholder)) => None,
            Some(first) => match first.placeholder_target() {
                Some(target) => Some(target.clone()),
                None => {
                    return Err(Error::pattern(
                        setup.position,
                        "with body does not bind or discard its context value",
                    ))
                }
            },
            None => {
                return Err(Error::pattern(
                    setup.position,
                    "with body does not bind or discard its context value",
                ))
            }
        };
        body.remove(0);
        if body.is_empty() {
            body.push(Stmt::Pass);
        }

        self.notify(PatternFamily::With, setup.position, end_finally.position);
        frame.emit(Stmt::With {
            context,
            bound_name,
            body,
        });
        Ok(())
    }
}
