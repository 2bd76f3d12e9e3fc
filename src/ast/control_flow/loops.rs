//! `for` and `while` loop recognition
//!
//! `SETUP_LOOP end` opens a block running to `end`. A top-level
//! `GET_ITER FOR_ITER` pair makes it a `for` loop; otherwise it is a `while`
//! loop, conditional when a test jump targets the loop's `POP_BLOCK`. Anything
//! after the `POP_BLOCK` is the loop's `else` arm.

use super::PatternFamily;
use crate::ast::nodes::{Expr, Stmt};
use crate::ast::simulator::Frame;
use crate::bytecode::{Instruction, OperationKind};
use crate::cfg::block::{Block, Boundary};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing loop recognition
pub trait LoopRecognizer {
    /// `SETUP_LOOP` at the head of the stream
    fn recognize_loop<'i>(&self, frame: &mut Frame<'i>, setup: &'i Instruction) -> Result<()>;

    fn for_loop<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        get_iter: usize,
    ) -> Result<Stmt>;

    fn while_loop<'i>(&self, frame: &mut Frame<'i>, block: Block<'i>) -> Result<Stmt>;
}

impl LoopRecognizer for Decompiler {
    fn recognize_loop<'i>(&self, frame: &mut Frame<'i>, setup: &'i Instruction) -> Result<()> {
        let block = frame
            .stream
            .make_block(setup.target()?, false, Boundary::Optional)?;
        let stmt = match block.top_level_iteration() {
            Some(get_iter) => self.for_loop(frame, block, get_iter)?,
            None => self.while_loop(frame, block)?,
        };
        self.notify(
            PatternFamily::Loop,
            setup.position,
            block.end_position().unwrap_or(setup.position),
        );
        frame.emit(stmt);
        Ok(())
    }

    fn for_loop<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        get_iter: usize,
    ) -> Result<Stmt> {
        let iter = self.descend_expression(frame, block.head(get_iter), block_start(block))?;
        let get_iter_instruction = instruction_at(block, get_iter)?;
        let for_iter = instruction_at(block, get_iter + 1)?;
        frame.mark(get_iter_instruction);
        frame.mark(for_iter);

        let exhausted = for_iter.target()?;
        let pop_block = block
            .index_of_position(exhausted)
            .filter(|&index| block.get(index).map(|i| i.kind) == Some(OperationKind::PopBlock))
            .ok_or_else(|| {
                Error::pattern(
                    for_iter.position,
                    format!("loop exit {} is not the loop's POP_BLOCK", exhausted),
                )
            })?;
        frame.mark(instruction_at(block, pop_block)?);

        let (body_block, back_edge) = block
            .slice(get_iter + 2..pop_block)
            .strip_last(|instruction| {
                instruction.is(OperationKind::JumpAbsolute)
                    && instruction.jump_target == Some(for_iter.position)
            });
        let back_edge = back_edge.ok_or_else(|| {
            Error::pattern(for_iter.position, "for loop body does not jump back to its head")
        })?;
        frame.mark(back_edge);

        let ctx = frame.ctx.with_jump(for_iter.position, exhausted);
        let mut body = self
            .descend_with(frame, body_block, vec![Expr::Placeholder], ctx)?
            .into_statements(for_iter.position)?;
        if body.is_empty() {
            return Err(Error::pattern(for_iter.position, "for loop never binds its target"));
        }
        let target = body
            .remove(0)
            .placeholder_target()
            .cloned()
            .ok_or_else(|| Error::pattern(for_iter.position, "for loop target is not a store"))?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }

        let orelse = self.descend_statements(frame, block.tail(pop_block + 1), exhausted)?;
        log::debug!("for loop at {} with {} statement(s)", for_iter.position, body.len());
        Ok(Stmt::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn while_loop<'i>(&self, frame: &mut Frame<'i>, block: Block<'i>) -> Result<Stmt> {
        let head = block_start(block);
        let is_back_edge =
            |instruction: &Instruction| instruction.jumps_to(head) && instruction.is(OperationKind::JumpAbsolute);

        let pop_block = block.closing_pop_block();
        if let Some(pop_block) = pop_block {
            frame.mark(instruction_at(block, pop_block)?);
        }

        if let Some(pop_block) = pop_block {
            if let Some(test_jump) = loop_test(block, pop_block) {
                let jump = instruction_at(block, test_jump)?;
                frame.mark(jump);
                let test = self.descend_expression(frame, block.head(test_jump), head)?;
                let test = if jump.is(OperationKind::PopJumpIfTrue) {
                    Expr::not(test)
                } else {
                    test
                };

                let (body_block, back_edge) =
                    block.slice(test_jump + 1..pop_block).strip_last(is_back_edge);
                let body_end = match back_edge {
                    Some(back_edge) => {
                        frame.mark(back_edge);
                        back_edge.position
                    }
                    None => block.get(pop_block).map_or(head, |i| i.position),
                };
                let ctx = frame.ctx.with_jump(head, body_end);
                let body = self
                    .descend_with(frame, body_block, Vec::new(), ctx)?
                    .into_statements(head)?;
                let orelse = self.descend_statements(frame, block.tail(pop_block + 1), head)?;
                return Ok(Stmt::While {
                    test,
                    body: non_empty(body),
                    orelse,
                });
            }
        }

        // `while True`: the back edge separates the body from the else arm
        let (body_block, orelse_block) = match pop_block {
            Some(pop_block) => {
                let (body_block, back_edge) = block.head(pop_block).strip_last(is_back_edge);
                if let Some(back_edge) = back_edge {
                    frame.mark(back_edge);
                }
                (body_block, block.tail(pop_block + 1))
            }
            None => match block.iter().rposition(|instruction| is_back_edge(instruction)) {
                Some(back_edge) => {
                    frame.mark(instruction_at(block, back_edge)?);
                    (block.head(back_edge), block.tail(back_edge + 1))
                }
                None => (block, Block::empty()),
            },
        };
        let body_end = body_block.end_position().unwrap_or(head);
        let ctx = frame.ctx.with_jump(head, body_end);
        let body = self
            .descend_with(frame, body_block, Vec::new(), ctx)?
            .into_statements(head)?;
        let orelse = self.descend_statements(frame, orelse_block, head)?;
        Ok(Stmt::While {
            test: Expr::constant(true),
            body: non_empty(body),
            orelse,
        })
    }
}

/// Index of the last test jump exiting to the loop's `POP_BLOCK`, searched
/// before the body opens any nested block
fn loop_test(block: Block<'_>, pop_block: usize) -> Option<usize> {
    let exit = block.get(pop_block)?.position;
    let limit = block
        .iter()
        .position(|instruction| instruction.kind.is_setup())
        .map_or(pop_block, |setup| setup.min(pop_block));
    block.head(limit).iter().rposition(|instruction| {
        matches!(
            instruction.kind,
            OperationKind::PopJumpIfFalse | OperationKind::PopJumpIfTrue
        ) && instruction.jump_target == Some(exit)
    })
}

fn block_start(block: Block<'_>) -> u32 {
    block.start_position().unwrap_or_default()
}

fn instruction_at<'i>(block: Block<'i>, index: usize) -> Result<&'i Instruction> {
    block
        .get(index)
        .ok_or_else(|| Error::internal(format!("loop block has no instruction {}", index)))
}

fn non_empty(mut body: Vec<Stmt>) -> Vec<Stmt> {
    if body.is_empty() {
        body.push(Stmt::Pass);
    }
    body
}
