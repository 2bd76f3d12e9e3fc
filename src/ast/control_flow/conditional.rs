//! `if` statements and conditional expressions
//!
//! The run gathered from the head jump ends with the instruction that closes
//! the if-body: an unconditional jump past the `else` arm, or a return. The
//! condition spans up to the jump with the farthest target; what follows it is
//! the body. The `else` arm is carved from the stream up to the closing jump's
//! target.

use super::boolean::{is_lone_jump, resolve, BooleanRecognizer, Logic};
use super::PatternFamily;
use crate::ast::nodes::{Expr, Stmt};
use crate::ast::simulator::Frame;
use crate::bytecode::{Instruction, OperationKind};
use crate::cfg::block::{Block, Boundary};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing `if` recognition
pub trait ConditionalRecognizer {
    /// Build an `If` statement or `IfExp` value from a gathered run whose last
    /// instruction closes the body
    fn make_if<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
        left: Expr,
        span: Block<'i>,
    ) -> Result<()>;
}

impl ConditionalRecognizer for Decompiler {
    fn make_if<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
        left: Expr,
        span: Block<'i>,
    ) -> Result<()> {
        let closing = span
            .last()
            .ok_or_else(|| Error::internal("conditional without a closing instruction"))?;
        let block = span.head(span.len() - 1);

        // The condition ends at the jump with the farthest (then latest) target
        let mut condition_end = 0;
        let mut farthest = (0, 0);
        for (index, instruction) in block.iter().enumerate() {
            if instruction.kind.is_boolean_jump() {
                let key = (frame.resolve(instruction.target()?), instruction.position);
                if key > farthest {
                    farthest = key;
                    condition_end = index;
                }
            }
        }

        let logic = self.process_logic(frame, block.head(condition_end + 1), head.position)?;
        let test = if is_lone_jump(&logic) {
            if head.kind == OperationKind::PopJumpIfTrue {
                Expr::not(left)
            } else {
                left
            }
        } else {
            match logic {
                Logic::Chain(chain) => resolve(*chain, left, head.position)?,
                Logic::Expr(_) => {
                    return Err(Error::pattern(head.position, "condition without a jump"))
                }
            }
        };

        let body_block = if closing.kind == OperationKind::ReturnValue {
            span.tail(condition_end + 1)
        } else {
            frame.mark(closing);
            block.tail(condition_end + 1)
        };
        let body = self.descend(frame, body_block, Vec::new())?;

        // A back edge closing an empty body is the `continue` itself, and the
        // code after it still belongs to the loop body
        let bare_continue = closing.kind == OperationKind::JumpAbsolute
            && body.statements.is_empty()
            && body.stack.is_empty()
            && frame.ctx.jump_map.contains_key(&closing.target()?);

        let else_block = if closing.kind == OperationKind::ReturnValue || bare_continue {
            Block::empty()
        } else {
            let resume = frame.resolve(closing.target()?);
            frame.stream.make_block(resume, false, Boundary::Optional)?
        };
        let orelse = self.descend(frame, else_block, Vec::new())?;

        self.notify(
            PatternFamily::Conditional,
            head.position,
            else_block
                .end_position()
                .or(span.end_position())
                .unwrap_or(head.position),
        );

        // Both arms reduced to a single value: a conditional expression
        if body.is_single_value() && orelse.is_single_value() {
            frame.push(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body.into_expression(head.position)?),
                orelse: Box::new(orelse.into_expression(head.position)?),
            });
            return Ok(());
        }

        let mut body = body.into_statements(head.position)?;
        if body.is_empty() {
            body.push(if bare_continue { Stmt::Continue } else { Stmt::Pass });
        }
        let orelse = orelse.into_statements(head.position)?;
        frame.emit(Stmt::If { test, body, orelse });
        Ok(())
    }
}
