//! Short-circuit boolean recognition
//!
//! A boolean run starts at an AND/OR jump whose left operand is already on the
//! stack. The run extends to the farthest target of any jump inside it. It is
//! parsed into a [`Logic`] chain: a jump that lands past the run leaves the
//! operator open on the left ("hole"), while a jump that lands inside the run
//! splits it into a right operand and an enclosing parent. Resolving the chain
//! with the left operand yields nested [`Expr::BoolOp`]s.

use super::{ConditionalRecognizer, PatternFamily};
use crate::ast::nodes::{BoolOperator, Expr};
use crate::ast::simulator::Frame;
use crate::bytecode::{Instruction, OperationKind};
use crate::cfg::block::Block;
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Parsed boolean run
#[derive(Debug, Clone, PartialEq)]
pub enum Logic {
    Expr(Expr),
    Chain(Box<Chain>),
}

/// One operator of a boolean run
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub op: BoolOperator,
    /// Operand following the jump; `None` for a lone jump
    pub right: Option<Logic>,
    /// Operator this one nests under
    pub parent: Option<Logic>,
}

impl Chain {
    fn is_lone_jump(&self) -> bool {
        self.right.is_none() && self.parent.is_none()
    }
}

/// Trait providing boolean run recognition
pub trait BooleanRecognizer {
    /// `POP_JUMP_IF_*` at statement level: an `if` or a boolean value
    fn recognize_conditional_jump<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
    ) -> Result<()>;

    /// `JUMP_IF_*_OR_POP`: always a boolean value
    fn recognize_boolean_value<'i>(&self, frame: &mut Frame<'i>, head: &'i Instruction)
        -> Result<()>;

    /// Take the boolean run starting at `head` (already taken) from the stream
    fn gather_jumps<'i>(&self, frame: &mut Frame<'i>, head: &'i Instruction) -> Result<Block<'i>>;

    /// Parse a run into a logic chain; jumps other than `head` are recorded
    fn process_logic<'i>(&self, frame: &mut Frame<'i>, block: Block<'i>, head: u32) -> Result<Logic>;
}

impl BooleanRecognizer for Decompiler {
    fn recognize_conditional_jump<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
    ) -> Result<()> {
        let left = frame.pop(head)?;
        let span = self.gather_jumps(frame, head)?;
        let closes_statement = span.last().map_or(false, |last| {
            last.kind.is_unconditional_jump() || last.kind == OperationKind::ReturnValue
        });
        if closes_statement && span.len() > 1 {
            return self.make_if(frame, head, left, span);
        }
        self.boolean_value(frame, head, left, span)
    }

    fn recognize_boolean_value<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
    ) -> Result<()> {
        let left = frame.pop(head)?;
        let span = self.gather_jumps(frame, head)?;
        self.boolean_value(frame, head, left, span)
    }

    fn gather_jumps<'i>(&self, frame: &mut Frame<'i>, head: &'i Instruction) -> Result<Block<'i>> {
        let to = frame.resolve(head.target()?);
        if to <= head.position {
            return Err(Error::pattern(
                head.position,
                format!("boolean jump to {} does not move forward", to),
            ));
        }

        let mark = frame.stream.mark().saturating_sub(1);
        let remaining = frame.stream.remaining();
        let mut end = remaining.index_of_position(to).unwrap_or(remaining.len());
        loop {
            let mut farthest = None;
            for instruction in remaining.head(end) {
                if instruction.kind.is_boolean_jump() {
                    let target = frame.resolve(instruction.target()?);
                    farthest = farthest.max(Some(target));
                }
            }
            let extended = match farthest {
                Some(target) => remaining.index_of_position(target).unwrap_or(remaining.len()),
                None => end,
            };
            if extended <= end {
                break;
            }
            end = extended;
        }

        frame.stream.take(end);
        let span = frame.stream.consumed_since(mark);
        log::trace!(
            "boolean run {}..{:?} from {}",
            head.position,
            span.end_position(),
            head.kind
        );
        Ok(span)
    }

    fn process_logic<'i>(&self, frame: &mut Frame<'i>, block: Block<'i>, head: u32) -> Result<Logic> {
        let first = block
            .first()
            .ok_or_else(|| Error::internal("empty boolean operand"))?;

        if first.kind.is_boolean_jump() {
            if first.position != head {
                frame.mark(first);
            }
            let op = operator(first.kind);
            let split = match block.index_of_position(first.target()?) {
                None => None,
                Some(index) if index >= 3 => Some(index - 1),
                Some(_) => {
                    return Err(Error::pattern(
                        first.position,
                        "boolean jump lands on its own operand",
                    ))
                }
            };
            let chain = match split {
                None => Chain {
                    op,
                    right: if block.len() == 1 {
                        None
                    } else {
                        Some(self.process_logic(frame, block.tail(1), head)?)
                    },
                    parent: None,
                },
                Some(split) => Chain {
                    op,
                    right: Some(self.process_logic(frame, block.slice(1..split), head)?),
                    parent: Some(self.process_logic(frame, block.tail(split), head)?),
                },
            };
            return Ok(Logic::Chain(Box::new(chain)));
        }

        let at = first.position;
        match block.iter().position(|instruction| instruction.kind.is_boolean_jump()) {
            None => Ok(Logic::Expr(self.descend_expression(frame, block, at)?)),
            Some(index) => {
                let parent = self.descend_expression(frame, block.head(index), at)?;
                match self.process_logic(frame, block.tail(index), head)? {
                    Logic::Chain(mut chain) => {
                        if chain.parent.is_some() {
                            return Err(Error::pattern(at, "boolean operand has two parents"));
                        }
                        if chain.right.is_none() {
                            return Ok(Logic::Expr(parent));
                        }
                        chain.parent = Some(Logic::Expr(parent));
                        Ok(Logic::Chain(chain))
                    }
                    Logic::Expr(_) => Err(Error::internal("jump-led run parsed as a plain operand")),
                }
            }
        }
    }
}

impl Decompiler {
    /// Resolve a run as a value and push it
    fn boolean_value<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
        left: Expr,
        span: Block<'i>,
    ) -> Result<()> {
        let logic = self.process_logic(frame, span, head.position)?;
        let value = match logic {
            Logic::Chain(chain) => resolve(*chain, left, head.position)?,
            Logic::Expr(_) => return Err(Error::internal("boolean run without an operator")),
        };
        self.notify(
            PatternFamily::Boolean,
            head.position,
            span.end_position().unwrap_or(head.position),
        );
        frame.push(value);
        Ok(())
    }
}

/// Fill the chain's hole with `hole` and close every enclosing operator
pub fn resolve(chain: Chain, hole: Expr, at: u32) -> Result<Expr> {
    let right = match chain.right {
        Some(right) => close(right, at)?,
        None => return Err(Error::pattern(at, "boolean operator without a right operand")),
    };
    let node = Expr::bool_op(chain.op, hole, right);
    match chain.parent {
        None => Ok(node),
        Some(Logic::Chain(parent)) => resolve(*parent, node, at),
        Some(Logic::Expr(_)) => Err(Error::pattern(
            at,
            "boolean run closed before its left operand",
        )),
    }
}

/// A right operand must be complete: either a plain value or a chain whose
/// own left operand is already known
fn close(logic: Logic, at: u32) -> Result<Expr> {
    match logic {
        Logic::Expr(expr) => Ok(expr),
        Logic::Chain(chain) => match *chain {
            Chain {
                op,
                right: Some(right),
                parent: Some(Logic::Expr(parent)),
            } => Ok(Expr::bool_op(op, parent, close(right, at)?)),
            _ => Err(Error::pattern(at, "unbalanced boolean operand")),
        },
    }
}

/// Whether a parsed condition is a single jump with nothing to combine
pub fn is_lone_jump(logic: &Logic) -> bool {
    matches!(logic, Logic::Chain(chain) if chain.is_lone_jump())
}

fn operator(kind: OperationKind) -> BoolOperator {
    if kind.is_or_jump() {
        BoolOperator::Or
    } else {
        BoolOperator::And
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_fills_innermost_hole() {
        // (a or b) and c
        let chain = Chain {
            op: BoolOperator::Or,
            right: Some(Logic::Expr(Expr::name("b"))),
            parent: Some(Logic::Chain(Box::new(Chain {
                op: BoolOperator::And,
                right: Some(Logic::Expr(Expr::name("c"))),
                parent: None,
            }))),
        };
        let expr = resolve(chain, Expr::name("a"), 0).unwrap();
        assert_eq!(
            expr,
            Expr::BoolOp {
                op: BoolOperator::And,
                operands: vec![
                    Expr::BoolOp {
                        op: BoolOperator::Or,
                        operands: vec![Expr::name("a"), Expr::name("b")],
                    },
                    Expr::name("c"),
                ],
            }
        );
    }

    #[test]
    fn closed_right_operand_nests() {
        // a or (b and c)
        let chain = Chain {
            op: BoolOperator::Or,
            right: Some(Logic::Chain(Box::new(Chain {
                op: BoolOperator::And,
                right: Some(Logic::Expr(Expr::name("c"))),
                parent: Some(Logic::Expr(Expr::name("b"))),
            }))),
            parent: None,
        };
        let expr = resolve(chain, Expr::name("a"), 0).unwrap();
        assert_eq!(
            expr,
            Expr::BoolOp {
                op: BoolOperator::Or,
                operands: vec![
                    Expr::name("a"),
                    Expr::BoolOp {
                        op: BoolOperator::And,
                        operands: vec![Expr::name("b"), Expr::name("c")],
                    },
                ],
            }
        );
    }

    #[test]
    fn lone_jump_cannot_resolve() {
        let chain = Chain {
            op: BoolOperator::And,
            right: None,
            parent: None,
        };
        assert!(is_lone_jump(&Logic::Chain(Box::new(chain.clone()))));
        assert!(resolve(chain, Expr::name("a"), 4).is_err());
    }
}
