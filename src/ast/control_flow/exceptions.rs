//! `try` statement recognition
//!
//! `SETUP_EXCEPT handler` guards a body ending in `POP_BLOCK JUMP else`. The
//! handler chain that follows runs to its matching `END_FINALLY`; each handler
//! resumes at the same point past the `else` arm. `SETUP_FINALLY final`
//! guards a body ending in `POP_BLOCK LOAD_CONST None`, and the final body
//! runs to its matching `END_FINALLY`.

use super::PatternFamily;
use crate::ast::nodes::{ExceptHandler, Stmt};
use crate::ast::simulator::Frame;
use crate::bytecode::{Constant, Instruction, OperationCategory, OperationKind};
use crate::cfg::block::{Block, Boundary, InstructionStream};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing exception-handling recognition
pub trait ExceptionRecognizer {
    fn recognize_try_except<'i>(&self, frame: &mut Frame<'i>, setup: &'i Instruction)
        -> Result<()>;

    fn recognize_try_finally<'i>(
        &self,
        frame: &mut Frame<'i>,
        setup: &'i Instruction,
    ) -> Result<()>;

    /// Split a handler chain into handlers, returning them with the position
    /// every handler resumes at
    fn split_handlers<'i>(
        &self,
        frame: &mut Frame<'i>,
        chain: Block<'i>,
    ) -> Result<(Vec<ExceptHandler>, Vec<&'i Instruction>)>;
}

impl ExceptionRecognizer for Decompiler {
    fn recognize_try_except<'i>(
        &self,
        frame: &mut Frame<'i>,
        setup: &'i Instruction,
    ) -> Result<()> {
        let handler_start = setup.target()?;
        let try_block = frame
            .stream
            .make_block(handler_start, false, Boundary::Required)?;

        let (try_block, exit_jump) = try_block.strip_last(|i| i.kind.is_unconditional_jump());
        let (try_block, pop_block) = try_block.strip_last(|i| i.is(OperationKind::PopBlock));
        if exit_jump.is_some() && pop_block.is_none() {
            return Err(Error::pattern(
                setup.position,
                "try body leaves without popping its handler",
            ));
        }
        for instruction in exit_jump.iter().chain(pop_block.iter()) {
            frame.mark(instruction);
        }
        let else_start = match exit_jump {
            Some(jump) => Some(frame.resolve(jump.target()?)),
            None => None,
        };

        let mut body = self.descend_statements(frame, try_block, setup.position)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }

        let chain_end = frame
            .stream
            .remaining()
            .closing_end_finally()
            .ok_or_else(|| Error::pattern(handler_start, "handler chain has no END_FINALLY"))?;
        let chain = frame.stream.take(chain_end + 1);
        if chain.start_position() != Some(handler_start) {
            return Err(Error::pattern(
                setup.position,
                format!(
                    "handlers start at {:?}, expected {}",
                    chain.start_position(),
                    handler_start
                ),
            ));
        }
        let (handlers, exits) = self.split_handlers(frame, chain)?;

        let mut resume = None;
        for exit in exits {
            let target = frame.resolve(exit.target()?);
            match resume {
                None => resume = Some(target),
                Some(expected) if expected != target => {
                    return Err(Error::DivergentHandlerResumption {
                        expected,
                        found: target,
                        position: exit.position,
                    })
                }
                Some(_) => {}
            }
        }

        let else_block = match resume.or(else_start) {
            Some(resume) => frame.stream.make_block(resume, false, Boundary::Optional)?,
            None => Block::empty(),
        };
        if else_start.is_some() && else_start != else_block.start_position() && !else_block.is_empty() {
            log::debug!(
                "try at {}: else arm starts at {:?}, body exits to {:?}",
                setup.position,
                else_block.start_position(),
                else_start
            );
        }
        let orelse = self.descend_statements(frame, else_block, setup.position)?;

        self.notify(
            PatternFamily::Exception,
            setup.position,
            else_block
                .end_position()
                .or(chain.end_position())
                .unwrap_or(setup.position),
        );
        frame.emit(Stmt::TryExcept {
            body,
            handlers,
            orelse,
        });
        Ok(())
    }

    fn recognize_try_finally<'i>(
        &self,
        frame: &mut Frame<'i>,
        setup: &'i Instruction,
    ) -> Result<()> {
        let guarded = frame
            .stream
            .make_block(setup.target()?, false, Boundary::Required)?;
        let (guarded, load_none) = guarded.strip_last(|i| is_load_none(i));
        let (guarded, pop_block) = guarded.strip_last(|i| i.is(OperationKind::PopBlock));
        for instruction in load_none.iter().chain(pop_block.iter()) {
            frame.mark(instruction);
        }
        let body = self.descend_statements(frame, guarded, setup.position)?;

        let final_end = frame
            .stream
            .remaining()
            .closing_end_finally()
            .ok_or_else(|| Error::pattern(setup.position, "finally body has no END_FINALLY"))?;
        let final_block = frame.stream.take(final_end);
        frame.take_expected(OperationKind::EndFinally)?;
        let finalbody = self.descend_statements(frame, final_block, setup.position)?;

        self.notify(
            PatternFamily::Exception,
            setup.position,
            final_block.end_position().unwrap_or(setup.position),
        );
        frame.emit(Stmt::TryFinally {
            body,
            finalbody: if finalbody.is_empty() {
                vec![Stmt::Pass]
            } else {
                finalbody
            },
        });
        Ok(())
    }

    fn split_handlers<'i>(
        &self,
        frame: &mut Frame<'i>,
        chain: Block<'i>,
    ) -> Result<(Vec<ExceptHandler>, Vec<&'i Instruction>)> {
        let mut stream = InstructionStream::new(chain);
        let mut handlers = Vec::new();
        let mut exits = Vec::new();

        loop {
            let next = stream
                .peek()
                .ok_or_else(|| Error::internal("handler chain lost its END_FINALLY"))?;
            match next.kind {
                OperationKind::DupTop => {
                    let (handler, exit) = self.typed_handler(frame, &mut stream)?;
                    handlers.push(handler);
                    exits.extend(exit);
                }
                OperationKind::PopTop => {
                    let (handler, exit) = self.bare_handler(frame, &mut stream)?;
                    handlers.push(handler);
                    exits.extend(exit);
                }
                OperationKind::EndFinally => {
                    frame.mark(next);
                    stream.next();
                    break;
                }
                other => {
                    return Err(Error::pattern(
                        next.position,
                        format!("{} cannot start an exception handler", other),
                    ))
                }
            }
        }

        if !stream.is_empty() {
            return Err(Error::pattern(
                stream.next_position().unwrap_or_default(),
                "instructions after the handler chain's END_FINALLY",
            ));
        }
        Ok((handlers, exits))
    }
}

impl Decompiler {
    /// `DUP_TOP <type> COMPARE_OP(exception match) POP_JUMP_IF_FALSE next
    /// POP_TOP (STORE name | POP_TOP) POP_TOP <body>`
    fn typed_handler<'i>(
        &self,
        frame: &mut Frame<'i>,
        stream: &mut InstructionStream<'i>,
    ) -> Result<(ExceptHandler, Option<&'i Instruction>)> {
        let dup = expect(frame, stream, OperationKind::DupTop)?;
        let type_block = stream
            .take_until(|i| i.is_exception_match())
            .ok_or_else(|| Error::pattern(dup.position, "handler without an exception match"))?;
        let kind = self.descend_expression(frame, type_block, dup.position)?;
        expect(frame, stream, OperationKind::CompareOp)?;
        let next_handler = expect(frame, stream, OperationKind::PopJumpIfFalse)?.target()?;

        expect(frame, stream, OperationKind::PopTop)?;
        let binding = stream
            .next()
            .ok_or_else(|| Error::pattern(dup.position, "handler ends before its binding"))?;
        frame.mark(binding);
        let bound_name = match binding.kind {
            store if store.is_name_store() => Some(binding.name()?.to_string()),
            OperationKind::PopTop => None,
            other => {
                return Err(Error::pattern(
                    binding.position,
                    format!("{} cannot bind an exception", other),
                ))
            }
        };
        expect(frame, stream, OperationKind::PopTop)?;

        let body_block = stream.make_block(next_handler, false, Boundary::Required)?;
        let (body, exit) = match &bound_name {
            Some(name) => self.named_handler_body(frame, body_block, name)?,
            None => self.handler_body(frame, body_block)?,
        };
        Ok((
            ExceptHandler {
                kind: Some(kind),
                bound_name,
                body,
            },
            exit,
        ))
    }

    /// `POP_TOP POP_TOP POP_TOP <body>` up to the chain's `END_FINALLY`
    fn bare_handler<'i>(
        &self,
        frame: &mut Frame<'i>,
        stream: &mut InstructionStream<'i>,
    ) -> Result<(ExceptHandler, Option<&'i Instruction>)> {
        for _ in 0..3 {
            expect(frame, stream, OperationKind::PopTop)?;
        }
        let remaining = stream.remaining();
        if remaining.last().map(|i| i.kind) != Some(OperationKind::EndFinally) {
            return Err(Error::pattern(
                remaining.start_position().unwrap_or_default(),
                "bare except must be the last handler",
            ));
        }
        let body_block = stream.take(remaining.len() - 1);
        let (body, exit) = self.handler_body(frame, body_block)?;
        Ok((
            ExceptHandler {
                kind: None,
                bound_name: None,
                body,
            },
            exit,
        ))
    }

    /// Handler body with its trailing `[POP_EXCEPT] [JUMP end]`
    fn handler_body<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
    ) -> Result<(Vec<Stmt>, Option<&'i Instruction>)> {
        let (block, exit) = block.strip_last(|i| i.kind.is_unconditional_jump());
        let (block, pop_except) = block.strip_last(|i| i.is(OperationKind::PopExcept));
        for instruction in exit.iter().chain(pop_except.iter()) {
            frame.mark(instruction);
        }
        let at = block.start_position().unwrap_or_default();
        let mut body = self.descend_statements(frame, block, at)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        Ok((body, exit))
    }

    /// `SETUP_FINALLY cleanup <body> POP_BLOCK POP_EXCEPT LOAD_CONST None
    /// cleanup: LOAD_CONST None STORE name DELETE name END_FINALLY [JUMP end]`
    fn named_handler_body<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        name: &str,
    ) -> Result<(Vec<Stmt>, Option<&'i Instruction>)> {
        let mut stream = InstructionStream::new(block);
        let setup = expect(frame, &mut stream, OperationKind::SetupFinally)?;
        let inner = stream.make_block(setup.target()?, false, Boundary::Required)?;

        let (inner, load_none) = inner.strip_last(|i| is_load_none(i));
        let (inner, pop_except) = inner.strip_last(|i| i.is(OperationKind::PopExcept));
        let (inner, pop_block) = inner.strip_last(|i| i.is(OperationKind::PopBlock));
        for instruction in [load_none, pop_except, pop_block] {
            let instruction = instruction.ok_or_else(|| {
                Error::pattern(setup.position, "named handler body is missing its teardown")
            })?;
            frame.mark(instruction);
        }

        let reset = expect(frame, &mut stream, OperationKind::LoadConst)?;
        if !is_load_none(reset) {
            return Err(Error::pattern(reset.position, "handler name is not reset to None"));
        }
        let store = stream
            .next()
            .filter(|i| i.kind.is_name_store() && i.name().ok() == Some(name))
            .ok_or_else(|| Error::pattern(reset.position, "handler name is not cleared"))?;
        frame.mark(store);
        let delete = stream
            .next()
            .filter(|i| i.kind.category() == OperationCategory::Delete)
            .ok_or_else(|| Error::pattern(store.position, "handler name is not deleted"))?;
        frame.mark(delete);
        expect(frame, &mut stream, OperationKind::EndFinally)?;

        let exit = stream.accept(OperationKind::JumpForward).or_else(|| stream.accept(OperationKind::JumpAbsolute));
        if let Some(exit) = exit {
            frame.mark(exit);
        }
        if !stream.is_empty() {
            return Err(Error::pattern(
                stream.next_position().unwrap_or_default(),
                "instructions after a named handler's cleanup",
            ));
        }

        let at = inner.start_position().unwrap_or(setup.position);
        let mut body = self.descend_statements(frame, inner, at)?;
        if body.is_empty() {
            body.push(Stmt::Pass);
        }
        Ok((body, exit))
    }
}

/// Take the next instruction of a carved stream and record it
fn expect<'i>(
    frame: &mut Frame<'i>,
    stream: &mut InstructionStream<'i>,
    kind: OperationKind,
) -> Result<&'i Instruction> {
    let instruction = stream.expect(kind)?;
    frame.mark(instruction);
    Ok(instruction)
}

pub(crate) fn is_load_none(instruction: &Instruction) -> bool {
    instruction.is(OperationKind::LoadConst)
        && matches!(instruction.constant(), Ok(Constant::None))
}
