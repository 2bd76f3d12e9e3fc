//! Comprehension recognition
//!
//! Inside a comprehension code object each `for` clause is a `FOR_ITER` loop
//! whose body first binds the clause target, then applies filters that jump
//! back to the clause head, and finally hands the element to the accumulator
//! (`LIST_APPEND`, `SET_ADD`, `MAP_ADD`, or `YIELD_VALUE POP_TOP` for
//! generators). Inner clauses are `GET_ITER FOR_ITER` loops nested in the
//! outer body. At the call site, `GET_ITER CALL_FUNCTION 1` applied to the
//! comprehension function splices the reconstructed comprehension in place,
//! with its `.0` source replaced by the real iterable.

use super::boolean::{resolve, BooleanRecognizer, Logic};
use super::PatternFamily;
use crate::ast::nodes::{Comprehension, ComprehensionKind, Expr, Generator, Stmt};
use crate::ast::simulator::{AppendKind, Clause, ClauseElement, ClauseScope, Frame, FrameContext};
use crate::bytecode::code_object::is_comprehension_name;
use crate::bytecode::{Instruction, OperationKind};
use crate::cfg::block::Boundary;
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Name of the implicit iterator argument of comprehension code objects
const ITERATOR_ARGUMENT: &str = ".0";

/// Trait providing comprehension recognition
pub trait ComprehensionRecognizer {
    /// `GET_ITER` followed by the comprehension call or an inline clause
    fn recognize_iteration<'i>(&self, frame: &mut Frame<'i>, get_iter: &'i Instruction)
        -> Result<()>;

    /// `FOR_ITER` of the outermost clause inside a comprehension code object
    fn recognize_inline_comprehension<'i>(
        &self,
        frame: &mut Frame<'i>,
        for_iter: &'i Instruction,
    ) -> Result<()>;

    /// Whether a conditional jump filters the enclosing clause
    fn is_clause_filter(&self, frame: &Frame<'_>, jump: &Instruction) -> bool;

    fn record_clause_filter(&self, frame: &mut Frame<'_>, jump: &Instruction) -> Result<()>;

    /// Length of the boolean run after `jump` that ends in a clause filter
    /// (`if a or b`), if `jump` opens one
    fn compound_filter_len(&self, frame: &Frame<'_>, jump: &Instruction) -> Option<usize>;

    fn record_compound_filter<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
        len: usize,
    ) -> Result<()>;

    /// `LIST_APPEND`, `SET_ADD` or `MAP_ADD`
    fn record_clause_element(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `YIELD_VALUE POP_TOP` of a generator expression
    fn record_generator_element(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<()>;
}

impl ComprehensionRecognizer for Decompiler {
    fn recognize_iteration<'i>(
        &self,
        frame: &mut Frame<'i>,
        get_iter: &'i Instruction,
    ) -> Result<()> {
        match frame.stream.peek() {
            Some(next) if next.is(OperationKind::CallFunction) && is_comprehension_call(frame, next) => {
                self.splice_comprehension(frame, get_iter)
            }
            Some(next) if next.is(OperationKind::ForIter) => {
                let for_iter = frame.take_expected(OperationKind::ForIter)?;
                self.comprehension_clause(frame, for_iter)
            }
            _ => Err(Error::pattern(
                get_iter.position,
                "GET_ITER outside a loop or comprehension",
            )),
        }
    }

    fn recognize_inline_comprehension<'i>(
        &self,
        frame: &mut Frame<'i>,
        for_iter: &'i Instruction,
    ) -> Result<()> {
        self.comprehension_clause(frame, for_iter)
    }

    fn is_clause_filter(&self, frame: &Frame<'_>, jump: &Instruction) -> bool {
        match (frame.ctx.clause, jump.jump_target) {
            (Some(scope), Some(target)) => {
                target == scope.head || Some(target) == scope.back_edge
            }
            _ => false,
        }
    }

    fn record_clause_filter(&self, frame: &mut Frame<'_>, jump: &Instruction) -> Result<()> {
        let test = frame.pop(jump)?;
        let test = if jump.is(OperationKind::PopJumpIfTrue) {
            Expr::not(test)
        } else {
            test
        };
        frame.clause.ifs.push(test);
        Ok(())
    }

    fn compound_filter_len(&self, frame: &Frame<'_>, jump: &Instruction) -> Option<usize> {
        let scope = frame.ctx.clause?;
        let remaining = frame.stream.remaining();
        let mut farthest = jump.jump_target?;
        for (index, instruction) in remaining.iter().enumerate() {
            if instruction.kind.is_boolean_jump() {
                let target = instruction.jump_target?;
                if target == scope.head || Some(target) == scope.back_edge {
                    // Every other jump of the run lands inside it or on the
                    // instruction that follows the filter
                    let resume = remaining.get(index + 1)?.position;
                    return (farthest <= resume).then(|| index + 1);
                }
                farthest = farthest.max(target);
            } else if instruction.kind.has_jump_target()
                || instruction.kind.ends_statement()
                || matches!(
                    instruction.kind,
                    OperationKind::ListAppend
                        | OperationKind::SetAdd
                        | OperationKind::MapAdd
                        | OperationKind::YieldValue
                        | OperationKind::GetIter
                )
            {
                return None;
            }
        }
        None
    }

    fn record_compound_filter<'i>(
        &self,
        frame: &mut Frame<'i>,
        head: &'i Instruction,
        len: usize,
    ) -> Result<()> {
        let left = frame.pop(head)?;
        let mark = frame.stream.mark().saturating_sub(1);
        frame.stream.take(len);
        let run = frame.stream.consumed_since(mark);
        let test = match self.process_logic(frame, run, head.position)? {
            Logic::Chain(chain) => resolve(*chain, left, head.position)?,
            Logic::Expr(_) => return Err(Error::internal("filter run without an operator")),
        };
        log::debug!(
            "compound filter {}..{:?}",
            head.position,
            run.end_position()
        );
        self.notify(
            PatternFamily::Boolean,
            head.position,
            run.end_position().unwrap_or(head.position),
        );
        frame.clause.ifs.push(test);
        Ok(())
    }

    fn record_clause_element(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        if frame.ctx.clause.is_none() {
            return Err(Error::pattern(
                instruction.position,
                format!("{} outside a comprehension", instruction.kind),
            ));
        }
        let element = match instruction.kind {
            OperationKind::ListAppend => ClauseElement {
                kind: AppendKind::List,
                element: frame.pop(instruction)?,
                value: None,
            },
            OperationKind::SetAdd => ClauseElement {
                kind: AppendKind::Set,
                element: frame.pop(instruction)?,
                value: None,
            },
            OperationKind::MapAdd => {
                let key = frame.pop(instruction)?;
                let value = frame.pop(instruction)?;
                ClauseElement {
                    kind: AppendKind::Map,
                    element: key,
                    value: Some(value),
                }
            }
            other => return Err(Error::internal(format!("{} does not append", other))),
        };
        set_element(frame, element, instruction)
    }

    fn record_generator_element(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<()> {
        let element = frame.pop(instruction)?;
        frame.take_expected(OperationKind::PopTop)?;
        set_element(
            frame,
            ClauseElement {
                kind: AppendKind::Yield,
                element,
                value: None,
            },
            instruction,
        )
    }
}

impl Decompiler {
    /// One `for` clause: carve its body, simulate it with the clause target
    /// as a placeholder, and collect target, filters and element
    fn comprehension_clause<'i>(
        &self,
        frame: &mut Frame<'i>,
        for_iter: &'i Instruction,
    ) -> Result<()> {
        let nested = frame.ctx.clause.is_some();
        if nested && !self.options().nested_comprehensions {
            return Err(Error::pattern(
                for_iter.position,
                "nested comprehension clauses are disabled",
            ));
        }

        let iter = frame.pop(for_iter)?;
        let exhausted = for_iter.target()?;
        let body = frame
            .stream
            .make_block(exhausted, false, Boundary::Optional)?;
        let (body, back_edge) = body.strip_last(|instruction| {
            instruction.is(OperationKind::JumpAbsolute)
                && instruction.jump_target == Some(for_iter.position)
        });
        let back_edge = back_edge.ok_or_else(|| {
            Error::pattern(for_iter.position, "comprehension clause does not loop back")
        })?;
        frame.mark(back_edge);

        let mut ctx: FrameContext = frame.ctx.with_jump(for_iter.position, exhausted);
        ctx.clause = Some(ClauseScope {
            head: for_iter.position,
            back_edge: Some(back_edge.position),
        });
        let output = self.descend_with(frame, body, vec![Expr::Placeholder], ctx)?;
        if !output.stack.is_empty() {
            return Err(Error::stack(format!(
                "comprehension clause at {} left {} value(s) on the stack",
                for_iter.position,
                output.stack.len()
            )));
        }
        let target = match output.statements.as_slice() {
            [binding] => binding.placeholder_target().cloned(),
            _ => None,
        }
        .ok_or_else(|| {
            Error::pattern(
                for_iter.position,
                "comprehension clause must only bind its target",
            )
        })?;

        let parts = output.clause;
        let mut generators = vec![Generator {
            target,
            iter,
            ifs: parts.ifs,
        }];
        let element = match (parts.nested, parts.element) {
            (Some(inner), None) => {
                generators.extend(inner.generators);
                inner.element
            }
            (None, Some(element)) => element,
            _ => {
                return Err(Error::pattern(
                    for_iter.position,
                    "comprehension clause must produce exactly one element",
                ))
            }
        };
        let clause = Clause {
            generators,
            element,
        };

        if nested {
            if frame.clause.nested.is_some() || frame.clause.element.is_some() {
                return Err(Error::pattern(
                    for_iter.position,
                    "comprehension clause already produced its element",
                ));
            }
            frame.clause.nested = Some(clause);
            return Ok(());
        }

        let kind = clause.element.kind;
        let comprehension = Expr::Comprehension(Box::new(Comprehension {
            kind: comprehension_kind(kind),
            element: clause.element.element,
            value: clause.element.value,
            generators: clause.generators,
        }));
        self.notify(PatternFamily::Comprehension, for_iter.position, exhausted);

        if kind == AppendKind::Yield {
            frame.emit(Stmt::Expr(comprehension));
            return Ok(());
        }
        match frame.pop(for_iter)? {
            Expr::List(items) if kind == AppendKind::List && items.is_empty() => {}
            Expr::Set(items) if kind == AppendKind::Set && items.is_empty() => {}
            Expr::Dict(items) if kind == AppendKind::Map && items.is_empty() => {}
            other => {
                return Err(Error::stack(format!(
                    "comprehension at {} accumulates into {:?}",
                    for_iter.position, other
                )))
            }
        }
        frame.push(comprehension);
        Ok(())
    }

    /// `<function> <iterable> GET_ITER CALL_FUNCTION 1`
    fn splice_comprehension<'i>(
        &self,
        frame: &mut Frame<'i>,
        get_iter: &'i Instruction,
    ) -> Result<()> {
        let call = frame.take_expected(OperationKind::CallFunction)?;
        let iterable = frame.pop(call)?;
        let function = match frame.pop(call)? {
            Expr::Function(function) => function,
            _ => return Err(Error::internal("comprehension function vanished")),
        };
        let body: Vec<&Stmt> = function
            .body
            .iter()
            .filter(|stmt| !matches!(stmt, Stmt::Return(Some(value)) if value.is_none_constant()))
            .collect();
        let mut comprehension = match body.as_slice() {
            [Stmt::Return(Some(Expr::Comprehension(comprehension)))]
            | [Stmt::Expr(Expr::Comprehension(comprehension))] => comprehension.clone(),
            _ => {
                return Err(Error::pattern(
                    get_iter.position,
                    format!("{} does not build a comprehension", function.name),
                ))
            }
        };
        let source = comprehension
            .generators
            .iter_mut()
            .find(|generator| generator.iter == Expr::name(ITERATOR_ARGUMENT))
            .ok_or_else(|| {
                Error::pattern(get_iter.position, "comprehension never reads its iterator argument")
            })?;
        source.iter = iterable;

        log::debug!(
            "spliced {} into {}..={}",
            function.name,
            get_iter.position,
            call.position
        );
        frame.push(Expr::Comprehension(comprehension));
        Ok(())
    }
}

fn is_comprehension_call(frame: &Frame<'_>, call: &Instruction) -> bool {
    call.count().ok() == Some(1)
        && frame.stack.len() >= 2
        && matches!(
            &frame.stack[frame.stack.len() - 2],
            Expr::Function(function) if is_comprehension_name(&function.name)
        )
}

fn set_element(frame: &mut Frame<'_>, element: ClauseElement, at: &Instruction) -> Result<()> {
    if frame.clause.element.is_some() || frame.clause.nested.is_some() {
        return Err(Error::pattern(
            at.position,
            "comprehension clause produces more than one element",
        ));
    }
    frame.clause.element = Some(element);
    Ok(())
}

fn comprehension_kind(kind: AppendKind) -> ComprehensionKind {
    match kind {
        AppendKind::List => ComprehensionKind::List,
        AppendKind::Set => ComprehensionKind::Set,
        AppendKind::Map => ComprehensionKind::Dict,
        AppendKind::Yield => ComprehensionKind::Generator,
    }
}
