//! Evaluation stack simulator
//!
//! Consumes one block linearly while maintaining a symbolic operand stack of
//! expression nodes. Plain operations push, pop and combine nodes; statement
//! terminators emit [`Stmt`]s; branches, block setups and iterator operations
//! are handed to the control-flow recognizers, which carve the span they own
//! out of the frame's stream and recurse on the pieces.
//!
//! The instruction-family handlers live in sub-modules as helper traits
//! implemented on [`Decompiler`]:
//!
//! - `arithmetic`: unary, binary, in-place and comparison operators
//! - `variables`: loads, stores, deletes, unpacking and stack shuffles
//! - `objects`: attributes, subscripts and collection displays
//! - `functions`: function and class construction, calls, return/raise/yield
//! - `imports`: `import` and `from ... import` sequences

pub mod arithmetic;
pub mod functions;
pub mod imports;
pub mod objects;
pub mod variables;

use crate::ast::control_flow::{
    BooleanRecognizer, ComprehensionRecognizer, ExceptionRecognizer, LoopRecognizer,
    WithRecognizer,
};
use crate::ast::nodes::{Expr, Generator, Stmt};
use crate::bytecode::{Instruction, OperationKind};
use crate::cfg::block::{Block, InstructionStream};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};

pub use arithmetic::ArithmeticHelpers;
pub use functions::FunctionHelpers;
pub use imports::ImportHelpers;
pub use objects::ObjectHelpers;
pub use variables::VariableHelpers;

/// Comprehension clause being reconstructed by an enclosing frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseScope {
    /// Position of the clause's `FOR_ITER`
    pub head: u32,
    /// Position of the jump back to `head`
    pub back_edge: Option<u32>,
}

/// Context inherited by every frame carved out of the same construct
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    /// Jump targets to reinterpret, mapping a loop head to the end of its body
    pub jump_map: HashMap<u32, u32>,
    pub clause: Option<ClauseScope>,
}

impl FrameContext {
    /// Apply the jump map to a target
    pub fn resolve(&self, target: u32) -> u32 {
        self.jump_map.get(&target).copied().unwrap_or(target)
    }

    pub fn with_jump(&self, from: u32, to: u32) -> Self {
        let mut ctx = self.clone();
        ctx.jump_map.insert(from, to);
        ctx
    }
}

/// How a comprehension body hands its element to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendKind {
    List,
    Set,
    Map,
    Yield,
}

/// Element produced by the innermost clause of a comprehension
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseElement {
    pub kind: AppendKind,
    pub element: Expr,
    pub value: Option<Expr>,
}

/// A fully reconstructed chain of comprehension clauses
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub generators: Vec<Generator>,
    pub element: ClauseElement,
}

/// Comprehension pieces recorded while simulating a clause body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseParts {
    pub ifs: Vec<Expr>,
    pub element: Option<ClauseElement>,
    pub nested: Option<Clause>,
}

impl ClauseParts {
    pub fn is_empty(&self) -> bool {
        self.ifs.is_empty() && self.element.is_none() && self.nested.is_none()
    }
}

/// Result of simulating one block
#[derive(Debug, Clone, Default)]
pub struct BlockOutput {
    pub statements: Vec<Stmt>,
    pub stack: Vec<Expr>,
    /// Positions consumed by this block and everything carved from it
    pub consumed: Vec<u32>,
    /// Names declared global by `STORE_GLOBAL`/`DELETE_GLOBAL`
    pub globals: BTreeSet<String>,
    pub clause: ClauseParts,
}

/// Per-block simulation state
#[derive(Debug)]
pub struct Frame<'i> {
    pub stream: InstructionStream<'i>,
    pub stack: Vec<Expr>,
    pub statements: Vec<Stmt>,
    pub consumed: Vec<u32>,
    pub globals: BTreeSet<String>,
    pub ctx: FrameContext,
    pub clause: ClauseParts,
    /// The last emitted `Assign` may take further targets (`a = b = x`)
    pub(crate) chain_open: bool,
    /// The value on top of the stack was duplicated for a store
    pub(crate) dup_feeds_store: bool,
}

impl<'i> Frame<'i> {
    pub fn new(block: Block<'i>, seed: Vec<Expr>, ctx: FrameContext) -> Self {
        Self {
            stream: InstructionStream::new(block),
            stack: seed,
            statements: Vec::new(),
            consumed: Vec::with_capacity(block.len()),
            globals: BTreeSet::new(),
            ctx,
            clause: ClauseParts::default(),
            chain_open: false,
            dup_feeds_store: false,
        }
    }

    /// Take the next instruction and record it as consumed
    pub fn take(&mut self) -> Option<&'i Instruction> {
        let instruction = self.stream.next()?;
        self.consumed.push(instruction.position);
        Some(instruction)
    }

    /// Take the next instruction, which must be of `kind`
    pub fn take_expected(&mut self, kind: OperationKind) -> Result<&'i Instruction> {
        let instruction = self.stream.expect(kind)?;
        self.consumed.push(instruction.position);
        Ok(instruction)
    }

    /// Take the next instruction when it is of `kind`
    pub fn accept(&mut self, kind: OperationKind) -> Option<&'i Instruction> {
        let instruction = self.stream.accept(kind)?;
        self.consumed.push(instruction.position);
        Some(instruction)
    }

    /// Record an instruction that a recognizer consumed structurally
    pub fn mark(&mut self, instruction: &Instruction) {
        self.consumed.push(instruction.position);
    }

    pub fn push(&mut self, expr: Expr) {
        self.stack.push(expr);
    }

    pub fn pop(&mut self, at: &Instruction) -> Result<Expr> {
        self.stack.pop().ok_or_else(|| {
            Error::stack(format!(
                "{} at {} needs an operand but the stack is empty",
                at.kind, at.position
            ))
        })
    }

    /// Pop `count` values, returned in push order
    pub fn pop_n(&mut self, count: usize, at: &Instruction) -> Result<Vec<Expr>> {
        if self.stack.len() < count {
            return Err(Error::stack(format!(
                "{} at {} needs {} operands but the stack holds {}",
                at.kind,
                at.position,
                count,
                self.stack.len()
            )));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    pub fn top(&self) -> Option<&Expr> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Expr> {
        self.stack.last_mut()
    }

    /// Append a statement that does not continue an assignment chain
    pub fn emit(&mut self, stmt: Stmt) {
        self.chain_open = false;
        self.dup_feeds_store = false;
        self.statements.push(stmt);
    }

    /// Emit `target = value`, extending the previous assignment when the
    /// value was duplicated for a chained store
    pub fn emit_assign(&mut self, target: Expr, value: Expr) {
        if self.chain_open {
            if let Some(Stmt::Assign {
                targets,
                value: previous,
            }) = self.statements.last_mut()
            {
                if *previous == value {
                    targets.push(target);
                    self.chain_open = self.dup_feeds_store;
                    self.dup_feeds_store = false;
                    return;
                }
            }
        }
        self.statements.push(Stmt::assign(target, value));
        self.chain_open = self.dup_feeds_store;
        self.dup_feeds_store = false;
    }

    /// Fold a child frame's ledger and global declarations into this frame
    pub fn absorb(&mut self, output: &mut BlockOutput) {
        self.consumed.append(&mut output.consumed);
        self.globals.append(&mut output.globals);
    }

    pub fn resolve(&self, target: u32) -> u32 {
        self.ctx.resolve(target)
    }

    pub fn into_output(self) -> BlockOutput {
        BlockOutput {
            statements: self.statements,
            stack: self.stack,
            consumed: self.consumed,
            globals: self.globals,
            clause: self.clause,
        }
    }
}

impl BlockOutput {
    /// Statements of a block that must leave nothing on the stack
    pub fn into_statements(self, at: u32) -> Result<Vec<Stmt>> {
        if !self.stack.is_empty() {
            return Err(Error::stack(format!(
                "block at {} left {} value(s) on the stack",
                at,
                self.stack.len()
            )));
        }
        if !self.clause.is_empty() {
            return Err(Error::pattern(
                at,
                "comprehension element outside a comprehension",
            ));
        }
        Ok(self.statements)
    }

    /// Whether the block reduced to exactly one value and nothing else
    pub fn is_single_value(&self) -> bool {
        self.statements.is_empty() && self.stack.len() == 1 && self.clause.is_empty()
    }

    /// The single value of an expression fragment
    pub fn into_expression(mut self, at: u32) -> Result<Expr> {
        if !self.statements.is_empty() || self.stack.len() != 1 {
            return Err(Error::stack(format!(
                "expression fragment at {} produced {} statement(s) and {} value(s)",
                at,
                self.statements.len(),
                self.stack.len()
            )));
        }
        self.stack
            .pop()
            .ok_or_else(|| Error::internal("expression fragment lost its value"))
    }
}

impl Decompiler {
    /// Simulate a block from start to end
    pub(crate) fn run<'i>(
        &self,
        block: Block<'i>,
        seed: Vec<Expr>,
        ctx: FrameContext,
    ) -> Result<BlockOutput> {
        let mut frame = Frame::new(block, seed, ctx);
        while !frame.stream.is_empty() {
            self.step(&mut frame)?;
        }
        Ok(frame.into_output())
    }

    /// Simulate a carved sub-block under a given context, folding its ledger
    /// into `frame`
    pub(crate) fn descend_with<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        seed: Vec<Expr>,
        ctx: FrameContext,
    ) -> Result<BlockOutput> {
        let mut output = self.run(block, seed, ctx)?;
        frame.absorb(&mut output);
        Ok(output)
    }

    pub(crate) fn descend<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        seed: Vec<Expr>,
    ) -> Result<BlockOutput> {
        let ctx = frame.ctx.clone();
        self.descend_with(frame, block, seed, ctx)
    }

    /// Simulate a statement block
    pub(crate) fn descend_statements<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        at: u32,
    ) -> Result<Vec<Stmt>> {
        self.descend(frame, block, Vec::new())?.into_statements(at)
    }

    /// Simulate an expression fragment
    pub(crate) fn descend_expression<'i>(
        &self,
        frame: &mut Frame<'i>,
        block: Block<'i>,
        at: u32,
    ) -> Result<Expr> {
        self.descend(frame, block, Vec::new())?.into_expression(at)
    }

    /// Consume and simulate one instruction
    pub(crate) fn step<'i>(&self, frame: &mut Frame<'i>) -> Result<()> {
        let instruction = match frame.take() {
            Some(instruction) => instruction,
            None => return Ok(()),
        };
        log::trace!("simulate {}", instruction);

        use OperationKind as Op;
        match instruction.kind {
            Op::Nop => Ok(()),
            Op::PopTop => self.simulate_pop_top(frame, instruction),
            Op::RotTwo => self.simulate_rot_two(frame, instruction),
            Op::RotThree => self.simulate_rot_three(frame, instruction),
            Op::DupTop => self.simulate_dup_top(frame, instruction),
            Op::DupTopTwo => self.simulate_dup_top_two(frame, instruction),

            Op::LoadConst => self.simulate_load_const(frame, instruction),
            Op::LoadName
            | Op::LoadGlobal
            | Op::LoadFast
            | Op::LoadDeref
            | Op::LoadClassderef
            | Op::LoadClosure => self.simulate_load_name(frame, instruction),
            Op::LoadAttr => self.simulate_load_attr(frame, instruction),
            Op::LoadMethod => self.simulate_load_method(frame, instruction),
            Op::LoadBuildClass => {
                frame.push(Expr::BuildClass);
                Ok(())
            }

            Op::StoreName
            | Op::StoreGlobal
            | Op::StoreFast
            | Op::StoreDeref
            | Op::StoreAttr
            | Op::StoreSubscr => self.simulate_store(frame, instruction),
            Op::UnpackSequence => self.simulate_unpack(frame, instruction),

            Op::DeleteName
            | Op::DeleteGlobal
            | Op::DeleteFast
            | Op::DeleteDeref
            | Op::DeleteAttr
            | Op::DeleteSubscr => self.simulate_delete(frame, instruction),

            Op::UnaryPositive | Op::UnaryNegative | Op::UnaryNot | Op::UnaryInvert => {
                self.simulate_unary(frame, instruction)
            }

            Op::BinaryPower
            | Op::BinaryMultiply
            | Op::BinaryMatrixMultiply
            | Op::BinaryFloorDivide
            | Op::BinaryTrueDivide
            | Op::BinaryModulo
            | Op::BinaryAdd
            | Op::BinarySubtract
            | Op::BinaryLshift
            | Op::BinaryRshift
            | Op::BinaryAnd
            | Op::BinaryXor
            | Op::BinaryOr => self.simulate_binary(frame, instruction),
            Op::BinarySubscr => self.simulate_subscript(frame, instruction),

            Op::InplacePower
            | Op::InplaceMultiply
            | Op::InplaceMatrixMultiply
            | Op::InplaceFloorDivide
            | Op::InplaceTrueDivide
            | Op::InplaceModulo
            | Op::InplaceAdd
            | Op::InplaceSubtract
            | Op::InplaceLshift
            | Op::InplaceRshift
            | Op::InplaceAnd
            | Op::InplaceXor
            | Op::InplaceOr => self.simulate_inplace(frame, instruction),

            Op::CompareOp => self.simulate_compare(frame, instruction),

            Op::BuildTuple | Op::BuildList | Op::BuildSet => {
                self.simulate_build_sequence(frame, instruction)
            }
            Op::BuildMap => self.simulate_build_map(frame, instruction),
            Op::BuildConstKeyMap => self.simulate_build_const_key_map(frame, instruction),
            Op::BuildSlice => self.simulate_build_slice(frame, instruction),
            Op::BuildString => self.simulate_build_string(frame, instruction),
            Op::FormatValue => self.simulate_format_value(frame, instruction),

            Op::CallFunction => self.simulate_call_function(frame, instruction),
            Op::CallFunctionKw => self.simulate_call_function_kw(frame, instruction),
            Op::CallMethod => self.simulate_call_method(frame, instruction),
            Op::MakeFunction => self.simulate_make_function(frame, instruction),

            Op::PopJumpIfFalse | Op::PopJumpIfTrue => {
                if self.is_clause_filter(frame, instruction) {
                    self.record_clause_filter(frame, instruction)
                } else if let Some(len) = self.compound_filter_len(frame, instruction) {
                    self.record_compound_filter(frame, instruction, len)
                } else {
                    self.recognize_conditional_jump(frame, instruction)
                }
            }
            Op::JumpIfFalseOrPop | Op::JumpIfTrueOrPop => {
                self.recognize_boolean_value(frame, instruction)
            }
            // Closing jumps are consumed by the construct that owns them. Only
            // a jump to the head of an enclosing loop may reach the simulator.
            Op::JumpAbsolute | Op::ContinueLoop => {
                let target = instruction.target()?;
                if !frame.ctx.jump_map.contains_key(&target) {
                    return Err(Error::pattern(
                        instruction.position,
                        format!("{} to {} is not a loop continuation", instruction.kind, target),
                    ));
                }
                frame.emit(Stmt::Continue);
                Ok(())
            }
            Op::JumpForward => Err(Error::pattern(
                instruction.position,
                format!("{} outside of the construct it closes", instruction.kind),
            )),
            Op::BreakLoop => {
                frame.emit(Stmt::Break);
                Ok(())
            }

            Op::SetupLoop => self.recognize_loop(frame, instruction),
            Op::SetupExcept => self.recognize_try_except(frame, instruction),
            Op::SetupFinally => self.recognize_try_finally(frame, instruction),
            Op::SetupWith => self.recognize_with(frame, instruction),
            Op::PopExcept => Ok(()),
            Op::PopBlock
            | Op::EndFinally
            | Op::WithCleanupStart
            | Op::WithCleanupFinish
            | Op::WithCleanup => Err(Error::pattern(
                instruction.position,
                format!("{} outside of the construct it closes", instruction.kind),
            )),

            Op::GetIter => self.recognize_iteration(frame, instruction),
            Op::ForIter => self.recognize_inline_comprehension(frame, instruction),
            Op::ListAppend | Op::SetAdd | Op::MapAdd => {
                self.record_clause_element(frame, instruction)
            }

            Op::ReturnValue => self.simulate_return(frame, instruction),
            Op::YieldValue => self.simulate_yield(frame, instruction),
            Op::RaiseVarargs => self.simulate_raise(frame, instruction),

            Op::ImportName => self.simulate_import_name(frame, instruction),
            Op::ImportFrom => self.simulate_import_from(frame, instruction),
            Op::ImportStar => self.simulate_import_star(frame, instruction),

            Op::YieldFrom
            | Op::GetYieldFromIter
            | Op::GetAwaitable
            | Op::GetAiter
            | Op::GetAnext
            | Op::BeforeAsyncWith
            | Op::SetupAsyncWith
            | Op::UnpackEx
            | Op::CallFunctionEx
            | Op::BuildTupleUnpack
            | Op::BuildListUnpack
            | Op::BuildSetUnpack
            | Op::BuildMapUnpack
            | Op::SetupAnnotations
            | Op::PrintExpr
            | Op::ExtendedArg => Err(Error::UnsupportedOperation {
                opname: instruction.kind.name().to_string(),
                position: instruction.position,
            }),
        }
    }
}
