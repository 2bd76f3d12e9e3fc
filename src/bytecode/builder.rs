//! Programmatic construction of instruction listings
//!
//! Positions are assigned with a fixed stride of two and jumps refer to
//! symbolic labels resolved at [`InstructionBuilder::build`] time. Tests and
//! benchmarks use this to write listings in the order a compiler emits them.

use super::code_object::CodeObject;
use super::instruction::{CompareOp, Constant, Instruction, Operand};
use super::opcodes::OperationKind;
use crate::error::{Error, Result};
use std::collections::HashMap;

const STRIDE: u32 = 2;

/// Builder for a routine's instruction listing
#[derive(Debug, Default)]
pub struct InstructionBuilder {
    instructions: Vec<Instruction>,
    pending_targets: Vec<(usize, String)>,
    labels: HashMap<String, u32>,
    line: u32,
}

impl InstructionBuilder {
    pub fn new() -> Self {
        Self {
            line: 1,
            ..Self::default()
        }
    }

    fn next_position(&self) -> u32 {
        self.instructions.len() as u32 * STRIDE
    }

    /// Set the source line for subsequent instructions
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Bind `name` to the position of the next instruction
    pub fn label(&mut self, name: &str) -> &mut Self {
        let position = self.next_position();
        self.labels.insert(name.to_string(), position);
        self
    }

    /// Position the next instruction will receive
    pub fn position(&self) -> u32 {
        self.next_position()
    }

    fn push(&mut self, kind: OperationKind, operand: Option<Operand>) -> &mut Self {
        let instruction = Instruction {
            position: self.next_position(),
            kind,
            operand,
            line: self.line,
            jump_target: None,
        };
        self.instructions.push(instruction);
        self
    }

    /// An instruction without operand
    pub fn op(&mut self, kind: OperationKind) -> &mut Self {
        self.push(kind, None)
    }

    /// An instruction with a count operand
    pub fn op_count(&mut self, kind: OperationKind, count: u32) -> &mut Self {
        self.push(kind, Some(Operand::Count(count)))
    }

    /// An instruction with a name operand
    pub fn op_name(&mut self, kind: OperationKind, name: &str) -> &mut Self {
        self.push(kind, Some(Operand::Name(name.to_string())))
    }

    /// A branching instruction whose target is a label
    pub fn jump(&mut self, kind: OperationKind, label: &str) -> &mut Self {
        let index = self.instructions.len();
        self.pending_targets.push((index, label.to_string()));
        self.push(kind, None)
    }

    pub fn load_const(&mut self, constant: impl Into<Constant>) -> &mut Self {
        self.push(OperationKind::LoadConst, Some(Operand::Const(constant.into())))
    }

    pub fn load_none(&mut self) -> &mut Self {
        self.load_const(Constant::None)
    }

    pub fn load_code(&mut self, code: CodeObject) -> &mut Self {
        self.load_const(Constant::Code(Box::new(code)))
    }

    pub fn load_name(&mut self, name: &str) -> &mut Self {
        self.op_name(OperationKind::LoadName, name)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        self.op_name(OperationKind::LoadFast, name)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        self.op_name(OperationKind::LoadGlobal, name)
    }

    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        self.op_name(OperationKind::LoadAttr, name)
    }

    pub fn store_name(&mut self, name: &str) -> &mut Self {
        self.op_name(OperationKind::StoreName, name)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        self.op_name(OperationKind::StoreFast, name)
    }

    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.push(OperationKind::CompareOp, Some(Operand::Compare(op)))
    }

    pub fn pop_top(&mut self) -> &mut Self {
        self.op(OperationKind::PopTop)
    }

    pub fn call(&mut self, argc: u32) -> &mut Self {
        self.op_count(OperationKind::CallFunction, argc)
    }

    /// `LOAD_CONST None; RETURN_VALUE`
    pub fn return_none(&mut self) -> &mut Self {
        self.load_none().op(OperationKind::ReturnValue)
    }

    /// Resolve labels and return the finished listing
    pub fn build(&mut self) -> Result<Vec<Instruction>> {
        let end = self.next_position();
        for (index, label) in self.pending_targets.drain(..) {
            let target = *self
                .labels
                .get(&label)
                .ok_or_else(|| Error::listing(format!("undefined label `{}`", label)))?;
            debug_assert!(target <= end);
            self.instructions[index].jump_target = Some(target);
        }
        Ok(std::mem::take(&mut self.instructions))
    }

    /// Resolve labels and wrap the listing in a code object
    pub fn build_code(&mut self, name: &str) -> Result<CodeObject> {
        Ok(CodeObject::new(name, self.build()?))
    }
}
