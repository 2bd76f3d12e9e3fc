//! Arithmetic, bitwise and comparison operation helpers
//!
//! Operands are popped in reverse push order; in-place operations produce a
//! transient [`Expr::InPlace`] that the following store turns into an
//! augmented assignment.

use super::Frame;
use crate::ast::nodes::{BinaryOperator, Expr, UnaryOperator};
use crate::bytecode::{Instruction, OperationKind};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing operator helper methods
pub trait ArithmeticHelpers {
    /// `op operand`
    fn simulate_unary(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `left op right`
    fn simulate_binary(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `target op= value`, pending the store that completes it
    fn simulate_inplace(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_compare(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;
}

impl ArithmeticHelpers for Decompiler {
    fn simulate_unary(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let op = match instruction.kind {
            OperationKind::UnaryPositive => UnaryOperator::Pos,
            OperationKind::UnaryNegative => UnaryOperator::Neg,
            OperationKind::UnaryNot => UnaryOperator::Not,
            OperationKind::UnaryInvert => UnaryOperator::Invert,
            other => return Err(Error::internal(format!("{} is not a unary operator", other))),
        };
        let operand = frame.pop(instruction)?;
        frame.push(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        });
        Ok(())
    }

    fn simulate_binary(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let op = binary_operator(instruction.kind).ok_or_else(|| {
            Error::internal(format!("{} is not a binary operator", instruction.kind))
        })?;
        let right = frame.pop(instruction)?;
        let left = frame.pop(instruction)?;
        frame.push(Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
        Ok(())
    }

    fn simulate_inplace(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let op = binary_operator(instruction.kind).ok_or_else(|| {
            Error::internal(format!("{} is not an in-place operator", instruction.kind))
        })?;
        let value = frame.pop(instruction)?;
        let target = frame.pop(instruction)?;
        frame.push(Expr::InPlace {
            target: Box::new(target),
            op,
            value: Box::new(value),
        });
        Ok(())
    }

    fn simulate_compare(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let op = instruction.compare_op()?;
        let right = frame.pop(instruction)?;
        let left = frame.pop(instruction)?;
        frame.push(Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
        Ok(())
    }
}

/// Operator shared by a `BINARY_*` kind and its `INPLACE_*` twin
pub fn binary_operator(kind: OperationKind) -> Option<BinaryOperator> {
    use OperationKind as Op;
    let op = match kind {
        Op::BinaryPower | Op::InplacePower => BinaryOperator::Pow,
        Op::BinaryMultiply | Op::InplaceMultiply => BinaryOperator::Mult,
        Op::BinaryMatrixMultiply | Op::InplaceMatrixMultiply => BinaryOperator::MatMult,
        Op::BinaryFloorDivide | Op::InplaceFloorDivide => BinaryOperator::FloorDiv,
        Op::BinaryTrueDivide | Op::InplaceTrueDivide => BinaryOperator::Div,
        Op::BinaryModulo | Op::InplaceModulo => BinaryOperator::Mod,
        Op::BinaryAdd | Op::InplaceAdd => BinaryOperator::Add,
        Op::BinarySubtract | Op::InplaceSubtract => BinaryOperator::Sub,
        Op::BinaryLshift | Op::InplaceLshift => BinaryOperator::LShift,
        Op::BinaryRshift | Op::InplaceRshift => BinaryOperator::RShift,
        Op::BinaryAnd | Op::InplaceAnd => BinaryOperator::BitAnd,
        Op::BinaryXor | Op::InplaceXor => BinaryOperator::BitXor,
        Op::BinaryOr | Op::InplaceOr => BinaryOperator::BitOr,
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inplace_and_binary_share_operators() {
        assert_eq!(
            binary_operator(OperationKind::InplaceAdd),
            binary_operator(OperationKind::BinaryAdd)
        );
        assert_eq!(
            binary_operator(OperationKind::BinaryTrueDivide),
            Some(BinaryOperator::Div)
        );
        assert_eq!(binary_operator(OperationKind::BinarySubscr), None);
    }
}
