//! Decoded instruction records
//!
//! An [`Instruction`] is what the external disassembler hands over: a position,
//! an operation kind, an optional decoded operand, the source line, and for
//! branching instructions an absolute jump target.

use super::code_object::CodeObject;
use super::opcodes::OperationKind;
use crate::error::{Error, Result};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One instruction of a routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Absolute position; unique and strictly increasing within a routine
    pub position: u32,
    #[serde(rename = "opname")]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Operand>,
    #[serde(default)]
    pub line: u32,
    /// Absolute target position for branching and block-setup instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_target: Option<u32>,
}

/// Decoded operand of an instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A name, attribute or module reference
    Name(String),
    /// A constant pool entry
    Const(Constant),
    /// An element count, argument count or flag word
    Count(u32),
    /// The comparison performed by `COMPARE_OP`
    Compare(CompareOp),
}

/// Constant values as they appear in the constant pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    None,
    Ellipsis,
    Bool(bool),
    Int(#[serde(with = "int_repr")] BigInt),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Constant>),
    Code(Box<CodeObject>),
}

/// Comparison operators of `COMPARE_OP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtE,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtE,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "is not")]
    IsNot,
    #[serde(rename = "exception match")]
    ExceptionMatch,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::LtE => "<=",
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::GtE => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::ExceptionMatch => "exception match",
        }
    }
}

impl Instruction {
    pub fn new(position: u32, kind: OperationKind) -> Self {
        Self {
            position,
            kind,
            operand: None,
            line: 0,
            jump_target: None,
        }
    }

    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.operand = Some(operand);
        self
    }

    pub fn with_target(mut self, target: u32) -> Self {
        self.jump_target = Some(target);
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Jump target, required for branching instructions
    pub fn target(&self) -> Result<u32> {
        self.jump_target.ok_or_else(|| {
            Error::pattern(self.position, format!("{} has no jump target", self.kind))
        })
    }

    /// Name operand (stores, loads, attributes, imports)
    pub fn name(&self) -> Result<&str> {
        match &self.operand {
            Some(Operand::Name(name)) => Ok(name),
            _ => Err(Error::pattern(
                self.position,
                format!("{} expects a name operand", self.kind),
            )),
        }
    }

    /// Count operand; absent counts read as zero
    pub fn count(&self) -> Result<u32> {
        match &self.operand {
            Some(Operand::Count(count)) => Ok(*count),
            None => Ok(0),
            _ => Err(Error::pattern(
                self.position,
                format!("{} expects a count operand", self.kind),
            )),
        }
    }

    pub fn constant(&self) -> Result<&Constant> {
        match &self.operand {
            Some(Operand::Const(constant)) => Ok(constant),
            _ => Err(Error::pattern(
                self.position,
                format!("{} expects a constant operand", self.kind),
            )),
        }
    }

    pub fn compare_op(&self) -> Result<CompareOp> {
        match &self.operand {
            Some(Operand::Compare(op)) => Ok(*op),
            _ => Err(Error::pattern(
                self.position,
                format!("{} expects a comparison operand", self.kind),
            )),
        }
    }

    pub fn is(&self, kind: OperationKind) -> bool {
        self.kind == kind
    }

    /// Whether this is an unconditional jump landing on `target`
    pub fn jumps_to(&self, target: u32) -> bool {
        self.kind.is_unconditional_jump() && self.jump_target == Some(target)
    }

    pub fn is_exception_match(&self) -> bool {
        self.kind == OperationKind::CompareOp
            && matches!(self.operand, Some(Operand::Compare(CompareOp::ExceptionMatch)))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6} {:<24}", self.position, self.kind.name())?;
        match &self.operand {
            Some(Operand::Name(name)) => write!(f, " {}", name)?,
            Some(Operand::Const(constant)) => write!(f, " {}", constant)?,
            Some(Operand::Count(count)) => write!(f, " {}", count)?,
            Some(Operand::Compare(op)) => write!(f, " ({})", op.symbol())?,
            None => {}
        }
        if let Some(target) = self.jump_target {
            write!(f, " (to {})", target)?;
        }
        Ok(())
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Ellipsis => f.write_str("Ellipsis"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(value) => write!(f, "{}", value),
            Constant::Float(value) => write!(f, "{:?}", value),
            Constant::Str(value) => write!(f, "{:?}", value),
            Constant::Bytes(bytes) => write!(f, "b{:?}", String::from_utf8_lossy(bytes)),
            Constant::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Constant::Code(code) => write!(f, "<code object {}>", code.name),
        }
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::Int(BigInt::from(value))
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Constant::Int(BigInt::from(value))
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Constant::Str(value.to_string())
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

/// Integers are written as decimal strings and read from either strings or
/// JSON numbers, so arbitrary-precision values survive the listing format.
mod int_repr {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntRepr {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        match IntRepr::deserialize(deserializer)? {
            IntRepr::Number(value) => Ok(BigInt::from(value)),
            IntRepr::Text(text) => text
                .parse::<BigInt>()
                .map_err(|e| serde::de::Error::custom(format!("invalid integer `{}`: {}", text, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_instruction() {
        let json = r#"{"position": 4, "opname": "POP_JUMP_IF_FALSE", "line": 2, "jump_target": 12}"#;
        let instruction: Instruction = serde_json::from_str(json).unwrap();
        assert_eq!(instruction.kind, OperationKind::PopJumpIfFalse);
        assert_eq!(instruction.target().unwrap(), 12);
        assert_eq!(instruction.line, 2);
    }

    #[test]
    fn big_integers_accept_strings_and_numbers() {
        let small: Constant = serde_json::from_str(r#"{"int": 42}"#).unwrap();
        assert_eq!(small, Constant::from(42));

        let big: Constant =
            serde_json::from_str(r#"{"int": "123456789012345678901234567890"}"#).unwrap();
        assert_eq!(big.to_string(), "123456789012345678901234567890");
        assert_eq!(
            serde_json::to_string(&big).unwrap(),
            r#"{"int":"123456789012345678901234567890"}"#
        );
    }

    #[test]
    fn compare_operand_uses_dis_spelling() {
        let operand: Operand = serde_json::from_str(r#"{"compare": "exception match"}"#).unwrap();
        assert_eq!(operand, Operand::Compare(CompareOp::ExceptionMatch));
        let instruction = Instruction::new(0, OperationKind::CompareOp).with_operand(operand);
        assert!(instruction.is_exception_match());
    }

    #[test]
    fn missing_operands_are_pattern_errors() {
        let instruction = Instruction::new(8, OperationKind::StoreName);
        assert!(matches!(
            instruction.name(),
            Err(Error::UnrecognizedPattern { position: 8, .. })
        ));
        assert_eq!(Instruction::new(0, OperationKind::BuildList).count().unwrap(), 0);
    }
}
