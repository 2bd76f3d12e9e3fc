//! Attribute, subscript and collection-building helpers

use super::Frame;
use crate::ast::nodes::Expr;
use crate::bytecode::{Constant, Instruction, OperationKind};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

/// Trait providing object and collection helper methods
pub trait ObjectHelpers {
    /// `obj.attr`; on an in-flight `import a.b as c` this walks the dotted path
    fn simulate_load_attr(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_load_method(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_subscript(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// `BUILD_TUPLE`, `BUILD_LIST` and `BUILD_SET`
    fn simulate_build_sequence(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_build_map(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_build_const_key_map(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<()>;

    fn simulate_build_slice(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    /// f-string concatenation
    fn simulate_build_string(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_format_value(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;
}

impl ObjectHelpers for Decompiler {
    fn simulate_load_attr(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let attr = instruction.name()?;
        match frame.pop(instruction)? {
            Expr::Import(mut import) if !import.from_import => {
                import.aliased = true;
                frame.push(Expr::Import(import));
            }
            object => frame.push(Expr::attribute(object, attr)),
        }
        Ok(())
    }

    fn simulate_load_method(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let object = frame.pop(instruction)?;
        frame.push(Expr::attribute(object, instruction.name()?));
        Ok(())
    }

    fn simulate_subscript(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let index = frame.pop(instruction)?;
        let object = frame.pop(instruction)?;
        frame.push(Expr::Subscript {
            value: Box::new(object),
            index: Box::new(index),
        });
        Ok(())
    }

    fn simulate_build_sequence(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let items = frame.pop_n(instruction.count()? as usize, instruction)?;
        let collection = match instruction.kind {
            OperationKind::BuildTuple => Expr::Tuple(items),
            OperationKind::BuildList => Expr::List(items),
            OperationKind::BuildSet => Expr::Set(items),
            other => return Err(Error::internal(format!("{} is not a sequence builder", other))),
        };
        frame.push(collection);
        Ok(())
    }

    fn simulate_build_map(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let count = instruction.count()? as usize;
        let mut flat = frame.pop_n(count * 2, instruction)?.into_iter();
        let mut pairs = Vec::with_capacity(count);
        while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
            pairs.push((key, value));
        }
        frame.push(Expr::Dict(pairs));
        Ok(())
    }

    fn simulate_build_const_key_map(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<()> {
        let keys = match frame.pop(instruction)? {
            Expr::Constant(Constant::Tuple(keys)) => keys,
            other => {
                return Err(Error::pattern(
                    instruction.position,
                    format!("constant-key map expects a key tuple, found {:?}", other),
                ))
            }
        };
        let values = frame.pop_n(instruction.count()? as usize, instruction)?;
        if keys.len() != values.len() {
            return Err(Error::pattern(
                instruction.position,
                format!("{} keys for {} values", keys.len(), values.len()),
            ));
        }
        let pairs = keys.into_iter().map(Expr::Constant).zip(values).collect();
        frame.push(Expr::Dict(pairs));
        Ok(())
    }

    fn simulate_build_slice(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let step = match instruction.count()? {
            2 => None,
            3 => bound(frame.pop(instruction)?),
            other => {
                return Err(Error::pattern(
                    instruction.position,
                    format!("slice with {} parts", other),
                ))
            }
        };
        let upper = bound(frame.pop(instruction)?);
        let lower = bound(frame.pop(instruction)?);
        frame.push(Expr::Slice { lower, upper, step });
        Ok(())
    }

    fn simulate_build_string(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let parts = frame.pop_n(instruction.count()? as usize, instruction)?;
        frame.push(Expr::JoinedStr(parts));
        Ok(())
    }

    fn simulate_format_value(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let flags = instruction.count()?;
        let format_spec = if flags & 0x04 != 0 {
            Some(Box::new(frame.pop(instruction)?))
        } else {
            None
        };
        let value = frame.pop(instruction)?;
        let conversion = match flags & 0x03 {
            1 => Some('s'),
            2 => Some('r'),
            3 => Some('a'),
            _ => None,
        };
        frame.push(Expr::FormattedValue {
            value: Box::new(value),
            conversion,
            format_spec,
        });
        Ok(())
    }
}

/// Omitted slice bounds are pushed as `None`
fn bound(expr: Expr) -> Option<Box<Expr>> {
    (!expr.is_none_constant()).then(|| Box::new(expr))
}
