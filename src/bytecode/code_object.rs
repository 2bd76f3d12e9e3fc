//! Routine-level container for an instruction range

use super::instruction::{Constant, Instruction, Operand};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Code flags that affect how a routine's body is interpreted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeFlags {
    pub varargs: bool,
    pub varkeywords: bool,
    pub generator: bool,
    pub nested: bool,
}

/// A routine as delivered by the disassembler: its instruction range plus the
/// declared parameters used to seed bound names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualname: Option<String>,
    #[serde(default)]
    pub arg_names: Vec<String>,
    #[serde(default)]
    pub kwonly_arg_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vararg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwarg: Option<String>,
    #[serde(default)]
    pub flags: CodeFlags,
    #[serde(default)]
    pub first_line: u32,
    pub instructions: Vec<Instruction>,
}

impl CodeObject {
    /// Create a code object with no declared parameters
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            name: name.into(),
            qualname: None,
            arg_names: Vec::new(),
            kwonly_arg_names: Vec::new(),
            vararg: None,
            kwarg: None,
            flags: CodeFlags::default(),
            first_line: 0,
            instructions,
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.arg_names = args.iter().map(|arg| arg.to_string()).collect();
        self
    }

    /// Parse a JSON listing and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let code: CodeObject = serde_json::from_str(json)?;
        code.validate()?;
        Ok(code)
    }

    /// Read and validate a JSON listing from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Check the structural guarantees the disassembler is expected to give:
    /// strictly increasing positions, targets on every branch, and targets
    /// that land on an instruction or the end of the routine. Nested code
    /// objects are validated recursively.
    pub fn validate(&self) -> Result<()> {
        let mut positions = HashSet::with_capacity(self.instructions.len());
        let mut previous: Option<u32> = None;
        for instruction in &self.instructions {
            if let Some(prev) = previous {
                if instruction.position <= prev {
                    return Err(Error::listing(format!(
                        "{}: position {} does not follow {}",
                        self.name, instruction.position, prev
                    )));
                }
            }
            previous = Some(instruction.position);
            positions.insert(instruction.position);
        }

        let end = self.end_position();
        for instruction in &self.instructions {
            match instruction.jump_target {
                None if instruction.kind.has_jump_target() => {
                    return Err(Error::listing(format!(
                        "{}: {} at {} has no jump target",
                        self.name, instruction.kind, instruction.position
                    )));
                }
                Some(target) if !positions.contains(&target) && Some(target) != end => {
                    return Err(Error::listing(format!(
                        "{}: {} at {} targets {}, which is not an instruction",
                        self.name, instruction.kind, instruction.position, target
                    )));
                }
                _ => {}
            }
            if let Some(Operand::Const(constant)) = &instruction.operand {
                validate_constant(constant)?;
            }
        }
        Ok(())
    }

    /// Position one past the last instruction, assuming the listing's stride
    pub fn end_position(&self) -> Option<u32> {
        match self.instructions.as_slice() {
            [] => None,
            [only] => Some(only.position + 2),
            [.., before, last] => Some(last.position + (last.position - before.position)),
        }
    }

    /// Nested code objects referenced from the constant pool
    pub fn nested_code(&self) -> impl Iterator<Item = &CodeObject> {
        self.instructions
            .iter()
            .filter_map(|instruction| match &instruction.operand {
                Some(Operand::Const(Constant::Code(code))) => Some(code.as_ref()),
                _ => None,
            })
    }

    pub fn is_comprehension(&self) -> bool {
        is_comprehension_name(&self.name)
    }

    pub fn is_lambda(&self) -> bool {
        self.name == "<lambda>"
    }
}

/// Names the compiler gives to comprehension code objects
pub fn is_comprehension_name(name: &str) -> bool {
    matches!(name, "<listcomp>" | "<setcomp>" | "<dictcomp>" | "<genexpr>")
}

fn validate_constant(constant: &Constant) -> Result<()> {
    match constant {
        Constant::Code(code) => code.validate(),
        Constant::Tuple(items) => items.iter().try_for_each(validate_constant),
        _ => Ok(()),
    }
}
