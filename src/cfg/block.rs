//! Blocks and block segmentation
//!
//! A [`Block`] is a borrowed, contiguous run of instructions. Blocks are never
//! copied or mutated: carving produces a new slice over the same listing.
//! [`InstructionStream`] is the forward-only cursor that recognizers carve
//! blocks from.

use crate::bytecode::{Instruction, OperationKind};
use crate::error::{Error, Result};
use std::ops::Range;

/// Whether a requested cut point must exist in the remaining range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Fail with `BoundaryNotFound` when the cut point is absent
    Required,
    /// Run to the natural end of the stream when the cut point is absent
    Optional,
}

/// Contiguous slice of instructions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'i> {
    instructions: &'i [Instruction],
}

impl<'i> Block<'i> {
    pub fn new(instructions: &'i [Instruction]) -> Self {
        Self { instructions }
    }

    pub fn empty() -> Self {
        Self { instructions: &[] }
    }

    /// Get all instructions
    pub fn instructions(&self) -> &'i [Instruction] {
        self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'i Instruction> {
        self.instructions.get(index)
    }

    pub fn first(&self) -> Option<&'i Instruction> {
        self.instructions.first()
    }

    pub fn last(&self) -> Option<&'i Instruction> {
        self.instructions.last()
    }

    /// Position of the first instruction
    pub fn start_position(&self) -> Option<u32> {
        self.first().map(|instruction| instruction.position)
    }

    /// Position of the last instruction
    pub fn end_position(&self) -> Option<u32> {
        self.last().map(|instruction| instruction.position)
    }

    pub fn iter(&self) -> std::slice::Iter<'i, Instruction> {
        self.instructions.iter()
    }

    /// Sub-block over an index range
    pub fn slice(&self, range: Range<usize>) -> Block<'i> {
        Block::new(&self.instructions[range])
    }

    pub fn head(&self, end: usize) -> Block<'i> {
        self.slice(0..end)
    }

    pub fn tail(&self, start: usize) -> Block<'i> {
        self.slice(start..self.len())
    }

    pub fn index_of_position(&self, position: u32) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instruction| instruction.position == position)
    }

    pub fn contains_position(&self, position: u32) -> bool {
        self.index_of_position(position).is_some()
    }

    /// Drop the last instruction when it satisfies `pred`, returning it
    pub fn strip_last(&self, pred: impl Fn(&Instruction) -> bool) -> (Block<'i>, Option<&'i Instruction>) {
        match self.last() {
            Some(last) if pred(last) => (self.head(self.len() - 1), Some(last)),
            _ => (*self, None),
        }
    }

    /// Index of the `END_FINALLY` that closes the innermost open finally
    /// scope at the start of this block. Nested `SETUP_EXCEPT`,
    /// `SETUP_FINALLY` and `SETUP_WITH` scopes are skipped over.
    pub fn closing_end_finally(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (index, instruction) in self.iter().enumerate() {
            if instruction.kind.opens_finally_scope() {
                depth += 1;
            } else if instruction.kind == OperationKind::EndFinally {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
        }
        None
    }

    /// Index of the `POP_BLOCK` that tears down the block-stack entry open at
    /// the start of this block, skipping nested setups.
    pub fn closing_pop_block(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (index, instruction) in self.iter().enumerate() {
            if instruction.kind.is_setup() {
                depth += 1;
            } else if instruction.kind == OperationKind::PopBlock {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
        }
        None
    }

    /// Index of a `GET_ITER` immediately followed by `FOR_ITER` at nesting
    /// depth zero, before the closing `POP_BLOCK`
    pub fn top_level_iteration(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (index, instruction) in self.iter().enumerate() {
            match instruction.kind {
                kind if kind.is_setup() => depth += 1,
                OperationKind::PopBlock => {
                    if depth == 0 {
                        return None;
                    }
                    depth -= 1;
                }
                OperationKind::GetIter if depth == 0 => {
                    if self.get(index + 1).map(|next| next.kind) == Some(OperationKind::ForIter) {
                        return Some(index);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl<'i> IntoIterator for Block<'i> {
    type Item = &'i Instruction;
    type IntoIter = std::slice::Iter<'i, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

/// Forward-only cursor over a block
#[derive(Debug, Clone)]
pub struct InstructionStream<'i> {
    block: Block<'i>,
    cursor: usize,
}

impl<'i> InstructionStream<'i> {
    pub fn new(block: Block<'i>) -> Self {
        Self { block, cursor: 0 }
    }

    /// Instructions not yet consumed
    pub fn remaining(&self) -> Block<'i> {
        self.block.tail(self.cursor)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.block.len()
    }

    pub fn peek(&self) -> Option<&'i Instruction> {
        self.block.get(self.cursor)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&'i Instruction> {
        self.block.get(self.cursor + n)
    }

    pub fn peek_kind(&self) -> Option<OperationKind> {
        self.peek().map(|instruction| instruction.kind)
    }

    pub fn next_position(&self) -> Option<u32> {
        self.peek().map(|instruction| instruction.position)
    }

    /// Cursor index into the underlying block
    pub fn mark(&self) -> usize {
        self.cursor
    }

    /// Instructions consumed since `mark`
    pub fn consumed_since(&self, mark: usize) -> Block<'i> {
        self.block.slice(mark..self.cursor)
    }

    pub fn next(&mut self) -> Option<&'i Instruction> {
        let instruction = self.block.get(self.cursor)?;
        self.cursor += 1;
        Some(instruction)
    }

    /// Take the next `count` instructions as a block
    pub fn take(&mut self, count: usize) -> Block<'i> {
        let end = (self.cursor + count).min(self.block.len());
        let taken = self.block.slice(self.cursor..end);
        self.cursor = end;
        taken
    }

    /// Take everything that is left
    pub fn take_rest(&mut self) -> Block<'i> {
        self.take(self.block.len() - self.cursor)
    }

    /// Index, relative to the cursor, of the instruction at `position`
    pub fn offset_of(&self, position: u32) -> Option<usize> {
        self.remaining().index_of_position(position)
    }

    /// Carve a block from the front of the stream up to the instruction at
    /// `to`, including it when `inclusive`. With [`Boundary::Required`] a
    /// missing cut point is an error and the cursor does not move.
    pub fn make_block(&mut self, to: u32, inclusive: bool, boundary: Boundary) -> Result<Block<'i>> {
        match self.offset_of(to) {
            Some(offset) => Ok(self.take(if inclusive { offset + 1 } else { offset })),
            None => match boundary {
                Boundary::Required => Err(Error::BoundaryNotFound {
                    boundary: to,
                    from: self.next_position(),
                }),
                Boundary::Optional => Ok(self.take_rest()),
            },
        }
    }

    /// Carve up to (excluding) the first instruction matching `pred`, or
    /// `None` without moving when nothing matches
    pub fn take_until(&mut self, pred: impl Fn(&Instruction) -> bool) -> Option<Block<'i>> {
        let offset = self.remaining().iter().position(|instruction| pred(instruction))?;
        Some(self.take(offset))
    }

    /// Consume the next instruction, which must be of `kind`
    pub fn expect(&mut self, kind: OperationKind) -> Result<&'i Instruction> {
        match self.peek() {
            Some(instruction) if instruction.kind == kind => {
                self.cursor += 1;
                Ok(instruction)
            }
            Some(instruction) => Err(Error::pattern(
                instruction.position,
                format!("expected {}, found {}", kind, instruction.kind),
            )),
            None => Err(Error::pattern(
                self.block.end_position().unwrap_or_default(),
                format!("expected {}, found end of block", kind),
            )),
        }
    }

    /// Consume the next instruction when it is of `kind`
    pub fn accept(&mut self, kind: OperationKind) -> Option<&'i Instruction> {
        match self.peek() {
            Some(instruction) if instruction.kind == kind => {
                self.cursor += 1;
                Some(instruction)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::InstructionBuilder;

    fn listing() -> Vec<Instruction> {
        let mut builder = InstructionBuilder::new();
        builder
            .load_name("a")
            .load_name("b")
            .pop_top()
            .load_name("c")
            .pop_top();
        builder.build().unwrap()
    }

    #[test]
    fn make_block_respects_inclusivity() {
        let instructions = listing();
        let mut stream = InstructionStream::new(Block::new(&instructions));
        let exclusive = stream.make_block(4, false, Boundary::Required).unwrap();
        assert_eq!(exclusive.len(), 2);
        assert_eq!(stream.next_position(), Some(4));

        let inclusive = stream.make_block(6, true, Boundary::Required).unwrap();
        assert_eq!(inclusive.start_position(), Some(4));
        assert_eq!(inclusive.end_position(), Some(6));
    }

    #[test]
    fn missing_required_boundary_does_not_move_cursor() {
        let instructions = listing();
        let mut stream = InstructionStream::new(Block::new(&instructions));
        stream.next();
        let err = stream.make_block(40, false, Boundary::Required).unwrap_err();
        assert_eq!(
            err,
            Error::BoundaryNotFound {
                boundary: 40,
                from: Some(2)
            }
        );
        assert_eq!(stream.next_position(), Some(2));
    }

    #[test]
    fn optional_boundary_runs_to_end() {
        let instructions = listing();
        let mut stream = InstructionStream::new(Block::new(&instructions));
        let block = stream.make_block(40, false, Boundary::Optional).unwrap();
        assert_eq!(block.len(), 5);
        assert!(stream.is_empty());
    }

    #[test]
    fn closing_end_finally_skips_nested_scopes() {
        let mut builder = InstructionBuilder::new();
        builder
            .jump(OperationKind::SetupFinally, "inner")
            .op(OperationKind::PopBlock)
            .load_none()
            .label("inner")
            .op(OperationKind::EndFinally)
            .op(OperationKind::EndFinally);
        let instructions = builder.build().unwrap();
        let block = Block::new(&instructions);
        assert_eq!(block.closing_end_finally(), Some(4));
    }

    #[test]
    fn top_level_iteration_ignores_nested_loops() {
        let mut builder = InstructionBuilder::new();
        builder
            .jump(OperationKind::SetupLoop, "end")
            .load_name("xs")
            .op(OperationKind::GetIter)
            .jump(OperationKind::ForIter, "end")
            .label("end")
            .op(OperationKind::PopBlock);
        let instructions = builder.build().unwrap();
        let block = Block::new(&instructions);
        assert_eq!(block.top_level_iteration(), None);
        assert_eq!(block.tail(1).top_level_iteration(), Some(1));
    }
}
