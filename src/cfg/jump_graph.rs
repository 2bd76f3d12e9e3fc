//! Whole-routine jump graph
//!
//! Splits a routine into basic blocks at leaders (the first instruction, every
//! jump target, and every instruction following a jump or a return) and links
//! them with typed edges. Reconstruction itself never consults this graph; it
//! backs the `cfg` command's summary, back-edge listing and DOT export.

use super::block::Block;
use crate::bytecode::{Instruction, OperationKind};
use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Edge kind in the jump graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Fallthrough to the next block
    Fall,
    /// Unconditional jump, loop exit or block-setup target
    Jump,
    /// Conditional jump taken when the tested value is truthy
    True,
    /// Conditional jump taken when the tested value is falsy
    False,
}

impl EdgeKind {
    fn label(&self) -> Option<&'static str> {
        match self {
            EdgeKind::True => Some("T"),
            EdgeKind::False => Some("F"),
            EdgeKind::Fall => Some("Fall"),
            EdgeKind::Jump => None,
        }
    }

    fn color(&self) -> &'static str {
        match self {
            EdgeKind::True => "green",
            EdgeKind::False => "red",
            EdgeKind::Fall => "gray",
            EdgeKind::Jump => "black",
        }
    }
}

/// A maximal straight-line run of instructions
#[derive(Debug, Clone, Copy)]
pub struct BasicBlock<'i> {
    pub block: Block<'i>,
}

impl<'i> BasicBlock<'i> {
    pub fn start_position(&self) -> u32 {
        self.block.start_position().unwrap_or_default()
    }

    pub fn end_position(&self) -> u32 {
        self.block.end_position().unwrap_or_default()
    }

    pub fn instruction_count(&self) -> usize {
        self.block.len()
    }

    pub fn terminator(&self) -> Option<&'i Instruction> {
        self.block.last()
    }
}

impl fmt::Display for BasicBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {}..={} ({} instructions)",
            self.start_position(),
            self.end_position(),
            self.instruction_count()
        )
    }
}

/// Basic blocks of one routine and the jumps between them
#[derive(Debug)]
pub struct JumpGraph<'i> {
    graph: DiGraph<BasicBlock<'i>, EdgeKind>,
    by_position: HashMap<u32, NodeIndex>,
}

impl<'i> JumpGraph<'i> {
    pub fn build(instructions: &'i [Instruction]) -> Self {
        let leaders = find_leaders(instructions);
        let mut graph = DiGraph::new();
        let mut by_position = HashMap::new();

        let starts: Vec<usize> = leaders.iter().copied().collect();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(instructions.len());
            let block = Block::new(&instructions[start..end]);
            let node = graph.add_node(BasicBlock { block });
            by_position.insert(instructions[start].position, node);
        }

        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for (i, &node) in nodes.iter().enumerate() {
            let next = nodes.get(i + 1).copied();
            let terminator = match graph[node].terminator() {
                Some(terminator) => terminator,
                None => continue,
            };
            for (target, kind) in successors(terminator, next, &by_position) {
                graph.add_edge(node, target, kind);
            }
        }

        log::debug!(
            "Built jump graph with {} blocks and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Self { graph, by_position }
    }

    /// Get the underlying graph
    pub fn graph(&self) -> &DiGraph<BasicBlock<'i>, EdgeKind> {
        &self.graph
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get the entry node for the routine (first block)
    pub fn entry(&self) -> Option<NodeIndex> {
        self.graph.node_indices().next()
    }

    /// Block starting at `position`
    pub fn block_at(&self, position: u32) -> Option<NodeIndex> {
        self.by_position.get(&position).copied()
    }

    /// Analyze dominators from the entry block
    pub fn dominators(&self) -> Option<Dominators<NodeIndex>> {
        self.entry()
            .map(|entry| dominators::simple_fast(&self.graph, entry))
    }

    /// Edges whose target dominates their source, as (source, header) block
    /// start positions
    pub fn back_edges(&self) -> Vec<(u32, u32)> {
        let dominators = match self.dominators() {
            Some(dominators) => dominators,
            None => return Vec::new(),
        };
        let mut edges = Vec::new();
        for edge in self.graph.edge_references() {
            let (source, target) = (edge.source(), edge.target());
            let mut current = Some(source);
            while let Some(node) = current {
                if node == target {
                    edges.push((
                        self.graph[source].start_position(),
                        self.graph[target].start_position(),
                    ));
                    break;
                }
                current = dominators.immediate_dominator(node);
            }
        }
        edges.sort_unstable();
        edges
    }

    /// Export to DOT format for visualization
    pub fn to_dot(&self, name: &str) -> String {
        let mut dot = String::new();
        dot.push_str(&format!("digraph \"{}\" {{\n", name.replace('"', "\\\"")));
        dot.push_str("  rankdir=TB;\n");
        dot.push_str("  node [shape=box, fontname=\"monospace\"];\n\n");

        for node in self.graph.node_indices() {
            let block = &self.graph[node];
            let mut label = format!("{}\\l", block);
            for instruction in block.block.iter() {
                label.push_str(&instruction.to_string().trim_end().replace('"', "\\\""));
                label.push_str("\\l");
            }
            dot.push_str(&format!("  {} [label=\"{}\"];\n", node.index(), label));
        }
        dot.push('\n');

        for edge in self.graph.edge_references() {
            let kind = edge.weight();
            let mut attributes = vec![format!("color=\"{}\"", kind.color())];
            if let Some(label) = kind.label() {
                attributes.push(format!("label=\"{}\"", label));
            }
            dot.push_str(&format!(
                "  {} -> {} [{}];\n",
                edge.source().index(),
                edge.target().index(),
                attributes.join(", ")
            ));
        }

        dot.push_str("}\n");
        dot
    }
}

/// Indices of basic block leaders
fn find_leaders(instructions: &[Instruction]) -> BTreeSet<usize> {
    let mut leaders = BTreeSet::new();
    if instructions.is_empty() {
        return leaders;
    }
    leaders.insert(0);

    let index_of: HashMap<u32, usize> = instructions
        .iter()
        .enumerate()
        .map(|(index, instruction)| (instruction.position, index))
        .collect();

    for (index, instruction) in instructions.iter().enumerate() {
        if let Some(target) = instruction.jump_target {
            if let Some(&target_index) = index_of.get(&target) {
                leaders.insert(target_index);
            }
        }
        if ends_block(instruction.kind) && index + 1 < instructions.len() {
            leaders.insert(index + 1);
        }
    }
    leaders
}

fn ends_block(kind: OperationKind) -> bool {
    kind.has_jump_target()
        || matches!(
            kind,
            OperationKind::ReturnValue | OperationKind::RaiseVarargs | OperationKind::BreakLoop
        )
}

fn successors(
    terminator: &Instruction,
    next: Option<NodeIndex>,
    by_position: &HashMap<u32, NodeIndex>,
) -> Vec<(NodeIndex, EdgeKind)> {
    let target = terminator
        .jump_target
        .and_then(|position| by_position.get(&position).copied());
    let mut edges = Vec::with_capacity(2);

    use OperationKind as Op;
    match terminator.kind {
        Op::ReturnValue | Op::RaiseVarargs | Op::BreakLoop => {}
        Op::JumpForward | Op::JumpAbsolute | Op::ContinueLoop => {
            edges.extend(target.map(|t| (t, EdgeKind::Jump)));
        }
        Op::PopJumpIfFalse | Op::JumpIfFalseOrPop => {
            edges.extend(next.map(|n| (n, EdgeKind::True)));
            edges.extend(target.map(|t| (t, EdgeKind::False)));
        }
        Op::PopJumpIfTrue | Op::JumpIfTrueOrPop => {
            edges.extend(next.map(|n| (n, EdgeKind::False)));
            edges.extend(target.map(|t| (t, EdgeKind::True)));
        }
        _ => {
            edges.extend(next.map(|n| (n, EdgeKind::Fall)));
            edges.extend(target.map(|t| (t, EdgeKind::Jump)));
        }
    }
    edges
}
