use crate::bytecode::CodeObject;
use crate::cfg::JumpGraph;
use crate::error::{Error as DecompilerError, Result as DecompilerResult};
use std::path::Path;

/// Build and summarize the jump graph of a listing and each nested routine
pub fn cfg(input_path: &Path, output_dot: Option<&Path>) -> DecompilerResult<()> {
    let code = CodeObject::from_path(input_path)?;

    let mut dot = String::new();
    summarize(&code, &mut dot);

    if let Some(dot_path) = output_dot {
        std::fs::write(dot_path, dot)
            .map_err(|e| DecompilerError::Io(format!("Failed to write DOT file: {}", e)))?;
        println!("DOT exported to: {}", dot_path.display());
    }
    Ok(())
}

fn summarize(code: &CodeObject, dot: &mut String) {
    println!("Routine {}:", code.name);
    println!("  Instructions: {}", code.instructions.len());
    if code.instructions.is_empty() {
        println!("  Empty routine, no CFG to build");
        return;
    }

    let graph = JumpGraph::build(&code.instructions);
    println!("  Basic blocks: {}", graph.block_count());
    println!("  Edges: {}", graph.edge_count());
    for (i, node) in graph.graph().node_indices().enumerate() {
        println!("    Block {}: {}", i, graph.graph()[node]);
    }

    let back_edges = graph.back_edges();
    if !back_edges.is_empty() {
        println!("  Back edges: {} found", back_edges.len());
        for (source, header) in back_edges {
            println!("    {} -> {}", source, header);
        }
    }
    dot.push_str(&graph.to_dot(&code.name));

    for nested in code.nested_code() {
        summarize(nested, dot);
    }
}
