use crate::bytecode::{CodeObject, Instruction};
use crate::error::Result as DecompilerResult;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use super::utils::write_output;

/// Run the disasm subcommand
pub fn disasm(input_path: &Path, output_path: Option<&Path>) -> DecompilerResult<()> {
    let code = CodeObject::from_path(input_path)?;
    let mut output = String::new();
    disassemble(&code, &mut output);
    write_output(output.trim_end(), output_path)
}

/// Render a code object and every nested one in `dis` layout: line number on
/// the first instruction of each line, `>>` on jump targets
pub fn disassemble(code: &CodeObject, output: &mut String) {
    let _ = writeln!(output, "Disassembly of {}:", code.name);
    let targets: HashSet<u32> = code
        .instructions
        .iter()
        .filter_map(|instruction| instruction.jump_target)
        .collect();

    let mut previous_line = None;
    for instruction in &code.instructions {
        if previous_line.is_some() && previous_line != Some(instruction.line) {
            output.push('\n');
        }
        let line = if previous_line != Some(instruction.line) {
            instruction.line.to_string()
        } else {
            String::new()
        };
        previous_line = Some(instruction.line);
        let marker = if targets.contains(&instruction.position) {
            ">>"
        } else {
            ""
        };
        let _ = writeln!(output, "{:>4} {:>3} {}", line, marker, render(instruction).trim_end());
    }

    for nested in code.nested_code() {
        output.push('\n');
        disassemble(nested, output);
    }
}

fn render(instruction: &Instruction) -> String {
    instruction.to_string()
}
