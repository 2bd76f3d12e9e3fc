use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const IF_LISTING: &str = r#"{
    "name": "<module>",
    "instructions": [
        {"position": 0, "opname": "LOAD_NAME", "operand": {"name": "a"}, "line": 1},
        {"position": 2, "opname": "POP_JUMP_IF_FALSE", "jump_target": 10, "line": 1},
        {"position": 4, "opname": "LOAD_NAME", "operand": {"name": "b"}, "line": 2},
        {"position": 6, "opname": "POP_TOP", "line": 2},
        {"position": 8, "opname": "JUMP_FORWARD", "jump_target": 10, "line": 2},
        {"position": 10, "opname": "LOAD_CONST", "operand": {"const": "none"}, "line": 2},
        {"position": 12, "opname": "RETURN_VALUE", "line": 2}
    ]
}"#;

const STRAY_POP_BLOCK: &str = r#"{
    "name": "<module>",
    "instructions": [
        {"position": 0, "opname": "POP_BLOCK"},
        {"position": 2, "opname": "LOAD_CONST", "operand": {"const": "none"}},
        {"position": 4, "opname": "RETURN_VALUE"}
    ]
}"#;

fn write_listing(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("temp listing is writable");
    path
}

#[test]
fn test_decompile_prints_json_tree() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let listing = write_listing(&dir, "if.json", IF_LISTING);

    Command::cargo_bin("pyc-dec-rs")?
        .arg("decompile")
        .arg(&listing)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"If\""))
        .stdout(predicate::str::contains("\"Name\": \"a\""));
    Ok(())
}

#[test]
fn test_decompile_writes_output_file_and_stats() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let listing = write_listing(&dir, "if.json", IF_LISTING);
    let output = dir.path().join("tree.json");

    Command::cargo_bin("pyc-dec-rs")?
        .arg("decompile")
        .arg(&listing)
        .arg("--stats")
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("conditional: 1"));

    let tree: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output)?)?;
    assert_eq!(tree[0]["If"]["body"][0]["Expr"]["Name"], "b");
    Ok(())
}

#[test]
fn test_decompile_several_listings_keys_by_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let first = write_listing(&dir, "first.json", IF_LISTING);
    let second = write_listing(&dir, "second.json", IF_LISTING);

    Command::cargo_bin("pyc-dec-rs")?
        .arg("decompile")
        .arg(&first)
        .arg(&second)
        .assert()
        .success()
        .stdout(predicate::str::contains("first.json"))
        .stdout(predicate::str::contains("second.json"));
    Ok(())
}

#[test]
fn test_decompile_reports_failure() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let listing = write_listing(&dir, "broken.json", STRAY_POP_BLOCK);

    Command::cargo_bin("pyc-dec-rs")?
        .arg("decompile")
        .arg(&listing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not be reconstructed"))
        .stderr(predicate::str::contains("POP_BLOCK outside of the construct"));
    Ok(())
}

#[test]
fn test_disasm_marks_jump_targets() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let listing = write_listing(&dir, "if.json", IF_LISTING);

    Command::cargo_bin("pyc-dec-rs")?
        .arg("disasm")
        .arg(&listing)
        .assert()
        .success()
        .stdout(predicate::str::contains("Disassembly of <module>:"))
        .stdout(predicate::str::contains(">>     10 LOAD_CONST"));
    Ok(())
}

#[test]
fn test_cfg_exports_dot() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let listing = write_listing(&dir, "if.json", IF_LISTING);
    let dot = dir.path().join("if.dot");

    Command::cargo_bin("pyc-dec-rs")?
        .arg("cfg")
        .arg(&listing)
        .arg("--dot")
        .arg(&dot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Basic blocks: 3"));

    let content = fs::read_to_string(&dot)?;
    assert!(content.starts_with("digraph \"<module>\""));
    Ok(())
}
