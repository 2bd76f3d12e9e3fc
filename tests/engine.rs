mod common;

use common::{code, decompile_module, expr_stmt, name};
use pyc_dec_rs::ast::nodes::{ExceptHandler, Stmt};
use pyc_dec_rs::decompiler::verify_ledger;
use pyc_dec_rs::{
    CodeObject, DecompileOptions, Decompiler, Error, InstructionBuilder, OperationKind as Op,
    PatternFamily, PatternStats,
};
use rayon::prelude::*;
use std::sync::Arc;

type TestResult = Result<(), Box<dyn std::error::Error>>;

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

fn nested_function_module() -> CodeObject {
    let mut body = InstructionBuilder::new();
    body.load_fast("a").op(Op::ReturnValue);
    let body = code("f", &["a"], &mut body);

    let mut b = InstructionBuilder::new();
    b.load_code(body)
        .load_const("f")
        .op_count(Op::MakeFunction, 0)
        .store_name("f")
        .return_none();
    b.build_code("<module>").expect("labels resolve")
}

#[test]
fn test_listing_from_json() -> TestResult {
    let code = CodeObject::from_json(IF_LISTING)?;
    let module = Decompiler::new().decompile_module(&code)?;
    assert_eq!(
        module,
        vec![Stmt::If {
            test: name("a"),
            body: vec![expr_stmt("b")],
            orelse: vec![],
        }]
    );
    Ok(())
}

#[test]
fn test_listing_validation() {
    let backwards = r#"{"name": "m", "instructions": [
        {"position": 2, "opname": "NOP"},
        {"position": 0, "opname": "NOP"}
    ]}"#;
    assert!(matches!(
        CodeObject::from_json(backwards),
        Err(Error::Listing { .. })
    ));

    let stray_target = r#"{"name": "m", "instructions": [
        {"position": 0, "opname": "JUMP_FORWARD", "jump_target": 3},
        {"position": 2, "opname": "NOP"}
    ]}"#;
    assert!(matches!(
        CodeObject::from_json(stray_target),
        Err(Error::Listing { .. })
    ));

    let unknown = r#"{"name": "m", "instructions": [{"position": 0, "opname": "FROB"}]}"#;
    assert!(CodeObject::from_json(unknown).is_err());
}

#[test]
fn test_pattern_stats_observer() -> TestResult {
    let mut b = InstructionBuilder::new();
    b.load_name("a")
        .jump(Op::JumpIfTrueOrPop, "store")
        .load_name("b")
        .label("store")
        .store_name("x")
        .load_name("x")
        .jump(Op::PopJumpIfFalse, "end")
        .load_name("y")
        .pop_top()
        .jump(Op::JumpForward, "end")
        .label("end")
        .return_none();
    let code = b.build_code("<module>")?;

    let stats = Arc::new(PatternStats::new());
    let decompiler = Decompiler::new().with_observer(stats.clone());
    decompiler.decompile_module(&code)?;

    assert_eq!(stats.count(PatternFamily::Boolean), 1);
    assert_eq!(stats.count(PatternFamily::Conditional), 1);
    assert_eq!(stats.count(PatternFamily::Loop), 0);
    assert_eq!(stats.total(), 2);
    assert_eq!(stats.snapshot().len(), PatternFamily::ALL.len());
    Ok(())
}

#[test]
fn test_unsupported_operation() {
    let mut b = InstructionBuilder::new();
    b.load_name("a").op(Op::GetAwaitable).pop_top().return_none();

    let err = decompile_module(&mut b).unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedOperation {
            opname: "GET_AWAITABLE".to_string(),
            position: 2,
        }
    );
}

#[test]
fn test_value_left_on_stack() {
    let mut b = InstructionBuilder::new();
    b.load_name("a");

    let err = decompile_module(&mut b).unwrap_err();
    assert!(matches!(err, Error::StackInvariantViolation { .. }));
}

#[test]
fn test_stray_block_closer() {
    let mut b = InstructionBuilder::new();
    b.op(Op::PopBlock).return_none();

    let err = decompile_module(&mut b).unwrap_err();
    assert!(matches!(err, Error::UnrecognizedPattern { position: 0, .. }));
}

#[test]
fn test_jump_outside_any_loop() {
    let mut b = InstructionBuilder::new();
    b.load_name("a")
        .pop_top()
        .jump(Op::JumpAbsolute, "end")
        .load_name("dead")
        .pop_top()
        .label("end")
        .return_none();

    let err = decompile_module(&mut b).unwrap_err();
    assert!(
        matches!(err, Error::UnrecognizedPattern { position: 4, .. }),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn test_stray_forward_jump() {
    let mut b = InstructionBuilder::new();
    b.load_name("a")
        .pop_top()
        .jump(Op::JumpForward, "end")
        .load_name("dead")
        .pop_top()
        .label("end")
        .return_none();

    let err = decompile_module(&mut b).unwrap_err();
    assert!(
        matches!(err, Error::UnrecognizedPattern { position: 4, .. }),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn test_ledger_over_built_listing() -> TestResult {
    let mut b = InstructionBuilder::new();
    b.load_name("a").pop_top().return_none();
    let instructions = b.build()?;

    assert!(verify_ledger(&instructions, &[0, 2, 4, 6]).is_ok());
    assert_eq!(
        verify_ledger(&instructions, &[0, 2, 2, 6]),
        Err(Error::InstructionAccounting {
            missing: vec![4],
            duplicated: vec![2],
        })
    );
    Ok(())
}

#[test]
fn test_skip_nested_bodies() -> TestResult {
    let options = DecompileOptions {
        decompile_nested: false,
        ..DecompileOptions::default()
    };
    let module = Decompiler::with_options(options).decompile_module(&nested_function_module())?;
    match module.as_slice() {
        [Stmt::FunctionDef(function)] => {
            assert_eq!(function.name, "f");
            assert_eq!(function.body, vec![Stmt::Pass]);
        }
        other => panic!("expected one function definition, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_keep_implicit_return() -> TestResult {
    let options = DecompileOptions {
        strip_implicit_return: false,
        ..DecompileOptions::default()
    };
    let mut b = InstructionBuilder::new();
    b.load_name("a").pop_top().return_none();
    let code = b.build_code("<module>")?;

    let module = Decompiler::with_options(options).decompile_module(&code)?;
    assert_eq!(
        module,
        vec![expr_stmt("a"), Stmt::Return(Some(pyc_dec_rs::Expr::none()))]
    );

    let stripped = Decompiler::new().decompile_module(&code)?;
    assert_eq!(stripped, vec![expr_stmt("a")]);
    Ok(())
}

#[test]
fn test_assemble_instruction_range() -> TestResult {
    let mut b = InstructionBuilder::new();
    b.load_name("a").store_name("b");
    let instructions = b.build()?;

    let statements = Decompiler::new().assemble(&instructions)?;
    assert_eq!(statements, vec![Stmt::assign(name("b"), name("a"))]);
    Ok(())
}

#[test]
fn test_one_decompiler_across_threads() -> TestResult {
    let code = CodeObject::from_json(IF_LISTING)?;
    let decompiler = Decompiler::new();
    let modules = (0..16)
        .into_par_iter()
        .map(|_| decompiler.decompile_module(&code))
        .collect::<Result<Vec<_>, _>>()?;
    assert!(modules.windows(2).all(|pair| pair[0] == pair[1]));
    Ok(())
}

#[test]
fn test_tree_serialization() -> TestResult {
    let handler = ExceptHandler {
        kind: Some(name("ValueError")),
        bound_name: Some("e".to_string()),
        body: vec![Stmt::Pass],
    };
    let value = serde_json::to_value(&handler)?;
    assert_eq!(value["type"], serde_json::json!({"Name": "ValueError"}));
    assert_eq!(value["bound_name"], "e");

    let code = CodeObject::from_json(IF_LISTING)?;
    let module = Decompiler::new().decompile_module(&code)?;
    let json = serde_json::to_value(&module)?;
    assert_eq!(json[0]["If"]["test"], serde_json::json!({"Name": "a"}));
    Ok(())
}
