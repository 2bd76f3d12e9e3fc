mod common;

use common::{and, code, decompile_module, name, or};
use pyc_dec_rs::ast::nodes::{Comprehension, ComprehensionKind, Expr, Generator, Stmt};
use pyc_dec_rs::{
    CodeObject, DecompileOptions, Decompiler, Error, InstructionBuilder, OperationKind as Op,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// `<name>(.0)` building into an empty accumulator: one clause over `x`
/// appending `x`, optionally filtered on `x`
fn single_clause(name: &str, accumulator: Op, append: Op, filtered: bool) -> CodeObject {
    let mut b = InstructionBuilder::new();
    b.op_count(accumulator, 0)
        .load_fast(".0")
        .label("head")
        .jump(Op::ForIter, "done")
        .store_fast("x");
    if filtered {
        b.load_fast("x").jump(Op::PopJumpIfFalse, "head");
    }
    b.load_fast("x")
        .op_count(append, 2)
        .jump(Op::JumpAbsolute, "head")
        .label("done")
        .op(Op::ReturnValue);
    code(name, &[".0"], &mut b)
}

/// `y = <comprehension>(xs)`
fn assign_comprehension(inner: CodeObject, iterable: &str) -> InstructionBuilder {
    let qualname = inner.name.clone();
    let mut b = InstructionBuilder::new();
    b.load_code(inner)
        .load_const(qualname.as_str())
        .op_count(Op::MakeFunction, 0)
        .load_name(iterable)
        .op(Op::GetIter)
        .call(1)
        .store_name("y")
        .return_none();
    b
}

fn comprehension(
    kind: ComprehensionKind,
    element: Expr,
    value: Option<Expr>,
    generators: Vec<Generator>,
) -> Expr {
    Expr::Comprehension(Box::new(Comprehension {
        kind,
        element,
        value,
        generators,
    }))
}

fn generator(target: Expr, iter: &str, ifs: Vec<Expr>) -> Generator {
    Generator {
        target,
        iter: name(iter),
        ifs,
    }
}

#[test]
fn test_list_comprehension() -> TestResult {
    let inner = single_clause("<listcomp>", Op::BuildList, Op::ListAppend, false);
    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(
        module,
        vec![Stmt::assign(
            name("y"),
            comprehension(
                ComprehensionKind::List,
                name("x"),
                None,
                vec![generator(name("x"), "xs", vec![])],
            )
        )]
    );
    Ok(())
}

#[test]
fn test_filtered_set_comprehension() -> TestResult {
    let inner = single_clause("<setcomp>", Op::BuildSet, Op::SetAdd, true);
    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(
        module,
        vec![Stmt::assign(
            name("y"),
            comprehension(
                ComprehensionKind::Set,
                name("x"),
                None,
                vec![generator(name("x"), "xs", vec![name("x")])],
            )
        )]
    );
    Ok(())
}

#[test]
fn test_dict_comprehension_unpacks_target() -> TestResult {
    let mut b = InstructionBuilder::new();
    b.op_count(Op::BuildMap, 0)
        .load_fast(".0")
        .label("head")
        .jump(Op::ForIter, "done")
        .op_count(Op::UnpackSequence, 2)
        .store_fast("k")
        .store_fast("v")
        .load_fast("v")
        .load_fast("k")
        .op_count(Op::MapAdd, 2)
        .jump(Op::JumpAbsolute, "head")
        .label("done")
        .op(Op::ReturnValue);
    let inner = code("<dictcomp>", &[".0"], &mut b);

    let module = decompile_module(&mut assign_comprehension(inner, "items"))?;
    assert_eq!(
        module,
        vec![Stmt::assign(
            name("y"),
            comprehension(
                ComprehensionKind::Dict,
                name("k"),
                Some(name("v")),
                vec![generator(
                    Expr::Tuple(vec![name("k"), name("v")]),
                    "items",
                    vec![]
                )],
            )
        )]
    );
    Ok(())
}

#[test]
fn test_generator_expression_as_argument() -> TestResult {
    let mut g = InstructionBuilder::new();
    g.load_fast(".0")
        .label("head")
        .jump(Op::ForIter, "done")
        .store_fast("x")
        .load_fast("x")
        .op(Op::YieldValue)
        .pop_top()
        .jump(Op::JumpAbsolute, "head")
        .label("done")
        .return_none();
    let inner = code("<genexpr>", &[".0"], &mut g);

    let mut b = InstructionBuilder::new();
    b.load_name("f")
        .load_code(inner)
        .load_const("<genexpr>")
        .op_count(Op::MakeFunction, 0)
        .load_name("xs")
        .op(Op::GetIter)
        .call(1)
        .call(1)
        .pop_top()
        .return_none();

    let module = decompile_module(&mut b)?;
    let genexpr = comprehension(
        ComprehensionKind::Generator,
        name("x"),
        None,
        vec![generator(name("x"), "xs", vec![])],
    );
    assert_eq!(module, vec![Stmt::Expr(Expr::call(name("f"), vec![genexpr]))]);
    Ok(())
}

/// `<listcomp>` appending `x`, with the filter written by `filter` between
/// the target store and the `body` label
fn filtered_listcomp(filter: impl FnOnce(&mut InstructionBuilder)) -> CodeObject {
    let mut b = InstructionBuilder::new();
    b.op_count(Op::BuildList, 0)
        .load_fast(".0")
        .label("head")
        .jump(Op::ForIter, "done")
        .store_fast("x");
    filter(&mut b);
    b.label("body")
        .load_fast("x")
        .op_count(Op::ListAppend, 2)
        .jump(Op::JumpAbsolute, "head")
        .label("done")
        .op(Op::ReturnValue);
    code("<listcomp>", &[".0"], &mut b)
}

fn listcomp_with_ifs(ifs: Vec<Expr>) -> Vec<Stmt> {
    vec![Stmt::assign(
        name("y"),
        comprehension(
            ComprehensionKind::List,
            name("x"),
            None,
            vec![generator(name("x"), "xs", ifs)],
        ),
    )]
}

#[test]
fn test_or_filter() -> TestResult {
    // [x for x in xs if a or b]
    let inner = filtered_listcomp(|b| {
        b.load_global("a")
            .jump(Op::PopJumpIfTrue, "body")
            .load_global("b")
            .jump(Op::PopJumpIfFalse, "head");
    });
    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(module, listcomp_with_ifs(vec![or(vec![name("a"), name("b")])]));
    Ok(())
}

#[test]
fn test_and_or_filter() -> TestResult {
    // [x for x in xs if a and b or c]
    let inner = filtered_listcomp(|b| {
        b.load_global("a")
            .jump(Op::PopJumpIfFalse, "try_c")
            .load_global("b")
            .jump(Op::PopJumpIfTrue, "body")
            .label("try_c")
            .load_global("c")
            .jump(Op::PopJumpIfFalse, "head");
    });
    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(
        module,
        listcomp_with_ifs(vec![or(vec![
            and(vec![name("a"), name("b")]),
            name("c")
        ])])
    );
    Ok(())
}

#[test]
fn test_and_filter_yields_one_condition_per_jump() -> TestResult {
    // [x for x in xs if a and b] compiles like [x for x in xs if a if b]
    let inner = filtered_listcomp(|b| {
        b.load_global("a")
            .jump(Op::PopJumpIfFalse, "head")
            .load_global("b")
            .jump(Op::PopJumpIfFalse, "head");
    });
    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(module, listcomp_with_ifs(vec![name("a"), name("b")]));
    Ok(())
}

#[test]
fn test_negated_filter() -> TestResult {
    // [x for x in xs if not a]
    let inner = filtered_listcomp(|b| {
        b.load_global("a").jump(Op::PopJumpIfTrue, "head");
    });
    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(module, listcomp_with_ifs(vec![Expr::not(name("a"))]));
    Ok(())
}

#[test]
fn test_conditional_element_is_not_a_filter() -> TestResult {
    // [a if x else b for x in xs]
    let mut b = InstructionBuilder::new();
    b.op_count(Op::BuildList, 0)
        .load_fast(".0")
        .label("head")
        .jump(Op::ForIter, "done")
        .store_fast("x")
        .load_fast("x")
        .jump(Op::PopJumpIfFalse, "else")
        .load_global("a")
        .jump(Op::JumpForward, "append")
        .label("else")
        .load_global("b")
        .label("append")
        .op_count(Op::ListAppend, 2)
        .jump(Op::JumpAbsolute, "head")
        .label("done")
        .op(Op::ReturnValue);
    let inner = code("<listcomp>", &[".0"], &mut b);

    let module = decompile_module(&mut assign_comprehension(inner, "xs"))?;
    assert_eq!(
        module,
        vec![Stmt::assign(
            name("y"),
            comprehension(
                ComprehensionKind::List,
                Expr::IfExp {
                    test: Box::new(name("x")),
                    body: Box::new(name("a")),
                    orelse: Box::new(name("b")),
                },
                None,
                vec![generator(name("x"), "xs", vec![])],
            )
        )]
    );
    Ok(())
}

fn two_clause_listcomp() -> CodeObject {
    // [(x, y) for x in .0 for y in ys]
    let mut b = InstructionBuilder::new();
    b.op_count(Op::BuildList, 0)
        .load_fast(".0")
        .label("outer")
        .jump(Op::ForIter, "done")
        .store_fast("x")
        .load_global("ys")
        .op(Op::GetIter)
        .label("inner")
        .jump(Op::ForIter, "inner_done")
        .store_fast("y")
        .load_fast("x")
        .load_fast("y")
        .op_count(Op::BuildTuple, 2)
        .op_count(Op::ListAppend, 3)
        .jump(Op::JumpAbsolute, "inner")
        .label("inner_done")
        .jump(Op::JumpAbsolute, "outer")
        .label("done")
        .op(Op::ReturnValue);
    code("<listcomp>", &[".0"], &mut b)
}

#[test]
fn test_nested_comprehension_clauses() -> TestResult {
    let module = decompile_module(&mut assign_comprehension(two_clause_listcomp(), "xs"))?;
    assert_eq!(
        module,
        vec![Stmt::assign(
            name("y"),
            comprehension(
                ComprehensionKind::List,
                Expr::Tuple(vec![name("x"), name("y")]),
                None,
                vec![
                    generator(name("x"), "xs", vec![]),
                    generator(name("y"), "ys", vec![]),
                ],
            )
        )]
    );
    Ok(())
}

#[test]
fn test_nested_clauses_rejected_when_disabled() -> TestResult {
    let options = DecompileOptions {
        nested_comprehensions: false,
        ..DecompileOptions::default()
    };
    let code = assign_comprehension(two_clause_listcomp(), "xs").build_code("<module>")?;
    let err = Decompiler::with_options(options)
        .decompile_module(&code)
        .unwrap_err();
    assert!(
        matches!(err, Error::UnrecognizedPattern { position: 12, .. }),
        "unexpected error: {:?}",
        err
    );
    Ok(())
}

#[test]
fn test_comprehension_body_keeps_return_when_not_stripped() -> TestResult {
    let options = DecompileOptions {
        strip_implicit_return: false,
        ..DecompileOptions::default()
    };
    let inner = single_clause("<listcomp>", Op::BuildList, Op::ListAppend, false);
    let code = assign_comprehension(inner, "xs").build_code("<module>")?;
    let module = Decompiler::with_options(options).decompile_module(&code)?;
    assert_eq!(module.len(), 2);
    assert_eq!(module[1], Stmt::Return(Some(Expr::none())));
    Ok(())
}
