//! Shared helpers for integration tests
#![allow(dead_code)]

use pyc_dec_rs::ast::nodes::{BoolOperator, Expr, Stmt};
use pyc_dec_rs::{CodeObject, Decompiler, InstructionBuilder, Result};

/// Build the listing as a module and reconstruct it with default options
pub fn decompile_module(builder: &mut InstructionBuilder) -> Result<Vec<Stmt>> {
    let code = builder.build_code("<module>")?;
    Decompiler::new().decompile_module(&code)
}

/// Build a code object for a nested routine
pub fn code(name: &str, args: &[&str], builder: &mut InstructionBuilder) -> CodeObject {
    builder
        .build_code(name)
        .expect("listing labels resolve")
        .with_args(args)
}

pub fn name(id: &str) -> Expr {
    Expr::name(id)
}

pub fn expr_stmt(id: &str) -> Stmt {
    Stmt::Expr(Expr::name(id))
}

pub fn call_stmt(func: &str) -> Stmt {
    Stmt::Expr(Expr::call(Expr::name(func), vec![]))
}

pub fn and(operands: Vec<Expr>) -> Expr {
    Expr::BoolOp {
        op: BoolOperator::And,
        operands,
    }
}

pub fn or(operands: Vec<Expr>) -> Expr {
    Expr::BoolOp {
        op: BoolOperator::Or,
        operands,
    }
}
