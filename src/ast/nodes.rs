//! Statement and expression nodes of the reconstructed tree
//!
//! The tree is handed to an external printer, so every node serializes. A few
//! expression variants ([`Expr::Function`], [`Expr::Class`], [`Expr::BuildClass`],
//! [`Expr::Import`], [`Expr::ImportedName`], [`Expr::InPlace`]) only exist
//! while the simulator is assembling a statement and never appear in a
//! finished tree.

use crate::bytecode::{CompareOp, Constant};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitXor,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOperator {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

/// Keyword argument of a call or class definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyword {
    pub arg: String,
    pub value: Expr,
}

/// One `for ... in ... if ...` clause of a comprehension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generator {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    /// The element, or the key for dict comprehensions
    pub element: Expr,
    /// The value for dict comprehensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Expr>,
    pub generators: Vec<Generator>,
}

/// Parameter list of a function or lambda
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Arguments {
    pub args: Vec<String>,
    pub vararg: Option<String>,
    pub kwonlyargs: Vec<String>,
    pub kwarg: Option<String>,
    /// Defaults for the trailing positional parameters
    pub defaults: Vec<Expr>,
    pub kw_defaults: Vec<Keyword>,
    pub annotations: Vec<Keyword>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub args: Arguments,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

/// `name as asname` in import statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

impl Alias {
    pub fn new(name: impl Into<String>, asname: Option<String>) -> Self {
        Self {
            name: name.into(),
            asname,
        }
    }
}

/// In-flight import produced by `IMPORT_NAME`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingImport {
    pub module: String,
    pub level: u32,
    /// Whether a from-list was given (`from m import ...`)
    pub from_import: bool,
    /// Set once `LOAD_ATTR` walks into a dotted module for `import a.b as c`
    pub aliased: bool,
    pub names: Vec<Alias>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptHandler {
    /// Matched exception type; `None` for a bare `except:`
    #[serde(rename = "type")]
    pub kind: Option<Expr>,
    pub bound_name: Option<String>,
    pub body: Vec<Stmt>,
}

/// Expression nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Name(String),
    Constant(Constant),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    BoolOp {
        op: BoolOperator,
        operands: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        args: Arguments,
        body: Box<Expr>,
    },
    Comprehension(Box<Comprehension>),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Yield(Option<Box<Expr>>),
    FormattedValue {
        value: Box<Expr>,
        conversion: Option<char>,
        format_spec: Option<Box<Expr>>,
    },
    JoinedStr(Vec<Expr>),
    /// Value supplied by the enclosing construct: a loop's next item, a
    /// `with` context value, or an element of an unpacked sequence
    Placeholder,

    Function(Box<FunctionDef>),
    Class(Box<ClassDef>),
    BuildClass,
    Import(Box<PendingImport>),
    ImportedName(String),
    InPlace {
        target: Box<Expr>,
        op: BinaryOperator,
        value: Box<Expr>,
    },
}

/// Statement nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinaryOperator,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    TryExcept {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
    },
    TryFinally {
        body: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    With {
        context: Expr,
        bound_name: Option<Expr>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Expr(Expr),
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Import(Vec<Alias>),
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: u32,
    },
    Delete(Vec<Expr>),
    Global(Vec<String>),
}

impl Expr {
    pub fn name(id: impl Into<String>) -> Self {
        Expr::Name(id.into())
    }

    pub fn constant(value: impl Into<Constant>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn none() -> Self {
        Expr::Constant(Constant::None)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Expr::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
        }
    }

    /// Build a boolean operation, merging operands that already use `op` so
    /// `a and b and c` stays one flat node
    pub fn bool_op(op: BoolOperator, left: Expr, right: Expr) -> Self {
        let mut operands = Vec::new();
        for side in [left, right] {
            match side {
                Expr::BoolOp {
                    op: inner,
                    operands: nested,
                } if inner == op => operands.extend(nested),
                other => operands.push(other),
            }
        }
        Expr::BoolOp { op, operands }
    }

    pub fn is_none_constant(&self) -> bool {
        matches!(self, Expr::Constant(Constant::None))
    }

    pub fn as_str_constant(&self) -> Option<&str> {
        match self {
            Expr::Constant(Constant::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Whether this is a construction-time value that must be folded into a
    /// statement before the tree is complete
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Expr::Function(_)
                | Expr::Class(_)
                | Expr::BuildClass
                | Expr::Import(_)
                | Expr::ImportedName(_)
                | Expr::InPlace { .. }
        )
    }
}

impl Stmt {
    pub fn expr(value: Expr) -> Self {
        Stmt::Expr(value)
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign {
            targets: vec![target],
            value,
        }
    }

    /// `target = <placeholder>` as produced by the first store of a loop
    /// body, a `with ... as` binding or an unpacking target
    pub fn placeholder_target(&self) -> Option<&Expr> {
        match self {
            Stmt::Assign { targets, value } if targets.len() == 1 && *value == Expr::Placeholder => {
                targets.first()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_op_flattens_same_operator() {
        let inner = Expr::bool_op(BoolOperator::And, Expr::name("b"), Expr::name("c"));
        let outer = Expr::bool_op(BoolOperator::And, Expr::name("a"), inner);
        assert_eq!(
            outer,
            Expr::BoolOp {
                op: BoolOperator::And,
                operands: vec![Expr::name("a"), Expr::name("b"), Expr::name("c")],
            }
        );
    }

    #[test]
    fn bool_op_keeps_mixed_operators_nested() {
        let and = Expr::bool_op(BoolOperator::And, Expr::name("a"), Expr::name("b"));
        let or = Expr::bool_op(BoolOperator::Or, and.clone(), Expr::name("c"));
        assert_eq!(
            or,
            Expr::BoolOp {
                op: BoolOperator::Or,
                operands: vec![and, Expr::name("c")],
            }
        );
    }

    #[test]
    fn placeholder_target_requires_single_target() {
        let stmt = Stmt::assign(Expr::name("x"), Expr::Placeholder);
        assert_eq!(stmt.placeholder_target(), Some(&Expr::name("x")));
        assert_eq!(
            Stmt::assign(Expr::name("x"), Expr::name("y")).placeholder_target(),
            None
        );
    }
}
