//! Operation kinds of the canonical block-stack instruction set
//!
//! The set is closed: every instruction in a listing maps to exactly one
//! [`OperationKind`], spelled in listings by its `dis`-style opname. Kinds the
//! engine cannot reconstruct are still named here so they can be rejected with
//! a precise error instead of failing to parse.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Coarse grouping of operation kinds, used by listings and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OperationCategory {
    Stack,
    Load,
    Store,
    Delete,
    Unary,
    Binary,
    InPlace,
    Compare,
    Build,
    Call,
    Function,
    Jump,
    Block,
    Iterator,
    Comprehension,
    Return,
    Import,
    Raise,
    Format,
    Unsupported,
}

macro_rules! operation_kinds {
    ($($variant:ident => ($name:literal, $category:ident)),* $(,)?) => {
        /// One operation of the canonical instruction set
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OperationKind {
            $($variant),*
        }

        impl OperationKind {
            /// Every operation kind, in opcode-table order
            pub const ALL: &'static [OperationKind] = &[$(OperationKind::$variant),*];

            /// The `dis`-style opname used in listings
            pub fn name(&self) -> &'static str {
                match self {
                    $(OperationKind::$variant => $name),*
                }
            }

            pub fn category(&self) -> OperationCategory {
                match self {
                    $(OperationKind::$variant => OperationCategory::$category),*
                }
            }
        }
    };
}

operation_kinds! {
    Nop => ("NOP", Stack),
    PopTop => ("POP_TOP", Stack),
    RotTwo => ("ROT_TWO", Stack),
    RotThree => ("ROT_THREE", Stack),
    DupTop => ("DUP_TOP", Stack),
    DupTopTwo => ("DUP_TOP_TWO", Stack),

    LoadConst => ("LOAD_CONST", Load),
    LoadName => ("LOAD_NAME", Load),
    LoadGlobal => ("LOAD_GLOBAL", Load),
    LoadFast => ("LOAD_FAST", Load),
    LoadDeref => ("LOAD_DEREF", Load),
    LoadClassderef => ("LOAD_CLASSDEREF", Load),
    LoadClosure => ("LOAD_CLOSURE", Load),
    LoadAttr => ("LOAD_ATTR", Load),
    LoadMethod => ("LOAD_METHOD", Load),
    LoadBuildClass => ("LOAD_BUILD_CLASS", Load),

    StoreName => ("STORE_NAME", Store),
    StoreGlobal => ("STORE_GLOBAL", Store),
    StoreFast => ("STORE_FAST", Store),
    StoreDeref => ("STORE_DEREF", Store),
    StoreAttr => ("STORE_ATTR", Store),
    StoreSubscr => ("STORE_SUBSCR", Store),
    UnpackSequence => ("UNPACK_SEQUENCE", Store),

    DeleteName => ("DELETE_NAME", Delete),
    DeleteGlobal => ("DELETE_GLOBAL", Delete),
    DeleteFast => ("DELETE_FAST", Delete),
    DeleteDeref => ("DELETE_DEREF", Delete),
    DeleteAttr => ("DELETE_ATTR", Delete),
    DeleteSubscr => ("DELETE_SUBSCR", Delete),

    UnaryPositive => ("UNARY_POSITIVE", Unary),
    UnaryNegative => ("UNARY_NEGATIVE", Unary),
    UnaryNot => ("UNARY_NOT", Unary),
    UnaryInvert => ("UNARY_INVERT", Unary),

    BinaryPower => ("BINARY_POWER", Binary),
    BinaryMultiply => ("BINARY_MULTIPLY", Binary),
    BinaryMatrixMultiply => ("BINARY_MATRIX_MULTIPLY", Binary),
    BinaryFloorDivide => ("BINARY_FLOOR_DIVIDE", Binary),
    BinaryTrueDivide => ("BINARY_TRUE_DIVIDE", Binary),
    BinaryModulo => ("BINARY_MODULO", Binary),
    BinaryAdd => ("BINARY_ADD", Binary),
    BinarySubtract => ("BINARY_SUBTRACT", Binary),
    BinaryLshift => ("BINARY_LSHIFT", Binary),
    BinaryRshift => ("BINARY_RSHIFT", Binary),
    BinaryAnd => ("BINARY_AND", Binary),
    BinaryXor => ("BINARY_XOR", Binary),
    BinaryOr => ("BINARY_OR", Binary),
    BinarySubscr => ("BINARY_SUBSCR", Binary),

    InplacePower => ("INPLACE_POWER", InPlace),
    InplaceMultiply => ("INPLACE_MULTIPLY", InPlace),
    InplaceMatrixMultiply => ("INPLACE_MATRIX_MULTIPLY", InPlace),
    InplaceFloorDivide => ("INPLACE_FLOOR_DIVIDE", InPlace),
    InplaceTrueDivide => ("INPLACE_TRUE_DIVIDE", InPlace),
    InplaceModulo => ("INPLACE_MODULO", InPlace),
    InplaceAdd => ("INPLACE_ADD", InPlace),
    InplaceSubtract => ("INPLACE_SUBTRACT", InPlace),
    InplaceLshift => ("INPLACE_LSHIFT", InPlace),
    InplaceRshift => ("INPLACE_RSHIFT", InPlace),
    InplaceAnd => ("INPLACE_AND", InPlace),
    InplaceXor => ("INPLACE_XOR", InPlace),
    InplaceOr => ("INPLACE_OR", InPlace),

    CompareOp => ("COMPARE_OP", Compare),

    BuildTuple => ("BUILD_TUPLE", Build),
    BuildList => ("BUILD_LIST", Build),
    BuildSet => ("BUILD_SET", Build),
    BuildMap => ("BUILD_MAP", Build),
    BuildConstKeyMap => ("BUILD_CONST_KEY_MAP", Build),
    BuildSlice => ("BUILD_SLICE", Build),
    BuildString => ("BUILD_STRING", Build),

    CallFunction => ("CALL_FUNCTION", Call),
    CallFunctionKw => ("CALL_FUNCTION_KW", Call),
    CallMethod => ("CALL_METHOD", Call),
    MakeFunction => ("MAKE_FUNCTION", Function),

    PopJumpIfFalse => ("POP_JUMP_IF_FALSE", Jump),
    PopJumpIfTrue => ("POP_JUMP_IF_TRUE", Jump),
    JumpIfFalseOrPop => ("JUMP_IF_FALSE_OR_POP", Jump),
    JumpIfTrueOrPop => ("JUMP_IF_TRUE_OR_POP", Jump),
    JumpForward => ("JUMP_FORWARD", Jump),
    JumpAbsolute => ("JUMP_ABSOLUTE", Jump),

    SetupLoop => ("SETUP_LOOP", Block),
    SetupExcept => ("SETUP_EXCEPT", Block),
    SetupFinally => ("SETUP_FINALLY", Block),
    SetupWith => ("SETUP_WITH", Block),
    PopBlock => ("POP_BLOCK", Block),
    PopExcept => ("POP_EXCEPT", Block),
    EndFinally => ("END_FINALLY", Block),
    WithCleanupStart => ("WITH_CLEANUP_START", Block),
    WithCleanupFinish => ("WITH_CLEANUP_FINISH", Block),
    WithCleanup => ("WITH_CLEANUP", Block),
    BreakLoop => ("BREAK_LOOP", Block),
    ContinueLoop => ("CONTINUE_LOOP", Block),

    GetIter => ("GET_ITER", Iterator),
    ForIter => ("FOR_ITER", Iterator),

    ListAppend => ("LIST_APPEND", Comprehension),
    SetAdd => ("SET_ADD", Comprehension),
    MapAdd => ("MAP_ADD", Comprehension),

    ReturnValue => ("RETURN_VALUE", Return),
    YieldValue => ("YIELD_VALUE", Return),

    ImportName => ("IMPORT_NAME", Import),
    ImportFrom => ("IMPORT_FROM", Import),
    ImportStar => ("IMPORT_STAR", Import),

    RaiseVarargs => ("RAISE_VARARGS", Raise),

    FormatValue => ("FORMAT_VALUE", Format),

    YieldFrom => ("YIELD_FROM", Unsupported),
    GetYieldFromIter => ("GET_YIELD_FROM_ITER", Unsupported),
    GetAwaitable => ("GET_AWAITABLE", Unsupported),
    GetAiter => ("GET_AITER", Unsupported),
    GetAnext => ("GET_ANEXT", Unsupported),
    BeforeAsyncWith => ("BEFORE_ASYNC_WITH", Unsupported),
    SetupAsyncWith => ("SETUP_ASYNC_WITH", Unsupported),
    UnpackEx => ("UNPACK_EX", Unsupported),
    CallFunctionEx => ("CALL_FUNCTION_EX", Unsupported),
    BuildTupleUnpack => ("BUILD_TUPLE_UNPACK", Unsupported),
    BuildListUnpack => ("BUILD_LIST_UNPACK", Unsupported),
    BuildSetUnpack => ("BUILD_SET_UNPACK", Unsupported),
    BuildMapUnpack => ("BUILD_MAP_UNPACK", Unsupported),
    SetupAnnotations => ("SETUP_ANNOTATIONS", Unsupported),
    PrintExpr => ("PRINT_EXPR", Unsupported),
    ExtendedArg => ("EXTENDED_ARG", Unsupported),
}

static OPNAME_TABLE: Lazy<HashMap<&'static str, OperationKind>> = Lazy::new(|| {
    OperationKind::ALL
        .iter()
        .map(|kind| (kind.name(), *kind))
        .collect()
});

impl OperationKind {
    /// Look up an operation kind by opname
    pub fn from_opname(name: &str) -> Option<OperationKind> {
        OPNAME_TABLE.get(name).copied()
    }

    /// Whether the instruction carries an absolute jump target
    pub fn has_jump_target(&self) -> bool {
        matches!(
            self,
            OperationKind::PopJumpIfFalse
                | OperationKind::PopJumpIfTrue
                | OperationKind::JumpIfFalseOrPop
                | OperationKind::JumpIfTrueOrPop
                | OperationKind::JumpForward
                | OperationKind::JumpAbsolute
                | OperationKind::SetupLoop
                | OperationKind::SetupExcept
                | OperationKind::SetupFinally
                | OperationKind::SetupWith
                | OperationKind::ForIter
                | OperationKind::ContinueLoop
        )
    }

    /// AND/OR short-circuit jumps (both the popping and the keeping variants)
    pub fn is_boolean_jump(&self) -> bool {
        matches!(
            self,
            OperationKind::PopJumpIfFalse
                | OperationKind::PopJumpIfTrue
                | OperationKind::JumpIfFalseOrPop
                | OperationKind::JumpIfTrueOrPop
        )
    }

    /// Jumps taken when the tested value is truthy
    pub fn is_or_jump(&self) -> bool {
        matches!(
            self,
            OperationKind::PopJumpIfTrue | OperationKind::JumpIfTrueOrPop
        )
    }

    pub fn is_unconditional_jump(&self) -> bool {
        matches!(self, OperationKind::JumpForward | OperationKind::JumpAbsolute)
    }

    /// Block-stack setups that are closed by an `END_FINALLY`
    pub fn opens_finally_scope(&self) -> bool {
        matches!(
            self,
            OperationKind::SetupExcept | OperationKind::SetupFinally | OperationKind::SetupWith
        )
    }

    pub fn is_setup(&self) -> bool {
        self.opens_finally_scope() || *self == OperationKind::SetupLoop
    }

    /// Stores that bind a plain name
    pub fn is_name_store(&self) -> bool {
        matches!(
            self,
            OperationKind::StoreName
                | OperationKind::StoreGlobal
                | OperationKind::StoreFast
                | OperationKind::StoreDeref
        )
    }

    /// Instructions that end a statement at the top of a block. Loop tests
    /// are only searched for before the first of these.
    pub fn ends_statement(&self) -> bool {
        matches!(
            self.category(),
            OperationCategory::Store | OperationCategory::Delete | OperationCategory::Raise
        ) || matches!(
            self,
            OperationKind::PopTop
                | OperationKind::ReturnValue
                | OperationKind::JumpForward
                | OperationKind::JumpAbsolute
                | OperationKind::BreakLoop
                | OperationKind::ContinueLoop
                | OperationKind::PopBlock
                | OperationKind::ImportStar
        ) || self.is_setup()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::from_opname(s)
            .ok_or_else(|| crate::error::Error::listing(format!("unknown opname `{}`", s)))
    }
}

impl Serialize for OperationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for OperationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        OperationKind::from_opname(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown opname `{}`", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opname_table_covers_every_kind() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_opname(kind.name()), Some(*kind));
        }
        assert_eq!(OPNAME_TABLE.len(), OperationKind::ALL.len());
    }

    #[test]
    fn unknown_opname_is_rejected() {
        assert!("LOAD_SOMETHING".parse::<OperationKind>().is_err());
        assert_eq!(
            "POP_JUMP_IF_TRUE".parse::<OperationKind>().ok(),
            Some(OperationKind::PopJumpIfTrue)
        );
    }

    #[test]
    fn jump_classification() {
        assert!(OperationKind::JumpIfTrueOrPop.is_or_jump());
        assert!(!OperationKind::PopJumpIfFalse.is_or_jump());
        assert!(OperationKind::PopJumpIfFalse.is_boolean_jump());
        assert!(!OperationKind::JumpForward.is_boolean_jump());
        assert!(OperationKind::SetupWith.opens_finally_scope());
        assert!(!OperationKind::SetupLoop.opens_finally_scope());
        assert!(OperationKind::StoreAttr.ends_statement());
        assert!(!OperationKind::LoadAttr.ends_statement());
    }
}
