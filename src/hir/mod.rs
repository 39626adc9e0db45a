//! High-level Intermediate Representation (HIR)
//!
//! HIR is the typed tree produced by the type checker. It contains:
//! - Resolved types for all expressions
//! - Resolved storage (local slots, array indices, routine indices)
//! - Explicit `Promote` nodes wherever an int is widened to a float
//!
//! Code generation reads nothing else, so it never has to look a name up.

use crate::ast::{BinaryOp, Direction};
use crate::types::Type;
use serde::Serialize;

/// HIR root
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    /// Global arrays in declaration order
    pub arrays: Vec<HirArray>,
    /// Routines in declaration order
    pub routines: Vec<HirRoutine>,
    /// Index of `main` in `routines`
    pub entry: usize,
}

/// Position of an array in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArrayIndex(pub u32);

/// Position of a routine in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RoutineIndex(pub u32);

/// Local slot within a routine; parameters come first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Slot(pub u32);

// ==================== DECLARATIONS ====================

#[derive(Debug, Clone, Serialize)]
pub struct HirArray {
    pub name: String,
    pub elem: Type,
    pub len: u32,
}

impl HirArray {
    pub fn byte_len(&self) -> u64 {
        u64::from(self.len) * u64::from(self.elem.byte_width())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HirRoutine {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Option<Type>,
    /// Types of the slots after the parameters
    pub locals: Vec<Type>,
    /// Name of every slot, parameters included
    pub slot_names: Vec<String>,
    pub body: HirBlock,
}

// ==================== STATEMENTS ====================

pub type HirBlock = Vec<HirStmt>;

#[derive(Debug, Clone, Serialize)]
pub enum HirStmt {
    /// Store into a slot or array element; `value` already has the place's type
    Assign { place: HirPlace, value: HirExpr },
    If {
        cond: HirCond,
        then_block: HirBlock,
        else_block: Option<HirBlock>,
    },
    /// Counted loop over the int slot `slot`
    For {
        slot: Slot,
        start: HirExpr,
        end: HirExpr,
        direction: Direction,
        body: HirBlock,
    },
    While { cond: HirCond, body: HirBlock },
    Write(HirExpr),
    Read(HirPlace),
    Return(Option<HirExpr>),
    /// Call of a procedure, for its effects
    Call {
        routine: RoutineIndex,
        args: Vec<HirExpr>,
    },
}

/// Assignable location
#[derive(Debug, Clone, Serialize)]
pub enum HirPlace {
    Local {
        slot: Slot,
        ty: Type,
    },
    Element {
        array: ArrayIndex,
        elem: Type,
        index: Box<HirExpr>,
    },
}

impl HirPlace {
    pub fn ty(&self) -> Type {
        match self {
            HirPlace::Local { ty, .. } => *ty,
            HirPlace::Element { elem, .. } => *elem,
        }
    }
}

/// Comparison used as an `if` / `while` condition.
/// Both operands have type `operand_ty` after promotion.
#[derive(Debug, Clone, Serialize)]
pub struct HirCond {
    pub op: CmpOp,
    pub lhs: HirExpr,
    pub rhs: HirExpr,
    pub operand_ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn from_binary(op: BinaryOp) -> Option<CmpOp> {
        match op {
            BinaryOp::Eq => Some(CmpOp::Eq),
            BinaryOp::Ne => Some(CmpOp::Ne),
            BinaryOp::Lt => Some(CmpOp::Lt),
            BinaryOp::Le => Some(CmpOp::Le),
            BinaryOp::Gt => Some(CmpOp::Gt),
            BinaryOp::Ge => Some(CmpOp::Ge),
            _ => None,
        }
    }
}

// ==================== EXPRESSIONS ====================

/// HIR expression (with type information)
#[derive(Debug, Clone, Serialize)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: Type,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    /// Widen to `target`, wrapping in `Promote` when an int meets a float
    pub fn coerce(self, target: Type) -> HirExpr {
        if self.ty == Type::Int && target == Type::Float {
            HirExpr::new(HirExprKind::Promote(Box::new(self)), Type::Float)
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum HirExprKind {
    Int(i32),
    Float(f64),
    Local(Slot),
    Load {
        array: ArrayIndex,
        index: Box<HirExpr>,
    },
    Neg(Box<HirExpr>),
    Arith {
        op: ArithOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Call {
        routine: RoutineIndex,
        args: Vec<HirExpr>,
    },
    /// Int to float conversion
    Promote(Box<HirExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Int only
    Rem,
}

impl ArithOp {
    pub fn from_binary(op: BinaryOp) -> Option<ArithOp> {
        match op {
            BinaryOp::Add => Some(ArithOp::Add),
            BinaryOp::Sub => Some(ArithOp::Sub),
            BinaryOp::Mul => Some(ArithOp::Mul),
            BinaryOp::Div => Some(ArithOp::Div),
            BinaryOp::Rem => Some(ArithOp::Rem),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_wraps_only_int_to_float() {
        let int = HirExpr::new(HirExprKind::Int(1), Type::Int);
        let promoted = int.clone().coerce(Type::Float);
        assert_eq!(promoted.ty, Type::Float);
        assert!(matches!(promoted.kind, HirExprKind::Promote(_)));

        let same = int.coerce(Type::Int);
        assert!(matches!(same.kind, HirExprKind::Int(1)));
    }
}
