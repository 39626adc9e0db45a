//! Abstract Syntax Tree for the Imp language
//!
//! This module defines the AST types produced by the parser. The tree is
//! strictly owned: every node owns its children and nothing points back up.
//! Nodes that refer to a declaration by name carry a [`NodeId`] so the
//! resolver can attach the declaration they bind to.

use crate::common::{NodeId, Span};
use crate::types::{Signature, Type};
use serde::{Deserialize, Serialize};

/// Top-level AST: global arrays followed by routines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    pub arrays: Vec<ArrayDecl>,
    pub routines: Vec<Routine>,
}

impl Ast {
    pub fn find_routine(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.signature.name == name)
    }
}

// ==================== DECLARATIONS ====================

/// Global array declaration: `arrays int A[10]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayDecl {
    pub id: NodeId,
    pub name: String,
    pub elem: Type,
    /// Must fold to a positive integer constant
    pub size: Expr,
    pub span: Span,
}

/// Routine: a typed function or a `def` procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub id: NodeId,
    pub signature: RoutineSignature,
    /// Variables introduced by the `with` clause
    pub locals: Vec<VarDecl>,
    pub body: Block,
    pub span: Span,
}

/// Name, parameters and optional return type of a routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineSignature {
    pub name: String,
    pub params: Vec<VarDecl>,
    /// `None` for procedures declared with `def`
    pub return_type: Option<Type>,
}

impl RoutineSignature {
    pub fn to_signature(&self) -> Signature {
        Signature {
            params: self.params.iter().map(|p| p.ty).collect(),
            ret: self.return_type,
        }
    }
}

/// `type name` pair used for parameters and locals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub id: NodeId,
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

// ==================== STATEMENTS ====================

/// Brace-delimited statement list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Span of the closing brace
    pub close: Span,
}

impl Block {
    pub fn last(&self) -> Option<&Stmt> {
        self.stmts.last()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Assign {
        target: Place,
        value: Expr,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    For {
        id: NodeId,
        var: String,
        var_span: Span,
        start: Expr,
        end: Expr,
        direction: Direction,
        body: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Write(Expr),
    Read(Place),
    Return(Option<Expr>),
    Call(Call),
}

/// Step direction of a counted loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// `to`: step +1, continue while `var <= end`
    Ascending,
    /// `downto`: step -1, continue while `var >= end`
    Descending,
}

/// Assignable location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Place {
    Variable {
        id: NodeId,
        name: String,
        span: Span,
    },
    Element {
        id: NodeId,
        array: String,
        index: Box<Expr>,
        span: Span,
    },
}

impl Place {
    pub fn span(&self) -> Span {
        match self {
            Place::Variable { span, .. } | Place::Element { span, .. } => *span,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Place::Variable { name, .. } => name,
            Place::Element { array, .. } => array,
        }
    }
}

/// Routine call, either as a statement or inside an expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: NodeId,
    pub name: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

// ==================== EXPRESSIONS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Int(i32),
    Float(f64),
    /// Only ever reported as a type error; strings are not values
    Str(String),
    Variable(String),
    Index {
        array: String,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call(Call),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}
