//! Type checker for Imp
//!
//! This module implements type checking and produces HIR from the resolved
//! AST. It handles:
//! - Expression typing with int-to-float promotion
//! - Condition positions (comparisons are never values)
//! - Call arity and argument compatibility
//! - Return rules for functions and procedures
//! - The `main` entry point requirement

use crate::ast::*;
use crate::common::{NodeId, Span};
use crate::diagnostics::CompileError;
use crate::hir::*;
use crate::resolve::{DefKind, ResolvedAst, RoutineFrame, SymbolTable};
use crate::types::{Signature, Type};

type Result<T> = std::result::Result<T, CompileError>;

/// Type check a resolved AST and produce HIR
pub fn check(resolved: &ResolvedAst) -> Result<Program> {
    let checker = TypeChecker::new(&resolved.symbols);
    checker.check_program(resolved)
}

/// Name of the routine a module starts executing
pub const ENTRY_POINT: &str = "main";

/// Routine currently being checked
struct RoutineContext {
    name: String,
    ret: Option<Type>,
}

/// Type checker state
pub struct TypeChecker<'a> {
    symbols: &'a SymbolTable,
    routine: Option<RoutineContext>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            routine: None,
        }
    }

    pub fn check_program(mut self, resolved: &ResolvedAst) -> Result<Program> {
        let ast = &resolved.ast;

        let arrays = self
            .symbols
            .globals()
            .filter_map(|symbol| match symbol.kind {
                DefKind::Array { elem, len, .. } => Some(HirArray {
                    name: symbol.name.clone(),
                    elem,
                    len,
                }),
                _ => None,
            })
            .collect();

        let mut routines = Vec::with_capacity(ast.routines.len());
        for (routine, frame) in ast.routines.iter().zip(&resolved.frames) {
            routines.push(self.check_routine(routine, frame)?);
        }

        let entry = check_entry_point(ast)?;

        tracing::debug!(routines = routines.len(), entry, "type checked program");

        Ok(Program {
            arrays,
            routines,
            entry,
        })
    }

    // ==================== ROUTINES ====================

    fn check_routine(&mut self, routine: &Routine, frame: &RoutineFrame) -> Result<HirRoutine> {
        let name = routine.signature.name.clone();
        let ret = routine.signature.return_type;
        self.routine = Some(RoutineContext {
            name: name.clone(),
            ret,
        });

        let body = self.check_block(&routine.body)?;

        if ret.is_some() && !always_returns(&routine.body) {
            return Err(CompileError::missing_return(&name, routine.body.close));
        }

        let params: Vec<Type> = routine.signature.params.iter().map(|p| p.ty).collect();
        let locals = frame.slots[params.len()..].iter().map(|s| s.ty).collect();
        let slot_names = frame.slots.iter().map(|s| s.name.clone()).collect();

        self.routine = None;
        Ok(HirRoutine {
            name,
            params,
            ret,
            locals,
            slot_names,
            body,
        })
    }

    fn context(&self) -> (&str, Option<Type>) {
        match &self.routine {
            Some(ctx) => (ctx.name.as_str(), ctx.ret),
            None => ("", None),
        }
    }

    // ==================== STATEMENTS ====================

    fn check_block(&self, block: &Block) -> Result<HirBlock> {
        block.stmts.iter().map(|stmt| self.check_stmt(stmt)).collect()
    }

    fn check_stmt(&self, stmt: &Stmt) -> Result<HirStmt> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let place = self.check_place(target)?;
                let value = self.check_value(value)?;
                let target_ty = place.ty();
                if !value.ty.coerces_to(target_ty) {
                    return Err(CompileError::mismatch(
                        format!(
                            "cannot assign {} to {} `{}`",
                            value.ty,
                            target_ty,
                            target.name()
                        ),
                        stmt.span,
                    ));
                }
                Ok(HirStmt::Assign {
                    place,
                    value: value.coerce(target_ty),
                })
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.check_cond(cond)?;
                let then_block = self.check_block(then_block)?;
                let else_block = match else_block {
                    Some(block) => Some(self.check_block(block)?),
                    None => None,
                };
                Ok(HirStmt::If {
                    cond,
                    then_block,
                    else_block,
                })
            }
            StmtKind::For {
                id,
                var,
                var_span,
                start,
                end,
                direction,
                body,
            } => {
                let start = self.check_int(start, "loop start")?;
                let end = self.check_int(end, "loop end")?;
                let slot = match self.symbols.def_for_node(*id).and_then(|d| self.symbols.get(d)) {
                    Some(symbol) => match symbol.kind {
                        DefKind::LoopVar { slot } => Slot(slot),
                        _ => return Err(CompileError::undeclared(var, *var_span)),
                    },
                    None => return Err(CompileError::undeclared(var, *var_span)),
                };
                let body = self.check_block(body)?;
                Ok(HirStmt::For {
                    slot,
                    start,
                    end,
                    direction: *direction,
                    body,
                })
            }
            StmtKind::While { cond, body } => {
                let cond = self.check_cond(cond)?;
                let body = self.check_block(body)?;
                Ok(HirStmt::While { cond, body })
            }
            StmtKind::Write(expr) => {
                if let ExprKind::Str(_) = expr.kind {
                    return Err(CompileError::mismatch("cannot write a string", expr.span));
                }
                Ok(HirStmt::Write(self.check_value(expr)?))
            }
            StmtKind::Read(place) => Ok(HirStmt::Read(self.check_place(place)?)),
            StmtKind::Return(value) => self.check_return(value.as_ref(), stmt.span),
            StmtKind::Call(call) => {
                let (routine, signature, args) = self.check_call(call)?;
                if let Some(ret) = signature.ret {
                    return Err(CompileError::mismatch(
                        format!("result of `{}` ({}) is discarded", call.name, ret),
                        call.span,
                    ));
                }
                Ok(HirStmt::Call { routine, args })
            }
        }
    }

    fn check_return(&self, value: Option<&Expr>, span: Span) -> Result<HirStmt> {
        let (name, ret) = self.context();
        match (value, ret) {
            (Some(_), None) => Err(CompileError::unexpected_return_value(name, span)),
            (None, Some(_)) => Err(CompileError::missing_return(name, span)),
            (None, None) => Ok(HirStmt::Return(None)),
            (Some(expr), Some(ret)) => {
                let value = self.check_value(expr)?;
                if !value.ty.coerces_to(ret) {
                    return Err(CompileError::mismatch(
                        format!("`{}` returns {}, found {}", name, ret, value.ty),
                        expr.span,
                    ));
                }
                Ok(HirStmt::Return(Some(value.coerce(ret))))
            }
        }
    }

    fn check_place(&self, place: &Place) -> Result<HirPlace> {
        match place {
            Place::Variable { id, name, span } => {
                let symbol = self
                    .symbols
                    .resolved(*id)
                    .ok_or_else(|| CompileError::undeclared(name, *span))?;
                match symbol.kind.slot() {
                    Some((slot, ty)) => Ok(HirPlace::Local {
                        slot: Slot(slot),
                        ty,
                    }),
                    None => Err(CompileError::mismatch(
                        format!("cannot store into {} `{}`", symbol.kind.describe(), name),
                        *span,
                    )),
                }
            }
            Place::Element {
                id,
                array,
                index,
                span,
            } => {
                let (array, elem) = self.lookup_array(*id, array, *span)?;
                let index = self.check_int(index, "array index")?;
                Ok(HirPlace::Element {
                    array,
                    elem,
                    index: Box::new(index),
                })
            }
        }
    }

    // ==================== EXPRESSIONS ====================

    /// Check an `if` / `while` condition; only a comparison is accepted
    fn check_cond(&self, expr: &Expr) -> Result<HirCond> {
        let ExprKind::Binary { op, lhs, rhs } = &expr.kind else {
            return Err(CompileError::mismatch(
                "condition must be a comparison",
                expr.span,
            ));
        };
        let Some(op) = CmpOp::from_binary(*op) else {
            return Err(CompileError::mismatch(
                "condition must be a comparison",
                expr.span,
            ));
        };

        let lhs = self.check_value(lhs)?;
        let rhs = self.check_value(rhs)?;
        let operand_ty = lhs.ty.join(rhs.ty);
        Ok(HirCond {
            op,
            lhs: lhs.coerce(operand_ty),
            rhs: rhs.coerce(operand_ty),
            operand_ty,
        })
    }

    fn check_int(&self, expr: &Expr, what: &str) -> Result<HirExpr> {
        let value = self.check_value(expr)?;
        if value.ty != Type::Int {
            return Err(CompileError::mismatch(
                format!("{} must be int, found {}", what, value.ty),
                expr.span,
            ));
        }
        Ok(value)
    }

    /// Check an expression in value position
    fn check_value(&self, expr: &Expr) -> Result<HirExpr> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(HirExpr::new(HirExprKind::Int(*value), Type::Int)),
            ExprKind::Float(value) => Ok(HirExpr::new(HirExprKind::Float(*value), Type::Float)),
            ExprKind::Str(_) => Err(CompileError::mismatch(
                "strings are not values",
                expr.span,
            )),
            ExprKind::Variable(name) => {
                let symbol = self
                    .symbols
                    .resolved(expr.id)
                    .ok_or_else(|| CompileError::undeclared(name, expr.span))?;
                match symbol.kind {
                    DefKind::Array { .. } => Err(CompileError::mismatch(
                        format!("array `{}` used without an index", name),
                        expr.span,
                    )),
                    DefKind::Routine { .. } => Err(CompileError::mismatch(
                        format!("routine `{}` used as a variable", name),
                        expr.span,
                    )),
                    DefKind::Param { slot, ty } | DefKind::Local { slot, ty } => {
                        Ok(HirExpr::new(HirExprKind::Local(Slot(slot)), ty))
                    }
                    DefKind::LoopVar { slot } => {
                        Ok(HirExpr::new(HirExprKind::Local(Slot(slot)), Type::Int))
                    }
                }
            }
            ExprKind::Index { array, index } => {
                let (array, elem) = self.lookup_array(expr.id, array, expr.span)?;
                let index = self.check_int(index, "array index")?;
                Ok(HirExpr::new(
                    HirExprKind::Load {
                        array,
                        index: Box::new(index),
                    },
                    elem,
                ))
            }
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                let operand = self.check_value(operand)?;
                let ty = operand.ty;
                Ok(HirExpr::new(HirExprKind::Neg(Box::new(operand)), ty))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let Some(arith) = ArithOp::from_binary(*op) else {
                    return Err(CompileError::mismatch(
                        format!("comparison `{}` cannot be used as a value", op.as_str()),
                        expr.span,
                    ));
                };
                let lhs = self.check_value(lhs)?;
                let rhs = self.check_value(rhs)?;
                if arith == ArithOp::Rem && (lhs.ty != Type::Int || rhs.ty != Type::Int) {
                    return Err(CompileError::mismatch(
                        format!("`%` requires int operands, found {} and {}", lhs.ty, rhs.ty),
                        expr.span,
                    ));
                }
                let ty = lhs.ty.join(rhs.ty);
                Ok(HirExpr::new(
                    HirExprKind::Arith {
                        op: arith,
                        lhs: Box::new(lhs.coerce(ty)),
                        rhs: Box::new(rhs.coerce(ty)),
                    },
                    ty,
                ))
            }
            ExprKind::Call(call) => {
                let (routine, signature, args) = self.check_call(call)?;
                let Some(ret) = signature.ret else {
                    return Err(CompileError::mismatch(
                        format!("procedure `{}` does not produce a value", call.name),
                        call.span,
                    ));
                };
                Ok(HirExpr::new(HirExprKind::Call { routine, args }, ret))
            }
        }
    }

    fn check_call(&self, call: &Call) -> Result<(RoutineIndex, Signature, Vec<HirExpr>)> {
        let symbol = self
            .symbols
            .resolved(call.id)
            .ok_or_else(|| CompileError::undeclared(&call.name, call.span))?;
        let DefKind::Routine {
            index,
            ref signature,
        } = symbol.kind
        else {
            return Err(CompileError::mismatch(
                format!("{} `{}` is not a routine", symbol.kind.describe(), call.name),
                call.span,
            ));
        };

        if call.args.len() != signature.params.len() {
            return Err(CompileError::arity(
                &call.name,
                signature.params.len(),
                call.args.len(),
                call.span,
            ));
        }

        let signature = signature.clone();
        let mut args = Vec::with_capacity(call.args.len());
        for (i, (arg, &param)) in call.args.iter().zip(&signature.params).enumerate() {
            let value = self.check_value(arg)?;
            if !value.ty.coerces_to(param) {
                return Err(CompileError::mismatch(
                    format!(
                        "argument {} of `{}` expects {}, found {}",
                        i + 1,
                        call.name,
                        param,
                        value.ty
                    ),
                    arg.span,
                ));
            }
            args.push(value.coerce(param));
        }

        Ok((RoutineIndex(index), signature, args))
    }

    fn lookup_array(
        &self,
        id: NodeId,
        name: &str,
        span: Span,
    ) -> Result<(ArrayIndex, Type)> {
        let symbol = self
            .symbols
            .resolved(id)
            .ok_or_else(|| CompileError::undeclared(name, span))?;
        match symbol.kind {
            DefKind::Array { index, elem, .. } => Ok((ArrayIndex(index), elem)),
            ref kind => Err(CompileError::mismatch(
                format!("{} `{}` cannot be indexed", kind.describe(), name),
                span,
            )),
        }
    }
}

/// Whether a block syntactically ends in a return on every branch.
/// Only the last statement is inspected; loops never count.
pub fn always_returns(block: &Block) -> bool {
    match block.last().map(|stmt| &stmt.kind) {
        Some(StmtKind::Return(_)) => true,
        Some(StmtKind::If {
            then_block,
            else_block: Some(else_block),
            ..
        }) => always_returns(then_block) && always_returns(else_block),
        _ => false,
    }
}

/// Locate `main` and validate its shape
pub fn check_entry_point(ast: &Ast) -> Result<usize> {
    let Some(index) = ast
        .routines
        .iter()
        .position(|r| r.signature.name == ENTRY_POINT)
    else {
        return Err(CompileError::missing_entry_point(
            "no routine named `main`",
            Span::new(0, 0, 1),
        ));
    };

    let main = &ast.routines[index];
    if !main.signature.params.is_empty() || main.signature.return_type.is_some() {
        return Err(CompileError::missing_entry_point(
            "`main` must take no parameters and return nothing",
            main.span,
        ));
    }
    Ok(index)
}
