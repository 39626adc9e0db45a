//! Name resolution pass

use super::symbols::*;
use crate::ast::*;
use crate::common::{NodeId, Span};
use crate::diagnostics::CompileError;
use crate::types::Type;

/// Upper bound on the byte size of all arrays together
const ADDRESS_SPACE: u64 = u32::MAX as u64 + 1;

/// Resolved AST (AST + symbol table + per-routine slot frames)
#[derive(Debug)]
pub struct ResolvedAst {
    pub ast: Ast,
    pub symbols: SymbolTable,
    /// One frame per routine, in declaration order
    pub frames: Vec<RoutineFrame>,
}

impl ResolvedAst {
    /// Frame of the routine at `index` in declaration order
    pub fn frame(&self, index: usize) -> Option<&RoutineFrame> {
        self.frames.get(index)
    }
}

/// Every local slot a routine uses
#[derive(Debug, Clone, Default)]
pub struct RoutineFrame {
    pub name: String,
    pub slots: Vec<SlotInfo>,
}

impl RoutineFrame {
    pub fn param_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.kind == SlotKind::Param)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotInfo {
    pub name: String,
    pub ty: Type,
    pub kind: SlotKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Param,
    Local,
    LoopVar,
}

/// Resolve names in an AST
pub fn resolve(ast: Ast) -> Result<ResolvedAst, CompileError> {
    let resolver = Resolver::new();
    resolver.resolve(ast)
}

/// Name resolver
pub struct Resolver {
    symbols: SymbolTable,
    frames: Vec<RoutineFrame>,
    /// Bytes claimed by the arrays registered so far
    layout_bytes: u64,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            frames: Vec::new(),
            layout_bytes: 0,
        }
    }

    /// Resolve all names in the AST
    pub fn resolve(mut self, ast: Ast) -> Result<ResolvedAst, CompileError> {
        // First pass: collect all top-level definitions
        for (index, array) in ast.arrays.iter().enumerate() {
            self.define_array(index as u32, array)?;
        }
        for (index, routine) in ast.routines.iter().enumerate() {
            self.define_routine(index as u32, routine)?;
        }

        // Second pass: resolve bodies
        for routine in &ast.routines {
            let frame = self.resolve_routine(routine)?;
            self.frames.push(frame);
        }

        tracing::debug!(
            arrays = ast.arrays.len(),
            routines = ast.routines.len(),
            layout_bytes = self.layout_bytes,
            "resolved program"
        );

        Ok(ResolvedAst {
            ast,
            symbols: self.symbols,
            frames: self.frames,
        })
    }

    // ==================== DEFINITIONS ====================

    fn define_array(&mut self, index: u32, array: &ArrayDecl) -> Result<(), CompileError> {
        let len = eval_size(&array.size)
            .map_err(|reason| CompileError::array_size(&array.name, reason, array.span))?;
        if len <= 0 {
            return Err(CompileError::array_size(
                &array.name,
                format!("size must be positive, got {}", len),
                array.span,
            ));
        }

        let bytes = (len as u64).saturating_mul(u64::from(array.elem.byte_width()));
        self.layout_bytes = self.layout_bytes.saturating_add(bytes);
        if self.layout_bytes > ADDRESS_SPACE || len > i64::from(u32::MAX) {
            return Err(CompileError::array_size(
                &array.name,
                "arrays exceed the 32-bit address space",
                array.span,
            ));
        }

        let kind = DefKind::Array {
            index,
            elem: array.elem,
            len: len as u32,
        };
        self.symbols
            .define(&array.name, kind, array.id, array.span)
            .map_err(|_| CompileError::duplicate(&array.name, array.span))?;
        Ok(())
    }

    fn define_routine(&mut self, index: u32, routine: &Routine) -> Result<(), CompileError> {
        let name = &routine.signature.name;
        let kind = DefKind::Routine {
            index,
            signature: routine.signature.to_signature(),
        };
        self.symbols
            .define(name, kind, routine.id, routine.span)
            .map_err(|_| CompileError::duplicate(name, routine.span))?;
        Ok(())
    }

    // ==================== ROUTINES ====================

    fn resolve_routine(&mut self, routine: &Routine) -> Result<RoutineFrame, CompileError> {
        let mut frame = RoutineFrame {
            name: routine.signature.name.clone(),
            slots: Vec::new(),
        };

        self.symbols.push_scope(ScopeKind::Routine);
        let result = self.resolve_routine_body(routine, &mut frame);
        self.symbols.pop_scope();
        result?;

        tracing::trace!(
            routine = %frame.name,
            slots = frame.slots.len(),
            "resolved routine"
        );
        Ok(frame)
    }

    fn resolve_routine_body(
        &mut self,
        routine: &Routine,
        frame: &mut RoutineFrame,
    ) -> Result<(), CompileError> {
        for param in &routine.signature.params {
            let slot = frame.slots.len() as u32;
            self.define_var(param, DefKind::Param { slot, ty: param.ty })?;
            frame.slots.push(SlotInfo {
                name: param.name.clone(),
                ty: param.ty,
                kind: SlotKind::Param,
            });
        }

        for local in &routine.locals {
            let slot = frame.slots.len() as u32;
            self.define_var(local, DefKind::Local { slot, ty: local.ty })?;
            frame.slots.push(SlotInfo {
                name: local.name.clone(),
                ty: local.ty,
                kind: SlotKind::Local,
            });
        }

        self.resolve_block(&routine.body, frame)
    }

    fn define_var(&mut self, var: &VarDecl, kind: DefKind) -> Result<(), CompileError> {
        self.symbols
            .define(&var.name, kind, var.id, var.span)
            .map(|_| ())
            .map_err(|_| CompileError::duplicate(&var.name, var.span))
    }

    // ==================== STATEMENTS ====================

    fn resolve_block(&mut self, block: &Block, frame: &mut RoutineFrame) -> Result<(), CompileError> {
        for stmt in &block.stmts {
            self.resolve_stmt(stmt, frame)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt, frame: &mut RoutineFrame) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                self.resolve_place(target)?;
                self.resolve_expr(value)
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.resolve_expr(cond)?;
                self.resolve_block(then_block, frame)?;
                if let Some(else_block) = else_block {
                    self.resolve_block(else_block, frame)?;
                }
                Ok(())
            }
            StmtKind::For {
                id,
                var,
                var_span,
                start,
                end,
                body,
                ..
            } => {
                // Bounds see the enclosing scope only
                self.resolve_expr(start)?;
                self.resolve_expr(end)?;

                if self.symbols.lookup_local(var).is_some() {
                    return Err(CompileError::duplicate(var, *var_span));
                }

                let slot = frame.slots.len() as u32;
                frame.slots.push(SlotInfo {
                    name: var.clone(),
                    ty: Type::Int,
                    kind: SlotKind::LoopVar,
                });

                self.symbols.push_scope(ScopeKind::Loop);
                let result = self
                    .symbols
                    .define(var, DefKind::LoopVar { slot }, *id, *var_span)
                    .map_err(|_| CompileError::duplicate(var, *var_span))
                    .and_then(|_| self.resolve_block(body, frame));
                self.symbols.pop_scope();
                result
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond)?;
                self.resolve_block(body, frame)
            }
            StmtKind::Write(expr) => self.resolve_expr(expr),
            StmtKind::Read(place) => self.resolve_place(place),
            StmtKind::Return(value) => match value {
                Some(expr) => self.resolve_expr(expr),
                None => Ok(()),
            },
            StmtKind::Call(call) => self.resolve_call(call),
        }
    }

    fn resolve_place(&mut self, place: &Place) -> Result<(), CompileError> {
        match place {
            Place::Variable { id, name, span } => self.resolve_name(*id, name, *span),
            Place::Element {
                id,
                array,
                index,
                span,
            } => {
                self.resolve_name(*id, array, *span)?;
                self.resolve_expr(index)
            }
        }
    }

    // ==================== EXPRESSIONS ====================

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Str(_) => Ok(()),
            ExprKind::Variable(name) => self.resolve_name(expr.id, name, expr.span),
            ExprKind::Index { array, index } => {
                self.resolve_name(expr.id, array, expr.span)?;
                self.resolve_expr(index)
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)
            }
            ExprKind::Call(call) => self.resolve_call(call),
        }
    }

    fn resolve_call(&mut self, call: &Call) -> Result<(), CompileError> {
        self.resolve_name(call.id, &call.name, call.span)?;
        for arg in &call.args {
            self.resolve_expr(arg)?;
        }
        Ok(())
    }

    fn resolve_name(&mut self, id: NodeId, name: &str, span: Span) -> Result<(), CompileError> {
        match self.symbols.lookup(name) {
            Some(def_id) => {
                self.symbols.record_ref(id, def_id);
                Ok(())
            }
            None => Err(CompileError::undeclared(name, span)),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold an array size to an integer constant
fn eval_size(expr: &Expr) -> Result<i64, String> {
    match &expr.kind {
        ExprKind::Int(value) => Ok(i64::from(*value)),
        ExprKind::Float(value) => Err(format!("size must be an integer, got {}", value)),
        ExprKind::Str(_) => Err("size must be an integer, got a string".to_string()),
        ExprKind::Variable(name) | ExprKind::Index { array: name, .. } => {
            Err(format!("size must be a constant, but refers to `{}`", name))
        }
        ExprKind::Call(call) => Err(format!("size must be a constant, but calls `{}`", call.name)),
        ExprKind::Unary { operand, .. } => eval_size(operand)?
            .checked_neg()
            .ok_or_else(|| "size overflows".to_string()),
        ExprKind::Binary { op, lhs, rhs } => {
            if op.is_comparison() {
                return Err("size must be an integer, got a comparison".to_string());
            }
            let lhs = eval_size(lhs)?;
            let rhs = eval_size(rhs)?;
            let value = match op {
                BinaryOp::Add => lhs.checked_add(rhs),
                BinaryOp::Sub => lhs.checked_sub(rhs),
                BinaryOp::Mul => lhs.checked_mul(rhs),
                BinaryOp::Div | BinaryOp::Rem if rhs == 0 => {
                    return Err("division by zero in size".to_string());
                }
                BinaryOp::Div => lhs.checked_div(rhs),
                BinaryOp::Rem => lhs.checked_rem(rhs),
                _ => None,
            };
            value.ok_or_else(|| "size overflows".to_string())
        }
    }
}
