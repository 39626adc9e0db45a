//! HIR to module IR lowering
//!
//! Expressions become postfix instruction sequences; statements become
//! structured `block` / `loop` / `if` nests. All types, slots and indices
//! were settled by the checker so nothing here can fail.

use super::layout::MemoryLayout;
use super::module::*;
use crate::ast::Direction;
use crate::hir::*;
use crate::types::Type;
use indexmap::IndexSet;

/// Lower a checked program to a module
pub fn lower(program: &Program) -> Module {
    let mut lowering = ModuleLowering::new(program);
    lowering.lower_program()
}

/// Module-wide lowering state
pub struct ModuleLowering<'a> {
    program: &'a Program,
    layout: MemoryLayout,
    /// Distinct function types in first-use order
    types: IndexSet<FuncType>,
}

impl<'a> ModuleLowering<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            layout: MemoryLayout::new(&program.arrays),
            types: IndexSet::new(),
        }
    }

    fn intern_type(&mut self, ty: FuncType) -> u32 {
        let (index, _) = self.types.insert_full(ty);
        index as u32
    }

    pub fn lower_program(&mut self) -> Module {
        let imports = HostImport::ALL
            .iter()
            .map(|&host| Import {
                host,
                type_index: self.intern_type(host.func_type()),
            })
            .collect();

        let program = self.program;
        let functions: Vec<Function> = program
            .routines
            .iter()
            .map(|routine| self.lower_routine(routine))
            .collect();

        let exports = vec![Export {
            name: "main".to_string(),
            func_index: FIRST_ROUTINE + self.program.entry as u32,
        }];

        tracing::debug!(
            types = self.types.len(),
            functions = functions.len(),
            memory_bytes = self.layout.total_bytes,
            "lowered module"
        );

        Module {
            types: self.types.iter().cloned().collect(),
            imports,
            functions,
            memory_pages: self.layout.pages(),
            exports,
            layout: self.layout.clone(),
        }
    }

    fn lower_routine(&mut self, routine: &HirRoutine) -> Function {
        let params: Vec<ValType> = routine.params.iter().map(|&t| t.into()).collect();
        let results: Vec<ValType> = routine.ret.iter().map(|&t| t.into()).collect();
        let type_index = self.intern_type(FuncType {
            params: params.clone(),
            results: results.clone(),
        });

        let mut body = FunctionLowering {
            layout: &self.layout,
            program: self.program,
            code: Vec::new(),
        };
        body.lower_block(&routine.body);
        if routine.ret.is_some() {
            // Every path has returned; keeps the implicit fallthrough well typed
            body.emit(Instr::Unreachable);
        }

        tracing::trace!(
            routine = %routine.name,
            instructions = body.code.len(),
            "lowered routine"
        );

        Function {
            name: routine.name.clone(),
            type_index,
            params,
            results,
            locals: routine.locals.iter().map(|&t| t.into()).collect(),
            local_names: routine.slot_names.clone(),
            body: body.code,
        }
    }
}

/// Per-function instruction emitter
struct FunctionLowering<'a> {
    layout: &'a MemoryLayout,
    program: &'a Program,
    code: Vec<Instr>,
}

impl<'a> FunctionLowering<'a> {
    fn emit(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    // ==================== STATEMENTS ====================

    fn lower_block(&mut self, block: &HirBlock) {
        for stmt in block {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &HirStmt) {
        match stmt {
            HirStmt::Assign { place, value } => match place {
                HirPlace::Local { slot, .. } => {
                    self.lower_expr(value);
                    self.emit(Instr::LocalSet(slot.0));
                }
                HirPlace::Element { array, elem, index } => {
                    self.lower_address(*array, index);
                    self.lower_expr(value);
                    self.emit(store(*elem));
                }
            },
            HirStmt::If {
                cond,
                then_block,
                else_block,
            } => {
                self.lower_cond(cond);
                self.emit(Instr::If);
                self.lower_block(then_block);
                if let Some(else_block) = else_block {
                    self.emit(Instr::Else);
                    self.lower_block(else_block);
                }
                self.emit(Instr::End);
            }
            HirStmt::While { cond, body } => {
                self.emit(Instr::Block);
                self.emit(Instr::Loop);
                self.lower_cond(cond);
                self.emit(Instr::I32Eqz);
                self.emit(Instr::BrIf(1));
                self.lower_block(body);
                self.emit(Instr::Br(0));
                self.emit(Instr::End);
                self.emit(Instr::End);
            }
            HirStmt::For {
                slot,
                start,
                end,
                direction,
                body,
            } => {
                let (test, step) = match direction {
                    Direction::Ascending => (Instr::I32LeS, Instr::I32Add),
                    Direction::Descending => (Instr::I32GeS, Instr::I32Sub),
                };
                self.lower_expr(start);
                self.emit(Instr::LocalSet(slot.0));
                self.emit(Instr::Block);
                self.emit(Instr::Loop);
                self.emit(Instr::LocalGet(slot.0));
                self.lower_expr(end);
                self.emit(test);
                self.emit(Instr::I32Eqz);
                self.emit(Instr::BrIf(1));
                self.lower_block(body);
                self.emit(Instr::LocalGet(slot.0));
                self.emit(Instr::I32Const(1));
                self.emit(step);
                self.emit(Instr::LocalSet(slot.0));
                self.emit(Instr::Br(0));
                self.emit(Instr::End);
                self.emit(Instr::End);
            }
            HirStmt::Write(value) => {
                self.lower_expr(value);
                self.emit(Instr::Call(HostImport::write(value.ty).func_index()));
            }
            HirStmt::Read(place) => {
                let read = Instr::Call(HostImport::read(place.ty()).func_index());
                match place {
                    HirPlace::Local { slot, .. } => {
                        self.emit(read);
                        self.emit(Instr::LocalSet(slot.0));
                    }
                    HirPlace::Element { array, elem, index } => {
                        self.lower_address(*array, index);
                        self.emit(read);
                        self.emit(store(*elem));
                    }
                }
            }
            HirStmt::Return(value) => {
                if let Some(value) = value {
                    self.lower_expr(value);
                }
                self.emit(Instr::Return);
            }
            HirStmt::Call { routine, args } => self.lower_call(*routine, args),
        }
    }

    fn lower_cond(&mut self, cond: &HirCond) {
        self.lower_expr(&cond.lhs);
        self.lower_expr(&cond.rhs);
        let instr = match (cond.operand_ty, cond.op) {
            (Type::Int, CmpOp::Eq) => Instr::I32Eq,
            (Type::Int, CmpOp::Ne) => Instr::I32Ne,
            (Type::Int, CmpOp::Lt) => Instr::I32LtS,
            (Type::Int, CmpOp::Le) => Instr::I32LeS,
            (Type::Int, CmpOp::Gt) => Instr::I32GtS,
            (Type::Int, CmpOp::Ge) => Instr::I32GeS,
            (Type::Float, CmpOp::Eq) => Instr::F64Eq,
            (Type::Float, CmpOp::Ne) => Instr::F64Ne,
            (Type::Float, CmpOp::Lt) => Instr::F64Lt,
            (Type::Float, CmpOp::Le) => Instr::F64Le,
            (Type::Float, CmpOp::Gt) => Instr::F64Gt,
            (Type::Float, CmpOp::Ge) => Instr::F64Ge,
        };
        self.emit(instr);
    }

    // ==================== EXPRESSIONS ====================

    fn lower_expr(&mut self, expr: &HirExpr) {
        match &expr.kind {
            HirExprKind::Int(value) => self.emit(Instr::I32Const(*value)),
            HirExprKind::Float(value) => self.emit(Instr::F64Const(*value)),
            HirExprKind::Local(slot) => self.emit(Instr::LocalGet(slot.0)),
            HirExprKind::Load { array, index } => {
                self.lower_address(*array, index);
                self.emit(load(expr.ty));
            }
            HirExprKind::Neg(operand) => match expr.ty {
                Type::Int => {
                    self.emit(Instr::I32Const(0));
                    self.lower_expr(operand);
                    self.emit(Instr::I32Sub);
                }
                Type::Float => {
                    self.lower_expr(operand);
                    self.emit(Instr::F64Neg);
                }
            },
            HirExprKind::Arith { op, lhs, rhs } => {
                self.lower_expr(lhs);
                self.lower_expr(rhs);
                let instr = match (expr.ty, op) {
                    (Type::Int, ArithOp::Add) => Instr::I32Add,
                    (Type::Int, ArithOp::Sub) => Instr::I32Sub,
                    (Type::Int, ArithOp::Mul) => Instr::I32Mul,
                    (Type::Int, ArithOp::Div) => Instr::I32DivS,
                    (Type::Int, ArithOp::Rem) => Instr::I32RemS,
                    (Type::Float, ArithOp::Add) => Instr::F64Add,
                    (Type::Float, ArithOp::Sub) => Instr::F64Sub,
                    (Type::Float, ArithOp::Mul) => Instr::F64Mul,
                    (Type::Float, ArithOp::Div) => Instr::F64Div,
                    (Type::Float, ArithOp::Rem) => {
                        unreachable!("`%` on floats passed the type checker")
                    }
                };
                self.emit(instr);
            }
            HirExprKind::Call { routine, args } => self.lower_call(*routine, args),
            HirExprKind::Promote(operand) => {
                self.lower_expr(operand);
                self.emit(Instr::F64ConvertI32S);
            }
        }
    }

    fn lower_call(&mut self, routine: RoutineIndex, args: &[HirExpr]) {
        for arg in args {
            self.lower_expr(arg);
        }
        debug_assert!((routine.0 as usize) < self.program.routines.len());
        self.emit(Instr::Call(FIRST_ROUTINE + routine.0));
    }

    /// Byte address of `array[index]`: `index * width + base`
    fn lower_address(&mut self, array: ArrayIndex, index: &HirExpr) {
        let slot = self.layout.slot(array);
        let (width, base) = (slot.elem.byte_width(), slot.offset);
        self.lower_expr(index);
        self.emit(Instr::I32Const(width as i32));
        self.emit(Instr::I32Mul);
        if base != 0 {
            self.emit(Instr::I32Const(base as i32));
            self.emit(Instr::I32Add);
        }
    }
}

fn mem_arg(ty: Type) -> MemArg {
    MemArg {
        offset: 0,
        align: ty.align_log2(),
    }
}

fn load(ty: Type) -> Instr {
    match ty {
        Type::Int => Instr::I32Load(mem_arg(ty)),
        Type::Float => Instr::F64Load(mem_arg(ty)),
    }
}

fn store(ty: Type) -> Instr {
    match ty {
        Type::Int => Instr::I32Store(mem_arg(ty)),
        Type::Float => Instr::F64Store(mem_arg(ty)),
    }
}
