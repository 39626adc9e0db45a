//! Module IR to WebAssembly binary

use super::module::{self as ir, Instr, IMPORT_MODULE, FIRST_ROUTINE};
use wasm_encoder::{
    BlockType, CodeSection, EntityType, ExportKind, ExportSection, Function, FunctionSection,
    ImportSection, IndirectNameMap, Instruction, MemArg, MemorySection, MemoryType, Module,
    NameMap, NameSection, TypeSection, ValType,
};

/// Encode `module` to the binary format.
/// With `debug_names` a `name` custom section records routine and local names.
pub fn encode(module: &ir::Module, debug_names: bool) -> Vec<u8> {
    let mut types = TypeSection::new();
    for ty in &module.types {
        types.ty().function(
            ty.params.iter().map(|&t| val_type(t)),
            ty.results.iter().map(|&t| val_type(t)),
        );
    }

    let mut imports = ImportSection::new();
    for import in &module.imports {
        imports.import(
            IMPORT_MODULE,
            import.host.field(),
            EntityType::Function(import.type_index),
        );
    }

    let mut functions = FunctionSection::new();
    for func in &module.functions {
        functions.function(func.type_index);
    }

    let mut memories = MemorySection::new();
    memories.memory(MemoryType {
        minimum: module.memory_pages,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });

    let mut exports = ExportSection::new();
    for export in &module.exports {
        exports.export(&export.name, ExportKind::Func, export.func_index);
    }

    let mut code = CodeSection::new();
    for func in &module.functions {
        code.function(&encode_function(func));
    }

    let mut wasm = Module::new();
    wasm.section(&types)
        .section(&imports)
        .section(&functions)
        .section(&memories)
        .section(&exports)
        .section(&code);

    if debug_names {
        wasm.section(&name_section(module));
    }

    let bytes = wasm.finish();
    tracing::debug!(bytes = bytes.len(), debug_names, "encoded module");
    bytes
}

fn encode_function(func: &ir::Function) -> Function {
    let locals: Vec<(u32, ValType)> = func
        .local_groups()
        .into_iter()
        .map(|(count, ty)| (count, val_type(ty)))
        .collect();
    let mut out = Function::new(locals);
    for instr in &func.body {
        out.instruction(&instruction(*instr));
    }
    out.instruction(&Instruction::End);
    out
}

fn name_section(module: &ir::Module) -> NameSection {
    let mut func_names = NameMap::new();
    for import in &module.imports {
        let name = format!("{}.{}", IMPORT_MODULE, import.host.field());
        func_names.append(import.host.func_index(), &name);
    }

    let mut local_names = IndirectNameMap::new();
    for (i, func) in module.functions.iter().enumerate() {
        let index = FIRST_ROUTINE + i as u32;
        func_names.append(index, &func.name);

        let mut names = NameMap::new();
        for (slot, name) in func.local_names.iter().enumerate() {
            names.append(slot as u32, name);
        }
        local_names.append(index, &names);
    }

    let mut section = NameSection::new();
    section.functions(&func_names);
    section.locals(&local_names);
    section
}

fn val_type(ty: ir::ValType) -> ValType {
    match ty {
        ir::ValType::I32 => ValType::I32,
        ir::ValType::F64 => ValType::F64,
    }
}

fn mem_arg(arg: ir::MemArg) -> MemArg {
    MemArg {
        offset: u64::from(arg.offset),
        align: arg.align,
        memory_index: 0,
    }
}

fn instruction(instr: Instr) -> Instruction<'static> {
    match instr {
        Instr::Block => Instruction::Block(BlockType::Empty),
        Instr::Loop => Instruction::Loop(BlockType::Empty),
        Instr::If => Instruction::If(BlockType::Empty),
        Instr::Else => Instruction::Else,
        Instr::End => Instruction::End,
        Instr::Br(depth) => Instruction::Br(depth),
        Instr::BrIf(depth) => Instruction::BrIf(depth),
        Instr::Return => Instruction::Return,
        Instr::Unreachable => Instruction::Unreachable,
        Instr::Call(index) => Instruction::Call(index),
        Instr::LocalGet(index) => Instruction::LocalGet(index),
        Instr::LocalSet(index) => Instruction::LocalSet(index),
        Instr::I32Load(arg) => Instruction::I32Load(mem_arg(arg)),
        Instr::F64Load(arg) => Instruction::F64Load(mem_arg(arg)),
        Instr::I32Store(arg) => Instruction::I32Store(mem_arg(arg)),
        Instr::F64Store(arg) => Instruction::F64Store(mem_arg(arg)),
        Instr::I32Const(value) => Instruction::I32Const(value),
        Instr::F64Const(value) => Instruction::F64Const(value.into()),
        Instr::I32Eqz => Instruction::I32Eqz,
        Instr::I32Eq => Instruction::I32Eq,
        Instr::I32Ne => Instruction::I32Ne,
        Instr::I32LtS => Instruction::I32LtS,
        Instr::I32GtS => Instruction::I32GtS,
        Instr::I32LeS => Instruction::I32LeS,
        Instr::I32GeS => Instruction::I32GeS,
        Instr::I32Add => Instruction::I32Add,
        Instr::I32Sub => Instruction::I32Sub,
        Instr::I32Mul => Instruction::I32Mul,
        Instr::I32DivS => Instruction::I32DivS,
        Instr::I32RemS => Instruction::I32RemS,
        Instr::F64Eq => Instruction::F64Eq,
        Instr::F64Ne => Instruction::F64Ne,
        Instr::F64Lt => Instruction::F64Lt,
        Instr::F64Gt => Instruction::F64Gt,
        Instr::F64Le => Instruction::F64Le,
        Instr::F64Ge => Instruction::F64Ge,
        Instr::F64Neg => Instruction::F64Neg,
        Instr::F64Add => Instruction::F64Add,
        Instr::F64Sub => Instruction::F64Sub,
        Instr::F64Mul => Instruction::F64Mul,
        Instr::F64Div => Instruction::F64Div,
        Instr::F64ConvertI32S => Instruction::F64ConvertI32S,
    }
}
