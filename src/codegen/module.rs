//! Instruction-level module IR
//!
//! A [`Module`] mirrors the sections of the binary it encodes to: a type
//! table, four host imports, one function per routine, a memory and the
//! `main` export. Instructions map one to one onto WebAssembly opcodes so
//! encoding is a straight walk. The [`fmt::Display`] impl prints the module
//! in WebAssembly text format.

use super::layout::MemoryLayout;
use crate::types::Type;
use serde::Serialize;
use std::fmt;

/// Module name every host import lives under
pub const IMPORT_MODULE: &str = "imports";

/// Function index of the first routine; imports take 0..4
pub const FIRST_ROUTINE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValType {
    I32,
    F64,
}

impl From<Type> for ValType {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Int => ValType::I32,
            Type::Float => ValType::F64,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => f.write_str("i32"),
            ValType::F64 => f.write_str("f64"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

/// Host functions the module imports, in function index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HostImport {
    WriteInt,
    WriteFloat,
    ReadInt,
    ReadFloat,
}

impl HostImport {
    pub const ALL: [HostImport; 4] = [
        HostImport::WriteInt,
        HostImport::WriteFloat,
        HostImport::ReadInt,
        HostImport::ReadFloat,
    ];

    pub fn func_index(self) -> u32 {
        match self {
            HostImport::WriteInt => 0,
            HostImport::WriteFloat => 1,
            HostImport::ReadInt => 2,
            HostImport::ReadFloat => 3,
        }
    }

    pub fn from_index(index: u32) -> Option<HostImport> {
        Self::ALL.get(index as usize).copied()
    }

    /// Field name under [`IMPORT_MODULE`]. Both writers share `write`.
    pub fn field(self) -> &'static str {
        match self {
            HostImport::WriteInt | HostImport::WriteFloat => "write",
            HostImport::ReadInt => "readInt",
            HostImport::ReadFloat => "readFloat",
        }
    }

    pub fn func_type(self) -> FuncType {
        match self {
            HostImport::WriteInt => FuncType {
                params: vec![ValType::I32],
                results: vec![],
            },
            HostImport::WriteFloat => FuncType {
                params: vec![ValType::F64],
                results: vec![],
            },
            HostImport::ReadInt => FuncType {
                params: vec![],
                results: vec![ValType::I32],
            },
            HostImport::ReadFloat => FuncType {
                params: vec![],
                results: vec![ValType::F64],
            },
        }
    }

    pub fn write(ty: Type) -> HostImport {
        match ty {
            Type::Int => HostImport::WriteInt,
            Type::Float => HostImport::WriteFloat,
        }
    }

    pub fn read(ty: Type) -> HostImport {
        match ty {
            Type::Int => HostImport::ReadInt,
            Type::Float => HostImport::ReadFloat,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Import {
    pub host: HostImport,
    pub type_index: u32,
}

/// Memory immediate: static offset and alignment as a power of two
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemArg {
    pub offset: u32,
    pub align: u32,
}

/// One WebAssembly instruction. Blocks are always empty-typed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Instr {
    // Control
    Block,
    Loop,
    If,
    Else,
    End,
    Br(u32),
    BrIf(u32),
    Return,
    Unreachable,
    Call(u32),

    // Locals
    LocalGet(u32),
    LocalSet(u32),

    // Memory
    I32Load(MemArg),
    F64Load(MemArg),
    I32Store(MemArg),
    F64Store(MemArg),

    // Constants
    I32Const(i32),
    F64Const(f64),

    // i32
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32GtS,
    I32LeS,
    I32GeS,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32RemS,

    // f64
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
    F64Neg,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,

    // Conversions
    F64ConvertI32S,
}

impl Instr {
    /// Mnemonic in WebAssembly text format
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::Block => "block",
            Instr::Loop => "loop",
            Instr::If => "if",
            Instr::Else => "else",
            Instr::End => "end",
            Instr::Br(_) => "br",
            Instr::BrIf(_) => "br_if",
            Instr::Return => "return",
            Instr::Unreachable => "unreachable",
            Instr::Call(_) => "call",
            Instr::LocalGet(_) => "local.get",
            Instr::LocalSet(_) => "local.set",
            Instr::I32Load(_) => "i32.load",
            Instr::F64Load(_) => "f64.load",
            Instr::I32Store(_) => "i32.store",
            Instr::F64Store(_) => "f64.store",
            Instr::I32Const(_) => "i32.const",
            Instr::F64Const(_) => "f64.const",
            Instr::I32Eqz => "i32.eqz",
            Instr::I32Eq => "i32.eq",
            Instr::I32Ne => "i32.ne",
            Instr::I32LtS => "i32.lt_s",
            Instr::I32GtS => "i32.gt_s",
            Instr::I32LeS => "i32.le_s",
            Instr::I32GeS => "i32.ge_s",
            Instr::I32Add => "i32.add",
            Instr::I32Sub => "i32.sub",
            Instr::I32Mul => "i32.mul",
            Instr::I32DivS => "i32.div_s",
            Instr::I32RemS => "i32.rem_s",
            Instr::F64Eq => "f64.eq",
            Instr::F64Ne => "f64.ne",
            Instr::F64Lt => "f64.lt",
            Instr::F64Gt => "f64.gt",
            Instr::F64Le => "f64.le",
            Instr::F64Ge => "f64.ge",
            Instr::F64Neg => "f64.neg",
            Instr::F64Add => "f64.add",
            Instr::F64Sub => "f64.sub",
            Instr::F64Mul => "f64.mul",
            Instr::F64Div => "f64.div",
            Instr::F64ConvertI32S => "f64.convert_i32_s",
        }
    }

    /// Whether this instruction opens a nesting level
    pub fn opens_block(&self) -> bool {
        matches!(self, Instr::Block | Instr::Loop | Instr::If)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match self {
            Instr::Br(n) | Instr::BrIf(n) | Instr::Call(n) => write!(f, " {}", n),
            Instr::LocalGet(n) | Instr::LocalSet(n) => write!(f, " {}", n),
            Instr::I32Const(v) => write!(f, " {}", v),
            Instr::F64Const(v) => write!(f, " {:?}", v),
            Instr::I32Load(arg) | Instr::F64Load(arg) | Instr::I32Store(arg) | Instr::F64Store(arg) => {
                if arg.offset != 0 {
                    write!(f, " offset={}", arg.offset)?;
                }
                write!(f, " align={}", 1u32 << arg.align)
            }
            _ => Ok(()),
        }
    }
}

/// Compiled routine
#[derive(Debug, Clone, Serialize)]
pub struct Function {
    pub name: String,
    pub type_index: u32,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    /// Declared locals after the parameters
    pub locals: Vec<ValType>,
    /// Name of every local index, parameters included
    pub local_names: Vec<String>,
    /// Body without the final `end`
    pub body: Vec<Instr>,
}

impl Function {
    /// Locals grouped into runs of equal type, as the code section stores them
    pub fn local_groups(&self) -> Vec<(u32, ValType)> {
        let mut groups: Vec<(u32, ValType)> = Vec::new();
        for &ty in &self.locals {
            match groups.last_mut() {
                Some((count, last)) if *last == ty => *count += 1,
                _ => groups.push((1, ty)),
            }
        }
        groups
    }

    /// Type of the local at `index`, parameters included
    pub fn local_type(&self, index: u32) -> Option<ValType> {
        let index = index as usize;
        if index < self.params.len() {
            self.params.get(index).copied()
        } else {
            self.locals.get(index - self.params.len()).copied()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Export {
    pub name: String,
    pub func_index: u32,
}

/// Whole module, ready for encoding
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    /// Minimum size of the single linear memory, in pages
    pub memory_pages: u64,
    pub exports: Vec<Export>,
    pub layout: MemoryLayout,
}

impl Module {
    /// Function by absolute index; imports have no body
    pub fn function(&self, func_index: u32) -> Option<&Function> {
        func_index
            .checked_sub(FIRST_ROUTINE)
            .and_then(|i| self.functions.get(i as usize))
    }

    pub fn export(&self, name: &str) -> Option<u32> {
        self.exports
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.func_index)
    }

    /// Type of any function index, imports included
    pub fn func_type(&self, func_index: u32) -> Option<&FuncType> {
        let type_index = match HostImport::from_index(func_index) {
            Some(host) => self.imports.get(host.func_index() as usize)?.type_index,
            None => self.function(func_index)?.type_index,
        };
        self.types.get(type_index as usize)
    }
}

// ==================== TEXT FORMAT ====================

fn write_val_types(f: &mut fmt::Formatter<'_>, keyword: &str, types: &[ValType]) -> fmt::Result {
    if types.is_empty() {
        return Ok(());
    }
    write!(f, " ({}", keyword)?;
    for ty in types {
        write!(f, " {}", ty)?;
    }
    write!(f, ")")
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(func")?;
        write_val_types(f, "param", &self.params)?;
        write_val_types(f, "result", &self.results)?;
        write!(f, ")")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(module")?;
        for (i, ty) in self.types.iter().enumerate() {
            writeln!(f, "  (type (;{};) {})", i, ty)?;
        }
        for import in &self.imports {
            writeln!(
                f,
                "  (import \"{}\" \"{}\" (func (;{};) (type {})))",
                IMPORT_MODULE,
                import.host.field(),
                import.host.func_index(),
                import.type_index
            )?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            write!(
                f,
                "  (func ${} (;{};) (type {})",
                func.name,
                FIRST_ROUTINE + i as u32,
                func.type_index
            )?;
            write_val_types(f, "param", &func.params)?;
            write_val_types(f, "result", &func.results)?;
            writeln!(f)?;
            if !func.locals.is_empty() {
                write!(f, "    (local")?;
                for ty in &func.locals {
                    write!(f, " {}", ty)?;
                }
                writeln!(f, ")")?;
            }

            let mut depth = 2usize;
            for instr in &func.body {
                if matches!(instr, Instr::End | Instr::Else) {
                    depth = depth.saturating_sub(1);
                }
                writeln!(f, "{:width$}{}", "", instr, width = depth * 2)?;
                if instr.opens_block() || matches!(instr, Instr::Else) {
                    depth += 1;
                }
            }
            writeln!(f, "  )")?;
        }
        writeln!(f, "  (memory (;0;) {})", self.memory_pages)?;
        for export in &self.exports {
            writeln!(f, "  (export \"{}\" (func {}))", export.name, export.func_index)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_groups_are_run_length() {
        let func = Function {
            name: "f".into(),
            type_index: 0,
            params: vec![ValType::I32],
            results: vec![],
            locals: vec![ValType::I32, ValType::I32, ValType::F64, ValType::I32],
            local_names: Vec::new(),
            body: Vec::new(),
        };
        assert_eq!(
            func.local_groups(),
            vec![(2, ValType::I32), (1, ValType::F64), (1, ValType::I32)]
        );
        assert_eq!(func.local_type(0), Some(ValType::I32));
        assert_eq!(func.local_type(3), Some(ValType::F64));
        assert_eq!(func.local_type(5), None);
    }

    #[test]
    fn test_instr_text() {
        assert_eq!(Instr::I32Const(-3).to_string(), "i32.const -3");
        assert_eq!(Instr::F64Const(1.5).to_string(), "f64.const 1.5");
        assert_eq!(
            Instr::F64Load(MemArg { offset: 0, align: 3 }).to_string(),
            "f64.load align=8"
        );
    }

    #[test]
    fn test_import_indices() {
        for (i, host) in HostImport::ALL.iter().enumerate() {
            assert_eq!(host.func_index(), i as u32);
            assert_eq!(HostImport::from_index(i as u32), Some(*host));
        }
        assert_eq!(HostImport::from_index(FIRST_ROUTINE), None);
    }
}
