//! Stack machine executing the module IR
//!
//! Call frames live on a heap stack, so deep recursion in the guest never
//! recurses in the interpreter. Branch targets come from a side table built
//! once per function.

use super::{Host, Trap, Value};
use crate::codegen::module::MemArg;
use crate::codegen::{HostImport, Instr, Module, FIRST_ROUTINE, PAGE_SIZE};
use rustc_hash::FxHashMap;

/// Deepest guest call nesting before [`Trap::StackExhausted`]
pub const MAX_CALL_DEPTH: usize = 10_000;

/// Matching `else` / `end` positions for every block opener of one body
#[derive(Debug, Default)]
struct BlockMap {
    ends: FxHashMap<usize, usize>,
    elses: FxHashMap<usize, usize>,
}

impl BlockMap {
    fn build(body: &[Instr]) -> Result<BlockMap, Trap> {
        let mut map = BlockMap::default();
        let mut open = Vec::new();
        for (pc, instr) in body.iter().enumerate() {
            match instr {
                Instr::Block | Instr::Loop | Instr::If => open.push(pc),
                Instr::Else => {
                    let opener = *open.last().ok_or(Trap::Malformed("`else` outside `if`"))?;
                    map.elses.insert(opener, pc);
                }
                Instr::End => {
                    let opener = open.pop().ok_or(Trap::Malformed("unbalanced `end`"))?;
                    map.ends.insert(opener, pc);
                }
                _ => {}
            }
        }
        if !open.is_empty() {
            return Err(Trap::Malformed("unterminated block"));
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Block,
    Loop,
    If,
}

#[derive(Debug, Clone, Copy)]
struct Label {
    kind: LabelKind,
    /// Position of the opening instruction
    start: usize,
    /// Position of the matching `end`
    end: usize,
    /// Operand stack height on entry
    height: usize,
}

#[derive(Debug)]
struct Frame {
    /// Position in `Module::functions`
    func: usize,
    pc: usize,
    locals: Vec<Value>,
    labels: Vec<Label>,
    /// Operand stack height below this frame's operands
    base: usize,
}

/// Interpreter state for one module instance
pub struct Machine<'m> {
    module: &'m Module,
    blocks: Vec<BlockMap>,
    memory: Vec<u8>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    fuel: Option<u64>,
}

impl<'m> Machine<'m> {
    /// Instantiate `module` with zeroed memory
    pub fn new(module: &'m Module) -> Result<Self, Trap> {
        let blocks = module
            .functions
            .iter()
            .map(|func| BlockMap::build(&func.body))
            .collect::<Result<Vec<_>, _>>()?;
        let size = usize::try_from(module.memory_pages.saturating_mul(PAGE_SIZE))
            .map_err(|_| Trap::Malformed("memory does not fit in the host address space"))?;

        Ok(Self {
            module,
            blocks,
            memory: vec![0; size],
            stack: Vec::new(),
            frames: Vec::new(),
            fuel: None,
        })
    }

    /// Trap with [`Trap::OutOfFuel`] after executing `fuel` instructions
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }

    /// Read an i32 from linear memory, little-endian
    pub fn load_i32(&self, address: u32) -> Option<i32> {
        let start = address as usize;
        let bytes = self.memory.get(start..start + 4)?;
        Some(i32::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Read an f64 from linear memory, little-endian
    pub fn load_f64(&self, address: u32) -> Option<f64> {
        let start = address as usize;
        let bytes = self.memory.get(start..start + 8)?;
        Some(f64::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Invoke an exported function by name
    pub fn invoke_export<H: Host>(
        &mut self,
        name: &str,
        args: &[Value],
        host: &mut H,
    ) -> Result<Vec<Value>, Trap> {
        let index = self
            .module
            .export(name)
            .ok_or_else(|| Trap::UnknownExport(name.to_string()))?;
        self.invoke(index, args, host)
    }

    /// Invoke any function by absolute index and return its results
    pub fn invoke<H: Host>(
        &mut self,
        func_index: u32,
        args: &[Value],
        host: &mut H,
    ) -> Result<Vec<Value>, Trap> {
        let module = self.module;
        let ty = module
            .func_type(func_index)
            .ok_or(Trap::UndefinedFunction(func_index))?;
        if args.len() != ty.params.len() || args.iter().zip(&ty.params).any(|(a, &t)| a.ty() != t) {
            return Err(Trap::BadArguments);
        }

        self.stack.clear();
        self.frames.clear();
        self.stack.extend_from_slice(args);
        self.call(func_index, host)?;
        self.execute(host)?;

        let results = ty.results.len();
        if self.stack.len() < results {
            return Err(Trap::Malformed("missing result value"));
        }
        Ok(self.stack.split_off(self.stack.len() - results))
    }

    fn execute<H: Host>(&mut self, host: &mut H) -> Result<(), Trap> {
        let module = self.module;
        while let Some(frame) = self.frames.last_mut() {
            let body = &module.functions[frame.func].body;
            if frame.pc >= body.len() {
                self.return_from_frame()?;
                continue;
            }
            let at = frame.pc;
            frame.pc += 1;
            self.consume_fuel()?;
            self.step(at, body[at], host)?;
        }
        Ok(())
    }

    fn consume_fuel(&mut self) -> Result<(), Trap> {
        if let Some(fuel) = self.fuel.as_mut() {
            if *fuel == 0 {
                return Err(Trap::OutOfFuel);
            }
            *fuel -= 1;
        }
        Ok(())
    }

    // ==================== CONTROL ====================

    fn step<H: Host>(&mut self, at: usize, instr: Instr, host: &mut H) -> Result<(), Trap> {
        match instr {
            Instr::Block => self.enter(LabelKind::Block, at)?,
            Instr::Loop => self.enter(LabelKind::Loop, at)?,
            Instr::If => {
                let cond = self.pop_i32()?;
                let (end, else_at) = self.block_bounds(at)?;
                let label = Label {
                    kind: LabelKind::If,
                    start: at,
                    end,
                    height: self.stack.len(),
                };
                let frame = self.frame_mut()?;
                if cond != 0 {
                    frame.labels.push(label);
                } else if let Some(else_at) = else_at {
                    frame.labels.push(label);
                    frame.pc = else_at + 1;
                } else {
                    frame.pc = end + 1;
                }
            }
            Instr::Else => {
                // End of the taken `then` arm
                let frame = self.frame_mut()?;
                let label = frame
                    .labels
                    .pop()
                    .ok_or(Trap::Malformed("`else` without `if`"))?;
                frame.pc = label.end + 1;
            }
            Instr::End => {
                self.frame_mut()?
                    .labels
                    .pop()
                    .ok_or(Trap::Malformed("unbalanced `end`"))?;
            }
            Instr::Br(depth) => self.branch(depth)?,
            Instr::BrIf(depth) => {
                if self.pop_i32()? != 0 {
                    self.branch(depth)?;
                }
            }
            Instr::Return => self.return_from_frame()?,
            Instr::Unreachable => return Err(Trap::Unreachable),
            Instr::Call(index) => self.call(index, host)?,

            Instr::LocalGet(index) => {
                let value = *self
                    .frame_mut()?
                    .locals
                    .get(index as usize)
                    .ok_or(Trap::Malformed("local index out of range"))?;
                self.stack.push(value);
            }
            Instr::LocalSet(index) => {
                let value = self.pop()?;
                let slot = self
                    .frame_mut()?
                    .locals
                    .get_mut(index as usize)
                    .ok_or(Trap::Malformed("local index out of range"))?;
                *slot = value;
            }

            Instr::I32Load(arg) => {
                let address = self.effective_address(arg, 4)?;
                let value = self
                    .load_i32(address)
                    .ok_or(Trap::MemoryOutOfBounds { address: address.into() })?;
                self.stack.push(Value::I32(value));
            }
            Instr::F64Load(arg) => {
                let address = self.effective_address(arg, 8)?;
                let value = self
                    .load_f64(address)
                    .ok_or(Trap::MemoryOutOfBounds { address: address.into() })?;
                self.stack.push(Value::F64(value));
            }
            Instr::I32Store(arg) => {
                let value = self.pop_i32()?;
                let address = self.effective_address(arg, 4)? as usize;
                self.memory[address..address + 4].copy_from_slice(&value.to_le_bytes());
            }
            Instr::F64Store(arg) => {
                let value = self.pop_f64()?;
                let address = self.effective_address(arg, 8)? as usize;
                self.memory[address..address + 8].copy_from_slice(&value.to_le_bytes());
            }

            Instr::I32Const(value) => self.stack.push(Value::I32(value)),
            Instr::F64Const(value) => self.stack.push(Value::F64(value)),

            Instr::I32Eqz => {
                let value = self.pop_i32()?;
                self.stack.push(Value::I32((value == 0) as i32));
            }
            Instr::I32Eq => self.compare_i32(|a, b| a == b)?,
            Instr::I32Ne => self.compare_i32(|a, b| a != b)?,
            Instr::I32LtS => self.compare_i32(|a, b| a < b)?,
            Instr::I32GtS => self.compare_i32(|a, b| a > b)?,
            Instr::I32LeS => self.compare_i32(|a, b| a <= b)?,
            Instr::I32GeS => self.compare_i32(|a, b| a >= b)?,
            Instr::I32Add => self.binary_i32(|a, b| Ok(a.wrapping_add(b)))?,
            Instr::I32Sub => self.binary_i32(|a, b| Ok(a.wrapping_sub(b)))?,
            Instr::I32Mul => self.binary_i32(|a, b| Ok(a.wrapping_mul(b)))?,
            Instr::I32DivS => self.binary_i32(|a, b| match (a, b) {
                (_, 0) => Err(Trap::IntegerDivideByZero),
                (i32::MIN, -1) => Err(Trap::IntegerOverflow),
                _ => Ok(a / b),
            })?,
            Instr::I32RemS => self.binary_i32(|a, b| match b {
                0 => Err(Trap::IntegerDivideByZero),
                _ => Ok(a.wrapping_rem(b)),
            })?,

            Instr::F64Eq => self.compare_f64(|a, b| a == b)?,
            Instr::F64Ne => self.compare_f64(|a, b| a != b)?,
            Instr::F64Lt => self.compare_f64(|a, b| a < b)?,
            Instr::F64Gt => self.compare_f64(|a, b| a > b)?,
            Instr::F64Le => self.compare_f64(|a, b| a <= b)?,
            Instr::F64Ge => self.compare_f64(|a, b| a >= b)?,
            Instr::F64Neg => {
                let value = self.pop_f64()?;
                self.stack.push(Value::F64(-value));
            }
            Instr::F64Add => self.binary_f64(|a, b| a + b)?,
            Instr::F64Sub => self.binary_f64(|a, b| a - b)?,
            Instr::F64Mul => self.binary_f64(|a, b| a * b)?,
            Instr::F64Div => self.binary_f64(|a, b| a / b)?,

            Instr::F64ConvertI32S => {
                let value = self.pop_i32()?;
                self.stack.push(Value::F64(f64::from(value)));
            }
        }
        Ok(())
    }

    fn block_bounds(&self, at: usize) -> Result<(usize, Option<usize>), Trap> {
        let frame = self.frames.last().ok_or(Trap::Malformed("no active frame"))?;
        let map = &self.blocks[frame.func];
        let end = *map
            .ends
            .get(&at)
            .ok_or(Trap::Malformed("block without `end`"))?;
        Ok((end, map.elses.get(&at).copied()))
    }

    fn enter(&mut self, kind: LabelKind, at: usize) -> Result<(), Trap> {
        let (end, _) = self.block_bounds(at)?;
        let height = self.stack.len();
        self.frame_mut()?.labels.push(Label {
            kind,
            start: at,
            end,
            height,
        });
        Ok(())
    }

    fn branch(&mut self, depth: u32) -> Result<(), Trap> {
        let frame = self.frame_mut()?;
        let target = frame
            .labels
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or(Trap::Malformed("branch depth out of range"))?;
        let label = frame.labels[target];
        if label.kind == LabelKind::Loop {
            frame.labels.truncate(target + 1);
            frame.pc = label.start + 1;
        } else {
            frame.labels.truncate(target);
            frame.pc = label.end + 1;
        }
        self.stack.truncate(label.height);
        Ok(())
    }

    fn call<H: Host>(&mut self, func_index: u32, host: &mut H) -> Result<(), Trap> {
        if let Some(import) = HostImport::from_index(func_index) {
            return self.call_host(import, host);
        }

        let module = self.module;
        let position = (func_index - FIRST_ROUTINE) as usize;
        let func = module
            .functions
            .get(position)
            .ok_or(Trap::UndefinedFunction(func_index))?;
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(Trap::StackExhausted);
        }

        let argc = func.params.len();
        if self.stack.len() < argc {
            return Err(Trap::Malformed("operand stack underflow"));
        }
        let mut locals = self.stack.split_off(self.stack.len() - argc);
        locals.extend(func.locals.iter().map(|&ty| Value::zero(ty)));

        self.frames.push(Frame {
            func: position,
            pc: 0,
            locals,
            labels: Vec::new(),
            base: self.stack.len(),
        });
        Ok(())
    }

    fn call_host<H: Host>(&mut self, import: HostImport, host: &mut H) -> Result<(), Trap> {
        match import {
            HostImport::WriteInt => {
                let value = self.pop_i32()?;
                host.write_int(value)
            }
            HostImport::WriteFloat => {
                let value = self.pop_f64()?;
                host.write_float(value)
            }
            HostImport::ReadInt => {
                let value = host.read_int()?;
                self.stack.push(Value::I32(value));
                Ok(())
            }
            HostImport::ReadFloat => {
                let value = host.read_float()?;
                self.stack.push(Value::F64(value));
                Ok(())
            }
        }
    }

    fn return_from_frame(&mut self) -> Result<(), Trap> {
        let module = self.module;
        let frame = self
            .frames
            .pop()
            .ok_or(Trap::Malformed("return without a frame"))?;
        let results = module.functions[frame.func].results.len();
        if self.stack.len() < frame.base + results {
            return Err(Trap::Malformed("missing return value"));
        }
        let values = self.stack.split_off(self.stack.len() - results);
        self.stack.truncate(frame.base);
        self.stack.extend(values);
        Ok(())
    }

    // ==================== OPERANDS ====================

    fn frame_mut(&mut self) -> Result<&mut Frame, Trap> {
        self.frames
            .last_mut()
            .ok_or(Trap::Malformed("no active frame"))
    }

    fn pop(&mut self) -> Result<Value, Trap> {
        self.stack
            .pop()
            .ok_or(Trap::Malformed("operand stack underflow"))
    }

    fn pop_i32(&mut self) -> Result<i32, Trap> {
        self.pop()?
            .as_i32()
            .ok_or(Trap::Malformed("expected an i32 operand"))
    }

    fn pop_f64(&mut self) -> Result<f64, Trap> {
        self.pop()?
            .as_f64()
            .ok_or(Trap::Malformed("expected an f64 operand"))
    }

    /// Pop a base address and check `width` bytes from it are in bounds
    fn effective_address(&mut self, arg: MemArg, width: u64) -> Result<u32, Trap> {
        let base = self.pop_i32()? as u32;
        let address = u64::from(base) + u64::from(arg.offset);
        if address + width > self.memory.len() as u64 {
            return Err(Trap::MemoryOutOfBounds { address });
        }
        // In bounds of a memory no larger than 4 GiB
        Ok(address as u32)
    }

    fn binary_i32(&mut self, op: impl FnOnce(i32, i32) -> Result<i32, Trap>) -> Result<(), Trap> {
        let rhs = self.pop_i32()?;
        let lhs = self.pop_i32()?;
        self.stack.push(Value::I32(op(lhs, rhs)?));
        Ok(())
    }

    fn compare_i32(&mut self, op: impl FnOnce(i32, i32) -> bool) -> Result<(), Trap> {
        let rhs = self.pop_i32()?;
        let lhs = self.pop_i32()?;
        self.stack.push(Value::I32(op(lhs, rhs) as i32));
        Ok(())
    }

    fn binary_f64(&mut self, op: impl FnOnce(f64, f64) -> f64) -> Result<(), Trap> {
        let rhs = self.pop_f64()?;
        let lhs = self.pop_f64()?;
        self.stack.push(Value::F64(op(lhs, rhs)));
        Ok(())
    }

    fn compare_f64(&mut self, op: impl FnOnce(f64, f64) -> bool) -> Result<(), Trap> {
        let rhs = self.pop_f64()?;
        let lhs = self.pop_f64()?;
        self.stack.push(Value::I32(op(lhs, rhs) as i32));
        Ok(())
    }
}
