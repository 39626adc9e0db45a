//! Code generation tests

use impc::codegen::{Instr, ValType, FIRST_ROUTINE};
use impc::{compile, compile_with, CompiledModule, Options};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use wasmparser::{ExternalKind, Parser, Payload};

fn compile_ok(src: &str) -> CompiledModule {
    compile(src).unwrap_or_else(|e| panic!("Compilation failed: {}", e.wire_format()))
}

fn body_of<'a>(module: &'a CompiledModule, name: &str) -> &'a [Instr] {
    &module
        .module()
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function `{}`", name))
        .body
}

fn count(body: &[Instr], wanted: Instr) -> usize {
    body.iter().filter(|&&instr| instr == wanted).count()
}

/// Export and memory sections as seen by an independent decoder
fn decode(bytes: &[u8]) -> (Vec<(String, ExternalKind, u32)>, Vec<u64>) {
    let mut exports = Vec::new();
    let mut memories = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        match payload.expect("malformed module") {
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.expect("malformed export");
                    exports.push((export.name.to_string(), export.kind, export.index));
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    memories.push(memory.expect("malformed memory").initial);
                }
            }
            _ => {}
        }
    }
    (exports, memories)
}

const EVERYTHING: &str = "\
arrays int A[10], float B[4]

int fact(int n) {
  if n <= 1 {
    return 1
  } else {
    return n * fact(n - 1)
  }
}

float mean(int count) with float sum {
  sum = 0
  for i from 0 to count - 1 {
    sum = sum + B[i]
  }
  return sum / count
}

def fill(int k) with int j {
  j = k
  while j > 0 {
    A[j] = j % 3
    j = j - 1
  }
  for m from 3 downto 0 {
    B[m] = -m * 1.5
  }
}

def main() with int x, float y {
  read x
  read B[0]
  fill(x)
  write fact(5)
  y = mean(4)
  write y
  if y != 2.0 {
    write -y
  }
  return
}
";

#[test]
fn test_minimal_module_text() {
    let module = compile_ok("def main() {\n  write 1\n}");
    insta::assert_snapshot!(module.disassemble(), @r#"
    (module
      (type (;0;) (func (param i32)))
      (type (;1;) (func (param f64)))
      (type (;2;) (func (result i32)))
      (type (;3;) (func (result f64)))
      (type (;4;) (func))
      (import "imports" "write" (func (;0;) (type 0)))
      (import "imports" "write" (func (;1;) (type 1)))
      (import "imports" "readInt" (func (;2;) (type 2)))
      (import "imports" "readFloat" (func (;3;) (type 3)))
      (func $main (;4;) (type 4)
        i32.const 1
        call 0
      )
      (memory (;0;) 0)
      (export "main" (func 4))
    )
    "#);
}

#[test]
fn test_module_validates() {
    let module = compile_ok(EVERYTHING);
    wasmparser::validate(module.bytes()).expect("named module should validate");

    let plain = compile_with(EVERYTHING, &Options { debug_names: false }).unwrap();
    wasmparser::validate(plain.bytes()).expect("plain module should validate");
}

#[test]
fn test_single_main_export() {
    let module = compile_ok(EVERYTHING);
    let (exports, memories) = decode(module.bytes());

    // main is the fourth routine
    assert_eq!(
        exports,
        vec![("main".to_string(), ExternalKind::Func, FIRST_ROUTINE + 3)]
    );
    assert_eq!(memories, vec![1]);
}

#[test]
fn test_imports_come_first() {
    let module = compile_ok(EVERYTHING);
    let fields: Vec<_> = module
        .module()
        .imports
        .iter()
        .map(|i| i.host.field())
        .collect();
    assert_eq!(fields, vec!["write", "write", "readInt", "readFloat"]);
}

#[test]
fn test_routine_function_indices() {
    let module = compile_ok(EVERYTHING);
    let main = body_of(&module, "main");
    // fill is routine 2, fact routine 0, mean routine 1
    assert_eq!(count(main, Instr::Call(FIRST_ROUTINE + 2)), 1);
    assert_eq!(count(main, Instr::Call(FIRST_ROUTINE)), 1);
    assert_eq!(count(main, Instr::Call(FIRST_ROUTINE + 1)), 1);
    // readInt, readFloat, then write(i32) once and write(f64) twice
    assert_eq!(count(main, Instr::Call(2)), 1);
    assert_eq!(count(main, Instr::Call(3)), 1);
    assert_eq!(count(main, Instr::Call(0)), 1);
    assert_eq!(count(main, Instr::Call(1)), 2);

    let fact = body_of(&module, "fact");
    assert_eq!(count(fact, Instr::Call(FIRST_ROUTINE)), 1);
}

#[test]
fn test_memory_layout() {
    let module = compile_ok("arrays int A[3], float B[2], int C[5]\ndef main() {\n}");
    let layout = module.layout();

    let offsets: Vec<_> = layout.arrays.iter().map(|a| (a.name.as_str(), a.offset)).collect();
    assert_eq!(offsets, vec![("A", 0), ("B", 12), ("C", 28)]);
    assert_eq!(layout.total_bytes, 48);
    assert_eq!(layout.pages(), 1);
    assert_eq!(layout.find("C").map(|a| a.byte_len), Some(20));
}

#[test]
fn test_memory_pages_round_up() {
    let none = compile_ok("def main() {\n}");
    assert!(none.layout().is_empty());
    assert_eq!(none.module().memory_pages, 0);

    let exact = compile_ok("arrays int A[16384]\ndef main() {\n}");
    assert_eq!(exact.module().memory_pages, 1);

    let over = compile_ok("arrays int A[16384], int B[1]\ndef main() {\n}");
    assert_eq!(over.module().memory_pages, 2);
    let (_, memories) = decode(over.bytes());
    assert_eq!(memories, vec![2]);
}

#[test]
fn test_single_promotion_per_mixed_operation() {
    let module = compile_ok("def main() with int i, float f {\n  f = i + f\n}");
    assert_eq!(
        body_of(&module, "main"),
        &[
            Instr::LocalGet(0),
            Instr::F64ConvertI32S,
            Instr::LocalGet(1),
            Instr::F64Add,
            Instr::LocalSet(1),
        ]
    );
}

#[test]
fn test_downto_loop_steps_down() {
    let module = compile_ok("def main() {\n  for i from 3 downto 1 {\n    write i\n  }\n}");
    let body = body_of(&module, "main");
    assert_eq!(count(body, Instr::I32GeS), 1);
    assert_eq!(count(body, Instr::I32Sub), 1);
    assert_eq!(count(body, Instr::I32LeS), 0);
    assert_eq!(count(body, Instr::BrIf(1)), 1);
    assert_eq!(count(body, Instr::Br(0)), 1);
}

#[test]
fn test_remainder_lowers_to_rem_s() {
    let module = compile_ok("def main() with int a {\n  write a % 3\n  write -a % a\n}");
    let body = body_of(&module, "main");
    assert_eq!(count(body, Instr::I32RemS), 2);
    assert_eq!(count(body, Instr::Unreachable), 0);
}

#[test]
fn test_functions_end_unreachable() {
    let module = compile_ok(EVERYTHING);
    assert_eq!(body_of(&module, "fact").last(), Some(&Instr::Unreachable));
    assert_eq!(body_of(&module, "mean").last(), Some(&Instr::Unreachable));
    assert_ne!(body_of(&module, "fill").last(), Some(&Instr::Unreachable));
}

#[test]
fn test_locals_follow_parameters() {
    let module = compile_ok(EVERYTHING);
    let mean = module
        .module()
        .functions
        .iter()
        .find(|f| f.name == "mean")
        .unwrap();
    assert_eq!(mean.params, vec![ValType::I32]);
    assert_eq!(mean.results, vec![ValType::F64]);
    // loop variables get slots after the `with` locals
    assert_eq!(mean.locals, vec![ValType::F64, ValType::I32]);
    assert_eq!(mean.local_names, vec!["count", "sum", "i"]);
}

#[test]
fn test_type_section_is_deduplicated() {
    let module = compile_ok(EVERYTHING);
    // four import types, then (i32)->i32, (i32)->f64 and ()->().
    // `fill(int)` reuses the (i32)->() type of the integer `write` import.
    assert_eq!(module.module().types.len(), 7);
    let fill = module.module().functions.iter().find(|f| f.name == "fill").unwrap();
    assert_eq!(fill.type_index, module.module().imports[0].type_index);
}

#[test]
fn test_names_do_not_change_code() {
    let named = compile_ok(EVERYTHING);
    let plain = compile_with(EVERYTHING, &Options { debug_names: false }).unwrap();
    assert_eq!(named.disassemble(), plain.disassemble());
    assert_eq!(&named.bytes()[..plain.bytes().len()], plain.bytes());
}

proptest! {
    #[test]
    fn prop_compilation_is_deterministic(a in -1000i32..1000, b in 1i32..1000, len in 1u32..64) {
        let src = format!(
            "arrays float V[{len}]\ndef main() with int x {{\n  x = {a} * {b} - {a} / {b}\n  V[0] = x\n  write V[0] + {b}\n}}\n"
        );
        let first = compile(&src).unwrap();
        let second = compile(&src).unwrap();
        prop_assert_eq!(first.bytes(), second.bytes());
        prop_assert!(wasmparser::validate(first.bytes()).is_ok());
    }
}

proptest! {
    #[test]
    fn prop_layout_is_packed(sizes in prop::collection::vec((1u32..500, any::<bool>()), 1..8)) {
        let decls: Vec<String> = sizes
            .iter()
            .enumerate()
            .map(|(i, (len, float))| format!("{} A{}[{}]", if *float { "float" } else { "int" }, i, len))
            .collect();
        let src = format!("arrays {}\ndef main() {{\n}}\n", decls.join(", "));
        let module = compile(&src).unwrap();
        let layout = module.layout();

        let mut offset = 0u64;
        for (slot, (len, float)) in layout.arrays.iter().zip(&sizes) {
            let width = if *float { 8 } else { 4 };
            prop_assert_eq!(u64::from(slot.offset), offset);
            prop_assert_eq!(slot.byte_len, u64::from(*len) * width);
            offset += slot.byte_len;
        }
        prop_assert_eq!(layout.total_bytes, offset);
        prop_assert_eq!(module.module().memory_pages, offset.div_ceil(65536));
    }
}
