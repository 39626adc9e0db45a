//! Interpreter integration tests
//!
//! Tests the full pipeline: source → compile → run `main` against a recording host

use impc::interp::{Machine, Output, RecordingHost, Trap};
use impc::{compile, CompiledModule};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn compile_ok(source: &str) -> CompiledModule {
    compile(source).unwrap_or_else(|e| panic!("Compilation failed: {}", e.wire_format()))
}

/// Run with scripted input and return everything written
fn run_with_input(source: &str, input: &[&str]) -> Result<Vec<Output>, Trap> {
    let module = compile_ok(source);
    let mut host = RecordingHost::with_input(input.iter().copied());
    impc::run(&module, &mut host)?;
    Ok(host.into_output())
}

fn run(source: &str) -> Vec<Output> {
    run_with_input(source, &[]).unwrap_or_else(|t| panic!("Program trapped: {}", t))
}

fn ints(values: &[i32]) -> Vec<Output> {
    values.iter().map(|&v| Output::Int(v)).collect()
}

// ==================== Basic Programs ====================

#[test]
fn test_array_store_and_load() {
    let source = "arrays int A[3]\ndef main() {\n  A[0] = 5\n  write A[0]\n}";
    assert_eq!(run(source), vec![Output::Int(5)]);
}

#[test]
fn test_arrays_are_zeroed() {
    let source = "arrays int A[2], float B[2]\ndef main() {\n  write A[1]\n  write B[1]\n}";
    assert_eq!(run(source), vec![Output::Int(0), Output::Float(0.0)]);
}

#[test]
fn test_locals_are_zeroed() {
    let source = "def main() with int x, float y {\n  write x\n  write y\n}";
    assert_eq!(run(source), vec![Output::Int(0), Output::Float(0.0)]);
}

#[test]
fn test_arrays_do_not_overlap() {
    let source = "\
arrays int A[2], float B[2], int C[2]
def main() {
  A[1] = 7
  B[0] = 1.25
  B[1] = 2.5
  C[0] = 9
  write A[1]
  write B[0]
  write B[1]
  write C[0]
}";
    assert_eq!(
        run(source),
        vec![
            Output::Int(7),
            Output::Float(1.25),
            Output::Float(2.5),
            Output::Int(9)
        ]
    );
}

// ==================== Arithmetic ====================

#[test]
fn test_int_arithmetic() {
    let source = "def main() {\n  write 7 / 2\n  write -7 / 2\n  write -7 % 3\n  write 2 + 3 * 4\n  write (2 + 3) * 4\n}";
    assert_eq!(run(source), ints(&[3, -3, -1, 14, 20]));
}

#[test]
fn test_float_arithmetic() {
    let source = "def main() with float x {\n  x = 1.5\n  write x * 4 - 0.5\n  write 7 / 2.0\n  write -x\n}";
    assert_eq!(
        run(source),
        vec![Output::Float(5.5), Output::Float(3.5), Output::Float(-1.5)]
    );
}

#[test]
fn test_promotion_on_assignment() {
    let source = "arrays float B[1]\ndef main() with float f {\n  f = 3\n  B[0] = f + 2\n  write B[0]\n}";
    assert_eq!(run(source), vec![Output::Float(5.0)]);
}

#[test]
fn test_int_overflow_wraps() {
    let source = "def main() with int x {\n  x = 2147483647\n  write x + 1\n}";
    assert_eq!(run(source), vec![Output::Int(i32::MIN)]);
}

#[test]
fn test_mixed_comparison() {
    let source = "def main() with int i {\n  i = 2\n  if i < 2.5 {\n    write 1\n  } else {\n    write 0\n  }\n}";
    assert_eq!(run(source), ints(&[1]));
}

// ==================== Control Flow ====================

#[test]
fn test_if_else() {
    let source = "\
def classify(int x) {
  if x < 0 {
    write -1
  } else {
    if x == 0 {
      write 0
    } else {
      write 1
    }
  }
}
def main() {
  classify(-5)
  classify(0)
  classify(12)
}";
    assert_eq!(run(source), ints(&[-1, 0, 1]));
}

#[test]
fn test_for_ascending() {
    let source = "def main() {\n  for i from 1 to 3 {\n    write i\n  }\n}";
    assert_eq!(run(source), ints(&[1, 2, 3]));
}

#[test]
fn test_for_descending() {
    let source = "def main() {\n  for i from 3 downto 1 {\n    write i\n  }\n}";
    assert_eq!(run(source), ints(&[3, 2, 1]));
}

#[test]
fn test_for_empty_range() {
    let source = "def main() {\n  for i from 5 to 4 {\n    write i\n  }\n  write 99\n}";
    assert_eq!(run(source), ints(&[99]));
}

#[test]
fn test_for_end_is_reevaluated() {
    let source = "\
def main() with int n {
  n = 5
  for i from 1 to n {
    n = n - 1
    write i
  }
}";
    // n shrinks as i grows: 1 <= 5, 2 <= 4, 3 <= 3, 4 > 2
    assert_eq!(run(source), ints(&[1, 2, 3]));
}

#[test]
fn test_nested_loops() {
    let source = "\
def main() {
  for i from 1 to 3 {
    for j from i to 3 {
      write i * 10 + j
    }
  }
}";
    assert_eq!(run(source), ints(&[11, 12, 13, 22, 23, 33]));
}

#[test]
fn test_while_loop() {
    let source = "def main() with int n, int steps {\n  n = 27\n  while n != 1 {\n    if n % 2 == 0 {\n      n = n / 2\n    } else {\n      n = 3 * n + 1\n    }\n    steps = steps + 1\n  }\n  write steps\n}";
    assert_eq!(run(source), ints(&[111]));
}

#[test]
fn test_early_return_from_procedure() {
    let source = "def p(int x) {\n  if x > 0 {\n    return\n  }\n  write x\n}\ndef main() {\n  p(1)\n  p(-2)\n}";
    assert_eq!(run(source), ints(&[-2]));
}

#[test]
fn test_return_from_inside_loop() {
    let source = "\
arrays int A[5]
int find(int v) {
  for i from 0 to 4 {
    if A[i] == v {
      return i
    }
  }
  return -1
}
def main() {
  A[3] = 42
  write find(42)
  write find(7)
}";
    assert_eq!(run(source), ints(&[3, -1]));
}

// ==================== Routines ====================

#[test]
fn test_recursive_factorial() {
    let source = "\
int fact(int n) {
  if n <= 1 {
    return 1
  } else {
    return n * fact(n - 1)
  }
}
def main() {
  write fact(10)
}";
    assert_eq!(run(source), ints(&[3628800]));
}

#[test]
fn test_mutual_recursion() {
    let source = "\
int even(int n) {
  if n == 0 {
    return 1
  }
  return odd(n - 1)
}
int odd(int n) {
  if n == 0 {
    return 0
  }
  return even(n - 1)
}
def main() {
  write even(10)
  write odd(7)
}";
    assert_eq!(run(source), ints(&[1, 1]));
}

#[test]
fn test_arguments_are_promoted() {
    let source = "float half(float x) {\n  return x / 2\n}\ndef main() {\n  write half(5)\n}";
    assert_eq!(run(source), vec![Output::Float(2.5)]);
}

#[test]
fn test_int_returned_as_float() {
    let source = "float one() {\n  return 1\n}\ndef main() {\n  write one()\n}";
    assert_eq!(run(source), vec![Output::Float(1.0)]);
}

#[test]
fn test_parameters_are_copies() {
    let source = "def bump(int x) {\n  x = x + 1\n  write x\n}\ndef main() with int y {\n  y = 1\n  bump(y)\n  write y\n}";
    assert_eq!(run(source), ints(&[2, 1]));
}

#[test]
fn test_procedures_share_global_arrays() {
    let source = "\
arrays int A[4]
def fill(int k) {
  for i from 0 to 3 {
    A[i] = i * k
  }
}
int sum() with int total {
  for i from 0 to 3 {
    total = total + A[i]
  }
  return total
}
def main() {
  fill(2)
  write sum()
}";
    assert_eq!(run(source), ints(&[12]));
}

// ==================== Input ====================

#[test]
fn test_reads() {
    let source = "\
arrays float B[2]
def main() with int n {
  read n
  read B[1]
  write n * 2
  write B[1] + n
}";
    let output = run_with_input(source, &["21", "0.5"]).unwrap();
    assert_eq!(output, vec![Output::Int(42), Output::Float(21.5)]);
}

#[test]
fn test_read_into_loop() {
    let source = "\
arrays int A[3]
def main() with int total {
  for i from 0 to 2 {
    read A[i]
  }
  for i from 2 downto 0 {
    write A[i]
  }
}";
    let output = run_with_input(source, &["4", "5", "6"]).unwrap();
    assert_eq!(output, ints(&[6, 5, 4]));
}

#[test]
fn test_input_exhausted() {
    let source = "def main() with int n {\n  read n\n}";
    assert_eq!(run_with_input(source, &[]), Err(Trap::InputExhausted));
}

#[test]
fn test_invalid_input() {
    let source = "def main() with int n {\n  read n\n}";
    assert!(matches!(
        run_with_input(source, &["abc"]),
        Err(Trap::InvalidInput { expected: "int", .. })
    ));
}

// ==================== Traps ====================

#[test]
fn test_division_by_zero_traps() {
    let source = "def main() with int z {\n  write 1 / z\n}";
    assert_eq!(run_with_input(source, &[]), Err(Trap::IntegerDivideByZero));
}

#[test]
fn test_remainder_by_zero_traps() {
    let source = "def main() with int z {\n  write 1 % z\n}";
    assert_eq!(run_with_input(source, &[]), Err(Trap::IntegerDivideByZero));
}

#[test]
fn test_out_of_bounds_traps() {
    let source = "arrays int A[2]\ndef main() {\n  A[70000] = 1\n}";
    assert!(matches!(
        run_with_input(source, &[]),
        Err(Trap::MemoryOutOfBounds { .. })
    ));
}

#[test]
fn test_unbounded_recursion_exhausts_stack() {
    let source = "def loop(int n) {\n  loop(n + 1)\n}\ndef main() {\n  loop(0)\n}";
    assert_eq!(run_with_input(source, &[]), Err(Trap::StackExhausted));
}

#[test]
fn test_fuel_stops_infinite_loop() {
    let module = compile_ok("def main() {\n  while 1 == 1 {\n  }\n}");
    let mut machine = Machine::new(module.module()).unwrap().with_fuel(10_000);
    let mut host = RecordingHost::new();
    assert_eq!(
        machine.invoke_export("main", &[], &mut host),
        Err(Trap::OutOfFuel)
    );
}

#[test]
fn test_memory_is_inspectable_after_run() {
    let module = compile_ok("arrays int A[2], float B[1]\ndef main() {\n  A[1] = -3\n  B[0] = 0.25\n}");
    let mut machine = Machine::new(module.module()).unwrap();
    let mut host = RecordingHost::new();
    machine.invoke_export("main", &[], &mut host).unwrap();

    let b = module.layout().find("B").unwrap().offset;
    assert_eq!(machine.load_i32(4), Some(-3));
    assert_eq!(machine.load_f64(b), Some(0.25));
}

proptest! {
    #[test]
    fn prop_int_arithmetic_matches_wrapping(a in -5000i32..5000, b in -5000i32..5000, c in 1i32..100) {
        let source = format!(
            "def main() {{\n  write {a} * {b} - {c}\n  write ({a} + {b}) / {c}\n  write {a} % {c}\n}}\n"
        );
        let output = run(&source);
        prop_assert_eq!(
            output,
            ints(&[a.wrapping_mul(b).wrapping_sub(c), a.wrapping_add(b) / c, a % c])
        );
    }
}

#[test]
fn test_nested_negation_runs() {
    let source = format!("def main() {{\n  write {}1\n}}", "-".repeat(60));
    assert_eq!(run(&source), ints(&[1]));
}
