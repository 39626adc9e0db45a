//! Integration tests for the full pipeline

use impc::interp::{Output, RecordingHost, StreamHost};
use impc::{compile, ErrorKind};
use pretty_assertions::assert_eq;

/// Compile and expect failure, returning `(kind, wire format)`
fn compile_error(src: &str) -> (ErrorKind, String) {
    match compile(src) {
        Ok(_) => panic!("Compilation should fail for:\n{}", src),
        Err(err) => (err.kind(), err.wire_format()),
    }
}

fn wire_line(wire: &str) -> usize {
    let (line, _) = wire.split_once(':').expect("wire format has a colon");
    line.parse().expect("line is a number")
}

const SUM_OF_SQUARES: &str = "\
// Reads n, then n numbers, and prints the sum of their squares
arrays int V[100]

int square(int x) {
  return x * x
}

int total(int n) with int acc {
  acc = 0
  for i from 0 to n - 1 {
    acc = acc + square(V[i])
  }
  return acc
}

def main() with int n {
  read n
  for i from 0 to n - 1 {
    read V[i]
  }
  write total(n)
}
";

#[test]
fn test_array_scenario() {
    let module = compile("arrays int A[3]\ndef main() {\n  A[0] = 5\n  write A[0]\n}").expect("compile");
    wasmparser::validate(module.bytes()).expect("valid module");

    let mut host = RecordingHost::new();
    impc::run(&module, &mut host).expect("run");
    assert_eq!(host.output(), &[Output::Int(5)]);
}

#[test]
fn test_full_program_with_stream_host() {
    let module = compile(SUM_OF_SQUARES).expect("compile");
    wasmparser::validate(module.bytes()).expect("valid module");

    let input = b"3\n1 2\n3\n";
    let mut host = StreamHost::new(&input[..], Vec::new());
    impc::run(&module, &mut host).expect("run");
    assert_eq!(String::from_utf8(host.into_writer()).unwrap(), "14\n");
}

#[test]
fn test_compilation_is_deterministic() {
    let first = compile(SUM_OF_SQUARES).unwrap();
    let second = compile(SUM_OF_SQUARES).unwrap();
    assert_eq!(first.bytes(), second.bytes());
    assert_eq!(first.disassemble(), second.disassemble());
}

#[test]
fn test_missing_return_scenario() {
    let (kind, wire) = compile_error("int f() with int x {\n  x = 1\n}\ndef main() {\n  write f()\n}");
    assert_eq!(kind, ErrorKind::MissingReturn);
    assert_eq!(wire_line(&wire), 3);
}

#[test]
fn test_write_string_scenario() {
    let (kind, wire) = compile_error("def main() {\n  write \"hi\"\n}");
    assert_eq!(kind, ErrorKind::TypeMismatch);
    assert_eq!(wire, "2:type mismatch: cannot write a string");
}

#[test]
fn test_undeclared_call_scenario() {
    let (kind, wire) = compile_error("def main() {\n  foo()\n}");
    assert_eq!(kind, ErrorKind::UndeclaredIdentifier);
    assert_eq!(wire, "2:undeclared identifier `foo`");
}

#[test]
fn test_duplicate_array_scenario() {
    let (kind, wire) = compile_error("arrays int A[2]\narrays int A[3]\ndef main() {\n}");
    assert_eq!(kind, ErrorKind::DuplicateDeclaration);
    assert_eq!(wire, "2:duplicate declaration of `A`");
}

#[test]
fn test_error_kinds_end_to_end() {
    let cases: &[(&str, ErrorKind, usize)] = &[
        ("def main() {\n  write 1 # 2\n}", ErrorKind::LexError, 2),
        ("def main() {\n  write 99999999999\n}", ErrorKind::LexError, 2),
        ("def main() {\n  write (1\n}", ErrorKind::SyntaxError, 3),
        ("def main() {\n  x = 1\n}", ErrorKind::UndeclaredIdentifier, 2),
        ("def main(int a, int a) {\n}", ErrorKind::DuplicateDeclaration, 1),
        ("arrays int A[0]\ndef main() {\n}", ErrorKind::ArraySizeError, 1),
        ("def main() with int x {\n  x = 0.5\n}", ErrorKind::TypeMismatch, 2),
        (
            "def p(int a) {\n}\ndef main() {\n  p(1, 2)\n}",
            ErrorKind::ArityMismatch,
            4,
        ),
        ("def main() {\n  return 1\n}", ErrorKind::UnexpectedReturnValue, 2),
        ("def mian() {\n}", ErrorKind::MissingEntryPoint, 1),
    ];

    for &(src, kind, line) in cases {
        let (found, wire) = compile_error(src);
        assert_eq!((found, wire_line(&wire)), (kind, line), "source:\n{}", src);
        assert!(!wire.contains('\n'), "wire format spans lines: {:?}", wire);
    }
}

#[test]
fn test_error_messages_name_the_culprit() {
    let (_, wire) = compile_error("int add(int a, int b) {\n  return a + b\n}\ndef main() {\n  write add(1)\n}");
    assert_eq!(wire, "5:`add` expects 2 argument(s), found 1");

    let (_, wire) = compile_error("def p() {\n  return 3\n}\ndef main() {\n}");
    assert_eq!(wire, "2:procedure `p` cannot return a value");
}

#[test]
fn test_comments_and_blank_lines_keep_line_numbers() {
    let (kind, wire) = compile_error("// header\n\ndef main() {\n  // body\n\n  write y\n}");
    assert_eq!(kind, ErrorKind::UndeclaredIdentifier);
    assert_eq!(wire_line(&wire), 6);
}
