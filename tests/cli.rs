//! Command-line driver tests

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn source_file(name: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("impc-cli-{}-{}.imp", std::process::id(), name));
    std::fs::write(&path, source).expect("write source file");
    path
}

fn impc(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_impc"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn impc");
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait for impc")
}

#[test]
fn test_plain_errors_use_wire_format() {
    let path = source_file("plain", "def main() {\n  write \"hi\"\n}\n");
    let out = impc(&["check", path.to_str().unwrap(), "--message-format", "plain"], "");

    assert_eq!(out.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&out.stderr),
        "2:type mismatch: cannot write a string\n"
    );
    assert!(out.stdout.is_empty());
}

#[test]
fn test_run_flushes_program_output() {
    let path = source_file(
        "run",
        "def main() with int n {\n  read n\n  for i from 1 to n {\n    write i * i\n  }\n}\n",
    );
    let out = impc(&["run", path.to_str().unwrap()], "3\n");

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "1\n4\n9\n");
}

#[test]
fn test_run_stops_when_fuel_runs_out() {
    let path = source_file("fuel", "def main() {\n  while 1 == 1 {\n  }\n}\n");
    let out = impc(&["run", path.to_str().unwrap(), "--fuel", "1000"], "");

    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}
