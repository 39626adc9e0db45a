//! Host side of the four module imports

use super::Trap;
use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};

/// Implementation of the `imports` module a compiled program links against
pub trait Host {
    /// `write(i32)`
    fn write_int(&mut self, value: i32) -> Result<(), Trap>;
    /// `write(f64)`
    fn write_float(&mut self, value: f64) -> Result<(), Trap>;
    /// `readInt() -> i32`
    fn read_int(&mut self) -> Result<i32, Trap>;
    /// `readFloat() -> f64`
    fn read_float(&mut self) -> Result<f64, Trap>;
}

/// One value passed to a `write` import
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Output {
    Int(i32),
    Float(f64),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Int(v) => write!(f, "{}", v),
            Output::Float(v) => write!(f, "{}", v),
        }
    }
}

fn parse_token<T: std::str::FromStr>(token: &str, expected: &'static str) -> Result<T, Trap> {
    token.parse().map_err(|_| Trap::InvalidInput {
        text: token.to_string(),
        expected,
    })
}

/// Host that reads scripted input tokens and records every write
#[derive(Debug, Default)]
pub struct RecordingHost {
    input: VecDeque<String>,
    output: Vec<Output>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue whitespace-free tokens for `readInt` / `readFloat`
    pub fn with_input<I, S>(input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: input.into_iter().map(Into::into).collect(),
            output: Vec::new(),
        }
    }

    pub fn output(&self) -> &[Output] {
        &self.output
    }

    pub fn into_output(self) -> Vec<Output> {
        self.output
    }

    fn next_token(&mut self) -> Result<String, Trap> {
        self.input.pop_front().ok_or(Trap::InputExhausted)
    }
}

impl Host for RecordingHost {
    fn write_int(&mut self, value: i32) -> Result<(), Trap> {
        self.output.push(Output::Int(value));
        Ok(())
    }

    fn write_float(&mut self, value: f64) -> Result<(), Trap> {
        self.output.push(Output::Float(value));
        Ok(())
    }

    fn read_int(&mut self) -> Result<i32, Trap> {
        let token = self.next_token()?;
        parse_token(&token, "int")
    }

    fn read_float(&mut self) -> Result<f64, Trap> {
        let token = self.next_token()?;
        parse_token(&token, "float")
    }
}

/// Host bound to a reader and a writer, one value per line on output
pub struct StreamHost<R, W> {
    reader: R,
    writer: W,
    pending: VecDeque<String>,
}

impl<R: BufRead, W: Write> StreamHost<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: VecDeque::new(),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Next whitespace-separated token, reading more lines as needed
    fn next_token(&mut self) -> Result<String, Trap> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| Trap::Host(e.to_string()))?;
            if read == 0 {
                return Err(Trap::InputExhausted);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
    }

    fn emit(&mut self, value: Output) -> Result<(), Trap> {
        writeln!(self.writer, "{}", value).map_err(|e| Trap::Host(e.to_string()))
    }
}

impl<R: BufRead, W: Write> Host for StreamHost<R, W> {
    fn write_int(&mut self, value: i32) -> Result<(), Trap> {
        self.emit(Output::Int(value))
    }

    fn write_float(&mut self, value: f64) -> Result<(), Trap> {
        self.emit(Output::Float(value))
    }

    fn read_int(&mut self) -> Result<i32, Trap> {
        let token = self.next_token()?;
        parse_token(&token, "int")
    }

    fn read_float(&mut self) -> Result<f64, Trap> {
        let token = self.next_token()?;
        parse_token(&token, "float")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_host_reads_in_order() {
        let mut host = RecordingHost::with_input(["4", "2.5"]);
        assert_eq!(host.read_int().unwrap(), 4);
        assert_eq!(host.read_float().unwrap(), 2.5);
        assert!(matches!(host.read_int(), Err(Trap::InputExhausted)));
    }

    #[test]
    fn test_bad_token_is_reported() {
        let mut host = RecordingHost::with_input(["x"]);
        assert!(matches!(
            host.read_int(),
            Err(Trap::InvalidInput { expected: "int", .. })
        ));
    }

    #[test]
    fn test_stream_host_splits_lines() {
        let input = b"1 2\n3\n";
        let mut host = StreamHost::new(&input[..], Vec::new());
        assert_eq!(host.read_int().unwrap(), 1);
        assert_eq!(host.read_int().unwrap(), 2);
        assert_eq!(host.read_int().unwrap(), 3);
        host.write_float(0.5).unwrap();
        host.write_int(-7).unwrap();
        assert_eq!(host.into_writer(), b"0.5\n-7\n".to_vec());
    }
}
