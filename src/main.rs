//! Imp Compiler CLI
//!
//! Main entry point for the `impc` command.

use clap::{Parser, Subcommand};
use impc::{CompileError, Options, SourceFile};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "impc")]
#[command(author = "Demetrios Chiuratto Agourakis, Dionisio Chiuratto Agourakis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler from the Imp teaching language to WebAssembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// How compile errors are printed
    #[arg(long, value_enum, global = true, default_value = "fancy")]
    message_format: MessageFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an Imp source file to a .wasm module
    Compile {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to the input with a .wasm extension)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print an intermediate form instead of writing the module
        #[arg(long, value_enum)]
        emit: Option<EmitType>,

        /// Leave out the `name` custom section
        #[arg(long)]
        no_names: bool,
    },

    /// Check an Imp source file without generating code
    Check {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Show where each array is placed in linear memory
        #[arg(long)]
        show_layout: bool,
    },

    /// Compile and run a program, reading input from stdin
    Run {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Stop after executing this many instructions
        #[arg(long, value_name = "N")]
        fuel: Option<u64>,
    },

    /// Show information about the compiler
    Info,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitType {
    /// Token stream (JSON)
    Tokens,
    /// Abstract Syntax Tree (JSON)
    Ast,
    /// Typed HIR (JSON)
    Hir,
    /// WebAssembly text format
    Wat,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum MessageFormat {
    /// Rich report with a source snippet
    Fancy,
    /// `<line>:<message>` on stderr
    Plain,
}

/// A compile error already rendered in wire format
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{0}")]
struct WireError(String);

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let format = cli.message_format;
    let outcome = match cli.command {
        Commands::Compile {
            input,
            output,
            emit,
            no_names,
        } => compile(&input, output.as_deref(), emit, no_names, format),

        Commands::Check { input, show_layout } => check(&input, show_layout, format),

        Commands::Run { input, fuel } => run(&input, fuel, format),

        Commands::Info => info(),
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(report) => match report.downcast_ref::<WireError>() {
            Some(wire) => {
                eprintln!("{}", wire);
                Ok(ExitCode::FAILURE)
            }
            None => Err(report),
        },
    }
}

fn read_source(input: &Path) -> Result<SourceFile> {
    let content = std::fs::read_to_string(input)
        .map_err(|e| miette::miette!("Failed to read input file: {}", e))?;
    Ok(SourceFile::new(input.to_string_lossy().to_string(), content))
}

/// Turn a compile error into a report in the requested format
fn report(err: CompileError, source: &SourceFile, format: MessageFormat) -> miette::Report {
    match format {
        MessageFormat::Fancy => miette::Report::new(err).with_source_code(source.to_named_source()),
        MessageFormat::Plain => miette::Report::new(WireError(err.wire_format())),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| miette::miette!("Failed to serialize: {}", e))
}

fn compile(
    input: &Path,
    output: Option<&Path>,
    emit: Option<EmitType>,
    no_names: bool,
    format: MessageFormat,
) -> Result<()> {
    tracing::info!("Compiling {:?}", input);

    let source = read_source(input)?;
    let text = &source.content;

    // Handle emit options
    if let Some(emit_type) = emit {
        let printed = match emit_type {
            EmitType::Tokens => {
                let tokens = impc::lexer::lex(text).map_err(|e| report(e, &source, format))?;
                to_json(&tokens)?
            }
            EmitType::Ast => {
                let ast = impc::parse(text).map_err(|e| report(e, &source, format))?;
                to_json(&ast)?
            }
            EmitType::Hir => {
                let program = impc::check(text).map_err(|e| report(e, &source, format))?;
                to_json(&program)?
            }
            EmitType::Wat => {
                let options = Options {
                    debug_names: !no_names,
                };
                impc::compile_with(text, &options)
                    .map_err(|e| report(e, &source, format))?
                    .disassemble()
            }
        };
        println!("{}", printed);
        return Ok(());
    }

    let options = Options {
        debug_names: !no_names,
    };
    let module = impc::compile_with(text, &options).map_err(|e| report(e, &source, format))?;

    let output_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("wasm"));
    std::fs::write(&output_path, module.bytes())
        .map_err(|e| miette::miette!("Failed to write {}: {}", output_path.display(), e))?;

    tracing::debug!("Wrote {} bytes", module.bytes().len());
    println!(
        "Compiled {} -> {} ({} bytes)",
        input.display(),
        output_path.display(),
        module.bytes().len()
    );
    Ok(())
}

fn check(input: &Path, show_layout: bool, format: MessageFormat) -> Result<()> {
    tracing::info!("Checking {:?}", input);

    let source = read_source(input)?;
    let program = impc::check(&source.content).map_err(|e| report(e, &source, format))?;

    if show_layout {
        let layout = impc::MemoryLayout::new(&program.arrays);
        println!("=== Memory Layout ===");
        for slot in &layout.arrays {
            println!(
                "  {:<12} {:<5} [{}]  offset {:>8}  bytes {}",
                slot.name, slot.elem, slot.len, slot.offset, slot.byte_len
            );
        }
        println!("Total: {} bytes, {} page(s)", layout.total_bytes, layout.pages());
        println!();
    }

    println!(
        "All checks passed: {} ({} routines, {} arrays)",
        input.display(),
        program.routines.len(),
        program.arrays.len()
    );
    Ok(())
}

fn run(input: &Path, fuel: Option<u64>, format: MessageFormat) -> Result<()> {
    tracing::info!("Running {:?}", input);

    let source = read_source(input)?;
    let module = impc::compile(&source.content).map_err(|e| report(e, &source, format))?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut host = impc::interp::StreamHost::new(stdin.lock(), stdout.lock());
    let mut machine = impc::interp::Machine::new(module.module())?;
    if let Some(fuel) = fuel {
        machine = machine.with_fuel(fuel);
    }
    machine.invoke_export("main", &[], &mut host)?;

    use std::io::Write;
    host.into_writer().flush().into_diagnostic()?;
    Ok(())
}

fn info() -> Result<()> {
    println!("Imp Compiler");
    println!("Version: {}", impc::VERSION);
    println!();
    println!("Target: WebAssembly 1.0 binary module");
    println!();
    println!("Host imports (module \"imports\"):");
    for host in impc::codegen::HostImport::ALL {
        println!(
            "  {:>2}  {:<10} {}",
            host.func_index(),
            host.field(),
            host.func_type()
        );
    }
    println!();
    println!("Exports:");
    println!("  main  (func)");

    Ok(())
}
