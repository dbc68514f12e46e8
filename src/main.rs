//! Command line front end: reads a source file and prints a stub for every fixed-address function

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use lexopt::prelude::*;

use sigstub::emit::emit_stubs;
use sigstub::extract::Declarations;

/// Usage line shown on usage errors
const USAGE: &str = "Usage: sigstub [OPTION]... FILE";

/// Parsed command line
struct Args {
    /// Source file to read declarations from
    input: PathBuf,
    /// Output file, stdout if absent
    output: Option<PathBuf>,
}

/// Prints the full help text
fn print_help() {
    println!("{}", USAGE);
    println!();
    println!("Generate x86 call stubs for functions declared in a fixed-address section");
    println!("(__attribute__((section(\".text.0xADDR\")))).");
    println!();
    println!("Flags:");
    println!("  -o, --out FILE    write stubs to FILE instead of stdout");
    println!("  -h, --help        print this help");
}

/// What the command line asks for
enum Invocation {
    /// Print the help text
    Help,
    /// Generate stubs
    Run(Args),
}

/// Parses the command line arguments following the program name
///
/// A single input file is accepted; further positional arguments are usage errors.
fn parse_args<I>(args: I) -> Result<Invocation>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let mut parser = lexopt::Parser::from_args(args);
    let mut input: Option<OsString> = None;
    let mut output: Option<OsString> = None;
    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => return Ok(Invocation::Help),
            Short('o') | Long("out") => output = Some(parser.value()?),
            Value(value) if input.is_none() => input = Some(value),
            _ => return Err(arg.unexpected().into()),
        }
    }
    let input = input.ok_or_else(|| anyhow!("no input file given"))?;
    Ok(Invocation::Run(Args {
        input: input.into(),
        output: output.map(Into::into),
    }))
}

/// Runs the tool with parsed arguments
fn run(args: &Args) -> Result<()> {
    // non-UTF-8 bytes are replaced, not rejected
    let bytes = fs::read(&args.input)
        .with_context(|| format!("unable to read file '{}'", args.input.display()))?;
    let source = String::from_utf8_lossy(&bytes);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("unable to create output file '{}'", path.display())
        })?)),
        None => Box::new(io::stdout().lock()),
    };
    let mut diagnostics = io::stderr().lock();
    emit_stubs(Declarations::new(&source), &mut out, &mut diagnostics)?;
    Ok(())
}

fn main() {
    let args = match parse_args(std::env::args_os().skip(1)) {
        Ok(Invocation::Help) => {
            print_help();
            return;
        }
        Ok(Invocation::Run(args)) => args,
        Err(e) => {
            eprintln!("{:#}", e);
            eprintln!("{}", USAGE);
            process::exit(-1);
        }
    };
    if let Err(e) = run(&args) {
        eprintln!("{:#}", e);
        process::exit(-1);
    }
}
