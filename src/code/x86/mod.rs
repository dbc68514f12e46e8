//! # x86
//!
//! The handful of 32-bit x86 instructions a call stub is made of, rendered as a NASM listing
//!
//! Listing layout, which downstream tooling parses:
//! - two spaces of indentation, then the mnemonic padded to 8 columns
//! - annotated register operands padded to 20 columns before `; `
//! - annotated memory operands followed by four spaces before `; `

use std::fmt::{self, Write};

use iced_x86::{Formatter, NasmFormatter, Register};

/// Indentation of instruction lines
const INDENT: &str = "  ";
/// Width of the mnemonic column
const MNEMONIC_WIDTH: usize = 8;
/// Width of an annotated register operand
const REGISTER_OPERAND_WIDTH: usize = 20;
/// Gap between an annotated memory operand and its annotation
const MEMORY_ANNOTATION_GAP: &str = "    ";

/// Instruction mnemonics used by stubs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    /// `push`
    Push,
    /// `mov`
    Mov,
    /// `call`
    Call,
    /// `ret`
    Ret,
}

impl Mnemonic {
    /// Lowercase NASM spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Mnemonic::Push => "push",
            Mnemonic::Mov => "mov",
            Mnemonic::Call => "call",
            Mnemonic::Ret => "ret",
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// General purpose register
    Register(Register),
    /// 32-bit memory operand at `[base + offset]`
    Dword {
        /// Base register
        base: Register,
        /// Displacement in bytes
        offset: u32,
    },
    /// Memory operand addressed by a symbol, `[symbol]`
    Symbol(String),
    /// Unsigned immediate, printed in decimal
    Immediate(u32),
}

/// Single line of a stub listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `; text`
    Comment(String),
    /// `name:`
    Label(String),
    /// Indented instruction with an optional trailing annotation
    Instruction {
        /// Instruction mnemonic
        mnemonic: Mnemonic,
        /// Operands in NASM (destination first) order
        operands: Vec<Operand>,
        /// Comment placed after the operands
        annotation: Option<String>,
    },
    /// Empty line
    Blank,
}

impl Line {
    /// Creates an instruction line without an annotation
    pub fn instruction(mnemonic: Mnemonic, operands: Vec<Operand>) -> Self {
        Line::Instruction {
            mnemonic,
            operands,
            annotation: None,
        }
    }

    /// Creates an annotated `push`
    pub fn push_annotated(operand: Operand, annotation: String) -> Self {
        Line::Instruction {
            mnemonic: Mnemonic::Push,
            operands: vec![operand],
            annotation: Some(annotation),
        }
    }

    /// Writes the line, without a line terminator, to `out`
    pub fn render<W: Write>(&self, formatter: &mut NasmFormatter, out: &mut W) -> fmt::Result {
        match self {
            Line::Comment(text) => write!(out, "; {}", text),
            Line::Label(name) => write!(out, "{}:", name),
            Line::Blank => Ok(()),
            Line::Instruction {
                mnemonic,
                operands,
                annotation,
            } => {
                let mut text = String::new();
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        text.push_str(", ");
                    }
                    render_operand(formatter, operand, &mut text)?;
                }
                write!(out, "{}{:<width$}", INDENT, mnemonic.as_str(), width = MNEMONIC_WIDTH)?;
                match annotation {
                    None => out.write_str(&text),
                    Some(annotation) => match operands.last() {
                        Some(Operand::Register(_)) => write!(
                            out,
                            "{:<width$}; {}",
                            text,
                            annotation,
                            width = REGISTER_OPERAND_WIDTH
                        ),
                        _ => write!(out, "{}{}; {}", text, MEMORY_ANNOTATION_GAP, annotation),
                    },
                }
            }
        }
    }
}

/// Appends the NASM spelling of an operand to `out`
fn render_operand(
    formatter: &mut NasmFormatter,
    operand: &Operand,
    out: &mut String,
) -> fmt::Result {
    match operand {
        Operand::Register(register) => out.write_str(formatter.format_register(*register)),
        Operand::Dword { base, offset } => write!(
            out,
            "DWORD [{} + {}]",
            formatter.format_register(*base),
            offset
        ),
        Operand::Symbol(symbol) => write!(out, "[{}]", symbol),
        Operand::Immediate(value) => write!(out, "{}", value),
    }
}
