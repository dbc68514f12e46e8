//! # Stub
//!
//! Generates the call stub for a single [`SignatureRecord`]
//!
//! A stub is entered with the target's native convention, re-pushes every argument in reverse
//! declaration order, calls through the import-table entry `ia_<name>` and returns with the
//! stack cleanup the native convention expects.

use std::fmt;
use std::io;

use iced_x86::{NasmFormatter, Register};

use crate::address::FixedAddress;
use crate::code::x86::{Line, Mnemonic, Operand};
use crate::convention::ArgumentSource;
use crate::signature::SignatureRecord;

/// Prefix of the import-table symbol each stub calls through
pub const IMPORT_PREFIX: &str = "ia_";

/// Generated stub text for one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    /// Listing lines, ending with a blank separator line
    lines: Vec<Line>,
    /// Bytes popped by the final `ret`
    stack_bytes: u32,
}

impl Stub {
    /// Lines of the stub listing
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Number of argument bytes cleaned up on return
    pub fn stack_bytes(&self) -> u32 {
        self.stack_bytes
    }

    /// Writes the listing to `sink`, one line per [`Line`]
    pub fn write_to<W: io::Write>(&self, sink: &mut W) -> io::Result<()> {
        write!(sink, "{}", self)
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formatter = NasmFormatter::new();
        for line in &self.lines {
            line.render(&mut formatter, f)?;
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Name of the import-table symbol for `name`
pub fn import_symbol(name: &str) -> String {
    format!("{}{}", IMPORT_PREFIX, name)
}

/// Generates the stub for `record`
pub fn generate(record: &SignatureRecord) -> Stub {
    let frame = Operand::Register(Register::EBP);
    let stack = Operand::Register(Register::ESP);

    let mut lines = vec![
        Line::Comment(format!("address: {}", FixedAddress(record.address))),
        Line::Label(record.name.clone()),
        Line::instruction(Mnemonic::Push, vec![frame.clone()]),
        Line::instruction(Mnemonic::Mov, vec![frame.clone(), stack.clone()]),
    ];

    let mut stack_bytes = 0;
    for (index, parameter) in record.parameters.iter().enumerate().rev() {
        let position = index as u32 + 1;
        let source = record.convention.source(position);
        let operand = match source {
            ArgumentSource::Register(register) => Operand::Register(register),
            ArgumentSource::Stack { offset } => Operand::Dword {
                base: Register::EBP,
                offset,
            },
        };
        stack_bytes += source.stack_bytes();
        lines.push(Line::push_annotated(
            operand,
            format!("arg_{} ({})", position, parameter),
        ));
    }

    // the trailing `push ebp` is part of the patched image's stub format
    lines.extend([
        Line::instruction(Mnemonic::Call, vec![Operand::Symbol(import_symbol(&record.name))]),
        Line::instruction(Mnemonic::Mov, vec![stack, frame.clone()]),
        Line::instruction(Mnemonic::Push, vec![frame]),
        Line::instruction(Mnemonic::Ret, vec![Operand::Immediate(stack_bytes)]),
        Line::Blank,
    ]);

    Stub { lines, stack_bytes }
}
