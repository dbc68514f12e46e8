//! # Convention
//!
//! This module describes where each argument of a 32-bit x86 function lives on entry
//!
//! Arguments are always a single 32-bit word; position `1` is the leftmost declared argument.
//! A stub reads every argument from the place its convention put it and re-pushes it for the
//! import-table call, so the only per-convention knowledge needed is:
//! - which argument positions arrive in registers
//! - where the remaining positions sit relative to the frame pointer
//! - how many bytes the callee is responsible for popping

use iced_x86::Register;

/// Size in bytes of a single argument slot
pub const SLOT_SIZE: u32 = 4;

/// Registers used by [`CallingConvention::RegisterFast`] for the first two arguments, in order
pub const FASTCALL_REGISTERS: [Register; 2] = [Register::ECX, Register::EDX];

/// Calling conventions understood by the stub generator
///
/// Adding a convention means adding a variant here and an arm in [`CallingConvention::source`];
/// the rest of stub generation is convention agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// The first two arguments are passed in ECX and EDX, the others are passed on the stack.
    ///
    /// - TargetRegisters:    ECX, EDX
    /// - Cleanup:            Callee
    RegisterFast,
    /// Every argument is passed on the stack.
    ///
    /// - TargetRegisters:    N/A
    /// - Cleanup:            Callee (the stub pops what it read)
    #[default]
    Default,
}

/// Location of an argument when the stub is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    /// Argument is held in a register
    Register(Register),
    /// Argument is in the caller's stack slot at `[ebp + offset]`
    Stack {
        /// Byte offset from the frame pointer
        offset: u32,
    },
}

impl ArgumentSource {
    /// Number of stack bytes the stub must clean up for an argument read from here
    pub fn stack_bytes(&self) -> u32 {
        match self {
            ArgumentSource::Register(_) => 0,
            ArgumentSource::Stack { .. } => SLOT_SIZE,
        }
    }
}

impl CallingConvention {
    /// Returns where the argument at 1-based `position` is found
    ///
    /// Stack slots are addressed at `4 * (position - 1)` above the frame pointer.
    ///
    /// # Panics
    ///
    /// Panics if `position` is `0`
    pub fn source(self, position: u32) -> ArgumentSource {
        assert!(position > 0, "argument positions start at 1");
        match self {
            CallingConvention::RegisterFast => match position {
                1 | 2 => ArgumentSource::Register(FASTCALL_REGISTERS[position as usize - 1]),
                _ => stack_slot(position),
            },
            CallingConvention::Default => stack_slot(position),
        }
    }

    /// Total number of bytes the stub pops on return for a function of the given arity
    pub fn stack_bytes(self, arity: u32) -> u32 {
        (1..=arity).map(|position| self.source(position).stack_bytes()).sum()
    }
}

/// Stack slot of the argument at 1-based `position`
fn stack_slot(position: u32) -> ArgumentSource {
    ArgumentSource::Stack {
        offset: SLOT_SIZE * (position - 1),
    }
}

#[cfg(test)]
mod tests {
    use iced_x86::Register;

    use super::{ArgumentSource, CallingConvention};

    #[test]
    /// The first two fastcall arguments come from ecx and edx, the rest from the stack
    fn test_register_fast_sources() {
        let cc = CallingConvention::RegisterFast;
        assert_eq!(cc.source(1), ArgumentSource::Register(Register::ECX));
        assert_eq!(cc.source(2), ArgumentSource::Register(Register::EDX));
        assert_eq!(cc.source(3), ArgumentSource::Stack { offset: 8 });
        assert_eq!(cc.source(7), ArgumentSource::Stack { offset: 24 });
    }

    #[test]
    /// Default arguments always come from the stack
    fn test_default_sources() {
        let cc = CallingConvention::Default;
        assert_eq!(cc.source(1), ArgumentSource::Stack { offset: 0 });
        assert_eq!(cc.source(2), ArgumentSource::Stack { offset: 4 });
        assert_eq!(cc.source(3), ArgumentSource::Stack { offset: 8 });
    }

    #[test]
    /// Cleanup size for every arity up to a reasonable bound
    fn test_stack_bytes() {
        for n in 0..32 {
            assert_eq!(CallingConvention::Default.stack_bytes(n), 4 * n);
            assert_eq!(
                CallingConvention::RegisterFast.stack_bytes(n),
                4 * n.saturating_sub(2)
            );
        }
    }

    #[test]
    #[should_panic]
    /// Position zero does not name an argument
    fn test_position_zero() {
        CallingConvention::Default.source(0);
    }
}
