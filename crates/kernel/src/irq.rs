//! Interrupt codes and the trap return hint.

use serde::{Deserialize, Serialize};

use crate::hal::Word;

/// Interrupt cause, as delivered by the CPU in the A register on trap
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Irq {
    /// One-shot interrupt raised when the CPU initializes.
    Reset,
    /// The CPU detected an error in user code.
    CpuFault,
    /// A user program executed the system-call instruction.
    SystemCall,
    /// The clock countdown expired.
    Timer,
}

impl Irq {
    pub fn from_word(code: Word) -> Option<Self> {
        match code {
            0 => Some(Irq::Reset),
            1 => Some(Irq::CpuFault),
            2 => Some(Irq::SystemCall),
            3 => Some(Irq::Timer),
            _ => None,
        }
    }

    pub fn to_word(self) -> Word {
        match self {
            Irq::Reset => 0,
            Irq::CpuFault => 1,
            Irq::SystemCall => 2,
            Irq::Timer => 3,
        }
    }
}

/// What the trap stub should do after the kernel returns.
///
/// The word form is placed in the A register by the CHAMAC-style call; the
/// stub resumes into user mode on 0 and parks the CPU until the next
/// interrupt on 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeHint {
    /// Restore the dispatched process and return to user mode.
    Resume,
    /// Nothing runnable (or the kernel is wedged); halt until the next
    /// interrupt.
    Halt,
}

impl ResumeHint {
    pub fn to_word(self) -> Word {
        match self {
            ResumeHint::Resume => 0,
            ResumeHint::Halt => 1,
        }
    }

    pub fn is_halt(self) -> bool {
        matches!(self, ResumeHint::Halt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_word_round_trip() {
        for code in 0..4 {
            assert_eq!(Irq::from_word(code).unwrap().to_word(), code);
        }
        assert_eq!(Irq::from_word(9), None);
    }
}
