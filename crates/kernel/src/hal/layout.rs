//! Fixed machine layout: trap-spill memory cells and device numbers.
//!
//! These addresses are a contract with the assembly trap stub and the I/O
//! simulator. The stub spills the CPU registers into the `IRQ_END_*` cells
//! before trapping into the kernel and restores them from the same cells on
//! return, so both sides must agree on the numbering.

use super::{Addr, Device, Word};

// Register spill cells written by the trap stub on interrupt entry.
pub const IRQ_END_PC: Addr = 0;
pub const IRQ_END_A: Addr = 1;
pub const IRQ_END_X: Addr = 2;
pub const IRQ_END_ERROR: Addr = 3;
pub const IRQ_END_COMPLEMENT: Addr = 4;
pub const IRQ_END_MODE: Addr = 5;

/// Address the trap-stub program must be loaded at.
pub const IRQ_END_TRATADOR: Addr = 10;

/// CPU mode words as stored in the mode register cell.
pub const MODE_SUPERVISOR: Word = 0;
pub const MODE_USER: Word = 1;

// Terminal block: port i occupies the 4-device stride starting at 4*i.
pub const D_TERM_A_TECLADO: Device = 0;
pub const D_TERM_A_TECLADO_OK: Device = 1;
pub const D_TERM_A_TELA: Device = 2;
pub const D_TERM_A_TELA_OK: Device = 3;
pub const TERM_STRIDE: usize = 4;

// Clock, above the terminal block. Writing `D_RELOGIO_TIMER` reloads the
// countdown; writing 0 to `D_RELOGIO_INTERRUPCAO` acknowledges the IRQ.
pub const D_RELOGIO_TIMER: Device = 40;
pub const D_RELOGIO_INTERRUPCAO: Device = 41;

/// Keyboard data device for terminal port `index`.
pub fn keyboard_device(index: usize) -> Device {
    D_TERM_A_TECLADO + TERM_STRIDE * index
}

/// Keyboard status device for terminal port `index`. Nonzero iff a byte is
/// waiting.
pub fn keyboard_status_device(index: usize) -> Device {
    D_TERM_A_TECLADO_OK + TERM_STRIDE * index
}

/// Screen data device for terminal port `index`.
pub fn screen_device(index: usize) -> Device {
    D_TERM_A_TELA + TERM_STRIDE * index
}

/// Screen status device for terminal port `index`. Nonzero iff the screen
/// accepts a byte.
pub fn screen_status_device(index: usize) -> Device {
    D_TERM_A_TELA_OK + TERM_STRIDE * index
}
