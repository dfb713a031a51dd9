//! Hardware abstraction layer: the simulated machine as seen by the kernel.
//!
//! The kernel never talks to the CPU, memory, devices or the program loader
//! directly; it goes through the collaborator traits defined here. The
//! simulated CPU is the inverse case: it calls *into* the kernel on every
//! trap (see [`crate::Kernel::handle_trap`]), so it has no trait of its own.
//!
//! All traits are object-safe so a collaborator can be handed around as
//! `&mut dyn Memory` where needed (the program loader writes the loaded
//! image through the kernel's memory).

pub mod layout;
pub mod mock;

use thiserror::Error;

/// Machine word. The simulated machine is word-addressable and every
/// register, memory cell and device register holds one of these.
pub type Word = i32;

/// Memory address (word index).
pub type Addr = usize;

/// Device number on the I/O bus.
pub type Device = usize;

/// A failed load or store on the simulated memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory access fault at address {addr}")]
pub struct MemoryFault {
    pub addr: Addr,
}

/// A failed access to a device register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("device access fault on device {device}")]
pub struct DeviceFault {
    pub device: Device,
}

/// Program image load failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// No executable image with this name.
    #[error("program '{0}' not found")]
    NotFound(String),
    /// The image exists but could not be written to memory.
    #[error("program image write failed: {0}")]
    Memory(#[from] MemoryFault),
}

/// Word-addressable memory, no protection.
pub trait Memory {
    fn read(&self, addr: Addr) -> Result<Word, MemoryFault>;
    fn write(&mut self, addr: Addr, value: Word) -> Result<(), MemoryFault>;
}

/// The I/O bus. Reads may have side effects (reading a keyboard data
/// register consumes the pending byte), hence `&mut self`.
pub trait IoBus {
    fn read(&mut self, device: Device) -> Result<Word, DeviceFault>;
    fn write(&mut self, device: Device, value: Word) -> Result<(), DeviceFault>;
}

/// The program loader. `load` reads the named executable image, writes it
/// into memory at the image's fixed load address, and returns that address.
pub trait ProgramLoader {
    fn load(&mut self, name: &str, mem: &mut dyn Memory) -> Result<Addr, LoadError>;
}
