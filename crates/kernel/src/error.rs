//! Kernel-internal error type.
//!
//! Everything here is fatal to the machine: once one of these is recorded
//! the kernel stops dispatching and answers every trap with a halt hint.
//! User-visible failures (a syscall returning −1) never appear here.

use thiserror::Error;

use crate::hal::{Addr, DeviceFault, LoadError, MemoryFault, Word};
use crate::port::PortError;
use crate::process::Pid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error(transparent)]
    Memory(#[from] MemoryFault),

    #[error(transparent)]
    Device(#[from] DeviceFault),

    #[error("program load failed: {0}")]
    Load(#[from] LoadError),

    #[error("trap stub loaded at {at} instead of its fixed address")]
    TrapStubMisplaced { at: Addr },

    #[error("init program loaded at {at}, expected {expected}")]
    InitMisplaced { at: Addr, expected: Addr },

    #[error("terminal port pool exhausted")]
    PortsExhausted,

    #[error("process table has no free slot")]
    ProcessTableFull,

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("unknown interrupt code {0}")]
    UnknownInterrupt(Word),

    #[error("cpu fault delivered with no running process")]
    FaultOutsideProcess,

    #[error("process {pid} has no terminal port")]
    MissingPort { pid: Pid },
}
