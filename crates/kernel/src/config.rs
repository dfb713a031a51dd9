//! Kernel construction parameters.

use serde::{Deserialize, Serialize};

use crate::hal::{Addr, Word};

fn default_max_processes() -> usize {
    4
}

fn default_quantum() -> i32 {
    5
}

fn default_interrupt_interval() -> Word {
    50
}

fn default_init_program() -> String {
    "init.maq".to_owned()
}

fn default_trap_stub_program() -> String {
    "trata_int.maq".to_owned()
}

fn default_init_load_address() -> Addr {
    100
}

/// Tunables fixed at kernel construction.
///
/// Every field has a serde default, so a partial (or empty) configuration
/// document deserializes into a usable kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Process table size; also the number of terminal ports.
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,

    /// Timer ticks a process may run before preemption.
    #[serde(default = "default_quantum")]
    pub quantum: i32,

    /// Clock countdown programmed at boot and on every timer IRQ, in
    /// executed instructions.
    #[serde(default = "default_interrupt_interval")]
    pub interrupt_interval: Word,

    /// Executable image spawned as process 0 on reset.
    #[serde(default = "default_init_program")]
    pub init_program: String,

    /// Executable image holding the interrupt trap stub.
    #[serde(default = "default_trap_stub_program")]
    pub trap_stub_program: String,

    /// Address the init image must load at.
    #[serde(default = "default_init_load_address")]
    pub init_load_address: Addr,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_processes: default_max_processes(),
            quantum: default_quantum(),
            interrupt_interval: default_interrupt_interval(),
            init_program: default_init_program(),
            trap_stub_program: default_trap_stub_program(),
            init_load_address: default_init_load_address(),
        }
    }
}
