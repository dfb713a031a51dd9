//! Kernel activity counters.

use serde::Serialize;

/// Monotonic counters accumulated since boot. Diagnostics only; nothing in
/// the kernel reads them back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KernelMetrics {
    /// Traps handled, of any kind.
    pub irqs_handled: u64,
    /// System-call traps, including unknown ids.
    pub syscalls: u64,
    /// Processes created by reset or spawn.
    pub processes_created: u64,
    /// Quantum-expiry preemptions.
    pub preemptions: u64,
    /// Blocked processes released by the pending sweep.
    pub sweep_unblocks: u64,
    /// User processes killed by a CPU fault.
    pub cpu_faults: u64,
}
