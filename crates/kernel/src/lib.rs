//! Teaching-grade operating system kernel for a simulated single-core
//! machine.
//!
//! The kernel multiplexes the simulated CPU across a small fixed table of
//! processes, exposes a five-call system surface (read, write, spawn,
//! kill, wait), schedules with a preemptive quantum, and manages terminal
//! ports as an allocatable resource. The machine itself — CPU, memory,
//! I/O devices, program loader — lives behind the [`hal`] traits; the
//! simulated CPU drives the kernel by calling [`Kernel::handle_trap`] on
//! every interrupt.
//!
//! ```no_run
//! use minikernel::hal::mock::{SimIoBus, SimLoader, SimMemory};
//! use minikernel::{Irq, Kernel, KernelConfig};
//!
//! let config = KernelConfig::default();
//! let io = SimIoBus::new(config.max_processes);
//! let loader = SimLoader::with_boot_images(config.init_load_address);
//! let mut kernel = Kernel::new(SimMemory::new(), io, loader, config);
//! let hint = kernel.handle_trap(Irq::Reset.to_word());
//! assert!(!hint.is_halt());
//! ```

pub mod config;
pub mod error;
pub mod hal;
pub mod irq;
pub mod kernel;
pub mod metrics;
pub mod port;
pub mod process;
pub mod sched;
pub mod syscall;

pub use config::KernelConfig;
pub use error::KernelError;
pub use irq::{Irq, ResumeHint};
pub use kernel::Kernel;
pub use metrics::KernelMetrics;
