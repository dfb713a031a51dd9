//! Deterministic machine harness around the kernel and its test doubles.
//!
//! The harness plays the part of the simulated CPU and trap stub: it
//! spills "user" register values into the fixed memory cells, delivers
//! interrupts, and keeps handles on the collaborator doubles so tests can
//! script devices and inspect the outcome.

use minikernel::hal::layout::{IRQ_END_A, IRQ_END_ERROR, IRQ_END_X};
use minikernel::hal::mock::{SimIoBus, SimLoader, SimMemory};
use minikernel::hal::{Addr, Word};
use minikernel::process::Pid;
use minikernel::{Irq, Kernel, KernelConfig, ResumeHint};

/// Load address used for the stock child image.
pub const CHILD_LOAD_ADDR: Addr = 300;

/// Where [`Machine::new`] places the NUL-terminated name `"child.maq"` in
/// simulated memory, ready to be passed to the spawn syscall.
pub const CHILD_NAME_ADDR: Addr = 500;

pub struct Machine {
    pub mem: SimMemory,
    pub io: SimIoBus,
    pub loader: SimLoader,
    pub kernel: Kernel<SimMemory, SimIoBus, SimLoader>,
}

impl Machine {
    /// A machine with the boot images, one spawnable `"child.maq"` image
    /// and its name string already in place. Not yet booted.
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let mem = SimMemory::new();
        let io = SimIoBus::new(config.max_processes);
        let loader = SimLoader::with_boot_images(config.init_load_address);
        loader.add_image("child.maq", CHILD_LOAD_ADDR, vec![0; 4]);
        mem.poke_str(CHILD_NAME_ADDR, "child.maq");
        let kernel = Kernel::new(mem.clone(), io.clone(), loader.clone(), config);
        Self {
            mem,
            io,
            loader,
            kernel,
        }
    }

    /// Deliver the one-shot reset interrupt.
    pub fn boot(&mut self) -> ResumeHint {
        self.trap(Irq::Reset)
    }

    pub fn trap(&mut self, irq: Irq) -> ResumeHint {
        self.kernel.handle_trap(irq.to_word())
    }

    /// One clock interrupt.
    pub fn tick(&mut self) -> ResumeHint {
        self.trap(Irq::Timer)
    }

    /// Deliver `count` clock interrupts, returning the last hint.
    pub fn ticks(&mut self, count: usize) -> ResumeHint {
        let mut hint = ResumeHint::Halt;
        for _ in 0..count {
            hint = self.tick();
        }
        hint
    }

    /// Emulate the current process issuing a system call: load A and X
    /// into the spill cells the way the trap stub would, then trap.
    pub fn syscall(&mut self, id: Word, x: Word) -> ResumeHint {
        self.mem.poke(IRQ_END_A, id);
        self.mem.poke(IRQ_END_X, x);
        self.trap(Irq::SystemCall)
    }

    /// Emulate the current process faulting with the given error code.
    pub fn fault(&mut self, code: Word) -> ResumeHint {
        self.mem.poke(IRQ_END_ERROR, code);
        self.trap(Irq::CpuFault)
    }

    /// Spawn the stock child image from the current process and return
    /// the pid the syscall handed back (−1 on failure).
    pub fn spawn_child(&mut self) -> Word {
        self.syscall(minikernel::syscall::SYS_SPAWN, CHILD_NAME_ADDR as Word);
        match self.kernel.current_slot() {
            Some(slot) => self.kernel.processes().slot(slot).regs.a,
            None => -1,
        }
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.kernel
            .current_slot()
            .map(|slot| self.kernel.processes().slot(slot).pid)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
