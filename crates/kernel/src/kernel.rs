//! The kernel control loop.
//!
//! A single entry point, [`Kernel::handle_trap`], runs a fixed four-phase
//! cycle on every interrupt: save the interrupted process's registers,
//! service the interrupt, sweep blocked processes for ones that can now
//! make progress, then schedule and dispatch the next process. The kernel
//! runs to completion between traps; there is no other way in.
//!
//! Construction mirrors machine bring-up: the trap stub is loaded at its
//! fixed address and the clock is programmed before the first interrupt
//! can arrive. Failures at any point set a sticky internal error that
//! turns every later dispatch into a halt.

use log::{debug, error, info, trace, warn};

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::hal::layout::{
    D_RELOGIO_INTERRUPCAO, D_RELOGIO_TIMER, IRQ_END_A, IRQ_END_COMPLEMENT, IRQ_END_ERROR,
    IRQ_END_MODE, IRQ_END_PC, IRQ_END_TRATADOR, IRQ_END_X,
};
use crate::hal::{Addr, IoBus, LoadError, Memory, MemoryFault, ProgramLoader, Word};
use crate::irq::{Irq, ResumeHint};
use crate::metrics::KernelMetrics;
use crate::port::PortPool;
use crate::process::{BlockReason, Pid, ProcessState, ProcessTable, RegisterFile, DEFAULT_PRIORITY};
use crate::sched::Scheduler;

pub struct Kernel<M, I, L> {
    pub(crate) mem: M,
    pub(crate) io: I,
    pub(crate) loader: L,
    pub(crate) config: KernelConfig,
    pub(crate) table: ProcessTable,
    pub(crate) ports: PortPool,
    pub(crate) sched: Scheduler,
    /// Slot of the process owning the CPU; `None` iff nothing is running.
    pub(crate) current: Option<usize>,
    /// Sticky first internal error; set once, never cleared.
    pub(crate) internal_error: Option<KernelError>,
    pub(crate) metrics: KernelMetrics,
}

impl<M: Memory, I: IoBus, L: ProgramLoader> Kernel<M, I, L> {
    /// Bring the kernel up on an idle machine: empty process table, full
    /// port pool, trap stub in place, clock armed. The first trap the
    /// harness should deliver is the reset IRQ.
    pub fn new(mem: M, io: I, loader: L, config: KernelConfig) -> Self {
        let mut kernel = Self {
            table: ProcessTable::new(config.max_processes),
            ports: PortPool::new(config.max_processes),
            sched: Scheduler::new(config.quantum),
            current: None,
            internal_error: None,
            metrics: KernelMetrics::default(),
            mem,
            io,
            loader,
            config,
        };
        kernel.install_trap_stub();
        kernel.program_clock();
        kernel
    }

    /// Entry point for every interrupt. The trap stub has already spilled
    /// the CPU registers into the `IRQ_END_*` cells; the returned hint
    /// tells it whether to restore and resume user code or park the CPU.
    pub fn handle_trap(&mut self, irq_code: Word) -> ResumeHint {
        self.metrics.irqs_handled += 1;
        trace!("trap entry, irq code {irq_code}");
        self.save_cpu_state();
        match Irq::from_word(irq_code) {
            Some(Irq::Reset) => self.handle_reset(),
            Some(Irq::CpuFault) => self.handle_cpu_fault(),
            Some(Irq::SystemCall) => self.handle_syscall(),
            Some(Irq::Timer) => self.handle_timer(),
            None => {
                warn!("interrupt code {irq_code} has no handler");
                self.fail(KernelError::UnknownInterrupt(irq_code));
            }
        }
        self.sweep_pending();
        self.schedule();
        self.dispatch()
    }

    // Read-only views for harnesses, tests and diagnostics.

    pub fn processes(&self) -> &ProcessTable {
        &self.table
    }

    pub fn ports(&self) -> &PortPool {
        &self.ports
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub fn internal_error(&self) -> Option<&KernelError> {
        self.internal_error.as_ref()
    }

    pub fn metrics(&self) -> &KernelMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // Boot.

    fn install_trap_stub(&mut self) {
        let name = self.config.trap_stub_program.clone();
        match self.load_program(&name) {
            Ok(addr) if addr == IRQ_END_TRATADOR => {}
            Ok(addr) => self.fail(KernelError::TrapStubMisplaced { at: addr }),
            Err(e) => self.fail(e.into()),
        }
    }

    fn program_clock(&mut self) {
        if let Err(e) = self.io.write(D_RELOGIO_TIMER, self.config.interrupt_interval) {
            self.fail(e.into());
        }
    }

    // Phase 1: save.

    /// Copy the spilled register cells into the interrupted process's
    /// descriptor. A read failure aborts this cycle's dispatch.
    fn save_cpu_state(&mut self) {
        let Some(cur) = self.current else { return };
        if !self.table.slot(cur).is_running() {
            return;
        }
        match self.read_saved_registers() {
            Ok(regs) => self.table.slot_mut(cur).regs = regs,
            Err(fault) => self.fail(fault.into()),
        }
    }

    fn read_saved_registers(&self) -> Result<RegisterFile, MemoryFault> {
        Ok(RegisterFile {
            pc: self.mem.read(IRQ_END_PC)?,
            a: self.mem.read(IRQ_END_A)?,
            x: self.mem.read(IRQ_END_X)?,
            error: self.mem.read(IRQ_END_ERROR)?,
            complement: self.mem.read(IRQ_END_COMPLEMENT)?,
            mode: self.mem.read(IRQ_END_MODE)?,
        })
    }

    // Phase 2: interrupt service.

    /// Reset: load the init image and revive a dead slot as process 0.
    fn handle_reset(&mut self) {
        let name = self.config.init_program.clone();
        let addr = match self.load_program(&name) {
            Ok(addr) => addr,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };
        if addr != self.config.init_load_address {
            self.fail(KernelError::InitMisplaced {
                at: addr,
                expected: self.config.init_load_address,
            });
            return;
        }
        let Some(port) = self.ports.acquire() else {
            self.fail(KernelError::PortsExhausted);
            return;
        };
        match self.table.create(addr as Word, port, DEFAULT_PRIORITY) {
            Some((slot, pid)) => {
                self.sched.enqueue(slot);
                self.metrics.processes_created += 1;
                info!("init: process {pid} created on slot {slot}, port {port}");
            }
            None => {
                if let Err(e) = self.ports.release(port) {
                    self.fail(e.into());
                }
                self.fail(KernelError::ProcessTableFull);
            }
        }
    }

    /// CPU fault in user code: the offending process dies, the system
    /// carries on.
    fn handle_cpu_fault(&mut self) {
        let Some(cur) = self.current else {
            self.fail(KernelError::FaultOutsideProcess);
            return;
        };
        let p = self.table.slot(cur);
        error!(
            "pid {}: cpu fault {} (complement {}), killing process",
            p.pid, p.regs.error, p.regs.complement
        );
        self.metrics.cpu_faults += 1;
        self.terminate(cur);
    }

    /// Timer: acknowledge and re-arm the clock, account one quantum tick,
    /// preempt on exhaustion.
    fn handle_timer(&mut self) {
        let ack = self.io.write(D_RELOGIO_INTERRUPCAO, 0);
        let rearm = self.io.write(D_RELOGIO_TIMER, self.config.interrupt_interval);
        if let Err(e) = ack.and(rearm) {
            self.fail(e.into());
            return;
        }
        if !self.sched.tick() {
            return;
        }
        if let Some(cur) = self.current {
            if self.table.slot(cur).is_running() {
                debug!(
                    "quantum expired, preempting pid {}",
                    self.table.slot(cur).pid
                );
                self.table.slot_mut(cur).state = ProcessState::Ready;
                self.sched.enqueue(cur);
                self.metrics.preemptions += 1;
            }
        }
        self.current = self.sched.pop_front();
        self.sched.reset_quantum();
    }

    // Phase 3: pending sweep.

    /// Retry every blocked process's blocking condition, without letting a
    /// still-unready device re-enter the blocking path. Idempotent; runs
    /// every cycle.
    fn sweep_pending(&mut self) {
        for slot in 0..self.table.len() {
            let Some(reason) = self.table.slot(slot).block_reason() else {
                continue;
            };
            match reason {
                BlockReason::Read => self.attempt_read(slot, false),
                BlockReason::Write => self.attempt_write(slot, false),
                BlockReason::WaitPid(pid) => self.resolve_wait(slot, pid),
            }
        }
    }

    /// A waiter is released once its target is no longer among the living,
    /// including targets whose slot has already been recycled.
    fn resolve_wait(&mut self, slot: usize, target: Pid) {
        if self.table.find_live(target).is_some() {
            return;
        }
        self.table.slot_mut(slot).regs.a = 0;
        self.make_ready_if_blocked(slot);
    }

    // Phase 4: schedule.

    fn schedule(&mut self) {
        if let Some(cur) = self.current {
            let p = self.table.slot(cur);
            // Non-preemptive shortcut: a current process that is still
            // runnable keeps the CPU.
            if p.is_running() || p.is_ready() {
                return;
            }
        }
        self.sched.rebuild(&self.table);
        self.current = if self.sched.quantum_exhausted() {
            let pick = self.sched.pop_front();
            self.sched.reset_quantum();
            pick
        } else {
            let pick = Scheduler::pick_priority(&self.table);
            if let Some(slot) = pick {
                self.sched.remove(slot);
            }
            pick
        };
        match self.current {
            Some(slot) => debug!("scheduled pid {}", self.table.slot(slot).pid),
            None => debug!("no process ready to run"),
        }
    }

    // Phase 5: dispatch.

    /// Restore the chosen process's registers into the spill cells and
    /// hand the CPU back, or halt if there is nothing to run.
    fn dispatch(&mut self) -> ResumeHint {
        if let Some(err) = &self.internal_error {
            error!("dispatch suppressed, kernel wedged: {err}");
            return ResumeHint::Halt;
        }
        let Some(cur) = self.current else {
            trace!("idle, halting until next interrupt");
            return ResumeHint::Halt;
        };
        let regs = self.table.slot(cur).regs;
        if let Err(fault) = self.write_saved_registers(&regs) {
            self.fail(fault.into());
            return ResumeHint::Halt;
        }
        self.table.slot_mut(cur).state = ProcessState::Running;
        trace!("dispatching pid {}", self.table.slot(cur).pid);
        ResumeHint::Resume
    }

    fn write_saved_registers(&mut self, regs: &RegisterFile) -> Result<(), MemoryFault> {
        self.mem.write(IRQ_END_PC, regs.pc)?;
        self.mem.write(IRQ_END_A, regs.a)?;
        self.mem.write(IRQ_END_X, regs.x)?;
        self.mem.write(IRQ_END_ERROR, regs.error)?;
        self.mem.write(IRQ_END_COMPLEMENT, regs.complement)?;
        self.mem.write(IRQ_END_MODE, regs.mode)?;
        Ok(())
    }

    // Shared plumbing.

    /// Ask the loader to place `name` in memory; returns the load address.
    pub(crate) fn load_program(&mut self, name: &str) -> Result<Addr, LoadError> {
        let addr = self.loader.load(name, &mut self.mem)?;
        info!("loaded '{name}' at address {addr}");
        Ok(addr)
    }

    /// Unconditional death: port back to the pool, out of the ready queue,
    /// off the CPU.
    pub(crate) fn terminate(&mut self, slot: usize) {
        let pid = self.table.slot(slot).pid;
        if let Some(port) = self.table.slot_mut(slot).die() {
            if let Err(e) = self.ports.release(port) {
                self.fail(e.into());
            }
        }
        self.sched.remove(slot);
        if self.current == Some(slot) {
            self.current = None;
        }
        info!("process {pid} terminated");
    }

    pub(crate) fn make_ready_if_blocked(&mut self, slot: usize) {
        if self.table.slot(slot).block_reason().is_some() {
            self.table.slot_mut(slot).state = ProcessState::Ready;
            self.sched.enqueue(slot);
            self.metrics.sweep_unblocks += 1;
            debug!("pid {} unblocked", self.table.slot(slot).pid);
        }
    }

    /// Record the first internal error; the kernel stays wedged from here
    /// on.
    pub(crate) fn fail(&mut self, err: KernelError) {
        error!("kernel internal error: {err}");
        if self.internal_error.is_none() {
            self.internal_error = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{SimIoBus, SimLoader, SimMemory};

    type TestKernel = Kernel<SimMemory, SimIoBus, SimLoader>;

    fn machine() -> (TestKernel, SimMemory, SimIoBus, SimLoader) {
        let config = KernelConfig::default();
        let mem = SimMemory::new();
        let io = SimIoBus::new(config.max_processes);
        let loader = SimLoader::with_boot_images(config.init_load_address);
        let kernel = Kernel::new(mem.clone(), io.clone(), loader.clone(), config);
        (kernel, mem, io, loader)
    }

    fn booted() -> (TestKernel, SimMemory, SimIoBus, SimLoader) {
        let (mut kernel, mem, io, loader) = machine();
        assert_eq!(kernel.handle_trap(Irq::Reset.to_word()), ResumeHint::Resume);
        (kernel, mem, io, loader)
    }

    #[test]
    fn boot_programs_the_clock_and_places_the_stub() {
        let (kernel, _mem, io, loader) = machine();
        assert!(kernel.internal_error().is_none());
        assert_eq!(io.timer_reload(), kernel.config().interrupt_interval);
        assert_eq!(loader.loads(), vec!["trata_int.maq".to_owned()]);
    }

    #[test]
    fn misplaced_trap_stub_wedges_the_kernel() {
        let config = KernelConfig::default();
        let mem = SimMemory::new();
        let io = SimIoBus::new(config.max_processes);
        let loader = SimLoader::new();
        loader.add_image("trata_int.maq", 20, vec![0; 4]);
        loader.add_image("init.maq", config.init_load_address, vec![0; 8]);
        let mut kernel = Kernel::new(mem, io, loader, config);
        assert!(matches!(
            kernel.internal_error(),
            Some(KernelError::TrapStubMisplaced { at: 20 })
        ));
        assert_eq!(kernel.handle_trap(Irq::Reset.to_word()), ResumeHint::Halt);
    }

    #[test]
    fn reset_creates_and_dispatches_init() {
        let (kernel, mem, _io, loader) = booted();
        let init = kernel.processes().slot(0);
        assert_eq!(init.pid, 0);
        assert!(init.is_running());
        assert_eq!(init.port, Some(0));
        assert_eq!(kernel.current_slot(), Some(0));
        assert_eq!(kernel.ports().occupied_count(), 1);
        assert!(loader.loads().contains(&"init.maq".to_owned()));
        // Dispatch restored the fresh register file into the spill cells.
        assert_eq!(mem.peek(IRQ_END_PC), 100);
        assert_eq!(mem.peek(IRQ_END_MODE), crate::hal::layout::MODE_USER);
    }

    #[test]
    fn save_then_dispatch_round_trips_registers() {
        let (mut kernel, mem, _io, _loader) = booted();
        // User code ran for a while and trapped with these register values.
        mem.poke(IRQ_END_PC, 123);
        mem.poke(IRQ_END_A, 7);
        mem.poke(IRQ_END_X, -3);
        kernel.handle_trap(Irq::Timer.to_word());
        let p = kernel.processes().slot(0);
        assert_eq!((p.regs.pc, p.regs.a, p.regs.x), (123, 7, -3));
        // No intervening mutation: the cells read back unchanged.
        assert_eq!(mem.peek(IRQ_END_PC), 123);
        assert_eq!(mem.peek(IRQ_END_A), 7);
        assert_eq!(mem.peek(IRQ_END_X), -3);
    }

    #[test]
    fn timer_acknowledges_and_rearms_the_clock() {
        let (mut kernel, _mem, io, _loader) = booted();
        kernel.handle_trap(Irq::Timer.to_word());
        assert_eq!(io.timer_acks(), 1);
        assert_eq!(io.timer_reload(), kernel.config().interrupt_interval);
    }

    #[test]
    fn save_failure_aborts_dispatch() {
        let (mut kernel, mem, _io, _loader) = booted();
        mem.poison(IRQ_END_A);
        assert_eq!(kernel.handle_trap(Irq::Timer.to_word()), ResumeHint::Halt);
        assert!(matches!(
            kernel.internal_error(),
            Some(KernelError::Memory(_))
        ));
    }

    #[test]
    fn unknown_interrupt_code_wedges_the_kernel() {
        let (mut kernel, _mem, _io, _loader) = booted();
        assert_eq!(kernel.handle_trap(99), ResumeHint::Halt);
        assert!(matches!(
            kernel.internal_error(),
            Some(KernelError::UnknownInterrupt(99))
        ));
    }

    #[test]
    fn cpu_fault_kills_only_the_faulting_process() {
        let (mut kernel, mem, _io, _loader) = booted();
        mem.poke(IRQ_END_ERROR, 5);
        assert_eq!(kernel.handle_trap(Irq::CpuFault.to_word()), ResumeHint::Halt);
        assert!(kernel.processes().slot(0).is_dead());
        assert_eq!(kernel.ports().occupied_count(), 0);
        assert_eq!(kernel.current_slot(), None);
        // The fault is the process's problem, not the kernel's.
        assert!(kernel.internal_error().is_none());
        assert_eq!(kernel.metrics().cpu_faults, 1);
    }

    #[test]
    fn clock_failure_wedges_the_kernel() {
        let (mut kernel, _mem, io, _loader) = booted();
        io.break_device(crate::hal::layout::D_RELOGIO_INTERRUPCAO);
        assert_eq!(kernel.handle_trap(Irq::Timer.to_word()), ResumeHint::Halt);
        assert!(matches!(
            kernel.internal_error(),
            Some(KernelError::Device(_))
        ));
    }

    #[test]
    fn quantum_grants_exactly_its_budget_of_ticks() {
        let (mut kernel, _mem, _io, _loader) = booted();
        let quantum = kernel.config().quantum;
        for _ in 0..quantum - 1 {
            kernel.handle_trap(Irq::Timer.to_word());
            assert_eq!(kernel.metrics().preemptions, 0);
        }
        kernel.handle_trap(Irq::Timer.to_word());
        assert_eq!(kernel.metrics().preemptions, 1);
        // Sole process: preempted straight back onto the CPU.
        assert_eq!(kernel.current_slot(), Some(0));
        assert!(kernel.processes().slot(0).is_running());
    }
}
