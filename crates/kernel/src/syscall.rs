//! System-call layer.
//!
//! The call id arrives in the caller's saved A register, the argument in
//! X, and the result goes back in A. A call that cannot complete because a
//! device is not ready blocks the caller and leaves A alone; the pending
//! sweep finishes the call later. The same attempt functions serve both
//! entries, with `allow_block` telling a sweep retry apart from a first
//! entry.

use log::{debug, info, warn};
use thiserror::Error;

use crate::error::KernelError;
use crate::hal::{Addr, IoBus, Memory, MemoryFault, ProgramLoader, Word};
use crate::kernel::Kernel;
use crate::process::{BlockReason, Pid, ProcessState, DEFAULT_PRIORITY};

/// Read one byte from the caller's keyboard into A.
pub const SYS_READ: Word = 1;
/// Write the byte in X to the caller's screen.
pub const SYS_WRITE: Word = 2;
/// Create a process from the program named at address X.
pub const SYS_SPAWN: Word = 3;
/// Kill the process with pid X, or the caller itself when X is 0.
pub const SYS_KILL: Word = 4;
/// Block until the process with pid X dies.
pub const SYS_WAIT: Word = 5;

/// Longest accepted program name, in bytes, including the NUL.
pub const MAX_PROGRAM_NAME: usize = 100;

/// Why a program name could not be copied out of the caller's memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
enum NameError {
    #[error("name address is negative")]
    BadAddress,
    #[error(transparent)]
    Memory(#[from] MemoryFault),
    #[error("word {0} is not a byte")]
    NotAByte(Word),
    #[error("name is too long or missing its terminator")]
    Unterminated,
    #[error("name is not valid utf-8")]
    NotUtf8,
}

impl<M: Memory, I: IoBus, L: ProgramLoader> Kernel<M, I, L> {
    pub(crate) fn handle_syscall(&mut self) {
        self.metrics.syscalls += 1;
        let Some(cur) = self.current else {
            warn!("system call trap with no current process");
            return;
        };
        let id = self.table.slot(cur).regs.a;
        debug!("pid {}: system call {id}", self.table.slot(cur).pid);
        match id {
            SYS_READ => self.attempt_read(cur, true),
            SYS_WRITE => self.attempt_write(cur, true),
            SYS_SPAWN => self.sys_spawn(cur),
            SYS_KILL => self.sys_kill(cur),
            SYS_WAIT => self.sys_wait(cur),
            unknown => {
                warn!(
                    "pid {}: unknown system call {unknown}, killing process",
                    self.table.slot(cur).pid
                );
                self.terminate(cur);
            }
        }
    }

    /// Try to read a byte from `slot`'s keyboard into its A register.
    /// With `allow_block`, a not-ready keyboard blocks the process; a
    /// sweep retry leaves it blocked instead.
    pub(crate) fn attempt_read(&mut self, slot: usize, allow_block: bool) {
        let Some(port_id) = self.table.slot(slot).port else {
            let pid = self.table.slot(slot).pid;
            self.fail(KernelError::MissingPort { pid });
            return;
        };
        let port = *self.ports.port(port_id);
        let status = match self.io.read(port.keyboard_status) {
            Ok(status) => status,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };
        if status == 0 {
            if allow_block {
                self.block(slot, BlockReason::Read);
            }
            return;
        }
        let data = match self.io.read(port.keyboard) {
            Ok(data) => data,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };
        self.table.slot_mut(slot).regs.a = data;
        self.make_ready_if_blocked(slot);
    }

    /// Try to write `slot`'s X register to its screen, setting A to 0 on
    /// success. Blocking behaves as in [`Self::attempt_read`].
    pub(crate) fn attempt_write(&mut self, slot: usize, allow_block: bool) {
        let Some(port_id) = self.table.slot(slot).port else {
            let pid = self.table.slot(slot).pid;
            self.fail(KernelError::MissingPort { pid });
            return;
        };
        let port = *self.ports.port(port_id);
        let status = match self.io.read(port.screen_status) {
            Ok(status) => status,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };
        if status == 0 {
            if allow_block {
                self.block(slot, BlockReason::Write);
            }
            return;
        }
        let value = self.table.slot(slot).regs.x;
        if let Err(e) = self.io.write(port.screen, value) {
            self.fail(e.into());
            return;
        }
        self.table.slot_mut(slot).regs.a = 0;
        self.make_ready_if_blocked(slot);
    }

    fn block(&mut self, slot: usize, reason: BlockReason) {
        debug!(
            "pid {} blocked on {:?}",
            self.table.slot(slot).pid,
            reason
        );
        self.table.slot_mut(slot).state = ProcessState::Blocked(reason);
    }

    fn sys_spawn(&mut self, cur: usize) {
        let name_addr = self.table.slot(cur).regs.x;
        let name = match self.copy_name_from_mem(name_addr) {
            Ok(name) => name,
            Err(reason) => {
                warn!("spawn: bad program name at {name_addr}: {reason}");
                self.table.slot_mut(cur).regs.a = -1;
                return;
            }
        };
        let addr = match self.load_program(&name) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("spawn: {e}");
                self.table.slot_mut(cur).regs.a = -1;
                return;
            }
        };
        if !self.table.has_free_slot() {
            warn!("spawn: process table full");
            self.table.slot_mut(cur).regs.a = -1;
            return;
        }
        let Some(port) = self.ports.acquire() else {
            warn!("spawn: no free terminal port");
            self.table.slot_mut(cur).regs.a = -1;
            return;
        };
        match self.table.create(addr as Word, port, DEFAULT_PRIORITY) {
            Some((slot, pid)) => {
                self.sched.enqueue(slot);
                self.metrics.processes_created += 1;
                info!(
                    "pid {}: spawned '{name}' as pid {pid} on slot {slot}",
                    self.table.slot(cur).pid
                );
                self.table.slot_mut(cur).regs.a = pid as Word;
            }
            None => {
                // Free slot vanished between check and create; give the
                // port back and report failure.
                if let Err(e) = self.ports.release(port) {
                    self.fail(e.into());
                }
                self.table.slot_mut(cur).regs.a = -1;
            }
        }
    }

    /// Copy a NUL-terminated program name out of the caller's memory, one
    /// byte per word.
    fn copy_name_from_mem(&self, addr: Word) -> Result<String, NameError> {
        if addr < 0 {
            return Err(NameError::BadAddress);
        }
        let base = addr as Addr;
        let mut bytes = Vec::new();
        for offset in 0..MAX_PROGRAM_NAME {
            let word = self.mem.read(base + offset)?;
            if !(0..=255).contains(&word) {
                return Err(NameError::NotAByte(word));
            }
            if word == 0 {
                return String::from_utf8(bytes).map_err(|_| NameError::NotUtf8);
            }
            bytes.push(word as u8);
        }
        Err(NameError::Unterminated)
    }

    fn sys_kill(&mut self, cur: usize) {
        let target = self.table.slot(cur).regs.x;
        let target_slot = match target {
            0 => Some(cur),
            t if t > 0 => self.table.find_live(t as Pid),
            _ => None,
        };
        match target_slot {
            Some(slot) => {
                info!(
                    "pid {}: kill pid {}",
                    self.table.slot(cur).pid,
                    self.table.slot(slot).pid
                );
                self.terminate(slot);
                self.table.slot_mut(cur).regs.a = 0;
            }
            None => {
                warn!("kill: no live process with pid {target}");
                self.table.slot_mut(cur).regs.a = -1;
            }
        }
    }

    fn sys_wait(&mut self, cur: usize) {
        let target = self.table.slot(cur).regs.x;
        let caller = self.table.slot(cur).pid;
        if target <= 0
            || target as Pid == caller
            || self.table.find_live(target as Pid).is_none()
        {
            warn!("pid {caller}: wait on pid {target} rejected");
            self.table.slot_mut(cur).regs.a = -1;
            return;
        }
        self.block(cur, BlockReason::WaitPid(target as Pid));
    }
}
