//! Process descriptor: the kernel's record for one process.

use serde::{Deserialize, Serialize};

use crate::hal::layout::MODE_USER;
use crate::hal::Word;
use crate::port::PortId;

pub type Pid = u32;

/// Priority used by the priority scheduling policy, in `[0, 1]`.
pub const DEFAULT_PRIORITY: f64 = 0.5;

/// Why a blocked process is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    /// Waiting for the keyboard to have a byte.
    Read,
    /// Waiting for the screen to accept a byte.
    Write,
    /// Waiting for the given pid to die.
    WaitPid(Pid),
}

/// Lifecycle state. `Blocked` carries its reason, so a descriptor cannot
/// be blocked for no reason or carry a stale wait target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Dead,
    Ready,
    Running,
    Blocked(BlockReason),
}

/// Saved CPU register file, written on trap entry and restored on
/// dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    pub pc: Word,
    pub a: Word,
    pub x: Word,
    pub error: Word,
    pub complement: Word,
    pub mode: Word,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub pid: Pid,
    pub state: ProcessState,
    pub regs: RegisterFile,
    /// Terminal port owned by this process; `None` only when dead.
    pub port: Option<PortId>,
    pub priority: f64,
}

impl Process {
    /// An unoccupied table slot.
    pub fn dead_slot() -> Self {
        Self {
            pid: 0,
            state: ProcessState::Dead,
            regs: RegisterFile::default(),
            port: None,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Reinitialize this slot for a fresh process entering the system at
    /// `entry_pc` in user mode, all other registers zeroed.
    pub fn birth(&mut self, pid: Pid, entry_pc: Word, port: PortId, priority: f64) {
        self.pid = pid;
        self.state = ProcessState::Ready;
        self.regs = RegisterFile {
            pc: entry_pc,
            mode: MODE_USER,
            ..RegisterFile::default()
        };
        self.port = Some(port);
        self.priority = priority;
    }

    /// Transition into `Dead`, surrendering the port (the caller returns
    /// it to the pool).
    pub fn die(&mut self) -> Option<PortId> {
        self.state = ProcessState::Dead;
        self.port.take()
    }

    pub fn is_dead(&self) -> bool {
        self.state == ProcessState::Dead
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProcessState::Ready
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        match self.state {
            ProcessState::Blocked(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn birth_enters_user_mode_with_clean_registers() {
        let mut p = Process::dead_slot();
        p.regs.a = 77;
        p.birth(3, 100, 1, DEFAULT_PRIORITY);
        assert_eq!(p.state, ProcessState::Ready);
        assert_eq!(p.regs.pc, 100);
        assert_eq!(p.regs.a, 0);
        assert_eq!(p.regs.mode, MODE_USER);
        assert_eq!(p.port, Some(1));
    }

    #[test]
    fn death_surrenders_the_port() {
        let mut p = Process::dead_slot();
        p.birth(1, 100, 2, DEFAULT_PRIORITY);
        assert_eq!(p.die(), Some(2));
        assert!(p.is_dead());
        assert_eq!(p.port, None);
        // A second death has nothing left to surrender.
        assert_eq!(p.die(), None);
    }
}
