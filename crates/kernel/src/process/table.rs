//! Fixed-size process table with a kernel-owned monotonic pid counter.

use crate::hal::Word;
use crate::port::PortId;

use super::descriptor::{Pid, Process};

#[derive(Debug)]
pub struct ProcessTable {
    slots: Vec<Process>,
    next_pid: Pid,
}

impl ProcessTable {
    pub fn new(max_processes: usize) -> Self {
        Self {
            slots: (0..max_processes).map(|_| Process::dead_slot()).collect(),
            next_pid: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &Process {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Process {
        &mut self.slots[index]
    }

    pub fn slots(&self) -> &[Process] {
        &self.slots
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Process::is_dead)
    }

    /// Revive the first dead slot as a fresh process and return its index
    /// and newly minted pid. Pids are never reused: the counter only moves
    /// forward.
    pub fn create(&mut self, entry_pc: Word, port: PortId, priority: f64) -> Option<(usize, Pid)> {
        let index = self.slots.iter().position(Process::is_dead)?;
        let pid = self.next_pid;
        self.next_pid += 1;
        self.slots[index].birth(pid, entry_pc, port, priority);
        Some((index, pid))
    }

    /// Slot of the non-dead process with this pid, if any. Dead slots keep
    /// their last pid but are never a match.
    pub fn find_live(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|p| !p.is_dead() && p.pid == pid)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|p| !p.is_dead()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DEFAULT_PRIORITY;

    fn table() -> ProcessTable {
        ProcessTable::new(3)
    }

    #[test]
    fn create_fills_slots_and_mints_distinct_pids() {
        let mut t = table();
        let (s0, p0) = t.create(100, 0, DEFAULT_PRIORITY).unwrap();
        let (s1, p1) = t.create(200, 1, DEFAULT_PRIORITY).unwrap();
        let (s2, p2) = t.create(300, 2, DEFAULT_PRIORITY).unwrap();
        assert_eq!((s0, s1, s2), (0, 1, 2));
        assert!(p0 != p1 && p1 != p2 && p0 != p2);
        assert!(t.create(400, 3, DEFAULT_PRIORITY).is_none());
    }

    #[test]
    fn pids_are_not_reused_after_slot_recycling() {
        let mut t = table();
        let (slot, first_pid) = t.create(100, 0, DEFAULT_PRIORITY).unwrap();
        t.slot_mut(slot).die();
        let (reused, second_pid) = t.create(100, 0, DEFAULT_PRIORITY).unwrap();
        assert_eq!(reused, slot);
        assert!(second_pid > first_pid);
    }

    #[test]
    fn dead_slots_are_invisible_to_pid_lookup() {
        let mut t = table();
        let (slot, pid) = t.create(100, 0, DEFAULT_PRIORITY).unwrap();
        assert_eq!(t.find_live(pid), Some(slot));
        t.slot_mut(slot).die();
        assert_eq!(t.find_live(pid), None);
        assert_eq!(t.live_count(), 0);
    }
}
