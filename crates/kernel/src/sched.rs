//! Scheduling: quantum accounting and the ready queue.
//!
//! The queue stores process-table slot indices rather than descriptor
//! pointers, so descriptor storage is never aliased by queue links. It
//! holds only ready slots, each at most once; the kernel inserts on
//! creation, unblock and preemption, and removes on selection and kill.

use std::collections::VecDeque;

use crate::process::ProcessTable;

#[derive(Debug)]
pub struct Scheduler {
    ready: VecDeque<usize>,
    quantum: i32,
    quantum_reset: i32,
}

impl Scheduler {
    pub fn new(quantum: i32) -> Self {
        Self {
            ready: VecDeque::new(),
            quantum,
            quantum_reset: quantum,
        }
    }

    /// Append `slot` to the queue tail, unless already queued.
    pub fn enqueue(&mut self, slot: usize) {
        if !self.ready.contains(&slot) {
            self.ready.push_back(slot);
        }
    }

    pub fn remove(&mut self, slot: usize) {
        self.ready.retain(|&s| s != slot);
    }

    /// Round-robin selection: detach and return the queue head.
    pub fn pop_front(&mut self) -> Option<usize> {
        self.ready.pop_front()
    }

    /// Discard the queue and refill it with every ready slot in table
    /// order.
    pub fn rebuild(&mut self, table: &ProcessTable) {
        self.ready.clear();
        for (slot, process) in table.slots().iter().enumerate() {
            if process.is_ready() {
                self.ready.push_back(slot);
            }
        }
    }

    /// Priority selection over the table: the ready slot with the greatest
    /// priority, ties broken by table order.
    pub fn pick_priority(table: &ProcessTable) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (slot, process) in table.slots().iter().enumerate() {
            if !process.is_ready() {
                continue;
            }
            match best {
                Some(b) if table.slot(b).priority >= process.priority => {}
                _ => best = Some(slot),
            }
        }
        best
    }

    /// Account one timer tick; true when the quantum is exhausted.
    pub fn tick(&mut self) -> bool {
        self.quantum -= 1;
        self.quantum <= 0
    }

    pub fn quantum_exhausted(&self) -> bool {
        self.quantum <= 0
    }

    pub fn reset_quantum(&mut self) {
        self.quantum = self.quantum_reset;
    }

    pub fn quantum(&self) -> i32 {
        self.quantum
    }

    /// Queued slots in dispatch order, for diagnostics and invariant
    /// checks.
    pub fn ready_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.ready.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessTable, DEFAULT_PRIORITY};

    fn table_with(n: usize) -> ProcessTable {
        let mut t = ProcessTable::new(n);
        for i in 0..n {
            t.create(100, i, DEFAULT_PRIORITY).unwrap();
        }
        t
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut s = Scheduler::new(5);
        s.enqueue(1);
        s.enqueue(1);
        assert_eq!(s.ready_slots().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn round_robin_rotates_through_the_queue() {
        let mut s = Scheduler::new(5);
        s.enqueue(0);
        s.enqueue(1);
        let first = s.pop_front().unwrap();
        s.enqueue(first);
        assert_eq!(s.pop_front(), Some(1));
        assert_eq!(s.pop_front(), Some(0));
    }

    #[test]
    fn rebuild_follows_table_order_and_skips_non_ready() {
        let mut t = table_with(3);
        t.slot_mut(1).die();
        let mut s = Scheduler::new(5);
        s.enqueue(1);
        s.rebuild(&t);
        assert_eq!(s.ready_slots().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn priority_pick_prefers_greater_priority_with_table_order_ties() {
        let mut t = table_with(3);
        t.slot_mut(2).priority = 0.9;
        assert_eq!(Scheduler::pick_priority(&t), Some(2));
        t.slot_mut(2).priority = 0.5;
        // All equal: earliest table slot wins.
        assert_eq!(Scheduler::pick_priority(&t), Some(0));
    }

    #[test]
    fn quantum_exhausts_after_its_budget_of_ticks() {
        let mut s = Scheduler::new(3);
        assert!(!s.tick());
        assert!(!s.tick());
        assert!(s.tick());
        assert!(s.quantum_exhausted());
        s.reset_quantum();
        assert_eq!(s.quantum(), 3);
    }
}
