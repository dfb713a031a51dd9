//! Runtime invariant checks over a live machine.
//!
//! These are the universal properties the kernel must preserve on every
//! cycle. They are split in two: structural invariants hold at any point,
//! while sweep quiescence ("no blocked process's condition is already
//! satisfied") only holds immediately after a trap, before the harness
//! scripts any new device activity.

use minikernel::process::BlockReason;

use crate::harness::Machine;

/// Invariants that hold between any two operations.
pub fn check_structural(m: &Machine) -> Result<(), String> {
    let kernel = &m.kernel;
    if kernel.internal_error().is_some() {
        // A wedged kernel stops mutating state; nothing further to hold.
        return Ok(());
    }
    let table = kernel.processes();

    let running: Vec<usize> = (0..table.len())
        .filter(|&slot| table.slot(slot).is_running())
        .collect();
    if running.len() > 1 {
        return Err(format!("{} descriptors are running at once", running.len()));
    }
    match (running.first(), kernel.current_slot()) {
        (Some(&slot), Some(cur)) if slot != cur => {
            return Err(format!(
                "running slot {slot} does not coincide with current {cur}"
            ));
        }
        (Some(&slot), None) => {
            return Err(format!("slot {slot} is running but current is null"));
        }
        (None, Some(cur)) => {
            return Err(format!("current slot {cur} is not running"));
        }
        _ => {}
    }

    let live = table.live_count();
    let occupied = kernel.ports().occupied_count();
    if live != occupied {
        return Err(format!(
            "port occupancy {occupied} does not match {live} live processes"
        ));
    }
    for (slot, process) in table.slots().iter().enumerate() {
        if !process.is_dead() && process.port.is_none() {
            return Err(format!("live slot {slot} owns no port"));
        }
    }

    let mut live_pids: Vec<_> = table
        .slots()
        .iter()
        .filter(|p| !p.is_dead())
        .map(|p| p.pid)
        .collect();
    live_pids.sort_unstable();
    live_pids.dedup();
    if live_pids.len() != live {
        return Err("live pids are not pairwise distinct".to_owned());
    }

    let queued: Vec<usize> = kernel.scheduler().ready_slots().collect();
    let mut unique = queued.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != queued.len() {
        return Err("ready queue contains a slot twice".to_owned());
    }
    for slot in queued {
        if !table.slot(slot).is_ready() {
            return Err(format!("ready queue holds non-ready slot {slot}"));
        }
    }

    Ok(())
}

/// No blocked process could make progress right now: the sweep that just
/// ran would have released it otherwise.
pub fn check_sweep_quiescence(m: &Machine) -> Result<(), String> {
    let kernel = &m.kernel;
    if kernel.internal_error().is_some() {
        return Ok(());
    }
    let table = kernel.processes();
    for (slot, process) in table.slots().iter().enumerate() {
        let Some(reason) = process.block_reason() else {
            continue;
        };
        let Some(port) = process.port else {
            return Err(format!("blocked slot {slot} owns no port"));
        };
        match reason {
            BlockReason::Read if m.io.keyboard_ready(port) => {
                return Err(format!("slot {slot} blocked on a ready keyboard"));
            }
            BlockReason::Write if m.io.screen_ready(port) => {
                return Err(format!("slot {slot} blocked on a ready screen"));
            }
            BlockReason::WaitPid(target) if table.find_live(target).is_none() => {
                return Err(format!("slot {slot} still waits for defunct pid {target}"));
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn check_all(m: &Machine) -> Result<(), String> {
    check_structural(m)?;
    check_sweep_quiescence(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minikernel::syscall::{SYS_KILL, SYS_READ};

    #[test]
    fn fresh_boot_satisfies_every_invariant() {
        let mut m = Machine::new();
        m.boot();
        check_all(&m).unwrap();
    }

    #[test]
    fn invariants_survive_blocking_and_death() {
        let mut m = Machine::new();
        m.boot();
        m.spawn_child();
        m.syscall(SYS_READ, 0);
        check_all(&m).unwrap();
        m.syscall(SYS_KILL, 0);
        check_all(&m).unwrap();
    }

    #[test]
    fn sweep_runs_are_idempotent() {
        let mut m = Machine::new();
        m.boot();
        m.syscall(SYS_READ, 0);
        m.io.push_key(0, 9);
        m.tick();
        let after_once: Vec<_> = m.kernel.processes().slots().to_vec();
        m.tick();
        let after_twice: Vec<_> = m.kernel.processes().slots().to_vec();
        for (a, b) in after_once.iter().zip(&after_twice) {
            assert_eq!(a.state, b.state);
            assert_eq!(a.regs.a, b.regs.a);
        }
    }
}
