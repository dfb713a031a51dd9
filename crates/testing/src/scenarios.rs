//! End-to-end scenarios: whole-machine behaviors checked through the
//! harness, with the evidence collected for the report.

use serde::{Deserialize, Serialize};

use minikernel::process::BlockReason;
use minikernel::syscall::{SYS_KILL, SYS_READ, SYS_WAIT};
use minikernel::ResumeHint;

use crate::harness::Machine;
use crate::invariants;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub description: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSuiteResults {
    pub results: Vec<ScenarioResult>,
    pub passed: usize,
    pub total: usize,
}

/// Incremental pass/fail recorder for one scenario.
struct Checks {
    passed: bool,
    evidence: Vec<String>,
}

impl Checks {
    fn new() -> Self {
        Self {
            passed: true,
            evidence: Vec::new(),
        }
    }

    fn expect(&mut self, condition: bool, what: &str) {
        if condition {
            self.evidence.push(format!("ok: {what}"));
        } else {
            self.passed = false;
            self.evidence.push(format!("FAILED: {what}"));
        }
    }

    fn finish(mut self, m: &Machine, name: &str, description: &str) -> ScenarioResult {
        match invariants::check_all(m) {
            Ok(()) => self.evidence.push("ok: invariants hold".to_owned()),
            Err(e) => {
                self.passed = false;
                self.evidence.push(format!("FAILED invariant: {e}"));
            }
        }
        ScenarioResult {
            name: name.to_owned(),
            passed: self.passed,
            description: description.to_owned(),
            evidence: self.evidence,
        }
    }
}

pub fn run_all() -> ScenarioSuiteResults {
    let results = vec![
        scenario_boot(),
        scenario_spawn_and_wait(),
        scenario_blocking_read(),
        scenario_quantum_preemption(),
        scenario_cpu_fault(),
        scenario_unknown_syscall(),
    ];
    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();
    ScenarioSuiteResults {
        results,
        passed,
        total,
    }
}

/// Reset creates and dispatches the init process.
pub fn scenario_boot() -> ScenarioResult {
    let mut checks = Checks::new();
    let mut m = Machine::new();
    let hint = m.boot();

    checks.expect(hint == ResumeHint::Resume, "reset resumes into user code");
    checks.expect(
        m.loader.loads().contains(&"init.maq".to_owned()),
        "init image was loaded",
    );
    let init = m.kernel.processes().slot(0);
    checks.expect(init.pid == 0, "process 0 exists");
    checks.expect(init.is_running(), "process 0 is running");
    checks.expect(init.port == Some(0), "process 0 owns port 0");
    checks.expect(init.regs.pc == 100, "process 0 starts at the load address");
    checks.finish(&m, "boot", "reset loads init at 100 and dispatches it")
}

/// A parent spawns a child, waits on it, and is released when the child
/// kills itself.
pub fn scenario_spawn_and_wait() -> ScenarioResult {
    let mut checks = Checks::new();
    let mut m = Machine::new();
    m.boot();

    let child = m.spawn_child();
    checks.expect(child == 1, "spawn returned the child pid in A");
    let child_slot = m.kernel.processes().find_live(child as u32);
    checks.expect(
        child_slot.is_some_and(|s| m.kernel.processes().slot(s).is_ready()),
        "child is ready",
    );

    m.syscall(SYS_WAIT, child);
    checks.expect(
        m.kernel.processes().slot(0).block_reason() == Some(BlockReason::WaitPid(child as u32)),
        "parent blocked waiting for the child",
    );
    checks.expect(
        m.current_pid() == Some(child as u32),
        "child took over the cpu",
    );

    // The child exits; the same cycle's sweep releases the parent.
    m.syscall(SYS_KILL, 0);
    let parent = m.kernel.processes().slot(0);
    checks.expect(parent.regs.a == 0, "wait completed with A = 0");
    checks.expect(parent.is_running(), "parent was dispatched again");
    checks.finish(
        &m,
        "spawn_and_wait",
        "spawn returns the child pid; wait blocks until the child dies",
    )
}

/// A read with no pending input blocks; the byte arrives later and the
/// sweep finishes the call.
pub fn scenario_blocking_read() -> ScenarioResult {
    let mut checks = Checks::new();
    let mut m = Machine::new();
    m.boot();

    let hint = m.syscall(SYS_READ, 0);
    checks.expect(hint == ResumeHint::Halt, "nothing left to run");
    checks.expect(
        m.kernel.processes().slot(0).block_reason() == Some(BlockReason::Read),
        "reader blocked on the keyboard",
    );

    m.tick();
    checks.expect(
        m.kernel.processes().slot(0).block_reason() == Some(BlockReason::Read),
        "still blocked while the keyboard is silent",
    );

    m.io.push_key(0, 42);
    let hint = m.tick();
    let reader = m.kernel.processes().slot(0);
    checks.expect(hint == ResumeHint::Resume, "reader was dispatched");
    checks.expect(reader.regs.a == 42, "the byte landed in A");
    checks.expect(reader.is_running(), "reader runs again");
    checks.finish(
        &m,
        "blocking_read",
        "read blocks on an empty keyboard and completes via the sweep",
    )
}

/// Two equal-priority processes share the CPU in quantum-sized slices.
pub fn scenario_quantum_preemption() -> ScenarioResult {
    let mut checks = Checks::new();
    let mut m = Machine::new();
    m.boot();
    let child = m.spawn_child();
    checks.expect(child == 1, "second process exists");

    let quantum = m.kernel.config().quantum as usize;
    let total_ticks = 4 * quantum;
    let mut trace = Vec::with_capacity(total_ticks);
    for _ in 0..total_ticks {
        // The process that owns this tick is whoever is current before it.
        trace.push(m.current_pid());
        m.tick();
    }

    let ticks_for = |pid: u32| trace.iter().filter(|&&p| p == Some(pid)).count();
    let slices_for = |pid: u32| {
        let mut slices = 0;
        let mut prev = None;
        for &p in &trace {
            if p == Some(pid) && prev != Some(pid) {
                slices += 1;
            }
            prev = p;
        }
        slices
    };

    checks.expect(
        ticks_for(0) == 2 * quantum,
        "process 0 received two quanta of ticks",
    );
    checks.expect(
        ticks_for(1) == 2 * quantum,
        "process 1 received two quanta of ticks",
    );
    checks.expect(
        slices_for(0) == 2 && slices_for(1) == 2,
        "each process ran exactly twice",
    );
    checks.finish(
        &m,
        "quantum_preemption",
        "round-robin hands out exactly one quantum per turn",
    )
}

/// A CPU fault kills the offending process; the machine carries on.
pub fn scenario_cpu_fault() -> ScenarioResult {
    let mut checks = Checks::new();
    let mut m = Machine::new();
    m.boot();
    let child = m.spawn_child();
    checks.expect(child == 1, "bystander process exists");

    let hint = m.fault(5);
    let victim = m.kernel.processes().slot(0);
    checks.expect(victim.is_dead(), "faulting process is dead");
    checks.expect(victim.port.is_none(), "its port went back to the pool");
    checks.expect(
        m.kernel.ports().occupied_count() == 1,
        "pool occupancy matches the survivor",
    );
    checks.expect(hint == ResumeHint::Resume, "the bystander was dispatched");
    checks.expect(
        m.current_pid() == Some(child as u32),
        "the bystander now runs",
    );
    checks.expect(
        m.kernel.internal_error().is_none(),
        "a user fault is not a kernel error",
    );
    checks.finish(
        &m,
        "cpu_fault",
        "a fault kills only the faulting process and the next one runs",
    )
}

/// An unrecognized syscall id is fatal to the caller.
pub fn scenario_unknown_syscall() -> ScenarioResult {
    let mut checks = Checks::new();
    let mut m = Machine::new();
    m.boot();

    let hint = m.syscall(99, 0);
    let caller = m.kernel.processes().slot(0);
    checks.expect(caller.is_dead(), "caller is dead");
    checks.expect(caller.port.is_none(), "its port was released");
    checks.expect(caller.regs.a == 99, "A was never written with a result");
    checks.expect(hint == ResumeHint::Halt, "nothing left to run");
    checks.finish(
        &m,
        "unknown_syscall",
        "an unknown syscall id terminates the caller without a result",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes() {
        let suite = run_all();
        for result in &suite.results {
            assert!(
                result.passed,
                "scenario '{}' failed: {:?}",
                result.name, result.evidence
            );
        }
        assert_eq!(suite.passed, suite.total);
    }
}
