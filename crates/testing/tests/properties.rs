// Property tests: the universal kernel invariants must survive arbitrary
// interleavings of interrupts, syscalls and device activity.

use proptest::prelude::*;

use minikernel::hal::Word;
use minikernel_testing::harness::{Machine, CHILD_NAME_ADDR};
use minikernel_testing::invariants;

#[derive(Debug, Clone, Copy)]
enum Op {
    /// Clock interrupt.
    Tick,
    /// A keystroke arrives on a terminal.
    Key { term: usize, value: u8 },
    /// A screen toggles between busy and ready.
    ScreenReady { term: usize, ready: bool },
    /// The current process traps with this syscall id and argument.
    Syscall { id: Word, x: Word },
    /// The current process faults.
    Fault,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Tick),
        2 => (0..4usize, any::<u8>()).prop_map(|(term, value)| Op::Key { term, value }),
        1 => (0..4usize, any::<bool>()).prop_map(|(term, ready)| Op::ScreenReady { term, ready }),
        4 => (0..8i32, prop_oneof![
            (-5..600i32),
            Just(CHILD_NAME_ADDR as i32),
        ])
            .prop_map(|(id, x)| Op::Syscall { id, x }),
        1 => Just(Op::Fault),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invariants_hold_over_random_traces(
        ops in proptest::collection::vec(op_strategy(), 1..60)
    ) {
        let mut m = Machine::new();
        m.boot();
        if let Err(e) = invariants::check_all(&m) {
            prop_assert!(false, "after boot: {}", e);
        }
        for op in ops {
            let trapped = match op {
                Op::Tick => {
                    m.tick();
                    true
                }
                Op::Key { term, value } => {
                    m.io.push_key(term, Word::from(value));
                    false
                }
                Op::ScreenReady { term, ready } => {
                    m.io.set_screen_ready(term, ready);
                    false
                }
                // A syscall or fault needs user code on the CPU to issue it.
                Op::Syscall { id, x } => {
                    if m.kernel.current_slot().is_some() {
                        m.syscall(id, x);
                        true
                    } else {
                        false
                    }
                }
                Op::Fault => {
                    if m.kernel.current_slot().is_some() {
                        m.fault(1);
                        true
                    } else {
                        false
                    }
                }
            };
            if let Err(e) = invariants::check_structural(&m) {
                prop_assert!(false, "after {:?}: {}", op, e);
            }
            if trapped {
                // A trap always ends with a sweep, so no blocked process
                // may have a satisfied condition here.
                if let Err(e) = invariants::check_sweep_quiescence(&m) {
                    prop_assert!(false, "after {:?}: {}", op, e);
                }
            }
        }
    }
}
