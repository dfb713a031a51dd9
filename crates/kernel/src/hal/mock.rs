//! Reference test doubles for the machine collaborators.
//!
//! Each double hands out cheaply cloneable handles over shared state, so a
//! test can keep a handle for scripting (queueing keystrokes, toggling
//! screen readiness, poisoning memory cells) while the kernel owns another.
//! These are simulators of convenience for tests, not the real machine.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::layout::{self, D_RELOGIO_INTERRUPCAO, D_RELOGIO_TIMER, TERM_STRIDE};
use super::{Addr, Device, DeviceFault, IoBus, LoadError, Memory, MemoryFault, ProgramLoader, Word};

/// Default simulated memory size, in words.
pub const DEFAULT_MEMORY_WORDS: usize = 2048;

#[derive(Debug)]
struct MemState {
    cells: Vec<Word>,
    poisoned: HashSet<Addr>,
}

/// Plain word-addressable memory with optional per-cell fault injection.
#[derive(Debug, Clone)]
pub struct SimMemory {
    inner: Rc<RefCell<MemState>>,
}

impl SimMemory {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_MEMORY_WORDS)
    }

    pub fn with_size(words: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemState {
                cells: vec![0; words],
                poisoned: HashSet::new(),
            })),
        }
    }

    /// Make every access to `addr` fault from now on.
    pub fn poison(&self, addr: Addr) {
        self.inner.borrow_mut().poisoned.insert(addr);
    }

    /// Direct peek for assertions, bypassing fault injection.
    pub fn peek(&self, addr: Addr) -> Word {
        self.inner.borrow().cells[addr]
    }

    /// Direct poke for test setup, bypassing fault injection.
    pub fn poke(&self, addr: Addr, value: Word) {
        self.inner.borrow_mut().cells[addr] = value;
    }

    /// Write the bytes of `s` plus a terminating NUL, one byte per word.
    pub fn poke_str(&self, addr: Addr, s: &str) {
        let mut state = self.inner.borrow_mut();
        for (i, b) in s.bytes().chain(std::iter::once(0)).enumerate() {
            state.cells[addr + i] = Word::from(b);
        }
    }
}

impl Default for SimMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for SimMemory {
    fn read(&self, addr: Addr) -> Result<Word, MemoryFault> {
        let state = self.inner.borrow();
        if state.poisoned.contains(&addr) {
            return Err(MemoryFault { addr });
        }
        state.cells.get(addr).copied().ok_or(MemoryFault { addr })
    }

    fn write(&mut self, addr: Addr, value: Word) -> Result<(), MemoryFault> {
        let mut state = self.inner.borrow_mut();
        if state.poisoned.contains(&addr) {
            return Err(MemoryFault { addr });
        }
        match state.cells.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(MemoryFault { addr }),
        }
    }
}

#[derive(Debug)]
struct IoState {
    keyboards: Vec<VecDeque<Word>>,
    screens: Vec<Vec<Word>>,
    screen_ready: Vec<bool>,
    timer_reload: Word,
    timer_acks: u64,
    broken: HashSet<Device>,
}

/// I/O bus double: one keyboard queue and one screen buffer per terminal
/// port, plus the clock registers.
#[derive(Debug, Clone)]
pub struct SimIoBus {
    inner: Rc<RefCell<IoState>>,
}

impl SimIoBus {
    pub fn new(terminals: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(IoState {
                keyboards: vec![VecDeque::new(); terminals],
                screens: vec![Vec::new(); terminals],
                screen_ready: vec![true; terminals],
                timer_reload: 0,
                timer_acks: 0,
                broken: HashSet::new(),
            })),
        }
    }

    /// Queue a keystroke on terminal `term`; the keyboard reads ready while
    /// the queue is non-empty.
    pub fn push_key(&self, term: usize, value: Word) {
        self.inner.borrow_mut().keyboards[term].push_back(value);
    }

    pub fn set_screen_ready(&self, term: usize, ready: bool) {
        self.inner.borrow_mut().screen_ready[term] = ready;
    }

    /// Everything written to terminal `term`'s screen so far.
    pub fn screen_output(&self, term: usize) -> Vec<Word> {
        self.inner.borrow().screens[term].clone()
    }

    /// Last countdown value programmed into the clock.
    pub fn timer_reload(&self) -> Word {
        self.inner.borrow().timer_reload
    }

    /// How many times the clock interrupt has been acknowledged.
    pub fn timer_acks(&self) -> u64 {
        self.inner.borrow().timer_acks
    }

    /// Make every access to `device` fault from now on.
    pub fn break_device(&self, device: Device) {
        self.inner.borrow_mut().broken.insert(device);
    }

    /// Side-effect-free view of keyboard readiness, for assertions.
    pub fn keyboard_ready(&self, term: usize) -> bool {
        !self.inner.borrow().keyboards[term].is_empty()
    }

    /// Side-effect-free view of screen readiness, for assertions.
    pub fn screen_ready(&self, term: usize) -> bool {
        self.inner.borrow().screen_ready[term]
    }
}

impl IoBus for SimIoBus {
    fn read(&mut self, device: Device) -> Result<Word, DeviceFault> {
        let mut state = self.inner.borrow_mut();
        if state.broken.contains(&device) {
            return Err(DeviceFault { device });
        }
        if device == D_RELOGIO_TIMER {
            return Ok(state.timer_reload);
        }
        if device == D_RELOGIO_INTERRUPCAO {
            return Ok(0);
        }
        let term = device / TERM_STRIDE;
        if term >= state.keyboards.len() {
            return Err(DeviceFault { device });
        }
        match device % TERM_STRIDE {
            0 => state.keyboards[term].pop_front().ok_or(DeviceFault { device }),
            1 => Ok(Word::from(!state.keyboards[term].is_empty())),
            3 => Ok(Word::from(state.screen_ready[term])),
            // Screen data is write-only.
            _ => Err(DeviceFault { device }),
        }
    }

    fn write(&mut self, device: Device, value: Word) -> Result<(), DeviceFault> {
        let mut state = self.inner.borrow_mut();
        if state.broken.contains(&device) {
            return Err(DeviceFault { device });
        }
        if device == D_RELOGIO_TIMER {
            state.timer_reload = value;
            return Ok(());
        }
        if device == D_RELOGIO_INTERRUPCAO {
            if value == 0 {
                state.timer_acks += 1;
            }
            return Ok(());
        }
        let term = device / TERM_STRIDE;
        if term >= state.screens.len() {
            return Err(DeviceFault { device });
        }
        match device % TERM_STRIDE {
            2 if state.screen_ready[term] => {
                state.screens[term].push(value);
                Ok(())
            }
            // Writing a busy screen or any read-only register faults.
            _ => Err(DeviceFault { device }),
        }
    }
}

#[derive(Debug, Default)]
struct LoaderState {
    images: HashMap<String, (Addr, Vec<Word>)>,
    loads: Vec<String>,
}

/// Program loader double serving named in-memory images.
#[derive(Debug, Clone, Default)]
pub struct SimLoader {
    inner: Rc<RefCell<LoaderState>>,
}

impl SimLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader already carrying the trap stub and init images at their
    /// required addresses, each a couple of placeholder words long.
    pub fn with_boot_images(init_load_address: Addr) -> Self {
        let loader = Self::new();
        loader.add_image("trata_int.maq", layout::IRQ_END_TRATADOR, vec![0; 4]);
        loader.add_image("init.maq", init_load_address, vec![0; 8]);
        loader
    }

    pub fn add_image(&self, name: &str, addr: Addr, words: Vec<Word>) {
        self.inner
            .borrow_mut()
            .images
            .insert(name.to_owned(), (addr, words));
    }

    /// Names loaded so far, in order.
    pub fn loads(&self) -> Vec<String> {
        self.inner.borrow().loads.clone()
    }
}

impl ProgramLoader for SimLoader {
    fn load(&mut self, name: &str, mem: &mut dyn Memory) -> Result<Addr, LoadError> {
        let (addr, words) = {
            let state = self.inner.borrow();
            state
                .images
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::NotFound(name.to_owned()))?
        };
        for (i, word) in words.iter().enumerate() {
            mem.write(addr + i, *word)?;
        }
        self.inner.borrow_mut().loads.push(name.to_owned());
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::layout::{keyboard_device, keyboard_status_device};

    #[test]
    fn keyboard_status_tracks_queue() {
        let mut io = SimIoBus::new(1);
        assert_eq!(io.read(keyboard_status_device(0)), Ok(0));
        io.push_key(0, 42);
        assert_eq!(io.read(keyboard_status_device(0)), Ok(1));
        assert_eq!(io.read(keyboard_device(0)), Ok(42));
        assert_eq!(io.read(keyboard_status_device(0)), Ok(0));
    }

    #[test]
    fn poisoned_cell_faults() {
        let mut mem = SimMemory::new();
        mem.poison(7);
        assert_eq!(mem.read(7), Err(MemoryFault { addr: 7 }));
        assert_eq!(mem.write(7, 1), Err(MemoryFault { addr: 7 }));
        assert!(mem.write(8, 1).is_ok());
    }

    #[test]
    fn loader_writes_image_at_fixed_address() {
        let mut mem = SimMemory::new();
        let mut loader = SimLoader::new();
        loader.add_image("prog.maq", 300, vec![1, 2, 3]);
        let addr = loader.load("prog.maq", &mut mem).unwrap();
        assert_eq!(addr, 300);
        assert_eq!(mem.peek(301), 2);
        assert!(matches!(
            loader.load("missing.maq", &mut mem),
            Err(LoadError::NotFound(_))
        ));
    }
}
