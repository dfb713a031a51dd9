//! Terminal port pool.
//!
//! A port bundles the four device registers of one simulated terminal.
//! The pool is the sole authority on ownership: a process holds a port iff
//! the port is marked occupied and the process descriptor carries its id.
//! The free list is LIFO, so releasing and re-acquiring hands back the same
//! port.

use thiserror::Error;

use crate::hal::layout;
use crate::hal::Device;

/// Index into the port table.
pub type PortId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port {0} does not exist")]
    OutOfRange(PortId),
    /// Release of a port that is already free.
    #[error("port {0} is not occupied")]
    NotOccupied(PortId),
}

/// Device registers of one terminal, derived from the port index at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub keyboard: Device,
    pub keyboard_status: Device,
    pub screen: Device,
    pub screen_status: Device,
    occupied: bool,
}

impl Port {
    fn for_index(index: usize) -> Self {
        Self {
            keyboard: layout::keyboard_device(index),
            keyboard_status: layout::keyboard_status_device(index),
            screen: layout::screen_device(index),
            screen_status: layout::screen_status_device(index),
            occupied: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied
    }
}

#[derive(Debug)]
pub struct PortPool {
    ports: Vec<Port>,
    // LIFO free list of indices; initialized so the first acquire yields
    // port 0.
    free: Vec<PortId>,
}

impl PortPool {
    pub fn new(count: usize) -> Self {
        Self {
            ports: (0..count).map(Port::for_index).collect(),
            free: (0..count).rev().collect(),
        }
    }

    /// Detach the free-list head and mark it occupied.
    pub fn acquire(&mut self) -> Option<PortId> {
        let id = self.free.pop()?;
        self.ports[id].occupied = true;
        Some(id)
    }

    /// Return `id` to the head of the free list.
    pub fn release(&mut self, id: PortId) -> Result<(), PortError> {
        let port = self.ports.get_mut(id).ok_or(PortError::OutOfRange(id))?;
        if !port.occupied {
            return Err(PortError::NotOccupied(id));
        }
        port.occupied = false;
        self.free.push(id);
        Ok(())
    }

    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id]
    }

    pub fn occupied_count(&self) -> usize {
        self.ports.iter().filter(|p| p.occupied).count()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_hands_out_ports_in_index_order() {
        let mut pool = PortPool::new(3);
        assert_eq!(pool.acquire(), Some(0));
        assert_eq!(pool.acquire(), Some(1));
        assert_eq!(pool.acquire(), Some(2));
        assert_eq!(pool.acquire(), None);
    }

    #[test]
    fn free_list_is_lifo() {
        let mut pool = PortPool::new(3);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        pool.release(a).unwrap();
        assert_eq!(pool.acquire(), Some(a));
    }

    #[test]
    fn double_release_is_rejected() {
        let mut pool = PortPool::new(2);
        let a = pool.acquire().unwrap();
        pool.release(a).unwrap();
        assert_eq!(pool.release(a), Err(PortError::NotOccupied(a)));
        assert_eq!(pool.release(99), Err(PortError::OutOfRange(99)));
    }

    #[test]
    fn occupancy_tracks_acquires_and_releases() {
        let mut pool = PortPool::new(4);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.occupied_count(), 2);
        pool.release(a).unwrap();
        assert_eq!(pool.occupied_count(), 1);
    }

    #[test]
    fn port_registers_follow_the_device_stride() {
        let pool = PortPool::new(2);
        let p1 = pool.port(1);
        assert_eq!(p1.keyboard, 4);
        assert_eq!(p1.keyboard_status, 5);
        assert_eq!(p1.screen, 6);
        assert_eq!(p1.screen_status, 7);
    }
}
