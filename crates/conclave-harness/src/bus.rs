//! In-memory multicast bus.
//!
//! Publishes append to a single FIFO of in-flight frames; the cluster drains
//! it and hands every frame to every participant, sender included, matching
//! the loopback behavior of a real multicast transport. Tests reorder, drop
//! or rewrite the queue between deliveries.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use conclave_core::{Transport, TransportError};

/// A published frame waiting for delivery.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Pub/sub channel the frame was published on.
    pub channel: String,
    /// Raw frame bytes.
    pub bytes: Vec<u8>,
}

/// Shared FIFO of in-flight frames.
#[derive(Default)]
pub struct Bus {
    queue: RefCell<VecDeque<InFlight>>,
}

impl Bus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of frames awaiting delivery.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Pop the next frame in FIFO order.
    #[must_use]
    pub fn pop(&self) -> Option<InFlight> {
        self.queue.borrow_mut().pop_front()
    }

    /// Mutate the in-flight queue: reorder, drop, tamper, inject.
    pub fn with_pending(&self, f: impl FnOnce(&mut VecDeque<InFlight>)) {
        f(&mut self.queue.borrow_mut());
    }

    fn push(&self, frame: InFlight) {
        self.queue.borrow_mut().push_back(frame);
    }
}

/// Per-participant [`Transport`] handle onto the shared bus.
pub struct BusTransport {
    bus: Rc<Bus>,
}

impl BusTransport {
    /// Create a handle publishing onto `bus`.
    #[must_use]
    pub fn new(bus: Rc<Bus>) -> Self {
        Self { bus }
    }
}

impl Transport for BusTransport {
    fn publish(&self, channel: &str, frame: &[u8]) -> Result<(), TransportError> {
        self.bus.push(InFlight { channel: channel.to_owned(), bytes: frame.to_vec() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_queue_in_fifo_order() {
        let bus = Bus::new();
        let transport = BusTransport::new(Rc::clone(&bus));
        transport.publish("lcm://a", &[1]).unwrap();
        transport.publish("lcm://b", &[2]).unwrap();

        assert_eq!(bus.pending(), 2);
        assert_eq!(bus.pop().unwrap().channel, "lcm://a");
        assert_eq!(bus.pop().unwrap().bytes, vec![2]);
        assert!(bus.pop().is_none());
    }

    #[test]
    fn with_pending_can_reorder() {
        let bus = Bus::new();
        let transport = BusTransport::new(Rc::clone(&bus));
        transport.publish("lcm://a", &[1]).unwrap();
        transport.publish("lcm://a", &[2]).unwrap();

        bus.with_pending(|queue| queue.swap(0, 1));
        assert_eq!(bus.pop().unwrap().bytes, vec![2]);
        assert_eq!(bus.pop().unwrap().bytes, vec![1]);
    }
}
