//! Synchronization primitives for the iopin driver
//!
//! Register read-modify-write sequences are serialized by the GPIO bank's
//! spinlock (see `drivers::gpio`); this module provides the wait queue that
//! couples the interrupt handler to user-space pollers.

pub mod wait_queue;

pub use wait_queue::WaitQueue;
