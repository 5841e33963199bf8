//! Device drivers subsystem
//!
//! - `mmio`: 32-bit register access to a mapped peripheral
//! - `gpio`: BCM2835 GPIO controller register map

pub mod gpio;
pub mod mmio;
