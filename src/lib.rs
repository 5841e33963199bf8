//! iopin: Raspberry Pi GPIO pins as character devices
//!
//! The driver maps the BCM2835 GPIO controller once and exports each
//! configured pin as `/dev/iopin<pin>`. Kernel services (register mapping,
//! chrdev regions, classes, device nodes, interrupt lines, delays) are
//! consumed through [`chrdev::Platform`], so the same driver runs against
//! the kernel glue on target and against [`sim`] on a development host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod chrdev;
pub mod drivers;
pub mod dt;
pub mod error;
pub mod iopin;
pub mod skeleton;
pub mod sync;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use error::{Error, Result};
pub use iopin::{DriverConfig, IoPinModule, ModuleParams};
