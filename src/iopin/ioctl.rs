//! Ioctl command numbers and decoding.
//!
//! Commands follow the Linux `_IOW('G', nr, unsigned long)` encoding so a
//! user-space client can issue them with a plain `ioctl(2)`.

use core::ffi::c_ulong;
use core::mem::size_of;

use crate::drivers::gpio::{Function, Pull, Triggers};
use crate::error::{Error, Result};

/// Ioctl type tag of the driver.
pub const IOPIN_MAGIC: u8 = b'G';

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;
const IOC_WRITE: u32 = 1;

const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    (IOC_WRITE << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

/// Set the pin function: 0 input, 1 output.
pub const IOCTL_SET_FUNCTION: u32 = iow(IOPIN_MAGIC, 0, size_of::<c_ulong>());

/// Set the interrupt triggers: OR of the `INTERRUPTION_*` flags.
pub const IOCTL_SET_INTERRUPTION: u32 = iow(IOPIN_MAGIC, 1, size_of::<c_ulong>());

/// Set the pull resistor: one of the `PULL_*` values.
pub const IOCTL_SET_PULL: u32 = iow(IOPIN_MAGIC, 2, size_of::<c_ulong>());

pub const FUNCTION_INPUT: u32 = 0;
pub const FUNCTION_OUTPUT: u32 = 1;

pub const INTERRUPTION_RISING: u32 = Triggers::RISING.bits();
pub const INTERRUPTION_FALLING: u32 = Triggers::FALLING.bits();
pub const INTERRUPTION_HIGH: u32 = Triggers::HIGH.bits();
pub const INTERRUPTION_LOW: u32 = Triggers::LOW.bits();

pub const PULL_OFF: u32 = Pull::Off as u32;
pub const PULL_DOWN: u32 = Pull::Down as u32;
pub const PULL_UP: u32 = Pull::Up as u32;

/// A decoded, validated ioctl request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetFunction(Function),
    SetInterruption(Triggers),
    SetPull(Pull),
}

impl Command {
    /// Decode a command number and its argument.
    ///
    /// Unknown commands and out-of-range function or pull values are
    /// `InvalidArgument`. Trigger masks accept any bit pattern; bits beyond
    /// the four known flags are ignored.
    pub fn decode(cmd: u32, arg: usize) -> Result<Command> {
        let value = u32::try_from(arg).ok();

        match cmd {
            IOCTL_SET_FUNCTION => match value {
                Some(FUNCTION_INPUT) => Ok(Command::SetFunction(Function::Input)),
                Some(FUNCTION_OUTPUT) => Ok(Command::SetFunction(Function::Output)),
                _ => Err(Error::InvalidArgument),
            },
            IOCTL_SET_INTERRUPTION => Ok(Command::SetInterruption(Triggers::from_bits_truncate(
                arg as u32,
            ))),
            IOCTL_SET_PULL => value
                .and_then(Pull::from_raw)
                .map(Command::SetPull)
                .ok_or(Error::InvalidArgument),
            _ => Err(Error::InvalidArgument),
        }
    }
}
