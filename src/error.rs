//! Error codes returned by the driver entry points.
//!
//! Every failure is surfaced synchronously to the calling system call. The
//! variants map one-to-one onto the kernel error numbers user space sees;
//! anything the kernel device model hands back that has no dedicated variant
//! is carried verbatim in [`Error::Os`].

use core::fmt;

/// Kernel error numbers used by the driver (asm-generic/errno-base.h).
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
}

/// Errors reported by the iopin driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bad configuration, ioctl value or opcode (EINVAL)
    InvalidArgument,

    /// Register mapping or allocation failed (ENOMEM)
    NoMemory,

    /// No device behind the requested major/minor, or an internal
    /// inode/cdev mismatch (ENODEV)
    NoDevice,

    /// Pin is owned by an alternate function, or its interrupt line could
    /// not be requested (EIO)
    Io,

    /// Pin is not configured as an output (EPERM)
    PermissionDenied,

    /// Resource already in use (EBUSY)
    Busy,

    /// Name or number already registered (EEXIST)
    Exists,

    /// Any other kernel error, as a positive errno value
    Os(i32),
}

impl Error {
    /// Negative return value handed back to the system call.
    pub fn to_errno(self) -> i32 {
        let code = match self {
            Error::InvalidArgument => errno::EINVAL,
            Error::NoMemory => errno::ENOMEM,
            Error::NoDevice => errno::ENODEV,
            Error::Io => errno::EIO,
            Error::PermissionDenied => errno::EPERM,
            Error::Busy => errno::EBUSY,
            Error::Exists => errno::EEXIST,
            Error::Os(code) => code,
        };
        -code
    }

    /// Build an error from a kernel return code. Accepts either sign.
    pub fn from_errno(code: i32) -> Self {
        match code.abs() {
            errno::EINVAL => Error::InvalidArgument,
            errno::ENOMEM => Error::NoMemory,
            errno::ENODEV => Error::NoDevice,
            errno::EIO => Error::Io,
            errno::EPERM => Error::PermissionDenied,
            errno::EBUSY => Error::Busy,
            errno::EEXIST => Error::Exists,
            other => Error::Os(other),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::NoMemory => write!(f, "Out of memory"),
            Error::NoDevice => write!(f, "No such device"),
            Error::Io => write!(f, "I/O error"),
            Error::PermissionDenied => write!(f, "Operation not permitted"),
            Error::Busy => write!(f, "Device or resource busy"),
            Error::Exists => write!(f, "File exists"),
            Error::Os(code) => write!(f, "Kernel error {}", code),
        }
    }
}

/// Result type used across the driver.
pub type Result<T> = core::result::Result<T, Error>;
