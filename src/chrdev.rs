//! Character-device plumbing
//!
//! The kernel device model (region allocation, classes, cdevs, `/dev` nodes,
//! interrupt lines, register mapping, busy-wait delays) is consumed through
//! the [`Platform`] trait. Drivers in this crate never store anything the
//! platform hands out beyond opaque handles, and they only reference device
//! nodes by device number.

use alloc::vec::Vec;
use log::warn;

use crate::drivers::mmio::RegisterIo;
use crate::error::{Error, Result};

/// Bits of a device number used by the minor (MINORBITS).
const MINOR_BITS: u32 = 20;
const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;

/// Packed major/minor device number (`dev_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevT(u32);

impl DevT {
    /// MKDEV
    pub const fn new(major: u32, minor: u32) -> Self {
        DevT((major << MINOR_BITS) | (minor & MINOR_MASK))
    }

    pub const fn major(self) -> u32 {
        self.0 >> MINOR_BITS
    }

    pub const fn minor(self) -> u32 {
        self.0 & MINOR_MASK
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Inode of an opened device node.
///
/// `cdev` is the character device the VFS resolved for the node; the
/// drivers cross-check it against their own bookkeeping on open and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub rdev: DevT,
    pub cdev: DevT,
}

impl Inode {
    /// Inode as the VFS presents it for a node bound to its own cdev.
    pub const fn for_device(rdev: DevT) -> Self {
        Inode { rdev, cdev: rdev }
    }
}

/// A registered character device covering a single device number.
#[derive(Debug, PartialEq, Eq)]
pub struct Cdev {
    devno: DevT,
}

impl Cdev {
    pub fn devno(&self) -> DevT {
        self.devno
    }

    /// Whether an inode was resolved to this cdev.
    pub fn matches(&self, inode: &Inode) -> bool {
        inode.cdev == self.devno
    }
}

/// Kernel services a character-device driver is built on.
pub trait Platform {
    /// Register block returned by [`Platform::ioremap`].
    type Io: RegisterIo;

    /// Opaque device class handle.
    type Class;

    /// Map `size` bytes of physical address space. `None` when the mapping
    /// cannot be established.
    fn ioremap(&self, phys_addr: usize, size: usize) -> Option<Self::Io>;

    fn iounmap(&self, io: Self::Io);

    /// Allocate `count` consecutive minors starting at `first_minor` under a
    /// dynamically assigned major, returned on success.
    fn alloc_chrdev_region(&self, first_minor: u32, count: u32, name: &str) -> Result<u32>;

    fn unregister_chrdev_region(&self, first: DevT, count: u32);

    fn class_create(&self, name: &str) -> Result<Self::Class>;

    fn class_destroy(&self, class: Self::Class);

    /// Make a device number live, dispatching to the driver's file operations.
    fn cdev_add(&self, devno: DevT, count: u32) -> Result<()>;

    fn cdev_del(&self, devno: DevT);

    /// Create the visible `/dev/<name>` node.
    fn device_create(&self, class: &Self::Class, devno: DevT, name: &str) -> Result<()>;

    fn device_destroy(&self, class: &Self::Class, devno: DevT);

    /// Attach a handler, identified by `dev_id`, to a shared interrupt line.
    fn request_shared_irq(&self, irq: u32, name: &str, dev_id: u32) -> Result<()>;

    fn free_irq(&self, irq: u32, dev_id: u32);

    /// Busy-wait for at least `us` microseconds.
    fn udelay(&self, us: u32);

    /// Admit a driver allocation of `bytes` before it is made. A kernel
    /// build backs this with its allocation policy; by default the global
    /// allocator has the last word.
    fn alloc_check(&self, _bytes: usize) -> Result<()> {
        Ok(())
    }
}

/// Reserve room for `count` more entries in a driver-owned array.
///
/// Fails with `NoMemory` when the platform or the allocator refuses.
pub fn reserve_array<P: Platform, T>(platform: &P, array: &mut Vec<T>, count: usize) -> Result<()> {
    let bytes = count
        .checked_mul(core::mem::size_of::<T>())
        .ok_or(Error::NoMemory)?;
    platform.alloc_check(bytes).map_err(|_| Error::NoMemory)?;
    array.try_reserve_exact(count).map_err(|_| Error::NoMemory)
}

/// Register a cdev at `devno` and create its `/dev/<name>` node.
///
/// A failure while creating the node rolls back the cdev registration, so on
/// error nothing of this device is left registered.
pub fn construct_node<P: Platform>(
    platform: &P,
    class: &P::Class,
    devno: DevT,
    name: &str,
) -> Result<Cdev> {
    if let Err(e) = platform.cdev_add(devno, 1) {
        warn!("[chrdev] Error {} while trying to add {}", e.to_errno(), name);
        return Err(e);
    }

    if let Err(e) = platform.device_create(class, devno, name) {
        warn!(
            "[chrdev] Error {} while trying to create {}",
            e.to_errno(),
            name
        );
        platform.cdev_del(devno);
        return Err(e);
    }

    Ok(Cdev { devno })
}

/// Undo [`construct_node`]: remove the `/dev` node, then the cdev.
pub fn destroy_node<P: Platform>(platform: &P, class: &P::Class, cdev: Cdev) {
    platform.device_destroy(class, cdev.devno);
    platform.cdev_del(cdev.devno);
}
