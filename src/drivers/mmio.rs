//! 32-bit register access.
//!
//! The GPIO controller is only ever touched through aligned 32-bit reads and
//! writes, the equivalent of the kernel's `ioread32`/`iowrite32`. Each access
//! is individually atomic on the bus; anything wider (read-modify-write) must
//! be serialized by the caller.

use volatile::Volatile;

/// A block of 32-bit registers addressed by byte offset.
pub trait RegisterIo {
    /// Read the register at `offset` bytes from the block base.
    fn read32(&self, offset: usize) -> u32;

    /// Write the register at `offset` bytes from the block base.
    fn write32(&self, offset: usize, value: u32);
}

/// Memory-mapped register block reached through volatile accesses.
#[derive(Debug)]
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Wrap a mapped register block.
    ///
    /// # Safety
    ///
    /// `base` must be the virtual address of a live, 4-byte aligned mapping
    /// that stays valid for as long as this value (or anything derived from
    /// it) is used, and every offset passed to [`RegisterIo`] must fall
    /// inside that mapping.
    pub const unsafe fn new(base: usize) -> Self {
        Mmio { base }
    }

    #[inline]
    fn register(&self, offset: usize) -> *mut Volatile<u32> {
        (self.base + offset) as *mut Volatile<u32>
    }
}

impl RegisterIo for Mmio {
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: The constructor contract guarantees base + offset lies in a
        // live aligned mapping. Volatile read keeps the access on the bus.
        unsafe { (*self.register(offset)).read() }
    }

    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: Same mapping contract as read32. Volatile write is never
        // elided or merged with neighbouring accesses.
        unsafe { (*self.register(offset)).write(value) }
    }
}
