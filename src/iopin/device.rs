//! Per-pin device state.

use alloc::format;
use alloc::string::String;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::chrdev::{self, Cdev, DevT, Platform};
use crate::error::Result;
use crate::sync::WaitQueue;

/// One exported pin: `/dev/iopin<pin>` at minor `minor`.
///
/// The pending flag is a single event slot. The interrupt handler sets it,
/// `read` consumes it, and a second edge arriving in between is folded into
/// the first.
pub struct PinDevice {
    minor: u32,
    pin: u32,
    cdev: Cdev,
    opens: AtomicUsize,
    irq_pending: AtomicBool,
    irq_wait: WaitQueue,
}

/// Device node name for a pin.
pub fn node_name(pin: u32) -> String {
    format!("iopin{}", pin)
}

impl PinDevice {
    /// Register the cdev and `/dev` node for `pin` at `minor`.
    pub(crate) fn construct<P: Platform>(
        platform: &P,
        class: &P::Class,
        major: u32,
        minor: u32,
        pin: u32,
    ) -> Result<Self> {
        let devno = DevT::new(major, minor);
        let cdev = chrdev::construct_node(platform, class, devno, &node_name(pin))?;

        Ok(PinDevice {
            minor,
            pin,
            cdev,
            opens: AtomicUsize::new(0),
            irq_pending: AtomicBool::new(false),
            irq_wait: WaitQueue::new(),
        })
    }

    /// Remove the node and cdev again.
    pub(crate) fn destroy<P: Platform>(self, platform: &P, class: &P::Class) {
        chrdev::destroy_node(platform, class, self.cdev);
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn devno(&self) -> DevT {
        self.cdev.devno()
    }

    pub fn cdev(&self) -> &Cdev {
        &self.cdev
    }

    pub fn name(&self) -> String {
        node_name(self.pin)
    }

    /// Number of open files on this pin.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Acquire)
    }

    pub(crate) fn opened(&self) {
        self.opens.fetch_add(1, Ordering::AcqRel);
    }

    /// Account for a closed file. The last close drops every parked waiter,
    /// since no descriptor is left to deliver its event to.
    pub(crate) fn closed(&self) {
        let previous = self
            .opens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.irq_wait.clear();
        }
    }

    /// Whether an event arrived since the last read.
    pub fn is_pending(&self) -> bool {
        self.irq_pending.load(Ordering::Acquire)
    }

    /// Record an event and wake every poller.
    pub(crate) fn signal(&self) {
        self.irq_pending.store(true, Ordering::Release);
        self.irq_wait.wake_all();
    }

    /// Consume the pending event, if any.
    pub(crate) fn take_pending(&self) -> bool {
        self.irq_pending.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn wait_queue(&self) -> &WaitQueue {
        &self.irq_wait
    }
}
