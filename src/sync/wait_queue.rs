//! Wait queue for interrupt-driven wakeups
//!
//! `poll` parks the caller's [`Waker`] here; the interrupt handler wakes
//! every parked waiter once the pin's pending flag is set. Like the kernel's
//! `wait_queue_head_t`, a wakeup empties the queue: a waiter that still wants
//! events registers again on its next poll. A waiter that gives up (its call
//! was interrupted or its descriptor closed) is removed with
//! [`WaitQueue::unregister`] or [`WaitQueue::clear`].

use alloc::vec::Vec;
use core::task::Waker;
use spin::Mutex;

/// Queue of tasks blocked on a pin event.
pub struct WaitQueue {
    waiters: Mutex<Vec<Waker>>,
}

impl WaitQueue {
    /// Create an empty wait queue.
    pub const fn new() -> Self {
        WaitQueue {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Park a waiter. Registering the same task twice keeps a single entry.
    pub fn register(&self, waker: &Waker) {
        let mut waiters = self.waiters.lock();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    /// Remove a parked waiter without waking it.
    pub fn unregister(&self, waker: &Waker) {
        self.waiters.lock().retain(|w| !w.will_wake(waker));
    }

    /// Drop every parked waiter without waking it.
    pub fn clear(&self) {
        // Wakers are dropped outside the lock
        let waiters = core::mem::take(&mut *self.waiters.lock());
        drop(waiters);
    }

    /// Wake and remove every parked waiter. Returns how many were woken.
    pub fn wake_all(&self) -> usize {
        // Take the list first so no waker runs under the lock
        let waiters = core::mem::take(&mut *self.waiters.lock());
        let count = waiters.len();
        for waker in waiters {
            waker.wake();
        }
        count
    }

    /// Number of parked waiters.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
