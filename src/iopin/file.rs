//! File operations of `/dev/iopin<pin>`.

use bitflags::bitflags;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use log::{debug, info, warn};

use crate::chrdev::{Inode, Platform};
use crate::drivers::gpio::Function;
use crate::error::{Error, Result};

use super::device::PinDevice;
use super::ioctl::Command;
use super::IoPinModule;

bitflags! {
    /// Readiness reported by `poll`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollMask: u32 {
        /// POLLIN
        const IN = 0x0001;
        /// POLLRDNORM
        const RDNORM = 0x0040;
    }
}

/// An open file on a pin device. Returned by [`IoPinModule::open`] and
/// handed back to [`IoPinModule::release`].
#[must_use = "an open file holds an interrupt line until released"]
pub struct OpenFile<'a> {
    device: &'a PinDevice,
    irq: u32,
}

impl<'a> OpenFile<'a> {
    pub fn device(&self) -> &'a PinDevice {
        self.device
    }

    /// Interrupt line attached at open.
    pub fn irq(&self) -> u32 {
        self.irq
    }
}

impl<P: Platform> IoPinModule<P> {
    /// Open the device behind `inode`.
    ///
    /// Fails with `NoDevice` for a foreign or out-of-range device number and
    /// `Io` when the pin is driven by a peripheral function or its bank
    /// interrupt cannot be attached. All interrupt triggers of the pin start
    /// disabled.
    pub fn open(&self, inode: &Inode) -> Result<OpenFile<'_>> {
        let devno = inode.rdev;
        let device = match self.device(devno.minor()) {
            Some(device) if Some(devno.major()) == self.major() => device,
            _ => {
                warn!("[IOPin] No device {}:{}", devno.major(), devno.minor());
                return Err(Error::NoDevice);
            }
        };

        if !device.cdev().matches(inode) {
            warn!("[IOPin] Inode does not belong to {}", device.name());
            return Err(Error::NoDevice);
        }

        let gpio = self.gpio()?;
        let pin = device.pin();
        let function = gpio.function(pin);
        if !function.is_gpio() {
            warn!("[IOPin] GPIO{} is in use ({:?})", pin, function);
            return Err(Error::Io);
        }

        let irq = self.irq_line(device);
        let name = device.name();
        if let Err(e) = self.platform().request_shared_irq(irq, &name, device.minor()) {
            warn!(
                "[IOPin] Unable to request IRQ {} for {}: error {}",
                irq,
                name,
                e.to_errno()
            );
            return Err(Error::Io);
        }

        gpio.disable_triggers(pin);
        device.opened();

        debug!("[IOPin] Opened {}", name);
        Ok(OpenFile { device, irq })
    }

    /// Close a file: disable the pin's interrupts, return it to input and
    /// detach its interrupt handler.
    ///
    /// The file is torn down even when `inode` does not belong to its
    /// device; the mismatch is still reported as `NoDevice`.
    pub fn release(&self, inode: &Inode, file: OpenFile<'_>) -> Result<()> {
        let device = file.device;
        let matches = device.cdev().matches(inode);
        if !matches {
            warn!("[IOPin] Inode does not belong to {}", device.name());
        }

        if let Some(gpio) = self.gpio.as_ref() {
            gpio.disable_triggers(device.pin());
            gpio.set_function(device.pin(), Function::Input);
        }
        self.platform().free_irq(file.irq, device.minor());
        device.closed();

        if !matches {
            return Err(Error::NoDevice);
        }

        debug!("[IOPin] Released {}", device.name());
        Ok(())
    }

    /// Configure the pin. See [`super::ioctl`] for the commands.
    pub fn ioctl(&self, file: &OpenFile<'_>, cmd: u32, arg: usize) -> Result<()> {
        let command = Command::decode(cmd, arg)
            .inspect_err(|_| warn!("[IOPin] Invalid ioctl {:#x} ({:#x})", cmd, arg))?;

        let gpio = self.gpio()?;
        let pin = file.device.pin();
        match command {
            Command::SetFunction(function) => {
                gpio.set_function(pin, function);
                info!("[IOPin] GPIO{} set to {:?}", pin, function);
            }
            Command::SetInterruption(triggers) => {
                gpio.set_triggers(pin, triggers);
                debug!("[IOPin] GPIO{} triggers {:?}", pin, triggers);
            }
            Command::SetPull(pull) => {
                gpio.set_pull(pin, pull, |us| self.platform().udelay(us));
                debug!("[IOPin] GPIO{} pull {:?}", pin, pull);
            }
        }

        Ok(())
    }

    /// Read the pin level as `b'0'` or `b'1'` and consume the pending event.
    ///
    /// Returns the number of bytes produced: 0 for an empty buffer, 1
    /// otherwise. Never blocks.
    pub fn read(&self, file: &OpenFile<'_>, buf: &mut [u8]) -> Result<usize> {
        let Some(out) = buf.first_mut() else {
            return Ok(0);
        };

        let level = self.gpio()?.level(file.device.pin());
        *out = if level { b'1' } else { b'0' };
        file.device.take_pending();

        Ok(1)
    }

    /// Drive an output pin from the first byte of `buf`: `b'1'` high,
    /// anything else low.
    ///
    /// The whole buffer counts as written. Fails with `PermissionDenied`
    /// unless the pin is an output.
    pub fn write(&self, file: &OpenFile<'_>, buf: &[u8]) -> Result<usize> {
        let gpio = self.gpio()?;
        let pin = file.device.pin();
        if gpio.function(pin) != Function::Output {
            return Err(Error::PermissionDenied);
        }

        if let Some(&value) = buf.first() {
            gpio.write(pin, value == b'1');
        }

        Ok(buf.len())
    }

    /// Register the caller for wakeup on the next event and report whether
    /// one is already pending.
    pub fn poll(&self, file: &OpenFile<'_>, cx: &mut Context<'_>) -> PollMask {
        poll_device(file.device, cx.waker())
    }

    /// Resolve once an event is pending. The event is left for `read` to
    /// consume.
    ///
    /// Dropping the future before it resolves removes its waiter from the
    /// pin's queue.
    pub fn wait_event<'f>(&'f self, file: &'f OpenFile<'_>) -> EventWait<'f> {
        EventWait {
            device: file.device,
            waker: None,
        }
    }
}

fn poll_device(device: &PinDevice, waker: &Waker) -> PollMask {
    device.wait_queue().register(waker);

    if device.is_pending() {
        PollMask::IN | PollMask::RDNORM
    } else {
        PollMask::empty()
    }
}

/// Future returned by [`IoPinModule::wait_event`].
#[must_use = "futures do nothing unless polled"]
pub struct EventWait<'f> {
    device: &'f PinDevice,
    waker: Option<Waker>,
}

impl EventWait<'_> {
    fn forget_waker(&mut self) {
        if let Some(waker) = self.waker.take() {
            self.device.wait_queue().unregister(&waker);
        }
    }
}

impl Future for EventWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        // A task that moved to a new waker leaves its old entry behind
        let moved = this
            .waker
            .as_ref()
            .is_some_and(|old| !old.will_wake(cx.waker()));
        if moved {
            this.forget_waker();
        }

        if poll_device(this.device, cx.waker()).contains(PollMask::IN) {
            this.device.wait_queue().unregister(cx.waker());
            this.waker = None;
            Poll::Ready(())
        } else {
            this.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl Drop for EventWait<'_> {
    fn drop(&mut self) {
        self.forget_waker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chrdev::DevT;
    use crate::drivers::gpio::{offsets, Pull, Triggers, PULL_SETUP_DELAY_US};
    use crate::drivers::mmio::RegisterIo;
    use crate::iopin::ioctl::*;
    use crate::iopin::{DriverConfig, IrqReturn};
    use crate::sim::{SimulatedGpio, SimulatedPlatform};
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::pin::pin;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use core::task::Waker;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        module: IoPinModule<SimulatedPlatform>,
        platform: SimulatedPlatform,
        gpio: SimulatedGpio,
    }

    impl Fixture {
        fn new(pins: Vec<u32>) -> Self {
            let platform = SimulatedPlatform::new();
            let module = IoPinModule::init(platform.clone(), DriverConfig::new(pins)).unwrap();
            let gpio = platform.gpio();
            Fixture {
                module,
                platform,
                gpio,
            }
        }

        fn inode(&self, minor: u32) -> Inode {
            Inode::for_device(DevT::new(SimulatedPlatform::FIRST_MAJOR, minor))
        }

        /// Deliver a bank interrupt to every handler attached to its line.
        fn raise_irq(&self, irq: u32) -> Vec<IrqReturn> {
            self.platform
                .irq_handlers(irq)
                .into_iter()
                .map(|dev_id| self.module.handle_irq(irq, dev_id))
                .collect()
        }
    }

    fn read_byte(module: &IoPinModule<SimulatedPlatform>, file: &OpenFile<'_>) -> u8 {
        let mut buf = [0u8; 4];
        assert_eq!(module.read(file, &mut buf), Ok(1));
        buf[0]
    }

    #[test]
    fn test_open_attaches_bank_irq_and_disables_triggers() {
        let fx = Fixture::new(vec![4, 40]);
        fx.gpio.write32(offsets::GPREN0, 1 << 4);
        fx.gpio.write32(offsets::GPLEN0 + 4, 1 << 8);

        let low = fx.module.open(&fx.inode(0)).unwrap();
        let high = fx.module.open(&fx.inode(1)).unwrap();

        assert_eq!(low.irq(), 49);
        assert_eq!(high.irq(), 50);
        assert_eq!(fx.platform.irq_handlers(49), [0]);
        assert_eq!(fx.platform.irq_handlers(50), [1]);
        for offset in [offsets::GPREN0, offsets::GPFEN0, offsets::GPHEN0, offsets::GPLEN0] {
            assert_eq!(fx.gpio.register(offset), 0);
            assert_eq!(fx.gpio.register(offset + 4), 0);
        }

        fx.module.release(&fx.inode(0), low).unwrap();
        fx.module.release(&fx.inode(1), high).unwrap();
        assert!(fx.platform.irq_handlers(49).is_empty());
        assert!(fx.platform.irq_handlers(50).is_empty());
    }

    #[test]
    fn test_open_out_of_range_minor() {
        let fx = Fixture::new(vec![4, 17]);
        assert!(matches!(fx.module.open(&fx.inode(2)), Err(Error::NoDevice)));
    }

    #[test]
    fn test_open_foreign_major() {
        let fx = Fixture::new(vec![4]);
        let inode = Inode::for_device(DevT::new(SimulatedPlatform::FIRST_MAJOR + 1, 0));
        assert!(matches!(fx.module.open(&inode), Err(Error::NoDevice)));
    }

    #[test]
    fn test_open_inode_bound_to_other_cdev() {
        let fx = Fixture::new(vec![4, 17]);
        let inode = Inode {
            rdev: DevT::new(SimulatedPlatform::FIRST_MAJOR, 0),
            cdev: DevT::new(SimulatedPlatform::FIRST_MAJOR, 1),
        };
        assert!(matches!(fx.module.open(&inode), Err(Error::NoDevice)));
        assert!(fx.platform.irq_handlers(49).is_empty());
    }

    #[test]
    fn test_open_pin_owned_by_peripheral() {
        let fx = Fixture::new(vec![14]);
        fx.gpio.set_raw_function(14, Function::Alt0);

        assert!(matches!(fx.module.open(&fx.inode(0)), Err(Error::Io)));
        assert!(fx.platform.irq_handlers(49).is_empty());
    }

    #[test]
    fn test_open_irq_request_failure() {
        let fx = Fixture::new(vec![4]);
        fx.platform.fail_request_irq(Error::Busy);
        assert!(matches!(fx.module.open(&fx.inode(0)), Err(Error::Io)));
    }

    #[test]
    fn test_release_restores_input_and_frees_irq() {
        let fx = Fixture::new(vec![17]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module.ioctl(&file, IOCTL_SET_FUNCTION, 1).unwrap();
        fx.module
            .ioctl(&file, IOCTL_SET_INTERRUPTION, INTERRUPTION_RISING as usize)
            .unwrap();

        fx.module.release(&fx.inode(0), file).unwrap();

        assert_eq!(fx.gpio.register(offsets::GPFSEL0 + 4), 0);
        assert_eq!(fx.gpio.register(offsets::GPREN0), 0);
        assert!(fx.platform.irq_handlers(49).is_empty());
    }

    #[test]
    fn test_release_with_mismatched_inode() {
        let Fixture {
            module,
            platform,
            gpio,
        } = Fixture::new(vec![4, 17]);
        let inode = |minor| Inode::for_device(DevT::new(SimulatedPlatform::FIRST_MAJOR, minor));

        let file = module.open(&inode(0)).unwrap();
        module.ioctl(&file, IOCTL_SET_FUNCTION, 1).unwrap();
        module
            .ioctl(&file, IOCTL_SET_INTERRUPTION, INTERRUPTION_RISING as usize)
            .unwrap();

        assert_eq!(module.release(&inode(1), file), Err(Error::NoDevice));
        assert!(platform.irq_handlers(49).is_empty());
        assert_eq!(gpio.register(offsets::GPFSEL0), 0);
        assert_eq!(gpio.register(offsets::GPREN0), 0);
        assert_eq!(module.devices()[0].open_count(), 0);

        drop(module);
        assert!(platform.is_clean());
    }

    #[test]
    fn test_release_drops_parked_waiters() {
        let fx = Fixture::new(vec![4]);

        for _ in 0..3 {
            let file = fx.module.open(&fx.inode(0)).unwrap();
            let counters: Vec<_> = (0..100)
                .map(|_| Arc::new(CountingWaker(AtomicUsize::new(0))))
                .collect();
            for counter in &counters {
                let waker = Waker::from(counter.clone());
                let mut cx = Context::from_waker(&waker);
                assert_eq!(fx.module.poll(&file, &mut cx), PollMask::empty());
            }
            assert_eq!(file.device().wait_queue().len(), 100);

            fx.module.release(&fx.inode(0), file).unwrap();
            assert!(fx.module.devices()[0].wait_queue().is_empty());
        }
    }

    #[test]
    fn test_waiters_survive_until_last_close() {
        let fx = Fixture::new(vec![4]);
        let first = fx.module.open(&fx.inode(0)).unwrap();
        let second = fx.module.open(&fx.inode(0)).unwrap();

        let waker = Waker::from(Arc::new(CountingWaker(AtomicUsize::new(0))));
        let mut cx = Context::from_waker(&waker);
        fx.module.poll(&second, &mut cx);

        fx.module.release(&fx.inode(0), first).unwrap();
        assert_eq!(second.device().wait_queue().len(), 1);
        fx.module.release(&fx.inode(0), second).unwrap();
        assert!(fx.module.devices()[0].wait_queue().is_empty());
    }

    #[test]
    fn test_two_opens_of_one_pin() {
        let fx = Fixture::new(vec![4]);
        let first = fx.module.open(&fx.inode(0)).unwrap();
        let second = fx.module.open(&fx.inode(0)).unwrap();
        assert_eq!(fx.platform.irq_handlers(49), [0, 0]);

        fx.module.release(&fx.inode(0), first).unwrap();
        assert_eq!(fx.platform.irq_handlers(49), [0]);
        fx.module.release(&fx.inode(0), second).unwrap();
    }

    #[test]
    fn test_output_write_then_read() {
        let fx = Fixture::new(vec![17]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module.ioctl(&file, IOCTL_SET_FUNCTION, 1).unwrap();

        assert_eq!(fx.module.write(&file, b"1"), Ok(1));
        assert_eq!(read_byte(&fx.module, &file), b'1');
        assert_eq!(fx.gpio.register(offsets::GPLEV0), 1 << 17);

        let values: [&[u8]; 4] = [b"0", b"x", b"10", b"\x01"];
        for value in values {
            fx.module.write(&file, b"1").unwrap();
            assert_eq!(fx.module.write(&file, value), Ok(value.len()));
            let expected = if value[0] == b'1' { b'1' } else { b'0' };
            assert_eq!(read_byte(&fx.module, &file), expected);
        }

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_write_only_consults_first_byte() {
        let fx = Fixture::new(vec![17]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module.ioctl(&file, IOCTL_SET_FUNCTION, 1).unwrap();

        assert_eq!(fx.module.write(&file, b"1000"), Ok(4));
        assert_eq!(read_byte(&fx.module, &file), b'1');
        assert_eq!(fx.module.write(&file, b""), Ok(0));
        assert_eq!(read_byte(&fx.module, &file), b'1');

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_write_to_input_is_denied() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();

        let values: [&[u8]; 3] = [b"1", b"0", b""];
        for value in values {
            assert_eq!(fx.module.write(&file, value), Err(Error::PermissionDenied));
        }
        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_read_input_level() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();

        assert_eq!(read_byte(&fx.module, &file), b'0');
        fx.gpio.drive_input(4, true);
        assert_eq!(read_byte(&fx.module, &file), b'1');
        assert_eq!(fx.module.read(&file, &mut []), Ok(0));

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_set_function_rejects_invalid_value() {
        let fx = Fixture::new(vec![17]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module.ioctl(&file, IOCTL_SET_FUNCTION, 1).unwrap();
        let before = fx.gpio.register(offsets::GPFSEL0 + 4);

        for value in [2, 4, 7, usize::MAX] {
            assert_eq!(
                fx.module.ioctl(&file, IOCTL_SET_FUNCTION, value),
                Err(Error::InvalidArgument)
            );
            assert_eq!(fx.gpio.register(offsets::GPFSEL0 + 4), before);
        }

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_set_interruption_writes_four_enables() {
        let fx = Fixture::new(vec![4, 5]);
        let a = fx.module.open(&fx.inode(0)).unwrap();
        let b = fx.module.open(&fx.inode(1)).unwrap();

        fx.module
            .ioctl(&a, IOCTL_SET_INTERRUPTION, (INTERRUPTION_RISING | INTERRUPTION_HIGH) as usize)
            .unwrap();
        fx.module
            .ioctl(&b, IOCTL_SET_INTERRUPTION, (INTERRUPTION_RISING | INTERRUPTION_LOW) as usize)
            .unwrap();

        assert_eq!(fx.gpio.register(offsets::GPREN0), (1 << 4) | (1 << 5));
        assert_eq!(fx.gpio.register(offsets::GPFEN0), 0);
        assert_eq!(fx.gpio.register(offsets::GPHEN0), 1 << 4);
        assert_eq!(fx.gpio.register(offsets::GPLEN0), 1 << 5);

        fx.module.ioctl(&a, IOCTL_SET_INTERRUPTION, 0).unwrap();
        assert_eq!(fx.gpio.register(offsets::GPREN0), 1 << 5);
        assert_eq!(fx.gpio.register(offsets::GPHEN0), 0);

        fx.module.release(&fx.inode(0), a).unwrap();
        fx.module.release(&fx.inode(1), b).unwrap();
    }

    #[test]
    fn test_set_pull_sequence() {
        let fx = Fixture::new(vec![33]);
        let file = fx.module.open(&fx.inode(0)).unwrap();

        fx.module.ioctl(&file, IOCTL_SET_PULL, PULL_DOWN as usize).unwrap();
        assert_eq!(fx.gpio.pull(33), Some(Pull::Down));
        assert_eq!(fx.platform.delays(), [PULL_SETUP_DELAY_US, PULL_SETUP_DELAY_US]);
        assert_eq!(fx.gpio.register(offsets::GPPUD), 0);
        assert_eq!(fx.gpio.register(offsets::GPPUDCLK0 + 4), 0);

        fx.module.ioctl(&file, IOCTL_SET_PULL, PULL_OFF as usize).unwrap();
        assert_eq!(fx.gpio.pull(33), Some(Pull::Off));

        for value in [3, 10, usize::MAX] {
            assert_eq!(
                fx.module.ioctl(&file, IOCTL_SET_PULL, value),
                Err(Error::InvalidArgument)
            );
        }
        assert_eq!(fx.gpio.pull(33), Some(Pull::Off));

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_unknown_ioctl() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        assert_eq!(fx.module.ioctl(&file, 0x1234, 0), Err(Error::InvalidArgument));
        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_edge_sets_poll_ready_until_read() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module
            .ioctl(&file, IOCTL_SET_INTERRUPTION, INTERRUPTION_RISING as usize)
            .unwrap();

        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        assert_eq!(fx.module.poll(&file, &mut cx), PollMask::empty());

        fx.gpio.drive_input(4, true);
        assert_eq!(fx.raise_irq(49), [IrqReturn::Handled]);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(fx.gpio.register(offsets::GPEDS0), 0);

        assert_eq!(fx.module.poll(&file, &mut cx), PollMask::IN | PollMask::RDNORM);
        assert_eq!(read_byte(&fx.module, &file), b'1');
        assert_eq!(fx.module.poll(&file, &mut cx), PollMask::empty());

        // No new edge while the level stays high
        assert_eq!(fx.raise_irq(49), [IrqReturn::None]);
        assert_eq!(fx.module.poll(&file, &mut cx), PollMask::empty());

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_events_coalesce_before_read() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module
            .ioctl(
                &file,
                IOCTL_SET_INTERRUPTION,
                (INTERRUPTION_RISING | INTERRUPTION_FALLING) as usize,
            )
            .unwrap();

        fx.gpio.drive_input(4, true);
        fx.raise_irq(49);
        fx.gpio.drive_input(4, false);
        fx.raise_irq(49);

        assert_eq!(read_byte(&fx.module, &file), b'0');
        assert!(!fx.module.devices()[0].is_pending());

        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_shared_line_only_wakes_owner() {
        let fx = Fixture::new(vec![4, 5]);
        let a = fx.module.open(&fx.inode(0)).unwrap();
        let b = fx.module.open(&fx.inode(1)).unwrap();
        fx.module
            .ioctl(&b, IOCTL_SET_INTERRUPTION, INTERRUPTION_FALLING as usize)
            .unwrap();

        fx.gpio.drive_input(5, true);
        fx.gpio.drive_input(5, false);
        assert_eq!(fx.raise_irq(49), [IrqReturn::None, IrqReturn::Handled]);
        assert!(!a.device().is_pending());
        assert!(b.device().is_pending());

        fx.module.release(&fx.inode(0), a).unwrap();
        fx.module.release(&fx.inode(1), b).unwrap();
    }

    #[test]
    fn test_wait_event_resolves_after_irq() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module
            .ioctl(&file, IOCTL_SET_INTERRUPTION, INTERRUPTION_HIGH as usize)
            .unwrap();

        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);
        {
            let mut wait = pin!(fx.module.wait_event(&file));

            assert_eq!(wait.as_mut().poll(&mut cx), Poll::Pending);
            assert_eq!(file.device().wait_queue().len(), 1);

            fx.gpio.drive_input(4, true);
            fx.raise_irq(49);
            assert_eq!(counter.0.load(Ordering::SeqCst), 1);
            assert_eq!(wait.as_mut().poll(&mut cx), Poll::Ready(()));
        }

        // The event is still there for read
        assert!(file.device().wait_queue().is_empty());
        assert_eq!(read_byte(&fx.module, &file), b'1');
        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_abandoned_wait_leaves_no_waiter() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();

        for _ in 0..10 {
            let mut wait = pin!(fx.module.wait_event(&file));
            // A fresh waker on every poll, as a task migrating between executors
            for _ in 0..5 {
                let waker = Waker::from(Arc::new(CountingWaker(AtomicUsize::new(0))));
                let mut cx = Context::from_waker(&waker);
                assert_eq!(wait.as_mut().poll(&mut cx), Poll::Pending);
                assert_eq!(file.device().wait_queue().len(), 1);
            }
        }

        assert!(file.device().wait_queue().is_empty());
        fx.module.release(&fx.inode(0), file).unwrap();
    }

    #[test]
    fn test_triggers_for_level_detection() {
        let fx = Fixture::new(vec![4]);
        let file = fx.module.open(&fx.inode(0)).unwrap();
        fx.module
            .ioctl(&file, IOCTL_SET_INTERRUPTION, INTERRUPTION_LOW as usize)
            .unwrap();

        assert_eq!(
            crate::drivers::gpio::GpioBank::new(fx.gpio.clone()).triggers(4),
            Triggers::LOW
        );
        fx.module.release(&fx.inode(0), file).unwrap();
    }
}
