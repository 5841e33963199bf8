//! IOPin: Raspberry Pi GPIO pins as character devices
//!
//! Every pin named in the `pins` parameter becomes `/dev/iopin<pin>`, with
//! the position in the list as minor number. A file opened on such a node
//! can:
//!
//! - switch the pin between input and output (`ioctl`)
//! - select the pull resistor (`ioctl`)
//! - enable rising/falling edge and high/low level interrupts (`ioctl`)
//! - read the level as an ASCII `'0'`/`'1'` byte (`read`)
//! - drive an output pin (`write`)
//! - wait for an interrupt event (`poll`)
//!
//! [`IoPinModule`] is the module context. It owns the mapped register bank,
//! the device array and every kernel registration, and is passed explicitly
//! to each operation.
//!
//! # Lifecycle
//!
//! Resources are acquired in this order and released in the reverse one,
//! both on unload and when loading fails halfway:
//!
//! 1. GPIO register mapping
//! 2. device array
//! 3. character device region
//! 4. device class
//! 5. one cdev and `/dev` node per pin

pub mod config;
pub mod device;
pub mod file;
pub mod ioctl;
pub mod irq;

use alloc::vec::Vec;
use log::{debug, error, info, warn};

use crate::chrdev::{self, DevT, Platform};
use crate::drivers::gpio::{GpioBank, REGISTER_MAP_SIZE};
use crate::error::{Error, Result};

pub use config::{DriverConfig, ModuleParams};
pub use device::PinDevice;
pub use file::{EventWait, OpenFile, PollMask};
pub use ioctl::Command;
pub use irq::IrqReturn;

/// Name of the chrdev region and the device class.
pub const DRIVER_NAME: &str = "iopin";

/// Loaded driver instance.
pub struct IoPinModule<P: Platform> {
    platform: P,
    config: DriverConfig,
    gpio: Option<GpioBank<P::Io>>,
    devices: Vec<PinDevice>,
    region: Option<(DevT, u32)>,
    class: Option<P::Class>,
}

impl<P: Platform> IoPinModule<P> {
    /// Load the driver: map the GPIO controller and create one device per
    /// configured pin.
    ///
    /// On error, everything acquired so far has been released again.
    pub fn init(platform: P, config: DriverConfig) -> Result<Self> {
        info!("[IOPin] Loading driver for {} pin(s)", config.device_count());

        if config.pins.is_empty() {
            error!("[IOPin] No pin specified");
            return Err(Error::InvalidArgument);
        }
        config.validate()?;

        let mut module = IoPinModule {
            platform,
            config,
            gpio: None,
            devices: Vec::new(),
            region: None,
            class: None,
        };

        if let Err(e) = module.acquire() {
            error!("[IOPin] Load failed with error {}", e.to_errno());
            module.teardown();
            return Err(e);
        }

        info!(
            "[IOPin] Loaded, major {}, pins {:?}",
            module.major().unwrap_or(0),
            module.config.pins
        );
        Ok(module)
    }

    fn acquire(&mut self) -> Result<()> {
        let count = self.config.device_count();

        let io = self
            .platform
            .ioremap(self.config.gpio_phys_base, REGISTER_MAP_SIZE)
            .ok_or_else(|| {
                warn!(
                    "[IOPin] Unable to map GPIO registers at {:#x}",
                    self.config.gpio_phys_base
                );
                Error::NoMemory
            })?;
        self.gpio = Some(GpioBank::new(io));

        chrdev::reserve_array(&self.platform, &mut self.devices, count).inspect_err(|_| {
            warn!("[IOPin] Unable to allocate {} devices", count);
        })?;

        let count = count as u32;
        let major = self.platform.alloc_chrdev_region(0, count, DRIVER_NAME)?;
        self.region = Some((DevT::new(major, 0), count));

        self.class = Some(self.platform.class_create(DRIVER_NAME)?);

        for (minor, pin) in self.config.pins.iter().copied().enumerate() {
            let Some(class) = self.class.as_ref() else {
                return Err(Error::NoDevice);
            };
            let device = PinDevice::construct(&self.platform, class, major, minor as u32, pin)?;
            debug!("[IOPin] Created {} at {}:{}", device.name(), major, minor);
            self.devices.push(device);
        }

        Ok(())
    }

    /// Release whatever is held, newest first. Safe to call repeatedly and
    /// on a partially loaded module.
    fn teardown(&mut self) {
        if let Some(class) = self.class.as_ref() {
            while let Some(device) = self.devices.pop() {
                device.destroy(&self.platform, class);
            }
        }
        self.devices = Vec::new();

        if let Some(class) = self.class.take() {
            self.platform.class_destroy(class);
        }

        if let Some((first, count)) = self.region.take() {
            self.platform.unregister_chrdev_region(first, count);
        }

        if let Some(gpio) = self.gpio.take() {
            self.platform.iounmap(gpio.into_inner());
        }
    }

    /// Unload the driver.
    pub fn exit(mut self) {
        info!("[IOPin] Unloading");
        self.teardown();
    }

    /// Interrupt handler attached to a bank line by [`IoPinModule::open`].
    ///
    /// `dev_id` is the minor number of the device that attached it.
    pub fn handle_irq(&self, irq: u32, dev_id: u32) -> IrqReturn {
        let (Some(gpio), Some(device)) = (self.gpio.as_ref(), self.devices.get(dev_id as usize))
        else {
            return IrqReturn::None;
        };

        let ret = irq::handle_pin_event(gpio, device);
        if ret == IrqReturn::Handled {
            debug!("[IOPin] IRQ {} event on GPIO{}", irq, device.pin());
        }
        ret
    }

    /// Major number assigned at load time.
    pub fn major(&self) -> Option<u32> {
        self.region.map(|(first, _)| first.major())
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn devices(&self) -> &[PinDevice] {
        &self.devices
    }

    pub fn device(&self, minor: u32) -> Option<&PinDevice> {
        self.devices.get(minor as usize)
    }

    /// Interrupt line serving a device's bank.
    pub fn irq_line(&self, device: &PinDevice) -> u32 {
        self.config.bank_irq(device.pin())
    }

    fn gpio(&self) -> Result<&GpioBank<P::Io>> {
        self.gpio.as_ref().ok_or(Error::NoDevice)
    }
}

impl<P: Platform> Drop for IoPinModule<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
