//! Module parameters and driver configuration.

use alloc::vec::Vec;
use log::{debug, info, warn};

use crate::drivers::gpio::NUM_GPIOS;
use crate::dt::{bus_to_physical, HardwareInfo, GPIO_COMPATIBLE};
use crate::error::{Error, Result};

/// Capacity of the `pins` parameter array.
pub const MAX_PINS: usize = 40;

/// BCM2835 (Raspberry Pi 1) peripheral window, ARM physical address.
pub const DEFAULT_PERIPHERAL_BASE: usize = 0x2000_0000;

/// BCM2835 GPIO controller, ARM physical address.
pub const DEFAULT_GPIO_BASE: usize = DEFAULT_PERIPHERAL_BASE + 0x0020_0000;

/// IRQ of gpio_int[0]; bank N raises `IRQ_GPIO_0 + N`.
pub const IRQ_GPIO_0: u32 = 49;

/// Parse an unsigned module parameter value, decimal or `0x` hexadecimal.
pub(crate) fn parse_number(value: &str) -> Result<u32> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|_| Error::InvalidArgument)
}

/// Split a module argument string into `key=value` pairs.
pub(crate) fn parameters(args: &str) -> impl Iterator<Item = (&str, &str)> {
    args.split_whitespace()
        .map(|arg| arg.split_once('=').unwrap_or((arg, "")))
}

/// Parameters given on module load, e.g. `pins=17,27,22`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleParams {
    /// Pins to export, one device per entry, in minor-number order
    pub pins: Vec<u32>,
}

impl ModuleParams {
    /// Parse a module argument string.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown parameter, a malformed number or
    /// more than [`MAX_PINS`] entries.
    pub fn parse(args: &str) -> Result<Self> {
        let mut params = ModuleParams::default();

        for (key, value) in parameters(args) {
            match key {
                "pins" => {
                    params.pins = value
                        .split(',')
                        .filter(|entry| !entry.trim().is_empty())
                        .map(parse_number)
                        .collect::<Result<Vec<u32>>>()?;
                    if params.pins.len() > MAX_PINS {
                        warn!("[IOPin] Too many pins: {} (max {})", params.pins.len(), MAX_PINS);
                        return Err(Error::InvalidArgument);
                    }
                }
                _ => {
                    warn!("[IOPin] Unknown parameter '{}'", key);
                    return Err(Error::InvalidArgument);
                }
            }
        }

        Ok(params)
    }
}

/// Everything the driver needs to know at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Exported pins; index is the minor number
    pub pins: Vec<u32>,
    /// Physical address of the GPIO register block
    pub gpio_phys_base: usize,
    /// Interrupt line of the first 32-pin bank
    pub irq_base: u32,
}

impl DriverConfig {
    /// BCM2835 defaults for the given pins.
    pub fn new(pins: Vec<u32>) -> Self {
        DriverConfig {
            pins,
            gpio_phys_base: DEFAULT_GPIO_BASE,
            irq_base: IRQ_GPIO_0,
        }
    }

    /// Locate the GPIO controller in a device tree instead of using the
    /// BCM2835 defaults. The register base comes from `reg` and the bank
    /// interrupt base from the first `interrupts` specifier; either is left
    /// untouched when the tree does not provide it.
    pub fn with_device_tree(mut self, hw: &HardwareInfo<'_>, peripheral_base: usize) -> Self {
        let Some(node) = hw.find_device(GPIO_COMPATIBLE) else {
            warn!(
                "[IOPin] No '{}' node in device tree, using {:#x}",
                GPIO_COMPATIBLE, self.gpio_phys_base
            );
            return self;
        };

        match node.base_address() {
            Some(bus_addr) => {
                self.gpio_phys_base = bus_to_physical(bus_addr, peripheral_base);
                info!("[IOPin] {} at {:#x}", node.name(), self.gpio_phys_base);
            }
            None => warn!(
                "[IOPin] {} has no usable reg, using {:#x}",
                node.name(),
                self.gpio_phys_base
            ),
        }

        if let Some(irq) = node.first_irq() {
            self.irq_base = irq;
            debug!("[IOPin] {} bank 0 on IRQ {}", node.name(), irq);
        }

        self
    }

    /// Number of devices to create.
    pub fn device_count(&self) -> usize {
        self.pins.len()
    }

    /// Interrupt line shared by the 32-pin bank that contains `pin`.
    pub fn bank_irq(&self, pin: u32) -> u32 {
        self.irq_base + pin / 32
    }

    /// Check the pin list before any resource is acquired.
    pub fn validate(&self) -> Result<()> {
        if self.pins.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if self.pins.len() > MAX_PINS {
            return Err(Error::InvalidArgument);
        }
        if let Some(pin) = self.pins.iter().find(|pin| **pin >= NUM_GPIOS) {
            warn!("[IOPin] GPIO{} does not exist (max {})", pin, NUM_GPIOS - 1);
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

impl From<ModuleParams> for DriverConfig {
    fn from(params: ModuleParams) -> Self {
        DriverConfig::new(params.pins)
    }
}
