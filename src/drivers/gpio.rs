//! BCM2835 GPIO register map.
//!
//! Describes the memory-mapped GPIO controller of the Raspberry Pi SoC and
//! the bit-packing needed to address a single pin inside it:
//!
//! - 3-bit function-select fields: register `pin / 10`, bit `(pin % 10) * 3`
//! - 1-bit fields (set, clear, level, events, enables, pull clock):
//!   register `pin / 32`, bit `pin % 32`
//!
//! All pins of the bank share these registers, so every read-modify-write
//! goes through the bank lock. Plain writes to write-only registers (set,
//! clear, event clear) are single bus accesses and need no lock.
//!
//! Reference: BCM2835 ARM Peripherals, Section 6
//! <https://datasheets.raspberrypi.com/bcm2835/bcm2835-peripherals.pdf>

use bitflags::bitflags;
use spin::Mutex;

use super::mmio::RegisterIo;

/// Number of GPIO pins on BCM2835 (0-53).
pub const NUM_GPIOS: u32 = 54;

/// Bytes covered by the register map (GPFSEL0 up to and including GPPUDCLK1).
pub const REGISTER_MAP_SIZE: usize = 0xA0;

/// GPIO register offsets from the controller base.
#[allow(dead_code)]
pub mod offsets {
    // Function Select registers (6 registers, 10 pins each, 3 bits per pin)
    pub const GPFSEL0: usize = 0x00;

    // Output Set registers (2 registers, 32 pins each, write-only)
    pub const GPSET0: usize = 0x1C;

    // Output Clear registers (2 registers, 32 pins each, write-only)
    pub const GPCLR0: usize = 0x28;

    // Pin Level registers (read-only)
    pub const GPLEV0: usize = 0x34;

    // Event Detect Status registers (write 1 to clear)
    pub const GPEDS0: usize = 0x40;

    // Rising / Falling edge, High / Low level detect enables
    pub const GPREN0: usize = 0x4C;
    pub const GPFEN0: usize = 0x58;
    pub const GPHEN0: usize = 0x64;
    pub const GPLEN0: usize = 0x70;

    // Asynchronous rising / falling edge detect enables
    pub const GPAREN0: usize = 0x7C;
    pub const GPAFEN0: usize = 0x88;

    // Pull-up/down control and its per-pin clock
    pub const GPPUD: usize = 0x94;
    pub const GPPUDCLK0: usize = 0x98;
}

/// Delay between pull-control steps: 150 cycles at 125 MHz is 1.2 us.
pub const PULL_SETUP_DELAY_US: u32 = 2;

/// GPIO pin function modes.
///
/// Each pin can be configured as input, output, or one of six alternate
/// functions for hardware peripherals (UART, SPI, I2C, PWM, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Function {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

impl Function {
    /// Decode a 3-bit function-select field.
    pub fn from_bits(bits: u32) -> Function {
        match bits & 0b111 {
            0b000 => Function::Input,
            0b001 => Function::Output,
            0b100 => Function::Alt0,
            0b101 => Function::Alt1,
            0b110 => Function::Alt2,
            0b111 => Function::Alt3,
            0b011 => Function::Alt4,
            _ => Function::Alt5,
        }
    }

    /// Input or output, as opposed to a peripheral function.
    pub fn is_gpio(self) -> bool {
        matches!(self, Function::Input | Function::Output)
    }
}

/// Pull-up/down control values written to GPPUD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Pull {
    Off = 0b00,
    Down = 0b01,
    Up = 0b10,
}

impl Pull {
    /// Decode a raw control value; anything outside {0, 1, 2} is rejected.
    pub fn from_raw(value: u32) -> Option<Pull> {
        match value {
            0 => Some(Pull::Off),
            1 => Some(Pull::Down),
            2 => Some(Pull::Up),
            _ => None,
        }
    }
}

bitflags! {
    /// Interrupt trigger sources of a single pin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Triggers: u32 {
        const RISING = 0x1;
        const FALLING = 0x2;
        const HIGH = 0x4;
        const LOW = 0x8;
    }
}

impl Triggers {
    /// Enable register driven by each trigger flag.
    const REGISTERS: [(Triggers, usize); 4] = [
        (Triggers::RISING, offsets::GPREN0),
        (Triggers::FALLING, offsets::GPFEN0),
        (Triggers::HIGH, offsets::GPHEN0),
        (Triggers::LOW, offsets::GPLEN0),
    ];
}

#[inline]
fn fsel_location(pin: u32) -> (usize, u32) {
    let reg_offset = offsets::GPFSEL0 + (pin / 10) as usize * 4;
    let bit_offset = (pin % 10) * 3;
    (reg_offset, bit_offset)
}

#[inline]
fn bit_location(base: usize, pin: u32) -> (usize, u32) {
    (base + (pin / 32) as usize * 4, 1 << (pin % 32))
}

/// The GPIO controller shared by every exported pin.
pub struct GpioBank<R: RegisterIo> {
    io: R,
    lock: Mutex<()>,
}

impl<R: RegisterIo> GpioBank<R> {
    /// Take ownership of a mapped register block.
    pub fn new(io: R) -> Self {
        GpioBank {
            io,
            lock: Mutex::new(()),
        }
    }

    /// Give the register block back, e.g. to unmap it.
    pub fn into_inner(self) -> R {
        self.io
    }

    fn check_pin(pin: u32) {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-53)", pin);
    }

    /// Current function of a pin.
    pub fn function(&self, pin: u32) -> Function {
        Self::check_pin(pin);
        let (reg, bit) = fsel_location(pin);
        Function::from_bits(self.io.read32(reg) >> bit)
    }

    /// Set the function mode of a pin, leaving the other nine pins of the
    /// same GPFSEL register untouched.
    pub fn set_function(&self, pin: u32, function: Function) {
        Self::check_pin(pin);
        let (reg, bit) = fsel_location(pin);
        let mask = 0b111 << bit;

        let _guard = self.lock.lock();
        let current = self.io.read32(reg);
        self.io
            .write32(reg, (current & !mask) | (((function as u32) << bit) & mask));
    }

    /// Drive an output pin high.
    pub fn set(&self, pin: u32) {
        Self::check_pin(pin);
        let (reg, bit) = bit_location(offsets::GPSET0, pin);
        self.io.write32(reg, bit);
    }

    /// Drive an output pin low.
    pub fn clear(&self, pin: u32) {
        Self::check_pin(pin);
        let (reg, bit) = bit_location(offsets::GPCLR0, pin);
        self.io.write32(reg, bit);
    }

    /// `true` sets the pin high, `false` sets it low.
    pub fn write(&self, pin: u32, value: bool) {
        if value {
            self.set(pin);
        } else {
            self.clear(pin);
        }
    }

    /// Actual level on the pin, whatever its direction.
    pub fn level(&self, pin: u32) -> bool {
        Self::check_pin(pin);
        let (reg, bit) = bit_location(offsets::GPLEV0, pin);
        self.io.read32(reg) & bit != 0
    }

    /// Whether an enabled edge/level event is latched for this pin.
    pub fn event_detected(&self, pin: u32) -> bool {
        Self::check_pin(pin);
        let (reg, bit) = bit_location(offsets::GPEDS0, pin);
        self.io.read32(reg) & bit != 0
    }

    /// Acknowledge a latched event. GPEDS is write-1-to-clear, so the other
    /// pins' pending events survive.
    pub fn clear_event(&self, pin: u32) {
        Self::check_pin(pin);
        let (reg, bit) = bit_location(offsets::GPEDS0, pin);
        self.io.write32(reg, bit);
    }

    /// Trigger sources currently enabled for a pin.
    pub fn triggers(&self, pin: u32) -> Triggers {
        Self::check_pin(pin);
        Triggers::REGISTERS
            .iter()
            .filter(|(_, base)| {
                let (reg, bit) = bit_location(*base, pin);
                self.io.read32(reg) & bit != 0
            })
            .fold(Triggers::empty(), |acc, (flag, _)| acc | *flag)
    }

    /// Write the four trigger-enable bits of a pin: set where the flag is
    /// present, cleared otherwise.
    pub fn set_triggers(&self, pin: u32, triggers: Triggers) {
        Self::check_pin(pin);

        let _guard = self.lock.lock();
        for (flag, base) in Triggers::REGISTERS {
            let (reg, bit) = bit_location(base, pin);
            let current = self.io.read32(reg);
            let value = if triggers.contains(flag) {
                current | bit
            } else {
                current & !bit
            };
            self.io.write32(reg, value);
        }
    }

    /// Disable rising, falling, high and low detection for a pin.
    pub fn disable_triggers(&self, pin: u32) {
        self.set_triggers(pin, Triggers::empty());
    }

    /// Clock a pull-up/down control value into a pin's pad.
    ///
    /// Datasheet sequence: write GPPUD, wait 150 cycles, assert the pin's
    /// GPPUDCLK bit, wait 150 cycles, remove the control value, remove the
    /// clock. `delay_us` provides the busy-wait.
    pub fn set_pull(&self, pin: u32, pull: Pull, mut delay_us: impl FnMut(u32)) {
        Self::check_pin(pin);
        let (clk_reg, bit) = bit_location(offsets::GPPUDCLK0, pin);

        // GPPUD is global to the bank: hold the lock across the whole sequence
        let _guard = self.lock.lock();
        self.io.write32(offsets::GPPUD, pull as u32);
        delay_us(PULL_SETUP_DELAY_US);
        self.io.write32(clk_reg, bit);
        delay_us(PULL_SETUP_DELAY_US);
        self.io.write32(offsets::GPPUD, 0);
        self.io.write32(clk_reg, 0);
    }
}
