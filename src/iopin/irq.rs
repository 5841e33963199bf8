//! GPIO bank interrupt handling.
//!
//! The SoC raises one interrupt line per 32-pin bank, shared by every open
//! pin of that bank. Each open pin attaches its own handler; a handler only
//! claims the interrupt when its pin's event-detect bit is set.

use crate::drivers::gpio::GpioBank;
use crate::drivers::mmio::RegisterIo;

use super::device::PinDevice;

/// Result of an interrupt handler, as reported to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not raised by this device
    None,
    /// The interrupt was handled
    Handled,
}

/// Check, acknowledge and signal an event for one pin.
pub(crate) fn handle_pin_event<R: RegisterIo>(gpio: &GpioBank<R>, device: &PinDevice) -> IrqReturn {
    let pin = device.pin();
    if !gpio.event_detected(pin) {
        return IrqReturn::None;
    }

    gpio.clear_event(pin);
    device.signal();
    IrqReturn::Handled
}
