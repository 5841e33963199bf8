//! Simulated GPIO controller and kernel platform
//!
//! Lets the driver run on a development host: [`SimulatedGpio`] behaves like
//! the BCM2835 register block (set/clear latches, level register, write-1-
//! to-clear event status, edge/level detection, pull latching) and
//! [`SimulatedPlatform`] stands in for the kernel device model, recording
//! every resource it hands out and failing on request.
//!
//! Both are cheap handles over shared state: clone one before giving it to
//! a driver and inspect the clone afterwards.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::chrdev::{DevT, Platform};
use crate::drivers::gpio::{offsets, Function, Pull, NUM_GPIOS, REGISTER_MAP_SIZE};
use crate::drivers::mmio::RegisterIo;
use crate::error::{Error, Result};

const WORDS: usize = REGISTER_MAP_SIZE / 4;

/// Register index of a two-register bit bank, if `offset` belongs to it.
fn bank_index(offset: usize, base: usize) -> Option<usize> {
    match offset.checked_sub(base) {
        Some(0) => Some(0),
        Some(4) => Some(1),
        _ => None,
    }
}

struct GpioState {
    regs: [u32; WORDS],
    /// Output latches written through GPSET/GPCLR
    outputs: [u32; 2],
    /// Levels applied from outside on input pins
    inputs: [u32; 2],
    pulls: [Option<Pull>; NUM_GPIOS as usize],
}

impl GpioState {
    fn function(&self, pin: u32) -> Function {
        let reg = self.regs[(offsets::GPFSEL0 / 4) + (pin / 10) as usize];
        Function::from_bits(reg >> ((pin % 10) * 3))
    }

    fn levels(&self) -> [u32; 2] {
        let mut levels = [0u32; 2];
        for pin in 0..NUM_GPIOS {
            let bank = (pin / 32) as usize;
            let bit = 1 << (pin % 32);
            let source = if self.function(pin) == Function::Output {
                self.outputs[bank]
            } else {
                self.inputs[bank]
            };
            levels[bank] |= source & bit;
        }
        levels
    }

    fn reg(&self, base: usize, bank: usize) -> u32 {
        self.regs[base / 4 + bank]
    }

    /// Latch detect events for every enabled condition after a level change.
    fn detect_events(&mut self, before: [u32; 2]) {
        let after = self.levels();
        for bank in 0..2 {
            let rising = !before[bank] & after[bank] & self.reg(offsets::GPREN0, bank);
            let falling = before[bank] & !after[bank] & self.reg(offsets::GPFEN0, bank);
            let high = after[bank] & self.reg(offsets::GPHEN0, bank);
            let low = !after[bank] & self.reg(offsets::GPLEN0, bank);
            self.regs[offsets::GPEDS0 / 4 + bank] |= rising | falling | high | low;
        }
    }
}

/// In-memory BCM2835 GPIO controller.
#[derive(Clone)]
pub struct SimulatedGpio {
    state: Arc<Mutex<GpioState>>,
}

impl SimulatedGpio {
    /// Controller in its reset state: every pin an input, low, no pulls.
    pub fn new() -> Self {
        SimulatedGpio {
            state: Arc::new(Mutex::new(GpioState {
                regs: [0; WORDS],
                outputs: [0; 2],
                inputs: [0; 2],
                pulls: [None; NUM_GPIOS as usize],
            })),
        }
    }

    /// Raw register value, as the driver would read it.
    pub fn register(&self, offset: usize) -> u32 {
        self.read32(offset)
    }

    /// Drive an external level onto a pin and latch any enabled event.
    pub fn drive_input(&self, pin: u32, high: bool) {
        let mut state = self.state.lock();
        let before = state.levels();
        let bank = (pin / 32) as usize;
        let bit = 1 << (pin % 32);
        if high {
            state.inputs[bank] |= bit;
        } else {
            state.inputs[bank] &= !bit;
        }
        state.detect_events(before);
    }

    /// Hand a pin to a peripheral (or back), bypassing the driver.
    pub fn set_raw_function(&self, pin: u32, function: Function) {
        let mut state = self.state.lock();
        let index = offsets::GPFSEL0 / 4 + (pin / 10) as usize;
        let shift = (pin % 10) * 3;
        state.regs[index] = (state.regs[index] & !(0b111 << shift)) | ((function as u32) << shift);
    }

    /// Pull state last clocked into a pin's pad.
    pub fn pull(&self, pin: u32) -> Option<Pull> {
        self.state.lock().pulls[pin as usize]
    }
}

impl Default for SimulatedGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterIo for SimulatedGpio {
    fn read32(&self, offset: usize) -> u32 {
        let state = self.state.lock();
        if let Some(bank) = bank_index(offset, offsets::GPLEV0) {
            return state.levels()[bank];
        }
        if bank_index(offset, offsets::GPSET0).is_some()
            || bank_index(offset, offsets::GPCLR0).is_some()
        {
            // write-only
            return 0;
        }
        state.regs[offset / 4]
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock();
        let before = state.levels();

        if let Some(bank) = bank_index(offset, offsets::GPSET0) {
            state.outputs[bank] |= value;
        } else if let Some(bank) = bank_index(offset, offsets::GPCLR0) {
            state.outputs[bank] &= !value;
        } else if bank_index(offset, offsets::GPLEV0).is_some() {
            // read-only
            return;
        } else if bank_index(offset, offsets::GPEDS0).is_some() {
            state.regs[offset / 4] &= !value;
            return;
        } else if let Some(bank) = bank_index(offset, offsets::GPPUDCLK0) {
            let control = Pull::from_raw(state.regs[offsets::GPPUD / 4]);
            for bit in 0..32 {
                let pin = bank as u32 * 32 + bit;
                if value & (1 << bit) != 0 && pin < NUM_GPIOS {
                    state.pulls[pin as usize] = control;
                }
            }
            state.regs[offset / 4] = value;
        } else {
            state.regs[offset / 4] = value;
        }

        state.detect_events(before);
    }
}

/// Opaque class handle handed out by [`SimulatedPlatform`].
#[derive(Debug, PartialEq, Eq)]
pub struct SimClass(u32);

#[derive(Default)]
struct PlatformState {
    mapping: Option<(usize, usize)>,
    next_major: u32,
    regions: Vec<(DevT, u32)>,
    classes: Vec<(u32, String)>,
    next_class: u32,
    cdevs: Vec<DevT>,
    nodes: Vec<(DevT, String)>,
    irqs: Vec<(u32, u32)>,
    delays: Vec<u32>,

    fail_ioremap: bool,
    fail_chrdev_region: Option<Error>,
    fail_class_create: Option<Error>,
    fail_cdev_add_at: Option<(usize, Error)>,
    cdev_add_calls: usize,
    fail_device_create_at: Option<(usize, Error)>,
    device_create_calls: usize,
    fail_request_irq: Option<Error>,
    fail_alloc: bool,
}

/// Kernel device model stand-in with resource tracking and fault injection.
#[derive(Clone)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<PlatformState>>,
    gpio: SimulatedGpio,
}

impl SimulatedPlatform {
    /// First major number handed out by the simulated region allocator.
    pub const FIRST_MAJOR: u32 = 240;

    pub fn new() -> Self {
        let state = PlatformState {
            next_major: Self::FIRST_MAJOR,
            ..PlatformState::default()
        };
        SimulatedPlatform {
            state: Arc::new(Mutex::new(state)),
            gpio: SimulatedGpio::new(),
        }
    }

    /// The controller returned by every successful `ioremap`.
    pub fn gpio(&self) -> SimulatedGpio {
        self.gpio.clone()
    }

    pub fn fail_ioremap(&self) {
        self.state.lock().fail_ioremap = true;
    }

    pub fn fail_chrdev_region(&self, error: Error) {
        self.state.lock().fail_chrdev_region = Some(error);
    }

    pub fn fail_class_create(&self, error: Error) {
        self.state.lock().fail_class_create = Some(error);
    }

    /// Fail the `nth` (0-based) call to `cdev_add`.
    pub fn fail_cdev_add_at(&self, nth: usize, error: Error) {
        self.state.lock().fail_cdev_add_at = Some((nth, error));
    }

    /// Fail the `nth` (0-based) call to `device_create`.
    pub fn fail_device_create_at(&self, nth: usize, error: Error) {
        self.state.lock().fail_device_create_at = Some((nth, error));
    }

    pub fn fail_request_irq(&self, error: Error) {
        self.state.lock().fail_request_irq = Some(error);
    }

    /// Refuse every driver allocation admitted through `alloc_check`.
    pub fn fail_alloc(&self) {
        self.state.lock().fail_alloc = true;
    }

    /// Mapped physical range, if any.
    pub fn mapping(&self) -> Option<(usize, usize)> {
        self.state.lock().mapping
    }

    pub fn region_count(&self) -> usize {
        self.state.lock().regions.len()
    }

    pub fn class_count(&self) -> usize {
        self.state.lock().classes.len()
    }

    pub fn cdev_count(&self) -> usize {
        self.state.lock().cdevs.len()
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.state.lock().nodes.iter().any(|(_, n)| n == name)
    }

    /// Device nodes in creation order.
    pub fn node_names(&self) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Device number behind a node name.
    pub fn node_devno(&self, name: &str) -> Option<DevT> {
        self.state
            .lock()
            .nodes
            .iter()
            .find(|(_, n)| n == name)
            .map(|(devno, _)| *devno)
    }

    /// `dev_id`s of the handlers attached to an interrupt line, in
    /// registration order.
    pub fn irq_handlers(&self, irq: u32) -> Vec<u32> {
        self.state
            .lock()
            .irqs
            .iter()
            .filter(|(line, _)| *line == irq)
            .map(|(_, dev_id)| *dev_id)
            .collect()
    }

    /// Every busy-wait requested so far, in microseconds.
    pub fn delays(&self) -> Vec<u32> {
        self.state.lock().delays.clone()
    }

    /// Nothing mapped, registered or attached.
    pub fn is_clean(&self) -> bool {
        let state = self.state.lock();
        state.mapping.is_none()
            && state.regions.is_empty()
            && state.classes.is_empty()
            && state.cdevs.is_empty()
            && state.nodes.is_empty()
            && state.irqs.is_empty()
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimulatedPlatform {
    type Io = SimulatedGpio;
    type Class = SimClass;

    fn ioremap(&self, phys_addr: usize, size: usize) -> Option<SimulatedGpio> {
        let mut state = self.state.lock();
        if state.fail_ioremap || state.mapping.is_some() {
            return None;
        }
        state.mapping = Some((phys_addr, size));
        Some(self.gpio.clone())
    }

    fn iounmap(&self, _io: SimulatedGpio) {
        self.state.lock().mapping = None;
    }

    fn alloc_chrdev_region(&self, first_minor: u32, count: u32, _name: &str) -> Result<u32> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_chrdev_region {
            return Err(error);
        }
        let major = state.next_major;
        state.next_major += 1;
        state.regions.push((DevT::new(major, first_minor), count));
        Ok(major)
    }

    fn unregister_chrdev_region(&self, first: DevT, count: u32) {
        self.state
            .lock()
            .regions
            .retain(|region| *region != (first, count));
    }

    fn class_create(&self, name: &str) -> Result<SimClass> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_class_create {
            return Err(error);
        }
        let id = state.next_class;
        state.next_class += 1;
        state.classes.push((id, name.to_string()));
        Ok(SimClass(id))
    }

    fn class_destroy(&self, class: SimClass) {
        self.state.lock().classes.retain(|(id, _)| *id != class.0);
    }

    fn cdev_add(&self, devno: DevT, _count: u32) -> Result<()> {
        let mut state = self.state.lock();
        let call = state.cdev_add_calls;
        state.cdev_add_calls += 1;
        if let Some((nth, error)) = state.fail_cdev_add_at {
            if nth == call {
                return Err(error);
            }
        }
        if state.cdevs.contains(&devno) {
            return Err(Error::Busy);
        }
        state.cdevs.push(devno);
        Ok(())
    }

    fn cdev_del(&self, devno: DevT) {
        self.state.lock().cdevs.retain(|d| *d != devno);
    }

    fn device_create(&self, class: &SimClass, devno: DevT, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let call = state.device_create_calls;
        state.device_create_calls += 1;
        if let Some((nth, error)) = state.fail_device_create_at {
            if nth == call {
                return Err(error);
            }
        }
        if !state.classes.iter().any(|(id, _)| *id == class.0) {
            return Err(Error::NoDevice);
        }
        if state.nodes.iter().any(|(_, n)| n == name) {
            return Err(Error::Exists);
        }
        state.nodes.push((devno, name.to_string()));
        Ok(())
    }

    fn device_destroy(&self, _class: &SimClass, devno: DevT) {
        self.state.lock().nodes.retain(|(d, _)| *d != devno);
    }

    fn request_shared_irq(&self, irq: u32, _name: &str, dev_id: u32) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_request_irq {
            return Err(error);
        }
        state.irqs.push((irq, dev_id));
        Ok(())
    }

    fn free_irq(&self, irq: u32, dev_id: u32) {
        let mut state = self.state.lock();
        if let Some(index) = state.irqs.iter().position(|entry| *entry == (irq, dev_id)) {
            state.irqs.remove(index);
        }
    }

    fn alloc_check(&self, _bytes: usize) -> Result<()> {
        if self.state.lock().fail_alloc {
            return Err(Error::NoMemory);
        }
        Ok(())
    }

    fn udelay(&self, us: u32) {
        self.state.lock().delays.push(us);
    }
}
