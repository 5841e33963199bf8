//! Device Tree lookup of the GPIO controller
//!
//! By default the driver maps the BCM2835 GPIO block at its documented
//! physical address. When a Flattened Device Tree (FDT/DTB) is available the
//! controller can be located from it instead, which covers the later SoCs of
//! the family whose peripheral window moved (Pi 2/3: 0x3F000000, Pi 4:
//! 0xFE000000).
//!
//! # Address Translation
//!
//! Device tree uses **bus addresses**, the ARM CPU requires **physical
//! addresses**:
//! - Bus: 0x7E200000 (GPIO in DT) → Physical: peripheral base + 0x200000
//!
//! # References
//!
//! - [Devicetree Specification](https://devicetree-specification.readthedocs.io/)
//! - [BCM2835 Device Tree](https://github.com/raspberrypi/linux/tree/rpi-6.6.y/arch/arm/boot/dts/broadcom)

use alloc::string::String;
use alloc::vec::Vec;
use fdt_rs::base::DevTree;
use fdt_rs::prelude::*;

#[cfg(test)]
pub(crate) mod writer;

/// Compatible string of the BCM2835 GPIO/pinctrl node.
pub const GPIO_COMPATIBLE: &str = "brcm,bcm2835-gpio";

/// Start of the peripheral window as seen from the VideoCore bus.
pub const BUS_PERIPHERAL_BASE: usize = 0x7E00_0000;

/// Size of the peripheral window.
const PERIPHERAL_WINDOW: usize = 0x0100_0000;

/// FDT header magic.
const FDT_MAGIC: u32 = 0xd00d_feed;

/// Length of the FDT header.
const FDT_HEADER_LEN: usize = 40;

/// Hardware information parsed from a device tree blob
pub struct HardwareInfo<'dt> {
    dtb: &'dt [u8],
}

impl<'dt> HardwareInfo<'dt> {
    /// Validate a DTB and wrap it for queries.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The buffer is shorter than an FDT header
    /// - Magic number is not 0xd00dfeed
    /// - The header's total size does not fit in the buffer
    pub fn from_bytes(dtb: &'dt [u8]) -> Result<Self, &'static str> {
        if dtb.len() < FDT_HEADER_LEN {
            return Err("DTB is shorter than its header");
        }

        let magic = u32::from_be_bytes([dtb[0], dtb[1], dtb[2], dtb[3]]);
        if magic != FDT_MAGIC {
            return Err("Invalid DTB magic number");
        }

        // SAFETY: The slice is at least a full FDT header long (checked above)
        // and read_totalsize only parses the header fields.
        let size = unsafe {
            DevTree::read_totalsize(&dtb[..FDT_HEADER_LEN]).map_err(|_| "Failed to read DTB size")?
        };
        if size > dtb.len() {
            return Err("DTB total size exceeds buffer");
        }

        Ok(Self {
            dtb: &dtb[..size],
        })
    }

    /// Find a device by compatible string
    ///
    /// Returns `None` if no matching device found.
    pub fn find_device(&self, compatible: &str) -> Option<DeviceNode> {
        // SAFETY: dtb was validated in from_bytes (magic and total size)
        let dt = unsafe { DevTree::new(self.dtb).ok()? };

        let mut compatible_iter = dt.compatible_nodes(compatible);

        // Iterator.next() returns Result<Option<Node>, Error>
        let node = match compatible_iter.next() {
            Ok(Some(n)) => n,
            _ => return None,
        };

        Some(DeviceNode {
            name: node.name().unwrap_or(compatible).into(),
            base_addr: Self::extract_base_address(&node),
            interrupts: Self::extract_interrupts(&node),
        })
    }

    /// Find a property by name in a node
    fn find_property<'a, 'b, 'c>(
        node: &'a fdt_rs::base::DevTreeNode<'b, 'c>,
        name: &str,
    ) -> Option<fdt_rs::base::DevTreeProp<'a, 'c>> {
        let mut props = node.props();
        while let Ok(Some(prop)) = props.next() {
            if prop.name() == Ok(name) {
                return Some(prop);
            }
        }
        None
    }

    /// Extract the bus address from the "reg" property
    ///
    /// BCM283x nodes use #address-cells=1 (`<addr size>`); some SoCs of the
    /// family use two address cells (`<addr_high addr_low ...>`). Whichever
    /// cell falls inside the peripheral bus window is the address.
    fn extract_base_address(node: &fdt_rs::base::DevTreeNode) -> Option<usize> {
        let prop = Self::find_property(node, "reg")?;

        [0, 1]
            .into_iter()
            .filter_map(|cell| prop.u32(cell).ok())
            .map(|addr| addr as usize)
            .find(|addr| is_peripheral_bus_address(*addr))
    }

    /// Extract raw cells of the "interrupts" property
    fn extract_interrupts(node: &fdt_rs::base::DevTreeNode) -> Vec<u32> {
        let mut result = Vec::new();

        if let Some(prop) = Self::find_property(node, "interrupts") {
            let count = prop.length() / 4;
            for i in 0..count {
                if let Ok(val) = prop.u32(i) {
                    result.push(val);
                }
            }
        }

        result
    }
}

/// Represents a single device tree node
pub struct DeviceNode {
    name: String,
    base_addr: Option<usize>,
    interrupts: Vec<u32>,
}

impl DeviceNode {
    /// Get node name (e.g., "gpio@7e200000")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus address from the "reg" property; translate it with
    /// [`bus_to_physical`].
    pub fn base_address(&self) -> Option<usize> {
        self.base_addr
    }

    /// Raw interrupt cells, decoded by the interrupt controller.
    pub fn interrupts(&self) -> Option<&[u32]> {
        if self.interrupts.is_empty() {
            None
        } else {
            Some(&self.interrupts)
        }
    }

    /// Linux IRQ number of the first interrupt, decoding the cells as a
    /// BCM2835 ARM controller `<bank irq>` specifier.
    pub fn first_irq(&self) -> Option<u32> {
        match self.interrupts()? {
            [bank, irq, ..] => armctrl_irq(*bank, *irq),
            _ => None,
        }
    }
}

/// Number the BCM2835 ARM interrupt controller gives `<bank irq>`.
///
/// Bank 1 holds GPU interrupts 0-31 and bank 2 GPU interrupts 32-63, which
/// come first; the basic ARM bank 0 follows at 64.
fn armctrl_irq(bank: u32, irq: u32) -> Option<u32> {
    if irq >= 32 {
        return None;
    }
    match bank {
        0 => Some(64 + irq),
        1 => Some(irq),
        2 => Some(32 + irq),
        _ => None,
    }
}

fn is_peripheral_bus_address(addr: usize) -> bool {
    (BUS_PERIPHERAL_BASE..BUS_PERIPHERAL_BASE + PERIPHERAL_WINDOW).contains(&addr)
}

/// Translate a VideoCore bus address to an ARM physical address
///
/// `peripheral_base` is where the SoC exposes its peripheral window to the
/// ARM core: 0x20000000 (BCM2835), 0x3F000000 (BCM2836/7), 0xFE000000
/// (BCM2711). Addresses outside the bus window are returned unchanged.
pub fn bus_to_physical(bus_addr: usize, peripheral_base: usize) -> usize {
    if is_peripheral_bus_address(bus_addr) {
        bus_addr - BUS_PERIPHERAL_BASE + peripheral_base
    } else {
        bus_addr
    }
}
