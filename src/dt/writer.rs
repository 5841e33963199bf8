//! Minimal flattened device tree writer, used to feed the parser in tests.

use alloc::vec::Vec;

const FDT_MAGIC: u32 = 0xd00d_feed;
const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_END: u32 = 0x9;

const HEADER_LEN: usize = 40;
/// One empty (terminating) memory reservation entry.
const RSVMAP_LEN: usize = 16;

/// Builds the structure and strings blocks of a DTB, node by node.
pub(crate) struct FdtWriter {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtWriter {
    pub(crate) fn new() -> Self {
        FdtWriter {
            structure: Vec::new(),
            strings: Vec::new(),
        }
    }

    fn token(&mut self, token: u32) {
        self.structure.extend_from_slice(&token.to_be_bytes());
    }

    fn align(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    pub(crate) fn begin_node(mut self, name: &str) -> Self {
        self.token(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.align();
        self
    }

    pub(crate) fn end_node(mut self) -> Self {
        self.token(FDT_END_NODE);
        self
    }

    pub(crate) fn property(mut self, name: &str, value: &[u8]) -> Self {
        let nameoff = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);

        self.token(FDT_PROP);
        self.structure.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.structure.extend_from_slice(&nameoff.to_be_bytes());
        self.structure.extend_from_slice(value);
        self.align();
        self
    }

    /// Property of big-endian 32-bit cells.
    pub(crate) fn cells(self, name: &str, cells: &[u32]) -> Self {
        let value: Vec<u8> = cells.iter().flat_map(|cell| cell.to_be_bytes()).collect();
        self.property(name, &value)
    }

    /// NUL-terminated string property.
    pub(crate) fn string(self, name: &str, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.property(name, &bytes)
    }

    /// Close the structure block and lay out header, reservation map,
    /// structure and strings, in that order.
    pub(crate) fn finish(mut self) -> Blob {
        self.token(FDT_END);
        while self.strings.len() % 4 != 0 {
            self.strings.push(0);
        }

        let off_rsvmap = HEADER_LEN;
        let off_struct = off_rsvmap + RSVMAP_LEN;
        let off_strings = off_struct + self.structure.len();
        let total = off_strings + self.strings.len();

        let header = [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            off_rsvmap as u32,
            17, // version
            16, // last_comp_version
            0,  // boot_cpuid_phys
            self.strings.len() as u32,
            self.structure.len() as u32,
        ];

        let mut bytes = Vec::with_capacity(total);
        for field in header {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes.resize(off_struct, 0);
        bytes.extend_from_slice(&self.structure);
        bytes.extend_from_slice(&self.strings);

        Blob::new(&bytes)
    }
}

/// A DTB held in word-aligned storage, as the parser requires.
pub(crate) struct Blob {
    words: Vec<u32>,
}

impl Blob {
    fn new(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_ne_bytes(word)
            })
            .collect();
        Blob { words }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        // SAFETY: the words are initialized, and any u32 storage is valid to
        // view as bytes for the same length.
        unsafe {
            core::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.words.len() * 4)
        }
    }
}

/// A Raspberry Pi 1 style tree: `/soc/gpio@7e200000` with a one-cell
/// `reg` address and the four bank interrupt specifiers.
pub(crate) fn bcm2835_tree() -> Blob {
    FdtWriter::new()
        .begin_node("")
        .cells("#address-cells", &[1])
        .cells("#size-cells", &[1])
        .string("model", "Raspberry Pi Model B Rev 2")
        .begin_node("soc")
        .string("compatible", "simple-bus")
        .begin_node("interrupt-controller@7e00b200")
        .string("compatible", "brcm,bcm2835-armctrl-ic")
        .cells("reg", &[0x7e00_b200, 0x200])
        .end_node()
        .begin_node("gpio@7e200000")
        .string("compatible", "brcm,bcm2835-gpio")
        .cells("reg", &[0x7e20_0000, 0xb4])
        .cells("interrupts", &[2, 17, 2, 18, 2, 19, 2, 20])
        .end_node()
        .end_node()
        .end_node()
        .finish()
}
