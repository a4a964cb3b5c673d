//! Option-byte programming from a raw host buffer.
//!
//! The buffer mirrors the option-byte area byte for byte: each register lives in an 8-byte slot
//! (value followed by its complement), so register fields sit at fixed offsets. A field is
//! written only if the buffer reaches past its slot; a short buffer stops at the first field it
//! does not fully cover. Nothing is verified after the commit, callers poll [`OptionBytes::busy`]
//! and read the area back themselves.

use defmt_or_log::{debug, info, warn};

use crate::memory::{AreaTag, MemoryArea, MemoryDescriptor};

pub const FLASH_KEY1: u32 = 0x4567_0123;
pub const FLASH_KEY2: u32 = 0xCDEF_89AB;
pub const OPTION_KEY1: u32 = 0x0819_2A3B;
pub const OPTION_KEY2: u32 = 0x4C5D_6E7F;

/// Longest buffer with any effect.
pub const IMAGE_LEN: usize = 116;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OptionRegister {
    /// User options and read-protection level.
    Optr,
    Pcrop1Asr,
    Pcrop1Aer,
    Wrp1Ar,
    Wrp1Br,
    Pcrop1Bsr,
    Pcrop1Ber,
    Secr,
}

impl OptionRegister {
    /// Offset of the register's slot in the option-byte area.
    pub const fn offset(self) -> usize {
        match self {
            OptionRegister::Optr => 0,
            OptionRegister::Pcrop1Asr => 8,
            OptionRegister::Pcrop1Aer => 16,
            OptionRegister::Wrp1Ar => 24,
            OptionRegister::Wrp1Br => 32,
            OptionRegister::Pcrop1Bsr => 40,
            OptionRegister::Pcrop1Ber => 48,
            OptionRegister::Secr => 112,
        }
    }
}

/// One register and the buffer bytes packed into it.
#[derive(Debug, Clone, Copy)]
pub struct OptionField {
    pub register: OptionRegister,
    /// The buffer must be at least this long for the field to be written.
    pub end: usize,
    /// `(buffer index, bit shift)` of every byte that goes into the register.
    lanes: &'static [(usize, u32)],
}

impl OptionField {
    const fn new(register: OptionRegister, end: usize, lanes: &'static [(usize, u32)]) -> Self {
        Self {
            register,
            end,
            lanes,
        }
    }

    pub fn lanes(&self) -> &'static [(usize, u32)] {
        self.lanes
    }

    pub fn pack(&self, data: &[u8]) -> u32 {
        self.lanes
            .iter()
            .fold(0, |acc, &(index, shift)| acc | (data[index] as u32) << shift)
    }
}

const WORD: [(usize, u32); 4] = [(0, 0), (1, 8), (2, 16), (3, 24)];

/// Read-protection level alone. Written for every non-empty buffer, whatever its length.
pub const RDP_FIELD: OptionField = OptionField::new(OptionRegister::Optr, 1, &[(0, 0)]);

/// Remaining fields in ascending offset order.
pub const FIELDS: [OptionField; 8] = [
    OptionField::new(OptionRegister::Optr, 4, &WORD),
    OptionField::new(OptionRegister::Pcrop1Asr, 10, &[(8, 0), (9, 8)]),
    OptionField::new(OptionRegister::Pcrop1Aer, 20, &[(16, 0), (17, 8), (19, 24)]),
    OptionField::new(
        OptionRegister::Wrp1Ar,
        28,
        &[(24, 0), (25, 8), (26, 16), (27, 24)],
    ),
    OptionField::new(
        OptionRegister::Wrp1Br,
        36,
        &[(32, 0), (33, 8), (34, 16), (35, 24)],
    ),
    OptionField::new(OptionRegister::Pcrop1Bsr, 42, &[(40, 0), (41, 8)]),
    OptionField::new(OptionRegister::Pcrop1Ber, 50, &[(48, 0), (49, 8)]),
    OptionField::new(
        OptionRegister::Secr,
        116,
        &[(112, 0), (113, 8), (114, 16), (115, 24)],
    ),
];

/// Register-level access to the flash controller's option registers.
pub trait OptionRegisters {
    /// Unlocks the flash control register, then the option bytes.
    fn unlock(&mut self);
    fn clear_errors(&mut self);
    fn write(&mut self, register: OptionRegister, value: u32);
    /// Sets `OPTSTRT`.
    fn start(&mut self);
    fn busy(&self) -> bool;
    /// Plain load from the option-byte area.
    fn read_byte(&self, address: u32) -> u8;
}

impl<T: OptionRegisters + ?Sized> OptionRegisters for &mut T {
    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn clear_errors(&mut self) {
        (**self).clear_errors()
    }

    fn write(&mut self, register: OptionRegister, value: u32) {
        (**self).write(register, value)
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn busy(&self) -> bool {
        (**self).busy()
    }

    fn read_byte(&self, address: u32) -> u8 {
        (**self).read_byte(address)
    }
}

/// Must only be driven from the foreground; a write is not reentrant.
pub struct OptionBytes<R> {
    regs: R,
    area: MemoryDescriptor,
}

impl<R: OptionRegisters> OptionBytes<R> {
    pub fn new(regs: R, start: u32, end: u32) -> Self {
        Self {
            regs,
            area: MemoryDescriptor::new(start, end, AreaTag::OptionBytes),
        }
    }

    pub fn read(&self, address: u32) -> u8 {
        self.regs.read_byte(address)
    }

    /// Programs every field covered by the first `length` bytes of `data`, then commits.
    ///
    /// `length` is clamped to `data.len()`. An empty `data` has no read-protection byte to
    /// write and leaves the hardware untouched.
    pub fn write(&mut self, data: &[u8], length: usize) {
        if data.is_empty() {
            warn!("empty option-byte buffer ignored");
            return;
        }
        let length = length.min(data.len());

        self.regs.unlock();
        self.regs.clear_errors();

        self.regs.write(RDP_FIELD.register, RDP_FIELD.pack(data));
        let mut written = 1;
        for field in FIELDS.iter().take_while(|field| length >= field.end) {
            let value = field.pack(data);
            debug!("option register {:?} <- {:#x}", field.register, value);
            self.regs.write(field.register, value);
            written += 1;
        }

        self.regs.start();
        info!(
            "option bytes committed: {} register writes from {} bytes",
            written, length
        );
    }

    pub fn busy(&self) -> bool {
        self.regs.busy()
    }

    pub fn descriptor(&self) -> MemoryDescriptor {
        self.area
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }
}

impl<R: OptionRegisters> MemoryArea for OptionBytes<R> {
    fn descriptor(&self) -> MemoryDescriptor {
        self.area
    }

    fn read(&self, address: u32) -> u8 {
        OptionBytes::read(self, address)
    }

    /// The target address is implied by the area: the buffer always starts at its first byte.
    fn write(&mut self, _address: u32, data: &[u8]) {
        OptionBytes::write(self, data, data.len())
    }
}
