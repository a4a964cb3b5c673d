//! Address map of the areas the service protocol can reach.

use core::iter::FromIterator;

use defmt_or_log::{debug, warn};
use heapless::Vec;

/// Area identifiers as exchanged with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AreaTag {
    /// Address outside every known area.
    Error = 0,
    Flash = 1,
    Ram = 2,
    OptionBytes = 3,
    Otp = 4,
    /// Factory bootloader (ICP).
    SystemMemory = 5,
    EngiBytes = 7,
}

impl AreaTag {
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// Inclusive address range tagged with its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryDescriptor {
    pub start: u32,
    pub end: u32,
    pub tag: AreaTag,
}

impl MemoryDescriptor {
    pub const fn new(start: u32, end: u32, tag: AreaTag) -> Self {
        Self { start, end, tag }
    }

    /// Descriptor for `size` bytes starting at `start`.
    pub const fn sized(start: u32, size: u32, tag: AreaTag) -> Self {
        Self::new(start, start + (size - 1), tag)
    }

    pub const fn size(&self) -> u32 {
        self.end - self.start + 1
    }

    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }
}

/// Byte access to one memory area.
pub trait MemoryArea {
    fn descriptor(&self) -> MemoryDescriptor;
    fn read(&self, address: u32) -> u8;
    fn write(&mut self, address: u32, data: &[u8]);

    /// Areas without an erase primitive report `false`.
    fn erase(&mut self, _address: u32) -> bool {
        warn!("{:?} has no erase operation", self.descriptor().tag);
        false
    }
}

impl<T: MemoryArea + ?Sized> MemoryArea for &mut T {
    fn descriptor(&self) -> MemoryDescriptor {
        (**self).descriptor()
    }

    fn read(&self, address: u32) -> u8 {
        (**self).read(address)
    }

    fn write(&mut self, address: u32, data: &[u8]) {
        (**self).write(address, data)
    }

    fn erase(&mut self, address: u32) -> bool {
        (**self).erase(address)
    }
}

/// The device's memory map, searched in registration order.
#[derive(Debug, Clone)]
pub struct MemoryMap<const N: usize> {
    areas: Vec<MemoryDescriptor, N>,
}

impl<const N: usize> MemoryMap<N> {
    pub const fn new() -> Self {
        Self { areas: Vec::new() }
    }

    /// Returns the descriptor back if the map is full.
    pub fn register(&mut self, area: MemoryDescriptor) -> Result<(), MemoryDescriptor> {
        debug!(
            "memory area {:?}: {:#x}..={:#x}",
            area.tag, area.start, area.end
        );
        self.areas.push(area)
    }

    pub fn descriptor_of(&self, address: u32) -> Option<&MemoryDescriptor> {
        self.areas.iter().find(|area| area.contains(address))
    }

    pub fn area_of(&self, address: u32) -> AreaTag {
        self.descriptor_of(address)
            .map_or(AreaTag::Error, |area| area.tag)
    }

    pub fn areas(&self) -> &[MemoryDescriptor] {
        &self.areas
    }
}

impl<const N: usize> Default for MemoryMap<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FromIterator<MemoryDescriptor> for MemoryMap<N> {
    /// Areas beyond capacity are dropped.
    fn from_iter<I: IntoIterator<Item = MemoryDescriptor>>(iter: I) -> Self {
        let mut map = Self::new();
        for area in iter {
            if map.register(area).is_err() {
                warn!("memory map full, {:?} not registered", area.tag);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g031() -> MemoryMap<8> {
        [
            MemoryDescriptor::sized(0x0800_0000, 64 * 1024, AreaTag::Flash),
            MemoryDescriptor::sized(0x2000_0000, 8 * 1024, AreaTag::Ram),
            MemoryDescriptor::new(0x1FFF_7800, 0x1FFF_787F, AreaTag::OptionBytes),
            MemoryDescriptor::new(0x1FFF_7000, 0x1FFF_73FF, AreaTag::Otp),
            MemoryDescriptor::new(0x1FFF_0000, 0x1FFF_1FFF, AreaTag::SystemMemory),
            MemoryDescriptor::new(0x1FFF_7500, 0x1FFF_77FF, AreaTag::EngiBytes),
        ]
        .iter()
        .copied()
        .collect()
    }

    #[test]
    fn addresses_resolve_to_tags() {
        let map = g031();
        assert_eq!(map.area_of(0x0800_0000), AreaTag::Flash);
        assert_eq!(map.area_of(0x0800_FFFF), AreaTag::Flash);
        assert_eq!(map.area_of(0x0801_0000), AreaTag::Error);
        assert_eq!(map.area_of(0x2000_1FFF), AreaTag::Ram);
        assert_eq!(map.area_of(0x1FFF_7800), AreaTag::OptionBytes);
        assert_eq!(map.area_of(0x1FFF_787F), AreaTag::OptionBytes);
        assert_eq!(map.area_of(0x1FFF_7880), AreaTag::Error);
        assert_eq!(map.area_of(0x1FFF_7123), AreaTag::Otp);
        assert_eq!(map.area_of(0x1FFF_1000), AreaTag::SystemMemory);
        assert_eq!(map.area_of(0x1FFF_7600), AreaTag::EngiBytes);
        assert_eq!(map.area_of(0), AreaTag::Error);
    }

    #[test]
    fn tags_match_host_protocol() {
        let raw: [u8; 7] = [
            AreaTag::Error.raw(),
            AreaTag::Flash.raw(),
            AreaTag::Ram.raw(),
            AreaTag::OptionBytes.raw(),
            AreaTag::Otp.raw(),
            AreaTag::SystemMemory.raw(),
            AreaTag::EngiBytes.raw(),
        ];
        assert_eq!(raw, [0, 1, 2, 3, 4, 5, 7]);
    }

    #[test]
    fn full_map_rejects_registration() {
        let mut map = MemoryMap::<1>::new();
        let flash = MemoryDescriptor::sized(0x0800_0000, 0x4000, AreaTag::Flash);
        let ram = MemoryDescriptor::sized(0x2000_0000, 0x2000, AreaTag::Ram);
        assert_eq!(map.register(flash), Ok(()));
        assert_eq!(map.register(ram), Err(ram));
        assert_eq!(map.areas(), &[flash]);
        assert_eq!(flash.size(), 0x4000);
    }
}
