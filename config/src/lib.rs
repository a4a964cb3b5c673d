#![no_std]

pub use {fugit, stm32g0::stm32g031 as pac};

use core::ops::Range;

use boot_core::memory::{AreaTag, MemoryDescriptor};
use boot_core::timeout::InactivityTimeout;
use boot_core::watchdog::{Prescaler, WatchdogSetup};
use fugit::{HertzU32, MillisDurationU32, SecsDurationU32};
use static_assertions::const_assert;

// Timer allocation
// IWDG  -> armed at reset, never refreshed by the bootloader
// TIM14 -> service-mode inactivity supervisor

pub const LSI: HertzU32 = HertzU32::from_raw(32_000);

pub const WATCHDOG_TIMEOUT: SecsDurationU32 = SecsDurationU32::from_ticks(10);
pub const WATCHDOG_PRESCALER: Prescaler = Prescaler::Div256;
pub const WATCHDOG: WatchdogSetup =
    match WatchdogSetup::new(WATCHDOG_TIMEOUT, LSI, WATCHDOG_PRESCALER) {
        Ok(setup) => setup,
        Err(_) => panic!("watchdog timeout does not fit the reload register"),
    };

pub const INACTIVITY_TIMEOUT_MS: MillisDurationU32 = MillisDurationU32::from_ticks(10_000);
pub const INACTIVITY_TIMEOUT: InactivityTimeout = match InactivityTimeout::new(INACTIVITY_TIMEOUT_MS)
{
    Ok(timeout) => timeout,
    Err(_) => panic!("inactivity timeout does not fit the timer"),
};

/// Logical priority of the supervisor interrupt, 0 being the most urgent.
pub const IPRIO_TIMEOUT: u8 = 2;

/// Value for the NVIC priority register: only the top `NVIC_PRIO_BITS` are implemented.
pub const fn nvic_priority(level: u8) -> u8 {
    level << (8 - pac::NVIC_PRIO_BITS)
}

const_assert!(IPRIO_TIMEOUT < 1 << pac::NVIC_PRIO_BITS);

// Backup domain

pub const TAMP_BASE: u32 = 0x4000_B000;
pub const TAMP_BKP_OFFSET: u32 = 0x100;
pub const BACKUP_REGISTERS: usize = 5;
/// `TAMP_BKP4R` holds the boot token.
pub const BOOT_FLAG_REGISTER: usize = 4;

const_assert!(BOOT_FLAG_REGISTER < BACKUP_REGISTERS);

pub const fn backup_register_address(index: usize) -> u32 {
    TAMP_BASE + TAMP_BKP_OFFSET + 4 * index as u32
}

// Memory map

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 64 * 1024;
pub const BOOTLOADER_SIZE: u32 = 16 * 1024;
pub const APP_START: u32 = FLASH_BASE + BOOTLOADER_SIZE;

pub const RAM_BASE: u32 = 0x2000_0000;
pub const RAM_SIZE: u32 = 8 * 1024;

pub const OPTION_BYTES_START: u32 = 0x1FFF_7800;
pub const OPTION_BYTES_END: u32 = 0x1FFF_787F;
pub const OTP_START: u32 = 0x1FFF_7000;
pub const OTP_END: u32 = 0x1FFF_73FF;
pub const SYSTEM_MEMORY_START: u32 = 0x1FFF_0000;
pub const SYSTEM_MEMORY_END: u32 = 0x1FFF_1FFF;
pub const ENGI_BYTES_START: u32 = 0x1FFF_7500;
pub const ENGI_BYTES_END: u32 = 0x1FFF_77FF;

// VTOR needs the table aligned to its size rounded up to a power of two.
const_assert!(APP_START % 256 == 0);
const_assert!(BOOTLOADER_SIZE < FLASH_SIZE);

pub const APP_FLASH: Range<u32> = APP_START..FLASH_BASE + FLASH_SIZE;
/// Initial stack pointers may point one past the last RAM byte.
pub const RAM: Range<u32> = RAM_BASE..RAM_BASE + RAM_SIZE;

pub const MEMORY_AREAS: [MemoryDescriptor; 6] = [
    MemoryDescriptor::sized(FLASH_BASE, FLASH_SIZE, AreaTag::Flash),
    MemoryDescriptor::sized(RAM_BASE, RAM_SIZE, AreaTag::Ram),
    MemoryDescriptor::new(OPTION_BYTES_START, OPTION_BYTES_END, AreaTag::OptionBytes),
    MemoryDescriptor::new(OTP_START, OTP_END, AreaTag::Otp),
    MemoryDescriptor::new(SYSTEM_MEMORY_START, SYSTEM_MEMORY_END, AreaTag::SystemMemory),
    MemoryDescriptor::new(ENGI_BYTES_START, ENGI_BYTES_END, AreaTag::EngiBytes),
];

#[cfg(feature = "check-entry")]
pub type EntryValidation = boot_core::arbiter::RegionCheck;

#[cfg(not(feature = "check-entry"))]
pub type EntryValidation = boot_core::arbiter::Unchecked;

#[cfg(feature = "check-entry")]
pub fn entry_validation() -> EntryValidation {
    boot_core::arbiter::RegionCheck {
        flash: APP_FLASH,
        ram: RAM,
    }
}

#[cfg(not(feature = "check-entry"))]
pub fn entry_validation() -> EntryValidation {
    boot_core::arbiter::Unchecked
}
