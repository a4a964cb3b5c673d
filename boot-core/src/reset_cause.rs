//! Reset cause flags from `RCC_CSR`.
//!
//! Read and logged on every boot. The flags are left latched for the application, and the boot
//! decision does not depend on them.

use bitflags::bitflags;
use defmt_or_log::info;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResetFlags: u32 {
        const OPTION_BYTE_LOADER = 1 << 25;
        const PIN = 1 << 26;
        const POWER_ON = 1 << 27;
        const SOFTWARE = 1 << 28;
        const INDEPENDENT_WATCHDOG = 1 << 29;
        const WINDOW_WATCHDOG = 1 << 30;
        const LOW_POWER = 1 << 31;
    }
}

/// Read-only view of the latched reset flags.
pub trait ResetCauseRegister {
    fn read_flags(&self) -> u32;
}

impl<T: ResetCauseRegister + ?Sized> ResetCauseRegister for &T {
    fn read_flags(&self) -> u32 {
        (**self).read_flags()
    }
}

impl<T: ResetCauseRegister + ?Sized> ResetCauseRegister for &mut T {
    fn read_flags(&self) -> u32 {
        (**self).read_flags()
    }
}

/// Decodes and logs the latched reset flags without clearing them.
pub fn inspect<R: ResetCauseRegister + ?Sized>(register: &R) -> ResetFlags {
    let flags = ResetFlags::from_bits_truncate(register.read_flags());
    info!("reset cause flags {:#x}", flags.bits());
    flags
}
