#![no_std]

use core::ptr::{addr_of, read_volatile, write_volatile};

use boot_core::{AppEntry, ApplicationImage, BootFlag, BootToken};
use cortex_m::peripheral::SCB;

mod registers;

pub use registers::{Backup, FlashOptions, Iwdg, RccClock, ResetFlagsRegister, Tim14};

extern "C" {
    static APP_START: u32;
}

const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;

#[allow(clippy::missing_safety_doc)]
pub unsafe fn app_ptr() -> *const u32 {
    addr_of!(APP_START)
}

/// The application image placed at `APP_START` by the linker script.
pub struct LinkedImage;

impl ApplicationImage for LinkedImage {
    fn entry(&self) -> AppEntry {
        unsafe {
            let table = app_ptr();
            AppEntry::from_words([read_volatile(table), read_volatile(table.add(1))])
        }
    }
}

#[cfg(not(feature = "vect-tab-sram"))]
fn vector_table_base() -> u32 {
    extern "C" {
        static __vector_table: u32;
    }
    unsafe { addr_of!(__vector_table) as u32 }
}

#[cfg(feature = "vect-tab-sram")]
fn vector_table_base() -> u32 {
    config::RAM_BASE
}

/// Points VTOR at the bootloader's own vector table, or at the start of SRAM with
/// `vect-tab-sram`.
pub fn relocate_vector_table() {
    unsafe { write_volatile(SCB_VTOR, vector_table_base()) };
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Loads the application's stack pointer and branches to its reset handler.
///
/// # Safety
///
/// `entry` must come from a valid vector table. The application is expected to point VTOR at
/// its own table.
pub unsafe fn jump_to_application(entry: AppEntry) -> ! {
    cortex_m::interrupt::enable();
    cortex_m::asm::bootstrap(
        entry.stack_pointer as *const u32,
        entry.reset_handler as *const u32,
    )
}

/// Arms the application token and resets. The bootloader resumes the application once, after
/// which the token is back to service mode.
pub fn reboot_into_application() -> ! {
    cortex_m::interrupt::disable();
    let mut flag = BootFlag::new(unsafe { Backup::steal() });
    flag.enable_clocks();
    flag.write(BootToken::Application);
    SCB::sys_reset()
}

/// Plain reset. The bootloader leaves the token in service mode after every boot, so nothing
/// needs to be written.
pub fn reboot_into_service_mode() -> ! {
    cortex_m::interrupt::disable();
    SCB::sys_reset()
}
