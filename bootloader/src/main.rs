#![no_main]
#![no_std]

use core::cell::RefCell;

use boot_core::{BootArbiter, BootDecision, MemoryMap, OptionBytes, ServiceSession, Supervisor};
use bootloader_api::{Backup, FlashOptions, Iwdg, LinkedImage, RccClock, ResetFlagsRegister, Tim14};
use cortex_m::interrupt::Mutex;
use cortex_m::peripheral::SCB;
use cortex_m_rt::entry;
use {defmt_rtt as _, panic_halt as _};

use config::pac::{self, interrupt};

type Session = ServiceSession<Tim14, FlashOptions, { config::MEMORY_AREAS.len() }>;

static SESSION: Mutex<RefCell<Option<Session>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    bootloader_api::relocate_vector_table();

    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let mut arbiter = BootArbiter::new(
        Backup::new(dp.PWR),
        ResetFlagsRegister::new(),
        LinkedImage,
    )
    .with_entry_check(config::entry_validation());
    let boot = arbiter.run(Iwdg::new(dp.IWDG), config::WATCHDOG);

    if let BootDecision::Resume(entry) = boot.decision {
        unsafe { bootloader_api::jump_to_application(entry) }
    }

    let option_bytes = OptionBytes::new(
        FlashOptions::new(dp.FLASH),
        config::OPTION_BYTES_START,
        config::OPTION_BYTES_END,
    );
    let map: MemoryMap<{ config::MEMORY_AREAS.len() }> =
        config::MEMORY_AREAS.iter().copied().collect();

    let tim14 = Tim14::new(dp.TIM14, cp.NVIC);

    // The supervisor unmasks TIM14, so it must not fire before the session is reachable.
    cortex_m::interrupt::free(|cs| {
        let supervisor = Supervisor::init(
            tim14,
            &RccClock,
            config::INACTIVITY_TIMEOUT,
        );
        SESSION
            .borrow(cs)
            .replace(Some(ServiceSession::new(supervisor, option_bytes, map)));
    });
    defmt::info!("service mode, reset flags {:#x}", boot.reset_flags.bits());

    loop {
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn TIM14() {
    let expired = cortex_m::interrupt::free(|cs| {
        SESSION
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .and_then(|session| session.on_interrupt())
    });

    if let Some(expired) = expired {
        defmt::info!("inactive for {} ms, resetting", expired.timeout_ms);
        SCB::sys_reset();
    }
}
