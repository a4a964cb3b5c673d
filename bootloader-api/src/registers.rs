//! STM32G0 bindings of the `boot-core` hardware traits.
//!
//! Registers are accessed through raw `bits()` so the bindings don't depend on how a PAC
//! release names individual fields.

use core::ptr::{read_volatile, write_volatile};

use boot_core::clock;
use boot_core::option_bytes::{
    OptionRegister, OptionRegisters, FLASH_KEY1, FLASH_KEY2, OPTION_KEY1, OPTION_KEY2,
};
use boot_core::timeout::{OneShotTimer, PeripheralClock, TimerSetup};
use boot_core::{BackupDomain, ResetCauseRegister, WatchdogRegisters};
use config::fugit::HertzU32;
use config::pac::{self, Interrupt};
use cortex_m::peripheral::NVIC;

const RCC_APBENR1_RTCAPBEN: u32 = 1 << 10;
const RCC_APBENR1_PWREN: u32 = 1 << 28;
const RCC_APBENR2_TIM14EN: u32 = 1 << 15;

const PWR_CR1_DBP: u32 = 1 << 8;

const IWDG_SR_UPDATE: u32 = 0b111; // PVU | RVU | WVU

const TIM_CR1_CEN: u32 = 1 << 0;
const TIM_CR1_URS: u32 = 1 << 2;
const TIM_CR1_OPM: u32 = 1 << 3;
const TIM_DIER_UIE: u32 = 1 << 0;
const TIM_SR_UIF: u32 = 1 << 0;
const TIM_EGR_UG: u32 = 1 << 0;

const FLASH_SR_ERRORS: u32 = 0xC3FA;
const FLASH_SR_BSY1: u32 = 1 << 16;
const FLASH_CR_OPTSTRT: u32 = 1 << 17;
const FLASH_CR_OPTLOCK: u32 = 1 << 30;
const FLASH_CR_LOCK: u32 = 1 << 31;

const BOOT_FLAG_ADDRESS: u32 = config::backup_register_address(config::BOOT_FLAG_REGISTER);

// Several bindings share RCC. Each one only sets or clears its own bits.
fn rcc() -> &'static pac::rcc::RegisterBlock {
    unsafe { &*pac::RCC::ptr() }
}

pub struct Iwdg(pac::IWDG);

impl Iwdg {
    pub fn new(iwdg: pac::IWDG) -> Self {
        Self(iwdg)
    }
}

impl WatchdogRegisters for Iwdg {
    fn write_key(&mut self, key: u16) {
        self.0.kr.write(|w| unsafe { w.bits(key as u32) });
    }

    fn write_prescaler(&mut self, bits: u8) {
        self.0.pr.write(|w| unsafe { w.bits(bits as u32) });
    }

    fn write_reload(&mut self, reload: u16) {
        self.0.rlr.write(|w| unsafe { w.bits(reload as u32) });
    }

    fn update_pending(&self) -> bool {
        self.0.sr.read().bits() & IWDG_SR_UPDATE != 0
    }
}

/// `TAMP_BKP4R` behind the `PWR_CR1.DBP` write protection.
pub struct Backup {
    pwr: pac::PWR,
}

impl Backup {
    pub fn new(pwr: pac::PWR) -> Self {
        Self { pwr }
    }

    /// # Safety
    ///
    /// Nothing else may be using `PWR` at the same time.
    pub unsafe fn steal() -> Self {
        Self::new(pac::Peripherals::steal().PWR)
    }
}

impl BackupDomain for Backup {
    fn enable_clocks(&mut self) {
        rcc()
            .apbenr1
            .modify(|r, w| unsafe { w.bits(r.bits() | RCC_APBENR1_PWREN | RCC_APBENR1_RTCAPBEN) });
    }

    fn unlock(&mut self) {
        self.pwr
            .cr1
            .modify(|r, w| unsafe { w.bits(r.bits() | PWR_CR1_DBP) });
    }

    fn lock(&mut self) {
        self.pwr
            .cr1
            .modify(|r, w| unsafe { w.bits(r.bits() & !PWR_CR1_DBP) });
    }

    fn read_register(&self) -> u32 {
        unsafe { read_volatile(BOOT_FLAG_ADDRESS as *const u32) }
    }

    fn write_register(&mut self, value: u32) {
        unsafe { write_volatile(BOOT_FLAG_ADDRESS as *mut u32, value) }
    }
}

/// Reset flags in `RCC_CSR`, read only. `RMVF` is left to the application.
#[derive(Default)]
pub struct ResetFlagsRegister(());

impl ResetFlagsRegister {
    pub fn new() -> Self {
        Self(())
    }
}

impl ResetCauseRegister for ResetFlagsRegister {
    fn read_flags(&self) -> u32 {
        rcc().csr.read().bits()
    }
}

/// TIM14 kernel clock derived from the live RCC configuration. Reads zero for PLL and HSE
/// system clocks, which makes the supervisor fall back to its default clock.
pub struct RccClock;

impl PeripheralClock for RccClock {
    fn timer_clock(&self) -> HertzU32 {
        let rcc = rcc();
        clock::timer_clock(rcc.cr.read().bits(), rcc.cfgr.read().bits())
    }
}

pub struct Tim14 {
    tim: pac::TIM14,
    nvic: NVIC,
}

impl Tim14 {
    pub fn new(tim: pac::TIM14, nvic: NVIC) -> Self {
        Self { tim, nvic }
    }
}

impl OneShotTimer for Tim14 {
    fn power_up(&mut self) {
        rcc()
            .apbenr2
            .modify(|r, w| unsafe { w.bits(r.bits() | RCC_APBENR2_TIM14EN) });
        unsafe {
            self.nvic.set_priority(
                Interrupt::TIM14,
                config::nvic_priority(config::IPRIO_TIMEOUT),
            );
        }
    }

    fn configure(&mut self, setup: TimerSetup) {
        self.tim.cr1.write(|w| unsafe { w.bits(TIM_CR1_OPM | TIM_CR1_URS) });
        self.tim.psc.write(|w| unsafe { w.bits(setup.prescaler as u32) });
        self.tim.arr.write(|w| unsafe { w.bits(setup.period as u32) });
        // Latch the prescaler now; URS keeps this from raising UIF.
        self.tim.egr.write(|w| unsafe { w.bits(TIM_EGR_UG) });
    }

    fn stop(&mut self) {
        self.tim
            .cr1
            .modify(|r, w| unsafe { w.bits(r.bits() & !TIM_CR1_CEN) });
    }

    fn reset_counter(&mut self) {
        self.tim.cnt.write(|w| unsafe { w.bits(0) });
    }

    fn clear_update(&mut self) {
        self.tim.sr.write(|w| unsafe { w.bits(!TIM_SR_UIF) });
    }

    fn enable_update_interrupt(&mut self) {
        self.tim
            .dier
            .modify(|r, w| unsafe { w.bits(r.bits() | TIM_DIER_UIE) });
        unsafe { NVIC::unmask(Interrupt::TIM14) };
    }

    fn start(&mut self) {
        self.tim
            .cr1
            .modify(|r, w| unsafe { w.bits(r.bits() | TIM_CR1_CEN) });
    }

    fn update_pending(&self) -> bool {
        self.tim.sr.read().bits() & TIM_SR_UIF != 0
    }
}

const fn option_register_offset(register: OptionRegister) -> usize {
    match register {
        OptionRegister::Optr => 0x20,
        OptionRegister::Pcrop1Asr => 0x24,
        OptionRegister::Pcrop1Aer => 0x28,
        OptionRegister::Wrp1Ar => 0x2C,
        OptionRegister::Wrp1Br => 0x30,
        OptionRegister::Pcrop1Bsr => 0x34,
        OptionRegister::Pcrop1Ber => 0x38,
        OptionRegister::Secr => 0x80,
    }
}

pub struct FlashOptions(pac::FLASH);

impl FlashOptions {
    pub fn new(flash: pac::FLASH) -> Self {
        Self(flash)
    }
}

impl OptionRegisters for FlashOptions {
    fn unlock(&mut self) {
        if self.0.cr.read().bits() & FLASH_CR_LOCK != 0 {
            self.0.keyr.write(|w| unsafe { w.bits(FLASH_KEY1) });
            self.0.keyr.write(|w| unsafe { w.bits(FLASH_KEY2) });
        }
        if self.0.cr.read().bits() & FLASH_CR_OPTLOCK != 0 {
            self.0.optkeyr.write(|w| unsafe { w.bits(OPTION_KEY1) });
            self.0.optkeyr.write(|w| unsafe { w.bits(OPTION_KEY2) });
        }
    }

    fn clear_errors(&mut self) {
        self.0.sr.write(|w| unsafe { w.bits(FLASH_SR_ERRORS) });
    }

    fn write(&mut self, register: OptionRegister, value: u32) {
        unsafe {
            let base = pac::FLASH::ptr() as *mut u8;
            write_volatile(base.add(option_register_offset(register)) as *mut u32, value);
        }
    }

    fn start(&mut self) {
        self.0
            .cr
            .modify(|r, w| unsafe { w.bits(r.bits() | FLASH_CR_OPTSTRT) });
    }

    fn busy(&self) -> bool {
        self.0.sr.read().bits() & FLASH_SR_BSY1 != 0
    }

    fn read_byte(&self, address: u32) -> u8 {
        unsafe { read_volatile(address as *const u8) }
    }
}
