//! Independent watchdog guard.
//!
//! The watchdog is armed once at the very start of every reset cycle and is never refreshed by
//! the boot firmware afterwards. It only catches a service mode that stalls longer than its
//! window; the normal exit paths are the inactivity supervisor and the jump to the application.

use defmt_or_log::info;
use fugit::{HertzU32, SecsDurationU32};

use crate::ConfigError;

pub const KEY_ENABLE: u16 = 0xCCCC;
pub const KEY_WRITE_ACCESS: u16 = 0x5555;
pub const KEY_RELOAD: u16 = 0xAAAA;

pub const RELOAD_MAX: u16 = 0x0FFF;

/// Divider applied to the low-speed oscillator before it reaches the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Prescaler {
    Div4 = 0,
    Div8 = 1,
    Div16 = 2,
    Div32 = 3,
    Div64 = 4,
    Div128 = 5,
    Div256 = 6,
}

impl Prescaler {
    pub const fn divisor(self) -> u32 {
        4 << (self as u32)
    }

    /// Value for the `PR` register.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Register-level access to the independent watchdog.
pub trait WatchdogRegisters {
    fn write_key(&mut self, key: u16);
    fn write_prescaler(&mut self, bits: u8);
    fn write_reload(&mut self, reload: u16);
    /// Any of the prescaler, reload or window update flags is still set.
    fn update_pending(&self) -> bool;
}

impl<T: WatchdogRegisters + ?Sized> WatchdogRegisters for &mut T {
    fn write_key(&mut self, key: u16) {
        (**self).write_key(key)
    }

    fn write_prescaler(&mut self, bits: u8) {
        (**self).write_prescaler(bits)
    }

    fn write_reload(&mut self, reload: u16) {
        (**self).write_reload(reload)
    }

    fn update_pending(&self) -> bool {
        (**self).update_pending()
    }
}

/// Prescaler and reload value for a given timeout, validated against the register widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WatchdogSetup {
    prescaler: Prescaler,
    reload: u16,
}

impl WatchdogSetup {
    /// `reload = timeout * lsi / prescaler - 1`
    pub const fn new(
        timeout: SecsDurationU32,
        lsi: HertzU32,
        prescaler: Prescaler,
    ) -> Result<Self, ConfigError> {
        let ticks = timeout.ticks() as u64 * lsi.raw() as u64 / prescaler.divisor() as u64;
        if ticks == 0 {
            return Err(ConfigError::WatchdogTimeoutTooShort);
        }
        let reload = ticks - 1;
        if reload > RELOAD_MAX as u64 {
            let reload = if reload > u32::MAX as u64 {
                u32::MAX
            } else {
                reload as u32
            };
            return Err(ConfigError::WatchdogReloadOverflow { reload });
        }
        Ok(Self {
            prescaler,
            reload: reload as u16,
        })
    }

    pub const fn prescaler(&self) -> Prescaler {
        self.prescaler
    }

    pub const fn reload(&self) -> u16 {
        self.reload
    }

    /// Window actually produced by this setup, rounded down to whole milliseconds.
    pub fn timeout_ms(&self, lsi: HertzU32) -> u32 {
        let ticks = (self.reload as u64 + 1) * self.prescaler.divisor() as u64;
        (ticks * 1000 / lsi.raw() as u64) as u32
    }
}

/// An armed watchdog. It has no refresh operation.
pub struct WatchdogGuard<W> {
    // Held so that nothing else in the boot firmware can refresh or reconfigure it.
    _iwdg: W,
    setup: WatchdogSetup,
}

impl<W: WatchdogRegisters> WatchdogGuard<W> {
    /// Starts the countdown. Irreversible until the next reset.
    ///
    /// Spins until the hardware has latched the new prescaler and reload values. The spin has
    /// no bound: the update flags clear within a few LSI cycles on working silicon.
    pub fn arm(mut iwdg: W, setup: WatchdogSetup) -> Self {
        iwdg.write_key(KEY_ENABLE);
        iwdg.write_key(KEY_WRITE_ACCESS);
        iwdg.write_prescaler(setup.prescaler.bits());
        iwdg.write_reload(setup.reload);
        while iwdg.update_pending() {
            core::hint::spin_loop();
        }
        iwdg.write_key(KEY_RELOAD);

        info!(
            "watchdog armed: prescaler /{}, reload {}",
            setup.prescaler.divisor(),
            setup.reload
        );
        Self { _iwdg: iwdg, setup }
    }

    pub fn setup(&self) -> WatchdogSetup {
        self.setup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimWatchdog, WatchdogOp};
    use fugit::ExtU32;
    use fugit::RateExtU32;

    #[test]
    fn ten_seconds_at_lsi() {
        let setup = WatchdogSetup::new(10.secs(), 32_000.Hz(), Prescaler::Div256).unwrap();
        assert_eq!(setup.reload(), 1249);
        assert_eq!(setup.prescaler().bits(), 6);
        assert_eq!(setup.timeout_ms(32_000.Hz()), 10_000);
    }

    #[test]
    fn rejects_unrepresentable_timeouts() {
        assert_eq!(
            WatchdogSetup::new(60.secs(), 32_000.Hz(), Prescaler::Div256),
            Err(ConfigError::WatchdogReloadOverflow { reload: 7499 })
        );
        assert_eq!(
            WatchdogSetup::new(0.secs(), 32_000.Hz(), Prescaler::Div4),
            Err(ConfigError::WatchdogTimeoutTooShort)
        );
    }

    #[test]
    fn arm_follows_key_sequence_and_waits_for_update() {
        let setup = WatchdogSetup::new(10.secs(), 32_000.Hz(), Prescaler::Div256).unwrap();
        let mut iwdg = SimWatchdog::with_update_latency(3);

        let guard = WatchdogGuard::arm(&mut iwdg, setup);
        assert_eq!(guard.setup(), setup);
        drop(guard);

        assert_eq!(
            iwdg.ops(),
            &[
                WatchdogOp::Key(KEY_ENABLE),
                WatchdogOp::Key(KEY_WRITE_ACCESS),
                WatchdogOp::Prescaler(6),
                WatchdogOp::Reload(1249),
                WatchdogOp::Key(KEY_RELOAD),
            ]
        );
        assert_eq!(iwdg.status_polls(), 4);
        assert!(iwdg.is_running());
    }
}
