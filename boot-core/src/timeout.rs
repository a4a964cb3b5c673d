//! Inactivity supervisor for service mode.
//!
//! A one-pulse timer counts milliseconds from the last [`Supervisor::restart`]. When it runs out
//! the timer interrupt reports [`Expired`] and the firmware resets the device, which lands back
//! in the boot arbiter with the token already normalised to service mode.

use defmt_or_log::{info, trace, warn};
use fugit::{HertzU32, MillisDurationU32};

use crate::ConfigError;

/// Countdown resolution.
pub const TICK: HertzU32 = HertzU32::from_raw(1_000);

/// Timer clock assumed when the clock tree reports something unusable (HSI16 after reset).
pub const FALLBACK_CLOCK: HertzU32 = HertzU32::from_raw(16_000_000);

/// Source of the timer kernel clock, owned by the clock-tree code.
pub trait PeripheralClock {
    fn timer_clock(&self) -> HertzU32;
}

/// Register-level access to a basic up-counting timer.
pub trait OneShotTimer {
    /// Enables the timer's bus clock and sets its interrupt priority.
    fn power_up(&mut self);
    /// Loads prescaler and auto-reload and selects one-pulse mode.
    fn configure(&mut self, setup: TimerSetup);
    fn stop(&mut self);
    fn reset_counter(&mut self);
    fn clear_update(&mut self);
    fn enable_update_interrupt(&mut self);
    fn start(&mut self);
    /// The counter has wrapped past the auto-reload value.
    fn update_pending(&self) -> bool;
}

impl<T: OneShotTimer + ?Sized> OneShotTimer for &mut T {
    fn power_up(&mut self) {
        (**self).power_up()
    }

    fn configure(&mut self, setup: TimerSetup) {
        (**self).configure(setup)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn reset_counter(&mut self) {
        (**self).reset_counter()
    }

    fn clear_update(&mut self) {
        (**self).clear_update()
    }

    fn enable_update_interrupt(&mut self) {
        (**self).enable_update_interrupt()
    }

    fn start(&mut self) {
        (**self).start()
    }

    fn update_pending(&self) -> bool {
        (**self).update_pending()
    }
}

/// Inactivity window, validated against the 16-bit auto-reload register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InactivityTimeout {
    period: u16,
}

impl InactivityTimeout {
    pub const fn new(timeout: MillisDurationU32) -> Result<Self, ConfigError> {
        let ms = timeout.ticks();
        if ms < 2 {
            return Err(ConfigError::InactivityTimeoutTooShort { ms });
        }
        let period = ms - 1;
        if period > u16::MAX as u32 {
            return Err(ConfigError::InactivityPeriodOverflow { period });
        }
        Ok(Self {
            period: period as u16,
        })
    }

    /// Auto-reload value: the counter expires on the tick after it reaches this.
    pub const fn period(&self) -> u16 {
        self.period
    }

    pub const fn millis(&self) -> u32 {
        self.period as u32 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerSetup {
    pub prescaler: u16,
    pub period: u16,
}

impl TimerSetup {
    /// `prescaler = clock / 1 kHz - 1`, `period = timeout_ms - 1`.
    pub fn new(clock: HertzU32, timeout: InactivityTimeout) -> Result<Self, ConfigError> {
        let hz = clock.raw();
        if hz < TICK.raw() {
            return Err(ConfigError::TimerClockTooSlow { hz });
        }
        let prescaler = hz / TICK.raw() - 1;
        if prescaler > u16::MAX as u32 {
            return Err(ConfigError::TimerPrescalerOverflow { prescaler });
        }
        Ok(Self {
            prescaler: prescaler as u16,
            period: timeout.period(),
        })
    }

    /// Like [`new`](Self::new) but never fails: a zero or unrepresentable clock is replaced by
    /// [`FALLBACK_CLOCK`].
    pub fn for_clock(clock: HertzU32, timeout: InactivityTimeout) -> Self {
        match Self::new(clock, timeout) {
            Ok(setup) => setup,
            Err(e) => {
                warn!("{}, timing from {} Hz instead", e, FALLBACK_CLOCK.raw());
                Self {
                    prescaler: (FALLBACK_CLOCK.raw() / TICK.raw() - 1) as u16,
                    period: timeout.period(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorState {
    Armed,
    Expired,
}

/// Reported once per countdown that ran out. The caller is expected to reset the device.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Expired {
    pub timeout_ms: u32,
}

pub struct Supervisor<T> {
    timer: T,
    timeout: InactivityTimeout,
    setup: TimerSetup,
    state: SupervisorState,
}

impl<T: OneShotTimer> Supervisor<T> {
    pub fn init<C>(mut timer: T, clock: &C, timeout: InactivityTimeout) -> Self
    where
        C: PeripheralClock + ?Sized,
    {
        timer.power_up();
        let setup = TimerSetup::for_clock(clock.timer_clock(), timeout);
        timer.configure(setup);
        timer.clear_update();
        timer.enable_update_interrupt();

        let mut supervisor = Self {
            timer,
            timeout,
            setup,
            state: SupervisorState::Armed,
        };
        supervisor.restart();
        info!(
            "inactivity supervisor armed: {} ms (prescaler {})",
            timeout.millis(),
            setup.prescaler
        );
        supervisor
    }

    /// Cancels the running countdown and starts a full one. Call on every unit of host activity.
    pub fn restart(&mut self) {
        self.timer.stop();
        self.timer.reset_counter();
        self.timer.clear_update();
        self.timer.start();
        self.state = SupervisorState::Armed;
        trace!("inactivity countdown restarted");
    }

    /// Timer interrupt body.
    pub fn on_interrupt(&mut self) -> Option<Expired> {
        if !self.timer.update_pending() {
            return None;
        }
        self.timer.clear_update();
        self.timer.stop();
        self.state = SupervisorState::Expired;
        warn!("no host activity for {} ms", self.timeout.millis());
        Some(Expired {
            timeout_ms: self.timeout.millis(),
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn timeout(&self) -> InactivityTimeout {
        self.timeout
    }

    pub fn setup(&self) -> TimerSetup {
        self.setup
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}
