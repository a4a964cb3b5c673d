use core::fmt;

/// Board configuration values that the hardware cannot represent.
///
/// These are checked when the configuration constants are built, so a bad value fails the
/// firmware build instead of surfacing at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    WatchdogTimeoutTooShort,
    /// The watchdog reload register is 12 bits wide.
    WatchdogReloadOverflow { reload: u32 },
    /// An auto-reload value of zero blocks the counter, so the window needs two ticks.
    InactivityTimeoutTooShort { ms: u32 },
    /// The timer auto-reload register is 16 bits wide.
    InactivityPeriodOverflow { period: u32 },
    /// The timer prescaler register is 16 bits wide.
    TimerPrescalerOverflow { prescaler: u32 },
    TimerClockTooSlow { hz: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConfigError::WatchdogTimeoutTooShort => {
                write!(f, "watchdog timeout is shorter than one prescaled tick")
            }
            ConfigError::WatchdogReloadOverflow { reload } => {
                write!(f, "watchdog reload value {} exceeds 0xfff", reload)
            }
            ConfigError::InactivityTimeoutTooShort { ms } => {
                write!(f, "inactivity timeout of {} ms is below 2 ms", ms)
            }
            ConfigError::InactivityPeriodOverflow { period } => {
                write!(f, "inactivity period {} exceeds 0xffff ticks", period)
            }
            ConfigError::TimerPrescalerOverflow { prescaler } => {
                write!(f, "timer prescaler {} exceeds 0xffff", prescaler)
            }
            ConfigError::TimerClockTooSlow { hz } => {
                write!(f, "timer clock of {} Hz is below the 1 kHz tick", hz)
            }
        }
    }
}

/// Reasons an [`EntryCheck`](crate::EntryCheck) refuses to hand control to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryError {
    NullStackPointer,
    StackOutsideRam { stack_pointer: u32 },
    EntryOutsideFlash { reset_handler: u32 },
    /// Cortex-M only executes Thumb code, so the handler address must have bit 0 set.
    NotThumb { reset_handler: u32 },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EntryError::NullStackPointer => write!(f, "initial stack pointer is zero"),
            EntryError::StackOutsideRam { stack_pointer } => {
                write!(f, "initial stack pointer {:#x} is outside RAM", stack_pointer)
            }
            EntryError::EntryOutsideFlash { reset_handler } => {
                write!(f, "reset handler {:#x} is outside flash", reset_handler)
            }
            EntryError::NotThumb { reset_handler } => {
                write!(f, "reset handler {:#x} is not a thumb address", reset_handler)
            }
        }
    }
}
