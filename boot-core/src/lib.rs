//! Reset-time control logic of the STM32G0 boot firmware.
//!
//! Every piece of hardware the boot sequence touches is reached through a small register-level
//! trait, so the same code runs on the target (bound to real registers by `bootloader-api`) and
//! on the host against the simulated peripherals in [`sim`].
//!
//! On every reset the firmware:
//!
//! 1. arms the independent watchdog ([`watchdog`]),
//! 2. reads and normalises the persisted boot token ([`boot_flag`]),
//! 3. decides between resuming the application and staying in service mode ([`arbiter`]),
//! 4. in service mode, runs the inactivity supervisor ([`timeout`]) while host commands may
//!    program the option bytes ([`option_bytes`]).

#![no_std]

pub mod arbiter;
pub mod boot_flag;
pub mod clock;
mod error;
pub mod memory;
pub mod option_bytes;
pub mod reset_cause;
pub mod service;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod timeout;
pub mod watchdog;

pub use arbiter::{AppEntry, ApplicationImage, Boot, BootArbiter, BootDecision, EntryCheck};
pub use boot_flag::{BackupDomain, BootFlag, BootToken};
pub use error::{ConfigError, EntryError};
pub use memory::{AreaTag, MemoryArea, MemoryDescriptor, MemoryMap};
pub use option_bytes::{OptionBytes, OptionRegister, OptionRegisters};
pub use reset_cause::{ResetCauseRegister, ResetFlags};
pub use service::ServiceSession;
pub use timeout::{Expired, InactivityTimeout, OneShotTimer, PeripheralClock, Supervisor};
pub use watchdog::{Prescaler, WatchdogGuard, WatchdogRegisters, WatchdogSetup};
