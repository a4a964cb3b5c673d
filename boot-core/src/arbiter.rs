//! Reset-time choice between resuming the application and staying in service mode.
//!
//! [`BootArbiter::run`] performs the decide step of every reset cycle and returns a
//! [`BootDecision`]. The jump itself is a separate, non-returning platform primitive, so
//! everything up to the jump can run against simulated hardware.

use core::ops::Range;

use defmt_or_log::{info, warn};

use crate::boot_flag::{BackupDomain, BootFlag, BootToken};
use crate::reset_cause::{self, ResetCauseRegister, ResetFlags};
use crate::watchdog::{WatchdogGuard, WatchdogRegisters, WatchdogSetup};
use crate::EntryError;

/// The first two words of the application's vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppEntry {
    pub stack_pointer: u32,
    pub reset_handler: u32,
}

impl AppEntry {
    pub const fn from_words(words: [u32; 2]) -> Self {
        Self {
            stack_pointer: words[0],
            reset_handler: words[1],
        }
    }
}

/// The linked application image, read-only.
pub trait ApplicationImage {
    fn entry(&self) -> AppEntry;
}

impl<T: ApplicationImage + ?Sized> ApplicationImage for &T {
    fn entry(&self) -> AppEntry {
        (**self).entry()
    }
}

/// Validation applied to the entry descriptor before control is handed over.
pub trait EntryCheck {
    fn check(&self, entry: &AppEntry) -> Result<(), EntryError>;
}

/// Trusts the linked image and jumps to whatever it contains.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

impl EntryCheck for Unchecked {
    fn check(&self, _entry: &AppEntry) -> Result<(), EntryError> {
        Ok(())
    }
}

/// Requires a non-zero stack pointer inside RAM and a Thumb reset handler inside flash.
#[derive(Debug, Clone)]
pub struct RegionCheck {
    pub flash: Range<u32>,
    pub ram: Range<u32>,
}

impl EntryCheck for RegionCheck {
    fn check(&self, entry: &AppEntry) -> Result<(), EntryError> {
        let sp = entry.stack_pointer;
        if sp == 0 {
            return Err(EntryError::NullStackPointer);
        }
        // Full-descending stack: the initial value may sit one past the end of RAM.
        if sp <= self.ram.start || sp > self.ram.end {
            return Err(EntryError::StackOutsideRam { stack_pointer: sp });
        }
        let handler = entry.reset_handler;
        if handler & 1 == 0 {
            return Err(EntryError::NotThumb {
                reset_handler: handler,
            });
        }
        if !self.flash.contains(&(handler & !1)) {
            return Err(EntryError::EntryOutsideFlash {
                reset_handler: handler,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    Resume(AppEntry),
    StayInService,
}

/// Pure part of the decision: only an armed application token with an acceptable entry
/// descriptor leaves service mode.
pub fn decide<I, C>(token: BootToken, image: &I, check: &C) -> BootDecision
where
    I: ApplicationImage + ?Sized,
    C: EntryCheck + ?Sized,
{
    match token {
        BootToken::Service => BootDecision::StayInService,
        BootToken::Application => {
            let entry = image.entry();
            match check.check(&entry) {
                Ok(()) => BootDecision::Resume(entry),
                Err(e) => {
                    warn!("application entry rejected: {}", e);
                    BootDecision::StayInService
                }
            }
        }
    }
}

/// Outcome of one reset cycle's decide step.
pub struct Boot<W> {
    pub decision: BootDecision,
    pub reset_flags: ResetFlags,
    pub watchdog: WatchdogGuard<W>,
}

pub struct BootArbiter<B, R, I, C = Unchecked> {
    flag: BootFlag<B>,
    reset_cause: R,
    image: I,
    check: C,
}

impl<B, R, I> BootArbiter<B, R, I, Unchecked>
where
    B: BackupDomain,
    R: ResetCauseRegister,
    I: ApplicationImage,
{
    pub fn new(backup: B, reset_cause: R, image: I) -> Self {
        Self {
            flag: BootFlag::new(backup),
            reset_cause,
            image,
            check: Unchecked,
        }
    }
}

impl<B, R, I, C> BootArbiter<B, R, I, C>
where
    B: BackupDomain,
    R: ResetCauseRegister,
    I: ApplicationImage,
    C: EntryCheck,
{
    pub fn with_entry_check<C2: EntryCheck>(self, check: C2) -> BootArbiter<B, R, I, C2> {
        BootArbiter {
            flag: self.flag,
            reset_cause: self.reset_cause,
            image: self.image,
            check,
        }
    }

    /// Arms the watchdog, reads the token and leaves it at [`BootToken::Service`] whatever the
    /// outcome, so an unplanned reset after this point comes back to service mode.
    pub fn run<W: WatchdogRegisters>(&mut self, iwdg: W, setup: WatchdogSetup) -> Boot<W> {
        let watchdog = WatchdogGuard::arm(iwdg, setup);
        let reset_flags = reset_cause::inspect(&self.reset_cause);

        self.flag.enable_clocks();
        let token = self.flag.read();
        self.flag.write(BootToken::Service);

        let decision = decide(token, &self.image, &self.check);
        match decision {
            BootDecision::Resume(entry) => info!(
                "resuming application: sp {:#x}, entry {:#x}",
                entry.stack_pointer, entry.reset_handler
            ),
            BootDecision::StayInService => info!("staying in service mode"),
        }

        Boot {
            decision,
            reset_flags,
            watchdog,
        }
    }

    pub fn flag(&self) -> &BootFlag<B> {
        &self.flag
    }

    pub fn flag_mut(&mut self) -> &mut BootFlag<B> {
        &mut self.flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reset_cause::ResetCauseRegister;
    use crate::sim::{BackupOp, SimBackup, SimImage, SimResetCause, SimWatchdog};
    use crate::watchdog::Prescaler;
    use fugit::{ExtU32, RateExtU32};

    const FLASH: Range<u32> = 0x0800_0000..0x0801_0000;
    const RAM: Range<u32> = 0x2000_0000..0x2000_2000;

    fn setup() -> WatchdogSetup {
        WatchdogSetup::new(10.secs(), 32_000.Hz(), Prescaler::Div256).unwrap()
    }

    fn good_entry() -> AppEntry {
        AppEntry::from_words([0x2000_2000, 0x0800_4135])
    }

    fn region_check() -> RegionCheck {
        RegionCheck {
            flash: FLASH,
            ram: RAM,
        }
    }

    #[test]
    fn service_token_stays_in_service() {
        assert_eq!(
            decide(BootToken::Service, &SimImage::new(good_entry()), &Unchecked),
            BootDecision::StayInService
        );
    }

    #[test]
    fn application_token_resumes_with_image_words() {
        assert_eq!(
            decide(BootToken::Application, &SimImage::new(good_entry()), &Unchecked),
            BootDecision::Resume(good_entry())
        );
    }

    #[test]
    fn unchecked_jumps_to_anything() {
        let blank = AppEntry::from_words([0xFFFF_FFFF, 0xFFFF_FFFF]);
        assert_eq!(
            decide(BootToken::Application, &SimImage::new(blank), &Unchecked),
            BootDecision::Resume(blank)
        );
    }

    #[test]
    fn region_check_rejects_bad_descriptors() {
        let check = region_check();
        let cases = [
            ([0, 0x0800_4135], EntryError::NullStackPointer),
            (
                [0x2000_3000, 0x0800_4135],
                EntryError::StackOutsideRam {
                    stack_pointer: 0x2000_3000,
                },
            ),
            (
                [0x2000_2000, 0x0800_4134],
                EntryError::NotThumb {
                    reset_handler: 0x0800_4134,
                },
            ),
            (
                [0x2000_2000, 0xFFFF_FFFF],
                EntryError::EntryOutsideFlash {
                    reset_handler: 0xFFFF_FFFF,
                },
            ),
        ];
        for (words, err) in cases.iter() {
            let entry = AppEntry::from_words(*words);
            assert_eq!(check.check(&entry), Err(*err));
            assert_eq!(
                decide(BootToken::Application, &SimImage::new(entry), &check),
                BootDecision::StayInService
            );
        }
        assert_eq!(check.check(&good_entry()), Ok(()));
    }

    #[test]
    fn run_normalises_token_and_arms_watchdog() {
        for raw in [
            BootToken::Service.raw(),
            BootToken::Application.raw(),
            0,
            0xDEAD_BEEF,
        ] {
            let mut backup = SimBackup::holding(raw);
            let mut iwdg = SimWatchdog::default();
            let mut arbiter = BootArbiter::new(
                &mut backup,
                SimResetCause::latched(0),
                SimImage::new(good_entry()),
            );

            let boot = arbiter.run(&mut iwdg, setup());
            let expected = if raw == BootToken::Application.raw() {
                BootDecision::Resume(good_entry())
            } else {
                BootDecision::StayInService
            };
            assert_eq!(boot.decision, expected);
            drop(boot);
            drop(arbiter);

            assert_eq!(backup.value(), BootToken::Service.raw());
            assert!(backup.clocks_enabled());
            assert!(iwdg.is_running());
        }
    }

    #[test]
    fn watchdog_is_armed_before_the_token_is_touched() {
        let mut backup = SimBackup::holding(BootToken::Application.raw());
        let mut iwdg = SimWatchdog::with_update_latency(2);
        let mut arbiter = BootArbiter::new(
            &mut backup,
            SimResetCause::latched(0),
            SimImage::new(good_entry()),
        );
        drop(arbiter.run(&mut iwdg, setup()));
        drop(arbiter);

        let armed = iwdg.reloaded_at().unwrap();
        assert!(armed < backup.first_read_at().unwrap());
        assert!(armed < backup.first_unlock_at().unwrap());
        assert_eq!(
            backup.ops(),
            &[
                BackupOp::Unlock,
                BackupOp::Write(BootToken::Service.raw()),
                BackupOp::Lock,
            ]
        );
    }

    #[test]
    fn reset_flags_survive_for_the_application() {
        let raw = 0x2400_0000;
        let rcc = SimResetCause::latched(raw);
        let mut arbiter = BootArbiter::new(
            SimBackup::holding(BootToken::Application.raw()),
            &rcc,
            SimImage::new(good_entry()),
        );
        let boot = arbiter.run(SimWatchdog::default(), setup());
        assert_eq!(
            boot.reset_flags,
            ResetFlags::PIN | ResetFlags::INDEPENDENT_WATCHDOG
        );
        assert_eq!(boot.decision, BootDecision::Resume(good_entry()));
        assert_eq!(rcc.read_flags(), raw);
    }

    #[test]
    fn rejected_entry_still_normalises_token() {
        let mut backup = SimBackup::holding(BootToken::Application.raw());
        let mut arbiter = BootArbiter::new(
            &mut backup,
            SimResetCause::latched(0),
            SimImage::new(AppEntry::from_words([0, 0])),
        )
        .with_entry_check(region_check());

        let boot = arbiter.run(SimWatchdog::default(), setup());
        assert_eq!(boot.decision, BootDecision::StayInService);
        drop(boot);
        drop(arbiter);
        assert_eq!(backup.value(), BootToken::Service.raw());
    }
}
