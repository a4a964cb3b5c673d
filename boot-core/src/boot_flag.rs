//! Boot token kept in a backup-domain register across resets.
//!
//! The token is written back to [`BootToken::Service`] on every boot decision, so the firmware
//! only resumes the application after a reset if something armed [`BootToken::Application`]
//! right before that reset.

use defmt_or_log::{debug, warn};

const fn tag(ascii: [u8; 4]) -> u32 {
    u32::from_le_bytes(ascii)
}

/// Persisted mode selector. The raw values are four ASCII characters packed little-endian, so
/// a register dump reads `BOOT` or `MAIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum BootToken {
    Service = tag(*b"BOOT"),
    Application = tag(*b"MAIN"),
}

impl BootToken {
    pub const fn raw(self) -> u32 {
        self as u32
    }

    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == BootToken::Service as u32 {
            Some(BootToken::Service)
        } else if raw == BootToken::Application as u32 {
            Some(BootToken::Application)
        } else {
            None
        }
    }
}

/// Always-on register holding the token, and the write protection around it.
pub trait BackupDomain {
    /// Enables the power controller and RTC/TAMP bus clocks.
    fn enable_clocks(&mut self);
    /// Clears the backup-domain write protection.
    fn unlock(&mut self);
    fn lock(&mut self);
    fn read_register(&self) -> u32;
    fn write_register(&mut self, value: u32);
}

impl<T: BackupDomain + ?Sized> BackupDomain for &mut T {
    fn enable_clocks(&mut self) {
        (**self).enable_clocks()
    }

    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn lock(&mut self) {
        (**self).lock()
    }

    fn read_register(&self) -> u32 {
        (**self).read_register()
    }

    fn write_register(&mut self, value: u32) {
        (**self).write_register(value)
    }
}

pub struct BootFlag<B> {
    backup: B,
}

impl<B: BackupDomain> BootFlag<B> {
    pub fn new(backup: B) -> Self {
        Self { backup }
    }

    pub fn enable_clocks(&mut self) {
        self.backup.enable_clocks();
    }

    /// Any value other than the two tags (first power-up, torn write) reads as service mode.
    pub fn read(&self) -> BootToken {
        let raw = self.backup.read_register();
        match BootToken::from_raw(raw) {
            Some(token) => token,
            None => {
                warn!("undefined boot token {:#x}, assuming service mode", raw);
                BootToken::Service
            }
        }
    }

    /// Unlock, store, relock. No rollback if a reset lands in between: the register then holds
    /// an undefined value, which [`read`](Self::read) maps to service mode.
    pub fn write(&mut self, token: BootToken) {
        self.backup.unlock();
        self.backup.write_register(token.raw());
        self.backup.lock();
        debug!("boot token set to {:?}", token);
    }

    pub fn raw(&self) -> u32 {
        self.backup.read_register()
    }

    pub fn into_inner(self) -> B {
        self.backup
    }
}
