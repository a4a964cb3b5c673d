//! Simulated peripherals for host tests.
//!
//! Each one implements the register trait of the real peripheral and records what the code
//! under test did to it. Timers advance only when a test says so, in milliseconds.

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicU32, Ordering};

use fugit::HertzU32;
use heapless::Vec;

use crate::arbiter::{AppEntry, ApplicationImage};
use crate::boot_flag::BackupDomain;
use crate::option_bytes::{OptionRegister, OptionRegisters};
use crate::reset_cause::ResetCauseRegister;
use crate::timeout::{OneShotTimer, PeripheralClock, TimerSetup};
use crate::watchdog::{WatchdogRegisters, KEY_ENABLE, KEY_RELOAD};

const LOG_DEPTH: usize = 32;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Position of an access in the order of all simulated accesses. Strictly increasing along any
/// one thread, so stamps taken within one test compare in program order.
fn stamp() -> u32 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOp {
    Key(u16),
    Prescaler(u8),
    Reload(u16),
}

/// Independent watchdog. The update flags stay set for `latency` status reads after a
/// prescaler or reload write.
#[derive(Debug, Default)]
pub struct SimWatchdog {
    ops: Vec<WatchdogOp, LOG_DEPTH>,
    latency: u32,
    pending: Cell<u32>,
    polls: Cell<u32>,
    running: bool,
    reloaded_at: Option<u32>,
}

impl SimWatchdog {
    pub fn with_update_latency(latency: u32) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn ops(&self) -> &[WatchdogOp] {
        &self.ops
    }

    pub fn status_polls(&self) -> u32 {
        self.polls.get()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stamp of the first refresh key, which completes arming.
    pub fn reloaded_at(&self) -> Option<u32> {
        self.reloaded_at
    }

    fn record(&mut self, op: WatchdogOp) {
        self.ops.push(op).ok();
    }
}

impl WatchdogRegisters for SimWatchdog {
    fn write_key(&mut self, key: u16) {
        self.record(WatchdogOp::Key(key));
        if key == KEY_ENABLE {
            self.running = true;
        }
        if key == KEY_RELOAD && self.reloaded_at.is_none() {
            self.reloaded_at = Some(stamp());
        }
    }

    fn write_prescaler(&mut self, bits: u8) {
        self.record(WatchdogOp::Prescaler(bits));
        self.pending.set(self.latency);
    }

    fn write_reload(&mut self, reload: u16) {
        self.record(WatchdogOp::Reload(reload));
        self.pending.set(self.latency);
    }

    fn update_pending(&self) -> bool {
        self.polls.set(self.polls.get() + 1);
        match self.pending.get() {
            0 => false,
            n => {
                self.pending.set(n - 1);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOp {
    Unlock,
    Write(u32),
    Lock,
}

/// Backup register with its write protection. Writes while locked are counted and dropped.
#[derive(Debug)]
pub struct SimBackup {
    value: u32,
    locked: bool,
    clocks: bool,
    ops: Vec<BackupOp, LOG_DEPTH>,
    writes_while_locked: u32,
    first_read_at: Cell<Option<u32>>,
    first_unlock_at: Option<u32>,
}

impl SimBackup {
    pub fn holding(value: u32) -> Self {
        Self {
            value,
            locked: true,
            clocks: false,
            ops: Vec::new(),
            writes_while_locked: 0,
            first_read_at: Cell::new(None),
            first_unlock_at: None,
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn ops(&self) -> &[BackupOp] {
        &self.ops
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn clocks_enabled(&self) -> bool {
        self.clocks
    }

    pub fn writes_while_locked(&self) -> u32 {
        self.writes_while_locked
    }

    pub fn first_read_at(&self) -> Option<u32> {
        self.first_read_at.get()
    }

    pub fn first_unlock_at(&self) -> Option<u32> {
        self.first_unlock_at
    }

    /// Stands in for a reset: the register survives, the protection comes back.
    pub fn reset(&mut self) {
        self.locked = true;
        self.clocks = false;
        self.ops.clear();
        self.first_read_at.set(None);
        self.first_unlock_at = None;
    }
}

impl BackupDomain for SimBackup {
    fn enable_clocks(&mut self) {
        self.clocks = true;
    }

    fn unlock(&mut self) {
        self.ops.push(BackupOp::Unlock).ok();
        self.locked = false;
        if self.first_unlock_at.is_none() {
            self.first_unlock_at = Some(stamp());
        }
    }

    fn lock(&mut self) {
        self.ops.push(BackupOp::Lock).ok();
        self.locked = true;
    }

    fn read_register(&self) -> u32 {
        if self.first_read_at.get().is_none() {
            self.first_read_at.set(Some(stamp()));
        }
        self.value
    }

    fn write_register(&mut self, value: u32) {
        self.ops.push(BackupOp::Write(value)).ok();
        if self.locked {
            self.writes_while_locked += 1;
        } else {
            self.value = value;
        }
    }
}

#[derive(Debug, Default)]
pub struct SimResetCause {
    flags: u32,
}

impl SimResetCause {
    pub fn latched(flags: u32) -> Self {
        Self { flags }
    }
}

impl ResetCauseRegister for SimResetCause {
    fn read_flags(&self) -> u32 {
        self.flags
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimImage {
    entry: AppEntry,
}

impl SimImage {
    pub fn new(entry: AppEntry) -> Self {
        Self { entry }
    }
}

impl ApplicationImage for SimImage {
    fn entry(&self) -> AppEntry {
        self.entry
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimClock(pub HertzU32);

impl PeripheralClock for SimClock {
    fn timer_clock(&self) -> HertzU32 {
        self.0
    }
}

/// Up-counting timer ticking once per simulated millisecond, whatever the prescaler says.
#[derive(Debug, Default)]
pub struct SimTimer {
    powered: bool,
    setup: Option<TimerSetup>,
    one_pulse: bool,
    running: bool,
    irq: bool,
    update: bool,
    counter: u32,
}

impl SimTimer {
    pub fn advance(&mut self, ms: u32) {
        let period = match self.setup {
            Some(setup) => setup.period as u32,
            None => return,
        };
        if !self.running {
            return;
        }
        // Ticks until the counter wraps past the auto-reload value.
        let to_update = period - self.counter + 1;
        if ms < to_update {
            self.counter += ms;
            return;
        }
        self.update = true;
        if self.one_pulse {
            self.counter = 0;
            self.running = false;
        } else {
            self.counter = (ms - to_update) % (period + 1);
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.irq
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn one_pulse(&self) -> bool {
        self.one_pulse
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn setup(&self) -> Option<TimerSetup> {
        self.setup
    }
}

impl OneShotTimer for SimTimer {
    fn power_up(&mut self) {
        self.powered = true;
    }

    fn configure(&mut self, setup: TimerSetup) {
        self.setup = Some(setup);
        self.one_pulse = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn reset_counter(&mut self) {
        self.counter = 0;
    }

    fn clear_update(&mut self) {
        self.update = false;
    }

    fn enable_update_interrupt(&mut self) {
        self.irq = true;
    }

    fn start(&mut self) {
        self.running = self.powered && self.setup.is_some();
    }

    fn update_pending(&self) -> bool {
        self.update
    }
}

pub const OPTION_AREA_BASE: u32 = 0x1FFF_7800;
pub const OPTION_AREA_LEN: usize = 128;

/// Flash option registers backed by an erased option-byte area. Staged register writes land in
/// the area, little-endian at each register's offset, once the commit has been polled through
/// `latency` busy reads.
#[derive(Debug)]
pub struct SimOptionBytes {
    unlocked: bool,
    errors_cleared: bool,
    started: bool,
    writes: Vec<(OptionRegister, u32), LOG_DEPTH>,
    committed: Cell<usize>,
    latency: u32,
    remaining: Cell<u32>,
    area: RefCell<[u8; OPTION_AREA_LEN]>,
}

impl Default for SimOptionBytes {
    fn default() -> Self {
        Self::with_commit_latency(0)
    }
}

impl SimOptionBytes {
    pub fn with_commit_latency(latency: u32) -> Self {
        Self {
            unlocked: false,
            errors_cleared: false,
            started: false,
            writes: Vec::new(),
            committed: Cell::new(0),
            latency,
            remaining: Cell::new(0),
            area: RefCell::new([0xFF; OPTION_AREA_LEN]),
        }
    }

    pub fn writes(&self) -> &[(OptionRegister, u32)] {
        &self.writes
    }

    pub fn unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn errors_cleared(&self) -> bool {
        self.errors_cleared
    }

    pub fn started(&self) -> bool {
        self.started
    }

    fn commit(&self) {
        let mut area = self.area.borrow_mut();
        for &(register, value) in &self.writes[self.committed.get()..] {
            let offset = register.offset();
            area[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        self.committed.set(self.writes.len());
    }
}

impl OptionRegisters for SimOptionBytes {
    fn unlock(&mut self) {
        self.unlocked = true;
    }

    fn clear_errors(&mut self) {
        self.errors_cleared = true;
    }

    fn write(&mut self, register: OptionRegister, value: u32) {
        self.writes.push((register, value)).ok();
    }

    fn start(&mut self) {
        self.started = true;
        if self.latency == 0 {
            self.commit();
        } else {
            self.remaining.set(self.latency);
        }
    }

    fn busy(&self) -> bool {
        match self.remaining.get() {
            0 => false,
            n => {
                self.remaining.set(n - 1);
                if n == 1 {
                    self.commit();
                }
                true
            }
        }
    }

    fn read_byte(&self, address: u32) -> u8 {
        address
            .checked_sub(OPTION_AREA_BASE)
            .and_then(|offset| self.area.borrow().get(offset as usize).copied())
            .unwrap_or(0)
    }
}
