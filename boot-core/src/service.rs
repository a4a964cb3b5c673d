//! Foreground state of service mode.

use defmt_or_log::{debug, warn};

use crate::memory::{AreaTag, MemoryArea, MemoryMap};
use crate::option_bytes::{OptionBytes, OptionRegisters};
use crate::timeout::{Expired, OneShotTimer, Supervisor};

/// Owns the inactivity supervisor and the option-byte programmer for as long as the device
/// stays in service mode. Host activity of any kind keeps the supervisor from expiring.
pub struct ServiceSession<T, R, const N: usize> {
    supervisor: Supervisor<T>,
    option_bytes: OptionBytes<R>,
    map: MemoryMap<N>,
}

impl<T, R, const N: usize> ServiceSession<T, R, N>
where
    T: OneShotTimer,
    R: OptionRegisters,
{
    pub fn new(supervisor: Supervisor<T>, option_bytes: OptionBytes<R>, map: MemoryMap<N>) -> Self {
        Self {
            supervisor,
            option_bytes,
            map,
        }
    }

    pub fn on_host_activity(&mut self) {
        self.supervisor.restart();
    }

    /// Restarts the supervisor before programming, so a slow host does not lose the commit to
    /// an expiry that was already due.
    pub fn write_option_bytes(&mut self, data: &[u8], length: usize) {
        self.supervisor.restart();
        self.option_bytes.write(data, length);
    }

    /// Byte at `address`, if it lies in an area this session can read.
    pub fn read(&mut self, address: u32) -> Option<u8> {
        self.supervisor.restart();
        match self.map.area_of(address) {
            AreaTag::OptionBytes => Some(self.option_bytes.read(address)),
            AreaTag::Error => {
                debug!("read of unmapped address {:#x}", address);
                None
            }
            tag => {
                warn!("no reader for {:?} at {:#x}", tag, address);
                None
            }
        }
    }

    /// Returns `false` if nothing at `address` accepts writes.
    pub fn write(&mut self, address: u32, data: &[u8]) -> bool {
        self.supervisor.restart();
        match self.map.area_of(address) {
            AreaTag::OptionBytes => {
                MemoryArea::write(&mut self.option_bytes, address, data);
                true
            }
            tag => {
                warn!("no writer for {:?} at {:#x}", tag, address);
                false
            }
        }
    }

    pub fn option_bytes_busy(&self) -> bool {
        self.option_bytes.busy()
    }

    /// Timer interrupt body.
    pub fn on_interrupt(&mut self) -> Option<Expired> {
        self.supervisor.on_interrupt()
    }

    pub fn map(&self) -> &MemoryMap<N> {
        &self.map
    }

    pub fn supervisor(&self) -> &Supervisor<T> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut Supervisor<T> {
        &mut self.supervisor
    }

    pub fn option_bytes(&self) -> &OptionBytes<R> {
        &self.option_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDescriptor;
    use crate::option_bytes::OptionRegister;
    use crate::sim::{SimClock, SimOptionBytes, SimTimer};
    use crate::timeout::InactivityTimeout;
    use fugit::{ExtU32, RateExtU32};

    type Session = ServiceSession<SimTimer, SimOptionBytes, 4>;

    fn session() -> Session {
        let timeout = InactivityTimeout::new(1_000.millis()).unwrap();
        let supervisor = Supervisor::init(SimTimer::default(), &SimClock(16.MHz()), timeout);
        let option_bytes = OptionBytes::new(SimOptionBytes::default(), 0x1FFF_7800, 0x1FFF_787F);
        let map = [
            option_bytes.descriptor(),
            MemoryDescriptor::sized(0x2000_0000, 0x2000, AreaTag::Ram),
        ]
        .iter()
        .copied()
        .collect();
        ServiceSession::new(supervisor, option_bytes, map)
    }

    #[test]
    fn activity_keeps_session_alive() {
        let mut s = session();
        for _ in 0..10 {
            s.supervisor_mut().timer_mut().advance(999);
            s.on_host_activity();
            assert_eq!(s.on_interrupt(), None);
        }
        s.supervisor_mut().timer_mut().advance(1_000);
        assert_eq!(s.on_interrupt(), Some(Expired { timeout_ms: 1_000 }));
    }

    #[test]
    fn option_byte_write_restarts_supervisor() {
        let mut s = session();
        s.supervisor_mut().timer_mut().advance(999);
        s.write_option_bytes(&[0xAA; 10], 10);
        s.supervisor_mut().timer_mut().advance(999);
        assert_eq!(s.on_interrupt(), None);
        assert_eq!(s.option_bytes().registers().writes().len(), 3);
    }

    #[test]
    fn writes_dispatch_by_area() {
        let mut s = session();
        assert!(s.write(0x1FFF_7800, &[0x55, 0, 0, 0]));
        assert_eq!(
            s.option_bytes().registers().writes(),
            &[(OptionRegister::Optr, 0x55), (OptionRegister::Optr, 0x55)]
        );
        while s.option_bytes_busy() {}
        assert_eq!(s.read(0x1FFF_7800), Some(0x55));

        assert!(!s.write(0x2000_0000, &[1]));
        assert_eq!(s.read(0x2000_0000), None);
        assert_eq!(s.read(0x0800_0000), None);
    }
}
