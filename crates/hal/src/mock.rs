//! Recording fakes for the HAL traits.
//!
//! Every fake records the calls it receives and can be armed to fail, so
//! driver tests can assert both the happy path and the compensating rollback
//! paths without hardware.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::hyp::{Hypervisor, VmPerm, Vmid};
use crate::mmio::MmioRegion;
use crate::platform::{AhbLevel, AxiVote, BandwidthVoter, PlatformPower, SecurityController};
use crate::HalError;

/// In-memory register block that logs every write.
#[derive(Default)]
pub struct MockMmio {
    regs: Mutex<BTreeMap<u32, u32>>,
    writes: Mutex<Vec<(u32, u32)>>,
}

impl MockMmio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of writes issued so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// All writes to `offset`, in issue order.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.writes
            .lock()
            .iter()
            .filter(|(off, _)| *off == offset)
            .map(|(_, val)| *val)
            .collect()
    }

    /// Full write log, in issue order.
    pub fn write_log(&self) -> Vec<(u32, u32)> {
        self.writes.lock().clone()
    }

    /// Preload a register value for subsequent reads.
    pub fn preload(&self, offset: u32, value: u32) {
        self.regs.lock().insert(offset, value);
    }
}

impl MmioRegion for MockMmio {
    fn write(&self, offset: u32, value: u32) {
        self.regs.lock().insert(offset, value);
        self.writes.lock().push((offset, value));
    }

    fn read(&self, offset: u32) -> u32 {
        self.regs.lock().get(&offset).copied().unwrap_or(0)
    }

    fn delay_ms(&self, _ms: u32) {}
}

/// One recorded ownership-transfer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypCall {
    pub paddr: u64,
    pub len: usize,
    pub src: Vec<Vmid>,
    pub dst: Vec<VmPerm>,
}

/// Hypervisor fake; fails every call while `fail` is set.
#[derive(Default)]
pub struct MockHypervisor {
    calls: Mutex<Vec<HypCall>>,
    fail: AtomicBool,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<HypCall> {
        self.calls.lock().clone()
    }
}

impl Hypervisor for MockHypervisor {
    fn assign_phys(
        &self,
        paddr: u64,
        len: usize,
        src: &[Vmid],
        dst: &[VmPerm],
    ) -> Result<(), HalError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HalError::HypCallFailed);
        }
        self.calls.lock().push(HypCall {
            paddr,
            len,
            src: src.to_vec(),
            dst: dst.to_vec(),
        });
        Ok(())
    }
}

/// Bandwidth voter fake tracking vote balance.
#[derive(Default)]
pub struct MockVoter {
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
}

impl MockVoter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// True while more successful starts than stops have been issued.
    pub fn voting(&self) -> bool {
        self.starts() > self.stops()
    }
}

impl BandwidthVoter for MockVoter {
    fn start(&self, _ahb: AhbLevel, _axi: &AxiVote) -> Result<(), HalError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(HalError::VoteFailed);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), HalError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Security controller fake.
pub struct MockSecurity {
    supported: bool,
    fail_notify: AtomicBool,
    notifications: Mutex<Vec<(bool, u64)>>,
}

impl MockSecurity {
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            fail_notify: AtomicBool::new(false),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_notify(&self, fail: bool) {
        self.fail_notify.store(fail, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<(bool, u64)> {
        self.notifications.lock().clone()
    }
}

impl SecurityController for MockSecurity {
    fn secure_camera_supported(&self) -> bool {
        self.supported
    }

    fn notify_secure_mode(&self, secure: bool, protection_mask: u64) -> Result<(), HalError> {
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(HalError::SecureNotifyFailed);
        }
        self.notifications.lock().push((secure, protection_mask));
        Ok(())
    }
}

/// Platform power fake.
#[derive(Default)]
pub struct MockPower {
    enabled: AtomicBool,
    fail_enable: AtomicBool,
    enables: AtomicUsize,
    disables: AtomicUsize,
}

impl MockPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enables(&self) -> usize {
        self.enables.load(Ordering::SeqCst)
    }

    pub fn disables(&self) -> usize {
        self.disables.load(Ordering::SeqCst)
    }
}

impl PlatformPower for MockPower {
    fn enable(&self) -> Result<(), HalError> {
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(HalError::PowerFailed);
        }
        self.enabled.store(true, Ordering::SeqCst);
        self.enables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) -> Result<(), HalError> {
        self.enabled.store(false, Ordering::SeqCst);
        self.disables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
