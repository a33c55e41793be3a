//! Driver core: probe/remove lifecycle, fd operations, grant state and the
//! crash sweep.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use mln_hal::Hypervisor;

use crate::buf::DmaBufProvider;
use crate::config::AudioMemConfig;
use crate::hyp::{
    grant_carveout, grant_to_dsp, grant_to_subsystems, reclaim_carveout, reclaim_from_dsp,
    reclaim_from_subsystems, UNRECLAIMABLE_SS_MASK,
};
use crate::map::{map_buffer, unmap_buffer};
use crate::registry::{BufAddr, FdEntry, FdRegistry};
use crate::AudioMemError;

pub struct AudioMemDriver {
    cfg: AudioMemConfig,
    provider: Arc<dyn DmaBufProvider>,
    hyp: Arc<dyn Hypervisor>,
    registry: FdRegistry,
    dsp_up: AtomicBool,
    carveout_granted: bool,
}

impl AudioMemDriver {
    /// Bring the driver up. On non-SMMU targets with memory protection the
    /// reserved carve-out is granted to the audio subsystems here; a failed
    /// grant fails the probe.
    pub fn probe(
        cfg: AudioMemConfig,
        provider: Arc<dyn DmaBufProvider>,
        hyp: Arc<dyn Hypervisor>,
    ) -> Result<Self, AudioMemError> {
        let mut carveout_granted = false;
        if !cfg.smmu_enabled() && cfg.scm_mp_enabled && !cfg.non_hyp_assign {
            if let Some(region) = &cfg.carveout {
                grant_carveout(hyp.as_ref(), region)?;
                carveout_granted = true;
            }
        }
        log::info!(
            "[AUDIO-MEM] probed, smmu={} scm_mp={}",
            cfg.smmu_enabled(),
            cfg.scm_mp_enabled
        );
        Ok(Self {
            cfg,
            provider,
            hyp,
            registry: FdRegistry::new(),
            dsp_up: AtomicBool::new(true),
            carveout_granted,
        })
    }

    /// Tear the driver down: release every remaining mapping and return the
    /// carve-out to the HLOS.
    pub fn remove(mut self) -> Result<(), AudioMemError> {
        self.crash_handler();
        if self.carveout_granted {
            if let Some(region) = &self.cfg.carveout {
                reclaim_carveout(self.hyp.as_ref(), region)?;
            }
            self.carveout_granted = false;
        }
        Ok(())
    }

    /// Track audio DSP subsystem state. Operations that need the DSP are
    /// deferred while it is down.
    pub fn set_dsp_state(&self, up: bool) {
        self.dsp_up.store(up, Ordering::SeqCst);
        log::info!("[AUDIO-MEM] audio DSP {}", if up { "up" } else { "down" });
    }

    fn ensure_ready(&self) -> Result<(), AudioMemError> {
        if self.dsp_up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AudioMemError::ProbeDeferred)
        }
    }

    // True when this platform never transfers ownership; the caller treats
    // the grant as satisfied.
    fn skip_hyp(&self, fd: i32) -> bool {
        if self.cfg.non_hyp_assign {
            log::debug!("[AUDIO-MEM] non-hyp platform, skipping transfer for fd {fd}");
            return true;
        }
        false
    }

    /// Import the buffer behind `fd`, map it for device and CPU access, and
    /// register it. Returns the resolved addresses.
    pub fn map_fd(&self, fd: i32) -> Result<BufAddr, AudioMemError> {
        self.ensure_ready()?;
        let buf = self.provider.get(fd)?;
        let mapping = map_buffer(&self.cfg, buf, true)?;
        let addr = BufAddr {
            device_addr: mapping.device_addr,
            kernel_addr: mapping.kernel_addr,
            len: mapping.len,
        };
        if let Err(rejected) = self.registry.insert(fd, mapping) {
            unmap_buffer(&rejected);
            return Err(AudioMemError::InvalidArgument);
        }
        Ok(addr)
    }

    /// Release the mapping registered for `fd`.
    ///
    /// Outstanding grants are not reclaimed here; callers reclaim explicitly
    /// and the crash sweep covers the rest.
    pub fn unmap_fd(&self, fd: i32) -> Result<(), AudioMemError> {
        let entry = self.registry.remove(fd).ok_or(AudioMemError::NotFound)?;
        if entry.hyp_assigned {
            log::warn!("[AUDIO-MEM] fd {fd} unmapped while still granted away");
        }
        unmap_buffer(&entry.mapping);
        Ok(())
    }

    /// Addresses of the buffer registered for `fd`.
    pub fn buf_addr(&self, fd: i32) -> Result<BufAddr, AudioMemError> {
        self.registry.addr(fd).ok_or(AudioMemError::NotFound)
    }

    /// Grant the buffer registered for `fd` to the audio DSP domains.
    pub fn grant_dsp(&self, fd: i32) -> Result<(), AudioMemError> {
        self.ensure_ready()?;
        if self.skip_hyp(fd) {
            return Ok(());
        }
        let addr = self.buf_addr(fd)?;
        grant_to_dsp(self.hyp.as_ref(), addr.device_addr, addr.len)?;
        self.registry.with_entry_mut(fd, |e| e.hyp_assigned = true);
        Ok(())
    }

    /// Reclaim a classic grant. A buffer that is not granted is accepted as
    /// already reclaimed.
    pub fn reclaim_dsp(&self, fd: i32) -> Result<(), AudioMemError> {
        if self.skip_hyp(fd) {
            return Ok(());
        }
        let addr = self.buf_addr(fd)?;
        let granted = self
            .registry
            .with_entry_mut(fd, |e| e.hyp_assigned)
            .unwrap_or(false);
        if !granted {
            log::debug!("[AUDIO-MEM] fd {fd} not granted, nothing to reclaim");
            return Ok(());
        }
        reclaim_from_dsp(self.hyp.as_ref(), addr.device_addr, addr.len)?;
        self.registry.with_entry_mut(fd, |e| e.hyp_assigned = false);
        Ok(())
    }

    /// Grant the buffer registered for `fd` to the subsystems in `ss_masks`.
    pub fn grant_subsystems(&self, fd: i32, ss_masks: u64) -> Result<(), AudioMemError> {
        self.ensure_ready()?;
        if self.skip_hyp(fd) {
            return Ok(());
        }
        let addr = self.buf_addr(fd)?;
        grant_to_subsystems(self.hyp.as_ref(), addr.device_addr, addr.len, ss_masks)?;
        self.registry.with_entry_mut(fd, |e| {
            e.ss_masks = ss_masks;
            e.hyp_assigned = true;
        });
        Ok(())
    }

    /// Reclaim a subsystem grant.
    ///
    /// The modem+ADSP+sensor-DSP combination cannot be reclaimed from the
    /// trusted firmware; such requests succeed without a transfer and the
    /// grant stays recorded.
    pub fn reclaim_subsystems(&self, fd: i32, ss_masks: u64) -> Result<(), AudioMemError> {
        if self.skip_hyp(fd) {
            return Ok(());
        }
        if ss_masks == UNRECLAIMABLE_SS_MASK {
            log::error!("[AUDIO-MEM] reclaim from modem+adsp+sdsp unsupported, fd {fd}");
            return Ok(());
        }
        let addr = self.buf_addr(fd)?;
        reclaim_from_subsystems(self.hyp.as_ref(), addr.device_addr, addr.len, ss_masks)?;
        self.registry.with_entry_mut(fd, |e| {
            e.ss_masks = 0;
            e.hyp_assigned = false;
        });
        Ok(())
    }

    /// Clean up after a userspace crash: reclaim every reclaimable grant and
    /// release every registered buffer. Reclaim failures are logged and do
    /// not stop the sweep.
    pub fn crash_handler(&self) {
        let entries = self.registry.drain();
        log::info!("[AUDIO-MEM] crash sweep over {} buffers", entries.len());
        for (fd, entry) in entries {
            self.sweep_entry(fd, &entry);
            unmap_buffer(&entry.mapping);
        }
    }

    fn sweep_entry(&self, fd: i32, entry: &FdEntry) {
        if !entry.hyp_assigned {
            return;
        }
        if entry.ss_masks == UNRECLAIMABLE_SS_MASK {
            log::warn!("[AUDIO-MEM] fd {fd} grant to modem+adsp+sdsp left in place");
            return;
        }
        let addr = entry.mapping.device_addr;
        let len = entry.mapping.len;
        let result = if entry.ss_masks != 0 {
            reclaim_from_subsystems(self.hyp.as_ref(), addr, len, entry.ss_masks)
        } else {
            reclaim_from_dsp(self.hyp.as_ref(), addr, len)
        };
        if let Err(e) = result {
            log::error!("[AUDIO-MEM] crash reclaim failed for fd {fd}: {e}");
        }
    }

    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{CarveoutRegion, SmmuConfig};
    use crate::hyp::GprDomain;
    use crate::testutil::{TestBuf, TestProvider};
    use alloc::sync::Arc;
    use mln_hal::mock::MockHypervisor;
    use mln_hal::{MemPerm, VmPerm, Vmid};

    fn driver_with(cfg: AudioMemConfig) -> (AudioMemDriver, Arc<TestProvider>, Arc<MockHypervisor>)
    {
        let provider = TestProvider::new();
        let hyp = Arc::new(MockHypervisor::new());
        let driver = AudioMemDriver::probe(cfg, provider.clone(), hyp.clone()).unwrap();
        (driver, provider, hyp)
    }

    fn smmu_cfg() -> AudioMemConfig {
        AudioMemConfig {
            smmu: Some(SmmuConfig::new(2, 0x5)),
            ..AudioMemConfig::default()
        }
    }

    #[test]
    fn map_then_unmap_then_map_again() {
        let (driver, provider, _) = driver_with(smmu_cfg());
        let buf = TestBuf::contiguous(0x4000_0000, 0x1000);
        provider.insert(10, buf.clone());

        let addr = driver.map_fd(10).unwrap();
        assert_eq!(addr.device_addr, 0x4000_0000 | (0x5 << 32));
        assert_eq!(addr.len, 0x1000);
        assert!(addr.kernel_addr.is_some());

        driver.unmap_fd(10).unwrap();
        assert!(buf.is_quiescent());
        assert_eq!(driver.registered_count(), 0);

        driver.map_fd(10).unwrap();
        assert_eq!(driver.registered_count(), 1);
    }

    #[test]
    fn unmap_unknown_fd_is_not_found() {
        let (driver, _, _) = driver_with(smmu_cfg());
        assert_eq!(driver.unmap_fd(99), Err(AudioMemError::NotFound));
    }

    #[test]
    fn duplicate_import_rejected_registry_unchanged() {
        let (driver, provider, _) = driver_with(smmu_cfg());
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();
        assert_eq!(driver.map_fd(10), Err(AudioMemError::InvalidArgument));
        assert_eq!(driver.registered_count(), 1);
        assert_eq!(driver.buf_addr(10).unwrap().len, 0x1000);
    }

    #[test]
    fn dsp_down_defers_map_and_grant() {
        let (driver, provider, hyp) = driver_with(smmu_cfg());
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();

        driver.set_dsp_state(false);
        assert_eq!(driver.map_fd(10), Err(AudioMemError::ProbeDeferred));
        assert_eq!(driver.grant_dsp(10), Err(AudioMemError::ProbeDeferred));
        assert_eq!(hyp.call_count(), 0);

        driver.set_dsp_state(true);
        driver.grant_dsp(10).unwrap();
    }

    #[test]
    fn classic_grant_and_reclaim_roundtrip() {
        let (driver, provider, hyp) = driver_with(smmu_cfg());
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();

        driver.grant_dsp(10).unwrap();
        driver.reclaim_dsp(10).unwrap();
        assert_eq!(hyp.call_count(), 2);

        // Second reclaim finds no outstanding grant and issues no call.
        driver.reclaim_dsp(10).unwrap();
        assert_eq!(hyp.call_count(), 2);
    }

    #[test]
    fn failed_grant_leaves_flag_clear() {
        let (driver, provider, hyp) = driver_with(smmu_cfg());
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();

        hyp.set_fail(true);
        assert!(driver.grant_dsp(10).is_err());
        hyp.set_fail(false);

        // No grant recorded, so reclaim is a no-op.
        driver.reclaim_dsp(10).unwrap();
        assert_eq!(hyp.call_count(), 0);
    }

    #[test]
    fn subsystem_grant_records_mask() {
        let (driver, provider, hyp) = driver_with(smmu_cfg());
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();

        let mask = GprDomain::Adsp.bit() | GprDomain::Apps.bit();
        driver.grant_subsystems(10, mask).unwrap();
        driver.reclaim_subsystems(10, mask).unwrap();
        assert_eq!(hyp.call_count(), 2);
        assert_eq!(hyp.calls()[1].src, [Vmid::AdspQ6, Vmid::Hlos]);
    }

    #[test]
    fn unreclaimable_mask_reclaim_is_a_recorded_noop() {
        let (driver, provider, hyp) = driver_with(smmu_cfg());
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();
        driver.grant_subsystems(10, UNRECLAIMABLE_SS_MASK).unwrap();

        driver.reclaim_subsystems(10, UNRECLAIMABLE_SS_MASK).unwrap();
        // Only the grant reached the hypervisor; the grant stays recorded.
        assert_eq!(hyp.call_count(), 1);
    }

    #[test]
    fn crash_sweep_reclaims_and_releases_everything() {
        let (driver, provider, hyp) = driver_with(smmu_cfg());
        let bufs: alloc::vec::Vec<_> = (0..3u8)
            .map(|i| {
                let buf = TestBuf::contiguous(0x4000_0000 + u64::from(i) * 0x1000, 0x1000);
                provider.insert(10 + i32::from(i), buf.clone());
                driver.map_fd(10 + i32::from(i)).unwrap();
                buf
            })
            .collect();

        driver.grant_dsp(10).unwrap();
        driver
            .grant_subsystems(11, UNRECLAIMABLE_SS_MASK)
            .unwrap();
        driver
            .grant_subsystems(12, GprDomain::Adsp.bit())
            .unwrap();
        let grants = hyp.call_count();

        driver.crash_handler();

        // fd 10 and 12 are reclaimed; the modem+adsp+sdsp grant is not.
        assert_eq!(hyp.call_count(), grants + 2);
        assert_eq!(driver.registered_count(), 0);
        for buf in &bufs {
            assert!(buf.is_quiescent());
        }
    }

    #[test]
    fn probe_grants_carveout_on_protected_non_smmu_targets() {
        let cfg = AudioMemConfig {
            smmu: None,
            scm_mp_enabled: true,
            carveout: Some(CarveoutRegion {
                base: 0x9000_0000,
                len: 0x10_0000,
            }),
            ..AudioMemConfig::default()
        };
        let (driver, _, hyp) = driver_with(cfg);
        assert_eq!(hyp.call_count(), 1);
        assert_eq!(
            hyp.calls()[0].dst,
            [
                VmPerm::new(Vmid::MssMsa, MemPerm::RW),
                VmPerm::new(Vmid::Lpass, MemPerm::RW),
                VmPerm::new(Vmid::AdspHeap, MemPerm::RW),
                VmPerm::new(Vmid::Hlos, MemPerm::RW),
            ]
        );

        driver.remove().unwrap();
        assert_eq!(hyp.call_count(), 2);
        assert_eq!(
            hyp.calls()[1].src,
            [Vmid::MssMsa, Vmid::Lpass, Vmid::AdspHeap, Vmid::Hlos]
        );
    }

    #[test]
    fn smmu_targets_skip_the_carveout_grant() {
        let cfg = AudioMemConfig {
            scm_mp_enabled: true,
            carveout: Some(CarveoutRegion {
                base: 0x9000_0000,
                len: 0x10_0000,
            }),
            ..smmu_cfg()
        };
        let (_driver, _, hyp) = driver_with(cfg);
        assert_eq!(hyp.call_count(), 0);
    }

    #[test]
    fn non_hyp_platform_never_calls_the_hypervisor() {
        let cfg = AudioMemConfig {
            smmu: None,
            scm_mp_enabled: true,
            non_hyp_assign: true,
            carveout: Some(CarveoutRegion {
                base: 0x9000_0000,
                len: 0x10_0000,
            }),
        };
        let (driver, provider, hyp) = driver_with(cfg);
        provider.insert(10, TestBuf::contiguous(0x4000_0000, 0x1000));
        driver.map_fd(10).unwrap();

        driver.grant_dsp(10).unwrap();
        driver.reclaim_dsp(10).unwrap();
        driver
            .grant_subsystems(10, GprDomain::Adsp.bit())
            .unwrap();
        driver
            .reclaim_subsystems(10, GprDomain::Adsp.bit())
            .unwrap();
        assert_eq!(hyp.call_count(), 0);
    }

    #[test]
    fn grant_on_unknown_fd_is_not_found() {
        let (driver, _, _) = driver_with(smmu_cfg());
        assert_eq!(driver.grant_dsp(55), Err(AudioMemError::NotFound));
        assert_eq!(
            driver.grant_subsystems(55, GprDomain::Adsp.bit()),
            Err(AudioMemError::NotFound)
        );
    }
}
