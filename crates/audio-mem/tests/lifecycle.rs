//! Buffer lifecycle through the command surface, including the crash sweep.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex};

use mln_audio_mem::ioctl::{dispatch, FdCmd, IoctlCmd, MapCmd, SubsystemCmd};
use mln_audio_mem::{
    AudioMemConfig, AudioMemDriver, DmaBuf, DmaBufProvider, SgTable, UNRECLAIMABLE_SS_MASK,
};
use mln_hal::mock::MockHypervisor;
use mln_hal::{MemPerm, Vmid};
use zerocopy::{AsBytes, FromBytes};

/// Exporter fake that balances every acquire against its release.
struct FakeBuf {
    base: u64,
    len: usize,
    outstanding: AtomicIsize,
}

impl FakeBuf {
    fn new(base: u64, len: usize) -> Arc<Self> {
        Arc::new(Self {
            base,
            len,
            outstanding: AtomicIsize::new(0),
        })
    }

    fn acquire(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    fn balanced(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }
}

impl DmaBuf for FakeBuf {
    fn len(&self) -> usize {
        self.len
    }

    fn attach(&self) -> Result<(), mln_audio_mem::AudioMemError> {
        self.acquire();
        Ok(())
    }

    fn map_attachment(&self) -> Result<SgTable, mln_audio_mem::AudioMemError> {
        self.acquire();
        Ok(SgTable::contiguous(self.base, self.len))
    }

    fn unmap_attachment(&self) {
        self.release();
    }

    fn detach(&self) {
        self.release();
    }

    fn begin_cpu_access(&self) -> Result<(), mln_audio_mem::AudioMemError> {
        self.acquire();
        Ok(())
    }

    fn end_cpu_access(&self) {
        self.release();
    }

    fn vmap(&self) -> Result<u64, mln_audio_mem::AudioMemError> {
        self.acquire();
        Ok(0xFFFF_8000_0000_0000 | self.base)
    }

    fn vunmap(&self) {
        self.release();
    }
}

#[derive(Default)]
struct FakeProvider {
    bufs: Mutex<BTreeMap<i32, Arc<FakeBuf>>>,
}

impl FakeProvider {
    fn insert(&self, fd: i32, buf: Arc<FakeBuf>) {
        self.bufs.lock().unwrap().insert(fd, buf);
    }
}

impl DmaBufProvider for FakeProvider {
    fn get(&self, fd: i32) -> Result<Arc<dyn DmaBuf>, mln_audio_mem::AudioMemError> {
        self.bufs
            .lock()
            .unwrap()
            .get(&fd)
            .cloned()
            .map(|buf| buf as Arc<dyn DmaBuf>)
            .ok_or(mln_audio_mem::AudioMemError::InvalidArgument)
    }
}

fn driver() -> (AudioMemDriver, Arc<FakeProvider>, Arc<MockHypervisor>) {
    let provider = Arc::new(FakeProvider::default());
    let hyp = Arc::new(MockHypervisor::new());
    let cfg = AudioMemConfig {
        scm_mp_enabled: true,
        ..AudioMemConfig::default()
    };
    let drv = AudioMemDriver::probe(cfg, provider.clone(), hyp.clone()).unwrap();
    (drv, provider, hyp)
}

fn map(drv: &AudioMemDriver, fd: i32) -> MapCmd {
    let mut payload = [0u8; 24];
    payload.copy_from_slice(MapCmd::new(fd).as_bytes());
    dispatch(drv, IoctlCmd::MapPhysAddr as u32, &mut payload).unwrap();
    MapCmd::read_from_prefix(&payload[..]).unwrap()
}

fn fd_cmd(drv: &AudioMemDriver, op: IoctlCmd, fd: i32) {
    let mut payload = [0u8; 4];
    payload.copy_from_slice(FdCmd { fd }.as_bytes());
    dispatch(drv, op as u32, &mut payload).unwrap();
}

#[test]
fn granted_playback_buffer_round_trips() {
    let (drv, provider, hyp) = driver();
    let buf = FakeBuf::new(0x8000_0000, 0x4000);
    provider.insert(42, buf.clone());

    let reply = map(&drv, 42);
    assert_eq!(reply.device_addr, 0x8000_0000);
    assert_eq!(reply.len, 0x4000);

    fd_cmd(&drv, IoctlCmd::MapHypAssign, 42);
    fd_cmd(&drv, IoctlCmd::UnmapHypAssign, 42);
    fd_cmd(&drv, IoctlCmd::UnmapPhysAddr, 42);

    assert_eq!(drv.registered_count(), 0);
    assert!(buf.balanced());

    let calls = hyp.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].src, [Vmid::Hlos]);
    assert_eq!(
        calls[1].dst.iter().map(|p| (p.vmid, p.perm)).collect::<Vec<_>>(),
        [(Vmid::Hlos, MemPerm::RWX)]
    );
}

#[test]
fn crash_sweep_releases_every_buffer() {
    let (drv, provider, hyp) = driver();
    let bufs: Vec<_> = (0..3u32)
        .map(|i| FakeBuf::new(0x8000_0000 + u64::from(i) * 0x1_0000, 0x1000))
        .collect();
    for (i, buf) in bufs.iter().enumerate() {
        provider.insert(i as i32, buf.clone());
        map(&drv, i as i32);
    }

    // fd 0 holds a classic grant, fd 1 an unreclaimable subsystem grant,
    // fd 2 was never granted.
    fd_cmd(&drv, IoctlCmd::MapHypAssign, 0);
    let mut cmd = [0u8; 16];
    cmd.copy_from_slice(SubsystemCmd::new(1, UNRECLAIMABLE_SS_MASK).as_bytes());
    dispatch(&drv, IoctlCmd::MapHypAssignV2 as u32, &mut cmd).unwrap();
    assert_eq!(hyp.call_count(), 2);

    drv.crash_handler();

    assert_eq!(drv.registered_count(), 0);
    assert!(bufs.iter().all(|b| b.balanced()));
    // One reclaim for fd 0; the unreclaimable grant is skipped.
    assert_eq!(hyp.call_count(), 3);
}
