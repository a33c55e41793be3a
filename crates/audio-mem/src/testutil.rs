//! In-memory exporter fakes for unit tests.

#![allow(clippy::unwrap_used)]

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use spin::Mutex;

use crate::buf::{DmaBuf, DmaBufProvider, SgTable};
use crate::AudioMemError;

/// Exporter protocol steps that can be armed to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufStep {
    Attach,
    MapAttachment,
    BeginCpuAccess,
    Vmap,
}

#[derive(Default)]
struct BufState {
    attached: bool,
    mapped: bool,
    cpu_open: bool,
    vmapped: bool,
    log: Vec<&'static str>,
}

/// Fake exported buffer that tracks protocol state and can fail at an armed
/// step. `is_quiescent` asserts that every completed step was reversed.
pub struct TestBuf {
    sg: SgTable,
    len: usize,
    fail_at: Mutex<Option<BufStep>>,
    state: Mutex<BufState>,
}

impl TestBuf {
    pub fn contiguous(addr: u64, len: usize) -> Arc<Self> {
        Self::with_sg(SgTable::contiguous(addr, len), len)
    }

    pub fn with_sg(sg: SgTable, len: usize) -> Arc<Self> {
        Arc::new(Self {
            sg,
            len,
            fail_at: Mutex::new(None),
            state: Mutex::new(BufState::default()),
        })
    }

    pub fn fail_at(&self, step: BufStep) {
        *self.fail_at.lock() = Some(step);
    }

    fn should_fail(&self, step: BufStep) -> bool {
        *self.fail_at.lock() == Some(step)
    }

    /// True when no attachment, mapping, or CPU access is outstanding.
    pub fn is_quiescent(&self) -> bool {
        let s = self.state.lock();
        !s.attached && !s.mapped && !s.cpu_open && !s.vmapped
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.state.lock().log.clone()
    }
}

impl DmaBuf for TestBuf {
    fn len(&self) -> usize {
        self.len
    }

    fn attach(&self) -> Result<(), AudioMemError> {
        if self.should_fail(BufStep::Attach) {
            return Err(AudioMemError::MapFailed);
        }
        let mut s = self.state.lock();
        s.attached = true;
        s.log.push("attach");
        Ok(())
    }

    fn map_attachment(&self) -> Result<SgTable, AudioMemError> {
        if self.should_fail(BufStep::MapAttachment) {
            return Err(AudioMemError::MapFailed);
        }
        let mut s = self.state.lock();
        s.mapped = true;
        s.log.push("map_attachment");
        Ok(self.sg.clone())
    }

    fn unmap_attachment(&self) {
        let mut s = self.state.lock();
        s.mapped = false;
        s.log.push("unmap_attachment");
    }

    fn detach(&self) {
        let mut s = self.state.lock();
        s.attached = false;
        s.log.push("detach");
    }

    fn begin_cpu_access(&self) -> Result<(), AudioMemError> {
        if self.should_fail(BufStep::BeginCpuAccess) {
            return Err(AudioMemError::MapFailed);
        }
        let mut s = self.state.lock();
        s.cpu_open = true;
        s.log.push("begin_cpu_access");
        Ok(())
    }

    fn end_cpu_access(&self) {
        let mut s = self.state.lock();
        s.cpu_open = false;
        s.log.push("end_cpu_access");
    }

    fn vmap(&self) -> Result<u64, AudioMemError> {
        if self.should_fail(BufStep::Vmap) {
            return Err(AudioMemError::MapFailed);
        }
        let mut s = self.state.lock();
        s.vmapped = true;
        s.log.push("vmap");
        Ok(0xFFFF_8000_0000_0000 | self.sg.base_addr().unwrap_or(0))
    }

    fn vunmap(&self) {
        let mut s = self.state.lock();
        s.vmapped = false;
        s.log.push("vunmap");
    }
}

/// Fd table mapping descriptors to fake buffers.
#[derive(Default)]
pub struct TestProvider {
    bufs: Mutex<HashMap<i32, Arc<TestBuf>>>,
}

impl TestProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, fd: i32, buf: Arc<TestBuf>) {
        self.bufs.lock().insert(fd, buf);
    }
}

impl DmaBufProvider for TestProvider {
    fn get(&self, fd: i32) -> Result<Arc<dyn DmaBuf>, AudioMemError> {
        self.bufs
            .lock()
            .get(&fd)
            .cloned()
            .map(|b| b as Arc<dyn DmaBuf>)
            .ok_or(AudioMemError::InvalidArgument)
    }
}
