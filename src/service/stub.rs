//! Scripted in-memory platform
//!
//! Records every platform call and replays configured responses. Compiled
//! for the crate's own tests and, with the `stub` feature, for downstream
//! collaborators that want to test their DDC framing without hardware.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{AllocatorToken, AvPlatform, IoReturn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StubHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StubDevice(pub u32);

/// A platform call as observed by the stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    Create,
    CreateWithService(StubDevice),
    Read {
        chip_address: u32,
        offset: u32,
        len: usize,
    },
    Write {
        chip_address: u32,
        data_address: u32,
        data: Vec<u8>,
    },
    Retain(StubHandle),
    Release(StubHandle),
}

#[derive(Debug, Default)]
struct StubState {
    fail_open: bool,
    rejected: HashSet<StubDevice>,
    echo: bool,
    response: Vec<u8>,
    read_script: VecDeque<(IoReturn, Vec<u8>)>,
    write_script: VecDeque<IoReturn>,
    echo_store: HashMap<(u32, u32), Vec<u8>>,
    next_handle: u32,
    references: HashMap<StubHandle, usize>,
    devices: HashMap<StubHandle, StubDevice>,
    opened: usize,
    retained: usize,
    released: usize,
    stray_releases: usize,
    calls: Vec<StubCall>,
    written: Vec<Vec<u8>>,
}

impl StubState {
    fn open(&mut self) -> StubHandle {
        self.next_handle += 1;
        let handle = StubHandle(self.next_handle);
        self.references.insert(handle, 1);
        self.opened += 1;
        handle
    }

    fn is_live(&self, handle: &StubHandle) -> bool {
        self.references.get(handle).is_some_and(|refs| *refs > 0)
    }
}

/// Shared, cloneable recorder; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct StubPlatform {
    state: Arc<Mutex<StubState>>,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every open fail.
    pub fn fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Make targeted opens of `device` fail.
    pub fn reject_device(&self, device: StubDevice) {
        self.state().rejected.insert(device);
    }

    /// Reads return what was last written to the same chip and sub-address.
    pub fn set_echo(&self, echo: bool) {
        self.state().echo = echo;
    }

    /// Bytes returned by every unscripted read, zero padded to the requested length.
    pub fn respond_with(&self, bytes: &[u8]) {
        self.state().response = bytes.to_vec();
    }

    /// Queue the outcome of the next read, `bytes` are copied on success only.
    pub fn script_read(&self, status: IoReturn, bytes: &[u8]) {
        self.state()
            .read_script
            .push_back((status, bytes.to_vec()));
    }

    /// Queue the status of the next write.
    pub fn script_write(&self, status: IoReturn) {
        self.state().write_script.push_back(status);
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.state().calls.clone()
    }

    /// payloads of all accepted writes in issue order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    pub fn opens(&self) -> usize {
        self.state().opened
    }

    pub fn retains(&self) -> usize {
        self.state().retained
    }

    pub fn releases(&self) -> usize {
        self.state().released
    }

    /// device a handle was opened for, `None` for default opens
    pub fn device_of(&self, handle: &StubHandle) -> Option<StubDevice> {
        self.state().devices.get(handle).copied()
    }

    /// Panics unless every open and retain was matched by exactly one release.
    pub fn assert_balanced(&self) {
        let state = self.state();
        assert_eq!(state.stray_releases, 0, "release of a dead handle");
        assert_eq!(
            state.released,
            state.opened + state.retained,
            "{} opens and {} retains but {} releases",
            state.opened,
            state.retained,
            state.released
        );
    }
}

impl AvPlatform for StubPlatform {
    type Device = StubDevice;
    type Handle = StubHandle;

    fn create(&self, _allocator: AllocatorToken) -> Option<StubHandle> {
        let mut state = self.state();
        state.calls.push(StubCall::Create);
        if state.fail_open {
            None
        } else {
            Some(state.open())
        }
    }

    fn create_with_service(
        &self,
        _allocator: AllocatorToken,
        device: &StubDevice,
    ) -> Option<StubHandle> {
        let mut state = self.state();
        state.calls.push(StubCall::CreateWithService(*device));
        if state.fail_open || state.rejected.contains(device) {
            None
        } else {
            let handle = state.open();
            state.devices.insert(handle, *device);
            Some(handle)
        }
    }

    fn read_i2c(
        &self,
        handle: &StubHandle,
        chip_address: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> IoReturn {
        let mut state = self.state();
        state.calls.push(StubCall::Read {
            chip_address,
            offset,
            len: buf.len(),
        });
        if !state.is_live(handle) {
            return IoReturn::NOT_OPEN;
        }

        let (status, bytes) = if let Some(scripted) = state.read_script.pop_front() {
            scripted
        } else if state.echo {
            let stored = state
                .echo_store
                .get(&(chip_address, offset))
                .cloned()
                .unwrap_or_default();
            (IoReturn::SUCCESS, stored)
        } else {
            (IoReturn::SUCCESS, state.response.clone())
        };

        if status.is_success() {
            buf.fill(0);
            let len = bytes.len().min(buf.len());
            buf[..len].copy_from_slice(&bytes[..len]);
        }
        status
    }

    fn write_i2c(
        &self,
        handle: &StubHandle,
        chip_address: u32,
        data_address: u32,
        buf: &[u8],
    ) -> IoReturn {
        let mut state = self.state();
        state.calls.push(StubCall::Write {
            chip_address,
            data_address,
            data: buf.to_vec(),
        });
        if !state.is_live(handle) {
            return IoReturn::NOT_OPEN;
        }

        let status = state
            .write_script
            .pop_front()
            .unwrap_or(IoReturn::SUCCESS);
        if status.is_success() {
            state.written.push(buf.to_vec());
            state
                .echo_store
                .insert((chip_address, data_address), buf.to_vec());
        }
        status
    }

    fn retain(&self, handle: &StubHandle) -> StubHandle {
        let mut state = self.state();
        state.calls.push(StubCall::Retain(*handle));
        state.retained += 1;
        *state.references.entry(*handle).or_insert(0) += 1;
        *handle
    }

    fn release(&self, handle: StubHandle) {
        let mut guard = self.state();
        let state = &mut *guard;
        state.calls.push(StubCall::Release(handle));
        match state.references.get_mut(&handle) {
            Some(refs) if *refs > 0 => {
                *refs -= 1;
                state.released += 1;
            }
            _ => state.stray_releases += 1,
        }
    }
}
