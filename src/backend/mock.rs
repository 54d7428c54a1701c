// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A deterministic, in-memory [`HidBackend`] used by unit and
//! integration tests. Never compiled into the shipped binary.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::{HidBackend, HidDeviceInfo, HidHandle, ReadOutcome};
use crate::constants::Frame;
use crate::errors::Error;
use crate::result::HubResult;

#[derive(Default)]
struct MockDevice {
    usage_page: u16,
    usage: u16,
    present: bool,
    gone: bool,
    inbound: VecDeque<Frame>,
    outbound: Vec<Frame>,
}

#[derive(Default)]
struct MockState {
    devices: HashMap<String, MockDevice>,
    failing_opens: HashSet<String>,
}

/// A handle to an in-memory fleet of simulated HID interfaces.
///
/// Clone to share the same simulated fleet across a [`HidBackend`]
/// instance and whatever test code drives it.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates an empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or re-adds) a device so it shows up in the next enumeration.
    pub fn add_device(&self, path: &str, usage_page: u16, usage: u16) {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        let dev = state.devices.entry(path.to_string()).or_default();
        dev.usage_page = usage_page;
        dev.usage = usage;
        dev.present = true;
        dev.gone = false;
    }

    /// Simulates the interface disappearing from enumeration, without
    /// closing any handle already open on it.
    pub fn remove_device(&self, path: &str) {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        if let Some(dev) = state.devices.get_mut(path) {
            dev.present = false;
        }
    }

    /// Makes the next `open_path` call for this path fail.
    pub fn fail_open(&self, path: &str) {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        state.failing_opens.insert(path.to_string());
    }

    /// Makes reads against an already-open handle for this path report
    /// [`ReadOutcome::Gone`].
    pub fn mark_gone(&self, path: &str) {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        if let Some(dev) = state.devices.get_mut(path) {
            dev.gone = true;
        }
    }

    /// Queues a frame to be delivered on the next `read_nonblocking`.
    pub fn push_inbound(&self, path: &str, frame: Frame) {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        state
            .devices
            .entry(path.to_string())
            .or_default()
            .inbound
            .push_back(frame);
    }

    /// Drains and returns every frame written to this path so far.
    pub fn take_outbound(&self, path: &str) -> Vec<Frame> {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        state
            .devices
            .get_mut(path)
            .map(|dev| std::mem::take(&mut dev.outbound))
            .unwrap_or_default()
    }
}

impl HidBackend for MockBackend {
    fn enumerate(&self) -> HubResult<Vec<HidDeviceInfo>> {
        let state = self.state.lock().expect("mock backend state poisoned");
        Ok(state
            .devices
            .iter()
            .filter(|(_, dev)| dev.present)
            .map(|(path, dev)| HidDeviceInfo {
                path: path.clone(),
                usage_page: dev.usage_page,
                usage: dev.usage,
            })
            .collect())
    }

    fn open_path(&self, path: &str) -> HubResult<Box<dyn HidHandle>> {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        if state.failing_opens.remove(path) {
            return Err(Error::BackendOpen(format!("simulated open failure for {path}")).into());
        }
        state.devices.entry(path.to_string()).or_default();
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            path: path.to_string(),
        }))
    }
}

struct MockHandle {
    state: Arc<Mutex<MockState>>,
    path: String,
}

impl HidHandle for MockHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn read_nonblocking(&self, buf: &mut Frame) -> HubResult<ReadOutcome> {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        let Some(dev) = state.devices.get_mut(&self.path) else {
            return Ok(ReadOutcome::Gone);
        };
        if dev.gone {
            return Ok(ReadOutcome::Gone);
        }
        match dev.inbound.pop_front() {
            Some(frame) => {
                *buf = frame;
                Ok(ReadOutcome::Frame)
            }
            None => Ok(ReadOutcome::WouldBlock),
        }
    }

    fn write_report(&self, frame: &Frame) -> HubResult<()> {
        let mut state = self.state.lock().expect("mock backend state poisoned");
        if let Some(dev) = state.devices.get_mut(&self.path) {
            dev.outbound.push(*frame);
        }
        Ok(())
    }
}
