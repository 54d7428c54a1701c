// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The production [`HidBackend`], built on the `hidapi` crate. Compiled
//! in only under the `hidapi-backend` feature (on by default).

use std::ffi::CString;
use std::sync::Mutex;

use hidapi::{HidApi, HidDevice};

use super::{to_wire, HidBackend, HidDeviceInfo, HidHandle, ReadOutcome};
use crate::constants::{Frame, FRAME_LEN};
use crate::errors::Error;
use crate::result::HubResult;

/// A [`HidBackend`] backed by a real `hidapi` context.
pub struct HidApiBackend {
    api: Mutex<HidApi>,
}

impl HidApiBackend {
    /// Initializes the underlying `hidapi` context. Failure here is
    /// fatal to the hub per the error-handling design.
    pub fn new() -> HubResult<Self> {
        let api = HidApi::new().map_err(|err| Error::ContextInit(err.to_string()))?;
        Ok(HidApiBackend {
            api: Mutex::new(api),
        })
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&self) -> HubResult<Vec<HidDeviceInfo>> {
        let mut api = self.api.lock().expect("hidapi context poisoned");
        api.refresh_devices()
            .map_err(|err| Error::BackendEnumerate(err.to_string()))?;
        Ok(api
            .device_list()
            .map(|info| HidDeviceInfo {
                path: info.path().to_string_lossy().into_owned(),
                usage_page: info.usage_page(),
                usage: info.usage(),
            })
            .collect())
    }

    fn open_path(&self, path: &str) -> HubResult<Box<dyn HidHandle>> {
        let api = self.api.lock().expect("hidapi context poisoned");
        let cpath = CString::new(path).map_err(|err| Error::BackendOpen(err.to_string()))?;
        let device = api
            .open_path(&cpath)
            .map_err(|err| Error::BackendOpen(err.to_string()))?;
        device
            .set_blocking_mode(false)
            .map_err(|err| Error::BackendOpen(err.to_string()))?;
        Ok(Box::new(HidApiHandle {
            device: Mutex::new(device),
            path: path.to_string(),
        }))
    }
}

struct HidApiHandle {
    device: Mutex<HidDevice>,
    path: String,
}

impl HidHandle for HidApiHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn read_nonblocking(&self, buf: &mut Frame) -> HubResult<ReadOutcome> {
        let device = self.device.lock().expect("hidapi device poisoned");
        let mut raw = [0u8; FRAME_LEN];
        match device.read(&mut raw) {
            Ok(n) if n >= FRAME_LEN => {
                buf.copy_from_slice(&raw[..FRAME_LEN]);
                Ok(ReadOutcome::Frame)
            }
            Ok(_) => Ok(ReadOutcome::WouldBlock),
            Err(_) => Ok(ReadOutcome::Gone),
        }
    }

    fn write_report(&self, frame: &Frame) -> HubResult<()> {
        let device = self.device.lock().expect("hidapi device poisoned");
        let wire = to_wire(frame);
        device
            .write(&wire)
            .map_err(|err| Error::Io(err.to_string()))?;
        Ok(())
    }
}
