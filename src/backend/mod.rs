// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The contract between the relay engine and a concrete HID I/O
//! library. The engine never names a concrete library directly; it
//! depends only on [`HidBackend`] and [`HidHandle`].

#[cfg(feature = "hidapi-backend")]
pub mod hidapi_backend;
pub mod mock;

use crate::constants::{Frame, FRAME_LEN};
use crate::result::HubResult;

/// One enumerated HID interface, as reported by [`HidBackend::enumerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    /// Stable backend path, used as the interface's identity.
    pub path: String,
    /// HID usage page advertised by the interface.
    pub usage_page: u16,
    /// HID usage advertised by the interface.
    pub usage: u16,
}

/// Outcome of a single non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A full 32-byte frame was read into the caller's buffer.
    Frame,
    /// No frame was available right now; the device may still be present.
    WouldBlock,
    /// The read failed in a way that indicates the device is gone.
    Gone,
}

/// Enumerates interfaces and opens them by path. Implementations own
/// whatever context object the underlying library requires.
pub trait HidBackend: Send + Sync {
    /// Returns a one-shot snapshot of every currently visible HID
    /// interface. The caller filters by usage page/usage.
    fn enumerate(&self) -> HubResult<Vec<HidDeviceInfo>>;

    /// Opens the interface at `path` in non-blocking mode.
    fn open_path(&self, path: &str) -> HubResult<Box<dyn HidHandle>>;

    /// Releases any backend-wide resources. Called once, at hub shutdown.
    fn finalize(&self) -> HubResult<()> {
        Ok(())
    }
}

/// A single open HID interface handle, owned by exactly one
/// [`crate::device_table::DeviceRecord`].
pub trait HidHandle: Send + Sync {
    /// The backend path this handle was opened from.
    fn path(&self) -> &str;

    /// Attempts to read one frame without blocking.
    fn read_nonblocking(&self, buf: &mut Frame) -> HubResult<ReadOutcome>;

    /// Writes one frame, prepending the report-id byte required on the
    /// wire (see [`to_wire`]).
    fn write_report(&self, frame: &Frame) -> HubResult<()>;
}

/// Prepends the backend-specific leading report-id byte (always 0x00
/// for this protocol) to a frame, producing the 33-byte wire form.
pub fn to_wire(frame: &Frame) -> [u8; FRAME_LEN + 1] {
    let mut wire = [0u8; FRAME_LEN + 1];
    wire[1..].copy_from_slice(frame);
    wire
}
