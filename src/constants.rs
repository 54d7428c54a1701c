// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Protocol and timing constants. See the wire protocol and timing
//! sections of the design document for the rationale behind each value.

use std::time::Duration;

/// Length in bytes of every frame, in either direction.
pub const FRAME_LEN: usize = 32;

/// A single 32-byte raw HID report payload.
pub type Frame = [u8; FRAME_LEN];

/// First header byte of every well-formed frame.
pub const COMMAND_ID: u8 = 0x27;

/// Reserved id meaning "the hub" as a source/destination, and "no id
/// assigned" in a device record's `device_id` field.
pub const HUB: u8 = 0xFF;

/// Alias for [`HUB`] used where the "no id assigned" reading is clearer.
pub const UNASSIGNED: u8 = HUB;

/// Upper bound on simultaneously registered devices.
pub const MAX_REGISTERED: usize = 30;

/// QMK raw HID usage page used to identify matching interfaces.
pub const QMK_USAGE_PAGE: u16 = 0xFF60;

/// QMK raw HID usage used to identify matching interfaces.
pub const QMK_USAGE: u16 = 0x61;

/// Byte 2 of a device-to-hub registration frame.
pub const REGISTER_MARKER: u8 = 0x01;

/// Byte 2 of a device-to-hub unregistration frame.
pub const UNREGISTER_MARKER: u8 = 0x00;

/// How often the discovery task reconciles against the backend's
/// enumeration.
pub const DISCOVERY_PERIOD: Duration = Duration::from_secs(1);

/// Below this elapsed-since-last-message threshold, the I/O loop does
/// not sleep at all, to keep burst latency minimal.
pub const SMART_SLEEP_THRESHOLD: Duration = Duration::from_millis(100);

/// Adaptive sleep step once the threshold above is exceeded. Roughly a
/// 240 Hz tick on platforms with coarser timer resolution than Windows.
#[cfg(windows)]
pub const SLEEP_STEP: Duration = Duration::from_millis(1);

/// See [`SLEEP_STEP`] (non-Windows value).
#[cfg(not(windows))]
pub const SLEEP_STEP: Duration = Duration::from_micros(4_170);

/// Builds a frame with every byte initialized to [`UNASSIGNED`], the
/// padding value used throughout the status/membership protocol.
pub fn padded_frame() -> Frame {
    [UNASSIGNED; FRAME_LEN]
}
