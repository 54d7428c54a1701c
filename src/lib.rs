// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A user-space switchboard that relays 32-byte raw HID reports
//! between QMK keyboards.
//!
//! Two long-running agents share a device table without a mutex on
//! the hot path: a background Discovery task reconciles the table
//! against the backend's live enumeration, and a single-threaded I/O
//! loop reads, classifies, routes, and writes frames each pass. See
//! [`hub::Hub`] for the composition root that wires the two together.
//!
//! The relay engine never depends on a concrete HID library directly;
//! it is written against the [`backend::HidBackend`]/[`backend::HidHandle`]
//! trait pair, satisfied by a `hidapi`-backed implementation for real
//! hardware and an in-memory mock for tests.

pub mod backend;
pub mod constants;
pub mod device_table;
pub mod discovery;
pub mod errors;
pub mod hub;
pub mod io_loop;
pub mod queue;
pub mod registrar;
pub mod result;
pub mod router;
pub mod verbosity;

pub use backend::{HidBackend, HidDeviceInfo, HidHandle, ReadOutcome};
pub use hub::{Hub, HubConfig};
pub use io_loop::SleepConfig;
pub use result::{HubError, HubResult};
pub use verbosity::Verbosity;
