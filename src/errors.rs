// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Low-level error variants, one per distinct failure this crate can
//! attribute a cause to. Wrapped by [`crate::result::HubError`] for the
//! public API.

use std::fmt;

/// A specific, nameable failure underlying a [`crate::result::HubError`].
#[derive(Debug)]
pub enum Error {
    /// The backend itself could not be brought up (fatal).
    ContextInit(String),
    /// Opening a discovered interface failed; the path is skipped.
    BackendOpen(String),
    /// Enumerating the backend's interfaces failed for this cycle.
    BackendEnumerate(String),
    /// The discovery thread could not be spawned (fatal).
    ThreadSpawn(String),
    /// A read or write against an open handle failed.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ContextInit(msg) => write!(f, "failed to initialize HID backend: {msg}"),
            Error::BackendOpen(msg) => write!(f, "failed to open HID interface: {msg}"),
            Error::BackendEnumerate(msg) => write!(f, "failed to enumerate HID interfaces: {msg}"),
            Error::ThreadSpawn(msg) => write!(f, "failed to spawn discovery thread: {msg}"),
            Error::Io(msg) => write!(f, "HID I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
