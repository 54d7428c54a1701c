// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The public result/error types returned from fallible hub operations.

use std::fmt;

use crate::errors::Error;

/// Result alias used throughout the public API.
pub type HubResult<T> = Result<T, HubError>;

/// Top-level error type returned by fallible [`crate::hub::Hub`] operations.
///
/// Only the fatal cases named in the error-handling design (backend
/// initialization, discovery thread spawn) are ever surfaced this way;
/// everything else is logged and absorbed internally.
#[derive(Debug)]
pub enum HubError {
    /// A core failure, see [`Error`] for the specific cause.
    Core(Error),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Core(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HubError::Core(err) => Some(err),
        }
    }
}

impl From<Error> for HubError {
    fn from(err: Error) -> Self {
        HubError::Core(err)
    }
}
