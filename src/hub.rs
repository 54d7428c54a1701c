// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The composition root: owns the shared state, spawns the Discovery
//! thread, drives the I/O loop on the calling thread, and coordinates
//! shutdown between them.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::backend::HidBackend;
use crate::constants::DISCOVERY_PERIOD;
use crate::device_table::DeviceTable;
use crate::discovery::Discovery;
use crate::errors::Error;
use crate::io_loop::{IoLoop, SleepConfig};
use crate::result::HubResult;
use crate::verbosity::Verbosity;

/// Configuration accepted by [`Hub::new`].
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub verbosity: Verbosity,
    pub discovery_period: Duration,
    pub sleep: SleepConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            verbosity: Verbosity::empty(),
            discovery_period: DISCOVERY_PERIOD,
            sleep: SleepConfig::default(),
        }
    }
}

/// Owns the shared device table and shutdown signaling, and runs the
/// relay until asked to stop.
pub struct Hub {
    table: Arc<DeviceTable>,
    backend: Arc<dyn HidBackend>,
    shutdown: Arc<AtomicBool>,
    new_iteration: Arc<AtomicBool>,
    config: HubConfig,
}

impl Hub {
    pub fn new(backend: Arc<dyn HidBackend>, config: HubConfig) -> Self {
        Hub {
            table: Arc::new(DeviceTable::new()),
            backend,
            shutdown: Arc::new(AtomicBool::new(false)),
            new_iteration: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// A clone of the shutdown flag, for embedders (or the CLI's
    /// signal handler) to request termination from outside.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Spawns Discovery, drives the I/O loop to completion, then joins
    /// Discovery and finalizes the backend.
    pub fn run(self) -> HubResult<()> {
        let discovery = Discovery::new(
            Arc::clone(&self.table),
            Arc::clone(&self.backend),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.new_iteration),
            self.config.verbosity,
            self.config.discovery_period,
        );

        let discovery_thread = thread::Builder::new()
            .name("discovery".to_string())
            .spawn(move || discovery.run())
            .map_err(|err| Error::ThreadSpawn(err.to_string()))?;

        let mut io_loop = IoLoop::new(
            Arc::clone(&self.table),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.new_iteration),
            self.config.verbosity,
            self.config.sleep,
        );
        io_loop.run();

        if discovery_thread.join().is_err() {
            log::error!("discovery thread panicked");
        }

        self.backend.finalize()?;
        Ok(())
    }
}
