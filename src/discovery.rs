// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The background task that reconciles the shared device table against
//! the backend's live enumeration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::HidBackend;
use crate::constants::{QMK_USAGE, QMK_USAGE_PAGE};
use crate::device_table::DeviceTable;
use crate::verbosity::Verbosity;

/// Owns the backend handle used for enumeration and drives the
/// periodic reconciliation loop on its own OS thread.
pub struct Discovery {
    table: Arc<DeviceTable>,
    backend: Arc<dyn HidBackend>,
    shutdown: Arc<AtomicBool>,
    new_iteration: Arc<AtomicBool>,
    verbosity: Verbosity,
    period: Duration,
}

impl Discovery {
    pub fn new(
        table: Arc<DeviceTable>,
        backend: Arc<dyn HidBackend>,
        shutdown: Arc<AtomicBool>,
        new_iteration: Arc<AtomicBool>,
        verbosity: Verbosity,
        period: Duration,
    ) -> Self {
        Discovery {
            table,
            backend,
            shutdown,
            new_iteration,
            verbosity,
            period,
        }
    }

    /// Runs reconciliation cycles until the shared shutdown flag is set.
    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Acquire) {
            self.cycle();
            self.sleep_interruptible(self.period);
        }
    }

    fn sleep_interruptible(&self, total: Duration) {
        let step = Duration::from_millis(50).min(total);
        let mut waited = Duration::ZERO;
        while waited < total {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let remaining = total - waited;
            let this_step = step.min(remaining);
            std::thread::sleep(this_step);
            waited += this_step;
        }
    }

    /// One reconciliation pass (§4.4). Exposed at crate visibility so
    /// tests can drive it deterministically instead of racing threads.
    pub(crate) fn cycle(&self) {
        for record in self.table.iter() {
            record.set_seen(false);
        }

        let snapshot = match self.backend.enumerate() {
            Ok(devices) => devices,
            Err(err) => {
                log::warn!("enumeration failed: {err}");
                return;
            }
        };

        for info in snapshot
            .into_iter()
            .filter(|info| info.usage_page == QMK_USAGE_PAGE && info.usage == QMK_USAGE)
        {
            match self.table.find_by_path(&info.path) {
                Some(existing) => {
                    if !existing.marked_for_unregistration() {
                        existing.set_seen(true);
                    }
                }
                None => match self.backend.open_path(&info.path) {
                    Ok(handle) => {
                        let record = self.table.insert(info.path.clone(), handle);
                        record.set_seen(true);
                        if self.verbosity.contains(Verbosity::BASIC_EVENTS) {
                            log::info!("discovered new interface {}", info.path);
                        }
                    }
                    Err(err) => {
                        log::warn!("failed to open {}: {err}", info.path);
                    }
                },
            }
        }

        let retiring: Vec<_> = self
            .table
            .iter()
            .filter(|record| !record.seen())
            .collect();

        for record in retiring {
            if record.marked_for_deletion() {
                if self.verbosity.contains(Verbosity::BASIC_EVENTS) {
                    log::info!("retiring interface {}", record.path());
                }
                self.table.retire(&record, &self.new_iteration, &self.shutdown);
            } else {
                record.set_marked_for_unregistration(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    fn discovery(table: Arc<DeviceTable>, backend: MockBackend) -> Discovery {
        Discovery::new(
            table,
            Arc::new(backend),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(true)),
            Verbosity::empty(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn new_matching_interface_is_inserted() {
        let table = Arc::new(DeviceTable::new());
        let backend = MockBackend::new();
        backend.add_device("p1", QMK_USAGE_PAGE, QMK_USAGE);
        let disco = discovery(Arc::clone(&table), backend);

        disco.cycle();

        let paths: Vec<_> = table.iter().map(|r| r.path().to_string()).collect();
        assert_eq!(paths, vec!["p1".to_string()]);
    }

    #[test]
    fn non_matching_usage_is_ignored() {
        let table = Arc::new(DeviceTable::new());
        let backend = MockBackend::new();
        backend.add_device("p1", 0x0001, 0x0002);
        let disco = discovery(Arc::clone(&table), backend);

        disco.cycle();

        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn disappearing_interface_is_marked_then_retired() {
        let table = Arc::new(DeviceTable::new());
        let backend = MockBackend::new();
        backend.add_device("p1", QMK_USAGE_PAGE, QMK_USAGE);
        let disco = discovery(Arc::clone(&table), backend.clone());

        disco.cycle();
        let record = table.find_by_path("p1").unwrap();
        assert!(!record.marked_for_unregistration());

        backend.remove_device("p1");
        disco.cycle();
        assert!(record.marked_for_unregistration());

        record.set_marked_for_deletion(true);
        disco.cycle();
        assert!(table.find_by_path("p1").is_none());
    }

    #[test]
    fn open_failure_is_skipped_without_inserting() {
        let table = Arc::new(DeviceTable::new());
        let backend = MockBackend::new();
        backend.add_device("p1", QMK_USAGE_PAGE, QMK_USAGE);
        backend.fail_open("p1");
        let disco = discovery(Arc::clone(&table), backend);

        disco.cycle();

        assert_eq!(table.iter().count(), 0);
    }
}
