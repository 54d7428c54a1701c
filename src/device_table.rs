// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The shared, lock-free device table: an ordered singly-linked chain
//! of [`DeviceRecord`]s that Discovery and the I/O loop both walk
//! concurrently without a mutex on the hot path.
//!
//! Field-writer partition (see the design document §4.1):
//! `next`/`path`/`marked_for_unregistration`/handle lifetime are
//! written only by Discovery; `device_id`/`seen_this_enumeration`/
//! `marked_for_deletion` are written only by the I/O loop. Every field
//! shared this way is an atomic, not because two writers race on it —
//! they never do — but because a type shared across threads via `Arc`
//! must be `Sync`, and these are the smallest primitives that make it so.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use retry::delay::Fixed;
use retry::{retry, OperationResult};

use crate::backend::HidHandle;
use crate::constants::UNASSIGNED;

/// One entry per currently-open raw HID interface.
pub struct DeviceRecord {
    path: String,
    handle: Box<dyn HidHandle>,
    device_id: AtomicU8,
    seen_this_enumeration: AtomicBool,
    marked_for_unregistration: AtomicBool,
    marked_for_deletion: AtomicBool,
    next: ArcSwapOption<DeviceRecord>,
}

impl DeviceRecord {
    fn new(path: String, handle: Box<dyn HidHandle>) -> Self {
        DeviceRecord {
            path,
            handle,
            device_id: AtomicU8::new(UNASSIGNED),
            seen_this_enumeration: AtomicBool::new(false),
            marked_for_unregistration: AtomicBool::new(false),
            marked_for_deletion: AtomicBool::new(false),
            next: ArcSwapOption::from(None),
        }
    }

    /// The stable backend path identifying this interface.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The handle this record owns, for reads and writes.
    pub fn handle(&self) -> &dyn HidHandle {
        self.handle.as_ref()
    }

    /// This record's assigned id, or [`UNASSIGNED`] if unregistered.
    pub fn device_id(&self) -> u8 {
        self.device_id.load(Ordering::Acquire)
    }

    /// Written only by the I/O loop (via the Registrar).
    pub(crate) fn set_device_id(&self, id: u8) {
        self.device_id.store(id, Ordering::Release);
    }

    pub(crate) fn seen(&self) -> bool {
        self.seen_this_enumeration.load(Ordering::Acquire)
    }

    /// Written only by Discovery.
    pub(crate) fn set_seen(&self, seen: bool) {
        self.seen_this_enumeration.store(seen, Ordering::Release);
    }

    pub fn marked_for_unregistration(&self) -> bool {
        self.marked_for_unregistration.load(Ordering::Acquire)
    }

    /// Written only by Discovery.
    pub(crate) fn set_marked_for_unregistration(&self, marked: bool) {
        self.marked_for_unregistration.store(marked, Ordering::Release);
    }

    pub fn marked_for_deletion(&self) -> bool {
        self.marked_for_deletion.load(Ordering::Acquire)
    }

    /// Written only by the I/O loop.
    pub(crate) fn set_marked_for_deletion(&self, marked: bool) {
        self.marked_for_deletion.store(marked, Ordering::Release);
    }
}

/// The ordered, lock-free chain of device records shared between the
/// Discovery thread and the I/O loop.
#[derive(Default)]
pub struct DeviceTable {
    head: ArcSwapOption<DeviceRecord>,
}

impl DeviceTable {
    /// An empty table.
    pub fn new() -> Self {
        DeviceTable {
            head: ArcSwapOption::from(None),
        }
    }

    /// A lock-free snapshot iterator: each step is an atomic load of
    /// the current node's `next` link.
    pub fn iter(&self) -> Iter {
        Iter {
            current: self.head.load_full(),
        }
    }

    pub(crate) fn find_by_path(&self, path: &str) -> Option<Arc<DeviceRecord>> {
        self.iter().find(|record| record.path() == path)
    }

    /// Discovery-only: creates and links a new record for `path`.
    pub(crate) fn insert(&self, path: String, handle: Box<dyn HidHandle>) -> Arc<DeviceRecord> {
        let node = Arc::new(DeviceRecord::new(path, handle));
        node.next.store(self.head.load_full());
        self.head.store(Some(Arc::clone(&node)));
        node
    }

    /// Discovery-only: unlinks `target`, then waits for the I/O loop to
    /// complete a fresh pass before returning, proving no stale
    /// reference into the unlinked node remains on the I/O side. See
    /// the design document's removal protocol (§4.1).
    pub(crate) fn retire(
        &self,
        target: &Arc<DeviceRecord>,
        new_iteration: &AtomicBool,
        shutdown: &AtomicBool,
    ) {
        self.unlink(target);
        new_iteration.store(false, Ordering::Release);
        let outcome = retry(Fixed::from_millis(1).take(2_000), || {
            if new_iteration.load(Ordering::Acquire) || shutdown.load(Ordering::Acquire) {
                OperationResult::Ok(())
            } else {
                OperationResult::Retry(())
            }
        });
        if outcome.is_err() {
            log::warn!(
                "timed out waiting for a fresh I/O iteration while retiring {}",
                target.path()
            );
        }
    }

    fn unlink(&self, target: &Arc<DeviceRecord>) {
        let mut prev: Option<Arc<DeviceRecord>> = None;
        let mut current = self.head.load_full();
        while let Some(node) = current {
            if Arc::ptr_eq(&node, target) {
                let successor = node.next.load_full();
                match &prev {
                    Some(p) => p.next.store(successor),
                    None => self.head.store(successor),
                }
                return;
            }
            let next = node.next.load_full();
            prev = Some(node);
            current = next;
        }
    }
}

/// Lock-free iterator over a [`DeviceTable`]'s current chain.
pub struct Iter {
    current: Option<Arc<DeviceRecord>>,
}

impl Iterator for Iter {
    type Item = Arc<DeviceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current.take()?;
        self.current = node.next.load_full();
        Some(node)
    }
}
