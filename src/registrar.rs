// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device id allocation and membership bookkeeping. Touched
//! exclusively by the I/O loop — never shared with Discovery — so it
//! needs no synchronization of its own.

use crate::constants::{padded_frame, Frame, COMMAND_ID, HUB, MAX_REGISTERED, UNASSIGNED};
use crate::device_table::DeviceRecord;
use crate::queue::OutgoingQueues;

/// Result of a [`Registrar::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The device was not previously registered and now holds `id`.
    Newly(u8),
    /// The device already held an id; nothing changed.
    AlreadyRegistered,
    /// The table already holds [`MAX_REGISTERED`] ids; the device was
    /// not registered.
    Full,
}

/// Id allocation and membership state, owned solely by the I/O loop.
pub struct Registrar {
    assigned_ids: Vec<u8>,
    id_in_use: [bool; 255],
    next_candidate_id: u8,
}

impl Default for Registrar {
    fn default() -> Self {
        Registrar {
            assigned_ids: Vec::with_capacity(MAX_REGISTERED),
            id_in_use: [false; 255],
            next_candidate_id: 1,
        }
    }
}

impl Registrar {
    /// A fresh registrar with no members.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently assigned, in insertion/swap-remove order (not
    /// semantically significant, but deterministic).
    pub fn assigned_ids(&self) -> &[u8] {
        &self.assigned_ids
    }

    /// Whether `id` currently identifies a registered member.
    pub fn is_assigned(&self, id: u8) -> bool {
        id != HUB && self.id_in_use[id as usize]
    }

    /// Assigns `record` the smallest unused id starting from the
    /// round-robin cursor, or reports why it could not.
    pub fn register(&mut self, record: &DeviceRecord) -> RegisterOutcome {
        if record.device_id() != UNASSIGNED {
            return RegisterOutcome::AlreadyRegistered;
        }
        if self.assigned_ids.len() >= MAX_REGISTERED {
            return RegisterOutcome::Full;
        }

        let mut candidate = self.next_candidate_id;
        loop {
            if candidate != HUB && !self.id_in_use[candidate as usize] {
                break;
            }
            candidate = (candidate + 1) % HUB;
        }

        self.id_in_use[candidate as usize] = true;
        self.assigned_ids.push(candidate);
        record.set_device_id(candidate);
        self.next_candidate_id = (candidate + 1) % HUB;

        RegisterOutcome::Newly(candidate)
    }

    /// Releases `record`'s id, if it has one, and drops its queued
    /// outgoing frames.
    pub fn unregister(&mut self, record: &DeviceRecord, queues: &mut OutgoingQueues) {
        let id = record.device_id();
        if id == UNASSIGNED {
            return;
        }

        self.id_in_use[id as usize] = false;
        if let Some(pos) = self.assigned_ids.iter().position(|&x| x == id) {
            self.assigned_ids.swap_remove(pos);
        }
        record.set_device_id(UNASSIGNED);
        queues.clear(id);
    }

    /// Builds the 32-byte status frame for `recipient_id`: byte 2 is
    /// always the recipient's own id, the remaining member ids follow
    /// in bytes 3.., padded with [`UNASSIGNED`].
    pub fn build_status_payload(&self, recipient_id: u8) -> Frame {
        let mut frame = padded_frame();
        frame[0] = COMMAND_ID;
        frame[1] = HUB;

        for (offset, &id) in self.assigned_ids.iter().enumerate() {
            let index = 2 + offset;
            if index >= frame.len() {
                break;
            }
            frame[index] = id;
        }

        let block_end = (2 + self.assigned_ids.len()).min(frame.len());
        if let Some(swap_index) = (3..block_end).find(|&i| frame[i] == recipient_id) {
            frame.swap(2, swap_index);
        }

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::HidBackend;
    use assert_matches::assert_matches;

    #[test]
    fn first_registration_gets_id_one() {
        let backend = MockBackend::new();
        let table = crate::device_table::DeviceTable::new();
        backend.add_device("p1", 0xFF60, 0x61);
        let a = table.insert("p1".into(), backend.open_path("p1").unwrap());

        let mut registrar = Registrar::new();
        assert_matches!(registrar.register(&a), RegisterOutcome::Newly(1));
        assert_eq!(registrar.assigned_ids(), &[1]);
        assert!(registrar.is_assigned(1));
    }

    #[test]
    fn repeated_registration_is_idempotent() {
        let backend = MockBackend::new();
        let table = crate::device_table::DeviceTable::new();
        backend.add_device("p1", 0xFF60, 0x61);
        let a = table.insert("p1".into(), backend.open_path("p1").unwrap());

        let mut registrar = Registrar::new();
        registrar.register(&a);
        let before = registrar.assigned_ids().to_vec();
        assert_matches!(registrar.register(&a), RegisterOutcome::AlreadyRegistered);
        assert_eq!(registrar.assigned_ids(), before.as_slice());
    }

    #[test]
    fn thirty_first_registration_is_full() {
        let backend = MockBackend::new();
        let table = crate::device_table::DeviceTable::new();
        let mut registrar = Registrar::new();
        for i in 0..MAX_REGISTERED {
            let path = format!("p{i}");
            backend.add_device(&path, 0xFF60, 0x61);
            let record = table.insert(path, backend.open_path(&format!("p{i}")).unwrap());
            assert_matches!(registrar.register(&record), RegisterOutcome::Newly(_));
        }

        backend.add_device("p-overflow", 0xFF60, 0x61);
        let overflow = table.insert(
            "p-overflow".into(),
            backend.open_path("p-overflow").unwrap(),
        );
        assert_matches!(registrar.register(&overflow), RegisterOutcome::Full);
        assert_eq!(overflow.device_id(), UNASSIGNED);
    }

    #[test]
    fn status_payload_places_recipient_at_byte_two() {
        let backend = MockBackend::new();
        let table = crate::device_table::DeviceTable::new();
        backend.add_device("p1", 0xFF60, 0x61);
        backend.add_device("p2", 0xFF60, 0x61);
        let a = table.insert("p1".into(), backend.open_path("p1").unwrap());
        let b = table.insert("p2".into(), backend.open_path("p2").unwrap());

        let mut registrar = Registrar::new();
        registrar.register(&a); // id 1
        registrar.register(&b); // id 2

        let to_a = registrar.build_status_payload(1);
        assert_eq!(&to_a[0..4], &[COMMAND_ID, HUB, 1, 2]);
        assert!(to_a[4..].iter().all(|&b| b == UNASSIGNED));

        let to_b = registrar.build_status_payload(2);
        assert_eq!(&to_b[0..4], &[COMMAND_ID, HUB, 2, 1]);
    }

    #[test]
    fn unregister_clears_id_and_queue() {
        let backend = MockBackend::new();
        let table = crate::device_table::DeviceTable::new();
        backend.add_device("p1", 0xFF60, 0x61);
        let a = table.insert("p1".into(), backend.open_path("p1").unwrap());

        let mut registrar = Registrar::new();
        registrar.register(&a);
        let mut queues = OutgoingQueues::new();
        queues.push(1, padded_frame());

        registrar.unregister(&a, &mut queues);
        assert_eq!(a.device_id(), UNASSIGNED);
        assert!(!registrar.is_assigned(1));
        assert!(queues.pop(1).is_none());
    }
}
