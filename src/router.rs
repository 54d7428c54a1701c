// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frame classification and routing: turns one inbound frame plus the
//! record it arrived on into Registrar/queue effects.

use crate::constants::{Frame, COMMAND_ID, HUB, REGISTER_MARKER, UNASSIGNED, UNREGISTER_MARKER};
use crate::device_table::DeviceRecord;
use crate::queue::OutgoingQueues;
use crate::registrar::{RegisterOutcome, Registrar};
use crate::verbosity::Verbosity;

/// The action a frame's header selects, independent of what the
/// registrar/queues end up doing about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyAction {
    /// Byte 0 was not [`COMMAND_ID`].
    Discard,
    /// A device→hub registration frame.
    Register,
    /// A device→hub unregistration frame.
    Unregister,
    /// A device→device message addressed to `destination`.
    Message { destination: u8 },
    /// A well-formed hub-addressed frame with an unrecognized marker.
    Ignored,
}

/// Classifies `frame` by its header bytes alone (§4.3's decision table).
pub fn classify(frame: &Frame) -> ClassifyAction {
    if frame[0] != COMMAND_ID {
        return ClassifyAction::Discard;
    }
    if frame[1] == HUB {
        match frame[2] {
            REGISTER_MARKER => ClassifyAction::Register,
            UNREGISTER_MARKER => ClassifyAction::Unregister,
            _ => ClassifyAction::Ignored,
        }
    } else {
        ClassifyAction::Message {
            destination: frame[1],
        }
    }
}

/// Applies `frame`, received from `source`, to the registrar and
/// outgoing queues. Returns whether a device-to-device message was
/// successfully routed, which drives the adaptive-sleep clock.
pub fn route_frame(
    frame: &Frame,
    source: &DeviceRecord,
    registrar: &mut Registrar,
    queues: &mut OutgoingQueues,
    membership_changed: &mut bool,
    verbosity: Verbosity,
) -> bool {
    match classify(frame) {
        ClassifyAction::Discard => {
            if verbosity.contains(Verbosity::DISCARDED_FRAMES) {
                log::debug!("discarding frame with bad command id from {}", source.path());
            }
            false
        }
        ClassifyAction::Register => {
            if verbosity.contains(Verbosity::HUB_FRAMES) {
                log::trace!("registration frame from {}", source.path());
            }
            match registrar.register(source) {
                RegisterOutcome::Newly(id) => {
                    *membership_changed = true;
                    if verbosity.contains(Verbosity::BASIC_EVENTS) {
                        log::info!("{} registered as device {id}", source.path());
                    }
                }
                RegisterOutcome::AlreadyRegistered => {
                    let status = registrar.build_status_payload(source.device_id());
                    queues.push(source.device_id(), status);
                }
                RegisterOutcome::Full => {
                    if verbosity.contains(Verbosity::DISCARDED_FRAMES) {
                        log::debug!("registration from {} dropped: registrar full", source.path());
                    }
                }
            }
            false
        }
        ClassifyAction::Unregister => {
            if verbosity.contains(Verbosity::HUB_FRAMES) {
                log::trace!("unregistration frame from {}", source.path());
            }
            if source.device_id() != UNASSIGNED {
                if verbosity.contains(Verbosity::BASIC_EVENTS) {
                    log::info!("{} unregistered (was {})", source.path(), source.device_id());
                }
                registrar.unregister(source, queues);
                *membership_changed = true;
            }
            false
        }
        ClassifyAction::Message { destination } => {
            if source.device_id() == UNASSIGNED || !registrar.is_assigned(destination) {
                if verbosity.contains(Verbosity::DISCARDED_FRAMES) {
                    log::debug!(
                        "discarding message from {} to unknown destination {destination}",
                        source.path()
                    );
                }
                return false;
            }
            let mut rewritten = *frame;
            rewritten[1] = source.device_id();
            queues.push(destination, rewritten);
            if verbosity.contains(Verbosity::INTER_DEVICE_FRAMES) {
                log::trace!(
                    "routed message {} -> {destination}",
                    source.device_id()
                );
            }
            true
        }
        ClassifyAction::Ignored => {
            if verbosity.contains(Verbosity::DISCARDED_FRAMES) {
                log::debug!("ignoring unrecognized hub-addressed frame from {}", source.path());
            }
            false
        }
    }
}
