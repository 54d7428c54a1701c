// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Verbosity bitmask controlling which categories of log line the relay
//! emits. Mirrors the `-v<N>` CLI contract: N is the bitwise OR of the
//! flags below.

bitflags::bitflags! {
    /// Bits accepted by the `-v<N>` CLI flag.
    #[derive(Default)]
    pub struct Verbosity: u8 {
        /// Registration, unregistration, and device-appeared/-gone events.
        const BASIC_EVENTS         = 0b0000_0001;
        /// Periodic counters (frames routed, discarded, membership size).
        const PERIODIC_STATS       = 0b0000_0010;
        /// Frames addressed to or from the hub itself (registration,
        /// status, shutdown).
        const HUB_FRAMES           = 0b0000_0100;
        /// Device-to-device message frames.
        const INTER_DEVICE_FRAMES  = 0b0000_1000;
        /// Frames silently discarded by the classifier.
        const DISCARDED_FRAMES     = 0b0001_0000;
    }
}

impl Verbosity {
    /// Parses the numeric argument of `-v<N>`, truncating unknown bits.
    pub fn from_arg(raw: u8) -> Verbosity {
        Verbosity::from_bits_truncate(raw)
    }
}
