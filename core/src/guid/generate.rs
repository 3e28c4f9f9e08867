//! Time-based GUID generation
//!
//! Produces version 1 style identifiers from a clock, a pseudo-random node
//! and a clock sequence. This is best effort only: the node is derived from a
//! caller-supplied seed, not a hardware address or a CSPRNG, so two hosts
//! seeded alike can collide. GPT does not need cryptographic uniqueness.

use super::Guid;

/// 100 ns ticks between 1582-10-15 (Gregorian reform) and the Unix epoch.
const GREGORIAN_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

/// Clock returning 100 ns ticks since the Unix epoch.
pub type ClockFn = fn() -> u64;

/// Clock for targets without a time source. Uniqueness then rests on the
/// per-generator tick counter alone.
pub fn stalled_clock() -> u64 {
    0
}

#[cfg(feature = "std")]
pub fn system_clock() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_nanos() / 100) as u64)
        .unwrap_or(0)
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct GuidGenerator {
    clock: ClockFn,
    node: [u8; 6],
    clock_seq: u16,
    last_timestamp: u64,
}

impl GuidGenerator {
    /// `seed` stands in for the host identity; mix in anything host specific.
    pub fn new(clock: ClockFn, seed: u64) -> Self {
        let mut state = seed ^ clock();
        let node_bits = splitmix64(&mut state).to_le_bytes();
        let mut node = [0u8; 6];
        node.copy_from_slice(&node_bits[..6]);
        // Multicast bit marks a node that is not an IEEE 802 address
        node[0] |= 0x01;

        Self {
            clock,
            node,
            clock_seq: (splitmix64(&mut state) & 0x3FFF) as u16,
            last_timestamp: 0,
        }
    }

    pub fn generate(&mut self) -> Guid {
        let now = (self.clock)().wrapping_add(GREGORIAN_OFFSET) & 0x0FFF_FFFF_FFFF_FFFF;

        if now < self.last_timestamp {
            // Clock stepped back
            self.clock_seq = (self.clock_seq + 1) & 0x3FFF;
        }
        let timestamp = if now <= self.last_timestamp {
            self.last_timestamp + 1
        } else {
            now
        };
        self.last_timestamp = timestamp;

        let mut tail = [0u8; 8];
        tail[0] = ((self.clock_seq >> 8) as u8 & 0x3F) | 0x80;
        tail[1] = self.clock_seq as u8;
        tail[2..].copy_from_slice(&self.node);

        Guid::from_fields(
            timestamp as u32,
            (timestamp >> 32) as u16,
            ((timestamp >> 48) as u16 & 0x0FFF) | 0x1000,
            tail,
        )
    }
}
