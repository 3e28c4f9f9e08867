//! Per-session configuration.

use crate::guid::{stalled_clock, ClockFn};

/// Entries in a freshly created table.
pub const DEFAULT_ENTRY_COUNT: u32 = 128;

/// Bytes per entry in a freshly created table.
pub const DEFAULT_ENTRY_SIZE: u32 = 128;

/// Extended boot records followed before the chain is declared malformed.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 64;

/// GPT engine configuration.
#[derive(Debug, Clone)]
pub struct GptConfig {
    /// Number of entries when creating or migrating a table.
    pub entry_count: u32,
    /// Size of one entry in bytes (multiple of 128).
    pub entry_size: u32,
    /// Default partition alignment in sectors (0 = none).
    pub alignment: u64,
    /// Limit on nested extended partition records.
    pub max_chain_depth: usize,
    /// Clock used by the GUID generator.
    pub clock: ClockFn,
    /// Seed for the GUID generator node.
    pub node_seed: u64,
}

impl Default for GptConfig {
    fn default() -> Self {
        Self {
            entry_count: DEFAULT_ENTRY_COUNT,
            entry_size: DEFAULT_ENTRY_SIZE,
            alignment: 0,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            clock: default_clock(),
            node_seed: 0x6770_746b_6974, // "gptkit"
        }
    }
}

#[cfg(feature = "std")]
fn default_clock() -> ClockFn {
    crate::guid::system_clock
}

#[cfg(not(feature = "std"))]
fn default_clock() -> ClockFn {
    stalled_clock
}

impl GptConfig {
    /// Deterministic config: stalled clock and a fixed seed.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            clock: stalled_clock,
            node_seed: seed,
            ..Default::default()
        }
    }

    /// Set the entry count used when creating tables.
    pub fn entries(mut self, count: u32) -> Self {
        self.entry_count = count;
        self
    }

    /// Set the default partition alignment.
    pub fn align(mut self, sectors: u64) -> Self {
        self.alignment = sectors;
        self
    }

    pub fn chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }
}
