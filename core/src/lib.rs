//! gptkit Core Library
//!
//! Partition-table editing core: sector-space allocator, GPT/MBR
//! consistency engine, GUID and CRC32 primitives.
//! Designed to be no_std compatible (requires `alloc`).

#![no_std]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_div_ceil)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod crc32;
pub mod disk;
pub mod guid;
pub mod logger;

pub use disk::{
    CreateOptions, DiskBackup, DiskSession, GptConfig, GptError, GptState, MapError, NewPartition,
    PartitionInfo, SegmentKind, SegmentMap,
};
pub use guid::{Guid, GuidGenerator, GuidParseError};
