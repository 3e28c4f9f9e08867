// Disk partitioning: segment map, on-disk codecs and the GPT engine

pub mod config;
pub mod error;
pub mod gpt;
pub mod gpt_ops;
pub mod legacy;
pub mod map;
pub mod mbr;
pub mod partition;
pub mod segment;

pub use config::GptConfig;
pub use error::{GptError, MapError};
pub use gpt_ops::{
    BackupEntry, CreateOptions, DiskBackup, DiskSession, FreeRegion, GptState, NewPartition,
};
pub use map::SegmentMap;
pub use partition::PartitionInfo;
pub use segment::{Segment, SegmentId, SegmentKind};
