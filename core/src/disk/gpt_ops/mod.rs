//! GPT/MBR consistency engine
//!
//! A [`DiskSession`] owns a block device together with the [`SegmentMap`]
//! built from it. The map is the single source of truth: every operation
//! validates against a working copy, commits it, and only then serializes
//! the affected structures. Nothing is repaired behind the caller's back;
//! a damaged copy stays damaged until [`DiskSession::recover`] is called.

mod backup;
mod create_modify;
mod find;
mod migrate;
mod recover;
mod resize_disk;
mod scan;
mod types;
mod utils;
mod write;

pub use backup::{BackupEntry, DiskBackup};
pub use create_modify::{CreateOptions, NewPartition};
pub use types::{FreeRegion, GptState};
pub use utils::{align_lba, mb_to_lba, table_sectors_for};

use alloc::vec;
use alloc::vec::Vec;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use self::utils::{header_of, io_error};
use crate::disk::config::GptConfig;
use crate::disk::error::GptError;
use crate::disk::gpt::GptHeader;
use crate::disk::map::SegmentMap;
use crate::disk::segment::SegmentKind;
use crate::guid::GuidGenerator;

/// An open disk: device, configuration and the parsed sector map
pub struct DiskSession<B: BlockIo> {
    io: B,
    config: GptConfig,
    sector_size: usize,
    total_sectors: u64,
    map: SegmentMap,
    state: GptState,
    generator: GuidGenerator,
}

impl<B: BlockIo> DiskSession<B> {
    /// Take ownership of `io` and scan it.
    pub fn open(io: B, config: GptConfig) -> Result<Self, GptError> {
        let mut session = Self::new_unparsed(io, config)?;
        session.parse_disk()?;
        Ok(session)
    }

    /// Take ownership of `io` without reading anything yet.
    pub fn new_unparsed(mut io: B, config: GptConfig) -> Result<Self, GptError> {
        let sector_size = io.block_size().to_u32() as usize;
        let total_sectors = io.num_blocks().map_err(io_error)?;
        let generator = GuidGenerator::new(config.clock, config.node_seed);
        log::debug!(
            "opened device: {} sectors of {} bytes",
            total_sectors,
            sector_size
        );
        Ok(Self {
            io,
            config,
            sector_size,
            total_sectors,
            map: SegmentMap::new(total_sectors),
            state: GptState::Unparsed,
            generator,
        })
    }

    /// Flush and hand the device back.
    pub fn close(mut self) -> Result<B, GptError> {
        self.io.flush().map_err(io_error)?;
        Ok(self.io)
    }

    pub fn state(&self) -> GptState {
        self.state
    }

    pub fn map(&self) -> &SegmentMap {
        &self.map
    }

    pub fn config(&self) -> &GptConfig {
        &self.config
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Size of the address space the session works on. Differs from the
    /// device size after [`DiskSession::resize_disk`] to a smaller size.
    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    pub fn primary_header(&self) -> Option<GptHeader> {
        header_of(&self.map, SegmentKind::PrimaryGptHeader).ok()
    }

    pub fn secondary_header(&self) -> Option<GptHeader> {
        header_of(&self.map, SegmentKind::SecondaryGptHeader).ok()
    }

    /// Primary header if present, else the secondary.
    pub fn header(&self) -> Option<GptHeader> {
        self.primary_header().or_else(|| self.secondary_header())
    }

    /// Mutable access to the device, for callers that manage other
    /// structures on the same disk.
    pub fn device_mut(&mut self) -> &mut B {
        &mut self.io
    }

    fn read_sectors(&mut self, lba: u64, count: u64) -> Result<Vec<u8>, GptError> {
        let mut buf = vec![0u8; count as usize * self.sector_size];
        self.io.read_blocks(Lba(lba), &mut buf).map_err(io_error)?;
        Ok(buf)
    }

    fn write_sectors(&mut self, lba: u64, data: &[u8]) -> Result<(), GptError> {
        log::trace!("write {} bytes at LBA {}", data.len(), lba);
        self.io.write_blocks(Lba(lba), data).map_err(io_error)
    }

    fn flush(&mut self) -> Result<(), GptError> {
        self.io.flush().map_err(io_error)
    }

    /// Mutations of the entry array need both copies in place.
    fn require_valid(&self) -> Result<(), GptError> {
        match self.state {
            GptState::Valid => Ok(()),
            GptState::Headerless => Err(GptError::MissingHeader),
            _ => Err(GptError::InvalidState),
        }
    }

    /// Sectors of the configured entry array.
    fn configured_table_sectors(&self) -> u64 {
        table_sectors_for(
            self.config.entry_count,
            self.config.entry_size,
            self.sector_size,
        )
    }
}
