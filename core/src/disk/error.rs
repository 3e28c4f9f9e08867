//! Error types for the segment map and the GPT engine
//!
//! Follows the same pattern as `IsoError`: plain enums with a
//! human-readable `as_str()`.

use core::fmt;

use crate::guid::GuidParseError;

/// Segment map failures. The map is unchanged whenever one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Range collides with a segment that is in use
    Overlap,
    /// No unused segment satisfies the request
    NoSpace,
    /// Following segment is missing, in use or too small
    CannotGrow,
    /// Requested length rounds down to nothing, or the tail is in use
    CannotShrink,
    /// Zero length or past the end of the address space
    OutOfRange,
    /// No segment with that id
    NotFound,
}

impl MapError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Overlap => "Region overlaps an existing segment",
            Self::NoSpace => "No free space satisfies the request",
            Self::CannotGrow => "Segment cannot grow into the following space",
            Self::CannotShrink => "Segment cannot shrink to the requested size",
            Self::OutOfRange => "Region lies outside the disk",
            Self::NotFound => "Segment not found",
        }
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPT/MBR consistency engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptError {
    /// Structure lacks its signature
    BadSignature,
    /// Stored CRC32 does not match the data
    BadChecksum,
    /// Disk cannot hold the requested structures
    MediaTooSmall,
    /// Backup header does not sit on the last sector; resize the disk first
    MediaSizeChanged,
    /// Partitions leave no room for the secondary table
    NotEnoughSpace,
    MissingHeader,
    MissingTable,
    /// Extended partition chain loops or nests too deep
    MalformedChain,
    /// Operation not allowed in the current session state
    InvalidState,
    /// Disk carries a legacy (non-protective) MBR
    LegacyMbrPresent,
    /// Disk already carries a GPT
    GptPresent,
    /// Migration needs a legacy MBR
    NoLegacyMbr,
    PartitionNotFound,
    /// Every partition entry slot is taken
    NoFreeEntry,
    /// MBR partition type with no GPT equivalent
    UnknownLegacyType(u8),
    /// Backup script could not be parsed or does not fit
    InvalidBackup,
    /// Block device read or write failed
    IoError,
    Map(MapError),
    Guid(GuidParseError),
}

impl GptError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadSignature => "Bad signature",
            Self::BadChecksum => "Bad checksum",
            Self::MediaTooSmall => "Media too small",
            Self::MediaSizeChanged => "Media size has changed, resize the disk first",
            Self::NotEnoughSpace => "Not enough space for the secondary GPT table",
            Self::MissingHeader => "GPT header missing",
            Self::MissingTable => "GPT table missing",
            Self::MalformedChain => "Malformed extended partition chain",
            Self::InvalidState => "Operation not valid in the current state",
            Self::LegacyMbrPresent => "Device contains a legacy MBR",
            Self::GptPresent => "Device contains a GPT",
            Self::NoLegacyMbr => "Device has no legacy MBR",
            Self::PartitionNotFound => "Partition not found",
            Self::NoFreeEntry => "No free partition entry",
            Self::UnknownLegacyType(_) => "Unknown legacy partition type",
            Self::InvalidBackup => "Invalid backup",
            Self::IoError => "Block I/O operation failed",
            Self::Map(e) => e.as_str(),
            Self::Guid(e) => e.as_str(),
        }
    }
}

impl fmt::Display for GptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLegacyType(code) => write!(f, "{} 0x{:02x}", self.as_str(), code),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl From<MapError> for GptError {
    fn from(e: MapError) -> Self {
        Self::Map(e)
    }
}

impl From<GuidParseError> for GptError {
    fn from(e: GuidParseError) -> Self {
        Self::Guid(e)
    }
}
