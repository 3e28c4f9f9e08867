// Common types for GPT operations

/// Session state after the last scan or mutation.
///
/// A side (primary or secondary) counts as present only when both its
/// header and its table passed their checksums.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GptState {
    Unparsed,
    /// MBR scanned, GPT not yet checked
    Scanned,
    /// Both copies valid
    Valid,
    PrimaryOnly,
    SecondaryOnly,
    /// No valid GPT copy
    Headerless,
}

impl GptState {
    pub fn has_gpt(&self) -> bool {
        matches!(self, Self::Valid | Self::PrimaryOnly | Self::SecondaryOnly)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unparsed => "unparsed",
            Self::Scanned => "scanned",
            Self::Valid => "valid",
            Self::PrimaryOnly => "primary only",
            Self::SecondaryOnly => "secondary only",
            Self::Headerless => "no GPT",
        }
    }
}

/// Represents a free space region inside the usable LBA range
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FreeRegion {
    pub start_lba: u64,
    /// Inclusive
    pub end_lba: u64,
}

impl FreeRegion {
    pub fn size_lba(&self) -> u64 {
        self.end_lba - self.start_lba + 1
    }

    pub fn size_bytes(&self, sector_size: usize) -> u64 {
        self.size_lba() * sector_size as u64
    }
}
