// Segments of the sector address space

use alloc::vec::Vec;

/// Stable handle to a segment; survives splits and merges of its neighbours.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub(crate) u32);

/// What occupies a range of sectors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Unused,
    Mbr,
    ProtectiveMbr,
    /// Legacy partition; `parent` is the LBA of the MBR/EBR sector holding its record.
    MbrPartition { parent: u64 },
    PrimaryGptHeader,
    SecondaryGptHeader,
    PrimaryGptTable,
    SecondaryGptTable,
    GptPartition,
}

impl SegmentKind {
    pub fn is_unused(&self) -> bool {
        matches!(self, SegmentKind::Unused)
    }

    pub fn is_mbr_partition(&self) -> bool {
        matches!(self, SegmentKind::MbrPartition { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SegmentKind::Unused => "Unused",
            SegmentKind::Mbr => "MBR",
            SegmentKind::ProtectiveMbr => "PMBR",
            SegmentKind::MbrPartition { .. } => "MBR part",
            SegmentKind::PrimaryGptHeader => "Pri GPT header",
            SegmentKind::SecondaryGptHeader => "Sec GPT header",
            SegmentKind::PrimaryGptTable => "Pri GPT table",
            SegmentKind::SecondaryGptTable => "Sec GPT table",
            SegmentKind::GptPartition => "GPT part",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub(crate) id: SegmentId,
    pub(crate) start: u64,
    pub(crate) length: u64,
    pub(crate) kind: SegmentKind,
    pub(crate) payload: Vec<u8>,
    pub(crate) ordinal: Option<u32>,
}

impl Segment {
    pub(crate) fn unused(id: SegmentId, start: u64, length: u64) -> Self {
        Self {
            id,
            start,
            length,
            kind: SegmentKind::Unused,
            payload: Vec::new(),
            ordinal: None,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// First sector past the segment.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Last sector of the segment (inclusive).
    pub fn last_lba(&self) -> u64 {
        self.end() - 1
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Raw sector contents backing this segment, if any were loaded.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1-based GPT entry index for partitions.
    pub fn ordinal(&self) -> Option<u32> {
        self.ordinal
    }
}
