// Partition information as reported to callers

use alloc::string::String;
use alloc::vec::Vec;

use crate::disk::gpt::{attributes, GptEntryExt, GptPartitionEntry};
use crate::guid::{registry, Guid};

/// One used GPT entry, decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    /// 1-based entry slot
    pub index: u32,
    pub partition_type: Guid,
    pub unique_guid: Guid,
    pub start_lba: u64,
    /// Inclusive
    pub end_lba: u64,
    pub attributes: u64,
    pub name: String,
}

impl PartitionInfo {
    pub fn from_entry(index: u32, entry: &GptPartitionEntry) -> Self {
        Self {
            index,
            partition_type: entry.type_guid(),
            unique_guid: entry.unique_guid(),
            start_lba: entry.start_lba(),
            end_lba: entry.end_lba(),
            attributes: entry.attribute_bits(),
            name: entry.label(),
        }
    }

    /// `None` for a range that ends before it starts or covers all of u64.
    pub fn size_lba(&self) -> Option<u64> {
        self.end_lba.checked_sub(self.start_lba)?.checked_add(1)
    }

    pub fn size_mb(&self, sector_size: usize) -> u64 {
        self.size_lba()
            .map_or(0, |sectors| sectors.saturating_mul(sector_size as u64) / (1024 * 1024))
    }

    pub fn type_name(&self) -> &'static str {
        registry::long_name(&self.partition_type)
    }

    /// Short alias such as `linux` or `efi`, if the type is known.
    pub fn symbolic_type(&self) -> Option<&'static str> {
        registry::symbolic_name(&self.partition_type)
    }

    pub fn attribute_names(&self) -> Vec<&'static str> {
        attributes::names(self.attributes).collect()
    }

    pub fn is_bootable(&self) -> bool {
        self.attributes & attributes::LEGACY_BIOS_BOOTABLE != 0
    }
}
