// Partition listing and free space lookup

use alloc::vec::Vec;

use gpt_disk_io::BlockIo;

use super::utils::with_table;
use super::{DiskSession, FreeRegion};
use crate::disk::error::GptError;
use crate::disk::gpt::GptEntryExt;
use crate::disk::partition::PartitionInfo;
use crate::disk::segment::SegmentKind;
use crate::guid::Guid;

impl<B: BlockIo> DiskSession<B> {
    /// Used entries of the primary table, or of the secondary when the
    /// primary is gone, in slot order. Entries whose range is reversed or
    /// runs past the disk are left out.
    pub fn partitions(&self) -> Result<Vec<PartitionInfo>, GptError> {
        let (header, table_kind) = match self.primary_header() {
            Some(h) => (h, SegmentKind::PrimaryGptTable),
            None => (
                self.secondary_header().ok_or(GptError::MissingHeader)?,
                SegmentKind::SecondaryGptTable,
            ),
        };
        let total = self.total_sectors;
        with_table(&self.map, &header, table_kind, |t| {
            t.iter_used()
                .filter(|(_, entry)| entry.size_lba().is_some() && entry.end_lba() < total)
                .map(|(slot, entry)| PartitionInfo::from_entry(slot + 1, &entry))
                .collect()
        })
    }

    /// First partition of the given type.
    pub fn find_partition_by_type(
        &self,
        type_guid: &Guid,
    ) -> Result<Option<PartitionInfo>, GptError> {
        Ok(self
            .partitions()?
            .into_iter()
            .find(|p| p.partition_type == *type_guid))
    }

    /// Partition covering `lba`, if any.
    pub fn partition_at(&self, lba: u64) -> Result<Option<PartitionInfo>, GptError> {
        let ordinal = self
            .map
            .segment_at(lba)
            .filter(|s| s.kind() == SegmentKind::GptPartition)
            .and_then(|s| s.ordinal());
        match ordinal {
            Some(ordinal) => Ok(self.partitions()?.into_iter().find(|p| p.index == ordinal)),
            None => Ok(None),
        }
    }

    /// Unused space between the first and last usable LBA.
    pub fn free_regions(&self) -> Result<Vec<FreeRegion>, GptError> {
        let header = self.header().ok_or(GptError::MissingHeader)?;
        let first = header.first_usable_lba.to_u64();
        let last = header.last_usable_lba.to_u64();

        Ok(self
            .map
            .iter()
            .filter(|s| s.kind().is_unused())
            .filter_map(|s| {
                let start = s.start().max(first);
                let end = s.last_lba().min(last);
                (start <= end).then_some(FreeRegion {
                    start_lba: start,
                    end_lba: end,
                })
            })
            .collect())
    }

    /// Total free sectors in the usable range.
    pub fn free_sectors(&self) -> Result<u64, GptError> {
        Ok(self.free_regions()?.iter().map(FreeRegion::size_lba).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::MemDisk;
    use super::super::{CreateOptions, NewPartition};
    use super::*;
    use crate::disk::config::GptConfig;
    use crate::guid::registry;

    #[test]
    fn test_free_regions_around_partitions() {
        let mut session =
            DiskSession::open(MemDisk::new(200), GptConfig::deterministic(2)).unwrap();
        assert_eq!(session.free_regions(), Err(GptError::MissingHeader));
        session.create(CreateOptions::default()).unwrap();
        assert_eq!(
            session.free_regions().unwrap(),
            [FreeRegion {
                start_lba: 34,
                end_lba: 166
            }]
        );

        session
            .add_partition(&NewPartition::new(registry::LINUX_DATA).at(50).size(10))
            .unwrap();
        let regions = session.free_regions().unwrap();
        assert_eq!(
            regions,
            [
                FreeRegion {
                    start_lba: 34,
                    end_lba: 49
                },
                FreeRegion {
                    start_lba: 60,
                    end_lba: 166
                },
            ]
        );
        assert_eq!(session.free_sectors().unwrap(), 16 + 107);
    }

    #[test]
    fn test_lookup() {
        let mut session =
            DiskSession::open(MemDisk::new(200), GptConfig::deterministic(2)).unwrap();
        session.create(CreateOptions::default()).unwrap();
        session
            .add_partition(&NewPartition::new(registry::EFI_SYSTEM).size(10))
            .unwrap();
        let swap = session
            .add_partition(&NewPartition::new(registry::LINUX_SWAP).size(10))
            .unwrap();

        let found = session.find_partition_by_type(&registry::LINUX_SWAP).unwrap().unwrap();
        assert_eq!(found.index, swap);
        assert_eq!(session.partition_at(45).unwrap().map(|p| p.index), Some(swap));
        assert!(session.partition_at(100).unwrap().is_none());
        assert_eq!(session.partitions().unwrap().len(), 2);
    }
}
