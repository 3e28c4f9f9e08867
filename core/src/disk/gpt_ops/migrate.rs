// MBR to GPT conversion

use alloc::vec;
use alloc::vec::Vec;

use gpt_disk_io::BlockIo;

use super::utils::{previous_mbr, protective_sector, segment_of};
use super::{DiskSession, GptState};
use crate::disk::error::GptError;
use crate::disk::gpt::{attributes, new_entry, new_primary_header, write_header, EntryTableMut};
use crate::disk::legacy;
use crate::disk::map::SegmentMap;
use crate::disk::mbr::{read_record, MbrPartitionRecord};
use crate::disk::segment::{SegmentId, SegmentKind};
use crate::guid::Guid;

/// Legacy partition collected from the map before conversion
struct LegacyPartition {
    id: SegmentId,
    start: u64,
    length: u64,
    record: MbrPartitionRecord,
}

impl<B: BlockIo> DiskSession<B> {
    /// Convert a legacy MBR disk to GPT in place.
    ///
    /// Each MBR partition keeps its sectors. BSD slices carrying a
    /// disklabel are split into their sub-partitions, each converted by
    /// `convert(fstype)`; a `None` result drops that sub-partition. Other
    /// records convert through [`legacy::mbr_type_guid`]. The entry array
    /// shrinks to whatever fits in the free space at both ends of the
    /// disk. Sector 0 is replaced by a protective MBR keeping the boot
    /// code, after both GPT copies are on disk.
    pub fn migrate<F>(&mut self, mut convert: F) -> Result<(), GptError>
    where
        F: FnMut(u8) -> Option<Guid>,
    {
        if self.state.has_gpt() {
            return Err(GptError::GptPresent);
        }
        let mbr_id = self
            .map
            .segment_at(0)
            .filter(|s| s.kind() == SegmentKind::Mbr)
            .map(|s| s.id())
            .ok_or(GptError::NoLegacyMbr)?;

        let total = self.total_sectors;
        let last = total - 1;
        let table_sectors = self.migration_table_sectors()?;
        let entry_size = self.config.entry_size;
        let entry_count = (table_sectors as usize * self.sector_size / entry_size as usize)
            .min(self.config.entry_count as usize) as u32;
        log::debug!(
            "migrating with {} entries in {} sectors",
            entry_count,
            table_sectors
        );

        let legacy_parts: Vec<LegacyPartition> = self
            .map
            .iter()
            .filter(|s| s.kind().is_mbr_partition())
            .filter_map(|s| {
                Some(LegacyPartition {
                    id: s.id(),
                    start: s.start(),
                    length: s.length(),
                    record: read_record(s.payload())?,
                })
            })
            .collect();

        let mut map = self.map.clone();
        // Extended boot records are not carried over
        let ebrs: Vec<SegmentId> = map
            .iter()
            .filter(|s| s.kind() == SegmentKind::Mbr && s.start() != 0)
            .map(|s| s.id())
            .collect();
        for id in ebrs {
            map.free(id)?;
        }

        let previous = previous_mbr(&map);
        map.free(mbr_id)?;
        let pmbr = protective_sector(total, previous.as_ref(), self.sector_size);
        map.add_region(0, 1, SegmentKind::ProtectiveMbr, pmbr.clone(), None)?;

        let disk_guid = self.generator.generate();
        let header = new_primary_header(total, table_sectors, disk_guid, entry_count, entry_size);
        let mut sector = vec![0u8; self.sector_size];
        write_header(&header, &mut sector);
        let table_bytes = table_sectors as usize * self.sector_size;
        map.add_region(1, 1, SegmentKind::PrimaryGptHeader, sector, None)?;
        map.add_region(
            2,
            table_sectors,
            SegmentKind::PrimaryGptTable,
            vec![0u8; table_bytes],
            None,
        )?;
        map.add_region(
            last - table_sectors,
            table_sectors,
            SegmentKind::SecondaryGptTable,
            vec![0u8; table_bytes],
            None,
        )?;
        let secondary = vec![0u8; self.sector_size];
        map.add_region(last, 1, SegmentKind::SecondaryGptHeader, secondary, None)?;

        let mut table = vec![0u8; table_bytes];
        let mut entries =
            EntryTableMut::new(&mut table, entry_size, entry_count).ok_or(GptError::MissingTable)?;
        let mut slot = 0u32;
        for part in &legacy_parts {
            if legacy::is_bsd_slice(part.record.os_indicator) {
                let label = self.read_sectors(part.start + legacy::DISKLABEL_SECTOR, 1)?;
                if let Some(subparts) = legacy::parse_disklabel(&label) {
                    map.free(part.id)?;
                    for sub in subparts {
                        if sub.fstype == legacy::fstype::UNUSED || sub.size == 0 {
                            continue;
                        }
                        let Some(type_guid) = convert(sub.fstype) else {
                            log::info!("skipping disklabel partition of fstype {}", sub.fstype);
                            continue;
                        };
                        self.migrate_one(
                            &mut map,
                            &mut entries,
                            &mut slot,
                            sub.offset as u64,
                            sub.size as u64,
                            type_guid,
                            0,
                        )?;
                    }
                    continue;
                }
                log::warn!(
                    "no disklabel in slice at LBA {}, converting the whole slice",
                    part.start
                );
            }

            let os_type = part.record.os_indicator;
            let type_guid =
                legacy::mbr_type_guid(os_type).ok_or(GptError::UnknownLegacyType(os_type))?;
            let attrs = if part.record.boot_indicator == 0x80 {
                attributes::LEGACY_BIOS_BOOTABLE
            } else {
                0
            };
            self.migrate_one(
                &mut map,
                &mut entries,
                &mut slot,
                part.start,
                part.length,
                type_guid,
                attrs,
            )?;
        }

        let table_id =
            segment_of(&map, SegmentKind::PrimaryGptTable).ok_or(GptError::MissingTable)?;
        map.set_payload(table_id, table)?;

        self.map = map;
        self.write_header_pair()?;
        self.write_sectors(0, &pmbr)?;
        self.flush()?;
        self.state = GptState::Valid;
        log::info!("migrated {} partitions to GPT", slot);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn migrate_one(
        &mut self,
        map: &mut SegmentMap,
        entries: &mut EntryTableMut<'_>,
        slot: &mut u32,
        start: u64,
        length: u64,
        type_guid: Guid,
        attributes: u64,
    ) -> Result<(), GptError> {
        if *slot >= entries.as_table().count() {
            return Err(GptError::NoFreeEntry);
        }
        map.add_region(start, length, SegmentKind::GptPartition, Vec::new(), Some(*slot + 1))?;
        let unique_guid = self.generator.generate();
        let entry = new_entry(type_guid, unique_guid, start, start + length - 1, attributes, "");
        entries.set(*slot, &entry)?;
        *slot += 1;
        Ok(())
    }

    /// Entry array size for migration: the configured size, shrunk to the
    /// free space after LBA 1 and before the last sector.
    fn migration_table_sectors(&self) -> Result<u64, GptError> {
        let last = self.total_sectors.saturating_sub(1);
        if last < 3 {
            return Err(GptError::MediaTooSmall);
        }
        let front = self
            .map
            .segment_at(1)
            .filter(|s| s.kind().is_unused())
            .map_or(0, |s| s.end().saturating_sub(2));
        let back = self
            .map
            .segment_at(last)
            .filter(|s| s.kind().is_unused())
            .map_or(0, |s| last - s.start().max(2));

        let wanted = self.configured_table_sectors();
        let fits = wanted.min(front).min(back);
        if fits < 1 {
            log::warn!(
                "no room for a GPT: {} sectors free at the front, {} at the back",
                front,
                back
            );
            return Err(GptError::NotEnoughSpace);
        }
        Ok(fits)
    }
}
