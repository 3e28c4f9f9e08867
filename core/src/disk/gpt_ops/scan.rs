// Disk scan: MBR chain walk, then a check of both GPT copies

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use bytemuck::bytes_of;
use gpt_disk_io::BlockIo;

use super::{DiskSession, GptState};
use crate::disk::error::{GptError, MapError};
use crate::disk::gpt::{
    table_crc32, verify_header, EntryTable, GptEntryExt, GptHeader, GptHeaderExt,
};
use crate::disk::map::SegmentMap;
use crate::disk::mbr::{
    read_mbr, MasterBootRecord, MasterBootRecordExt, MbrRecordExt, MBR_TYPE_PROTECTIVE,
};
use crate::disk::segment::SegmentKind;

/// One GPT copy that passed both checksums
struct GptSide {
    header: GptHeader,
    sector: Vec<u8>,
    table: Vec<u8>,
}

/// Extended boot record waiting to be scanned
struct PendingRecord {
    lba: u64,
    /// Start of the outermost extended partition; chain links are relative to it.
    ext_base: u64,
    depth: usize,
}

impl<B: BlockIo> DiskSession<B> {
    /// Rebuild the segment map from the device.
    ///
    /// Sector 0 is classified first (protective or legacy MBR, following
    /// extended partition chains), then a GPT header is read at LBA 1 and
    /// on the last sector. A copy is only used if its header and its table
    /// both match their CRCs; partitions come from the primary copy when it
    /// is valid and from the secondary otherwise.
    pub fn parse_disk(&mut self) -> Result<GptState, GptError> {
        self.state = GptState::Unparsed;
        if self.total_sectors == 0 {
            return Err(GptError::MediaTooSmall);
        }

        let mut map = SegmentMap::new(self.total_sectors);
        self.scan_mbr(&mut map)?;
        self.state = GptState::Scanned;

        let state = self.scan_gpt(&mut map)?;
        self.map = map;
        self.state = state;
        log::info!("disk scanned: {}", state.as_str());
        Ok(state)
    }

    fn scan_mbr(&mut self, map: &mut SegmentMap) -> Result<(), GptError> {
        let sector = self.read_sectors(0, 1)?;
        let mbr = match read_mbr(&sector) {
            Ok(mbr) if mbr.has_valid_flags() => mbr,
            _ => {
                log::debug!("no MBR on sector 0");
                return Ok(());
            }
        };

        if mbr.is_protective() {
            log::debug!("protective MBR found");
            map.add_region(0, 1, SegmentKind::ProtectiveMbr, sector, None)?;
            return Ok(());
        }

        log::debug!("legacy MBR found");
        map.add_region(0, 1, SegmentKind::Mbr, sector, None)?;

        let mut visited = BTreeSet::new();
        visited.insert(0u64);
        let mut pending = Vec::new();
        self.collect_records(map, 0, None, &mbr, 0, &mut pending);

        while let Some(next) = pending.pop() {
            if next.depth > self.config.max_chain_depth {
                log::warn!("extended partition chain deeper than {}", self.config.max_chain_depth);
                return Err(GptError::MalformedChain);
            }
            if !visited.insert(next.lba) {
                log::warn!("extended partition chain loops back to LBA {}", next.lba);
                return Err(GptError::MalformedChain);
            }

            let sector = self.read_sectors(next.lba, 1)?;
            let ebr = match read_mbr(&sector) {
                Ok(ebr) => ebr,
                Err(_) => {
                    log::warn!("extended boot record at LBA {} has no signature", next.lba);
                    continue;
                }
            };
            if map.add_region(next.lba, 1, SegmentKind::Mbr, sector, None).is_err() {
                log::debug!("extended boot record at LBA {} shares space", next.lba);
            }
            let ext_base = Some(next.ext_base);
            self.collect_records(map, next.lba, ext_base, &ebr, next.depth, &mut pending);
        }
        Ok(())
    }

    /// Add the data records of one MBR/EBR to the map and queue the
    /// extended ones.
    ///
    /// Data records are relative to the sector holding them. Links to the
    /// next EBR are relative to the outermost extended partition, or
    /// absolute when they sit in the MBR itself (`ext_base == None`).
    fn collect_records(
        &self,
        map: &mut SegmentMap,
        base: u64,
        ext_base: Option<u64>,
        mbr: &MasterBootRecord,
        depth: usize,
        pending: &mut Vec<PendingRecord>,
    ) {
        for (slot, record) in mbr.partitions.iter().enumerate() {
            if record.is_unused() || record.os_indicator == MBR_TYPE_PROTECTIVE {
                continue;
            }

            if record.is_extended() {
                let lba = ext_base.unwrap_or(0) + record.start();
                if lba >= self.total_sectors {
                    log::warn!("extended record {} at LBA {} points outside the disk", slot, base);
                    continue;
                }
                pending.push(PendingRecord {
                    lba,
                    ext_base: ext_base.unwrap_or(lba),
                    depth: depth + 1,
                });
                continue;
            }

            let start = base + record.start();
            let size = record.sectors();
            if size == 0 || start + size > self.total_sectors {
                log::warn!(
                    "MBR record {} at LBA {} ({}+{}) does not fit the disk",
                    slot,
                    base,
                    start,
                    size
                );
                continue;
            }
            if let Err(e) = map.add_region(
                start,
                size,
                SegmentKind::MbrPartition { parent: base },
                bytes_of(record).to_vec(),
                None,
            ) {
                log::warn!("MBR record {} at LBA {} skipped: {}", slot, base, e);
            }
        }
    }

    fn scan_gpt(&mut self, map: &mut SegmentMap) -> Result<GptState, GptError> {
        if self.total_sectors < 3 {
            log::debug!("disk too small for a GPT");
            return Ok(GptState::Headerless);
        }

        let last = self.total_sectors - 1;
        let mut primary = self.read_side(1)?;
        let mut secondary = self.read_side(last)?;

        for (side, header_kind, table_kind) in [
            (&mut primary, SegmentKind::PrimaryGptHeader, SegmentKind::PrimaryGptTable),
            (&mut secondary, SegmentKind::SecondaryGptHeader, SegmentKind::SecondaryGptTable),
        ] {
            if let Some(found) = side {
                if let Err(e) = self.place_side(map, found, header_kind, table_kind) {
                    log::warn!("{} dropped: {}", header_kind.type_name(), e);
                    *side = None;
                }
            }
        }

        let state = match (&primary, &secondary) {
            (Some(_), Some(_)) => GptState::Valid,
            (Some(_), None) => GptState::PrimaryOnly,
            (None, Some(_)) => GptState::SecondaryOnly,
            (None, None) => GptState::Headerless,
        };

        if let Some(side) = primary.as_ref().or(secondary.as_ref()) {
            let table =
                EntryTable::for_header(&side.table, &side.header).ok_or(GptError::MissingTable)?;
            for (slot, entry) in table.iter_used() {
                if entry.end_lba() >= self.total_sectors {
                    log::warn!("entry {} ends past the disk", slot + 1);
                    continue;
                }
                let Some(size) = entry.size_lba() else {
                    log::warn!("entry {} ends before it starts", slot + 1);
                    continue;
                };
                map.add_region(
                    entry.start_lba(),
                    size,
                    SegmentKind::GptPartition,
                    Vec::new(),
                    Some(slot + 1),
                )?;
            }
        }
        Ok(state)
    }

    /// Add one copy's header and table to the map. Nothing is added unless
    /// both fit.
    fn place_side(
        &self,
        map: &mut SegmentMap,
        side: &GptSide,
        header_kind: SegmentKind,
        table_kind: SegmentKind,
    ) -> Result<(), MapError> {
        let header_lba = side.header.my_lba.to_u64();
        let table_lba = side.header.partition_entry_lba.to_u64();
        let table_sectors = side.header.table_sectors(self.sector_size);

        let mut trial = map.clone();
        trial.add_region(header_lba, 1, header_kind, side.sector.clone(), None)?;
        trial.add_region(table_lba, table_sectors, table_kind, side.table.clone(), None)?;
        *map = trial;
        Ok(())
    }

    /// Read the header at `lba` and the table it points at.
    fn read_side(&mut self, lba: u64) -> Result<Option<GptSide>, GptError> {
        let sector = self.read_sectors(lba, 1)?;
        let header = match verify_header(&sector) {
            Ok(header) => header,
            Err(e) => {
                log::debug!("no GPT header at LBA {}: {}", lba, e);
                return Ok(None);
            }
        };
        if header.my_lba.to_u64() != lba {
            log::warn!("GPT header at LBA {} claims LBA {}", lba, header.my_lba.to_u64());
            return Ok(None);
        }

        let table_lba = header.partition_entry_lba.to_u64();
        let ts = header.table_sectors(self.sector_size);
        let table_end = table_lba.checked_add(ts);
        if table_lba == 0 || table_end.map_or(true, |end| end > self.total_sectors) {
            log::warn!("GPT table for header at LBA {} lies outside the disk", lba);
            return Ok(None);
        }

        let mut table = self.read_sectors(table_lba, ts)?;
        if table_crc32(&header, &mut table)? != header.partition_entry_array_crc32 {
            log::warn!("GPT table at LBA {} has a bad checksum", table_lba);
            return Ok(None);
        }

        Ok(Some(GptSide {
            header,
            sector,
            table,
        }))
    }
}
