// Move the secondary GPT after the underlying media changed size

use alloc::vec;

use gpt_disk_io::BlockIo;
use gpt_disk_types::LbaLe;

use super::utils::{edit_header, header_of, io_error, segment_of, with_table};
use super::{DiskSession, GptState};
use crate::disk::error::GptError;
use crate::disk::gpt::GptEntryExt;
use crate::disk::mbr::{read_mbr, write_mbr, MasterBootRecordExt, MbrRecordExt};
use crate::disk::segment::SegmentKind;

impl<B: BlockIo> DiskSession<B> {
    /// Highest LBA covered by a used entry of the primary table, 0 if none.
    pub fn last_used_lba(&self) -> Result<u64, GptError> {
        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;
        with_table(&self.map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.iter_used().map(|(_, e)| e.end_lba()).max().unwrap_or(0)
        })
    }

    /// Place the secondary GPT on the last sector of a disk of
    /// `new_total` sectors.
    ///
    /// Needs the primary header and table. Fails with `NotEnoughSpace` when
    /// a partition reaches into the secondary table area of either the new
    /// size or the current one. The primary's backup LBA and last usable
    /// LBA are rewritten, the secondary is rebuilt at its new place (or
    /// created if it was missing) and the protective MBR size is patched,
    /// clamped to 32 bits.
    pub fn resize_disk(&mut self, new_total: u64) -> Result<(), GptError> {
        let device_blocks = self.io.num_blocks().map_err(io_error)?;
        if new_total > device_blocks {
            log::warn!("disk has {} sectors, {} requested", device_blocks, new_total);
            return Err(GptError::MediaTooSmall);
        }

        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;
        let table_sectors = self
            .map
            .find_first(SegmentKind::PrimaryGptTable)
            .ok_or(GptError::MissingTable)?
            .length();
        let last_used = self.last_used_lba()?;
        let new_last = new_total.saturating_sub(1);

        let new_room = new_last.checked_sub(table_sectors).ok_or(GptError::NotEnoughSpace)?;
        let old_room = header.alternate_lba.to_u64().saturating_sub(table_sectors);
        if new_room <= last_used || old_room <= last_used {
            return Err(GptError::NotEnoughSpace);
        }
        if new_room < header.first_usable_lba.to_u64() {
            return Err(GptError::NotEnoughSpace);
        }

        let mut map = self.map.clone();
        for kind in [SegmentKind::SecondaryGptHeader, SegmentKind::SecondaryGptTable] {
            if let Some(id) = segment_of(&map, kind) {
                map.free(id)?;
            }
        }
        map.resize_media(new_total).map_err(|e| {
            log::warn!("cannot resize map to {} sectors: {}", new_total, e);
            GptError::NotEnoughSpace
        })?;

        let table_bytes = table_sectors as usize * self.sector_size;
        map.add_region(
            new_room,
            table_sectors,
            SegmentKind::SecondaryGptTable,
            vec![0u8; table_bytes],
            None,
        )?;
        map.add_region(
            new_last,
            1,
            SegmentKind::SecondaryGptHeader,
            vec![0u8; self.sector_size],
            None,
        )?;
        edit_header(&mut map, SegmentKind::PrimaryGptHeader, |h| {
            h.alternate_lba = LbaLe::from_u64(new_last);
            h.last_usable_lba = LbaLe::from_u64(new_room - 1);
        })?;

        let mut pmbr = None;
        if let Some(id) = segment_of(&map, SegmentKind::ProtectiveMbr) {
            if let Some(sector) = map.payload_mut(id) {
                let mut mbr = read_mbr(&sector[..])?;
                if let Some(record) = mbr.protective_record_mut() {
                    record.set_size_clamped(new_total - 1);
                }
                write_mbr(&mbr, &mut sector[..]);
                pmbr = Some(sector.clone());
            }
        }

        let old_total = self.total_sectors;
        self.map = map;
        self.total_sectors = new_total;
        self.write_header_pair()?;
        if let Some(sector) = pmbr {
            self.write_sectors(0, &sector)?;
            self.flush()?;
        }
        self.state = GptState::Valid;
        log::info!("disk resized from {} to {} sectors", old_total, new_total);
        Ok(())
    }
}
