// Rebuild a lost GPT copy from its surviving counterpart

use gpt_disk_io::BlockIo;
use gpt_disk_types::LbaLe;

use super::utils::{header_of, previous_mbr, protective_sector};
use super::{DiskSession, GptState};
use crate::disk::error::GptError;
use crate::disk::gpt::{write_header, GptHeader};
use crate::disk::segment::SegmentKind;

impl<B: BlockIo> DiskSession<B> {
    /// Recreate the missing primary or secondary GPT from the one that
    /// survived.
    ///
    /// The survivor must still describe this disk size: a primary whose
    /// backup LBA is not the last sector (or a secondary not pointing back
    /// at LBA 1) fails with `MediaSizeChanged`, and the caller has to run
    /// [`DiskSession::resize_disk`] first. The copy is byte-identical to
    /// the survivor except for its own location fields and checksums. A
    /// protective MBR is written too when sector 0 holds none.
    pub fn recover(&mut self) -> Result<(), GptError> {
        let (from_header, from_table, to_header, to_table) = match self.state {
            GptState::PrimaryOnly => (
                SegmentKind::PrimaryGptHeader,
                SegmentKind::PrimaryGptTable,
                SegmentKind::SecondaryGptHeader,
                SegmentKind::SecondaryGptTable,
            ),
            GptState::SecondaryOnly => (
                SegmentKind::SecondaryGptHeader,
                SegmentKind::SecondaryGptTable,
                SegmentKind::PrimaryGptHeader,
                SegmentKind::PrimaryGptTable,
            ),
            GptState::Headerless => return Err(GptError::MissingHeader),
            _ => return Err(GptError::InvalidState),
        };
        if self.map.find_first(SegmentKind::Mbr).is_some() {
            return Err(GptError::LegacyMbrPresent);
        }

        let last = self.total_sectors - 1;
        let survivor = header_of(&self.map, from_header)?;
        let expected_backup = if from_header == SegmentKind::PrimaryGptHeader {
            last
        } else {
            1
        };
        let mirror_lba = survivor.alternate_lba.to_u64();
        if mirror_lba != expected_backup {
            log::warn!(
                "surviving header expects its mirror at LBA {}, disk ends at {}",
                mirror_lba,
                last
            );
            return Err(GptError::MediaSizeChanged);
        }

        let source_table = self.map.find_first(from_table).ok_or(GptError::MissingTable)?;
        let table_sectors = source_table.length();
        let table = source_table.payload().to_vec();
        let mut sector = self
            .map
            .find_first(from_header)
            .ok_or(GptError::MissingHeader)?
            .payload()
            .to_vec();

        let table_lba = if to_table == SegmentKind::SecondaryGptTable {
            mirror_lba - table_sectors
        } else {
            2
        };
        let mirror = GptHeader {
            my_lba: survivor.alternate_lba,
            alternate_lba: survivor.my_lba,
            partition_entry_lba: LbaLe::from_u64(table_lba),
            ..survivor
        };
        write_header(&mirror, &mut sector);

        let mut map = self.map.clone();
        map.add_region(table_lba, table_sectors, to_table, table, None)?;
        map.add_region(mirror_lba, 1, to_header, sector, None)?;

        let pmbr = if map.segment_at(0).map_or(false, |s| s.kind().is_unused()) {
            let previous = previous_mbr(&map);
            let sector = protective_sector(self.total_sectors, previous.as_ref(), self.sector_size);
            map.add_region(0, 1, SegmentKind::ProtectiveMbr, sector.clone(), None)?;
            Some(sector)
        } else {
            None
        };

        self.map = map;
        self.write_side(to_header, to_table)?;
        if let Some(sector) = pmbr {
            log::info!("protective MBR recreated");
            self.write_sectors(0, &sector)?;
        }
        self.flush()?;
        self.state = GptState::Valid;
        log::info!(
            "recovered {} from {}",
            to_header.type_name(),
            from_header.type_name()
        );
        Ok(())
    }
}
