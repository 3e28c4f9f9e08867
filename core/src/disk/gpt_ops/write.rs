// Serialization of the primary/secondary header and table pair

use gpt_disk_io::BlockIo;
use gpt_disk_types::LbaLe;

use super::utils::{header_of, segment_of};
use super::{DiskSession, GptState};
use crate::disk::error::GptError;
use crate::disk::gpt::{seal_header, write_header, GptHeader};
use crate::disk::segment::SegmentKind;

impl<B: BlockIo> DiskSession<B> {
    /// Write both GPT copies from the segment map.
    ///
    /// The primary table is canonical: it is copied over the secondary
    /// table, and the secondary header is rebuilt from the primary with
    /// only its own location fields changed. For each copy the table is
    /// written before the header that covers it, primary first.
    pub fn write_header_pair(&mut self) -> Result<(), GptError> {
        self.mirror_secondary()?;
        self.write_side(SegmentKind::PrimaryGptHeader, SegmentKind::PrimaryGptTable)?;
        self.write_side(SegmentKind::SecondaryGptHeader, SegmentKind::SecondaryGptTable)?;
        self.flush()?;
        self.state = GptState::Valid;
        log::info!("GPT header pair written");
        Ok(())
    }

    /// Refresh the secondary header and table payloads from the primary.
    fn mirror_secondary(&mut self) -> Result<(), GptError> {
        let primary = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;
        let primary_table = self
            .map
            .find_first(SegmentKind::PrimaryGptTable)
            .ok_or(GptError::MissingTable)?
            .payload()
            .to_vec();
        let secondary_at = self
            .map
            .find_first(SegmentKind::SecondaryGptHeader)
            .ok_or(GptError::MissingHeader)?
            .start();
        let secondary_table = self
            .map
            .find_first(SegmentKind::SecondaryGptTable)
            .ok_or(GptError::MissingTable)?;
        if secondary_table.payload().len() != primary_table.len() {
            return Err(GptError::MissingTable);
        }
        let secondary_table_at = secondary_table.start();
        let secondary_table_id = secondary_table.id();

        let header_id =
            segment_of(&self.map, SegmentKind::SecondaryGptHeader).ok_or(GptError::MissingHeader)?;
        if let Some(sector) = self.map.payload_mut(header_id) {
            let secondary = GptHeader {
                my_lba: LbaLe::from_u64(secondary_at),
                alternate_lba: primary.my_lba,
                partition_entry_lba: LbaLe::from_u64(secondary_table_at),
                ..primary
            };
            sector.fill(0);
            write_header(&secondary, sector);
        }
        self.map.set_payload(secondary_table_id, primary_table)?;
        Ok(())
    }

    /// Seal one header against its table, then write table and header.
    pub(super) fn write_side(
        &mut self,
        header_kind: SegmentKind,
        table_kind: SegmentKind,
    ) -> Result<(), GptError> {
        let table_seg = self.map.find_first(table_kind).ok_or(GptError::MissingTable)?;
        let (table_lba, mut table) = (table_seg.start(), table_seg.payload().to_vec());
        let header_seg = self.map.find_first(header_kind).ok_or(GptError::MissingHeader)?;
        let (header_id, header_lba) = (header_seg.id(), header_seg.start());

        // Keep the sealed bytes in the map so that a retry writes the same data
        let sector = self.map.payload_mut(header_id).ok_or(GptError::MissingHeader)?;
        seal_header(&mut sector[..], &mut table)?;
        let sealed = sector.clone();

        log::debug!(
            "writing GPT copy: table at LBA {}, header at LBA {}",
            table_lba,
            header_lba
        );
        self.write_sectors(table_lba, &table)?;
        self.write_sectors(header_lba, &sealed)?;
        Ok(())
    }
}
