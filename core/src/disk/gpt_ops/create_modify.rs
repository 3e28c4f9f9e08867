// Table creation and partition entry edits

use alloc::vec;
use alloc::vec::Vec;

use gpt_disk_io::BlockIo;

use super::utils::{
    align_lba, edit_header, header_of, previous_mbr, protective_sector, table_sectors_for,
    with_table, with_table_mut,
};
use super::{DiskSession, GptState};
use crate::disk::error::{GptError, MapError};
use crate::disk::gpt::{
    new_entry, new_primary_header, write_header, GptEntryExt, GptHeader, GptPartitionEntry,
    GPT_ENTRY_MIN_SIZE,
};
use crate::disk::map::SegmentMap;
use crate::disk::segment::{SegmentId, SegmentKind};
use crate::guid::Guid;

/// Options for [`DiskSession::create`]
#[derive(Clone, Copy, Debug, Default)]
pub struct CreateOptions {
    /// Replace an existing MBR or GPT.
    pub force: bool,
    /// Entry count; the configured count when `None`.
    pub entries: Option<u32>,
}

/// Request for [`DiskSession::add_partition`]
#[derive(Clone, Debug)]
pub struct NewPartition<'a> {
    pub type_guid: Guid,
    /// Sectors; 0 takes the whole free region.
    pub size: u64,
    /// First sector; the first region that fits when `None`.
    pub start: Option<u64>,
    /// Alignment in sectors; the session default when `None`.
    pub alignment: Option<u64>,
    pub label: &'a str,
    pub attributes: u64,
}

impl<'a> NewPartition<'a> {
    pub fn new(type_guid: Guid) -> Self {
        Self {
            type_guid,
            size: 0,
            start: None,
            alignment: None,
            label: "",
            attributes: 0,
        }
    }

    pub fn size(mut self, sectors: u64) -> Self {
        self.size = sectors;
        self
    }

    pub fn at(mut self, lba: u64) -> Self {
        self.start = Some(lba);
        self
    }

    pub fn align(mut self, sectors: u64) -> Self {
        self.alignment = Some(sectors);
        self
    }

    pub fn label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    pub fn attributes(mut self, bits: u64) -> Self {
        self.attributes = bits;
        self
    }
}

impl<B: BlockIo> DiskSession<B> {
    /// Write a protective MBR and an empty GPT.
    ///
    /// Refuses a disk that already has a legacy MBR or a GPT unless
    /// `options.force` is set. Boot code found in sector 0 is kept.
    pub fn create(&mut self, options: CreateOptions) -> Result<(), GptError> {
        if !options.force {
            if self.map.find_first(SegmentKind::Mbr).is_some() {
                return Err(GptError::LegacyMbrPresent);
            }
            if self.state.has_gpt() {
                return Err(GptError::GptPresent);
            }
        }

        let entry_count = options.entries.unwrap_or(self.config.entry_count).max(1);
        let disk_guid = self.generator.generate();
        let (map, header, pmbr) =
            self.fresh_layout(disk_guid, entry_count, self.config.entry_size)?;

        self.map = map;
        self.write_header_pair()?;
        self.write_sectors(0, &pmbr)?;
        self.flush()?;
        self.state = GptState::Valid;
        log::info!(
            "created GPT: {} entries, usable LBA {}..{}",
            entry_count,
            header.first_usable_lba.to_u64(),
            header.last_usable_lba.to_u64()
        );
        Ok(())
    }

    /// Map of an empty GPT disk: protective MBR, both headers and both
    /// zeroed tables. The secondary header is filled in when written.
    pub(super) fn fresh_layout(
        &self,
        disk_guid: Guid,
        entry_count: u32,
        entry_size: u32,
    ) -> Result<(SegmentMap, GptHeader, Vec<u8>), GptError> {
        // Entries are 128 bytes times a power of two
        if entry_size < GPT_ENTRY_MIN_SIZE || !entry_size.is_power_of_two() {
            log::warn!("unsupported partition entry size {}", entry_size);
            return Err(GptError::InvalidState);
        }
        let table_sectors = table_sectors_for(entry_count, entry_size, self.sector_size);
        let total = self.total_sectors;
        // PMBR, two headers, two tables and at least one usable sector
        if total < 2 * table_sectors + 4 {
            return Err(GptError::MediaTooSmall);
        }
        let last = total - 1;

        let previous = previous_mbr(&self.map);
        let pmbr = protective_sector(total, previous.as_ref(), self.sector_size);
        let header = new_primary_header(total, table_sectors, disk_guid, entry_count, entry_size);
        let mut sector = vec![0u8; self.sector_size];
        write_header(&header, &mut sector);
        let table_bytes = table_sectors as usize * self.sector_size;

        let mut map = SegmentMap::new(total);
        map.add_region(0, 1, SegmentKind::ProtectiveMbr, pmbr.clone(), None)?;
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
        Ok((map, header, pmbr))
    }

    /// Wipe the GPT headers and the protective MBR. With `recoverable` the
    /// secondary header is left in place so that [`DiskSession::recover`]
    /// can bring the table back.
    pub fn destroy(&mut self, recoverable: bool) -> Result<(), GptError> {
        if !self.state.has_gpt() {
            return Err(GptError::MissingHeader);
        }
        let mut wipe = vec![SegmentKind::PrimaryGptHeader, SegmentKind::ProtectiveMbr];
        if !recoverable {
            wipe.push(SegmentKind::SecondaryGptHeader);
        }

        let zero = vec![0u8; self.sector_size];
        for kind in wipe {
            if let Some(lba) = self.map.find_first(kind).map(|s| s.start()) {
                log::debug!("wiping {} at LBA {}", kind.type_name(), lba);
                self.write_sectors(lba, &zero)?;
            }
        }
        self.flush()?;
        self.parse_disk()?;
        Ok(())
    }

    /// Add a partition in the first free entry slot. Returns its ordinal.
    pub fn add_partition(&mut self, request: &NewPartition<'_>) -> Result<u32, GptError> {
        self.require_valid()?;
        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;
        let slot = with_table(&self.map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.first_free()
        })?
        .ok_or(GptError::NoFreeEntry)?;
        let alignment = request.alignment.unwrap_or(self.config.alignment);

        let hint = match request.start {
            Some(start) => start,
            None => self
                .first_fit(request.size, alignment)?
                .ok_or(GptError::Map(MapError::NoSpace))?,
        };

        let mut map = self.map.clone();
        let id = map.allocate_free(Some(hint), request.size, alignment)?;
        let (start, length) = map
            .get(id)
            .map(|s| (s.start(), s.length()))
            .ok_or(MapError::NotFound)?;
        let end = start + length - 1;
        if start < header.first_usable_lba.to_u64() || end > header.last_usable_lba.to_u64() {
            return Err(GptError::Map(MapError::OutOfRange));
        }
        map.set_ordinal(id, Some(slot + 1))?;

        let unique_guid = self.generator.generate();
        let entry = new_entry(
            request.type_guid,
            unique_guid,
            start,
            end,
            request.attributes,
            request.label,
        );
        with_table_mut(&mut map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.set(slot, &entry)
        })?;

        self.map = map;
        self.write_header_pair()?;
        log::info!("partition {} added at LBA {}..{}", slot + 1, start, end);
        Ok(slot + 1)
    }

    /// Clear an entry and return its former contents.
    pub fn remove_partition(&mut self, ordinal: u32) -> Result<GptPartitionEntry, GptError> {
        self.require_valid()?;
        let entry = self.partition_entry(ordinal)?;
        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;

        let mut map = self.map.clone();
        if let Some(id) = self.partition_segment(ordinal) {
            map.free(id)?;
        }
        with_table_mut(&mut map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.clear(ordinal - 1)
        })?;

        self.map = map;
        self.write_header_pair()?;
        log::info!("partition {} removed", ordinal);
        Ok(entry)
    }

    pub fn set_label(&mut self, ordinal: u32, label: &str) -> Result<(), GptError> {
        self.update_entry(ordinal, |e| e.set_label(label))
    }

    /// Change the type of a partition. The nil GUID would free the slot
    /// and is rejected; use [`DiskSession::remove_partition`].
    pub fn set_type(&mut self, ordinal: u32, type_guid: Guid) -> Result<(), GptError> {
        if type_guid.is_nil() {
            return Err(GptError::InvalidState);
        }
        self.update_entry(ordinal, |e| e.set_type_guid(type_guid))
    }

    /// Set attribute bits, leaving the others alone.
    pub fn set_attributes(&mut self, ordinal: u32, bits: u64) -> Result<(), GptError> {
        self.update_entry(ordinal, |e| e.set_attribute_bits(e.attribute_bits() | bits))
    }

    pub fn clear_attributes(&mut self, ordinal: u32, bits: u64) -> Result<(), GptError> {
        self.update_entry(ordinal, |e| e.set_attribute_bits(e.attribute_bits() & !bits))
    }

    /// Grow or shrink a partition in place. `new_size == 0` grows it over
    /// all the free space that follows. Returns the new size in sectors.
    pub fn resize_partition(
        &mut self,
        ordinal: u32,
        new_size: u64,
        alignment: Option<u64>,
    ) -> Result<u64, GptError> {
        self.require_valid()?;
        let mut entry = self.partition_entry(ordinal)?;
        let id = self.partition_segment(ordinal).ok_or(GptError::PartitionNotFound)?;
        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;

        let mut map = self.map.clone();
        let length = map.resize(id, new_size, alignment.unwrap_or(self.config.alignment))?;
        let end = entry.start_lba() + length - 1;
        if end > header.last_usable_lba.to_u64() {
            return Err(GptError::Map(MapError::CannotGrow));
        }
        entry.set_end_lba(end);
        with_table_mut(&mut map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.set(ordinal - 1, &entry)
        })?;

        self.map = map;
        self.write_header_pair()?;
        log::info!("partition {} resized to {} sectors", ordinal, length);
        Ok(length)
    }

    /// Set the disk GUID, or generate a fresh one. Returns the GUID written.
    pub fn set_disk_guid(&mut self, guid: Option<Guid>) -> Result<Guid, GptError> {
        self.require_valid()?;
        let guid = guid.unwrap_or_else(|| self.generator.generate());
        let mut map = self.map.clone();
        edit_header(&mut map, SegmentKind::PrimaryGptHeader, |h| {
            h.disk_guid = guid.into()
        })?;
        self.map = map;
        self.write_header_pair()?;
        Ok(guid)
    }

    /// Used entry at a 1-based ordinal of the primary table.
    pub fn partition_entry(&self, ordinal: u32) -> Result<GptPartitionEntry, GptError> {
        if ordinal == 0 {
            return Err(GptError::PartitionNotFound);
        }
        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;
        with_table(&self.map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.get(ordinal - 1)
        })?
        .filter(|e| e.is_used())
        .ok_or(GptError::PartitionNotFound)
    }

    fn partition_segment(&self, ordinal: u32) -> Option<SegmentId> {
        self.map
            .find_all(SegmentKind::GptPartition)
            .find(|s| s.ordinal() == Some(ordinal))
            .map(|s| s.id())
    }

    fn update_entry<F>(&mut self, ordinal: u32, f: F) -> Result<(), GptError>
    where
        F: FnOnce(&mut GptPartitionEntry),
    {
        self.require_valid()?;
        let mut entry = self.partition_entry(ordinal)?;
        f(&mut entry);
        let header = header_of(&self.map, SegmentKind::PrimaryGptHeader)?;
        let mut map = self.map.clone();
        with_table_mut(&mut map, &header, SegmentKind::PrimaryGptTable, |t| {
            t.set(ordinal - 1, &entry)
        })?;
        self.map = map;
        self.write_header_pair()
    }

    /// Start of the first free region that can hold `size` sectors at
    /// `alignment`.
    fn first_fit(&self, size: u64, alignment: u64) -> Result<Option<u64>, GptError> {
        let wanted = if alignment > 1 { size / alignment * alignment } else { size };
        Ok(self.free_regions()?.into_iter().find_map(|region| {
            let begin = align_lba(region.start_lba, alignment);
            if begin > region.end_lba {
                return None;
            }
            let avail = region.end_lba - begin + 1;
            let fits = if wanted == 0 {
                avail >= alignment.max(1)
            } else {
                avail >= wanted
            };
            fits.then_some(begin)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::MemDisk;
    use super::*;
    use crate::disk::config::GptConfig;
    use crate::disk::gpt::attributes;
    use crate::guid::registry;

    fn fresh(sectors: usize) -> DiskSession<MemDisk> {
        let config = GptConfig::deterministic(7);
        let mut session = DiskSession::open(MemDisk::new(sectors), config).unwrap();
        session.create(CreateOptions::default()).unwrap();
        session
    }

    #[test]
    fn test_create_refuses_existing_gpt() {
        let mut session = fresh(100);
        assert_eq!(session.create(CreateOptions::default()), Err(GptError::GptPresent));
        let forced = CreateOptions {
            force: true,
            entries: Some(4),
        };
        session.create(forced).unwrap();
        assert_eq!(session.header().unwrap().first_usable_lba.to_u64(), 3);
    }

    #[test]
    fn test_create_needs_room() {
        let mut session =
            DiskSession::open(MemDisk::new(60), GptConfig::deterministic(7)).unwrap();
        assert_eq!(session.create(CreateOptions::default()), Err(GptError::MediaTooSmall));

        let mut odd = DiskSession::open(MemDisk::new(400), GptConfig::deterministic(7)).unwrap();
        odd.config.entry_size = 136;
        assert_eq!(odd.create(CreateOptions::default()), Err(GptError::InvalidState));
    }

    #[test]
    fn test_add_edit_remove() {
        let mut session = fresh(200);
        let efi = session
            .add_partition(&NewPartition::new(registry::EFI_SYSTEM).size(20).label("EFI"))
            .unwrap();
        let data = session
            .add_partition(&NewPartition::new(registry::LINUX_DATA))
            .unwrap();
        assert_eq!((efi, data), (1, 2));

        let first = session.partition_entry(efi).unwrap();
        assert_eq!((first.start_lba(), first.end_lba()), (34, 53));
        let second = session.partition_entry(data).unwrap();
        assert_eq!((second.start_lba(), second.end_lba()), (54, 166));
        assert_ne!(first.unique_guid(), second.unique_guid());

        session.set_label(data, "root").unwrap();
        session.set_attributes(efi, attributes::REQUIRED | attributes::BOOT_ME).unwrap();
        session.clear_attributes(efi, attributes::BOOT_ME).unwrap();
        session.set_type(data, registry::LINUX_LVM).unwrap();
        assert_eq!(session.set_type(data, Guid::NIL), Err(GptError::InvalidState));

        let removed = session.remove_partition(efi).unwrap();
        assert_eq!(removed.attribute_bits(), attributes::REQUIRED);
        assert_eq!(session.partition_entry(efi), Err(GptError::PartitionNotFound));

        // Everything above went through the device
        let disk = session.close().unwrap();
        let session = DiskSession::open(disk, GptConfig::deterministic(7)).unwrap();
        assert_eq!(session.state(), GptState::Valid);
        let entry = session.partition_entry(data).unwrap();
        assert_eq!(entry.label(), "root");
        assert_eq!(entry.type_guid(), registry::LINUX_LVM);
        session.map().check().unwrap();
    }

    #[test]
    fn test_add_with_alignment_and_start() {
        let mut session = fresh(400);
        let p = session
            .add_partition(&NewPartition::new(registry::LINUX_DATA).size(70).align(32))
            .unwrap();
        let e = session.partition_entry(p).unwrap();
        assert_eq!((e.start_lba(), e.size_lba()), (64, Some(64)));

        let q = session
            .add_partition(&NewPartition::new(registry::LINUX_SWAP).at(200).size(10))
            .unwrap();
        assert_eq!(session.partition_entry(q).unwrap().start_lba(), 200);

        // Inside the primary table
        let bad = session.add_partition(&NewPartition::new(registry::LINUX_SWAP).at(10).size(5));
        assert!(bad.is_err());
    }

    #[test]
    fn test_entry_slots_run_out() {
        let config = GptConfig::deterministic(7).entries(4);
        let mut session = DiskSession::open(MemDisk::new(100), config).unwrap();
        session.create(CreateOptions::default()).unwrap();
        for _ in 0..4 {
            session
                .add_partition(&NewPartition::new(registry::LINUX_DATA).size(4))
                .unwrap();
        }
        assert_eq!(
            session.add_partition(&NewPartition::new(registry::LINUX_DATA).size(4)),
            Err(GptError::NoFreeEntry)
        );
    }

    #[test]
    fn test_resize_partition() {
        let mut session = fresh(200);
        let p = session
            .add_partition(&NewPartition::new(registry::LINUX_DATA).size(10))
            .unwrap();
        session
            .add_partition(&NewPartition::new(registry::LINUX_DATA).at(100).size(10))
            .unwrap();

        assert_eq!(session.resize_partition(p, 30, None), Ok(30));
        assert_eq!(session.resize_partition(p, 0, None), Ok(66));
        assert_eq!(session.partition_entry(p).unwrap().end_lba(), 99);
        assert_eq!(
            session.resize_partition(p, 67, None),
            Err(GptError::Map(MapError::CannotGrow))
        );
        assert_eq!(session.resize_partition(p, 5, None), Ok(5));
    }

    #[test]
    fn test_destroy_recoverable() {
        let mut session = fresh(100);
        let guid = session.set_disk_guid(None).unwrap();
        session.destroy(true).unwrap();
        assert_eq!(session.state(), GptState::SecondaryOnly);
        session.recover().unwrap();
        assert_eq!(Guid::from(session.header().unwrap().disk_guid), guid);

        session.destroy(false).unwrap();
        assert_eq!(session.state(), GptState::Headerless);
        assert_eq!(session.destroy(false), Err(GptError::MissingHeader));
    }

    #[test]
    fn test_mutation_needs_both_copies() {
        let mut session = fresh(100);
        session.destroy(true).unwrap();
        assert_eq!(
            session.add_partition(&NewPartition::new(registry::LINUX_DATA)),
            Err(GptError::InvalidState)
        );
    }
}
