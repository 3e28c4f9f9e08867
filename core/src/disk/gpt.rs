// GPT header and partition entry access
//
// The segment map keeps headers and tables as raw sector buffers. The
// `gpt_disk_types` layouts are read out of those buffers and written back
// with bytemuck; the checksums are the ones `gpt_disk_types` computes.

use alloc::string::String;
use core::mem::size_of;

use bytemuck::{bytes_of, pod_read_unaligned};
use gpt_disk_types::{
    BlockSize, Crc32, GptHeaderRevision, GptHeaderSignature, GptPartitionEntryArray, LbaLe, U32Le,
    U64Le,
};

pub use gpt_disk_types::{
    GptHeader, GptPartitionAttributes, GptPartitionEntry, GptPartitionName, GptPartitionType,
};

use super::error::GptError;
use crate::guid::Guid;

/// Bytes of the header covered by the self CRC in revision 1.0.
pub const GPT_HEADER_SIZE: usize = size_of::<GptHeader>();
/// Smallest legal partition entry.
pub const GPT_ENTRY_MIN_SIZE: u32 = size_of::<GptPartitionEntry>() as u32;
/// Partition names hold 36 UTF-16 code units.
pub const GPT_NAME_UNITS: usize = 36;

const HEADER_CRC_OFFSET: usize = 16;

/// Attribute bits
pub mod attributes {
    pub const REQUIRED: u64 = 1 << 0;
    pub const NO_BLOCK_IO: u64 = 1 << 1;
    pub const LEGACY_BIOS_BOOTABLE: u64 = 1 << 2;
    pub const BOOT_FAILED: u64 = 1 << 57;
    pub const BOOT_ONCE: u64 = 1 << 58;
    pub const BOOT_ME: u64 = 1 << 59;

    static NAMES: &[(&str, u64)] = &[
        ("required", REQUIRED),
        ("noblockio", NO_BLOCK_IO),
        ("biosboot", LEGACY_BIOS_BOOTABLE),
        ("bootfailed", BOOT_FAILED),
        ("bootonce", BOOT_ONCE),
        ("bootme", BOOT_ME),
    ];

    /// Bit for a named attribute.
    pub fn by_name(name: &str) -> Option<u64> {
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, bit)| bit)
    }

    /// Names of the bits set in `attrs`.
    pub fn names(attrs: u64) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(_, bit)| attrs & bit != 0)
            .map(|&(n, _)| n)
    }
}

/// Header for a fresh primary copy. `table_sectors` sectors of entries
/// follow it at LBA 2 and precede the backup header on the last sector.
pub fn new_primary_header(
    total_sectors: u64,
    table_sectors: u64,
    disk_guid: Guid,
    num_entries: u32,
    entry_size: u32,
) -> GptHeader {
    let last = total_sectors - 1;
    GptHeader {
        signature: GptHeaderSignature::EFI_COMPATIBLE_PARTITION_TABLE_HEADER,
        revision: GptHeaderRevision::VERSION_1_0,
        header_size: U32Le::from_u32(GPT_HEADER_SIZE as u32),
        my_lba: LbaLe::from_u64(1),
        alternate_lba: LbaLe::from_u64(last),
        first_usable_lba: LbaLe::from_u64(2 + table_sectors),
        last_usable_lba: LbaLe::from_u64(last - table_sectors - 1),
        disk_guid: disk_guid.into(),
        partition_entry_lba: LbaLe::from_u64(2),
        number_of_partition_entries: U32Le::from_u32(num_entries),
        size_of_partition_entry: U32Le::from_u32(entry_size),
        // Checksums are filled in by seal_header on write
        ..Default::default()
    }
}

/// Read the header at the start of `sector`; checks the signature only.
pub fn read_header(sector: &[u8]) -> Result<GptHeader, GptError> {
    let raw = sector.get(..GPT_HEADER_SIZE).ok_or(GptError::MediaTooSmall)?;
    let header: GptHeader = pod_read_unaligned(raw);
    if !header.is_signature_valid() {
        return Err(GptError::BadSignature);
    }
    Ok(header)
}

/// Read the header and verify its sizes and self CRC.
pub fn verify_header(sector: &[u8]) -> Result<GptHeader, GptError> {
    let header = read_header(sector)?;
    let size = header.header_size.to_u32() as usize;
    if size < GPT_HEADER_SIZE || size > sector.len() {
        return Err(GptError::BadSignature);
    }
    if header.get_partition_entry_array_layout().is_err()
        || header.number_of_partition_entries.to_u32() == 0
    {
        return Err(GptError::BadSignature);
    }

    let valid = if size == GPT_HEADER_SIZE {
        header.calculate_header_crc32() == header.header_crc32
    } else {
        // Trailing reserved bytes are covered too
        let stored = &sector[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4];
        let mut crc = crate::crc32::digest();
        crc.update(&sector[..HEADER_CRC_OFFSET]);
        crc.update(&[0u8; 4]);
        crc.update(&sector[HEADER_CRC_OFFSET + 4..size]);
        crc.finalize().to_le_bytes() == stored
    };
    if !valid {
        return Err(GptError::BadChecksum);
    }
    Ok(header)
}

/// Write the header into the start of `sector`, leaving the rest untouched.
pub fn write_header(header: &GptHeader, sector: &mut [u8]) {
    sector[..GPT_HEADER_SIZE].copy_from_slice(bytes_of(header));
}

/// CRC of the entry array `header` describes, which `table` holds.
pub fn table_crc32(header: &GptHeader, table: &mut [u8]) -> Result<Crc32, GptError> {
    let layout = header
        .get_partition_entry_array_layout()
        .map_err(|_| GptError::BadSignature)?;
    let array = GptPartitionEntryArray::new(layout, BlockSize::BS_512, table)
        .map_err(|_| GptError::MissingTable)?;
    Ok(array.calculate_crc32())
}

/// Store the partition array CRC, then recompute the self CRC. The header
/// is rewritten at its revision 1.0 size.
pub fn seal_header(sector: &mut [u8], table: &mut [u8]) -> Result<(), GptError> {
    let mut header = read_header(sector)?;
    header.header_size = U32Le::from_u32(GPT_HEADER_SIZE as u32);
    header.partition_entry_array_crc32 = table_crc32(&header, table)?;
    header.update_header_crc32();
    write_header(&header, sector);
    Ok(())
}

pub trait GptHeaderExt {
    /// Bytes of partition entries described by this header.
    fn table_bytes(&self) -> usize;

    /// Sectors holding the partition entries.
    fn table_sectors(&self, sector_size: usize) -> u64;
}

impl GptHeaderExt for GptHeader {
    fn table_bytes(&self) -> usize {
        self.number_of_partition_entries.to_u32() as usize
            * self.size_of_partition_entry.to_u32() as usize
    }

    fn table_sectors(&self, sector_size: usize) -> u64 {
        (self.table_bytes() as u64).div_ceil(sector_size as u64)
    }
}

/// Encode `name` as UTF-16LE, truncating at 36 code units.
pub fn partition_name(name: &str) -> GptPartitionName {
    let mut raw = [0u8; GPT_NAME_UNITS * 2];
    for (slot, unit) in raw.chunks_exact_mut(2).zip(name.encode_utf16()) {
        slot.copy_from_slice(&unit.to_le_bytes());
    }
    GptPartitionName(raw)
}

/// Decode a name up to its first NUL; unpaired surrogates become U+FFFD.
pub fn name_to_string(name: &GptPartitionName) -> String {
    let units = name
        .0
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0);
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

pub fn new_entry(
    type_guid: Guid,
    unique_guid: Guid,
    start_lba: u64,
    end_lba: u64,
    attributes: u64,
    name: &str,
) -> GptPartitionEntry {
    GptPartitionEntry {
        partition_type_guid: GptPartitionType(type_guid.into()),
        unique_partition_guid: unique_guid.into(),
        starting_lba: LbaLe::from_u64(start_lba),
        ending_lba: LbaLe::from_u64(end_lba),
        attributes: GptPartitionAttributes(U64Le::from_u64(attributes)),
        name: partition_name(name),
    }
}

/// Plain-integer view of the little-endian entry fields
pub trait GptEntryExt {
    fn type_guid(&self) -> Guid;
    fn unique_guid(&self) -> Guid;
    fn start_lba(&self) -> u64;
    /// Inclusive
    fn end_lba(&self) -> u64;
    fn attribute_bits(&self) -> u64;
    fn label(&self) -> String;

    fn set_type_guid(&mut self, type_guid: Guid);
    fn set_end_lba(&mut self, end_lba: u64);
    fn set_attribute_bits(&mut self, bits: u64);
    fn set_label(&mut self, name: &str);

    /// Sector count; `None` when the entry ends before it starts or spans
    /// the whole 64-bit range.
    fn size_lba(&self) -> Option<u64> {
        self.end_lba()
            .checked_sub(self.start_lba())?
            .checked_add(1)
    }

    fn matches_type(&self, type_guid: &Guid) -> bool {
        self.type_guid() == *type_guid
    }
}

impl GptEntryExt for GptPartitionEntry {
    fn type_guid(&self) -> Guid {
        self.partition_type_guid.0.into()
    }

    fn unique_guid(&self) -> Guid {
        self.unique_partition_guid.into()
    }

    fn start_lba(&self) -> u64 {
        self.starting_lba.to_u64()
    }

    fn end_lba(&self) -> u64 {
        self.ending_lba.to_u64()
    }

    fn attribute_bits(&self) -> u64 {
        self.attributes.0.to_u64()
    }

    fn label(&self) -> String {
        name_to_string(&self.name)
    }

    fn set_type_guid(&mut self, type_guid: Guid) {
        self.partition_type_guid = GptPartitionType(type_guid.into());
    }

    fn set_end_lba(&mut self, end_lba: u64) {
        self.ending_lba = LbaLe::from_u64(end_lba);
    }

    fn set_attribute_bits(&mut self, bits: u64) {
        self.attributes = GptPartitionAttributes(U64Le::from_u64(bits));
    }

    fn set_label(&mut self, name: &str) {
        self.name = partition_name(name);
    }
}

const ENTRY_BYTES: usize = size_of::<GptPartitionEntry>();

/// Read-only view of a partition entry array
pub struct EntryTable<'a> {
    entries: &'a [u8],
    entry_size: usize,
    count: u32,
}

impl<'a> EntryTable<'a> {
    /// `None` unless `entries` holds `count` entries of `entry_size` bytes.
    pub fn new(entries: &'a [u8], entry_size: u32, count: u32) -> Option<Self> {
        let entry_size = entry_size as usize;
        let needed = entry_size.checked_mul(count as usize)?;
        if entry_size < ENTRY_BYTES || entries.len() < needed {
            return None;
        }
        Some(Self {
            entries,
            entry_size,
            count,
        })
    }

    pub fn for_header(entries: &'a [u8], header: &GptHeader) -> Option<Self> {
        Self::new(
            entries,
            header.size_of_partition_entry.to_u32(),
            header.number_of_partition_entries.to_u32(),
        )
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Entry at a 0-based slot, used or not.
    pub fn get(&self, index: u32) -> Option<GptPartitionEntry> {
        if index >= self.count {
            return None;
        }
        let offset = index as usize * self.entry_size;
        Some(pod_read_unaligned(&self.entries[offset..offset + ENTRY_BYTES]))
    }

    /// Used entries with their 0-based slot.
    pub fn iter_used(&self) -> impl Iterator<Item = (u32, GptPartitionEntry)> + '_ {
        (0..self.count).filter_map(move |i| self.get(i).filter(|e| e.is_used()).map(|e| (i, e)))
    }

    pub fn first_free(&self) -> Option<u32> {
        (0..self.count).find(|&i| self.get(i).map_or(false, |e| !e.is_used()))
    }

    pub fn find_by_type(&self, type_guid: &Guid) -> Option<(u32, GptPartitionEntry)> {
        self.iter_used().find(|(_, e)| e.matches_type(type_guid))
    }
}

/// Mutable view of a partition entry array
pub struct EntryTableMut<'a> {
    entries: &'a mut [u8],
    entry_size: usize,
    count: u32,
}

impl<'a> EntryTableMut<'a> {
    pub fn new(entries: &'a mut [u8], entry_size: u32, count: u32) -> Option<Self> {
        EntryTable::new(entries, entry_size, count)?;
        Some(Self {
            entries,
            entry_size: entry_size as usize,
            count,
        })
    }

    pub fn for_header(entries: &'a mut [u8], header: &GptHeader) -> Option<Self> {
        Self::new(
            entries,
            header.size_of_partition_entry.to_u32(),
            header.number_of_partition_entries.to_u32(),
        )
    }

    pub fn as_table(&self) -> EntryTable<'_> {
        EntryTable {
            entries: &*self.entries,
            entry_size: self.entry_size,
            count: self.count,
        }
    }

    /// Store `entry` in a slot; any stride padding is kept.
    pub fn set(&mut self, index: u32, entry: &GptPartitionEntry) -> Result<(), GptError> {
        if index >= self.count {
            return Err(GptError::PartitionNotFound);
        }
        let offset = index as usize * self.entry_size;
        self.entries[offset..offset + ENTRY_BYTES].copy_from_slice(bytes_of(entry));
        Ok(())
    }

    /// Zero a whole slot, padding included.
    pub fn clear(&mut self, index: u32) -> Result<(), GptError> {
        if index >= self.count {
            return Err(GptError::PartitionNotFound);
        }
        let offset = index as usize * self.entry_size;
        self.entries[offset..offset + self.entry_size].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::crc32;
    use crate::guid::registry;
    use alloc::vec;

    fn stored_u32(sector: &[u8], offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&sector[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    #[test]
    fn test_header_write_then_verify() {
        let header = new_primary_header(100, 32, registry::LINUX_DATA, 128, 128);
        assert_eq!(header.first_usable_lba.to_u64(), 34);
        assert_eq!(header.last_usable_lba.to_u64(), 66);

        let mut sector = [0u8; 512];
        write_header(&header, &mut sector);
        let mut table = vec![0u8; header.table_bytes()];
        seal_header(&mut sector, &mut table).unwrap();

        let parsed = verify_header(&sector).unwrap();
        assert_eq!(stored_u32(&sector, 88), crc32(&table));
        assert_eq!(Guid::from(parsed.disk_guid), registry::LINUX_DATA);
        assert_eq!(parsed.table_sectors(512), 32);
        assert_eq!(parsed.header_crc32, parsed.calculate_header_crc32());

        sector[40] ^= 1;
        assert_eq!(verify_header(&sector), Err(GptError::BadChecksum));
        sector[0] = b'X';
        assert_eq!(verify_header(&sector), Err(GptError::BadSignature));
    }

    #[test]
    fn test_extended_header_size_is_checksummed() {
        let mut header = new_primary_header(100, 32, registry::LINUX_DATA, 128, 128);
        header.header_size = U32Le::from_u32(96);
        let mut sector = [0u8; 512];
        write_header(&header, &mut sector);
        sector[92..96].copy_from_slice(&[1, 2, 3, 4]);
        let mut crc = crate::crc32::digest();
        crc.update(&sector[..96]);
        let value = crc.finalize();
        sector[16..20].copy_from_slice(&value.to_le_bytes());

        assert!(verify_header(&sector).is_ok());
        sector[95] ^= 1;
        assert_eq!(verify_header(&sector), Err(GptError::BadChecksum));
    }

    #[test]
    fn test_entry_table_slots() {
        let mut raw = vec![0u8; 4 * 128];
        let mut table = EntryTableMut::new(&mut raw, 128, 4).unwrap();
        let unique = Guid::from_fields(1, 2, 3, [4; 8]);
        let entry = new_entry(
            registry::EFI_SYSTEM,
            unique,
            34,
            63,
            attributes::REQUIRED,
            "EFI system",
        );
        table.set(1, &entry).unwrap();
        assert_eq!(table.set(4, &entry), Err(GptError::PartitionNotFound));

        let view = table.as_table();
        assert_eq!(view.first_free(), Some(0));
        assert_eq!(view.get(1), Some(entry));
        assert_eq!(view.find_by_type(&registry::EFI_SYSTEM).map(|(i, _)| i), Some(1));
        assert_eq!(view.iter_used().count(), 1);
        assert_eq!(entry.size_lba(), Some(30));
        assert_eq!(entry.unique_guid(), unique);
        assert_eq!(entry.attribute_bits(), attributes::REQUIRED);
        assert_eq!(entry.label(), "EFI system");
        assert_eq!(&raw[128..144], &registry::EFI_SYSTEM.encode());
    }

    #[test]
    fn test_size_of_bad_ranges() {
        let reversed = new_entry(registry::LINUX_DATA, Guid::NIL, 50, 10, 0, "");
        assert_eq!(reversed.size_lba(), None);
        let everything = new_entry(registry::LINUX_DATA, Guid::NIL, 0, u64::MAX, 0, "");
        assert_eq!(everything.size_lba(), None);
    }

    #[test]
    fn test_entry_table_rejects_short_buffer() {
        let raw = [0u8; 200];
        assert!(EntryTable::new(&raw, 128, 2).is_none());
        assert!(EntryTable::new(&raw, 64, 2).is_none());
    }

    #[test]
    fn test_name_truncates() {
        let long = "abcdefghijklmnopqrstuvwxyz0123456789EXTRA";
        let name = partition_name(long);
        assert_eq!(name_to_string(&name), &long[..36]);
        assert_eq!(name_to_string(&partition_name("")), "");
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(attributes::by_name("BootMe"), Some(attributes::BOOT_ME));
        let set = attributes::REQUIRED | attributes::LEGACY_BIOS_BOOTABLE;
        let names: vec::Vec<_> = attributes::names(set).collect();
        assert_eq!(names, ["required", "biosboot"]);
    }
}
