// MBR and protective MBR access over the gpt_disk_types layouts

use core::mem::size_of;

use bytemuck::{bytes_of, pod_read_unaligned, Zeroable};
use gpt_disk_types::U32Le;

pub use gpt_disk_types::{MasterBootRecord, MbrPartitionRecord};

use super::error::GptError;

pub const MBR_SIZE: usize = size_of::<MasterBootRecord>();
pub const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];
/// Bytes of one partition record.
pub const RECORD_SIZE: usize = size_of::<MbrPartitionRecord>();

pub const MBR_TYPE_EMPTY: u8 = 0x00;
pub const MBR_TYPE_EXTENDED: u8 = 0x05;
pub const MBR_TYPE_EXTENDED_LBA: u8 = 0x0F;
pub const MBR_TYPE_LINUX_EXTENDED: u8 = 0x85;
pub const MBR_TYPE_PROTECTIVE: u8 = 0xEE;

/// Decode the first 512 bytes of `sector`; checks the 0x55AA signature.
pub fn read_mbr(sector: &[u8]) -> Result<MasterBootRecord, GptError> {
    let raw = sector.get(..MBR_SIZE).ok_or(GptError::MediaTooSmall)?;
    let mbr: MasterBootRecord = pod_read_unaligned(raw);
    if mbr.signature != MBR_SIGNATURE {
        return Err(GptError::BadSignature);
    }
    Ok(mbr)
}

/// Encode into the first 512 bytes of `sector`, leaving the rest alone.
pub fn write_mbr(mbr: &MasterBootRecord, sector: &mut [u8]) {
    sector[..MBR_SIZE].copy_from_slice(bytes_of(mbr));
}

/// Decode one 16-byte record.
pub fn read_record(raw: &[u8]) -> Option<MbrPartitionRecord> {
    raw.get(..RECORD_SIZE).map(pod_read_unaligned)
}

/// Record with zeroed CHS fields.
pub fn new_record(os_type: u8, start_lba: u32, size: u32) -> MbrPartitionRecord {
    MbrPartitionRecord {
        os_indicator: os_type,
        starting_lba: U32Le::from_u32(start_lba),
        size_in_lba: U32Le::from_u32(size),
        ..Zeroable::zeroed()
    }
}

/// Protective MBR for a disk of `total_sectors`. Boot code and disk
/// signature are carried over from `previous` when there is one.
pub fn protective_mbr(total_sectors: u64, previous: Option<&MasterBootRecord>) -> MasterBootRecord {
    let mut mbr = MasterBootRecord::protective_mbr(total_sectors);
    mbr.partitions[0].starting_lba = U32Le::from_u32(1);
    mbr.partitions[0].set_size_clamped(total_sectors.saturating_sub(1));
    if let Some(previous) = previous {
        mbr.boot_strap_code = previous.boot_strap_code;
        mbr.unique_mbr_disk_signature = previous.unique_mbr_disk_signature;
        mbr.unknown = previous.unknown;
    }
    mbr
}

pub trait MbrRecordExt {
    fn is_unused(&self) -> bool;
    /// Record points at a chained extended boot record.
    fn is_extended(&self) -> bool;
    fn start(&self) -> u64;
    fn sectors(&self) -> u64;
    /// Store a sector count, clamped to what 32 bits can express.
    fn set_size_clamped(&mut self, sectors: u64);
}

impl MbrRecordExt for MbrPartitionRecord {
    fn is_unused(&self) -> bool {
        self.os_indicator == MBR_TYPE_EMPTY
    }

    fn is_extended(&self) -> bool {
        matches!(
            self.os_indicator,
            MBR_TYPE_EXTENDED | MBR_TYPE_EXTENDED_LBA | MBR_TYPE_LINUX_EXTENDED
        )
    }

    fn start(&self) -> u64 {
        self.starting_lba.to_u32() as u64
    }

    fn sectors(&self) -> u64 {
        self.size_in_lba.to_u32() as u64
    }

    fn set_size_clamped(&mut self, sectors: u64) {
        let clamped = u32::try_from(sectors).unwrap_or(u32::MAX);
        self.size_in_lba = U32Le::from_u32(clamped);
    }
}

pub trait MasterBootRecordExt {
    /// Boot indicators are all 0x00 or 0x80; anything else is most likely a
    /// filesystem boot sector that merely carries 0xAA55.
    fn has_valid_flags(&self) -> bool;
    /// Exactly one non-empty record, and it is of type 0xEE.
    fn is_protective(&self) -> bool;
    /// Record of type 0xEE, if any.
    fn protective_record_mut(&mut self) -> Option<&mut MbrPartitionRecord>;
}

impl MasterBootRecordExt for MasterBootRecord {
    fn has_valid_flags(&self) -> bool {
        self.partitions
            .iter()
            .all(|r| r.boot_indicator == 0x00 || r.boot_indicator == 0x80)
    }

    fn is_protective(&self) -> bool {
        let mut used = self.partitions.iter().filter(|r| !r.is_unused());
        matches!(
            (used.next(), used.next()),
            (Some(r), None) if r.os_indicator == MBR_TYPE_PROTECTIVE
        )
    }

    fn protective_record_mut(&mut self) -> Option<&mut MbrPartitionRecord> {
        self.partitions
            .iter_mut()
            .find(|r| r.os_indicator == MBR_TYPE_PROTECTIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector_with(records: &[(u8, u8, u32, u32)]) -> [u8; 512] {
        let mut mbr: MasterBootRecord = Zeroable::zeroed();
        for (slot, &(flag, os_type, start, size)) in records.iter().enumerate() {
            mbr.partitions[slot] = new_record(os_type, start, size);
            mbr.partitions[slot].boot_indicator = flag;
        }
        mbr.signature = MBR_SIGNATURE;
        let mut sector = [0u8; 512];
        write_mbr(&mbr, &mut sector);
        sector
    }

    #[test]
    fn test_parse_and_classify() {
        let sector = sector_with(&[(0x80, 0x83, 2048, 4096), (0, 0x0F, 8192, 100)]);
        let mbr = read_mbr(&sector).unwrap();
        assert!(mbr.has_valid_flags());
        assert!(!mbr.is_protective());
        assert_eq!(mbr.partitions[0].start(), 2048);
        assert_eq!(mbr.partitions[0].sectors(), 4096);
        assert!(mbr.partitions[1].is_extended());
        assert_eq!(&sector[446 + 8..446 + 12], &2048u32.to_le_bytes());

        let pmbr = read_mbr(&sector_with(&[(0, 0xEE, 1, 99)])).unwrap();
        assert!(pmbr.is_protective());

        // 0xEE next to another record is a hybrid, not protective
        let hybrid = read_mbr(&sector_with(&[(0, 0xEE, 1, 50), (0, 0x0C, 60, 30)])).unwrap();
        assert!(!hybrid.is_protective());

        let odd_flag = read_mbr(&sector_with(&[(0x12, 0x83, 1, 10)])).unwrap();
        assert!(!odd_flag.has_valid_flags());
    }

    #[test]
    fn test_bad_signature() {
        let mut sector = sector_with(&[]);
        sector[511] = 0;
        assert_eq!(read_mbr(&sector), Err(GptError::BadSignature));
        assert_eq!(read_mbr(&sector[..100]), Err(GptError::MediaTooSmall));
    }

    #[test]
    fn test_protective_layout() {
        let mut previous: MasterBootRecord = Zeroable::zeroed();
        previous.boot_strap_code = [0x90; 440];
        previous.unique_mbr_disk_signature = [1, 2, 3, 4];

        let mut sector = [0u8; 512];
        write_mbr(&protective_mbr(100, Some(&previous)), &mut sector);
        assert_eq!(sector[446 + 4], MBR_TYPE_PROTECTIVE);
        assert_eq!(&sector[446 + 8..446 + 16], &[1, 0, 0, 0, 99, 0, 0, 0]);
        assert_eq!(&sector[510..], &MBR_SIGNATURE);
        assert_eq!(sector[0], 0x90);
        assert_eq!(&sector[440..444], &[1, 2, 3, 4]);

        let pmbr = read_mbr(&sector).unwrap();
        assert!(pmbr.is_protective());
    }

    #[test]
    fn test_protective_size_clamped() {
        let mbr = protective_mbr(0x1_0000_0005, None);
        assert_eq!(mbr.partitions[0].sectors(), 0xFFFF_FFFF);
        assert_eq!(mbr.boot_strap_code, [0u8; 440]);
    }
}
