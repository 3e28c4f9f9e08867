//! Legacy partition translation for MBR → GPT migration
//!
//! MBR type codes map directly onto GPT type GUIDs. BSD slices (0xA5,
//! 0xA6, 0xA9) carry a disklabel one sector into the slice whose
//! sub-partitions are converted individually through a filesystem-type
//! callback; [`disklabel_fstype_guid`] is the stock callback.

use alloc::vec::Vec;

use crate::guid::registry;
use crate::guid::Guid;

pub const MBR_TYPE_FREEBSD: u8 = 0xA5;
pub const MBR_TYPE_OPENBSD: u8 = 0xA6;
pub const MBR_TYPE_NETBSD: u8 = 0xA9;

/// Magic stored in both `d_magic` and `d_magic2`.
pub const DISKLABEL_MAGIC: u32 = 0x8256_4557;
/// Sector of the slice holding the disklabel.
pub const DISKLABEL_SECTOR: u64 = 1;

const DISKLABEL_MAGIC2_OFFSET: usize = 132;
const DISKLABEL_NPARTITIONS_OFFSET: usize = 138;
const DISKLABEL_PARTITIONS_OFFSET: usize = 148;
const DISKLABEL_PARTITION_SIZE: usize = 16;

/// Disklabel filesystem types (`p_fstype`)
pub mod fstype {
    pub const UNUSED: u8 = 0;
    pub const SWAP: u8 = 1;
    pub const BSDFFS: u8 = 7;
    pub const MSDOS: u8 = 8;
    pub const BSDLFS: u8 = 9;
    pub const EX2FS: u8 = 17;
    pub const NTFS: u8 = 18;
    pub const RAID: u8 = 19;
    pub const CCD: u8 = 20;
    pub const APPLEUFS: u8 = 22;
    pub const CGD: u8 = 28;
}

/// Whether an MBR type code is a BSD slice carrying a disklabel.
pub fn is_bsd_slice(os_type: u8) -> bool {
    matches!(os_type, MBR_TYPE_FREEBSD | MBR_TYPE_OPENBSD | MBR_TYPE_NETBSD)
}

/// GPT type for an MBR partition type code. BSD slices map to the
/// whole-slice type used when no disklabel can be read.
pub fn mbr_type_guid(os_type: u8) -> Option<Guid> {
    let guid = match os_type {
        0x01 | 0x04 | 0x06 | 0x07 | 0x0B | 0x0C | 0x0E => registry::MS_BASIC_DATA,
        0x27 => registry::MS_RECOVERY,
        0x82 => registry::LINUX_SWAP,
        0x83 => registry::LINUX_DATA,
        0x8E => registry::LINUX_LVM,
        MBR_TYPE_FREEBSD => registry::FREEBSD,
        MBR_TYPE_OPENBSD => registry::OPENBSD_DATA,
        0xA8 => registry::APPLE_UFS,
        MBR_TYPE_NETBSD => registry::NETBSD_FFS,
        0xAF => registry::APPLE_HFS,
        0xEF => registry::EFI_SYSTEM,
        0xFB => registry::VMWARE_VMFS,
        0xFD => registry::LINUX_RAID,
        _ => return None,
    };
    Some(guid)
}

/// Stock disklabel conversion; `None` skips the sub-partition.
pub fn disklabel_fstype_guid(fstype: u8) -> Option<Guid> {
    let guid = match fstype {
        fstype::SWAP => registry::NETBSD_SWAP,
        fstype::BSDFFS => registry::NETBSD_FFS,
        fstype::MSDOS => registry::MS_BASIC_DATA,
        fstype::BSDLFS => registry::NETBSD_LFS,
        fstype::EX2FS => registry::LINUX_DATA,
        fstype::NTFS => registry::MS_BASIC_DATA,
        fstype::RAID => registry::NETBSD_RAID,
        fstype::CCD => registry::NETBSD_CCD,
        fstype::APPLEUFS => registry::APPLE_UFS,
        fstype::CGD => registry::NETBSD_CGD,
        _ => return None,
    };
    Some(guid)
}

/// Sub-partition of a BSD disklabel
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DisklabelPartition {
    pub size: u32,
    /// Absolute sector offset on the disk.
    pub offset: u32,
    pub fstype: u8,
}

/// Parse the disklabel sector. `None` if the magics do not match.
pub fn parse_disklabel(sector: &[u8]) -> Option<Vec<DisklabelPartition>> {
    let u32_at = |off: usize| -> Option<u32> {
        let raw = sector.get(off..off + 4)?;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    };
    if u32_at(0)? != DISKLABEL_MAGIC || u32_at(DISKLABEL_MAGIC2_OFFSET)? != DISKLABEL_MAGIC {
        return None;
    }
    let count_raw = sector.get(DISKLABEL_NPARTITIONS_OFFSET..DISKLABEL_NPARTITIONS_OFFSET + 2)?;
    let count = u16::from_le_bytes([count_raw[0], count_raw[1]]) as usize;

    let mut parts = Vec::with_capacity(count);
    for i in 0..count {
        let off = DISKLABEL_PARTITIONS_OFFSET + i * DISKLABEL_PARTITION_SIZE;
        let raw = sector.get(off..off + DISKLABEL_PARTITION_SIZE)?;
        parts.push(DisklabelPartition {
            size: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            offset: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            fstype: raw[12],
        });
    }
    Some(parts)
}

#[cfg(test)]
pub(crate) fn build_disklabel(parts: &[DisklabelPartition]) -> [u8; 512] {
    let mut sector = [0u8; 512];
    sector[0..4].copy_from_slice(&DISKLABEL_MAGIC.to_le_bytes());
    sector[DISKLABEL_MAGIC2_OFFSET..DISKLABEL_MAGIC2_OFFSET + 4]
        .copy_from_slice(&DISKLABEL_MAGIC.to_le_bytes());
    sector[DISKLABEL_NPARTITIONS_OFFSET..DISKLABEL_NPARTITIONS_OFFSET + 2]
        .copy_from_slice(&(parts.len() as u16).to_le_bytes());
    for (i, p) in parts.iter().enumerate() {
        let off = DISKLABEL_PARTITIONS_OFFSET + i * DISKLABEL_PARTITION_SIZE;
        sector[off..off + 4].copy_from_slice(&p.size.to_le_bytes());
        sector[off + 4..off + 8].copy_from_slice(&p.offset.to_le_bytes());
        sector[off + 12] = p.fstype;
    }
    sector
}
