//! Partition type registry
//!
//! Short aliases accepted on input, a one-word symbolic name and a long
//! description for display.

use uguid::guid;

use super::Guid;

#[derive(Debug, Clone, Copy)]
pub struct PartitionTypeInfo {
    /// One-word symbolic name, also accepted as an alias.
    pub name: &'static str,
    /// Extra aliases accepted by [`Guid::parse`].
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub guid: Guid,
}

pub const UNUSED: Guid = Guid::NIL;
pub const EFI_SYSTEM: Guid = Guid::from_uguid(guid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b"));
pub const BIOS_BOOT: Guid = Guid::from_uguid(guid!("21686148-6449-6e6f-744e-656564454649"));
pub const MBR_SCHEME: Guid = Guid::from_uguid(guid!("024dee41-33e7-11d3-9d69-0008c781f39f"));

pub const NETBSD_FFS: Guid = Guid::from_uguid(guid!("49f48d5a-b10e-11dc-b99b-0019d1879648"));
pub const NETBSD_LFS: Guid = Guid::from_uguid(guid!("49f48d82-b10e-11dc-b99b-0019d1879648"));
pub const NETBSD_SWAP: Guid = Guid::from_uguid(guid!("49f48d32-b10e-11dc-b99b-0019d1879648"));
pub const NETBSD_RAID: Guid = Guid::from_uguid(guid!("49f48daa-b10e-11dc-b99b-0019d1879648"));
pub const NETBSD_CCD: Guid = Guid::from_uguid(guid!("2db519c4-b10f-11dc-b99b-0019d1879648"));
pub const NETBSD_CGD: Guid = Guid::from_uguid(guid!("2db519ec-b10f-11dc-b99b-0019d1879648"));

pub const FREEBSD: Guid = Guid::from_uguid(guid!("516e7cb4-6ecf-11d6-8ff8-00022d09712b"));
pub const FREEBSD_SWAP: Guid = Guid::from_uguid(guid!("516e7cb5-6ecf-11d6-8ff8-00022d09712b"));
pub const FREEBSD_UFS: Guid = Guid::from_uguid(guid!("516e7cb6-6ecf-11d6-8ff8-00022d09712b"));
pub const FREEBSD_ZFS: Guid = Guid::from_uguid(guid!("516e7cba-6ecf-11d6-8ff8-00022d09712b"));
pub const OPENBSD_DATA: Guid = Guid::from_uguid(guid!("824cc7a0-36a8-11e3-890a-952519ad3f61"));

pub const LINUX_DATA: Guid = Guid::from_uguid(guid!("0fc63daf-8483-4772-8e79-3d69d8477de4"));
pub const LINUX_SWAP: Guid = Guid::from_uguid(guid!("0657fd6d-a4ab-43c4-84e5-0933c84b4f4f"));
pub const LINUX_RAID: Guid = Guid::from_uguid(guid!("a19d880f-05fc-4d3b-a006-743f0f84911e"));
pub const LINUX_LVM: Guid = Guid::from_uguid(guid!("e6d6d379-f507-44c2-a23c-238f2a3df928"));

pub const MS_BASIC_DATA: Guid = Guid::from_uguid(guid!("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7"));
pub const MS_RESERVED: Guid = Guid::from_uguid(guid!("e3c9e316-0b5c-4db8-817d-f92df00215ae"));
pub const MS_RECOVERY: Guid = Guid::from_uguid(guid!("de94bba4-06d1-4d40-a16a-bfd50179d6ac"));

pub const APPLE_HFS: Guid = Guid::from_uguid(guid!("48465300-0000-11aa-aa11-00306543ecac"));
pub const APPLE_UFS: Guid = Guid::from_uguid(guid!("55465300-0000-11aa-aa11-00306543ecac"));

pub const VMWARE_VMFS: Guid = Guid::from_uguid(guid!("aa31e02a-400f-11db-9590-000c2911d1b8"));

static TYPES: &[PartitionTypeInfo] = &[
    PartitionTypeInfo {
        name: "unused",
        aliases: &[],
        description: "Unused entry",
        guid: UNUSED,
    },
    PartitionTypeInfo {
        name: "efi",
        aliases: &["esp"],
        description: "EFI System",
        guid: EFI_SYSTEM,
    },
    PartitionTypeInfo {
        name: "bios",
        aliases: &["biosboot"],
        description: "BIOS Boot",
        guid: BIOS_BOOT,
    },
    PartitionTypeInfo {
        name: "mbr",
        aliases: &[],
        description: "MBR partition scheme",
        guid: MBR_SCHEME,
    },
    PartitionTypeInfo {
        name: "ffs",
        aliases: &[],
        description: "NetBSD FFSv1/FFSv2",
        guid: NETBSD_FFS,
    },
    PartitionTypeInfo {
        name: "lfs",
        aliases: &[],
        description: "NetBSD LFS",
        guid: NETBSD_LFS,
    },
    PartitionTypeInfo {
        name: "swap",
        aliases: &[],
        description: "NetBSD swap",
        guid: NETBSD_SWAP,
    },
    PartitionTypeInfo {
        name: "raid",
        aliases: &[],
        description: "NetBSD RAIDFrame component",
        guid: NETBSD_RAID,
    },
    PartitionTypeInfo {
        name: "ccd",
        aliases: &[],
        description: "NetBSD ccd component",
        guid: NETBSD_CCD,
    },
    PartitionTypeInfo {
        name: "cgd",
        aliases: &[],
        description: "NetBSD Cryptographic Disk",
        guid: NETBSD_CGD,
    },
    PartitionTypeInfo {
        name: "freebsd",
        aliases: &["fbsd"],
        description: "FreeBSD legacy",
        guid: FREEBSD,
    },
    PartitionTypeInfo {
        name: "freebsd-swap",
        aliases: &[],
        description: "FreeBSD swap",
        guid: FREEBSD_SWAP,
    },
    PartitionTypeInfo {
        name: "freebsd-ufs",
        aliases: &["ufs"],
        description: "FreeBSD UFS/UFS2",
        guid: FREEBSD_UFS,
    },
    PartitionTypeInfo {
        name: "freebsd-zfs",
        aliases: &["zfs"],
        description: "FreeBSD ZFS",
        guid: FREEBSD_ZFS,
    },
    PartitionTypeInfo {
        name: "openbsd",
        aliases: &[],
        description: "OpenBSD data",
        guid: OPENBSD_DATA,
    },
    PartitionTypeInfo {
        name: "linux-data",
        aliases: &["linux"],
        description: "Linux data",
        guid: LINUX_DATA,
    },
    PartitionTypeInfo {
        name: "linux-swap",
        aliases: &[],
        description: "Linux swap",
        guid: LINUX_SWAP,
    },
    PartitionTypeInfo {
        name: "linux-raid",
        aliases: &[],
        description: "Linux RAID",
        guid: LINUX_RAID,
    },
    PartitionTypeInfo {
        name: "linux-lvm",
        aliases: &["lvm"],
        description: "Linux LVM",
        guid: LINUX_LVM,
    },
    PartitionTypeInfo {
        name: "windows",
        aliases: &["ms-basic-data", "fat32", "ntfs"],
        description: "Windows basic data",
        guid: MS_BASIC_DATA,
    },
    PartitionTypeInfo {
        name: "ms-reserved",
        aliases: &["msr"],
        description: "Windows reserved",
        guid: MS_RESERVED,
    },
    PartitionTypeInfo {
        name: "ms-recovery",
        aliases: &[],
        description: "Windows recovery",
        guid: MS_RECOVERY,
    },
    PartitionTypeInfo {
        name: "hfs",
        aliases: &["apple"],
        description: "Apple HFS",
        guid: APPLE_HFS,
    },
    PartitionTypeInfo {
        name: "apple-ufs",
        aliases: &[],
        description: "Apple UFS",
        guid: APPLE_UFS,
    },
    PartitionTypeInfo {
        name: "vmfs",
        aliases: &[],
        description: "VMware VMFS",
        guid: VMWARE_VMFS,
    },
];

/// Find a type by symbolic name or alias (ASCII case-insensitive).
pub fn lookup(alias: &str) -> Option<&'static PartitionTypeInfo> {
    TYPES.iter().find(|info| {
        info.name.eq_ignore_ascii_case(alias)
            || info.aliases.iter().any(|a| a.eq_ignore_ascii_case(alias))
    })
}

pub fn describe(guid: &Guid) -> Option<&'static PartitionTypeInfo> {
    TYPES.iter().find(|info| info.guid == *guid)
}

/// Symbolic name if the GUID is a known type.
pub fn symbolic_name(guid: &Guid) -> Option<&'static str> {
    describe(guid).map(|info| info.name)
}

/// Long description, or `"Unknown"`.
pub fn long_name(guid: &Guid) -> &'static str {
    describe(guid).map_or("Unknown", |info| info.description)
}

pub fn iter() -> impl Iterator<Item = &'static PartitionTypeInfo> {
    TYPES.iter()
}
