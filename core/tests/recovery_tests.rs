//! Damaged copies, recovery and media resizing

mod common;

use common::{MemoryBlockDevice, SECTOR};
use gptkit_core::disk::gpt::verify_header;
use gptkit_core::disk::mbr::{read_mbr, MasterBootRecordExt, MbrRecordExt};
use gptkit_core::disk::{CreateOptions, DiskSession, GptConfig, GptError, GptState, NewPartition};
use gptkit_core::guid::registry;

/// 100-sector disk with two partitions, closed again
fn populated() -> MemoryBlockDevice {
    let mut session =
        DiskSession::open(MemoryBlockDevice::new(100), GptConfig::deterministic(11)).unwrap();
    session.create(CreateOptions::default()).unwrap();
    session
        .add_partition(&NewPartition::new(registry::EFI_SYSTEM).size(8).label("esp"))
        .unwrap();
    session
        .add_partition(&NewPartition::new(registry::LINUX_DATA).size(16).label("root"))
        .unwrap();
    session.close().unwrap()
}

fn reopen(device: MemoryBlockDevice) -> DiskSession<MemoryBlockDevice> {
    DiskSession::open(device, GptConfig::deterministic(12)).expect("open should succeed")
}

#[test]
fn test_lost_primary_is_rebuilt_byte_for_byte() {
    let pristine = populated();
    let mut damaged = pristine.clone();
    damaged.zero_sector(1);

    let mut session = reopen(damaged);
    assert_eq!(session.state(), GptState::SecondaryOnly);
    assert_eq!(session.partitions().unwrap().len(), 2);
    assert_eq!(
        session.add_partition(&NewPartition::new(registry::LINUX_SWAP).size(4)),
        Err(GptError::InvalidState)
    );

    session.recover().unwrap();
    assert_eq!(session.state(), GptState::Valid);
    let recovered = session.close().unwrap();
    assert_eq!(recovered.data, pristine.data);
}

#[test]
fn test_lost_secondary_is_rebuilt_byte_for_byte() {
    let pristine = populated();
    let mut damaged = pristine.clone();
    // Secondary table and header both gone
    for lba in 67..100 {
        damaged.zero_sector(lba);
    }

    let mut session = reopen(damaged);
    assert_eq!(session.state(), GptState::PrimaryOnly);
    session.recover().unwrap();
    assert_eq!(session.close().unwrap().data, pristine.data);
}

#[test]
fn test_corrupt_table_invalidates_its_copy() {
    let pristine = populated();
    let mut damaged = pristine.clone();
    // Flip a byte inside the first entry of the primary table
    damaged.data[2 * SECTOR + 40] ^= 0xFF;

    let mut session = reopen(damaged);
    assert_eq!(session.state(), GptState::SecondaryOnly);
    session.recover().unwrap();
    assert_eq!(session.close().unwrap().data, pristine.data);
}

#[test]
fn test_recovery_is_idempotent() {
    let pristine = populated();
    let mut damaged = pristine.clone();
    damaged.zero_sector(1);

    let mut session = reopen(damaged);
    session.recover().unwrap();
    assert_eq!(session.recover(), Err(GptError::InvalidState));

    let mut session = reopen(session.close().unwrap());
    assert_eq!(session.state(), GptState::Valid);
    assert_eq!(session.recover(), Err(GptError::InvalidState));
    assert_eq!(session.close().unwrap().data, pristine.data);
}

#[test]
fn test_missing_protective_mbr_is_recreated() {
    let pristine = populated();
    let mut damaged = pristine.clone();
    damaged.zero_sector(0);
    damaged.zero_sector(99);

    let mut session = reopen(damaged);
    assert_eq!(session.state(), GptState::PrimaryOnly);
    session.recover().unwrap();
    let device = session.close().unwrap();
    let pmbr = read_mbr(device.sector(0)).unwrap();
    assert!(pmbr.is_protective());
    assert_eq!(pmbr.partitions[0].sectors(), 99);
}

#[test]
fn test_recover_without_any_header() {
    let mut session = reopen(MemoryBlockDevice::new(100));
    assert_eq!(session.recover(), Err(GptError::MissingHeader));
}

#[test]
fn test_grown_media_needs_resize_first() {
    let mut device = populated();
    device.set_sectors(200);

    let mut session = reopen(device);
    assert_eq!(session.state(), GptState::PrimaryOnly);
    assert_eq!(session.recover(), Err(GptError::MediaSizeChanged));

    session.resize_disk(200).unwrap();
    assert_eq!(session.state(), GptState::Valid);
    let header = session.primary_header().unwrap();
    assert_eq!(header.alternate_lba.to_u64(), 199);
    assert_eq!(header.last_usable_lba.to_u64(), 199 - 32 - 1);

    let device = session.close().unwrap();
    let secondary = verify_header(device.sector(199)).unwrap();
    assert_eq!(secondary.partition_entry_lba.to_u64(), 167);
    assert_eq!(read_mbr(device.sector(0)).unwrap().partitions[0].sectors(), 199);

    let session = reopen(device);
    assert_eq!(session.state(), GptState::Valid);
    assert_eq!(session.partitions().unwrap().len(), 2);
}

#[test]
fn test_resize_round_trip() {
    let mut device = populated();
    let original = device.clone();
    device.set_sectors(200);

    let mut session = reopen(device);
    session.resize_disk(200).unwrap();
    session.resize_disk(100).unwrap();
    assert_eq!(session.total_sectors(), 100);

    let mut device = session.close().unwrap();
    device.set_sectors(100);
    assert_eq!(device.data, original.data);
}

#[test]
fn test_shrink_refuses_to_cut_partitions() {
    let mut session =
        DiskSession::open(MemoryBlockDevice::new(200), GptConfig::deterministic(5)).unwrap();
    session.create(CreateOptions::default()).unwrap();
    session
        .add_partition(&NewPartition::new(registry::LINUX_DATA).at(34).size(60))
        .unwrap();
    assert_eq!(session.last_used_lba().unwrap(), 93);

    assert_eq!(session.resize_disk(100), Err(GptError::NotEnoughSpace));
    assert_eq!(session.resize_disk(300), Err(GptError::MediaTooSmall));
    assert_eq!(session.state(), GptState::Valid);
    assert_eq!(session.primary_header().unwrap().alternate_lba.to_u64(), 199);
}
