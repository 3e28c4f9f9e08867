// Sizing helpers and segment-map accessors shared by the GPT operations

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::disk::error::GptError;
use crate::disk::gpt::{read_header, write_header, EntryTable, EntryTableMut, GptHeader};
use crate::disk::map::SegmentMap;
use crate::disk::mbr::{protective_mbr, read_mbr, write_mbr, MasterBootRecord};
use crate::disk::segment::{SegmentId, SegmentKind};

/// Round `lba` up to a multiple of `alignment` sectors.
pub fn align_lba(lba: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return lba;
    }
    lba.div_ceil(alignment) * alignment
}

/// Sectors in `size_mb` mebibytes.
pub fn mb_to_lba(size_mb: u64, sector_size: usize) -> u64 {
    (size_mb * 1024 * 1024) / sector_size as u64
}

/// Sectors needed for `count` entries of `entry_size` bytes.
pub fn table_sectors_for(count: u32, entry_size: u32, sector_size: usize) -> u64 {
    (count as u64 * entry_size as u64).div_ceil(sector_size as u64)
}

pub(crate) fn io_error<E: Debug>(err: E) -> GptError {
    log::warn!("block I/O failed: {:?}", err);
    GptError::IoError
}

/// Segment id of the first segment of `kind`.
pub(crate) fn segment_of(map: &SegmentMap, kind: SegmentKind) -> Option<SegmentId> {
    map.find_first(kind).map(|s| s.id())
}

fn missing(kind: SegmentKind) -> GptError {
    match kind {
        SegmentKind::PrimaryGptTable | SegmentKind::SecondaryGptTable => GptError::MissingTable,
        _ => GptError::MissingHeader,
    }
}

/// Decode the header held by the segment of `kind`.
pub(crate) fn header_of(map: &SegmentMap, kind: SegmentKind) -> Result<GptHeader, GptError> {
    let seg = map.find_first(kind).ok_or(missing(kind))?;
    read_header(seg.payload())
}

/// Decode, modify and re-encode a header payload in place. The self CRC is
/// left stale until the header is sealed on write.
pub(crate) fn edit_header<F>(
    map: &mut SegmentMap,
    kind: SegmentKind,
    f: F,
) -> Result<GptHeader, GptError>
where
    F: FnOnce(&mut GptHeader),
{
    let id = segment_of(map, kind).ok_or(missing(kind))?;
    let sector = map.payload_mut(id).ok_or(missing(kind))?;
    let mut header = read_header(&sector[..])?;
    f(&mut header);
    write_header(&header, &mut sector[..]);
    Ok(header)
}

/// Run `f` over the entry array of the table segment of `kind`.
pub(crate) fn with_table<F, R>(
    map: &SegmentMap,
    header: &GptHeader,
    kind: SegmentKind,
    f: F,
) -> Result<R, GptError>
where
    F: FnOnce(&EntryTable<'_>) -> R,
{
    let seg = map.find_first(kind).ok_or(missing(kind))?;
    let table = EntryTable::for_header(seg.payload(), header).ok_or(GptError::MissingTable)?;
    Ok(f(&table))
}

/// Mutable counterpart of [`with_table`].
pub(crate) fn with_table_mut<F, R>(
    map: &mut SegmentMap,
    header: &GptHeader,
    kind: SegmentKind,
    f: F,
) -> Result<R, GptError>
where
    F: FnOnce(&mut EntryTableMut<'_>) -> Result<R, GptError>,
{
    let id = segment_of(map, kind).ok_or(missing(kind))?;
    let payload = map.payload_mut(id).ok_or(missing(kind))?;
    let mut table =
        EntryTableMut::for_header(&mut payload[..], header).ok_or(GptError::MissingTable)?;
    f(&mut table)
}

/// One sector holding a protective MBR.
pub(crate) fn protective_sector(
    total_sectors: u64,
    previous: Option<&MasterBootRecord>,
    sector_size: usize,
) -> Vec<u8> {
    let mut sector = vec![0u8; sector_size];
    write_mbr(&protective_mbr(total_sectors, previous), &mut sector);
    sector
}

/// The MBR at sector 0, if one is loaded; its boot code is carried over.
pub(crate) fn previous_mbr(map: &SegmentMap) -> Option<MasterBootRecord> {
    map.segment_at(0)
        .filter(|s| matches!(s.kind(), SegmentKind::Mbr | SegmentKind::ProtectiveMbr))
        .and_then(|s| read_mbr(s.payload()).ok())
}
