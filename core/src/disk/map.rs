//! Segment map: ordered interval allocator over the sector address space
//!
//! The map always covers `[0, total_sectors)` with ordered, non-overlapping,
//! gap-free segments and never holds two adjacent `Unused` segments. Every
//! mutator checks its preconditions before touching the vector, so a
//! returned error leaves the map exactly as it was.

use alloc::vec::Vec;

use super::error::MapError;
use super::segment::{Segment, SegmentId, SegmentKind};

/// Sectors never handed out by `allocate_free` (MBR and primary header).
pub const RESERVED_SECTORS: u64 = 2;

fn round_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

fn round_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value / alignment * alignment
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentMap {
    segments: Vec<Segment>,
    total_sectors: u64,
    next_id: u32,
}

impl SegmentMap {
    /// A map holding a single `Unused` segment over the whole disk.
    pub fn new(total_sectors: u64) -> Self {
        let mut map = Self {
            segments: Vec::new(),
            total_sectors,
            next_id: 0,
        };
        if total_sectors > 0 {
            let id = map.alloc_id();
            map.segments.push(Segment::unused(id, 0, total_sectors));
        }
        map
    }

    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter()
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn find_first(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == kind)
    }

    pub fn find_all(&self, kind: SegmentKind) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().filter(move |s| s.kind == kind)
    }

    /// Segment covering `lba`.
    pub fn segment_at(&self, lba: u64) -> Option<&Segment> {
        self.index_containing(lba).map(|i| &self.segments[i])
    }

    /// Replace the payload of a segment.
    pub fn set_payload(&mut self, id: SegmentId, payload: Vec<u8>) -> Result<(), MapError> {
        let idx = self.index_of(id).ok_or(MapError::NotFound)?;
        self.segments[idx].payload = payload;
        Ok(())
    }

    pub(crate) fn payload_mut(&mut self, id: SegmentId) -> Option<&mut Vec<u8>> {
        let idx = self.index_of(id)?;
        Some(&mut self.segments[idx].payload)
    }

    pub(crate) fn set_ordinal(
        &mut self,
        id: SegmentId,
        ordinal: Option<u32>,
    ) -> Result<(), MapError> {
        let idx = self.index_of(id).ok_or(MapError::NotFound)?;
        self.segments[idx].ordinal = ordinal;
        Ok(())
    }

    fn alloc_id(&mut self) -> SegmentId {
        let id = SegmentId(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    fn index_containing(&self, lba: u64) -> Option<usize> {
        if lba >= self.total_sectors {
            return None;
        }
        let after = self.segments.partition_point(|s| s.start <= lba);
        after.checked_sub(1)
    }

    /// Claim `[start, start + length)` for `kind`.
    ///
    /// The range must sit inside one `Unused` segment, or exactly match an
    /// `MbrPartition` that is being reclassified as `GptPartition`.
    pub fn add_region(
        &mut self,
        start: u64,
        length: u64,
        kind: SegmentKind,
        payload: Vec<u8>,
        ordinal: Option<u32>,
    ) -> Result<SegmentId, MapError> {
        let end = start.checked_add(length).ok_or(MapError::OutOfRange)?;
        if length == 0 || end > self.total_sectors || kind.is_unused() {
            return Err(MapError::OutOfRange);
        }
        let idx = self.index_containing(start).ok_or(MapError::OutOfRange)?;
        let host = &self.segments[idx];

        if !host.kind.is_unused() {
            let exact = host.start == start && host.length == length;
            if exact && host.kind.is_mbr_partition() && kind == SegmentKind::GptPartition {
                let seg = &mut self.segments[idx];
                seg.kind = kind;
                seg.payload = payload;
                seg.ordinal = ordinal;
                return Ok(seg.id);
            }
            return Err(MapError::Overlap);
        }
        if end > host.end() {
            return Err(MapError::Overlap);
        }

        let (host_id, host_start, host_end) = (host.id, host.start, host.end());
        let id = self.alloc_id();
        let mut pieces = Vec::with_capacity(3);
        if start > host_start {
            pieces.push(Segment::unused(host_id, host_start, start - host_start));
        }
        pieces.push(Segment {
            id,
            start,
            length,
            kind,
            payload,
            ordinal,
        });
        if host_end > end {
            let tail_id = self.alloc_id();
            pieces.push(Segment::unused(tail_id, end, host_end - end));
        }
        self.segments.splice(idx..=idx, pieces);
        Ok(id)
    }

    /// Carve a `GptPartition` out of free space.
    ///
    /// `alignment` rounds the start up and the size down. A `size_hint` of 0
    /// takes everything the first fitting segment offers. With a
    /// `start_hint`, only the unused segment reaching past the hint is
    /// considered.
    pub fn allocate_free(
        &mut self,
        start_hint: Option<u64>,
        size_hint: u64,
        alignment: u64,
    ) -> Result<SegmentId, MapError> {
        let hint = start_hint.map(|s| round_up(s, alignment));
        let size = round_down(size_hint, alignment);
        if size_hint > 0 && size == 0 {
            return Err(MapError::NoSpace);
        }

        let mut found = None;
        for seg in self.segments.iter().filter(|s| s.kind.is_unused()) {
            let usable_start = seg.start.max(RESERVED_SECTORS);
            if usable_start >= seg.end() {
                continue;
            }
            let begin = match hint {
                Some(hint) => {
                    if seg.end() <= hint {
                        continue;
                    }
                    if usable_start > hint {
                        return Err(MapError::NoSpace);
                    }
                    hint
                }
                None => round_up(usable_start, alignment),
            };
            if begin >= seg.end() {
                continue;
            }
            let avail = seg.end() - begin;
            let take = if size == 0 { round_down(avail, alignment) } else { size };
            if take == 0 || take > avail {
                if hint.is_some() {
                    return Err(MapError::NoSpace);
                }
                continue;
            }
            found = Some((begin, take));
            break;
        }

        let (begin, take) = found.ok_or(MapError::NoSpace)?;
        self.add_region(begin, take, SegmentKind::GptPartition, Vec::new(), None)
    }

    /// Change the length of a segment by trading sectors with the segment
    /// that follows it.
    ///
    /// `new_length == 0` grows into the whole following `Unused` segment.
    /// Returns the resulting length after alignment.
    pub fn resize(
        &mut self,
        id: SegmentId,
        new_length: u64,
        alignment: u64,
    ) -> Result<u64, MapError> {
        let idx = self.index_of(id).ok_or(MapError::NotFound)?;
        if self.segments[idx].kind.is_unused() {
            return Err(MapError::NotFound);
        }
        let current = self.segments[idx].length;
        let next_free = self
            .segments
            .get(idx + 1)
            .filter(|n| n.kind.is_unused())
            .map_or(0, |n| n.length);

        let wanted = if new_length == 0 {
            current + next_free
        } else {
            new_length
        };
        let target = round_down(wanted, alignment);
        if target == 0 {
            return Err(MapError::CannotShrink);
        }

        if target > current {
            let extra = target - current;
            if extra > next_free {
                return Err(MapError::CannotGrow);
            }
            self.segments[idx].length = target;
            let next = &mut self.segments[idx + 1];
            next.start += extra;
            next.length -= extra;
            if next.length == 0 {
                self.segments.remove(idx + 1);
            }
        } else if target < current {
            let freed = current - target;
            self.segments[idx].length = target;
            if next_free > 0 {
                let next = &mut self.segments[idx + 1];
                next.start -= freed;
                next.length += freed;
            } else {
                let tail_id = self.alloc_id();
                let tail_start = self.segments[idx].end();
                self.segments
                    .insert(idx + 1, Segment::unused(tail_id, tail_start, freed));
            }
        }
        Ok(target)
    }

    /// Return a segment to `Unused`, merging it with unused neighbours.
    pub fn free(&mut self, id: SegmentId) -> Result<(), MapError> {
        let mut idx = self.index_of(id).ok_or(MapError::NotFound)?;
        {
            let seg = &mut self.segments[idx];
            seg.kind = SegmentKind::Unused;
            seg.payload = Vec::new();
            seg.ordinal = None;
        }
        if idx + 1 < self.segments.len() && self.segments[idx + 1].kind.is_unused() {
            let next = self.segments.remove(idx + 1);
            self.segments[idx].length += next.length;
        }
        if idx > 0 && self.segments[idx - 1].kind.is_unused() {
            let seg = self.segments.remove(idx);
            idx -= 1;
            self.segments[idx].length += seg.length;
        }
        Ok(())
    }

    /// Grow or shrink the address space. Shrinking only cuts `Unused` sectors.
    pub fn resize_media(&mut self, new_total: u64) -> Result<(), MapError> {
        if new_total == 0 {
            return Err(MapError::OutOfRange);
        }
        if new_total > self.total_sectors {
            let extra = new_total - self.total_sectors;
            match self.segments.last_mut() {
                Some(last) if last.kind.is_unused() => last.length += extra,
                _ => {
                    let id = self.alloc_id();
                    let start = self.total_sectors;
                    self.segments.push(Segment::unused(id, start, extra));
                }
            }
        } else if new_total < self.total_sectors {
            let blocked = self
                .segments
                .iter()
                .any(|s| s.end() > new_total && !s.kind.is_unused());
            if blocked {
                return Err(MapError::CannotShrink);
            }
            self.segments.retain(|s| s.start < new_total);
            if let Some(last) = self.segments.last_mut() {
                last.length = new_total - last.start;
            }
        }
        self.total_sectors = new_total;
        Ok(())
    }

    /// Verify the coverage invariants.
    pub fn check(&self) -> Result<(), &'static str> {
        let mut expected = 0u64;
        let mut prev_unused = false;
        for seg in &self.segments {
            if seg.length == 0 {
                return Err("zero-length segment");
            }
            if seg.start != expected {
                return Err("gap or overlap between segments");
            }
            if prev_unused && seg.kind.is_unused() {
                return Err("adjacent unused segments");
            }
            prev_unused = seg.kind.is_unused();
            expected = seg.end();
        }
        if expected != self.total_sectors {
            return Err("segments do not cover the disk");
        }
        Ok(())
    }
}
