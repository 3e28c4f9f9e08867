// Text backups of a GPT in an sfdisk-like script format

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use gpt_disk_io::BlockIo;

use super::utils::with_table_mut;
use super::{DiskSession, GptState};
use crate::disk::error::GptError;
use crate::disk::gpt::{new_entry, GPT_ENTRY_MIN_SIZE};
use crate::disk::segment::SegmentKind;
use crate::guid::Guid;

/// One partition of a [`DiskBackup`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupEntry {
    /// 1-based entry slot
    pub ordinal: u32,
    pub start: u64,
    pub size: u64,
    pub type_guid: Guid,
    pub unique_guid: Guid,
    pub attributes: u64,
    pub name: String,
}

/// Everything needed to rebuild a GPT on a disk of the same or larger size
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskBackup {
    pub disk_guid: Guid,
    pub total_sectors: u64,
    pub sector_size: u32,
    pub entry_count: u32,
    pub entry_size: u32,
    pub first_usable: u64,
    pub last_usable: u64,
    pub entries: Vec<BackupEntry>,
}

impl DiskBackup {
    /// Render as a script:
    ///
    /// ```text
    /// label: gpt
    /// label-id: <guid>
    /// device-sectors: 200
    /// ...
    ///
    /// 1 : start=34, size=10, type=<guid>, uuid=<guid>, attrs=0x0, name="boot"
    /// ```
    pub fn to_script(&self) -> String {
        self.to_string()
    }

    /// Write the script form of [`DiskBackup::to_script`] into `out`.
    pub fn write_script(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "label: gpt")?;
        writeln!(out, "label-id: {}", self.disk_guid)?;
        writeln!(out, "device-sectors: {}", self.total_sectors)?;
        writeln!(out, "sector-size: {}", self.sector_size)?;
        writeln!(out, "first-lba: {}", self.first_usable)?;
        writeln!(out, "last-lba: {}", self.last_usable)?;
        writeln!(out, "table-length: {}", self.entry_count)?;
        writeln!(out, "entry-size: {}", self.entry_size)?;
        writeln!(out)?;
        for e in &self.entries {
            writeln!(
                out,
                "{} : start={}, size={}, type={}, uuid={}, attrs={:#x}, name=\"{}\"",
                e.ordinal, e.start, e.size, e.type_guid, e.unique_guid, e.attributes, e.name
            )?;
        }
        Ok(())
    }

    /// Parse a script produced by [`DiskBackup::to_script`].
    ///
    /// Type fields accept aliases as well as GUIDs. Unknown header keys
    /// are ignored; unknown partition fields are not.
    pub fn parse(script: &str) -> Result<Self, GptError> {
        let mut backup = DiskBackup {
            disk_guid: Guid::NIL,
            total_sectors: 0,
            sector_size: 512,
            entry_count: 128,
            entry_size: GPT_ENTRY_MIN_SIZE,
            first_usable: 0,
            last_usable: 0,
            entries: Vec::new(),
        };
        let mut label_seen = false;

        for line in script.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((ordinal, fields)) = line.split_once(" : ") {
                let ordinal = parse_u32(ordinal.trim())?;
                backup.entries.push(parse_entry(ordinal, fields)?);
                continue;
            }

            let (key, value) = line.split_once(':').ok_or(GptError::InvalidBackup)?;
            let value = value.trim();
            match key.trim() {
                "label" => {
                    if value != "gpt" {
                        return Err(GptError::InvalidBackup);
                    }
                    label_seen = true;
                }
                "label-id" => backup.disk_guid = Guid::parse_canonical(value)?,
                "device-sectors" => backup.total_sectors = parse_number(value)?,
                "sector-size" => backup.sector_size = parse_u32(value)?,
                "first-lba" => backup.first_usable = parse_number(value)?,
                "last-lba" => backup.last_usable = parse_number(value)?,
                "table-length" => backup.entry_count = parse_u32(value)?,
                "entry-size" => backup.entry_size = parse_u32(value)?,
                other => log::debug!("ignoring backup key {}", other),
            }
        }

        if !label_seen || backup.entry_count == 0 {
            return Err(GptError::InvalidBackup);
        }
        if backup.entry_size < GPT_ENTRY_MIN_SIZE || !backup.entry_size.is_power_of_two() {
            return Err(GptError::InvalidBackup);
        }
        Ok(backup)
    }
}

impl fmt::Display for DiskBackup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_script(f)
    }
}

fn parse_number(text: &str) -> Result<u64, GptError> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| GptError::InvalidBackup)
}

fn parse_u32(text: &str) -> Result<u32, GptError> {
    u32::try_from(parse_number(text)?).map_err(|_| GptError::InvalidBackup)
}

fn parse_entry(ordinal: u32, fields: &str) -> Result<BackupEntry, GptError> {
    // The name may contain commas, so it is cut off before splitting
    let (fields, name) = match fields.find("name=\"") {
        Some(at) => {
            let quoted = &fields[at + 6..];
            let end = quoted.rfind('"').ok_or(GptError::InvalidBackup)?;
            (&fields[..at], quoted[..end].to_string())
        }
        None => (fields, String::new()),
    };

    let mut entry = BackupEntry {
        ordinal,
        start: 0,
        size: 0,
        type_guid: Guid::NIL,
        unique_guid: Guid::NIL,
        attributes: 0,
        name,
    };
    for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = field.split_once('=').ok_or(GptError::InvalidBackup)?;
        let value = value.trim();
        match key.trim() {
            "start" => entry.start = parse_number(value)?,
            "size" => entry.size = parse_number(value)?,
            "type" => entry.type_guid = Guid::parse(value)?,
            "uuid" => entry.unique_guid = Guid::parse_canonical(value)?,
            "attrs" => entry.attributes = parse_number(value)?,
            _ => return Err(GptError::InvalidBackup),
        }
    }

    if ordinal == 0 || entry.size == 0 || entry.type_guid.is_nil() {
        return Err(GptError::InvalidBackup);
    }
    Ok(entry)
}

impl<B: BlockIo> DiskSession<B> {
    /// Snapshot of the primary table.
    pub fn backup(&self) -> Result<DiskBackup, GptError> {
        self.require_valid()?;
        let header = self.primary_header().ok_or(GptError::MissingHeader)?;
        let entries = self
            .partitions()?
            .into_iter()
            .filter_map(|p| {
                Some(BackupEntry {
                    ordinal: p.index,
                    start: p.start_lba,
                    size: p.size_lba()?,
                    type_guid: p.partition_type,
                    unique_guid: p.unique_guid,
                    attributes: p.attributes,
                    name: p.name,
                })
            })
            .collect();

        Ok(DiskBackup {
            disk_guid: header.disk_guid.into(),
            total_sectors: self.total_sectors,
            sector_size: self.sector_size as u32,
            entry_count: header.number_of_partition_entries.to_u32(),
            entry_size: header.size_of_partition_entry.to_u32(),
            first_usable: header.first_usable_lba.to_u64(),
            last_usable: header.last_usable_lba.to_u64(),
            entries,
        })
    }

    /// Write the GPT described by `backup`, replacing whatever the disk
    /// holds. The layout is recomputed for the current disk size, so a
    /// backup taken on a smaller disk restores onto a larger one. Fails
    /// with `InvalidBackup` when a partition does not fit or two overlap.
    pub fn restore(&mut self, backup: &DiskBackup) -> Result<(), GptError> {
        if backup.sector_size as usize != self.sector_size {
            log::warn!(
                "backup uses {}-byte sectors, disk has {}",
                backup.sector_size,
                self.sector_size
            );
            return Err(GptError::InvalidBackup);
        }

        let (mut map, header, pmbr) =
            self.fresh_layout(backup.disk_guid, backup.entry_count, backup.entry_size)?;

        for e in &backup.entries {
            let end = match e.start.checked_add(e.size) {
                Some(past) if e.size > 0 => past - 1,
                _ => return Err(GptError::InvalidBackup),
            };
            if e.ordinal == 0
                || e.ordinal > backup.entry_count
                || e.start < header.first_usable_lba.to_u64()
                || end > header.last_usable_lba.to_u64()
            {
                log::warn!("partition {} at LBA {}..{} does not fit", e.ordinal, e.start, end);
                return Err(GptError::InvalidBackup);
            }
            let kind = SegmentKind::GptPartition;
            map.add_region(e.start, e.size, kind, Vec::new(), Some(e.ordinal))
                .map_err(|err| {
                    log::warn!("partition {} rejected: {}", e.ordinal, err);
                    GptError::InvalidBackup
                })?;
            let entry =
                new_entry(e.type_guid, e.unique_guid, e.start, end, e.attributes, &e.name);
            with_table_mut(&mut map, &header, SegmentKind::PrimaryGptTable, |t| {
                if t.as_table().get(e.ordinal - 1).map_or(false, |old| old.is_used()) {
                    return Err(GptError::InvalidBackup);
                }
                t.set(e.ordinal - 1, &entry)
            })?;
        }
        self.map = map;
        self.write_header_pair()?;
        self.write_sectors(0, &pmbr)?;
        self.flush()?;
        self.state = GptState::Valid;
        log::info!("restored {} partitions", backup.entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::MemDisk;
    use super::super::{CreateOptions, NewPartition};
    use super::*;
    use crate::disk::config::GptConfig;
    use crate::disk::gpt::attributes;
    use crate::guid::registry;
    use alloc::format;

    fn populated() -> DiskSession<MemDisk> {
        let mut session =
            DiskSession::open(MemDisk::new(200), GptConfig::deterministic(9)).unwrap();
        session.create(CreateOptions::default()).unwrap();
        session
            .add_partition(
                &NewPartition::new(registry::EFI_SYSTEM)
                    .size(20)
                    .label("boot, esp")
                    .attributes(attributes::REQUIRED),
            )
            .unwrap();
        session
            .add_partition(&NewPartition::new(registry::LINUX_DATA).at(80).size(40))
            .unwrap();
        session
    }

    #[test]
    fn test_script_round_trip() {
        let session = populated();
        let backup = session.backup().unwrap();
        assert_eq!(backup.entries.len(), 2);
        let script = backup.to_script();
        assert!(script.starts_with("label: gpt\n"));
        assert!(script.contains("name=\"boot, esp\""));
        assert_eq!(DiskBackup::parse(&script).unwrap(), backup);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(DiskBackup::parse(""), Err(GptError::InvalidBackup));
        assert_eq!(DiskBackup::parse("label: dos\n"), Err(GptError::InvalidBackup));
        assert_eq!(
            DiskBackup::parse("label: gpt\n\n1 : start=34, size=10, type=linux, color=red\n"),
            Err(GptError::InvalidBackup)
        );
        let parsed = DiskBackup::parse("label: gpt\n\n2 : start=40, size=8, type=swap\n").unwrap();
        assert_eq!(parsed.entries[0].type_guid, registry::NETBSD_SWAP);
        assert_eq!(parsed.entries[0].ordinal, 2);
    }

    #[test]
    fn test_restore_onto_larger_disk() {
        let backup = populated().backup().unwrap();

        let mut target = DiskSession::open(MemDisk::new(400), GptConfig::deterministic(3)).unwrap();
        target.restore(&backup).unwrap();
        assert_eq!(target.state(), GptState::Valid);
        let restored = target.backup().unwrap();
        assert_eq!(restored.entries, backup.entries);
        assert_eq!(restored.disk_guid, backup.disk_guid);
        assert_eq!(restored.last_usable, 400 - 1 - 32 - 1);

        let reopened = DiskSession::open(target.close().unwrap(), GptConfig::default()).unwrap();
        assert_eq!(reopened.state(), GptState::Valid);
        assert_eq!(reopened.partitions().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_rejects_what_does_not_fit() {
        let mut backup = populated().backup().unwrap();
        let mut small = DiskSession::open(MemDisk::new(100), GptConfig::deterministic(3)).unwrap();
        assert_eq!(small.restore(&backup), Err(GptError::InvalidBackup));
        assert_eq!(small.state(), GptState::Headerless);

        backup.entries[1].start = backup.entries[0].start + 5;
        let mut same = DiskSession::open(MemDisk::new(200), GptConfig::deterministic(3)).unwrap();
        assert_eq!(same.restore(&backup), Err(GptError::InvalidBackup));
    }

    #[test]
    fn test_oversized_header_fields_are_rejected() {
        let script = populated().backup().unwrap().to_script();
        for (key, value) in [
            ("table-length", "4294967424"),
            ("entry-size", "0x100000080"),
            ("sector-size", "4294967808"),
        ] {
            let current = script
                .lines()
                .find(|l| l.starts_with(key))
                .unwrap()
                .to_string();
            let patched = script.replace(&current, &format!("{}: {}", key, value));
            assert_eq!(DiskBackup::parse(&patched), Err(GptError::InvalidBackup), "{}", key);
        }
        let wrapped_ordinal = script.replace("\n1 : ", "\n4294967297 : ");
        assert_eq!(DiskBackup::parse(&wrapped_ordinal), Err(GptError::InvalidBackup));
    }

    #[test]
    fn test_reversed_entry_is_left_out() {
        let mut disk = populated().close().unwrap();
        // Second partition now ends before it starts
        for (table_lba, header_lba) in [(2, 1), (167, 199)] {
            disk.set_entry_range(table_lba, 1, 120, 80);
            disk.reseal(header_lba);
        }

        let session = DiskSession::open(disk, GptConfig::deterministic(9)).unwrap();
        assert_eq!(session.state(), GptState::Valid);
        let parts = session.partitions().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].partition_type, registry::EFI_SYSTEM);
        let backup = session.backup().unwrap();
        assert_eq!(backup.entries.len(), 1);
        assert_eq!(backup.entries[0].ordinal, 1);
    }
}
