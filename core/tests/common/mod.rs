//! Common test utilities and an in-memory block device

#![allow(dead_code)]

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use gptkit_core::disk::mbr::{new_record, MBR_SIGNATURE, RECORD_SIZE};
use std::io;

pub const SECTOR: usize = 512;

/// In-memory block device for testing
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
    pub block_size: usize,
}

impl MemoryBlockDevice {
    /// Zero-filled device of `sectors` 512-byte sectors
    pub fn new(sectors: usize) -> Self {
        Self {
            data: vec![0u8; sectors * SECTOR],
            block_size: SECTOR,
        }
    }

    pub fn sectors(&self) -> u64 {
        (self.data.len() / self.block_size) as u64
    }

    pub fn sector(&self, lba: u64) -> &[u8] {
        let offset = lba as usize * self.block_size;
        &self.data[offset..offset + self.block_size]
    }

    pub fn sector_mut(&mut self, lba: u64) -> &mut [u8] {
        let offset = lba as usize * self.block_size;
        &mut self.data[offset..offset + self.block_size]
    }

    pub fn zero_sector(&mut self, lba: u64) {
        self.sector_mut(lba).fill(0);
    }

    /// Grow or shrink the media, keeping the leading bytes.
    pub fn set_sectors(&mut self, sectors: usize) {
        self.data.resize(sectors * self.block_size, 0);
    }

    /// Write one partition record into the MBR/EBR at `lba` and stamp the
    /// 0xAA55 signature.
    pub fn put_record(
        &mut self,
        lba: u64,
        slot: usize,
        flag: u8,
        os_type: u8,
        start: u32,
        size: u32,
    ) {
        let sector = self.sector_mut(lba);
        let mut record = new_record(os_type, start, size);
        record.boot_indicator = flag;
        let offset = 446 + slot * RECORD_SIZE;
        sector[offset..offset + RECORD_SIZE].copy_from_slice(bytemuck::bytes_of(&record));
        sector[510..512].copy_from_slice(&MBR_SIGNATURE);
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_size as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok(self.sectors())
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
