//! CRC-32 used for GPT header and partition array checksums
//!
//! The reflected IEEE polynomial (0xEDB88320), initial value all-ones and
//! final value complemented, which the `crc` catalog names ISO-HDLC. This is
//! the same algorithm `gpt_disk_types` seals headers and entry arrays with.

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Running checksum, for data that is not contiguous.
pub fn digest() -> Digest<'static, u32> {
    CRC32.digest()
}

/// Checksum a whole buffer.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
