//! GUID codec
//!
//! GPT stores GUIDs in the EFI mixed-endian layout: the first three fields
//! little-endian, the trailing eight bytes verbatim. [`Guid`] wraps
//! `uguid::Guid`, which keeps exactly that byte order, so it converts to and
//! from the GUID fields of the `gpt_disk_types` structures for free.

mod generate;
pub mod registry;

pub use generate::{stalled_clock, ClockFn, GuidGenerator};
#[cfg(feature = "std")]
pub use generate::system_clock;

use core::fmt;
use core::str::FromStr;

/// Errors from [`Guid::parse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidParseError {
    /// Neither a known alias nor `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    InvalidFormat,
    /// Variant bits select the reserved (111x) variant
    InvalidVariant,
}

impl GuidParseError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "Invalid GUID format",
            Self::InvalidVariant => "Invalid GUID variant",
        }
    }
}

impl fmt::Display for GuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A GPT GUID in its on-disk byte order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Guid(uguid::Guid);

impl Guid {
    /// The all-zero GUID; marks an unused partition entry.
    pub const NIL: Guid = Guid(uguid::Guid::ZERO);

    pub const fn from_uguid(guid: uguid::Guid) -> Self {
        Self(guid)
    }

    pub const fn to_uguid(self) -> uguid::Guid {
        self.0
    }

    pub const fn from_fields(
        time_low: u32,
        time_mid: u16,
        time_hi_and_version: u16,
        clock_seq_and_node: [u8; 8],
    ) -> Self {
        let low = time_low.to_le_bytes();
        let mid = time_mid.to_le_bytes();
        let hi = time_hi_and_version.to_le_bytes();
        let tail = clock_seq_and_node;
        Self::decode(&[
            low[0], low[1], low[2], low[3], mid[0], mid[1], hi[0], hi[1], tail[0], tail[1],
            tail[2], tail[3], tail[4], tail[5], tail[6], tail[7],
        ])
    }

    /// Decode the 16 on-disk bytes.
    pub const fn decode(bytes: &[u8; 16]) -> Self {
        Self(uguid::Guid::from_bytes(*bytes))
    }

    /// Decode from the start of a slice; `None` if it holds fewer than 16 bytes.
    pub fn decode_slice(bytes: &[u8]) -> Option<Self> {
        let raw: &[u8; 16] = bytes.get(..16)?.try_into().ok()?;
        Some(Self::decode(raw))
    }

    /// Encode to the 16 on-disk bytes.
    pub const fn encode(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Parse a type alias (`efi`, `linux`, ...) or a canonical GUID string.
    pub fn parse(text: &str) -> Result<Self, GuidParseError> {
        let text = text.trim();
        if let Some(info) = registry::lookup(text) {
            return Ok(info.guid);
        }
        Self::parse_canonical(text)
    }

    /// Parse only the `8-4-4-4-12` hex form.
    pub fn parse_canonical(text: &str) -> Result<Self, GuidParseError> {
        let parsed: uguid::Guid = text.parse().map_err(|_| GuidParseError::InvalidFormat)?;
        let guid = Self(parsed);
        // Variants 0 (0xxx), 1 (10xx) and 2 (110x) are accepted, 111x is reserved.
        if guid.clock_seq_high() & 0xE0 == 0xE0 {
            return Err(GuidParseError::InvalidVariant);
        }
        Ok(guid)
    }

    /// Version nibble of `time_hi_and_version`.
    pub fn version(&self) -> u8 {
        self.encode()[7] >> 4
    }

    /// First clock sequence byte; its top bits hold the variant.
    pub fn clock_seq_high(&self) -> u8 {
        self.encode()[8]
    }

    /// The six node bytes.
    pub fn node(&self) -> [u8; 6] {
        let bytes = self.encode();
        [bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]]
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::NIL
    }
}

impl From<uguid::Guid> for Guid {
    fn from(guid: uguid::Guid) -> Self {
        Self(guid)
    }
}

impl From<Guid> for uguid::Guid {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Guid {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_round_trip_bytes() {
        let samples: [[u8; 16]; 3] = [
            [0; 16],
            [0xFF; 16],
            [
                0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11, 0xba, 0x4b, 0x00, 0xa0, 0xc9,
                0x3e, 0xc9, 0x3b,
            ],
        ];
        for bytes in samples {
            assert_eq!(Guid::decode(&bytes).encode(), bytes);
        }
        let mut counting = [0u8; 16];
        for (i, b) in counting.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(Guid::decode(&counting).encode(), counting);
    }

    #[test]
    fn test_mixed_endian_layout() {
        // EFI System Partition as stored on disk
        let bytes = [
            0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11, 0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e,
            0xc9, 0x3b,
        ];
        let guid = Guid::decode(&bytes);
        let tail = [0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9, 0x3b];
        assert_eq!(guid, Guid::from_fields(0xc12a7328, 0xf81f, 0x11d2, tail));
        assert_eq!(guid.version(), 1);
        assert_eq!(guid.to_string(), "c12a7328-f81f-11d2-ba4b-00a0c93ec93b");
    }

    #[test]
    fn test_parse_canonical_and_alias() {
        let parsed = Guid::parse("C12A7328-F81F-11D2-BA4B-00A0C93EC93B").unwrap();
        assert_eq!(parsed, registry::EFI_SYSTEM);
        assert_eq!(Guid::parse("efi").unwrap(), registry::EFI_SYSTEM);
        assert_eq!(Guid::parse("linux").unwrap(), registry::LINUX_DATA);
    }

    #[test]
    fn test_parse_rejects_garbage_and_reserved_variant() {
        assert_eq!(Guid::parse("not-a-guid"), Err(GuidParseError::InvalidFormat));
        assert_eq!(
            Guid::parse("c12a7328-f81f-11d2-ea4b-00a0c93ec93b"),
            Err(GuidParseError::InvalidVariant)
        );
        // Microsoft variant (110x) is accepted
        assert!(Guid::parse("c12a7328-f81f-11d2-ca4b-00a0c93ec93b").is_ok());
    }
}
