//! Superblock, version-2 family (v2/v3 share one layout).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum::jenkins_lookup3;
use crate::encoder::{Encoder, UNDEF_OFFSET};
use crate::error::FormatError;
use crate::signature::FILE_SIGNATURE;

/// Total size of a v2 superblock with 8-byte offsets.
pub const SUPERBLOCK_V2_SIZE: usize = 48;

/// Superblock of the version-2 family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (2 or 3).
    pub version: u8,
    /// Size of offsets in bytes.
    pub offset_size: u8,
    /// Size of lengths in bytes.
    pub length_size: u8,
    /// File consistency flags.
    pub consistency_flags: u8,
    /// File base address.
    pub base_address: u64,
    /// Superblock extension address (undefined when absent).
    pub superblock_extension_address: u64,
    /// End-of-file address.
    pub eof_address: u64,
    /// Root group object header address.
    pub root_group_address: u64,
}

impl Superblock {
    /// The superblock a freshly written file carries.
    pub fn v2(root_group_address: u64, eof_address: u64) -> Self {
        Superblock {
            version: 2,
            offset_size: 8,
            length_size: 8,
            consistency_flags: 0,
            base_address: 0,
            superblock_extension_address: UNDEF_OFFSET,
            eof_address,
            root_group_address,
        }
    }

    /// Serialize the 48-byte superblock; the trailer covers bytes 0..44.
    pub fn serialize(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(SUPERBLOCK_V2_SIZE);
        let mark = enc.begin_block();
        enc.put_bytes(&FILE_SIGNATURE);
        enc.put_u8(self.version);
        enc.put_u8(self.offset_size);
        enc.put_u8(self.length_size);
        enc.put_u8(self.consistency_flags);
        enc.put_offset(self.base_address);
        enc.put_offset(self.superblock_extension_address);
        enc.put_offset(self.eof_address);
        enc.put_offset(self.root_group_address);
        enc.end_block(mark);
        debug_assert_eq!(enc.len(), SUPERBLOCK_V2_SIZE);
        enc.into_vec()
    }

    /// Parse a v2/v3 superblock at `signature_offset`, verifying the
    /// checksum trailer.
    pub fn parse(data: &[u8], signature_offset: usize) -> Result<Superblock, FormatError> {
        let d = &data[signature_offset..];
        if d.len() < SUPERBLOCK_V2_SIZE {
            return Err(FormatError::UnexpectedEof {
                expected: SUPERBLOCK_V2_SIZE,
                available: d.len(),
            });
        }
        if d[..8] != FILE_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }

        let version = d[8];
        if version != 2 && version != 3 {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let offset_size = d[9];
        if !matches!(offset_size, 2 | 4 | 8) {
            return Err(FormatError::InvalidOffsetSize(offset_size));
        }
        let length_size = d[10];
        if !matches!(length_size, 2 | 4 | 8) {
            return Err(FormatError::InvalidLengthSize(length_size));
        }
        // 8-byte offsets are the only geometry this write path produces.
        if offset_size != 8 {
            return Err(FormatError::InvalidOffsetSize(offset_size));
        }

        let trailer_pos = 12 + 4 * 8;
        let stored = LittleEndian::read_u32(&d[trailer_pos..trailer_pos + 4]);
        let computed = jenkins_lookup3(&d[..trailer_pos]);
        if stored != computed {
            return Err(FormatError::ChecksumVerifyFailed {
                expected: stored,
                computed,
            });
        }

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            consistency_flags: d[11],
            base_address: LittleEndian::read_u64(&d[12..20]),
            superblock_extension_address: LittleEndian::read_u64(&d[20..28]),
            eof_address: LittleEndian::read_u64(&d[28..36]),
            root_group_address: LittleEndian::read_u64(&d[36..44]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_is_48_bytes_with_valid_trailer() {
        let sb = Superblock::v2(48, 2048);
        let bytes = sb.serialize();
        assert_eq!(bytes.len(), SUPERBLOCK_V2_SIZE);
        assert_eq!(&bytes[..8], &FILE_SIGNATURE);
        assert_eq!(bytes[8], 2);
        let stored = LittleEndian::read_u32(&bytes[44..48]);
        assert_eq!(stored, jenkins_lookup3(&bytes[..44]));
    }

    #[test]
    fn roundtrip() {
        let sb = Superblock::v2(48, 4096);
        let parsed = Superblock::parse(&sb.serialize(), 0).unwrap();
        assert_eq!(parsed, sb);
    }

    #[test]
    fn corrupted_trailer_detected() {
        let mut bytes = Superblock::v2(48, 4096).serialize();
        bytes[30] ^= 0x01;
        assert!(matches!(
            Superblock::parse(&bytes, 0).unwrap_err(),
            FormatError::ChecksumVerifyFailed { .. }
        ));
    }

    #[test]
    fn rejects_legacy_versions() {
        let mut bytes = Superblock::v2(48, 4096).serialize();
        bytes[8] = 0;
        assert_eq!(
            Superblock::parse(&bytes, 0).unwrap_err(),
            FormatError::UnsupportedVersion(0)
        );
    }

    #[test]
    fn accepts_version_3() {
        let mut sb = Superblock::v2(48, 4096);
        sb.version = 3;
        let parsed = Superblock::parse(&sb.serialize(), 0).unwrap();
        assert_eq!(parsed.version, 3);
    }
}
