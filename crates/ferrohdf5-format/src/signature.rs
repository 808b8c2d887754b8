//! File signature (magic bytes) detection.

use crate::error::FormatError;

/// The 8-byte file magic.
pub const FILE_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Search for the file signature at valid offsets: 0, then powers of two
/// starting at 512. Returns the byte offset where it was found.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    if data.len() >= 8 && data[..8] == FILE_SIGNATURE {
        return Ok(0);
    }

    let mut offset = 512;
    while offset + 8 <= data.len() {
        if data[offset..offset + 8] == FILE_SIGNATURE {
            return Ok(offset);
        }
        offset *= 2;
    }

    Err(FormatError::SignatureNotFound)
}
