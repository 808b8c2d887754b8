//! Little-endian binary encoder with checksum-trailer blocks.
//!
//! Every metadata block of the format funnels through this writer so that a
//! block's trailing checksum always covers exactly the bytes emitted since
//! its begin mark.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::checksum::jenkins_lookup3;
use crate::error::FormatError;

/// The "undefined address" marker for 8-byte offsets.
pub const UNDEF_OFFSET: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Cursor snapshot returned by [`Encoder::begin_block`].
#[derive(Debug, Clone, Copy)]
pub struct BlockMark(usize);

/// Append-only little-endian packer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create an encoder with pre-reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the encoder, returning the accumulated bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write an 8-byte file offset.
    pub fn put_offset(&mut self, offset: u64) {
        self.put_u64(offset);
    }

    /// Write the 8-byte undefined-address marker.
    pub fn put_undef_offset(&mut self) {
        self.put_u64(UNDEF_OFFSET);
    }

    /// Write `value` zero-padded (or truncated from the high end would be a
    /// bug, so callers size `width` to fit) into `width` little-endian bytes.
    pub fn put_uint(&mut self, value: u64, width: usize) {
        debug_assert!(width == 8 || value < (1u64 << (width * 8)));
        let bytes = value.to_le_bytes();
        self.buf.extend_from_slice(&bytes[..width]);
    }

    /// Capture the current write cursor as the start of a checksummed block.
    pub fn begin_block(&self) -> BlockMark {
        BlockMark(self.buf.len())
    }

    /// Checksum everything written since `mark` and append it as a
    /// little-endian u32 trailer. Returns the checksum.
    pub fn end_block(&mut self, mark: BlockMark) -> u32 {
        let checksum = jenkins_lookup3(&self.buf[mark.0..]);
        self.put_u32(checksum);
        checksum
    }
}

/// Narrow a length to the 32 bits the format stores for it.
pub fn u32_field(value: u64) -> Result<u32, FormatError> {
    u32::try_from(value).map_err(|_| FormatError::EncodeOverflow { value })
}
