//! Attribute info messages (message type 0x0015).
//!
//! The attribute info message is the pointer from an object header to dense
//! attribute storage: the fractal heap holding the encoded attributes and
//! the B-tree v2 indexing them by name hash.

use crate::encoder::{Encoder, UNDEF_OFFSET};
use crate::error::FormatError;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Attribute info message, version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfoMessage {
    /// Maximum creation-order index, when creation-order tracking is on.
    pub max_creation_index: Option<u16>,
    /// Address of the fractal heap storing attribute messages.
    pub fractal_heap_address: Option<u64>,
    /// Address of the B-tree v2 (type 8) name index.
    pub btree_name_index_address: Option<u64>,
    /// Address of the B-tree v2 (type 9) creation-order index.
    pub btree_creation_order_address: Option<u64>,
}

impl AttributeInfoMessage {
    /// The message dense storage emits: heap + name index, no
    /// creation-order tracking.
    pub fn dense(fractal_heap_address: u64, btree_name_index_address: u64) -> Self {
        AttributeInfoMessage {
            max_creation_index: None,
            fractal_heap_address: Some(fractal_heap_address),
            btree_name_index_address: Some(btree_name_index_address),
            btree_creation_order_address: None,
        }
    }

    /// Serialize the message body. Fields gated by clear flag bits are
    /// omitted entirely.
    pub fn serialize(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.max_creation_index.is_some() {
            flags |= 0x01;
        }
        if self.btree_creation_order_address.is_some() {
            flags |= 0x02;
        }

        let mut enc = Encoder::with_capacity(2 + 2 + 3 * 8);
        enc.put_u8(0); // version
        enc.put_u8(flags);
        if let Some(idx) = self.max_creation_index {
            enc.put_u16(idx);
        }
        enc.put_offset(self.fractal_heap_address.unwrap_or(UNDEF_OFFSET));
        enc.put_offset(self.btree_name_index_address.unwrap_or(UNDEF_OFFSET));
        if let Some(addr) = self.btree_creation_order_address {
            enc.put_offset(addr);
        }
        enc.into_vec()
    }

    /// Parse a version-0 message body.
    pub fn parse(data: &[u8], offset_size: u8) -> Result<AttributeInfoMessage, FormatError> {
        if data.len() < 2 {
            return Err(FormatError::UnexpectedEof {
                expected: 2,
                available: data.len(),
            });
        }
        let version = data[0];
        if version != 0 {
            return Err(FormatError::InvalidAttributeInfoVersion(version));
        }
        let flags = data[1];
        let mut pos = 2;

        let max_creation_index = if flags & 0x01 != 0 {
            ensure(data, pos, 2)?;
            let v = u16::from_le_bytes([data[pos], data[pos + 1]]);
            pos += 2;
            Some(v)
        } else {
            None
        };

        let fh_addr = read_offset(data, pos, offset_size)?;
        pos += offset_size as usize;
        let btree_addr = read_offset(data, pos, offset_size)?;
        pos += offset_size as usize;

        let btree_creation_order_address = if flags & 0x02 != 0 {
            let addr = read_offset(data, pos, offset_size)?;
            defined(addr, offset_size)
        } else {
            None
        };

        Ok(AttributeInfoMessage {
            max_creation_index,
            fractal_heap_address: defined(fh_addr, offset_size),
            btree_name_index_address: defined(btree_addr, offset_size),
            btree_creation_order_address,
        })
    }
}

fn defined(val: u64, offset_size: u8) -> Option<u64> {
    let undef = match offset_size {
        2 => 0xFFFF,
        4 => 0xFFFF_FFFF,
        _ => UNDEF_OFFSET,
    };
    if val == undef {
        None
    } else {
        Some(val)
    }
}

fn ensure(data: &[u8], pos: usize, needed: usize) -> Result<(), FormatError> {
    if pos + needed > data.len() {
        Err(FormatError::UnexpectedEof {
            expected: pos + needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

fn read_offset(data: &[u8], pos: usize, size: u8) -> Result<u64, FormatError> {
    let s = size as usize;
    ensure(data, pos, s)?;
    Ok(match size {
        2 => u16::from_le_bytes([data[pos], data[pos + 1]]) as u64,
        4 => u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as u64,
        8 => u64::from_le_bytes([
            data[pos], data[pos + 1], data[pos + 2], data[pos + 3],
            data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7],
        ]),
        _ => return Err(FormatError::InvalidOffsetSize(size)),
    })
}
