//! Datatype message bodies (message type 0x0003).
//!
//! The write path needs three type classes: fixed-point integers,
//! IEEE 754 floats, and fixed-size strings. Serialization is byte-exact
//! against the version-1 encodings the reference library emits for these
//! classes.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// A datatype supported by the attribute write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    /// Class 0: two's-complement integer, 4 or 8 bytes.
    Integer {
        /// Size in bytes.
        size: u8,
        /// Signedness.
        signed: bool,
    },
    /// Class 1: IEEE 754 binary float, 4 or 8 bytes.
    Float {
        /// Size in bytes.
        size: u8,
    },
    /// Class 3: fixed-size string.
    String {
        /// Size in bytes, including the terminator when null-terminated.
        size: u32,
        /// Null-terminated vs null-padded.
        null_terminated: bool,
    },
}

/// IEEE 754 parameters by float width: (exponent location, exponent size,
/// mantissa size, exponent bias).
fn ieee_params(size: u8) -> (u8, u8, u8, u32) {
    match size {
        4 => (23, 8, 23, 127),
        _ => (52, 11, 52, 1023),
    }
}

fn build_header(class: u8, version: u8, bf: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    buf[0] = (class & 0x0F) | ((version & 0x0F) << 4);
    buf[1] = bf[0];
    buf[2] = bf[1];
    buf[3] = bf[2];
    buf[4..8].copy_from_slice(&size.to_le_bytes());
    buf
}

impl Datatype {
    /// Serialize the datatype message body.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Datatype::Integer { size, signed } => {
                let bf0 = if *signed { 0x08u8 } else { 0x00 };
                let mut buf = build_header(0, 1, [bf0, 0, 0], *size as u32);
                buf.extend_from_slice(&0u16.to_le_bytes()); // bit offset
                buf.extend_from_slice(&((*size as u16) * 8).to_le_bytes()); // bit precision
                buf
            }
            Datatype::Float { size } => {
                // bf0 bit 5: sign location stored; bf1: IEEE mantissa
                // normalization, matching what h5py generates.
                let (exp_loc, exp_size, mant_size, bias) = ieee_params(*size);
                let mut buf = build_header(1, 1, [0x20, 0x3f, 0], *size as u32);
                buf.extend_from_slice(&0u16.to_le_bytes()); // bit offset
                buf.extend_from_slice(&((*size as u16) * 8).to_le_bytes()); // bit precision
                buf.push(exp_loc);
                buf.push(exp_size);
                buf.push(0); // mantissa location
                buf.push(mant_size);
                buf.extend_from_slice(&bias.to_le_bytes());
                buf
            }
            Datatype::String {
                size,
                null_terminated,
            } => {
                let pad = if *null_terminated { 0u8 } else { 1 };
                let bf0 = pad | (1 << 4); // UTF-8
                build_header(3, 1, [bf0, 0, 0], *size)
            }
        }
    }

    /// Parse a datatype message body of one of the supported classes.
    ///
    /// Returns `(Datatype, bytes_consumed)`.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        if data.len() < 8 {
            return Err(FormatError::UnexpectedEof {
                expected: 8,
                available: data.len(),
            });
        }
        let class = data[0] & 0x0F;
        let bf0 = data[1];
        let size = LittleEndian::read_u32(&data[4..8]);

        match class {
            0 => {
                if data.len() < 12 {
                    return Err(FormatError::UnexpectedEof {
                        expected: 12,
                        available: data.len(),
                    });
                }
                Ok((
                    Datatype::Integer {
                        size: size as u8,
                        signed: bf0 & 0x08 != 0,
                    },
                    12,
                ))
            }
            1 => {
                if data.len() < 20 {
                    return Err(FormatError::UnexpectedEof {
                        expected: 20,
                        available: data.len(),
                    });
                }
                Ok((Datatype::Float { size: size as u8 }, 20))
            }
            3 => {
                let pad = bf0 & 0x0F;
                if pad > 2 {
                    return Err(FormatError::InvalidStringPadding(pad));
                }
                let charset = (bf0 >> 4) & 0x0F;
                if charset > 1 {
                    return Err(FormatError::InvalidCharacterSet(charset));
                }
                Ok((
                    Datatype::String {
                        size,
                        null_terminated: pad == 0,
                    },
                    8,
                ))
            }
            other => Err(FormatError::InvalidDatatypeClass(other)),
        }
    }

    /// Size in bytes of one element of this type.
    pub fn type_size(&self) -> u32 {
        match self {
            Datatype::Integer { size, .. } => *size as u32,
            Datatype::Float { size } => *size as u32,
            Datatype::String { size, .. } => *size,
        }
    }
}
