//! Dataspace message bodies (message type 0x0001).

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// A dataspace supported by the attribute write path: scalar, or simple
/// with current dimensions equal to maximum dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dataspace {
    /// Rank 0, one element.
    Scalar,
    /// Rank >= 1 with fixed dimensions.
    Simple {
        /// Current (and maximum) dimension sizes.
        dims: Vec<u64>,
    },
}

impl Dataspace {
    /// A one-dimensional simple dataspace.
    pub fn one_dimensional(len: u64) -> Self {
        Dataspace::Simple { dims: vec![len] }
    }

    /// Number of dimensions. Fails when the dimension count does not fit
    /// the message's one-byte rank field.
    pub fn rank(&self) -> Result<u8, FormatError> {
        match self {
            Dataspace::Scalar => Ok(0),
            Dataspace::Simple { dims } => {
                u8::try_from(dims.len()).map_err(|_| FormatError::EncodeOverflow {
                    value: dims.len() as u64,
                })
            }
        }
    }

    /// Total number of elements (scalar counts as 1).
    pub fn num_elements(&self) -> u64 {
        match self {
            Dataspace::Scalar => 1,
            Dataspace::Simple { dims } => dims.iter().product(),
        }
    }

    /// Serialize the version-2 dataspace message body.
    ///
    /// Maximum dimensions equal current dimensions, so the max-dims flag
    /// stays clear and readers fall back to the current sizes.
    pub fn serialize(&self, length_size: u8) -> Result<Vec<u8>, FormatError> {
        let rank = self.rank()?;
        let mut buf = Vec::new();
        buf.push(2); // version
        buf.push(rank);
        buf.push(0); // flags: no max dims stored
        let type_byte = match self {
            Dataspace::Scalar => 0,
            Dataspace::Simple { .. } => 1,
        };
        buf.push(type_byte);
        if let Dataspace::Simple { dims } = self {
            for &dim in dims {
                write_length(&mut buf, dim, length_size);
            }
        }
        Ok(buf)
    }

    /// Parse a version-2 dataspace message body.
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        if data.len() < 4 {
            return Err(FormatError::UnexpectedEof {
                expected: 4,
                available: data.len(),
            });
        }
        let version = data[0];
        if version != 2 {
            return Err(FormatError::InvalidDataspaceVersion(version));
        }
        let rank = data[1] as usize;
        let type_byte = data[3];

        let ls = length_size as usize;
        match type_byte {
            0 => Ok(Dataspace::Scalar),
            1 => {
                let needed = 4 + rank * ls;
                if data.len() < needed {
                    return Err(FormatError::UnexpectedEof {
                        expected: needed,
                        available: data.len(),
                    });
                }
                let mut dims = Vec::with_capacity(rank);
                for i in 0..rank {
                    let pos = 4 + i * ls;
                    dims.push(read_length(&data[pos..pos + ls], length_size)?);
                }
                Ok(Dataspace::Simple { dims })
            }
            other => Err(FormatError::InvalidDataspaceType(other)),
        }
    }
}

fn write_length(buf: &mut Vec<u8>, val: u64, size: u8) {
    match size {
        2 => buf.extend_from_slice(&(val as u16).to_le_bytes()),
        4 => buf.extend_from_slice(&(val as u32).to_le_bytes()),
        _ => buf.extend_from_slice(&val.to_le_bytes()),
    }
}

fn read_length(slice: &[u8], size: u8) -> Result<u64, FormatError> {
    Ok(match size {
        2 => LittleEndian::read_u16(slice) as u64,
        4 => LittleEndian::read_u32(slice) as u64,
        8 => LittleEndian::read_u64(slice),
        other => return Err(FormatError::InvalidLengthSize(other)),
    })
}
