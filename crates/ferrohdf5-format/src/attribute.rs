//! Attribute messages (message type 0x000C), version-3 encoding.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::encoder::Encoder;
use crate::error::FormatError;

/// One attribute: name, type, shape, and the raw datum bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMessage {
    /// Attribute name (UTF-8, non-empty).
    pub name: String,
    /// Element datatype.
    pub datatype: Datatype,
    /// Shape of the value.
    pub dataspace: Dataspace,
    /// Datum bytes, C order (last dimension varies fastest).
    pub raw_data: Vec<u8>,
}

impl AttributeMessage {
    /// Serialize the version-3 message body.
    ///
    /// Version 3 does not 8-align its sub-sections: the null-terminated
    /// name, the datatype body, the dataspace body, and the raw datum
    /// follow each other without padding.
    pub fn serialize(&self, length_size: u8) -> Result<Vec<u8>, FormatError> {
        let name_size = self.name.len() + 1;
        if name_size > u16::MAX as usize {
            return Err(FormatError::NameTooLong {
                length: self.name.len(),
            });
        }
        let dt_bytes = self.datatype.serialize();
        let ds_bytes = self.dataspace.serialize(length_size)?;

        let mut enc = Encoder::with_capacity(9 + name_size + dt_bytes.len() + ds_bytes.len() + self.raw_data.len());
        enc.put_u8(3); // version
        enc.put_u8(0); // flags
        enc.put_u16(name_size as u16);
        enc.put_u16(dt_bytes.len() as u16);
        enc.put_u16(ds_bytes.len() as u16);
        enc.put_u8(0); // name character set
        enc.put_bytes(self.name.as_bytes());
        enc.put_u8(0); // name terminator
        enc.put_bytes(&dt_bytes);
        enc.put_bytes(&ds_bytes);
        enc.put_bytes(&self.raw_data);
        Ok(enc.into_vec())
    }

    /// Parse a version-3 message body.
    pub fn parse(data: &[u8], length_size: u8) -> Result<AttributeMessage, FormatError> {
        if data.len() < 9 {
            return Err(FormatError::UnexpectedEof {
                expected: 9,
                available: data.len(),
            });
        }
        let version = data[0];
        if version != 3 {
            return Err(FormatError::InvalidAttributeVersion(version));
        }
        let name_size = u16::from_le_bytes([data[2], data[3]]) as usize;
        let datatype_size = u16::from_le_bytes([data[4], data[5]]) as usize;
        let dataspace_size = u16::from_le_bytes([data[6], data[7]]) as usize;

        let mut pos = 9;
        ensure(data, pos, name_size)?;
        let name = extract_name(&data[pos..pos + name_size]);
        pos += name_size;

        ensure(data, pos, datatype_size)?;
        let (datatype, _) = Datatype::parse(&data[pos..pos + datatype_size])?;
        pos += datatype_size;

        ensure(data, pos, dataspace_size)?;
        let dataspace = Dataspace::parse(&data[pos..pos + dataspace_size], length_size)?;
        pos += dataspace_size;

        let datum_size = (dataspace.num_elements() * datatype.type_size() as u64) as usize;
        ensure(data, pos, datum_size)?;
        let raw_data = data[pos..pos + datum_size].to_vec();

        Ok(AttributeMessage {
            name,
            datatype,
            dataspace,
            raw_data,
        })
    }

    /// Decode the datum as i32 values.
    pub fn read_i32s(&self) -> Result<Vec<i32>, FormatError> {
        match self.datatype {
            Datatype::Integer {
                size: 4,
                signed: true,
            } => Ok(self
                .raw_data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()),
            _ => Err(FormatError::TypeMismatch {
                expected: "32-bit signed integer",
                actual: "other",
            }),
        }
    }

    /// Decode the datum as i64 values.
    pub fn read_i64s(&self) -> Result<Vec<i64>, FormatError> {
        match self.datatype {
            Datatype::Integer {
                size: 8,
                signed: true,
            } => Ok(self
                .raw_data
                .chunks_exact(8)
                .map(|c| {
                    i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                })
                .collect()),
            _ => Err(FormatError::TypeMismatch {
                expected: "64-bit signed integer",
                actual: "other",
            }),
        }
    }

    /// Decode the datum as f32 values.
    pub fn read_f32s(&self) -> Result<Vec<f32>, FormatError> {
        match self.datatype {
            Datatype::Float { size: 4 } => Ok(self
                .raw_data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()),
            _ => Err(FormatError::TypeMismatch {
                expected: "32-bit float",
                actual: "other",
            }),
        }
    }

    /// Decode the datum as f64 values.
    pub fn read_f64s(&self) -> Result<Vec<f64>, FormatError> {
        match self.datatype {
            Datatype::Float { size: 8 } => Ok(self
                .raw_data
                .chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                })
                .collect()),
            _ => Err(FormatError::TypeMismatch {
                expected: "64-bit float",
                actual: "other",
            }),
        }
    }

    /// Decode a scalar string datum, stripping the terminator and padding.
    pub fn read_string(&self) -> Result<String, FormatError> {
        match self.datatype {
            Datatype::String { .. } => Ok(extract_name(&self.raw_data)),
            _ => Err(FormatError::TypeMismatch {
                expected: "fixed-size string",
                actual: "other",
            }),
        }
    }

    /// Decode a one-dimensional string datum into its elements.
    pub fn read_strings(&self) -> Result<Vec<String>, FormatError> {
        match self.datatype {
            Datatype::String { size, .. } => Ok(self
                .raw_data
                .chunks_exact(size as usize)
                .map(extract_name)
                .collect()),
            _ => Err(FormatError::TypeMismatch {
                expected: "fixed-size string",
                actual: "other",
            }),
        }
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

/// Extract text from raw bytes, stopping at the first NUL.
fn extract_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
