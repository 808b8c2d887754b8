//! Attribute value model and the compact-vs-dense storage planner.

#[cfg(not(feature = "std"))]
use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use tracing::debug;

use crate::attribute::AttributeMessage;
use crate::btree_v2::{AttributeNameRecord, BTreeV2Writer};
use crate::checksum::jenkins_lookup3;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::encoder::u32_field;
use crate::error::FormatError;
use crate::fractal_heap::FractalHeap;

/// Most attributes an object header stores inline.
pub const MAX_COMPACT_ATTRS: u16 = 8;
/// Fewest attributes that keep dense storage once entered.
pub const MIN_DENSE_ATTRS: u16 = 6;

/// Longest accepted name: the name plus its terminator must fit the 16-bit
/// name-size field.
const MAX_NAME_LEN: usize = u16::MAX as usize - 1;

/// An attribute value of one of the supported shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float32Array(Vec<f32>),
    Float64Array(Vec<f64>),
    TextArray(Vec<String>),
    /// A configured-but-absent value; rejected at plan time.
    Nil,
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int32(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int64(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float32(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float64(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<Vec<i32>> for AttrValue {
    fn from(v: Vec<i32>) -> Self {
        AttrValue::Int32Array(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Int64Array(v)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(v: Vec<f32>) -> Self {
        AttrValue::Float32Array(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::Float64Array(v)
    }
}

/// Map a declared value onto a typed attribute message.
///
/// This is the closed-set dispatcher: datatype and dataspace are inferred
/// from the value shape, never coerced.
pub fn build_attribute(name: &str, value: &AttrValue) -> Result<AttributeMessage, FormatError> {
    if name.is_empty() {
        return Err(FormatError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FormatError::NameTooLong { length: name.len() });
    }

    let (datatype, dataspace, raw_data) = match value {
        AttrValue::Int32(v) => (
            Datatype::Integer {
                size: 4,
                signed: true,
            },
            Dataspace::Scalar,
            v.to_le_bytes().to_vec(),
        ),
        AttrValue::Int64(v) => (
            Datatype::Integer {
                size: 8,
                signed: true,
            },
            Dataspace::Scalar,
            v.to_le_bytes().to_vec(),
        ),
        AttrValue::Float32(v) => (
            Datatype::Float { size: 4 },
            Dataspace::Scalar,
            v.to_le_bytes().to_vec(),
        ),
        AttrValue::Float64(v) => (
            Datatype::Float { size: 8 },
            Dataspace::Scalar,
            v.to_le_bytes().to_vec(),
        ),
        AttrValue::Text(s) => {
            let mut raw = s.as_bytes().to_vec();
            raw.push(0);
            (
                Datatype::String {
                    size: u32_field(raw.len() as u64)?,
                    null_terminated: true,
                },
                Dataspace::Scalar,
                raw,
            )
        }
        AttrValue::Int32Array(arr) => (
            Datatype::Integer {
                size: 4,
                signed: true,
            },
            Dataspace::one_dimensional(arr.len() as u64),
            arr.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        AttrValue::Int64Array(arr) => (
            Datatype::Integer {
                size: 8,
                signed: true,
            },
            Dataspace::one_dimensional(arr.len() as u64),
            arr.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        AttrValue::Float32Array(arr) => (
            Datatype::Float { size: 4 },
            Dataspace::one_dimensional(arr.len() as u64),
            arr.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        AttrValue::Float64Array(arr) => (
            Datatype::Float { size: 8 },
            Dataspace::one_dimensional(arr.len() as u64),
            arr.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        AttrValue::TextArray(arr) => {
            // Fixed-size elements: the longest value plus its terminator.
            let max_len = match arr.iter().map(|s| s.len()).max() {
                Some(n) => n,
                None => {
                    return Err(FormatError::UnsupportedValueKind {
                        name: name.to_string(),
                    })
                }
            };
            let elem_size = max_len + 1;
            let mut raw = Vec::with_capacity(arr.len() * elem_size);
            for s in arr {
                raw.extend_from_slice(s.as_bytes());
                raw.resize(raw.len() + elem_size - s.len(), 0);
            }
            (
                Datatype::String {
                    size: u32_field(elem_size as u64)?,
                    null_terminated: true,
                },
                Dataspace::one_dimensional(arr.len() as u64),
                raw,
            )
        }
        AttrValue::Nil => {
            return Err(FormatError::NilValue {
                name: name.to_string(),
            })
        }
    };

    Ok(AttributeMessage {
        name: name.to_string(),
        datatype,
        dataspace,
        raw_data,
    })
}

/// The storage layout chosen for a set of root attributes.
#[derive(Debug)]
pub enum StoragePlan {
    /// Attribute messages go inline into the object header, caller order.
    Compact {
        /// The encoded-ready messages.
        attributes: Vec<AttributeMessage>,
    },
    /// Attributes live in a fractal heap indexed by a B-tree; the object
    /// header gets a single attribute-info message pointing at both.
    Dense {
        /// The filled heap, one managed object per attribute.
        heap: FractalHeap,
        /// The filled name index.
        btree: BTreeV2Writer,
    },
}

/// Validate the declared attributes and choose their storage.
///
/// On a fresh file the hysteresis band collapses: dense storage is used
/// iff the count exceeds [`MAX_COMPACT_ATTRS`]. All input validation
/// happens here, before any byte is emitted.
pub fn plan_root_attributes(
    attrs: &[(String, AttrValue)],
    length_size: u8,
) -> Result<StoragePlan, FormatError> {
    let mut messages = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        messages.push(build_attribute(name, value)?);
    }

    if messages.len() <= MAX_COMPACT_ATTRS as usize {
        debug!(count = messages.len(), mode = "compact", "planned root attribute storage");
        return Ok(StoragePlan::Compact {
            attributes: messages,
        });
    }

    let mut bodies = Vec::with_capacity(messages.len());
    let mut total = 0usize;
    for message in &messages {
        let body = message.serialize(length_size)?;
        total += body.len();
        bodies.push(body);
    }

    let mut heap = FractalHeap::sized_for(total)?;
    let mut btree = BTreeV2Writer::new(heap.heap_id_length());
    for (order, (message, body)) in messages.iter().zip(&bodies).enumerate() {
        let heap_id = heap.insert(body)?;
        btree.insert(AttributeNameRecord {
            name_hash: jenkins_lookup3(message.name.as_bytes()),
            heap_id: heap_id.as_bytes().to_vec(),
            creation_order: order as u32,
            flags: 0,
        });
    }
    debug!(
        count = messages.len(),
        mode = "dense",
        heap_bytes = total,
        "planned root attribute storage"
    );

    Ok(StoragePlan::Dense { heap, btree })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_inference() {
        let msg = build_attribute("a", &AttrValue::Int32(42)).unwrap();
        assert_eq!(
            msg.datatype,
            Datatype::Integer {
                size: 4,
                signed: true
            }
        );
        assert_eq!(msg.dataspace, Dataspace::Scalar);
        assert_eq!(msg.raw_data, 42i32.to_le_bytes());
    }

    #[test]
    fn text_gets_terminator_sized_type() {
        let msg = build_attribute("s", &AttrValue::from("TestValue")).unwrap();
        assert_eq!(
            msg.datatype,
            Datatype::String {
                size: 10,
                null_terminated: true
            }
        );
        assert_eq!(msg.raw_data.len(), 10);
        assert_eq!(msg.raw_data.last(), Some(&0));
    }

    #[test]
    fn array_inference_is_c_order() {
        let msg = build_attribute("arr", &AttrValue::from(vec![1i32, 2, 3])).unwrap();
        assert_eq!(msg.dataspace, Dataspace::one_dimensional(3));
        assert_eq!(
            msg.raw_data,
            [1i32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>()
        );
    }

    #[test]
    fn text_array_pads_to_longest_element() {
        let msg = build_attribute(
            "names",
            &AttrValue::TextArray(vec!["ab".to_string(), "wxyz".to_string()]),
        )
        .unwrap();
        assert_eq!(
            msg.datatype,
            Datatype::String {
                size: 5,
                null_terminated: true
            }
        );
        assert_eq!(msg.raw_data, b"ab\0\0\0wxyz\0");
    }

    #[test]
    fn empty_name_rejected() {
        assert_eq!(
            build_attribute("", &AttrValue::Int32(1)).unwrap_err(),
            FormatError::EmptyName
        );
    }

    #[test]
    fn overlong_name_rejected() {
        let name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            build_attribute(&name, &AttrValue::Int32(1)).unwrap_err(),
            FormatError::NameTooLong { .. }
        ));
    }

    #[test]
    fn nil_value_rejected() {
        assert_eq!(
            build_attribute("n", &AttrValue::Nil).unwrap_err(),
            FormatError::NilValue {
                name: "n".to_string()
            }
        );
    }

    #[test]
    fn empty_text_array_rejected() {
        assert_eq!(
            build_attribute("t", &AttrValue::TextArray(Vec::new())).unwrap_err(),
            FormatError::UnsupportedValueKind {
                name: "t".to_string()
            }
        );
    }

    fn named(n: usize) -> Vec<(String, AttrValue)> {
        (1..=n)
            .map(|i| (format!("Attr{i}"), AttrValue::from(format!("value{i}"))))
            .collect()
    }

    #[test]
    fn eight_attributes_stay_compact() {
        match plan_root_attributes(&named(8), 8).unwrap() {
            StoragePlan::Compact { attributes } => {
                assert_eq!(attributes.len(), 8);
                // Caller order preserved.
                assert_eq!(attributes[0].name, "Attr1");
                assert_eq!(attributes[7].name, "Attr8");
            }
            StoragePlan::Dense { .. } => panic!("expected compact storage"),
        }
    }

    #[test]
    fn nine_attributes_go_dense() {
        match plan_root_attributes(&named(9), 8).unwrap() {
            StoragePlan::Dense { heap, mut btree } => {
                assert_eq!(heap.object_count(), 9);
                assert_eq!(btree.record_count(), 9);
                let mut alloc = crate::allocator::FileAllocator::new(0);
                assert!(btree.serialize(&mut alloc).is_ok());
            }
            StoragePlan::Compact { .. } => panic!("expected dense storage"),
        }
    }

    #[test]
    fn validation_failure_reports_before_planning() {
        let mut attrs = named(3);
        attrs.push(("".to_string(), AttrValue::Int32(1)));
        assert_eq!(
            plan_root_attributes(&attrs, 8).unwrap_err(),
            FormatError::EmptyName
        );
    }
}
