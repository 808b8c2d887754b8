//! Error types for HDF5 format encoding and verification.

#[cfg(not(feature = "std"))]
use alloc::string::String;

use core::fmt;

/// Errors that can occur while planning, encoding, or verifying HDF5 binary
/// format structures.
///
/// All variants are raised before or during serialization of an in-memory
/// image; file-level I/O failures are wrapped separately by
/// [`crate::file_writer::WriteError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// An attribute was declared with an empty name.
    EmptyName,
    /// An attribute name plus its null terminator does not fit the 16-bit
    /// name-size field (64 KiB bound).
    NameTooLong {
        /// Byte length of the offending name.
        length: usize,
    },
    /// An attribute was configured without a value.
    NilValue {
        /// Name of the offending attribute.
        name: String,
    },
    /// A value shape outside the supported scalar / one-dimensional set.
    UnsupportedValueKind {
        /// Name of the offending attribute.
        name: String,
    },
    /// A size field would not fit its on-disk width.
    EncodeOverflow {
        /// The value that did not fit.
        value: u64,
    },
    /// A single header message exceeds the maximum chunk-0 capacity.
    HeaderOverflow {
        /// Encoded size of the offending message.
        message_size: usize,
        /// The capacity it had to fit into.
        capacity: usize,
    },
    /// The workload does not fit the heap's single direct block.
    HeapGrowthUnsupported {
        /// Bytes requested by the insert.
        requested: usize,
        /// Bytes still free in the current direct block.
        free: usize,
    },
    /// The record set does not fit a single B-tree leaf.
    TreeDepthUnsupported {
        /// Number of records to index.
        records: usize,
        /// Records one leaf can hold.
        leaf_capacity: usize,
    },
    /// A checksum trailer did not match the bytes it covers.
    ChecksumVerifyFailed {
        /// The checksum stored in the block.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// The HDF5 magic signature was not found at any valid offset.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    InvalidLengthSize(u8),
    /// Invalid object header signature.
    InvalidObjectHeaderSignature,
    /// Invalid object header version.
    InvalidObjectHeaderVersion(u8),
    /// Invalid attribute message version.
    InvalidAttributeVersion(u8),
    /// Invalid attribute info message version.
    InvalidAttributeInfoVersion(u8),
    /// Invalid datatype class.
    InvalidDatatypeClass(u8),
    /// Invalid string padding type.
    InvalidStringPadding(u8),
    /// Invalid character set.
    InvalidCharacterSet(u8),
    /// Invalid dataspace version.
    InvalidDataspaceVersion(u8),
    /// Invalid dataspace type.
    InvalidDataspaceType(u8),
    /// Invalid B-tree v2 signature.
    InvalidBTreeV2Signature,
    /// Invalid B-tree v2 version.
    InvalidBTreeV2Version(u8),
    /// Invalid fractal heap signature.
    InvalidFractalHeapSignature,
    /// Invalid fractal heap version.
    InvalidFractalHeapVersion(u8),
    /// Invalid heap ID type.
    InvalidHeapIdType(u8),
    /// Type mismatch when decoding a datum.
    TypeMismatch {
        /// Expected type description.
        expected: &'static str,
        /// Actual type description.
        actual: &'static str,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::EmptyName => {
                write!(f, "attribute name cannot be empty")
            }
            FormatError::NameTooLong { length } => {
                write!(f, "attribute name of {length} bytes exceeds the 64 KiB limit")
            }
            FormatError::NilValue { name } => {
                write!(f, "attribute {name:?} has no value")
            }
            FormatError::UnsupportedValueKind { name } => {
                write!(f, "attribute {name:?} has an unsupported value shape")
            }
            FormatError::EncodeOverflow { value } => {
                write!(f, "size field value {value} does not fit its on-disk width")
            }
            FormatError::HeaderOverflow {
                message_size,
                capacity,
            } => {
                write!(
                    f,
                    "header message of {message_size} bytes exceeds chunk capacity {capacity}"
                )
            }
            FormatError::HeapGrowthUnsupported { requested, free } => {
                write!(
                    f,
                    "heap object of {requested} bytes does not fit the direct block ({free} bytes free)"
                )
            }
            FormatError::TreeDepthUnsupported {
                records,
                leaf_capacity,
            } => {
                write!(
                    f,
                    "{records} records exceed the single-leaf capacity of {leaf_capacity}"
                )
            }
            FormatError::ChecksumVerifyFailed { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: stored {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidObjectHeaderSignature => {
                write!(f, "invalid object header signature")
            }
            FormatError::InvalidObjectHeaderVersion(v) => {
                write!(f, "invalid object header version: {v}")
            }
            FormatError::InvalidAttributeVersion(v) => {
                write!(f, "invalid attribute message version: {v}")
            }
            FormatError::InvalidAttributeInfoVersion(v) => {
                write!(f, "invalid attribute info message version: {v}")
            }
            FormatError::InvalidDatatypeClass(c) => {
                write!(f, "invalid datatype class: {c}")
            }
            FormatError::InvalidStringPadding(p) => {
                write!(f, "invalid string padding type: {p}")
            }
            FormatError::InvalidCharacterSet(c) => {
                write!(f, "invalid character set: {c}")
            }
            FormatError::InvalidDataspaceVersion(v) => {
                write!(f, "invalid dataspace version: {v}")
            }
            FormatError::InvalidDataspaceType(t) => {
                write!(f, "invalid dataspace type: {t}")
            }
            FormatError::InvalidBTreeV2Signature => {
                write!(f, "invalid B-tree v2 signature")
            }
            FormatError::InvalidBTreeV2Version(v) => {
                write!(f, "invalid B-tree v2 version: {v}")
            }
            FormatError::InvalidFractalHeapSignature => {
                write!(f, "invalid fractal heap signature")
            }
            FormatError::InvalidFractalHeapVersion(v) => {
                write!(f, "invalid fractal heap version: {v}")
            }
            FormatError::InvalidHeapIdType(t) => {
                write!(f, "invalid heap ID type: {t}")
            }
            FormatError::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FormatError {}
