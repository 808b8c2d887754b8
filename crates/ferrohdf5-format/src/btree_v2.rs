//! B-tree v2 attribute-name index (record type 8).
//!
//! The write path emits a header and a single leaf: records are
//! `(name hash, heap ID, creation order, flags)` ordered by hash, ties
//! broken by lexicographic heap-ID comparison. The internal-node encoding
//! belongs to deeper trees, which this core rejects up front.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use byteorder::{ByteOrder, LittleEndian};

use crate::allocator::{FileAllocator, PlacedBlock};
use crate::checksum::jenkins_lookup3;
use crate::encoder::{Encoder, UNDEF_OFFSET};
use crate::error::FormatError;

const BTHD_SIGNATURE: [u8; 4] = *b"BTHD";
const BTLF_SIGNATURE: [u8; 4] = *b"BTLF";

/// Record type: attribute name for an indexed object.
pub const ATTRIBUTE_NAME_RECORD_TYPE: u8 = 8;

/// Node size; a few hundred records fit one leaf.
const NODE_SIZE: u32 = 4096;
const SPLIT_PERCENT: u8 = 100;
const MERGE_PERCENT: u8 = 40;

/// Header: signature(4) + version(1) + type(1) + node size(4) +
/// record size(2) + depth(2) + split(1) + merge(1) + root address(8) +
/// root record count(2) + total records(8) + checksum(4).
const HEADER_SIZE: u64 = 38;
/// Leaf prefix: signature(4) + version(1) + type(1).
const LEAF_PREFIX: usize = 6;

/// One type-8 record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeNameRecord {
    /// lookup3 hash of the attribute name (seed 0).
    pub name_hash: u32,
    /// Heap ID of the encoded attribute message.
    pub heap_id: Vec<u8>,
    /// Creation order of the attribute.
    pub creation_order: u32,
    /// Attribute message flags.
    pub flags: u8,
}

impl AttributeNameRecord {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u32(self.name_hash);
        enc.put_bytes(&self.heap_id);
        enc.put_u32(self.creation_order);
        enc.put_u8(self.flags);
    }

    fn decode(data: &[u8], heap_id_length: usize) -> AttributeNameRecord {
        let name_hash = LittleEndian::read_u32(&data[0..4]);
        let heap_id = data[4..4 + heap_id_length].to_vec();
        let tail = 4 + heap_id_length;
        let creation_order = LittleEndian::read_u32(&data[tail..tail + 4]);
        let flags = data[tail + 4];
        AttributeNameRecord {
            name_hash,
            heap_id,
            creation_order,
            flags,
        }
    }
}

/// Write-side B-tree: collects records, then emits header + leaf.
#[derive(Debug)]
pub struct BTreeV2Writer {
    record_size: u16,
    records: Vec<AttributeNameRecord>,
}

impl BTreeV2Writer {
    /// Create a name index for heaps issuing IDs of `heap_id_length` bytes.
    pub fn new(heap_id_length: u16) -> Self {
        Self {
            record_size: heap_id_length + 9,
            records: Vec::new(),
        }
    }

    /// Add one record.
    pub fn insert(&mut self, record: AttributeNameRecord) {
        debug_assert_eq!(record.heap_id.len(), self.record_size as usize - 9);
        self.records.push(record);
    }

    /// Number of records collected.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Records one leaf can hold.
    pub fn leaf_capacity(&self) -> usize {
        (NODE_SIZE as usize - LEAF_PREFIX - 4) / self.record_size as usize
    }

    /// Allocate and encode the header and leaf node. The header comes first
    /// in the returned list; an empty tree emits the header alone.
    pub fn serialize(&mut self, alloc: &mut FileAllocator) -> Result<Vec<PlacedBlock>, FormatError> {
        if self.records.len() > self.leaf_capacity() {
            return Err(FormatError::TreeDepthUnsupported {
                records: self.records.len(),
                leaf_capacity: self.leaf_capacity(),
            });
        }
        self.records
            .sort_by(|a, b| (a.name_hash, &a.heap_id).cmp(&(b.name_hash, &b.heap_id)));

        let header_offset = alloc.allocate(HEADER_SIZE, 0);
        let leaf_offset = if self.records.is_empty() {
            None
        } else {
            Some(alloc.allocate(NODE_SIZE as u64, 0))
        };

        let mut enc = Encoder::with_capacity(HEADER_SIZE as usize);
        let mark = enc.begin_block();
        enc.put_bytes(&BTHD_SIGNATURE);
        enc.put_u8(0); // version
        enc.put_u8(ATTRIBUTE_NAME_RECORD_TYPE);
        enc.put_u32(NODE_SIZE);
        enc.put_u16(self.record_size);
        enc.put_u16(0); // depth: root is a leaf
        enc.put_u8(SPLIT_PERCENT);
        enc.put_u8(MERGE_PERCENT);
        enc.put_offset(leaf_offset.unwrap_or(UNDEF_OFFSET));
        enc.put_u16(self.records.len() as u16);
        enc.put_u64(self.records.len() as u64);
        enc.end_block(mark);
        debug_assert_eq!(enc.len() as u64, HEADER_SIZE);

        let mut blocks = vec![PlacedBlock {
            offset: header_offset,
            bytes: enc.into_vec(),
        }];

        if let Some(leaf_offset) = leaf_offset {
            let mut enc = Encoder::with_capacity(NODE_SIZE as usize);
            let mark = enc.begin_block();
            enc.put_bytes(&BTLF_SIGNATURE);
            enc.put_u8(0); // version
            enc.put_u8(ATTRIBUTE_NAME_RECORD_TYPE);
            for record in &self.records {
                record.encode(&mut enc);
            }
            while enc.len() < NODE_SIZE as usize - 4 {
                enc.put_u8(0);
            }
            enc.end_block(mark);
            debug_assert_eq!(enc.len(), NODE_SIZE as usize);
            blocks.push(PlacedBlock {
                offset: leaf_offset,
                bytes: enc.into_vec(),
            });
        }

        Ok(blocks)
    }
}

/// Parsed B-tree v2 header, for read-back verification.
#[derive(Debug, Clone)]
pub struct BTreeV2Header {
    /// Record type stored in this tree.
    pub tree_type: u8,
    /// Node size in bytes.
    pub node_size: u32,
    /// Record size in bytes.
    pub record_size: u16,
    /// Depth of the tree (0 = root is a leaf).
    pub depth: u16,
    /// Address of the root node.
    pub root_node_address: u64,
    /// Number of records in the root node.
    pub num_records_in_root: u16,
    /// Total number of records.
    pub total_records: u64,
}

impl BTreeV2Header {
    /// Parse a header at `offset`, verifying its checksum trailer.
    pub fn parse(file_data: &[u8], offset: usize) -> Result<BTreeV2Header, FormatError> {
        ensure(file_data, offset, HEADER_SIZE as usize)?;
        if file_data[offset..offset + 4] != BTHD_SIGNATURE {
            return Err(FormatError::InvalidBTreeV2Signature);
        }
        let version = file_data[offset + 4];
        if version != 0 {
            return Err(FormatError::InvalidBTreeV2Version(version));
        }

        let trailer_pos = offset + HEADER_SIZE as usize - 4;
        let stored = LittleEndian::read_u32(&file_data[trailer_pos..trailer_pos + 4]);
        let computed = jenkins_lookup3(&file_data[offset..trailer_pos]);
        if stored != computed {
            return Err(FormatError::ChecksumVerifyFailed {
                expected: stored,
                computed,
            });
        }

        Ok(BTreeV2Header {
            tree_type: file_data[offset + 5],
            node_size: LittleEndian::read_u32(&file_data[offset + 6..offset + 10]),
            record_size: LittleEndian::read_u16(&file_data[offset + 10..offset + 12]),
            depth: LittleEndian::read_u16(&file_data[offset + 12..offset + 14]),
            root_node_address: LittleEndian::read_u64(&file_data[offset + 16..offset + 24]),
            num_records_in_root: LittleEndian::read_u16(&file_data[offset + 24..offset + 26]),
            total_records: LittleEndian::read_u64(&file_data[offset + 26..offset + 34]),
        })
    }

    /// Collect the records of a depth-0 tree from its leaf node.
    pub fn read_leaf_records(
        &self,
        file_data: &[u8],
    ) -> Result<Vec<AttributeNameRecord>, FormatError> {
        if self.total_records == 0 || self.root_node_address == UNDEF_OFFSET {
            return Ok(Vec::new());
        }
        if self.depth != 0 {
            return Err(FormatError::TreeDepthUnsupported {
                records: self.total_records as usize,
                leaf_capacity: (self.node_size as usize - LEAF_PREFIX - 4)
                    / self.record_size as usize,
            });
        }

        let offset = self.root_node_address as usize;
        ensure(file_data, offset, self.node_size as usize)?;
        if file_data[offset..offset + 4] != BTLF_SIGNATURE {
            return Err(FormatError::InvalidBTreeV2Signature);
        }

        let trailer_pos = offset + self.node_size as usize - 4;
        let stored = LittleEndian::read_u32(&file_data[trailer_pos..trailer_pos + 4]);
        let computed = jenkins_lookup3(&file_data[offset..trailer_pos]);
        if stored != computed {
            return Err(FormatError::ChecksumVerifyFailed {
                expected: stored,
                computed,
            });
        }

        let rs = self.record_size as usize;
        let heap_id_length = rs - 9;
        let mut records = Vec::with_capacity(self.num_records_in_root as usize);
        for i in 0..self.num_records_in_root as usize {
            let start = offset + LEAF_PREFIX + i * rs;
            records.push(AttributeNameRecord::decode(
                &file_data[start..start + rs],
                heap_id_length,
            ));
        }
        Ok(records)
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
