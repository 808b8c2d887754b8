//! Fractal heap managed-object storage, single-direct-block regime.
//!
//! Dense attribute storage keeps every encoded attribute as a managed
//! object in one direct block sized up front for the whole workload. Heap
//! IDs are the "managed" flavor: a flag byte, the offset within the heap,
//! and the object length, with field widths fixed by the heap geometry.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::allocator::{FileAllocator, PlacedBlock};
use crate::checksum::jenkins_lookup3;
use crate::encoder::Encoder;
use crate::error::FormatError;

const FRHP_SIGNATURE: [u8; 4] = *b"FRHP";
const FHDB_SIGNATURE: [u8; 4] = *b"FHDB";

/// Doubling-table width. Only one direct block is ever written, but the
/// header still describes the standard table geometry.
const TABLE_WIDTH: u16 = 4;
/// Largest direct block the table would grow to.
const MAX_DIRECT_BLOCK_SIZE: u64 = 65_536;
/// Heap address space bits; fixes the ID offset field at 4 bytes.
const MAX_HEAP_SIZE_BITS: u16 = 32;
/// Largest managed object; fixes the ID length field at 3 bytes.
const MAX_MANAGED_OBJECT_SIZE: u32 = 65_536;
/// Smallest direct block.
const MIN_BLOCK_SIZE: u64 = 512;

const ID_OFFSET_BYTES: usize = (MAX_HEAP_SIZE_BITS as usize + 7) / 8;
const ID_LENGTH_BYTES: usize = 3;
/// Flag byte + offset + length.
pub const HEAP_ID_LENGTH: u16 = (1 + ID_OFFSET_BYTES + ID_LENGTH_BYTES) as u16;

/// Direct block header: signature(4) + version(1) + heap header address(8)
/// + block offset (offset bits of the heap address space).
const DIRECT_BLOCK_HEADER_SIZE: u64 = 4 + 1 + 8 + ID_OFFSET_BYTES as u64;

/// Heap header size with 8-byte offsets and lengths.
const HEAP_HEADER_SIZE: u64 = 146;

/// Opaque locator for one managed object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeapId {
    bytes: Vec<u8>,
}

impl HeapId {
    /// The raw ID bytes as stored in B-tree records.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Write-side fractal heap.
#[derive(Debug)]
pub struct FractalHeap {
    block_size: u64,
    data: Vec<u8>,
    next_offset: u64,
    count: u64,
}

impl FractalHeap {
    /// Create a heap with one direct block of `block_size` bytes
    /// (a power of two between the table's minimum and maximum).
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            data: Vec::new(),
            next_offset: DIRECT_BLOCK_HEADER_SIZE,
            count: 0,
        }
    }

    /// Create a heap whose direct block holds `total_object_bytes` with
    /// 25% slack, rounded up to a power of two.
    pub fn sized_for(total_object_bytes: usize) -> Result<Self, FormatError> {
        let needed = DIRECT_BLOCK_HEADER_SIZE
            + (total_object_bytes as u64) + (total_object_bytes as u64) / 4
            + 4;
        let block_size = needed.next_power_of_two().max(MIN_BLOCK_SIZE);
        if block_size > MAX_DIRECT_BLOCK_SIZE {
            return Err(FormatError::HeapGrowthUnsupported {
                requested: total_object_bytes,
                free: (MAX_DIRECT_BLOCK_SIZE - DIRECT_BLOCK_HEADER_SIZE - 4) as usize,
            });
        }
        Ok(Self::new(block_size))
    }

    /// Length in bytes of the IDs this heap issues.
    pub fn heap_id_length(&self) -> u16 {
        HEAP_ID_LENGTH
    }

    /// Number of managed objects inserted.
    pub fn object_count(&self) -> u64 {
        self.count
    }

    /// Bytes still free in the direct block (the trailer is reserved).
    pub fn free_space(&self) -> u64 {
        self.block_size.saturating_sub(self.next_offset + 4)
    }

    /// Append an object to the direct block and return its stable ID.
    ///
    /// Objects are never moved after insertion; the returned ID stays valid
    /// for the life of the heap.
    pub fn insert(&mut self, object: &[u8]) -> Result<HeapId, FormatError> {
        if object.len() as u64 > MAX_MANAGED_OBJECT_SIZE as u64
            || object.len() as u64 > self.free_space()
        {
            return Err(FormatError::HeapGrowthUnsupported {
                requested: object.len(),
                free: self.free_space() as usize,
            });
        }

        let offset = self.next_offset;
        self.data.extend_from_slice(object);
        self.next_offset += object.len() as u64;
        self.count += 1;

        let mut enc = Encoder::with_capacity(HEAP_ID_LENGTH as usize);
        enc.put_u8(0x00); // managed object, version 0
        enc.put_uint(offset, ID_OFFSET_BYTES);
        enc.put_uint(object.len() as u64, ID_LENGTH_BYTES);
        Ok(HeapId {
            bytes: enc.into_vec(),
        })
    }

    /// Allocate and encode the heap header and its direct block.
    /// The header block comes first in the returned pair.
    pub fn serialize(&self, alloc: &mut FileAllocator) -> (PlacedBlock, PlacedBlock) {
        let header_offset = alloc.allocate(HEAP_HEADER_SIZE, 0);
        let block_offset = alloc.allocate(self.block_size, 0);

        let mut enc = Encoder::with_capacity(HEAP_HEADER_SIZE as usize);
        let mark = enc.begin_block();
        enc.put_bytes(&FRHP_SIGNATURE);
        enc.put_u8(0); // version
        enc.put_u16(HEAP_ID_LENGTH);
        enc.put_u16(0); // I/O filter info size
        enc.put_u8(0x02); // flags: direct blocks are checksummed
        enc.put_u32(MAX_MANAGED_OBJECT_SIZE);
        enc.put_u64(0); // next huge object ID
        enc.put_undef_offset(); // huge object B-tree address
        enc.put_u64(self.free_space()); // free space in managed blocks
        enc.put_undef_offset(); // free space manager address
        enc.put_u64(self.block_size); // managed space in heap
        enc.put_u64(self.block_size); // allocated managed space
        enc.put_u64(self.next_offset); // direct block iterator offset
        enc.put_u64(self.count); // number of managed objects
        enc.put_u64(0); // size of huge objects
        enc.put_u64(0); // number of huge objects
        enc.put_u64(0); // size of tiny objects
        enc.put_u64(0); // number of tiny objects
        enc.put_u16(TABLE_WIDTH);
        enc.put_u64(self.block_size); // starting block size
        enc.put_u64(MAX_DIRECT_BLOCK_SIZE);
        enc.put_u16(MAX_HEAP_SIZE_BITS);
        enc.put_u16(0); // starting # of rows in root indirect block
        enc.put_offset(block_offset); // root block address
        enc.put_u16(0); // root is a direct block
        enc.end_block(mark);
        debug_assert_eq!(enc.len() as u64, HEAP_HEADER_SIZE);
        let header = PlacedBlock {
            offset: header_offset,
            bytes: enc.into_vec(),
        };

        let mut enc =
            Encoder::with_capacity((DIRECT_BLOCK_HEADER_SIZE + self.data.len() as u64 + 4) as usize);
        let mark = enc.begin_block();
        enc.put_bytes(&FHDB_SIGNATURE);
        enc.put_u8(0); // version
        enc.put_offset(header_offset);
        enc.put_uint(0, ID_OFFSET_BYTES); // block offset in heap space
        enc.put_bytes(&self.data);
        enc.end_block(mark);
        let direct = PlacedBlock {
            offset: block_offset,
            bytes: enc.into_vec(),
        };

        (header, direct)
    }
}

/// Parsed fractal heap header, for read-back verification.
#[derive(Debug, Clone)]
pub struct FractalHeapHeader {
    /// Length of heap IDs in bytes.
    pub heap_id_length: u16,
    /// Maximum size of a managed object.
    pub max_managed_object_size: u32,
    /// Width of the doubling table.
    pub table_width: u16,
    /// Starting block size in the doubling table.
    pub starting_block_size: u64,
    /// Maximum heap size in bits (offset bit width in heap IDs).
    pub max_heap_size: u16,
    /// Address of the root block.
    pub root_block_address: u64,
    /// Number of rows in the root indirect block (0 = root is direct).
    pub current_rows_in_root: u16,
    /// Total number of managed objects.
    pub managed_objects_count: u64,
}

impl FractalHeapHeader {
    /// Parse a heap header at `offset`, verifying its checksum trailer.
    pub fn parse(file_data: &[u8], offset: usize) -> Result<FractalHeapHeader, FormatError> {
        ensure(file_data, offset, HEAP_HEADER_SIZE as usize)?;
        if file_data[offset..offset + 4] != FRHP_SIGNATURE {
            return Err(FormatError::InvalidFractalHeapSignature);
        }
        let version = file_data[offset + 4];
        if version != 0 {
            return Err(FormatError::InvalidFractalHeapVersion(version));
        }

        let trailer_pos = offset + HEAP_HEADER_SIZE as usize - 4;
        let stored = read_u32(file_data, trailer_pos);
        let computed = jenkins_lookup3(&file_data[offset..trailer_pos]);
        if stored != computed {
            return Err(FormatError::ChecksumVerifyFailed {
                expected: stored,
                computed,
            });
        }

        let heap_id_length = read_u16(file_data, offset + 5);
        let max_managed_object_size = read_u32(file_data, offset + 10);
        // Fixed-width walk: 12 length/offset fields of 8 bytes follow the
        // max managed object size, then the table geometry.
        let geom = offset + 14 + 12 * 8;
        let table_width = read_u16(file_data, geom);
        let starting_block_size = read_u64(file_data, geom + 2);
        let max_heap_size = read_u16(file_data, geom + 18);
        let root_block_address = read_u64(file_data, geom + 22);
        let current_rows_in_root = read_u16(file_data, geom + 30);
        let managed_objects_count = read_u64(file_data, offset + 14 + 7 * 8);

        Ok(FractalHeapHeader {
            heap_id_length,
            max_managed_object_size,
            table_width,
            starting_block_size,
            max_heap_size,
            root_block_address,
            current_rows_in_root,
            managed_objects_count,
        })
    }

    /// Decode a managed heap ID into (offset within heap, object length).
    pub fn decode_managed_id(&self, id_bytes: &[u8]) -> Result<(u64, u64), FormatError> {
        if id_bytes.is_empty() {
            return Err(FormatError::UnexpectedEof {
                expected: 1,
                available: 0,
            });
        }
        let id_type = (id_bytes[0] >> 6) & 0x03;
        if id_type != 0 {
            return Err(FormatError::InvalidHeapIdType(id_type));
        }

        let payload = &id_bytes[1..];
        let mut combined: u64 = 0;
        for (i, &b) in payload.iter().enumerate().take(8) {
            combined |= (b as u64) << (i * 8);
        }

        let offset_bits = self.max_heap_size as u32;
        let offset_mask = if offset_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << offset_bits) - 1
        };
        let heap_offset = combined & offset_mask;

        let length_bits = ((payload.len() as u32) * 8).saturating_sub(offset_bits);
        let length = if length_bits == 0 {
            0
        } else {
            let mask = if length_bits >= 64 {
                u64::MAX
            } else {
                (1u64 << length_bits) - 1
            };
            (combined >> offset_bits) & mask
        };

        Ok((heap_offset, length))
    }

    /// Read a managed object out of the root direct block.
    ///
    /// The direct block's header occupies the start of the heap address
    /// space, so a heap offset maps directly onto the block image.
    pub fn read_managed_object(
        &self,
        file_data: &[u8],
        id_bytes: &[u8],
    ) -> Result<Vec<u8>, FormatError> {
        let (heap_offset, length) = self.decode_managed_id(id_bytes)?;
        let pos = self.root_block_address as usize + heap_offset as usize;
        ensure(file_data, pos, length as usize)?;
        Ok(file_data[pos..pos + length as usize].to_vec())
    }
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u64(data: &[u8], pos: usize) -> u64 {
    u64::from_le_bytes([
        data[pos], data[pos + 1], data[pos + 2], data[pos + 3],
        data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7],
    ])
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

#[cfg(test)]
mod tests {
    use super::*;

    fn place(blocks: &[&PlacedBlock]) -> Vec<u8> {
        let end = blocks
            .iter()
            .map(|b| b.offset as usize + b.bytes.len())
            .max()
            .unwrap_or(0);
        let mut image = vec![0u8; end];
        for b in blocks {
            image[b.offset as usize..b.offset as usize + b.bytes.len()].copy_from_slice(&b.bytes);
        }
        image
    }

    #[test]
    fn ids_are_eight_bytes() {
        let mut heap = FractalHeap::new(512);
        let id = heap.insert(b"payload").unwrap();
        assert_eq!(id.as_bytes().len(), HEAP_ID_LENGTH as usize);
        assert_eq!(id.as_bytes()[0], 0x00);
    }

    #[test]
    fn first_object_sits_past_the_block_header() {
        let mut heap = FractalHeap::new(512);
        let id = heap.insert(b"abc").unwrap();
        let offset = u32::from_le_bytes([
            id.as_bytes()[1],
            id.as_bytes()[2],
            id.as_bytes()[3],
            id.as_bytes()[4],
        ]);
        assert_eq!(offset as u64, DIRECT_BLOCK_HEADER_SIZE);
    }

    #[test]
    fn objects_pack_without_padding() {
        let mut heap = FractalHeap::new(512);
        heap.insert(b"first").unwrap();
        let id = heap.insert(b"second").unwrap();
        let offset = u32::from_le_bytes([
            id.as_bytes()[1],
            id.as_bytes()[2],
            id.as_bytes()[3],
            id.as_bytes()[4],
        ]);
        assert_eq!(offset as u64, DIRECT_BLOCK_HEADER_SIZE + 5);
    }

    #[test]
    fn roundtrip_through_serialized_image() {
        let mut heap = FractalHeap::new(512);
        let a = heap.insert(b"Hello, World!").unwrap();
        let b = heap.insert(b"second object").unwrap();

        let mut alloc = FileAllocator::new(0);
        let (header, direct) = heap.serialize(&mut alloc);
        assert_eq!(&header.bytes[..4], b"FRHP");
        assert_eq!(&direct.bytes[..4], b"FHDB");

        let image = place(&[&header, &direct]);
        let hdr = FractalHeapHeader::parse(&image, header.offset as usize).unwrap();
        assert_eq!(hdr.heap_id_length, HEAP_ID_LENGTH);
        assert_eq!(hdr.managed_objects_count, 2);
        assert_eq!(hdr.current_rows_in_root, 0);
        assert_eq!(hdr.root_block_address, direct.offset);

        assert_eq!(hdr.read_managed_object(&image, a.as_bytes()).unwrap(), b"Hello, World!");
        assert_eq!(hdr.read_managed_object(&image, b.as_bytes()).unwrap(), b"second object");
    }

    #[test]
    fn direct_block_trailer_covers_signature_through_last_object() {
        let mut heap = FractalHeap::new(512);
        heap.insert(b"xyz").unwrap();
        let mut alloc = FileAllocator::new(0);
        let (_, direct) = heap.serialize(&mut alloc);
        let n = direct.bytes.len();
        let stored = u32::from_le_bytes([
            direct.bytes[n - 4],
            direct.bytes[n - 3],
            direct.bytes[n - 2],
            direct.bytes[n - 1],
        ]);
        assert_eq!(stored, jenkins_lookup3(&direct.bytes[..n - 4]));
    }

    #[test]
    fn exhaustion_reports_growth_unsupported() {
        let mut heap = FractalHeap::new(64);
        let err = heap.insert(&[0u8; 60]).unwrap_err();
        assert!(matches!(err, FormatError::HeapGrowthUnsupported { .. }));
    }

    #[test]
    fn sized_for_adds_slack_and_rounds_up() {
        let heap = FractalHeap::sized_for(100).unwrap();
        assert_eq!(heap.block_size, 512);
        let heap = FractalHeap::sized_for(1000).unwrap();
        assert_eq!(heap.block_size, 2048);
    }

    #[test]
    fn sized_for_rejects_oversized_workloads() {
        assert!(matches!(
            FractalHeap::sized_for(70_000).unwrap_err(),
            FormatError::HeapGrowthUnsupported { .. }
        ));
    }

    #[test]
    fn rejects_non_managed_id_type() {
        let mut heap = FractalHeap::new(512);
        heap.insert(b"x").unwrap();
        let mut alloc = FileAllocator::new(0);
        let (header, direct) = heap.serialize(&mut alloc);
        let image = place(&[&header, &direct]);
        let hdr = FractalHeapHeader::parse(&image, 0).unwrap();
        let id = [0x40u8, 0, 0, 0, 0, 0, 0, 0]; // type 1 (tiny)
        assert_eq!(
            hdr.decode_managed_id(&id).unwrap_err(),
            FormatError::InvalidHeapIdType(1)
        );
    }
}
