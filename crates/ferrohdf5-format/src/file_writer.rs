//! File creation: root-attribute configuration and the close-time write
//! pipeline.
//!
//! A freshly written file is a v2 superblock, then the root group's v2
//! object header at offset 48. When the attribute count forces dense
//! storage, a fractal heap and B-tree v2 follow the header. All sizes are
//! address-independent, so the layout is computed once with placeholder
//! addresses and rebuilt with the real ones before any byte is written.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use tracing::debug;

use crate::allocator::{FileAllocator, PlacedBlock};
use crate::attr_storage::{
    plan_root_attributes, AttrValue, StoragePlan, MAX_COMPACT_ATTRS, MIN_DENSE_ATTRS,
};
use crate::attribute_info::AttributeInfoMessage;
use crate::encoder::{Encoder, UNDEF_OFFSET};
use crate::error::FormatError;
use crate::message_type::MessageType;
use crate::object_header::ObjectHeaderWriter;
use crate::paged_writer::PagedWriter;
use crate::superblock::{Superblock, SUPERBLOCK_V2_SIZE};

const LENGTH_SIZE: u8 = 8;

/// Errors surfaced by the file-level writer.
#[derive(Debug)]
pub enum WriteError {
    /// A format-layer failure (validation, encoding, capacity).
    Format(FormatError),
    /// A failure in the underlying file.
    Io(io::Error),
}

impl core::fmt::Display for WriteError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WriteError::Format(e) => write!(f, "{e}"),
            WriteError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Format(e) => Some(e),
            WriteError::Io(e) => Some(e),
        }
    }
}

impl From<FormatError> for WriteError {
    fn from(e: FormatError) -> Self {
        WriteError::Format(e)
    }
}

impl From<io::Error> for WriteError {
    fn from(e: io::Error) -> Self {
        WriteError::Io(e)
    }
}

/// Insertion-ordered root-attribute configuration.
///
/// Re-declaring a name replaces its value in place (last write wins), so
/// the planner always sees unique names in first-declaration order.
#[derive(Debug, Default, Clone)]
pub struct RootAttributes {
    entries: Vec<(String, AttrValue)>,
}

impl RootAttributes {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare or replace an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// The declared attributes in first-declaration order.
    pub fn entries(&self) -> &[(String, AttrValue)] {
        &self.entries
    }

    /// Number of declared attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Link-info message marking the root object as a new-style group
/// (compact links, no link indexes).
fn link_info_message() -> Vec<u8> {
    let mut enc = Encoder::with_capacity(18);
    enc.put_u8(0); // version
    enc.put_u8(0); // flags: no creation order tracking
    enc.put_undef_offset(); // link fractal heap
    enc.put_undef_offset(); // link name B-tree
    enc.into_vec()
}

fn group_info_message() -> Vec<u8> {
    vec![0, 0] // version, flags
}

fn root_header_base() -> ObjectHeaderWriter {
    let mut oh = ObjectHeaderWriter::new();
    oh.set_attribute_thresholds(MAX_COMPACT_ATTRS, MIN_DENSE_ATTRS);
    oh.add_message(MessageType::LinkInfo, link_info_message());
    oh.add_message(MessageType::GroupInfo, group_info_message());
    oh
}

/// Lay out every metadata block of a file holding `attrs` at the root.
///
/// Returns the placed blocks (superblock first) and the end-of-file
/// address. Pure in-memory planning: nothing is written here.
pub fn build_file_blocks(
    attrs: &[(String, AttrValue)],
) -> Result<(Vec<PlacedBlock>, u64), FormatError> {
    let plan = plan_root_attributes(attrs, LENGTH_SIZE)?;
    let mut alloc = FileAllocator::new(SUPERBLOCK_V2_SIZE as u64);

    let mut blocks = match plan {
        StoragePlan::Compact { attributes } => {
            let mut oh = root_header_base();
            for message in &attributes {
                oh.add_message(MessageType::Attribute, message.serialize(LENGTH_SIZE)?);
            }
            oh.serialize(&mut alloc)?
        }
        StoragePlan::Dense { heap, mut btree } => {
            // The attribute-info payload has a fixed size, so the header
            // can be measured with placeholder addresses, the heap and
            // tree placed behind it, and the header rebuilt for real.
            let mut oh = root_header_base();
            oh.add_message(
                MessageType::AttributeInfo,
                AttributeInfoMessage::dense(UNDEF_OFFSET, UNDEF_OFFSET).serialize(),
            );
            let header_len = oh.encoded_len()?;
            let header_offset = alloc.allocate(header_len as u64, 0);

            let (heap_header, heap_block) = heap.serialize(&mut alloc);
            let tree_blocks = btree.serialize(&mut alloc)?;

            let mut oh = root_header_base();
            oh.add_message(
                MessageType::AttributeInfo,
                AttributeInfoMessage::dense(heap_header.offset, tree_blocks[0].offset).serialize(),
            );
            let mut header_alloc = FileAllocator::new(header_offset);
            let header_blocks = oh.serialize(&mut header_alloc)?;
            debug_assert_eq!(header_blocks[0].bytes.len(), header_len);

            let mut blocks = header_blocks;
            blocks.push(heap_header);
            blocks.push(heap_block);
            blocks.extend(tree_blocks);
            blocks
        }
    };

    let eof = alloc.eof();
    let root = blocks[0].offset;
    blocks.insert(
        0,
        PlacedBlock {
            offset: 0,
            bytes: Superblock::v2(root, eof).serialize(),
        },
    );
    Ok((blocks, eof))
}

/// Assemble the complete file image in memory.
pub fn build_file_image(attrs: &[(String, AttrValue)]) -> Result<Vec<u8>, FormatError> {
    let (blocks, eof) = build_file_blocks(attrs)?;
    let mut image = vec![0u8; eof as usize];
    for block in &blocks {
        let start = block.offset as usize;
        image[start..start + block.bytes.len()].copy_from_slice(&block.bytes);
    }
    Ok(image)
}

/// Single-owner file writer: configure root attributes, then close once.
///
/// Not safe to drive from two threads; one writer owns the file handle and
/// the allocator for its whole life. A failed close leaves a partial file
/// behind for the caller to delete.
pub struct FileWriter {
    writer: PagedWriter<BufWriter<File>>,
    attrs: RootAttributes,
}

impl FileWriter {
    /// Create (truncating) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: PagedWriter::new(BufWriter::new(file)),
            attrs: RootAttributes::new(),
        })
    }

    /// Declare or replace a root attribute.
    pub fn set_root_attribute(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.set(name, value);
    }

    /// Validate, lay out, and write the file.
    ///
    /// The superblock goes down first with undefined root and EOF
    /// addresses, and is patched exactly once before the final flush.
    pub fn close(mut self) -> Result<(), WriteError> {
        let placeholder = Superblock::v2(UNDEF_OFFSET, UNDEF_OFFSET).serialize();
        self.writer.write_at(0, &placeholder)?;

        let (blocks, eof) = build_file_blocks(self.attrs.entries())?;
        for block in blocks.iter().skip(1) {
            self.writer.write_at(block.offset, &block.bytes)?;
        }
        self.writer.extend_to(eof)?;
        self.writer.write_at(blocks[0].offset, &blocks[0].bytes)?;
        self.writer.flush()?;
        debug!(eof, attributes = self.attrs.len(), "file finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_header::ObjectHeader;
    use crate::signature::find_signature;

    #[test]
    fn last_write_wins_keeps_declaration_order() {
        let mut attrs = RootAttributes::new();
        attrs.set("a", 1i32);
        attrs.set("b", 2i32);
        attrs.set("a", 3i32);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.entries()[0].0, "a");
        assert_eq!(attrs.entries()[0].1, AttrValue::Int32(3));
        assert_eq!(attrs.entries()[1].0, "b");
    }

    #[test]
    fn empty_file_layout() {
        let image = build_file_image(&[]).unwrap();
        assert_eq!(find_signature(&image).unwrap(), 0);
        let sb = Superblock::parse(&image, 0).unwrap();
        assert_eq!(sb.root_group_address, SUPERBLOCK_V2_SIZE as u64);
        assert_eq!(sb.eof_address, image.len() as u64);

        let oh = ObjectHeader::parse(&image, SUPERBLOCK_V2_SIZE, 8, 8).unwrap();
        assert_eq!(oh.max_compact_attrs, Some(MAX_COMPACT_ATTRS));
        assert_eq!(oh.min_dense_attrs, Some(MIN_DENSE_ATTRS));
        let kinds: Vec<MessageType> = oh.messages.iter().map(|m| m.msg_type).collect();
        assert_eq!(kinds, vec![MessageType::LinkInfo, MessageType::GroupInfo]);
    }

    #[test]
    fn root_header_starts_at_48() {
        let attrs = vec![("a".to_string(), AttrValue::Int32(1))];
        let (blocks, _) = build_file_blocks(&attrs).unwrap();
        assert_eq!(blocks[0].offset, 0);
        assert_eq!(blocks[1].offset, SUPERBLOCK_V2_SIZE as u64);
    }

    #[test]
    fn planning_failure_emits_nothing() {
        let attrs = vec![("".to_string(), AttrValue::Int32(1))];
        assert_eq!(
            build_file_blocks(&attrs).unwrap_err(),
            FormatError::EmptyName
        );
    }
}
