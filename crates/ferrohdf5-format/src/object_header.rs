//! Version-2 object headers: message encoder and read-back parser.
//!
//! The writer packs typed messages greedily into chunk 0. When a caller
//! bounds the chunk-0 capacity, overflowing messages move to an `OCHK`
//! continuation block referenced by a continuation message; both the header
//! and the continuation block end with a lookup3 trailer.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use byteorder::{ByteOrder, LittleEndian};

use crate::allocator::{FileAllocator, PlacedBlock};
use crate::checksum::jenkins_lookup3;
use crate::encoder::Encoder;
use crate::error::FormatError;
use crate::message_type::MessageType;

const OHDR_SIGNATURE: [u8; 4] = *b"OHDR";
const OCHK_SIGNATURE: [u8; 4] = *b"OCHK";

/// Per-message frame overhead: type(1) + size(2) + flags(1).
const FRAME_OVERHEAD: usize = 4;
/// A continuation message frame: overhead + offset(8) + length(8).
const CONTINUATION_FRAME: usize = FRAME_OVERHEAD + 16;

/// Header flag bits.
const FLAG_ATTR_PHASE_CHANGE: u8 = 0x10;
const FLAG_TIMES_STORED: u8 = 0x20;
const FLAG_ATTR_CREATION_TRACKED: u8 = 0x04;

/// Writer for v2 object headers.
pub struct ObjectHeaderWriter {
    messages: Vec<(MessageType, Vec<u8>, u8)>,
    attr_thresholds: Option<(u16, u16)>,
    timestamps: Option<[u32; 4]>,
    chunk0_capacity: Option<usize>,
}

impl ObjectHeaderWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            attr_thresholds: None,
            timestamps: None,
            chunk0_capacity: None,
        }
    }

    /// Add a message with default flags (0).
    pub fn add_message(&mut self, msg_type: MessageType, data: Vec<u8>) {
        self.messages.push((msg_type, data, 0));
    }

    /// Add a message with specific flags.
    pub fn add_message_with_flags(&mut self, msg_type: MessageType, data: Vec<u8>, flags: u8) {
        self.messages.push((msg_type, data, flags));
    }

    /// Store the attribute storage phase-change thresholds
    /// (maximum compact count, minimum dense count).
    pub fn set_attribute_thresholds(&mut self, max_compact: u16, min_dense: u16) {
        self.attr_thresholds = Some((max_compact, min_dense));
    }

    /// Store access/modification/change/birth timestamps.
    pub fn set_timestamps(&mut self, times: [u32; 4]) {
        self.timestamps = Some(times);
    }

    /// Bound the chunk-0 message area; messages beyond the bound spill into
    /// a continuation block.
    pub fn set_chunk0_capacity(&mut self, capacity: usize) {
        self.chunk0_capacity = Some(capacity);
    }

    fn frame_len(data: &[u8]) -> usize {
        FRAME_OVERHEAD + data.len()
    }

    /// Split messages between chunk 0 and a continuation block.
    /// Returns (number of chunk-0 messages, chunk-0 message-area size,
    /// continuation message-area size).
    fn split(&self) -> Result<(usize, usize, usize), FormatError> {
        for (_, data, _) in &self.messages {
            if data.len() > u16::MAX as usize {
                return Err(FormatError::HeaderOverflow {
                    message_size: data.len(),
                    capacity: u16::MAX as usize,
                });
            }
        }

        let total: usize = self.messages.iter().map(|(_, d, _)| Self::frame_len(d)).sum();
        let cap = match self.chunk0_capacity {
            Some(cap) if total > cap => cap,
            _ => return Ok((self.messages.len(), total, 0)),
        };

        if cap < CONTINUATION_FRAME {
            return Err(FormatError::HeaderOverflow {
                message_size: CONTINUATION_FRAME,
                capacity: cap,
            });
        }

        let mut count = 0;
        let mut size = 0;
        for (_, data, _) in &self.messages {
            let frame = Self::frame_len(data);
            if size + frame + CONTINUATION_FRAME > cap {
                break;
            }
            size += frame;
            count += 1;
        }

        let rest: usize = self.messages[count..]
            .iter()
            .map(|(_, d, _)| Self::frame_len(d))
            .sum();
        Ok((count, size + CONTINUATION_FRAME, rest))
    }

    fn prefix_len(&self, chunk0_size: usize) -> usize {
        4 + 1
            + 1
            + if self.timestamps.is_some() { 16 } else { 0 }
            + if self.attr_thresholds.is_some() { 4 } else { 0 }
            + chunk_size_width(chunk0_size).0
    }

    /// Size of the header block (chunk 0 only) once serialized.
    pub fn encoded_len(&self) -> Result<usize, FormatError> {
        let (_, chunk0_size, _) = self.split()?;
        Ok(self.prefix_len(chunk0_size) + chunk0_size + 4)
    }

    /// Allocate and encode the header (and its continuation block, when one
    /// is needed). The header block comes first in the returned list.
    pub fn serialize(&self, alloc: &mut FileAllocator) -> Result<Vec<PlacedBlock>, FormatError> {
        let (chunk0_count, chunk0_size, cont_size) = self.split()?;
        let (width, width_flags) = chunk_size_width(chunk0_size);

        let header_len = self.prefix_len(chunk0_size) + chunk0_size + 4;
        let header_offset = alloc.allocate(header_len as u64, 0);

        let continuation = if chunk0_count < self.messages.len() {
            let len = 4 + cont_size + 4;
            Some((alloc.allocate(len as u64, 0), len))
        } else {
            None
        };

        let mut flags = width_flags;
        if self.attr_thresholds.is_some() {
            flags |= FLAG_ATTR_PHASE_CHANGE;
        }
        if self.timestamps.is_some() {
            flags |= FLAG_TIMES_STORED;
        }

        let mut enc = Encoder::with_capacity(header_len);
        let mark = enc.begin_block();
        enc.put_bytes(&OHDR_SIGNATURE);
        enc.put_u8(2); // version
        enc.put_u8(flags);
        if let Some(times) = self.timestamps {
            for t in times {
                enc.put_u32(t);
            }
        }
        if let Some((max_compact, min_dense)) = self.attr_thresholds {
            enc.put_u16(max_compact);
            enc.put_u16(min_dense);
        }
        enc.put_uint(chunk0_size as u64, width);

        for (msg_type, data, msg_flags) in &self.messages[..chunk0_count] {
            write_frame(&mut enc, *msg_type, data, *msg_flags);
        }
        if let Some((cont_offset, cont_len)) = continuation {
            enc.put_u8(MessageType::ObjectHeaderContinuation.to_u16() as u8);
            enc.put_u16(16);
            enc.put_u8(0);
            enc.put_u64(cont_offset);
            enc.put_u64(cont_len as u64);
        }
        enc.end_block(mark);
        debug_assert_eq!(enc.len(), header_len);

        let mut blocks = vec![PlacedBlock {
            offset: header_offset,
            bytes: enc.into_vec(),
        }];

        if let Some((cont_offset, cont_len)) = continuation {
            let mut enc = Encoder::with_capacity(cont_len);
            let mark = enc.begin_block();
            enc.put_bytes(&OCHK_SIGNATURE);
            for (msg_type, data, msg_flags) in &self.messages[chunk0_count..] {
                write_frame(&mut enc, *msg_type, data, *msg_flags);
            }
            enc.end_block(mark);
            debug_assert_eq!(enc.len(), cont_len);
            blocks.push(PlacedBlock {
                offset: cont_offset,
                bytes: enc.into_vec(),
            });
        }

        Ok(blocks)
    }
}

impl Default for ObjectHeaderWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_frame(enc: &mut Encoder, msg_type: MessageType, data: &[u8], flags: u8) {
    enc.put_u8(msg_type.to_u16() as u8);
    enc.put_u16(data.len() as u16);
    enc.put_u8(flags);
    enc.put_bytes(data);
}

/// Smallest chunk-0 size field width from {1, 2, 4, 8} and the matching
/// header flag bits.
fn chunk_size_width(chunk0_size: usize) -> (usize, u8) {
    if chunk0_size <= 0xFF {
        (1, 0x00)
    } else if chunk0_size <= 0xFFFF {
        (2, 0x01)
    } else if chunk0_size <= 0xFFFF_FFFF {
        (4, 0x02)
    } else {
        (8, 0x03)
    }
}

/// A parsed header message.
#[derive(Debug, Clone)]
pub struct HeaderMessage {
    /// The message type.
    pub msg_type: MessageType,
    /// Message flags byte.
    pub flags: u8,
    /// Raw message body.
    pub data: Vec<u8>,
}

/// A parsed v2 object header.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    /// Header version (always 2).
    pub version: u8,
    /// Header flags byte.
    pub flags: u8,
    /// Maximum compact attribute count, when phase-change values are stored.
    pub max_compact_attrs: Option<u16>,
    /// Minimum dense attribute count, when phase-change values are stored.
    pub min_dense_attrs: Option<u16>,
    /// Access/modification/change/birth times, when stored.
    pub timestamps: Option<[u32; 4]>,
    /// All non-NIL messages, continuation blocks included.
    pub messages: Vec<HeaderMessage>,
}

impl ObjectHeader {
    /// Parse a v2 object header at `offset`, verifying every checksum
    /// trailer along the way.
    pub fn parse(
        data: &[u8],
        offset: usize,
        _offset_size: u8,
        _length_size: u8,
    ) -> Result<ObjectHeader, FormatError> {
        ensure(data, offset, 6)?;
        if data[offset..offset + 4] != OHDR_SIGNATURE {
            return Err(FormatError::InvalidObjectHeaderSignature);
        }
        let version = data[offset + 4];
        if version != 2 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let flags = data[offset + 5];
        let mut pos = offset + 6;

        let timestamps = if flags & FLAG_TIMES_STORED != 0 {
            ensure(data, pos, 16)?;
            let mut times = [0u32; 4];
            for t in &mut times {
                *t = LittleEndian::read_u32(&data[pos..pos + 4]);
                pos += 4;
            }
            Some(times)
        } else {
            None
        };

        let (max_compact_attrs, min_dense_attrs) = if flags & FLAG_ATTR_PHASE_CHANGE != 0 {
            ensure(data, pos, 4)?;
            let max_compact = LittleEndian::read_u16(&data[pos..pos + 2]);
            let min_dense = LittleEndian::read_u16(&data[pos + 2..pos + 4]);
            pos += 4;
            (Some(max_compact), Some(min_dense))
        } else {
            (None, None)
        };

        let width = match flags & 0x03 {
            0 => 1usize,
            1 => 2,
            2 => 4,
            _ => 8,
        };
        ensure(data, pos, width)?;
        let mut chunk0_size = 0u64;
        for i in 0..width {
            chunk0_size |= (data[pos + i] as u64) << (i * 8);
        }
        pos += width;

        let msg_end = pos + chunk0_size as usize;
        ensure(data, msg_end, 4)?;
        verify_trailer(data, offset, msg_end)?;

        let has_creation_order = flags & FLAG_ATTR_CREATION_TRACKED != 0;
        let mut messages = Vec::new();
        parse_messages(data, pos, msg_end, has_creation_order, &mut messages)?;

        Ok(ObjectHeader {
            version,
            flags,
            max_compact_attrs,
            min_dense_attrs,
            timestamps,
            messages,
        })
    }
}

/// Parse message frames in `[pos, end)`, following continuation messages
/// into their `OCHK` blocks.
fn parse_messages(
    data: &[u8],
    mut pos: usize,
    end: usize,
    has_creation_order: bool,
    out: &mut Vec<HeaderMessage>,
) -> Result<(), FormatError> {
    let frame_overhead = FRAME_OVERHEAD + if has_creation_order { 2 } else { 0 };
    while pos + frame_overhead <= end {
        let msg_type = MessageType::from_u16(data[pos] as u16);
        let size = LittleEndian::read_u16(&data[pos + 1..pos + 3]) as usize;
        let msg_flags = data[pos + 3];
        pos += frame_overhead;

        ensure(data, pos, size)?;
        if pos + size > end {
            return Err(FormatError::UnexpectedEof {
                expected: pos + size,
                available: end,
            });
        }
        let body = &data[pos..pos + size];
        pos += size;

        if msg_type == MessageType::ObjectHeaderContinuation {
            if size < 16 {
                return Err(FormatError::UnexpectedEof {
                    expected: 16,
                    available: size,
                });
            }
            let cont_offset = LittleEndian::read_u64(&body[0..8]) as usize;
            let cont_len = LittleEndian::read_u64(&body[8..16]) as usize;
            ensure(data, cont_offset, cont_len)?;
            if cont_len < 8 || data[cont_offset..cont_offset + 4] != OCHK_SIGNATURE {
                return Err(FormatError::InvalidObjectHeaderSignature);
            }
            verify_trailer(data, cont_offset, cont_offset + cont_len - 4)?;
            parse_messages(
                data,
                cont_offset + 4,
                cont_offset + cont_len - 4,
                has_creation_order,
                out,
            )?;
            continue;
        }

        if msg_type != MessageType::Nil {
            out.push(HeaderMessage {
                msg_type,
                flags: msg_flags,
                data: body.to_vec(),
            });
        }
    }
    Ok(())
}

fn verify_trailer(data: &[u8], start: usize, trailer_pos: usize) -> Result<(), FormatError> {
    let stored = LittleEndian::read_u32(&data[trailer_pos..trailer_pos + 4]);
    let computed = jenkins_lookup3(&data[start..trailer_pos]);
    if stored != computed {
        return Err(FormatError::ChecksumVerifyFailed {
            expected: stored,
            computed,
        });
    }
    Ok(())
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
