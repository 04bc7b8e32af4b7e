//! TLV data block codec
//!
//! Every stored record is a block laid out as
//!
//! ```text
//! +-------------+---------------+----------------+
//! | type: u16LE | length: u32LE | data: [length] |
//! +-------------+---------------+----------------+
//! ```
//!
//! Readers skip block types they do not know, so new types can be added
//! without breaking files written by older versions.

use std::io::{self, ErrorKind, Read};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BlockError;

/// Size of the type tag
pub const BLOCK_TYPE_SIZE: usize = 2;
/// Size of the length field
pub const BLOCK_LENGTH_SIZE: usize = 4;
/// Size of a full block header
pub const BLOCK_HEADER_SIZE: usize = BLOCK_TYPE_SIZE + BLOCK_LENGTH_SIZE;
/// Largest block a reader accepts unless configured otherwise
pub const DEFAULT_MAX_BLOCK_LENGTH: u64 = 10 * 1024 * 1024; // 10MB

/// Kind of payload a block carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Event payload
    Event,
    /// Metadata for the event block that follows
    EventMetadata,
}

impl BlockType {
    /// Wire tag
    pub const fn tag(self) -> u16 {
        match self {
            BlockType::Event => 0x0000,
            BlockType::EventMetadata => 0x0001,
        }
    }

    /// Parse a wire tag, `None` for tags this version does not know
    pub const fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0x0000 => Some(BlockType::Event),
            0x0001 => Some(BlockType::EventMetadata),
            _ => None,
        }
    }
}

/// A typed chunk of bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub block_type: BlockType,
    pub data: Bytes,
}

impl DataBlock {
    pub fn new(block_type: BlockType, data: impl Into<Bytes>) -> Self {
        Self {
            block_type,
            data: data.into(),
        }
    }

    /// An [`BlockType::Event`] block
    pub fn event(data: impl Into<Bytes>) -> Self {
        Self::new(BlockType::Event, data)
    }

    /// An [`BlockType::EventMetadata`] block
    pub fn metadata(data: impl Into<Bytes>) -> Self {
        Self::new(BlockType::EventMetadata, data)
    }

    /// Number of bytes this block occupies once serialized
    pub fn framed_len(&self) -> usize {
        BLOCK_HEADER_SIZE + self.data.len()
    }

    /// Serialize into a fresh buffer
    pub fn serialize(&self) -> Result<Vec<u8>, BlockError> {
        let mut out = BytesMut::with_capacity(self.framed_len());
        self.serialize_into(&mut out)?;
        Ok(out.to_vec())
    }

    /// Append the serialized block to `out`
    pub fn serialize_into(&self, out: &mut BytesMut) -> Result<(), BlockError> {
        let length = u32::try_from(self.data.len()).map_err(|_| BlockError::DataLengthExceedsLimit {
            length: self.data.len(),
        })?;
        out.reserve(self.framed_len());
        out.put_u16_le(self.block_type.tag());
        out.put_u32_le(length);
        out.put_slice(&self.data);
        Ok(())
    }
}

/// Streaming block decoder.
///
/// Iterating yields blocks until the input ends cleanly. A truncated
/// block, a read failure or an oversized length yields one error and then
/// ends the iteration; blocks read before the failure remain valid.
pub struct DataBlockReader<R> {
    input: R,
    max_block_length: u64,
    failed: bool,
}

impl<R: Read> DataBlockReader<R> {
    /// Create a reader with the default length limit
    pub fn new(input: R) -> Self {
        Self {
            input,
            max_block_length: DEFAULT_MAX_BLOCK_LENGTH,
            failed: false,
        }
    }

    /// Reject blocks whose declared length is above `limit`
    pub fn with_max_block_length(mut self, limit: u64) -> Self {
        self.max_block_length = limit;
        self
    }

    /// Decode every remaining block, failing on the first malformed one
    pub fn all(self) -> Result<Vec<DataBlock>, BlockError> {
        self.collect()
    }

    fn read_block(&mut self) -> Result<Option<DataBlock>, BlockError> {
        loop {
            let mut header = [0u8; BLOCK_HEADER_SIZE];
            if !read_header(&mut self.input, &mut header)? {
                return Ok(None);
            }

            let tag = u16::from_le_bytes([header[0], header[1]]);
            let length = u64::from(u32::from_le_bytes([header[2], header[3], header[4], header[5]]));

            if length > self.max_block_length {
                return Err(BlockError::BytesLengthExceedsLimit {
                    length,
                    limit: self.max_block_length,
                });
            }

            let Some(block_type) = BlockType::from_tag(tag) else {
                let skipped = io::copy(&mut (&mut self.input).take(length), &mut io::sink())
                    .map_err(|e| BlockError::ReadOperationFailed(e.to_string()))?;
                if skipped < length {
                    return Err(BlockError::ReadOperationFailed(format!(
                        "unknown block type {tag:#06x} truncated after {skipped} of {length} bytes"
                    )));
                }
                continue;
            };

            let mut data = Vec::new();
            (&mut self.input)
                .take(length)
                .read_to_end(&mut data)
                .map_err(|e| BlockError::ReadOperationFailed(e.to_string()))?;
            if (data.len() as u64) < length {
                return Err(BlockError::ReadOperationFailed(format!(
                    "block truncated after {} of {length} bytes",
                    data.len()
                )));
            }

            return Ok(Some(DataBlock::new(block_type, data)));
        }
    }
}

impl<R: Read> Iterator for DataBlockReader<R> {
    type Item = Result<DataBlock, BlockError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_block() {
            Ok(block) => block.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `header`, returning `false` on a clean end of input
fn read_header<R: Read>(input: &mut R, header: &mut [u8; BLOCK_HEADER_SIZE]) -> Result<bool, BlockError> {
    let mut filled = 0;
    while filled < header.len() {
        match input.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(BlockError::ReadOperationFailed(format!(
                    "block header truncated after {filled} bytes"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BlockError::ReadOperationFailed(e.to_string())),
        }
    }
    Ok(true)
}
