//! Tape container data structures

use std::fmt;

// Block flag conventions
pub const HEADER_FLAG: u8 = 0x00;
pub const DATA_FLAG: u8 = 0xFF;

// Header layout constants
pub const HEADER_LEN: usize = 17;
pub const NAME_LEN: usize = 10;
pub const NAME_PAD: u8 = b' ';
pub const NAME_REPLACEMENT: u8 = b'?';

/// Largest value a 16-bit length or parameter field can carry
pub const MAX_FIELD: usize = 0xFFFF;

/// Autostart line written into program headers unless configured otherwise
pub const DEFAULT_AUTOSTART_LINE: u16 = 10;

/// Third parameter of a code header. The ROM expects 32768 here whatever the start address is.
pub const CODE_PARAM2: u16 = 0x8000;

/// XOR-fold of the flag byte and every payload byte
pub fn checksum(flag: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(flag, |acc, b| acc ^ b)
}

/// Frame a payload as a single tape block.
///
/// Output is `length(u16 LE) || flag || payload || checksum`, where the length counts
/// the flag, payload and checksum but not the length field itself.
pub fn frame(flag: u8, payload: &[u8]) -> Result<Vec<u8>, TapError> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    write_framed(&mut out, flag, payload)?;
    Ok(out)
}

/// Append a framed block to `out`. Nothing is written on error.
pub fn write_framed(out: &mut Vec<u8>, flag: u8, payload: &[u8]) -> Result<(), TapError> {
    let len = block_len(payload.len())?;
    out.extend_from_slice(&len.to_le_bytes());
    out.push(flag);
    out.extend_from_slice(payload);
    out.push(checksum(flag, payload));
    Ok(())
}

fn block_len(payload_len: usize) -> Result<u16, TapError> {
    let len = payload_len.saturating_add(2);
    u16::try_from(len).map_err(|_| TapError::EncodingTooLarge { len })
}

/// Narrow a length or address to a 16-bit field, refusing to wrap
pub(crate) fn to_field(field: &'static str, value: usize) -> Result<u16, TapError> {
    u16::try_from(value).map_err(|_| TapError::OutOfRange {
        field,
        value,
        min: 0,
        max: MAX_FIELD,
    })
}

/// One length-prefixed, checksummed unit of a tape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    flag: u8,
    payload: Vec<u8>,
}

impl Block {
    /// Create a block, checking that it fits the 16-bit length field
    pub fn new(flag: u8, payload: impl Into<Vec<u8>>) -> Result<Self, TapError> {
        let payload = payload.into();
        block_len(payload.len())?;
        Ok(Self { flag, payload })
    }

    /// Create a header block (flag 0x00) from a header descriptor
    pub fn header(header: &Header) -> Self {
        Self {
            flag: HEADER_FLAG,
            payload: header.to_bytes().to_vec(),
        }
    }

    /// Create a data block (flag 0xFF)
    pub fn data(payload: impl Into<Vec<u8>>) -> Result<Self, TapError> {
        Self::new(DATA_FLAG, payload)
    }

    pub fn flag(&self) -> u8 {
        self.flag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_header(&self) -> bool {
        self.flag == HEADER_FLAG
    }

    pub fn checksum(&self) -> u8 {
        checksum(self.flag, &self.payload)
    }

    /// Value of the length prefix (flag + payload + checksum)
    pub fn length_field(&self) -> u16 {
        // Checked in the constructors
        (self.payload.len() + 2) as u16
    }

    /// Number of bytes this block occupies on tape, length prefix included
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + 4
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.length_field().to_le_bytes());
        out.push(self.flag);
        out.extend_from_slice(&self.payload);
        out.push(self.checksum());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }
}

/// An ordered sequence of blocks, written back-to-back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    blocks: Vec<Block>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn encoded_len(&self) -> usize {
        self.blocks.iter().map(Block::encoded_len).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for block in &self.blocks {
            block.write_to(&mut out);
        }
        out
    }
}

/// File type carried in the first byte of a header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    /// BASIC program
    Program,
    /// Numeric array
    NumberArray,
    /// Character array
    CharacterArray,
    /// Machine code or raw bytes
    Code,
}

impl HeaderType {
    pub fn to_byte(self) -> u8 {
        match self {
            HeaderType::Program => 0x00,
            HeaderType::NumberArray => 0x01,
            HeaderType::CharacterArray => 0x02,
            HeaderType::Code => 0x03,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(HeaderType::Program),
            0x01 => Some(HeaderType::NumberArray),
            0x02 => Some(HeaderType::CharacterArray),
            0x03 => Some(HeaderType::Code),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HeaderType::Program => "Program",
            HeaderType::NumberArray => "Number array",
            HeaderType::CharacterArray => "Character array",
            HeaderType::Code => "Bytes",
        }
    }
}

/// How names longer than the 10-byte field are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamePolicy {
    /// Keep the first 10 characters
    #[default]
    Truncate,
    /// Refuse names that do not fit
    Strict,
}

/// The 17-byte descriptor carried by a header block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub kind: HeaderType,
    pub name: [u8; NAME_LEN],
    pub param0: u16,
    pub param1: u16,
    pub param2: u16,
}

impl Header {
    /// Program header: param0 and param2 hold the program length, param1 the autostart line
    pub fn program(
        name: &str,
        program_length: usize,
        autostart_line: u16,
        policy: NamePolicy,
    ) -> Result<Self, TapError> {
        let length = to_field("program length", program_length)?;
        Ok(Self {
            kind: HeaderType::Program,
            name: Self::encode_name(name, policy)?,
            param0: length,
            param1: autostart_line,
            param2: length,
        })
    }

    /// Code header: param0 is the code length, param1 the load address
    pub fn code(
        name: &str,
        code_length: usize,
        start_address: usize,
        param2: u16,
        policy: NamePolicy,
    ) -> Result<Self, TapError> {
        Ok(Self {
            kind: HeaderType::Code,
            name: Self::encode_name(name, policy)?,
            param0: to_field("code length", code_length)?,
            param1: to_field("start address", start_address)?,
            param2,
        })
    }

    /// Pad with spaces or cut down to exactly 10 ASCII bytes.
    /// Characters outside ASCII become `?`.
    pub fn encode_name(name: &str, policy: NamePolicy) -> Result<[u8; NAME_LEN], TapError> {
        if policy == NamePolicy::Strict && Self::name_truncated(name) {
            return Err(TapError::NameTooLong {
                name: name.to_string(),
            });
        }

        let mut field = [NAME_PAD; NAME_LEN];
        for (slot, c) in field.iter_mut().zip(name.chars()) {
            *slot = if c.is_ascii() { c as u8 } else { NAME_REPLACEMENT };
        }
        Ok(field)
    }

    /// Whether `name` loses characters when written into a header
    pub fn name_truncated(name: &str) -> bool {
        name.chars().count() > NAME_LEN
    }

    /// The name with trailing padding removed
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name)
            .trim_end_matches(NAME_PAD as char)
            .to_string()
    }

    /// Length of the data block this header announces
    pub fn data_len(&self) -> usize {
        usize::from(self.param0)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.kind.to_byte();
        out[1..11].copy_from_slice(&self.name);
        out[11..13].copy_from_slice(&self.param0.to_le_bytes());
        out[13..15].copy_from_slice(&self.param1.to_le_bytes());
        out[15..17].copy_from_slice(&self.param2.to_le_bytes());
        out
    }

    /// Decode a header block payload
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != HEADER_LEN {
            return Err(DecodeError::InvalidHeader { len: payload.len() });
        }
        let kind = HeaderType::from_byte(payload[0])
            .ok_or(DecodeError::UnknownHeaderType { kind: payload[0] })?;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&payload[1..11]);
        let word = |at: usize| u16::from_le_bytes([payload[at], payload[at + 1]]);
        Ok(Self {
            kind,
            name,
            param0: word(11),
            param1: word(13),
            param2: word(15),
        })
    }
}

/// Build a 17-byte program header with the default autostart line
pub fn build_program_header(name: &str, program_length: usize) -> Result<[u8; HEADER_LEN], TapError> {
    Header::program(name, program_length, DEFAULT_AUTOSTART_LINE, NamePolicy::Truncate)
        .map(|h| h.to_bytes())
}

/// Build a 17-byte code header
pub fn build_code_header(
    name: &str,
    code_length: usize,
    start_address: usize,
) -> Result<[u8; HEADER_LEN], TapError> {
    Header::code(name, code_length, start_address, CODE_PARAM2, NamePolicy::Truncate)
        .map(|h| h.to_bytes())
}

/// Error type for building tape contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapError {
    /// A numeric value does not fit its field
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// A block would not fit the 16-bit length prefix
    EncodingTooLarge { len: usize },

    /// Name longer than 10 characters under `NamePolicy::Strict`
    NameTooLong { name: String },
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapError::OutOfRange { field, value, min, max } => {
                write!(f, "{} {} is out of range ({}..={})", field, value, min, max)
            }
            TapError::EncodingTooLarge { len } => {
                write!(f, "Block length {} exceeds the 16-bit length field", len)
            }
            TapError::NameTooLong { name } => {
                write!(f, "Name '{}' is longer than {} characters", name, NAME_LEN)
            }
        }
    }
}

impl std::error::Error for TapError {}

/// Error type for reading tape contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended inside a block
    UnexpectedEof { offset: usize },

    /// A length prefix of zero (no room for flag or checksum)
    EmptyBlock { offset: usize },

    /// Stored checksum does not match the block contents
    BadChecksum { index: usize, expected: u8, found: u8 },

    /// Header payload is not 17 bytes
    InvalidHeader { len: usize },

    /// Header type byte is not one of 0..=3
    UnknownHeaderType { kind: u8 },

    /// A BASIC line runs past the end of the program
    MalformedLine { offset: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { offset } => {
                write!(f, "Unexpected end of tape at offset {}", offset)
            }
            DecodeError::EmptyBlock { offset } => {
                write!(f, "Block at offset {} is too short to hold a flag and checksum", offset)
            }
            DecodeError::BadChecksum { index, expected, found } => {
                write!(
                    f,
                    "Checksum mismatch in block {}: expected {:#04x}, found {:#04x}",
                    index, expected, found
                )
            }
            DecodeError::InvalidHeader { len } => {
                write!(f, "Header payload is {} bytes, expected {}", len, HEADER_LEN)
            }
            DecodeError::UnknownHeaderType { kind } => {
                write!(f, "Unknown header type {:#04x}", kind)
            }
            DecodeError::MalformedLine { offset } => {
                write!(f, "Malformed BASIC line at offset {}", offset)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
