//! Tape container decoder

use crate::tape::{checksum, Block, Container, DecodeError, Header, HEADER_LEN};

/// A header paired with what follows it on tape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeEntry {
    /// Header followed by its data block
    File { header: Header, data: Block },
    /// Header with no data block after it
    Orphan(Header),
    /// Block not preceded by a header (or not a 17-byte descriptor)
    Headerless(Block),
}

/// Decodes a tape container
pub struct Decoder {
    verify_checksums: bool,
    /// Verbosity level for warnings on stderr
    verbose: u8,
}

impl Decoder {
    /// Create a new decoder that verifies checksums
    pub fn new() -> Self {
        Self {
            verify_checksums: true,
            verbose: 0,
        }
    }

    /// Enable or disable checksum verification
    pub fn with_checksum_check(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set verbosity level (0-3)
    pub fn with_verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    /// Split a tape into its blocks
    pub fn decode(&self, input: &[u8]) -> Result<Container, DecodeError> {
        let mut container = Container::new();
        let mut offset = 0;

        while offset < input.len() {
            let prefix = input
                .get(offset..offset + 2)
                .ok_or(DecodeError::UnexpectedEof { offset })?;
            let len = usize::from(u16::from_le_bytes([prefix[0], prefix[1]]));
            if len < 2 {
                return Err(DecodeError::EmptyBlock { offset });
            }

            let body = input
                .get(offset + 2..offset + 2 + len)
                .ok_or(DecodeError::UnexpectedEof { offset: input.len() })?;
            let flag = body[0];
            let payload = &body[1..len - 1];
            let found = body[len - 1];
            let expected = checksum(flag, payload);

            if found != expected {
                let index = container.blocks().len();
                if self.verify_checksums {
                    return Err(DecodeError::BadChecksum { index, expected, found });
                }
                if self.verbose > 0 {
                    eprintln!(
                        "Warning: Block {} checksum is {:#04x}, expected {:#04x}",
                        index, found, expected
                    );
                }
            }

            let block = Block::new(flag, payload)
                .map_err(|_| DecodeError::UnexpectedEof { offset })?;
            container.push(block);
            offset += 2 + len;
        }

        Ok(container)
    }

    /// Decode a tape and pair each header with the data block after it
    pub fn describe(&self, input: &[u8]) -> Result<Vec<TapeEntry>, DecodeError> {
        let container = self.decode(input)?;
        let mut entries = Vec::new();
        let mut blocks = container.into_blocks().into_iter().peekable();

        while let Some(block) = blocks.next() {
            let header = if block.is_header() && block.payload().len() == HEADER_LEN {
                Header::parse(block.payload()).ok()
            } else {
                None
            };

            match header {
                Some(header) => {
                    let data = blocks.next_if(|next| !next.is_header());
                    entries.push(match data {
                        Some(data) => {
                            if self.verbose > 0 && data.payload().len() != header.data_len() {
                                eprintln!(
                                    "Warning: '{}' announces {} bytes but its block holds {}",
                                    header.name_str(),
                                    header.data_len(),
                                    data.payload().len()
                                );
                            }
                            TapeEntry::File { header, data }
                        }
                        None => TapeEntry::Orphan(header),
                    });
                }
                None => entries.push(TapeEntry::Headerless(block)),
            }
        }

        Ok(entries)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
