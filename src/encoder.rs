//! Tape container encoder

use crate::basic::{build_loader_with, LoaderLines};
use crate::tape::{Block, Container, Header, NamePolicy, TapError, CODE_PARAM2};
use anyhow::{Context, Result};

/// Constants the encoder writes into headers and the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Line numbers of the loader statements
    pub loader: LoaderLines,
    /// Line the program header asks the ROM to start from
    pub autostart_line: u16,
    /// Third parameter of the code header
    pub code_param2: u16,
    /// What to do with names longer than 10 characters
    pub name_policy: NamePolicy,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        let loader = LoaderLines::default();
        Self {
            autostart_line: loader.clear,
            loader,
            code_param2: CODE_PARAM2,
            name_policy: NamePolicy::Truncate,
        }
    }
}

/// What went into an encoded tape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Loader program length, if a loader was written
    pub loader_len: Option<usize>,
    pub autostart_line: Option<u16>,
    pub code_len: usize,
    pub start_address: u16,
    pub total_len: usize,
}

/// Encodes machine code, with an optional BASIC loader, into a tape container
pub struct Encoder {
    config: EncoderConfig,
    /// Verbosity level for warnings on stderr
    verbose: u8,
}

impl Encoder {
    /// Create a new encoder with the default configuration
    pub fn new() -> Self {
        Self {
            config: EncoderConfig::default(),
            verbose: 0,
        }
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set verbosity level (0-3)
    pub fn with_verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Build the container blocks.
    ///
    /// Order is `[program header, program data]`, code header, code data. Every check
    /// runs before the container is returned, so an error never leaves partial output.
    pub fn encode_container(
        &self,
        code: &[u8],
        name: &str,
        start_address: u32,
        include_loader: bool,
    ) -> Result<Container, TapError> {
        let config = &self.config;
        let code_header = Header::code(
            name,
            code.len(),
            start_address as usize,
            config.code_param2,
            config.name_policy,
        )?;

        if self.verbose > 0 && Header::name_truncated(name) {
            eprintln!(
                "Warning: Name '{}' truncated to '{}'",
                name,
                code_header.name_str()
            );
        }

        let mut container = Container::new();

        if include_loader {
            let loader = build_loader_with(start_address, &config.loader)?;
            let program_header =
                Header::program(name, loader.len(), config.autostart_line, config.name_policy)?;
            container.push(Block::header(&program_header));
            container.push(Block::data(loader)?);
        }

        container.push(Block::header(&code_header));
        container.push(Block::data(code)?);

        if self.verbose > 1 {
            for (index, block) in container.blocks().iter().enumerate() {
                eprintln!(
                    "Block {}: flag {:#04x}, {} bytes, checksum {:#04x}",
                    index,
                    block.flag(),
                    block.payload().len(),
                    block.checksum()
                );
            }
        }

        Ok(container)
    }

    /// Encode to the container bytes
    pub fn encode(
        &self,
        code: &[u8],
        name: &str,
        start_address: u32,
        include_loader: bool,
    ) -> Result<Vec<u8>, TapError> {
        self.encode_container(code, name, start_address, include_loader)
            .map(|c| c.to_bytes())
    }

    /// Encode and report what was written
    pub fn encode_with_summary(
        &self,
        code: &[u8],
        name: &str,
        start_address: u32,
        include_loader: bool,
    ) -> Result<(Vec<u8>, EncodeSummary), TapError> {
        let container = self.encode_container(code, name, start_address, include_loader)?;
        let loader_len = include_loader.then(|| container.blocks()[1].payload().len());

        let summary = EncodeSummary {
            loader_len,
            autostart_line: loader_len.map(|_| self.config.autostart_line),
            code_len: code.len(),
            // Range checked by the code header
            start_address: start_address as u16,
            total_len: container.encoded_len(),
        };
        Ok((container.to_bytes(), summary))
    }

    /// Encode directly to a writer
    pub fn encode_to_writer<W: std::io::Write>(
        &self,
        code: &[u8],
        name: &str,
        start_address: u32,
        include_loader: bool,
        mut writer: W,
    ) -> Result<()> {
        let encoded = self.encode(code, name, start_address, include_loader)?;
        writer.write_all(&encoded)?;
        Ok(())
    }

    /// Encode to a file
    pub fn encode_to_file(
        &self,
        code: &[u8],
        name: &str,
        start_address: u32,
        include_loader: bool,
        path: &std::path::Path,
    ) -> Result<()> {
        let encoded = self.encode(code, name, start_address, include_loader)?;
        std::fs::write(path, encoded)
            .with_context(|| format!("Failed to write: {}", path.display()))?;
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a tape with the default configuration
pub fn assemble(
    code: &[u8],
    name: &str,
    start_address: u32,
    include_loader: bool,
) -> Result<Vec<u8>, TapError> {
    Encoder::new().encode(code, name, start_address, include_loader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::build_loader;
    use crate::tape::{
        build_code_header, build_program_header, frame, DATA_FLAG, HEADER_FLAG, MAX_FIELD,
    };

    /// Split raw container bytes into (flag, payload, checksum) triples
    fn split_blocks(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>, u8)> {
        let mut blocks = Vec::new();
        while !bytes.is_empty() {
            let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
            let body = &bytes[2..2 + len];
            blocks.push((body[0], body[1..len - 1].to_vec(), body[len - 1]));
            bytes = &bytes[2 + len..];
        }
        blocks
    }

    #[test]
    fn test_assemble_without_loader() {
        let code = [0x3E, 0x05, 0xC9];
        let tape = assemble(&code, "T", 0x8000, false).unwrap();
        let blocks = split_blocks(&tape);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, HEADER_FLAG);
        assert_eq!(blocks[0].1[0], 0x03);
        assert_eq!(blocks[1].0, DATA_FLAG);
        assert_eq!(blocks[1].1, code.to_vec());
        assert_eq!(blocks[1].2, 0xFF ^ 0x3E ^ 0x05 ^ 0xC9);
    }

    #[test]
    fn test_assemble_with_loader() {
        let code = vec![0xC9; 10];
        let tape = assemble(&code, "T", 0x8000, true).unwrap();
        let blocks = split_blocks(&tape);

        assert_eq!(blocks.len(), 4);
        let flags: Vec<u8> = blocks.iter().map(|b| b.0).collect();
        assert_eq!(flags, vec![HEADER_FLAG, DATA_FLAG, HEADER_FLAG, DATA_FLAG]);
        assert_eq!(blocks[0].1[0], 0x00);
        assert_eq!(blocks[1].1, build_loader(0x8000).unwrap());
        assert_eq!(blocks[2].1[0], 0x03);
        assert_eq!(blocks[3].1, code);
    }

    #[test]
    fn test_assemble_matches_hand_framed_blocks() {
        let code = [0x3E, 0x05, 0xC9];
        let loader = build_loader(0x8000).unwrap();

        let program_header = build_program_header("T", loader.len()).unwrap();
        let code_header = build_code_header("T", 3, 0x8000).unwrap();

        let mut expected = Vec::new();
        expected.extend(frame(HEADER_FLAG, &program_header).unwrap());
        expected.extend(frame(DATA_FLAG, &loader).unwrap());
        expected.extend(frame(HEADER_FLAG, &code_header).unwrap());
        expected.extend(frame(DATA_FLAG, &code).unwrap());

        assert_eq!(assemble(&code, "T", 0x8000, true).unwrap(), expected);
    }

    #[test]
    fn test_names_match_in_both_headers() {
        let tape = assemble(&[0], "TicTacToe", 0x8000, true).unwrap();
        let blocks = split_blocks(&tape);
        assert_eq!(&blocks[0].1[1..11], b"TicTacToe ");
        assert_eq!(&blocks[0].1[1..11], &blocks[2].1[1..11]);
    }

    #[test]
    fn test_program_header_lengths() {
        let tape = assemble(&[0], "T", 0x8000, true).unwrap();
        let blocks = split_blocks(&tape);
        let loader_len = blocks[1].1.len() as u16;
        let header = &blocks[0].1;
        assert_eq!(u16::from_le_bytes([header[11], header[12]]), loader_len);
        assert_eq!(u16::from_le_bytes([header[13], header[14]]), 10);
        assert_eq!(u16::from_le_bytes([header[15], header[16]]), loader_len);
    }

    #[test]
    fn test_code_too_long() {
        let code = vec![0u8; 70000];
        assert!(matches!(
            assemble(&code, "T", 0x8000, true),
            Err(TapError::OutOfRange { field: "code length", value: 70000, .. })
        ));
        assert!(matches!(
            Encoder::new().encode(&code, "T", 0x8000, false),
            Err(TapError::OutOfRange { field: "code length", .. })
        ));
    }

    #[test]
    fn test_start_zero() {
        assert!(matches!(
            assemble(&[0xC9], "T", 0, true),
            Err(TapError::OutOfRange { field: "start address", value: 0, .. })
        ));
        // Without a loader nothing needs start - 1
        assert!(assemble(&[0xC9], "T", 0, false).is_ok());
    }

    #[test]
    fn test_start_too_large() {
        assert!(matches!(
            assemble(&[0xC9], "T", 0x10000, false),
            Err(TapError::OutOfRange { field: "start address", .. })
        ));
    }

    #[test]
    fn test_largest_code_block() {
        let code = vec![0u8; MAX_FIELD - 2];
        assert!(assemble(&code, "T", 0x8000, false).is_ok());

        let code = vec![0u8; MAX_FIELD - 1];
        assert!(matches!(
            assemble(&code, "T", 0x8000, false),
            Err(TapError::EncodingTooLarge { .. })
        ));
    }

    #[test]
    fn test_custom_config() {
        let config = EncoderConfig {
            loader: LoaderLines { clear: 100, load: 110, run: 120 },
            autostart_line: 100,
            code_param2: 0x1234,
            name_policy: NamePolicy::Truncate,
        };
        let encoder = Encoder::new().with_config(config);
        let tape = encoder.encode(&[0xC9], "T", 0x6000, true).unwrap();
        let blocks = split_blocks(&tape);

        assert_eq!(u16::from_le_bytes([blocks[0].1[13], blocks[0].1[14]]), 100);
        assert_eq!(u16::from_be_bytes([blocks[1].1[0], blocks[1].1[1]]), 100);
        assert_eq!(u16::from_le_bytes([blocks[2].1[15], blocks[2].1[16]]), 0x1234);
    }

    #[test]
    fn test_strict_names() {
        let config = EncoderConfig {
            name_policy: NamePolicy::Strict,
            ..EncoderConfig::default()
        };
        let encoder = Encoder::new().with_config(config);
        assert!(matches!(
            encoder.encode(&[0xC9], "TwelveChars!", 0x8000, true),
            Err(TapError::NameTooLong { .. })
        ));
        assert!(encoder.encode(&[0xC9], "Short", 0x8000, true).is_ok());
    }

    #[test]
    fn test_summary() {
        let (bytes, summary) = Encoder::new()
            .encode_with_summary(&[1, 2, 3], "T", 0x8000, true)
            .unwrap();
        assert_eq!(summary.loader_len, Some(build_loader(0x8000).unwrap().len()));
        assert_eq!(summary.autostart_line, Some(10));
        assert_eq!(summary.code_len, 3);
        assert_eq!(summary.start_address, 0x8000);
        assert_eq!(summary.total_len, bytes.len());

        let (_, summary) = Encoder::new()
            .encode_with_summary(&[1, 2, 3], "T", 0x8000, false)
            .unwrap();
        assert_eq!(summary.loader_len, None);
        assert_eq!(summary.autostart_line, None);
    }

    #[test]
    fn test_encode_to_writer() {
        let mut out = Vec::new();
        Encoder::new()
            .encode_to_writer(&[0xC9], "T", 0x8000, false, &mut out)
            .unwrap();
        assert_eq!(out, assemble(&[0xC9], "T", 0x8000, false).unwrap());
    }

    #[test]
    fn test_encode_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.tap");
        Encoder::new()
            .encode_to_file(&[0x3E, 0x05, 0xC9], "game", 0x8000, true, &path)
            .unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, assemble(&[0x3E, 0x05, 0xC9], "game", 0x8000, true).unwrap());
    }
}
