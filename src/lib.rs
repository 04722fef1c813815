//! # zx-tap
//!
//! ZX Spectrum `.tap` container encoder with BASIC loader synthesis.
//!
//! A `.tap` file is a sequence of blocks, written back-to-back:
//!
//! ```text
//! length:u16-LE  flag:u8  payload  checksum:u8
//! ```
//!
//! `length` counts the flag, payload and checksum. The checksum is the XOR of the
//! flag and every payload byte. Flag `0x00` marks a 17-byte header, flag `0xFF` the
//! data block that follows it.
//!
//! ## Headers
//!
//! ```text
//! type:u8  name:u8[10]  param0:u16-LE  param1:u16-LE  param2:u16-LE
//! ```
//!
//! - Program (type 0): length, autostart line, length
//! - Code (type 3): length, start address, 32768
//!
//! ## Loader
//!
//! With a loader the tape starts with a tokenized BASIC program that autostarts at
//! line 10:
//!
//! ```text
//! 10 CLEAR 32767
//! 20 LOAD ""CODE
//! 30 RANDOMIZE USR 32768
//! ```
//!
//! Numbers in the program are stored twice: as visible ASCII digits, and after a
//! `0x0E` marker as a hidden 5-byte form that the interpreter actually uses.
//!
//! ## Example
//!
//! ```rust
//! let tape = zx_tap::assemble(&[0x3E, 0x05, 0xC9], "demo", 0x8000, true)?;
//! let entries = zx_tap::Decoder::new().describe(&tape)?;
//! assert_eq!(entries.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod tape;
pub mod basic;
pub mod encoder;
pub mod decoder;

pub use tape::{
    Block, Container, Header, HeaderType, NamePolicy,
    TapError, DecodeError,
    frame, checksum, build_program_header, build_code_header,
};
pub use basic::{
    ProgramLine, LoaderLines,
    encode_number, decode_number, build_loader, build_loader_with, parse_program,
};
pub use encoder::{Encoder, EncoderConfig, EncodeSummary, assemble};
pub use decoder::{Decoder, TapeEntry};
