//! Tokenized BASIC: numeric literals, program lines and the loader program

use crate::tape::{to_field, DecodeError, TapError, MAX_FIELD};

// Keyword tokens used by the loader
pub const TOKEN_CLEAR: u8 = 0xFD;
pub const TOKEN_LOAD: u8 = 0xEF;
pub const TOKEN_CODE: u8 = 0xAF;
pub const TOKEN_RANDOMIZE: u8 = 0xF9;
pub const TOKEN_USR: u8 = 0xC0;
pub const QUOTE: u8 = b'"';

/// Precedes the hidden 5-byte form of a number
pub const NUMBER_MARKER: u8 = 0x0E;
pub const NUMBER_FORM_LEN: usize = 5;
pub const LINE_END: u8 = 0x0D;

/// Largest value the short-integer literal form can hold
pub const MAX_LITERAL: u32 = 0xFFFF;

/// Encode a number as ASCII digits followed by its hidden 5-byte form
pub fn encode_number(n: u32) -> Result<Vec<u8>, TapError> {
    let mut out = Vec::with_capacity(5 + 1 + NUMBER_FORM_LEN);
    write_number(&mut out, n)?;
    Ok(out)
}

/// Append the literal for `n` to `out`
pub fn write_number(out: &mut Vec<u8>, n: u32) -> Result<(), TapError> {
    if n > MAX_LITERAL {
        return Err(TapError::OutOfRange {
            field: "numeric literal",
            value: n as usize,
            min: 0,
            max: MAX_LITERAL as usize,
        });
    }

    out.extend_from_slice(n.to_string().as_bytes());
    out.push(NUMBER_MARKER);
    if n == 0 {
        out.extend_from_slice(&[0; NUMBER_FORM_LEN]);
    } else {
        let [lo, hi] = (n as u16).to_le_bytes();
        out.extend_from_slice(&[0x00, 0x00, lo, hi, 0x00]);
    }
    Ok(())
}

/// Read a literal written by [`write_number`] from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed, or `None` when the bytes are
/// not a short-integer literal or the visible digits disagree with the hidden form.
pub fn decode_number(bytes: &[u8]) -> Option<(u32, usize)> {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || bytes.get(digits) != Some(&NUMBER_MARKER) {
        return None;
    }

    let form_start = digits + 1;
    let form = bytes.get(form_start..form_start + NUMBER_FORM_LEN)?;
    if form[0] != 0 || form[1] != 0 || form[4] != 0 {
        return None;
    }
    let value = u32::from(u16::from_le_bytes([form[2], form[3]]));

    let text = std::str::from_utf8(&bytes[..digits]).ok()?;
    if text.parse::<u32>().ok()? != value {
        return None;
    }
    Some((value, form_start + NUMBER_FORM_LEN))
}

/// A single numbered program line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLine {
    pub line_number: u16,
    pub tokens: Vec<u8>,
}

impl ProgramLine {
    pub fn new(line_number: u16, tokens: impl Into<Vec<u8>>) -> Self {
        Self {
            line_number,
            tokens: tokens.into(),
        }
    }

    /// Bytes occupied once serialized
    pub fn encoded_len(&self) -> usize {
        2 + 2 + self.tokens.len() + 1
    }

    /// Append `line(u16 BE) || length(u16 LE) || tokens || 0x0D` to `out`.
    /// Line numbers are written as given; ordering is the caller's concern.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), TapError> {
        let body_len = self.tokens.len() + 1;
        let len = u16::try_from(body_len)
            .map_err(|_| TapError::EncodingTooLarge { len: body_len })?;

        out.extend_from_slice(&self.line_number.to_be_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.tokens);
        out.push(LINE_END);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TapError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Render the line as text, e.g. `10 CLEAR 32767`.
    ///
    /// Only the keywords the loader uses are known; other tokens show as `{0xNN}`.
    pub fn to_text(&self) -> String {
        let mut text = self.line_number.to_string();
        let mut rest = self.tokens.as_slice();
        let mut after_keyword = true;

        while let Some(&byte) = rest.first() {
            if let Some((value, used)) = decode_number(rest) {
                if after_keyword {
                    text.push(' ');
                }
                text.push_str(&value.to_string());
                rest = &rest[used..];
                after_keyword = false;
                continue;
            }

            match keyword(byte) {
                Some(word) => {
                    text.push(' ');
                    text.push_str(word);
                    after_keyword = true;
                }
                None => {
                    if after_keyword {
                        text.push(' ');
                    }
                    if byte.is_ascii_graphic() || byte == b' ' {
                        text.push(byte as char);
                    } else {
                        text.push_str(&format!("{{{:#04x}}}", byte));
                    }
                    after_keyword = false;
                }
            }
            rest = &rest[1..];
        }
        text
    }
}

fn keyword(token: u8) -> Option<&'static str> {
    match token {
        TOKEN_CLEAR => Some("CLEAR"),
        TOKEN_LOAD => Some("LOAD"),
        TOKEN_CODE => Some("CODE"),
        TOKEN_RANDOMIZE => Some("RANDOMIZE"),
        TOKEN_USR => Some("USR"),
        _ => None,
    }
}

/// Split a program block payload back into lines
pub fn parse_program(bytes: &[u8]) -> Result<Vec<ProgramLine>, DecodeError> {
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let head = bytes
            .get(offset..offset + 4)
            .ok_or(DecodeError::MalformedLine { offset })?;
        let line_number = u16::from_be_bytes([head[0], head[1]]);
        let len = usize::from(u16::from_le_bytes([head[2], head[3]]));

        let body = bytes
            .get(offset + 4..offset + 4 + len)
            .ok_or(DecodeError::MalformedLine { offset })?;
        match body.split_last() {
            Some((&LINE_END, tokens)) => lines.push(ProgramLine::new(line_number, tokens)),
            _ => return Err(DecodeError::MalformedLine { offset }),
        }
        offset += 4 + len;
    }
    Ok(lines)
}

/// Line numbers of the three loader statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLines {
    /// `CLEAR start-1`
    pub clear: u16,
    /// `LOAD ""CODE`
    pub load: u16,
    /// `RANDOMIZE USR start`
    pub run: u16,
}

impl Default for LoaderLines {
    fn default() -> Self {
        Self {
            clear: 10,
            load: 20,
            run: 30,
        }
    }
}

/// The loader program as separate lines:
///
/// ```text
/// 10 CLEAR <start-1>
/// 20 LOAD ""CODE
/// 30 RANDOMIZE USR <start>
/// ```
pub fn loader_lines(start_address: u32, lines: &LoaderLines) -> Result<Vec<ProgramLine>, TapError> {
    if start_address == 0 || start_address > MAX_LITERAL {
        return Err(TapError::OutOfRange {
            field: "start address",
            value: start_address as usize,
            min: 1,
            max: MAX_FIELD,
        });
    }

    let mut clear = vec![TOKEN_CLEAR];
    write_number(&mut clear, start_address - 1)?;

    let load = vec![TOKEN_LOAD, QUOTE, QUOTE, TOKEN_CODE];

    let mut run = vec![TOKEN_RANDOMIZE, TOKEN_USR];
    write_number(&mut run, start_address)?;

    Ok(vec![
        ProgramLine::new(lines.clear, clear),
        ProgramLine::new(lines.load, load),
        ProgramLine::new(lines.run, run),
    ])
}

/// Build the unframed loader program using lines 10, 20 and 30
pub fn build_loader(start_address: u32) -> Result<Vec<u8>, TapError> {
    build_loader_with(start_address, &LoaderLines::default())
}

/// Build the unframed loader program with the given line numbers
pub fn build_loader_with(start_address: u32, lines: &LoaderLines) -> Result<Vec<u8>, TapError> {
    let program = loader_lines(start_address, lines)?;
    let mut out = Vec::with_capacity(program.iter().map(ProgramLine::encoded_len).sum());
    for line in &program {
        line.write_to(&mut out)?;
    }
    // The program header stores this length in 16-bit fields
    to_field("program length", out.len())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_zero() {
        assert_eq!(
            encode_number(0).unwrap(),
            vec![b'0', 0x0E, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_encode_values() {
        assert_eq!(
            encode_number(32767).unwrap(),
            b"32767\x0e\x00\x00\xff\x7f\x00".to_vec()
        );
        assert_eq!(encode_number(1).unwrap(), b"1\x0e\x00\x00\x01\x00\x00".to_vec());
        assert_eq!(
            encode_number(65535).unwrap(),
            b"65535\x0e\x00\x00\xff\xff\x00".to_vec()
        );
    }

    #[test]
    fn test_encode_out_of_range() {
        assert!(matches!(
            encode_number(65536),
            Err(TapError::OutOfRange { value: 65536, max: 65535, .. })
        ));
    }

    #[test]
    fn test_literal_forms_agree() {
        for n in [0u32, 1, 9, 10, 255, 256, 1000, 23759, 32768, 65534, 65535] {
            let bytes = encode_number(n).unwrap();
            let digits = bytes.iter().position(|&b| b == NUMBER_MARKER).unwrap();
            let text = std::str::from_utf8(&bytes[..digits]).unwrap();
            assert_eq!(text.parse::<u32>().unwrap(), n);

            let form = &bytes[digits + 1..];
            assert_eq!(form.len(), NUMBER_FORM_LEN);
            assert_eq!(u32::from(form[2]) + u32::from(form[3]) * 256, n);

            assert_eq!(decode_number(&bytes), Some((n, bytes.len())));
        }
    }

    #[test]
    fn test_decode_number_rejects_mismatch() {
        // Visible "5" but hidden 6
        let bytes = [b'5', NUMBER_MARKER, 0, 0, 6, 0, 0];
        assert_eq!(decode_number(&bytes), None);
        assert_eq!(decode_number(b"12"), None);
        assert_eq!(decode_number(&[b'1', NUMBER_MARKER, 0, 0]), None);
    }

    #[test]
    fn test_program_line_layout() {
        let line = ProgramLine::new(20, vec![TOKEN_LOAD, QUOTE, QUOTE, TOKEN_CODE]);
        assert_eq!(
            line.to_bytes().unwrap(),
            vec![0x00, 0x14, 0x05, 0x00, 0xEF, 0x22, 0x22, 0xAF, 0x0D]
        );
        assert_eq!(line.encoded_len(), 9);
    }

    #[test]
    fn test_program_line_big_endian_number() {
        let line = ProgramLine::new(0x1234, Vec::new());
        assert_eq!(line.to_bytes().unwrap(), vec![0x12, 0x34, 0x01, 0x00, 0x0D]);
    }

    #[test]
    fn test_program_line_too_long() {
        let line = ProgramLine::new(10, vec![0u8; MAX_FIELD]);
        assert_eq!(
            line.to_bytes(),
            Err(TapError::EncodingTooLarge { len: MAX_FIELD + 1 })
        );
    }

    #[test]
    fn test_build_loader_bytes() {
        let loader = build_loader(0x8000).unwrap();

        let mut expected = vec![0x00, 0x0A, 0x0D, 0x00, TOKEN_CLEAR];
        expected.extend_from_slice(b"32767\x0e\x00\x00\xff\x7f\x00");
        expected.push(LINE_END);
        expected.extend_from_slice(&[0x00, 0x14, 0x05, 0x00, 0xEF, 0x22, 0x22, 0xAF, 0x0D]);
        expected.extend_from_slice(&[0x00, 0x1E, 0x0E, 0x00, TOKEN_RANDOMIZE, TOKEN_USR]);
        expected.extend_from_slice(b"32768\x0e\x00\x00\x00\x80\x00");
        expected.push(LINE_END);

        assert_eq!(loader, expected);
    }

    #[test]
    fn test_build_loader_start_one() {
        let lines = loader_lines(1, &LoaderLines::default()).unwrap();
        assert_eq!(lines[0].tokens[1..], encode_number(0).unwrap()[..]);
        assert_eq!(lines[2].tokens[2..], encode_number(1).unwrap()[..]);
    }

    #[test]
    fn test_build_loader_out_of_range() {
        assert!(matches!(
            build_loader(0),
            Err(TapError::OutOfRange { field: "start address", value: 0, .. })
        ));
        assert!(matches!(
            build_loader(65536),
            Err(TapError::OutOfRange { field: "start address", value: 65536, .. })
        ));
        assert!(build_loader(65535).is_ok());
    }

    #[test]
    fn test_custom_line_numbers() {
        let lines = LoaderLines { clear: 1, load: 2, run: 9000 };
        let loader = build_loader_with(0x6000, &lines).unwrap();
        let parsed = parse_program(&loader).unwrap();
        let numbers: Vec<u16> = parsed.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2, 9000]);
    }

    #[test]
    fn test_parse_program_roundtrip() {
        let loader = build_loader(0x8000).unwrap();
        let parsed = parse_program(&loader).unwrap();
        assert_eq!(parsed, loader_lines(0x8000, &LoaderLines::default()).unwrap());
    }

    #[test]
    fn test_parse_program_malformed() {
        let mut loader = build_loader(0x8000).unwrap();
        loader.pop();
        assert!(matches!(parse_program(&loader), Err(DecodeError::MalformedLine { .. })));
        assert_eq!(parse_program(&[0x00, 0x0A]), Err(DecodeError::MalformedLine { offset: 0 }));
    }

    #[test]
    fn test_loader_listing() {
        let loader = build_loader(0x8000).unwrap();
        let text: Vec<String> = parse_program(&loader)
            .unwrap()
            .iter()
            .map(ProgramLine::to_text)
            .collect();
        assert_eq!(
            text,
            vec![
                "10 CLEAR 32767".to_string(),
                "20 LOAD \"\" CODE".to_string(),
                "30 RANDOMIZE USR 32768".to_string(),
            ]
        );
    }
}
