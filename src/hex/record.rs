use std::num::Wrapping;

use combine::parser::char::hex_digit;
use combine::{eof, many, Parser};
use lazy_static::lazy_static;
use thiserror::Error;

use super::hexcrc::ihex_checksum;

pub const MARKER: char = ':';

/// Largest payload the one-byte count field can describe.
pub const MAX_PAYLOAD: usize = 255;

/// Characters in a record without payload: `:<SS><AAAA><TT><CC><eol>`.
pub const CHARS_IN_EMPTY_RECORD: usize = 1 + 2 + 4 + 2 + 2 + 1;

/// Filler used by the `Pad` and `EndBlock` records.
pub const PAD_BYTE: u8 = 0xFF;

// Count, address (2), kind and checksum
const OVERHEAD_BYTES: usize = 5;

lazy_static! {
    static ref HEX_TABLE: String = make_hex_table();
}

fn make_hex_table() -> String {
    let mut table = String::with_capacity(512);
    for i in 0..256u32 {
        table.push_str(&format!("{:02X}", i & 0xff));
    }
    table
}

fn push_hex(line: &mut String, byte: u8) {
    let s = byte as usize * 2;
    line.push_str(&HEX_TABLE[s..s + 2]);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("bad record missing ':'")]
    MissingMarker,
    #[error("bad record, invalid hex digits")]
    InvalidHex,
    #[error("bad record, only {len} bytes")]
    Truncated { len: usize },
    #[error("unsupported record type {0:02X}")]
    UnknownKind(u8),
    #[error("record payload too long ({len} bytes, max 255)")]
    PayloadTooLong { len: usize },
    #[error("checksum fail [{sum:02X}]")]
    Checksum { sum: u8 },
}

/**
 * Record types: the six standard IHEX types, plus the four block types of the
 * micro:bit universal hex format.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
    StartBlock,
    EndBlock,
    Pad,
    DataV2,
}

impl RecordKind {
    pub const fn code(self) -> u8 {
        match self {
            RecordKind::Data => 0x00,
            RecordKind::EndOfFile => 0x01,
            RecordKind::ExtendedSegmentAddress => 0x02,
            RecordKind::StartSegmentAddress => 0x03,
            RecordKind::ExtendedLinearAddress => 0x04,
            RecordKind::StartLinearAddress => 0x05,
            RecordKind::StartBlock => 0x0A,
            RecordKind::EndBlock => 0x0B,
            RecordKind::Pad => 0x0C,
            RecordKind::DataV2 => 0x0D,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(RecordKind::Data),
            0x01 => Some(RecordKind::EndOfFile),
            0x02 => Some(RecordKind::ExtendedSegmentAddress),
            0x03 => Some(RecordKind::StartSegmentAddress),
            0x04 => Some(RecordKind::ExtendedLinearAddress),
            0x05 => Some(RecordKind::StartLinearAddress),
            0x0A => Some(RecordKind::StartBlock),
            0x0B => Some(RecordKind::EndBlock),
            0x0C => Some(RecordKind::Pad),
            0x0D => Some(RecordKind::DataV2),
            _ => None,
        }
    }
}

/**
 * A single line of an IHEX file.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind: RecordKind,
    address: u16,
    payload: Vec<u8>,
}

impl Record {
    pub fn new(kind: RecordKind, address: u16, payload: Vec<u8>) -> Result<Self, RecordError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(RecordError::PayloadTooLong { len: payload.len() });
        }
        Ok(Self {
            kind,
            address,
            payload,
        })
    }

    pub fn data(address: u16, payload: Vec<u8>) -> Result<Self, RecordError> {
        Self::new(RecordKind::Data, address, payload)
    }

    pub fn end_of_file() -> Self {
        Self {
            kind: RecordKind::EndOfFile,
            address: 0,
            payload: Vec::new(),
        }
    }

    /// Sets the upper 16 bits of the load address.
    pub fn extended_linear_address(upper: u16) -> Self {
        Self {
            kind: RecordKind::ExtendedLinearAddress,
            address: 0,
            payload: upper.to_be_bytes().to_vec(),
        }
    }

    pub fn start_block(block_type: u32) -> Self {
        Self {
            kind: RecordKind::StartBlock,
            address: 0,
            payload: block_type.to_be_bytes().to_vec(),
        }
    }

    pub fn pad(len: u8) -> Self {
        Self {
            kind: RecordKind::Pad,
            address: 0,
            payload: vec![PAD_BYTE; len as usize],
        }
    }

    pub fn end_block(len: u8) -> Self {
        Self {
            kind: RecordKind::EndBlock,
            address: 0,
            payload: vec![PAD_BYTE; len as usize],
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn retag(&mut self, kind: RecordKind) {
        self.kind = kind;
    }

    /// Upper half of the load address, for well-formed `ExtendedLinearAddress`
    /// records.
    pub fn linear_address(&self) -> Option<u16> {
        match (self.kind, self.payload.as_slice()) {
            (RecordKind::ExtendedLinearAddress, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// Number of characters `encode` produces, line ending included.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() * 2 + CHARS_IN_EMPTY_RECORD
    }

    pub fn decode(line: &str) -> Result<Self, RecordError> {
        let digits = line
            .trim_end()
            .strip_prefix(MARKER)
            .ok_or(RecordError::MissingMarker)?;
        let (bytes, _) = hex_bytes()
            .parse(digits)
            .map_err(|_| RecordError::InvalidHex)?;
        if bytes.len() < OVERHEAD_BYTES {
            return Err(RecordError::Truncated { len: bytes.len() });
        }

        let sum = bytes.iter().fold(Wrapping(0u8), |s, x| s + Wrapping(*x)).0;
        if sum != 0 {
            return Err(RecordError::Checksum { sum });
        }

        // The count byte is covered by the checksum, and is not checked again
        let kind = RecordKind::from_code(bytes[3]).ok_or(RecordError::UnknownKind(bytes[3]))?;
        let address = u16::from_be_bytes([bytes[1], bytes[2]]);
        Self::new(kind, address, bytes[4..bytes.len() - 1].to_vec())
    }

    pub fn encode(&self) -> String {
        let [hi, lo] = self.address.to_be_bytes();
        let mut bytes = Vec::with_capacity(self.payload.len() + OVERHEAD_BYTES);
        bytes.extend([self.payload.len() as u8, hi, lo, self.kind.code()]);
        bytes.extend_from_slice(&self.payload);
        bytes.push(ihex_checksum(&bytes));

        let mut line = String::with_capacity(self.encoded_len());
        line.push(MARKER);
        for x in bytes {
            push_hex(&mut line, x);
        }
        line.push('\n');
        line
    }
}

fn hex_byte<'a>() -> impl Parser<&'a str, Output = u8> {
    (hex_digit(), hex_digit()).map(|(hi, lo): (char, char)| nibble(hi) << 4 | nibble(lo))
}

fn hex_bytes<'a>() -> impl Parser<&'a str, Output = Vec<u8>> {
    (many::<Vec<u8>, _, _>(hex_byte()), eof()).map(|(bytes, _)| bytes)
}

fn nibble(digit: char) -> u8 {
    digit.to_digit(16).map_or(0, |d| d as u8)
}

//----------------------------------------------------------------------------
// Tests
//----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use test_case::test_case;

    const TEST_LINE: &str = ":1007F80004F03CFA69461A48FFF70AFE694604F114";

    #[test]
    fn decodes_extended_linear_address() {
        let record = Record::decode(":020000040000FA\n").unwrap();
        assert_eq!(record, Record::extended_linear_address(0));
        assert_eq!(record.linear_address(), Some(0));
    }

    #[test]
    fn decodes_data_line() {
        let record = Record::decode(TEST_LINE).unwrap();
        assert_eq!(record.kind(), RecordKind::Data);
        assert_eq!(record.address(), 0x07f8);
        assert_eq!(
            record.payload(),
            &[
                0x04, 0xf0, 0x3c, 0xfa, 0x69, 0x46, 0x1a, 0x48, 0xff, 0xf7, 0x0a, 0xfe, 0x69, 0x46,
                0x04, 0xf1
            ]
        );
    }

    #[test]
    fn accepts_lowercase_and_crlf() {
        let record = Record::decode(":10010000214601360121470136007efe09d2190140\r\n").unwrap();
        assert_eq!(record.address(), 0x0100);
        assert_eq!(record.payload().len(), 16);
    }

    #[test]
    fn encodes_end_of_file() {
        assert_eq!(Record::end_of_file().encode(), ":00000001FF\n");
    }

    #[test]
    fn encodes_extended_linear_address() {
        assert_eq!(Record::extended_linear_address(0x1000).encode(), ":020000041000EA\n");
    }

    #[test]
    fn encodes_start_block_big_endian() {
        let record = Record::start_block(0x9900_C0DE);
        assert_eq!(record.payload(), &[0x99, 0x00, 0xC0, 0xDE]);
        assert!(record.encode().starts_with(":0400000A9900C0DE"));
    }

    #[test]
    fn reencodes_test_line() {
        let record = Record::decode(TEST_LINE).unwrap();
        assert_eq!(record.encode(), format!("{}\n", TEST_LINE));
    }

    #[test]
    fn encoded_len_matches_encoding() {
        for len in [0u8, 1, 16, 255] {
            let record = Record::pad(len);
            assert_eq!(record.encode().len(), record.encoded_len());
        }
    }

    #[test]
    fn missing_marker() {
        assert_eq!(Record::decode("020000040000FA"), Err(RecordError::MissingMarker));
    }

    #[test_case(":02000004000GFA" ; "non hex digit")]
    #[test_case(":020000040000F" ; "odd digit count")]
    fn invalid_hex(line: &str) {
        assert_eq!(Record::decode(line), Err(RecordError::InvalidHex));
    }

    #[test]
    fn truncated_record() {
        assert_eq!(Record::decode(":0000FF"), Err(RecordError::Truncated { len: 3 }));
    }

    #[test]
    fn checksum_off_by_one() {
        assert_eq!(
            Record::decode(":020000040000FB"),
            Err(RecordError::Checksum { sum: 0x01 })
        );
    }

    #[test]
    fn unknown_kind() {
        // type 0x0E, checksum 0xF2
        assert_eq!(Record::decode(":0000000EF2"), Err(RecordError::UnknownKind(0x0E)));
    }

    #[test]
    fn payload_limit() {
        assert!(Record::data(0, vec![0; MAX_PAYLOAD]).is_ok());
        assert_eq!(
            Record::data(0, vec![0; MAX_PAYLOAD + 1]),
            Err(RecordError::PayloadTooLong { len: 256 })
        );
    }

    #[test]
    fn kind_codes_are_bijective() {
        for code in 0..=u8::MAX {
            if let Some(kind) = RecordKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
    }

    #[test]
    fn random_records_round_trip_and_sum_to_zero() {
        let mut rng = StdRng::seed_from_u64(0x1e5);
        for _ in 0..200 {
            let len = rng.gen_range(0..=MAX_PAYLOAD);
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let record = Record::data(rng.gen(), payload).unwrap();
            let line = record.encode();

            let digits = line[1..].trim_end();
            let sum = (0..digits.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).unwrap())
                .fold(0u8, |s, x| s.wrapping_add(x));
            assert_eq!(sum, 0);
            assert_eq!(Record::decode(&line).unwrap(), record);
        }
    }
}
