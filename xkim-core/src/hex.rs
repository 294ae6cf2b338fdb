//! Intel HEX codec over a `ByteStream`.
//!
//! Only data (type 00) and end-of-file (type 01) records are supported.
//! Loading applies each data record to memory as soon as its checksum
//! verifies; a later bad record aborts the load but does not undo what was
//! already written.

use std::fmt::Write as _;

use log::{debug, trace};

use crate::error::{HexError, HexStage, XkimResult};
use crate::stream::ByteStream;

/// Most payload bytes the encoder puts in one record.
pub const MAX_RECORD_BYTES: usize = 16;

/// Memory the loader writes into and the saver reads from.
pub trait MemoryBus {
    fn read(&self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, value: u8);
}

/// Supported record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Data = 0x00,
    EndOfFile = 0x01,
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Data),
            0x01 => Ok(Self::EndOfFile),
            _ => Err(value),
        }
    }
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub address: u16,
    pub record_type: RecordType,
    pub data: Vec<u8>,
}

impl HexRecord {
    pub fn data(address: u16, data: Vec<u8>) -> Self {
        Self {
            address,
            record_type: RecordType::Data,
            data,
        }
    }

    /// The terminating record, `:00000001FF`.
    pub fn end_of_file() -> Self {
        Self {
            address: 0,
            record_type: RecordType::EndOfFile,
            data: Vec::new(),
        }
    }

    /// Twos-complement checksum: the byte that makes every byte of the
    /// record sum to zero.
    pub fn checksum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        let sum = self
            .data
            .iter()
            .fold(
                (self.data.len() as u8)
                    .wrapping_add(hi)
                    .wrapping_add(lo)
                    .wrapping_add(self.record_type as u8),
                |acc, &b| acc.wrapping_add(b),
            );
        sum.wrapping_neg()
    }

    /// The record as a text line, CR/LF terminated.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(13 + self.data.len() * 2);
        // Writing to a String cannot fail.
        let _ = write!(
            line,
            ":{:02X}{:04X}{:02X}",
            self.data.len(),
            self.address,
            self.record_type as u8
        );
        for b in &self.data {
            let _ = write!(line, "{:02X}", b);
        }
        let _ = write!(line, "{:02X}\r\n", self.checksum());
        line
    }

    pub fn write_to<S: ByteStream + ?Sized>(&self, out: &mut S) -> XkimResult<()> {
        out.write_bytes(self.to_line().as_bytes())
    }

    /// Decode the next record, skipping CR/LF between lines.
    pub fn read_from<S: ByteStream + ?Sized>(input: &mut S) -> XkimResult<HexRecord> {
        loop {
            match input.read_byte()? {
                Some(b':') => break,
                Some(b'\r') | Some(b'\n') => continue,
                Some(found) => return Err(HexError::MissingColon { found }.into()),
                None => {
                    return Err(HexError::UnexpectedEnd {
                        stage: HexStage::Start,
                    }
                    .into())
                }
            }
        }

        let count = read_hex_byte(input, HexStage::ByteCount)?;
        let hi = read_hex_byte(input, HexStage::AddressHigh)?;
        let lo = read_hex_byte(input, HexStage::AddressLow)?;
        let type_code = read_hex_byte(input, HexStage::RecordType)?;
        let record_type = RecordType::try_from(type_code).map_err(HexError::UnknownRecordType)?;

        let mut sum = count
            .wrapping_add(hi)
            .wrapping_add(lo)
            .wrapping_add(type_code);
        let mut data = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let b = read_hex_byte(input, HexStage::Payload)?;
            sum = sum.wrapping_add(b);
            data.push(b);
        }

        let found = read_hex_byte(input, HexStage::Checksum)?;
        if sum.wrapping_add(found) != 0 {
            return Err(HexError::ChecksumMismatch {
                expected: sum.wrapping_neg(),
                found,
            }
            .into());
        }

        if record_type == RecordType::EndOfFile && count != 0 {
            return Err(HexError::EndRecordWithData(count).into());
        }

        Ok(HexRecord {
            address: u16::from_be_bytes([hi, lo]),
            record_type,
            data,
        })
    }
}

/// Value of an ASCII hex digit, or `None` if it is not one.
///
/// Callers use `None` to fall back to other interpretations of the key.
pub fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

fn read_hex_byte<S: ByteStream + ?Sized>(input: &mut S, stage: HexStage) -> XkimResult<u8> {
    let mut value = 0u8;
    for _ in 0..2 {
        let ch = input
            .read_byte()?
            .ok_or(HexError::UnexpectedEnd { stage })?;
        let digit = hex_digit_value(ch).ok_or(HexError::BadDigit { stage, found: ch })?;
        value = (value << 4) | digit;
    }
    Ok(value)
}

/// What a successful load applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub records: usize,
    pub bytes: usize,
}

/// Load records into memory until the end-of-file record.
pub fn load_from_stream<S, M>(input: &mut S, memory: &mut M) -> XkimResult<LoadSummary>
where
    S: ByteStream + ?Sized,
    M: MemoryBus + ?Sized,
{
    let mut summary = LoadSummary::default();
    loop {
        let record = HexRecord::read_from(input)?;
        match record.record_type {
            RecordType::Data => {
                trace!(
                    "[HEX] {} bytes at {:#06X}",
                    record.data.len(),
                    record.address
                );
                let mut addr = record.address;
                for &b in &record.data {
                    memory.write(addr, b);
                    addr = addr.wrapping_add(1);
                }
                summary.records += 1;
                summary.bytes += record.data.len();
            }
            RecordType::EndOfFile => {
                debug!(
                    "[HEX] loaded {} records, {} bytes",
                    summary.records, summary.bytes
                );
                return Ok(summary);
            }
        }
    }
}

/// Save `start..=end` as data records followed by the end-of-file record.
///
/// `start > end` saves nothing but the end-of-file record. Returns the
/// number of data records written.
pub fn save_to_stream<S, M>(out: &mut S, memory: &M, start: u16, end: u16) -> XkimResult<usize>
where
    S: ByteStream + ?Sized,
    M: MemoryBus + ?Sized,
{
    let mut records = 0;
    if start <= end {
        let end = end as u32;
        let mut addr = start as u32;
        while addr <= end {
            let n = (end - addr + 1).min(MAX_RECORD_BYTES as u32);
            let data = (addr..addr + n).map(|a| memory.read(a as u16)).collect();
            HexRecord::data(addr as u16, data).write_to(out)?;
            records += 1;
            addr += n;
        }
    }
    HexRecord::end_of_file().write_to(out)?;
    debug!("[HEX] saved {:#06X}-{:#06X} in {} records", start, end, records);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::XkimError;

    /// In-memory stream: reads from `input`, appends writes to `output`.
    #[derive(Default)]
    struct Tape {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl Tape {
        fn reading(text: &[u8]) -> Self {
            Self {
                input: text.iter().copied().collect(),
                output: Vec::new(),
            }
        }
    }

    impl ByteStream for Tape {
        fn read_byte(&mut self) -> XkimResult<Option<u8>> {
            Ok(self.input.pop_front())
        }

        fn write_byte(&mut self, value: u8) -> XkimResult<()> {
            self.output.push(value);
            Ok(())
        }
    }

    struct Ram(Vec<u8>);

    impl Ram {
        fn new() -> Self {
            Ram(vec![0; 0x10000])
        }
    }

    impl MemoryBus for Ram {
        fn read(&self, addr: u16) -> u8 {
            self.0[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.0[addr as usize] = value;
        }
    }

    fn load(text: &[u8], ram: &mut Ram) -> Result<LoadSummary, HexError> {
        match load_from_stream(&mut Tape::reading(text), ram) {
            Ok(summary) => Ok(summary),
            Err(XkimError::Hex(e)) => Err(e),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_two_line_load() {
        let mut ram = Ram::new();
        let summary = load(b":0300000011223397\r\n:00000001FF\r\n", &mut ram).unwrap();
        assert_eq!(&ram.0[0..4], &[0x11, 0x22, 0x33, 0x00]);
        assert_eq!(summary, LoadSummary { records: 1, bytes: 3 });
    }

    #[test]
    fn test_end_of_file_record() {
        assert_eq!(HexRecord::end_of_file().to_line(), ":00000001FF\r\n");
        let mut tape = Tape::reading(b":00000001FF");
        assert_eq!(
            HexRecord::read_from(&mut tape).unwrap(),
            HexRecord::end_of_file()
        );
    }

    #[test]
    fn test_end_record_must_be_empty() {
        let err = load(b":01000001AA54\r\n", &mut Ram::new()).unwrap_err();
        assert_eq!(err, HexError::EndRecordWithData(1));
        assert_eq!(err.code(), HexStage::ByteCount.code());
        // The address field of an end record is not checked.
        load(b":00123401B9\r\n", &mut Ram::new()).unwrap();
    }

    #[test]
    fn test_encode_then_decode_data_records() {
        for len in 1..=MAX_RECORD_BYTES {
            for &address in &[0x0000u16, 0x0200, 0x1234, 0x8001, 0xFFF0, 0xFFFF] {
                let data: Vec<u8> = (0..len as u8).map(|i| i.wrapping_mul(37) ^ 0xA5).collect();
                let record = HexRecord::data(address, data);
                let mut tape = Tape::reading(record.to_line().as_bytes());
                assert_eq!(HexRecord::read_from(&mut tape).unwrap(), record);
            }
        }
    }

    #[test]
    fn test_lowercase_digits_accepted() {
        let mut ram = Ram::new();
        load(b":01C00000ea55\n:00000001ff\n", &mut ram).unwrap();
        assert_eq!(ram.0[0xC000], 0xEA);
    }

    #[test]
    fn test_single_bit_flip_fails_checksum() {
        // count, addr hi, addr lo, type, payload x3, checksum
        let good = [0x03u8, 0x12, 0x34, 0x00, 0x11, 0x22, 0x33, 0x00];
        let mut good = good.to_vec();
        let sum = good.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        *good.last_mut().unwrap() = sum.wrapping_neg();

        for pos in 0..good.len() {
            for bit in 0..8 {
                let mut bytes = good.clone();
                bytes[pos] ^= 1 << bit;
                let mut line = String::from(":");
                for b in &bytes {
                    line.push_str(&format!("{:02X}", b));
                }
                line.push_str("\r\n:00000001FF\r\n");

                let result = load(line.as_bytes(), &mut Ram::new());
                match pos {
                    // A changed count or type changes how the line is parsed,
                    // so the failure may surface at another stage.
                    0 | 3 => assert!(result.is_err(), "pos {pos} bit {bit}"),
                    _ => assert!(
                        matches!(result, Err(HexError::ChecksumMismatch { .. })),
                        "pos {pos} bit {bit}: {result:?}"
                    ),
                }
            }
        }
    }

    #[test]
    fn test_failure_stages_have_codes() {
        let cases: [(&[u8], HexStage); 7] = [
            (b"X0000000", HexStage::Start),
            (b":G0", HexStage::ByteCount),
            (b":01Z0", HexStage::AddressHigh),
            (b":0100Q0", HexStage::AddressLow),
            (b":010000-0", HexStage::RecordType),
            (b":01000000ZZ", HexStage::Payload),
            (b":01000000AA00", HexStage::Checksum),
        ];
        for (text, stage) in cases {
            let err = load(text, &mut Ram::new()).unwrap_err();
            assert_eq!(err.stage(), stage, "{}", String::from_utf8_lossy(text));
            assert_eq!(err.code(), stage.code());
        }
    }

    #[test]
    fn test_unknown_record_type_aborts() {
        let err = load(b":020000040000FA\r\n", &mut Ram::new()).unwrap_err();
        assert_eq!(err, HexError::UnknownRecordType(0x04));
    }

    #[test]
    fn test_missing_end_record() {
        let err = load(b":0100000042BD\r\n", &mut Ram::new()).unwrap_err();
        assert_eq!(
            err,
            HexError::UnexpectedEnd {
                stage: HexStage::Start
            }
        );
    }

    #[test]
    fn test_partial_load_is_kept() {
        let mut ram = Ram::new();
        let err = load(b":011000009956\r\n:01100100AA00\r\n", &mut ram).unwrap_err();
        assert!(matches!(err, HexError::ChecksumMismatch { .. }));
        assert_eq!(ram.0[0x1000], 0x99);
        assert_eq!(ram.0[0x1001], 0x00);
    }

    #[test]
    fn test_save_range() {
        let mut ram = Ram::new();
        for i in 0..20u16 {
            ram.write(0x0200 + i, i as u8);
        }
        let mut tape = Tape::default();
        let records = save_to_stream(&mut tape, &ram, 0x0200, 0x0213).unwrap();
        assert_eq!(records, 2);
        let text = String::from_utf8(tape.output.clone()).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with(":10020000000102"));
        assert_eq!(lines[1], ":0402100010111213A4");
        assert_eq!(lines[2], ":00000001FF");

        let mut copy = Ram::new();
        load(&tape.output, &mut copy).unwrap();
        assert_eq!(&copy.0[0x0200..0x0214], &ram.0[0x0200..0x0214]);
    }

    #[test]
    fn test_save_reversed_range_is_empty() {
        let mut tape = Tape::default();
        let records = save_to_stream(&mut tape, &Ram::new(), 0x0300, 0x02FF).unwrap();
        assert_eq!(records, 0);
        assert_eq!(tape.output, b":00000001FF\r\n");
    }

    #[test]
    fn test_save_whole_address_space() {
        let mut tape = Tape::default();
        let records = save_to_stream(&mut tape, &Ram::new(), 0x0000, 0xFFFF).unwrap();
        assert_eq!(records, 0x10000 / MAX_RECORD_BYTES);
    }

    #[test]
    fn test_hex_digit_value() {
        assert_eq!(hex_digit_value(b'7'), Some(7));
        assert_eq!(hex_digit_value(b'f'), Some(15));
        assert_eq!(hex_digit_value(b'G'), None);
        assert_eq!(hex_digit_value(b'\r'), None);
    }
}
