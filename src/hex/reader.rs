use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::record::{Record, RecordError, RecordKind};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{source}, line {line}")]
    Record { line: usize, source: RecordError },
    #[error("bad record, not text, line {line}")]
    NotText { line: usize },
    #[error("Missing end of file record")]
    MissingTerminator,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// The 1-based line number of a malformed record.
    pub fn line(&self) -> Option<usize> {
        match self {
            DecodeError::Record { line, .. } | DecodeError::NotText { line } => Some(*line),
            _ => None,
        }
    }
}

/**
 * Decodes every non-empty line of an IHEX stream.
 *
 * The stream must end with an end-of-file record, which is not returned.
 */
pub fn decode_records<R: BufRead>(reader: R) -> Result<Vec<Record>, DecodeError> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => DecodeError::NotText { line: index + 1 },
            _ => DecodeError::Io(e),
        })?;
        if line.trim_end().is_empty() {
            continue;
        }
        let record = Record::decode(&line).map_err(|source| DecodeError::Record {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }

    match records.pop() {
        Some(last) if last.kind() == RecordKind::EndOfFile => Ok(records),
        _ => Err(DecodeError::MissingTerminator),
    }
}

pub fn decode_str(text: &str) -> Result<Vec<Record>, DecodeError> {
    decode_records(text.as_bytes())
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, DecodeError> {
    let file = File::open(path)?;
    decode_records(BufReader::new(file))
}

/// Writes every record, followed by an end-of-file record.
pub fn encode_records<W: Write>(records: &[Record], mut writer: W) -> io::Result<()> {
    let eof = Record::end_of_file();
    for record in records.iter().chain(std::iter::once(&eof)) {
        writer.write_all(record.encode().as_bytes())?;
    }
    writer.flush()
}

pub fn encode_string(records: &[Record]) -> String {
    let mut text = String::new();
    for record in records {
        text.push_str(&record.encode());
    }
    text.push_str(&Record::end_of_file().encode());
    text
}

pub fn write_file<P: AsRef<Path>>(path: P, records: &[Record]) -> io::Result<()> {
    let file = File::create(path)?;
    encode_records(records, BufWriter::new(file))
}

//----------------------------------------------------------------------------
// Tests
//----------------------------------------------------------------------------
