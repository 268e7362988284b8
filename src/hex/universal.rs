//! micro:bit universal hex: a V1 and a V2 image in one file, each wrapped in a
//! block whose encoded length is a whole number of 512 character chunks.

use tracing::{debug, trace};

use super::record::{Record, RecordKind, CHARS_IN_EMPTY_RECORD};

/// File chunking size, in characters.
pub const CHUNK_SIZE: usize = 512;

/// Maximum payload of a `Pad` or `EndBlock` record.
pub const MAX_BYTES_PER_LINE: usize = 16;

pub const V1_CODE_BLOCK: u32 = 0x9900_C0DE;
pub const V2_CODE_BLOCK: u32 = 0x9903_C0DE;

const MAX_LINE_CHARS: usize = MAX_BYTES_PER_LINE * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    V1,
    V2,
}

impl Target {
    pub const fn block_type(self) -> u32 {
        match self {
            Target::V1 => V1_CODE_BLOCK,
            Target::V2 => V2_CODE_BLOCK,
        }
    }

    pub const fn data_kind(self) -> RecordKind {
        match self {
            Target::V1 => RecordKind::Data,
            Target::V2 => RecordKind::DataV2,
        }
    }
}

/**
 * Builds a universal hex record list, one block at a time.
 *
 * `length` is the encoded length of every record pushed so far; it is a
 * multiple of `CHUNK_SIZE` between blocks.
 */
#[derive(Debug, Default)]
pub struct UniversalHex {
    records: Vec<Record>,
    length: usize,
}

impl UniversalHex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded length of the records so far, excluding the end-of-file record.
    pub fn encoded_len(&self) -> usize {
        self.length
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn push(&mut self, record: Record) {
        self.length += record.encoded_len();
        self.records.push(record);
    }

    /**
     * Appends one block: the block header, the data and extended linear
     * address records of `records`, then padding up to the next chunk.
     */
    pub fn add_block(&mut self, target: Target, records: Vec<Record>) {
        let header = Record::extended_linear_address(0);
        self.push(header.clone());
        self.push(Record::start_block(target.block_type()));

        for (i, mut record) in records.into_iter().enumerate() {
            match record.kind() {
                RecordKind::Data => {
                    record.retag(target.data_kind());
                    self.push(record);
                }
                RecordKind::ExtendedLinearAddress => {
                    if i != 0 || record != header {
                        self.push(record);
                    }
                }
                kind => trace!("Dropping {:?} record from {:?} image", kind, target),
            }
        }

        self.end_block();
    }

    /**
     * Pads to the next chunk boundary and closes the block: full Pad records
     * while the rest does not fit in one EndBlock, one shorter Pad when a
     * full one would leave less than an empty record, then the EndBlock.
     */
    fn end_block(&mut self) {
        let mut gap = CHUNK_SIZE - self.length % CHUNK_SIZE;
        // too short for even an empty record, so the block spills a chunk
        if gap < CHARS_IN_EMPTY_RECORD {
            gap += CHUNK_SIZE;
        }

        let mut pads = 0;
        while gap - CHARS_IN_EMPTY_RECORD > MAX_LINE_CHARS {
            let chars = MAX_LINE_CHARS.min(gap - 2 * CHARS_IN_EMPTY_RECORD);
            self.push(Record::pad((chars / 2) as u8));
            gap -= chars + CHARS_IN_EMPTY_RECORD;
            pads += 1;
        }

        let fill = gap - CHARS_IN_EMPTY_RECORD;
        debug_assert_eq!(fill % 2, 0);
        self.push(Record::end_block((fill / 2) as u8));

        debug!("Closed block: {} pad records, {} chars total", pads, self.length);
        debug_assert_eq!(self.length % CHUNK_SIZE, 0);
    }
}

/**
 * Merges a V1 and a V2 image into universal hex records. No end-of-file
 * record is added.
 */
pub fn merge(v1: Vec<Record>, v2: Vec<Record>) -> Vec<Record> {
    let mut univ = UniversalHex::new();
    univ.add_block(Target::V1, v1);
    univ.add_block(Target::V2, v2);
    debug!(
        "Merged {} records, {} chars",
        univ.records().len(),
        univ.encoded_len()
    );
    univ.into_records()
}

//----------------------------------------------------------------------------
// Tests
//----------------------------------------------------------------------------
