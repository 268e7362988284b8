use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, warn};

use super::hexcrc::{boot_crc32, verify_boot_crc, BOOT_BLOCK_LEN, BOOT_CRC_WINDOW};
use super::record::{Record, RecordKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image too short for a boot CRC: {len} bytes, minimum {minimum}")]
    TooShort { len: usize, minimum: usize },
}

/**
 * Flat firmware image, built by appending the data records of a HEX file.
 */
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Image {
    base: u32,
    data: Vec<u8>,
}

impl Image {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            data: Vec::new(),
        }
    }

    /**
     * Appends the payload of every `Data` record, in file order.
     *
     * Record offsets are not used to seek, so the records are expected to be
     * address-sequential. The base address is the load address in effect for
     * the first byte of data.
     */
    pub fn assemble(records: &[Record]) -> Self {
        let mut image = Image::new(0);
        let mut address: u32 = 0;

        for r in records.iter() {
            match r.kind() {
                RecordKind::Data => {
                    if image.data.is_empty() {
                        image.base = address;
                    }
                    image.data.extend_from_slice(r.payload());
                }
                RecordKind::ExtendedLinearAddress => match r.linear_address() {
                    Some(upper) => address = (upper as u32) << 16,
                    None => warn!("Ignoring short extended linear address record"),
                },
                RecordKind::EndOfFile
                | RecordKind::ExtendedSegmentAddress
                | RecordKind::StartSegmentAddress
                | RecordKind::StartLinearAddress
                | RecordKind::StartBlock
                | RecordKind::EndBlock
                | RecordKind::Pad
                | RecordKind::DataV2 => (),
            }
        }
        if image.data.is_empty() {
            image.base = address;
        }

        debug!(
            "Assembled image: ADDR = {:08x}, SIZE = {}",
            image.base,
            image.data.len()
        );
        image
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn address(&self) -> u32 {
        self.base
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn patch_boot_crc(&mut self) -> Result<u32, ImageError> {
        patch_boot_crc(&mut self.data)
    }

    pub fn boot_crc_valid(&self) -> Result<bool, ImageError> {
        let block = boot_block(&self.data)?;
        Ok(verify_boot_crc(&block))
    }
}

fn boot_block(buffer: &[u8]) -> Result<[u8; BOOT_BLOCK_LEN], ImageError> {
    if buffer.len() < BOOT_BLOCK_LEN {
        return Err(ImageError::TooShort {
            len: buffer.len(),
            minimum: BOOT_BLOCK_LEN,
        });
    }
    let mut block = [0u8; BOOT_BLOCK_LEN];
    block.copy_from_slice(&buffer[..BOOT_BLOCK_LEN]);
    Ok(block)
}

/**
 * Writes the boot CRC of bytes [0, 252) into bytes [252, 256), little-endian.
 * Returns the CRC written.
 */
pub fn patch_boot_crc(buffer: &mut [u8]) -> Result<u32, ImageError> {
    let block = boot_block(buffer)?;
    let mut window = [0u8; BOOT_CRC_WINDOW];
    window.copy_from_slice(&block[..BOOT_CRC_WINDOW]);

    let crc = boot_crc32(&window);
    LittleEndian::write_u32(&mut buffer[BOOT_CRC_WINDOW..BOOT_BLOCK_LEN], crc);
    Ok(crc)
}

//----------------------------------------------------------------------------
// Tests
//----------------------------------------------------------------------------
