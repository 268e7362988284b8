use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian};

pub const BLOCK_LEN: usize = 512;
pub const DATA_LEN: usize = 256;
pub const MAGIC_START0: u32 = 0x0A32_4655;
pub const MAGIC_START1: u32 = 0x9E5D_5157;
pub const MAGIC_END: u32 = 0x0AB1_6F30;
pub const FLAG_FAMILY_ID: u32 = 0x0000_2000;
pub const FAMILY_RP2040: u32 = 0xE48B_FF56;

const DATA_START: usize = 0x20;
const PADDING_END: usize = BLOCK_LEN - 4;

/**
 * One UF2 block, carrying up to 256 bytes of flash data.
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Uf2Block<'l> {
    pub addr: u32,
    pub index: u32,
    pub count: u32,
    pub family_id: u32,
    pub data: &'l [u8],
}

impl<'l> Uf2Block<'l> {
    pub fn to_bytes(&self) -> [u8; BLOCK_LEN] {
        let mut dst = [0u8; BLOCK_LEN];
        LittleEndian::write_u32(&mut dst[0x000..0x004], MAGIC_START0);
        LittleEndian::write_u32(&mut dst[0x004..0x008], MAGIC_START1);
        LittleEndian::write_u32(&mut dst[0x008..0x00C], FLAG_FAMILY_ID);
        LittleEndian::write_u32(&mut dst[0x00C..0x010], self.addr);
        LittleEndian::write_u32(&mut dst[0x010..0x014], DATA_LEN as u32);
        LittleEndian::write_u32(&mut dst[0x014..0x018], self.index);
        LittleEndian::write_u32(&mut dst[0x018..0x01C], self.count);
        LittleEndian::write_u32(&mut dst[0x01C..DATA_START], self.family_id);
        // short final blocks stay zero padded
        let len = self.data.len().min(DATA_LEN);
        dst[DATA_START..DATA_START + len].copy_from_slice(&self.data[..len]);
        LittleEndian::write_u32(&mut dst[PADDING_END..BLOCK_LEN], MAGIC_END);
        dst
    }
}

pub fn block_count(len: usize) -> usize {
    (len + (DATA_LEN - 1)) / DATA_LEN
}

/// Splits `data` into blocks targeting consecutive 256-byte pages from `addr`.
pub fn blocks(data: &[u8], family_id: u32, addr: u32) -> impl Iterator<Item = Uf2Block<'_>> {
    let count = block_count(data.len()) as u32;
    data.chunks(DATA_LEN).enumerate().map(move |(i, s)| Uf2Block {
        addr: addr.wrapping_add((i * DATA_LEN) as u32),
        index: i as u32,
        count,
        family_id,
        data: s,
    })
}

pub fn encode(data: &[u8], family_id: u32, addr: u32) -> Vec<u8> {
    let mut dst = Vec::with_capacity(block_count(data.len()) * BLOCK_LEN);
    for block in blocks(data, family_id, addr) {
        dst.extend_from_slice(&block.to_bytes());
    }
    dst
}

/// Writes the UF2 encoding of `data`, returning the number of blocks written.
pub fn write_uf2<W: Write>(mut writer: W, data: &[u8], family_id: u32, addr: u32) -> io::Result<usize> {
    writer.write_all(&encode(data, family_id, addr))?;
    writer.flush()?;
    Ok(block_count(data.len()))
}

//----------------------------------------------------------------------------
// Tests
//----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn field(block: &[u8], offset: usize) -> u32 {
        LittleEndian::read_u32(&block[offset..offset + 4])
    }

    #[test_case(0, 0)]
    #[test_case(1, 1)]
    #[test_case(255, 1)]
    #[test_case(256, 1)]
    #[test_case(257, 2)]
    #[test_case(512, 2)]
    #[test_case(1000, 4)]
    fn total_blocks_rounds_up(len: usize, expected: usize) {
        let data = vec![0xA5u8; len];
        let out = encode(&data, FAMILY_RP2040, 0x1000_0000);
        assert_eq!(block_count(len), expected);
        assert_eq!(out.len(), expected * BLOCK_LEN);
        for block in out.chunks(BLOCK_LEN) {
            assert_eq!(field(block, 0x18), expected as u32);
        }
    }

    #[test]
    fn block_layout() {
        let data: Vec<u8> = (0..=255).collect();
        let out = encode(&data, FAMILY_RP2040, 0x1000_0000);
        assert_eq!(out.len(), BLOCK_LEN);

        assert_eq!(field(&out, 0x000), 0x0A32_4655);
        assert_eq!(field(&out, 0x004), 0x9E5D_5157);
        assert_eq!(field(&out, 0x008), 0x0000_2000);
        assert_eq!(field(&out, 0x00C), 0x1000_0000);
        assert_eq!(field(&out, 0x010), 256);
        assert_eq!(field(&out, 0x014), 0);
        assert_eq!(field(&out, 0x018), 1);
        assert_eq!(field(&out, 0x01C), 0xE48B_FF56);
        assert_eq!(&out[32..288], data.as_slice());
        assert!(out[288..508].iter().all(|&x| x == 0));
        assert_eq!(field(&out, 0x1FC), 0x0AB1_6F30);
        assert_eq!(&out[0..4], b"UF2\n");
    }

    #[test]
    fn addresses_and_indices_ascend() {
        let data = vec![1u8; 5 * DATA_LEN - 10];
        let out = encode(&data, 0x1234_5678, 0x2000_0000);
        for (i, block) in out.chunks(BLOCK_LEN).enumerate() {
            assert_eq!(field(block, 0x00C), 0x2000_0000 + (i * DATA_LEN) as u32);
            assert_eq!(field(block, 0x014), i as u32);
            assert_eq!(field(block, 0x01C), 0x1234_5678);
        }
    }

    #[test]
    fn last_block_tail_is_zero() {
        let data = vec![0xFFu8; DATA_LEN + 3];
        let out = encode(&data, FAMILY_RP2040, 0);
        let last = &out[BLOCK_LEN..];
        assert_eq!(field(last, 0x010), 256);
        assert_eq!(&last[32..35], &[0xFF; 3]);
        assert!(last[35..PADDING_END].iter().all(|&x| x == 0));
    }

    #[test]
    fn writer_matches_encode() {
        let data = vec![7u8; 600];
        let mut out = Vec::new();
        let count = write_uf2(&mut out, &data, FAMILY_RP2040, 0x1000_0000).unwrap();
        assert_eq!(count, 3);
        assert_eq!(out, encode(&data, FAMILY_RP2040, 0x1000_0000));
    }
}
