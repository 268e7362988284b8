use std::num::Wrapping;

pub const POLYNOMIAL: u32 = 0x04C1_1DB7;

/// Bytes of the boot block covered by the CRC.
pub const BOOT_CRC_WINDOW: usize = 252;

/// The boot block: the CRC window, followed by the 4-byte CRC trailer.
pub const BOOT_BLOCK_LEN: usize = 256;

/**
 * RP2040 boot-ROM CRC32 (CRC-32/MPEG-2), as the `crc` crate describes it.
 */
pub const BOOT_CRC_ALG: crc::Algorithm<u32> = crc::Algorithm {
    width: 32,
    poly: POLYNOMIAL,
    init: 0xFFFF_FFFF,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x0376_E6E7,
    residue: 0x0000_0000,
};

/// Reverses the order of the low `width` bits of `value`.
pub const fn reflect(value: u32, width: u32) -> u32 {
    let mut out = 0;
    let mut bit = 0;
    while bit < width {
        if (value >> bit) & 1 != 0 {
            out |= 1 << (width - 1 - bit);
        }
        bit += 1;
    }
    out
}

/**
 * Bitwise boot CRC, as computed by the pico-sdk tooling: the register is kept
 * bit-reversed, fed with reversed bytes, and reversed again on output.
 */
pub struct BootCrc(u32);

impl BootCrc {
    const REFLECTED_POLYNOMIAL: u32 = reflect(POLYNOMIAL, 32);

    pub fn new() -> Self {
        Self(0xFFFF_FFFF)
    }

    pub fn update(&mut self, value: u8) {
        self.0 ^= reflect(value as u32, 8);
        for _ in 0..8 {
            self.0 = if self.0 & 1 != 0 {
                (self.0 >> 1) ^ Self::REFLECTED_POLYNOMIAL
            } else {
                self.0 >> 1
            };
        }
    }

    pub fn update_slice(&mut self, values: &[u8]) {
        values.iter().for_each(|&v| self.update(v));
    }

    pub fn get_value(&self) -> u32 {
        reflect(self.0, 32)
    }
}

impl Default for BootCrc {
    fn default() -> Self {
        Self::new()
    }
}

pub fn boot_crc32(window: &[u8; BOOT_CRC_WINDOW]) -> u32 {
    let mut crc = BootCrc::new();
    crc.update_slice(window);
    crc.get_value()
}

/// Checks the little-endian CRC trailer of a boot block.
pub fn verify_boot_crc(block: &[u8; BOOT_BLOCK_LEN]) -> bool {
    let alg = crc::Crc::<u32>::new(&BOOT_CRC_ALG);
    let expected = u32::from_le_bytes([block[252], block[253], block[254], block[255]]);
    alg.checksum(&block[..BOOT_CRC_WINDOW]) == expected
}

pub fn ihex_checksum(data: &[u8]) -> u8 {
    let mut cs: Wrapping<u8> = Wrapping(0);
    for x in data.iter() {
        cs += Wrapping(*x);
    }
    cs = (!cs) + Wrapping(1);
    cs.0
}

//----------------------------------------------------------------------------
// Tests
//----------------------------------------------------------------------------
