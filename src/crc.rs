// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// CRC used for the 32-bit half of disc index hashes.
/// This is a plain MSB-first CRC-32 (also known as CRC-32/BZIP2).
pub(crate) struct IdxCrc32 {
    table: [u32; 256],
}

impl IdxCrc32 {
    pub(crate) const fn new() -> Self {
        let mut table: [u32; 256] = [0u32; 256];

        let polynomial: u32 = 0x04C11DB7;
        let mut i = 0;
        while i < table.len() {
            let mut c: u32 = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if (c & 0x80000000) != 0 {
                    c = (c << 1) ^ polynomial;
                } else {
                    c <<= 1;
                }
                j += 1;
            }

            table[i] = c;
            i += 1;
        }

        Self { table }
    }

    pub(crate) fn checksum(&self, bytes: &[u8]) -> u32 {
        let mut c: u32 = 0xFFFFFFFF;
        for byte in bytes {
            c = (c << 8) ^ self.table[(((c >> 24) ^ *byte as u32) & 0xFF) as usize];
        }

        !c
    }
}

/// CRC used for the 16-bit half of disc index hashes.
/// The game feeds the bytes in reverse order, which is the only difference from CRC-16/GENIBUS.
pub(crate) struct IdxCrc16 {
    table: [u16; 256],
}

impl IdxCrc16 {
    pub(crate) const fn new() -> Self {
        let mut table: [u16; 256] = [0u16; 256];

        let polynomial: u16 = 0x1021;
        let mut i = 0;
        while i < table.len() {
            let mut c: u16 = (i as u16) << 8;
            let mut j = 0;
            while j < 8 {
                if (c & 0x8000) != 0 {
                    c = (c << 1) ^ polynomial;
                } else {
                    c <<= 1;
                }
                j += 1;
            }

            table[i] = c;
            i += 1;
        }

        Self { table }
    }

    pub(crate) fn checksum(&self, bytes: &[u8]) -> u16 {
        let mut c: u16 = 0xFFFF;
        for byte in bytes.iter().rev() {
            c = (c << 8) ^ self.table[(((c >> 8) ^ *byte as u16) & 0xFF) as usize];
        }

        !c
    }
}

const CRC32: IdxCrc32 = IdxCrc32::new();
const CRC16: IdxCrc16 = IdxCrc16::new();

/// Calculates the (32-bit, 16-bit) hash pair a disc index uses for `path`.
pub(crate) fn disc_hash(path: &str) -> (u32, u16) {
    (CRC32.checksum(path.as_bytes()), CRC16.checksum(path.as_bytes()))
}
