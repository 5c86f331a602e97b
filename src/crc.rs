// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// MSB-first CRC-32 used for vertex attribute names.
pub(crate) struct Crc32 {
    table: [u32; 256],
}

impl Crc32 {
    pub(crate) const fn new() -> Self {
        let mut table: [u32; 256] = [0u32; 256];

        let polynomial: u32 = 0x04C11DB7;
        let mut i = 0;
        while i < table.len() {
            let mut c: u32 = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if (c & 0x8000_0000) != 0 {
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

    pub(crate) const fn checksum(&self, bytes: &[u8]) -> u32 {
        let mut c: u32 = 0xFFFFFFFF;
        let mut i = 0;
        while i < bytes.len() {
            c = self.table[((c >> 24) ^ bytes[i] as u32) as usize] ^ (c << 8);
            i += 1;
        }

        c ^ 0xFFFFFFFF
    }
}

const CRC: Crc32 = Crc32::new();

/// Hashes a name the way the engine hashes vertex attribute names.
pub const fn crc32(bytes: &[u8]) -> u32 {
    CRC.checksum(bytes)
}

/// Shift-and-add hash used for some model data names, such as "meshref".
pub const fn hash_simple(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= (hash << 5)
            .wrapping_add(hash >> 2)
            .wrapping_add(bytes[i] as u32);
        i += 1;
    }

    hash
}
