// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! MSB-first bit streams made of big-endian 64-bit words, as used by animation frame batches.

#[inline]
fn mask(num_bits: u32) -> u64 {
    if num_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}

pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    word: u64,
    bits_left: u32,
}

impl BitReader<'_> {
    #[inline]
    pub const fn new(data: &[u8]) -> BitReader<'_> {
        BitReader {
            data,
            position: 0,
            word: 0,
            bits_left: 0,
        }
    }

    /// Reads `num_bits` (at most 32) bits, or `None` when the stream runs out of words.
    pub fn read(&mut self, mut num_bits: u32) -> Option<u32> {
        let mut result: u64 = 0;
        while num_bits > 0 {
            if self.bits_left == 0 {
                let bytes = self.data.get(self.position..self.position + 8)?;
                self.word = u64::from_be_bytes(bytes.try_into().ok()?);
                self.bits_left = 64;
                self.position += 8;
            }

            let taken = num_bits.min(self.bits_left);
            result <<= taken;
            result |= (self.word >> (self.bits_left - taken)) & mask(taken);
            num_bits -= taken;
            self.bits_left -= taken;
        }

        Some(result as u32)
    }
}

#[derive(Default)]
pub(crate) struct BitWriter {
    data: Vec<u8>,
    word: u64,
    bits_used: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `num_bits` (at most 32) bits of `value`.
    pub fn write(&mut self, value: u32, mut num_bits: u32) {
        let value = value as u64 & mask(num_bits);
        while num_bits > 0 {
            let space = 64 - self.bits_used;
            let taken = num_bits.min(space);
            let chunk = (value >> (num_bits - taken)) & mask(taken);
            self.word |= chunk << (space - taken);
            self.bits_used += taken;
            num_bits -= taken;

            if self.bits_used == 64 {
                self.flush_word();
            }
        }
    }

    fn flush_word(&mut self) {
        self.data.extend_from_slice(&self.word.to_be_bytes());
        self.word = 0;
        self.bits_used = 0;
    }

    /// Pads the last word with zeroes and returns the stream.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bits_used > 0 {
            self.flush_word();
        }
        self.data
    }
}
