// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reading and writing the relocatable resources of the cdc engine, used by the
//! Tomb Raider reboot trilogy.

/// Represents a continuous block of memory which is not owned, and comes either from an in-memory location or from a file.
pub type ByteSpan<'a> = &'a [u8];

/// Represents a continuous block of memory which is owned.
pub type ByteBuffer = Vec<u8>;

#[macro_use]
mod macros;

/// Game generations and resource types.
pub mod common;

/// Errors returned by every fallible operation in this crate.
pub mod error;

pub use error::{Error, Result};

/// Resource keys and relocatable references.
pub mod resource;

/// Relocation tables that precede resource bodies.
pub mod relocation;

/// Describing fixed-size records and their reference fields.
pub mod record;

/// Reading resource bodies.
pub mod reader;

/// Writing resource bodies and their relocation tables.
pub mod builder;

/// Vertex formats and vertex attribute codecs.
pub mod vertex;

/// Reading and writing compressed animations.
pub mod animation;

/// Reading and writing sparse blend shape offsets.
pub mod blend_shape;

/// Reading and writing skeletons.
pub mod skeleton;

/// Name hashes used by the engine.
pub mod crc;

mod bitstream;

/// Feeds pseudo-random buffers of various sizes to `parse`, which must not panic.
#[cfg(test)]
pub(crate) fn pass_random_invalid(mut parse: impl FnMut(ByteSpan)) {
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as u32
    };

    for size in [0usize, 1, 4, 19, 20, 21, 36, 64, 100, 256, 1024] {
        for _ in 0..8 {
            let data: ByteBuffer = (0..size).map(|_| next() as u8).collect();
            parse(&data);
        }
    }

    // counts that fit the buffer exercise entry resolution
    for _ in 0..32 {
        let mut data: ByteBuffer = (0..256).map(|_| next() as u8).collect();
        for count in 0..5 {
            data[count * 4..count * 4 + 4].copy_from_slice(&(next() % 4).to_le_bytes());
        }
        parse(&data);
    }
}
