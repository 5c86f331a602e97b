// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use crate::error::{Error, Result};

mod attribute;
pub use attribute::{AttributeCodec, AttributeFormat, AttributeValue};

mod format;
pub use format::{VertexAttribute, VertexFormat};

/// Conversions applied to attribute values before encoding and after decoding.
pub mod adjust;

/// Name hashes of the vertex attributes used by models.
pub mod hashes {
    use crate::crc::{crc32, hash_simple};

    pub const POSITION: u32 = crc32(b"Position");
    pub const NORMAL: u32 = crc32(b"Normal");
    pub const TESSELLATION_NORMAL: u32 = crc32(b"TessellationNormal");
    pub const TANGENT: u32 = crc32(b"Tangent");
    pub const BINORMAL: u32 = crc32(b"Binormal");
    pub const SKIN_WEIGHTS: u32 = crc32(b"SkinWeights");
    pub const SKIN_INDICES: u32 = crc32(b"SkinIndices");
    pub const COLOR1: u32 = crc32(b"Color1");
    pub const COLOR2: u32 = crc32(b"Color2");
    pub const TEXCOORD1: u32 = crc32(b"Texcoord1");
    pub const TEXCOORD2: u32 = crc32(b"Texcoord2");
    pub const TEXCOORD3: u32 = crc32(b"Texcoord3");
    pub const TEXCOORD4: u32 = crc32(b"Texcoord4");

    /// Marks the model data of a mesh reference.
    pub const MESHREF: u32 = hash_simple(b"meshref");
}

/// The decoded attributes of one vertex, keyed by name hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vertex {
    pub attributes: HashMap<u32, AttributeValue>,
}

impl Vertex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name_hash: u32) -> Option<&AttributeValue> {
        self.attributes.get(&name_hash)
    }

    pub fn set(&mut self, name_hash: u32, value: impl Into<AttributeValue>) {
        self.attributes.insert(name_hash, value.into());
    }

    /// Decodes vertex `index` from `buffers` laid out as `format`.
    pub fn read(format: &VertexFormat, buffers: &[&[u8]], index: usize) -> Result<Vertex> {
        let mut vertex = Vertex::new();
        for attribute in &format.attributes {
            let start = attribute_start(format, attribute, index)?;
            let end = start.saturating_add(attribute.codec.size());
            let buffer = buffers.get(attribute.buffer_index as usize).copied().unwrap_or(&[]);
            let bytes = buffer
                .get(start..end)
                .ok_or(Error::VertexBufferOverrun {
                    buffer: attribute.buffer_index as usize,
                    needed: end,
                    length: buffer.len(),
                })?;

            vertex
                .attributes
                .insert(attribute.name_hash, attribute.codec.decode(bytes));
        }

        Ok(vertex)
    }

    /// Encodes this vertex as vertex `index` of `buffers` laid out as `format`.
    ///
    /// Every attribute of the format must be set.
    pub fn write(&self, format: &VertexFormat, buffers: &mut [Vec<u8>], index: usize) -> Result<()> {
        for attribute in &format.attributes {
            let value = self
                .attributes
                .get(&attribute.name_hash)
                .ok_or(Error::MissingVertexAttribute(attribute.name_hash))?;

            let start = attribute_start(format, attribute, index)?;
            let end = start.saturating_add(attribute.codec.size());
            let buffer = buffers
                .get_mut(attribute.buffer_index as usize)
                .ok_or(Error::VertexBufferOverrun {
                    buffer: attribute.buffer_index as usize,
                    needed: end,
                    length: 0,
                })?;
            let length = buffer.len();
            let bytes = buffer.get_mut(start..end).ok_or(Error::VertexBufferOverrun {
                buffer: attribute.buffer_index as usize,
                needed: end,
                length,
            })?;

            attribute.codec.encode(bytes, value);
        }

        Ok(())
    }
}

fn attribute_start(
    format: &VertexFormat,
    attribute: &VertexAttribute,
    index: usize,
) -> Result<usize> {
    let stride = format
        .vertex_sizes
        .get(attribute.buffer_index as usize)
        .ok_or_else(|| {
            Error::UnsupportedLayout(format!(
                "attribute {:#010x} uses vertex buffer {}",
                attribute.name_hash, attribute.buffer_index
            ))
        })?;

    (*stride as usize)
        .checked_mul(index)
        .and_then(|start| start.checked_add(attribute.offset as usize))
        .ok_or_else(|| Error::UnsupportedLayout(format!("vertex {index} lies past the address space")))
}
