// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use binrw::binrw;

use crate::builder::ResourceBuilder;
use crate::common::Game;
use crate::error::{Error, Result};
use crate::reader::ResourceReader;
use crate::record::Record;
use crate::vertex::attribute::{AttributeCodec, AttributeFormat};

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq)]
struct VertexFormatHeader {
    hash: u64,
    num_attributes: u16,
    vertex_sizes: [u8; 2],
    #[br(temp)]
    #[bw(calc = 0)]
    padding: u32,
}

impl_record!(VertexFormatHeader, 0x10, plain);

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq)]
struct VertexAttributeRecord {
    name_hash: u32,
    offset: u16,
    type_id: u8,
    buffer_index: u8,
}

impl_record!(VertexAttributeRecord, 0x8, plain);

/// One attribute of a [`VertexFormat`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttribute {
    /// CRC-32 of the attribute name, see [`hashes`](crate::vertex::hashes).
    pub name_hash: u32,
    pub format: AttributeFormat,
    pub codec: AttributeCodec,
    /// Which of the two vertex buffers holds this attribute.
    pub buffer_index: u8,
    /// Offset of this attribute inside one vertex of its buffer.
    pub offset: u16,
}

/// Describes how vertices are laid out over up to two vertex buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexFormat {
    pub hash: u64,
    /// Stride of one vertex in each buffer.
    pub vertex_sizes: [u8; 2],
    pub attributes: Vec<VertexAttribute>,
}

impl VertexFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a vertex format header and its attribute list at the cursor.
    pub fn read(reader: &mut ResourceReader) -> Result<VertexFormat> {
        let game = reader.game();
        let header: VertexFormatHeader = reader.read_struct()?;

        let mut attributes = Vec::with_capacity(header.num_attributes as usize);
        for _ in 0..header.num_attributes {
            let record: VertexAttributeRecord = reader.read_struct()?;
            attributes.push(Self::resolve_attribute(game, &record)?);
        }

        Ok(VertexFormat {
            hash: header.hash,
            vertex_sizes: header.vertex_sizes,
            attributes,
        })
    }

    fn resolve_attribute(game: Game, record: &VertexAttributeRecord) -> Result<VertexAttribute> {
        let format = AttributeFormat::from_id(game, record.type_id)?;
        let codec = format.codec().ok_or_else(|| {
            Error::UnsupportedLayout(format!("vertex attribute format {format:?} has no codec"))
        })?;

        if record.buffer_index > 1 {
            return Err(Error::UnsupportedLayout(format!(
                "vertex attribute {:#x} uses buffer {}",
                record.name_hash, record.buffer_index
            )));
        }

        Ok(VertexAttribute {
            name_hash: record.name_hash,
            format,
            codec,
            buffer_index: record.buffer_index,
            offset: record.offset,
        })
    }

    pub fn write(&self, builder: &mut ResourceBuilder) -> Result<()> {
        let game = builder.game();
        let num_attributes = u16::try_from(self.attributes.len()).map_err(|_| {
            Error::UnsupportedLayout(format!("{} vertex attributes", self.attributes.len()))
        })?;

        builder.write_struct(&VertexFormatHeader {
            hash: self.hash,
            num_attributes,
            vertex_sizes: self.vertex_sizes,
        })?;

        for attribute in &self.attributes {
            let type_id = attribute.format.id(game).ok_or_else(|| {
                Error::UnsupportedLayout(format!(
                    "vertex attribute format {:?} does not exist in {game:?}",
                    attribute.format
                ))
            })?;

            builder.write_struct(&VertexAttributeRecord {
                name_hash: attribute.name_hash,
                offset: attribute.offset,
                type_id,
                buffer_index: attribute.buffer_index,
            })?;
        }

        Ok(())
    }

    /// Appends an attribute to the end of one vertex of `buffer_index`, growing its stride.
    pub fn add_attribute(
        &mut self,
        name_hash: u32,
        format: AttributeFormat,
        buffer_index: u8,
    ) -> Result<&VertexAttribute> {
        let codec = format.codec().ok_or_else(|| {
            Error::UnsupportedLayout(format!("vertex attribute format {format:?} has no codec"))
        })?;
        let stride = self
            .vertex_sizes
            .get_mut(buffer_index as usize)
            .ok_or_else(|| Error::UnsupportedLayout(format!("vertex buffer {buffer_index}")))?;

        let offset = *stride;
        *stride = u8::try_from(offset as usize + codec.size()).map_err(|_| {
            Error::UnsupportedLayout(format!("vertex buffer {buffer_index} stride exceeds 255"))
        })?;

        self.attributes.push(VertexAttribute {
            name_hash,
            format,
            codec,
            buffer_index,
            offset: offset as u16,
        });

        Ok(&self.attributes[self.attributes.len() - 1])
    }

    pub fn has_attribute(&self, name_hash: u32) -> bool {
        self.attribute(name_hash).is_some()
    }

    pub fn attribute(&self, name_hash: u32) -> Option<&VertexAttribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name_hash == name_hash)
    }

    /// Encoded size of the format description.
    pub fn size(&self) -> usize {
        VertexFormatHeader::SIZE + self.attributes.len() * VertexAttributeRecord::SIZE
    }

    /// Zeroed vertex buffers big enough for `vertex_count` vertices.
    pub fn allocate_buffers(&self, vertex_count: usize) -> [Vec<u8>; 2] {
        [
            vec![0u8; self.vertex_sizes[0] as usize * vertex_count],
            vec![0u8; self.vertex_sizes[1] as usize * vertex_count],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ResourceType;
    use crate::resource::ResourceKey;
    use crate::vertex::hashes;

    const MODEL: ResourceKey = ResourceKey::new(ResourceType::Model, 0x51);

    record_size_tests!(VertexFormatHeader, VertexAttributeRecord);

    fn skinned_format() -> VertexFormat {
        let mut format = VertexFormat::new();
        format.hash = 0x1122_3344_5566_7788;
        format
            .add_attribute(hashes::POSITION, AttributeFormat::Float3, 0)
            .unwrap();
        format
            .add_attribute(hashes::NORMAL, AttributeFormat::VectorC32, 0)
            .unwrap();
        format
            .add_attribute(hashes::TEXCOORD1, AttributeFormat::TexCoords2, 1)
            .unwrap();
        format
            .add_attribute(hashes::SKIN_INDICES, AttributeFormat::IndicesC32, 0)
            .unwrap();
        format
    }

    #[test]
    fn strides_grow() {
        let format = skinned_format();

        assert_eq!(format.vertex_sizes, [20, 4]);
        assert_eq!(format.attribute(hashes::NORMAL).unwrap().offset, 12);
        assert_eq!(format.attribute(hashes::SKIN_INDICES).unwrap().offset, 16);
        assert_eq!(format.attribute(hashes::TEXCOORD1).unwrap().offset, 0);
        assert!(!format.has_attribute(hashes::COLOR1));
        assert_eq!(format.size(), 0x10 + 4 * 8);

        let buffers = format.allocate_buffers(3);
        assert_eq!(buffers[0].len(), 60);
        assert_eq!(buffers[1].len(), 12);
    }

    #[test]
    fn unknown_buffer() {
        let mut format = VertexFormat::new();
        assert!(format
            .add_attribute(hashes::POSITION, AttributeFormat::Float3, 2)
            .is_err());
        assert!(format
            .add_attribute(hashes::POSITION, AttributeFormat::Dec4N, 0)
            .is_err());
    }

    #[test]
    fn per_game_type_ids() {
        let format = skinned_format();

        for game in [Game::Tr2013, Game::Rottr, Game::Sottr] {
            let mut builder = ResourceBuilder::new(MODEL, game);
            format.write(&mut builder).unwrap();
            assert_eq!(builder.len() as usize, format.size());

            let data = builder.build().unwrap();
            let mut reader = ResourceReader::new(MODEL, &data, true, game).unwrap();
            assert_eq!(VertexFormat::read(&mut reader).unwrap(), format);
        }
    }

    #[test]
    fn missing_type_in_older_games() {
        let mut format = VertexFormat::new();
        format
            .add_attribute(hashes::SKIN_WEIGHTS, AttributeFormat::WeightsUHalf4, 0)
            .unwrap();

        let mut builder = ResourceBuilder::new(MODEL, Game::Rottr);
        assert!(matches!(
            format.write(&mut builder),
            Err(Error::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn unknown_type_id() {
        let mut builder = ResourceBuilder::new(MODEL, Game::Sottr);
        builder.write_u64(0).unwrap();
        builder.write_u16(1).unwrap();
        builder.write_u8_list(&[12, 0]).unwrap();
        builder.write_u32(0).unwrap();
        builder.write_u32(hashes::POSITION).unwrap();
        builder.write_u16(0).unwrap();
        builder.write_u8_list(&[40, 0]).unwrap();

        let data = builder.build().unwrap();
        let mut reader = ResourceReader::new(MODEL, &data, true, Game::Sottr).unwrap();
        assert!(matches!(
            VertexFormat::read(&mut reader),
            Err(Error::UnsupportedLayout(_))
        ));
    }
}
