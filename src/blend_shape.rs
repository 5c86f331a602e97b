// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;

use binrw::binrw;
use glam::Vec3;
use tracing::debug;

use crate::builder::ResourceBuilder;
use crate::error::{Error, Result};
use crate::reader::ResourceReader;

/// Vertices covered by one range entry.
const VERTICES_PER_BATCH: usize = 64;

/// Every table of the blend shape block starts on this boundary.
const TABLE_ALIGNMENT: u64 = 0x20;

pub const POSITION_SCALE: f32 = 8.0;
pub const NORMAL_SCALE: f32 = 2.0;
pub const COLOR_SCALE: f32 = 1.0;

/// Offsets are relative to the model data header.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq)]
struct BlendShapesHeader {
    num_blend_shapes: i32,
    num_vertex_offsets: i32,
    field_8: i32,
    positions_offset: i32,
    normals_offset: i32,
    colors_offset: i32,
    segments_offset: i32,
    vertex_indices_offset: i32,
    bitmask_offset: i64,
    data_offset: i64,
    srvs_offset: i64,
}

impl_record!(BlendShapesHeader, 0x38, plain);

/// How one vertex moves when its blend shape is fully applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VertexOffsets {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShape {
    /// Names are stored outside of the blend shape block.
    pub name: Option<String>,
    /// Offsets keyed by vertex index.
    pub vertices: BTreeMap<u32, VertexOffsets>,
}

/// Packs a vector into three 10-bit fields covering `[-scale, scale]`. Longer vectors are scaled
/// down to fit.
pub fn pack_vertex_offset(offset: Vec3, scale: f32) -> u32 {
    let max_component = offset.abs().max_element();
    let offset = if max_component > scale {
        offset / max_component * scale
    } else {
        offset
    };

    let field = |value: f32| ((value + scale) / (scale * 2.0) * 1023.0 + 0.5) as u32 & 0x3FF;
    field(offset.x) | field(offset.y) << 10 | field(offset.z) << 20
}

pub fn unpack_vertex_offset(value: u32, scale: f32) -> Vec3 {
    let field = |shift: u32| (((value >> shift) & 0x3FF) as f32 / 1023.0 * 2.0 - 1.0) * scale;
    Vec3::new(field(0), field(10), field(20))
}

fn relative(position: u64, base: u64) -> i64 {
    position as i64 - base as i64
}

impl BlendShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the blend shape block at the cursor into `slot_count` slots.
    ///
    /// Slots without a blend shape are `None`. `names` is indexed by slot.
    pub fn read(
        reader: &mut ResourceReader,
        model_data_header_pos: u64,
        slot_count: usize,
        names: Option<&[String]>,
        vertex_count: usize,
    ) -> Result<Vec<Option<BlendShape>>> {
        let header_position = reader.position();
        let header: BlendShapesHeader = reader.read_struct()?;

        let at = |offset: i64| model_data_header_pos.wrapping_add_signed(offset);

        reader.set_position(at(header.bitmask_offset));
        let bitmask = reader.read_u32_list(slot_count.div_ceil(32))?;
        let present: Vec<bool> = (0..slot_count)
            .map(|slot| bitmask[slot / 32] & (1 << (slot % 32)) != 0)
            .collect();

        let mut slots: Vec<Option<BlendShape>> = vec![None; slot_count];
        if header.num_blend_shapes == 0 {
            reader.align(TABLE_ALIGNMENT);
            return Ok(slots);
        }

        let num_blend_shapes = present.iter().filter(|present| **present).count();
        if header.num_blend_shapes as usize != num_blend_shapes {
            return Err(reader.malformed(
                header_position,
                format!(
                    "{} blend shapes in the header, {num_blend_shapes} in the slot bitmask",
                    header.num_blend_shapes
                ),
            ));
        }

        let num_offsets = usize::try_from(header.num_vertex_offsets)
            .map_err(|_| reader.malformed(header_position, "negative vertex offset count"))?;
        let num_batches = vertex_count.div_ceil(VERTICES_PER_BATCH);

        reader.set_position(at(header.segments_offset as i64));
        let ranges = reader.read_u32_list(num_batches * num_blend_shapes)?;

        reader.set_position(at(header.positions_offset as i64));
        let positions = reader.read_u32_list(num_offsets)?;

        reader.set_position(at(header.normals_offset as i64));
        let normals = reader.read_u32_list(num_offsets)?;

        reader.set_position(at(header.colors_offset as i64));
        let colors = reader.read_u32_list(num_offsets)?;

        reader.set_position(at(header.vertex_indices_offset as i64));
        let vertex_indices = reader.read_bytes(num_offsets)?;
        reader.align(TABLE_ALIGNMENT);

        let mut blend_shapes = vec![BlendShape::new(); num_blend_shapes];
        let mut ranges = ranges.iter();
        for batch in 0..num_batches {
            for blend_shape in blend_shapes.iter_mut() {
                let Some(range) = ranges.next() else {
                    break;
                };
                let start = (range >> 8) as usize;
                let length = (range & 0xFF) as usize;
                if start + length > num_offsets {
                    return Err(reader.malformed(
                        header_position,
                        format!("vertex range {start}+{length} exceeds {num_offsets} offsets"),
                    ));
                }

                for i in start..start + length {
                    let vertex = batch * VERTICES_PER_BATCH + vertex_indices[i] as usize;
                    blend_shape.vertices.insert(
                        vertex as u32,
                        VertexOffsets {
                            position: unpack_vertex_offset(positions[i], POSITION_SCALE),
                            normal: unpack_vertex_offset(normals[i], NORMAL_SCALE),
                            color: unpack_vertex_offset(colors[i], COLOR_SCALE),
                        },
                    );
                }
            }
        }

        let mut blend_shapes = blend_shapes.into_iter();
        for (slot, value) in slots.iter_mut().enumerate() {
            if !present[slot] {
                continue;
            }

            *value = blend_shapes.next().map(|mut blend_shape| {
                blend_shape.name = names.and_then(|names| names.get(slot).cloned());
                blend_shape
            });
        }

        debug!(
            resource = %reader.resource(),
            slots = slot_count,
            blend_shapes = num_blend_shapes,
            offsets = num_offsets,
            "Read blend shapes"
        );

        Ok(slots)
    }

    /// Writes the blend shape block of `blend_shapes` at the cursor.
    pub fn write(
        builder: &mut ResourceBuilder,
        model_data_header_pos: u64,
        blend_shapes: &[Option<BlendShape>],
        vertex_count: usize,
    ) -> Result<()> {
        let present: Vec<&BlendShape> = blend_shapes.iter().flatten().collect();
        let num_batches = vertex_count.div_ceil(VERTICES_PER_BATCH);

        for blend_shape in &present {
            if let Some(vertex) = blend_shape
                .vertices
                .keys()
                .find(|vertex| **vertex as usize >= num_batches * VERTICES_PER_BATCH)
            {
                return Err(Error::DomainViolation {
                    what: "blend shape vertex index",
                    value: *vertex as f64,
                    limit: (num_batches * VERTICES_PER_BATCH) as f64,
                });
            }
        }

        let num_offsets: usize = present.iter().map(|shape| shape.vertices.len()).sum();

        let header_position = builder.position();
        let mut header = BlendShapesHeader {
            num_blend_shapes: present.len() as i32,
            num_vertex_offsets: num_offsets as i32,
            ..Default::default()
        };
        builder.write_struct(&header)?;
        builder.align(TABLE_ALIGNMENT)?;

        let mut bitmask = vec![0u32; blend_shapes.len().div_ceil(32)];
        for (slot, blend_shape) in blend_shapes.iter().enumerate() {
            if blend_shape.is_some() {
                bitmask[slot / 32] |= 1 << (slot % 32);
            }
        }

        header.bitmask_offset = relative(builder.position(), model_data_header_pos);
        builder.write_u32_list(&bitmask)?;
        builder.align(TABLE_ALIGNMENT)?;

        let mut ranges = Vec::with_capacity(num_batches * present.len());
        let mut positions = Vec::with_capacity(num_offsets);
        let mut normals = Vec::with_capacity(num_offsets);
        let mut colors = Vec::with_capacity(num_offsets);
        let mut vertex_indices = Vec::with_capacity(num_offsets);

        for batch in 0..num_batches {
            let first = (batch * VERTICES_PER_BATCH) as u32;
            let last = first + VERTICES_PER_BATCH as u32;

            for blend_shape in &present {
                let start = positions.len() as u32;
                for (vertex, offsets) in blend_shape.vertices.range(first..last) {
                    positions.push(pack_vertex_offset(offsets.position, POSITION_SCALE));
                    normals.push(pack_vertex_offset(offsets.normal, NORMAL_SCALE));
                    colors.push(pack_vertex_offset(offsets.color, COLOR_SCALE));
                    vertex_indices.push((vertex - first) as u8);
                }

                let length = positions.len() as u32 - start;
                ranges.push(length | start << 8);
            }
        }

        header.segments_offset = relative(builder.position(), model_data_header_pos) as i32;
        builder.write_u32_list(&ranges)?;
        builder.align(TABLE_ALIGNMENT)?;

        header.positions_offset = relative(builder.position(), model_data_header_pos) as i32;
        builder.write_u32_list(&positions)?;
        builder.align(TABLE_ALIGNMENT)?;

        header.normals_offset = relative(builder.position(), model_data_header_pos) as i32;
        builder.write_u32_list(&normals)?;
        builder.align(TABLE_ALIGNMENT)?;

        header.colors_offset = relative(builder.position(), model_data_header_pos) as i32;
        builder.write_u32_list(&colors)?;
        builder.align(TABLE_ALIGNMENT)?;

        header.vertex_indices_offset = relative(builder.position(), model_data_header_pos) as i32;
        builder.write_bytes(&vertex_indices)?;
        builder.align(TABLE_ALIGNMENT)?;

        builder.write_struct_at(header_position, &header)?;

        debug!(
            resource = %builder.resource(),
            slots = blend_shapes.len(),
            blend_shapes = present.len(),
            offsets = num_offsets,
            "Wrote blend shapes"
        );

        Ok(())
    }
}
