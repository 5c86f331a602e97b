// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::f32::consts::PI;

use binrw::binrw;
use bitflags::bitflags;
use glam::{Quat, Vec3};
use tracing::debug;

use crate::builder::ResourceBuilder;
use crate::error::{Error, Result};
use crate::reader::ResourceReader;
use crate::record::{parse_reference, write_reference, ReadContext, WriteContext};
use crate::resource::ResourceReference;

mod frame_codec;
use frame_codec::{encode_group, read_group, write_group, AnimationDataRefs};
pub use frame_codec::{FrameCodecOptions, TrackFrame, FRAMES_PER_BATCH};

bitflags! {
    #[binrw]
    #[derive(Default)]
    pub struct AnimationFlags : u16 {
        const UNKNOWN_4 = 0x4;
        const UNKNOWN_100 = 0x100;
        /// Bone tracks carry a scale attribute after rotation and position.
        const HAS_BONE_SCALE = 0x200;
    }
}

#[binrw]
#[brw(little)]
#[br(import(context: &ReadContext))]
#[bw(import(context: &WriteContext))]
#[derive(Debug, Default, Clone, PartialEq)]
struct AnimationHeader {
    field_0: i64,
    field_8: i64,
    field_10: i64,
    #[br(map = Vec3::from_array)]
    #[bw(map = |value: &Vec3| value.to_array())]
    base_position: Vec3,
    field_24: i32,
    field_28: i64,
    #[br(map = Vec3::from_array)]
    #[bw(map = |value: &Vec3| value.to_array())]
    base_rotation: Vec3,
    field_3c: i16,
    num_frames: u16,
    ms_per_frame: u16,
    num_bones: u16,
    field_44: i32,
    field_48: i16,
    num_blend_shapes: u8,
    field_4b: u8,
    flags: AnimationFlags,
    num_bone_batches: u16,
    num_blend_shape_batches: u16,
    field_52: i16,
    field_54: i32,
    field_58: i64,
    field_60: i64,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    bone_distances_from_parent: Option<ResourceReference>,
    field_70: i64,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    held_frames: Option<ResourceReference>,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    global_bone_ids: Option<ResourceReference>,
    field_88: i64,
    field_90: i64,
    field_98: i64,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    global_blend_shape_ids: Option<ResourceReference>,
    field_a8: i64,
    field_b0: i64,
    #[br(args(context))]
    #[bw(args(context))]
    bone_data: AnimationDataRefs,
    #[br(args(context))]
    #[bw(args(context))]
    blend_shape_data: AnimationDataRefs,
    field_118: i64,
    field_120: i64,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    unknown: Option<ResourceReference>,
}

impl_record!(AnimationHeader, 0x130);

/// Frames of one bone or blend shape, identified by its global id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track<F> {
    pub id: u16,
    pub frames: Vec<F>,
}

/// The transform of a bone in one frame. Attributes that are not animated are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneFrame {
    pub rotation: Option<Quat>,
    pub position: Option<Vec3>,
    pub scale: Option<Vec3>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlendShapeFrame {
    pub weight: Option<f32>,
}

/// Converts a rotation to its stored form, the axis scaled by the angle divided by π.
pub fn rotation_to_raw(rotation: Quat) -> Vec3 {
    if 1.0 - rotation.w < 1e-8 {
        return Vec3::ZERO;
    }

    let angle = rotation.w.clamp(-1.0, 1.0).acos() * 2.0;
    let sin = (angle / 2.0).sin();
    if sin.abs() < 1e-8 {
        return Vec3::ZERO;
    }

    Vec3::new(rotation.x, rotation.y, rotation.z) * (angle / PI / sin)
}

pub fn rotation_from_raw(raw: Vec3) -> Quat {
    let angle = raw.length() * PI;
    if angle < 1e-8 {
        return Quat::IDENTITY;
    }

    Quat::from_axis_angle(raw.normalize(), angle)
}

/// Positions are stored in hundredths.
pub fn position_to_raw(position: Vec3) -> Vec3 {
    position / 100.0
}

pub fn position_from_raw(raw: Vec3) -> Vec3 {
    raw * 100.0
}

impl TrackFrame for BoneFrame {
    const ATTRIBUTE_NAMES: &'static [&'static str] = &["rotation", "position", "scale"];
    const ELEMENTS: usize = 3;
    const WIDTHS: [u32; 16] = [0, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 23];

    fn raw_attribute(&self, attribute: usize) -> Option<[f32; 3]> {
        match attribute {
            0 => self.rotation.map(|rotation| rotation_to_raw(rotation).to_array()),
            1 => self.position.map(|position| position_to_raw(position).to_array()),
            2 => self.scale.map(|scale| scale.to_array()),
            _ => None,
        }
    }

    fn set_raw_attribute(&mut self, attribute: usize, value: [f32; 3]) {
        let value = Vec3::from_array(value);
        match attribute {
            0 => self.rotation = Some(rotation_from_raw(value)),
            1 => self.position = Some(position_from_raw(value)),
            2 => self.scale = Some(value),
            _ => {}
        }
    }
}

impl TrackFrame for BlendShapeFrame {
    const ATTRIBUTE_NAMES: &'static [&'static str] = &["weight"];
    const ELEMENTS: usize = 1;
    const WIDTHS: [u32; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 16, 23];

    fn raw_attribute(&self, _: usize) -> Option<[f32; 3]> {
        self.weight.map(|weight| [weight, 0.0, 0.0])
    }

    fn set_raw_attribute(&mut self, _: usize, value: [f32; 3]) {
        self.weight = Some(value[0]);
    }
}

/// A compressed skeletal and blend shape animation.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub id: u32,
    pub ms_per_frame: u16,
    pub num_frames: u16,
    /// Empty, or one distance per bone track.
    pub bone_distances_from_parent: Vec<f32>,
    pub bone_tracks: Vec<Track<BoneFrame>>,
    pub blend_shape_tracks: Vec<Track<BlendShapeFrame>>,
}

impl Animation {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ms_per_frame: 100,
            num_frames: 0,
            bone_distances_from_parent: Vec::new(),
            bone_tracks: Vec::new(),
            blend_shape_tracks: Vec::new(),
        }
    }

    /// Reads the animation starting at the cursor.
    pub fn read(reader: &mut ResourceReader) -> Result<Animation> {
        let header: AnimationHeader = reader.read_struct()?;
        let num_frames = header.num_frames as usize;

        let bone_ids = read_ids(reader, header.global_bone_ids, header.num_bones as usize)?;
        let blend_shape_ids = read_ids(
            reader,
            header.global_blend_shape_ids,
            header.num_blend_shapes as usize,
        )?;

        let bone_distances_from_parent = match header.bone_distances_from_parent {
            Some(reference) => {
                reader.seek(&reference)?;
                reader.read_f32_list(bone_ids.len())?
            }
            None => Vec::new(),
        };

        let mut held_frames = 0;
        if let Some(reference) = header.held_frames {
            reader.seek(&reference)?;
            while reader.read_i32()? != 0 {
                held_frames += 1;
            }
        }

        let bone_attributes = if header.flags.contains(AnimationFlags::HAS_BONE_SCALE) {
            3
        } else {
            2
        };

        let bone_frames = read_group::<BoneFrame>(
            reader,
            &header.bone_data,
            bone_ids.len(),
            bone_attributes,
            num_frames,
            header.num_bone_batches as usize,
        )?;
        let blend_shape_frames = read_group::<BlendShapeFrame>(
            reader,
            &header.blend_shape_data,
            blend_shape_ids.len(),
            1,
            num_frames,
            header.num_blend_shape_batches as usize,
        )?;

        debug!(
            resource = %reader.resource(),
            frames = num_frames,
            bones = bone_ids.len(),
            blend_shapes = blend_shape_ids.len(),
            held_frames,
            "Read animation"
        );

        Ok(Animation {
            id: reader.resource().id,
            ms_per_frame: header.ms_per_frame,
            num_frames: header.num_frames,
            bone_distances_from_parent,
            bone_tracks: bone_ids
                .into_iter()
                .zip(bone_frames)
                .map(|(id, frames)| Track { id, frames })
                .collect(),
            blend_shape_tracks: blend_shape_ids
                .into_iter()
                .zip(blend_shape_frames)
                .map(|(id, frames)| Track { id, frames })
                .collect(),
        })
    }

    /// Compresses and writes the animation at the cursor.
    pub fn write(&self, builder: &mut ResourceBuilder, options: &FrameCodecOptions) -> Result<()> {
        let num_bones = u16::try_from(self.bone_tracks.len())
            .map_err(|_| Error::UnsupportedLayout(format!("{} bone tracks", self.bone_tracks.len())))?;
        let num_blend_shapes = u8::try_from(self.blend_shape_tracks.len()).map_err(|_| {
            Error::UnsupportedLayout(format!(
                "{} blend shape tracks",
                self.blend_shape_tracks.len()
            ))
        })?;

        if !self.bone_distances_from_parent.is_empty()
            && self.bone_distances_from_parent.len() != self.bone_tracks.len()
        {
            return Err(Error::UnsupportedLayout(format!(
                "{} bone distances for {} bone tracks",
                self.bone_distances_from_parent.len(),
                self.bone_tracks.len()
            )));
        }

        let num_frames = self.num_frames as usize;
        let bone_group = encode_group(&self.bone_tracks, 3, num_frames, options)?;
        let blend_shape_group = encode_group(&self.blend_shape_tracks, 1, num_frames, options)?;

        let header_position = builder.position();
        let mut header = AnimationHeader {
            num_frames: self.num_frames,
            ms_per_frame: self.ms_per_frame,
            num_bones,
            num_blend_shapes,
            flags: AnimationFlags::UNKNOWN_4
                | AnimationFlags::UNKNOWN_100
                | AnimationFlags::HAS_BONE_SCALE,
            num_bone_batches: bone_group.batch_sizes.len() as u16,
            num_blend_shape_batches: blend_shape_group.batch_sizes.len() as u16,
            ..Default::default()
        };
        builder.write_struct(&header)?;

        if !self.bone_distances_from_parent.is_empty() {
            header.bone_distances_from_parent = Some(builder.make_internal_ref());
            builder.write_f32_list(&self.bone_distances_from_parent)?;
        }

        header.global_bone_ids = Some(builder.make_internal_ref());
        let bone_ids: Vec<u16> = self.bone_tracks.iter().map(|track| track.id).collect();
        builder.write_u16_list(&bone_ids)?;
        builder.align(4)?;

        header.global_blend_shape_ids = Some(builder.make_internal_ref());
        let blend_shape_ids: Vec<u16> = self
            .blend_shape_tracks
            .iter()
            .map(|track| track.id)
            .collect();
        builder.write_u16_list(&blend_shape_ids)?;
        builder.align(4)?;

        if !self.bone_tracks.is_empty() {
            header.bone_data = write_group(builder, &bone_group)?;
        }
        if !self.blend_shape_tracks.is_empty() {
            header.blend_shape_data = write_group(builder, &blend_shape_group)?;
        }

        header.unknown = Some(builder.make_internal_ref());
        builder.write_i32(0)?;

        builder.write_struct_at(header_position, &header)?;

        debug!(
            resource = %builder.resource(),
            frames = num_frames,
            bones = num_bones,
            blend_shapes = num_blend_shapes,
            "Wrote animation"
        );

        Ok(())
    }

    pub fn bone_track(&self, id: u16) -> Option<&Track<BoneFrame>> {
        self.bone_tracks.iter().find(|track| track.id == id)
    }

    pub fn blend_shape_track(&self, id: u16) -> Option<&Track<BlendShapeFrame>> {
        self.blend_shape_tracks.iter().find(|track| track.id == id)
    }

    fn bone_attribute<T>(
        &self,
        bone: u16,
        frame: usize,
        attribute: &'static str,
        get: impl Fn(&BoneFrame) -> Option<T>,
    ) -> Result<T> {
        self.bone_track(bone)
            .and_then(|track| track.frames.get(frame))
            .and_then(get)
            .ok_or(Error::AbsentAttribute {
                track: bone,
                attribute,
                frame,
            })
    }

    pub fn bone_rotation(&self, bone: u16, frame: usize) -> Result<Quat> {
        self.bone_attribute(bone, frame, "rotation", |values| values.rotation)
    }

    pub fn bone_position(&self, bone: u16, frame: usize) -> Result<Vec3> {
        self.bone_attribute(bone, frame, "position", |values| values.position)
    }

    pub fn bone_scale(&self, bone: u16, frame: usize) -> Result<Vec3> {
        self.bone_attribute(bone, frame, "scale", |values| values.scale)
    }

    pub fn blend_shape_weight(&self, blend_shape: u16, frame: usize) -> Result<f32> {
        self.blend_shape_track(blend_shape)
            .and_then(|track| track.frames.get(frame))
            .and_then(|values| values.weight)
            .ok_or(Error::AbsentAttribute {
                track: blend_shape,
                attribute: "weight",
                frame,
            })
    }
}

fn read_ids(
    reader: &mut ResourceReader,
    reference: Option<ResourceReference>,
    count: usize,
) -> Result<Vec<u16>> {
    match reference {
        Some(reference) => {
            reader.seek(&reference)?;
            reader.read_u16_list(count)
        }
        None if count == 0 => Ok(Vec::new()),
        None => Err(reader.malformed(
            reader.position(),
            format!("{count} tracks without a global id list"),
        )),
    }
}
