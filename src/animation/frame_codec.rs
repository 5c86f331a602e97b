// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ops::Range;

use binrw::binrw;

use crate::bitstream::{BitReader, BitWriter};
use crate::builder::ResourceBuilder;
use crate::error::{Error, Result};
use crate::reader::ResourceReader;
use crate::record::{parse_reference, write_reference, ReadContext, WriteContext};
use crate::resource::ResourceReference;

use super::Track;

/// Number of frames sharing one quantization header.
pub const FRAMES_PER_BATCH: usize = 16;

/// Attributes whose values stay this close to their first value are stored once.
const FIXED_EPSILON: f32 = 1e-4;

/// Value ranges at most this wide are stored with a scale of one.
const DEGENERATE_SCALE: f32 = 1e-4;

/// Precision settings of the animation writer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCodecOptions {
    /// Largest quantization step allowed for animated values, in raw attribute units. When no
    /// bit width is fine enough, the widest one is used.
    pub tolerance: f32,
}

impl Default for FrameCodecOptions {
    fn default() -> Self {
        Self { tolerance: 1e-4 }
    }
}

/// One frame of a track, seen as a list of raw attributes of up to three elements.
pub trait TrackFrame: Clone + Default {
    /// Names of the attributes, used in errors.
    const ATTRIBUTE_NAMES: &'static [&'static str];
    /// Number of elements in each attribute.
    const ELEMENTS: usize;
    /// Bit width of each 4-bit width code.
    const WIDTHS: [u32; 16];

    /// The stored form of `attribute`, or `None` if it is not set in this frame.
    fn raw_attribute(&self, attribute: usize) -> Option<[f32; 3]>;

    fn set_raw_attribute(&mut self, attribute: usize, value: [f32; 3]);
}

/// Where the parts of one data group are stored.
#[binrw]
#[brw(little)]
#[br(import(context: &ReadContext))]
#[bw(import(context: &WriteContext))]
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct AnimationDataRefs {
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    absence_flags: Option<ResourceReference>,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    fixation_flags: Option<ResourceReference>,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    fixed_values: Option<ResourceReference>,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    adjustment_floats: Option<ResourceReference>,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    batch_sizes: Option<ResourceReference>,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    batches: Option<ResourceReference>,
}

impl_record!(AnimationDataRefs, 0x30);

impl AnimationDataRefs {
    fn all(&self) -> Option<[ResourceReference; 6]> {
        Some([
            self.absence_flags?,
            self.fixation_flags?,
            self.fixed_values?,
            self.adjustment_floats?,
            self.batch_sizes?,
            self.batches?,
        ])
    }
}

/// A data group ready to be written.
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct EncodedGroup {
    /// One bit per track attribute, most significant bit first.
    pub absence_flags: Vec<u32>,
    pub fixation_flags: Vec<u32>,
    pub fixed_values: Vec<f32>,
    /// Per animated attribute, the bias of each element followed by the scale of each element.
    pub adjustment_floats: Vec<f32>,
    /// Size of each batch in 4-byte words.
    pub batch_sizes: Vec<u16>,
    pub batches: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Classification {
    Absent,
    Fixed([f32; 3]),
    Animated { bias: [f32; 3], scale: [f32; 3] },
}

#[derive(Debug, Clone, Copy)]
struct AnimatedAttribute {
    track: usize,
    attribute: usize,
    bias: [f32; 3],
    scale: [f32; 3],
}

/// Per batch quantization of one animated attribute.
#[derive(Debug, Clone, Copy, Default)]
struct BatchPlan {
    code: u8,
    byte_bias: [u8; 3],
    byte_scale: [u8; 3],
}

const fn flag_words(count: usize) -> usize {
    (count + 31) / 32
}

const fn code_words(count: usize) -> usize {
    (count * 4 + 31) / 32
}

#[inline]
fn flag_bit(index: usize) -> (usize, u32) {
    (index / 32, 1u32 << (31 - index % 32))
}

#[inline]
fn code_shift(index: usize) -> u32 {
    28 - (index % 8) as u32 * 4
}

#[inline]
fn steps(width: u32) -> f32 {
    ((1u64 << width) - 1) as f32
}

fn distance(a: &[f32; 3], b: &[f32; 3], elements: usize) -> f32 {
    (0..elements)
        .map(|e| (a[e] - b[e]) * (a[e] - b[e]))
        .sum::<f32>()
        .sqrt()
}

fn classify<F: TrackFrame>(frames: &[F], attribute: usize, num_frames: usize) -> Classification {
    let mut first: Option<[f32; 3]> = None;
    let mut animated = false;
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];

    for frame in frames.iter().take(num_frames) {
        let Some(value) = frame.raw_attribute(attribute) else {
            continue;
        };

        match first {
            None => first = Some(value),
            Some(first) => animated |= distance(&first, &value, F::ELEMENTS) > FIXED_EPSILON,
        }

        for e in 0..F::ELEMENTS {
            min[e] = min[e].min(value[e]);
            max[e] = max[e].max(value[e]);
        }
    }

    match first {
        None => Classification::Absent,
        Some(value) if !animated => Classification::Fixed(value),
        Some(_) => {
            let mut bias = [0.0; 3];
            let mut scale = [1.0; 3];
            for e in 0..F::ELEMENTS {
                bias[e] = min[e];
                if max[e] - min[e] > DEGENERATE_SCALE {
                    scale[e] = max[e] - min[e];
                }
            }
            Classification::Animated { bias, scale }
        }
    }
}

fn raw_value<F: TrackFrame>(
    tracks: &[Track<F>],
    attribute: &AnimatedAttribute,
    frame: usize,
) -> Result<[f32; 3]> {
    let track = &tracks[attribute.track];
    track
        .frames
        .get(frame)
        .and_then(|values| values.raw_attribute(attribute.attribute))
        .ok_or(Error::AbsentAttribute {
            track: track.id,
            attribute: F::ATTRIBUTE_NAMES[attribute.attribute],
            frame,
        })
}

#[inline]
fn fraction(value: f32, bias: f32, scale: f32) -> f32 {
    ((value - bias) / scale).clamp(0.0, 1.0)
}

/// Classifies and quantizes `tracks`, each with `attributes` attributes.
pub(super) fn encode_group<F: TrackFrame>(
    tracks: &[Track<F>],
    attributes: usize,
    num_frames: usize,
    options: &FrameCodecOptions,
) -> Result<EncodedGroup> {
    let words = flag_words(tracks.len() * attributes);
    let mut group = EncodedGroup {
        absence_flags: vec![0; words],
        fixation_flags: vec![0; words],
        ..Default::default()
    };

    let mut animated = Vec::new();
    for (track_index, track) in tracks.iter().enumerate() {
        if track.frames.len() > num_frames {
            return Err(Error::UnsupportedLayout(format!(
                "track {} has {} frames, the animation has {num_frames}",
                track.id,
                track.frames.len()
            )));
        }

        for attribute in 0..attributes {
            let (word, bit) = flag_bit(track_index * attributes + attribute);
            match classify(&track.frames, attribute, num_frames) {
                Classification::Absent => group.absence_flags[word] |= bit,
                Classification::Fixed(value) => {
                    group.fixation_flags[word] |= bit;
                    group.fixed_values.extend_from_slice(&value[..F::ELEMENTS]);
                }
                Classification::Animated { bias, scale } => animated.push(AnimatedAttribute {
                    track: track_index,
                    attribute,
                    bias,
                    scale,
                }),
            }
        }
    }

    for attribute in &animated {
        group
            .adjustment_floats
            .extend_from_slice(&attribute.bias[..F::ELEMENTS]);
        group
            .adjustment_floats
            .extend_from_slice(&attribute.scale[..F::ELEMENTS]);
    }

    if tracks.is_empty() {
        return Ok(group);
    }

    for batch in 0..num_frames.div_ceil(FRAMES_PER_BATCH) {
        let start = batch * FRAMES_PER_BATCH;
        let frames = start..num_frames.min(start + FRAMES_PER_BATCH);
        let bytes = encode_batch(tracks, &animated, frames, options)?;

        let size = u16::try_from(bytes.len() / 4).map_err(|_| {
            Error::UnsupportedLayout(format!("frame batch {batch} takes {} bytes", bytes.len()))
        })?;
        group.batch_sizes.push(size);
        group.batches.extend_from_slice(&bytes);
    }

    Ok(group)
}

fn plan_attribute<F: TrackFrame>(
    tracks: &[Track<F>],
    attribute: &AnimatedAttribute,
    frames: Range<usize>,
    options: &FrameCodecOptions,
    adjustment: &mut [u8],
) -> Result<BatchPlan> {
    let mut lo = [f32::MAX; 3];
    let mut hi = [f32::MIN; 3];
    for frame in frames {
        let value = raw_value(tracks, attribute, frame)?;
        for e in 0..F::ELEMENTS {
            let fraction = fraction(value[e], attribute.bias[e], attribute.scale[e]);
            lo[e] = lo[e].min(fraction);
            hi[e] = hi[e].max(fraction);
        }
    }

    let mut plan = BatchPlan::default();

    // constant inside the batch, so a 16-bit fraction is enough
    if (0..F::ELEMENTS).all(|e| hi[e] <= lo[e]) {
        for e in 0..F::ELEMENTS {
            let value = (lo[e] * u16::MAX as f32).round() as u16;
            adjustment[e * 2..e * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        return Ok(plan);
    }

    for e in 0..F::ELEMENTS {
        let byte_bias = (lo[e] * 255.0).floor().clamp(0.0, 255.0);
        let byte_scale = ((hi[e] * 255.0).ceil() - byte_bias).clamp(1.0, 255.0);
        plan.byte_bias[e] = byte_bias as u8;
        plan.byte_scale[e] = byte_scale as u8;
        adjustment[e * 2] = plan.byte_bias[e];
        adjustment[e * 2 + 1] = plan.byte_scale[e];
    }

    plan.code = (1..F::WIDTHS.len())
        .find(|code| {
            let steps = steps(F::WIDTHS[*code]);
            (0..F::ELEMENTS).all(|e| {
                attribute.scale[e] * (plan.byte_scale[e] as f32 / 255.0) / steps
                    <= options.tolerance
            })
        })
        .unwrap_or(F::WIDTHS.len() - 1) as u8;

    Ok(plan)
}

fn encode_batch<F: TrackFrame>(
    tracks: &[Track<F>],
    animated: &[AnimatedAttribute],
    frames: Range<usize>,
    options: &FrameCodecOptions,
) -> Result<Vec<u8>> {
    let elements = F::ELEMENTS;
    let mut codes = vec![0u32; code_words(animated.len())];
    let mut adjustment = vec![0u8; animated.len() * elements * 2];
    let mut plans = Vec::with_capacity(animated.len());

    for (index, attribute) in animated.iter().enumerate() {
        let bytes = &mut adjustment[index * elements * 2..(index + 1) * elements * 2];
        let plan = plan_attribute(tracks, attribute, frames.clone(), options, bytes)?;
        codes[index / 8] |= (plan.code as u32) << code_shift(index);
        plans.push(plan);
    }

    let mut bits = BitWriter::new();
    for frame in frames {
        for (attribute, plan) in animated.iter().zip(&plans) {
            if plan.code == 0 {
                continue;
            }

            let width = F::WIDTHS[plan.code as usize];
            let value = raw_value(tracks, attribute, frame)?;
            for e in 0..elements {
                let fraction = fraction(value[e], attribute.bias[e], attribute.scale[e]);
                let low = plan.byte_bias[e] as f32 / 255.0;
                let range = plan.byte_scale[e] as f32 / 255.0;
                let quantized = ((fraction - low) / range * steps(width))
                    .round()
                    .clamp(0.0, steps(width));
                bits.write(quantized as u32, width);
            }
        }
    }

    let mut bytes: Vec<u8> = codes.iter().flat_map(|word| word.to_le_bytes()).collect();
    bytes.extend_from_slice(&adjustment);
    bytes.resize(bytes.len().next_multiple_of(4), 0);
    bytes.extend_from_slice(&bits.finish());

    Ok(bytes)
}

/// Writes every part of `group` and returns where they went.
pub(super) fn write_group(
    builder: &mut ResourceBuilder,
    group: &EncodedGroup,
) -> Result<AnimationDataRefs> {
    let absence_flags = builder.make_internal_ref();
    builder.write_u32_list(&group.absence_flags)?;

    let fixation_flags = builder.make_internal_ref();
    builder.write_u32_list(&group.fixation_flags)?;

    let fixed_values = builder.make_internal_ref();
    builder.write_f32_list(&group.fixed_values)?;

    let adjustment_floats = builder.make_internal_ref();
    builder.write_f32_list(&group.adjustment_floats)?;

    let batch_sizes = builder.make_internal_ref();
    builder.write_u16_list(&group.batch_sizes)?;
    builder.align(4)?;

    let batches = builder.make_internal_ref();
    builder.write_bytes(&group.batches)?;
    builder.write_u64(0)?;

    Ok(AnimationDataRefs {
        absence_flags: Some(absence_flags),
        fixation_flags: Some(fixation_flags),
        fixed_values: Some(fixed_values),
        adjustment_floats: Some(adjustment_floats),
        batch_sizes: Some(batch_sizes),
        batches: Some(batches),
    })
}

/// Reads one data group into `num_tracks` tracks of `num_frames` frames each.
///
/// Attributes that are not stored stay unset. The stored tables are checked against the track
/// and frame counts before any frame is allocated.
pub(super) fn read_group<F: TrackFrame>(
    reader: &mut ResourceReader,
    refs: &AnimationDataRefs,
    num_tracks: usize,
    attributes: usize,
    num_frames: usize,
    num_batches: usize,
) -> Result<Vec<Vec<F>>> {
    let Some([absence, fixation, fixed, adjustment, batch_sizes, batches]) = refs.all() else {
        return allocate_tracks(reader, num_tracks, num_frames);
    };

    let elements = F::ELEMENTS;
    let flag_count = num_tracks
        .checked_mul(attributes)
        .ok_or_else(|| reader.malformed(reader.position(), "too many animation tracks"))?;
    let words = flag_words(flag_count);

    reader.seek(&absence)?;
    let absence_flags = reader.read_u32_list(words)?;

    reader.seek(&fixation)?;
    let fixation_flags = reader.read_u32_list(words)?;

    reader.seek(&fixed)?;
    let mut fixed_values = Vec::new();
    let mut animated = Vec::new();
    for track in 0..num_tracks {
        for attribute in 0..attributes {
            let (word, bit) = flag_bit(track * attributes + attribute);
            if absence_flags[word] & bit != 0 {
                continue;
            }

            if fixation_flags[word] & bit != 0 {
                let mut value = [0.0; 3];
                for element in value.iter_mut().take(elements) {
                    *element = reader.read_f32()?;
                }
                fixed_values.push((track, attribute, value));
            } else {
                animated.push((track, attribute));
            }
        }
    }

    reader.seek(&adjustment)?;
    let adjustment_floats = reader.read_f32_list(animated.len() * elements * 2)?;

    reader.seek(&batch_sizes)?;
    let batch_sizes = reader.read_u16_list(num_batches)?;

    if !animated.is_empty() && num_batches.saturating_mul(FRAMES_PER_BATCH) < num_frames {
        return Err(reader.malformed(
            reader.position(),
            format!("{num_batches} frame batches cannot hold {num_frames} frames"),
        ));
    }

    let mut tracks = allocate_tracks::<F>(reader, num_tracks, num_frames)?;
    for (track, attribute, value) in fixed_values {
        for frame in tracks[track].iter_mut() {
            frame.set_raw_attribute(attribute, value);
        }
    }

    if animated.is_empty() {
        return Ok(tracks);
    }

    reader.seek(&batches)?;
    let mut next_batch = reader.position();
    for (batch, size) in batch_sizes.iter().enumerate() {
        reader.set_position(next_batch);
        next_batch += *size as u64 * 4;

        let codes = reader.read_u32_list(code_words(animated.len()))?;
        let adjustment_bytes = reader.read_bytes(animated.len() * elements * 2)?;
        reader.align(4);

        let stream_start = reader.position();
        let stream = reader
            .body()
            .get(stream_start as usize..)
            .ok_or_else(|| reader.malformed(stream_start, "frame batch lies past the body"))?;
        let mut bits = BitReader::new(stream);

        let start = batch * FRAMES_PER_BATCH;
        for frame in start..num_frames.min(start + FRAMES_PER_BATCH) {
            for (index, (track, attribute)) in animated.iter().enumerate() {
                let code = (codes[index / 8] >> code_shift(index)) & 0xF;
                let width = F::WIDTHS[code as usize];
                let floats = &adjustment_floats[index * elements * 2..(index + 1) * elements * 2];
                let bytes = &adjustment_bytes[index * elements * 2..(index + 1) * elements * 2];

                let mut value = [0.0; 3];
                for e in 0..elements {
                    let fraction = if width == 0 {
                        u16::from_le_bytes([bytes[e * 2], bytes[e * 2 + 1]]) as f32
                            / u16::MAX as f32
                    } else {
                        let quantized = bits.read(width).ok_or_else(|| {
                            reader.malformed(stream_start, "frame batch bit stream is truncated")
                        })?;
                        quantized as f32 / steps(width) * (bytes[e * 2 + 1] as f32 / 255.0)
                            + bytes[e * 2] as f32 / 255.0
                    };
                    value[e] = fraction * floats[elements + e] + floats[e];
                }

                tracks[*track][frame].set_raw_attribute(*attribute, value);
            }
        }
    }

    Ok(tracks)
}

fn allocate_tracks<F: TrackFrame>(
    reader: &ResourceReader,
    num_tracks: usize,
    num_frames: usize,
) -> Result<Vec<Vec<F>>> {
    let out_of_memory = || {
        reader.malformed(
            reader.position(),
            format!("cannot hold {num_tracks} tracks of {num_frames} frames"),
        )
    };

    let mut tracks = Vec::new();
    tracks.try_reserve_exact(num_tracks).map_err(|_| out_of_memory())?;
    for _ in 0..num_tracks {
        let mut frames = Vec::new();
        frames.try_reserve_exact(num_frames).map_err(|_| out_of_memory())?;
        frames.resize(num_frames, F::default());
        tracks.push(frames);
    }

    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{BlendShapeFrame, BoneFrame};
    use crate::common::{Game, ResourceType};
    use crate::resource::ResourceKey;
    use glam::{Quat, Vec3};

    const ANIMATION: ResourceKey = ResourceKey::new(ResourceType::Animation, 0x30);

    record_size_tests!(AnimationDataRefs);

    fn round_trip<F: TrackFrame>(
        tracks: &[Track<F>],
        attributes: usize,
        num_frames: usize,
    ) -> (EncodedGroup, Vec<Vec<F>>) {
        let group = encode_group(tracks, attributes, num_frames, &FrameCodecOptions::default())
            .unwrap();

        let mut builder = ResourceBuilder::new(ANIMATION, Game::Sottr);
        let refs = write_group(&mut builder, &group).unwrap();
        let data = builder.build().unwrap();

        let mut reader = ResourceReader::new(ANIMATION, &data, true, Game::Sottr).unwrap();
        let decoded = read_group(
            &mut reader,
            &refs,
            tracks.len(),
            attributes,
            num_frames,
            group.batch_sizes.len(),
        )
        .unwrap();

        (group, decoded)
    }

    fn weights(id: u16, values: impl Iterator<Item = f32>) -> Track<BlendShapeFrame> {
        Track {
            id,
            frames: values
                .map(|weight| BlendShapeFrame {
                    weight: Some(weight),
                })
                .collect(),
        }
    }

    #[test]
    fn fixed_values_are_exact() {
        let tracks = [weights(3, std::iter::repeat(0.123_456_7).take(40))];
        let (group, decoded) = round_trip(&tracks, 1, 40);

        assert_eq!(group.fixation_flags, vec![0x8000_0000]);
        assert_eq!(group.fixed_values, vec![0.123_456_7]);
        assert!(group.adjustment_floats.is_empty());
        assert_eq!(group.batch_sizes, vec![0, 0, 0]);

        assert!(decoded[0].iter().all(|frame| frame.weight == Some(0.123_456_7)));
    }

    #[test]
    fn animated_values_within_tolerance() {
        let tracks = [
            weights(0, (0..50).map(|frame| (frame as f32 * 0.3).sin())),
            weights(1, (0..50).map(|frame| frame as f32 / 49.0)),
        ];
        let (group, decoded) = round_trip(&tracks, 1, 50);

        assert_eq!(group.batch_sizes.len(), 4);
        assert_eq!(
            group.batches.len(),
            group.batch_sizes.iter().map(|size| *size as usize * 4).sum::<usize>()
        );

        for (track, frames) in tracks.iter().zip(&decoded) {
            for (original, decoded) in track.frames.iter().zip(frames) {
                let difference = (original.weight.unwrap() - decoded.weight.unwrap()).abs();
                assert!(difference <= 1e-4 + 1e-6, "{difference}");
            }
        }
    }

    #[test]
    fn constant_batch_uses_code_zero() {
        // still for the first batch, then moving
        let tracks = [weights(
            0,
            (0..32).map(|frame| if frame < 16 { 0.25 } else { frame as f32 / 10.0 }),
        )];
        let (group, decoded) = round_trip(&tracks, 1, 32);

        // one code word, one byte pair, padded to 4 and no bits
        assert_eq!(group.batch_sizes[0], 2);
        assert_eq!(group.batches[..4], [0, 0, 0, 0]);

        let scale = 3.1 - 0.25;
        for (original, decoded) in tracks[0].frames.iter().zip(&decoded[0]) {
            let difference = (original.weight.unwrap() - decoded.weight.unwrap()).abs();
            assert!(difference <= scale / 65535.0 + 1e-4);
        }
    }

    #[test]
    fn bone_attributes() {
        let frames: Vec<BoneFrame> = (0..20)
            .map(|frame| BoneFrame {
                rotation: Some(Quat::from_rotation_y(frame as f32 * 0.05)),
                position: Some(Vec3::new(0.0, 10.0, 2.0)),
                scale: None,
            })
            .collect();
        let tracks = [Track { id: 9, frames }];
        let (group, decoded) = round_trip(&tracks, 3, 20);

        // rotation animated, position fixed, scale absent
        assert_eq!(group.absence_flags, vec![0x2000_0000]);
        assert_eq!(group.fixation_flags, vec![0x4000_0000]);
        assert_eq!(group.adjustment_floats.len(), 6);

        for (original, decoded) in tracks[0].frames.iter().zip(&decoded[0]) {
            assert!(decoded.scale.is_none());
            let position = decoded.position.unwrap();
            assert!((position - Vec3::new(0.0, 10.0, 2.0)).length() < 1e-4);

            let rotation = decoded.rotation.unwrap();
            assert!(rotation.angle_between(original.rotation.unwrap()) < 1e-3);
        }
    }

    #[test]
    fn missing_frame_of_animated_attribute() {
        let mut track = weights(7, (0..20).map(|frame| frame as f32));
        track.frames[5].weight = None;

        assert!(matches!(
            encode_group(&[track], 1, 20, &FrameCodecOptions::default()),
            Err(Error::AbsentAttribute {
                track: 7,
                attribute: "weight",
                frame: 5
            })
        ));
    }

    #[test]
    fn too_few_batches() {
        let tracks = [weights(0, (0..40).map(|frame| frame as f32))];
        let group = encode_group(&tracks, 1, 40, &FrameCodecOptions::default()).unwrap();

        let mut builder = ResourceBuilder::new(ANIMATION, Game::Rottr);
        let refs = write_group(&mut builder, &group).unwrap();
        let data = builder.build().unwrap();
        let mut reader = ResourceReader::new(ANIMATION, &data, true, Game::Rottr).unwrap();

        assert!(matches!(
            read_group::<BlendShapeFrame>(&mut reader, &refs, 1, 1, 40, 2),
            Err(Error::MalformedResource { .. })
        ));
    }

    #[test]
    fn many_animated_bones() {
        // 39 animated attributes need two flag words and several width code words
        let tracks: Vec<Track<BoneFrame>> = (0..13)
            .map(|track| Track {
                id: track,
                frames: (0..37)
                    .map(|frame| {
                        let (track, frame) = (track as f32, frame as f32);
                        BoneFrame {
                            rotation: Some(Quat::from_axis_angle(
                                Vec3::new(1.0, track, 2.0).normalize(),
                                0.3 + frame * 0.02 + track * 0.05,
                            )),
                            position: Some(Vec3::new(
                                frame * 1.5,
                                track * 10.0 + (frame * 0.2).sin() * 5.0,
                                -frame,
                            )),
                            scale: Some(Vec3::splat(1.0 + frame * 0.01 + track * 0.1)),
                        }
                    })
                    .collect(),
            })
            .collect();
        let (group, decoded) = round_trip(&tracks, 3, 37);

        assert_eq!(group.absence_flags, vec![0, 0]);
        assert_eq!(group.fixation_flags, vec![0, 0]);
        assert_eq!(group.batch_sizes.len(), 3);

        for (track, frames) in tracks.iter().zip(&decoded) {
            for (original, decoded) in track.frames.iter().zip(frames) {
                for attribute in 0..3 {
                    let original = original.raw_attribute(attribute).unwrap();
                    let decoded = decoded.raw_attribute(attribute).unwrap();
                    for (a, b) in original.iter().zip(decoded) {
                        assert!((a - b).abs() < 1e-3, "{attribute}: {a} {b}");
                    }
                }
            }
        }
    }

    #[test]
    fn counts_larger_than_the_tables() {
        let tracks = [weights(0, (0..16).map(|frame| frame as f32))];
        let group = encode_group(&tracks, 1, 16, &FrameCodecOptions::default()).unwrap();

        let mut builder = ResourceBuilder::new(ANIMATION, Game::Sottr);
        let refs = write_group(&mut builder, &group).unwrap();
        let data = builder.build().unwrap();
        let mut reader = ResourceReader::new(ANIMATION, &data, true, Game::Sottr).unwrap();

        assert!(matches!(
            read_group::<BoneFrame>(&mut reader, &refs, 4000, 3, 65535, 4096),
            Err(Error::MalformedResource { .. })
        ));
    }

    #[test]
    fn coarser_tolerance_uses_fewer_bits() {
        let tracks = [weights(0, (0..16).map(|frame| frame as f32 / 15.0))];

        let fine = encode_group(&tracks, 1, 16, &FrameCodecOptions::default()).unwrap();
        let coarse = encode_group(&tracks, 1, 16, &FrameCodecOptions { tolerance: 0.01 }).unwrap();

        assert!(coarse.batches.len() < fine.batches.len());
    }
}
