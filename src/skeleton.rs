// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;

use binrw::binrw;
use glam::{Quat, Vec3};
use tracing::debug;

use crate::builder::ResourceBuilder;
use crate::error::{Error, Result};
use crate::reader::ResourceReader;
use crate::record::{
    parse_reference, vec3_from_disk, vec3_to_disk, write_reference, ReadContext, WriteContext,
};
use crate::resource::ResourceReference;

/// Global id written for local blend shape ids that have no mapping.
const UNMAPPED_BLEND_SHAPE: u16 = 0xFFFF;

#[binrw]
#[brw(little)]
#[br(import(context: &ReadContext))]
#[bw(import(context: &WriteContext))]
#[derive(Debug, Default, Clone, PartialEq)]
struct SkeletonHeader {
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    bone_array: Option<ResourceReference>,

    num_anim_id_mappings: u16,
    num_counterpart_ranges: u16,
    field_c: i32,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    counterpart_ranges: Option<ResourceReference>,

    num_ignore_counterpart_bones: i32,
    field_1c: i32,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    ignore_counterpart_bones: Option<ResourceReference>,

    num_bone_id_mappings: i32,
    field_2c: i32,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    bone_id_mappings: Option<ResourceReference>,

    num_blend_shape_id_mappings: i32,
    field_3c: i32,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    blend_shape_id_mappings: Option<ResourceReference>,
}

impl_record!(SkeletonHeader, 0x48);

/// Pairs `count` bones starting at `first` with the bones starting at `second`.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq)]
struct CounterpartRange {
    first: u8,
    second: u8,
    count: u8,
}

impl_record!(CounterpartRange, 3, plain);

/// A bone as stored in the bone array.
#[binrw]
#[brw(little)]
#[br(import(context: &ReadContext))]
#[bw(import(context: &WriteContext))]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Bone {
    #[br(map = vec3_from_disk)]
    #[bw(map = vec3_to_disk)]
    pub min: Vec3,
    #[br(map = vec3_from_disk)]
    #[bw(map = vec3_to_disk)]
    pub max: Vec3,
    /// Location relative to the parent bone.
    #[br(map = vec3_from_disk)]
    #[bw(map = vec3_to_disk)]
    pub relative_location: Vec3,
    pub flags: i32,
    pub first_vertex: u16,
    pub last_vertex: u16,
    /// Local id of the parent, or -1 for roots.
    pub parent_id: i32,
    #[br(parse_with = parse_reference, args(context))]
    #[bw(write_with = write_reference, args(context))]
    pub info: Option<ResourceReference>,
    pub field_44: i32,
    pub field_48: i32,
    pub field_4c: i32,
}

impl_record!(Bone, 0x50);

impl Bone {
    pub fn parent(&self) -> Option<usize> {
        usize::try_from(self.parent_id).ok()
    }

    pub fn distance_from_parent(&self) -> f32 {
        self.relative_location.length()
    }
}

/// A bone together with the mappings the skeleton keeps for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonBone {
    pub bone: Bone,
    /// Id used by animations to address this bone.
    pub global_id: Option<u16>,
    /// Local id of the mirrored bone.
    pub counterpart: Option<u8>,
    /// Derived from the locations of the children, see [`Skeleton::assign_auto_orientations`].
    pub absolute_orientation: Quat,
}

impl SkeletonBone {
    pub fn new(bone: Bone) -> Self {
        Self {
            bone,
            global_id: None,
            counterpart: None,
            absolute_orientation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub id: u32,
    pub bones: Vec<SkeletonBone>,
    /// Global blend shape id of each local blend shape id.
    pub global_blend_shape_ids: BTreeMap<u16, u16>,
}

impl Skeleton {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            bones: Vec::new(),
            global_blend_shape_ids: BTreeMap::new(),
        }
    }

    /// Reads the skeleton starting at the cursor.
    pub fn read(reader: &mut ResourceReader) -> Result<Skeleton> {
        let mut skeleton = Skeleton::new(reader.resource().id);
        let header: SkeletonHeader = reader.read_struct()?;

        let Some(bone_array) = header.bone_array else {
            return Ok(skeleton);
        };

        reader.seek(&bone_array)?;
        let count_position = reader.position();
        let num_bones = usize::try_from(reader.read_i64()?)
            .map_err(|_| reader.malformed(count_position, "negative bone count"))?;
        let Some(bones) = reader.read_ref()? else {
            return Ok(skeleton);
        };

        reader.seek(&bones)?;
        skeleton.bones = reader
            .read_struct_list::<Bone>(num_bones)?
            .into_iter()
            .map(SkeletonBone::new)
            .collect();

        skeleton.assign_auto_orientations();
        skeleton.read_id_mappings(reader, &header)?;
        skeleton.read_counterparts(reader, &header)?;

        debug!(
            resource = %reader.resource(),
            bones = skeleton.bones.len(),
            blend_shapes = skeleton.global_blend_shape_ids.len(),
            "Read skeleton"
        );

        Ok(skeleton)
    }

    fn read_id_mappings(&mut self, reader: &mut ResourceReader, header: &SkeletonHeader) -> Result<()> {
        if let Some(mappings) = header.bone_id_mappings {
            reader.seek(&mappings)?;
            for _ in 0..header.num_bone_id_mappings.max(0) {
                let position = reader.position();
                let global_id = reader.read_u16()?;
                let local_id = reader.read_u16()?;

                let bone = self.bones.get_mut(local_id as usize).ok_or_else(|| {
                    reader.malformed(position, format!("bone id mapping for missing bone {local_id}"))
                })?;
                bone.global_id = Some(global_id);
            }
        }

        if let Some(mappings) = header.blend_shape_id_mappings {
            reader.seek(&mappings)?;
            for _ in 0..header.num_blend_shape_id_mappings.max(0) {
                let global_id = reader.read_u16()?;
                let local_id = reader.read_u16()?;
                if global_id != UNMAPPED_BLEND_SHAPE {
                    self.global_blend_shape_ids.insert(local_id, global_id);
                }
            }
        }

        Ok(())
    }

    fn read_counterparts(&mut self, reader: &mut ResourceReader, header: &SkeletonHeader) -> Result<()> {
        let Some(ranges) = header.counterpart_ranges else {
            return Ok(());
        };

        reader.seek(&ranges)?;
        let position = reader.position();
        let ranges: Vec<CounterpartRange> =
            reader.read_struct_list(header.num_counterpart_ranges as usize)?;

        for range in ranges {
            for i in 0..range.count {
                let bone = range.first as usize + i as usize;
                let counterpart = range.second.checked_add(i);
                match (self.bones.get_mut(bone), counterpart) {
                    (Some(bone), Some(counterpart)) => bone.counterpart = Some(counterpart),
                    _ => {
                        return Err(reader.malformed(
                            position,
                            format!("counterpart range {range:?} exceeds the bone array"),
                        ))
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes the skeleton at the cursor.
    pub fn write(&self, builder: &mut ResourceBuilder) -> Result<()> {
        let num_global_ids = self
            .bones
            .iter()
            .filter(|bone| bone.global_id.is_some())
            .count();
        let num_counterparts = self
            .bones
            .iter()
            .filter(|bone| bone.counterpart.is_some())
            .count();
        let num_blend_shape_ids = self
            .global_blend_shape_ids
            .keys()
            .next_back()
            .map_or(0, |local_id| *local_id as usize + 1);

        if num_counterparts > 0 && self.bones.len() > u8::MAX as usize + 1 {
            return Err(Error::UnsupportedLayout(format!(
                "counterparts among {} bones",
                self.bones.len()
            )));
        }

        let header_position = builder.position();
        let mut header = SkeletonHeader {
            num_anim_id_mappings: u16::try_from(num_global_ids).map_err(|_| {
                Error::UnsupportedLayout(format!("{num_global_ids} global bone ids"))
            })?,
            num_counterpart_ranges: num_counterparts as u16,
            num_bone_id_mappings: num_global_ids as i32,
            num_blend_shape_id_mappings: num_blend_shape_ids as i32,
            ..Default::default()
        };
        builder.write_struct(&header)?;

        header.bone_array = Some(builder.make_internal_ref());
        builder.write_i64(self.bones.len() as i64)?;
        let bones_field = builder.write_internal_ref()?;

        builder.align(0x10)?;
        let bones = builder.make_internal_ref();
        builder.write_ref_at(bones_field, Some(&bones))?;
        for bone in &self.bones {
            builder.write_struct(&bone.bone)?;
        }

        header.bone_id_mappings = Some(builder.make_internal_ref());
        for (local_id, bone) in self.bones.iter().enumerate() {
            if let Some(global_id) = bone.global_id {
                builder.write_u16(global_id)?;
                builder.write_u16(local_id as u16)?;
            }
        }

        header.blend_shape_id_mappings = Some(builder.make_internal_ref());
        for local_id in 0..num_blend_shape_ids as u16 {
            let global_id = self
                .global_blend_shape_ids
                .get(&local_id)
                .copied()
                .unwrap_or(UNMAPPED_BLEND_SHAPE);
            builder.write_u16(global_id)?;
            builder.write_u16(local_id)?;
        }

        header.counterpart_ranges = Some(builder.make_internal_ref());
        for (local_id, bone) in self.bones.iter().enumerate() {
            if let Some(counterpart) = bone.counterpart {
                builder.write_struct(&CounterpartRange {
                    first: local_id as u8,
                    second: counterpart,
                    count: 1,
                })?;
            }
        }
        builder.write_struct(&CounterpartRange::default())?;

        builder.write_struct_at(header_position, &header)?;

        debug!(
            resource = %builder.resource(),
            bones = self.bones.len(),
            blend_shapes = num_blend_shape_ids,
            "Wrote skeleton"
        );

        Ok(())
    }

    /// Points each bone from +Z towards the mean location of its children.
    ///
    /// Leaf bones take the orientation of their parent, roots without children keep the
    /// identity.
    pub fn assign_auto_orientations(&mut self) {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.bones.len()];
        for (id, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.bone.parent().filter(|parent| *parent < children.len()) {
                children[parent].push(id);
            }
        }

        for (id, child_ids) in children.iter().enumerate() {
            if child_ids.is_empty() {
                continue;
            }

            let average = child_ids
                .iter()
                .map(|child| self.bones[*child].bone.relative_location)
                .sum::<Vec3>()
                / child_ids.len() as f32;

            self.bones[id].absolute_orientation = if average.length() < 1e-4 {
                Quat::IDENTITY
            } else {
                Quat::from_rotation_arc(Vec3::Z, average.normalize())
            };
        }

        for (id, child_ids) in children.iter().enumerate() {
            if !child_ids.is_empty() {
                continue;
            }

            self.bones[id].absolute_orientation = match self.bones[id].bone.parent() {
                Some(parent) if parent < self.bones.len() => self.bones[parent].absolute_orientation,
                _ => Quat::IDENTITY,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Game, ResourceType};
    use crate::resource::ResourceKey;

    const SKELETON: ResourceKey = ResourceKey::new(ResourceType::Dtp, 0x1F2);

    record_size_tests!(SkeletonHeader, Bone);

    #[test]
    fn counterpart_range_size() {
        assert_eq!(crate::record::encoded_size(&CounterpartRange::default()), 3);
    }

    fn bone(parent_id: i32, relative_location: Vec3) -> SkeletonBone {
        SkeletonBone::new(Bone {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
            relative_location,
            parent_id,
            ..Default::default()
        })
    }

    fn arm() -> Skeleton {
        let mut skeleton = Skeleton::new(SKELETON.id);
        skeleton.bones = vec![
            bone(-1, Vec3::ZERO),
            bone(0, Vec3::new(10.0, 0.0, 0.0)),
            bone(1, Vec3::new(0.0, 5.0, 0.0)),
            bone(0, Vec3::new(10.0, 0.0, 0.0)),
        ];
        skeleton.bones[0].global_id = Some(0);
        skeleton.bones[1].global_id = Some(20);
        skeleton.bones[3].global_id = Some(21);
        skeleton.bones[1].counterpart = Some(3);
        skeleton.bones[3].counterpart = Some(1);
        skeleton.global_blend_shape_ids.insert(0, 7);
        skeleton.global_blend_shape_ids.insert(2, 9);
        skeleton.assign_auto_orientations();
        skeleton
    }

    #[test]
    fn orientations() {
        let skeleton = arm();

        let root = skeleton.bones[0].absolute_orientation;
        assert!((root * Vec3::Z - Vec3::X).length() < 1e-5);

        let elbow = skeleton.bones[1].absolute_orientation;
        assert!((elbow * Vec3::Z - Vec3::Y).length() < 1e-5);

        // leaves follow their parent
        assert_eq!(skeleton.bones[2].absolute_orientation, elbow);
        assert_eq!(skeleton.bones[3].absolute_orientation, root);
    }

    #[test]
    fn write_then_read() {
        let skeleton = arm();

        for game in [Game::Rottr, Game::Sottr] {
            let mut builder = ResourceBuilder::new(SKELETON, game);
            skeleton.write(&mut builder).unwrap();
            let data = builder.build().unwrap();

            let mut reader = ResourceReader::new(SKELETON, &data, true, game).unwrap();
            let decoded = Skeleton::read(&mut reader).unwrap();
            assert_eq!(decoded, skeleton);
            assert_eq!(decoded.bones[1].bone.distance_from_parent(), 10.0);
        }
    }

    #[test]
    fn layout() {
        let mut builder = ResourceBuilder::new(SKELETON, Game::Sottr);
        arm().write(&mut builder).unwrap();

        let body = builder.body();
        // count and pointer after the header, bones aligned to 0x10
        assert_eq!(&body[0x48..0x50], &4i64.to_le_bytes());
        assert_eq!(body.len(), 0x60 + 4 * 0x50 + 3 * 4 + 3 * 4 + 3 * 3);

        let references = builder.references();
        assert!(references.contains(&(0, ResourceReference::new(SKELETON, 0x48))));
        assert!(references.contains(&(0x50, ResourceReference::new(SKELETON, 0x60))));
    }

    #[test]
    fn empty_skeleton() {
        let skeleton = Skeleton::new(SKELETON.id);

        let mut builder = ResourceBuilder::new(SKELETON, Game::Rottr);
        skeleton.write(&mut builder).unwrap();
        let data = builder.build().unwrap();

        let mut reader = ResourceReader::new(SKELETON, &data, true, Game::Rottr).unwrap();
        assert_eq!(Skeleton::read(&mut reader).unwrap(), skeleton);
    }

    #[test]
    fn counterpart_past_the_bones() {
        let mut skeleton = arm();
        skeleton.bones.truncate(2);
        skeleton.bones[1].counterpart = Some(1);

        let mut builder = ResourceBuilder::new(SKELETON, Game::Sottr);
        skeleton.write(&mut builder).unwrap();

        // point the range of bone 1 past the array, ahead of the terminator
        let first = builder.len() - 6;
        builder.set_position(first);
        builder.write_u8(5).unwrap();

        let data = builder.build().unwrap();
        let mut reader = ResourceReader::new(SKELETON, &data, true, Game::Sottr).unwrap();
        assert!(matches!(
            Skeleton::read(&mut reader),
            Err(Error::MalformedResource { .. })
        ));
    }
}
