// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{BinResult, BinWriterExt};
use glam::{Mat4, Quat, Vec3};

use crate::common::Game;
use crate::relocation::placeholder;
use crate::resource::{ResourceKey, ResourceReference};

/// A fixed-size structure stored in a resource body.
///
/// Records are plain `binrw` structs. Fields that hold references take the active
/// [`ReadContext`] or [`WriteContext`] as an import and go through [`parse_reference`] and
/// [`write_reference`], vectors and quaternions go through the `*_from_disk` and `*_to_disk`
/// maps below. Implement this trait with `impl_record!`.
pub trait Record: Sized {
    /// Encoded size in bytes, for games with 64-bit pointers.
    const SIZE: usize;

    fn read_record<R: Read + Seek>(reader: &mut R, context: &ReadContext) -> BinResult<Self>;

    fn write_record<W: Write + Seek>(&self, writer: &mut W, context: &WriteContext)
        -> BinResult<()>;
}

/// What reference converters need while a resource is being read.
#[derive(Debug, Clone)]
pub struct ReadContext {
    resource: ResourceKey,
    game: Game,
    /// Sorted by field position, relative to the body start.
    references: Vec<(u64, ResourceReference)>,
}

impl ReadContext {
    pub(crate) fn new(
        resource: ResourceKey,
        game: Game,
        references: Vec<(u64, ResourceReference)>,
    ) -> Self {
        Self {
            resource,
            game,
            references,
        }
    }

    pub fn resource(&self) -> ResourceKey {
        self.resource
    }

    pub fn game(&self) -> Game {
        self.game
    }

    /// The reference stored in the field at `position`, if there is one.
    pub fn reference_at(&self, position: u64) -> Option<ResourceReference> {
        self.references
            .binary_search_by_key(&position, |(field, _)| *field)
            .ok()
            .map(|index| self.references[index].1)
    }

    pub fn references(&self) -> &[(u64, ResourceReference)] {
        &self.references
    }
}

/// Collects the references of a resource while it is being written.
#[derive(Debug)]
pub struct WriteContext {
    game: Game,
    references: RefCell<BTreeMap<u64, ResourceReference>>,
}

impl WriteContext {
    pub(crate) fn new(game: Game) -> Self {
        Self {
            game,
            references: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn game(&self) -> Game {
        self.game
    }

    /// Records `reference` for the field at `position`. Writing `None` forgets the field.
    pub fn record(&self, position: u64, reference: Option<&ResourceReference>) {
        let mut references = self.references.borrow_mut();
        match reference {
            Some(reference) => {
                references.insert(position, *reference);
            }
            None => {
                references.remove(&position);
            }
        }
    }

    pub(crate) fn references(&self) -> std::cell::Ref<'_, BTreeMap<u64, ResourceReference>> {
        self.references.borrow()
    }
}

/// Reads a reference field at the current position and moves past it.
pub fn read_reference<R: Read + Seek>(
    reader: &mut R,
    context: &ReadContext,
) -> BinResult<Option<ResourceReference>> {
    let position = reader.stream_position()?;
    reader.seek(SeekFrom::Current(context.game.pointer_size() as i64))?;

    Ok(context.reference_at(position))
}

/// Records a reference field at the current position and writes its placeholder value.
pub fn record_reference<W: Write + Seek>(
    writer: &mut W,
    context: &WriteContext,
    reference: Option<&ResourceReference>,
) -> BinResult<()> {
    let position = writer.stream_position()?;
    let value = placeholder(context.game, reference).map_err(|err| binrw::Error::Custom {
        pos: position,
        err: Box::new(err),
    })?;

    context.record(position, reference);

    match context.game.pointer_size() {
        4 => writer.write_le(&(value as u32)),
        _ => writer.write_le(&value),
    }
}

#[binrw::parser(reader)]
pub fn parse_reference(context: &ReadContext) -> BinResult<Option<ResourceReference>> {
    read_reference(reader, context)
}

#[binrw::writer(writer)]
pub fn write_reference(
    reference: &Option<ResourceReference>,
    context: &WriteContext,
) -> BinResult<()> {
    record_reference(writer, context, reference.as_ref())
}

/// Vectors are stored as four floats with an unused `w`.
pub fn vec3_from_disk(raw: [f32; 4]) -> Vec3 {
    Vec3::new(raw[0], raw[1], raw[2])
}

pub fn vec3_to_disk(value: &Vec3) -> [f32; 4] {
    [value.x, value.y, value.z, 0.0]
}

pub fn quat_from_disk(raw: [f32; 4]) -> Quat {
    Quat::from_xyzw(raw[0], raw[1], raw[2], raw[3])
}

pub fn quat_to_disk(value: &Quat) -> [f32; 4] {
    [value.x, value.y, value.z, value.w]
}

/// Matrices are stored column by column.
pub fn mat4_from_disk(raw: [f32; 16]) -> Mat4 {
    Mat4::from_cols_array(&raw)
}

pub fn mat4_to_disk(value: &Mat4) -> [f32; 16] {
    value.to_cols_array()
}

/// Encodes `value` for a 64-bit pointer game and returns its length.
#[cfg(test)]
pub(crate) fn encoded_size<T: Record>(value: &T) -> usize {
    let context = WriteContext::new(Game::Rottr);
    let mut cursor = std::io::Cursor::new(Vec::new());
    value.write_record(&mut cursor, &context).unwrap();
    cursor.into_inner().len()
}
