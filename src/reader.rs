// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Display;
use std::io::Cursor;

use binrw::{BinRead, BinReaderExt};
use tracing::debug;

use crate::common::Game;
use crate::error::{Error, Result};
use crate::record::{read_reference, ReadContext, Record};
use crate::relocation::{RelocationCounts, RelocationTable};
use crate::resource::{ResourceKey, ResourceReference};
use crate::ByteSpan;

/// A cursor over the body of one resource.
///
/// All positions are relative to the start of the body, which is also what alignment is
/// measured against. Error offsets are absolute into the resource data.
#[derive(Debug, Clone)]
pub struct ResourceReader<'a> {
    data: ByteSpan<'a>,
    body_start: u64,
    cursor: Cursor<ByteSpan<'a>>,
    context: ReadContext,
}

impl<'a> ResourceReader<'a> {
    /// Parses the relocation table of `data` (when `has_references` is set) and places the
    /// cursor at the start of the body.
    pub fn new(
        resource: ResourceKey,
        data: ByteSpan<'a>,
        has_references: bool,
        game: Game,
    ) -> Result<Self> {
        let malformed = |offset: u64, reason: String| Error::MalformedResource {
            resource,
            offset,
            reason,
        };

        if !has_references {
            return Ok(Self {
                data,
                body_start: 0,
                cursor: Cursor::new(data),
                context: ReadContext::new(resource, game, Vec::new()),
            });
        }

        let layout = game.wide_reference_layout();
        let mut cursor = Cursor::new(data);
        let counts: RelocationCounts = cursor
            .read_le()
            .map_err(|_| malformed(0, "relocation table header is truncated".to_string()))?;

        let body_start = counts.table_size(layout);
        if body_start > data.len() as u64 {
            return Err(malformed(
                0,
                format!(
                    "relocation table needs {body_start} bytes, only {} available",
                    data.len()
                ),
            ));
        }

        cursor.set_position(0);
        let table = RelocationTable::read_options(&mut cursor, binrw::Endian::Little, (layout,))
            .map_err(|err| malformed(cursor.position(), err.to_string()))?;

        let body = &data[body_start as usize..];
        let references = table.resolve(resource, game, body, body_start)?;

        debug!(%resource, ?game, body_start, references = references.len(), "Opened resource");

        Ok(Self {
            data,
            body_start,
            cursor: Cursor::new(body),
            context: ReadContext::new(resource, game, references),
        })
    }

    pub fn resource(&self) -> ResourceKey {
        self.context.resource()
    }

    pub fn game(&self) -> Game {
        self.context.game()
    }

    /// Offset of the body in the resource data, which is the size of the relocation table.
    pub fn body_start(&self) -> u64 {
        self.body_start
    }

    pub fn body(&self) -> ByteSpan<'a> {
        *self.cursor.get_ref()
    }

    pub fn data(&self) -> ByteSpan<'a> {
        self.data
    }

    /// Every reference of the resource with the position of its field, sorted by position.
    pub fn references(&self) -> &[(u64, ResourceReference)] {
        self.context.references()
    }

    /// The reference stored in the field at `position`, if there is one.
    pub fn reference_at(&self, position: u64) -> Option<ResourceReference> {
        self.context.reference_at(position)
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn set_position(&mut self, position: u64) {
        self.cursor.set_position(position);
    }

    pub fn skip(&mut self, count: u64) {
        self.cursor
            .set_position(self.cursor.position().saturating_add(count));
    }

    /// Rounds the position up to a multiple of `alignment`. An alignment of 0 does nothing.
    pub fn align(&mut self, alignment: u64) {
        if alignment == 0 {
            return;
        }

        let position = self.cursor.position();
        let remainder = position % alignment;
        if remainder != 0 {
            self.cursor
                .set_position(position.saturating_add(alignment - remainder));
        }
    }

    /// Moves to the target of `reference`, which must point into this resource.
    pub fn seek(&mut self, reference: &ResourceReference) -> Result<()> {
        if reference.key != self.resource() {
            return Err(Error::InvalidReference {
                resource: self.resource(),
                reference: *reference,
            });
        }

        self.cursor.set_position(reference.offset as u64);
        Ok(())
    }

    pub fn read_struct<T: Record>(&mut self) -> Result<T> {
        let position = self.cursor.position();
        T::read_record(&mut self.cursor, &self.context).map_err(|err| self.malformed(position, err))
    }

    pub fn read_struct_list<T: Record>(&mut self, count: usize) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(self.read_struct()?);
        }

        Ok(values)
    }

    reader_primitives!(u8, i8, u16, i16, u32, i32, u64, i64, f32);

    /// Borrows the next `count` bytes of the body.
    pub fn read_bytes(&mut self, count: usize) -> Result<ByteSpan<'a>> {
        self.ensure_remaining(count)?;

        let body = self.body();
        let start = self.cursor.position() as usize;
        self.cursor.set_position((start + count) as u64);

        Ok(&body[start..start + count])
    }

    /// Reads a pointer-sized reference field.
    pub fn read_ref(&mut self) -> Result<Option<ResourceReference>> {
        let position = self.cursor.position();
        self.ensure_remaining(self.game().pointer_size())?;

        read_reference(&mut self.cursor, &self.context).map_err(|err| self.malformed(position, err))
    }

    pub fn read_ref_list(&mut self, count: usize) -> Result<Vec<Option<ResourceReference>>> {
        self.ensure_remaining(count.saturating_mul(self.game().pointer_size()))?;
        (0..count).map(|_| self.read_ref()).collect()
    }

    fn ensure_remaining(&self, count: usize) -> Result<()> {
        let position = self.cursor.position();
        let length = self.cursor.get_ref().len() as u64;
        if position.saturating_add(count as u64) > length {
            return Err(self.malformed(
                position,
                format!("{count} bytes requested, only {} left", length.saturating_sub(position)),
            ));
        }

        Ok(())
    }

    pub(crate) fn malformed(&self, position: u64, reason: impl Display) -> Error {
        Error::MalformedResource {
            resource: self.resource(),
            offset: self.body_start.saturating_add(position),
            reason: reason.to_string(),
        }
    }
}
