// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{Cursor, Write};

use binrw::{BinWrite, BinWriterExt};
use tracing::debug;

use crate::common::Game;
use crate::error::{Error, Result};
use crate::reader::ResourceReader;
use crate::record::{record_reference, Record, WriteContext};
use crate::relocation::{placeholder, RelocationTable};
use crate::resource::{ResourceKey, ResourceReference};
use crate::ByteBuffer;

/// Accumulates the body of one resource and the references stored in it.
///
/// Positions are relative to the start of the body. References are tracked by the position of
/// their field, so writing a record again at the same position replaces its references. This
/// is how references are patched once the data they point to has been written.
#[derive(Debug)]
pub struct ResourceBuilder {
    resource: ResourceKey,
    body: Cursor<ByteBuffer>,
    context: WriteContext,
}

impl ResourceBuilder {
    pub fn new(resource: ResourceKey, game: Game) -> Self {
        Self {
            resource,
            body: Cursor::new(ByteBuffer::new()),
            context: WriteContext::new(game),
        }
    }

    pub fn resource(&self) -> ResourceKey {
        self.resource
    }

    pub fn game(&self) -> Game {
        self.context.game()
    }

    pub fn position(&self) -> u64 {
        self.body.position()
    }

    /// Moves the cursor. Moving past the end and writing fills the gap with zeroes.
    pub fn set_position(&mut self, position: u64) {
        self.body.set_position(position);
    }

    pub fn len(&self) -> u64 {
        self.body.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.body.get_ref().is_empty()
    }

    pub fn body(&self) -> &[u8] {
        self.body.get_ref()
    }

    /// Every recorded reference with the position of its field, sorted by position.
    pub fn references(&self) -> Vec<(u64, ResourceReference)> {
        self.context
            .references()
            .iter()
            .map(|(position, reference)| (*position, *reference))
            .collect()
    }

    /// A reference into this resource at the current position.
    pub fn make_internal_ref(&self) -> ResourceReference {
        self.make_internal_ref_at(self.position())
    }

    /// A reference into this resource at `offset`.
    ///
    /// Reference targets are 32-bit, so `offset` must stay below 4 GiB; larger offsets are
    /// truncated.
    pub fn make_internal_ref_at(&self, offset: u64) -> ResourceReference {
        ResourceReference::new(self.resource, offset as u32)
    }

    pub fn write_struct<T: Record>(&mut self, value: &T) -> Result<()> {
        value.write_record(&mut self.body, &self.context)?;
        Ok(())
    }

    pub fn write_struct_list<T: Record>(&mut self, values: &[T]) -> Result<()> {
        for value in values {
            self.write_struct(value)?;
        }
        Ok(())
    }

    /// Writes `value` at `position` and returns to the current position.
    pub fn write_struct_at<T: Record>(&mut self, position: u64, value: &T) -> Result<()> {
        let current = self.position();
        self.set_position(position);
        let result = self.write_struct(value);
        self.set_position(current);
        result
    }

    builder_primitives!(u8, i8, u16, i16, u32, i32, u64, i64, f32);

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.body.write_all(bytes).map_err(binrw::Error::from)?;
        Ok(())
    }

    /// Writes a pointer-sized reference field.
    pub fn write_ref(&mut self, reference: Option<&ResourceReference>) -> Result<()> {
        record_reference(&mut self.body, &self.context, reference)?;
        Ok(())
    }

    /// Writes an internal reference field that points at itself and returns its position.
    ///
    /// Patch it with [`write_ref_at`](Self::write_ref_at) once the target has been written.
    pub fn write_internal_ref(&mut self) -> Result<u64> {
        let position = self.position();
        let reference = self.make_internal_ref();
        self.write_ref(Some(&reference))?;
        Ok(position)
    }

    pub fn write_ref_at(
        &mut self,
        position: u64,
        reference: Option<&ResourceReference>,
    ) -> Result<()> {
        let current = self.position();
        self.set_position(position);
        let result = self.write_ref(reference);
        self.set_position(current);
        result
    }

    /// Pads with zeroes up to a multiple of `alignment`. An alignment of 0 does nothing.
    ///
    /// The padded body must still be addressable by 32-bit reference offsets.
    pub fn align(&mut self, alignment: u64) -> Result<()> {
        if alignment == 0 {
            return Ok(());
        }

        let remainder = self.position() % alignment;
        if remainder != 0 {
            let padding = alignment - remainder;
            let padding = self
                .position()
                .checked_add(padding)
                .filter(|end| *end <= u32::MAX as u64)
                .and_then(|_| usize::try_from(padding).ok())
                .ok_or_else(|| {
                    Error::UnsupportedLayout(format!("cannot align {:#x} to {alignment:#x}", self.position()))
                })?;
            self.write_bytes(&vec![0u8; padding])?;
        }
        Ok(())
    }

    /// Writes the body of `other` at the current position.
    ///
    /// References of `other` into itself become references into this resource.
    pub fn append_builder(&mut self, other: &ResourceBuilder) -> Result<()> {
        self.append_body(other.resource, other.body(), &other.references())
    }

    /// Writes the body read by `reader` at the current position.
    ///
    /// References of the read resource into itself become references into this resource.
    pub fn append_reader(&mut self, reader: &ResourceReader) -> Result<()> {
        self.append_body(reader.resource(), reader.body(), reader.references())
    }

    fn append_body(
        &mut self,
        source: ResourceKey,
        body: &[u8],
        references: &[(u64, ResourceReference)],
    ) -> Result<()> {
        let base = self.position();
        self.write_bytes(body)?;

        for (position, reference) in references {
            let rebased = if reference.key == source {
                self.make_internal_ref_at(base + reference.offset as u64)
            } else {
                *reference
            };
            self.context.record(base + position, Some(&rebased));
        }

        Ok(())
    }

    /// Emits the relocation table followed by the body.
    pub fn build(self) -> Result<ByteBuffer> {
        let game = self.game();
        let references = self.context.references();
        let table = RelocationTable::from_references(
            self.resource,
            game,
            references.iter().map(|(position, reference)| (*position, reference)),
        )?;

        let mut body = self.body.get_ref().clone();
        for (position, reference) in references.iter() {
            let value = placeholder(game, Some(reference))?;
            let start = *position as usize;
            let size = game.pointer_size();
            let field = body.get_mut(start..start + size).ok_or_else(|| {
                Error::UnsupportedLayout(format!("reference field at {start:#x} lies past the body"))
            })?;
            field.copy_from_slice(&value.to_le_bytes()[..size]);
        }

        let mut output = Cursor::new(ByteBuffer::new());
        table.write_le(&mut output)?;
        output.get_mut().extend_from_slice(&body);

        debug!(
            resource = %self.resource,
            ?game,
            references = references.len(),
            size = output.get_ref().len(),
            "Built resource"
        );

        Ok(output.into_inner())
    }
}
