// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(clippy::identity_op)]

use binrw::binrw;
use modular_bitfield::prelude::*;
use tracing::{debug, warn};

use crate::common::{Game, ResourceType, WideReferenceLayout};
use crate::error::{Error, Result};
use crate::resource::{ResourceKey, ResourceReference};

/// The five counts at the start of every relocation table.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelocationCounts {
    pub internal: u32,
    pub wide: u32,
    pub int_patches: u32,
    pub short_patches: u32,
    pub packed: u32,
}

impl RelocationCounts {
    pub const SIZE: u64 = 20;

    /// Size of the whole table these counts describe, including the counts themselves.
    pub fn table_size(&self, layout: WideReferenceLayout) -> u64 {
        let wide_size = match layout {
            WideReferenceLayout::Packed => 8,
            WideReferenceLayout::Explicit => 16,
        };

        Self::SIZE
            + self.internal as u64 * 8
            + self.wide as u64 * wide_size
            + self.int_patches as u64 * 4
            + self.short_patches as u64 * 8
            + self.packed as u64 * 4
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalEntry {
    pub pointer_offset: u32,
    pub target_offset: u32,
}

/// Wide external reference of the oldest generation. The pointer offset is in 4-byte units.
#[bitfield]
#[binrw]
#[br(map = Self::from_bytes)]
#[bw(map = |x: &Self| x.into_bytes())]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedWideEntry {
    #[skip]
    __: B16,
    pub pointer_offset: B23,
    pub target_offset: B25,
}

/// External reference to the start of another resource. The pointer offset is in 4-byte units.
#[bitfield]
#[binrw]
#[br(map = Self::from_bytes)]
#[bw(map = |x: &Self| x.into_bytes())]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedExternalEntry {
    pub pointer_offset: B25,
    pub resource_type: B7,
}

/// Type and id stored in the body at the pointer of a packed wide reference.
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedResourceId {
    pub id: B24,
    pub resource_type: B8,
}

#[binrw]
#[brw(little)]
#[br(import(layout: WideReferenceLayout))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideEntry {
    #[br(pre_assert(layout == WideReferenceLayout::Packed))]
    Packed(PackedWideEntry),
    #[br(pre_assert(layout == WideReferenceLayout::Explicit))]
    Explicit {
        pointer_offset: u32,
        resource_type: u32,
        resource_id: u32,
        target_offset: u32,
    },
}

/// The relocation table that precedes every resource body.
#[binrw]
#[brw(little)]
#[br(import(layout: WideReferenceLayout))]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelocationTable {
    #[br(temp)]
    #[bw(calc = internal.len() as u32)]
    internal_count: u32,
    #[br(temp)]
    #[bw(calc = wide.len() as u32)]
    wide_count: u32,
    #[br(temp)]
    #[bw(calc = int_patches.len() as u32)]
    int_patch_count: u32,
    #[br(temp)]
    #[bw(calc = short_patches.len() as u32)]
    short_patch_count: u32,
    #[br(temp)]
    #[bw(calc = packed.len() as u32)]
    packed_count: u32,

    #[br(count = internal_count)]
    pub internal: Vec<InternalEntry>,
    #[br(count = wide_count, args { inner: (layout,) })]
    pub wide: Vec<WideEntry>,
    /// Opaque, only kept to preserve the table size.
    #[br(count = int_patch_count)]
    pub int_patches: Vec<u32>,
    /// Opaque, only kept to preserve the table size.
    #[br(count = short_patch_count)]
    pub short_patches: Vec<u64>,
    #[br(count = packed_count)]
    pub packed: Vec<PackedExternalEntry>,
}

fn resource_type_from(
    value: u32,
    resource: ResourceKey,
    offset: u64,
) -> Result<ResourceType> {
    ResourceType::try_from(value).map_err(|value| Error::MalformedResource {
        resource,
        offset,
        reason: format!("unknown resource type {value}"),
    })
}

fn word_at(body: &[u8], position: u64) -> Option<u32> {
    let start = usize::try_from(position).ok()?;
    let bytes = body.get(start..start.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn word_offset(position: u64) -> Result<u32> {
    if position % 4 != 0 {
        return Err(Error::UnsupportedLayout(format!(
            "reference field at {position:#x} is not 4-byte aligned"
        )));
    }

    u32::try_from(position / 4).map_err(|_| {
        Error::UnsupportedLayout(format!("reference field at {position:#x} is out of reach"))
    })
}

fn out_of_range(what: &str, value: u64) -> Error {
    Error::UnsupportedLayout(format!("{what} {value:#x} does not fit its relocation field"))
}

/// The raw value stored in the body at a reference field.
///
/// For 32-bit pointers with a target offset the type is packed into the top byte, otherwise
/// only the id is stored.
pub(crate) fn placeholder(game: Game, reference: Option<&ResourceReference>) -> Result<u64> {
    let Some(reference) = reference else {
        return Ok(0);
    };

    match game.pointer_size() {
        4 if reference.offset != 0 => {
            let packed = PackedResourceId::new()
                .with_id_checked(reference.id())
                .map_err(|_| out_of_range("resource id", reference.id() as u64))?
                .with_resource_type(reference.resource_type() as u8);

            Ok(u32::from_le_bytes(packed.into_bytes()) as u64)
        }
        _ => Ok(reference.id() as u64),
    }
}

impl RelocationTable {
    /// Resolves every entry to a `(field position, reference)` pair, sorted by position.
    ///
    /// Positions are relative to the start of `body`, which must start at `body_start` in the
    /// resource data.
    pub fn resolve(
        &self,
        resource: ResourceKey,
        game: Game,
        body: &[u8],
        body_start: u64,
    ) -> Result<Vec<(u64, ResourceReference)>> {
        let malformed = |position: u64, reason: String| Error::MalformedResource {
            resource,
            offset: body_start + position,
            reason,
        };

        if !self.int_patches.is_empty() || !self.short_patches.is_empty() {
            warn!(
                %resource,
                int_patches = self.int_patches.len(),
                short_patches = self.short_patches.len(),
                "Skipping relocation patches"
            );
        }

        let mut references =
            Vec::with_capacity(self.internal.len() + self.wide.len() + self.packed.len());

        for entry in &self.internal {
            references.push((
                entry.pointer_offset as u64,
                ResourceReference::new(resource, entry.target_offset),
            ));
        }

        for entry in &self.wide {
            match *entry {
                WideEntry::Explicit {
                    pointer_offset,
                    resource_type,
                    resource_id,
                    target_offset,
                } => {
                    let position = pointer_offset as u64;
                    let resource_type =
                        resource_type_from(resource_type, resource, body_start + position)?;
                    references.push((
                        position,
                        ResourceReference::new(
                            ResourceKey::new(resource_type, resource_id),
                            target_offset,
                        ),
                    ));
                }
                WideEntry::Packed(packed) => {
                    let position = packed.pointer_offset() as u64 * 4;
                    let word = word_at(body, position).ok_or_else(|| {
                        malformed(position, "wide reference points past the body".to_string())
                    })?;
                    let id = PackedResourceId::from_bytes(word.to_le_bytes());
                    let resource_type = resource_type_from(
                        id.resource_type() as u32,
                        resource,
                        body_start + position,
                    )?;
                    references.push((
                        position,
                        ResourceReference::new(
                            ResourceKey::new(resource_type, id.id()),
                            packed.target_offset(),
                        ),
                    ));
                }
            }
        }

        for entry in &self.packed {
            let position = entry.pointer_offset() as u64 * 4;
            let word = word_at(body, position).ok_or_else(|| {
                malformed(position, "packed reference points past the body".to_string())
            })?;
            let resource_type =
                resource_type_from(entry.resource_type() as u32, resource, body_start + position)?;
            references.push((
                position,
                ResourceReference::new(ResourceKey::new(resource_type, word & 0x7FFF_FFFF), 0),
            ));
        }

        references.sort_by_key(|(position, _)| *position);

        for pair in references.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(malformed(
                    pair[0].0,
                    "more than one relocation for the same field".to_string(),
                ));
            }
        }

        if let Some((position, _)) = references.last() {
            if position + game.pointer_size() as u64 > body.len() as u64 {
                return Err(malformed(
                    *position,
                    "reference field lies past the end of the body".to_string(),
                ));
            }
        }

        debug!(
            %resource,
            internal = self.internal.len(),
            wide = self.wide.len(),
            packed = self.packed.len(),
            "Resolved relocation table"
        );

        Ok(references)
    }

    /// Partitions references into internal, wide external and packed external entries.
    pub fn from_references<'a>(
        resource: ResourceKey,
        game: Game,
        references: impl IntoIterator<Item = (u64, &'a ResourceReference)>,
    ) -> Result<Self> {
        let mut table = RelocationTable::default();

        for (position, reference) in references {
            if reference.key == resource {
                table.internal.push(InternalEntry {
                    pointer_offset: u32::try_from(position)
                        .map_err(|_| out_of_range("reference field", position))?,
                    target_offset: reference.offset,
                });
            } else if reference.offset != 0 {
                let entry = match game.wide_reference_layout() {
                    WideReferenceLayout::Explicit => WideEntry::Explicit {
                        pointer_offset: u32::try_from(position)
                            .map_err(|_| out_of_range("reference field", position))?,
                        resource_type: reference.resource_type() as u32,
                        resource_id: reference.id(),
                        target_offset: reference.offset,
                    },
                    WideReferenceLayout::Packed => WideEntry::Packed(
                        PackedWideEntry::new()
                            .with_pointer_offset_checked(word_offset(position)?)
                            .map_err(|_| out_of_range("reference field", position))?
                            .with_target_offset_checked(reference.offset)
                            .map_err(|_| out_of_range("target offset", reference.offset as u64))?,
                    ),
                };
                table.wide.push(entry);
            } else {
                if reference.id() > 0x7FFF_FFFF {
                    return Err(out_of_range("resource id", reference.id() as u64));
                }

                table.packed.push(
                    PackedExternalEntry::new()
                        .with_pointer_offset_checked(word_offset(position)?)
                        .map_err(|_| out_of_range("reference field", position))?
                        .with_resource_type(reference.resource_type() as u8),
                );
            }
        }

        debug!(
            %resource,
            internal = table.internal.len(),
            wide = table.wide.len(),
            packed = table.packed.len(),
            "Built relocation table"
        );

        Ok(table)
    }

    pub fn counts(&self) -> RelocationCounts {
        RelocationCounts {
            internal: self.internal.len() as u32,
            wide: self.wide.len() as u32,
            int_patches: self.int_patches.len() as u32,
            short_patches: self.short_patches.len() as u32,
            packed: self.packed.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite};

    use super::*;

    const MODEL: ResourceKey = ResourceKey::new(ResourceType::Model, 7);
    const MATERIAL: ResourceKey = ResourceKey::new(ResourceType::Material, 0x1234);

    fn encode<T: BinWrite>(value: &T) -> Vec<u8>
    where
        for<'a> T::Args<'a>: Default,
    {
        let mut cursor = Cursor::new(Vec::new());
        value
            .write_options(&mut cursor, binrw::Endian::Little, Default::default())
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn packed_wide_entry_layout() {
        let entry = PackedWideEntry::new()
            .with_pointer_offset(0x40 / 4)
            .with_target_offset(0x120);
        let expected: u64 = (0x120u64 << 39) | ((0x40u64 / 4) << 16);

        assert_eq!(encode(&entry), expected.to_le_bytes());
    }

    #[test]
    fn packed_external_entry_layout() {
        let entry = PackedExternalEntry::new()
            .with_pointer_offset(0x18 / 4)
            .with_resource_type(ResourceType::Texture as u8);
        let expected: u32 = (5 << 25) | (0x18 / 4);

        assert_eq!(encode(&entry), expected.to_le_bytes());
    }

    #[test]
    fn packed_resource_id_layout() {
        let id = PackedResourceId::new()
            .with_id(0xABCDEF)
            .with_resource_type(10);

        assert_eq!(u32::from_le_bytes(id.into_bytes()), 0x0AAB_CDEF);
    }

    #[test]
    fn table_size_per_layout() {
        let counts = RelocationCounts {
            internal: 2,
            wide: 1,
            int_patches: 3,
            short_patches: 1,
            packed: 2,
        };

        assert_eq!(counts.table_size(WideReferenceLayout::Explicit), 20 + 16 + 16 + 12 + 8 + 8);
        assert_eq!(counts.table_size(WideReferenceLayout::Packed), 20 + 16 + 8 + 12 + 8 + 8);
    }

    #[test]
    fn explicit_table_round_trip() {
        let internal = ResourceReference::new(MODEL, 0x30);
        let wide = ResourceReference::new(MATERIAL, 0x10);
        let packed = ResourceReference::new(MATERIAL, 0);
        let refs = [(0u64, &internal), (8, &wide), (16, &packed)];

        let table = RelocationTable::from_references(MODEL, Game::Rottr, refs).unwrap();
        assert_eq!(table.internal.len(), 1);
        assert_eq!(table.wide.len(), 1);
        assert_eq!(table.packed.len(), 1);

        let bytes = encode(&table);
        assert_eq!(
            bytes.len() as u64,
            table.counts().table_size(WideReferenceLayout::Explicit)
        );

        let decoded = RelocationTable::read_options(
            &mut Cursor::new(&bytes),
            binrw::Endian::Little,
            (WideReferenceLayout::Explicit,),
        )
        .unwrap();
        assert_eq!(decoded, table);

        let mut body = vec![0u8; 24];
        body[16..20].copy_from_slice(&MATERIAL.id.to_le_bytes());
        let resolved = decoded.resolve(MODEL, Game::Rottr, &body, 0).unwrap();
        assert_eq!(resolved, vec![(0, internal), (8, wide), (16, packed)]);
    }

    #[test]
    fn duplicate_fields_are_malformed() {
        let mut table = RelocationTable::default();
        table.internal.push(InternalEntry {
            pointer_offset: 8,
            target_offset: 0,
        });
        table.internal.push(InternalEntry {
            pointer_offset: 8,
            target_offset: 4,
        });

        let result = table.resolve(MODEL, Game::Sottr, &[0u8; 16], 0x1C);
        assert!(matches!(
            result,
            Err(Error::MalformedResource { offset: 0x24, .. })
        ));
    }

    #[test]
    fn fields_past_the_body_are_malformed() {
        let mut table = RelocationTable::default();
        table.internal.push(InternalEntry {
            pointer_offset: 12,
            target_offset: 0,
        });

        assert!(table.resolve(MODEL, Game::Sottr, &[0u8; 16], 0).is_err());
        assert!(table.resolve(MODEL, Game::Tr2013, &[0u8; 16], 0).is_ok());
    }

    #[test]
    fn unaligned_packed_fields_are_unsupported() {
        let packed = ResourceReference::new(MATERIAL, 0);
        let result = RelocationTable::from_references(MODEL, Game::Sottr, [(6u64, &packed)]);

        assert!(matches!(result, Err(Error::UnsupportedLayout(_))));
    }

    #[test]
    fn tr2013_placeholders() {
        let wide = ResourceReference::new(MATERIAL, 0x10);
        let packed = ResourceReference::new(MATERIAL, 0);

        assert_eq!(placeholder(Game::Tr2013, None).unwrap(), 0);
        assert_eq!(
            placeholder(Game::Tr2013, Some(&wide)).unwrap(),
            (10 << 24) | 0x1234
        );
        assert_eq!(placeholder(Game::Tr2013, Some(&packed)).unwrap(), 0x1234);
        assert_eq!(placeholder(Game::Sottr, Some(&wide)).unwrap(), 0x1234);
    }
}
