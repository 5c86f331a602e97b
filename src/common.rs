// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// The game generation a resource was built for.
///
/// This selects the pointer width of reference fields, the layout of wide external references
/// and the vertex attribute type ids.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    /// Tomb Raider (2013).
    Tr2013 = 9,
    /// Rise of the Tomb Raider.
    Rottr = 10,
    /// Shadow of the Tomb Raider.
    Sottr = 11,
}

/// How wide external references are stored in the relocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideReferenceLayout {
    /// One 64-bit word holding the pointer and target offsets, with the type and id stored
    /// in the body at the pointer.
    Packed,
    /// Four explicit 32-bit words: pointer offset, type, id and target offset.
    Explicit,
}

impl Game {
    /// Size of a reference field in the resource body, in bytes.
    pub const fn pointer_size(self) -> usize {
        match self {
            Game::Tr2013 => 4,
            Game::Rottr | Game::Sottr => 8,
        }
    }

    pub const fn wide_reference_layout(self) -> WideReferenceLayout {
        match self {
            Game::Tr2013 => WideReferenceLayout::Packed,
            Game::Rottr | Game::Sottr => WideReferenceLayout::Explicit,
        }
    }
}

/// The type of a resource, as stored in relocation tables.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Animation = 2,
    PsdRes = 4,
    Texture = 5,
    Sound = 6,
    Dtp = 7,
    Script = 8,
    ShaderLib = 9,
    Material = 10,
    GlobalContentReference = 11,
    Model = 12,
    CollisionMesh = 13,
    ObjectReference = 14,
    Trigger = 15,
}

impl TryFrom<u32> for ResourceType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            2 => ResourceType::Animation,
            4 => ResourceType::PsdRes,
            5 => ResourceType::Texture,
            6 => ResourceType::Sound,
            7 => ResourceType::Dtp,
            8 => ResourceType::Script,
            9 => ResourceType::ShaderLib,
            10 => ResourceType::Material,
            11 => ResourceType::GlobalContentReference,
            12 => ResourceType::Model,
            13 => ResourceType::CollisionMesh,
            14 => ResourceType::ObjectReference,
            15 => ResourceType::Trigger,
            _ => return Err(value),
        })
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
