// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

use crate::common::ResourceType;

/// Identifies one resource by its type and numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub resource_type: ResourceType,
    pub id: u32,
}

impl ResourceKey {
    pub const fn new(resource_type: ResourceType, id: u32) -> Self {
        Self { resource_type, id }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// A relocatable pointer to a byte offset inside the body of a resource.
///
/// The reference is internal when `key` is the resource it is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceReference {
    pub key: ResourceKey,
    /// Offset relative to the start of the target's body.
    pub offset: u32,
}

impl ResourceReference {
    pub const fn new(key: ResourceKey, offset: u32) -> Self {
        Self { key, offset }
    }

    pub const fn resource_type(&self) -> ResourceType {
        self.key.resource_type
    }

    pub const fn id(&self) -> u32 {
        self.key.id
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}+{:#x}", self.key, self.offset)
    }
}
