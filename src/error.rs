// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

use crate::resource::{ResourceKey, ResourceReference};

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// The relocation table or body of a resource is inconsistent.
    #[error("malformed resource {resource} at offset {offset:#x}: {reason}")]
    MalformedResource {
        resource: ResourceKey,
        /// Absolute offset into the resource data.
        offset: u64,
        reason: String,
    },
    /// A seek was attempted with a reference into another resource.
    #[error("reference {reference} does not point into resource {resource}")]
    InvalidReference {
        resource: ResourceKey,
        reference: ResourceReference,
    },
    /// The data cannot be represented in this layout.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),
    /// A value is outside of what a fixed-point encoding can store.
    #[error("{what} out of range: {value} exceeds {limit}")]
    DomainViolation {
        what: &'static str,
        value: f64,
        limit: f64,
    },
    /// An animation attribute was queried where it was never stored.
    #[error("{attribute} of track {track} is absent at frame {frame}")]
    AbsentAttribute {
        track: u16,
        attribute: &'static str,
        frame: usize,
    },
    /// A vertex lies outside of the vertex buffer it was addressed in.
    #[error("vertex buffer {buffer} is too small: {needed} bytes needed, {length} available")]
    VertexBufferOverrun {
        buffer: usize,
        needed: usize,
        length: usize,
    },
    /// A vertex has no value for an attribute of its vertex format.
    #[error("vertex has no value for attribute {0:#010x}")]
    MissingVertexAttribute(u32),
    #[error(transparent)]
    Binary(#[from] binrw::Error),
}
