// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::{Vec2, Vec3};

use crate::error::{Error, Result};
use crate::vertex::AttributeValue;

/// Largest UV coordinate magnitude that survives [`shrink_uv`].
pub const MAX_UV: f32 = 15.0;

const UV_SCALE: f32 = 16.0;

/// Maps a direction from `[-1, 1]` into `[0, 1]` for the byte normalized codecs.
pub fn unsign_vector(vector: Vec3) -> AttributeValue {
    let unsigned = ((vector + Vec3::ONE) / 2.0).clamp(Vec3::ZERO, Vec3::ONE);
    AttributeValue::from([unsigned.x, unsigned.y, unsigned.z, 0.0])
}

/// Inverse of [`unsign_vector`], renormalized.
pub fn sign_vector(value: &AttributeValue) -> Vec3 {
    let [x, y, z, _] = value.padded();
    (Vec3::new(x, y, z) * 2.0 - Vec3::ONE).normalize_or_zero()
}

/// Flips V and scales a UV coordinate down into the range of the texture coordinate formats.
pub fn shrink_uv(uv: Vec2) -> Result<AttributeValue> {
    for value in [uv.x, uv.y] {
        if value.abs() > MAX_UV {
            return Err(Error::DomainViolation {
                what: "UV coordinate",
                value: value as f64,
                limit: MAX_UV as f64,
            });
        }
    }

    Ok(AttributeValue::from([uv.x / UV_SCALE, (1.0 - uv.y) / UV_SCALE]))
}

/// Inverse of [`shrink_uv`].
pub fn expand_uv(value: &AttributeValue) -> Vec2 {
    let [u, v, _, _] = value.padded();
    Vec2::new(UV_SCALE * u, 1.0 - UV_SCALE * v)
}

/// One bone influencing a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinInfluence {
    /// Index into the bone list of the mesh.
    pub bone: u16,
    pub weight: f32,
}

/// Packs up to `max_influences` (4 or 8) influences into skin index and skin weight values.
///
/// Weights are stored as bytes summing to 255, the rounding error goes to the strongest
/// influence. The fifth to eighth influences land in the second byte of each component, so
/// with more than four influences every bone index must fit in a byte.
pub fn pack_skin_weights(
    influences: &[SkinInfluence],
    max_influences: usize,
) -> Result<(AttributeValue, AttributeValue)> {
    let mut weights: Vec<(u16, i32)> = influences
        .iter()
        .map(|influence| (influence.bone, (influence.weight * 255.0) as i32))
        .filter(|(_, weight)| *weight > 0)
        .collect();
    weights.sort_by(|a, b| b.1.cmp(&a.1));
    weights.truncate(max_influences.min(8));

    if max_influences > 4 {
        if let Some((bone, _)) = weights.iter().find(|(bone, _)| *bone > 0xFF) {
            return Err(Error::DomainViolation {
                what: "skin bone index",
                value: *bone as f64,
                limit: 255.0,
            });
        }
    }

    if let Some(strongest) = weights.first().map(|(_, weight)| *weight) {
        let sum: i32 = weights.iter().map(|(_, weight)| weight).sum();
        let adjusted = strongest + 255 - sum;
        if adjusted < 0 {
            return Err(Error::DomainViolation {
                what: "skin weight sum",
                value: sum as f64 / 255.0,
                limit: 1.0,
            });
        }
        weights[0].1 = adjusted;
    }

    let mut indices = [0u32; 4];
    let mut packed = [0u32; 4];
    for (i, (bone, weight)) in weights.iter().enumerate() {
        let shift = 8 * (i / 4);
        indices[i % 4] |= (*bone as u32) << shift;
        packed[i % 4] |= (*weight as u32) << shift;
    }

    Ok((
        AttributeValue::from(indices.map(|value| value as f32)),
        AttributeValue::from(packed.map(|value| value as f32)),
    ))
}

/// Unpacks influences stored by [`pack_skin_weights`], skipping zero weights.
///
/// Without skin weights every index gets full weight. Meshes with eight influences use 8-bit
/// indices unless `wide_indices` is set, in which case each index takes 10 of 16 bits.
pub fn unpack_skin_weights(
    indices: &AttributeValue,
    weights: Option<&AttributeValue>,
    eight_influences: bool,
    wide_indices: bool,
) -> Vec<SkinInfluence> {
    let (index_mask, index_shift) = if eight_influences && !wide_indices {
        (0xFF, 8)
    } else {
        (0x3FF, 16)
    };
    let slots = if eight_influences { 2 } else { 1 };

    let indices = indices.padded();
    let weights = weights.map(AttributeValue::padded);

    let mut influences = Vec::new();
    for i in 0..4 {
        for j in 0..slots {
            let bone = ((indices[i] as u32) >> (j * index_shift)) & index_mask;
            let weight = match weights {
                Some(weights) => (((weights[i] as u32) >> (j * 8)) & 0xFF) as f32 / 255.0,
                None => 1.0,
            };
            if weight > 0.0 {
                influences.push(SkinInfluence {
                    bone: bone as u16,
                    weight,
                });
            }
        }
    }

    influences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_normal() {
        let value = unsign_vector(Vec3::new(0.5, -0.5, 0.0));
        assert_eq!(&*value, &[0.75, 0.25, 0.5, 0.0]);

        let clamped = unsign_vector(Vec3::new(2.0, -3.0, 1.0));
        assert_eq!(&*clamped, &[1.0, 0.0, 1.0, 0.0]);

        let signed = sign_vector(&AttributeValue::from([1.0, 0.5, 0.5, 0.0]));
        assert!((signed - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn uv_range() {
        let shrunk = shrink_uv(Vec2::new(15.0, -1.0)).unwrap();
        assert_eq!(&*shrunk, &[15.0 / 16.0, 2.0 / 16.0]);
        assert_eq!(expand_uv(&shrunk), Vec2::new(15.0, -1.0));

        assert!(matches!(
            shrink_uv(Vec2::new(0.0, -15.5)),
            Err(Error::DomainViolation { .. })
        ));
    }

    #[test]
    fn weights_sum_to_255() {
        let influences = [
            SkinInfluence { bone: 3, weight: 0.2 },
            SkinInfluence { bone: 7, weight: 0.5 },
            SkinInfluence { bone: 1, weight: 0.3 },
            SkinInfluence { bone: 9, weight: 0.0 },
        ];
        let (indices, weights) = pack_skin_weights(&influences, 4).unwrap();

        assert_eq!(&*indices, &[7.0, 1.0, 3.0, 0.0]);
        // 127 + 76 + 51 = 254, the missing unit goes to the strongest
        assert_eq!(&*weights, &[128.0, 76.0, 51.0, 0.0]);

        let unpacked = unpack_skin_weights(&indices, Some(&weights), false, false);
        assert_eq!(unpacked.len(), 3);
        assert_eq!(unpacked[0].bone, 7);
        assert!((unpacked[0].weight - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn eight_influences() {
        let influences: Vec<SkinInfluence> = (0..8)
            .map(|bone| SkinInfluence {
                bone: bone + 10,
                weight: 0.125 - bone as f32 * 0.001,
            })
            .collect();
        let (indices, weights) = pack_skin_weights(&influences, 8).unwrap();

        assert_eq!(indices[0], (10 | (14 << 8)) as f32);

        let unpacked = unpack_skin_weights(&indices, Some(&weights), true, false);
        let mut bones: Vec<u16> = unpacked.iter().map(|influence| influence.bone).collect();
        bones.sort();
        assert_eq!(bones, (10..18).collect::<Vec<u16>>());

        let total: f32 = unpacked.iter().map(|influence| influence.weight).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn eight_influences_need_byte_indices() {
        let influences: Vec<SkinInfluence> = [300, 1, 2, 3, 4, 5, 6, 7]
            .into_iter()
            .map(|bone| SkinInfluence { bone, weight: 0.125 })
            .collect();

        assert!(matches!(
            pack_skin_weights(&influences, 8),
            Err(Error::DomainViolation { what: "skin bone index", .. })
        ));

        // four influences keep the whole component for the index
        let (indices, _) = pack_skin_weights(&influences[..4], 4).unwrap();
        assert!(indices.contains(&300.0));
    }

    #[test]
    fn overweight_vertex() {
        let influences = [
            SkinInfluence { bone: 0, weight: 0.9 },
            SkinInfluence { bone: 1, weight: 0.9 },
            SkinInfluence { bone: 2, weight: 0.9 },
        ];

        assert!(matches!(
            pack_skin_weights(&influences, 4),
            Err(Error::DomainViolation { .. })
        ));
    }

    #[test]
    fn unweighted_indices() {
        let indices = AttributeValue::from([4.0, 0.0, 0.0, 0.0]);
        let influences = unpack_skin_weights(&indices, None, false, false);

        assert_eq!(influences.len(), 4);
        assert_eq!(influences[0], SkinInfluence { bone: 4, weight: 1.0 });
    }
}
