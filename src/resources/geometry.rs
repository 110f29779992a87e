use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Maximum number of bones influencing a single vertex.
pub const MAX_INFLUENCES: usize = 4;

/// Per-vertex skinning influences: up to four (bone index, weight) pairs.
/// Unused slots carry weight 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkinInfluence {
    pub bones: [u16; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

/// CPU-side vertex data for one geometry.
///
/// Streams are parallel arrays; `normals` and `tangents` may be empty when
/// the geometry does not carry those channels. The byte views exist so an
/// embedder can upload the streams to the GPU without copying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexStream {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
}

impl VertexStream {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn positions_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    #[must_use]
    pub fn normals_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    #[must_use]
    pub fn tangents_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.tangents)
    }
}

/// Immutable base data for one drawable geometry of an animated mesh.
#[derive(Debug, Clone, Default)]
pub struct GeometryData {
    pub name: String,
    pub vertices: VertexStream,
    /// One entry per vertex; empty for rigid (non-skinned) geometry.
    pub influences: Vec<SkinInfluence>,
}

impl GeometryData {
    /// Distinct bone indices actually referenced (with nonzero weight) by
    /// this geometry's vertices, ascending. This is the input to per-geometry
    /// bone remapping when a skeleton exceeds the shader slot budget.
    #[must_use]
    pub fn referenced_bones(&self) -> SmallVec<[u32; 32]> {
        let mut bones: SmallVec<[u32; 32]> = SmallVec::new();
        for influence in &self.influences {
            for (slot, &bone) in influence.bones.iter().enumerate() {
                if influence.weights[slot] > 0.0 {
                    let bone = u32::from(bone);
                    if let Err(pos) = bones.binary_search(&bone) {
                        bones.insert(pos, bone);
                    }
                }
            }
        }
        bones
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_bones_distinct_and_sorted() {
        let geometry = GeometryData {
            name: "body".into(),
            vertices: VertexStream::default(),
            influences: vec![
                SkinInfluence {
                    bones: [3, 1, 0, 0],
                    weights: [0.5, 0.5, 0.0, 0.0],
                },
                SkinInfluence {
                    bones: [1, 7, 0, 0],
                    weights: [0.25, 0.75, 0.0, 0.0],
                },
            ],
        };
        assert_eq!(geometry.referenced_bones().as_slice(), &[1, 3, 7]);
    }
}
