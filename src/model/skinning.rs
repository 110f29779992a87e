//! Per-geometry bone remapping for shader slot budgets.
//!
//! When a skeleton carries more bones than the rendering backend can bind,
//! each geometry gets a compacted table of the distinct bone indices its
//! vertices actually reference. The table remaps dense local indices to
//! global ones; lookups alias into the global skin-matrix array, no matrices
//! are copied.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::resources::GeometryData;

/// Dense local → global bone index table for one geometry.
pub type BoneMapping = SmallVec<[u32; 32]>;

/// Builds the per-geometry tables, or returns an empty vec when the whole
/// skeleton fits the budget and global skinning applies.
pub(crate) fn build_geometry_bone_mappings(
    geometries: &[Arc<GeometryData>],
    bone_count: usize,
    max_shader_bones: usize,
) -> Vec<BoneMapping> {
    if bone_count <= max_shader_bones {
        return Vec::new();
    }
    geometries
        .iter()
        .map(|geometry| {
            let mut mapping = geometry.referenced_bones();
            mapping.retain(|&mut bone| (bone as usize) < bone_count);
            if mapping.len() > max_shader_bones {
                log::warn!(
                    "geometry '{}' references {} distinct bones, budget is {}; truncating",
                    geometry.name,
                    mapping.len(),
                    max_shader_bones
                );
                mapping.truncate(max_shader_bones);
            }
            mapping
        })
        .collect()
}
