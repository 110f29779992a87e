use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::hash::NameHash;

bitflags! {
    /// Which vertex channels a morph target authors.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct MorphChannels: u8 {
        const POSITION = 1 << 0;
        const NORMAL   = 1 << 1;
        const TANGENT  = 1 << 2;
    }
}

/// One displaced vertex of a morph target. Deltas for channels the morph
/// does not author are zero and ignored at blend time via the channel mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphVertex {
    pub index: u32,
    pub position_delta: Vec3,
    pub normal_delta: Vec3,
    pub tangent_delta: Vec3,
}

/// Sparse per-geometry delta list of one morph target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphBuffer {
    pub geometry_index: usize,
    pub channels: MorphChannels,
    pub vertices: Vec<MorphVertex>,
}

/// A named morph target with its runtime weight.
#[derive(Debug, Clone)]
pub struct ModelMorph {
    pub name: String,
    pub hash: NameHash,
    pub weight: f32,
    pub buffers: Vec<MorphBuffer>,
}

impl ModelMorph {
    #[must_use]
    pub fn new(name: &str, buffers: Vec<MorphBuffer>) -> Self {
        Self {
            name: name.to_string(),
            hash: NameHash::new(name),
            weight: 0.0,
            buffers,
        }
    }
}
