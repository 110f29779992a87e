//! CPU-side mesh resources consumed by the skinning pipeline:
//! vertex streams, skin influences, morph target deltas and bounding boxes.

pub mod bounds;
pub mod geometry;
pub mod morph;

pub use bounds::BoundingBox;
pub use geometry::{GeometryData, SkinInfluence, VertexStream, MAX_INFLUENCES};
pub use morph::{ModelMorph, MorphBuffer, MorphChannels, MorphVertex};
