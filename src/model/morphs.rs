//! Morph target blending into a working vertex stream.

use crate::resources::{MorphBuffer, MorphChannels, VertexStream};

/// Adds `weight × delta` into the stream for every vertex the morph buffer
/// authors, masked by the buffer's channels. Out-of-range vertex indices are
/// skipped.
pub(crate) fn apply_morph(stream: &mut VertexStream, buffer: &MorphBuffer, weight: f32) {
    for vertex in &buffer.vertices {
        let index = vertex.index as usize;
        if buffer.channels.contains(MorphChannels::POSITION) {
            if let Some(position) = stream.positions.get_mut(index) {
                *position += vertex.position_delta * weight;
            }
        }
        if buffer.channels.contains(MorphChannels::NORMAL) {
            if let Some(normal) = stream.normals.get_mut(index) {
                *normal += vertex.normal_delta * weight;
            }
        }
        if buffer.channels.contains(MorphChannels::TANGENT) {
            if let Some(tangent) = stream.tangents.get_mut(index) {
                *tangent += (vertex.tangent_delta * weight).extend(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MorphVertex;
    use glam::Vec3;

    #[test]
    fn unauthored_channels_are_untouched() {
        let mut stream = VertexStream {
            positions: vec![Vec3::ZERO, Vec3::ZERO],
            normals: vec![Vec3::Z, Vec3::Z],
            tangents: Vec::new(),
        };
        let buffer = MorphBuffer {
            geometry_index: 0,
            channels: MorphChannels::POSITION,
            vertices: vec![MorphVertex {
                index: 1,
                position_delta: Vec3::X,
                normal_delta: Vec3::Y,
                tangent_delta: Vec3::ZERO,
            }],
        };

        apply_morph(&mut stream, &buffer, 0.5);

        assert_eq!(stream.positions[0], Vec3::ZERO);
        assert_eq!(stream.positions[1], Vec3::X * 0.5);
        // Normal delta present in the data but not in the channel mask.
        assert_eq!(stream.normals[1], Vec3::Z);
    }
}
