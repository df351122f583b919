//! Mesh geometry and the vertex layout shared by every pipeline.

use ash::vk;

use crate::math::{Vec2, Vec3, Vec4};

/// A single vertex as stored in GPU vertex buffers.
///
/// The field order is the wire layout; the attribute descriptions below and
/// the vertex shaders index it by location.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    /// Object-space position (location 0).
    pub position: Vec3,
    /// Object-space normal (location 1).
    pub normal: Vec3,
    /// Vertex color (location 2).
    pub color: Vec3,
    /// Texture coordinates (location 3).
    pub uv: Vec2,
    /// Tangent with handedness in `w` (location 4).
    pub tangent: Vec4,
}

impl Vertex3D {
    /// Vertex input binding for a tightly packed buffer of `Vertex3D`.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions matching the shader input locations.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 24,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 3,
                format: vk::Format::R32G32_SFLOAT,
                offset: 36,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 4,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 44,
            },
        ]
    }
}

/// CPU-side geometry for one submesh of a drawable object.
///
/// `material_id` indexes into the owning object's material list. The base
/// offsets are assigned when the object merges its meshes into shared
/// vertex/index buffers.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Vertex data.
    pub vertices: Vec<Vertex3D>,
    /// Indices into `vertices`.
    pub indices: Vec<u32>,
    /// Index into the owning object's material list.
    pub material_id: usize,
    /// First vertex of this mesh within the merged vertex buffer.
    pub vertex_base: i32,
    /// First index of this mesh within the merged index buffer.
    pub index_base: u32,
}

impl Mesh {
    /// Create a mesh from raw geometry. Base offsets are filled in by the
    /// owning object.
    pub fn new(vertices: Vec<Vertex3D>, indices: Vec<u32>, material_id: usize) -> Self {
        Self {
            vertices,
            indices,
            material_id,
            vertex_base: 0,
            index_base: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        // 3 + 3 + 3 + 2 + 4 floats
        assert_eq!(std::mem::size_of::<Vertex3D>(), 60);
        assert_eq!(Vertex3D::binding_description().stride, 60);
    }

    #[test]
    fn attribute_offsets_match_field_order() {
        let attrs = Vertex3D::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36, 44]);
        for (location, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, location as u32);
            assert_eq!(attr.binding, 0);
        }
    }
}
