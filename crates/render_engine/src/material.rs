//! Materials: texture slots, shading feature flags, and the per-material
//! uniform block.

use std::rc::Rc;

use ash::vk;
use bitflags::bitflags;

use crate::buffer::Buffer;
use crate::device::DeviceContext;
use crate::texture::Texture;

bitflags! {
    /// Optional shading features a material can enable. The fragment shader
    /// reads these from the material uniform and skips the corresponding
    /// texture fetches when a bit is clear.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MaterialFeatures: u32 {
        /// Sample the normal map instead of the vertex normal.
        const NORMAL_MAP = 1 << 0;
        /// Modulate ambient light by the occlusion texture.
        const AMBIENT_OCCLUSION = 1 << 1;
        /// Displace vertices along the normal by the displacement texture.
        const DISPLACEMENT = 1 << 2;
        /// Sample metalness/roughness from its texture instead of constants.
        const METALNESS_ROUGHNESS = 1 << 3;
        /// Reflect the environment cube map.
        const ENVIRONMENT = 1 << 4;
    }
}

/// GPU layout of the material uniform (set 1, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    /// Raw [`MaterialFeatures`] bits.
    pub features: u32,
    _padding: [u32; 3],
}

impl MaterialUniform {
    /// Pack feature flags for upload.
    pub fn new(features: MaterialFeatures) -> Self {
        Self {
            features: features.bits(),
            _padding: [0; 3],
        }
    }
}

/// The optional texture slots of a material.
///
/// Slots map to descriptor bindings 1..=5; binding 6 is the layer's
/// environment map. Unbound slots fall back to the diffuse texture, or to the
/// layer's fallback texture when there is no diffuse either.
#[derive(Default, Clone)]
pub struct MaterialTextures {
    /// Base color (binding 1).
    pub diffuse: Option<Rc<Texture>>,
    /// Tangent-space normals (binding 2).
    pub normal: Option<Rc<Texture>>,
    /// Metalness in B, roughness in G (binding 3).
    pub metalness_roughness: Option<Rc<Texture>>,
    /// Ambient occlusion (binding 4).
    pub ambient_occlusion: Option<Rc<Texture>>,
    /// Vertex displacement heights (binding 5).
    pub displacement: Option<Rc<Texture>>,
}

/// A material: texture slots, feature flags, blending mode, and the uniform
/// buffer the flags are uploaded through.
///
/// The descriptor set is assigned by the owning layer during a rebuild.
pub struct Material {
    /// Texture slots.
    pub textures: MaterialTextures,
    features: MaterialFeatures,
    blend: bool,
    uniform: Buffer,
    descriptor_set: vk::DescriptorSet,
}

impl Material {
    /// Create a material and upload its feature flags.
    pub fn new(ctx: &DeviceContext, textures: MaterialTextures, features: MaterialFeatures) -> Self {
        let uniform = Buffer::new(
            ctx,
            std::mem::size_of::<MaterialUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        uniform.write(bytemuck::bytes_of(&MaterialUniform::new(features)), 0);

        Self {
            textures,
            features,
            blend: false,
            uniform,
            descriptor_set: vk::DescriptorSet::null(),
        }
    }

    /// Enabled shading features.
    pub fn features(&self) -> MaterialFeatures {
        self.features
    }

    /// Route this material through the alpha-blended pipeline.
    pub fn set_blend(&mut self, blend: bool) {
        self.blend = blend;
    }

    /// Whether this material renders through the blend pipeline.
    pub fn blend(&self) -> bool {
        self.blend
    }

    /// The uniform buffer backing binding 0 of the material set.
    pub fn uniform(&self) -> &Buffer {
        &self.uniform
    }

    pub(crate) fn set_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.descriptor_set = set;
    }

    /// The material's descriptor set (null until the layer builds it).
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_one_16_byte_row() {
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 16);
    }

    #[test]
    fn feature_bits_are_stable() {
        assert_eq!(MaterialFeatures::NORMAL_MAP.bits(), 1);
        assert_eq!(MaterialFeatures::AMBIENT_OCCLUSION.bits(), 2);
        assert_eq!(MaterialFeatures::DISPLACEMENT.bits(), 4);
        assert_eq!(MaterialFeatures::METALNESS_ROUGHNESS.bits(), 8);
        assert_eq!(MaterialFeatures::ENVIRONMENT.bits(), 16);

        let packed = MaterialUniform::new(
            MaterialFeatures::NORMAL_MAP | MaterialFeatures::DISPLACEMENT,
        );
        assert_eq!(packed.features, 0b101);
    }
}
