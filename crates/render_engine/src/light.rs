//! Point light data as consumed by the forward shaders.

use crate::math::Vec4;

/// A point light, laid out exactly as the fragment shader's uniform block
/// expects it.
///
/// `position.w` is unused. `color.w` is unused. `attenuation` packs the
/// constant, linear, and quadratic falloff terms in `xyz`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLight {
    /// World-space position.
    pub position: Vec4,
    /// Emitted color.
    pub color: Vec4,
    /// Constant, linear, and quadratic attenuation in `xyz`.
    pub attenuation: Vec4,
}

impl PointLight {
    /// A white light at a given position with standard falloff.
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec4::new(x, y, z, 0.0),
            ..Self::default()
        }
    }
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec4::new(0.0, 0.0, 0.0, 0.0),
            color: Vec4::new(1.0, 1.0, 1.0, 0.0),
            attenuation: Vec4::new(1.0, 0.0, 0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_is_three_packed_vec4s() {
        assert_eq!(std::mem::size_of::<PointLight>(), 48);
        assert_eq!(std::mem::align_of::<PointLight>(), 4);
    }

    #[test]
    fn default_light_matches_shader_defaults() {
        let light = PointLight::default();
        assert_eq!(light.position, Vec4::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(light.color, Vec4::new(1.0, 1.0, 1.0, 0.0));
        assert_eq!(light.attenuation, Vec4::new(1.0, 0.0, 0.0, 0.0));
    }
}
