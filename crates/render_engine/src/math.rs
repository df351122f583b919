//! Math type aliases used throughout the renderer.
//!
//! Thin aliases over nalgebra so call sites read like shader code.

/// 2D vector of f32.
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector of f32.
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector of f32.
pub type Vec4 = nalgebra::Vector4<f32>;

/// 3x3 matrix of f32.
pub type Mat3 = nalgebra::Matrix3<f32>;

/// 4x4 matrix of f32.
pub type Mat4 = nalgebra::Matrix4<f32>;

/// 3D point of f32.
pub type Point3 = nalgebra::Point3<f32>;
