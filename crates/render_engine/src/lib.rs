//! A thin Vulkan forward renderer with layered frame composition.
//!
//! The renderer is organized around three objects:
//!
//! - [`DeviceContext`](device::DeviceContext) brings up the instance,
//!   physical device, and logical device.
//! - [`Window`](window::Window) owns one presentation surface, its
//!   swapchain, the forward render pass, and the per-frame loop.
//! - [`DrawLayer`](layer::DrawLayer) is a registry of
//!   [`DrawObject`](object::DrawObject)s recorded into a secondary command
//!   buffer and composed by the window every frame.
//!
//! Presentation backends stay outside the crate: a window is constructed
//! from a surface-creation callback, so any backend that can produce a
//! `VkSurfaceKHR` (the demo uses GLFW) plugs in without the renderer
//! knowing about it.

#![warn(missing_docs)]
#![warn(unused_imports)]

pub mod buffer;
pub mod command;
pub mod device;
pub mod error;
pub mod image;
pub mod layer;
pub mod light;
pub mod material;
pub mod math;
pub mod mesh;
pub mod object;
pub mod pipeline;
pub mod render_pass;
pub mod texture;
pub mod window;

pub use buffer::Buffer;
pub use command::{CommandRole, CommandStream};
pub use device::DeviceContext;
pub use error::{DeviceInitError, DeviceResult};
pub use image::{Image, ImageSpec, ImageView};
pub use layer::DrawLayer;
pub use light::PointLight;
pub use material::{Material, MaterialFeatures, MaterialTextures};
pub use math::{Mat3, Mat4, Point3, Vec2, Vec3, Vec4};
pub use mesh::{Mesh, Vertex3D};
pub use object::{CustomShading, DrawObject, ObjectUniform};
pub use pipeline::{Pipeline, PipelineConfig, PipelineKind, ShaderModule};
pub use render_pass::RenderPass;
pub use texture::Texture;
pub use window::{
    AntiAliasing, SurfaceFactory, SurfaceInfo, SurfaceLayer, SurfaceState, Window,
};
