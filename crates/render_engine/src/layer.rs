//! Draw layers: object registries that record into secondary command
//! buffers.
//!
//! A layer owns the descriptor pool and layouts for its objects, the shared
//! pipeline layout, and one solid and one blend pipeline built from its
//! shader pair. Any mutation of the registry (add/remove object, environment
//! change, surface rebuild) tears all of that down and rebuilds it; partial
//! updates are not attempted.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ash::{vk, Device};

use crate::command::{CommandRole, CommandStream};
use crate::device::DeviceContext;
use crate::error::vk_check;
use crate::light::PointLight;
use crate::math::{Mat4, Vec3};
use crate::object::DrawObject;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineKind, ShaderModule};
use crate::texture::Texture;
use crate::window::{SurfaceInfo, SurfaceLayer, SurfaceState};

/// Descriptor pool capacities for a layer's object and material sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSizing {
    /// Uniform-buffer descriptors.
    pub uniform_buffers: u32,
    /// Combined image-sampler descriptors.
    pub combined_samplers: u32,
    /// Maximum descriptor sets.
    pub max_sets: u32,
}

/// Pool capacities for a registry of `object_count` objects referencing
/// `material_count` materials in total.
///
/// Each object set holds two uniform descriptors (the same buffer bound to
/// the vertex and fragment stages); each material set holds one uniform and
/// six samplers.
pub fn descriptor_pool_sizing(object_count: u32, material_count: u32) -> PoolSizing {
    PoolSizing {
        uniform_buffers: object_count * 2 + material_count,
        combined_samplers: material_count * 6,
        max_sets: (material_count * 6 + object_count).max(1),
    }
}

/// The layer's descriptor pool and set layouts.
struct LayerDescriptors {
    device: Device,
    pool: vk::DescriptorPool,
    object_layout: vk::DescriptorSetLayout,
    material_layout: vk::DescriptorSetLayout,
}

impl LayerDescriptors {
    fn new(ctx: &DeviceContext, object_count: u32, material_count: u32) -> Self {
        let device = ctx.raw_device();

        let object_bindings = [
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
        ];
        let object_info =
            vk::DescriptorSetLayoutCreateInfo::builder().bindings(&object_bindings);
        let object_layout = vk_check(
            unsafe { device.create_descriptor_set_layout(&object_info, None) },
            "vkCreateDescriptorSetLayout (object)",
        );

        let mut material_bindings = vec![vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()];
        for binding in 1..=6u32 {
            // Binding 5 is the displacement map, sampled in the vertex stage.
            let stages = if binding == 5 {
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
            } else {
                vk::ShaderStageFlags::FRAGMENT
            };
            material_bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(stages)
                    .build(),
            );
        }
        let material_info =
            vk::DescriptorSetLayoutCreateInfo::builder().bindings(&material_bindings);
        let material_layout = vk_check(
            unsafe { device.create_descriptor_set_layout(&material_info, None) },
            "vkCreateDescriptorSetLayout (material)",
        );

        let sizing = descriptor_pool_sizing(object_count, material_count);
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: sizing.uniform_buffers.max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: sizing.combined_samplers.max(1),
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(sizing.max_sets);
        let pool = vk_check(
            unsafe { device.create_descriptor_pool(&pool_info, None) },
            "vkCreateDescriptorPool",
        );

        Self {
            device,
            pool,
            object_layout,
            material_layout,
        }
    }
}

impl Drop for LayerDescriptors {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device
                .destroy_descriptor_set_layout(self.material_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.object_layout, None);
        }
    }
}

/// The layer's pipeline layout and its solid/blend pipeline pair.
struct LayerPipelines {
    device: Device,
    layout: vk::PipelineLayout,
    solid: Pipeline,
    blend: Pipeline,
}

impl LayerPipelines {
    fn new(
        ctx: &DeviceContext,
        surface: &SurfaceInfo,
        vertex_shader: &Path,
        fragment_shader: &Path,
        descriptors: &LayerDescriptors,
    ) -> Self {
        let device = ctx.raw_device();

        let set_layouts = [descriptors.object_layout, descriptors.material_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = vk_check(
            unsafe { device.create_pipeline_layout(&layout_info, None) },
            "vkCreatePipelineLayout",
        );

        let vertex = ShaderModule::from_file(ctx, vertex_shader);
        let fragment = ShaderModule::from_file(ctx, fragment_shader);

        let solid = Pipeline::new(
            ctx,
            surface.render_pass,
            layout,
            &PipelineConfig {
                extent: surface.extent,
                samples: surface.samples,
                vertex_shader: &vertex,
                fragment_shader: &fragment,
                kind: PipelineKind::Solid,
            },
        );
        let blend = Pipeline::new(
            ctx,
            surface.render_pass,
            layout,
            &PipelineConfig {
                extent: surface.extent,
                samples: surface.samples,
                vertex_shader: &vertex,
                fragment_shader: &fragment,
                kind: PipelineKind::Blend,
            },
        );

        Self {
            device,
            layout,
            solid,
            blend,
        }
    }
}

impl Drop for LayerPipelines {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
        // solid and blend drop afterwards
    }
}

/// A registry of drawable objects sharing one shader pair.
pub struct DrawLayer {
    ctx: Rc<DeviceContext>,
    commands: CommandStream,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
    surface: SurfaceInfo,
    objects: Vec<Rc<RefCell<DrawObject>>>,
    environment: Option<Rc<Texture>>,
    default_environment: Rc<Texture>,
    fallback: Rc<Texture>,
    descriptors: Option<LayerDescriptors>,
    pipelines: Option<LayerPipelines>,
}

impl DrawLayer {
    /// Create an empty layer for a window, with the SPIR-V shader pair its
    /// pipelines are built from.
    pub fn new(
        ctx: Rc<DeviceContext>,
        window: &crate::window::Window,
        vertex_shader: PathBuf,
        fragment_shader: PathBuf,
    ) -> Self {
        let commands = CommandStream::new(&ctx, CommandRole::Secondary);
        let fallback = Rc::new(Texture::solid_color(
            &ctx,
            commands.pool(),
            [255, 255, 255, 255],
        ));
        let default_environment =
            Rc::new(Texture::solid_cube(&ctx, commands.pool(), [0, 0, 0, 255]));
        // A degraded window (e.g. minimized at startup) has no snapshot yet;
        // the layer stays empty until the first rebuild delivers one.
        let surface = if window.state() == SurfaceState::Ready {
            window.surface_info()
        } else {
            SurfaceInfo::pending()
        };

        Self {
            ctx,
            commands,
            vertex_shader,
            fragment_shader,
            surface,
            objects: Vec::new(),
            environment: None,
            default_environment,
            fallback,
            descriptors: None,
            pipelines: None,
        }
    }

    /// Add an object and rebuild the layer's GPU state around it.
    pub fn add_object(&mut self, object: Rc<RefCell<DrawObject>>) {
        self.objects.push(object);
        self.refresh();
    }

    /// Remove an object and rebuild the layer's GPU state without it.
    pub fn remove_object(&mut self, object: &Rc<RefCell<DrawObject>>) {
        self.objects.retain(|existing| !Rc::ptr_eq(existing, object));
        self.refresh();
    }

    /// Number of registered objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Set or clear the environment cube map shared by every material of
    /// this layer.
    pub fn set_environment(&mut self, environment: Option<Rc<Texture>>) {
        self.environment = environment;
        self.refresh();
    }

    /// Force a full rebuild of the layer's GPU state, e.g. after the shader
    /// files changed on disk.
    pub fn update(&mut self) {
        self.refresh();
    }

    /// Push fresh camera and lighting state into every object's uniform.
    pub fn update_uniforms(
        &self,
        projection: Mat4,
        view: Mat4,
        point_lights: [PointLight; 4],
        view_position: Vec3,
    ) {
        for object in &self.objects {
            object
                .borrow()
                .update_uniform(projection, view, point_lights, view_position);
        }
    }

    /// Tear down and recreate everything derived from the object registry.
    ///
    /// Teardown runs newest-to-oldest: secondary buffers, per-object custom
    /// pipelines, layer pipelines, descriptors. Creation mirrors it in
    /// reverse. With no objects registered, or no live surface snapshot yet,
    /// the layer stays empty.
    fn refresh(&mut self) {
        self.ctx.wait_idle();

        self.commands.free_buffers();
        for object in &self.objects {
            object.borrow_mut().destroy_custom_pipelines();
        }
        self.pipelines = None;
        if self.descriptors.take().is_some() {
            for object in &self.objects {
                object.borrow_mut().clear_descriptor_sets();
            }
        }

        if self.objects.is_empty() || !self.surface.is_ready() {
            return;
        }

        let object_count = self.objects.len() as u32;
        let material_count: u32 = self
            .objects
            .iter()
            .map(|object| object.borrow().material_count())
            .sum();

        let descriptors = LayerDescriptors::new(&self.ctx, object_count, material_count);
        let environment = self
            .environment
            .clone()
            .unwrap_or_else(|| self.default_environment.clone());
        for object in &self.objects {
            object.borrow_mut().create_descriptor_sets(
                &self.ctx,
                descriptors.pool,
                descriptors.object_layout,
                descriptors.material_layout,
                &environment,
                &self.fallback,
            );
        }

        let pipelines = LayerPipelines::new(
            &self.ctx,
            &self.surface,
            &self.vertex_shader,
            &self.fragment_shader,
            &descriptors,
        );
        for object in &self.objects {
            object
                .borrow_mut()
                .create_custom_pipelines(&self.ctx, &self.surface, pipelines.layout);
        }

        self.commands.allocate(self.surface.image_count);

        self.descriptors = Some(descriptors);
        self.pipelines = Some(pipelines);
    }
}

impl SurfaceLayer for DrawLayer {
    fn rebuild(&mut self, surface: &SurfaceInfo) {
        self.surface = *surface;
        self.refresh();
    }

    fn record_commands(
        &mut self,
        inheritance: &vk::CommandBufferInheritanceInfo,
        image_index: usize,
    ) {
        if self.commands.is_empty() {
            return;
        }

        let device = self.ctx.device();
        let cmd = self.commands.buffer(image_index);

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(
                vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE
                    | vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            )
            .inheritance_info(inheritance);
        vk_check(
            unsafe { device.begin_command_buffer(cmd, &begin_info) },
            "vkBeginCommandBuffer (layer)",
        );

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.surface.extent.width as f32,
            height: self.surface.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.surface.extent,
        };
        unsafe {
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }

        if let Some(pipelines) = &self.pipelines {
            for object in &self.objects {
                object.borrow().record(
                    cmd,
                    pipelines.solid.handle(),
                    pipelines.blend.handle(),
                    pipelines.layout,
                );
            }
        }

        vk_check(
            unsafe { device.end_command_buffer(cmd) },
            "vkEndCommandBuffer (layer)",
        );
    }

    fn command_buffer(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        if self.commands.is_empty() {
            None
        } else {
            Some(self.commands.buffer(image_index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_object_one_material_pool() {
        let sizing = descriptor_pool_sizing(1, 1);
        // Two uniforms for the object set, one for the material set.
        assert_eq!(sizing.uniform_buffers, 3);
        assert_eq!(sizing.combined_samplers, 6);
        assert_eq!(sizing.max_sets, 7);
    }

    #[test]
    fn empty_registry_still_allows_one_set() {
        let sizing = descriptor_pool_sizing(0, 0);
        assert_eq!(sizing.uniform_buffers, 0);
        assert_eq!(sizing.combined_samplers, 0);
        assert_eq!(sizing.max_sets, 1);
    }

    #[test]
    fn pool_scales_with_objects_and_materials() {
        let sizing = descriptor_pool_sizing(3, 5);
        assert_eq!(sizing.uniform_buffers, 11);
        assert_eq!(sizing.combined_samplers, 30);
        assert_eq!(sizing.max_sets, 33);
    }
}
