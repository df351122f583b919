//! Drawable objects: merged geometry buffers, the per-object uniform, and
//! per-mesh draw recording.

use std::path::PathBuf;

use ash::{vk, Device};

use crate::buffer::Buffer;
use crate::device::DeviceContext;
use crate::error::fatal;
use crate::light::PointLight;
use crate::material::Material;
use crate::math::{Mat4, Vec3, Vec4};
use crate::mesh::Mesh;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineKind, ShaderModule};
use crate::texture::Texture;
use crate::window::SurfaceInfo;

/// GPU layout of the per-object uniform (set 0, bindings 0 and 1).
///
/// The field order is the byte layout the shaders read. `view_position` is
/// stored negated so the fragment shader can add it directly.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    /// Model transform.
    pub model: Mat4,
    /// View transform.
    pub view: Mat4,
    /// Projection transform.
    pub projection: Mat4,
    /// The scene's point lights.
    pub point_lights: [PointLight; 4],
    /// Negated camera position, `w = 1`.
    pub view_position: Vec4,
}

impl ObjectUniform {
    /// Assemble the uniform block, negating the camera position.
    pub fn compose(
        model: Mat4,
        view: Mat4,
        projection: Mat4,
        point_lights: [PointLight; 4],
        view_position: Vec3,
    ) -> Self {
        Self {
            model,
            view,
            projection,
            point_lights,
            view_position: Vec4::new(-view_position.x, -view_position.y, -view_position.z, 1.0),
        }
    }
}

/// An optional per-object shader pair that replaces the layer's pipelines
/// for every mesh of the object (skyboxes, debug visualizations).
///
/// The pipeline itself is built and torn down by the owning layer's rebuild,
/// like the layer pipelines it stands in for.
pub struct CustomShading {
    /// SPIR-V vertex shader path.
    pub vertex_shader: PathBuf,
    /// SPIR-V fragment shader path.
    pub fragment_shader: PathBuf,
    /// Blending behavior of the custom pipeline.
    pub kind: PipelineKind,
    pipeline: Option<Pipeline>,
}

impl CustomShading {
    /// Describe a custom shader pair. The pipeline is built on the next
    /// layer rebuild.
    pub fn new(vertex_shader: PathBuf, fragment_shader: PathBuf, kind: PipelineKind) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            kind,
            pipeline: None,
        }
    }
}

/// A drawable object: meshes merged into shared vertex/index buffers, the
/// materials they reference, and the object's uniform buffer.
pub struct DrawObject {
    device: Device,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    model: Mat4,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    uniform: Buffer,
    descriptor_set: vk::DescriptorSet,
    shading: Option<CustomShading>,
}

impl DrawObject {
    /// Merge `meshes` into device-local vertex/index buffers and allocate
    /// the object uniform. Each mesh's `material_id` must index into
    /// `materials`.
    pub fn new(
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        mut meshes: Vec<Mesh>,
        materials: Vec<Material>,
    ) -> Self {
        if meshes.is_empty() {
            fatal("a drawable object requires at least one mesh");
        }
        for mesh in &meshes {
            if mesh.material_id >= materials.len() {
                fatal("mesh references a material index that does not exist");
            }
        }

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for mesh in &mut meshes {
            mesh.vertex_base = vertices.len() as i32;
            mesh.index_base = indices.len() as u32;
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
        }

        let vertex_buffer = Buffer::device_local(
            ctx,
            pool,
            bytemuck::cast_slice(&vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        );
        let index_buffer = Buffer::device_local(
            ctx,
            pool,
            bytemuck::cast_slice(&indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        );
        let uniform = Buffer::new(
            ctx,
            std::mem::size_of::<ObjectUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );

        Self {
            device: ctx.raw_device(),
            meshes,
            materials,
            model: Mat4::identity(),
            vertex_buffer,
            index_buffer,
            uniform,
            descriptor_set: vk::DescriptorSet::null(),
            shading: None,
        }
    }

    /// Set the model transform. Takes effect on the next uniform update.
    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }

    /// Current model transform.
    pub fn model(&self) -> Mat4 {
        self.model
    }

    /// Attach or clear a custom shader pair. The owning layer must be
    /// rebuilt for the change to take effect.
    pub fn set_shading(&mut self, shading: Option<CustomShading>) {
        self.shading = shading;
    }

    /// The object's materials.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Mutable access to the object's materials.
    pub fn materials_mut(&mut self) -> &mut [Material] {
        &mut self.materials
    }

    /// Number of materials, for descriptor pool sizing.
    pub fn material_count(&self) -> u32 {
        self.materials.len() as u32
    }

    /// Upload a fresh uniform block for this frame.
    pub fn update_uniform(
        &self,
        projection: Mat4,
        view: Mat4,
        point_lights: [PointLight; 4],
        view_position: Vec3,
    ) {
        let block = ObjectUniform::compose(self.model, view, projection, point_lights, view_position);
        self.uniform.write(bytemuck::bytes_of(&block), 0);
    }

    /// Allocate and write this object's descriptor sets out of the layer's
    /// pool: one object set, one set per material.
    ///
    /// Unbound material slots fall back to the material's diffuse texture,
    /// then to `fallback`. Binding 6 is always the layer `environment`.
    pub fn create_descriptor_sets(
        &mut self,
        ctx: &DeviceContext,
        pool: vk::DescriptorPool,
        object_layout: vk::DescriptorSetLayout,
        material_layout: vk::DescriptorSetLayout,
        environment: &Texture,
        fallback: &Texture,
    ) {
        let device = ctx.device();

        let object_layouts = [object_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&object_layouts);
        self.descriptor_set = crate::error::vk_check(
            unsafe { device.allocate_descriptor_sets(&alloc_info) },
            "vkAllocateDescriptorSets (object)",
        )[0];

        // The same uniform buffer feeds both stages: binding 0 in the vertex
        // shader, binding 1 in the fragment shader.
        let uniform_info = [vk::DescriptorBufferInfo {
            buffer: self.uniform.handle(),
            offset: 0,
            range: std::mem::size_of::<ObjectUniform>() as vk::DeviceSize,
        }];
        let object_writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(self.descriptor_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&uniform_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(self.descriptor_set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&uniform_info)
                .build(),
        ];
        unsafe {
            device.update_descriptor_sets(&object_writes, &[]);
        }

        let environment_info = [environment.descriptor()];
        for material in &mut self.materials {
            let material_layouts = [material_layout];
            let alloc_info = vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(pool)
                .set_layouts(&material_layouts);
            let set = crate::error::vk_check(
                unsafe { device.allocate_descriptor_sets(&alloc_info) },
                "vkAllocateDescriptorSets (material)",
            )[0];

            let base = material
                .textures
                .diffuse
                .as_deref()
                .map_or_else(|| fallback.descriptor(), Texture::descriptor);
            let slot = |texture: &Option<std::rc::Rc<Texture>>| {
                [texture.as_deref().map_or(base, Texture::descriptor)]
            };

            let uniform_info = [vk::DescriptorBufferInfo {
                buffer: material.uniform().handle(),
                offset: 0,
                range: material.uniform().size(),
            }];
            let diffuse_info = [base];
            let normal_info = slot(&material.textures.normal);
            let metal_rough_info = slot(&material.textures.metalness_roughness);
            let occlusion_info = slot(&material.textures.ambient_occlusion);
            let displacement_info = slot(&material.textures.displacement);

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&uniform_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&diffuse_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(2)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&normal_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(3)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&metal_rough_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(4)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&occlusion_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(5)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&displacement_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(6)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&environment_info)
                    .build(),
            ];
            unsafe {
                device.update_descriptor_sets(&writes, &[]);
            }

            material.set_descriptor_set(set);
        }
    }

    /// Drop descriptor handles after the layer resets its pool.
    pub(crate) fn clear_descriptor_sets(&mut self) {
        self.descriptor_set = vk::DescriptorSet::null();
        for material in &mut self.materials {
            material.set_descriptor_set(vk::DescriptorSet::null());
        }
    }

    /// Build the custom pipeline, if a custom shader pair is attached.
    pub(crate) fn create_custom_pipelines(
        &mut self,
        ctx: &DeviceContext,
        surface: &SurfaceInfo,
        layout: vk::PipelineLayout,
    ) {
        if let Some(shading) = &mut self.shading {
            let vertex = ShaderModule::from_file(ctx, &shading.vertex_shader);
            let fragment = ShaderModule::from_file(ctx, &shading.fragment_shader);
            let config = PipelineConfig {
                extent: surface.extent,
                samples: surface.samples,
                vertex_shader: &vertex,
                fragment_shader: &fragment,
                kind: shading.kind,
            };
            shading.pipeline = Some(Pipeline::new(ctx, surface.render_pass, layout, &config));
        }
    }

    /// Destroy the custom pipeline ahead of a layer rebuild.
    pub(crate) fn destroy_custom_pipelines(&mut self) {
        if let Some(shading) = &mut self.shading {
            shading.pipeline = None;
        }
    }

    /// Record this object's draws into a secondary command buffer.
    ///
    /// Each mesh binds its material set and the pipeline its material calls
    /// for; a custom shading pipeline overrides both layer pipelines.
    pub fn record(
        &self,
        cmd: vk::CommandBuffer,
        solid: vk::Pipeline,
        blend: vk::Pipeline,
        layout: vk::PipelineLayout,
    ) {
        let device = &self.device;
        let vertex_buffers = [self.vertex_buffer.handle()];
        let offsets = [0];

        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &vertex_buffers, &offsets);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.handle(), 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[self.descriptor_set],
                &[],
            );
        }

        let custom = self
            .shading
            .as_ref()
            .and_then(|shading| shading.pipeline.as_ref())
            .map(Pipeline::handle);

        for mesh in &self.meshes {
            let material = &self.materials[mesh.material_id];
            let pipeline = custom.unwrap_or(if material.blend() { blend } else { solid });

            unsafe {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    1,
                    &[material.descriptor_set()],
                    &[],
                );
                device.cmd_draw_indexed(
                    cmd,
                    mesh.indices.len() as u32,
                    1,
                    mesh.index_base,
                    mesh.vertex_base,
                    0,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_400_bytes() {
        // 3 matrices + 4 lights of 3 vec4s + 1 vec4
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 400);
    }

    #[test]
    fn uniform_fields_land_at_expected_offsets() {
        let block = ObjectUniform::compose(
            Mat4::from_element(1.0),
            Mat4::from_element(2.0),
            Mat4::from_element(3.0),
            [PointLight::at(4.0, 5.0, 6.0); 4],
            Vec3::new(7.0, 8.0, 9.0),
        );
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&block));
        assert_eq!(floats.len(), 100);

        assert_eq!(floats[0], 1.0); // model
        assert_eq!(floats[16], 2.0); // view
        assert_eq!(floats[32], 3.0); // projection
        assert_eq!(&floats[48..51], &[4.0, 5.0, 6.0]); // first light position
        assert_eq!(&floats[96..100], &[-7.0, -8.0, -9.0, 1.0]); // negated view position
    }

    #[test]
    fn compose_negates_the_camera_position() {
        use approx::assert_relative_eq;

        let block = ObjectUniform::compose(
            Mat4::identity(),
            Mat4::identity(),
            Mat4::identity(),
            [PointLight::default(); 4],
            Vec3::new(1.0, -2.0, 3.0),
        );
        assert_relative_eq!(block.view_position, Vec4::new(-1.0, 2.0, -3.0, 1.0));
    }
}
