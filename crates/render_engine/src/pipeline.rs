//! Shader modules and graphics pipelines.

use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use crate::device::DeviceContext;
use crate::error::{fatal, vk_check};
use crate::mesh::Vertex3D;

/// Shader module wrapper with RAII cleanup.
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes. Aborts on malformed SPIR-V.
    pub fn from_bytes(ctx: &DeviceContext, bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        let code = match ash::util::read_spv(&mut cursor) {
            Ok(code) => code,
            Err(e) => fatal(&format!("invalid SPIR-V module: {e}")),
        };

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let device = ctx.raw_device();
        let module = vk_check(
            unsafe { device.create_shader_module(&create_info, None) },
            "vkCreateShaderModule",
        );

        Self { device, module }
    }

    /// Load a SPIR-V module from disk. Aborts if the file is missing or
    /// unreadable.
    pub fn from_file(ctx: &DeviceContext, path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => fatal(&format!("failed to read shader {}: {e}", path.display())),
        };
        Self::from_bytes(ctx, &bytes)
    }

    /// The module handle.
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// How a pipeline writes its color output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    /// Opaque geometry: no blending, depth writes on.
    Solid,
    /// Transparent geometry: alpha blending, depth writes off.
    Blend,
}

/// Everything a graphics pipeline needs besides the render pass and layout.
pub struct PipelineConfig<'a> {
    /// Viewport extent.
    pub extent: vk::Extent2D,
    /// Rasterization sample count; must match the render pass.
    pub samples: vk::SampleCountFlags,
    /// Vertex stage.
    pub vertex_shader: &'a ShaderModule,
    /// Fragment stage.
    pub fragment_shader: &'a ShaderModule,
    /// Blending behavior.
    pub kind: PipelineKind,
}

/// Graphics pipeline wrapper with RAII cleanup.
///
/// The pipeline layout is owned by the draw layer and shared between its
/// pipelines; only the pipeline object itself is owned here.
pub struct Pipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Build a forward graphics pipeline.
    pub fn new(
        ctx: &DeviceContext,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        config: &PipelineConfig<'_>,
    ) -> Self {
        let entry_point = unsafe { std::ffi::CStr::from_bytes_with_nul_unchecked(b"main\0") };
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(config.vertex_shader.handle())
                .name(entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(config.fragment_shader.handle())
                .name(entry_point)
                .build(),
        ];

        let bindings = [Vertex3D::binding_description()];
        let attributes = Vertex3D::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: config.extent.width as f32,
            height: config.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: config.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(config.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(config.kind == PipelineKind::Solid)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachment = match config.kind {
            PipelineKind::Solid => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build(),
            PipelineKind::Blend => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
        };
        let blend_attachments = [blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        // Layers re-record viewport and scissor into secondary buffers after
        // a rebuild, so both stay dynamic.
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let device = ctx.raw_device();
        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, code)) => fatal(&format!("vkCreateGraphicsPipelines failed: {code:?}")),
        };

        Self { device, pipeline }
    }

    /// The pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
