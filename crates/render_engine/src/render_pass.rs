//! Forward render pass construction.
//!
//! The attachment set depends only on the sample count: two attachments
//! (color, depth) without multisampling, four (multisampled color, resolve
//! color, multisampled depth, single-sample depth) with it. The attachment
//! and clear-value builders are pure functions.

use ash::{vk, Device};

use crate::device::DeviceContext;
use crate::error::vk_check;

/// Attachment descriptions for the forward pass.
///
/// Without multisampling: `[color -> PRESENT_SRC, depth]`. With it:
/// `[ms color, resolve color -> PRESENT_SRC, ms depth, depth]`; the resolve
/// color attachment is the swapchain image.
pub fn forward_attachments(
    samples: vk::SampleCountFlags,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Vec<vk::AttachmentDescription> {
    if samples == vk::SampleCountFlags::TYPE_1 {
        return vec![
            vk::AttachmentDescription {
                format: color_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: depth_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];
    }

    vec![
        vk::AttachmentDescription {
            format: color_format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ]
}

/// Clear values matching [`forward_attachments`], one per attachment.
pub fn forward_clear_values(samples: vk::SampleCountFlags) -> Vec<vk::ClearValue> {
    let color = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    };
    let depth = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    };

    if samples == vk::SampleCountFlags::TYPE_1 {
        vec![color, depth]
    } else {
        vec![color, color, depth, depth]
    }
}

/// Render pass wrapper with RAII cleanup.
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    attachment_count: u32,
}

impl RenderPass {
    /// Create the forward pass for the given sample count and formats.
    pub fn forward(
        ctx: &DeviceContext,
        samples: vk::SampleCountFlags,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Self {
        let attachments = forward_attachments(samples, color_format, depth_format);
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let resolve_refs = [vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: if multisampled { 2 } else { 1 },
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);
        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        let subpasses = [subpass.build()];

        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        }];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let device = ctx.raw_device();
        let render_pass = vk_check(
            unsafe { device.create_render_pass(&create_info, None) },
            "vkCreateRenderPass",
        );

        Self {
            device,
            render_pass,
            attachment_count: attachments.len() as u32,
        }
    }

    /// The render pass handle.
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Number of attachments each framebuffer must supply.
    pub fn attachment_count(&self) -> u32 {
        self.attachment_count
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Framebuffer wrapper with RAII cleanup.
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over the given attachments.
    pub fn new(
        ctx: &DeviceContext,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Self {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let device = ctx.raw_device();
        let framebuffer = vk_check(
            unsafe { device.create_framebuffer(&create_info, None) },
            "vkCreateFramebuffer",
        );

        Self {
            device,
            framebuffer,
        }
    }

    /// The framebuffer handle.
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_SRGB;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn single_sample_pass_has_color_and_depth() {
        let attachments = forward_attachments(vk::SampleCountFlags::TYPE_1, COLOR, DEPTH);
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            attachments[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachments[0].samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn multisampled_pass_adds_resolve_targets() {
        let attachments = forward_attachments(vk::SampleCountFlags::TYPE_4, COLOR, DEPTH);
        assert_eq!(attachments.len(), 4);

        // Multisampled color resolves into the single-sample swapchain image.
        assert_eq!(attachments[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            attachments[0].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachments[1].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[1].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(attachments[2].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[2].format, DEPTH);
        assert_eq!(attachments[3].samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn clear_values_match_attachment_counts() {
        assert_eq!(forward_clear_values(vk::SampleCountFlags::TYPE_1).len(), 2);
        assert_eq!(forward_clear_values(vk::SampleCountFlags::TYPE_4).len(), 4);
        assert_eq!(forward_clear_values(vk::SampleCountFlags::TYPE_8).len(), 4);
    }
}
