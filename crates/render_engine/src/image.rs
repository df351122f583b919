//! Images, image views, and layout transitions.
//!
//! Layout transitions go through a fixed allow-list of (old, new) pairs; a
//! transition outside the list is a programming error and aborts. The mask
//! table is a pure function so it can be checked without a device.

use ash::{vk, Device};

use crate::buffer::find_memory_type;
use crate::command::{begin_single_time, end_single_time};
use crate::device::DeviceContext;
use crate::error::{fatal, vk_check};

/// Access and stage masks for one allowed layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition.
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the transition.
    pub dst_access: vk::AccessFlags,
    /// Pipeline stage the transition waits on.
    pub src_stage: vk::PipelineStageFlags,
    /// Pipeline stage blocked until the transition completes.
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for a supported layout transition, or `None` when the pair
/// is not in the allow-list.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Option<TransitionMasks> {
    use vk::ImageLayout as L;

    let masks = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::SHADER_READ,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        _ => return None,
    };

    Some(masks)
}

/// Creation parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageSpec {
    /// Width and height in texels.
    pub extent: vk::Extent2D,
    /// Texel format.
    pub format: vk::Format,
    /// Tiling mode.
    pub tiling: vk::ImageTiling,
    /// Usage flags.
    pub usage: vk::ImageUsageFlags,
    /// Sample count (multisampled render targets).
    pub samples: vk::SampleCountFlags,
    /// Memory property flags for the backing allocation.
    pub memory: vk::MemoryPropertyFlags,
    /// Number of array layers (6 for cube maps).
    pub array_layers: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Extra creation flags (`CUBE_COMPATIBLE` for cube maps).
    pub flags: vk::ImageCreateFlags,
}

impl ImageSpec {
    /// A single-layer, single-mip, single-sample optimal-tiling image in
    /// device-local memory. The common case for textures and render targets.
    pub fn basic(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            samples: vk::SampleCountFlags::TYPE_1,
            memory: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            array_layers: 1,
            mip_levels: 1,
            flags: vk::ImageCreateFlags::empty(),
        }
    }

    /// Use a multisampled target.
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Make the image cube-compatible with six layers.
    pub fn cube(mut self) -> Self {
        self.array_layers = 6;
        self.flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        self
    }
}

/// A 2D image with its backing allocation, released on drop.
///
/// The current layout is tracked so transitions can be validated against the
/// allow-list.
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    format: vk::Format,
    extent: vk::Extent2D,
    array_layers: u32,
    mip_levels: u32,
    layout: vk::ImageLayout,
}

impl Image {
    /// Create an image per `spec`, starting in `UNDEFINED` layout.
    pub fn new(ctx: &DeviceContext, spec: &ImageSpec) -> Self {
        let device = ctx.raw_device();

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: spec.extent.width,
                height: spec.extent.height,
                depth: 1,
            })
            .mip_levels(spec.mip_levels)
            .array_layers(spec.array_layers)
            .format(spec.format)
            .tiling(spec.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(spec.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(spec.samples)
            .flags(spec.flags);

        let image = vk_check(
            unsafe { device.create_image(&create_info, None) },
            "vkCreateImage",
        );

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let Some(memory_type) = find_memory_type(
            ctx.memory_properties(),
            requirements.memory_type_bits,
            spec.memory,
        ) else {
            fatal("no memory type satisfies image allocation requirements");
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = vk_check(
            unsafe { device.allocate_memory(&alloc_info, None) },
            "vkAllocateMemory (image)",
        );
        vk_check(
            unsafe { device.bind_image_memory(image, memory, 0) },
            "vkBindImageMemory",
        );

        Self {
            device,
            image,
            memory,
            format: spec.format,
            extent: spec.extent,
            array_layers: spec.array_layers,
            mip_levels: spec.mip_levels,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    /// Transition the whole image to `new_layout` with a pipeline barrier on
    /// a one-shot command buffer. Aborts if the transition is not in the
    /// allow-list.
    pub fn transition_layout(
        &mut self,
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        new_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) {
        let Some(masks) = transition_masks(self.layout, new_layout) else {
            fatal(&format!(
                "unsupported image layout transition {:?} -> {:?}",
                self.layout, new_layout
            ));
        };

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: self.mip_levels,
                base_array_layer: 0,
                layer_count: self.array_layers,
            })
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        let device = ctx.device();
        let cmd = begin_single_time(device, pool);
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
        end_single_time(device, ctx.graphics_queue(), pool, cmd);

        self.layout = new_layout;
    }

    /// Copy tightly packed texel data from `buffer` into every layer of the
    /// image. The image must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_from_buffer(
        &mut self,
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        buffer: vk::Buffer,
        aspect: vk::ImageAspectFlags,
    ) {
        if self.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            fatal("image must be in TRANSFER_DST_OPTIMAL before a buffer copy");
        }

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: self.array_layers,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
        };

        let device = ctx.device();
        let cmd = begin_single_time(device, pool);
        unsafe {
            device.cmd_copy_buffer_to_image(
                cmd,
                buffer,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        end_single_time(device, ctx.graphics_queue(), pool, cmd);
    }

    /// Read every layer of the image back into `buffer`. The image must be
    /// in `TRANSFER_SRC_OPTIMAL`.
    pub fn copy_to_buffer(
        &self,
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        buffer: vk::Buffer,
        aspect: vk::ImageAspectFlags,
    ) {
        if self.layout != vk::ImageLayout::TRANSFER_SRC_OPTIMAL {
            fatal("image must be in TRANSFER_SRC_OPTIMAL before a readback");
        }

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: self.array_layers,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
        };

        let device = ctx.device();
        let cmd = begin_single_time(device, pool);
        unsafe {
            device.cmd_copy_image_to_buffer(
                cmd,
                self.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer,
                &[region],
            );
        }
        end_single_time(device, ctx.graphics_queue(), pool, cmd);
    }

    /// The image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Texel format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// The layout the image is currently in.
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// An image together with a view over it.
///
/// The view owns the image; dropping the view destroys both, view first.
pub struct ImageView {
    device: Device,
    view: vk::ImageView,
    image: Image,
}

impl ImageView {
    /// Create an image per `spec` and a view over all its layers.
    pub fn new(
        ctx: &DeviceContext,
        spec: &ImageSpec,
        view_type: vk::ImageViewType,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        let image = Image::new(ctx, spec);
        Self::for_image(ctx, image, view_type, aspect)
    }

    /// Create a view over an existing owned image.
    pub fn for_image(
        ctx: &DeviceContext,
        image: Image,
        view_type: vk::ImageViewType,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        let device = ctx.raw_device();

        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image.handle())
            .view_type(view_type)
            .format(image.format())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: image.mip_levels,
                base_array_layer: 0,
                layer_count: image.array_layers,
            });

        let view = vk_check(
            unsafe { device.create_image_view(&create_info, None) },
            "vkCreateImageView",
        );

        Self {
            device,
            view,
            image,
        }
    }

    /// The view handle.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// The underlying image.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Mutable access to the underlying image, for layout transitions.
    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        // self.image drops afterwards and releases the allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn allowed_transitions_have_masks() {
        let allowed = [
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
            (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
        ];
        for (old, new) in allowed {
            assert!(
                transition_masks(old, new).is_some(),
                "{old:?} -> {new:?} should be allowed"
            );
        }
    }

    #[test]
    fn undefined_to_transfer_dst_has_no_source_access() {
        let masks = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn depth_transition_targets_early_fragment_tests() {
        let masks = transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
        assert!(masks
            .dst_access
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn unlisted_transitions_are_rejected() {
        let rejected = [
            (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL),
            (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
            (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (L::UNDEFINED, L::PRESENT_SRC_KHR),
            (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR),
        ];
        for (old, new) in rejected {
            assert!(
                transition_masks(old, new).is_none(),
                "{old:?} -> {new:?} should be rejected"
            );
        }
    }
}
