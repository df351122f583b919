//! Sampled textures: image, view, and sampler in one bundle.

use std::path::Path;

use ash::{vk, Device};

use crate::buffer::Buffer;
use crate::device::DeviceContext;
use crate::error::{fatal, vk_check};
use crate::image::{ImageSpec, ImageView};

/// A texture ready to be bound through a combined image sampler.
pub struct Texture {
    device: Device,
    view: ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    /// Upload tightly packed texels and create a 2D sampled texture.
    pub fn from_pixels(
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Self {
        let extent = vk::Extent2D { width, height };
        let spec = ImageSpec::basic(
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        );
        Self::upload(ctx, pool, pixels, &spec, vk::ImageViewType::TYPE_2D)
    }

    /// Load an image file (PNG/JPEG) as an RGBA texture.
    pub fn from_file(ctx: &DeviceContext, pool: vk::CommandPool, path: &Path) -> Self {
        let decoded = match image::open(path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(e) => fatal(&format!("failed to load texture {}: {e}", path.display())),
        };
        let (width, height) = decoded.dimensions();
        Self::from_pixels(
            ctx,
            pool,
            decoded.as_raw(),
            width,
            height,
            vk::Format::R8G8B8A8_SRGB,
        )
    }

    /// A 1x1 texture of a single color, used as the fallback for unbound
    /// material slots.
    pub fn solid_color(ctx: &DeviceContext, pool: vk::CommandPool, rgba: [u8; 4]) -> Self {
        Self::from_pixels(ctx, pool, &rgba, 1, 1, vk::Format::R8G8B8A8_UNORM)
    }

    /// A 1x1 cube map of a single color, used when no environment map is set.
    pub fn solid_cube(ctx: &DeviceContext, pool: vk::CommandPool, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(24);
        for _ in 0..6 {
            pixels.extend_from_slice(&rgba);
        }
        let spec = ImageSpec::basic(
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
        .cube();
        Self::upload(ctx, pool, &pixels, &spec, vk::ImageViewType::CUBE)
    }

    fn upload(
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        pixels: &[u8],
        spec: &ImageSpec,
        view_type: vk::ImageViewType,
    ) -> Self {
        let staging = Buffer::new(
            ctx,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        staging.write(pixels, 0);

        let mut view = ImageView::new(ctx, spec, view_type, vk::ImageAspectFlags::COLOR);
        let image = view.image_mut();
        image.transition_layout(
            ctx,
            pool,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
        );
        image.copy_from_buffer(ctx, pool, staging.handle(), vk::ImageAspectFlags::COLOR);
        image.transition_layout(
            ctx,
            pool,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
        );

        let sampler = Self::create_sampler(ctx);

        Self {
            device: ctx.raw_device(),
            view,
            sampler,
        }
    }

    fn create_sampler(ctx: &DeviceContext) -> vk::Sampler {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(ctx.limits().max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(1.0);

        vk_check(
            unsafe { ctx.device().create_sampler(&create_info, None) },
            "vkCreateSampler",
        )
    }

    /// Descriptor info for binding this texture as a combined image sampler.
    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// The image view.
    pub fn view(&self) -> &ImageView {
        &self.view
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
