//! The presentation surface and per-frame loop.
//!
//! [`Window`] owns everything tied to one Vulkan surface: the swapchain and
//! its views, the depth and multisample targets, the forward render pass,
//! framebuffers, the primary command stream, and the frame synchronization
//! objects. Draw layers register themselves and are re-recorded every frame
//! through secondary command buffers.
//!
//! Any resize, anti-aliasing change, or out-of-date swapchain triggers a full
//! rebuild: surface-dependent resources are destroyed in reverse creation
//! order and recreated, then every registered layer is told to rebuild
//! against the new surface. Synchronization objects survive rebuilds.

use std::cell::RefCell;
use std::rc::Rc;

use ash::extensions::khr;
use ash::{vk, Device};

use crate::command::{CommandRole, CommandStream};
use crate::device::DeviceContext;
use crate::error::{fatal, vk_check};
use crate::image::{ImageSpec, ImageView};
use crate::render_pass::{forward_clear_values, Framebuffer, RenderPass};

/// Anti-aliasing setting for the forward pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AntiAliasing {
    /// Single-sample rendering.
    None,
    /// 2x MSAA.
    Msaa2,
    /// 4x MSAA.
    Msaa4,
    /// 8x MSAA.
    Msaa8,
    /// 16x MSAA.
    Msaa16,
    /// 32x MSAA.
    Msaa32,
    /// 64x MSAA.
    Msaa64,
}

impl AntiAliasing {
    /// The sample count this setting asks for.
    pub fn sample_count(self) -> vk::SampleCountFlags {
        match self {
            AntiAliasing::None => vk::SampleCountFlags::TYPE_1,
            AntiAliasing::Msaa2 => vk::SampleCountFlags::TYPE_2,
            AntiAliasing::Msaa4 => vk::SampleCountFlags::TYPE_4,
            AntiAliasing::Msaa8 => vk::SampleCountFlags::TYPE_8,
            AntiAliasing::Msaa16 => vk::SampleCountFlags::TYPE_16,
            AntiAliasing::Msaa32 => vk::SampleCountFlags::TYPE_32,
            AntiAliasing::Msaa64 => vk::SampleCountFlags::TYPE_64,
        }
    }
}

/// Clamp a requested sample count to what the device's color and depth
/// framebuffers both support, falling back toward single-sample.
pub fn clamp_sample_count(
    supported: vk::SampleCountFlags,
    requested: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let ladder = [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ];

    let mut seen_requested = false;
    for &count in &ladder {
        if count == requested {
            seen_requested = true;
        }
        if seen_requested && supported.contains(count) {
            return count;
        }
    }
    vk::SampleCountFlags::TYPE_1
}

/// Whether an extent can hold a swapchain at all.
fn is_renderable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// Pick the swapchain format: prefer sRGB BGRA, otherwise the first entry.
/// Legacy drivers report a single `UNDEFINED` entry meaning any format goes.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
        return vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: formats[0].color_space,
        };
    }
    formats
        .iter()
        .find(|sf| {
            sf.format == vk::Format::B8G8R8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Lifecycle state of the presentation surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    /// Frames can be drawn.
    Ready,
    /// Zero-sized surface; drawing is a no-op until a usable resize.
    Degraded,
    /// A rebuild is in progress.
    Rebuilding,
}

/// Snapshot of the surface properties a layer needs to build pipelines and
/// secondary command buffers. Handed to layers on every rebuild.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceInfo {
    /// The forward render pass.
    pub render_pass: vk::RenderPass,
    /// Current swapchain extent.
    pub extent: vk::Extent2D,
    /// Rasterization sample count.
    pub samples: vk::SampleCountFlags,
    /// Number of swapchain images (one secondary buffer each).
    pub image_count: u32,
}

impl SurfaceInfo {
    /// Placeholder snapshot for a surface that is not up yet. A layer built
    /// against it stays empty until the first rebuild delivers a real one.
    pub(crate) fn pending() -> Self {
        Self {
            render_pass: vk::RenderPass::null(),
            extent: vk::Extent2D::default(),
            samples: vk::SampleCountFlags::TYPE_1,
            image_count: 0,
        }
    }

    /// Whether this snapshot points at a live surface.
    pub fn is_ready(&self) -> bool {
        self.render_pass != vk::RenderPass::null() && self.image_count > 0
    }
}

/// A composable rendering layer driven by the window's frame loop.
pub trait SurfaceLayer {
    /// Rebuild all surface-dependent resources against a new surface.
    fn rebuild(&mut self, surface: &SurfaceInfo);

    /// Record this layer's secondary command buffer for one swapchain image.
    fn record_commands(
        &mut self,
        inheritance: &vk::CommandBufferInheritanceInfo,
        image_index: usize,
    );

    /// The secondary buffer recorded for an image, if the layer has content.
    fn command_buffer(&self, image_index: usize) -> Option<vk::CommandBuffer>;
}

struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    fn new(device: Device) -> Self {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = vk_check(
            unsafe { device.create_semaphore(&create_info, None) },
            "vkCreateSemaphore",
        );
        Self { device, semaphore }
    }

    fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    fn new(device: Device, signaled: bool) -> Self {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = vk_check(
            unsafe { device.create_fence(&create_info, None) },
            "vkCreateFence",
        );
        Self { device, fence }
    }

    fn wait(&self) {
        vk_check(
            unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) },
            "vkWaitForFences",
        );
    }

    fn reset(&self) {
        vk_check(
            unsafe { self.device.reset_fences(&[self.fence]) },
            "vkResetFences",
        );
    }

    fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Frame synchronization objects. Created once per window and kept across
/// surface rebuilds.
struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    fn new(device: Device) -> Self {
        Self {
            image_available: Semaphore::new(device.clone()),
            render_finished: Semaphore::new(device.clone()),
            in_flight: Fence::new(device, false),
        }
    }
}

/// Callback supplied by the presentation backend that creates a
/// `VkSurfaceKHR` for the given instance. Invoked at construction and again
/// on every rebuild.
pub type SurfaceFactory = Box<dyn Fn(vk::Instance) -> Result<vk::SurfaceKHR, String>>;

/// One presentation surface and everything rendered into it.
pub struct Window {
    ctx: Rc<DeviceContext>,
    surface_factory: SurfaceFactory,
    surface_loader: khr::Surface,
    swapchain_loader: khr::Swapchain,
    surface: vk::SurfaceKHR,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    requested_extent: vk::Extent2D,
    extent: vk::Extent2D,
    anti_aliasing: AntiAliasing,
    samples: vk::SampleCountFlags,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    image_count: u32,
    depth_target: Option<ImageView>,
    ms_color_target: Option<ImageView>,
    ms_depth_target: Option<ImageView>,
    render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
    commands: CommandStream,
    sync: FrameSync,
    layers: Vec<Rc<RefCell<dyn SurfaceLayer>>>,
    state: SurfaceState,
    frames_rendered: u64,
}

impl Window {
    /// Create the surface through `surface_factory` and bring up the full
    /// presentation stack for it.
    pub fn new(
        ctx: Rc<DeviceContext>,
        surface_factory: SurfaceFactory,
        width: u32,
        height: u32,
        anti_aliasing: AntiAliasing,
    ) -> Self {
        let surface_loader = khr::Surface::new(ctx.entry(), ctx.instance());
        let swapchain_loader = khr::Swapchain::new(ctx.instance(), ctx.device());
        let samples = Self::clamp_for_device(&ctx, anti_aliasing);

        let commands = CommandStream::new(&ctx, CommandRole::Primary);
        let sync = FrameSync::new(ctx.raw_device());

        let mut window = Self {
            ctx,
            surface_factory,
            surface_loader,
            swapchain_loader,
            surface: vk::SurfaceKHR::null(),
            surface_format: vk::SurfaceFormatKHR::default(),
            depth_format: vk::Format::D32_SFLOAT,
            requested_extent: vk::Extent2D { width, height },
            extent: vk::Extent2D::default(),
            anti_aliasing,
            samples,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            image_count: 0,
            depth_target: None,
            ms_color_target: None,
            ms_depth_target: None,
            render_pass: None,
            framebuffers: Vec::new(),
            commands,
            sync,
            layers: Vec::new(),
            state: SurfaceState::Degraded,
            frames_rendered: 0,
        };

        if is_renderable(window.requested_extent) {
            window.build_surface();
        }
        window
    }

    fn clamp_for_device(ctx: &DeviceContext, anti_aliasing: AntiAliasing) -> vk::SampleCountFlags {
        let limits = ctx.limits();
        let supported =
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        clamp_sample_count(supported, anti_aliasing.sample_count())
    }

    /// Create the surface and every resource derived from it. Leaves the
    /// window `Ready`, or `Degraded` if the surface reports a zero extent.
    fn build_surface(&mut self) {
        let surface = match (self.surface_factory)(self.ctx.instance_handle()) {
            Ok(surface) => surface,
            Err(e) => fatal(&format!("surface creation failed: {e}")),
        };
        self.surface = surface;

        let physical_device = self.ctx.physical_device();
        let supported = vk_check(
            unsafe {
                self.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    self.ctx.graphics_family(),
                    surface,
                )
            },
            "vkGetPhysicalDeviceSurfaceSupportKHR",
        );
        if !supported {
            fatal("graphics queue family cannot present to this surface");
        }

        let caps = vk_check(
            unsafe {
                self.surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
            },
            "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
        );

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: self.requested_extent.width.clamp(
                    caps.min_image_extent.width,
                    caps.max_image_extent.width,
                ),
                height: self.requested_extent.height.clamp(
                    caps.min_image_extent.height,
                    caps.max_image_extent.height,
                ),
            }
        };
        if !is_renderable(extent) {
            self.state = SurfaceState::Degraded;
            return;
        }
        self.extent = extent;

        let formats = vk_check(
            unsafe {
                self.surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
            },
            "vkGetPhysicalDeviceSurfaceFormatsKHR",
        );
        self.surface_format = choose_surface_format(&formats);

        let present_modes = vk_check(
            unsafe {
                self.surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
            },
            "vkGetPhysicalDeviceSurfacePresentModesKHR",
        );
        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        self.image_count = (caps.min_image_count + 1).min(if caps.max_image_count > 0 {
            caps.max_image_count
        } else {
            caps.min_image_count + 1
        });

        let swapchain_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        self.swapchain = vk_check(
            unsafe { self.swapchain_loader.create_swapchain(&swapchain_info, None) },
            "vkCreateSwapchainKHR",
        );

        self.images = vk_check(
            unsafe { self.swapchain_loader.get_swapchain_images(self.swapchain) },
            "vkGetSwapchainImagesKHR",
        );
        self.image_count = self.images.len() as u32;

        let device = self.ctx.device();
        self.image_views = self
            .images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                vk_check(
                    unsafe { device.create_image_view(&create_info, None) },
                    "vkCreateImageView (swapchain)",
                )
            })
            .collect();

        self.create_targets();
        self.render_pass = Some(RenderPass::forward(
            &self.ctx,
            self.samples,
            self.surface_format.format,
            self.depth_format,
        ));
        self.create_framebuffers();
        self.commands.allocate(self.image_count);
        self.state = SurfaceState::Ready;

        log::info!(
            "surface ready: {}x{} with {} images, {:?} samples",
            extent.width,
            extent.height,
            self.image_count,
            self.samples
        );
    }

    fn create_targets(&mut self) {
        let depth_spec = ImageSpec::basic(
            self.extent,
            self.depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        self.depth_target = Some(ImageView::new(
            &self.ctx,
            &depth_spec,
            vk::ImageViewType::TYPE_2D,
            vk::ImageAspectFlags::DEPTH,
        ));

        if self.samples != vk::SampleCountFlags::TYPE_1 {
            let color_spec = ImageSpec::basic(
                self.extent,
                self.surface_format.format,
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
            )
            .with_samples(self.samples);
            self.ms_color_target = Some(ImageView::new(
                &self.ctx,
                &color_spec,
                vk::ImageViewType::TYPE_2D,
                vk::ImageAspectFlags::COLOR,
            ));

            let ms_depth_spec = depth_spec.with_samples(self.samples);
            self.ms_depth_target = Some(ImageView::new(
                &self.ctx,
                &ms_depth_spec,
                vk::ImageViewType::TYPE_2D,
                vk::ImageAspectFlags::DEPTH,
            ));
        }
    }

    fn create_framebuffers(&mut self) {
        let render_pass = self
            .render_pass
            .as_ref()
            .map_or_else(|| fatal("framebuffers created before the render pass"), RenderPass::handle);
        let depth_view = self
            .depth_target
            .as_ref()
            .map_or_else(|| fatal("framebuffers created before the depth target"), ImageView::view);

        self.framebuffers = self
            .image_views
            .iter()
            .map(|&swapchain_view| {
                let attachments: Vec<vk::ImageView> =
                    if self.samples == vk::SampleCountFlags::TYPE_1 {
                        vec![swapchain_view, depth_view]
                    } else {
                        vec![
                            self.ms_color_target.as_ref().map(ImageView::view).unwrap_or_else(
                                || fatal("multisampled color target missing"),
                            ),
                            swapchain_view,
                            self.ms_depth_target.as_ref().map(ImageView::view).unwrap_or_else(
                                || fatal("multisampled depth target missing"),
                            ),
                            depth_view,
                        ]
                    };
                Framebuffer::new(&self.ctx, render_pass, &attachments, self.extent)
            })
            .collect();
    }

    /// Destroy surface-dependent resources in reverse creation order. Sync
    /// objects and the command pool survive.
    fn teardown_surface(&mut self) {
        self.commands.free_buffers();
        self.framebuffers.clear();
        self.render_pass = None;
        self.ms_depth_target = None;
        self.ms_color_target = None;
        self.depth_target = None;

        let device = self.ctx.device();
        for view in self.image_views.drain(..) {
            unsafe {
                device.destroy_image_view(view, None);
            }
        }
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }
        if self.surface != vk::SurfaceKHR::null() {
            unsafe {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            self.surface = vk::SurfaceKHR::null();
        }
    }

    /// Tear down and recreate everything derived from the surface, then
    /// rebuild every registered layer against the new surface.
    pub fn rebuild(&mut self) {
        self.state = SurfaceState::Rebuilding;
        self.ctx.wait_idle();
        self.teardown_surface();

        if !is_renderable(self.requested_extent) {
            log::info!("surface degraded: zero extent requested");
            self.state = SurfaceState::Degraded;
            return;
        }

        self.build_surface();
        if self.state != SurfaceState::Ready {
            return;
        }

        let info = self.surface_info();
        for layer in &self.layers {
            layer.borrow_mut().rebuild(&info);
        }
    }

    /// Request a new surface extent. A zero extent degrades the window until
    /// a usable size arrives.
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.rebuild();
    }

    /// Change the anti-aliasing mode. The requested sample count is clamped
    /// to what the device supports.
    pub fn set_anti_aliasing(&mut self, anti_aliasing: AntiAliasing) {
        self.anti_aliasing = anti_aliasing;
        self.samples = Self::clamp_for_device(&self.ctx, anti_aliasing);
        self.rebuild();
    }

    /// Register a layer. Layers are recorded in registration order, which is
    /// their compositing order.
    pub fn add_layer(&mut self, layer: Rc<RefCell<dyn SurfaceLayer>>) {
        self.layers.push(layer);
    }

    /// Remove a previously registered layer.
    pub fn remove_layer(&mut self, layer: &Rc<RefCell<dyn SurfaceLayer>>) {
        self.layers.retain(|existing| !Rc::ptr_eq(existing, layer));
    }

    /// Acquire, record, submit, and present one frame.
    ///
    /// A no-op while the surface is degraded. An out-of-date or suboptimal
    /// swapchain triggers a full rebuild; the next call draws normally.
    pub fn draw_frame(&mut self) {
        if self.state != SurfaceState::Ready {
            return;
        }

        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.sync.image_available.handle(),
                vk::Fence::null(),
            )
        };
        let (image_index, _) = match acquired {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.rebuild();
                return;
            }
            Err(code) => fatal(&format!("vkAcquireNextImageKHR failed: {code:?}")),
        };

        self.record_primary(image_index as usize);

        let wait_semaphores = [self.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.commands.buffer(image_index as usize)];
        let signal_semaphores = [self.sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        vk_check(
            unsafe {
                self.ctx.device().queue_submit(
                    self.ctx.graphics_queue(),
                    &[submit_info.build()],
                    self.sync.in_flight.handle(),
                )
            },
            "vkQueueSubmit",
        );
        self.sync.in_flight.wait();
        self.sync.in_flight.reset();

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.swapchain_loader
                .queue_present(self.ctx.graphics_queue(), &present_info)
        };
        match presented {
            Ok(false) => {
                self.frames_rendered += 1;
            }
            Ok(true) => {
                // Presented, but the swapchain no longer matches the surface.
                self.frames_rendered += 1;
                self.rebuild();
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.rebuild();
            }
            Err(code) => fatal(&format!("vkQueuePresentKHR failed: {code:?}")),
        }
    }

    fn record_primary(&mut self, image_index: usize) {
        let device = self.ctx.device();
        let cmd = self.commands.buffer(image_index);
        let render_pass = self
            .render_pass
            .as_ref()
            .map_or_else(|| fatal("recording without a render pass"), RenderPass::handle);
        let framebuffer = self.framebuffers[image_index].handle();

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        vk_check(
            unsafe { device.begin_command_buffer(cmd, &begin_info) },
            "vkBeginCommandBuffer (primary)",
        );

        let clear_values = forward_clear_values(self.samples);
        let pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.extent,
            })
            .clear_values(&clear_values);

        let inheritance = vk::CommandBufferInheritanceInfo::builder()
            .render_pass(render_pass)
            .subpass(0)
            .framebuffer(framebuffer)
            .build();

        unsafe {
            device.cmd_begin_render_pass(
                cmd,
                &pass_begin,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
        }

        let mut secondary = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut layer = layer.borrow_mut();
            layer.record_commands(&inheritance, image_index);
            if let Some(buffer) = layer.command_buffer(image_index) {
                secondary.push(buffer);
            }
        }
        if !secondary.is_empty() {
            unsafe {
                device.cmd_execute_commands(cmd, &secondary);
            }
        }

        unsafe {
            device.cmd_end_render_pass(cmd);
        }
        vk_check(
            unsafe { device.end_command_buffer(cmd) },
            "vkEndCommandBuffer (primary)",
        );
    }

    /// The surface snapshot layers build against. Only valid while `Ready`.
    pub fn surface_info(&self) -> SurfaceInfo {
        let render_pass = self
            .render_pass
            .as_ref()
            .map_or_else(|| fatal("surface_info requested while not ready"), RenderPass::handle);
        SurfaceInfo {
            render_pass,
            extent: self.extent,
            samples: self.samples,
            image_count: self.image_count,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Selected surface format.
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Effective sample count after device clamping.
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Number of swapchain images.
    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Frames fully submitted and presented since creation.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.ctx.wait_idle();
        self.teardown_surface();
        // commands and sync drop afterwards, before the device context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_setting_maps_to_its_sample_count() {
        let cases = [
            (AntiAliasing::None, vk::SampleCountFlags::TYPE_1),
            (AntiAliasing::Msaa2, vk::SampleCountFlags::TYPE_2),
            (AntiAliasing::Msaa4, vk::SampleCountFlags::TYPE_4),
            (AntiAliasing::Msaa8, vk::SampleCountFlags::TYPE_8),
            (AntiAliasing::Msaa16, vk::SampleCountFlags::TYPE_16),
            (AntiAliasing::Msaa32, vk::SampleCountFlags::TYPE_32),
            (AntiAliasing::Msaa64, vk::SampleCountFlags::TYPE_64),
        ];
        for (setting, expected) in cases {
            assert_eq!(setting.sample_count(), expected);
        }
    }

    #[test]
    fn unsupported_sample_counts_step_down() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;

        assert_eq!(
            clamp_sample_count(supported, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            clamp_sample_count(supported, vk::SampleCountFlags::TYPE_64),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            clamp_sample_count(supported, vk::SampleCountFlags::TYPE_8),
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    fn single_sample_requests_stay_single_sample() {
        let supported = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_8;
        assert_eq!(
            clamp_sample_count(supported, vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn srgb_bgra_is_preferred_when_offered() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn first_format_wins_without_an_srgb_offer() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn undefined_format_list_falls_back_to_bgra_unorm() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn pending_surface_snapshots_are_not_ready() {
        use ash::vk::Handle;

        assert!(!SurfaceInfo::pending().is_ready());

        let live = SurfaceInfo {
            render_pass: vk::RenderPass::from_raw(1),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            samples: vk::SampleCountFlags::TYPE_4,
            image_count: 3,
        };
        assert!(live.is_ready());
    }

    #[test]
    fn zero_extents_are_not_renderable() {
        assert!(!is_renderable(vk::Extent2D { width: 0, height: 600 }));
        assert!(!is_renderable(vk::Extent2D { width: 800, height: 0 }));
        assert!(!is_renderable(vk::Extent2D { width: 0, height: 0 }));
        assert!(is_renderable(vk::Extent2D { width: 1, height: 1 }));
    }
}
