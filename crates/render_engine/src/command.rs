//! Command pool and buffer management.
//!
//! A [`CommandStream`] bundles one command pool with the buffers allocated
//! from it, tagged with the level they record at. The presentation surface
//! owns a primary stream; each draw layer owns a secondary one.

use ash::{vk, Device};

use crate::device::DeviceContext;
use crate::error::vk_check;

/// The level a command stream records at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandRole {
    /// Primary buffers, submitted directly to the queue.
    Primary,
    /// Secondary buffers, executed from within a primary render pass.
    Secondary,
}

impl CommandRole {
    fn level(self) -> vk::CommandBufferLevel {
        match self {
            CommandRole::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandRole::Secondary => vk::CommandBufferLevel::SECONDARY,
        }
    }
}

/// A command pool plus the buffers currently allocated from it.
pub struct CommandStream {
    device: Device,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    role: CommandRole,
}

impl CommandStream {
    /// Create an empty stream on the graphics queue family.
    pub fn new(ctx: &DeviceContext, role: CommandRole) -> Self {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.graphics_family());

        let device = ctx.raw_device();
        let pool = vk_check(
            unsafe { device.create_command_pool(&create_info, None) },
            "vkCreateCommandPool",
        );

        Self {
            device,
            pool,
            buffers: Vec::new(),
            role,
        }
    }

    /// Allocate `count` buffers at this stream's level, replacing any
    /// previously allocated ones.
    pub fn allocate(&mut self, count: u32) {
        self.free_buffers();
        if count == 0 {
            return;
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(self.role.level())
            .command_buffer_count(count);

        self.buffers = vk_check(
            unsafe { self.device.allocate_command_buffers(&alloc_info) },
            "vkAllocateCommandBuffers",
        );
    }

    /// Return all buffers to the pool.
    pub fn free_buffers(&mut self) {
        if !self.buffers.is_empty() {
            unsafe {
                self.device.free_command_buffers(self.pool, &self.buffers);
            }
            self.buffers.clear();
        }
    }

    /// The buffer recorded for a given swapchain image.
    pub fn buffer(&self, index: usize) -> vk::CommandBuffer {
        self.buffers[index]
    }

    /// Whether any buffers are currently allocated.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// The backing pool, for one-off allocations such as staging copies.
    pub fn pool(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        self.free_buffers();
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Begin a one-shot command buffer for a transfer or transition.
pub fn begin_single_time(device: &Device, pool: vk::CommandPool) -> vk::CommandBuffer {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffer = vk_check(
        unsafe { device.allocate_command_buffers(&alloc_info) },
        "vkAllocateCommandBuffers (single-time)",
    )[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    vk_check(
        unsafe { device.begin_command_buffer(buffer, &begin_info) },
        "vkBeginCommandBuffer (single-time)",
    );

    buffer
}

/// Submit a one-shot command buffer, wait for it, and free it.
pub fn end_single_time(
    device: &Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
) {
    vk_check(
        unsafe { device.end_command_buffer(buffer) },
        "vkEndCommandBuffer (single-time)",
    );

    let buffers = [buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
    vk_check(
        unsafe { device.queue_submit(queue, &[submit_info.build()], vk::Fence::null()) },
        "vkQueueSubmit (single-time)",
    );
    vk_check(unsafe { device.queue_wait_idle(queue) }, "vkQueueWaitIdle");

    unsafe {
        device.free_command_buffers(pool, &buffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_buffer_levels() {
        assert_eq!(
            CommandRole::Primary.level(),
            vk::CommandBufferLevel::PRIMARY
        );
        assert_eq!(
            CommandRole::Secondary.level(),
            vk::CommandBufferLevel::SECONDARY
        );
    }
}
