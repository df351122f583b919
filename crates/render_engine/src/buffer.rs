//! GPU buffer management: allocation, mapped writes, and staged uploads.

use ash::{vk, Device};

use crate::command::{begin_single_time, end_single_time};
use crate::device::DeviceContext;
use crate::error::{fatal, vk_check};

/// Find a memory type satisfying both the resource's requirements and the
/// requested property flags.
pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// A buffer with its backing allocation, released on drop.
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Allocate a buffer with the given usage and memory properties.
    pub fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Self {
        let device = ctx.raw_device();

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = vk_check(
            unsafe { device.create_buffer(&create_info, None) },
            "vkCreateBuffer",
        );

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let Some(memory_type) = find_memory_type(
            ctx.memory_properties(),
            requirements.memory_type_bits,
            properties,
        ) else {
            fatal("no memory type satisfies buffer allocation requirements");
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = vk_check(
            unsafe { device.allocate_memory(&alloc_info, None) },
            "vkAllocateMemory (buffer)",
        );
        vk_check(
            unsafe { device.bind_buffer_memory(buffer, memory, 0) },
            "vkBindBufferMemory",
        );

        Self {
            device,
            buffer,
            memory,
            size,
        }
    }

    /// Allocate a device-local buffer and upload `data` through a staging
    /// buffer on the given pool.
    pub fn device_local(
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Self {
        let size = data.len() as vk::DeviceSize;

        let staging = Buffer::new(
            ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        staging.write(data, 0);

        let buffer = Buffer::new(
            ctx,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );

        let device = ctx.device();
        let cmd = begin_single_time(device, pool);
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
        }
        end_single_time(device, ctx.graphics_queue(), pool, cmd);

        buffer
    }

    /// Write `data` into a host-visible buffer at `offset`.
    pub fn write(&self, data: &[u8], offset: vk::DeviceSize) {
        let mapped = vk_check(
            unsafe {
                self.device.map_memory(
                    self.memory,
                    offset,
                    data.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
            },
            "vkMapMemory",
        );
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
    }

    /// The buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Allocated size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_memory_properties() -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;
        props
    }

    #[test]
    fn memory_type_respects_filter_and_flags() {
        let props = fake_memory_properties();

        // All types allowed, want host-visible + coherent: first match is 1.
        assert_eq!(
            find_memory_type(
                &props,
                0b111,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            Some(1)
        );

        // Type 1 masked out: falls through to type 2.
        assert_eq!(
            find_memory_type(
                &props,
                0b101,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            Some(2)
        );
    }

    #[test]
    fn memory_type_misses_report_none() {
        let props = fake_memory_properties();
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::LAZILY_ALLOCATED),
            None
        );
        assert_eq!(
            find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }
}
