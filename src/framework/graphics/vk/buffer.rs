use anyhow::Context;
use ash::{
    vk::{
        BufferCopy, BufferCreateInfo, BufferUsageFlags, CommandBuffer, CommandPool,
        DescriptorBufferInfo, DeviceSize, MemoryPropertyFlags, Queue, SharingMode,
    },
    Device,
};
use std::sync::{Arc, Weak};
use vk_mem::{Alloc, Allocation, AllocationCreateFlags, AllocationCreateInfo, Allocator, MemoryUsage};

use crate::framework::shared::traits::{Disposable, Mappable};
use crate::framework::shared::util::{end_one_time_command_buffer, get_single_time_command_buffer};

/// Vulkanのバッファをラップする。<br />
/// Wraps Vulkan buffer.
pub struct Buffer {
    /// 生のVulkanバッファ。<br />
    /// Raw Vulkan buffer.
    pub buffer: ash::vk::Buffer,

    /// 常にマップしているメモリー。ホストから見えないバッファではヌル。<br />
    /// Persistently mapped memory. Null for buffers invisible to the host.
    pub mapped_memory: *mut u8,

    /// バッファのサイズ。<br />
    /// Buffer size.
    pub buffer_size: DeviceSize,

    is_disposed: bool,

    /// ロジカルデバイスのハンドル。<br />
    /// Handle to the logical device.
    logical_device: Weak<Device>,

    /// VMAメモリー配置器のWeakポインタ。<br />
    /// VMA memory allocator's weak pointer.
    allocator: Weak<Allocator>,

    allocation: Allocation,
}

impl Buffer {
    ///　コンストラクター。<br />
    /// `HOST_VISIBLE`を要求したバッファは作成時にマップされる。<br />
    /// Constructor.<br />
    /// Buffers requesting `HOST_VISIBLE` are mapped on creation.
    pub fn new(
        device: Weak<Device>,
        buffer_size: DeviceSize,
        usage_flag: BufferUsageFlags,
        memory_properties: MemoryPropertyFlags,
        allocator: Weak<Allocator>,
    ) -> anyhow::Result<Self> {
        let create_info = BufferCreateInfo::builder()
            .sharing_mode(SharingMode::EXCLUSIVE)
            .size(buffer_size)
            .usage(usage_flag)
            .build();
        let host_visible = memory_properties.contains(MemoryPropertyFlags::HOST_VISIBLE);
        let allocation_info = AllocationCreateInfo {
            usage: if host_visible {
                MemoryUsage::AutoPreferHost
            } else {
                MemoryUsage::AutoPreferDevice
            },
            flags: if host_visible {
                AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE
            } else {
                AllocationCreateFlags::empty()
            },
            required_flags: memory_properties,
            ..Default::default()
        };
        let arc = allocator
            .upgrade()
            .with_context(|| "Failed to upgrade allocator handle.")?;
        let (buffer, allocation) = unsafe {
            arc.create_buffer(&create_info, &allocation_info)
                .with_context(|| "Failed to create buffer from VMA allocator.")?
        };
        drop(arc);
        let mut result = Buffer {
            buffer,
            mapped_memory: std::ptr::null_mut(),
            buffer_size,
            is_disposed: false,
            logical_device: device,
            allocator,
            allocation,
        };
        if host_visible {
            result.map_memory()?;
        }
        Ok(result)
    }

    /// ホストから見えるバッファを作成し、データを書き込む。<br />
    /// Creates a host-visible buffer and writes the data into it.
    pub fn with_data<T: bytemuck::Pod>(
        device: Weak<Device>,
        usage_flag: BufferUsageFlags,
        data: &[T],
        allocator: Weak<Allocator>,
    ) -> anyhow::Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(
            device,
            bytes.len() as DeviceSize,
            usage_flag,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            allocator,
        )?;
        buffer.write(data, 0)?;
        Ok(buffer)
    }

    /// マップされたメモリーにデータを書き込む。<br />
    /// Writes data into the mapped memory.
    pub fn write<T: bytemuck::Pod>(&mut self, data: &[T], offset: usize) -> anyhow::Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if self.mapped_memory.is_null() {
            return Err(anyhow::anyhow!("Buffer is not mapped."));
        }
        if offset + bytes.len() > self.buffer_size as usize {
            return Err(anyhow::anyhow!(
                "Write of {} bytes at offset {} exceeds buffer size {}.",
                bytes.len(),
                offset,
                self.buffer_size
            ));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped_memory.add(offset), bytes.len());
        }
        Ok(())
    }

    pub fn descriptor(&self) -> DescriptorBufferInfo {
        DescriptorBufferInfo::builder()
            .buffer(self.buffer)
            .offset(0)
            .range(self.buffer_size)
            .build()
    }

    /// バッファ元からこのバッファにコピーする。<br />
    /// Copy buffer from another buffer.
    pub fn copy_buffer(
        &self,
        src_buffer: &Buffer,
        buffer_size: DeviceSize,
        command_pool: CommandPool,
        graphics_queue: Queue,
        command_buffer: Option<CommandBuffer>,
    ) -> anyhow::Result<()> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        let copy_info = BufferCopy::builder()
            .src_offset(0)
            .size(buffer_size)
            .dst_offset(0)
            .build();
        let cmd_buffer = match command_buffer {
            Some(buffer) => buffer,
            None => get_single_time_command_buffer(device.as_ref(), command_pool)?,
        };
        unsafe {
            device.cmd_copy_buffer(cmd_buffer, src_buffer.buffer, self.buffer, &[copy_info]);
        }
        if command_buffer.is_none() {
            end_one_time_command_buffer(cmd_buffer, device.as_ref(), command_pool, graphics_queue)?;
        }
        Ok(())
    }

    fn with_allocator<F: FnOnce(&Arc<Allocator>, &mut Allocation)>(&mut self, f: F) {
        match self.allocator.upgrade() {
            Some(allocator) => f(&allocator, &mut self.allocation),
            None => log::warn!("Allocator was dropped before the buffer."),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if !self.is_disposed {
            self.dispose();
        }
    }
}

impl Disposable for Buffer {
    fn dispose(&mut self) {
        if self.is_disposed {
            return;
        }
        if !self.mapped_memory.is_null() {
            self.unmap_memory();
        }
        let buffer = self.buffer;
        self.with_allocator(|allocator, allocation| unsafe {
            allocator.destroy_buffer(buffer, allocation);
        });
        self.is_disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.is_disposed
    }
}

impl Mappable for Buffer {
    fn map_memory(&mut self) -> anyhow::Result<*mut u8> {
        if self.mapped_memory.is_null() {
            let allocator = self
                .allocator
                .upgrade()
                .with_context(|| "Failed to upgrade allocator handle.")?;
            self.mapped_memory = unsafe {
                allocator
                    .map_memory(&mut self.allocation)
                    .with_context(|| "Failed to map device memory.")?
            };
        }
        Ok(self.mapped_memory)
    }

    fn unmap_memory(&mut self) {
        if self.mapped_memory.is_null() {
            return;
        }
        self.with_allocator(|allocator, allocation| unsafe {
            allocator.unmap_memory(allocation);
        });
        self.mapped_memory = std::ptr::null_mut();
    }
}
