use anyhow::Context;
use ash::vk::*;
use std::sync::Weak;
use vk_mem::{Alloc, Allocation, AllocationCreateInfo, Allocator, MemoryUsage};

use crate::framework::graphics::vk::Buffer;
use crate::framework::shared::traits::Disposable;
use crate::framework::shared::util::{end_one_time_command_buffer, get_single_time_command_buffer};

/// サンプラーの最大異方性。<br />
/// Maximum anisotropy of texture samplers.
pub const MAX_ANISOTROPY: f32 = 8.0;

pub struct Image {
    pub image: ash::vk::Image,
    pub image_view: ImageView,
    pub sampler: Sampler,
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    logical_device: Weak<ash::Device>,
    is_disposed: bool,
    allocator: Weak<Allocator>,
    /// スワップチェーンの画像は配置を持たない。<br />
    /// Swapchain images carry no allocation.
    allocation: Option<Allocation>,
}

impl Image {
    pub fn new(
        device: Weak<ash::Device>,
        usage_flag: ImageUsageFlags,
        format: Format,
        extent: Extent2D,
        mip_levels: u32,
        aspect_flags: ImageAspectFlags,
        allocator: Weak<Allocator>,
    ) -> anyhow::Result<Self> {
        let image_extent = Extent3D::builder()
            .height(extent.height)
            .width(extent.width)
            .depth(1)
            .build();
        let create_info = ImageCreateInfo::builder()
            .usage(usage_flag)
            .sharing_mode(SharingMode::EXCLUSIVE)
            .format(format)
            .extent(image_extent)
            .array_layers(1)
            .image_type(ImageType::TYPE_2D)
            .initial_layout(ImageLayout::UNDEFINED)
            .mip_levels(mip_levels)
            .samples(SampleCountFlags::TYPE_1)
            .tiling(ImageTiling::OPTIMAL)
            .build();

        let allocation_info = AllocationCreateInfo {
            usage: MemoryUsage::AutoPreferDevice,
            required_flags: MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };
        let arc = allocator
            .upgrade()
            .with_context(|| "Failed to upgrade allocator handle.")?;
        let (image, allocation) = unsafe {
            arc.create_image(&create_info, &allocation_info)
                .with_context(|| "Failed to create image using the VMA allocator.")?
        };
        drop(arc);
        let mut image = Image {
            image,
            image_view: ImageView::null(),
            sampler: Sampler::null(),
            format,
            width: extent.width,
            height: extent.height,
            mip_levels,
            logical_device: device,
            is_disposed: false,
            allocator,
            allocation: Some(allocation),
        };
        image.create_image_view(aspect_flags)?;
        Ok(image)
    }

    /// スワップチェーンが所有する画像をラップする。ビューだけを破棄する。<br />
    /// Wraps an image owned by the swapchain. Only the view is destroyed.
    pub fn from_image(
        image: ash::vk::Image,
        device: Weak<ash::Device>,
        format: Format,
        extent: Extent2D,
        aspect_flags: ImageAspectFlags,
    ) -> anyhow::Result<Self> {
        let mut image = Image {
            image,
            image_view: ImageView::null(),
            sampler: Sampler::null(),
            format,
            width: extent.width,
            height: extent.height,
            mip_levels: 1,
            logical_device: device,
            is_disposed: false,
            allocator: Weak::new(),
            allocation: None,
        };
        image.create_image_view(aspect_flags)?;
        Ok(image)
    }

    /// 画像レイアウトを遷移させる。`base_mip_level`から`level_count`個のレベルが対象。<br />
    /// Transitions the image layout for `level_count` levels starting at `base_mip_level`.
    pub fn transition_layout(
        &self,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        command_pool: CommandPool,
        graphics_queue: Queue,
        aspect_flags: ImageAspectFlags,
        base_mip_level: u32,
        level_count: u32,
        command_buffer: Option<CommandBuffer>,
    ) -> anyhow::Result<()> {
        let mut barrier = ImageMemoryBarrier::builder()
            .image(self.image)
            .subresource_range(
                ImageSubresourceRange::builder()
                    .level_count(level_count)
                    .layer_count(1)
                    .base_mip_level(base_mip_level)
                    .base_array_layer(0)
                    .aspect_mask(aspect_flags)
                    .build(),
            )
            .dst_queue_family_index(QUEUE_FAMILY_IGNORED)
            .src_queue_family_index(QUEUE_FAMILY_IGNORED)
            .old_layout(old_layout)
            .new_layout(new_layout);

        let (old_stage, new_stage) = match (old_layout, new_layout) {
            (ImageLayout::UNDEFINED, ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
                barrier = barrier.dst_access_mask(
                    AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                );
                (
                    PipelineStageFlags::TOP_OF_PIPE,
                    PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
            }
            (ImageLayout::UNDEFINED, ImageLayout::TRANSFER_DST_OPTIMAL) => {
                barrier = barrier.dst_access_mask(AccessFlags::TRANSFER_WRITE);
                (PipelineStageFlags::TOP_OF_PIPE, PipelineStageFlags::TRANSFER)
            }
            (ImageLayout::TRANSFER_DST_OPTIMAL, ImageLayout::TRANSFER_SRC_OPTIMAL) => {
                barrier = barrier
                    .src_access_mask(AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(AccessFlags::TRANSFER_READ);
                (PipelineStageFlags::TRANSFER, PipelineStageFlags::TRANSFER)
            }
            (ImageLayout::TRANSFER_DST_OPTIMAL, ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
                barrier = barrier
                    .src_access_mask(AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(AccessFlags::SHADER_READ);
                (
                    PipelineStageFlags::TRANSFER,
                    PipelineStageFlags::FRAGMENT_SHADER,
                )
            }
            (ImageLayout::TRANSFER_SRC_OPTIMAL, ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
                barrier = barrier
                    .src_access_mask(AccessFlags::TRANSFER_READ)
                    .dst_access_mask(AccessFlags::SHADER_READ);
                (
                    PipelineStageFlags::TRANSFER,
                    PipelineStageFlags::FRAGMENT_SHADER,
                )
            }
            (_, _) => (
                PipelineStageFlags::ALL_COMMANDS,
                PipelineStageFlags::ALL_COMMANDS,
            ),
        };

        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        let cmd_buffer = match command_buffer {
            Some(buffer) => buffer,
            None => get_single_time_command_buffer(device.as_ref(), command_pool)?,
        };
        unsafe {
            device.cmd_pipeline_barrier(
                cmd_buffer,
                old_stage,
                new_stage,
                DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
        if command_buffer.is_none() {
            end_one_time_command_buffer(cmd_buffer, device.as_ref(), command_pool, graphics_queue)?;
        }
        Ok(())
    }

    /// テクスチャ用のサンプラーを作成する。<br />
    /// Creates the texture sampler.
    pub fn create_sampler(&mut self, anisotropy_enabled: bool) -> anyhow::Result<()> {
        let create_info = SamplerCreateInfo::builder()
            .address_mode_u(SamplerAddressMode::MIRRORED_REPEAT)
            .address_mode_v(SamplerAddressMode::MIRRORED_REPEAT)
            .address_mode_w(SamplerAddressMode::MIRRORED_REPEAT)
            .anisotropy_enable(anisotropy_enabled)
            .max_anisotropy(if anisotropy_enabled { MAX_ANISOTROPY } else { 1.0 })
            .border_color(BorderColor::FLOAT_OPAQUE_WHITE)
            .compare_enable(false)
            .compare_op(CompareOp::NEVER)
            .mag_filter(Filter::LINEAR)
            .min_filter(Filter::LINEAR)
            .mipmap_mode(SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(self.mip_levels as f32)
            .mip_lod_bias(0.0)
            .unnormalized_coordinates(false)
            .build();
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        self.sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .with_context(|| "Failed to create sampler.")?
        };
        Ok(())
    }

    pub fn descriptor(&self) -> DescriptorImageInfo {
        DescriptorImageInfo::builder()
            .image_layout(ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(self.image_view)
            .sampler(self.sampler)
            .build()
    }

    pub fn copy_buffer_to_image(
        &self,
        source_buffer: &Buffer,
        regions: &[BufferImageCopy],
        command_pool: CommandPool,
        graphics_queue: Queue,
        command_buffer: Option<CommandBuffer>,
    ) -> anyhow::Result<()> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        let cmd_buffer = match command_buffer {
            Some(buffer) => buffer,
            None => get_single_time_command_buffer(device.as_ref(), command_pool)?,
        };
        unsafe {
            device.cmd_copy_buffer_to_image(
                cmd_buffer,
                source_buffer.buffer,
                self.image,
                ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            );
        }
        if command_buffer.is_none() {
            end_one_time_command_buffer(cmd_buffer, device.as_ref(), command_pool, graphics_queue)?;
        }
        Ok(())
    }

    /// 基本レベルから線形ブリットでミップチェーンを生成する。<br />
    /// 基本レベルは`TRANSFER_DST_OPTIMAL`であること。最後は全レベルが`SHADER_READ_ONLY_OPTIMAL`になる。<br />
    /// Generates the mip chain from the base level with linear blits.<br />
    /// The base level must be in `TRANSFER_DST_OPTIMAL`; all levels end in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn generate_mipmap(
        &self,
        command_pool: CommandPool,
        graphics_queue: Queue,
        command_buffer: Option<CommandBuffer>,
    ) -> anyhow::Result<()> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        let cmd_buffer = match command_buffer {
            Some(buffer) => buffer,
            None => get_single_time_command_buffer(device.as_ref(), command_pool)?,
        };
        let aspect = ImageAspectFlags::COLOR;

        self.transition_layout(
            ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::TRANSFER_SRC_OPTIMAL,
            command_pool,
            graphics_queue,
            aspect,
            0,
            1,
            Some(cmd_buffer),
        )?;

        for i in 1..self.mip_levels {
            let image_blit = ImageBlit::builder()
                .src_subresource(
                    ImageSubresourceLayers::builder()
                        .aspect_mask(aspect)
                        .layer_count(1)
                        .mip_level(i - 1)
                        .build(),
                )
                .src_offsets([
                    Offset3D::default(),
                    Offset3D {
                        x: (self.width >> (i - 1)).max(1) as i32,
                        y: (self.height >> (i - 1)).max(1) as i32,
                        z: 1,
                    },
                ])
                .dst_subresource(
                    ImageSubresourceLayers::builder()
                        .aspect_mask(aspect)
                        .layer_count(1)
                        .mip_level(i)
                        .build(),
                )
                .dst_offsets([
                    Offset3D::default(),
                    Offset3D {
                        x: (self.width >> i).max(1) as i32,
                        y: (self.height >> i).max(1) as i32,
                        z: 1,
                    },
                ])
                .build();

            self.transition_layout(
                ImageLayout::UNDEFINED,
                ImageLayout::TRANSFER_DST_OPTIMAL,
                command_pool,
                graphics_queue,
                aspect,
                i,
                1,
                Some(cmd_buffer),
            )?;
            unsafe {
                device.cmd_blit_image(
                    cmd_buffer,
                    self.image,
                    ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[image_blit],
                    Filter::LINEAR,
                );
            }
            self.transition_layout(
                ImageLayout::TRANSFER_DST_OPTIMAL,
                ImageLayout::TRANSFER_SRC_OPTIMAL,
                command_pool,
                graphics_queue,
                aspect,
                i,
                1,
                Some(cmd_buffer),
            )?;
        }

        self.transition_layout(
            ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            command_pool,
            graphics_queue,
            aspect,
            0,
            self.mip_levels,
            Some(cmd_buffer),
        )?;

        if command_buffer.is_none() {
            end_one_time_command_buffer(cmd_buffer, device.as_ref(), command_pool, graphics_queue)?;
        }
        Ok(())
    }

    fn create_image_view(&mut self, aspect_flags: ImageAspectFlags) -> anyhow::Result<()> {
        let create_info = ImageViewCreateInfo::builder()
            .image(self.image)
            .format(self.format)
            .components(
                ComponentMapping::builder()
                    .r(ComponentSwizzle::IDENTITY)
                    .g(ComponentSwizzle::IDENTITY)
                    .b(ComponentSwizzle::IDENTITY)
                    .a(ComponentSwizzle::IDENTITY)
                    .build(),
            )
            .subresource_range(
                ImageSubresourceRange::builder()
                    .aspect_mask(aspect_flags)
                    .base_array_layer(0)
                    .base_mip_level(0)
                    .layer_count(1)
                    .level_count(self.mip_levels)
                    .build(),
            )
            .view_type(ImageViewType::TYPE_2D)
            .build();
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        self.image_view = unsafe {
            device
                .create_image_view(&create_info, None)
                .with_context(|| "Failed to create image view.")?
        };
        Ok(())
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if !self.is_disposed {
            self.dispose();
        }
    }
}

impl Disposable for Image {
    fn dispose(&mut self) {
        if self.is_disposed {
            return;
        }
        if let Some(device) = self.logical_device.upgrade() {
            unsafe {
                if self.sampler != Sampler::null() {
                    device.destroy_sampler(self.sampler, None);
                }
                if self.image_view != ImageView::null() {
                    device.destroy_image_view(self.image_view, None);
                }
            }
        }
        if let Some(mut allocation) = self.allocation.take() {
            match self.allocator.upgrade() {
                Some(allocator) => unsafe {
                    allocator.destroy_image(self.image, &mut allocation);
                },
                None => log::warn!("Allocator was dropped before the image."),
            }
        }
        self.is_disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.is_disposed
    }
}
