use anyhow::Context;
use ash::vk::{
    CommandBuffer, CommandBufferAllocateInfo, CommandBufferBeginInfo, CommandBufferLevel,
    CommandBufferUsageFlags, CommandPool, Fence, Queue, SubmitInfo,
};
use ash::Device;

/// 一度だけ使うコマンドバッファを割り当てて記録を開始する。<br />
/// Allocates a one-time command buffer and begins recording.
pub fn get_single_time_command_buffer(
    device: &Device,
    command_pool: CommandPool,
) -> anyhow::Result<CommandBuffer> {
    let allocate_info = CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .command_buffer_count(1)
        .level(CommandBufferLevel::PRIMARY)
        .build();
    unsafe {
        let command_buffers = device
            .allocate_command_buffers(&allocate_info)
            .with_context(|| "Failed to allocate command buffer.")?;
        let buffer = command_buffers[0];
        let begin_info = CommandBufferBeginInfo::builder()
            .flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .build();
        device
            .begin_command_buffer(buffer, &begin_info)
            .with_context(|| "Failed to begin command buffer.")?;
        Ok(buffer)
    }
}

/// 記録を終了し、提出してキューの完了を待ち、コマンドバッファを解放する。<br />
/// Ends recording, submits, waits for the queue and frees the command buffer.
pub fn end_one_time_command_buffer(
    cmd_buffer: CommandBuffer,
    device: &Device,
    command_pool: CommandPool,
    graphics_queue: Queue,
) -> anyhow::Result<()> {
    unsafe {
        device
            .end_command_buffer(cmd_buffer)
            .with_context(|| "Failed to end command buffer.")?;
        let command_buffers = [cmd_buffer];
        let submit_info = SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();
        device
            .queue_submit(graphics_queue, &[submit_info], Fence::null())
            .with_context(|| "Failed to submit the queue.")?;
        device
            .queue_wait_idle(graphics_queue)
            .with_context(|| "Failed to wait for queue.")?;
        device.free_command_buffers(command_pool, &command_buffers);
    }
    Ok(())
}

/// RGBの画素をRGBAに展開する。アルファは不透明になる。<br />
/// Expands RGB pixels to RGBA with an opaque alpha.
pub fn expand_to_rgba(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba_pixels = Vec::with_capacity(pixel_count * 4);
    for rgb in pixels.chunks_exact(3).take(pixel_count) {
        rgba_pixels.extend_from_slice(rgb);
        rgba_pixels.push(u8::MAX);
    }
    rgba_pixels
}

/// 完全なミップチェーンのレベル数。<br />
/// Number of levels in a full mip chain.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - largest.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_is_floor_log2_plus_one() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 17), 9);
        assert_eq!(mip_level_count(1024, 512), 11);
        for size in 1..2048_u32 {
            let mut levels = 1;
            let mut extent = size;
            while extent > 1 {
                extent /= 2;
                levels += 1;
            }
            assert_eq!(mip_level_count(size, 1), levels, "size {}", size);
        }
    }

    #[test]
    fn rgb_pixels_get_opaque_alpha() {
        let rgb = [10, 20, 30, 40, 50, 60];
        let rgba = expand_to_rgba(&rgb, 2, 1);
        assert_eq!(rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }
}
