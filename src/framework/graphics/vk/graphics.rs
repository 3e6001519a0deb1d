use anyhow::Context;
use ash::{
    extensions::{ext::DebugUtils, khr::Surface},
    vk::*,
    Device, Entry, Instance,
};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::{Arc, Weak};
use vk_mem::Allocator;

use crate::framework::graphics::vk::{
    DescriptorAllocator, DescriptorLayoutCache, FrameStatus, Image, Initializer, PhysicalDevice,
    Pipeline, Shader, Swapchain,
};
use crate::framework::shared::enums::CameraType;
use crate::framework::shared::structs::Settings;
use crate::framework::shared::traits::UIOverlay;
use crate::framework::shared::Camera;

/// フェンスの既定のタイムアウト（ナノ秒）。<br />
/// Default fence timeout in nanoseconds.
pub const DEFAULT_FENCE_TIMEOUT: u64 = 100_000_000_000;

/// 既定のクリアカラー。<br />
/// Default clear color.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.025, 0.025, 0.025, 1.0];

/// 転送に必要なハンドルの束。テクスチャとモデルの読み込みで使う。<br />
/// Bundle of handles needed for uploads. Used when loading textures and models.
pub struct UploadContext<'a> {
    pub instance: &'a Instance,
    pub physical_device: ash::vk::PhysicalDevice,
    pub device: &'a Arc<Device>,
    pub allocator: Weak<Allocator>,
    pub command_pool: CommandPool,
    pub graphics_queue: Queue,
    pub anisotropy_enabled: bool,
}

/// Vulkanベース描画のコア。デバイスレベルの資源を全て所有する。<br />
/// The core of Vulkan-based rendering. Owns every device-level resource.
pub struct Graphics {
    pub title: String,
    pub settings: Settings,
    pub width: u32,
    pub height: u32,
    pub camera: Camera,
    pub clear_color: [f32; 4],

    /// 外部のデバッグオーバーレイ。<br />
    /// External debug overlay.
    pub overlay: Option<Box<dyn UIOverlay>>,

    pub physical_device: PhysicalDevice,
    pub enabled_features: PhysicalDeviceFeatures,

    /// ロジカルデバイス。<br />
    /// ロジカルデバイスは全ての描画のコアである。<br />
    /// Logical device.<br />
    /// A logical device is the core of all rendering.
    pub logical_device: Arc<Device>,
    pub graphics_queue: Queue,
    pub present_queue: Queue,
    pub depth_format: Format,

    /// スワップチェーンの画像の取得を知らせるセマフォ。<br />
    /// Signals that the swapchain image has been acquired.
    pub present_complete: Semaphore,

    /// コマンドバッファの実行完了を知らせるセマフォ。<br />
    /// Signals that the command buffer finished executing.
    pub render_complete: Semaphore,

    pub command_pool: CommandPool,
    pub draw_cmd_buffers: Vec<CommandBuffer>,
    pub wait_fences: Vec<Fence>,
    pub render_pass: RenderPass,
    pub pipeline_cache: PipelineCache,
    pub frame_buffers: Vec<Framebuffer>,
    pub current_buffer: u32,
    /// 取得か提示でスワップチェーンが古くなったと分かった。<br />
    /// Set when acquire or present found the swapchain out of date.
    pub resize_requested: bool,
    /// 前のフレームにかかった秒数。レンダラーのフックから読む。<br />
    /// Seconds taken by the last frame. Read by the renderer hooks.
    pub frame_timer: f32,
    pub paused: bool,

    pub descriptor_allocator: ManuallyDrop<DescriptorAllocator>,
    pub layout_cache: ManuallyDrop<DescriptorLayoutCache>,

    swapchain: Option<Swapchain>,
    depth_stencil: Option<Image>,
    shader_modules: Vec<Shader>,
    allocator: ManuallyDrop<Arc<Allocator>>,
    surface_loader: Surface,
    surface: SurfaceKHR,
    debug_messenger: Option<(DebugUtils, DebugUtilsMessengerEXT)>,
    instance: Instance,
    _entry: Entry,
}

impl Graphics {
    /// インスタンス、デバイス、キュー、配置器とセマフォを作る。<br />
    /// `features_hook`は利用できる機能から有効にする機能を選ぶ。<br />
    /// Creates the instance, device, queues, allocator and semaphores.<br />
    /// `features_hook` selects the enabled features out of the available ones.
    pub fn init_vulkan<W, F>(
        window: &W,
        title: &str,
        width: u32,
        height: u32,
        settings: Settings,
        features_hook: F,
    ) -> anyhow::Result<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
        F: FnOnce(&PhysicalDeviceFeatures) -> PhysicalDeviceFeatures,
    {
        let entry = unsafe { Entry::load().with_context(|| "Failed to load the Vulkan library.")? };
        let enabled_layers: Vec<CString> =
            Initializer::get_validation_layers(&entry, settings.validation)?;
        let display_handle = window.raw_display_handle();
        let instance = Initializer::create_instance(title, &enabled_layers, &entry, display_handle)?;

        let debug_messenger = if enabled_layers.is_empty() {
            None
        } else {
            let loader = DebugUtils::new(&entry, &instance);
            let messenger = Initializer::create_debug_messenger(&loader)?;
            Some((loader, messenger))
        };

        let surface_loader = Surface::new(&entry, &instance);
        let surface =
            Initializer::create_surface(&entry, &instance, display_handle, window.raw_window_handle())?;
        let physical_device = PhysicalDevice::new(&instance, &surface_loader, surface)?;
        let enabled_features = features_hook(&physical_device.features);

        let (device, graphics_queue, present_queue) = Initializer::create_logical_device(
            &instance,
            &physical_device,
            &enabled_features,
            &enabled_layers,
        )?;
        let allocator = Initializer::create_allocator(&instance, &device, &physical_device)?;
        let depth_format = Initializer::get_depth_format(&instance, &physical_device)?;
        let present_complete = Initializer::create_semaphore(&device)?;
        let render_complete = Initializer::create_semaphore(&device)?;

        let logical_device = Arc::new(device);
        let descriptor_allocator = DescriptorAllocator::new(Arc::downgrade(&logical_device));
        let layout_cache = DescriptorLayoutCache::new(Arc::downgrade(&logical_device));

        let mut camera = Camera::new(CameraType::LookAt);
        camera.update_aspect_ratio(width as f32 / height.max(1) as f32);

        Ok(Graphics {
            title: title.to_string(),
            settings,
            width,
            height,
            camera,
            clear_color: DEFAULT_CLEAR_COLOR,
            overlay: None,
            physical_device,
            enabled_features,
            logical_device,
            graphics_queue,
            present_queue,
            depth_format,
            present_complete,
            render_complete,
            command_pool: CommandPool::null(),
            draw_cmd_buffers: vec![],
            wait_fences: vec![],
            render_pass: RenderPass::null(),
            pipeline_cache: PipelineCache::null(),
            frame_buffers: vec![],
            current_buffer: 0,
            resize_requested: false,
            frame_timer: 1.0,
            paused: false,
            descriptor_allocator: ManuallyDrop::new(descriptor_allocator),
            layout_cache: ManuallyDrop::new(layout_cache),
            swapchain: None,
            depth_stencil: None,
            shader_modules: vec![],
            allocator: ManuallyDrop::new(Arc::new(allocator)),
            surface_loader,
            surface,
            debug_messenger,
            instance,
            _entry: entry,
        })
    }

    /// 一度だけのセットアップ。<br />
    /// One-time setup sequence.
    pub fn prepare(&mut self) -> anyhow::Result<()> {
        self.recreate_swapchain(self.width, self.height)?;
        let graphics_family = self
            .physical_device
            .queue_indices
            .graphics_family
            .with_context(|| "Missing graphics queue family.")?;
        self.command_pool = Initializer::create_command_pool(&self.logical_device, graphics_family)?;
        self.create_command_buffers()?;
        self.wait_fences = Initializer::create_fences(&self.logical_device, self.draw_cmd_buffers.len())?;
        self.recreate_depth_stencil()?;
        self.render_pass = Pipeline::create_render_pass(
            &self.logical_device,
            self.swapchain()?.format.format,
            self.depth_format,
        )?;
        self.pipeline_cache = Initializer::create_pipeline_cache(&self.logical_device)?;
        self.recreate_framebuffers()?;
        Ok(())
    }

    pub fn swapchain(&self) -> anyhow::Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .with_context(|| "The swapchain has not been created yet.")
    }

    pub fn device_handle(&self) -> Weak<Device> {
        Arc::downgrade(&self.logical_device)
    }

    pub fn allocator_handle(&self) -> Weak<Allocator> {
        Arc::downgrade(&self.allocator)
    }

    pub fn upload_context(&self) -> UploadContext<'_> {
        UploadContext {
            instance: &self.instance,
            physical_device: self.physical_device.physical_device,
            device: &self.logical_device,
            allocator: self.allocator_handle(),
            command_pool: self.command_pool,
            graphics_queue: self.graphics_queue,
            anisotropy_enabled: self.enabled_features.sampler_anisotropy == TRUE,
        }
    }

    pub fn wait_idle(&self) -> anyhow::Result<()> {
        unsafe {
            self.logical_device
                .device_wait_idle()
                .with_context(|| "Failed to wait for device idle.")
        }
    }

    /// 次のスワップチェーン画像を取得する。<br />
    /// Acquires the next swapchain image.
    pub fn prepare_frame(&mut self) -> anyhow::Result<FrameStatus> {
        let mut image_index = self.current_buffer;
        let status = self
            .swapchain()?
            .acquire_next_image(self.present_complete, &mut image_index)?;
        self.current_buffer = image_index;
        if status != FrameStatus::Ok {
            self.resize_requested = true;
        }
        Ok(status)
    }

    /// 画像を提示し、キューが空くまで待つ。<br />
    /// Presents the image and waits for the queue to drain.
    pub fn submit_frame(&mut self) -> anyhow::Result<FrameStatus> {
        let status = self.swapchain()?.queue_present(
            self.present_queue,
            self.current_buffer,
            self.render_complete,
        )?;
        if status == FrameStatus::Resize {
            self.resize_requested = true;
            return Ok(status);
        }
        unsafe {
            self.logical_device
                .queue_wait_idle(self.graphics_queue)
                .with_context(|| "Failed to wait for the graphics queue.")?;
        }
        Ok(FrameStatus::Ok)
    }

    /// 現在のコマンドバッファを提出する。<br />
    /// Submits the current draw command buffer.
    pub fn submit_current(&self) -> anyhow::Result<()> {
        let index = self.current_buffer as usize;
        let command_buffer = *self
            .draw_cmd_buffers
            .get(index)
            .with_context(|| "No draw command buffer for the current image.")?;
        let fence = *self
            .wait_fences
            .get(index)
            .with_context(|| "No fence for the current image.")?;
        let wait_semaphores = [self.present_complete];
        let signal_semaphores = [self.render_complete];
        let wait_stages = [PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let submit_info = SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores)
            .command_buffers(&command_buffers)
            .build();
        unsafe {
            self.logical_device
                .wait_for_fences(&[fence], true, DEFAULT_FENCE_TIMEOUT)
                .with_context(|| "Failed to wait for the frame fence.")?;
            self.logical_device
                .reset_fences(&[fence])
                .with_context(|| "Failed to reset the frame fence.")?;
            self.logical_device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
                .with_context(|| "Failed to submit the draw command buffer.")?;
        }
        Ok(())
    }

    /// 最適でない画像も提出と提示を行い、取得のセマフォを消費する。<br />
    /// A suboptimal image is still submitted and presented so the acquire semaphore is consumed.
    pub fn render_frame(&mut self) -> anyhow::Result<FrameStatus> {
        let acquired = self.prepare_frame()?;
        if !acquired.image_acquired() {
            return Ok(FrameStatus::Resize);
        }
        self.submit_current()?;
        match (self.submit_frame()?, acquired) {
            (FrameStatus::Ok, FrameStatus::Ok) => Ok(FrameStatus::Ok),
            _ => Ok(FrameStatus::Resize),
        }
    }

    /// SPIR-Vのシェーダーを読み込む。モジュールは`Graphics`が破棄する。<br />
    /// Loads a SPIR-V shader. The module is destroyed together with `Graphics`.
    pub fn load_shader<P: AsRef<Path>>(
        &mut self,
        file_name: P,
        stage: ShaderStageFlags,
    ) -> anyhow::Result<PipelineShaderStageCreateInfo> {
        let shader = Shader::new(self.device_handle(), file_name, stage)?;
        let stage_info = shader.shader_stage_info;
        self.shader_modules.push(shader);
        Ok(stage_info)
    }

    pub fn draw_ui(&self, command_buffer: CommandBuffer) {
        if let Some(overlay) = self.overlay.as_ref() {
            if overlay.visible() {
                overlay.draw(&self.logical_device, command_buffer);
            }
        }
    }

    pub fn resize_overlay(&mut self, width: u32, height: u32) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.resize(width, height);
        }
    }

    pub fn clear_values(&self) -> [ClearValue; 2] {
        [
            ClearValue {
                color: ClearColorValue {
                    float32: self.clear_color,
                },
            },
            ClearValue {
                depth_stencil: ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            x: 0.0,
            y: 0.0,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(&self) -> Rect2D {
        Rect2D {
            offset: Offset2D { x: 0, y: 0 },
            extent: Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }

    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        match self.swapchain.as_mut() {
            Some(swapchain) => swapchain.create(
                &self.surface_loader,
                self.surface,
                &self.physical_device,
                width,
                height,
                self.settings.vsync,
            )?,
            None => {
                self.swapchain = Some(Swapchain::new(
                    &self.instance,
                    &self.logical_device,
                    &self.surface_loader,
                    self.surface,
                    &self.physical_device,
                    width,
                    height,
                    self.settings.vsync,
                )?);
            }
        }
        let extent = self.swapchain()?.extent;
        self.width = extent.width;
        self.height = extent.height;
        Ok(())
    }

    pub fn recreate_depth_stencil(&mut self) -> anyhow::Result<()> {
        self.depth_stencil = None;
        let extent = Extent2D {
            width: self.width,
            height: self.height,
        };
        self.depth_stencil = Some(Initializer::create_depth_image(
            self.device_handle(),
            self.depth_format,
            extent,
            self.allocator_handle(),
        )?);
        Ok(())
    }

    pub fn recreate_framebuffers(&mut self) -> anyhow::Result<()> {
        self.destroy_framebuffers();
        let depth_view = self
            .depth_stencil
            .as_ref()
            .map(|image| image.image_view)
            .with_context(|| "The depth stencil has not been created yet.")?;
        let swapchain = self
            .swapchain
            .as_ref()
            .with_context(|| "The swapchain has not been created yet.")?;
        let mut frame_buffers = Vec::with_capacity(swapchain.swapchain_images.len());
        for image in swapchain.swapchain_images.iter() {
            let attachments = [image.image_view, depth_view];
            let create_info = FramebufferCreateInfo::builder()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.width)
                .height(self.height)
                .layers(1);
            let frame_buffer = unsafe {
                self.logical_device
                    .create_framebuffer(&create_info, None)
                    .with_context(|| "Failed to create framebuffer.")?
            };
            frame_buffers.push(frame_buffer);
        }
        self.frame_buffers = frame_buffers;
        log::info!("Framebuffers successfully created.");
        Ok(())
    }

    /// コマンドバッファとフェンスを画像の数に合わせて作り直す。<br />
    /// Recreates the command buffers and fences to match the image count.
    pub fn recreate_command_buffers(&mut self) -> anyhow::Result<()> {
        self.destroy_command_buffers();
        self.create_command_buffers()?;
        if !fences_match(&self.wait_fences, &self.draw_cmd_buffers) {
            self.destroy_fences()?;
            self.wait_fences =
                Initializer::create_fences(&self.logical_device, self.draw_cmd_buffers.len())?;
        }
        Ok(())
    }

    fn destroy_fences(&mut self) -> anyhow::Result<()> {
        if self.wait_fences.is_empty() {
            return Ok(());
        }
        unsafe {
            self.logical_device
                .wait_for_fences(&self.wait_fences, true, DEFAULT_FENCE_TIMEOUT)
                .with_context(|| "Failed to wait for the frame fences.")?;
            for fence in self.wait_fences.iter() {
                self.logical_device.destroy_fence(*fence, None);
            }
        }
        self.wait_fences.clear();
        Ok(())
    }

    fn create_command_buffers(&mut self) -> anyhow::Result<()> {
        let count = self.swapchain()?.image_count();
        self.draw_cmd_buffers =
            Initializer::allocate_command_buffers(&self.logical_device, self.command_pool, count)?;
        Ok(())
    }

    fn destroy_command_buffers(&mut self) {
        if self.draw_cmd_buffers.is_empty() {
            return;
        }
        unsafe {
            self.logical_device
                .free_command_buffers(self.command_pool, &self.draw_cmd_buffers);
        }
        self.draw_cmd_buffers.clear();
    }

    fn destroy_framebuffers(&mut self) {
        unsafe {
            for frame_buffer in self.frame_buffers.iter() {
                self.logical_device.destroy_framebuffer(*frame_buffer, None);
            }
        }
        self.frame_buffers.clear();
    }
}

/// コマンドバッファごとにフェンスが一つある。<br />
/// One fence per draw command buffer.
fn fences_match(fences: &[Fence], command_buffers: &[CommandBuffer]) -> bool {
    fences.len() == command_buffers.len()
}

impl Drop for Graphics {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("{:?}", e);
        }
        self.shader_modules.clear();
        self.destroy_framebuffers();
        unsafe {
            self.logical_device
                .destroy_pipeline_cache(self.pipeline_cache, None);
            self.logical_device.destroy_render_pass(self.render_pass, None);
        }
        self.depth_stencil = None;
        self.destroy_command_buffers();
        unsafe {
            self.logical_device.destroy_command_pool(self.command_pool, None);
            for fence in self.wait_fences.iter() {
                self.logical_device.destroy_fence(*fence, None);
            }
            self.logical_device
                .destroy_semaphore(self.present_complete, None);
            self.logical_device
                .destroy_semaphore(self.render_complete, None);
        }
        self.swapchain = None;
        unsafe {
            ManuallyDrop::drop(&mut self.descriptor_allocator);
            ManuallyDrop::drop(&mut self.layout_cache);
            ManuallyDrop::drop(&mut self.allocator);
            self.logical_device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::info!("Successfully dropped graphics.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_follow_the_image_count() {
        let fences = vec![Fence::null(); 2];
        assert!(fences_match(&fences, &[CommandBuffer::null(); 2]));
        assert!(!fences_match(&fences, &[CommandBuffer::null(); 3]));
        assert!(!fences_match(&[], &[CommandBuffer::null()]));
    }
}
