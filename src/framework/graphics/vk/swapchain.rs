use anyhow::Context;
use ash::extensions::khr::Surface;
use ash::vk::*;
use std::sync::{Arc, Weak};

use super::{Image, PhysicalDevice};

/// スワップチェーン操作の結果。<br />
/// Outcome of a swapchain operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    /// 画像は取得できたが最適でない。このフレームは提示し、その後で再作成する。<br />
    /// The image was acquired but is suboptimal. Present this frame, then recreate.
    Suboptimal,
    /// サーフェスが古い。画像は取得されていない。<br />
    /// The surface is out of date and no image was acquired.
    Resize,
}

impl FrameStatus {
    /// 画像が取得され、セマフォが信号を受ける場合は`true`。<br />
    /// `true` when an image was acquired and the semaphore will be signaled.
    pub fn image_acquired(self) -> bool {
        self != FrameStatus::Resize
    }

    /// `vkAcquireNextImageKHR`の結果を画像番号と状態に変換する。<br />
    /// Maps an acquire result to the image index and status.
    pub fn from_acquire(
        result: std::result::Result<(u32, bool), ash::vk::Result>,
    ) -> anyhow::Result<(Option<u32>, FrameStatus)> {
        match result {
            Ok((index, false)) => Ok((Some(index), FrameStatus::Ok)),
            Ok((index, true)) => Ok((Some(index), FrameStatus::Suboptimal)),
            Err(ash::vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((None, FrameStatus::Resize)),
            Err(e) => Err(anyhow::anyhow!("Failed to acquire next image: {}", e)),
        }
    }
}

pub struct Swapchain {
    pub swapchain: SwapchainKHR,
    pub extent: Extent2D,
    pub format: SurfaceFormatKHR,
    pub present_mode: PresentModeKHR,
    pub swapchain_images: Vec<Image>,
    swapchain_loader: ash::extensions::khr::Swapchain,
    logical_device: Weak<ash::Device>,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        device: &Arc<ash::Device>,
        surface_loader: &Surface,
        surface: SurfaceKHR,
        physical_device: &PhysicalDevice,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let mut swapchain = Swapchain {
            swapchain: SwapchainKHR::null(),
            extent: Extent2D { width, height },
            format: SurfaceFormatKHR::default(),
            present_mode: PresentModeKHR::FIFO,
            swapchain_images: vec![],
            swapchain_loader: ash::extensions::khr::Swapchain::new(instance, device.as_ref()),
            logical_device: Arc::downgrade(device),
        };
        swapchain.create(surface_loader, surface, physical_device, width, height, vsync)?;
        Ok(swapchain)
    }

    /// スワップチェーンを作成し直す。古いスワップチェーンは新しいものに引き継いでから破棄する。<br />
    /// Creates the swapchain anew, handing the old one over before it is destroyed.
    pub fn create(
        &mut self,
        surface_loader: &Surface,
        surface: SurfaceKHR,
        physical_device: &PhysicalDevice,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> anyhow::Result<()> {
        let (capabilities, formats, present_modes) =
            Self::get_swapchain_details(surface_loader, surface, physical_device.physical_device)?;
        self.format = Self::choose_format(&formats).with_context(|| "The surface reports no formats.")?;
        self.extent = Self::choose_extent(&capabilities, width, height);
        self.present_mode = Self::choose_present_mode(&present_modes, vsync);
        let min_image_count = Self::choose_image_count(&capabilities);

        log::info!("Present mode: {:?}", self.present_mode);
        log::info!("Color space: {:?}", self.format.color_space);
        log::info!("Swapchain format: {:?}", self.format.format);
        log::info!("Min image count: {}", min_image_count);

        let graphics_family = physical_device
            .queue_indices
            .graphics_family
            .with_context(|| "Missing graphics queue family.")?;
        let present_family = physical_device
            .queue_indices
            .present_family
            .with_context(|| "Missing present queue family.")?;
        let indices = [graphics_family, present_family];

        let old_swapchain = self.swapchain;
        let mut create_info = SwapchainCreateInfoKHR::builder()
            .min_image_count(min_image_count)
            .present_mode(self.present_mode)
            .surface(surface)
            .clipped(true)
            .composite_alpha(Self::choose_composite_alpha(&capabilities))
            .image_array_layers(1)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent)
            .image_format(self.format.format)
            .pre_transform(Self::choose_transform(&capabilities))
            .image_usage(ImageUsageFlags::COLOR_ATTACHMENT)
            .old_swapchain(old_swapchain);

        if graphics_family != present_family {
            create_info = create_info
                .image_sharing_mode(SharingMode::CONCURRENT)
                .queue_family_indices(&indices);
        } else {
            create_info = create_info.image_sharing_mode(SharingMode::EXCLUSIVE);
        }

        self.swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .with_context(|| "Failed to create swapchain.")?
        };

        self.swapchain_images.clear();
        if old_swapchain != SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }

        let images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(self.swapchain)
                .with_context(|| "Failed to acquire swapchain images.")?
        };
        for image in images.into_iter() {
            let img = Image::from_image(
                image,
                self.logical_device.clone(),
                self.format.format,
                self.extent,
                ImageAspectFlags::COLOR,
            )?;
            self.swapchain_images.push(img);
        }
        log::info!("Swapchain successfully created.");
        Ok(())
    }

    pub fn image_count(&self) -> u32 {
        self.swapchain_images.len() as u32
    }

    /// 次の画像を取得する。古いサーフェスは`FrameStatus::Resize`として返す。<br />
    /// Acquires the next image. An out-of-date surface is reported as `FrameStatus::Resize`.<br />
    /// A suboptimal image is still acquired and reported as `FrameStatus::Suboptimal`.
    pub fn acquire_next_image(
        &self,
        present_complete: Semaphore,
        image_index: &mut u32,
    ) -> anyhow::Result<FrameStatus> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                present_complete,
                Fence::null(),
            )
        };
        let (index, status) = FrameStatus::from_acquire(result)?;
        if let Some(index) = index {
            *image_index = index;
        }
        Ok(status)
    }

    pub fn queue_present(
        &self,
        queue: Queue,
        image_index: u32,
        wait_semaphore: Semaphore,
    ) -> anyhow::Result<FrameStatus> {
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let mut present_info = PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&indices);
        if wait_semaphore != Semaphore::null() {
            present_info = present_info.wait_semaphores(&wait_semaphores);
        }
        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        match result {
            Ok(false) => Ok(FrameStatus::Ok),
            Ok(true) | Err(ash::vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameStatus::Resize),
            Err(e) => Err(anyhow::anyhow!("Failed to present swapchain image: {}", e)),
        }
    }

    fn choose_format(formats: &[SurfaceFormatKHR]) -> Option<SurfaceFormatKHR> {
        formats
            .iter()
            .find(|format| {
                format.format == Format::B8G8R8A8_UNORM
                    && format.color_space == ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.first())
            .copied()
    }

    fn choose_extent(capabilities: &SurfaceCapabilitiesKHR, width: u32, height: u32) -> Extent2D {
        if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            Extent2D {
                width: width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        }
    }

    fn choose_present_mode(present_modes: &[PresentModeKHR], vsync: bool) -> PresentModeKHR {
        if vsync {
            return PresentModeKHR::FIFO;
        }
        if present_modes.contains(&PresentModeKHR::MAILBOX) {
            PresentModeKHR::MAILBOX
        } else if present_modes.contains(&PresentModeKHR::IMMEDIATE) {
            PresentModeKHR::IMMEDIATE
        } else {
            PresentModeKHR::FIFO
        }
    }

    fn choose_image_count(capabilities: &SurfaceCapabilitiesKHR) -> u32 {
        let desired = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 && desired > capabilities.max_image_count {
            capabilities.max_image_count
        } else {
            desired
        }
    }

    fn choose_transform(capabilities: &SurfaceCapabilitiesKHR) -> SurfaceTransformFlagsKHR {
        if capabilities
            .supported_transforms
            .contains(SurfaceTransformFlagsKHR::IDENTITY)
        {
            SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        }
    }

    fn choose_composite_alpha(capabilities: &SurfaceCapabilitiesKHR) -> CompositeAlphaFlagsKHR {
        [
            CompositeAlphaFlagsKHR::OPAQUE,
            CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            CompositeAlphaFlagsKHR::POST_MULTIPLIED,
            CompositeAlphaFlagsKHR::INHERIT,
        ]
        .into_iter()
        .find(|flag| capabilities.supported_composite_alpha.contains(*flag))
        .unwrap_or(CompositeAlphaFlagsKHR::OPAQUE)
    }

    fn get_swapchain_details(
        surface_loader: &Surface,
        surface: SurfaceKHR,
        physical_device: ash::vk::PhysicalDevice,
    ) -> anyhow::Result<(SurfaceCapabilitiesKHR, Vec<SurfaceFormatKHR>, Vec<PresentModeKHR>)> {
        unsafe {
            let capabilities = surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .with_context(|| "Failed to get surface capabilities")?;
            let formats = surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .with_context(|| "Failed to get surface formats.")?;
            let present_modes = surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .with_context(|| "Failed to get available present modes.")?;
            Ok((capabilities, formats, present_modes))
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.swapchain_images.clear();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        log::info!("Swapchain successfully dropped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_always_selects_fifo() {
        let modes = [PresentModeKHR::MAILBOX, PresentModeKHR::IMMEDIATE];
        assert_eq!(Swapchain::choose_present_mode(&modes, true), PresentModeKHR::FIFO);
    }

    #[test]
    fn present_mode_prefers_mailbox_then_immediate() {
        let all = [PresentModeKHR::FIFO, PresentModeKHR::IMMEDIATE, PresentModeKHR::MAILBOX];
        assert_eq!(Swapchain::choose_present_mode(&all, false), PresentModeKHR::MAILBOX);
        let no_mailbox = [PresentModeKHR::FIFO, PresentModeKHR::IMMEDIATE];
        assert_eq!(Swapchain::choose_present_mode(&no_mailbox, false), PresentModeKHR::IMMEDIATE);
        let fifo_only = [PresentModeKHR::FIFO];
        assert_eq!(Swapchain::choose_present_mode(&fifo_only, false), PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_is_clamped_when_surface_leaves_it_open() {
        let capabilities = SurfaceCapabilitiesKHR {
            current_extent: Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: Extent2D { width: 1, height: 1 },
            max_image_extent: Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        let extent = Swapchain::choose_extent(&capabilities, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn image_count_respects_maximum() {
        let capabilities = SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(Swapchain::choose_image_count(&capabilities), 3);
        let unbounded = SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(Swapchain::choose_image_count(&unbounded), 3);
    }

    #[test]
    fn format_prefers_bgra_srgb_nonlinear() {
        let formats = [
            SurfaceFormatKHR { format: Format::R8G8B8A8_UNORM, color_space: ColorSpaceKHR::SRGB_NONLINEAR },
            SurfaceFormatKHR { format: Format::B8G8R8A8_UNORM, color_space: ColorSpaceKHR::SRGB_NONLINEAR },
        ];
        let chosen = Swapchain::choose_format(&formats).map(|f| f.format);
        assert_eq!(chosen, Some(Format::B8G8R8A8_UNORM));
        assert!(Swapchain::choose_format(&[]).is_none());
    }

    #[test]
    fn suboptimal_acquire_keeps_the_image() {
        let (index, status) = FrameStatus::from_acquire(Ok((2, true))).unwrap();
        assert_eq!((index, status), (Some(2), FrameStatus::Suboptimal));
        assert!(status.image_acquired());

        let (index, status) = FrameStatus::from_acquire(Ok((1, false))).unwrap();
        assert_eq!((index, status), (Some(1), FrameStatus::Ok));
        assert!(status.image_acquired());
    }

    #[test]
    fn out_of_date_acquire_has_no_image() {
        let (index, status) =
            FrameStatus::from_acquire(Err(ash::vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!((index, status), (None, FrameStatus::Resize));
        assert!(!status.image_acquired());
        assert!(FrameStatus::from_acquire(Err(ash::vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
