use anyhow::Context;
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain;
use ash::vk::*;
use ash::{Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashSet;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::Weak;
use vk_mem::Allocator;

use super::{Image, PhysicalDevice};

/// 深度フォーマットの候補。精度の高い順に試す。<br />
/// Depth format candidates, probed in descending precision.
pub const DEPTH_FORMAT_CANDIDATES: [Format; 5] = [
    Format::D32_SFLOAT_S8_UINT,
    Format::D32_SFLOAT,
    Format::D24_UNORM_S8_UINT,
    Format::D16_UNORM_S8_UINT,
    Format::D16_UNORM,
];

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

pub struct Initializer {}

impl Initializer {
    /// 有効にできる検証レイヤーを返す。見つからない場合は警告だけ出す。<br />
    /// Returns the validation layers that can be enabled. Missing layers only produce a warning.
    pub fn get_validation_layers(entry: &Entry, validation: bool) -> anyhow::Result<Vec<CString>> {
        if !validation {
            return Ok(vec![]);
        }
        let available = entry
            .enumerate_instance_layer_properties()
            .with_context(|| "Failed to enumerate instance layers.")?;
        let found = available.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_str().map(|n| n == VALIDATION_LAYER).unwrap_or(false)
        });
        if found {
            Ok(vec![CString::new(VALIDATION_LAYER)?])
        } else {
            log::warn!(
                "Validation layer {} not present, validation is disabled.",
                VALIDATION_LAYER
            );
            Ok(vec![])
        }
    }

    pub fn create_instance(
        name: &str,
        enabled_layers: &[CString],
        entry: &Entry,
        display_handle: RawDisplayHandle,
    ) -> anyhow::Result<Instance> {
        let app_name = CString::new(name)?;
        let engine_name = CString::new("Vulkan glTF Framework")?;
        let app_info = ApplicationInfo::builder()
            .api_version(make_api_version(0, 1, 2, 0))
            .application_name(&app_name)
            .application_version(make_api_version(0, 0, 0, 1))
            .engine_name(&engine_name)
            .engine_version(make_api_version(0, 0, 0, 1));

        let extensions = Self::get_required_extensions(!enabled_layers.is_empty(), display_handle)?;
        let layers = enabled_layers
            .iter()
            .map(|s| s.as_ptr())
            .collect::<Vec<_>>();

        let instance_info = InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(extensions.as_slice())
            .enabled_layer_names(layers.as_slice());

        let instance = unsafe {
            entry
                .create_instance(&instance_info, None)
                .with_context(|| "Failed to create Vulkan instance.")?
        };
        log::info!("Vulkan instance successfully created.");
        Ok(instance)
    }

    pub fn create_debug_messenger(
        debug_utils_loader: &DebugUtils,
    ) -> anyhow::Result<DebugUtilsMessengerEXT> {
        let create_info = DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(Self::debug_callback));
        let messenger = unsafe {
            debug_utils_loader
                .create_debug_utils_messenger(&create_info, None)
                .with_context(|| "Failed to create debug messenger.")?
        };
        log::info!("Debug messenger successfully created.");
        Ok(messenger)
    }

    pub fn create_surface(
        entry: &Entry,
        instance: &Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> anyhow::Result<SurfaceKHR> {
        let surface = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
                .with_context(|| "Failed to create surface.")?
        };
        log::info!("Surface successfully created.");
        Ok(surface)
    }

    pub fn create_logical_device(
        instance: &Instance,
        physical_device: &PhysicalDevice,
        enabled_features: &PhysicalDeviceFeatures,
        enabled_layers: &[CString],
    ) -> anyhow::Result<(ash::Device, Queue, Queue)> {
        let layers = enabled_layers
            .iter()
            .map(|s| s.as_ptr())
            .collect::<Vec<_>>();
        let extensions = [Swapchain::name().as_ptr()];
        let graphics_family = physical_device
            .queue_indices
            .graphics_family
            .with_context(|| "Missing graphics queue family.")?;
        let present_family = physical_device
            .queue_indices
            .present_family
            .with_context(|| "Missing present queue family.")?;

        let mut unique_indices = HashSet::new();
        unique_indices.insert(graphics_family);
        unique_indices.insert(present_family);
        let priority = [1.0_f32];
        let queue_create_infos = unique_indices
            .iter()
            .map(|index| {
                DeviceQueueCreateInfo::builder()
                    .queue_family_index(*index)
                    .queue_priorities(&priority)
                    .build()
            })
            .collect::<Vec<_>>();

        let create_info = DeviceCreateInfo::builder()
            .enabled_extension_names(&extensions)
            .enabled_features(enabled_features)
            .enabled_layer_names(layers.as_slice())
            .queue_create_infos(queue_create_infos.as_slice());
        unsafe {
            let device = instance
                .create_device(physical_device.physical_device, &create_info, None)
                .with_context(|| "Failed to create logical device.")?;
            let graphics_queue = device.get_device_queue(graphics_family, 0);
            let present_queue = device.get_device_queue(present_family, 0);
            log::info!("Device queue successfully acquired.");
            log::info!("Logical device successfully created.");
            Ok((device, graphics_queue, present_queue))
        }
    }

    pub fn create_allocator(
        instance: &Instance,
        device: &ash::Device,
        physical_device: &PhysicalDevice,
    ) -> anyhow::Result<Allocator> {
        let create_info =
            vk_mem::AllocatorCreateInfo::new(instance, device, physical_device.physical_device);
        let allocator = unsafe {
            Allocator::new(create_info).with_context(|| "Failed to create VMA memory allocator.")?
        };
        log::info!("Memory allocator successfully created.");
        Ok(allocator)
    }

    pub fn choose_depth_format(
        depth_formats: &[Format],
        tiling: ImageTiling,
        feature_flags: FormatFeatureFlags,
        instance: &Instance,
        physical_device: &PhysicalDevice,
    ) -> Option<Format> {
        depth_formats.iter().copied().find(|format| {
            let format_properties = unsafe {
                instance.get_physical_device_format_properties(physical_device.physical_device, *format)
            };
            match tiling {
                ImageTiling::LINEAR => format_properties
                    .linear_tiling_features
                    .contains(feature_flags),
                _ => format_properties
                    .optimal_tiling_features
                    .contains(feature_flags),
            }
        })
    }

    pub fn get_depth_format(instance: &Instance, physical_device: &PhysicalDevice) -> anyhow::Result<Format> {
        let format = Self::choose_depth_format(
            &DEPTH_FORMAT_CANDIDATES,
            ImageTiling::OPTIMAL,
            FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            instance,
            physical_device,
        )
        .with_context(|| "Could not find a suitable depth format.")?;
        log::info!("Depth format: {:?}", format);
        Ok(format)
    }

    /// 深度フォーマットにステンシル成分があるかどうか。<br />
    /// Whether the depth format carries a stencil component.
    pub fn has_stencil(format: Format) -> bool {
        format.as_raw() >= Format::D16_UNORM_S8_UINT.as_raw()
    }

    pub fn create_depth_image(
        device: Weak<ash::Device>,
        format: Format,
        extent: Extent2D,
        allocator: Weak<Allocator>,
    ) -> anyhow::Result<Image> {
        let aspect = if Self::has_stencil(format) {
            ImageAspectFlags::DEPTH | ImageAspectFlags::STENCIL
        } else {
            ImageAspectFlags::DEPTH
        };
        let image = Image::new(
            device,
            ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            format,
            extent,
            1,
            aspect,
            allocator,
        )?;
        log::info!("Depth image successfully created.");
        Ok(image)
    }

    pub fn create_semaphore(device: &ash::Device) -> anyhow::Result<Semaphore> {
        let create_info = SemaphoreCreateInfo::builder();
        unsafe {
            device
                .create_semaphore(&create_info, None)
                .with_context(|| "Failed to create semaphore.")
        }
    }

    pub fn create_command_pool(device: &ash::Device, queue_family_index: u32) -> anyhow::Result<CommandPool> {
        let create_info = CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .flags(CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe {
            device
                .create_command_pool(&create_info, None)
                .with_context(|| "Failed to create command pool.")?
        };
        log::info!("Command pool successfully created.");
        Ok(pool)
    }

    pub fn allocate_command_buffers(
        device: &ash::Device,
        command_pool: CommandPool,
        count: u32,
    ) -> anyhow::Result<Vec<CommandBuffer>> {
        let allocate_info = CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .command_buffer_count(count)
            .level(CommandBufferLevel::PRIMARY);
        unsafe {
            device
                .allocate_command_buffers(&allocate_info)
                .with_context(|| "Failed to allocate command buffers.")
        }
    }

    /// シグナル状態のフェンスを作成する。<br />
    /// Creates fences in the signaled state.
    pub fn create_fences(device: &ash::Device, count: usize) -> anyhow::Result<Vec<Fence>> {
        let create_info = FenceCreateInfo::builder().flags(FenceCreateFlags::SIGNALED);
        (0..count)
            .map(|_| unsafe {
                device
                    .create_fence(&create_info, None)
                    .with_context(|| "Failed to create fence.")
            })
            .collect()
    }

    pub fn create_pipeline_cache(device: &ash::Device) -> anyhow::Result<PipelineCache> {
        let create_info = PipelineCacheCreateInfo::builder();
        unsafe {
            device
                .create_pipeline_cache(&create_info, None)
                .with_context(|| "Failed to create pipeline cache.")
        }
    }

    fn get_required_extensions(
        debug: bool,
        display_handle: RawDisplayHandle,
    ) -> anyhow::Result<Vec<*const c_char>> {
        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .with_context(|| "Failed to enumerate required extensions.")?
            .to_vec();
        if debug {
            extensions.push(DebugUtils::name().as_ptr());
        }
        Ok(extensions)
    }

    unsafe extern "system" fn debug_callback(
        severity: DebugUtilsMessageSeverityFlagsEXT,
        _message_type: DebugUtilsMessageTypeFlagsEXT,
        p_callback_data: *const DebugUtilsMessengerCallbackDataEXT,
        _p_user_data: *mut c_void,
    ) -> Bool32 {
        let message = CStr::from_ptr((*p_callback_data).p_message);
        if let Ok(msg) = message.to_str() {
            match severity {
                DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::info!("{}", msg),
                DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", msg),
                DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", msg),
                _ => (),
            }
        }
        FALSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_aspect_follows_format_order() {
        assert!(Initializer::has_stencil(Format::D32_SFLOAT_S8_UINT));
        assert!(Initializer::has_stencil(Format::D24_UNORM_S8_UINT));
        assert!(Initializer::has_stencil(Format::D16_UNORM_S8_UINT));
        assert!(!Initializer::has_stencil(Format::D32_SFLOAT));
        assert!(!Initializer::has_stencil(Format::D16_UNORM));
    }
}
