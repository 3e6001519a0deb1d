use anyhow::Context;
use ash::{
    extensions::khr::{Surface, Swapchain},
    vk::{
        PhysicalDeviceFeatures, PhysicalDeviceMemoryProperties, PhysicalDeviceProperties,
        QueueFlags, SurfaceKHR,
    },
    Instance,
};
use std::collections::HashSet;
use std::ffi::CStr;

#[derive(Copy, Clone, Debug, Default)]
pub struct QueueIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueIndices {
    pub fn is_ready(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }
}

/// 選択された物理デバイスとその情報。<br />
/// The selected physical device and what we know about it.
pub struct PhysicalDevice {
    pub physical_device: ash::vk::PhysicalDevice,
    pub queue_indices: QueueIndices,
    pub device_properties: PhysicalDeviceProperties,
    pub features: PhysicalDeviceFeatures,
    pub memory_properties: PhysicalDeviceMemoryProperties,
    pub device_name: String,
}

impl PhysicalDevice {
    /// 最初に列挙された物理デバイスを選ぶ。<br />
    /// Selects the first enumerated physical device.
    pub fn new(instance: &Instance, surface_loader: &Surface, surface: SurfaceKHR) -> anyhow::Result<Self> {
        let physical_devices = unsafe {
            instance
                .enumerate_physical_devices()
                .with_context(|| "Failed to enumerate available physical devices.")?
        };
        let device = *physical_devices
            .first()
            .with_context(|| "No device with Vulkan support found.")?;

        let queue_indices = Self::get_queue_indices(instance, surface_loader, device, surface)?;
        if !queue_indices.is_ready() {
            return Err(anyhow::anyhow!(
                "The selected device has no graphics queue able to present."
            ));
        }
        if !Self::check_extension_support(instance, device)? {
            return Err(anyhow::anyhow!(
                "The selected device does not support the swapchain extension."
            ));
        }

        unsafe {
            let device_properties = instance.get_physical_device_properties(device);
            let features = instance.get_physical_device_features(device);
            let memory_properties = instance.get_physical_device_memory_properties(device);
            let device_name = CStr::from_ptr(device_properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned();
            log::info!("Selected physical device: {}", &device_name);
            Ok(PhysicalDevice {
                physical_device: device,
                queue_indices,
                device_properties,
                features,
                memory_properties,
                device_name,
            })
        }
    }

    fn get_queue_indices(
        instance: &Instance,
        surface_loader: &Surface,
        device: ash::vk::PhysicalDevice,
        surface: SurfaceKHR,
    ) -> anyhow::Result<QueueIndices> {
        let mut queue_indices = QueueIndices::default();
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }
            let surface_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .with_context(|| "Failed to query surface support.")?
            };
            let graphics = family.queue_flags.contains(QueueFlags::GRAPHICS);
            // Prefer a single family doing both.
            if graphics && surface_support {
                return Ok(QueueIndices {
                    graphics_family: Some(index),
                    present_family: Some(index),
                });
            }
            if graphics && queue_indices.graphics_family.is_none() {
                queue_indices.graphics_family = Some(index);
            }
            if surface_support && queue_indices.present_family.is_none() {
                queue_indices.present_family = Some(index);
            }
        }
        Ok(queue_indices)
    }

    fn check_extension_support(instance: &Instance, device: ash::vk::PhysicalDevice) -> anyhow::Result<bool> {
        let mut required_extension = HashSet::new();
        required_extension.insert(Swapchain::name());
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .with_context(|| "Failed to enumerate physical device extensions.")?
        };
        for extension in extensions.iter() {
            let name = unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) };
            required_extension.remove(name);
        }
        Ok(required_extension.is_empty())
    }
}
