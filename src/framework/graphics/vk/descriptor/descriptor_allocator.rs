use anyhow::Context;
use ash::vk::{
    DescriptorPool, DescriptorPoolCreateFlags, DescriptorPoolCreateInfo, DescriptorPoolResetFlags,
    DescriptorPoolSize, DescriptorSet, DescriptorSetAllocateInfo, DescriptorSetLayout,
    DescriptorType,
};
use std::sync::Weak;

/// プール一つあたりのセット数。<br />
/// Number of sets per pool.
const SETS_PER_POOL: u32 = 256;

/// セット一つあたりの描述子の比率。<br />
/// Descriptor ratios per set.
const POOL_RATIOS: [(DescriptorType, f32); 4] = [
    (DescriptorType::UNIFORM_BUFFER, 2.0),
    (DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    (DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    (DescriptorType::STORAGE_BUFFER, 1.0),
];

/// 描述子セットを割り当てる。プールが尽きたら新しいプールを作る。<br />
/// Allocates descriptor sets, growing a new pool whenever the current one runs out.
pub struct DescriptorAllocator {
    pub logical_device: Weak<ash::Device>,
    used_pools: Vec<DescriptorPool>,
    free_pools: Vec<DescriptorPool>,
    current_pool: DescriptorPool,
}

impl DescriptorAllocator {
    pub fn new(device: Weak<ash::Device>) -> Self {
        DescriptorAllocator {
            used_pools: vec![],
            free_pools: vec![],
            current_pool: DescriptorPool::null(),
            logical_device: device,
        }
    }

    pub fn allocate(&mut self, layout: DescriptorSetLayout) -> anyhow::Result<DescriptorSet> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;

        if self.current_pool == DescriptorPool::null() {
            self.current_pool = self.grab_pool(&device)?;
            self.used_pools.push(self.current_pool);
        }

        let layouts = [layout];
        let result = unsafe {
            let allocate_info = DescriptorSetAllocateInfo::builder()
                .descriptor_pool(self.current_pool)
                .set_layouts(&layouts);
            device.allocate_descriptor_sets(&allocate_info)
        };
        match result {
            Ok(sets) => return sets.first().copied().with_context(|| "No descriptor set returned."),
            Err(ash::vk::Result::ERROR_FRAGMENTED_POOL)
            | Err(ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY) => (),
            Err(e) => return Err(anyhow::anyhow!("Failed to allocate descriptor set: {}", e)),
        }

        self.current_pool = self.grab_pool(&device)?;
        self.used_pools.push(self.current_pool);
        let sets = unsafe {
            let allocate_info = DescriptorSetAllocateInfo::builder()
                .descriptor_pool(self.current_pool)
                .set_layouts(&layouts);
            device
                .allocate_descriptor_sets(&allocate_info)
                .with_context(|| "Failed to allocate descriptor set from a fresh pool.")?
        };
        sets.first().copied().with_context(|| "No descriptor set returned.")
    }

    pub fn reset_pools(&mut self) -> anyhow::Result<()> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        for pool in self.used_pools.iter() {
            unsafe {
                device
                    .reset_descriptor_pool(*pool, DescriptorPoolResetFlags::empty())
                    .with_context(|| "Failed to reset descriptor pool.")?;
            }
        }
        self.free_pools.append(&mut self.used_pools);
        self.current_pool = DescriptorPool::null();
        Ok(())
    }

    fn grab_pool(&mut self, device: &ash::Device) -> anyhow::Result<DescriptorPool> {
        match self.free_pools.pop() {
            Some(pool) => Ok(pool),
            None => Self::create_pool(device, SETS_PER_POOL, DescriptorPoolCreateFlags::empty()),
        }
    }

    fn pool_sizes(count: u32) -> Vec<DescriptorPoolSize> {
        POOL_RATIOS
            .iter()
            .map(|(descriptor_type, ratio)| DescriptorPoolSize {
                ty: *descriptor_type,
                descriptor_count: (*ratio * count as f32) as u32,
            })
            .collect()
    }

    fn create_pool(
        device: &ash::Device,
        count: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> anyhow::Result<DescriptorPool> {
        let sizes = Self::pool_sizes(count);
        let pool_info = DescriptorPoolCreateInfo::builder()
            .pool_sizes(&sizes)
            .flags(flags)
            .max_sets(count);
        unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .with_context(|| "Failed to create descriptor pool.")
        }
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        if let Some(device) = self.logical_device.upgrade() {
            unsafe {
                for pool in self.free_pools.iter().chain(self.used_pools.iter()) {
                    device.destroy_descriptor_pool(*pool, None);
                }
            }
        }
        self.free_pools.clear();
        self.used_pools.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sizes_scale_with_set_count() {
        let sizes = DescriptorAllocator::pool_sizes(10);
        let ubo = sizes
            .iter()
            .find(|s| s.ty == DescriptorType::UNIFORM_BUFFER)
            .map(|s| s.descriptor_count);
        let samplers = sizes
            .iter()
            .find(|s| s.ty == DescriptorType::COMBINED_IMAGE_SAMPLER)
            .map(|s| s.descriptor_count);
        assert_eq!(ubo, Some(20));
        assert_eq!(samplers, Some(40));
    }
}
