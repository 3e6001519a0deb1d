use anyhow::Context;
use ash::vk::{DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo};
use std::collections::HashMap;
use std::sync::Weak;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct BindingKey {
    binding: u32,
    descriptor_type: i32,
    descriptor_count: u32,
    stage_flags: u32,
}

/// 描述子レイアウトに関する情報。`HashMap`のキーとして使われる。<br />
/// Information about a descriptor set layout, used as `HashMap` keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DescriptorLayoutInfo {
    bindings: Vec<BindingKey>,
}

impl DescriptorLayoutInfo {
    fn from_bindings(bindings: &[DescriptorSetLayoutBinding]) -> Self {
        let mut keys = bindings
            .iter()
            .map(|b| BindingKey {
                binding: b.binding,
                descriptor_type: b.descriptor_type.as_raw(),
                descriptor_count: b.descriptor_count,
                stage_flags: b.stage_flags.as_raw(),
            })
            .collect::<Vec<_>>();
        keys.sort_unstable_by(|a, b| a.binding.cmp(&b.binding));
        DescriptorLayoutInfo { bindings: keys }
    }
}

/// 描述子レイアウトのキャッシュ。<br />
/// 同じバインディングのレイアウトは一度だけ作成される。レンダラーの寿命に合わせて明示的に渡す。<br />
/// Cache for descriptor set layouts.<br />
/// A layout with the same bindings is created only once. It is passed around explicitly and lives as long as the renderer.
pub struct DescriptorLayoutCache {
    logical_device: Weak<ash::Device>,
    layout_cache: HashMap<DescriptorLayoutInfo, DescriptorSetLayout>,
}

impl DescriptorLayoutCache {
    pub fn new(device: Weak<ash::Device>) -> Self {
        DescriptorLayoutCache {
            logical_device: device,
            layout_cache: HashMap::new(),
        }
    }

    /// 描述子レイアウトを作成するか、キャッシュから取り出す。<br />
    /// Creates a descriptor layout, or fetches it from the cache.
    pub fn create_descriptor_layout(
        &mut self,
        bindings: &[DescriptorSetLayoutBinding],
    ) -> anyhow::Result<DescriptorSetLayout> {
        let layout_info = DescriptorLayoutInfo::from_bindings(bindings);
        if let Some(layout) = self.layout_cache.get(&layout_info) {
            return Ok(*layout);
        }

        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        let create_info = DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .with_context(|| "Failed to create descriptor set layout.")?
        };
        self.layout_cache.insert(layout_info, layout);
        Ok(layout)
    }

    pub fn len(&self) -> usize {
        self.layout_cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout_cache.is_empty()
    }
}

impl Drop for DescriptorLayoutCache {
    fn drop(&mut self) {
        if let Some(device) = self.logical_device.upgrade() {
            unsafe {
                for (_, layout) in self.layout_cache.iter() {
                    device.destroy_descriptor_set_layout(*layout, None);
                }
            }
        }
        self.layout_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::{DescriptorType, ShaderStageFlags};

    fn binding(index: u32, ty: DescriptorType) -> DescriptorSetLayoutBinding {
        DescriptorSetLayoutBinding::builder()
            .binding(index)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(ShaderStageFlags::FRAGMENT)
            .build()
    }

    #[test]
    fn binding_order_does_not_change_the_key() {
        let a = [
            binding(0, DescriptorType::UNIFORM_BUFFER),
            binding(1, DescriptorType::COMBINED_IMAGE_SAMPLER),
        ];
        let b = [a[1], a[0]];
        assert_eq!(
            DescriptorLayoutInfo::from_bindings(&a),
            DescriptorLayoutInfo::from_bindings(&b)
        );
    }

    #[test]
    fn descriptor_type_is_part_of_the_key() {
        let a = [binding(0, DescriptorType::UNIFORM_BUFFER)];
        let b = [binding(0, DescriptorType::COMBINED_IMAGE_SAMPLER)];
        assert_ne!(
            DescriptorLayoutInfo::from_bindings(&a),
            DescriptorLayoutInfo::from_bindings(&b)
        );
    }

    #[test]
    fn empty_cache_without_device() {
        let cache = DescriptorLayoutCache::new(Weak::new());
        assert!(cache.is_empty());
    }
}
