use anyhow::Context;
use ash::vk::{
    DescriptorBufferInfo, DescriptorImageInfo, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutBinding, DescriptorType, ShaderStageFlags, WriteDescriptorSet,
};

use super::{DescriptorAllocator, DescriptorLayoutCache};

/// レイアウトの取得、セットの割り当てと書き込みを一度に行う。<br />
/// Fetches the layout, allocates the set and writes it in one go.
pub struct DescriptorBuilder<'a> {
    layout_cache: &'a mut DescriptorLayoutCache,
    allocator: &'a mut DescriptorAllocator,
    writes: Vec<WriteDescriptorSet>,
    bindings: Vec<DescriptorSetLayoutBinding>,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn builder(
        layout_cache: &'a mut DescriptorLayoutCache,
        allocator: &'a mut DescriptorAllocator,
    ) -> Self {
        DescriptorBuilder {
            layout_cache,
            allocator,
            writes: vec![],
            bindings: vec![],
        }
    }

    fn push_binding(&mut self, binding: u32, descriptor_type: DescriptorType, stage_flags: ShaderStageFlags) {
        self.bindings.push(
            DescriptorSetLayoutBinding::builder()
                .descriptor_count(1)
                .descriptor_type(descriptor_type)
                .stage_flags(stage_flags)
                .binding(binding)
                .build(),
        );
    }

    pub fn bind_buffer(
        mut self,
        binding: u32,
        buffer_info: &'a [DescriptorBufferInfo],
        descriptor_type: DescriptorType,
        stage_flags: ShaderStageFlags,
    ) -> Self {
        self.push_binding(binding, descriptor_type, stage_flags);
        self.writes.push(
            WriteDescriptorSet::builder()
                .descriptor_type(descriptor_type)
                .buffer_info(buffer_info)
                .dst_array_element(0)
                .dst_binding(binding)
                .build(),
        );
        self
    }

    pub fn bind_image(
        mut self,
        binding: u32,
        image_info: &'a [DescriptorImageInfo],
        descriptor_type: DescriptorType,
        stage_flags: ShaderStageFlags,
    ) -> Self {
        self.push_binding(binding, descriptor_type, stage_flags);
        self.writes.push(
            WriteDescriptorSet::builder()
                .descriptor_type(descriptor_type)
                .image_info(image_info)
                .dst_array_element(0)
                .dst_binding(binding)
                .build(),
        );
        self
    }

    pub fn layout(self) -> anyhow::Result<DescriptorSetLayout> {
        self.layout_cache.create_descriptor_layout(&self.bindings)
    }

    pub fn build(mut self) -> anyhow::Result<(DescriptorSet, DescriptorSetLayout)> {
        let layout = self.layout_cache.create_descriptor_layout(&self.bindings)?;
        let set = self.allocator.allocate(layout)?;
        for write in self.writes.iter_mut() {
            write.dst_set = set;
        }
        let device = self
            .allocator
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        unsafe {
            device.update_descriptor_sets(self.writes.as_slice(), &[]);
        }
        Ok((set, layout))
    }
}
