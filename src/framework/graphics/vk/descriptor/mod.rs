pub mod descriptor_allocator;
pub mod descriptor_builder;
pub mod descriptor_layout_cache;
pub use descriptor_allocator::DescriptorAllocator;
pub use descriptor_builder::DescriptorBuilder;
pub use descriptor_layout_cache::DescriptorLayoutCache;
