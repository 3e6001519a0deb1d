pub mod vk;
