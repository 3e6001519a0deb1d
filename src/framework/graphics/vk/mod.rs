pub mod buffer;
pub mod descriptor;
pub mod graphics;
pub mod image;
pub mod initializer;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub use buffer::Buffer;
pub use descriptor::*;
pub use graphics::{Graphics, UploadContext, DEFAULT_CLEAR_COLOR, DEFAULT_FENCE_TIMEOUT};
pub use image::Image;
pub use initializer::Initializer;
pub use physical_device::{PhysicalDevice, QueueIndices};
pub use pipeline::{Pipeline, PipelineOptions};
pub use shader::Shader;
pub use swapchain::{FrameStatus, Swapchain};
