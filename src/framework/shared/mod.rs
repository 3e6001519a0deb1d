pub mod camera;
pub mod enums;
pub mod frame_lifecycle;
pub mod structs;
pub mod traits;
pub mod util;

pub use camera::{Camera, CameraKeys, CameraMatrices};
pub use frame_lifecycle::FrameLifecycle;
