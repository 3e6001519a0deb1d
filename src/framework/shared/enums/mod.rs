pub mod camera_type;
pub mod frame_state;
pub mod vertex_component;
pub use camera_type::CameraType;
pub use frame_state::FrameState;
pub use vertex_component::VertexComponent;
