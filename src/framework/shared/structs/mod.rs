pub mod frame_timer;
pub mod frustum;
pub mod mouse_buttons;
pub mod settings;
pub use frame_timer::*;
pub use frustum::*;
pub use mouse_buttons::*;
pub use settings::Settings;
