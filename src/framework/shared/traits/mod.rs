pub mod disposable;
pub mod mappable;
pub mod renderer;
pub mod resize_target;
pub mod ui_overlay;
pub use disposable::Disposable;
pub use mappable::Mappable;
pub use renderer::Renderer;
pub use resize_target::ResizeTarget;
pub use ui_overlay::UIOverlay;
