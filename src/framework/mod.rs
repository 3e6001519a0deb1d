pub mod application;
pub mod graphics;
pub mod scene;
pub mod shared;

pub use application::{Application, ResizeContext};
