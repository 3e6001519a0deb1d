use ash::vk::CommandBuffer;
use glam::Vec2;

use crate::framework::shared::structs::MouseButtons;

/// デバッグオーバーレイとの契約。ウィジェットの描画は実装側に任せる。<br />
/// Contract with the debug overlay. Widget rendering is left to the implementor.
pub trait UIOverlay {
    /// ジオメトリが変わったら`true`を返す。<br />
    /// Returns `true` when the overlay geometry changed.
    fn update(&mut self) -> bool;
    fn draw(&self, device: &ash::Device, command_buffer: CommandBuffer);
    fn resize(&mut self, width: u32, height: u32);
    fn visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);
    fn updated(&self) -> bool;
    fn set_updated(&mut self, updated: bool);
    fn set_input(&mut self, mouse_position: Vec2, mouse_buttons: MouseButtons, delta_time: f32);
}
