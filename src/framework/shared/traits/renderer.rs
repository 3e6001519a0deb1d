use ash::vk::PhysicalDeviceFeatures;

use crate::framework::graphics::vk::Graphics;
use crate::framework::shared::traits::UIOverlay;

/// レンダラーベースに組み込まれるフック。`render`以外は既定の実装を持つ。<br />
/// Hooks composed into the renderer base. Everything except `render` has a default.
pub trait Renderer {
    /// `Graphics::prepare`の後に一度だけ呼ばれる。<br />
    /// Called once after `Graphics::prepare`.
    fn prepare(&mut self, _graphics: &mut Graphics) -> anyhow::Result<()> {
        Ok(())
    }

    fn render(&mut self, graphics: &mut Graphics) -> anyhow::Result<()>;

    fn view_changed(&mut self, _graphics: &mut Graphics) -> anyhow::Result<()> {
        Ok(())
    }

    fn mouse_moved(&mut self, _x: f32, _y: f32, _handled: &mut bool) {}

    fn window_resized(&mut self, _graphics: &mut Graphics) -> anyhow::Result<()> {
        Ok(())
    }

    /// 論理デバイスで有効にする機能を選ぶ。<br />
    /// Selects the features to enable on the logical device.
    fn get_enabled_features(&mut self, available: &PhysicalDeviceFeatures) -> PhysicalDeviceFeatures {
        PhysicalDeviceFeatures {
            sampler_anisotropy: available.sampler_anisotropy,
            ..Default::default()
        }
    }

    fn build_command_buffers(&mut self, _graphics: &mut Graphics) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_update_ui_overlay(&mut self, _overlay: &mut dyn UIOverlay) {}
}
