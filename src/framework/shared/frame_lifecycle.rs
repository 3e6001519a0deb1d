use glam::{Vec2, Vec3};
use std::time::Duration;

use crate::framework::shared::enums::FrameState;
use crate::framework::shared::structs::{FrameTimer, MouseButton, MouseButtons};
use crate::framework::shared::traits::ResizeTarget;
use crate::framework::shared::Camera;

const ZOOM_SPEED: f32 = 0.005;
const PAN_SPEED: f32 = 0.01;

/// フレームのライフサイクルの状態機械。<br />
/// GPU資源には触れず、サイズ変更の手順は`ResizeTarget`に委ねる。<br />
/// State machine of the frame lifecycle.<br />
/// It never touches GPU resources directly; the resize sequence is delegated to a `ResizeTarget`.
#[derive(Clone, Debug)]
pub struct FrameLifecycle {
    pub state: FrameState,
    pub dest_width: u32,
    pub dest_height: u32,
    pub view_updated: bool,
    pub resized: bool,
    pub mouse_position: Vec2,
    pub mouse_buttons: MouseButtons,
    pub timer: FrameTimer,
}

impl FrameLifecycle {
    pub fn new(width: u32, height: u32) -> Self {
        FrameLifecycle {
            state: FrameState::Uninitialized,
            dest_width: width,
            dest_height: height,
            view_updated: false,
            resized: false,
            mouse_position: Vec2::ZERO,
            mouse_buttons: MouseButtons::default(),
            timer: FrameTimer::new(),
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.state == FrameState::Prepared
    }

    pub fn mark_prepared(&mut self) {
        self.state = FrameState::Prepared;
    }

    pub fn mark_destroyed(&mut self) {
        self.state = FrameState::Destroyed;
    }

    /// 前のフレームからビューが変わったかどうかを返し、フラグをクリアする。<br />
    /// Returns whether the view changed since the last frame and clears the flag.
    pub fn take_view_updated(&mut self) -> bool {
        std::mem::replace(&mut self.view_updated, false)
    }

    /// スワップチェーンとそれに依存する資源を作り直す。<br />
    /// 幅か高さがゼロの場合、スワップチェーン・深度・フレームバッファの再生成は省略されるが、
    /// 手順は最後まで実行され状態は`Prepared`に戻る。<br />
    /// Rebuilds the swapchain and every resource depending on it.<br />
    /// When the width or height is zero the swapchain, depth and framebuffer recreation is skipped,
    /// but the sequence still completes and the state returns to `Prepared`.
    pub fn window_resize<T: ResizeTarget + ?Sized>(
        &mut self,
        target: &mut T,
        width: u32,
        height: u32,
    ) -> anyhow::Result<bool> {
        if !self.is_prepared() {
            return Ok(false);
        }
        self.state = FrameState::Resizing;
        self.resized = true;
        let result = self.resize_sequence(target, width, height);
        self.state = FrameState::Prepared;
        result.map(|_| true)
    }

    fn resize_sequence<T: ResizeTarget + ?Sized>(
        &mut self,
        target: &mut T,
        width: u32,
        height: u32,
    ) -> anyhow::Result<()> {
        target.wait_idle()?;
        self.dest_width = width;
        self.dest_height = height;
        let has_area = width > 0 && height > 0;

        if has_area {
            target.recreate_swapchain(width, height)?;
            target.recreate_depth_stencil()?;
            target.recreate_framebuffers()?;
            target.resize_overlay(width, height);
        } else {
            log::info!("Window has no drawable area. Skipping swapchain recreation.");
        }

        target.recreate_command_buffers()?;
        target.build_command_buffers()?;
        target.wait_idle()?;

        if has_area {
            target.update_aspect_ratio(width as f32 / height as f32);
        }

        target.window_resized()?;
        target.view_changed()
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.mouse_buttons.set(button, pressed);
    }

    /// マウスの移動をカメラに反映する。`handled`はレンダラーのフックが処理済みかどうか。<br />
    /// Applies mouse movement to the camera. `handled` tells whether the renderer hook consumed it.
    pub fn handle_mouse_move(&mut self, camera: &mut Camera, x: f32, y: f32, handled: bool) {
        let dx = self.mouse_position.x - x;
        let dy = self.mouse_position.y - y;

        if handled {
            self.mouse_position = Vec2::new(x, y);
            return;
        }

        if self.mouse_buttons.left {
            camera.rotate(Vec3::new(
                dy * camera.rotation_speed,
                -dx * camera.rotation_speed,
                0.0,
            ));
            self.view_updated = true;
        }
        if self.mouse_buttons.right {
            camera.translate(Vec3::new(0.0, 0.0, dy * ZOOM_SPEED));
            self.view_updated = true;
        }
        if self.mouse_buttons.middle {
            camera.translate(Vec3::new(-dx * PAN_SPEED, -dy * PAN_SPEED, 0.0));
            self.view_updated = true;
        }
        self.mouse_position = Vec2::new(x, y);
    }

    pub fn handle_mouse_wheel(&mut self, camera: &mut Camera, delta: f32) {
        camera.translate(Vec3::new(0.0, 0.0, delta * ZOOM_SPEED));
        self.view_updated = true;
    }

    /// タイマーとカメラを進める。新しいFPSが計算されたら返す。<br />
    /// Advances the timer and the camera. Returns the new FPS value when one is published.
    pub fn advance(&mut self, camera: &mut Camera, frame_duration: Duration) -> Option<u32> {
        let fps = self.timer.tick(frame_duration);
        camera.update(self.timer.frame_timer);
        if camera.moving() {
            self.view_updated = true;
        }
        fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::shared::enums::CameraType;

    #[derive(Default)]
    struct RecordingTarget {
        calls: Vec<String>,
        fail_framebuffers: bool,
    }

    impl ResizeTarget for RecordingTarget {
        fn wait_idle(&mut self) -> anyhow::Result<()> {
            self.calls.push("wait_idle".to_string());
            Ok(())
        }

        fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
            self.calls.push(format!("swapchain {}x{}", width, height));
            Ok(())
        }

        fn recreate_depth_stencil(&mut self) -> anyhow::Result<()> {
            self.calls.push("depth_stencil".to_string());
            Ok(())
        }

        fn recreate_framebuffers(&mut self) -> anyhow::Result<()> {
            self.calls.push("framebuffers".to_string());
            if self.fail_framebuffers {
                return Err(anyhow::anyhow!("framebuffer creation failed"));
            }
            Ok(())
        }

        fn resize_overlay(&mut self, width: u32, height: u32) {
            self.calls.push(format!("overlay {}x{}", width, height));
        }

        fn recreate_command_buffers(&mut self) -> anyhow::Result<()> {
            self.calls.push("command_buffers".to_string());
            Ok(())
        }

        fn build_command_buffers(&mut self) -> anyhow::Result<()> {
            self.calls.push("build".to_string());
            Ok(())
        }

        fn update_aspect_ratio(&mut self, aspect: f32) {
            self.calls.push(format!("aspect {:.2}", aspect));
        }

        fn window_resized(&mut self) -> anyhow::Result<()> {
            self.calls.push("window_resized".to_string());
            Ok(())
        }

        fn view_changed(&mut self) -> anyhow::Result<()> {
            self.calls.push("view_changed".to_string());
            Ok(())
        }
    }

    #[test]
    fn resize_runs_the_full_sequence() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        lifecycle.mark_prepared();
        let mut target = RecordingTarget::default();
        assert!(lifecycle.window_resize(&mut target, 800, 400).unwrap());
        assert_eq!(
            target.calls,
            vec![
                "wait_idle",
                "swapchain 800x400",
                "depth_stencil",
                "framebuffers",
                "overlay 800x400",
                "command_buffers",
                "build",
                "wait_idle",
                "aspect 2.00",
                "window_resized",
                "view_changed",
            ]
        );
        assert!(lifecycle.is_prepared());
        assert!(lifecycle.resized);
        assert_eq!((lifecycle.dest_width, lifecycle.dest_height), (800, 400));
    }

    #[test]
    fn zero_sized_resize_skips_swapchain_but_completes() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        lifecycle.mark_prepared();
        let mut target = RecordingTarget::default();
        assert!(lifecycle.window_resize(&mut target, 0, 720).unwrap());
        assert!(!target.calls.iter().any(|c| c.starts_with("swapchain")));
        assert!(!target.calls.iter().any(|c| c == "framebuffers"));
        assert!(!target.calls.iter().any(|c| c.starts_with("aspect")));
        assert!(target.calls.iter().any(|c| c == "view_changed"));
        assert_eq!(lifecycle.state, FrameState::Prepared);
    }

    #[test]
    fn failed_resize_still_accepts_the_next_one() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        lifecycle.mark_prepared();
        let mut target = RecordingTarget {
            fail_framebuffers: true,
            ..Default::default()
        };
        assert!(lifecycle.window_resize(&mut target, 800, 400).is_err());
        assert!(!target.calls.iter().any(|c| c == "build"));
        assert!(lifecycle.is_prepared());

        target.fail_framebuffers = false;
        target.calls.clear();
        assert!(lifecycle.window_resize(&mut target, 640, 480).unwrap());
        assert!(target.calls.iter().any(|c| c == "view_changed"));
    }

    #[test]
    fn resize_before_prepare_is_ignored() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        let mut target = RecordingTarget::default();
        assert!(!lifecycle.window_resize(&mut target, 640, 480).unwrap());
        assert!(target.calls.is_empty());
        assert_eq!(lifecycle.state, FrameState::Uninitialized);
    }

    #[test]
    fn left_drag_rotates_and_flags_view() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        let mut camera = Camera::new(CameraType::LookAt);
        lifecycle.handle_mouse_move(&mut camera, 100.0, 100.0, false);
        assert!(!lifecycle.view_updated);

        lifecycle.set_mouse_button(MouseButton::Left, true);
        lifecycle.handle_mouse_move(&mut camera, 110.0, 95.0, false);
        assert!(camera.rotation.abs_diff_eq(Vec3::new(5.0, 10.0, 0.0), 1e-5));
        assert!(lifecycle.take_view_updated());
        assert!(!lifecycle.view_updated);
    }

    #[test]
    fn handled_mouse_move_only_records_position() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        let mut camera = Camera::new(CameraType::LookAt);
        lifecycle.set_mouse_button(MouseButton::Right, true);
        lifecycle.handle_mouse_move(&mut camera, 10.0, 20.0, true);
        assert_eq!(camera.position, Vec3::ZERO);
        assert_eq!(lifecycle.mouse_position, Vec2::new(10.0, 20.0));
        assert!(!lifecycle.view_updated);
    }

    #[test]
    fn wheel_zooms_the_camera() {
        let mut lifecycle = FrameLifecycle::new(1280, 720);
        let mut camera = Camera::new(CameraType::LookAt);
        lifecycle.handle_mouse_wheel(&mut camera, 200.0);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
        assert!(lifecycle.view_updated);
    }
}
