use std::time::Instant;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{
    ElementState, Event, KeyboardInput, MouseButton as WinitMouseButton, MouseScrollDelta,
    VirtualKeyCode, WindowEvent,
};
use winit::event_loop::EventLoop;
use winit::window::{Fullscreen, Window, WindowBuilder};

use crate::framework::graphics::vk::Graphics;
use crate::framework::shared::structs::{MouseButton, Settings};
use crate::framework::shared::traits::{Renderer, ResizeTarget};
use crate::framework::shared::FrameLifecycle;

/// 一回のホイール操作あたりの量。<br />
/// Amount reported for one notch of the mouse wheel.
const WHEEL_DELTA: f32 = 120.0;

/// サイズ変更の間だけ`Graphics`とレンダラーを束ねる。<br />
/// Pairs `Graphics` with the renderer hooks for the duration of a resize.
pub struct ResizeContext<'a, R: Renderer> {
    pub graphics: &'a mut Graphics,
    pub renderer: &'a mut R,
}

impl<'a, R: Renderer> ResizeTarget for ResizeContext<'a, R> {
    fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.graphics.wait_idle()
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.graphics.recreate_swapchain(width, height)
    }

    fn recreate_depth_stencil(&mut self) -> anyhow::Result<()> {
        self.graphics.recreate_depth_stencil()
    }

    fn recreate_framebuffers(&mut self) -> anyhow::Result<()> {
        self.graphics.recreate_framebuffers()
    }

    fn resize_overlay(&mut self, width: u32, height: u32) {
        self.graphics.resize_overlay(width, height);
    }

    fn recreate_command_buffers(&mut self) -> anyhow::Result<()> {
        self.graphics.recreate_command_buffers()
    }

    fn build_command_buffers(&mut self) -> anyhow::Result<()> {
        self.renderer.build_command_buffers(self.graphics)
    }

    fn update_aspect_ratio(&mut self, aspect: f32) {
        self.graphics.camera.update_aspect_ratio(aspect);
    }

    fn window_resized(&mut self) -> anyhow::Result<()> {
        self.renderer.window_resized(self.graphics)
    }

    fn view_changed(&mut self) -> anyhow::Result<()> {
        self.renderer.view_changed(self.graphics)
    }
}

/// レンダラーベース。ウィンドウ、`Graphics`、フレームのライフサイクルとレンダラーのフックを組み合わせる。<br />
/// フィールドの順序は破棄の順序でもある。レンダラーは`Graphics`より先に破棄される。<br />
/// The renderer base. Composes the window, `Graphics`, the frame lifecycle and the renderer hooks.<br />
/// Field order is drop order: the renderer is dropped before `Graphics`.
pub struct Application<R: Renderer> {
    pub renderer: R,
    pub graphics: Graphics,
    pub lifecycle: FrameLifecycle,
    pub window: Window,
    exit_requested: bool,
    last_frame: Instant,
}

impl<R: Renderer + 'static> Application<R> {
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
        settings: Settings,
        mut renderer: R,
    ) -> anyhow::Result<Self> {
        let mut builder = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(LogicalSize::new(width, height));
        if settings.fullscreen {
            builder = builder.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = builder.build(event_loop)?;
        let size = window.inner_size();
        log::info!("Window created ({}x{}).", size.width, size.height);

        let graphics = Graphics::init_vulkan(
            &window,
            title,
            size.width,
            size.height,
            settings,
            |available| renderer.get_enabled_features(available),
        )?;
        Ok(Application {
            renderer,
            graphics,
            lifecycle: FrameLifecycle::new(size.width, size.height),
            window,
            exit_requested: false,
            last_frame: Instant::now(),
        })
    }

    /// `Graphics`の準備とレンダラーの準備を行い、状態を`Prepared`にする。<br />
    /// Prepares `Graphics` and the renderer, then enters the `Prepared` state.
    pub fn prepare(&mut self) -> anyhow::Result<()> {
        self.graphics.prepare()?;
        self.renderer.prepare(&mut self.graphics)?;
        self.lifecycle.mark_prepared();
        self.last_frame = Instant::now();
        Ok(())
    }

    pub fn window_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        let mut context = ResizeContext {
            graphics: &mut self.graphics,
            renderer: &mut self.renderer,
        };
        self.lifecycle.window_resize(&mut context, width, height)?;
        Ok(())
    }

    /// 一フレーム分を進める。<br />
    /// Runs one frame.
    pub fn next_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let frame_duration = now - self.last_frame;
        self.last_frame = now;

        if self.lifecycle.take_view_updated() {
            self.renderer.view_changed(&mut self.graphics)?;
        }
        self.graphics.frame_timer = self.lifecycle.timer.frame_timer;
        self.graphics.paused = self.lifecycle.timer.paused;
        self.renderer.render(&mut self.graphics)?;
        if std::mem::take(&mut self.graphics.resize_requested) {
            let size = self.window.inner_size();
            self.window_resize(size.width, size.height)?;
        }

        if self
            .lifecycle
            .advance(&mut self.graphics.camera, frame_duration)
            .is_some()
        {
            let title = self.lifecycle.timer.window_title(
                &self.graphics.title,
                &self.graphics.physical_device.device_name,
            );
            self.window.set_title(&title);
        }
        self.update_overlay()
    }

    fn update_overlay(&mut self) -> anyhow::Result<()> {
        let rebuild = match self.graphics.overlay.as_mut() {
            Some(overlay) if self.graphics.settings.overlay && overlay.visible() => {
                overlay.set_input(
                    self.lifecycle.mouse_position,
                    self.lifecycle.mouse_buttons,
                    self.lifecycle.timer.frame_timer,
                );
                self.renderer.on_update_ui_overlay(overlay.as_mut());
                let rebuild = overlay.update() || overlay.updated();
                if rebuild {
                    overlay.set_updated(false);
                }
                rebuild
            }
            _ => false,
        };
        if rebuild {
            self.renderer.build_command_buffers(&mut self.graphics)?;
        }
        Ok(())
    }

    /// ウィンドウのイベントを処理する。終了が要求されたら`true`を返す。<br />
    /// Handles a window event. Returns `true` once exit has been requested.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> anyhow::Result<bool> {
        match event {
            WindowEvent::CloseRequested => self.exit_requested = true,
            WindowEvent::Resized(size) => {
                if self.lifecycle.is_prepared() {
                    self.window_resize(size.width, size.height)?;
                }
            }
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state,
                        virtual_keycode: Some(key),
                        ..
                    },
                ..
            } => self.handle_key(*key, *state == ElementState::Pressed),
            WindowEvent::MouseInput { state, button, .. } => {
                let button = match button {
                    WinitMouseButton::Left => MouseButton::Left,
                    WinitMouseButton::Right => MouseButton::Right,
                    WinitMouseButton::Middle => MouseButton::Middle,
                    WinitMouseButton::Other(_) => return Ok(self.exit_requested),
                };
                self.lifecycle
                    .set_mouse_button(button, *state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => self.handle_mouse_move(*position),
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y * WHEEL_DELTA,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32,
                };
                self.lifecycle
                    .handle_mouse_wheel(&mut self.graphics.camera, delta);
            }
            _ => (),
        }
        Ok(self.exit_requested)
    }

    fn handle_mouse_move(&mut self, position: PhysicalPosition<f64>) {
        let (x, y) = (position.x as f32, position.y as f32);
        let mut handled = false;
        self.renderer.mouse_moved(x, y, &mut handled);
        self.lifecycle
            .handle_mouse_move(&mut self.graphics.camera, x, y, handled);
    }

    fn handle_key(&mut self, key: VirtualKeyCode, pressed: bool) {
        let keys = &mut self.graphics.camera.keys;
        match key {
            VirtualKeyCode::W => keys.up = pressed,
            VirtualKeyCode::S => keys.down = pressed,
            VirtualKeyCode::A => keys.left = pressed,
            VirtualKeyCode::D => keys.right = pressed,
            VirtualKeyCode::P if pressed => {
                let paused = self.lifecycle.timer.toggle_pause();
                log::info!("Animation timer {}.", if paused { "paused" } else { "resumed" });
            }
            VirtualKeyCode::F1 if pressed => {
                if let Some(overlay) = self.graphics.overlay.as_mut() {
                    let visible = !overlay.visible();
                    overlay.set_visible(visible);
                    overlay.set_updated(true);
                }
            }
            VirtualKeyCode::Escape if pressed => self.exit_requested = true,
            _ => (),
        }
    }

    /// イベントループを回す。戻らない。<br />
    /// Runs the event loop. Never returns.
    pub fn run(mut self, event_loop: EventLoop<()>) -> ! {
        event_loop.run(move |event, _target, control_flow| {
            control_flow.set_poll();
            match event {
                Event::WindowEvent { event, .. } => match self.handle_window_event(&event) {
                    Ok(true) => control_flow.set_exit(),
                    Ok(false) => (),
                    Err(e) => {
                        log::error!("Failed to handle window event: {:?}", e);
                        control_flow.set_exit();
                    }
                },
                Event::MainEventsCleared => {
                    if self.lifecycle.is_prepared() {
                        if let Err(e) = self.next_frame() {
                            log::error!("Failed to render frame: {:?}", e);
                            control_flow.set_exit();
                        }
                    }
                }
                Event::LoopDestroyed => {
                    if let Err(e) = self.graphics.wait_idle() {
                        log::error!("{:?}", e);
                    }
                    self.lifecycle.mark_destroyed();
                    log::info!("Event loop destroyed.");
                }
                _ => (),
            }
        })
    }
}
