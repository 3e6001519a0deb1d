/// ウィンドウのサイズ変更で再生成される資源。<br />
/// Resources rebuilt by a window resize.
pub trait ResizeTarget {
    fn wait_idle(&mut self) -> anyhow::Result<()>;
    fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()>;
    fn recreate_depth_stencil(&mut self) -> anyhow::Result<()>;
    fn recreate_framebuffers(&mut self) -> anyhow::Result<()>;
    fn resize_overlay(&mut self, width: u32, height: u32);
    fn recreate_command_buffers(&mut self) -> anyhow::Result<()>;
    fn build_command_buffers(&mut self) -> anyhow::Result<()>;
    fn update_aspect_ratio(&mut self, aspect: f32);
    fn window_resized(&mut self) -> anyhow::Result<()>;
    fn view_changed(&mut self) -> anyhow::Result<()>;
}
