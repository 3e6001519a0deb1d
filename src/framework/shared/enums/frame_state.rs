/// レンダラーのライフサイクルの状態。<br />
/// Lifecycle state of the renderer base.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameState {
    Uninitialized,
    Prepared,
    Resizing,
    Destroyed,
}

impl Default for FrameState {
    fn default() -> Self {
        FrameState::Uninitialized
    }
}
