use std::collections::VecDeque;
use std::time::Duration;

/// フレーム時間の履歴の長さ。<br />
/// Length of the frame time history.
pub const FRAME_TIME_HISTORY: usize = 50;

/// アニメーションタイマーの既定の速度。<br />
/// Default speed of the animation timer.
pub const DEFAULT_TIMER_SPEED: f32 = 0.25;

const FPS_INTERVAL_MS: f64 = 1000.0;

/// フレームのタイミングとFPSを計測する。<br />
/// Tracks frame timing and the FPS estimate.
#[derive(Clone, Debug)]
pub struct FrameTimer {
    pub frame_counter: u32,
    /// 最後のフレームの時間（秒）。<br />
    /// Duration of the last frame in seconds.
    pub frame_timer: f32,
    /// `[0, 1)`で循環するアニメーションタイマー。<br />
    /// Animation timer wrapping in `[0, 1)`.
    pub timer: f32,
    pub timer_speed: f32,
    pub paused: bool,
    pub last_fps: u32,
    pub frame_time_min: f32,
    pub frame_time_max: f32,
    fps_timer_ms: f64,
    frame_times: VecDeque<f32>,
}

impl Default for FrameTimer {
    fn default() -> Self {
        FrameTimer {
            frame_counter: 0,
            frame_timer: 1.0,
            timer: 0.0,
            timer_speed: DEFAULT_TIMER_SPEED,
            paused: false,
            last_fps: 0,
            frame_time_min: f32::MAX,
            frame_time_max: 0.0,
            fps_timer_ms: 0.0,
            frame_times: VecDeque::with_capacity(FRAME_TIME_HISTORY),
        }
    }
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// フレームを一つ進める。新しいFPSが計算されたら返す。<br />
    /// Advances by one frame. Returns the new FPS value when one is published.
    pub fn tick(&mut self, frame_duration: Duration) -> Option<u32> {
        self.frame_counter += 1;
        let frame_ms = frame_duration.as_secs_f64() * 1000.0;
        self.frame_timer = (frame_ms / 1000.0) as f32;
        self.record_frame_time(frame_ms as f32);

        if !self.paused {
            self.timer += self.timer_speed * self.frame_timer;
            if self.timer > 1.0 {
                self.timer -= 1.0;
            }
        }

        self.fps_timer_ms += frame_ms;
        if self.fps_timer_ms > FPS_INTERVAL_MS {
            self.last_fps = (self.frame_counter as f64 * (1000.0 / self.fps_timer_ms)) as u32;
            self.frame_counter = 0;
            self.fps_timer_ms = 0.0;
            Some(self.last_fps)
        } else {
            None
        }
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn frame_times(&self) -> &VecDeque<f32> {
        &self.frame_times
    }

    pub fn window_title(&self, title: &str, device_name: &str) -> String {
        format!("{} - {} - {} fps", title, device_name, self.last_fps)
    }

    fn record_frame_time(&mut self, frame_ms: f32) {
        if self.frame_times.len() == FRAME_TIME_HISTORY {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(frame_ms);
        self.frame_time_min = self.frame_time_min.min(frame_ms);
        self.frame_time_max = self.frame_time_max.max(frame_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_wraps_at_one() {
        let mut timer = FrameTimer::new();
        timer.timer_speed = 1.0;
        timer.tick(Duration::from_millis(600));
        assert!((timer.timer - 0.6).abs() < 1e-5);
        timer.tick(Duration::from_millis(600));
        assert!((timer.timer - 0.2).abs() < 1e-5);
    }

    #[test]
    fn paused_timer_does_not_advance() {
        let mut timer = FrameTimer::new();
        assert!(timer.toggle_pause());
        timer.tick(Duration::from_millis(500));
        assert_eq!(timer.timer, 0.0);
        assert!((timer.frame_timer - 0.5).abs() < 1e-5);
    }

    #[test]
    fn fps_is_published_after_one_second() {
        let mut timer = FrameTimer::new();
        for _ in 0..3 {
            assert_eq!(timer.tick(Duration::from_millis(300)), None);
        }
        assert_eq!(timer.tick(Duration::from_millis(300)), Some(3));
        assert_eq!(timer.frame_counter, 0);
        assert_eq!(timer.last_fps, 3);
        assert_eq!(
            timer.window_title("Vulkan Example", "Test GPU"),
            "Vulkan Example - Test GPU - 3 fps"
        );
    }

    #[test]
    fn frame_time_history_is_bounded() {
        let mut timer = FrameTimer::new();
        for i in 0..(FRAME_TIME_HISTORY + 10) {
            timer.tick(Duration::from_millis(1 + i as u64));
        }
        assert_eq!(timer.frame_times().len(), FRAME_TIME_HISTORY);
        assert!((timer.frame_time_min - 1.0).abs() < 1e-3);
        assert!((timer.frame_time_max - (FRAME_TIME_HISTORY + 10) as f32).abs() < 1e-3);
    }
}
