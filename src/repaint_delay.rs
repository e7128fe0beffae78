//! Adaptive repaint delay.
//!
//! After the display reports it is ready for a new frame we may wait a few
//! milliseconds before painting, so that clients get a chance to commit fresh
//! content for this refresh. The wait grows slowly while frames land on time
//! and shrinks exponentially when a deadline is missed.

use std::time::Duration;

const MIN_INCREASE_WINDOW: Duration = Duration::from_millis(200);
const MAX_INCREASE_WINDOW: Duration = Duration::from_secs(30);
const MAX_CONSECUTIVE_DECREASE: i64 = 32;
/// On-time frames after an increase during which a miss widens the increase window.
const INCREASE_GRACE_FRAMES: i64 = 20;

#[derive(Debug, Clone)]
pub struct RepaintDelayScheduler {
    delay_ms: i64,
    increase_window: Duration,
    last_increase: Duration,
    expand_inc_window_on_miss: i64,
    consecutive_decrease: i64,
    last_pageflip: Option<Duration>,
    refresh_interval: Duration,
    max_render_time: i32,
    dynamic_delay: bool,
}

fn clamp_window(window: Duration) -> Duration {
    window.clamp(MIN_INCREASE_WINDOW, MAX_INCREASE_WINDOW)
}

impl RepaintDelayScheduler {
    pub fn new(refresh_interval: Duration, max_render_time: i32, dynamic_delay: bool) -> Self {
        Self {
            delay_ms: 0,
            increase_window: MIN_INCREASE_WINDOW,
            last_increase: Duration::ZERO,
            expand_inc_window_on_miss: 0,
            consecutive_decrease: 1,
            last_pageflip: None,
            refresh_interval,
            max_render_time,
            dynamic_delay,
        }
    }

    /// Refresh interval as measured by the latest present event.
    pub fn set_refresh_interval(&mut self, refresh_interval: Duration) {
        if refresh_interval.is_zero() {
            return;
        }
        self.refresh_interval = refresh_interval;
        self.update_delay(0);
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn set_limits(&mut self, max_render_time: i32, dynamic_delay: bool) {
        self.max_render_time = max_render_time;
        self.dynamic_delay = dynamic_delay;
        self.update_delay(0);
    }

    /// The coming frame will not be painted, so its duration means nothing.
    pub fn skip_frame(&mut self) {
        self.last_pageflip = None;
    }

    pub fn start_frame(&mut self, now: Duration) {
        let Some(last_pageflip) = self.last_pageflip.replace(now) else {
            return;
        };

        let last_frame_len = now.saturating_sub(last_pageflip);
        let on_time = last_frame_len <= self.refresh_interval.mul_f64(1.5);

        if on_time {
            if now.saturating_sub(self.last_increase) >= self.increase_window {
                self.increase_window = clamp_window(self.increase_window.mul_f64(0.75));
                self.update_delay(1);
                self.last_increase = now;
                self.expand_inc_window_on_miss = INCREASE_GRACE_FRAMES;
            } else {
                self.expand_inc_window_on_miss -= 1;
            }
            self.consecutive_decrease = 1;
        } else {
            tracing::trace!(
                frame_ms = last_frame_len.as_millis() as u64,
                decrease = self.consecutive_decrease,
                "missed frame deadline"
            );
            self.update_delay(-self.consecutive_decrease);
            self.consecutive_decrease = (self.consecutive_decrease * 2).clamp(1, MAX_CONSECUTIVE_DECREASE);
            if self.expand_inc_window_on_miss > 0 {
                self.increase_window = clamp_window(self.increase_window * 2);
            }
            self.last_increase = now;
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms as u64)
    }

    pub fn delay_ms(&self) -> i64 {
        self.delay_ms
    }

    pub fn increase_window(&self) -> Duration {
        self.increase_window
    }

    pub fn consecutive_decrease(&self) -> i64 {
        self.consecutive_decrease
    }

    /// Time left for clients after subtracting the render budget from one refresh.
    pub fn config_delay_ms(&self) -> i64 {
        (self.refresh_interval.as_millis() as i64 - self.max_render_time as i64).max(0)
    }

    fn delay_bounds(&self) -> (i64, i64) {
        let config_delay = self.config_delay_ms();
        if self.max_render_time == -1 {
            (0, 0)
        } else if !self.dynamic_delay {
            (config_delay, config_delay)
        } else {
            (0, config_delay)
        }
    }

    fn update_delay(&mut self, delta: i64) {
        let (min, max) = self.delay_bounds();
        self.delay_ms = (self.delay_ms + delta).clamp(min, max);
    }
}
