//! Fixed-period tick clock.
//!
//! The host calls [`TickClock::begin_frame`] with the current wall-clock
//! instant whenever it gets control, then drains whole ticks with
//! `while clock.should_tick() { .. }`. Time is kept as `Duration` so tick
//! counts never drift with floating-point rounding. Frames that arrive late
//! run several ticks back to back; frames that arrive early run none.

use std::time::{Duration, Instant};

/// Default tick period: every active sprite executes one instruction per tick.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(50);

/// Longest stretch of wall-clock time a single frame may feed in.
pub const DEFAULT_MAX_ACCUMULATED: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct TickClock {
    pub tick_period: Duration,
    pub max_accumulated: Duration,
    accumulator: Duration,
    last_instant: Option<Instant>,
    pub tick_count: u64,
    pub frame_count: u64,
    pub ticks_this_frame: u32,
    pub real_dt: Duration,
}

impl TickClock {
    pub fn new(tick_period: Duration) -> Self {
        let tick_period = if tick_period.is_zero() {
            log::warn!("Tick period of zero requested; using {DEFAULT_TICK_PERIOD:?}");
            DEFAULT_TICK_PERIOD
        } else {
            tick_period
        };
        Self {
            tick_period,
            max_accumulated: DEFAULT_MAX_ACCUMULATED.max(tick_period),
            accumulator: Duration::ZERO,
            last_instant: None,
            tick_count: 0,
            frame_count: 0,
            ticks_this_frame: 0,
            real_dt: Duration::ZERO,
        }
    }

    /// Start measuring from `now`. Resets the tick count and any leftover time.
    pub fn start(&mut self, now: Instant) {
        self.last_instant = Some(now);
        self.accumulator = Duration::ZERO;
        self.tick_count = 0;
        self.frame_count = 0;
        self.ticks_this_frame = 0;
    }

    /// Stop measuring. `begin_frame` feeds no time until the next `start`.
    pub fn stop(&mut self) {
        self.last_instant = None;
        self.accumulator = Duration::ZERO;
        self.ticks_this_frame = 0;
    }

    pub fn is_running(&self) -> bool {
        self.last_instant.is_some()
    }

    pub fn begin_frame(&mut self, now: Instant) {
        self.ticks_this_frame = 0;
        let Some(last) = self.last_instant else {
            self.real_dt = Duration::ZERO;
            return;
        };
        self.real_dt = now.saturating_duration_since(last);
        self.last_instant = Some(now);

        // Spiral-of-death cap
        if self.real_dt > self.max_accumulated {
            log::warn!(
                "Frame took {:.1}ms; capping to {}ms",
                self.real_dt.as_secs_f64() * 1000.0,
                self.max_accumulated.as_millis()
            );
            self.real_dt = self.max_accumulated;
        }

        self.accumulator += self.real_dt;
        self.frame_count += 1;
    }

    pub fn should_tick(&mut self) -> bool {
        if self.is_running() && self.accumulator >= self.tick_period {
            self.accumulator -= self.tick_period;
            self.tick_count += 1;
            self.ticks_this_frame += 1;
            true
        } else {
            false
        }
    }

    /// Time until the next tick is due, for hosts that sleep between frames.
    pub fn until_next_tick(&self) -> Duration {
        self.tick_period.saturating_sub(self.accumulator)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}
