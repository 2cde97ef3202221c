//! One-shot, cancelable bubble-clear timers keyed by sprite.
//!
//! These run on wall-clock deadlines, independent of the tick cadence. Each
//! sprite has at most one pending deadline; scheduling a new bubble replaces
//! (cancels) the previous one. The session polls [`BubbleTimers::take_expired`]
//! after every frame and clears the bubbles it returns.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use stage_core::SpriteId;

/// Longest a bubble may stay up before its timer clears it.
pub const MAX_BUBBLE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default)]
pub struct BubbleTimers {
    deadlines: HashMap<SpriteId, Instant>,
}

impl BubbleTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for `id`'s bubble to clear `seconds` after `now`. Returns true if
    /// this superseded a pending timer.
    pub fn schedule(&mut self, id: &SpriteId, now: Instant, seconds: f32) -> bool {
        let lifetime = match Duration::try_from_secs_f32(seconds) {
            Ok(lifetime) if lifetime <= MAX_BUBBLE_LIFETIME => lifetime,
            Err(_) if !(seconds.is_finite() && seconds > 0.0) => {
                log::warn!("Bubble lifetime {seconds}s for '{id}' is invalid; clearing immediately");
                Duration::ZERO
            }
            _ => {
                log::warn!(
                    "Bubble lifetime {seconds}s for '{id}' is too long; capping to {}s",
                    MAX_BUBBLE_LIFETIME.as_secs()
                );
                MAX_BUBBLE_LIFETIME
            }
        };
        let deadline = now.checked_add(lifetime).unwrap_or_else(|| {
            log::warn!("Bubble deadline for '{id}' is out of range; clearing immediately");
            now
        });
        self.deadlines.insert(id.clone(), deadline).is_some()
    }

    pub fn cancel(&mut self, id: &SpriteId) -> bool {
        self.deadlines.remove(id).is_some()
    }

    pub fn cancel_all(&mut self) {
        if !self.deadlines.is_empty() {
            log::debug!("Cancelling {} pending bubble timer(s)", self.deadlines.len());
        }
        self.deadlines.clear();
    }

    pub fn deadline(&self, id: &SpriteId) -> Option<Instant> {
        self.deadlines.get(id).copied()
    }

    pub fn pending(&self) -> usize {
        self.deadlines.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at or before `now`, in id order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<SpriteId> {
        let mut expired: Vec<SpriteId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.deadlines.remove(id);
        }
        expired.sort();
        expired
    }
}
