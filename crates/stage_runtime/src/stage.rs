//! A play session: the tick scheduler plus everything it drives.
//!
//! Per tick, in this order:
//!  1. every sprite's interpreter ticks once, in registry order;
//!  2. every `collision_every_ticks` ticks, the collision scan runs against
//!     the poses committed in step 1.
//!
//! Bubble timers are checked once per [`Stage::advance`] call against the
//! wall clock, independent of how many ticks that call ran.

use std::time::{Duration, Instant};

use serde::Deserialize;
use stage_core::program::Trigger;
use stage_core::sprite::SpriteId;
use stage_core::time::{DEFAULT_MAX_ACCUMULATED, DEFAULT_TICK_PERIOD};
use stage_core::{TickClock, MAX_MOVE_INCREMENT};

use crate::bubble::BubbleTimers;
use crate::collision::{CollisionCoordinator, ContactMode, DEFAULT_SPRITE_SIZE};
use crate::interpreter::{SpriteSnapshot, TickEffect};
use crate::registry::{SpriteRegistry, SpriteSpec};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StageConfig {
    pub tick_period_ms: u64,
    /// Collision scan cadence, in ticks.
    pub collision_every_ticks: u32,
    pub sprite_size: f32,
    pub contact: ContactMode,
    pub swap_cooldown_ticks: u32,
    pub max_accumulated_ms: u64,
    pub max_move_increment: f32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD.as_millis() as u64,
            collision_every_ticks: 1,
            sprite_size: DEFAULT_SPRITE_SIZE,
            contact: ContactMode::default(),
            swap_cooldown_ticks: 0,
            max_accumulated_ms: DEFAULT_MAX_ACCUMULATED.as_millis() as u64,
            max_move_increment: MAX_MOVE_INCREMENT,
        }
    }
}

impl StageConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn max_accumulated(&self) -> Duration {
        Duration::from_millis(self.max_accumulated_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_period_ms == 0 {
            return Err("Stage config validation failed: tick_period_ms must be > 0".to_string());
        }
        if self.collision_every_ticks == 0 {
            return Err(
                "Stage config validation failed: collision_every_ticks must be >= 1".to_string(),
            );
        }
        if !self.sprite_size.is_finite() || self.sprite_size <= 0.0 {
            return Err(format!(
                "Stage config validation failed: sprite_size must be positive, got {}",
                self.sprite_size
            ));
        }
        if !self.max_move_increment.is_finite() || self.max_move_increment <= 0.0 {
            return Err(format!(
                "Stage config validation failed: max_move_increment must be positive, got {}",
                self.max_move_increment
            ));
        }
        if self.max_accumulated_ms < self.tick_period_ms {
            log::warn!(
                "max_accumulated_ms ({}) is below one tick; raising it to {}",
                self.max_accumulated_ms,
                self.tick_period_ms
            );
        }
        Ok(())
    }
}

pub struct Stage {
    config: StageConfig,
    registry: SpriteRegistry,
    coordinator: CollisionCoordinator,
    bubbles: BubbleTimers,
    clock: TickClock,
    ticks: u64,
    ticks_since_scan: u32,
    collisions_fired: u64,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new(StageConfig::default())
    }
}

impl Stage {
    pub fn new(config: StageConfig) -> Self {
        let mut clock = TickClock::new(config.tick_period());
        clock.max_accumulated = config.max_accumulated().max(clock.tick_period);
        Self {
            registry: SpriteRegistry::new(config.max_move_increment),
            coordinator: CollisionCoordinator::new(config.contact, config.sprite_size),
            bubbles: BubbleTimers::new(),
            clock,
            ticks: 0,
            ticks_since_scan: 0,
            collisions_fired: 0,
            config,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn registry(&self) -> &SpriteRegistry {
        &self.registry
    }

    /// Authoring access. Edits renormalize immediately but only reach a
    /// running sprite when it is next armed.
    pub fn registry_mut(&mut self) -> &mut SpriteRegistry {
        &mut self.registry
    }

    pub fn coordinator(&self) -> &CollisionCoordinator {
        &self.coordinator
    }

    pub fn bubble_timers(&self) -> &BubbleTimers {
        &self.bubbles
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    /// Ticks run since the stage was created.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn collisions_fired(&self) -> u64 {
        self.collisions_fired
    }

    pub fn add_sprite(&mut self, spec: SpriteSpec) -> Result<SpriteId, String> {
        let id = self.registry.add(spec)?;
        log::debug!("Added sprite '{id}'");
        Ok(id)
    }

    pub fn delete_sprite(&mut self, id: &SpriteId) -> Result<(), String> {
        if self.registry.remove(id).is_none() {
            return Err(format!("Unknown sprite '{id}'"));
        }
        self.bubbles.cancel(id);
        self.coordinator.forget_sprite(id);
        log::debug!("Deleted sprite '{id}'");
        Ok(())
    }

    /// Start a session: every sprite runs `play` from its start pose with no
    /// contact history.
    pub fn play(&mut self, now: Instant) {
        self.bubbles.cancel_all();
        self.coordinator.reset();
        self.registry.arm_all(Trigger::Play);
        self.clock.start(now);
        self.ticks_since_scan = 0;
        log::info!("Play: {} sprite(s) armed", self.registry.len());
    }

    /// Halt the scheduler and drop pending bubble timers. Poses stay where
    /// they are.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.bubbles.cancel_all();
        log::info!("Stopped after {} tick(s)", self.ticks);
    }

    /// Halt, then put every sprite back to `Idle` at its start pose and
    /// forget all contact history.
    pub fn restart(&mut self) {
        self.clock.stop();
        self.bubbles.cancel_all();
        self.registry.restart_all();
        self.coordinator.reset();
        self.ticks_since_scan = 0;
        log::info!("Restarted {} sprite(s)", self.registry.len());
    }

    /// Arm `click` on `id` if it has a non-empty click program. Starts the
    /// scheduler if it was stopped.
    pub fn on_sprite_clicked(&mut self, id: &SpriteId, now: Instant) -> bool {
        let Some(record) = self.registry.get(id) else {
            log::warn!("Click on unknown sprite '{id}' ignored");
            return false;
        };
        if record.normalized().is_empty(Trigger::Click) {
            return false;
        }
        if let Err(err) = self.registry.arm(id, Trigger::Click) {
            log::warn!("{err}");
            return false;
        }
        if !self.clock.is_running() {
            self.clock.start(now);
        }
        log::debug!("Sprite '{id}' clicked");
        true
    }

    /// Feed wall-clock time in and run every tick that became due. Returns
    /// the number of ticks run.
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.clock.begin_frame(now);
        let mut ran = 0;
        while self.clock.should_tick() {
            self.run_tick(now);
            ran += 1;
        }
        self.expire_bubbles(now);
        ran
    }

    /// Run exactly one tick, ignoring the clock.
    pub fn step(&mut self, now: Instant) {
        self.run_tick(now);
        self.expire_bubbles(now);
    }

    pub fn snapshots(&self) -> Vec<SpriteSnapshot> {
        self.registry
            .iter()
            .map(|record| record.interpreter().snapshot(record.id()))
            .collect()
    }

    pub fn snapshot(&self, id: &SpriteId) -> Option<SpriteSnapshot> {
        self.registry
            .get(id)
            .map(|record| record.interpreter().snapshot(record.id()))
    }

    fn run_tick(&mut self, now: Instant) {
        for record in self.registry.iter_mut() {
            if let TickEffect::ShowBubble { seconds } = record.interpreter_mut().tick() {
                self.bubbles.schedule(record.id(), now, seconds);
            }
        }
        self.ticks += 1;

        self.ticks_since_scan += 1;
        if self.ticks_since_scan >= self.config.collision_every_ticks.max(1) {
            self.ticks_since_scan = 0;
            let events = self
                .coordinator
                .coordinate(&mut self.registry, self.config.swap_cooldown_ticks);
            self.collisions_fired += events.len() as u64;
        }

        log::trace!("Tick {}: {:?}", self.ticks, self.snapshots());
    }

    fn expire_bubbles(&mut self, now: Instant) {
        for id in self.bubbles.take_expired(now) {
            if let Some(record) = self.registry.get_mut(&id) {
                record.interpreter_mut().clear_bubble();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::RunPhase;
    use glam::Vec2;
    use stage_core::program::Action;

    const EPS: f32 = 1e-4;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn id(name: &str) -> SpriteId {
        SpriteId::new(name)
    }

    fn stage_with(specs: Vec<SpriteSpec>) -> Stage {
        let mut stage = Stage::default();
        for spec in specs {
            stage.add_sprite(spec).expect("add sprite");
        }
        stage
    }

    /// Advance in 50ms frames from `from` to `to` inclusive.
    fn run_frames(stage: &mut Stage, t0: Instant, from: u64, to: u64) {
        let mut at = from;
        while at <= to {
            stage.advance(t0 + ms(at));
            at += 50;
        }
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = StageConfig::default();
        assert_eq!(config.tick_period(), ms(50));
        assert_eq!(config.collision_every_ticks, 1);
        assert_eq!(config.sprite_size, 100.0);
        assert_eq!(config.contact, ContactMode::Touch);
        assert_eq!(config.max_accumulated(), ms(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_json_uses_defaults() {
        let config: StageConfig =
            serde_json::from_str(r#"{ "contact": "strict", "swap_cooldown_ticks": 4 }"#)
                .expect("config parses");
        assert_eq!(config.contact, ContactMode::Strict);
        assert_eq!(config.swap_cooldown_ticks, 4);
        assert_eq!(config.tick_period_ms, 50);
    }

    #[test]
    fn config_rejects_zero_cadence() {
        let config = StageConfig {
            collision_every_ticks: 0,
            ..StageConfig::default()
        };
        let err = config.validate().expect_err("zero cadence is invalid");
        assert!(err.contains("collision_every_ticks"));
    }

    #[test]
    fn nothing_ticks_before_play() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![SpriteSpec::new("Cat", 0.0, 0.0)
            .with_id("cat")
            .with_actions(Trigger::Play, vec![Action::default_move()])]);
        assert_eq!(stage.advance(t0 + ms(500)), 0);
        assert!(!stage.is_playing());
    }

    #[test]
    fn say_clears_after_wall_clock_lifetime() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![SpriteSpec::new("Cat", 0.0, 0.0)
            .with_id("cat")
            .with_actions(
                Trigger::Play,
                vec![
                    Action::Say {
                        text: "Hi".to_string(),
                        seconds: 2.0,
                    },
                    Action::Move { steps: 10.0 },
                ],
            )]);
        stage.play(t0);

        assert_eq!(stage.advance(t0 + ms(50)), 1);
        let snap = stage.snapshot(&id("cat")).expect("cat");
        assert_eq!(snap.bubble.as_ref().map(|b| b.text.as_str()), Some("Hi"));
        assert_eq!(snap.instruction_index, 1);

        // The program finishes long before the bubble expires.
        run_frames(&mut stage, t0, 100, 2000);
        let snap = stage.snapshot(&id("cat")).expect("cat");
        assert_eq!(snap.phase, RunPhase::Finished);
        assert!(snap.bubble.is_some());

        stage.advance(t0 + ms(2050));
        assert!(stage.snapshot(&id("cat")).expect("cat").bubble.is_none());
        assert_eq!(stage.bubble_timers().pending(), 0);
    }

    #[test]
    fn later_bubble_supersedes_earlier_timer() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![SpriteSpec::new("Cat", 0.0, 0.0)
            .with_id("cat")
            .with_actions(
                Trigger::Play,
                vec![
                    Action::Say {
                        text: "first".to_string(),
                        seconds: 0.1,
                    },
                    Action::Think {
                        text: "second".to_string(),
                        seconds: 2.0,
                    },
                ],
            )]);
        stage.play(t0);
        run_frames(&mut stage, t0, 50, 300);

        let bubble = stage
            .snapshot(&id("cat"))
            .expect("cat")
            .bubble
            .expect("second bubble still up");
        assert_eq!(bubble.text, "second");
    }

    #[test]
    fn late_frame_is_capped() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![SpriteSpec::new("Cat", 0.0, 0.0).with_id("cat")]);
        stage.play(t0);
        assert_eq!(stage.advance(t0 + ms(1000)), 5);
    }

    #[test]
    fn all_sprites_advance_in_lockstep() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![
            SpriteSpec::new("A", 0.0, 0.0)
                .with_id("a")
                .with_heading(0.0)
                .with_actions(Trigger::Play, vec![Action::Move { steps: 30.0 }]),
            SpriteSpec::new("B", 0.0, 500.0)
                .with_id("b")
                .with_heading(0.0)
                .with_actions(Trigger::Play, vec![Action::Move { steps: -30.0 }]),
        ]);
        stage.play(t0);
        stage.advance(t0 + ms(100));

        let snaps = stage.snapshots();
        assert_eq!(snaps[0].instruction_index, 2);
        assert_eq!(snaps[1].instruction_index, 2);
        assert!((snaps[0].position.x - 20.0).abs() < EPS);
        assert!((snaps[1].position.x + 20.0).abs() < EPS);
    }

    #[test]
    fn identical_stages_stay_identical() {
        let build = || {
            stage_with(vec![
                SpriteSpec::new("A", 0.0, 0.0)
                    .with_id("a")
                    .with_heading(0.0)
                    .with_actions(
                        Trigger::Play,
                        vec![Action::Repeat {
                            count: 4,
                            actions: vec![
                                Action::Move { steps: 45.0 },
                                Action::Turn { degrees: 90.0 },
                            ],
                        }],
                    ),
                SpriteSpec::new("B", 150.0, 0.0)
                    .with_id("b")
                    .with_heading(180.0)
                    .with_actions(
                        Trigger::Play,
                        vec![Action::Move { steps: 120.0 }, Action::default_say()],
                    )
                    .with_actions(Trigger::Click, vec![Action::default_turn_right()]),
            ])
        };
        let t0 = Instant::now();
        let mut first = build();
        let mut second = build();
        first.play(t0);
        second.play(t0);
        for frame in 1..=60 {
            let now = t0 + ms(frame * 50);
            assert_eq!(first.advance(now), second.advance(now));
            assert_eq!(first.snapshots(), second.snapshots());
        }
        assert_eq!(first.collisions_fired(), second.collisions_fired());
        assert!(first.collisions_fired() >= 1);
    }

    #[test]
    fn collision_swaps_scripts_during_play() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![
            SpriteSpec::new("A", 0.0, 0.0)
                .with_id("a")
                .with_heading(0.0)
                .with_actions(Trigger::Play, vec![Action::Turn { degrees: 5.0 }]),
            SpriteSpec::new("B", 50.0, 50.0)
                .with_id("b")
                .with_heading(0.0)
                .with_actions(Trigger::Play, vec![Action::Turn { degrees: 7.0 }]),
        ]);
        stage.play(t0);
        stage.advance(t0 + ms(50));
        assert_eq!(stage.collisions_fired(), 1);

        let a = stage.registry().get(&id("a")).expect("a");
        assert_eq!(
            a.program().actions(Trigger::Play),
            &[Action::Turn { degrees: 7.0 }]
        );
        // Swapped script restarts at index 0 without moving the sprite.
        assert_eq!(a.interpreter().state().instruction_index, 0);
        assert_eq!(a.interpreter().state().pose.position, Vec2::ZERO);

        // Still overlapping: no further swaps.
        run_frames(&mut stage, t0, 100, 1000);
        assert_eq!(stage.collisions_fired(), 1);
    }

    #[test]
    fn coarser_scan_cadence_delays_detection() {
        let t0 = Instant::now();
        let mut stage = Stage::new(StageConfig {
            collision_every_ticks: 3,
            ..StageConfig::default()
        });
        for (name, x) in [("a", 0.0), ("b", 20.0)] {
            stage
                .add_sprite(SpriteSpec::new(name, x, 0.0).with_id(name))
                .expect("add");
        }
        stage.play(t0);
        stage.step(t0);
        stage.step(t0);
        assert_eq!(stage.collisions_fired(), 0);
        stage.step(t0);
        assert_eq!(stage.collisions_fired(), 1);
    }

    #[test]
    fn swap_sets_cooldown_that_counts_down() {
        let t0 = Instant::now();
        let mut stage = Stage::new(StageConfig {
            swap_cooldown_ticks: 5,
            ..StageConfig::default()
        });
        for (name, x) in [("a", 0.0), ("b", 10.0)] {
            stage
                .add_sprite(SpriteSpec::new(name, x, 0.0).with_id(name))
                .expect("add");
        }
        stage.play(t0);

        stage.step(t0);
        assert_eq!(stage.collisions_fired(), 1);
        for name in ["a", "b"] {
            let snap = stage.registry().get(&id(name)).expect("sprite");
            assert_eq!(snap.interpreter().state().cooldown, 5);
        }

        stage.step(t0);
        stage.step(t0);
        let a = stage.registry().get(&id("a")).expect("a");
        assert_eq!(a.interpreter().state().cooldown, 3);
        assert_eq!(stage.collisions_fired(), 1);
    }

    #[test]
    fn cooldown_limits_one_scan_to_one_swap_per_sprite() {
        let t0 = Instant::now();
        let mut stage = Stage::new(StageConfig {
            swap_cooldown_ticks: 10,
            ..StageConfig::default()
        });
        for (name, x) in [("a", 0.0), ("b", 30.0), ("c", 60.0)] {
            stage
                .add_sprite(SpriteSpec::new(name, x, 0.0).with_id(name))
                .expect("add");
        }
        stage.play(t0);
        stage.step(t0);
        assert_eq!(stage.collisions_fired(), 1);
    }

    #[test]
    fn enormous_bubble_lifetime_does_not_panic() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![SpriteSpec::new("Cat", 0.0, 0.0)
            .with_id("cat")
            .with_actions(
                Trigger::Play,
                vec![Action::Say {
                    text: "forever".to_string(),
                    seconds: 1.0e19,
                }],
            )]);
        stage.play(t0);
        stage.step(t0);
        assert!(stage.snapshot(&id("cat")).expect("cat").bubble.is_some());
        assert_eq!(stage.bubble_timers().pending(), 1);
    }

    #[test]
    fn stop_cancels_bubbles_and_keeps_poses() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![SpriteSpec::new("Cat", 0.0, 0.0)
            .with_id("cat")
            .with_heading(0.0)
            .with_actions(
                Trigger::Play,
                vec![Action::Move { steps: 10.0 }, Action::default_say()],
            )]);
        stage.play(t0);
        stage.advance(t0 + ms(100));
        assert_eq!(stage.bubble_timers().pending(), 1);

        stage.stop();
        assert!(!stage.is_playing());
        assert_eq!(stage.bubble_timers().pending(), 0);
        assert_eq!(stage.advance(t0 + ms(500)), 0);
        let snap = stage.snapshot(&id("cat")).expect("cat");
        assert!((snap.position.x - 10.0).abs() < EPS);
    }

    #[test]
    fn restart_resets_sprites_and_contact_history() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![
            SpriteSpec::new("A", 0.0, 0.0)
                .with_id("a")
                .with_heading(0.0)
                .with_actions(Trigger::Play, vec![Action::Move { steps: 10.0 }]),
            SpriteSpec::new("B", 40.0, 0.0).with_id("b"),
        ]);
        stage.play(t0);
        stage.advance(t0 + ms(50));
        assert_eq!(stage.coordinator().memory().len(), 1);

        stage.restart();
        assert!(!stage.is_playing());
        assert!(stage.coordinator().memory().is_empty());
        for snap in stage.snapshots() {
            assert_eq!(snap.phase, RunPhase::Idle);
            assert_eq!(snap.instruction_index, -1);
            assert!(snap.bubble.is_none());
        }
        assert_eq!(
            stage.snapshot(&id("a")).expect("a").position,
            Vec2::ZERO
        );
    }

    #[test]
    fn play_again_fires_collision_again() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![
            SpriteSpec::new("A", 0.0, 0.0).with_id("a"),
            SpriteSpec::new("B", 10.0, 10.0).with_id("b"),
        ]);
        stage.play(t0);
        stage.advance(t0 + ms(50));
        stage.play(t0 + ms(100));
        stage.advance(t0 + ms(150));
        assert_eq!(stage.collisions_fired(), 2);
    }

    #[test]
    fn click_arms_only_non_empty_click_programs() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![
            SpriteSpec::new("Cat", 0.0, 0.0)
                .with_id("cat")
                .with_heading(0.0)
                .with_actions(Trigger::Click, vec![Action::Move { steps: 10.0 }]),
            SpriteSpec::new("Dog", 500.0, 0.0).with_id("dog"),
        ]);

        assert!(!stage.on_sprite_clicked(&id("dog"), t0));
        assert!(!stage.on_sprite_clicked(&id("ghost"), t0));
        assert!(!stage.is_playing());

        assert!(stage.on_sprite_clicked(&id("cat"), t0));
        assert!(stage.is_playing());
        stage.advance(t0 + ms(50));

        let cat = stage.snapshot(&id("cat")).expect("cat");
        assert_eq!(cat.active_trigger, Some(Trigger::Click));
        assert!((cat.position.x - 10.0).abs() < EPS);
        assert_eq!(
            stage.snapshot(&id("dog")).expect("dog").phase,
            RunPhase::Idle
        );
    }

    #[test]
    fn delete_mid_session_drops_timers_and_memory() {
        let t0 = Instant::now();
        let mut stage = stage_with(vec![
            SpriteSpec::new("A", 0.0, 0.0)
                .with_id("a")
                .with_actions(Trigger::Play, vec![Action::default_say()]),
            SpriteSpec::new("B", 10.0, 10.0)
                .with_id("b")
                .with_actions(Trigger::Play, vec![Action::default_think()]),
        ]);
        stage.play(t0);
        stage.advance(t0 + ms(50));
        assert_eq!(stage.coordinator().memory().len(), 1);
        assert_eq!(stage.bubble_timers().pending(), 2);

        stage.delete_sprite(&id("b")).expect("delete");
        assert!(stage.coordinator().memory().is_empty());
        assert_eq!(stage.bubble_timers().pending(), 1);
        assert!(stage.delete_sprite(&id("b")).is_err());

        // Scheduler keeps going with the remaining sprite.
        assert_eq!(stage.advance(t0 + ms(100)), 1);
    }
}
