//! Collision coordination between sprites.
//!
//! Every sprite is an axis-aligned `size x size` box anchored at its top-left
//! position. Once per coordination period every unordered pair of armed
//! sprites is tested; a contact fires a script swap at most once per
//! **overlap episode**.
//!
//! Suppression is edge-triggered through [`CollisionMemory`], keyed by the
//! canonical (sorted) id pair:
//!  - no contact this scan: the pair's entry is dropped, so the next contact
//!    fires again;
//!  - contact, and the remembered rectangle overlaps or touches the new one:
//!    same episode, no event, remembered rectangle follows the new one;
//!  - contact with no entry, or with an entry the new rectangle has left
//!    behind (a jump): new episode, event fires.
//!
//! Whether touching edges count as contact is a [`ContactMode`] setting.

use std::collections::HashMap;

use glam::Vec2;
use serde::Deserialize;
use stage_core::SpriteId;

use crate::interpreter::RunPhase;
use crate::registry::SpriteRegistry;

/// Side length of every sprite's bounding box, in stage units.
pub const DEFAULT_SPRITE_SIZE: f32 = 100.0;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContactMode {
    /// Boxes that share only an edge or corner are in contact.
    #[default]
    Touch,
    /// Boxes must share interior area.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn from_top_left(position: Vec2, size: f32) -> Self {
        Self {
            min: position,
            max: position + Vec2::splat(size),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Interval intersection on both axes, or `None` when the boxes are apart
    /// under `mode`.
    pub fn intersection(&self, other: &Aabb, mode: ContactMode) -> Option<Aabb> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        let in_contact = match mode {
            ContactMode::Touch => min.x <= max.x && min.y <= max.y,
            ContactMode::Strict => min.x < max.x && min.y < max.y,
        };
        in_contact.then_some(Aabb { min, max })
    }

    pub fn overlaps_or_touches(&self, other: &Aabb) -> bool {
        self.intersection(other, ContactMode::Touch).is_some()
    }
}

/// Order-independent key for a pair of sprites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub low: SpriteId,
    pub high: SpriteId,
}

impl PairKey {
    pub fn new(a: &SpriteId, b: &SpriteId) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }

    pub fn involves(&self, id: &SpriteId) -> bool {
        &self.low == id || &self.high == id
    }
}

/// Last overlap rectangle per pair still in contact.
#[derive(Debug, Clone, Default)]
pub struct CollisionMemory {
    entries: HashMap<PairKey, Aabb>,
}

impl CollisionMemory {
    pub fn get(&self, key: &PairKey) -> Option<&Aabb> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remember(&mut self, key: PairKey, overlap: Aabb) {
        self.entries.insert(key, overlap);
    }

    fn forget_pair(&mut self, key: &PairKey) {
        self.entries.remove(key);
    }

    fn forget_sprite(&mut self, id: &SpriteId) {
        self.entries.retain(|key, _| !key.involves(id));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A newly started overlap episode.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub pair: PairKey,
    pub overlap: Aabb,
}

#[derive(Debug, Clone)]
pub struct CollisionCoordinator {
    pub mode: ContactMode,
    pub sprite_size: f32,
    memory: CollisionMemory,
}

impl Default for CollisionCoordinator {
    fn default() -> Self {
        Self::new(ContactMode::default(), DEFAULT_SPRITE_SIZE)
    }
}

struct Candidate<'a> {
    id: &'a SpriteId,
    bounds: Aabb,
    cooling_down: bool,
}

impl CollisionCoordinator {
    pub fn new(mode: ContactMode, sprite_size: f32) -> Self {
        Self {
            mode,
            sprite_size,
            memory: CollisionMemory::default(),
        }
    }

    pub fn memory(&self) -> &CollisionMemory {
        &self.memory
    }

    /// Forget all contact history (new session or restart).
    pub fn reset(&mut self) {
        self.memory.clear();
    }

    /// Drop history for a sprite that left the stage.
    pub fn forget_sprite(&mut self, id: &SpriteId) {
        self.memory.forget_sprite(id);
    }

    /// Test every pair of armed sprites and return the episodes that start
    /// this scan. Updates memory; does not touch the registry.
    pub fn detect(&mut self, registry: &SpriteRegistry) -> Vec<CollisionEvent> {
        let candidates: Vec<Candidate<'_>> = registry
            .iter()
            .filter(|record| record.interpreter().phase() != RunPhase::Idle)
            .map(|record| Candidate {
                id: record.id(),
                bounds: Aabb::from_top_left(
                    record.interpreter().state().pose.position,
                    self.sprite_size,
                ),
                cooling_down: record.interpreter().state().cooldown > 0,
            })
            .collect();

        // Pairs with a removed or idle member can never be re-tested below.
        self.memory.entries.retain(|key, _| {
            candidates.iter().any(|c| c.id == &key.low)
                && candidates.iter().any(|c| c.id == &key.high)
        });

        let mut events = Vec::new();
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                let key = PairKey::new(a.id, b.id);
                let Some(overlap) = a.bounds.intersection(&b.bounds, self.mode) else {
                    self.memory.forget_pair(&key);
                    continue;
                };

                let same_episode = self
                    .memory
                    .get(&key)
                    .is_some_and(|previous| previous.overlaps_or_touches(&overlap));
                self.memory.remember(key.clone(), overlap);
                if same_episode {
                    continue;
                }
                if a.cooling_down || b.cooling_down {
                    log::debug!(
                        "Contact {} <-> {} ignored: swap cooldown active",
                        key.low,
                        key.high
                    );
                    continue;
                }
                events.push(CollisionEvent { pair: key, overlap });
            }
        }
        events
    }

    /// Detect new episodes and swap scripts for each, in pair order. Returns
    /// the events that swapped.
    ///
    /// A swap puts both sprites on cooldown, so later events from the same
    /// scan that involve either of them are dropped. Their contact stays
    /// remembered and does not fire once the cooldown ends.
    pub fn coordinate(
        &mut self,
        registry: &mut SpriteRegistry,
        cooldown_ticks: u32,
    ) -> Vec<CollisionEvent> {
        let mut swapped = Vec::new();
        for event in self.detect(registry) {
            let (low, high) = (&event.pair.low, &event.pair.high);
            if is_cooling_down(registry, low) || is_cooling_down(registry, high) {
                log::debug!("Contact {low} <-> {high} ignored: swap cooldown active");
                continue;
            }
            match registry.swap_programs(low, high, cooldown_ticks) {
                Ok(()) => {
                    log::info!(
                        "Collision {low} <-> {high}: scripts swapped (overlap {:.1}x{:.1})",
                        event.overlap.width(),
                        event.overlap.height()
                    );
                    swapped.push(event);
                }
                Err(err) => {
                    log::warn!("{err}");
                    self.memory.forget_pair(&event.pair);
                }
            }
        }
        swapped
    }
}

fn is_cooling_down(registry: &SpriteRegistry, id: &SpriteId) -> bool {
    registry
        .get(id)
        .is_some_and(|record| record.interpreter().state().cooldown > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SpriteSpec;
    use stage_core::program::{Action, Trigger};

    fn boxed(x: f32, y: f32) -> Aabb {
        Aabb::from_top_left(Vec2::new(x, y), DEFAULT_SPRITE_SIZE)
    }

    /// Two armed sprites; `b` runs `b_play` from `(bx, by)`.
    fn armed_pair(bx: f32, by: f32, b_play: Vec<Action>) -> SpriteRegistry {
        let mut registry = SpriteRegistry::default();
        registry
            .add(
                SpriteSpec::new("A", 0.0, 0.0)
                    .with_id("a")
                    .with_heading(0.0)
                    .with_actions(Trigger::Play, vec![Action::Move { steps: 1.0 }])
                    .with_actions(Trigger::Click, vec![Action::Turn { degrees: 1.0 }]),
            )
            .expect("a");
        registry
            .add(
                SpriteSpec::new("B", bx, by)
                    .with_id("b")
                    .with_heading(0.0)
                    .with_actions(Trigger::Play, b_play)
                    .with_actions(Trigger::Click, vec![Action::Turn { degrees: 2.0 }]),
            )
            .expect("b");
        registry.arm_all(Trigger::Play);
        registry
    }

    fn tick_all(registry: &mut SpriteRegistry) {
        for record in registry.iter_mut() {
            record.interpreter_mut().tick();
        }
    }

    #[test]
    fn intersection_computes_overlap_rectangle() {
        let overlap = boxed(0.0, 0.0)
            .intersection(&boxed(50.0, 50.0), ContactMode::Touch)
            .expect("boxes overlap");
        assert_eq!(overlap.min, Vec2::new(50.0, 50.0));
        assert_eq!(overlap.max, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn touching_edges_depend_on_contact_mode() {
        let a = boxed(0.0, 0.0);
        let b = boxed(100.0, 0.0);
        let touch = a
            .intersection(&b, ContactMode::Touch)
            .expect("touching counts");
        assert_eq!(touch.width(), 0.0);
        assert!(a.intersection(&b, ContactMode::Strict).is_none());
    }

    #[test]
    fn overlap_on_one_axis_only_is_not_contact() {
        let a = boxed(0.0, 0.0);
        let b = boxed(50.0, 300.0);
        assert!(a.intersection(&b, ContactMode::Touch).is_none());
    }

    #[test]
    fn pair_key_is_order_independent() {
        let a = SpriteId::new("a");
        let b = SpriteId::new("b");
        assert_eq!(PairKey::new(&a, &b), PairKey::new(&b, &a));
        assert!(PairKey::new(&b, &a).involves(&a));
    }

    #[test]
    fn overlapping_pair_swaps_scripts() {
        let mut registry = armed_pair(50.0, 50.0, vec![Action::Move { steps: 2.0 }]);
        let mut coordinator = CollisionCoordinator::default();

        let events = coordinator.coordinate(&mut registry, 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].overlap.min, Vec2::new(50.0, 50.0));
        assert_eq!(events[0].overlap.max, Vec2::new(100.0, 100.0));

        let a = registry.get(&SpriteId::new("a")).expect("a");
        let b = registry.get(&SpriteId::new("b")).expect("b");
        assert_eq!(a.program().actions(Trigger::Play), &[Action::Move { steps: 2.0 }]);
        assert_eq!(a.program().actions(Trigger::Click), &[Action::Turn { degrees: 2.0 }]);
        assert_eq!(b.program().actions(Trigger::Play), &[Action::Move { steps: 1.0 }]);
        assert_eq!(b.program().actions(Trigger::Click), &[Action::Turn { degrees: 1.0 }]);
    }

    #[test]
    fn sustained_overlap_fires_once() {
        // B drifts right 1 unit per tick while still overlapping A.
        let mut registry = armed_pair(
            40.0,
            0.0,
            vec![Action::Repeat {
                count: 30,
                actions: vec![Action::Move { steps: 1.0 }],
            }],
        );
        let mut coordinator = CollisionCoordinator::default();

        let mut fired = 0;
        for _ in 0..20 {
            tick_all(&mut registry);
            fired += coordinator.coordinate(&mut registry, 0).len();
        }
        assert_eq!(fired, 1);
        assert_eq!(coordinator.memory().len(), 1);
    }

    #[test]
    fn gap_clears_memory_and_next_contact_fires() {
        let mut registry = armed_pair(
            50.0,
            0.0,
            vec![Action::Goto { x: 400.0, y: 0.0 }, Action::Goto { x: 60.0, y: 0.0 }],
        );
        let mut coordinator = CollisionCoordinator::default();
        let b = SpriteId::new("b");

        // Contact before anyone moves.
        assert_eq!(coordinator.detect(&registry).len(), 1);

        // B leaves: memory for the pair is dropped.
        registry
            .get_mut(&b)
            .expect("b")
            .interpreter_mut()
            .tick();
        assert!(coordinator.detect(&registry).is_empty());
        assert!(coordinator.memory().is_empty());

        // B returns: a new episode.
        registry
            .get_mut(&b)
            .expect("b")
            .interpreter_mut()
            .tick();
        assert_eq!(coordinator.detect(&registry).len(), 1);
    }

    #[test]
    fn jump_within_contact_is_a_new_episode() {
        // B teleports from one side of A to the other without separating.
        let mut registry = armed_pair(
            -90.0,
            0.0,
            vec![Action::Goto { x: 90.0, y: 0.0 }],
        );
        let mut coordinator = CollisionCoordinator::default();
        assert_eq!(coordinator.detect(&registry).len(), 1);

        registry
            .get_mut(&SpriteId::new("b"))
            .expect("b")
            .interpreter_mut()
            .tick();
        assert_eq!(coordinator.detect(&registry).len(), 1);
    }

    #[test]
    fn idle_sprites_are_ignored() {
        let mut registry = armed_pair(10.0, 10.0, Vec::new());
        registry.restart_all();
        let mut coordinator = CollisionCoordinator::default();
        assert!(coordinator.coordinate(&mut registry, 0).is_empty());
    }

    #[test]
    fn removed_sprite_drops_memory() {
        let mut registry = armed_pair(10.0, 10.0, Vec::new());
        let mut coordinator = CollisionCoordinator::default();
        assert_eq!(coordinator.detect(&registry).len(), 1);
        assert_eq!(coordinator.memory().len(), 1);

        registry.remove(&SpriteId::new("b"));
        assert!(coordinator.detect(&registry).is_empty());
        assert!(coordinator.memory().is_empty());
    }

    #[test]
    fn cooldown_suppresses_new_contact() {
        let mut registry = armed_pair(10.0, 10.0, Vec::new());
        registry
            .get_mut(&SpriteId::new("a"))
            .expect("a")
            .interpreter_mut()
            .set_cooldown(3);
        let mut coordinator = CollisionCoordinator::default();
        assert!(coordinator.coordinate(&mut registry, 0).is_empty());
        // The contact is still remembered, so it does not fire once the cooldown ends.
        assert_eq!(coordinator.memory().len(), 1);
    }

    #[test]
    fn swap_cooldown_applies_within_one_scan() {
        let mut registry = SpriteRegistry::default();
        for (name, x) in [("a", 0.0), ("b", 30.0), ("c", 60.0)] {
            registry
                .add(SpriteSpec::new(name, x, 0.0).with_id(name))
                .expect("add");
        }
        registry.arm_all(Trigger::Play);
        let mut coordinator = CollisionCoordinator::default();

        // a<->b swaps first; a<->c and b<->c each involve a sprite now cooling down.
        let events = coordinator.coordinate(&mut registry, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pair, PairKey::new(&SpriteId::new("a"), &SpriteId::new("b")));
        let c = registry.get(&SpriteId::new("c")).expect("c");
        assert_eq!(c.interpreter().state().cooldown, 0);
        // All three contacts are remembered, so none fires on the next scan.
        assert_eq!(coordinator.memory().len(), 3);
        assert!(coordinator.coordinate(&mut registry, 10).is_empty());
    }

    #[test]
    fn three_sprites_each_pair_fires_once() {
        let mut registry = SpriteRegistry::default();
        for (name, x) in [("a", 0.0), ("b", 30.0), ("c", 60.0)] {
            registry
                .add(SpriteSpec::new(name, x, 0.0).with_id(name))
                .expect("add");
        }
        registry.arm_all(Trigger::Play);
        let mut coordinator = CollisionCoordinator::default();

        let events = coordinator.coordinate(&mut registry, 0);
        let pairs: Vec<(String, String)> = events
            .iter()
            .map(|e| (e.pair.low.to_string(), e.pair.high.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "b".to_string()),
                ("a".to_string(), "c".to_string()),
                ("b".to_string(), "c".to_string()),
            ]
        );
        assert!(coordinator.coordinate(&mut registry, 0).is_empty());
    }
}
