//! Shared sprite registry: the one store of sprite records for a stage.
//!
//! Each record owns its authoring program, the normalized form derived from
//! it, and the interpreter (which owns the runtime state). Registry order is
//! insertion order and is the order the scheduler ticks sprites in.
//!
//! Who writes what:
//!  - each interpreter mutates only its own runtime state;
//!  - the collision coordinator rewrites two programs at once through
//!    [`SpriteRegistry::swap_programs`], which borrows both records together
//!    so no observer can see a half-swapped pair;
//!  - authoring edits go through the `*_action` methods, which renormalize.

use stage_core::program::{Action, ActionPatch, Trigger, TriggerProgram};
use stage_core::sprite::{Costume, Pose, SpriteId, DEFAULT_HEADING_DEG};
use stage_core::{normalize_with, NormalizedProgram, MAX_MOVE_INCREMENT};

use crate::interpreter::{RunPhase, SpriteInterpreter};

/// Everything needed to add a sprite.
#[derive(Debug, Clone)]
pub struct SpriteSpec {
    pub id: Option<SpriteId>,
    pub name: String,
    pub costume: Costume,
    pub start: Pose,
    pub program: TriggerProgram,
}

impl SpriteSpec {
    pub fn new(name: &str, x: f32, y: f32) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            costume: Costume::default(),
            start: Pose::new(x, y, DEFAULT_HEADING_DEG),
            program: TriggerProgram::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(SpriteId::new(id));
        self
    }

    pub fn with_heading(mut self, heading: f32) -> Self {
        self.start = Pose::new(self.start.position.x, self.start.position.y, heading);
        self
    }

    pub fn with_costume(mut self, costume: Costume) -> Self {
        self.costume = costume;
        self
    }

    pub fn with_actions(mut self, trigger: Trigger, actions: Vec<Action>) -> Self {
        self.program = self.program.with_actions(trigger, actions);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SpriteRecord {
    id: SpriteId,
    name: String,
    costume: Costume,
    program: TriggerProgram,
    normalized: NormalizedProgram,
    interpreter: SpriteInterpreter,
}

impl SpriteRecord {
    pub fn id(&self) -> &SpriteId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn costume(&self) -> Costume {
        self.costume
    }

    pub fn program(&self) -> &TriggerProgram {
        &self.program
    }

    /// Latest normalized form of [`Self::program`]. The running interpreter
    /// may still hold an older snapshot.
    pub fn normalized(&self) -> &NormalizedProgram {
        &self.normalized
    }

    pub fn interpreter(&self) -> &SpriteInterpreter {
        &self.interpreter
    }

    pub(crate) fn interpreter_mut(&mut self) -> &mut SpriteInterpreter {
        &mut self.interpreter
    }

    /// The trigger whose list counts as "active" for a script swap. Idle
    /// sprites count `play` as active.
    fn swap_trigger(&self) -> Trigger {
        self.interpreter
            .state()
            .active_trigger
            .unwrap_or(Trigger::Play)
    }
}

#[derive(Debug, Clone)]
pub struct SpriteRegistry {
    sprites: Vec<SpriteRecord>,
    selected: Option<usize>,
    move_increment: f32,
}

impl Default for SpriteRegistry {
    fn default() -> Self {
        Self::new(MAX_MOVE_INCREMENT)
    }
}

impl SpriteRegistry {
    pub fn new(move_increment: f32) -> Self {
        Self {
            sprites: Vec::new(),
            selected: None,
            move_increment,
        }
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpriteRecord> {
        self.sprites.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut SpriteRecord> {
        self.sprites.iter_mut()
    }

    pub fn contains(&self, id: &SpriteId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: &SpriteId) -> Option<&SpriteRecord> {
        self.sprites.iter().find(|s| &s.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &SpriteId) -> Option<&mut SpriteRecord> {
        self.sprites.iter_mut().find(|s| &s.id == id)
    }

    fn index_of(&self, id: &SpriteId) -> Option<usize> {
        self.sprites.iter().position(|s| &s.id == id)
    }

    fn require_mut(&mut self, id: &SpriteId) -> Result<&mut SpriteRecord, String> {
        self.get_mut(id)
            .ok_or_else(|| format!("Unknown sprite '{id}'"))
    }

    pub(crate) fn add(&mut self, spec: SpriteSpec) -> Result<SpriteId, String> {
        let id = spec.id.unwrap_or_else(SpriteId::generate);
        if self.contains(&id) {
            return Err(format!("Sprite '{id}' already exists"));
        }
        let normalized = normalize_with(&spec.program, self.move_increment);
        self.sprites.push(SpriteRecord {
            id: id.clone(),
            name: spec.name,
            costume: spec.costume,
            program: spec.program,
            normalized,
            interpreter: SpriteInterpreter::new(spec.start),
        });
        if self.selected.is_none() {
            self.selected = Some(self.sprites.len() - 1);
        }
        Ok(id)
    }

    /// Remove a sprite, keeping the selection on the same sprite where possible.
    pub(crate) fn remove(&mut self, id: &SpriteId) -> Option<SpriteRecord> {
        let index = self.index_of(id)?;
        let record = self.sprites.remove(index);
        self.selected = match self.selected {
            _ if self.sprites.is_empty() => None,
            Some(sel) if index < sel => Some(sel - 1),
            Some(sel) if index == sel => Some(0),
            other => other,
        };
        Some(record)
    }

    pub fn select(&mut self, id: &SpriteId) -> Result<(), String> {
        let index = self
            .index_of(id)
            .ok_or_else(|| format!("Unknown sprite '{id}'"))?;
        self.selected = Some(index);
        Ok(())
    }

    pub fn selected(&self) -> Option<&SpriteRecord> {
        self.selected.and_then(|i| self.sprites.get(i))
    }

    // --- Authoring edits ---

    fn edit_program<T>(
        &mut self,
        id: &SpriteId,
        edit: impl FnOnce(&mut TriggerProgram) -> Result<T, String>,
    ) -> Result<T, String> {
        let move_increment = self.move_increment;
        let record = self.require_mut(id)?;
        let out = edit(&mut record.program)?;
        record.normalized = normalize_with(&record.program, move_increment);
        Ok(out)
    }

    pub fn append_action(
        &mut self,
        id: &SpriteId,
        trigger: Trigger,
        action: Action,
    ) -> Result<(), String> {
        self.edit_program(id, |program| {
            program.append(trigger, action);
            Ok(())
        })
    }

    pub fn remove_action(
        &mut self,
        id: &SpriteId,
        trigger: Trigger,
        index: usize,
    ) -> Result<Action, String> {
        self.edit_program(id, |program| program.remove(trigger, index))
    }

    pub fn update_action(
        &mut self,
        id: &SpriteId,
        trigger: Trigger,
        index: usize,
        patch: &ActionPatch,
    ) -> Result<(), String> {
        self.edit_program(id, |program| program.update(trigger, index, patch))
    }

    pub fn reorder_action(
        &mut self,
        id: &SpriteId,
        trigger: Trigger,
        from: usize,
        to: usize,
    ) -> Result<(), String> {
        self.edit_program(id, |program| program.reorder(trigger, from, to))
    }

    pub fn append_to_repeat(
        &mut self,
        id: &SpriteId,
        trigger: Trigger,
        repeat_index: usize,
        action: Action,
    ) -> Result<(), String> {
        self.edit_program(id, |program| {
            program.append_to_repeat(trigger, repeat_index, action)
        })
    }

    // --- Runtime control ---

    /// Arm `trigger` on one sprite with a snapshot of its current normalized program.
    pub(crate) fn arm(&mut self, id: &SpriteId, trigger: Trigger) -> Result<(), String> {
        let record = self.require_mut(id)?;
        let snapshot = record.normalized.clone();
        record.interpreter.arm(trigger, snapshot);
        Ok(())
    }

    pub(crate) fn arm_all(&mut self, trigger: Trigger) {
        for record in &mut self.sprites {
            let snapshot = record.normalized.clone();
            record.interpreter.arm(trigger, snapshot);
        }
    }

    pub(crate) fn restart_all(&mut self) {
        for record in &mut self.sprites {
            record.interpreter.restart();
        }
    }

    /// Exchange the scripts of two sprites: active list with active list,
    /// inactive with inactive. Positions are untouched. Sprites that were
    /// armed restart their active trigger from index 0 on the swapped-in
    /// list, from wherever they stand. Both sprites get `cooldown_ticks`.
    pub(crate) fn swap_programs(
        &mut self,
        a: &SpriteId,
        b: &SpriteId,
        cooldown_ticks: u32,
    ) -> Result<(), String> {
        let ia = self
            .index_of(a)
            .ok_or_else(|| format!("Swap skipped: sprite '{a}' no longer exists"))?;
        let ib = self
            .index_of(b)
            .ok_or_else(|| format!("Swap skipped: sprite '{b}' no longer exists"))?;
        if ia == ib {
            return Err(format!("Swap skipped: '{a}' cannot swap with itself"));
        }
        let move_increment = self.move_increment;

        let (first, second) = if ia < ib {
            let (head, tail) = self.sprites.split_at_mut(ib);
            (&mut head[ia], &mut tail[0])
        } else {
            let (head, tail) = self.sprites.split_at_mut(ia);
            (&mut tail[0], &mut head[ib])
        };

        let first_trigger = first.swap_trigger();
        let second_trigger = second.swap_trigger();
        first
            .program
            .exchange_with(first_trigger, &mut second.program, second_trigger);

        for record in [first, second] {
            record.normalized = normalize_with(&record.program, move_increment);
            if record.interpreter.phase() != RunPhase::Idle {
                let snapshot = record.normalized.clone();
                let trigger = record.swap_trigger();
                record.interpreter.arm_in_place(trigger, snapshot);
            }
            record.interpreter.set_cooldown(cooldown_ticks);
        }
        Ok(())
    }
}
