//! Per-sprite interpreter: a small state machine that executes one normalized
//! instruction per tick.
//!
//! ```text
//!   Idle --arm(t)--> Running --tick() past last--> Finished
//!    ^                  |  ^                          |
//!    |                  |  +--------arm(t)------------+
//!    +----restart()-----+-----------------------------+
//! ```
//!
//! The interpreter is the only writer of its [`SpriteRuntimeState`]. It holds
//! the normalized program it was armed with, so authoring edits made while it
//! runs take effect on the next arm, never mid-run.
//!
//! Bubble lifetime is not tracked here. `say`/`think` set the bubble and
//! report [`TickEffect::ShowBubble`]; the session owns the wall-clock timer
//! that later calls [`SpriteInterpreter::clear_bubble`]. Program progress never
//! waits on a bubble.

use glam::Vec2;
use stage_core::program::{Action, BubbleKind, Trigger};
use stage_core::sprite::{normalize_heading, Pose, SpriteId};
use stage_core::NormalizedProgram;

/// Speech or thought bubble currently shown above a sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    pub kind: BubbleKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No active trigger; instruction index is -1.
    Idle,
    /// Active trigger set and an instruction is pending.
    Running,
    /// Active trigger set but every instruction has executed. The index is
    /// kept for observers; scheduling treats this like `Idle`.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteRuntimeState {
    pub pose: Pose,
    pub bubble: Option<Bubble>,
    pub active_trigger: Option<Trigger>,
    pub instruction_index: i64,
    /// Ticks left before this sprite may take part in another script swap.
    pub cooldown: u32,
}

impl SpriteRuntimeState {
    fn idle_at(pose: Pose) -> Self {
        Self {
            pose,
            bubble: None,
            active_trigger: None,
            instruction_index: -1,
            cooldown: 0,
        }
    }
}

/// What the tick did, for the parts of the session that react to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEffect {
    /// Nothing to execute (idle or finished).
    None,
    /// An instruction ran and changed pose.
    Applied,
    /// A say/think instruction ran; the bubble should clear after `seconds`.
    ShowBubble { seconds: f32 },
    /// The instruction could not be executed and was skipped.
    Skipped,
}

/// Read-only view handed to renderers and tests after each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteSnapshot {
    pub id: SpriteId,
    pub position: Vec2,
    pub heading: f32,
    pub bubble: Option<Bubble>,
    pub active_trigger: Option<Trigger>,
    pub instruction_index: i64,
    pub phase: RunPhase,
}

#[derive(Debug, Clone)]
pub struct SpriteInterpreter {
    start: Pose,
    program: NormalizedProgram,
    state: SpriteRuntimeState,
}

impl SpriteInterpreter {
    pub fn new(start: Pose) -> Self {
        Self {
            start,
            program: NormalizedProgram::default(),
            state: SpriteRuntimeState::idle_at(start),
        }
    }

    pub fn start_pose(&self) -> Pose {
        self.start
    }

    pub fn state(&self) -> &SpriteRuntimeState {
        &self.state
    }

    /// The program snapshot the current run executes.
    pub fn program(&self) -> &NormalizedProgram {
        &self.program
    }

    pub fn phase(&self) -> RunPhase {
        let Some(trigger) = self.state.active_trigger else {
            return RunPhase::Idle;
        };
        let len = self.program.len(trigger) as i64;
        if self.state.instruction_index < len {
            RunPhase::Running
        } else {
            RunPhase::Finished
        }
    }

    /// Start `trigger` from its first instruction using `program`.
    ///
    /// `Play` also resets pose and bubble to the recorded start pose. Other
    /// triggers run from wherever the sprite currently is. Arming replaces
    /// whatever was running; triggers are never queued.
    pub fn arm(&mut self, trigger: Trigger, program: NormalizedProgram) {
        if trigger == Trigger::Play {
            self.state.pose = self.start;
            self.state.bubble = None;
        }
        self.arm_in_place(trigger, program);
    }

    /// Start `trigger` from index 0 without touching pose, whatever the trigger.
    pub(crate) fn arm_in_place(&mut self, trigger: Trigger, program: NormalizedProgram) {
        self.program = program;
        self.state.active_trigger = Some(trigger);
        self.state.instruction_index = 0;
    }

    /// Execute the instruction at the current index and advance by one.
    pub fn tick(&mut self) -> TickEffect {
        self.state.cooldown = self.state.cooldown.saturating_sub(1);

        let Some(trigger) = self.state.active_trigger else {
            return TickEffect::None;
        };
        let Ok(index) = usize::try_from(self.state.instruction_index) else {
            return TickEffect::None;
        };
        let Some(action) = self.program.instructions(trigger).get(index) else {
            return TickEffect::None;
        };

        let effect = apply_action(&mut self.state, action);
        self.state.instruction_index += 1;
        effect
    }

    /// Back to `Idle` at the start pose, dropping the bubble and the trigger.
    pub fn restart(&mut self) {
        self.state = SpriteRuntimeState::idle_at(self.start);
    }

    pub fn clear_bubble(&mut self) {
        self.state.bubble = None;
    }

    pub(crate) fn set_cooldown(&mut self, ticks: u32) {
        self.state.cooldown = ticks;
    }

    pub fn snapshot(&self, id: &SpriteId) -> SpriteSnapshot {
        SpriteSnapshot {
            id: id.clone(),
            position: self.state.pose.position,
            heading: self.state.pose.heading,
            bubble: self.state.bubble.clone(),
            active_trigger: self.state.active_trigger,
            instruction_index: self.state.instruction_index,
            phase: self.phase(),
        }
    }
}

// One handler per executable kind. A new kind is one variant plus one arm here.
fn apply_action(state: &mut SpriteRuntimeState, action: &Action) -> TickEffect {
    match action {
        Action::Move { steps } => apply_move(state, *steps),
        Action::Turn { degrees } => apply_turn(state, *degrees),
        Action::Goto { x, y } => apply_goto(state, *x, *y),
        Action::Say { text, seconds } => show_bubble(state, BubbleKind::Say, text, *seconds),
        Action::Think { text, seconds } => show_bubble(state, BubbleKind::Think, text, *seconds),
        Action::Repeat { .. } | Action::Unknown { .. } => {
            log::warn!(
                "Skipping '{}' block at instruction {}",
                action.kind(),
                state.instruction_index
            );
            TickEffect::Skipped
        }
    }
}

fn apply_move(state: &mut SpriteRuntimeState, steps: f32) -> TickEffect {
    let direction = Vec2::from_angle(state.pose.heading.to_radians());
    state.pose.position += direction * steps;
    TickEffect::Applied
}

fn apply_turn(state: &mut SpriteRuntimeState, degrees: f32) -> TickEffect {
    state.pose.heading = normalize_heading(state.pose.heading + degrees);
    TickEffect::Applied
}

fn apply_goto(state: &mut SpriteRuntimeState, x: f32, y: f32) -> TickEffect {
    state.pose.position = Vec2::new(x, y);
    TickEffect::Applied
}

fn show_bubble(
    state: &mut SpriteRuntimeState,
    kind: BubbleKind,
    text: &str,
    seconds: f32,
) -> TickEffect {
    state.bubble = Some(Bubble {
        kind,
        text: text.to_string(),
    });
    TickEffect::ShowBubble { seconds }
}
