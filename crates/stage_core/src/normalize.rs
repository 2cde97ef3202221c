//! Action normalizer: flattens a [`TriggerProgram`] into repeat-free,
//! bounded-step instruction lists.
//!
//! Two rewrites happen, recursively and in program order:
//!  1. `repeat { count, actions }` is inlined `count` times (`count <= 0` runs
//!     once, never zero times and never forever).
//!  2. `move { steps }` becomes a run of `move` increments whose magnitudes are
//!     at most `max_increment`, all with the original sign. Per-tick
//!     displacement is therefore bounded, which keeps collision sampling
//!     resolution independent of how far one block moves.
//!
//! Non-finite numbers are replaced with the block's default here, so the
//! interpreter only ever sees clean atomics. Normalizing an already-normalized
//! program yields the same lists.
//!
//! Each trigger's output is capped at [`MAX_INSTRUCTIONS`]; an oversized
//! repeat or move is cut off there and a warning logged.

use std::sync::Arc;

use crate::program::{Action, Trigger, TriggerProgram, DEFAULT_BUBBLE_SECONDS};

/// Largest displacement one `move` instruction may carry.
pub const MAX_MOVE_INCREMENT: f32 = 10.0;

/// Per-trigger cap on flattened instructions (about 83 minutes at 50ms
/// ticks). Longer programs are truncated with a warning.
pub const MAX_INSTRUCTIONS: usize = 100_000;

/// Flat per-trigger instruction lists. Contains no `Repeat` blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProgram {
    play: Arc<[Action]>,
    click: Arc<[Action]>,
}

impl Default for NormalizedProgram {
    fn default() -> Self {
        Self {
            play: Arc::from(Vec::new()),
            click: Arc::from(Vec::new()),
        }
    }
}

impl NormalizedProgram {
    pub fn instructions(&self, trigger: Trigger) -> &[Action] {
        match trigger {
            Trigger::Play => &self.play,
            Trigger::Click => &self.click,
        }
    }

    pub fn len(&self, trigger: Trigger) -> usize {
        self.instructions(trigger).len()
    }

    pub fn is_empty(&self, trigger: Trigger) -> bool {
        self.instructions(trigger).is_empty()
    }

    /// View the flat lists as an authoring program again.
    pub fn to_program(&self) -> TriggerProgram {
        TriggerProgram::new()
            .with_actions(Trigger::Play, self.play.to_vec())
            .with_actions(Trigger::Click, self.click.to_vec())
    }
}

pub fn normalize(program: &TriggerProgram) -> NormalizedProgram {
    normalize_with(program, MAX_MOVE_INCREMENT)
}

/// Like [`normalize`] with a custom move increment. Non-positive or
/// non-finite increments fall back to [`MAX_MOVE_INCREMENT`].
pub fn normalize_with(program: &TriggerProgram, max_increment: f32) -> NormalizedProgram {
    let max_increment = if max_increment.is_finite() && max_increment > 0.0 {
        max_increment
    } else {
        log::warn!("Invalid move increment {max_increment}; using {MAX_MOVE_INCREMENT}");
        MAX_MOVE_INCREMENT
    };
    let flatten = |trigger: Trigger| -> Arc<[Action]> {
        let mut flattener = Flattener::new(max_increment);
        if !flattener.flatten(program.actions(trigger)) {
            log::warn!(
                "'{trigger}' program expands past {MAX_INSTRUCTIONS} instructions; truncated"
            );
        }
        Arc::from(flattener.out)
    };
    NormalizedProgram {
        play: flatten(Trigger::Play),
        click: flatten(Trigger::Click),
    }
}

struct Flattener {
    max_increment: f32,
    out: Vec<Action>,
}

impl Flattener {
    fn new(max_increment: f32) -> Self {
        Self {
            max_increment,
            out: Vec::new(),
        }
    }

    fn room(&self) -> usize {
        MAX_INSTRUCTIONS.saturating_sub(self.out.len())
    }

    /// Returns false once the instruction budget is exhausted.
    fn push(&mut self, action: Action) -> bool {
        if self.room() == 0 {
            return false;
        }
        self.out.push(action);
        true
    }

    fn flatten(&mut self, actions: &[Action]) -> bool {
        for action in actions {
            let fits = match action {
                Action::Repeat { count, actions } => self.repeat((*count).max(1), actions),
                Action::Move { steps } => self.split_move(finite_or(*steps, 0.0, "move")),
                Action::Turn { degrees } => self.push(Action::Turn {
                    degrees: finite_or(*degrees, 0.0, "turn"),
                }),
                Action::Goto { x, y } => self.push(Action::Goto {
                    x: finite_or(*x, 0.0, "goto"),
                    y: finite_or(*y, 0.0, "goto"),
                }),
                Action::Say { text, seconds } => self.push(Action::Say {
                    text: text.clone(),
                    seconds: bubble_seconds(*seconds),
                }),
                Action::Think { text, seconds } => self.push(Action::Think {
                    text: text.clone(),
                    seconds: bubble_seconds(*seconds),
                }),
                Action::Unknown { .. } => self.push(action.clone()),
            };
            if !fits {
                return false;
            }
        }
        true
    }

    fn repeat(&mut self, count: i32, body: &[Action]) -> bool {
        for _ in 0..count {
            let before = self.out.len();
            if !self.flatten(body) {
                return false;
            }
            // A body that expands to nothing stays empty on every pass.
            if self.out.len() == before {
                break;
            }
        }
        true
    }

    /// Emit `ceil(|steps| / max_increment)` moves: full increments, then the
    /// remainder. Piece count and remainder are computed in f64 so large
    /// moves neither drift nor stall.
    fn split_move(&mut self, steps: f32) -> bool {
        // A zero move still occupies one tick.
        if steps == 0.0 {
            return self.push(Action::Move { steps: 0.0 });
        }
        let increment = f64::from(self.max_increment);
        let total = f64::from(steps).abs();
        let sign = f64::from(steps.signum());
        let needed = (total / increment).ceil().max(1.0);
        let room = self.room();
        if room == 0 {
            return false;
        }
        let fits = needed <= room as f64;
        let pieces = if fits { needed as usize } else { room };

        for _ in 1..pieces {
            self.out.push(Action::Move {
                steps: (sign * increment) as f32,
            });
        }
        let tail = if fits {
            (total - (pieces - 1) as f64 * increment).clamp(0.0, increment)
        } else {
            increment
        };
        self.out.push(Action::Move {
            steps: (sign * tail) as f32,
        });
        fits
    }
}

fn finite_or(value: f32, default: f32, kind: &str) -> f32 {
    if value.is_finite() {
        value
    } else {
        log::warn!("Non-finite '{kind}' payload ({value}); using {default}");
        default
    }
}

fn bubble_seconds(seconds: f32) -> f32 {
    if seconds.is_finite() && seconds >= 0.0 {
        seconds
    } else {
        log::warn!("Invalid bubble duration {seconds}; using {DEFAULT_BUBBLE_SECONDS}s");
        DEFAULT_BUBBLE_SECONDS
    }
}
