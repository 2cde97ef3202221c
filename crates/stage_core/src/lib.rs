//! Deterministic building blocks for the sprite stage: action programs, the
//! normalizer that flattens them, sprite poses, and the fixed-period clock.
//!
//! Nothing here knows about sessions, collisions, or wall-clock timers; see
//! `stage_runtime` for the driver.

pub mod normalize;
pub mod program;
pub mod sprite;
pub mod time;

pub use normalize::{normalize, normalize_with, NormalizedProgram, MAX_INSTRUCTIONS, MAX_MOVE_INCREMENT};
pub use program::{Action, ActionPatch, BubbleKind, Trigger, TriggerProgram};
pub use sprite::{normalize_heading, Costume, Pose, SpriteId};
pub use time::TickClock;
