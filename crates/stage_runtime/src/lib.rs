//! Stage runtime: the per-sprite interpreter, the shared sprite registry, the
//! collision coordinator, and the [`Stage`] session that drives them on a
//! fixed tick.
//!
//! Everything runs on the caller's thread. The host owns the loop: call
//! [`Stage::advance`] with the current instant whenever it has control, then
//! read [`Stage::snapshots`] to render.

pub mod bubble;
pub mod collision;
pub mod interpreter;
pub mod registry;
pub mod stage;
pub mod stage_file;

pub use bubble::BubbleTimers;
pub use collision::{Aabb, CollisionCoordinator, CollisionEvent, ContactMode, PairKey};
pub use interpreter::{Bubble, RunPhase, SpriteInterpreter, SpriteSnapshot, TickEffect};
pub use registry::{SpriteRecord, SpriteRegistry, SpriteSpec};
pub use stage::{Stage, StageConfig};
pub use stage_file::{load_stage_from_path, StageFile, StageWatcher};
