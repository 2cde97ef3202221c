//! Sprite identity, pose, and costume handles.
//!
//! Positions use the top-left convention: `position` is the upper-left corner
//! of the sprite's bounding box, with +y pointing down the stage. Headings are
//! degrees in `[0, 360)`, where 0 points along +x and 90 along +y.

use glam::Vec2;

/// Heading assigned to sprites that do not specify one.
pub const DEFAULT_HEADING_DEG: f32 = 90.0;

/// Stable identifier of a sprite within one stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteId(String);

impl SpriteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for sprites added without one.
    pub fn generate() -> Self {
        Self(format!("sprite-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpriteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpriteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Position plus heading. Used both for the recorded start pose and the live pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub heading: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, heading: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            heading: normalize_heading(heading),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(0.0, 0.0, DEFAULT_HEADING_DEG)
    }
}

/// Wrap any finite angle into `[0, 360)`. Non-finite input maps to 0.
pub fn normalize_heading(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let mut wrapped = degrees % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    // -1e-6 % 360 + 360 rounds to exactly 360 in f32.
    if wrapped >= 360.0 {
        wrapped = 0.0;
    }
    wrapped
}

/// Named visual renderer a sprite is drawn with. The runtime only carries the
/// handle; drawing belongs to whoever consumes the snapshots.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Costume {
    #[default]
    Cat,
    Dog,
    Robot,
    Alien,
    Ball,
    Beetle,
}

impl Costume {
    /// All costumes in catalog order.
    pub const ALL: &'static [Costume] = &[
        Costume::Cat,
        Costume::Dog,
        Costume::Robot,
        Costume::Alien,
        Costume::Ball,
        Costume::Beetle,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Cat => "Cat",
            Self::Dog => "Dog",
            Self::Robot => "Robot",
            Self::Alien => "Alien",
            Self::Ball => "Ball",
            Self::Beetle => "Beetle",
        }
    }

    /// Case-insensitive lookup by catalog name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|costume| costume.label().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for Costume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
