use serde::Deserialize;
use stage_core::program::{EventActionsJson, TriggerProgram};
use stage_core::sprite::{Costume, Pose, SpriteId};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::registry::SpriteSpec;
use crate::stage::{Stage, StageConfig};

pub const SUPPORTED_VERSION: &str = "0.1";

#[derive(Debug, Deserialize, Clone)]
pub struct StageFile {
    pub version: String,
    pub stage_id: String,
    #[serde(default)]
    pub config: StageConfig,
    pub sprites: Vec<StageSprite>,
    /// Scripted clicks replayed by the headless player.
    #[serde(default)]
    pub clicks: Vec<ScriptedClick>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StageSprite {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub costume: Option<String>,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_direction")]
    pub direction: f32,
    #[serde(default)]
    pub actions: Vec<EventActionsJson>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScriptedClick {
    pub at_tick: u64,
    pub sprite: String,
}

impl StageSprite {
    fn to_spec(&self) -> Result<SpriteSpec, String> {
        let costume = match &self.costume {
            Some(name) => Costume::parse(name).ok_or_else(|| {
                invalid(format_args!(
                    "sprite '{}' has unknown costume '{name}'",
                    self.name
                ))
            })?,
            None => Costume::default(),
        };
        Ok(SpriteSpec {
            id: self.id.as_deref().map(SpriteId::new),
            name: self.name.clone(),
            costume,
            start: Pose::new(self.x, self.y, self.direction),
            program: TriggerProgram::from_events(&self.actions)?,
        })
    }
}

impl StageFile {
    /// Build a fresh, stopped stage from this file.
    pub fn build(&self) -> Result<Stage, String> {
        let mut stage = Stage::new(self.config.clone());
        for sprite in &self.sprites {
            stage.add_sprite(sprite.to_spec()?)?;
        }
        Ok(stage)
    }

    pub fn clicks_at(&self, tick: u64) -> impl Iterator<Item = SpriteId> + '_ {
        self.clicks
            .iter()
            .filter(move |click| click.at_tick == tick)
            .map(|click| SpriteId::new(click.sprite.as_str()))
    }
}

/// Polls the stage file's modification time between frames.
pub struct StageWatcher {
    stage_path: PathBuf,
    seen: Option<SystemTime>,
}

impl StageWatcher {
    pub fn new(stage_path: PathBuf) -> Self {
        let seen = modified_time(&stage_path);
        Self { stage_path, seen }
    }

    pub fn path(&self) -> &Path {
        &self.stage_path
    }

    /// True once per observed change, including the file first appearing.
    /// A file that disappears is ignored until it comes back newer.
    pub fn poll_changed(&mut self) -> bool {
        let stamp = modified_time(&self.stage_path);
        if stamp > self.seen {
            self.seen = stamp;
            return true;
        }
        false
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

pub fn load_stage_from_path(stage_path: &Path) -> Result<StageFile, String> {
    let shown = stage_path.display();
    let raw = fs::read_to_string(stage_path)
        .map_err(|e| format!("Cannot open stage {shown}: {e}"))?;
    let stage: StageFile = serde_json::from_str(&raw)
        .map_err(|e| format!("Stage {shown} is not valid stage JSON: {e}"))?;
    validate_stage(&stage)?;
    Ok(stage)
}

fn invalid(reason: impl std::fmt::Display) -> String {
    format!("Stage validation failed: {reason}")
}

fn validate_stage(stage: &StageFile) -> Result<(), String> {
    if stage.version != SUPPORTED_VERSION {
        return Err(invalid(format_args!(
            "unsupported version '{}' (expected '{SUPPORTED_VERSION}')",
            stage.version
        )));
    }
    if stage.stage_id.trim().is_empty() {
        return Err(invalid("stage_id is empty"));
    }
    stage.config.validate()?;

    if stage.sprites.is_empty() {
        log::warn!("Stage '{}' has no sprites; Play will do nothing", stage.stage_id);
    }

    let mut clickable = HashSet::new();
    for sprite in &stage.sprites {
        validate_sprite(sprite)?;
        if let Some(id) = &sprite.id {
            if !clickable.insert(id.as_str()) {
                return Err(invalid(format_args!("duplicate sprite id '{id}'")));
            }
        }
    }
    validate_clicks(&stage.clicks, &clickable)
}

fn validate_sprite(sprite: &StageSprite) -> Result<(), String> {
    if sprite.name.trim().is_empty() {
        return Err(invalid("sprite with empty name"));
    }
    if !(sprite.x.is_finite() && sprite.y.is_finite() && sprite.direction.is_finite()) {
        return Err(invalid(format_args!(
            "sprite '{}' has a non-finite position or direction",
            sprite.name
        )));
    }
    // Unknown costumes and events are reported with the sprite's name.
    sprite.to_spec().map(|_| ())
}

/// Scripted clicks can only target sprites that carry an explicit id.
fn validate_clicks(clicks: &[ScriptedClick], clickable: &HashSet<&str>) -> Result<(), String> {
    match clicks
        .iter()
        .find(|click| !clickable.contains(click.sprite.as_str()))
    {
        Some(click) => Err(invalid(format_args!(
            "click at tick {} targets unknown sprite id '{}'",
            click.at_tick, click.sprite
        ))),
        None => Ok(()),
    }
}

const fn default_direction() -> f32 {
    stage_core::sprite::DEFAULT_HEADING_DEG
}
