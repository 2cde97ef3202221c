//! Action program model: what a sprite does, per trigger.
//!
//! A [`TriggerProgram`] holds one ordered action list per [`Trigger`]. Lists
//! may nest `repeat` blocks; the normalizer flattens them before execution, so
//! nothing in this module interprets actions.
//!
//! Authoring edits (append / remove / update / reorder / drop-into-repeat)
//! are the only way lists change. Edits never touch a run in flight: the
//! interpreter works from a normalized snapshot taken when it was armed.
//!
//! The JSON shape matches the block editor's export: `{ "event": "play",
//! "actions": [{ "type": "move", "payload": { "steps": 10 } }] }`. Conversion
//! never fails on a block: missing or non-numeric fields fall back to
//! documented defaults and unknown kinds survive as [`Action::Unknown`] so the
//! run can skip them.

use serde::Deserialize;
use serde_json::Value;

/// Bubble lifetime used when a say/think block omits `seconds`.
pub const DEFAULT_BUBBLE_SECONDS: f32 = 1.0;

/// Largest `repeat` count accepted from editor JSON.
pub const MAX_REPEAT_COUNT: i32 = 10_000;

/// Named event that arms a sprite's action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Trigger {
    Play,
    Click,
}

impl Trigger {
    pub const ALL: &'static [Trigger] = &[Trigger::Play, Trigger::Click];

    pub fn label(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Click => "click",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "play" => Some(Self::Play),
            "click" => Some(Self::Click),
            _ => None,
        }
    }

    /// The trigger that is not `self`. With two triggers this pairs the
    /// active list with the inactive one.
    pub fn other(self) -> Self {
        match self {
            Self::Play => Self::Click,
            Self::Click => Self::Play,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BubbleKind {
    Say,
    Think,
}

impl BubbleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Say => "say",
            Self::Think => "think",
        }
    }
}

/// One block in a program. `Repeat` is the only composite variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Move { steps: f32 },
    Turn { degrees: f32 },
    Goto { x: f32, y: f32 },
    Say { text: String, seconds: f32 },
    Think { text: String, seconds: f32 },
    Repeat { count: i32, actions: Vec<Action> },
    /// A block whose kind this runtime does not know. Kept so authoring
    /// round-trips it; execution skips it.
    Unknown { kind: String },
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Self::Move { .. } => "move",
            Self::Turn { .. } => "turn",
            Self::Goto { .. } => "goto",
            Self::Say { .. } => "say",
            Self::Think { .. } => "think",
            Self::Repeat { .. } => "repeat",
            Self::Unknown { kind } => kind,
        }
    }

    /// True for everything except `repeat`.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Self::Repeat { .. })
    }

    // Palette defaults: what a freshly dropped block contains.

    pub fn default_move() -> Self {
        Self::Move { steps: 10.0 }
    }

    pub fn default_turn_left() -> Self {
        Self::Turn { degrees: -15.0 }
    }

    pub fn default_turn_right() -> Self {
        Self::Turn { degrees: 15.0 }
    }

    pub fn default_goto() -> Self {
        Self::Goto { x: 0.0, y: 0.0 }
    }

    pub fn default_say() -> Self {
        Self::Say {
            text: "Hello".to_string(),
            seconds: 2.0,
        }
    }

    pub fn default_think() -> Self {
        Self::Think {
            text: "Hmm".to_string(),
            seconds: 2.0,
        }
    }

    pub fn default_repeat() -> Self {
        Self::Repeat {
            count: 2,
            actions: Vec::new(),
        }
    }

    /// Merge `patch` into this block's payload. Fields that do not belong to
    /// this kind are ignored, as are fields the patch leaves unset.
    pub fn apply_patch(&mut self, patch: &ActionPatch) {
        match self {
            Self::Move { steps } => {
                if let Some(v) = patch.steps {
                    *steps = v;
                }
            }
            Self::Turn { degrees } => {
                if let Some(v) = patch.degrees {
                    *degrees = v;
                }
            }
            Self::Goto { x, y } => {
                if let Some(v) = patch.x {
                    *x = v;
                }
                if let Some(v) = patch.y {
                    *y = v;
                }
            }
            Self::Say { text, seconds } | Self::Think { text, seconds } => {
                if let Some(v) = &patch.text {
                    *text = v.clone();
                }
                if let Some(v) = patch.seconds {
                    *seconds = v;
                }
            }
            Self::Repeat { count, actions } => {
                if let Some(v) = patch.count {
                    *count = v;
                }
                if let Some(v) = &patch.actions {
                    *actions = v.clone();
                }
            }
            Self::Unknown { .. } => {}
        }
    }

    /// Build an action from its editor JSON. Never fails; see module docs.
    pub fn from_json(json: &ActionJson) -> Self {
        let kind = json.kind.as_str();
        let payload = &json.payload;
        match kind {
            "move" => Self::Move {
                steps: number_field(payload, kind, "steps", 0.0),
            },
            "turn" => Self::Turn {
                degrees: number_field(payload, kind, "degrees", 0.0),
            },
            "goto" => Self::Goto {
                x: number_field(payload, kind, "x", 0.0),
                y: number_field(payload, kind, "y", 0.0),
            },
            "say" => Self::Say {
                text: text_field(payload, "text"),
                seconds: number_field(payload, kind, "seconds", DEFAULT_BUBBLE_SECONDS),
            },
            "think" => Self::Think {
                text: text_field(payload, "text"),
                seconds: number_field(payload, kind, "seconds", DEFAULT_BUBBLE_SECONDS),
            },
            "repeat" => Self::Repeat {
                count: repeat_count(number_field(payload, kind, "count", 1.0)),
                actions: nested_actions(payload),
            },
            other => {
                log::warn!("Unknown action kind '{other}' kept as a no-op block");
                Self::Unknown {
                    kind: other.to_string(),
                }
            }
        }
    }
}

/// Partial payload for the update-payload edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPatch {
    pub steps: Option<f32>,
    pub degrees: Option<f32>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub text: Option<String>,
    pub seconds: Option<f32>,
    pub count: Option<i32>,
    pub actions: Option<Vec<Action>>,
}

/// Per-trigger action lists owned by one sprite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerProgram {
    play: Vec<Action>,
    click: Vec<Action>,
}

impl TriggerProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actions(mut self, trigger: Trigger, actions: Vec<Action>) -> Self {
        *self.actions_mut(trigger) = actions;
        self
    }

    pub fn actions(&self, trigger: Trigger) -> &[Action] {
        match trigger {
            Trigger::Play => &self.play,
            Trigger::Click => &self.click,
        }
    }

    fn actions_mut(&mut self, trigger: Trigger) -> &mut Vec<Action> {
        match trigger {
            Trigger::Play => &mut self.play,
            Trigger::Click => &mut self.click,
        }
    }

    pub fn append(&mut self, trigger: Trigger, action: Action) {
        self.actions_mut(trigger).push(action);
    }

    pub fn remove(&mut self, trigger: Trigger, index: usize) -> Result<Action, String> {
        let list = self.actions_mut(trigger);
        if index >= list.len() {
            return Err(out_of_range(trigger, index, list.len()));
        }
        Ok(list.remove(index))
    }

    pub fn update(
        &mut self,
        trigger: Trigger,
        index: usize,
        patch: &ActionPatch,
    ) -> Result<(), String> {
        let list = self.actions_mut(trigger);
        let len = list.len();
        let action = list
            .get_mut(index)
            .ok_or_else(|| out_of_range(trigger, index, len))?;
        action.apply_patch(patch);
        Ok(())
    }

    /// Move the block at `from` so it ends up at `to` (splice semantics).
    pub fn reorder(&mut self, trigger: Trigger, from: usize, to: usize) -> Result<(), String> {
        let list = self.actions_mut(trigger);
        let len = list.len();
        if from >= len {
            return Err(out_of_range(trigger, from, len));
        }
        if to >= len {
            return Err(out_of_range(trigger, to, len));
        }
        let action = list.remove(from);
        list.insert(to, action);
        Ok(())
    }

    /// Drop `action` at the end of the body of the repeat block at `repeat_index`.
    pub fn append_to_repeat(
        &mut self,
        trigger: Trigger,
        repeat_index: usize,
        action: Action,
    ) -> Result<(), String> {
        let list = self.actions_mut(trigger);
        let len = list.len();
        match list.get_mut(repeat_index) {
            Some(Action::Repeat { actions, .. }) => {
                actions.push(action);
                Ok(())
            }
            Some(other) => Err(format!(
                "Edit rejected: {trigger} block {repeat_index} is '{}', not 'repeat'",
                other.kind()
            )),
            None => Err(out_of_range(trigger, repeat_index, len)),
        }
    }

    /// Exchange lists with `other`: our `mine` list with their `theirs` list,
    /// and our remaining list with their remaining list.
    pub fn exchange_with(&mut self, mine: Trigger, other: &mut TriggerProgram, theirs: Trigger) {
        std::mem::swap(self.actions_mut(mine), other.actions_mut(theirs));
        std::mem::swap(
            self.actions_mut(mine.other()),
            other.actions_mut(theirs.other()),
        );
    }

    /// Build a program from the editor's event list.
    pub fn from_events(events: &[EventActionsJson]) -> Result<Self, String> {
        let mut program = Self::new();
        let mut seen = Vec::new();
        for entry in events {
            let trigger = Trigger::parse(&entry.event).ok_or_else(|| {
                format!(
                    "Program validation failed: unknown event '{}'",
                    entry.event
                )
            })?;
            if seen.contains(&trigger) {
                return Err(format!(
                    "Program validation failed: duplicate event '{}'",
                    entry.event
                ));
            }
            seen.push(trigger);
            *program.actions_mut(trigger) = entry.actions.iter().map(Action::from_json).collect();
        }
        Ok(program)
    }
}

fn out_of_range(trigger: Trigger, index: usize, len: usize) -> String {
    format!("Edit rejected: {trigger} has {len} blocks, index {index} is out of range")
}

// --- JSON types (editor export format) ---

#[derive(Debug, Clone, Deserialize)]
pub struct EventActionsJson {
    pub event: String,
    #[serde(default)]
    pub actions: Vec<ActionJson>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionJson {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

fn number_field(payload: &Value, kind: &str, field: &str, default: f32) -> f32 {
    match payload.get(field) {
        None | Some(Value::Null) => default,
        Some(value) => match value.as_f64() {
            Some(n) if n.is_finite() => n as f32,
            _ => {
                log::warn!(
                    "Action '{kind}': field '{field}' is not a number ({value}); using {default}"
                );
                default
            }
        },
    }
}

fn repeat_count(raw: f32) -> i32 {
    if raw > MAX_REPEAT_COUNT as f32 {
        log::warn!("Repeat count {raw} is too large; using {MAX_REPEAT_COUNT}");
        return MAX_REPEAT_COUNT;
    }
    raw as i32
}

fn text_field(payload: &Value, field: &str) -> String {
    match payload.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn nested_actions(payload: &Value) -> Vec<Action> {
    let Some(items) = payload.get("actions").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match serde_json::from_value::<ActionJson>(item.clone()) {
            Ok(json) => Action::from_json(&json),
            Err(err) => {
                log::warn!("Malformed block inside repeat ({err}); kept as a no-op");
                Action::Unknown {
                    kind: "malformed".to_string(),
                }
            }
        })
        .collect()
}
