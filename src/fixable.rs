//! Fixable parameter model
//!
//! Identity, static shape and current value of the live-tunable parameters a
//! target application exposes. Configs are fixed for the lifetime of a
//! session; only values change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of one fixable, optionally namespaced under a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixableId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl FixableId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
        }
    }

    pub fn in_group(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: Some(group.into()),
        }
    }

    /// Parse `name` or `group/name`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match text.split_once('/') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() => {
                Some(Self::in_group(name, group))
            }
            Some(_) => None,
            None => Some(Self::new(text)),
        }
    }
}

impl fmt::Display for FixableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}/{}", group, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Label and sort order shown next to a fixable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixableDisplay {
    pub label: String,
    #[serde(default)]
    pub order: i32,
}

impl FixableDisplay {
    pub fn new(label: impl Into<String>, order: i32) -> Self {
        Self {
            label: label.into(),
            order,
        }
    }
}

/// RGBA color with components in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "default_alpha")]
    pub a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    /// Parse `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.trim().strip_prefix('#')?;
        if hex.len() != 6 && hex.len() != 8 {
            return None;
        }
        let channel = |i: usize| -> Option<f32> {
            let byte = u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()?;
            Some(byte as f32 / 255.0)
        };
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 1.0 },
        })
    }

    pub fn to_hex(&self) -> String {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            byte(self.r),
            byte(self.g),
            byte(self.b),
            byte(self.a)
        )
    }
}

/// Kind tag shared by configs and values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixableKind {
    Bool,
    Float,
    Color,
    Divider,
    Group,
}

impl fmt::Display for FixableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixableKind::Bool => write!(f, "bool"),
            FixableKind::Float => write!(f, "float"),
            FixableKind::Color => write!(f, "color"),
            FixableKind::Divider => write!(f, "divider"),
            FixableKind::Group => write!(f, "group"),
        }
    }
}

/// Static shape of a fixable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FixableConfig {
    Bool {
        display: FixableDisplay,
    },
    Float {
        min: f32,
        max: f32,
        display: FixableDisplay,
    },
    Color {
        display: FixableDisplay,
    },
    Divider {
        display: FixableDisplay,
    },
    Group {
        contents: Vec<(FixableId, FixableConfig)>,
        display: FixableDisplay,
    },
}

impl FixableConfig {
    pub fn kind(&self) -> FixableKind {
        match self {
            FixableConfig::Bool { .. } => FixableKind::Bool,
            FixableConfig::Float { .. } => FixableKind::Float,
            FixableConfig::Color { .. } => FixableKind::Color,
            FixableConfig::Divider { .. } => FixableKind::Divider,
            FixableConfig::Group { .. } => FixableKind::Group,
        }
    }

    pub fn display(&self) -> &FixableDisplay {
        match self {
            FixableConfig::Bool { display }
            | FixableConfig::Float { display, .. }
            | FixableConfig::Color { display }
            | FixableConfig::Divider { display }
            | FixableConfig::Group { display, .. } => display,
        }
    }

    /// Range of a float config
    pub fn range(&self) -> Option<(f32, f32)> {
        match self {
            FixableConfig::Float { min, max, .. } => Some((*min, *max)),
            _ => None,
        }
    }

    /// Whether `value` has the shape this config describes
    pub fn accepts(&self, value: &FixableValue) -> bool {
        self.kind() == value.kind()
    }
}

/// Current value of a fixable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FixableValue {
    Bool(bool),
    Float(f32),
    Color(Color),
}

impl FixableValue {
    pub fn kind(&self) -> FixableKind {
        match self {
            FixableValue::Bool(_) => FixableKind::Bool,
            FixableValue::Float(_) => FixableKind::Float,
            FixableValue::Color(_) => FixableKind::Color,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FixableValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            FixableValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Pull a float into `range`; other values pass through
    pub fn clamped(self, range: Option<(f32, f32)>) -> Self {
        match (self.as_float(), range) {
            (Some(v), Some((min, max))) => FixableValue::Float(v.max(min).min(max)),
            _ => self,
        }
    }
}

impl fmt::Display for FixableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixableValue::Bool(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            FixableValue::Float(v) => write!(f, "{:.3}", v),
            FixableValue::Color(c) => write!(f, "{}", c.to_hex()),
        }
    }
}

/// Config store keyed by id
pub type NamedConfigs = HashMap<FixableId, FixableConfig>;

/// Value store keyed by id
pub type NamedValues = HashMap<FixableId, FixableValue>;

/// Collect the flat (valued) entries of a config set.
///
/// Group contents are promoted to top level, dividers and the group
/// entries themselves are skipped.
pub fn flatten_configs<'a, I>(configs: I) -> NamedConfigs
where
    I: IntoIterator<Item = (&'a FixableId, &'a FixableConfig)>,
{
    let mut flat = NamedConfigs::new();
    for (id, config) in configs {
        collect_flat(id, config, &mut flat);
    }
    flat
}

fn collect_flat(id: &FixableId, config: &FixableConfig, flat: &mut NamedConfigs) {
    match config {
        FixableConfig::Group { contents, .. } => {
            for (id, config) in contents {
                collect_flat(id, config, flat);
            }
        }
        FixableConfig::Divider { .. } => {}
        _ => {
            flat.insert(id.clone(), config.clone());
        }
    }
}

/// Default value for a flat config (false, range minimum, black)
pub fn initial_value(config: &FixableConfig) -> Option<FixableValue> {
    match config {
        FixableConfig::Bool { .. } => Some(FixableValue::Bool(false)),
        FixableConfig::Float { min, .. } => Some(FixableValue::Float(*min)),
        FixableConfig::Color { .. } => Some(FixableValue::Color(Color::BLACK)),
        FixableConfig::Divider { .. } | FixableConfig::Group { .. } => None,
    }
}
