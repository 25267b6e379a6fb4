//! Binding table: controller input number → binding descriptor

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::fixable::{FixableId, FixableKind};
use crate::midi::Voice;

/// How a controller input drives its fixable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    /// Momentary button mirrored into a bool
    Hold,
    /// Button flipping a bool on release
    Toggle,
    /// Knob or slider mapped onto a float range
    Stepper,
    /// Button firing a one-shot trigger
    Event,
}

impl BindingKind {
    /// Voices a binding of this kind can be learned from
    pub fn accepts_voice(self, voice: Voice) -> bool {
        match self {
            BindingKind::Hold | BindingKind::Toggle | BindingKind::Event => {
                matches!(voice, Voice::NoteOn | Voice::KeyPressure)
            }
            BindingKind::Stepper => matches!(voice, Voice::Control | Voice::PitchBend),
        }
    }

    /// Fixable kind this binding writes
    pub fn target_kind(self) -> FixableKind {
        match self {
            BindingKind::Stepper => FixableKind::Float,
            BindingKind::Hold | BindingKind::Toggle | BindingKind::Event => FixableKind::Bool,
        }
    }

    /// Default binding for a fixable kind, if it can be bound at all
    pub fn infer(kind: FixableKind) -> Option<Self> {
        match kind {
            FixableKind::Bool => Some(BindingKind::Hold),
            FixableKind::Float => Some(BindingKind::Stepper),
            FixableKind::Color | FixableKind::Divider | FixableKind::Group => None,
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Hold => write!(f, "hold"),
            BindingKind::Toggle => write!(f, "toggle"),
            BindingKind::Stepper => write!(f, "stepper"),
            BindingKind::Event => write!(f, "event"),
        }
    }
}

impl FromStr for BindingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hold" => Ok(BindingKind::Hold),
            "toggle" => Ok(BindingKind::Toggle),
            "stepper" => Ok(BindingKind::Stepper),
            "event" => Ok(BindingKind::Event),
            other => Err(format!("unknown binding kind '{}'", other)),
        }
    }
}

/// A bound controller input
#[derive(Debug, Clone, PartialEq)]
pub enum BindingDescriptor {
    Hold(FixableId),
    /// `on` is the current toggle phase
    Toggle { id: FixableId, on: bool },
    Stepper(FixableId),
    Event(FixableId),
}

impl BindingDescriptor {
    pub fn new(kind: BindingKind, id: FixableId, toggle_phase: bool) -> Self {
        match kind {
            BindingKind::Hold => BindingDescriptor::Hold(id),
            BindingKind::Toggle => BindingDescriptor::Toggle {
                id,
                on: toggle_phase,
            },
            BindingKind::Stepper => BindingDescriptor::Stepper(id),
            BindingKind::Event => BindingDescriptor::Event(id),
        }
    }

    pub fn kind(&self) -> BindingKind {
        match self {
            BindingDescriptor::Hold(_) => BindingKind::Hold,
            BindingDescriptor::Toggle { .. } => BindingKind::Toggle,
            BindingDescriptor::Stepper(_) => BindingKind::Stepper,
            BindingDescriptor::Event(_) => BindingKind::Event,
        }
    }

    pub fn target(&self) -> &FixableId {
        match self {
            BindingDescriptor::Hold(id)
            | BindingDescriptor::Toggle { id, .. }
            | BindingDescriptor::Stepper(id)
            | BindingDescriptor::Event(id) => id,
        }
    }
}

impl fmt::Display for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingDescriptor::Toggle { id, on } => {
                write!(f, "toggle {} ({})", id, if *on { "on" } else { "off" })
            }
            other => write!(f, "{} {}", other.kind(), other.target()),
        }
    }
}

/// Bindings keyed by controller input number
#[derive(Debug, Default, Clone)]
pub struct BindingTable {
    entries: HashMap<u8, BindingDescriptor>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an input number, returning the descriptor it replaces
    pub fn insert(&mut self, number: u8, descriptor: BindingDescriptor) -> Option<BindingDescriptor> {
        self.entries.insert(number, descriptor)
    }

    pub fn get(&self, number: u8) -> Option<&BindingDescriptor> {
        self.entries.get(&number)
    }

    pub fn get_mut(&mut self, number: u8) -> Option<&mut BindingDescriptor> {
        self.entries.get_mut(&number)
    }

    pub fn remove(&mut self, number: u8) -> Option<BindingDescriptor> {
        self.entries.remove(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by input number
    pub fn sorted(&self) -> Vec<(u8, BindingDescriptor)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(number, descriptor)| (*number, descriptor.clone()))
            .collect();
        entries.sort_by_key(|(number, _)| *number);
        entries
    }
}
