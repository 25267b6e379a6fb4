//! Session types shared by the actor, its handle and observers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::bindings::{BindingDescriptor, BindingKind};
use crate::fixable::{FixableId, FixableKind, FixableValue};
use crate::midi::Voice;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

/// Outbound throttle window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendFrequency {
    /// Flush on the next scheduler turn
    Immediate,
    /// 20 ms
    Normal,
    /// 500 ms, for slow or remote targets
    Careful,
}

impl SendFrequency {
    pub fn duration(self) -> Duration {
        match self {
            SendFrequency::Immediate => Duration::ZERO,
            SendFrequency::Normal => Duration::from_millis(20),
            SendFrequency::Careful => Duration::from_millis(500),
        }
    }
}

impl FromStr for SendFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(SendFrequency::Immediate),
            "normal" => Ok(SendFrequency::Normal),
            "careful" => Ok(SendFrequency::Careful),
            other => Err(format!("unknown send frequency '{}'", other)),
        }
    }
}

/// Who produced a local edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Console or other user-facing layer
    User,
    /// Hardware controller binding
    Controller,
}

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Identity of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications emitted by the session actor
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Something observable changed; take a fresh snapshot
    Changed,
    /// The peer announced its fixables
    Connected {
        connection: ConnectionId,
        stream_name: String,
    },
    /// Emitted exactly once per connection that ends
    Disconnected { connection: ConnectionId },
    /// An inbound frame could not be decoded; the session continues
    DecodeFailed {
        connection: ConnectionId,
        error: String,
    },
    /// Learn mode captured a controller input
    Bound {
        number: u8,
        descriptor: BindingDescriptor,
    },
    /// Learn mode ignored an input of the wrong kind
    BindingIncompatible { kind: BindingKind, voice: Voice },
}

/// Tuning knobs of a session actor
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Throttle window for user edits
    pub send_frequency: SendFrequency,
    /// Throttle window for controller edits
    pub controller_frequency: SendFrequency,
    /// Send all values back after a session starts
    pub sync_on_start: bool,
    /// Bindings installed before any learning
    pub preset_bindings: Vec<(u8, BindingDescriptor)>,
}

impl SessionSettings {
    pub fn window(&self, origin: EditOrigin) -> Duration {
        match origin {
            EditOrigin::User => self.send_frequency.duration(),
            EditOrigin::Controller => self.controller_frequency.duration(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            send_frequency: SendFrequency::Normal,
            controller_frequency: SendFrequency::Immediate,
            sync_on_start: true,
            preset_bindings: Vec::new(),
        }
    }
}

/// One display row of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub id: FixableId,
    pub label: String,
    pub kind: FixableKind,
    pub range: Option<(f32, f32)>,
    pub value: Option<FixableValue>,
    /// Nesting level, 1 for group contents
    pub depth: usize,
}

/// Point-in-time view of a session for user-facing layers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub connection: Option<ConnectionId>,
    pub stream_name: Option<String>,
    pub rows: Vec<SnapshotRow>,
    pub dirty: Vec<FixableId>,
    pub pending_binding: Option<(FixableId, BindingKind)>,
}

impl SessionSnapshot {
    pub fn value(&self, id: &FixableId) -> Option<FixableValue> {
        self.rows.iter().find(|r| &r.id == id).and_then(|r| r.value)
    }

    pub fn row(&self, id: &FixableId) -> Option<&SnapshotRow> {
        self.rows.iter().find(|r| &r.id == id)
    }
}
