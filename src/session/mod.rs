//! Live session with a target application
//!
//! One actor per session owns the fixable configs and values, the dirty-set
//! of unsent local edits, and the binding engine. Local edits are coalesced
//! and flushed to the target as value batches after a throttle window;
//! inbound batches overwrite local values without being echoed back.

mod actor;
mod actor_handle;
mod commands;
mod store;
mod types;


pub use actor::SessionActor;
pub use actor_handle::{ControllerHandoff, SessionHandle};
pub use store::{DirtySet, SessionStore};
pub use types::{
    ConnectionId, EditOrigin, SendFrequency, SessionEvent, SessionSettings, SessionSnapshot,
    SessionState, SnapshotRow,
};
