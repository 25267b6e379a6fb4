//! Controller bindings
//!
//! Turns raw controller messages into typed fixable updates, and captures
//! new bindings in learn mode.

pub mod engine;
pub mod table;

pub use engine::{stepper_value, BindingEngine, BindingOutcome, PendingTrigger};
pub use table::{BindingDescriptor, BindingKind, BindingTable};
