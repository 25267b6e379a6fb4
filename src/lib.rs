//! fixa controller library
//!
//! Keeps a target application's fixables in sync over a message transport
//! and drives them from MIDI controllers.

pub mod bindings;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixable;
pub mod hardware;
pub mod midi;
pub mod paths;
pub mod persistence;
pub mod session;
pub mod stream;
pub mod transport;
pub mod wire;
