//! MIDI controller input
//!
//! Opens a hardware input port and hands every parsed channel-voice message
//! to the session. The midir callback runs on the driver's own thread and
//! blocks until the session has processed each message.

use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection};
use tracing::{debug, info, trace};

use crate::midi::{format_hex, ControllerMessage};
use crate::session::ControllerHandoff;

/// List available MIDI input ports
pub fn list_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("fixa-scanner")?;

    let mut port_names = Vec::new();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            port_names.push(name);
        }
    }

    Ok(port_names)
}

/// Index of the first port name containing `pattern`, case-insensitively
pub fn match_port<S: AsRef<str>>(names: &[S], pattern: &str) -> Option<usize> {
    let pattern = pattern.to_lowercase();
    names
        .iter()
        .position(|name| name.as_ref().to_lowercase().contains(&pattern))
}

/// An open controller input port
pub struct ControllerDevice {
    port_name: String,
    /// Dropping the connection closes the port
    _connection: MidiInputConnection<()>,
}

impl ControllerDevice {
    /// Connect to the first input port matching `pattern`
    pub fn connect(pattern: &str, handoff: ControllerHandoff) -> Result<Self> {
        let midi_in = MidiInput::new("fixa-input").context("Failed to create MIDI input")?;

        let ports = midi_in.ports();
        debug!("Found {} MIDI input ports", ports.len());

        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_default())
            .collect();
        let index = match_port(&names, pattern)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", pattern))?;
        let port_name = names[index].clone();

        info!("Connecting to controller port: {}", port_name);

        let connection = midi_in
            .connect(
                &ports[index],
                "fixa-controller",
                move |_timestamp, data, _| match ControllerMessage::parse(data) {
                    Some(message) => {
                        trace!("RX {} | {}", format_hex(data), message);
                        if !handoff.deliver_blocking(message) {
                            debug!("Session gone, dropping {}", message);
                        }
                    }
                    None => debug!("Ignoring MIDI: {}", format_hex(data)),
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("Failed to connect to input port")?;

        Ok(Self {
            port_name,
            _connection: connection,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for ControllerDevice {
    fn drop(&mut self) {
        info!("Controller port '{}' closed", self.port_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_port_is_case_insensitive_substring() {
        let names = ["Midi Through Port-0", "nanoKONTROL2 SLIDER/KNOB", "X-Touch"];

        assert_eq!(match_port(&names, "nanokontrol"), Some(1));
        assert_eq!(match_port(&names, "x-touch"), Some(2));
        assert_eq!(match_port(&names, "launchpad"), None);
    }

    #[test]
    fn test_match_port_prefers_first_match() {
        let names = ["Port A", "Port B"];
        assert_eq!(match_port(&names, "port"), Some(0));
    }
}
