//! MIDI utilities and message types
//!
//! Parses raw channel-voice messages from a controller into the
//! (voice, input number, data) triples the binding engine works with.

use std::fmt;

/// Channel voice classification of a MIDI message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    NoteOff,
    NoteOn,
    KeyPressure,
    Control,
    Program,
    ChannelPressure,
    PitchBend,
}

impl Voice {
    /// Classify a status byte (channel nibble ignored)
    pub fn from_status(status: u8) -> Option<Self> {
        match status & 0xF0 {
            0x80 => Some(Voice::NoteOff),
            0x90 => Some(Voice::NoteOn),
            0xA0 => Some(Voice::KeyPressure),
            0xB0 => Some(Voice::Control),
            0xC0 => Some(Voice::Program),
            0xD0 => Some(Voice::ChannelPressure),
            0xE0 => Some(Voice::PitchBend),
            _ => None,
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Voice::NoteOff => "note-off",
            Voice::NoteOn => "note-on",
            Voice::KeyPressure => "key-pressure",
            Voice::Control => "control",
            Voice::Program => "program",
            Voice::ChannelPressure => "channel-pressure",
            Voice::PitchBend => "pitch-bend",
        };
        write!(f, "{}", name)
    }
}

/// One controller input event
///
/// `number` identifies the physical control (note or CC number). Pitch bend
/// has no such byte, so its channel stands in for the number and `data`
/// carries the coarse (MSB) position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerMessage {
    pub voice: Voice,
    /// MIDI channel (0-15)
    pub channel: u8,
    pub number: u8,
    /// Data value (0-127)
    pub data: u8,
}

impl ControllerMessage {
    pub fn new(voice: Voice, number: u8, data: u8) -> Self {
        Self {
            voice,
            channel: 0,
            number: number & 0x7F,
            data: data & 0x7F,
        }
    }

    /// Parse a channel voice message from raw bytes
    ///
    /// Note On with velocity 0 is reported as Note Off. System messages and
    /// running status are not supported.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }

        let voice = Voice::from_status(status)?;
        let channel = status & 0x0F;
        let byte = |i: usize| data.get(i).map(|b| b & 0x7F);

        match voice {
            Voice::Program | Voice::ChannelPressure => Some(Self {
                voice,
                channel,
                number: 0,
                data: byte(1)?,
            }),
            Voice::PitchBend => Some(Self {
                voice,
                channel,
                number: channel,
                data: byte(2)?,
            }),
            Voice::NoteOn if byte(2)? == 0 => Some(Self {
                voice: Voice::NoteOff,
                channel,
                number: byte(1)?,
                data: 0,
            }),
            _ => Some(Self {
                voice,
                channel,
                number: byte(1)?,
                data: byte(2)?,
            }),
        }
    }

    /// Whether this is a button press (note-on, or key pressure above zero)
    pub fn is_press(&self) -> bool {
        match self.voice {
            Voice::NoteOn => true,
            Voice::KeyPressure => self.data > 0,
            _ => false,
        }
    }

    /// Whether this is a button release (note-off, or key pressure at zero)
    pub fn is_release(&self) -> bool {
        match self.voice {
            Voice::NoteOff => true,
            Voice::KeyPressure => self.data == 0,
            _ => false,
        }
    }
}

impl fmt::Display for ControllerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ch:{} n:{} v:{}",
            self.voice,
            self.channel + 1,
            self.number,
            self.data
        )
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = ControllerMessage::parse(&[0x90, 60, 100]).unwrap();
        assert_eq!(msg.voice, Voice::NoteOn);
        assert_eq!(msg.channel, 0);
        assert_eq!(msg.number, 60);
        assert_eq!(msg.data, 100);
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let msg = ControllerMessage::parse(&[0x90, 60, 0]).unwrap();
        assert_eq!(msg.voice, Voice::NoteOff);
        assert!(msg.is_release());
    }

    #[test]
    fn test_control_change() {
        let msg = ControllerMessage::parse(&[0xB2, 7, 100]).unwrap();
        assert_eq!(msg.voice, Voice::Control);
        assert_eq!(msg.channel, 2);
        assert_eq!(msg.number, 7);
        assert_eq!(msg.data, 100);
    }

    #[test]
    fn test_pitch_bend_uses_channel_and_msb() {
        let msg = ControllerMessage::parse(&[0xE3, 0x12, 0x40]).unwrap();
        assert_eq!(msg.voice, Voice::PitchBend);
        assert_eq!(msg.number, 3);
        assert_eq!(msg.data, 64);
    }

    #[test]
    fn test_short_and_system_messages_rejected() {
        assert!(ControllerMessage::parse(&[]).is_none());
        assert!(ControllerMessage::parse(&[0xB0, 7]).is_none());
        assert!(ControllerMessage::parse(&[0xF8]).is_none());
        assert!(ControllerMessage::parse(&[0x40, 1, 2]).is_none());
    }

    #[test]
    fn test_key_pressure_press_release() {
        let pressed = ControllerMessage::new(Voice::KeyPressure, 5, 40);
        let released = ControllerMessage::new(Voice::KeyPressure, 5, 0);
        assert!(pressed.is_press() && !pressed.is_release());
        assert!(released.is_release() && !released.is_press());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x90, 0x3C, 0x7F]), "90 3C 7F");
    }
}
