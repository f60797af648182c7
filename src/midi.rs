// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

pub mod backend;
pub mod connect;
pub mod device;
mod error;
pub mod midir;
pub mod mock;
pub mod port;

pub use error::{MidiError, PortError};

use crate::midi::device::{Device, SystemDevices};

/// MIDI command byte for a Note On message.
pub const NOTE_ON: u8 = 0x90;
/// MIDI command byte for a Note Off message.
pub const NOTE_OFF: u8 = 0x80;
/// MIDI command byte for a Control Change message.
pub const CONTROL_CHANGE: u8 = 0xB0;

/// A parsed MIDI message as it travels through ports and connectors.
///
/// Only the message types the fabric routes natively get their own variant;
/// everything else is carried verbatim as [`Message::Raw`] so unrecognized
/// hardware traffic still flows through pipes and funnels unharmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    NoteOn {
        channel: u8,
        key: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        key: u8,
    },
    ControlChange {
        channel: u8,
        id: u8,
        value: u8,
        /// The General MIDI description of the control change ID.
        name: &'static str,
    },
    Raw {
        channel: u8,
        command: u8,
        data1: u8,
        data2: u8,
    },
}

impl Message {
    /// Decodes a 3-byte MIDI event packed into a 32-bit wire word.
    ///
    /// A Note On with velocity 0 is canonicalized into a Note Off here, at
    /// the port boundary, so no downstream consumer has to special-case that
    /// idiom.
    pub fn from_wire(word: u32) -> Message {
        let status = (word & 0xFF) as u8;
        let channel = status & 0x0F;
        let command = status & 0xF0;
        let data1 = ((word >> 8) & 0xFF) as u8;
        let data2 = ((word >> 16) & 0xFF) as u8;
        match command {
            NOTE_ON if data2 == 0 => Message::NoteOff { channel, key: data1 },
            NOTE_ON => Message::NoteOn {
                channel,
                key: data1,
                velocity: data2,
            },
            NOTE_OFF => Message::NoteOff { channel, key: data1 },
            CONTROL_CHANGE => Message::ControlChange {
                channel,
                id: data1,
                value: data2,
                name: control_change_name(data1),
            },
            _ => Message::Raw {
                channel,
                command,
                data1,
                data2,
            },
        }
    }

    /// Packs the message into its 3-byte wire word:
    /// `(data2 << 16) | (data1 << 8) | (command | channel)`.
    pub fn to_wire(&self) -> u32 {
        let (channel, command, data1, data2) = match *self {
            Message::NoteOn {
                channel,
                key,
                velocity,
            } => (channel, NOTE_ON, key, velocity),
            Message::NoteOff { channel, key } => (channel, NOTE_OFF, key, 0),
            Message::ControlChange {
                channel, id, value, ..
            } => (channel, CONTROL_CHANGE, id, value),
            Message::Raw {
                channel,
                command,
                data1,
                data2,
            } => (channel, command, data1, data2),
        };
        let status = (command | channel) as u32;
        ((data2 as u32) << 16) | ((data1 as u32) << 8) | status
    }

    /// The channel the message is addressed to.
    pub fn channel(&self) -> u8 {
        match *self {
            Message::NoteOn { channel, .. }
            | Message::NoteOff { channel, .. }
            | Message::ControlChange { channel, .. }
            | Message::Raw { channel, .. } => channel,
        }
    }
}

/// Looks up the General MIDI description of a control change ID.
pub fn control_change_name(id: u8) -> &'static str {
    CONTROL_CHANGE_NAMES
        .get(id as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// General MIDI names for the 128 ControlChange IDs.
static CONTROL_CHANGE_NAMES: [&str; 128] = [
    "Bank Select",
    "Modulation Wheel or Lever",
    "Breath Controller",
    "Undefined",
    "Foot Controller",
    "Portamento Time",
    "Data Entry MSB",
    "Channel Volume (formerly Main Volume)",
    "Balance",
    "Undefined",
    "Pan",
    "Expression Controller",
    "Effect Control 1",
    "Effect Control 2",
    "Undefined",
    "Undefined",
    "General Purpose Controller 1",
    "General Purpose Controller 2",
    "General Purpose Controller 3",
    "General Purpose Controller 4",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "LSB for Control 0 (Bank Select)",
    "LSB for Control 1 (Modulation Wheel or Lever)",
    "LSB for Control 2 (Breath Controller)",
    "LSB for Control 3 (Undefined)",
    "LSB for Control 4 (Foot Controller)",
    "LSB for Control 5 (Portamento Time)",
    "LSB for Control 6 (Data Entry)",
    "LSB for Control 7 (Channel Volume, formerly Main Volume)",
    "LSB for Control 8 (Balance)",
    "LSB for Control 9 (Undefined)",
    "LSB for Control 10 (Pan)",
    "LSB for Control 11 (Expression Controller)",
    "LSB for Control 12 (Effect control 1)",
    "LSB for Control 13 (Effect control 2)",
    "LSB for Control 14 (Undefined)",
    "LSB for Control 15 (Undefined)",
    "LSB for Control 16 (General Purpose Controller 1)",
    "LSB for Control 17 (General Purpose Controller 2)",
    "LSB for Control 18 (General Purpose Controller 3)",
    "LSB for Control 19 (General Purpose Controller 4)",
    "LSB for Control 20 (Undefined)",
    "LSB for Control 21 (Undefined)",
    "LSB for Control 22 (Undefined)",
    "LSB for Control 23 (Undefined)",
    "LSB for Control 24 (Undefined)",
    "LSB for Control 25 (Undefined)",
    "LSB for Control 26 (Undefined)",
    "LSB for Control 27 (Undefined)",
    "LSB for Control 28 (Undefined)",
    "LSB for Control 29 (Undefined)",
    "LSB for Control 30 (Undefined)",
    "LSB for Control 31 (Undefined)",
    "Damper Pedal on/off (Sustain)   ≤63 off, ≥64 on",
    "Portamento On/Off   ≤63 off, ≥64 on",
    "Sostenuto On/Off    ≤63 off, ≥64 on",
    "Soft Pedal On/Off   ≤63 off, ≥64 on",
    "Legato Footswitch   ≤63 Normal, ≥64 Legato",
    "Hold 2  ≤63 off, ≥64 on",
    "Sound Controller 1 (default: Sound Variation)",
    "Sound Controller 2 (default: Timbre/Harmonic Intens.)",
    "Sound Controller 3 (default: Release Time)",
    "Sound Controller 4 (default: Attack Time)",
    "Sound Controller 5 (default: Brightness)",
    "Sound Controller 6 (default: Decay Time)",
    "Sound Controller 7 (default: Vibrato Rate)",
    "Sound Controller 8 (default: Vibrato Depth)",
    "Sound Controller 9 (default: Vibrato Delay)",
    "Sound Controller 10 (default: undefined)",
    "General Purpose Controller 5",
    "General Purpose Controller 6",
    "General Purpose Controller 7",
    "General Purpose Controller 8",
    "Portamento Control",
    "Undefined",
    "Undefined",
    "Undefined",
    "High Resolution Velocity Prefix",
    "Undefined",
    "Undefined",
    "Effects 1 Depth",
    "Effects 2 Depth",
    "Effects 3 Depth",
    "Effects 4 Depth",
    "Effects 5 Depth",
    "Data Increment",
    "Data Decrement",
    "Non-Registered Parameter Number (NRPN) - LSB",
    "Non-Registered Parameter Number (NRPN) - MSB",
    "Registered Parameter Number (RPN) - LSB*",
    "Registered Parameter Number (RPN) - MSB*",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "Undefined",
    "[Channel Mode Message] All Sound Off",
    "[Channel Mode Message] Reset All Controllers",
    "[Channel Mode Message] Local Control On/Off 0 off, 127 on",
    "[Channel Mode Message] All Notes Off",
    "[Channel Mode Message] Omni Mode Off (+ all notes off)",
    "[Channel Mode Message] Omni Mode On (+ all notes off)",
    "[Channel Mode Message] Mono Mode On (+ poly off, + all notes off)",
    "[Channel Mode Message] Poly Mode On (+ mono off, +all notes off)",
];

/// Discovers every MIDI device known to the system backend.
pub fn list_devices() -> Result<SystemDevices, MidiError> {
    let backend = Arc::new(midir::SystemBackend::new()?);
    device::discover(backend)
}

/// Gets a device with the given name.
///
/// Names starting with `mock` yield a loopback device backed by the mock
/// backend rather than system hardware.
pub fn get_device(name: &str) -> Result<Arc<Device>, MidiError> {
    if name.starts_with("mock") {
        let mut backend = mock::Backend::new();
        backend.add_device(name);
        return device::discover(Arc::new(backend))?.get(name);
    }

    list_devices()?.get(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_round_trip_note_on() {
        let m = Message::NoteOn {
            channel: 0,
            key: 64,
            velocity: 127,
        };
        assert_eq!(m.to_wire(), 0x7F4090);
        assert_eq!(Message::from_wire(m.to_wire()), m);
    }

    #[test]
    fn wire_round_trip_note_off() {
        let m = Message::NoteOff { channel: 3, key: 36 };
        assert_eq!(m.to_wire(), 0x002483);
        assert_eq!(m.channel(), 3);
        assert_eq!(Message::from_wire(m.to_wire()), m);
    }

    #[test]
    fn wire_round_trip_control_change() {
        let m = Message::ControlChange {
            channel: 15,
            id: 10,
            value: 100,
            name: control_change_name(10),
        };
        assert_eq!(Message::from_wire(m.to_wire()), m);
    }

    #[test]
    fn note_on_with_zero_velocity_is_a_note_off() {
        let word = (60 << 8) | 0x90;
        assert_eq!(
            Message::from_wire(word),
            Message::NoteOff {
                channel: 0,
                key: 60
            }
        );
    }

    #[test]
    fn unrecognized_status_is_raw() {
        // 0xE0 is pitch bend, which the fabric carries as a raw message.
        let word = (0x40 << 16) | (0x02 << 8) | 0xE2;
        assert_eq!(
            Message::from_wire(word),
            Message::Raw {
                channel: 2,
                command: 0xE0,
                data1: 0x02,
                data2: 0x40,
            }
        );
    }

    #[test]
    fn mock_names_yield_a_mock_device() {
        let device = get_device("mock loopback").expect("get_device failed");
        assert_eq!(device.name(), "mock loopback");
        device.open().expect("open failed");
        device.close();
    }

    #[test]
    fn control_change_names_cover_the_table() {
        assert_eq!(control_change_name(0), "Bank Select");
        assert_eq!(control_change_name(10), "Pan");
        assert_eq!(
            control_change_name(123),
            "[Channel Mode Message] All Notes Off"
        );
        assert_eq!(control_change_name(3), "Undefined");
    }
}
