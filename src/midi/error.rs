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

/// Errors surfaced by port lifecycle and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("port is not open")]
    NotOpen,

    #[error("port channel is closed")]
    Closed,

    #[error("port was disconnected")]
    Disconnected,

    #[error("timed out waiting for a message")]
    Timeout,

    #[error("MIDI backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by device discovery and the MIDI backend.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("no device found with name {0}")]
    UnknownDevice(String),

    #[error("found too many devices that match ({0}), use a less ambiguous device name")]
    AmbiguousDevice(String),
}
