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

//! The midir-backed system MIDI backend.
//!
//! midir delivers events through a callback rather than a poll/read API, so
//! the input adapter parks parsed wire words in an unbounded queue the
//! [`InputStream`] contract drains.

use crossbeam_channel::{unbounded, Receiver, Sender};
use midir::{
    MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};

use crate::midi::backend::{Backend, InputStream, OutputStream, StreamDirection, StreamInfo};
use crate::midi::MidiError;

/// The system MIDI backend, enumerating midir's ports once at construction.
pub struct SystemBackend {
    inputs: Vec<(String, MidiInputPort)>,
    outputs: Vec<(String, MidiOutputPort)>,
}

impl SystemBackend {
    pub fn new() -> Result<SystemBackend, MidiError> {
        let input = MidiInput::new("patchbay input listing")
            .map_err(|e| MidiError::Backend(e.to_string()))?;
        let output = MidiOutput::new("patchbay output listing")
            .map_err(|e| MidiError::Backend(e.to_string()))?;

        let mut inputs = Vec::new();
        for port in input.ports() {
            let name = input
                .port_name(&port)
                .map_err(|e| MidiError::Backend(e.to_string()))?;
            inputs.push((name, port));
        }

        let mut outputs = Vec::new();
        for port in output.ports() {
            let name = output
                .port_name(&port)
                .map_err(|e| MidiError::Backend(e.to_string()))?;
            outputs.push((name, port));
        }

        Ok(SystemBackend { inputs, outputs })
    }
}

impl Backend for SystemBackend {
    fn streams(&self) -> Result<Vec<StreamInfo>, MidiError> {
        let mut streams = Vec::with_capacity(self.inputs.len() + self.outputs.len());
        for (id, (name, _)) in self.inputs.iter().enumerate() {
            streams.push(StreamInfo {
                id,
                name: name.clone(),
                direction: StreamDirection::Input,
                open: false,
            });
        }
        for (index, (name, _)) in self.outputs.iter().enumerate() {
            streams.push(StreamInfo {
                id: self.inputs.len() + index,
                name: name.clone(),
                direction: StreamDirection::Output,
                open: false,
            });
        }
        Ok(streams)
    }

    fn open_input(&self, id: usize) -> Result<Box<dyn InputStream>, MidiError> {
        let (_, port) = self
            .inputs
            .get(id)
            .ok_or_else(|| MidiError::Backend(format!("no input stream with id {}", id)))?;

        let input =
            MidiInput::new("patchbay input").map_err(|e| MidiError::Backend(e.to_string()))?;
        let (tx, rx): (Sender<u32>, Receiver<u32>) = unbounded();
        let connection = input
            .connect(
                port,
                "patchbay input watcher",
                move |_, raw_event, _| {
                    if let Some(word) = wire_word(raw_event) {
                        let _ = tx.send(word);
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Backend(e.to_string()))?;

        Ok(Box::new(SystemInputStream {
            connection: Some(connection),
            events: rx,
        }))
    }

    fn open_output(&self, id: usize) -> Result<Box<dyn OutputStream>, MidiError> {
        let index = id
            .checked_sub(self.inputs.len())
            .filter(|index| *index < self.outputs.len())
            .ok_or_else(|| MidiError::Backend(format!("no output stream with id {}", id)))?;
        let (_, port) = &self.outputs[index];

        let output =
            MidiOutput::new("patchbay output").map_err(|e| MidiError::Backend(e.to_string()))?;
        let connection = output
            .connect(port, "patchbay output writer")
            .map_err(|e| MidiError::Backend(e.to_string()))?;

        Ok(Box::new(SystemOutputStream {
            connection: Some(connection),
        }))
    }
}

/// Packs a raw midir event into the 32-bit wire word.
fn wire_word(raw: &[u8]) -> Option<u32> {
    let status = *raw.first()? as u32;
    let data1 = raw.get(1).copied().unwrap_or(0) as u32;
    let data2 = raw.get(2).copied().unwrap_or(0) as u32;
    Some((data2 << 16) | (data1 << 8) | status)
}

struct SystemInputStream {
    connection: Option<MidiInputConnection<()>>,
    events: Receiver<u32>,
}

impl InputStream for SystemInputStream {
    fn poll(&mut self) -> Result<bool, MidiError> {
        Ok(!self.events.is_empty())
    }

    fn read(&mut self) -> Result<Option<u32>, MidiError> {
        Ok(self.events.try_recv().ok())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

struct SystemOutputStream {
    connection: Option<MidiOutputConnection>,
}

impl OutputStream for SystemOutputStream {
    fn write(&mut self, word: u32) -> Result<(), MidiError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| MidiError::Backend("output stream is closed".to_string()))?;

        let status = (word & 0xFF) as u8;
        let data1 = ((word >> 8) & 0x7F) as u8;
        let data2 = ((word >> 16) & 0x7F) as u8;
        // Program change and channel pressure are 2-byte messages.
        let event: &[u8] = match status & 0xF0 {
            0xC0 | 0xD0 => &[status, data1],
            _ => &[status, data1, data2],
        };
        connection
            .send(event)
            .map_err(|e| MidiError::Backend(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_word_packs_three_bytes() {
        assert_eq!(wire_word(&[0x90, 64, 127]), Some(0x7F4090));
        assert_eq!(wire_word(&[0xC0, 5]), Some(0x0005C0));
        assert_eq!(wire_word(&[]), None);
    }
}
