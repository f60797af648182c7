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

//! A mock audio backend. Doesn't actually play anything.
//!
//! The "host" callback is driven by hand through [`Backend::pump`], so tests
//! can drain a sampler's ring buffer deterministically.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::{AudioError, Callback, Stream};

struct StreamState {
    callback: Callback,
    started: bool,
    output_channels: u16,
    sample_rate: u32,
}

/// A mock audio backend holding at most one open stream.
#[derive(Clone, Default)]
pub struct Backend {
    state: Arc<Mutex<Option<StreamState>>>,
}

impl Backend {
    pub fn new() -> Backend {
        Backend::default()
    }

    /// True while a stream is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    /// True while the open stream is started.
    pub fn is_started(&self) -> bool {
        self.state.lock().as_ref().map(|s| s.started).unwrap_or(false)
    }

    /// The channel count and sample rate of the open stream.
    pub fn stream_format(&self) -> Option<(u16, u32)> {
        self.state
            .lock()
            .as_ref()
            .map(|s| (s.output_channels, s.sample_rate))
    }

    /// Plays the part of the host: invokes the stream callback to fill
    /// `out`. Returns false if no started stream exists.
    pub fn pump(&self, out: &mut [i16]) -> bool {
        let mut state = self.state.lock();
        match state.as_mut() {
            Some(stream) if stream.started => {
                (stream.callback)(&[], out);
                true
            }
            _ => false,
        }
    }
}

impl crate::audio::Backend for Backend {
    fn open_default_stream(
        &self,
        _input_channels: u16,
        output_channels: u16,
        sample_rate: u32,
        _frames_per_buffer: u32,
        callback: Callback,
    ) -> Result<Box<dyn Stream>, AudioError> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Err(AudioError::Backend(
                "mock backend already has an open stream".to_string(),
            ));
        }
        *state = Some(StreamState {
            callback,
            started: false,
            output_channels,
            sample_rate,
        });
        Ok(Box::new(MockStream {
            state: self.state.clone(),
        }))
    }

    fn output_devices(&self) -> Result<Vec<String>, AudioError> {
        Ok(vec![String::from("mock")])
    }
}

struct MockStream {
    state: Arc<Mutex<Option<StreamState>>>,
}

impl Stream for MockStream {
    fn start(&mut self) -> Result<(), AudioError> {
        match self.state.lock().as_mut() {
            Some(stream) => {
                stream.started = true;
                Ok(())
            }
            None => Err(AudioError::Backend("stream is closed".to_string())),
        }
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        match self.state.lock().as_mut() {
            Some(stream) => {
                stream.started = false;
                Ok(())
            }
            None => Err(AudioError::Backend("stream is closed".to_string())),
        }
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.state.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::Backend as _;

    #[test]
    fn pump_drives_the_callback() {
        let backend = Backend::new();
        let mut stream = backend
            .open_default_stream(
                0,
                2,
                44100,
                0,
                Box::new(|_, out| {
                    for (i, slot) in out.iter_mut().enumerate() {
                        *slot = i as i16;
                    }
                }),
            )
            .expect("open failed");

        let mut out = [0i16; 4];
        // Not started yet: the pump does nothing.
        assert!(!backend.pump(&mut out));

        stream.start().expect("start failed");
        assert!(backend.pump(&mut out));
        assert_eq!(out, [0, 1, 2, 3]);

        stream.close().expect("close failed");
        assert!(!backend.is_open());
    }
}
