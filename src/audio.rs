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

pub mod clip;
pub mod cpal;
pub mod mock;
pub mod ring;

/// Errors surfaced by the audio backend and the sampler lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("{op} requires a {expected} sampler, but the sampler is {actual}")]
    InvalidState {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
}

/// The realtime callback: fills `output` from the engine, optionally
/// consuming `input`. Runs on a host-owned thread, so it must stay
/// allocation-free and lock-light.
pub type Callback = Box<dyn FnMut(&[i16], &mut [i16]) + Send + 'static>;

/// A host audio backend capable of opening the default output stream.
pub trait Backend {
    /// Opens the default stream with the given channel counts, sample rate,
    /// and frames per buffer (0 lets the host choose), bound to the
    /// callback.
    fn open_default_stream(
        &self,
        input_channels: u16,
        output_channels: u16,
        sample_rate: u32,
        frames_per_buffer: u32,
        callback: Callback,
    ) -> Result<Box<dyn Stream>, AudioError>;

    /// The names of the host's output devices.
    fn output_devices(&self) -> Result<Vec<String>, AudioError>;
}

/// An open audio stream.
pub trait Stream {
    fn start(&mut self) -> Result<(), AudioError>;
    fn stop(&mut self) -> Result<(), AudioError>;
    fn close(&mut self) -> Result<(), AudioError>;
}

/// The system (cpal) audio backend.
pub fn default_backend() -> Arc<dyn Backend> {
    Arc::new(cpal::SystemBackend::new())
}
