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
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::error;

use crate::audio::{AudioError, Backend, Callback, Stream};

/// The cpal-backed system audio backend.
pub struct SystemBackend {
    host: cpal::Host,
}

impl SystemBackend {
    pub fn new() -> SystemBackend {
        SystemBackend {
            host: cpal::default_host(),
        }
    }
}

impl Default for SystemBackend {
    fn default() -> Self {
        SystemBackend::new()
    }
}

impl Backend for SystemBackend {
    fn open_default_stream(
        &self,
        _input_channels: u16,
        output_channels: u16,
        sample_rate: u32,
        frames_per_buffer: u32,
        mut callback: Callback,
    ) -> Result<Box<dyn Stream>, AudioError> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::Backend("no default output device".to_string()))?;

        let config = cpal::StreamConfig {
            channels: output_channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: if frames_per_buffer == 0 {
                cpal::BufferSize::Default
            } else {
                cpal::BufferSize::Fixed(frames_per_buffer)
            },
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| callback(&[], data),
                move |err| error!(err = %err, "Audio stream error."),
                None,
            )
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(Box::new(SystemStream {
            stream: Some(stream),
        }))
    }

    fn output_devices(&self) -> Result<Vec<String>, AudioError> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        Ok(devices
            .map(|device| {
                device
                    .name()
                    .unwrap_or_else(|_| String::from("unreadable device name"))
            })
            .collect())
    }
}

struct SystemStream {
    stream: Option<cpal::Stream>,
}

impl SystemStream {
    fn stream(&self) -> Result<&cpal::Stream, AudioError> {
        self.stream
            .as_ref()
            .ok_or_else(|| AudioError::Backend("stream is closed".to_string()))
    }
}

impl Stream for SystemStream {
    fn start(&mut self) -> Result<(), AudioError> {
        self.stream()?
            .play()
            .map_err(|e| AudioError::Backend(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream()?
            .pause()
            .map_err(|e| AudioError::Backend(e.to_string()))
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.stream.take();
        Ok(())
    }
}
