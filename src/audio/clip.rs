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
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

/// Sanity threshold on wave file reads.
const MAX_WAVE_BYTES: u64 = 100 * 1024 * 1024;

/// Errors from clip operations and wave I/O.
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("clips have varying numbers of channels: {0}, {1}")]
    ChannelMismatch(usize, usize),

    #[error("{0}: only 16-bit integer PCM wave files are supported")]
    UnsupportedFormat(String),

    #[error("{0}: wave file exceeds the 100 MB read limit")]
    FileTooLarge(String),

    #[error("wave error: {0}")]
    Wave(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why two clips are not equal, and where they first diverge.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClipMismatch {
    #[error("clips have varying numbers of channels: {left}, {right}")]
    ChannelCount { left: usize, right: usize },

    #[error("clips have varying numbers of samples ({left} and {right}) for channel {channel}")]
    ChannelLength {
        channel: usize,
        left: usize,
        right: usize,
    },

    #[error(
        "clips have varying sample values ({left} and {right}) at offset {offset} on channel {channel}"
    )]
    Sample {
        channel: usize,
        offset: usize,
        left: i16,
        right: i16,
    },
}

/// In-memory de-interleaved multi-channel 16-bit PCM audio.
///
/// The outer vector is one entry per channel; every channel holds the same
/// number of samples.
#[derive(Debug, Clone)]
pub struct Clip {
    channels: Vec<Vec<i16>>,
    name: String,
    sample_rate: u32,
}

impl Clip {
    /// Creates an empty clip with the given number of channels.
    pub fn new(num_channels: usize) -> Clip {
        Clip {
            channels: vec![Vec::new(); num_channels],
            name: String::new(),
            sample_rate: 0,
        }
    }

    /// Builds a clip from raw per-channel samples.
    pub fn from_samples(channels: Vec<Vec<i16>>, sample_rate: u32) -> Clip {
        Clip {
            channels,
            name: String::new(),
            sample_rate,
        }
    }

    /// Loads a 16-bit PCM wave file, de-interleaving its frames into
    /// per-channel sample vectors.
    pub fn from_wave<P: AsRef<Path>>(path: P) -> Result<Clip, ClipError> {
        let path = path.as_ref();
        let display_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unreadable file name")
            .to_string();

        if std::fs::metadata(path)?.len() > MAX_WAVE_BYTES {
            return Err(ClipError::FileTooLarge(display_name));
        }

        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(ClipError::UnsupportedFormat(display_name));
        }

        let num_channels = spec.channels as usize;
        let mut channels: Vec<Vec<i16>> = vec![Vec::new(); num_channels];
        for (i, sample) in reader.samples::<i16>().enumerate() {
            channels[i % num_channels].push(sample?);
        }

        let clip = Clip {
            channels,
            name: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            sample_rate: spec.sample_rate,
        };
        debug!(
            file = display_name,
            channels = clip.channel_count(),
            frames = clip.frames_per_channel(),
            "Loaded clip."
        );
        Ok(clip)
    }

    /// Re-interleaves the clip and writes it as a 16-bit PCM wave file.
    pub fn save_wave<P: AsRef<Path>>(&self, path: P) -> Result<(), ClipError> {
        let spec = WavSpec {
            channels: self.channels.len() as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for offset in 0..self.frames_per_channel() {
            for channel in &self.channels {
                writer.write_sample(channel[offset])?;
            }
        }
        writer.finalize()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The per-channel samples, de-interleaved.
    pub fn samples(&self) -> &[Vec<i16>] {
        &self.channels
    }

    /// The number of samples in each channel.
    pub fn frames_per_channel(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// The clip's playback duration.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.frames_per_channel() as u64 * 1000 / self.sample_rate as u64)
    }

    /// Compares individual samples across all channels of two clips,
    /// reporting the first point of divergence.
    pub fn compare(&self, other: &Clip) -> Result<(), ClipMismatch> {
        if self.channels.len() != other.channels.len() {
            return Err(ClipMismatch::ChannelCount {
                left: self.channels.len(),
                right: other.channels.len(),
            });
        }
        for (channel, (left, right)) in self.channels.iter().zip(&other.channels).enumerate() {
            if left.len() != right.len() {
                return Err(ClipMismatch::ChannelLength {
                    channel,
                    left: left.len(),
                    right: right.len(),
                });
            }
            for (offset, (a, b)) in left.iter().zip(right).enumerate() {
                if a != b {
                    return Err(ClipMismatch::Sample {
                        channel,
                        offset,
                        left: *a,
                        right: *b,
                    });
                }
            }
        }
        Ok(())
    }

    /// Appends another clip's audio data to this clip, increasing its
    /// length.
    pub fn append(&mut self, other: &Clip) -> Result<(), ClipError> {
        if self.channels.len() != other.channels.len() {
            return Err(ClipError::ChannelMismatch(
                self.channels.len(),
                other.channels.len(),
            ));
        }
        for (channel, source) in self.channels.iter_mut().zip(&other.channels) {
            channel.extend_from_slice(source);
        }
        Ok(())
    }

    /// Mixes another clip into this one channel-wise, saturating at the
    /// 16-bit bounds. This clip is zero-extended if the other is longer.
    pub fn mix(&mut self, other: &Clip) -> Result<(), ClipError> {
        if self.channels.len() != other.channels.len() {
            return Err(ClipError::ChannelMismatch(
                self.channels.len(),
                other.channels.len(),
            ));
        }
        for (channel, source) in self.channels.iter_mut().zip(&other.channels) {
            if source.len() > channel.len() {
                channel.resize(source.len(), 0);
            }
            for (sample, mixed) in channel.iter_mut().zip(source) {
                *sample = sample.saturating_add(*mixed);
            }
        }
        Ok(())
    }

    /// Returns the frames in `[start, end)` as a new clip. The end index is
    /// clamped to the clip's length.
    pub fn slice(&self, start: usize, end: usize) -> Clip {
        let end = end.min(self.frames_per_channel());
        let start = start.min(end);
        Clip {
            channels: self
                .channels
                .iter()
                .map(|channel| channel[start..end].to_vec())
                .collect(),
            name: self.name.clone(),
            sample_rate: self.sample_rate,
        }
    }

    /// Splits the clip into `divisions` equal-length clips. The division is
    /// an integer floor; any remainder frames are discarded.
    pub fn split(&self, divisions: usize) -> Vec<Clip> {
        if divisions == 0 {
            return Vec::new();
        }
        let step = self.frames_per_channel() / divisions;
        (0..divisions)
            .map(|i| self.slice(step * i, step * (i + 1)))
            .collect()
    }

    /// Reverses each channel in place.
    pub fn reverse(&mut self) {
        for channel in &mut self.channels {
            channel.reverse();
        }
    }

    /// Doubles the clip's length by interleaving a zero after every
    /// original sample, lowering the pitch one octave.
    pub fn stretch(&mut self) {
        for channel in &mut self.channels {
            let mut stretched = vec![0; channel.len() * 2];
            for (i, sample) in channel.iter().enumerate() {
                stretched[i * 2] = *sample;
            }
            *channel = stretched;
        }
    }
}
