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

//! The polyphonic mixing sampler.
//!
//! Clips are registered against MIDI note numbers; `play` mixes a clip into
//! the shared ring buffer starting at the current cursor, and the audio
//! callback drains the ring into the host stream, zeroing as it goes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::clip::Clip;
use crate::audio::ring::RingBuffer;
use crate::audio::{self, AudioError, Backend, Callback, Stream};
use crate::config::{self, ConfigError};

/// Sample rate of the sampler's output stream.
pub const SAMPLE_RATE: u32 = 44100;

/// The sampler lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Built,
    Loaded,
    Running,
    Stopped,
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Built => "built",
            State::Loaded => "loaded",
            State::Running => "running",
            State::Stopped => "stopped",
            State::Closed => "closed",
        }
    }
}

/// Maps MIDI note numbers to clips and mixes triggered clips into a ring
/// buffer drained by the host audio callback.
///
/// The ring is always at least as long as the longest registered clip, so a
/// play never wraps past active data before the callback consumes it.
pub struct Sampler {
    clips: HashMap<u8, Clip>,
    ring: Arc<Mutex<RingBuffer>>,
    stream: Option<Box<dyn Stream>>,
    backend: Arc<dyn Backend>,
    state: State,
}

impl Sampler {
    /// Creates an empty sampler mixing the given number of channels through
    /// the system audio backend.
    pub fn new(num_channels: usize) -> Sampler {
        Sampler::with_backend(num_channels, audio::default_backend())
    }

    /// Creates an empty sampler bound to the given audio backend.
    pub fn with_backend(num_channels: usize, backend: Arc<dyn Backend>) -> Sampler {
        Sampler {
            clips: HashMap::new(),
            ring: Arc::new(Mutex::new(RingBuffer::new(0, num_channels))),
            stream: None,
            backend,
            state: State::Built,
        }
    }

    /// Creates a stereo sampler loaded from a JSON config of note number /
    /// wave file entries.
    pub fn new_loaded<P: AsRef<Path>>(config_path: P) -> Result<Sampler, ConfigError> {
        Sampler::new_loaded_with_backend(config_path, audio::default_backend())
    }

    /// Like [`Sampler::new_loaded`], but bound to the given audio backend.
    pub fn new_loaded_with_backend<P: AsRef<Path>>(
        config_path: P,
        backend: Arc<dyn Backend>,
    ) -> Result<Sampler, ConfigError> {
        let mut sampler = Sampler::with_backend(2, backend);
        let entries = config::load_sampler_config(&config_path)?;
        info!(
            config = %config_path.as_ref().display(),
            entries = entries.len(),
            "Loading sampler clips."
        );
        for entry in entries {
            let clip = Clip::from_wave(&entry.file_name)?;
            sampler.insert_clip(clip, entry.note_num);
        }
        sampler.state = State::Loaded;
        Ok(sampler)
    }

    /// Registers a clip under a note number, growing the ring buffer to
    /// hold it. A clip already registered under the note is replaced.
    pub fn add_clip(&mut self, clip: Clip, note_num: u8) -> Result<(), AudioError> {
        match self.state {
            State::Built | State::Loaded => {
                self.insert_clip(clip, note_num);
                self.state = State::Loaded;
                Ok(())
            }
            _ => Err(self.state_error("add_clip", "built or loaded")),
        }
    }

    fn insert_clip(&mut self, clip: Clip, note_num: u8) {
        self.ring.lock().increase_len(clip.frames_per_channel());
        self.clips.insert(note_num, clip);
    }

    /// Opens the default output stream bound to the ring-draining callback
    /// and starts it.
    pub fn run(&mut self) -> Result<(), AudioError> {
        if self.state != State::Loaded {
            return Err(self.state_error("run", "loaded"));
        }

        let ring = self.ring.clone();
        let channels = ring.lock().channels() as u16;
        let callback: Callback = Box::new(move |_input, output| {
            let mut ring = ring.lock();
            for slot in output.iter_mut() {
                *slot = ring.pop();
            }
        });

        let mut stream = self
            .backend
            .open_default_stream(0, channels, SAMPLE_RATE, 0, callback)?;
        stream.start()?;
        self.stream = Some(stream);
        self.state = State::Running;
        info!(clips = self.clips.len(), "Sampler running.");
        Ok(())
    }

    /// Stops the output stream.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if self.state != State::Running {
            return Err(self.state_error("stop", "running"));
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.stop()?;
        }
        self.state = State::Stopped;
        Ok(())
    }

    /// Terminates the sampler's audio stream.
    pub fn close(&mut self) -> Result<(), AudioError> {
        if self.state != State::Running && self.state != State::Stopped {
            return Err(self.state_error("close", "running or stopped"));
        }
        if let Some(mut stream) = self.stream.take() {
            stream.close()?;
        }
        self.state = State::Closed;
        Ok(())
    }

    /// Mixes the clip registered under the note into the ring, scaled by
    /// `volume` and saturating at the 16-bit bounds, starting at the
    /// current cursor. The cursor itself only advances in the callback. An
    /// unregistered note is ignored.
    pub fn play(&self, note_num: u8, volume: f32) -> Result<(), AudioError> {
        if self.state != State::Running {
            return Err(self.state_error("play", "running"));
        }
        let clip = match self.clips.get(&note_num) {
            Some(clip) => clip,
            None => {
                debug!(note = note_num, "No clip registered for note.");
                return Ok(());
            }
        };

        let mut ring = self.ring.lock();
        let mut i = ring.index();
        for frame in 0..clip.frames_per_channel() {
            for channel in clip.samples() {
                ring.add_at(i, (channel[frame] as f32 * volume) as i16);
                i += 1;
                if i >= ring.len() {
                    i = 0;
                }
            }
        }
        Ok(())
    }

    /// The host-callback body: copies each slot under the cursor into the
    /// output, zeroing it behind the read.
    pub fn process_audio(&self, _input: &[i16], output: &mut [i16]) {
        let mut ring = self.ring.lock();
        for slot in output.iter_mut() {
            *slot = ring.pop();
        }
    }

    /// The number of registered clips.
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    fn state_error(&self, op: &'static str, expected: &'static str) -> AudioError {
        AudioError::InvalidState {
            op,
            expected,
            actual: self.state.name(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::mock;
    use crate::testutil;

    /// Interleaves a clip's channels the way the ring stores them.
    fn interleaved(clip: &Clip) -> Vec<i16> {
        let mut samples = Vec::with_capacity(clip.frames_per_channel() * clip.channel_count());
        for frame in 0..clip.frames_per_channel() {
            for channel in clip.samples() {
                samples.push(channel[frame]);
            }
        }
        samples
    }

    fn stereo_clip(frames: usize, step: i16) -> Clip {
        Clip::from_samples(
            vec![testutil::ramp(frames, step), testutil::ramp(frames, -step)],
            SAMPLE_RATE,
        )
    }

    fn running_sampler(clips: Vec<(u8, Clip)>) -> (Sampler, mock::Backend) {
        let backend = mock::Backend::new();
        let mut sampler = Sampler::with_backend(2, Arc::new(backend.clone()));
        for (note, clip) in clips {
            sampler.add_clip(clip, note).expect("add_clip failed");
        }
        sampler.run().expect("run failed");
        (sampler, backend)
    }

    #[test]
    fn playback_drains_the_clip_then_silence() {
        let clip = stereo_clip(64, 3);
        let expected = interleaved(&clip);
        let (sampler, backend) = running_sampler(vec![(60, clip)]);
        assert!(backend.is_started());
        assert_eq!(backend.stream_format(), Some((2, SAMPLE_RATE)));

        sampler.play(60, 1.0).expect("play failed");
        let mut out = vec![0i16; expected.len()];
        assert!(backend.pump(&mut out));
        assert_eq!(out, expected);

        // The ring was zeroed behind the read. Drain again through the
        // callback body directly.
        sampler.process_audio(&[], &mut out);
        assert!(out.iter().all(|sample| *sample == 0));
    }

    #[test]
    fn playback_scales_by_volume_with_saturation() {
        let clips: Vec<(u8, Clip)> = [36, 38, 40, 42]
            .into_iter()
            .map(|note| (note, stereo_clip(512, note as i16)))
            .collect();
        let target = interleaved(&clips[2].1);
        let (sampler, backend) = running_sampler(clips);

        sampler.play(40, 0.5).expect("play failed");
        let mut out = vec![0i16; 512];
        assert!(backend.pump(&mut out));
        let expected: Vec<i16> = target[0..512]
            .iter()
            .map(|sample| (*sample as f32 * 0.5) as i16)
            .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn overlapping_plays_mix_additively() {
        let clip = Clip::from_samples(vec![vec![1000; 8], vec![-1000; 8]], SAMPLE_RATE);
        let (sampler, backend) = running_sampler(vec![(60, clip)]);

        sampler.play(60, 1.0).expect("play failed");
        sampler.play(60, 1.0).expect("play failed");

        let mut out = vec![0i16; 16];
        assert!(backend.pump(&mut out));
        assert!(out
            .iter()
            .enumerate()
            .all(|(i, sample)| *sample == if i % 2 == 0 { 2000 } else { -2000 }));
    }

    #[test]
    fn unknown_note_is_ignored() {
        let (sampler, backend) = running_sampler(vec![(60, stereo_clip(16, 1))]);
        sampler.play(99, 1.0).expect("play failed");

        let mut out = vec![0i16; 32];
        assert!(backend.pump(&mut out));
        assert!(out.iter().all(|sample| *sample == 0));
    }

    #[test]
    fn lifecycle_is_enforced() {
        let backend = mock::Backend::new();
        let mut sampler = Sampler::with_backend(2, Arc::new(backend.clone()));

        // Built: neither run nor play is allowed.
        assert!(matches!(sampler.run(), Err(AudioError::InvalidState { .. })));
        assert!(matches!(
            sampler.play(60, 1.0),
            Err(AudioError::InvalidState { .. })
        ));
        assert!(matches!(sampler.close(), Err(AudioError::InvalidState { .. })));

        sampler.add_clip(stereo_clip(8, 1), 60).expect("add_clip failed");
        sampler.run().expect("run failed");

        // Running: loading more clips is no longer allowed.
        assert!(matches!(
            sampler.add_clip(stereo_clip(8, 1), 61),
            Err(AudioError::InvalidState { .. })
        ));

        sampler.stop().expect("stop failed");
        assert!(!backend.is_started());
        assert!(matches!(
            sampler.play(60, 1.0),
            Err(AudioError::InvalidState { .. })
        ));

        sampler.close().expect("close failed");
        assert!(!backend.is_open());
        assert!(matches!(sampler.stop(), Err(AudioError::InvalidState { .. })));
    }

    #[test]
    fn ring_grows_to_the_longest_clip() {
        let backend = mock::Backend::new();
        let mut sampler = Sampler::with_backend(2, Arc::new(backend));
        sampler.add_clip(stereo_clip(16, 1), 60).expect("add_clip failed");
        sampler.add_clip(stereo_clip(64, 1), 61).expect("add_clip failed");
        sampler.add_clip(stereo_clip(32, 1), 62).expect("add_clip failed");

        assert_eq!(sampler.ring.lock().len(), 64 * 2);
    }

    #[test]
    fn new_loaded_reads_the_config() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let kick = dir.path().join("kick.wav");
        let snare = dir.path().join("snare.wav");
        testutil::write_wav(&kick, &[testutil::ramp(32, 1), testutil::ramp(32, 2)], 44100)
            .expect("write failed");
        testutil::write_wav(&snare, &[testutil::ramp(16, 3), testutil::ramp(16, 4)], 44100)
            .expect("write failed");

        let config_path = dir.path().join("sampler.json");
        std::fs::write(
            &config_path,
            format!(
                r#"[
                    {{"NoteNum": 36, "FileName": "{}"}},
                    {{"NoteNum": 38, "FileName": "{}"}},
                    {{"NoteNum": 36, "FileName": "{}"}}
                ]"#,
                kick.display(),
                snare.display(),
                snare.display(),
            ),
        )
        .expect("write config failed");

        let backend = mock::Backend::new();
        let sampler = Sampler::new_loaded_with_backend(&config_path, Arc::new(backend))
            .expect("new_loaded failed");
        // The duplicate note number overwrote the first entry.
        assert_eq!(sampler.clip_count(), 2);
        assert_eq!(sampler.clips[&36].frames_per_channel(), 16);
    }
}
