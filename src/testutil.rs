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

use std::error::Error;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Writes a 16-bit PCM wave file from de-interleaved per-channel samples.
/// Every channel must hold the same number of samples.
pub fn write_wav(path: &Path, channels: &[Vec<i16>], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    for offset in 0..frames {
        for channel in channels {
            writer.write_sample(channel[offset])?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// A deterministic test signal: sample `i` is `i * step`.
pub fn ramp(frames: usize, step: i16) -> Vec<i16> {
    (0..frames).map(|i| (i as i16).wrapping_mul(step)).collect()
}
