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

use serde::Deserialize;

use crate::audio::clip::ClipError;

/// Typed error for config load failures so callers can distinguish
/// file-not-found from parse errors from clip-load errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Clip(#[from] ClipError),
}

/// One sampler config entry: a MIDI note number and the wave file it
/// triggers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SamplerEntry {
    pub note_num: u8,
    pub file_name: String,
}

/// Loads a sampler config: a JSON array of note number / file name entries.
/// Entry order is insignificant.
pub fn load_sampler_config<P: AsRef<Path>>(path: P) -> Result<Vec<SamplerEntry>, ConfigError> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
