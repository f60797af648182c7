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
mod audio;
mod config;
mod midi;
mod sampler;
#[cfg(test)]
mod testutil;

use std::error::Error;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::{info, warn};

use crate::audio::clip::Clip;
use crate::midi::Message;
use crate::sampler::Sampler;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A live audio and MIDI performance toolkit."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Prints every MIDI message a device emits.
    Monitor {
        /// The name of the MIDI device to watch.
        #[arg(short, long)]
        device: String,
    },
    /// Pipes MIDI data from one device into another.
    Pipe {
        /// The name of the device to read from.
        #[arg(short, long)]
        from: String,
        /// The name of the device to write to.
        #[arg(short, long)]
        to: String,
    },
    /// Plays a wave file once through the sampler.
    Play {
        /// The path to a 16-bit PCM wave file.
        #[arg(short, long)]
        file: String,
        /// Playback volume, in percent.
        #[arg(short, long, default_value_t = 100)]
        volume: u8,
        /// The expected sample rate of the file.
        #[arg(short, long, default_value_t = sampler::SAMPLE_RATE)]
        sample_rate: u32,
    },
    /// Runs a note-triggered sampler fed by a MIDI device.
    Sampler {
        /// The name of the MIDI device that triggers clips.
        #[arg(short, long)]
        device: String,
        /// The path to the JSON config mapping note numbers to wave files.
        #[arg(short, long)]
        config: String,
        /// Playback volume at full velocity, in percent.
        #[arg(short, long, default_value_t = 100)]
        volume: u8,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off,patchbay=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Devices {} => {
            for name in audio::default_backend().output_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;
            if devices.is_empty() {
                println!("No MIDI devices found.");
            }
            for device in devices.iter() {
                println!("{}", device);
            }
            Ok(())
        }
        Commands::Monitor { device } => monitor(&device),
        Commands::Pipe { from, to } => pipe(&from, &to),
        Commands::Play {
            file,
            volume,
            sample_rate,
        } => play(&file, volume, sample_rate),
        Commands::Sampler {
            device,
            config,
            volume,
        } => run_sampler(&device, &config, volume),
    }
}

/// Opens the named device and prints every message its output port emits.
fn monitor(name: &str) -> Result<(), Box<dyn Error>> {
    let device = midi::get_device(name)?;
    device.open()?;
    device.run();
    info!(device = device.name(), "Monitoring MIDI messages.");

    loop {
        let message = device.out_port().recv()?;
        println!("{:?}", message);
    }
}

/// Connects two devices with a pipe and forwards until interrupted.
fn pipe(from: &str, to: &str) -> Result<(), Box<dyn Error>> {
    let devices = midi::list_devices()?;
    let pipe = midi::connect::Pipe::new(devices.get(from)?, devices.get(to)?);
    pipe.open()?;
    pipe.connect();
    info!(
        from = pipe.from_device().name(),
        to = pipe.to_device().name(),
        "Piping MIDI data."
    );

    loop {
        thread::park();
    }
}

/// Loads a clip and plays it once through the sampler.
fn play(file: &str, volume: u8, sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let clip = Clip::from_wave(file)?;
    if clip.sample_rate() != sample_rate {
        warn!(
            file,
            file_rate = clip.sample_rate(),
            playback_rate = sample_rate,
            "Sample rates differ; playback pitch will be off."
        );
    }

    let duration = clip.duration();
    let mut sampler = Sampler::new(clip.channel_count().max(1));
    sampler.add_clip(clip, 60)?;
    sampler.run()?;

    info!(file, duration = ?duration, "Playing clip.");
    sampler.play(60, volume as f32 / 100.0)?;
    thread::sleep(duration + Duration::from_millis(100));

    sampler.stop()?;
    sampler.close()?;
    Ok(())
}

/// The live path: note-ons from the device trigger the loaded sampler,
/// scaled by velocity.
fn run_sampler(device_name: &str, config_path: &str, volume: u8) -> Result<(), Box<dyn Error>> {
    let device = midi::get_device(device_name)?;
    device.open()?;
    device.run();

    let mut sampler = Sampler::new_loaded(config_path)?;
    sampler.run()?;
    info!(
        device = device.name(),
        clips = sampler.clip_count(),
        "Sampler ready."
    );

    let scale = volume as f32 / 100.0;
    loop {
        match device.out_port().recv()? {
            Message::NoteOn { key, velocity, .. } => {
                sampler.play(key, scale * velocity as f32 / 127.0)?;
            }
            _ => {}
        }
    }
}
