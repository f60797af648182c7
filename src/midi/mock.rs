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

//! A mock MIDI backend. Doesn't talk to any hardware.
//!
//! Every added device gets a readable stream fed by [`DeviceHandle::push_event`]
//! and a writable stream whose traffic the handle collects, so the full
//! port/device/connector fabric can be exercised without a MIDI interface.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::midi::backend::{Backend as MidiBackend, InputStream, OutputStream, StreamDirection, StreamInfo};
use crate::midi::MidiError;

type EventQueue = Arc<Mutex<VecDeque<u32>>>;

/// Fault switches shared between a device handle and its streams, used to
/// exercise the port run loops' failure paths.
#[derive(Clone, Default)]
struct Faults {
    poll: Arc<AtomicBool>,
    read: Arc<AtomicBool>,
    write: Arc<AtomicBool>,
}

struct StreamDef {
    name: String,
    direction: StreamDirection,
    queue: EventQueue,
    open: Arc<AtomicBool>,
    faults: Faults,
}

/// A mock MIDI backend whose streams are in-memory event queues.
#[derive(Default)]
pub struct Backend {
    streams: Vec<StreamDef>,
}

/// A test-side handle to one mock device's event queues.
#[derive(Clone)]
pub struct DeviceHandle {
    /// Events "sent by the hardware", read by the device's output port.
    incoming: EventQueue,
    /// Events "received by the hardware", written by the device's input port.
    outgoing: EventQueue,
    faults: Faults,
}

impl Backend {
    pub fn new() -> Backend {
        Backend::default()
    }

    /// Adds a device with both an input and an output stream and returns
    /// the handle for driving it.
    pub fn add_device(&mut self, name: &str) -> DeviceHandle {
        let incoming: EventQueue = Arc::new(Mutex::new(VecDeque::new()));
        let outgoing: EventQueue = Arc::new(Mutex::new(VecDeque::new()));
        let faults = Faults::default();

        self.streams.push(StreamDef {
            name: name.to_string(),
            direction: StreamDirection::Input,
            queue: incoming.clone(),
            open: Arc::new(AtomicBool::new(false)),
            faults: faults.clone(),
        });
        self.streams.push(StreamDef {
            name: name.to_string(),
            direction: StreamDirection::Output,
            queue: outgoing.clone(),
            open: Arc::new(AtomicBool::new(false)),
            faults: faults.clone(),
        });

        DeviceHandle {
            incoming,
            outgoing,
            faults,
        }
    }

    /// Adds a device the host only knows one side of.
    pub fn add_one_sided_device(&mut self, name: &str, direction: StreamDirection) -> DeviceHandle {
        let queue: EventQueue = Arc::new(Mutex::new(VecDeque::new()));
        let faults = Faults::default();
        self.streams.push(StreamDef {
            name: name.to_string(),
            direction,
            queue: queue.clone(),
            open: Arc::new(AtomicBool::new(false)),
            faults: faults.clone(),
        });
        DeviceHandle {
            incoming: queue.clone(),
            outgoing: queue,
            faults,
        }
    }
}

impl DeviceHandle {
    /// Simulates the hardware sending an event.
    pub fn push_event(&self, word: u32) {
        self.incoming.lock().push_back(word);
    }

    /// Drains and returns every event written to the hardware so far.
    pub fn written(&self) -> Vec<u32> {
        self.outgoing.lock().drain(..).collect()
    }

    /// Makes every subsequent poll fail.
    pub fn fail_polls(&self) {
        self.faults.poll.store(true, Ordering::Relaxed);
    }

    /// Makes every subsequent read fail. Polls keep reporting data
    /// available so a reader actually reaches the failing read.
    pub fn fail_reads(&self) {
        self.faults.read.store(true, Ordering::Relaxed);
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        self.faults.write.store(true, Ordering::Relaxed);
    }

    /// Polls until at least `count` events have been written to the
    /// hardware, returning whatever arrived by the deadline.
    pub fn wait_for_written(&self, count: usize, timeout: Duration) -> Vec<u32> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.outgoing.lock().len() >= count || Instant::now() >= deadline {
                return self.written();
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl MidiBackend for Backend {
    fn streams(&self) -> Result<Vec<StreamInfo>, MidiError> {
        Ok(self
            .streams
            .iter()
            .enumerate()
            .map(|(id, stream)| StreamInfo {
                id,
                name: stream.name.clone(),
                direction: stream.direction,
                open: stream.open.load(Ordering::Relaxed),
            })
            .collect())
    }

    fn open_input(&self, id: usize) -> Result<Box<dyn InputStream>, MidiError> {
        let stream = self.stream(id, StreamDirection::Input)?;
        stream.open.store(true, Ordering::Relaxed);
        Ok(Box::new(MockInputStream {
            queue: stream.queue.clone(),
            open: stream.open.clone(),
            faults: stream.faults.clone(),
        }))
    }

    fn open_output(&self, id: usize) -> Result<Box<dyn OutputStream>, MidiError> {
        let stream = self.stream(id, StreamDirection::Output)?;
        stream.open.store(true, Ordering::Relaxed);
        Ok(Box::new(MockOutputStream {
            queue: stream.queue.clone(),
            open: stream.open.clone(),
            faults: stream.faults.clone(),
        }))
    }
}

impl Backend {
    fn stream(&self, id: usize, direction: StreamDirection) -> Result<&StreamDef, MidiError> {
        let stream = self
            .streams
            .get(id)
            .ok_or_else(|| MidiError::Backend(format!("no stream with id {}", id)))?;
        if stream.direction != direction {
            return Err(MidiError::Backend(format!(
                "stream {} is not an {:?} stream",
                id, direction
            )));
        }
        Ok(stream)
    }
}

struct MockInputStream {
    queue: EventQueue,
    open: Arc<AtomicBool>,
    faults: Faults,
}

impl InputStream for MockInputStream {
    fn poll(&mut self) -> Result<bool, MidiError> {
        if self.faults.poll.load(Ordering::Relaxed) {
            return Err(MidiError::Backend(String::from("injected poll failure")));
        }
        // A pending read fault claims data so the reader reaches it.
        Ok(!self.queue.lock().is_empty() || self.faults.read.load(Ordering::Relaxed))
    }

    fn read(&mut self) -> Result<Option<u32>, MidiError> {
        if self.faults.read.load(Ordering::Relaxed) {
            return Err(MidiError::Backend(String::from("injected read failure")));
        }
        Ok(self.queue.lock().pop_front())
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

struct MockOutputStream {
    queue: EventQueue,
    open: Arc<AtomicBool>,
    faults: Faults,
}

impl OutputStream for MockOutputStream {
    fn write(&mut self, word: u32) -> Result<(), MidiError> {
        if self.faults.write.load(Ordering::Relaxed) {
            return Err(MidiError::Backend(String::from("injected write failure")));
        }
        self.queue.lock().push_back(word);
        Ok(())
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn streams_pair_up_per_device() {
        let mut backend = Backend::new();
        backend.add_device("mock");
        let streams = backend.streams().expect("streams failed");
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].direction, StreamDirection::Input);
        assert_eq!(streams[1].direction, StreamDirection::Output);
    }

    #[test]
    fn events_flow_through_the_queues() {
        let mut backend = Backend::new();
        let handle = backend.add_device("mock");

        handle.push_event(42);
        let mut input = backend.open_input(0).expect("open input failed");
        assert!(input.poll().expect("poll failed"));
        assert_eq!(input.read().expect("read failed"), Some(42));
        assert!(!input.poll().expect("poll failed"));

        let mut output = backend.open_output(1).expect("open output failed");
        output.write(7).expect("write failed");
        assert_eq!(handle.written(), vec![7]);
    }

    #[test]
    fn direction_mismatch_is_an_error() {
        let mut backend = Backend::new();
        backend.add_device("mock");
        assert!(backend.open_input(1).is_err());
        assert!(backend.open_output(0).is_err());
    }
}
