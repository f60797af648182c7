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

//! Devices pair an input port with an output port and a run loop.
//!
//! A device is initialized by opening its ports and run by running its
//! ports. System devices front real hardware (or OS-provided software
//! buses); thru devices and transposers are logical devices used to route
//! and rewrite MIDI data inside the fabric.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::midi::backend::{Backend, StreamDirection};
use crate::midi::port::{Direction, Port, SystemPort, VirtualPort};
use crate::midi::{Message, MidiError, PortError};

/// Any software or hardware capable of sending and receiving MIDI.
pub enum Device {
    System(SystemDevice),
    Thru(ThruDevice),
    Transposer(Transposer),
}

impl Device {
    pub fn name(&self) -> &str {
        match self {
            Device::System(device) => &device.name,
            Device::Thru(device) => &device.name,
            Device::Transposer(device) => &device.name,
        }
    }

    /// Stuff going into the device is received on the input port.
    pub fn in_port(&self) -> &Port {
        match self {
            Device::System(device) => &device.in_port,
            Device::Thru(device) => &device.in_port,
            Device::Transposer(device) => &device.in_port,
        }
    }

    /// Stuff coming from the device is sent from the output port.
    pub fn out_port(&self) -> &Port {
        match self {
            Device::System(device) => &device.out_port,
            Device::Thru(device) => &device.out_port,
            Device::Transposer(device) => &device.out_port,
        }
    }

    /// Opens both ports for MIDI streaming.
    pub fn open(&self) -> Result<(), PortError> {
        debug!(device = self.name(), "Opening device.");
        self.in_port().open()?;
        self.out_port().open()
    }

    /// Closes both ports, ending any run loops.
    pub fn close(&self) {
        debug!(device = self.name(), "Closing device.");
        self.in_port().close();
        self.out_port().close();
        self.running().store(false, Ordering::Relaxed);
    }

    fn running(&self) -> &Arc<AtomicBool> {
        match self {
            Device::System(device) => &device.running,
            Device::Thru(device) => &device.running,
            Device::Transposer(device) => &device.running,
        }
    }

    /// Spawns the device's run loops. The loops end when the device is
    /// closed. Running a running device is a no-op, so connectors sharing a
    /// device never double its loops.
    pub fn run(&self) {
        if self.running().swap(true, Ordering::Relaxed) {
            return;
        }
        debug!(device = self.name(), "Running device.");
        match self {
            Device::System(device) => device.run(),
            Device::Thru(device) => device.run(),
            Device::Transposer(device) => device.run(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::System(device) => {
                let mut capabilities: Vec<&str> = Vec::new();
                if device.in_attached {
                    capabilities.push("Input");
                }
                if device.out_attached {
                    capabilities.push("Output");
                }
                write!(f, "{} ({})", device.name, capabilities.join("/"))
            }
            Device::Thru(device) => write!(f, "{} (Thru)", device.name),
            Device::Transposer(device) => write!(f, "{} (Transposer)", device.name),
        }
    }
}

/// A software or hardware MIDI device on the system, its ports bound to
/// backend streams.
pub struct SystemDevice {
    name: String,
    in_port: Port,
    out_port: Port,
    in_attached: bool,
    out_attached: bool,
    running: Arc<AtomicBool>,
}

impl SystemDevice {
    fn run(&self) {
        for port in [&self.in_port, &self.out_port] {
            if port.is_open() {
                let port = port.clone();
                thread::spawn(move || port.run());
            }
        }
    }
}

/// A logical device that copies its input port directly to its output port.
pub struct ThruDevice {
    name: String,
    in_port: Port,
    out_port: Port,
    running: Arc<AtomicBool>,
}

impl ThruDevice {
    pub fn new(name: &str) -> ThruDevice {
        ThruDevice {
            name: name.to_string(),
            in_port: Port::Virtual(VirtualPort::new()),
            out_port: Port::Virtual(VirtualPort::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn run(&self) {
        let in_port = self.in_port.clone();
        let out_port = self.out_port.clone();
        thread::spawn(move || loop {
            let message = match in_port.recv() {
                Ok(message) => message,
                Err(_) => return,
            };
            if out_port.send(message).is_err() {
                return;
            }
        });
    }
}

/// The run-loop body of a transposer. The default rewrites note keys via
/// the note map; callers may substitute their own.
pub type Transposition = Arc<dyn Fn(&Transposer) + Send + Sync>;

/// A logical device that rewrites note keys via a lookup map as messages
/// pass through it.
#[derive(Clone)]
pub struct Transposer {
    name: String,
    note_map: Arc<HashMap<u8, u8>>,
    reverse_map: Arc<HashMap<u8, u8>>,
    in_port: Port,
    out_port: Port,
    transpose: Transposition,
    running: Arc<AtomicBool>,
}

impl Transposer {
    /// Creates a transposer over the given note map. The reverse map is
    /// computed eagerly so back-translation is a plain lookup. When no
    /// transposition function is supplied the default key-rewriting loop is
    /// used.
    pub fn new(
        name: &str,
        note_map: HashMap<u8, u8>,
        transpose: Option<Transposition>,
    ) -> Transposer {
        let reverse_map = note_map.iter().map(|(key, value)| (*value, *key)).collect();
        Transposer {
            name: name.to_string(),
            note_map: Arc::new(note_map),
            reverse_map: Arc::new(reverse_map),
            in_port: Port::Virtual(VirtualPort::new()),
            out_port: Port::Virtual(VirtualPort::new()),
            transpose: transpose.unwrap_or_else(|| Arc::new(Transposer::default_transpose)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn in_port(&self) -> &Port {
        &self.in_port
    }

    pub fn out_port(&self) -> &Port {
        &self.out_port
    }

    /// The key a note maps to, or the note itself when unmapped.
    pub fn substitute(&self, key: u8) -> u8 {
        *self.note_map.get(&key).unwrap_or(&key)
    }

    /// Reverse lookup: the original key that maps to the given substituted
    /// key, used e.g. to translate notes back to controller button LEDs.
    pub fn original_key(&self, key: u8) -> Option<u8> {
        self.reverse_map.get(&key).copied()
    }

    /// Rewrites Note On / Note Off keys through the note map; everything
    /// else passes through unchanged.
    fn default_transpose(t: &Transposer) {
        loop {
            let message = match t.in_port.recv() {
                Ok(message) => message,
                Err(_) => return,
            };
            let transposed = match message {
                Message::NoteOn {
                    channel,
                    key,
                    velocity,
                } => Message::NoteOn {
                    channel,
                    key: t.substitute(key),
                    velocity,
                },
                Message::NoteOff { channel, key } => Message::NoteOff {
                    channel,
                    key: t.substitute(key),
                },
                other => other,
            };
            if t.out_port.send(transposed).is_err() {
                return;
            }
        }
    }

    fn run(&self) {
        let transposer = self.clone();
        thread::spawn(move || {
            let transpose = transposer.transpose.clone();
            transpose.as_ref()(&transposer)
        });
    }
}

/// The system devices discovered from a backend, keyed by name.
pub struct SystemDevices {
    devices: BTreeMap<String, Arc<Device>>,
}

impl SystemDevices {
    /// Gets the device matching the given name. An exact match wins;
    /// otherwise the name is matched as a substring, and matching more than
    /// one device is an error.
    pub fn get(&self, name: &str) -> Result<Arc<Device>, MidiError> {
        if let Some(device) = self.devices.get(name) {
            return Ok(device.clone());
        }

        let matches: Vec<&Arc<Device>> = self
            .devices
            .iter()
            .filter(|(device_name, _)| device_name.contains(name))
            .map(|(_, device)| device)
            .collect();

        match matches.len() {
            0 => Err(MidiError::UnknownDevice(name.to_string())),
            1 => Ok(matches[0].clone()),
            _ => Err(MidiError::AmbiguousDevice(
                matches
                    .iter()
                    .map(|device| device.name().to_string())
                    .collect::<Vec<String>>()
                    .join(", "),
            )),
        }
    }

    /// Iterates devices in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Queries the backend for every MIDI stream and pairs streams sharing a
/// name into devices. A name seen on only one side yields a device with an
/// unattached counterpart port that opens to a no-op.
pub fn discover(backend: Arc<dyn Backend>) -> Result<SystemDevices, MidiError> {
    // A backend output stream feeds a device's input port and a backend
    // input stream feeds a device's output port.
    let mut in_streams: HashMap<String, usize> = HashMap::new();
    let mut out_streams: HashMap<String, usize> = HashMap::new();
    for stream in backend.streams()? {
        match stream.direction {
            StreamDirection::Output => in_streams.insert(stream.name, stream.id),
            StreamDirection::Input => out_streams.insert(stream.name, stream.id),
        };
    }

    let mut devices = BTreeMap::new();
    let names: Vec<String> = in_streams.keys().chain(out_streams.keys()).cloned().collect();
    for name in names {
        if devices.contains_key(&name) {
            continue;
        }
        let in_id = in_streams.get(&name).copied();
        let out_id = out_streams.get(&name).copied();
        let device = SystemDevice {
            name: name.clone(),
            in_port: Port::System(SystemPort::new(
                name.clone(),
                in_id,
                Direction::In,
                backend.clone(),
            )),
            out_port: Port::System(SystemPort::new(
                name.clone(),
                out_id,
                Direction::Out,
                backend.clone(),
            )),
            in_attached: in_id.is_some(),
            out_attached: out_id.is_some(),
            running: Arc::new(AtomicBool::new(false)),
        };
        devices.insert(name, Arc::new(Device::System(device)));
    }

    Ok(SystemDevices { devices })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::midi::mock;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn note_on(key: u8) -> Message {
        Message::NoteOn {
            channel: 0,
            key,
            velocity: 100,
        }
    }

    #[test]
    fn thru_device_forwards_messages() {
        let device = Device::Thru(ThruDevice::new("thru"));
        device.open().expect("open failed");
        device.run();

        device.in_port().send(note_on(64)).expect("send failed");
        let received = device
            .out_port()
            .recv_timeout(RECV_TIMEOUT)
            .expect("recv failed");
        assert_eq!(received, note_on(64));

        device.close();
    }

    #[test]
    fn transposer_substitutes_mapped_notes() {
        let note_map = HashMap::from([(36, 37), (37, 36)]);
        let transposer = Transposer::new("swap", note_map, None);
        assert_eq!(transposer.original_key(37), Some(36));

        let device = Device::Transposer(transposer);
        device.open().expect("open failed");
        device.run();

        device.in_port().send(note_on(36)).expect("send failed");
        assert_eq!(
            device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            note_on(37)
        );

        // An unmapped key passes through unchanged.
        device.in_port().send(note_on(99)).expect("send failed");
        assert_eq!(
            device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            note_on(99)
        );

        // Non-note messages pass through unchanged.
        let cc = Message::ControlChange {
            channel: 0,
            id: 10,
            value: 64,
            name: crate::midi::control_change_name(10),
        };
        device.in_port().send(cc.clone()).expect("send failed");
        assert_eq!(
            device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            cc
        );

        device.close();
    }

    #[test]
    fn transposer_keeps_ordering_under_load() {
        let note_map = HashMap::from([(60, 72)]);
        let device = Arc::new(Device::Transposer(Transposer::new("octave", note_map, None)));
        device.open().expect("open failed");
        device.run();

        let sender = {
            let device = device.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    device.in_port().send(note_on(60)).expect("send failed");
                }
                for _ in 0..100 {
                    device.in_port().send(note_on(61)).expect("send failed");
                }
            })
        };

        for _ in 0..100 {
            assert_eq!(
                device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
                note_on(72)
            );
        }
        for _ in 0..100 {
            assert_eq!(
                device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
                note_on(61)
            );
        }

        sender.join().expect("join failed");
        device.close();
    }

    #[test]
    fn system_device_reads_and_writes_through_the_backend() {
        let mut backend = mock::Backend::new();
        let handle = backend.add_device("mock device");
        let devices = discover(Arc::new(backend)).expect("discover failed");
        assert_eq!(devices.len(), 1);

        let device = devices.get("mock device").expect("get failed");
        device.open().expect("open failed");
        device.run();

        // An event arriving from the hardware surfaces on the output port,
        // with Note On velocity 0 canonicalized to Note Off.
        handle.push_event(note_on(60).to_wire());
        handle.push_event((60 << 8) | 0x90);
        assert_eq!(
            device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            note_on(60)
        );
        assert_eq!(
            device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            Message::NoteOff {
                channel: 0,
                key: 60
            }
        );

        // A message sent to the input port is written to the hardware.
        device.in_port().send(note_on(61)).expect("send failed");
        let written = handle.wait_for_written(1, RECV_TIMEOUT);
        assert_eq!(written, vec![note_on(61).to_wire()]);

        device.close();
    }

    #[test]
    fn one_sided_device_opens_to_a_no_op() {
        let mut backend = mock::Backend::new();
        let handle = backend.add_one_sided_device("out only", StreamDirection::Input);
        let devices = discover(Arc::new(backend)).expect("discover failed");

        let device = devices.get("out only").expect("get failed");
        device.open().expect("open failed");
        // The host never reported an input side, so that port stays closed.
        assert!(!device.in_port().is_open());
        assert!(device.out_port().is_open());

        device.run();
        handle.push_event(note_on(64).to_wire());
        assert_eq!(
            device.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            note_on(64)
        );

        device.close();
    }

    #[test]
    fn device_lookup_by_substring() {
        let mut backend = mock::Backend::new();
        backend.add_device("Launchpad S");
        backend.add_device("nanoPAD2");
        let devices = discover(Arc::new(backend)).expect("discover failed");

        assert_eq!(devices.get("Launchpad").expect("get failed").name(), "Launchpad S");
        assert!(matches!(
            devices.get("missing"),
            Err(MidiError::UnknownDevice(_))
        ));
        assert!(matches!(devices.get("a"), Err(MidiError::AmbiguousDevice(_))));
    }
}
