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

//! Ports carry parsed MIDI messages over bounded channels.
//!
//! A port represents the physical MIDI-in or MIDI-out jack of a device, not
//! the stream the OS uses to talk to it. System ports bridge a backend
//! stream to a channel; virtual ports are plain channels owned by logical
//! devices. The channel is the only mutation path for message flow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::midi::backend::{Backend, InputStream, OutputStream};
use crate::midi::{Message, PortError};

/// Capacity of a port's message channel.
const PORT_BUFFER: usize = 1;

/// A one-slot disconnect signal shared by everything that must observe a
/// close. A consumer that receives the token re-sends it so every other
/// waiter observes it too.
#[derive(Clone)]
pub struct Disconnect {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Disconnect {
    pub fn new() -> Disconnect {
        let (tx, rx) = bounded(1);
        Disconnect { tx, rx }
    }

    /// Raises the disconnect signal. Signaling twice is harmless.
    pub fn signal(&self) {
        let _ = self.tx.try_send(());
    }

    /// The receiving side, for use in a select.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Returns true once the signal has been raised. The token is re-sent so
    /// other waiters still observe it.
    pub fn is_signaled(&self) -> bool {
        if self.rx.try_recv().is_ok() {
            self.signal();
            return true;
        }
        false
    }
}

impl Default for Disconnect {
    fn default() -> Self {
        Disconnect::new()
    }
}

/// Both ends of a port's bounded message channel.
#[derive(Clone)]
pub(crate) struct PortChannel {
    pub(crate) tx: Sender<Message>,
    pub(crate) rx: Receiver<Message>,
}

impl PortChannel {
    fn new() -> PortChannel {
        let (tx, rx) = bounded(PORT_BUFFER);
        PortChannel { tx, rx }
    }
}

/// The direction of a device port. `In` means data flows into the device
/// from the application; `Out` means data flows out of the device toward
/// the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// State shared by every port variant: the open flag, the message channel,
/// and the disconnect signal. Clones alias the same port.
#[derive(Clone, Default)]
struct PortCore {
    open: Arc<AtomicBool>,
    channel: Arc<Mutex<Option<PortChannel>>>,
    disconnect: Arc<Mutex<Disconnect>>,
}

impl PortCore {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Allocates a fresh channel and disconnect signal and marks the port
    /// open. A no-op if the port is already open.
    fn open(&self) {
        let mut channel = self.channel.lock();
        if self.is_open() {
            return;
        }
        *channel = Some(PortChannel::new());
        *self.disconnect.lock() = Disconnect::new();
        self.open.store(true, Ordering::Relaxed);
    }

    /// Signals disconnect and drops the channel. A no-op if already closed.
    fn close(&self) {
        if !self.is_open() {
            return;
        }
        self.open.store(false, Ordering::Relaxed);
        self.disconnect.lock().signal();
        self.channel.lock().take();
    }

    /// Clones out the live channel and disconnect signal, or None if the
    /// port is closed.
    fn endpoints(&self) -> Option<(PortChannel, Disconnect)> {
        let channel = self.channel.lock().clone()?;
        let disconnect = self.disconnect.lock().clone();
        Some((channel, disconnect))
    }

    fn send(&self, message: Message) -> Result<(), PortError> {
        let (channel, disconnect) = self.endpoints().ok_or(PortError::NotOpen)?;
        select! {
            send(channel.tx, message) -> res => res.map_err(|_| PortError::Closed),
            recv(disconnect.receiver()) -> _ => {
                disconnect.signal();
                Err(PortError::Disconnected)
            }
        }
    }

    fn recv(&self) -> Result<Message, PortError> {
        let (channel, disconnect) = self.endpoints().ok_or(PortError::NotOpen)?;
        select! {
            recv(channel.rx) -> msg => msg.map_err(|_| PortError::Closed),
            recv(disconnect.receiver()) -> _ => {
                disconnect.signal();
                Err(PortError::Disconnected)
            }
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Message, PortError> {
        let (channel, disconnect) = self.endpoints().ok_or(PortError::NotOpen)?;
        select! {
            recv(channel.rx) -> msg => msg.map_err(|_| PortError::Closed),
            recv(disconnect.receiver()) -> _ => {
                disconnect.signal();
                Err(PortError::Disconnected)
            }
            default(timeout) => Err(PortError::Timeout),
        }
    }
}

/// A port with no backend stream, storing messages for its owning logical
/// device.
#[derive(Clone, Default)]
pub struct VirtualPort {
    core: PortCore,
}

impl VirtualPort {
    pub fn new() -> VirtualPort {
        VirtualPort {
            core: PortCore::default(),
        }
    }
}

/// A port bound to a backend MIDI stream.
///
/// The stream handles live behind mutexes so the run loop, running on its
/// own thread, and `close`, called by the owner, can both reach them; close
/// signals disconnect first so the loop never blocks the teardown.
#[derive(Clone)]
pub struct SystemPort {
    name: String,
    id: Option<usize>,
    direction: Direction,
    core: PortCore,
    backend: Arc<dyn Backend>,
    input: Arc<Mutex<Option<Box<dyn InputStream>>>>,
    output: Arc<Mutex<Option<Box<dyn OutputStream>>>>,
}

impl SystemPort {
    /// Creates a system port for the backend stream with the given ID. An
    /// `id` of None yields an unattached port whose open is a no-op, used
    /// for devices the host only knows one side of.
    pub fn new(
        name: String,
        id: Option<usize>,
        direction: Direction,
        backend: Arc<dyn Backend>,
    ) -> SystemPort {
        SystemPort {
            name,
            id,
            direction,
            core: PortCore::default(),
            backend,
            input: Arc::new(Mutex::new(None)),
            output: Arc::new(Mutex::new(None)),
        }
    }

    fn open(&self) -> Result<(), PortError> {
        // Unattached or already open, nothing to do.
        let id = match self.id {
            Some(id) if !self.core.is_open() => id,
            _ => return Ok(()),
        };

        // The input / output naming looks backwards, but a device's input
        // port receives data that must be written out to the device, and
        // vice versa.
        match self.direction {
            Direction::In => {
                let stream = self
                    .backend
                    .open_output(id)
                    .map_err(|e| PortError::Backend(e.to_string()))?;
                *self.output.lock() = Some(stream);
            }
            Direction::Out => {
                let stream = self
                    .backend
                    .open_input(id)
                    .map_err(|e| PortError::Backend(e.to_string()))?;
                *self.input.lock() = Some(stream);
            }
        }
        self.core.open();
        Ok(())
    }

    fn close(&self) {
        if !self.core.is_open() {
            return;
        }
        self.core.close();
        if let Some(mut stream) = self.input.lock().take() {
            stream.close();
        }
        if let Some(mut stream) = self.output.lock().take() {
            stream.close();
        }
    }

    fn run(&self) {
        if !self.core.is_open() {
            return;
        }
        match self.direction {
            Direction::In => self.run_in(),
            Direction::Out => self.run_out(),
        }
    }

    /// Drains the port channel into the backend stream until disconnect.
    fn run_in(&self) {
        let (channel, disconnect) = match self.core.endpoints() {
            Some(endpoints) => endpoints,
            None => return,
        };
        debug!(port = self.name, "Running input port.");
        loop {
            select! {
                recv(channel.rx) -> msg => {
                    let message = match msg {
                        Ok(message) => message,
                        Err(_) => return,
                    };
                    let mut output = self.output.lock();
                    let result = match output.as_mut() {
                        Some(stream) => stream.write(message.to_wire()),
                        None => return,
                    };
                    drop(output);
                    if let Err(e) = result {
                        error!(port = self.name, err = %e, "Error writing MIDI event.");
                        // The failure is fatal to the port: raise disconnect
                        // so blocked senders observe it.
                        disconnect.signal();
                        return;
                    }
                }
                recv(disconnect.receiver()) -> _ => {
                    disconnect.signal();
                    return;
                }
            }
        }
    }

    /// Polls the backend stream and publishes decoded messages until
    /// disconnect or a backend failure.
    fn run_out(&self) {
        let (channel, disconnect) = match self.core.endpoints() {
            Some(endpoints) => endpoints,
            None => return,
        };
        debug!(port = self.name, "Running output port.");
        loop {
            if disconnect.is_signaled() {
                return;
            }

            let mut input = self.input.lock();
            let stream = match input.as_mut() {
                Some(stream) => stream,
                None => return,
            };
            let available = match stream.poll() {
                Ok(available) => available,
                Err(e) => {
                    error!(port = self.name, err = %e, "Error polling MIDI stream.");
                    disconnect.signal();
                    return;
                }
            };
            if !available {
                drop(input);
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            let word = match stream.read() {
                Ok(word) => word,
                Err(e) => {
                    error!(port = self.name, err = %e, "Error reading MIDI event.");
                    disconnect.signal();
                    return;
                }
            };
            drop(input);

            let word = match word {
                Some(word) => word,
                None => continue,
            };
            let message = Message::from_wire(word);
            let publish = select! {
                send(channel.tx, message) -> res => res.is_ok(),
                recv(disconnect.receiver()) -> _ => {
                    disconnect.signal();
                    false
                }
            };
            if !publish {
                return;
            }
        }
    }
}

/// A message channel with open/closed state, optionally bound to a backend
/// MIDI stream.
#[derive(Clone)]
pub enum Port {
    System(SystemPort),
    Virtual(VirtualPort),
}

impl Port {
    fn core(&self) -> &PortCore {
        match self {
            Port::System(port) => &port.core,
            Port::Virtual(port) => &port.core,
        }
    }

    pub fn is_open(&self) -> bool {
        self.core().is_open()
    }

    /// Opens the port, acquiring backend resources for system ports.
    /// Opening an open port is a no-op.
    pub fn open(&self) -> Result<(), PortError> {
        match self {
            Port::System(port) => port.open(),
            Port::Virtual(port) => {
                port.core.open();
                Ok(())
            }
        }
    }

    /// Closes the port: signals disconnect, releases backend resources, and
    /// drops the channel. Closing a closed port is a no-op.
    pub fn close(&self) {
        match self {
            Port::System(port) => port.close(),
            Port::Virtual(port) => port.core.close(),
        }
    }

    /// Sends a message on the port channel, honoring disconnect.
    pub fn send(&self, message: Message) -> Result<(), PortError> {
        self.core().send(message)
    }

    /// Receives the next message from the port channel, honoring disconnect.
    pub fn recv(&self) -> Result<Message, PortError> {
        self.core().recv()
    }

    /// Like [`Port::recv`] but gives up after the timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Message, PortError> {
        self.core().recv_timeout(timeout)
    }

    /// Drives the port transfer loop. Virtual ports have no loop of their
    /// own; their traffic is driven by the owning device.
    pub fn run(&self) {
        if let Port::System(port) = self {
            port.run()
        }
    }

    /// The receiving end of the port channel, for connector select loops.
    pub(crate) fn receiver(&self) -> Option<Receiver<Message>> {
        self.core().channel.lock().as_ref().map(|c| c.rx.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::midi::mock;

    /// A system port over a freshly-built mock device. `add_device` lists
    /// the readable stream at id 0 and the writable one at id 1.
    fn mock_port(direction: Direction, prepare: impl FnOnce(&mock::DeviceHandle)) -> Port {
        let mut backend = mock::Backend::new();
        let handle = backend.add_device("mock");
        prepare(&handle);

        let id = match direction {
            Direction::In => 1,
            Direction::Out => 0,
        };
        let port = Port::System(SystemPort::new(
            String::from("mock"),
            Some(id),
            direction,
            Arc::new(backend),
        ));
        port.open().expect("open failed");
        {
            let port = port.clone();
            thread::spawn(move || port.run());
        }
        port
    }

    #[test]
    fn virtual_port_lifecycle_is_idempotent() {
        let port = Port::Virtual(VirtualPort::new());
        assert!(!port.is_open());

        port.open().expect("open failed");
        port.open().expect("second open failed");
        assert!(port.is_open());

        port.close();
        port.close();
        assert!(!port.is_open());
    }

    #[test]
    fn send_and_recv_round_trip() {
        let port = Port::Virtual(VirtualPort::new());
        port.open().expect("open failed");

        let message = Message::NoteOn {
            channel: 0,
            key: 64,
            velocity: 127,
        };
        port.send(message.clone()).expect("send failed");
        assert_eq!(port.recv().expect("recv failed"), message);
    }

    #[test]
    fn send_on_closed_port_fails() {
        let port = Port::Virtual(VirtualPort::new());
        let result = port.send(Message::NoteOff { channel: 0, key: 1 });
        assert!(matches!(result, Err(PortError::NotOpen)));
    }

    #[test]
    fn recv_observes_disconnect() {
        let port = Port::Virtual(VirtualPort::new());
        port.open().expect("open failed");

        let waiter = {
            let port = port.clone();
            thread::spawn(move || port.recv())
        };
        // Give the waiter a moment to block on the empty channel.
        thread::sleep(Duration::from_millis(10));
        port.close();

        let result = waiter.join().expect("join failed");
        assert!(matches!(result, Err(PortError::Disconnected)));
    }

    #[test]
    fn disconnect_token_is_resent() {
        let disconnect = Disconnect::new();
        disconnect.signal();
        assert!(disconnect.is_signaled());
        // The token was re-sent, so a second observer still sees it.
        assert!(disconnect.is_signaled());
    }

    #[test]
    fn recv_timeout_expires() {
        let port = Port::Virtual(VirtualPort::new());
        port.open().expect("open failed");
        let result = port.recv_timeout(Duration::from_millis(5));
        assert!(matches!(result, Err(PortError::Timeout)));
    }

    #[test]
    fn write_failure_disconnects_blocked_senders() {
        let port = mock_port(Direction::In, |handle| handle.fail_writes());

        // The run loop dies on its first failed write and raises
        // disconnect. At most one more send lands in the channel buffer;
        // the one after that blocks and must be woken by the signal.
        let message = Message::NoteOn {
            channel: 0,
            key: 64,
            velocity: 127,
        };
        let mut result = Ok(());
        for _ in 0..4 {
            result = port.send(message.clone());
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(PortError::Disconnected)));
    }

    #[test]
    fn poll_failure_disconnects_blocked_receivers() {
        let port = mock_port(Direction::Out, |handle| handle.fail_polls());
        assert!(matches!(port.recv(), Err(PortError::Disconnected)));
    }

    #[test]
    fn read_failure_disconnects_blocked_receivers() {
        let port = mock_port(Direction::Out, |handle| handle.fail_reads());
        assert!(matches!(port.recv(), Err(PortError::Disconnected)));
    }
}
