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

//! Connectors compose devices into topologies.
//!
//! A connector is made by associating two or more devices, initialized by
//! opening them, and connected so data flows between them:
//!     Pipe: one to one.
//!     Router: one to many.
//!     Funnel: many to one.
//!     Chain: a serial connection of an arbitrary number of pipes.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{select, unbounded};
use tracing::debug;

use crate::midi::device::Device;
use crate::midi::port::Disconnect;
use crate::midi::PortError;

/// Transmits MIDI data from one device's output to another device's input.
pub struct Pipe {
    from: Arc<Device>,
    to: Arc<Device>,
    disconnect: Disconnect,
}

impl Pipe {
    pub fn new(from: Arc<Device>, to: Arc<Device>) -> Pipe {
        Pipe {
            from,
            to,
            disconnect: Disconnect::new(),
        }
    }

    pub fn from_device(&self) -> &Arc<Device> {
        &self.from
    }

    pub fn to_device(&self) -> &Arc<Device> {
        &self.to
    }

    /// Opens both endpoints.
    pub fn open(&self) -> Result<(), PortError> {
        self.from.open()?;
        self.to.open()
    }

    /// Ends transmission and closes the connected devices.
    pub fn close(&self) {
        self.disconnect.signal();
        self.from.close();
        self.to.close();
    }

    /// Begins transmission of MIDI data between the connected devices.
    /// Messages flow strictly FIFO from end to end.
    pub fn connect(&self) {
        self.from.run();
        self.to.run();

        let rx = match self.from.out_port().receiver() {
            Some(rx) => rx,
            None => return,
        };
        let to_in = self.to.in_port().clone();
        let disconnect = self.disconnect.clone();
        debug!(
            from = self.from.name(),
            to = self.to.name(),
            "Connecting pipe."
        );
        thread::spawn(move || loop {
            select! {
                recv(rx) -> msg => {
                    let message = match msg {
                        Ok(message) => message,
                        Err(_) => return,
                    };
                    if to_in.send(message).is_err() {
                        return;
                    }
                }
                recv(disconnect.receiver()) -> _ => {
                    disconnect.signal();
                    return;
                }
            }
        });
    }
}

/// Transmits MIDI data from one device to many devices.
pub struct Router {
    from: Arc<Device>,
    to: Vec<Arc<Device>>,
    disconnect: Disconnect,
}

impl Router {
    pub fn new(from: Arc<Device>, to: Vec<Arc<Device>>) -> Router {
        Router {
            from,
            to,
            disconnect: Disconnect::new(),
        }
    }

    pub fn open(&self) -> Result<(), PortError> {
        for to in &self.to {
            to.open()?;
        }
        self.from.open()
    }

    /// Ends transmission and closes every endpoint.
    pub fn close(&self) {
        self.disconnect.signal();
        self.from.close();
        for to in &self.to {
            to.close();
        }
    }

    /// Begins broadcasting. Fan-out is parallel: one forwarding thread per
    /// recipient, fed from its own queue, so each recipient sees FIFO
    /// delivery no matter how the others are keeping up.
    pub fn connect(&self) {
        self.from.run();
        for to in &self.to {
            to.run();
        }

        let mut feeds = Vec::with_capacity(self.to.len());
        for to in &self.to {
            let (feed_tx, feed_rx) = unbounded();
            let in_port = to.in_port().clone();
            let disconnect = self.disconnect.clone();
            thread::spawn(move || loop {
                select! {
                    recv(feed_rx) -> msg => {
                        let message = match msg {
                            Ok(message) => message,
                            Err(_) => return,
                        };
                        if in_port.send(message).is_err() {
                            return;
                        }
                    }
                    recv(disconnect.receiver()) -> _ => {
                        disconnect.signal();
                        return;
                    }
                }
            });
            feeds.push(feed_tx);
        }

        let rx = match self.from.out_port().receiver() {
            Some(rx) => rx,
            None => return,
        };
        let disconnect = self.disconnect.clone();
        debug!(from = self.from.name(), recipients = feeds.len(), "Connecting router.");
        thread::spawn(move || loop {
            select! {
                recv(rx) -> msg => {
                    let message = match msg {
                        Ok(message) => message,
                        Err(_) => return,
                    };
                    for feed in &feeds {
                        let _ = feed.send(message.clone());
                    }
                }
                recv(disconnect.receiver()) -> _ => {
                    disconnect.signal();
                    return;
                }
            }
        });
    }
}

/// Merges MIDI data from many devices into one device.
pub struct Funnel {
    from: Vec<Arc<Device>>,
    to: Arc<Device>,
    disconnect: Disconnect,
}

impl Funnel {
    pub fn new(to: Arc<Device>, from: Vec<Arc<Device>>) -> Funnel {
        Funnel {
            from,
            to,
            disconnect: Disconnect::new(),
        }
    }

    pub fn open(&self) -> Result<(), PortError> {
        for from in &self.from {
            from.open()?;
        }
        self.to.open()
    }

    /// Ends transmission and closes every endpoint.
    pub fn close(&self) {
        self.disconnect.signal();
        for from in &self.from {
            from.close();
        }
        self.to.close();
    }

    /// Begins merging: one forwarder per source feeds the destination.
    /// Sources interleave in arrival order; each source's own messages stay
    /// in order.
    pub fn connect(&self) {
        self.to.run();
        debug!(to = self.to.name(), sources = self.from.len(), "Connecting funnel.");
        for from in &self.from {
            from.run();
            let rx = match from.out_port().receiver() {
                Some(rx) => rx,
                None => continue,
            };
            let to_in = self.to.in_port().clone();
            let disconnect = self.disconnect.clone();
            thread::spawn(move || loop {
                select! {
                    recv(rx) -> msg => {
                        let message = match msg {
                            Ok(message) => message,
                            Err(_) => return,
                        };
                        if to_in.send(message).is_err() {
                            return;
                        }
                    }
                    recv(disconnect.receiver()) -> _ => {
                        // Re-send the token so the other forwarders
                        // observe it too.
                        disconnect.signal();
                        return;
                    }
                }
            });
        }
    }
}

/// Connects a series of devices, like creating many serially chained pipes.
pub struct Chain {
    devices: Vec<Arc<Device>>,
    pipes: Vec<Pipe>,
}

impl Chain {
    pub fn new(devices: Vec<Arc<Device>>) -> Chain {
        let pipes = devices
            .windows(2)
            .map(|pair| Pipe::new(pair[0].clone(), pair[1].clone()))
            .collect();
        Chain { devices, pipes }
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn open(&self) -> Result<(), PortError> {
        for pipe in &self.pipes {
            pipe.open()?;
        }
        Ok(())
    }

    /// Ends transmission on every pipe.
    pub fn close(&self) {
        for pipe in &self.pipes {
            pipe.close();
        }
    }

    /// Begins transmission along the chain.
    pub fn connect(&self) {
        for pipe in &self.pipes {
            pipe.connect();
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::midi::device::ThruDevice;
    use crate::midi::Message;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn thru(name: &str) -> Arc<Device> {
        Arc::new(Device::Thru(ThruDevice::new(name)))
    }

    fn note_on(key: u8) -> Message {
        Message::NoteOn {
            channel: 0,
            key,
            velocity: 127,
        }
    }

    #[test]
    fn pipe_delivers_messages_verbatim() {
        let a = thru("bus a");
        let b = thru("bus b");
        let pipe = Pipe::new(a.clone(), b.clone());
        pipe.open().expect("open failed");
        pipe.connect();

        let message = Message::NoteOn {
            channel: 0,
            key: 64,
            velocity: 127,
        };
        a.in_port().send(message.clone()).expect("send failed");
        assert_eq!(
            b.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
            message
        );

        pipe.close();
    }

    #[test]
    fn router_fans_out_in_fifo_order_per_recipient() {
        let from = thru("source");
        let sinks = vec![thru("sink 1"), thru("sink 2"), thru("sink 3")];
        let router = Router::new(from.clone(), sinks.clone());
        router.open().expect("open failed");
        router.connect();

        for key in 0..10 {
            from.in_port().send(note_on(key)).expect("send failed");
        }

        for sink in &sinks {
            for key in 0..10 {
                assert_eq!(
                    sink.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed"),
                    note_on(key)
                );
            }
        }

        router.close();
    }

    #[test]
    fn funnel_merges_every_source_message() {
        let sources = vec![thru("source 1"), thru("source 2")];
        let to = thru("sink");
        let funnel = Funnel::new(to.clone(), sources.clone());
        funnel.open().expect("open failed");
        funnel.connect();

        for key in 0..3 {
            sources[0].in_port().send(note_on(key)).expect("send failed");
            sources[1].in_port().send(note_on(key + 10)).expect("send failed");
        }

        let mut keys: Vec<u8> = (0..6)
            .map(|_| {
                match to.out_port().recv_timeout(RECV_TIMEOUT).expect("recv failed") {
                    Message::NoteOn { key, .. } => key,
                    other => panic!("unexpected message: {:?}", other),
                }
            })
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![0, 1, 2, 10, 11, 12]);

        funnel.close();
    }

    #[test]
    fn chain_carries_messages_end_to_end() {
        let devices = vec![thru("first"), thru("second"), thru("third")];
        let chain = Chain::new(devices.clone());
        chain.open().expect("open failed");
        chain.connect();

        let message = note_on(42);
        devices[0].out_port().send(message.clone()).expect("send failed");
        assert_eq!(
            devices[2]
                .out_port()
                .recv_timeout(RECV_TIMEOUT)
                .expect("recv failed"),
            message
        );

        chain.close();
    }
}
