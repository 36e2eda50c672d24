//! TCP transport.
//!
//! Each member listens on its own address. Every destination has a writer
//! thread fed by a crossbeam queue: `send_to` only frames the message and
//! queues it, so the event loop never waits on a connect or a slow peer. The
//! writer opens its connection lazily and reuses it; a failed connect or write
//! drops the connection and comes back as [`TransportEvent::Undeliverable`] on
//! the inbound queue. Inbound connections get a reader thread each, which maps
//! the sender's advertised address back to its id.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::CommConfig;
use crate::error::{CommError, TransportError};
use crate::membership::{MembershipView, ProcessId};
use crate::protocol::frame::{self, Envelope};
use crate::protocol::WireMessage;

use super::{Transport, TransportEvent};

pub struct TcpTransport {
    self_id: ProcessId,
    /// Advertised in every envelope so the receiver can tell who sent it.
    self_addr: SocketAddr,
    max_frame_size: usize,
    /// Framed bytes for each member's writer thread, indexed by process id.
    writers: Vec<Sender<Vec<u8>>>,
    inbound_rx: Receiver<TransportEvent>,
}

impl TcpTransport {
    /// Listen on this member's address, start accepting peers and start one
    /// writer thread per member.
    ///
    /// # Errors
    ///
    /// [`CommError::Bind`] if the local address is taken or unusable.
    pub fn bind(view: &MembershipView, config: &CommConfig) -> Result<Self, CommError> {
        let self_addr = view.self_record().address();
        let listener = TcpListener::bind(self_addr).map_err(|source| CommError::Bind {
            addr: self_addr,
            source,
        })?;
        info!(addr = %self_addr, "listening");

        let (inbound_tx, inbound_rx) = unbounded();
        let lookup = Arc::new(view.clone());
        let max_frame_size = config.max_frame_size;
        {
            let inbound_tx = inbound_tx.clone();
            thread::Builder::new()
                .name(format!("accept-{}", view.self_id()))
                .spawn(move || accept_loop(listener, lookup, inbound_tx, max_frame_size))?;
        }

        let mut writers = Vec::with_capacity(view.len());
        for record in view.iter() {
            let (tx, rx) = unbounded();
            let peer = Peer {
                id: record.id(),
                addr: record.address(),
                connect_timeout: config.connect_timeout,
            };
            let inbound = inbound_tx.clone();
            thread::Builder::new()
                .name(format!("tcp-writer-{}", record.id()))
                .spawn(move || write_loop(peer, rx, inbound))?;
            writers.push(tx);
        }

        Ok(TcpTransport {
            self_id: view.self_id(),
            self_addr,
            max_frame_size,
            writers,
            inbound_rx,
        })
    }
}

impl Transport for TcpTransport {
    fn local_id(&self) -> ProcessId {
        self.self_id
    }

    /// Queue `message` for `to`. Never blocks on the network; delivery
    /// failures are reported later through [`Transport::inbound`].
    fn send_to(&self, to: ProcessId, message: WireMessage) -> Result<(), TransportError> {
        let writer = self.writers.get(to as usize).ok_or(TransportError::UnknownProcess(to))?;
        let envelope = Envelope {
            from: self.self_addr,
            message,
        };
        let bytes = match frame::encode(&envelope, self.max_frame_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Dropping an unencodable message is not the peer's fault.
                warn!(process_id = to, error = %e, "dropping message that cannot be framed");
                return Ok(());
            }
        };
        writer.send(bytes).map_err(|_| TransportError::Closed)
    }

    fn inbound(&self) -> &Receiver<TransportEvent> {
        &self.inbound_rx
    }
}

/// Destination served by one writer thread.
struct Peer {
    id: ProcessId,
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl Peer {
    fn connect(&self) -> Option<TcpStream> {
        match TcpStream::connect_timeout(&self.addr, self.connect_timeout) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                debug!(process_id = self.id, addr = %self.addr, "connected");
                Some(stream)
            }
            Err(e) => {
                debug!(process_id = self.id, addr = %self.addr, error = %e, "connect failed");
                None
            }
        }
    }
}

/// Runs until the transport drops its sender.
fn write_loop(peer: Peer, frames: Receiver<Vec<u8>>, inbound: Sender<TransportEvent>) {
    let mut stream: Option<TcpStream> = None;
    while let Ok(bytes) = frames.recv() {
        if stream.is_none() {
            stream = peer.connect();
        }
        let written = match stream.as_mut() {
            Some(s) => s.write_all(&bytes).map_err(|e| {
                debug!(process_id = peer.id, error = %e, "write failed, dropping connection");
            }),
            None => Err(()),
        };
        if written.is_err() {
            stream = None;
            // Frames queued behind the failed one would fail the same way.
            let skipped = frames.try_iter().count();
            if skipped > 0 {
                debug!(process_id = peer.id, skipped, "discarding frames queued for unreachable peer");
            }
            if inbound.send(TransportEvent::Undeliverable { to: peer.id }).is_err() {
                return;
            }
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    view: Arc<MembershipView>,
    inbound: Sender<TransportEvent>,
    max_frame_size: usize,
) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let view = Arc::clone(&view);
        let inbound = inbound.clone();
        let spawned = thread::Builder::new()
            .name("tcp-reader".to_string())
            .spawn(move || read_loop(stream, view, inbound, max_frame_size));
        if let Err(e) = spawned {
            warn!(error = %e, "could not start reader thread");
        }
    }
}

fn read_loop(mut stream: TcpStream, view: Arc<MembershipView>, inbound: Sender<TransportEvent>, max_frame_size: usize) {
    let peer = stream.peer_addr().ok();
    loop {
        let envelope = match frame::read_frame(&mut stream, max_frame_size) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(?peer, "peer closed connection");
                return;
            }
            Err(e) => {
                debug!(?peer, error = %e, "read failed, closing connection");
                return;
            }
        };

        let Some(from) = view.id_of(&envelope.from) else {
            warn!(addr = %envelope.from, "message from address outside the membership");
            continue;
        };
        let event = TransportEvent::Received {
            from,
            message: envelope.message,
        };
        if inbound.send(event).is_err() {
            // Transport dropped.
            return;
        }
    }
}
