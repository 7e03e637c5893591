//! Socket side of the relay.
//!
//! The [`Multiplexer`] owns the listening socket. Every accepted stream is
//! split into a reader task, which turns socket reads into
//! [`ReadinessEvent`]s, and a writer task, which drains the connection's
//! outbox. The relay loop only ever sees events and [`Connection`] handles,
//! so it never waits on a peer.

use std::{io, net::SocketAddr};

use thiserror::Error;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
    select,
    sync::mpsc,
    task::AbortHandle,
};
use tracing::debug;

use crate::{
    config::Framing,
    message::{Inbound, PayloadReader, write_text},
};

/// Distinguishes two connections that happened to share a remote address.
pub type ConnectionId = u64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("connection to {peer} is closed")]
pub struct ConnectionClosed {
    pub peer: SocketAddr,
}

/// Handle to one live connection. Dropping it stops reading from the socket
/// and, once queued output is written, closes it.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    outbox: mpsc::UnboundedSender<String>,
    reader: Option<AbortHandle>,
}

impl Connection {
    /// Builds a connection that is not backed by a socket. Everything sent
    /// to it lands on the returned receiver; dropping the receiver makes the
    /// connection look disconnected.
    pub fn pair(id: ConnectionId, peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let connection = Self {
            id,
            peer,
            outbox,
            reader: None,
        };
        (connection, inbox)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Best-effort liveness check: false once the writer side has gone away.
    /// A connection that reports true can still fail its next write.
    pub fn is_connected(&self) -> bool {
        !self.outbox.is_closed()
    }

    /// Queues `text` for delivery without waiting for the peer.
    pub fn send(&self, text: &str) -> Result<(), ConnectionClosed> {
        self.outbox
            .send(text.to_string())
            .map_err(|_| ConnectionClosed { peer: self.peer })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Why a connection stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its side.
    Eof,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

#[derive(Debug)]
pub enum ReadinessEvent {
    /// A new connection; the relay must register it before polling again.
    Accepted(Connection),
    /// Accepting failed. The listener is still usable.
    AcceptFailed(io::Error),
    Readable {
        id: ConnectionId,
        peer: SocketAddr,
        payload: Inbound,
    },
    Closed {
        id: ConnectionId,
        peer: SocketAddr,
        reason: CloseReason,
    },
}

pub struct Multiplexer {
    listener: TcpListener,
    framing: Framing,
    events_tx: mpsc::UnboundedSender<ReadinessEvent>,
    events_rx: mpsc::UnboundedReceiver<ReadinessEvent>,
    next_id: ConnectionId,
}

impl Multiplexer {
    pub fn new(listener: TcpListener, framing: Framing) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            listener,
            framing,
            events_tx,
            events_rx,
            next_id: 1,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next event. Cancel safe, so it can sit in a `select!`.
    pub async fn poll(&mut self) -> ReadinessEvent {
        let accepted = select! {
            Some(event) = self.events_rx.recv() => return event,
            accepted = self.listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => ReadinessEvent::Accepted(self.attach(stream, peer)),
            Err(err) => ReadinessEvent::AcceptFailed(err),
        }
    }

    fn attach(&mut self, stream: TcpStream, peer: SocketAddr) -> Connection {
        let id = self.next_id;
        self.next_id += 1;

        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, error = ?err, "failed to disable nagle");
        }

        let (read_half, write_half) = stream.into_split();
        let (mut connection, inbox) = Connection::pair(id, peer);

        tokio::spawn(write_loop(
            write_half,
            inbox,
            self.framing,
            id,
            peer,
            self.events_tx.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            read_half,
            self.framing,
            id,
            peer,
            self.events_tx.clone(),
        ));
        connection.reader = Some(reader.abort_handle());

        connection
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    framing: Framing,
    id: ConnectionId,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<ReadinessEvent>,
) {
    let mut reader = PayloadReader::new(read_half, framing);

    let reason = loop {
        match reader.next_payload().await {
            Ok(Some(payload)) => {
                if events
                    .send(ReadinessEvent::Readable { id, peer, payload })
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => break CloseReason::Eof,
            Err(err) => break CloseReason::ReadFailed(err),
        }
    };

    let _ = events.send(ReadinessEvent::Closed { id, peer, reason });
}

/// Drains `inbox` into `writer`. The first failed write closes the inbox and
/// reports [`CloseReason::WriteFailed`].
pub(crate) async fn write_loop<W>(
    mut writer: W,
    mut inbox: mpsc::UnboundedReceiver<String>,
    framing: Framing,
    id: ConnectionId,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<ReadinessEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(text) = inbox.recv().await {
        if let Err(err) = write_text(&mut writer, framing, &text).await {
            // Closing the inbox makes the liveness check fail right away.
            inbox.close();
            let _ = events.send(ReadinessEvent::Closed {
                id,
                peer,
                reason: CloseReason::WriteFailed(err),
            });
            return;
        }
    }

    // Every handle is gone: the session was removed.
    if let Err(err) = writer.shutdown().await {
        debug!(%peer, error = ?err, "failed to shut down connection cleanly");
    }
}
