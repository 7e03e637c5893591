use std::{collections::VecDeque, future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, select};
use tracing::{debug, info, warn};

use crate::{
    config::RelayConfig,
    message::Inbound,
    protocol::{HELP_TEXT, MEMBER_SEPARATOR, NO_MEMBERS, Request, classify},
    registry::{RegistryError, Session, SessionRegistry, UNKNOWN_GUEST},
    router::{self, Delivery},
    transport::{CloseReason, Connection, ConnectionId, Multiplexer, ReadinessEvent},
};

const SHUTDOWN_NOTICE: &str = "*** relay shutting down";

pub fn joined_notice(name: &str) -> String {
    format!("*** {name} joined the chat")
}

pub fn left_notice(name: &str) -> String {
    format!("*** {name} left the chat")
}

pub struct Relay {
    mux: Multiplexer,
    registry: SessionRegistry,
}

impl Relay {
    pub fn new(listener: TcpListener, config: &RelayConfig) -> Self {
        Self {
            mux: Multiplexer::new(listener, config.framing),
            registry: SessionRegistry::new(),
        }
    }

    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, config))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.mux.local_addr()
    }

    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    self.handle_shutdown();
                    break;
                }
                event = self.mux.poll() => {
                    self.dispatch(event);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }

    fn dispatch(&mut self, event: ReadinessEvent) {
        match event {
            ReadinessEvent::Accepted(connection) => self.handle_accept(connection),
            ReadinessEvent::AcceptFailed(err) => {
                warn!(error = ?err, "failed to accept connection");
            }
            ReadinessEvent::Readable { id, peer, payload } => {
                if self.is_current(id, peer) {
                    self.handle_payload(peer, payload);
                }
            }
            ReadinessEvent::Closed { id, peer, reason } => {
                if self.is_current(id, peer) {
                    self.handle_close(peer, reason);
                }
            }
        }
    }

    /// Events can outlive their session, e.g. the reader's EOF after the
    /// router already pruned it.
    fn is_current(&self, id: ConnectionId, peer: SocketAddr) -> bool {
        self.registry
            .get(peer)
            .is_some_and(|session| session.connection_id() == id)
    }

    fn handle_accept(&mut self, connection: Connection) {
        let peer = connection.peer();
        match self.registry.register(connection) {
            Ok(_) => info!(%peer, "connection accepted"),
            Err((RegistryError::DuplicateSession(peer), _connection)) => {
                warn!(%peer, "address already has a session; dropping connection");
            }
            Err((err, _connection)) => warn!(%peer, error = %err, "failed to register session"),
        }
    }

    fn handle_payload(&mut self, peer: SocketAddr, payload: Inbound) {
        let text = match payload {
            Inbound::Text(text) => text,
            Inbound::Malformed(len) => {
                debug!(%peer, len, "ignoring payload that is not valid utf-8");
                return;
            }
        };

        let Some(state) = self.registry.get(peer).map(Session::naming_state) else {
            return;
        };

        match classify(&text, state) {
            Request::Ignore => debug!(%peer, "ignoring empty payload"),
            Request::Register { name } => self.handle_register(peer, name),
            request => {
                debug!(
                    %peer,
                    name = self.registry.lookup_name(peer),
                    text = text.as_str(),
                    "message received"
                );
                self.handle_request(peer, request);
            }
        }
    }

    fn handle_register(&mut self, peer: SocketAddr, name: &str) {
        if let Err(err) = self.registry.assign_name(peer, name) {
            warn!(%peer, error = %err, "ignoring name registration");
            return;
        }

        info!(%peer, name, "name registered");
        self.announce(&joined_notice(name));
    }

    fn handle_request(&mut self, peer: SocketAddr, request: Request<'_>) {
        let delivery = match request {
            Request::Help => router::reply(&mut self.registry, peer, HELP_TEXT),
            Request::MemberList => {
                let members = self.registry.names_joined(MEMBER_SEPARATOR, NO_MEMBERS);
                router::reply(&mut self.registry, peer, &format!("<members>{members}"))
            }
            Request::Whisper { target, text } => {
                router::whisper(&mut self.registry, peer, target, text)
            }
            Request::Chat { text } => {
                let ack = router::reply(&mut self.registry, peer, &format!("<said>{text}"));
                self.announce_departures(ack.pruned);
                router::broadcast_from_user(&mut self.registry, peer, text)
            }
            Request::Ignore | Request::Register { .. } => return,
        };

        self.announce_departures(delivery.pruned);
    }

    fn handle_close(&mut self, peer: SocketAddr, reason: CloseReason) {
        let Some(session) = self.registry.remove(peer) else {
            return;
        };

        match reason {
            CloseReason::Eof => info!(%peer, "connection closed by peer"),
            CloseReason::ReadFailed(err) | CloseReason::WriteFailed(err) => {
                info!(%peer, error = %err, "connection closed with error");
            }
        }

        self.announce_departures(vec![session]);
    }

    fn announce(&mut self, text: &str) {
        let Delivery { pruned, .. } = router::server_announcement(&mut self.registry, text);
        self.announce_departures(pruned);
    }

    /// Tells everyone still connected that `departed` left. Announcing can
    /// itself uncover dead sessions, which are announced in turn.
    fn announce_departures(&mut self, departed: Vec<Session>) {
        let mut pending: VecDeque<Session> = departed.into();

        while let Some(session) = pending.pop_front() {
            let name = session.display_name().unwrap_or(UNKNOWN_GUEST).to_string();
            info!(peer = %session.peer(), %name, "session left");
            drop(session);

            let delivery = router::server_announcement(&mut self.registry, &left_notice(&name));
            pending.extend(delivery.pruned);
        }
    }

    fn handle_shutdown(&mut self) {
        info!(sessions = self.registry.len(), "relay shutting down");
        router::server_announcement(&mut self.registry, SHUTDOWN_NOTICE);
        drop(std::mem::take(&mut self.registry));
    }
}
