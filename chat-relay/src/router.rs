//! Recipient selection and delivery.
//!
//! Every delivery walks a snapshot of the registry. Sessions whose connection
//! has gone away are pruned on the way, and a failed hand-off to one recipient
//! never stops delivery to the others.

use std::net::SocketAddr;

use tracing::debug;

use crate::registry::{Session, SessionRegistry};

/// Which sessions a message is meant for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ToAll,
    ToOthersExcept(SocketAddr),
    /// The first named session, in registration order, with this name.
    ToName(String),
    ToSession(SocketAddr),
}

/// Outcome of one delivery.
#[derive(Debug, Default)]
pub struct Delivery {
    pub recipients: Vec<SocketAddr>,
    /// Sessions found dead and removed from the registry.
    pub pruned: Vec<Session>,
}

impl Delivery {
    pub fn delivered(&self) -> usize {
        self.recipients.len()
    }
}

pub fn deliver(registry: &mut SessionRegistry, route: &Route, text: &str) -> Delivery {
    let mut delivery = Delivery::default();

    for peer in registry.all_sessions() {
        let Some(session) = registry.get(peer) else {
            continue;
        };

        if !session.is_connected() {
            if let Some(session) = registry.remove(peer) {
                debug!(%peer, "pruned disconnected session");
                delivery.pruned.push(session);
            }
            continue;
        }

        if !selects(route, session) {
            continue;
        }

        match session.send(text) {
            Ok(()) => delivery.recipients.push(peer),
            Err(err) => debug!(%peer, error = %err, "dropped message for closed connection"),
        }

        if matches!(route, Route::ToName(_) | Route::ToSession(_)) {
            break;
        }
    }

    delivery
}

fn selects(route: &Route, session: &Session) -> bool {
    match route {
        Route::ToAll => true,
        Route::ToOthersExcept(sender) => session.peer() != *sender,
        Route::ToName(name) => session.display_name() == Some(name.as_str()),
        Route::ToSession(peer) => session.peer() == *peer,
    }
}

/// Relays chat text from `sender` to every other session.
pub fn broadcast_from_user(
    registry: &mut SessionRegistry,
    sender: SocketAddr,
    text: &str,
) -> Delivery {
    let message = format!("[{}]{}", registry.lookup_name(sender), text);
    deliver(registry, &Route::ToOthersExcept(sender), &message)
}

/// Sends `text` to the session named `target` only. Silently dropped when
/// nobody has that name.
pub fn whisper(
    registry: &mut SessionRegistry,
    sender: SocketAddr,
    target: &str,
    text: &str,
) -> Delivery {
    let message = format!("<wisper>[{}]{}", registry.lookup_name(sender), text);
    deliver(registry, &Route::ToName(target.to_string()), &message)
}

pub fn server_announcement(registry: &mut SessionRegistry, text: &str) -> Delivery {
    deliver(registry, &Route::ToAll, text)
}

pub fn reply(registry: &mut SessionRegistry, recipient: SocketAddr, text: &str) -> Delivery {
    deliver(registry, &Route::ToSession(recipient), text)
}
