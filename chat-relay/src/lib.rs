//! Multi-client text chat relay over plain TCP.
//!
//! Clients connect, send their display name as the first payload, and then
//! chat. Plain text is relayed to everyone else; `@help`, `@member` and
//! `@wisper <target> <message>` are answered by the relay itself.
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`config`] holds the relay settings and wire [`config::Framing`].
//! - [`transport`] owns the listening socket and turns per-connection I/O
//!   into readiness events.
//! - [`registry`] tracks live sessions and their naming state.
//! - [`protocol`] classifies payloads against the command grammar.
//! - [`router`] selects recipients and delivers, pruning dead sessions.
//! - [`server`] is the relay loop tying the pieces together.
//! - [`message`] reads and writes payloads in either framing.
//! - [`client`] is a small terminal client.
//!
//! All session state lives on the relay loop's task. Socket reads and writes
//! happen on per-connection tasks that only exchange messages with it, so a
//! slow peer never holds up delivery to anyone else.

pub mod cli;
pub mod client;
pub mod config;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod transport;
