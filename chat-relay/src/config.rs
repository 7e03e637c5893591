use std::net::SocketAddr;

use clap::ValueEnum;

/// Size of the per-read receive buffer, in bytes.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// How a connection's byte stream is cut into payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// Every socket read is decoded as one payload and outbound text is
    /// written without a delimiter. Compatible with delimiter-less clients.
    #[default]
    Raw,
    /// Newline-terminated payloads in both directions.
    Lines,
}

/// Runtime settings for a [`crate::server::Relay`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub framing: Framing,
}

impl RelayConfig {
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            framing: Framing::default(),
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}
