use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{Args, Parser, Subcommand};

use crate::config::{Framing, RelayConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a relay and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address the relay should bind to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, short, default_value_t = 5000)]
    pub port: u16,

    /// How payloads are delimited on the wire.
    #[arg(long, value_enum, default_value_t = Framing::Raw)]
    pub framing: Framing,
}

impl From<ServerArgs> for RelayConfig {
    fn from(args: ServerArgs) -> Self {
        RelayConfig::new(SocketAddr::new(args.host, args.port)).with_framing(args.framing)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Host name or address of the relay.
    pub host: String,

    /// Port the relay listens on.
    pub port: u16,

    /// How payloads are delimited on the wire. Must match the server.
    #[arg(long, value_enum, default_value_t = Framing::Raw)]
    pub framing: Framing,
}
