use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    config::Framing,
    message::{Inbound, PayloadReader, write_text},
};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

pub async fn run(args: ClientArgs) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    let Some(name) = prompt_name(&mut stdin, &mut input).await? else {
        return Ok(());
    };

    let stream = establish_connection(&args).await?;
    let server = stream.peer_addr()?;
    let (reader, mut writer) = stream.into_split();

    write_text(&mut writer, args.framing, &name).await?;
    let mut receiver = tokio::spawn(receive_loop(reader, args.framing, server));

    let result = run_client_loop(
        &mut stdin,
        &mut input,
        &mut writer,
        &mut receiver,
        args.framing,
    )
    .await;

    receiver.abort();
    shutdown_connection(&mut writer).await;

    result
}

/// Reads stdin until a non-empty line arrives. `None` means stdin closed first.
async fn prompt_name(
    stdin: &mut BufReader<Stdin>,
    input: &mut String,
) -> Result<Option<String>> {
    write_stderr("enter your name:").await?;
    loop {
        input.clear();
        if stdin.read_line(input).await? == 0 {
            return Ok(None);
        }

        let name = input.trim_end_matches(LINE_ENDINGS);
        if !name.is_empty() {
            return Ok(Some(name.to_string()));
        }
    }
}

async fn establish_connection(args: &ClientArgs) -> Result<TcpStream> {
    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .await
        .with_context(|| {
            format!(
                "could not reach the server at {}:{}; is it running?",
                args.host, args.port
            )
        })?;

    info!("connected to {}:{}", args.host, args.port);
    Ok(stream)
}

async fn run_client_loop(
    stdin: &mut BufReader<Stdin>,
    input: &mut String,
    writer: &mut OwnedWriteHalf,
    receiver: &mut JoinHandle<io::Result<()>>,
    framing: Framing,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, writer, framing).await? {
                    break;
                }
            }
            received = &mut *receiver => {
                received.context("receiver task failed")??;
                break;
            }
        }
    }
    Ok(())
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut OwnedWriteHalf,
    framing: Framing,
) -> Result<bool> {
    if bytes_read? == 0 {
        return Ok(false);
    }

    let text = input.trim_end_matches(LINE_ENDINGS);
    if text.is_empty() {
        return Ok(true);
    }

    write_text(writer, framing, text).await?;
    Ok(true)
}

async fn receive_loop(
    reader: OwnedReadHalf,
    framing: Framing,
    server: SocketAddr,
) -> io::Result<()> {
    let mut reader = PayloadReader::new(reader, framing);

    while let Some(payload) = reader.next_payload().await? {
        match payload {
            Inbound::Text(text) if !text.is_empty() => {
                write_stdout(&format!("received({server}): {text}")).await?;
            }
            Inbound::Text(_) => {}
            Inbound::Malformed(len) => warn!(len, "server sent bytes that are not valid utf-8"),
        }
    }

    write_stdout("*** server closed the connection").await
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
