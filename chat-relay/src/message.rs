use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::{Framing, RECEIVE_BUFFER_SIZE};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// One unit of inbound data, as cut by the connection's [`Framing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// Bytes that did not decode as UTF-8.
    Malformed(usize),
}

/// Cuts a byte stream into payloads.
///
/// The buffer is exactly [`RECEIVE_BUFFER_SIZE`] bytes so that in raw framing
/// a single socket read never yields more than one buffer's worth of text.
/// In line framing the pending line is capped at the same size.
pub struct PayloadReader<R> {
    inner: BufReader<R>,
    framing: Framing,
    line: Vec<u8>,
}

impl<R> PayloadReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            inner: BufReader::with_capacity(RECEIVE_BUFFER_SIZE, reader),
            framing,
            line: Vec::with_capacity(RECEIVE_BUFFER_SIZE),
        }
    }

    /// Returns `Ok(None)` once the peer has closed its side.
    pub async fn next_payload(&mut self) -> io::Result<Option<Inbound>> {
        match self.framing {
            Framing::Raw => self.next_chunk().await,
            Framing::Lines => self.next_line().await,
        }
    }

    async fn next_chunk(&mut self) -> io::Result<Option<Inbound>> {
        let available = self.inner.fill_buf().await?;
        if available.is_empty() {
            return Ok(None);
        }

        let bytes = available.to_vec();
        self.inner.consume(bytes.len());
        Ok(Some(decode(bytes)))
    }

    /// Reads up to the next `\n`, keeping at most [`RECEIVE_BUFFER_SIZE`]
    /// bytes of the line. The remainder of an overlong line is consumed and
    /// dropped without being stored.
    async fn next_line(&mut self) -> io::Result<Option<Inbound>> {
        self.line.clear();
        let mut read_any = false;
        let mut cut = false;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            read_any = true;

            let (segment, complete) = match available.iter().position(|&byte| byte == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let room = RECEIVE_BUFFER_SIZE - self.line.len();
            let kept = segment.len().min(room);
            cut |= kept < segment.len();
            self.line.extend_from_slice(&segment[..kept]);

            let consumed = segment.len();
            self.inner.consume(consumed);
            if complete {
                break;
            }
        }

        if !read_any {
            return Ok(None);
        }
        Ok(Some(decode_line(&self.line, cut)))
    }
}

fn decode(bytes: Vec<u8>) -> Inbound {
    match String::from_utf8(bytes) {
        Ok(text) => Inbound::Text(text),
        Err(err) => Inbound::Malformed(err.as_bytes().len()),
    }
}

/// Strips the line terminator. When the line was `cut` at the buffer limit,
/// a character split by the cut is dropped instead of failing the decode.
fn decode_line(mut bytes: &[u8], cut: bool) -> Inbound {
    while let [rest @ .., b'\n' | b'\r'] = bytes {
        bytes = rest;
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Inbound::Text(text.to_owned()),
        Err(err) if cut && err.error_len().is_none() => {
            decode(bytes[..err.valid_up_to()].to_vec())
        }
        Err(_) => Inbound::Malformed(bytes.len()),
    }
}

/// Writes one outbound message and flushes so peers see it promptly.
pub async fn write_text<W>(writer: &mut W, framing: Framing, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::Raw => writer.write_all(text.as_bytes()).await?,
        Framing::Lines => {
            let mut encoded = text.trim_end_matches(LINE_ENDINGS).as_bytes().to_vec();
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
        }
    }
    writer.flush().await
}
