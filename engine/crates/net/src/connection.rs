use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::telnet::{LineBuffer, DEFAULT_MAX_LINE_LEN};

const READ_CHUNK: usize = 4096;

/// Reads complete lines from a byte stream.
///
/// `read_line` is cancel-safe: decoded lines are queued before the future
/// returns, so dropping it inside `select!` never loses input.
pub struct LineReader {
    inner: Box<dyn AsyncRead + Unpin + Send>,
    buffer: LineBuffer,
    pending: VecDeque<String>,
    eof: bool,
}

impl LineReader {
    pub fn new(inner: Box<dyn AsyncRead + Unpin + Send>, max_line_len: usize) -> Self {
        Self {
            inner,
            buffer: LineBuffer::with_max_len(max_line_len),
            pending: VecDeque::new(),
            eof: false,
        }
    }

    /// Next line, or `None` once the peer has closed the stream.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                self.pending.extend(self.buffer.finish());
            } else {
                self.pending.extend(self.buffer.feed(&chunk[..n]));
            }
        }
    }
}

/// A line-oriented Telnet connection.
pub struct Connection {
    reader: LineReader,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    peer: String,
}

impl Connection {
    pub fn new(
        reader: Box<dyn AsyncRead + Unpin + Send>,
        writer: Box<dyn AsyncWrite + Unpin + Send>,
        peer: impl Into<String>,
        max_line_len: usize,
    ) -> Self {
        Self {
            reader: LineReader::new(reader, max_line_len),
            writer,
            peer: peer.into(),
        }
    }

    pub fn from_tcp(stream: TcpStream, max_line_len: usize) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (r, w) = stream.into_split();
        Self::new(Box::new(r), Box::new(w), peer, max_line_len)
    }

    /// Wrap any duplex stream (in-memory pipes in tests).
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (r, w) = tokio::io::split(stream);
        Self::new(Box::new(r), Box::new(w), peer, DEFAULT_MAX_LINE_LEN)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.reader.read_line().await
    }

    /// Write text as-is, converting bare `\n` to `\r\n`.
    pub async fn write_text(&mut self, text: &str) -> io::Result<()> {
        let text = text.replace("\r\n", "\n").replace('\n', "\r\n");
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Write text followed by a line break.
    pub async fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.write_text(&format!("{text}\n")).await
    }

    /// Write a prompt; no line break so the cursor stays on it.
    pub async fn write_prompt(&mut self, prompt: &str) -> io::Result<()> {
        self.write_text(prompt).await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}
