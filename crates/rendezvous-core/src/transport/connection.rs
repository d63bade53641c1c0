//! One TCP stream carrying newline-delimited JSON frames.
//!
//! ```text
//! <UTF-8 JSON object>\n
//! ```

use crate::config::TransportConfig;
use crate::protocol::{decode_as, encode, Payload, TypedMessage};
use crate::{RendezvousError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;

/// Read one line-terminated frame.
///
/// Returns `None` on clean EOF (peer closed connection). The line terminator
/// is stripped. A final line without a terminator is still returned.
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let limit = TransportConfig::MAX_FRAME_BYTES;
    let mut line = String::new();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_line(&mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && line.len() > limit {
        return Err(RendezvousError::FrameTooLarge { limit });
    }

    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// Write one frame followed by a line terminator, then flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// A framed connection, used for exactly one request/response exchange.
///
/// Either side may close independently; `close` is idempotent and never fails.
#[derive(Debug)]
pub struct Connection {
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
    shutdown: Option<watch::Receiver<bool>>,
    write_failed: bool,
}

impl Connection {
    /// Wrap an outbound stream. Reads give up after `read_timeout`.
    pub fn outbound(stream: TcpStream, read_timeout: Duration) -> Result<Self> {
        Self::new(stream, Some(read_timeout), None)
    }

    /// Wrap an accepted stream. Waiting for the request ends early once the
    /// server signals shutdown; there is no read timeout.
    pub(crate) fn accepted(stream: TcpStream, shutdown: watch::Receiver<bool>) -> Result<Self> {
        Self::new(stream, None, Some(shutdown))
    }

    fn new(
        stream: TcpStream,
        read_timeout: Option<Duration>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        debug!("Connection established with {}", peer);

        Ok(Self {
            reader: Some(BufReader::new(reader)),
            writer: Some(writer),
            peer,
            read_timeout,
            shutdown,
            write_failed: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }

    /// Encode and send one message.
    pub async fn send<M: Payload>(&mut self, message: &M) -> Result<()> {
        if self.write_failed {
            return Err(RendezvousError::Connection {
                message: format!("Earlier write to {} failed", self.peer),
                source: None,
            });
        }
        let frame = encode(message)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or(RendezvousError::ConnectionClosed)?;

        debug!("Sending to {}: {}", self.peer, frame);
        if let Err(e) = write_frame(writer, &frame).await {
            self.write_failed = true;
            let source = match e {
                RendezvousError::Connection { source, .. } => source,
                _ => None,
            };
            return Err(RendezvousError::Connection {
                message: format!("Error while sending to {}", self.peer),
                source,
            });
        }
        Ok(())
    }

    /// Read one frame without decoding it.
    pub async fn receive_raw(&mut self) -> Result<String> {
        let peer = self.peer;
        let read_timeout = self.read_timeout;
        let reader = self
            .reader
            .as_mut()
            .ok_or(RendezvousError::ConnectionClosed)?;

        let read = async {
            match read_timeout {
                Some(limit) => tokio::time::timeout(limit, read_frame(reader))
                    .await
                    .map_err(|_| RendezvousError::ReadTimeout(limit))?,
                None => read_frame(reader).await,
            }
        };

        let frame = match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                frame = read => frame?,
                _ = wait_for_stop(shutdown) => {
                    debug!("Server stopping, dropping idle connection from {}", peer);
                    return Err(RendezvousError::ConnectionClosed);
                }
            },
            None => read.await?,
        };

        let frame = frame.ok_or(RendezvousError::ConnectionClosed)?;
        debug!("Received from {}: {}", peer, frame);
        Ok(frame)
    }

    /// Read one frame and decode it as `M`.
    pub async fn receive<M: TypedMessage>(&mut self) -> Result<M> {
        let frame = self.receive_raw().await?;
        decode_as(&frame).map_err(|e| RendezvousError::InvalidFrame {
            peer: self.peer.to_string(),
            source: Box::new(e),
        })
    }

    /// Release the stream. Safe to call more than once and from error paths.
    pub async fn close(&mut self) {
        self.reader.take();
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error closing connection with {}: {}", self.peer, e);
            }
            debug!("Connection closed with {}", self.peer);
        }
    }
}

async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the server is gone, which counts as stopping.
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
