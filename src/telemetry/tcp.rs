//! # TCP Telemetry Source
//!
//! Reads simulator variables from a bridge process over a line protocol.
//!
//! ## Protocol
//!
//! | Direction | Line | Meaning |
//! |-----------|------|---------|
//! | request | `GET <seq> <KEY>` | read variable `KEY` |
//! | response | `<seq> <value>` | current value |
//! | response | `<seq> ERR <message>` | variable unavailable |
//!
//! `<seq>` counts requests on the connection. A reply whose sequence number
//! is older than the current request belongs to a read that already timed
//! out and is dropped.

use async_trait::async_trait;
use std::io;
use tokio::io::{
    split, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::source::TelemetrySource;
use crate::error::{RecorderError, Result};

/// Line-protocol client for a simulator telemetry bridge
pub struct TcpSource<T> {
    reader: BufReader<ReadHalf<T>>,
    writer: WriteHalf<T>,
    /// Bytes of a response line not yet terminated by `\n`
    pending: Vec<u8>,
    /// Request bytes not yet accepted by the stream
    outbox: Vec<u8>,
    next_seq: u64,
}

impl<T> std::fmt::Debug for TcpSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSource")
            .field("next_seq", &self.next_seq)
            .finish_non_exhaustive()
    }
}

impl TcpSource<TcpStream> {
    /// Connect to a telemetry bridge
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Source`] if the connection cannot be made
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_recorder::telemetry::TcpSource;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let source = TcpSource::connect("127.0.0.1:5077").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| RecorderError::Source(format!("Failed to connect to {}: {}", address, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| RecorderError::Source(format!("Failed to configure {}: {}", address, e)))?;

        info!("Connected to telemetry bridge at {}", address);
        Ok(Self::new(stream))
    }
}

impl<T: AsyncRead + AsyncWrite> TcpSource<T> {
    /// Wrap an already-open byte stream
    pub fn new(stream: T) -> Self {
        let (read_half, writer) = split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer,
            pending: Vec::new(),
            outbox: Vec::new(),
            next_seq: 0,
        }
    }

    /// Write out everything queued in `outbox`.
    ///
    /// Bytes leave the queue only once the stream has taken them, so a
    /// request cut off by a dropped future is completed by the next call
    /// instead of being merged with the next request.
    async fn send_outbox(&mut self) -> io::Result<()> {
        while !self.outbox.is_empty() {
            let written = self.writer.write(&self.outbox).await?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "telemetry bridge stopped accepting requests",
                ));
            }
            self.outbox.drain(..written);
        }
        self.writer.flush().await
    }

    /// Receive the next complete line.
    ///
    /// Partial data stays in `pending` if the future is dropped, so the next
    /// call resumes the same line.
    async fn next_line(&mut self) -> io::Result<String> {
        loop {
            if self.pending.last() == Some(&b'\n') {
                let line = std::mem::take(&mut self.pending);
                return String::from_utf8(line)
                    .map(|s| s.trim_end().to_string())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
            }

            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "telemetry bridge closed the connection",
                ));
            }
        }
    }
}

/// Split a response line into its sequence number and payload.
fn parse_response(line: &str) -> io::Result<(u64, &str)> {
    let (seq, payload) = line.split_once(' ').unwrap_or((line, ""));
    let seq = seq.parse::<u64>().map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("malformed response: {:?}", line))
    })?;
    Ok((seq, payload.trim()))
}

fn parse_value(payload: &str) -> io::Result<f64> {
    if let Some(message) = payload.strip_prefix("ERR") {
        return Err(io::Error::new(io::ErrorKind::NotFound, message.trim().to_string()));
    }
    payload.parse::<f64>().map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("not a number: {:?}", payload))
    })
}

#[async_trait]
impl<T> TelemetrySource for TcpSource<T>
where
    T: AsyncRead + AsyncWrite + Send,
{
    async fn read(&mut self, key: &str) -> io::Result<f64> {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.outbox
            .extend_from_slice(format!("GET {} {}\n", seq, key).as_bytes());
        self.send_outbox().await?;

        loop {
            let line = self.next_line().await?;
            let (reply_seq, payload) = parse_response(&line)?;

            if reply_seq < seq {
                debug!("Dropping stale reply {} while waiting for {}", reply_seq, seq);
                continue;
            }
            if reply_seq > seq {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("reply {} ahead of request {}", reply_seq, seq),
                ));
            }
            return parse_value(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, BufReader as TokioBufReader, DuplexStream};

    /// Answers requests with a fixed function of the key
    async fn serve(stream: DuplexStream, answer: fn(u64, &str) -> Option<String>) {
        let (read_half, mut write_half) = split(stream);
        let mut lines = TokioBufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut parts = line.split_whitespace();
            assert_eq!(parts.next(), Some("GET"));
            let seq: u64 = parts.next().unwrap().parse().unwrap();
            let key = parts.next().unwrap();
            if let Some(reply) = answer(seq, key) {
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_read_value() {
        let (client, server) = duplex(1024);
        tokio::spawn(serve(server, |seq, key| match key {
            "AIRSPEED_TRUE" => Some(format!("{} 142.5\n", seq)),
            _ => Some(format!("{} ERR unknown\n", seq)),
        }));

        let mut source = TcpSource::new(client);
        assert_eq!(source.read("AIRSPEED_TRUE").await.unwrap(), 142.5);
        assert_eq!(source.read("AIRSPEED_TRUE").await.unwrap(), 142.5);
    }

    #[tokio::test]
    async fn test_err_reply_is_error() {
        let (client, server) = duplex(1024);
        tokio::spawn(serve(server, |seq, _| Some(format!("{} ERR unknown variable\n", seq))));

        let mut source = TcpSource::new(client);
        let err = source.read("BOGUS").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("unknown variable"));
    }

    #[tokio::test]
    async fn test_stale_reply_is_skipped() {
        let (client, server) = duplex(1024);
        // Request 0 is never answered until request 1 arrives, then both are.
        tokio::spawn(serve(server, |seq, _| match seq {
            0 => None,
            _ => Some(format!("{} 1.0\n{} 2.0\n", seq - 1, seq)),
        }));

        let mut source = TcpSource::new(client);
        let first = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            source.read("G_FORCE"),
        )
        .await;
        assert!(first.is_err(), "first read should time out");

        assert_eq!(source.read("G_FORCE").await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_interrupted_request_is_completed_before_next() {
        // Room for only part of one request until the bridge starts reading
        let (client, server) = duplex(8);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            serve(server, |seq, _| Some(format!("{} {}.0\n", seq, seq + 1))).await;
        });

        let mut source = TcpSource::new(client);
        let first = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            source.read("G_FORCE"),
        )
        .await;
        assert!(first.is_err(), "first read should time out");
        assert!(!source.outbox.is_empty());

        let second = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            source.read("G_FORCE"),
        )
        .await
        .expect("bridge should answer the second request");
        assert_eq!(second.unwrap(), 2.0);
        assert!(source.outbox.is_empty());
    }

    #[tokio::test]
    async fn test_closed_connection_is_eof() {
        let (client, server) = duplex(1024);
        drop(server);

        let mut source = TcpSource::new(client);
        assert!(source.read("G_FORCE").await.is_err());
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response("7 -350.25").unwrap(), (7, "-350.25"));
        assert_eq!(parse_response("3 ERR nope").unwrap(), (3, "ERR nope"));
        assert!(parse_response("x 1.0").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5").unwrap(), 1.5);
        assert!(parse_value("ERR timeout").is_err());
        assert!(parse_value("abc").is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_source_error() {
        // Port 1 on localhost is essentially never listening
        let result = TcpSource::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(RecorderError::Source(_))));
    }
}
