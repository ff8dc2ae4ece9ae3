//! Self-delimiting JSON framing.
//!
//! A message is exactly one JSON value; no length prefix is added. The reader
//! scans input as it arrives to find where the value ends, then parses it
//! once, so the peer may keep its write side open while it waits for the
//! answer.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a single inbound message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Values larger than this are parsed on the blocking pool.
const BLOCKING_PARSE_BYTES: usize = 512 * 1024;

/// How a connection-level failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Peer went away. Ignore.
    Benign,
    /// Peer sent bytes that are not a valid message. Log and drop.
    Corrupt,
    /// Anything else. Reported as an unhandled failure for this connection.
    Unhandled,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("peer closed the connection before sending a message")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("message truncated after {0} bytes")]
    Truncated(usize),

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("no complete message within {0:?}")]
    TimedOut(Duration),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CodecError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CodecError::Closed | CodecError::TimedOut(_) => ErrorClass::Benign,
            CodecError::Transport(e) => match e.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => ErrorClass::Benign,
                _ => ErrorClass::Unhandled,
            },
            CodecError::Malformed(_) | CodecError::Truncated(_) | CodecError::TooLarge(_) => {
                ErrorClass::Corrupt
            }
            CodecError::Encode(_) => ErrorClass::Unhandled,
        }
    }
}

/// Finds the end of the first top-level JSON value, one byte at a time.
///
/// Objects, arrays and strings are delimited by their closing byte. Anything
/// else at the top level (a bare number, or garbage) is handed to the parser
/// as-is on every read.
#[derive(Debug, Default)]
struct FrameScanner {
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    bare: bool,
}

impl FrameScanner {
    /// Continue scanning `buf`; returns the value's end offset once known.
    fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        if self.bare {
            return Some(buf.len());
        }
        while self.scanned < buf.len() {
            let byte = buf[self.scanned];
            self.scanned += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(self.scanned);
                    }
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(self.scanned);
                    }
                }
                b' ' | b'\t' | b'\n' | b'\r' => {}
                _ if self.depth > 0 => {}
                _ => {
                    self.bare = true;
                    return Some(buf.len());
                }
            }
        }
        None
    }
}

/// Read exactly one JSON value of type `T` from `reader`, refusing to buffer
/// more than `max_bytes`.
///
/// Bytes after the value are left unread in the socket buffer or discarded
/// if they arrived in the same chunk.
pub async fn read_message<T, R>(reader: &mut R, max_bytes: usize) -> Result<T, CodecError>
where
    T: DeserializeOwned + Send + 'static,
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut scanner = FrameScanner::default();

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.iter().all(u8::is_ascii_whitespace) {
                return Err(CodecError::Closed);
            }
            if scanner.bare {
                return match parse_prefix(&buf) {
                    Some(Err(e)) if !e.is_eof() => Err(CodecError::Malformed(e)),
                    Some(Ok(message)) => Ok(message),
                    _ => Err(CodecError::Truncated(buf.len())),
                };
            }
            return Err(CodecError::Truncated(buf.len()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > max_bytes {
            return Err(CodecError::TooLarge(max_bytes));
        }

        let Some(end) = scanner.scan(&buf) else {
            continue;
        };
        if scanner.bare {
            match parse_prefix(&buf) {
                Some(Ok(message)) => return Ok(message),
                Some(Err(e)) if !e.is_eof() => return Err(CodecError::Malformed(e)),
                _ => continue,
            }
        }

        buf.truncate(end);
        return parse_frame(buf).await;
    }
}

fn parse_prefix<T: DeserializeOwned>(buf: &[u8]) -> Option<serde_json::Result<T>> {
    serde_json::Deserializer::from_slice(buf).into_iter::<T>().next()
}

async fn parse_frame<T>(frame: Vec<u8>) -> Result<T, CodecError>
where
    T: DeserializeOwned + Send + 'static,
{
    if frame.len() < BLOCKING_PARSE_BYTES {
        return serde_json::from_slice(&frame).map_err(CodecError::Malformed);
    }
    tokio::task::spawn_blocking(move || serde_json::from_slice(&frame))
        .await
        .map_err(|e| CodecError::Transport(io::Error::other(e)))?
        .map_err(CodecError::Malformed)
}

/// Write one JSON value and shut down the write side.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), CodecError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(message).map_err(CodecError::Encode)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::envelope::CallEnvelope;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_reads_one_value() {
        let mut input: &[u8] = br#"  {"operation":"clear_cache"}"#;
        let envelope: CallEnvelope = read_message(&mut input, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap();
        assert_eq!(envelope.operation, "clear_cache");
    }

    #[tokio::test]
    async fn test_value_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(4);
        let writer = tokio::spawn(async move {
            for part in [&b"{\"operation\":"[..], &b"\"evict\",\"url\""[..], &b":\"http://x/a\"}"[..]] {
                client.write_all(part).await.unwrap();
                tokio::task::yield_now().await;
            }
            // Keep the write side open: the reader must not wait for EOF.
            client
        });

        let envelope: CallEnvelope = read_message(&mut server, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap();
        assert_eq!(envelope.operation, "evict");
        assert_eq!(envelope.arguments["url"], json!("http://x/a"));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_stream_is_benign() {
        let mut input: &[u8] = b" \n";
        let err = read_message::<Value, _>(&mut input, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap_err();
        assert!(matches!(err, CodecError::Closed));
        assert_eq!(err.class(), ErrorClass::Benign);
    }

    #[tokio::test]
    async fn test_garbage_is_corrupt() {
        let mut input: &[u8] = b"\x80\x03garbage\x00";
        let err = read_message::<CallEnvelope, _>(&mut input, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
        assert_eq!(err.class(), ErrorClass::Corrupt);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_corrupt() {
        let mut input: &[u8] = br#"{"no_operation": true}"#;
        let err = read_message::<CallEnvelope, _>(&mut input, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Corrupt);
    }

    #[tokio::test]
    async fn test_truncated_value_is_corrupt() {
        let mut input: &[u8] = br#"{"operation": "requ"#;
        let err = read_message::<CallEnvelope, _>(&mut input, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap_err();
        assert!(matches!(err, CodecError::Truncated(19)));
        assert_eq!(err.class(), ErrorClass::Corrupt);
    }

    #[test]
    fn test_transport_classification() {
        let reset = CodecError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(reset.class(), ErrorClass::Benign);
        let pipe = CodecError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(pipe.class(), ErrorClass::Benign);
        let denied = CodecError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.class(), ErrorClass::Unhandled);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let message = json!({"status": "ok", "value": [1, 2, 3]});
        write_message(&mut client, &message).await.unwrap();

        let read: Value = read_message(&mut server, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap();
        assert_eq!(read, message);
    }
    #[tokio::test]
    async fn test_braces_inside_strings_do_not_end_the_value() {
        let mut input: &[u8] = br#"{"operation":"evict","url":"http://x/}\"{["} trailing"#;
        let envelope: CallEnvelope = read_message(&mut input, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap();
        assert_eq!(envelope.arguments["url"], json!("http://x/}\"{["));
    }

    #[test]
    fn test_scanner_resumes_where_it_stopped() {
        let mut scanner = FrameScanner::default();
        let mut buf = br#"{"a": [1, 2"#.to_vec();
        assert_eq!(scanner.scan(&buf), None);
        assert_eq!(scanner.scanned, buf.len());

        buf.extend_from_slice(br#"]} {"#);
        assert_eq!(scanner.scan(&buf), Some(13));
    }

    #[tokio::test]
    async fn test_multi_megabyte_value_with_open_writer() {
        let payload = "x".repeat(6 * 1024 * 1024);
        let message = json!({"status": "ok", "value": payload});
        let bytes = serde_json::to_vec(&message).unwrap();

        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let writer = tokio::spawn(async move {
            client.write_all(&bytes).await.unwrap();
            client
        });

        let read: Value = read_message(&mut server, DEFAULT_MAX_MESSAGE_BYTES).await.unwrap();
        assert_eq!(read["value"].as_str().map(str::len), Some(6 * 1024 * 1024));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_limit_is_enforced() {
        let body = format!(r#"{{"operation":"evict","url":"{}"}}"#, "a".repeat(4096));
        let mut input: &[u8] = body.as_bytes();
        let err = read_message::<CallEnvelope, _>(&mut input, 1024).await.unwrap_err();
        assert!(matches!(err, CodecError::TooLarge(1024)));
        assert_eq!(err.class(), ErrorClass::Corrupt);
    }
}
