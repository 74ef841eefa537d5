//! Per-client connection handling.
//!
//! One request per newline, tokens separated by ASCII whitespace. The reader
//! half accumulates bytes until a `\n` boundary (a single read may carry
//! several requests, or a request may span reads), validates the command
//! against the registry, and hands a payload to the directory. A writer task
//! drains the connection's reply channel so answers produced later (blocking
//! pops, collectors) still reach the client.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::directory::DirectoryHandle;
use crate::payload::{ClientHandle, Payload};
use crate::registry::{self, Category};

/// Request defects caught before routing.
#[derive(Error, Debug, PartialEq)]
pub enum RequestError {
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Missing key")]
    MissingKey,
    #[error("Invalid number of args")]
    InvalidArgCount,
    #[error("invalid UTF-8 in request")]
    InvalidUtf8,
}

impl RequestError {
    pub fn as_wire(&self) -> &'static str {
        match self {
            RequestError::UnknownCommand => "Unknown command",
            RequestError::MissingKey => "Missing key",
            RequestError::InvalidArgCount => "Invalid number of args",
            RequestError::InvalidUtf8 => "error",
        }
    }
}

pub async fn handle_connection(stream: TcpStream, directory: DirectoryHandle) {
    let peer = stream.peer_addr().ok();
    let (mut reader, mut writer) = stream.into_split();
    let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(mut response) = replies.recv().await {
            response.push('\n');
            if writer.write_all(response.as_bytes()).await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut buffer = BytesMut::with_capacity(1024);

    loop {
        match reader.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(?peer, %error, "read failed");
                break;
            }
        }

        while let Some(boundary) = buffer.iter().position(|byte| *byte == b'\n') {
            let line = buffer.split_to(boundary + 1);

            match parse_request(&line[..boundary], &reply_tx) {
                Ok(Some(payload)) => {
                    let _ = directory.send(payload);
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(?peer, %error, "rejected request");
                    let _ = reply_tx.send(error.as_wire().to_string());
                }
            }
        }
    }

    debug!(?peer, "client disconnected");
}

/// Parses one raw line into a routable payload. Blank lines are skipped.
/// Keyspace commands carry no key token of their own; everything after the
/// command is arguments and the key slot gets the `keys` sentinel.
fn parse_request(
    line: &[u8],
    reply_tx: &ClientHandle,
) -> Result<Option<Payload>, RequestError> {
    let line = str::from_utf8(line).map_err(|_| RequestError::InvalidUtf8)?;

    let mut tokens = line.split_ascii_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(None);
    };

    let command = first.to_ascii_lowercase();
    let Some(spec) = registry::lookup(&command) else {
        return Err(RequestError::UnknownCommand);
    };

    let mut rest = tokens.map(str::to_string);
    let (key, args) = if spec.category == Category::Keys {
        ("keys".to_string(), rest.collect::<Vec<String>>())
    } else {
        let Some(key) = rest.next() else {
            return Err(RequestError::MissingKey);
        };
        (key, rest.collect())
    };

    if !spec.arity.accepts(args.len()) {
        return Err(RequestError::InvalidArgCount);
    }

    Ok(Some(Payload {
        command,
        key,
        args,
        to_client: Some(reply_tx.clone()),
        to_node: None,
    }))
}
