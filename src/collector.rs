//! Transient aggregation actor for multi-key reads.
//!
//! The directory spawns one collector per `mget`. The collector asks the
//! directory for every key (so absent-key defaults and type gating apply as
//! usual), gathers the answers, and replies once with the values in the
//! original key order rather than arrival order.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::directory::DirectoryHandle;
use crate::payload::{NodeMessage, Payload, Reply};

/// Upstream actors are expected to answer well within this bound; keys still
/// unanswered at the deadline render as `nil`.
const COLLECT_WAIT: Duration = Duration::from_secs(2);

/// Spawns a collector for `keys` that answers `origin` once all responses
/// (or the deadline) are in.
pub fn spawn(keys: Vec<String>, origin: Payload, directory: DirectoryHandle) {
    tokio::spawn(collect(keys, origin, directory));
}

async fn collect(keys: Vec<String>, origin: Payload, directory: DirectoryHandle) {
    let (reply_tx, mut replies) = mpsc::unbounded_channel();

    for key in &keys {
        let request = Payload {
            command: "get".to_string(),
            key: key.clone(),
            args: Vec::new(),
            to_client: None,
            to_node: Some(reply_tx.clone()),
        };
        let _ = directory.send(request);
    }
    drop(reply_tx);

    let deadline = Instant::now() + COLLECT_WAIT;
    let mut values: HashMap<String, Reply> = HashMap::new();
    let mut received = 0;

    while received < keys.len() {
        match timeout_at(deadline, replies.recv()).await {
            Ok(Some(NodeMessage::Response(response))) => {
                values.insert(response.key, response.value);
                received += 1;
            }
            Ok(Some(other)) => debug!(?other, "ignoring message"),
            Ok(None) => break,
            Err(_) => {
                warn!(expected = keys.len(), received, "collector deadline hit");
                break;
            }
        }
    }

    let ordered = keys
        .iter()
        .map(|key| {
            values
                .get(key)
                .and_then(Reply::render)
                .unwrap_or_else(|| "nil".to_string())
        })
        .collect();

    origin.deliver(Reply::Many(ordered));
}
