//! The SET value actor.
//!
//! Set algebra across keys (`sdiff`, `sinter`, `sunion` and the `*store`
//! variants) needs the members of other keys. The actor fans `smembers`
//! requests out through the directory and joins on the answers with a bounded
//! wait, without draining its own mailbox in between, so per-key
//! serialization holds at the cost of head-of-line blocking.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::seq::IteratorRandom;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::actors::{CommandError, scan};
use crate::directory::DirectoryHandle;
use crate::payload::{NodeMessage, Payload, Reply};

/// Upper bound on the fan-out join.
const FAN_OUT_WAIT: Duration = Duration::from_secs(2);

/// Value actor for a single set key.
pub struct SetActor {
    key: String,
    members: HashSet<String>,
    directory: DirectoryHandle,
}

fn is_algebra(command: &str) -> bool {
    matches!(
        command,
        "sdiff" | "sinter" | "sunion" | "sdiffstore" | "sinterstore" | "sunionstore"
    )
}

/// Members carried by a fan-out response. Anything that is not a sequence
/// (a type-mismatch message, a missing-key default) counts as empty.
fn member_set(value: Reply) -> HashSet<String> {
    match value {
        Reply::Many(items) => items.into_iter().collect(),
        _ => HashSet::new(),
    }
}

impl SetActor {
    pub fn new(key: &str, directory: DirectoryHandle) -> Self {
        SetActor {
            key: key.to_string(),
            members: HashSet::new(),
            directory,
        }
    }

    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<NodeMessage>) {
        while let Some(message) = mailbox.recv().await {
            match message {
                NodeMessage::Del => break,
                NodeMessage::Request(payload) => {
                    let result = if is_algebra(&payload.command) {
                        self.algebra(&payload).await
                    } else {
                        self.execute(&payload)
                    };

                    let reply = match result {
                        Ok(reply) => reply,
                        Err(error) => {
                            warn!(key = %self.key, command = %payload.command, %error, "command failed");
                            Reply::Text(error.as_wire().to_string())
                        }
                    };
                    payload.deliver(reply);
                }
                other => debug!(key = %self.key, ?other, "ignoring message"),
            }
        }
    }

    fn execute(&mut self, payload: &Payload) -> Result<Reply, CommandError> {
        let args = &payload.args;

        match payload.command.as_str() {
            "sadd" => {
                let added = args
                    .iter()
                    .filter(|member| self.members.insert((*member).clone()))
                    .count();
                Ok(Reply::Int(added as i64))
            }
            "srem" => {
                let removed = args
                    .iter()
                    .filter(|member| self.members.remove(*member))
                    .count();
                Ok(Reply::Int(removed as i64))
            }
            "scard" => Ok(Reply::Int(self.members.len() as i64)),
            "sismember" => Ok(Reply::Bool(self.members.contains(&args[0]))),
            "smembers" => Ok(Reply::Many(self.members.iter().cloned().collect())),
            "srandmember" => Ok(self
                .members
                .iter()
                .choose(&mut rand::rng())
                .cloned()
                .map_or(Reply::Nil, Reply::Text)),
            "spop" => {
                let Some(member) = self.members.iter().choose(&mut rand::rng()).cloned() else {
                    return Ok(Reply::Nil);
                };
                self.members.remove(&member);
                Ok(Reply::Text(member))
            }
            "sscan" => scan::scan_items(self.members.iter().cloned().collect(), args),
            "smove" => {
                let (destination, member) = (&args[0], &args[1]);
                if self.members.remove(member) {
                    let add = Payload::internal("sadd", destination, vec![member.clone()]);
                    let _ = self.directory.send(add);
                    Ok(Reply::Bool(true))
                } else {
                    Ok(Reply::Bool(false))
                }
            }
            other => Err(CommandError::UnsupportedCommand(other.to_string())),
        }
    }

    /// Multi-key set algebra. The `*store` variants reduce over the argument
    /// keys and replace this actor's members with the result; the plain
    /// variants fold this actor's own members in as the leftmost operand and
    /// return the sequence.
    async fn algebra(&mut self, payload: &Payload) -> Result<Reply, CommandError> {
        let stores = payload.command.ends_with("store");
        let operator = payload.command.trim_end_matches("store");

        let collected = self.fetch_members(&payload.args).await?;

        let mut operands: Vec<HashSet<String>> = Vec::with_capacity(payload.args.len() + 1);
        if !stores {
            operands.push(self.members.clone());
        }
        for key in &payload.args {
            operands.push(collected.get(key).cloned().unwrap_or_default());
        }

        let mut operands = operands.into_iter();
        let Some(mut result) = operands.next() else {
            return Ok(Reply::Many(Vec::new()));
        };
        for operand in operands {
            result = match operator {
                "sdiff" => &result - &operand,
                "sinter" => &result & &operand,
                _ => &result | &operand,
            };
        }

        if stores {
            self.members = result;
            Ok(Reply::Int(self.members.len() as i64))
        } else {
            Ok(Reply::Many(result.into_iter().collect()))
        }
    }

    /// Requests `smembers` from every named key through the directory and
    /// joins on the answers within [`FAN_OUT_WAIT`].
    async fn fetch_members(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, HashSet<String>>, CommandError> {
        let (reply_tx, mut replies) = mpsc::unbounded_channel();
        let mut pending: HashSet<String> = keys.iter().cloned().collect();

        for key in &pending {
            let request = Payload {
                command: "smembers".to_string(),
                key: key.clone(),
                args: Vec::new(),
                to_client: None,
                to_node: Some(reply_tx.clone()),
            };
            let _ = self.directory.send(request);
        }
        drop(reply_tx);

        let deadline = Instant::now() + FAN_OUT_WAIT;
        let mut collected = HashMap::new();

        while !pending.is_empty() {
            let message = timeout_at(deadline, replies.recv())
                .await
                .map_err(|_| CommandError::FanOutTimedOut(pending.len()))?;

            match message {
                Some(NodeMessage::Response(response)) => {
                    if pending.remove(&response.key) {
                        collected.insert(response.key, member_set(response.value));
                    }
                }
                Some(other) => debug!(key = %self.key, ?other, "ignoring message"),
                None => return Err(CommandError::FanOutTimedOut(pending.len())),
            }
        }

        Ok(collected)
    }
}
