//! The directory actor: the one routing authority.
//!
//! The directory owns the key table and nothing else touches it. It routes
//! every incoming payload, materializes value actors lazily on first write,
//! enforces per-key type discipline, and serves the whole keyspace command
//! family (expiry, rename, del, scan, mget, mset) itself.

use std::collections::HashMap;
use std::time::Duration;

use globset::Glob;
use jiff::Timestamp;
use rand::seq::IteratorRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::actors::{scan, spawn_value_actor};
use crate::collector;
use crate::payload::{NodeHandle, NodeMessage, Payload, Reply};
use crate::registry::{self, Category, ValueKind};

/// Mailbox handle of the directory. Connections and value actors route
/// payloads through this.
pub type DirectoryHandle = mpsc::UnboundedSender<Payload>;

/// A scheduled key expiry: the absolute deadline and the timer that will
/// fire it. Replacing or persisting aborts the timer.
struct Expiry {
    deadline_ms: i64,
    timer: JoinHandle<()>,
}

/// Directory record for one live key.
struct NodeEntry {
    actor: NodeHandle,
    kind: ValueKind,
    expiry: Option<Expiry>,
}

pub struct Directory {
    table: HashMap<String, NodeEntry>,
    /// Own mailbox handle, cloned into value actors and expiry timers.
    handle: DirectoryHandle,
}

fn now_ms() -> i64 {
    Timestamp::now().as_millisecond()
}

/// Spawns the process-wide directory and returns its handle.
pub fn spawn() -> DirectoryHandle {
    let (handle, mailbox) = mpsc::unbounded_channel();
    let directory = Directory {
        table: HashMap::new(),
        handle: handle.clone(),
    };
    tokio::spawn(directory.run(mailbox));
    handle
}

impl Directory {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Payload>) {
        while let Some(payload) = mailbox.recv().await {
            self.route(payload);
        }
    }

    /// Routing for one unrouted payload, in order: keyspace commands execute
    /// here; a type mismatch is rejected; an existing key forwards to its
    /// actor; a registered default answers without creating anything; and
    /// only then is a new actor materialized. `lpushx`/`rpushx` and `setnx`
    /// fall through their gates to a `0` reply.
    fn route(&mut self, payload: Payload) {
        let Some(category) = registry::category_of(&payload.command) else {
            payload.deliver(Reply::Text("Unknown command".to_string()));
            return;
        };

        if category == Category::Keys {
            self.run_keys_command(payload);
            return;
        }

        let cant_exist = matches!(payload.command.as_str(), "lpushx" | "rpushx");
        let must_exist = payload.command == "setnx";

        match self.table.get(&payload.key) {
            Some(entry) => {
                if Some(entry.kind) != category.value_kind() {
                    payload.deliver(Reply::Text(format!(
                        "Invalid command {} for {}",
                        payload.command,
                        entry.kind.as_str()
                    )));
                } else if !cant_exist {
                    let _ = entry.actor.send(NodeMessage::Request(payload));
                } else {
                    payload.deliver(Reply::Int(0));
                }
            }
            None => {
                if let Some(default) = registry::default_reply(&payload.command, &payload.args) {
                    payload.deliver(default);
                } else if !must_exist {
                    let Some(kind) = category.value_kind() else {
                        return;
                    };
                    debug!(key = %payload.key, kind = kind.as_str(), "creating value actor");
                    let actor = spawn_value_actor(kind, &payload.key, self.handle.clone());
                    self.table.insert(
                        payload.key.clone(),
                        NodeEntry {
                            actor: actor.clone(),
                            kind,
                            expiry: None,
                        },
                    );
                    let _ = actor.send(NodeMessage::Request(payload));
                } else {
                    payload.deliver(Reply::Int(0));
                }
            }
        }
    }

    /// The keyspace command family, executed directly against the table.
    fn run_keys_command(&mut self, payload: Payload) {
        let args = payload.args.clone();

        let reply = match payload.command.as_str() {
            "ping" => Reply::Text("PONG".to_string()),
            "echo" => Reply::Text(args[0].clone()),
            "exists" => Reply::Int(self.table.contains_key(&args[0]) as i64),
            "type" => self
                .table
                .get(&args[0])
                .map_or(Reply::Nil, |entry| Reply::Text(entry.kind.as_str().to_string())),
            "randomkey" => self
                .table
                .keys()
                .choose(&mut rand::rng())
                .map_or(Reply::Nil, |key| Reply::Text(key.clone())),
            "keys" => match Glob::new(&args[0]) {
                Ok(glob) => {
                    let matcher = glob.compile_matcher();
                    Reply::Many(
                        self.table
                            .keys()
                            .filter(|key| matcher.is_match(key))
                            .cloned()
                            .collect(),
                    )
                }
                Err(error) => {
                    warn!(pattern = %args[0], %error, "bad glob pattern");
                    Reply::Text("error".to_string())
                }
            },
            "scan" => match scan::scan_items(self.table.keys().cloned().collect(), &args) {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(%error, "scan failed");
                    Reply::Text(error.as_wire().to_string())
                }
            },
            "ttl" => self
                .remaining_ms(&args[0])
                .map_or_else(Reply::Int, |remaining| Reply::Int(remaining / 1000)),
            "pttl" => self
                .remaining_ms(&args[0])
                .map_or_else(Reply::Int, Reply::Int),
            "expire" | "pexpire" | "expireat" | "pexpireat" => {
                self.schedule(&payload.command, &args[0], &args[1])
            }
            "persist" => {
                let exists = match self.table.get_mut(&args[0]) {
                    Some(entry) => {
                        if let Some(expiry) = entry.expiry.take() {
                            expiry.timer.abort();
                        }
                        true
                    }
                    None => false,
                };
                Reply::Bool(exists)
            }
            "rename" => self.rename(&args[0], &args[1], false),
            "renamenx" => self.rename(&args[0], &args[1], true),
            "del" => {
                let mut removed = 0;
                for key in &args {
                    if let Some(entry) = self.table.remove(key) {
                        let _ = entry.actor.send(NodeMessage::Del);
                        if let Some(expiry) = entry.expiry {
                            expiry.timer.abort();
                        }
                        removed += 1;
                    }
                }
                Reply::Int(removed)
            }
            "mget" => {
                collector::spawn(args, payload, self.handle.clone());
                return;
            }
            "mset" => {
                for pair in args.chunks(2) {
                    let _ = self
                        .handle
                        .send(Payload::internal("set", &pair[0], vec![pair[1].clone()]));
                }
                Reply::ok()
            }
            "msetnx" => {
                let taken = args
                    .chunks(2)
                    .any(|pair| self.table.contains_key(&pair[0]));
                if taken {
                    Reply::Bool(false)
                } else {
                    for pair in args.chunks(2) {
                        let _ = self
                            .handle
                            .send(Payload::internal("set", &pair[0], vec![pair[1].clone()]));
                    }
                    Reply::Bool(true)
                }
            }
            other => {
                warn!(command = other, "unroutable keyspace command");
                Reply::Text("Unknown command".to_string())
            }
        };

        payload.deliver(reply);
    }

    /// Milliseconds until expiry: `Err(-2)` for a missing key, `Err(-1)` for
    /// a key without expiry.
    fn remaining_ms(&self, key: &str) -> Result<i64, i64> {
        match self.table.get(key) {
            None => Err(-2),
            Some(entry) => match &entry.expiry {
                None => Err(-1),
                Some(expiry) => Ok(expiry.deadline_ms - now_ms()),
            },
        }
    }

    fn schedule(&mut self, command: &str, key: &str, raw_duration: &str) -> Reply {
        let Ok(duration) = raw_duration.parse::<i64>() else {
            warn!(command, key, raw_duration, "invalid expiry duration");
            return Reply::Text("error".to_string());
        };

        let deadline_ms = match command {
            "expire" => now_ms() + duration * 1000,
            "pexpire" => now_ms() + duration,
            "expireat" => duration * 1000,
            _ => duration,
        };

        if !self.table.contains_key(key) {
            return Reply::Int(0);
        }

        self.arm_expiry(key, deadline_ms);
        Reply::Int(1)
    }

    /// Arms the single expiry timer for `key`, cancelling any previous one.
    /// Firing sends a `del` back through the directory's own mailbox.
    fn arm_expiry(&mut self, key: &str, deadline_ms: i64) {
        let Some(entry) = self.table.get_mut(key) else {
            return;
        };

        if let Some(previous) = entry.expiry.take() {
            previous.timer.abort();
        }

        let wait = (deadline_ms - now_ms()).max(0) as u64;
        let handle = self.handle.clone();
        let owned_key = key.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(wait)).await;
            let _ = handle.send(Payload::internal("del", "keys", vec![owned_key]));
        });

        entry.expiry = Some(Expiry { deadline_ms, timer });
    }

    fn rename(&mut self, source: &str, target: &str, refuse_existing: bool) -> Reply {
        if source == target {
            return Reply::Text("error".to_string());
        }

        if refuse_existing && self.table.contains_key(target) {
            return Reply::Int(0);
        }

        let Some(mut entry) = self.table.remove(source) else {
            return Reply::Text("error".to_string());
        };

        if let Some(replaced) = self.table.remove(target) {
            let _ = replaced.actor.send(NodeMessage::Del);
            if let Some(expiry) = replaced.expiry {
                expiry.timer.abort();
            }
        }

        // the old timer would fire a del for the source name; re-arm it for
        // the target
        let deadline = entry.expiry.take().map(|expiry| {
            expiry.timer.abort();
            expiry.deadline_ms
        });
        self.table.insert(target.to_string(), entry);
        if let Some(deadline_ms) = deadline {
            self.arm_expiry(target, deadline_ms);
        }

        if refuse_existing {
            Reply::Int(1)
        } else {
            Reply::ok()
        }
    }
}
