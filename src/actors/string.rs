use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::actors::CommandError;
use crate::directory::DirectoryHandle;
use crate::payload::{NodeMessage, Payload, Reply};

/// Value actor for a single string key.
pub struct StringActor {
    key: String,
    value: String,
    directory: DirectoryHandle,
}

/// Counting and arithmetic treat an untouched value as zero.
fn value_or_zero(value: &str) -> &str {
    if value.is_empty() { "0" } else { value }
}

impl StringActor {
    pub fn new(key: &str, directory: DirectoryHandle) -> Self {
        StringActor {
            key: key.to_string(),
            value: String::new(),
            directory,
        }
    }

    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<NodeMessage>) {
        while let Some(message) = mailbox.recv().await {
            match message {
                NodeMessage::Del => break,
                NodeMessage::Request(payload) => {
                    let reply = match self.execute(&payload) {
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
            "get" => Ok(Reply::Text(self.value.clone())),
            "set" | "setnx" => {
                self.value = args[0].clone();
                Ok(Reply::ok())
            }
            "getset" => {
                let previous = std::mem::replace(&mut self.value, args[0].clone());
                Ok(Reply::Text(previous))
            }
            "append" => {
                self.value.push_str(&args[0]);
                Ok(Reply::Text(self.value.clone()))
            }
            "getrange" => {
                let (start, end) = (parse_int(&args[0])?, parse_int(&args[1])?);
                Ok(Reply::Text(self.substring(start, end)))
            }
            "setrange" => {
                let offset = parse_int(&args[0])?;
                if offset < 0 {
                    return Err(CommandError::IndexOutOfRange(offset));
                }
                self.overlay(offset as usize, &args[1]);
                Ok(Reply::Int(self.value.chars().count() as i64))
            }
            "strlen" => Ok(Reply::Int(self.value.len() as i64)),
            "incr" => self.add_integer(1),
            "decr" => self.add_integer(-1),
            "incrby" => self.add_integer(parse_int(&args[0])?),
            "decrby" => self.add_integer(-parse_int(&args[0])?),
            "incrbyfloat" => {
                let delta = args[0]
                    .parse::<f64>()
                    .map_err(|_| CommandError::InvalidFloat(args[0].clone()))?;
                let current = value_or_zero(&self.value)
                    .parse::<f64>()
                    .map_err(|_| CommandError::InvalidFloat(self.value.clone()))?;
                self.value = format!("{}", current + delta);
                Ok(Reply::Text(self.value.clone()))
            }
            "bitcount" => {
                let bits: u32 = self.value.bytes().map(u8::count_ones).sum();
                Ok(Reply::Int(bits as i64))
            }
            "setex" => self.set_with_expiry(&payload.key, &args[1], "expire", &args[0]),
            "psetex" => self.set_with_expiry(&payload.key, &args[1], "pexpire", &args[0]),
            "getbit" | "setbit" | "bitpos" | "bitop" => Err(CommandError::NotImplemented),
            other => Err(CommandError::UnsupportedCommand(other.to_string())),
        }
    }

    fn add_integer(&mut self, delta: i64) -> Result<Reply, CommandError> {
        let current = parse_int(value_or_zero(&self.value))?;
        self.value = (current + delta).to_string();
        Ok(Reply::Text(self.value.clone()))
    }

    /// Character slice `[start, end)` with out-of-range bounds clamped.
    fn substring(&self, start: i64, end: i64) -> String {
        let length = self.value.chars().count() as i64;
        let start = start.clamp(0, length) as usize;
        let end = end.clamp(0, length) as usize;

        if start >= end {
            return String::new();
        }

        self.value.chars().skip(start).take(end - start).collect()
    }

    /// Overlays `patch` at `offset`, replacing a single character. An offset
    /// past the end appends.
    fn overlay(&mut self, offset: usize, patch: &str) {
        let mut replaced: String = self.value.chars().take(offset).collect();
        replaced.push_str(patch);
        replaced.extend(self.value.chars().skip(offset + 1));
        self.value = replaced;
    }

    /// Stores the value, then asks the directory to arm the expiry. Uses the
    /// payload's key; the actor's own name can be stale after a rename.
    fn set_with_expiry(
        &mut self,
        key: &str,
        value: &str,
        expire_command: &str,
        duration: &str,
    ) -> Result<Reply, CommandError> {
        self.value = value.to_string();
        let request = Payload::internal(expire_command, "keys", vec![key.to_string(), duration.to_string()]);
        let _ = self.directory.send(request);
        Ok(Reply::ok())
    }
}

fn parse_int(raw: &str) -> Result<i64, CommandError> {
    raw.parse::<i64>()
        .map_err(|_| CommandError::InvalidInteger(raw.to_string()))
}
