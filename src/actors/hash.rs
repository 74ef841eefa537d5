use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::actors::{CommandError, scan};
use crate::payload::{NodeMessage, Payload, Reply};

/// Value actor for a single hash key, a field-to-string mapping.
pub struct HashActor {
    key: String,
    fields: HashMap<String, String>,
}

impl HashActor {
    pub fn new(key: &str) -> Self {
        HashActor {
            key: key.to_string(),
            fields: HashMap::new(),
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
            "hget" => Ok(self
                .fields
                .get(&args[0])
                .map_or(Reply::Nil, |value| Reply::Text(value.clone()))),
            "hset" => {
                let previous = self.fields.insert(args[0].clone(), args[1].clone());
                Ok(Reply::Int(if previous.is_none() { 1 } else { 0 }))
            }
            "hsetnx" => {
                if self.fields.contains_key(&args[0]) {
                    Ok(Reply::Int(0))
                } else {
                    self.fields.insert(args[0].clone(), args[1].clone());
                    Ok(Reply::Int(1))
                }
            }
            "hdel" => {
                let removed = args
                    .iter()
                    .filter(|field| self.fields.remove(*field).is_some())
                    .count();
                Ok(Reply::Int(removed as i64))
            }
            "hexists" => Ok(Reply::Bool(self.fields.contains_key(&args[0]))),
            "hlen" => Ok(Reply::Int(self.fields.len() as i64)),
            "hkeys" => Ok(Reply::Many(self.fields.keys().cloned().collect())),
            "hvals" => Ok(Reply::Many(self.fields.values().cloned().collect())),
            "hgetall" => {
                let mut flattened = Vec::with_capacity(self.fields.len() * 2);
                for (field, value) in &self.fields {
                    flattened.push(field.clone());
                    flattened.push(value.clone());
                }
                Ok(Reply::Many(flattened))
            }
            "hmget" => Ok(Reply::Many(
                args.iter()
                    .map(|field| {
                        self.fields
                            .get(field)
                            .cloned()
                            .unwrap_or_else(|| "nil".to_string())
                    })
                    .collect(),
            )),
            "hmset" => {
                for pair in args.chunks(2) {
                    self.fields.insert(pair[0].clone(), pair[1].clone());
                }
                Ok(Reply::ok())
            }
            "hincrby" => {
                let delta = args[1]
                    .parse::<i64>()
                    .map_err(|_| CommandError::InvalidInteger(args[1].clone()))?;
                let entry = self.fields.entry(args[0].clone()).or_default();
                let current = if entry.is_empty() {
                    0
                } else {
                    entry
                        .parse::<i64>()
                        .map_err(|_| CommandError::InvalidInteger(entry.clone()))?
                };
                *entry = (current + delta).to_string();
                Ok(Reply::Text(entry.clone()))
            }
            "hincrbyfloat" => {
                let delta = args[1]
                    .parse::<f64>()
                    .map_err(|_| CommandError::InvalidFloat(args[1].clone()))?;
                let entry = self.fields.entry(args[0].clone()).or_default();
                let current = if entry.is_empty() {
                    0.0
                } else {
                    entry
                        .parse::<f64>()
                        .map_err(|_| CommandError::InvalidFloat(entry.clone()))?
                };
                *entry = format!("{}", current + delta);
                Ok(Reply::Text(entry.clone()))
            }
            "hscan" => scan::scan_items(self.fields.keys().cloned().collect(), args),
            other => Err(CommandError::UnsupportedCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str, args: &[&str]) -> Payload {
        Payload::internal(command, "h", args.iter().map(|arg| arg.to_string()).collect())
    }

    #[test]
    fn test_hset_reports_new_fields() {
        let mut actor = HashActor::new("h");

        assert_eq!(actor.execute(&request("hset", &["f", "v1"])), Ok(Reply::Int(1)));
        assert_eq!(actor.execute(&request("hset", &["f", "v2"])), Ok(Reply::Int(0)));
        assert_eq!(
            actor.execute(&request("hget", &["f"])),
            Ok(Reply::Text("v2".to_string()))
        );
        assert_eq!(actor.execute(&request("hget", &["missing"])), Ok(Reply::Nil));
    }

    #[test]
    fn test_hsetnx_keeps_existing_value() {
        let mut actor = HashActor::new("h");

        assert_eq!(actor.execute(&request("hsetnx", &["f", "v1"])), Ok(Reply::Int(1)));
        assert_eq!(actor.execute(&request("hsetnx", &["f", "v2"])), Ok(Reply::Int(0)));
        assert_eq!(
            actor.execute(&request("hget", &["f"])),
            Ok(Reply::Text("v1".to_string()))
        );
    }

    #[test]
    fn test_hdel_counts_removed_fields() {
        let mut actor = HashActor::new("h");
        actor
            .execute(&request("hmset", &["a", "1", "b", "2", "c", "3"]))
            .unwrap();

        assert_eq!(
            actor.execute(&request("hdel", &["a", "c", "missing"])),
            Ok(Reply::Int(2))
        );
        assert_eq!(actor.execute(&request("hlen", &[])), Ok(Reply::Int(1)));
        assert_eq!(actor.execute(&request("hexists", &["b"])), Ok(Reply::Bool(true)));
        assert_eq!(actor.execute(&request("hexists", &["a"])), Ok(Reply::Bool(false)));
    }

    #[test]
    fn test_hmget_answers_positionally() {
        let mut actor = HashActor::new("h");
        actor.execute(&request("hmset", &["a", "1", "c", "3"])).unwrap();

        assert_eq!(
            actor.execute(&request("hmget", &["a", "b", "c"])),
            Ok(Reply::Many(vec![
                "1".to_string(),
                "nil".to_string(),
                "3".to_string()
            ]))
        );
    }

    #[test]
    fn test_hgetall_alternates_fields_and_values() {
        let mut actor = HashActor::new("h");
        actor.execute(&request("hset", &["a", "1"])).unwrap();

        assert_eq!(
            actor.execute(&request("hgetall", &[])),
            Ok(Reply::Many(vec!["a".to_string(), "1".to_string()]))
        );
    }

    #[test]
    fn test_hincrby_treats_missing_field_as_zero() {
        let mut actor = HashActor::new("h");

        assert_eq!(
            actor.execute(&request("hincrby", &["counter", "5"])),
            Ok(Reply::Text("5".to_string()))
        );
        assert_eq!(
            actor.execute(&request("hincrby", &["counter", "-2"])),
            Ok(Reply::Text("3".to_string()))
        );
        assert_eq!(
            actor.execute(&request("hincrbyfloat", &["ratio", "0.5"])),
            Ok(Reply::Text("0.5".to_string()))
        );
    }

    #[test]
    fn test_hincrby_rejects_non_integer_field() {
        let mut actor = HashActor::new("h");
        actor.execute(&request("hset", &["f", "abc"])).unwrap();

        assert_eq!(
            actor.execute(&request("hincrby", &["f", "1"])),
            Err(CommandError::InvalidInteger("abc".to_string()))
        );
    }

    #[test]
    fn test_hscan_pages_over_fields() {
        let mut actor = HashActor::new("h");
        actor.execute(&request("hset", &["only", "1"])).unwrap();

        assert_eq!(
            actor.execute(&request("hscan", &["0"])),
            Ok(Reply::Many(vec!["0".to_string(), "only".to_string()]))
        );
    }
}
