//! Request and reply plumbing shared by every actor.
//!
//! A [`Payload`] is one parsed request together with its reply destinations.
//! Replies travel back through the payload rather than through return values,
//! which is what lets a LIST actor park a request and answer it from a later,
//! unrelated message.

use tokio::sync::mpsc;

/// Reply channel back to the connection that issued the request.
pub type ClientHandle = mpsc::UnboundedSender<String>;

/// Mailbox handle of a value actor or collector.
pub type NodeHandle = mpsc::UnboundedSender<NodeMessage>;

/// A computed response, prior to wire rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The command already delivered its own replies; suppress delivery.
    Unit,
    Nil,
    Text(String),
    Int(i64),
    Bool(bool),
    Many(Vec<String>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Text("OK".to_string())
    }

    /// Textual wire form, one element per line for sequences.
    ///
    /// `None` means nothing is written to the client.
    pub fn render(&self) -> Option<String> {
        match self {
            Reply::Unit => None,
            Reply::Nil => Some("nil".to_string()),
            Reply::Text(text) => Some(text.clone()),
            Reply::Int(value) => Some(value.to_string()),
            Reply::Bool(true) => Some("1".to_string()),
            Reply::Bool(false) => Some("0".to_string()),
            Reply::Many(items) => Some(items.join("\n")),
        }
    }
}

/// A single-key answer routed back to an aggregating actor.
#[derive(Debug, Clone)]
pub struct Response {
    pub key: String,
    pub value: Reply,
}

/// Everything a value actor or collector can find in its mailbox.
#[derive(Debug)]
pub enum NodeMessage {
    /// Stop immediately; no reply.
    Del,
    Request(Payload),
    Response(Response),
    /// A parked blocking request timed out. Carries the ticket the LIST actor
    /// assigned when parking it; firing after the request was served is a no-op.
    Unblock(u64),
}

/// One immutable request: command token, target key, arguments, and where the
/// answer should go.
#[derive(Debug, Clone)]
pub struct Payload {
    pub command: String,
    pub key: String,
    pub args: Vec<String>,
    pub to_client: Option<ClientHandle>,
    pub to_node: Option<NodeHandle>,
}

impl Payload {
    /// An internal request with no reply destination, used when actors
    /// re-route commands (expiry firings, `rpoplpush`, `smove`, `mset`).
    pub fn internal(command: &str, key: &str, args: Vec<String>) -> Self {
        Payload {
            command: command.to_string(),
            key: key.to_string(),
            args,
            to_client: None,
            to_node: None,
        }
    }

    /// Sends `reply` to this payload's destination.
    ///
    /// A node destination wins over a client one, so aggregators receive the
    /// structured [`Response`] instead of rendered text. [`Reply::Unit`]
    /// suppresses delivery entirely.
    pub fn deliver(&self, reply: Reply) {
        if reply == Reply::Unit {
            return;
        }

        if let Some(node) = &self.to_node {
            let _ = node.send(NodeMessage::Response(Response {
                key: self.key.clone(),
                value: reply,
            }));
            return;
        }

        if let Some(client) = &self.to_client {
            if let Some(text) = reply.render() {
                let _ = client.send(text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_rendering() {
        let test_cases = [
            (Reply::Nil, Some("nil")),
            (Reply::Text("hello".to_string()), Some("hello")),
            (Reply::Int(-3), Some("-3")),
            (Reply::Bool(true), Some("1")),
            (Reply::Bool(false), Some("0")),
            (Reply::Many(vec!["a".to_string(), "b".to_string()]), Some("a\nb")),
            (Reply::Many(Vec::new()), Some("")),
            (Reply::Unit, None),
        ];

        for (reply, expected) in test_cases {
            assert_eq!(reply.render().as_deref(), expected, "rendering {:?}", reply);
        }
    }

    #[tokio::test]
    async fn test_deliver_prefers_node_over_client() {
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        let (node_tx, mut node_rx) = mpsc::unbounded_channel();

        let payload = Payload {
            command: "get".to_string(),
            key: "x".to_string(),
            args: Vec::new(),
            to_client: Some(client_tx),
            to_node: Some(node_tx),
        };

        payload.deliver(Reply::Text("hello".to_string()));

        let message = node_rx.recv().await.expect("node should receive a response");
        match message {
            NodeMessage::Response(response) => {
                assert_eq!(response.key, "x");
                assert_eq!(response.value, Reply::Text("hello".to_string()));
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert!(client_rx.try_recv().is_err(), "client should not be written");
    }

    #[tokio::test]
    async fn test_deliver_unit_is_suppressed() {
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();

        let payload = Payload {
            command: "mget".to_string(),
            key: "keys".to_string(),
            args: Vec::new(),
            to_client: Some(client_tx),
            to_node: None,
        };

        payload.deliver(Reply::Unit);
        assert!(client_rx.try_recv().is_err());
    }
}
