//! The LIST value actor, including the blocking pop machinery.
//!
//! Blocking commands never suspend the actor. A `blpop` against an empty list
//! parks the payload in an insertion-ordered queue and schedules a one-shot
//! timer; the answer is produced later, either by a mutating command that put
//! data into the list or by the timer firing back into the mailbox. Wake-up
//! is strictly first-come-first-served.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::actors::CommandError;
use crate::directory::DirectoryHandle;
use crate::payload::{NodeHandle, NodeMessage, Payload, Reply};

/// Value actor for a single list key.
pub struct ListActor {
    key: String,
    items: VecDeque<String>,
    /// Parked blocking payloads in arrival order, each tagged with the ticket
    /// its timeout timer will fire with.
    blocked: VecDeque<(u64, Payload)>,
    next_ticket: u64,
    directory: DirectoryHandle,
    /// Own mailbox handle, handed to timeout timers.
    handle: NodeHandle,
}

/// Commands answered by parking rather than executing when the list is empty.
fn is_blocking(command: &str) -> bool {
    matches!(command, "blpop" | "brpop" | "brpoplpush")
}

/// Commands that can put elements into the list and must drain the blocked
/// queue afterwards.
fn feeds_blocked(command: &str) -> bool {
    matches!(
        command,
        "lpush" | "rpush" | "lpushx" | "rpushx" | "linsert" | "lset"
    )
}

/// Rewrites a blocking payload into its immediate form: the leading `b` is
/// stripped from the command and the trailing timeout argument dropped. The
/// reply destinations are preserved, so the eventual answer still reaches the
/// client that blocked.
fn unblocked(payload: &Payload) -> Payload {
    let mut immediate = payload.clone();
    immediate.command = payload.command[1..].to_string();
    immediate.args.pop();
    immediate
}

impl ListActor {
    pub fn new(key: &str, directory: DirectoryHandle, handle: NodeHandle) -> Self {
        ListActor {
            key: key.to_string(),
            items: VecDeque::new(),
            blocked: VecDeque::new(),
            next_ticket: 0,
            directory,
            handle,
        }
    }

    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<NodeMessage>) {
        while let Some(message) = mailbox.recv().await {
            match message {
                NodeMessage::Del => break,
                NodeMessage::Request(payload) => self.handle_request(payload),
                NodeMessage::Unblock(ticket) => self.handle_timeout(ticket),
                other => debug!(key = %self.key, ?other, "ignoring message"),
            }
        }
    }

    fn handle_request(&mut self, payload: Payload) {
        if is_blocking(&payload.command) {
            self.handle_blocking(payload);
            return;
        }

        let reply = match self.execute(&payload) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(key = %self.key, command = %payload.command, %error, "command failed");
                Reply::Text(error.as_wire().to_string())
            }
        };
        payload.deliver(reply);

        if feeds_blocked(&payload.command) {
            self.drain_blocked();
        }
    }

    /// Runs the immediate form when elements are available, otherwise parks
    /// the payload and arms its timeout timer.
    fn handle_blocking(&mut self, payload: Payload) {
        if !self.items.is_empty() {
            let immediate = unblocked(&payload);
            let reply = match self.execute(&immediate) {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(key = %self.key, command = %immediate.command, %error, "command failed");
                    Reply::Text(error.as_wire().to_string())
                }
            };
            immediate.deliver(reply);
            return;
        }

        let raw_timeout = payload.args.last().cloned().unwrap_or_default();
        let seconds = match raw_timeout.parse::<f64>() {
            Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => seconds,
            _ => {
                warn!(key = %self.key, timeout = %raw_timeout, "invalid blocking timeout");
                payload.deliver(Reply::Text(
                    CommandError::InvalidTimeout(raw_timeout).as_wire().to_string(),
                ));
                return;
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.blocked.push_back((ticket, payload));

        let mailbox = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            let _ = mailbox.send(NodeMessage::Unblock(ticket));
        });
    }

    /// A timeout for an already-served ticket is a no-op; otherwise the
    /// parked client receives `nil`.
    fn handle_timeout(&mut self, ticket: u64) {
        let Some(position) = self.blocked.iter().position(|(id, _)| *id == ticket) else {
            return;
        };

        if let Some((_, payload)) = self.blocked.remove(position) {
            debug!(key = %self.key, command = %payload.command, "blocking request timed out");
            payload.deliver(Reply::Nil);
        }
    }

    /// Serves parked payloads oldest-first while elements remain.
    fn drain_blocked(&mut self) {
        while !self.items.is_empty() {
            let Some((_, payload)) = self.blocked.pop_front() else {
                return;
            };

            let immediate = unblocked(&payload);
            let reply = match self.execute(&immediate) {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(key = %self.key, command = %immediate.command, %error, "command failed");
                    Reply::Text(error.as_wire().to_string())
                }
            };
            immediate.deliver(reply);
        }
    }

    fn execute(&mut self, payload: &Payload) -> Result<Reply, CommandError> {
        let args = &payload.args;

        match payload.command.as_str() {
            "lpush" | "lpushx" => {
                for value in args {
                    self.items.push_front(value.clone());
                }
                Ok(Reply::Int(self.items.len() as i64))
            }
            "rpush" | "rpushx" => {
                for value in args {
                    self.items.push_back(value.clone());
                }
                Ok(Reply::Int(self.items.len() as i64))
            }
            "lpop" => Ok(self.items.pop_front().map_or(Reply::Nil, Reply::Text)),
            "rpop" => Ok(self.items.pop_back().map_or(Reply::Nil, Reply::Text)),
            "lindex" => {
                let index = parse_int(&args[0])?;
                Ok(self
                    .normalize_index(index)
                    .and_then(|position| self.items.get(position))
                    .map_or(Reply::Nil, |value| Reply::Text(value.clone())))
            }
            "lset" => {
                let index = parse_int(&args[0])?;
                let position = self
                    .normalize_index(index)
                    .ok_or(CommandError::IndexOutOfRange(index))?;
                self.items[position] = args[1].clone();
                Ok(Reply::ok())
            }
            "lrem" => {
                let index = parse_int(&args[0])?;
                match self.normalize_index(index) {
                    Some(position) => {
                        self.items.remove(position);
                        Ok(Reply::Int(1))
                    }
                    None => Ok(Reply::Int(0)),
                }
            }
            "lrange" => {
                let (start, end) = self.slice_bounds(parse_int(&args[0])?, parse_int(&args[1])?);
                Ok(Reply::Many(
                    self.items
                        .iter()
                        .skip(start)
                        .take(end.saturating_sub(start))
                        .cloned()
                        .collect(),
                ))
            }
            "ltrim" => {
                let (start, end) = self.slice_bounds(parse_int(&args[0])?, parse_int(&args[1])?);
                self.items = self
                    .items
                    .iter()
                    .skip(start)
                    .take(end.saturating_sub(start))
                    .cloned()
                    .collect();
                Ok(Reply::ok())
            }
            "llen" => Ok(Reply::Int(self.items.len() as i64)),
            "linsert" => {
                let before = if args[0].eq_ignore_ascii_case("before") {
                    true
                } else if args[0].eq_ignore_ascii_case("after") {
                    false
                } else {
                    return Err(CommandError::InvalidPosition(args[0].clone()));
                };

                let Some(pivot) = self.items.iter().position(|item| *item == args[1]) else {
                    return Ok(Reply::Int(-1));
                };

                let position = if before { pivot } else { pivot + 1 };
                self.items.insert(position, args[2].clone());
                Ok(Reply::Int(self.items.len() as i64))
            }
            "rpoplpush" => match self.items.pop_back() {
                None => Ok(Reply::Nil),
                Some(value) => {
                    let push = Payload::internal("lpush", &args[0], vec![value.clone()]);
                    let _ = self.directory.send(push);
                    Ok(Reply::Text(value))
                }
            },
            "sort" => Err(CommandError::NotImplemented),
            other => Err(CommandError::UnsupportedCommand(other.to_string())),
        }
    }

    /// Maps a possibly-negative index onto the list, `None` when out of range.
    fn normalize_index(&self, index: i64) -> Option<usize> {
        let length = self.items.len() as i64;
        let position = if index < 0 { index + length } else { index };

        if (0..length).contains(&position) {
            Some(position as usize)
        } else {
            None
        }
    }

    /// Half-open slice bounds with negative offsets counted from the end.
    fn slice_bounds(&self, start: i64, end: i64) -> (usize, usize) {
        let length = self.items.len() as i64;
        let clamp = |index: i64| {
            let position = if index < 0 { index + length } else { index };
            position.clamp(0, length) as usize
        };

        (clamp(start), clamp(end))
    }
}

fn parse_int(raw: &str) -> Result<i64, CommandError> {
    raw.parse::<i64>()
        .map_err(|_| CommandError::InvalidInteger(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ClientHandle;
    use std::time::Duration;
    use tokio::time::timeout;

    fn spawn_actor() -> (NodeHandle, mpsc::UnboundedReceiver<Payload>) {
        let (directory, routed) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(ListActor::new("q", directory, tx.clone()).run(rx));
        (tx, routed)
    }

    fn client() -> (ClientHandle, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    fn request(command: &str, args: &[&str], reply_to: &ClientHandle) -> NodeMessage {
        NodeMessage::Request(Payload {
            command: command.to_string(),
            key: "q".to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            to_client: Some(reply_to.clone()),
            to_node: None,
        })
    }

    async fn recv(replies: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(2), replies.recv())
            .await
            .expect("reply should arrive in time")
            .expect("reply channel should stay open")
    }

    #[tokio::test]
    async fn test_push_pop_ordering() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("rpush", &["a", "b"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "2");

        actor.send(request("lpush", &["z"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "3");

        actor.send(request("lpop", &[], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "z");

        actor.send(request("rpop", &[], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "b");
    }

    #[tokio::test]
    async fn test_lrange_and_ltrim_slices() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor
            .send(request("rpush", &["a", "b", "c", "d"], &reply_tx))
            .unwrap();
        assert_eq!(recv(&mut replies).await, "4");

        actor.send(request("lrange", &["1", "3"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "b\nc");

        actor.send(request("lrange", &["0", "-1"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "a\nb\nc");

        actor.send(request("ltrim", &["1", "3"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "OK");

        actor.send(request("lrange", &["0", "99"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "b\nc");
    }

    #[tokio::test]
    async fn test_linsert_relative_to_pivot() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("rpush", &["a", "c"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "2");

        actor
            .send(request("linsert", &["BEFORE", "c", "b"], &reply_tx))
            .unwrap();
        assert_eq!(recv(&mut replies).await, "3");

        actor
            .send(request("linsert", &["after", "c", "d"], &reply_tx))
            .unwrap();
        assert_eq!(recv(&mut replies).await, "4");

        actor
            .send(request("linsert", &["before", "nope", "x"], &reply_tx))
            .unwrap();
        assert_eq!(recv(&mut replies).await, "-1");

        actor.send(request("lrange", &["0", "4"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "a\nb\nc\nd");
    }

    #[tokio::test]
    async fn test_lset_out_of_range_is_an_error() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("rpush", &["a"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "1");

        actor.send(request("lset", &["4", "x"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "error");

        actor.send(request("lset", &["0", "x"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "OK");
    }

    #[tokio::test]
    async fn test_rpoplpush_routes_through_directory() {
        let (actor, mut routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("rpush", &["a", "b"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "2");

        actor.send(request("rpoplpush", &["other"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "b");

        let forwarded = timeout(Duration::from_secs(2), routed.recv())
            .await
            .expect("routing should happen in time")
            .expect("directory channel should stay open");
        assert_eq!(forwarded.command, "lpush");
        assert_eq!(forwarded.key, "other");
        assert_eq!(forwarded.args, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_blpop_executes_immediately_when_populated() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("rpush", &["ready"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "1");

        actor.send(request("blpop", &["30"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "ready");
    }

    #[tokio::test]
    async fn test_blocked_clients_are_served_in_arrival_order() {
        let (actor, _routed) = spawn_actor();
        let (first_tx, mut first_replies) = client();
        let (second_tx, mut second_replies) = client();
        let (pusher_tx, mut pusher_replies) = client();

        actor.send(request("blpop", &["30"], &first_tx)).unwrap();
        actor.send(request("brpop", &["30"], &second_tx)).unwrap();

        actor.send(request("rpush", &["one"], &pusher_tx)).unwrap();
        assert_eq!(recv(&mut pusher_replies).await, "1");
        assert_eq!(recv(&mut first_replies).await, "one");

        actor.send(request("rpush", &["two"], &pusher_tx)).unwrap();
        assert_eq!(recv(&mut pusher_replies).await, "1");
        assert_eq!(recv(&mut second_replies).await, "two");
    }

    #[tokio::test]
    async fn test_one_push_serves_only_the_oldest_blocked_client() {
        let (actor, _routed) = spawn_actor();
        let (first_tx, mut first_replies) = client();
        let (second_tx, mut second_replies) = client();
        let (pusher_tx, mut pusher_replies) = client();

        actor.send(request("blpop", &["30"], &first_tx)).unwrap();
        actor.send(request("blpop", &["30"], &second_tx)).unwrap();

        actor.send(request("rpush", &["only"], &pusher_tx)).unwrap();
        assert_eq!(recv(&mut pusher_replies).await, "1");
        assert_eq!(recv(&mut first_replies).await, "only");

        assert!(
            timeout(Duration::from_millis(100), second_replies.recv())
                .await
                .is_err(),
            "second client should remain blocked"
        );
    }

    #[tokio::test]
    async fn test_blpop_times_out_with_nil() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("blpop", &["0.05"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "nil");
    }

    #[tokio::test]
    async fn test_timer_after_unblock_is_a_no_op() {
        let (actor, _routed) = spawn_actor();
        let (blocked_tx, mut blocked_replies) = client();
        let (pusher_tx, mut pusher_replies) = client();

        actor.send(request("blpop", &["0.2"], &blocked_tx)).unwrap();
        actor.send(request("rpush", &["fast"], &pusher_tx)).unwrap();
        assert_eq!(recv(&mut pusher_replies).await, "1");
        assert_eq!(recv(&mut blocked_replies).await, "fast");

        // the timer fires into an empty blocked queue
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(blocked_replies.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sort_is_unimplemented_on_a_populated_list() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("rpush", &["b", "a"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "2");

        actor.send(request("sort", &[], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "Not implemented");
    }

    #[tokio::test]
    async fn test_invalid_timeout_is_rejected() {
        let (actor, _routed) = spawn_actor();
        let (reply_tx, mut replies) = client();

        actor.send(request("blpop", &["soon"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "error");

        actor.send(request("blpop", &["-1"], &reply_tx)).unwrap();
        assert_eq!(recv(&mut replies).await, "error");
    }
}
