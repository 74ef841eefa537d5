//! Static command table: which actor flavor owns a command, how many
//! arguments it takes, and what to answer when the key does not exist.
//!
//! The connection consults the table before routing (unknown command, arity);
//! the directory consults it for the owning type and the absent-key default.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::payload::Reply;

/// The four value-actor flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Hash,
    List,
    Set,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Hash => "hash",
            ValueKind::List => "list",
            ValueKind::Set => "set",
        }
    }
}

/// Command category: one of the value kinds, or `Keys` for commands that
/// execute on the directory itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    String,
    Hash,
    List,
    Set,
    Keys,
}

impl Category {
    pub fn value_kind(self) -> Option<ValueKind> {
        match self {
            Category::String => Some(ValueKind::String),
            Category::Hash => Some(ValueKind::Hash),
            Category::List => Some(ValueKind::List),
            Category::Set => Some(ValueKind::Set),
            Category::Keys => None,
        }
    }
}

/// Accepted argument counts, validated before routing.
#[derive(Debug, Clone, Copy)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
    /// Any positive even count (`hmset`, `mset`, `msetnx`).
    Evens,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(expected) => count == expected,
            Arity::Range(low, high) => (low..=high).contains(&count),
            Arity::AtLeast(minimum) => count >= minimum,
            Arity::Evens => count > 0 && count % 2 == 0,
        }
    }
}

type DefaultFn = fn(&[String]) -> Reply;

pub struct CommandSpec {
    pub category: Category,
    pub arity: Arity,
    /// Response for a missing key. `None` means the command creates the key.
    pub default: Option<DefaultFn>,
}

fn nil(_: &[String]) -> Reply {
    Reply::Nil
}

fn zero(_: &[String]) -> Reply {
    Reply::Int(0)
}

fn ok(_: &[String]) -> Reply {
    Reply::ok()
}

fn empty_seq(_: &[String]) -> Reply {
    Reply::Many(Vec::new())
}

fn empty_text(_: &[String]) -> Reply {
    Reply::Text(String::new())
}

fn scan_end(_: &[String]) -> Reply {
    Reply::Many(vec!["0".to_string(), String::new()])
}

fn not_implemented(_: &[String]) -> Reply {
    Reply::Text("Not implemented".to_string())
}

/// One `nil` per requested field, so `hmget` on a missing key still answers
/// positionally.
fn nil_per_arg(args: &[String]) -> Reply {
    Reply::Many(args.iter().map(|_| "nil".to_string()).collect())
}

static REGISTRY: LazyLock<HashMap<&'static str, CommandSpec>> = LazyLock::new(build_registry);

fn build_registry() -> HashMap<&'static str, CommandSpec> {
    use Arity::{AtLeast, Evens, Exact, Range};
    use Category::{Hash, Keys, List, Set, String};

    let entries: &[(&'static str, Category, Arity, Option<DefaultFn>)] = &[
        // strings
        ("get", String, Exact(0), Some(nil)),
        ("set", String, Exact(1), None),
        ("setnx", String, Exact(1), None),
        ("getset", String, Exact(1), Some(nil)),
        ("append", String, Exact(1), None),
        ("getrange", String, Exact(2), Some(empty_text)),
        ("setrange", String, Exact(2), None),
        ("strlen", String, Exact(0), Some(zero)),
        ("incr", String, Exact(0), None),
        ("decr", String, Exact(0), None),
        ("incrby", String, Exact(1), None),
        ("decrby", String, Exact(1), None),
        ("incrbyfloat", String, Exact(1), None),
        ("bitcount", String, Exact(0), Some(zero)),
        ("setex", String, Exact(2), None),
        ("psetex", String, Exact(2), None),
        ("getbit", String, Exact(1), Some(not_implemented)),
        ("setbit", String, Exact(2), Some(not_implemented)),
        ("bitpos", String, Range(1, 3), Some(not_implemented)),
        ("bitop", String, AtLeast(1), Some(not_implemented)),
        // hashes
        ("hget", Hash, Exact(1), Some(nil)),
        ("hset", Hash, Exact(2), None),
        ("hsetnx", Hash, Exact(2), None),
        ("hdel", Hash, AtLeast(1), Some(zero)),
        ("hexists", Hash, Exact(1), Some(zero)),
        ("hlen", Hash, Exact(0), Some(zero)),
        ("hkeys", Hash, Exact(0), Some(empty_seq)),
        ("hvals", Hash, Exact(0), Some(empty_seq)),
        ("hgetall", Hash, Exact(0), Some(empty_seq)),
        ("hmget", Hash, AtLeast(1), Some(nil_per_arg)),
        ("hmset", Hash, Evens, None),
        ("hincrby", Hash, Exact(2), None),
        ("hincrbyfloat", Hash, Exact(2), None),
        ("hscan", Hash, Range(1, 3), Some(scan_end)),
        // lists
        ("lpush", List, AtLeast(1), None),
        ("rpush", List, AtLeast(1), None),
        ("lpushx", List, AtLeast(1), None),
        ("rpushx", List, AtLeast(1), None),
        ("lpop", List, Exact(0), Some(nil)),
        ("rpop", List, Exact(0), Some(nil)),
        ("lindex", List, Exact(1), Some(nil)),
        ("lset", List, Exact(2), None),
        ("lrem", List, Exact(1), Some(zero)),
        ("lrange", List, Exact(2), Some(empty_seq)),
        ("ltrim", List, Exact(2), Some(ok)),
        ("llen", List, Exact(0), Some(zero)),
        ("linsert", List, Exact(3), Some(zero)),
        ("rpoplpush", List, Exact(1), Some(nil)),
        ("blpop", List, Exact(1), None),
        ("brpop", List, Exact(1), None),
        ("brpoplpush", List, Exact(2), None),
        ("sort", List, AtLeast(0), Some(not_implemented)),
        // sets
        ("sadd", Set, AtLeast(1), None),
        ("srem", Set, AtLeast(1), Some(zero)),
        ("scard", Set, Exact(0), Some(zero)),
        ("sismember", Set, Exact(1), Some(zero)),
        ("smembers", Set, Exact(0), Some(empty_seq)),
        ("srandmember", Set, Exact(0), Some(nil)),
        ("spop", Set, Exact(0), Some(nil)),
        ("sscan", Set, Range(1, 3), Some(scan_end)),
        ("sdiff", Set, AtLeast(1), Some(empty_seq)),
        ("sinter", Set, AtLeast(1), Some(empty_seq)),
        ("sunion", Set, AtLeast(1), Some(empty_seq)),
        ("sdiffstore", Set, AtLeast(1), None),
        ("sinterstore", Set, AtLeast(1), None),
        ("sunionstore", Set, AtLeast(1), None),
        ("smove", Set, Exact(2), Some(zero)),
        // keyspace
        ("exists", Keys, Exact(1), None),
        ("type", Keys, Exact(1), None),
        ("randomkey", Keys, Exact(0), None),
        ("keys", Keys, Exact(1), None),
        ("scan", Keys, Range(1, 3), None),
        ("ttl", Keys, Exact(1), None),
        ("pttl", Keys, Exact(1), None),
        ("expire", Keys, Exact(2), None),
        ("pexpire", Keys, Exact(2), None),
        ("expireat", Keys, Exact(2), None),
        ("pexpireat", Keys, Exact(2), None),
        ("persist", Keys, Exact(1), None),
        ("rename", Keys, Exact(2), None),
        ("renamenx", Keys, Exact(2), None),
        ("del", Keys, AtLeast(1), None),
        ("mget", Keys, AtLeast(1), None),
        ("mset", Keys, Evens, None),
        ("msetnx", Keys, Evens, None),
        ("ping", Keys, Exact(0), None),
        ("echo", Keys, Exact(1), None),
    ];

    entries
        .iter()
        .copied()
        .map(|(name, category, arity, default)| {
            (
                name,
                CommandSpec {
                    category,
                    arity,
                    default,
                },
            )
        })
        .collect()
}

pub fn lookup(command: &str) -> Option<&'static CommandSpec> {
    REGISTRY.get(command)
}

pub fn category_of(command: &str) -> Option<Category> {
    lookup(command).map(|spec| spec.category)
}

/// The value-actor flavor spawned for a creating command.
pub fn node_type(command: &str) -> Option<ValueKind> {
    category_of(command).and_then(Category::value_kind)
}

/// Precomputed answer for `command` against a missing key, if it has one.
pub fn default_reply(command: &str, args: &[String]) -> Option<Reply> {
    lookup(command)
        .and_then(|spec| spec.default)
        .map(|default| default(args))
}

pub fn args_in_range(command: &str, args: &[String]) -> bool {
    lookup(command).is_some_and(|spec| spec.arity.accepts(args.len()))
}
