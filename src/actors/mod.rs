//! The per-key value actors.
//!
//! Every live key is owned by exactly one of these actors. An actor processes
//! its mailbox strictly in arrival order and stops only on [`NodeMessage::Del`];
//! user commands never kill it. Cross-key traffic always goes back through
//! the directory, never actor-to-actor.

mod command_error;
mod hash;
mod list;
pub mod scan;
mod set;
mod string;

pub use command_error::CommandError;
pub use hash::HashActor;
pub use list::ListActor;
pub use set::SetActor;
pub use string::StringActor;

use tokio::sync::mpsc;

use crate::directory::DirectoryHandle;
use crate::payload::{NodeHandle, NodeMessage};
use crate::registry::ValueKind;

/// Spawns a fresh value actor of the given flavor and returns its mailbox
/// handle. Only the directory calls this.
pub fn spawn_value_actor(kind: ValueKind, key: &str, directory: DirectoryHandle) -> NodeHandle {
    let (handle, mailbox) = mpsc::unbounded_channel::<NodeMessage>();

    match kind {
        ValueKind::String => {
            tokio::spawn(StringActor::new(key, directory).run(mailbox));
        }
        ValueKind::Hash => {
            tokio::spawn(HashActor::new(key).run(mailbox));
        }
        ValueKind::List => {
            tokio::spawn(ListActor::new(key, directory, handle.clone()).run(mailbox));
        }
        ValueKind::Set => {
            tokio::spawn(SetActor::new(key, directory).run(mailbox));
        }
    }

    handle
}
