use thiserror::Error;

/// Failure modes inside a value actor's command execution.
///
/// None of these cross the actor boundary as errors. The run loop logs the
/// detailed variant and replies with the flat wire form from [`as_wire`].
///
/// [`as_wire`]: CommandError::as_wire
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Not implemented")]
    NotImplemented,
    #[error("command {0} is not part of this value type")]
    UnsupportedCommand(String),
    #[error("value {0} is not an integer")]
    InvalidInteger(String),
    #[error("value {0} is not a float")]
    InvalidFloat(String),
    #[error("index {0} out of range")]
    IndexOutOfRange(i64),
    #[error("expected BEFORE or AFTER, got {0}")]
    InvalidPosition(String),
    #[error("invalid blocking timeout {0}")]
    InvalidTimeout(String),
    #[error("invalid scan cursor {0}")]
    InvalidCursor(String),
    #[error("invalid scan count {0}")]
    InvalidCount(String),
    #[error("invalid pattern {0}")]
    InvalidPattern(String),
    #[error("timed out waiting for {0} member sets")]
    FanOutTimedOut(usize),
}

impl CommandError {
    /// The string a client sees. Everything except the explicitly
    /// unimplemented commands collapses to `"error"`.
    pub fn as_wire(&self) -> &'static str {
        match self {
            CommandError::NotImplemented => "Not implemented",
            _ => "error",
        }
    }
}
