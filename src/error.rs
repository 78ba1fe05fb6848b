use thiserror::Error;

/// Failures the playback core knows how to recover from.
///
/// Only `NoActiveSession` and `InvalidCommand` ever reach a caller; the rest
/// are logged where they happen and playback carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("widget not ready; dropped `{operation}`")]
    WidgetNotReady { operation: &'static str },

    #[error("invalid duration {0}; ratio computations skipped")]
    InvalidDuration(f64),

    #[error("failed to persist `{key}`: {reason}")]
    StorageWriteFailure { key: String, reason: String },

    #[error("timer fired for stale session {session_id}")]
    StaleSessionWrite { session_id: String },

    #[error("no active playback session")]
    NoActiveSession,

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl PlaybackError {
    pub fn storage(key: &str, err: &anyhow::Error) -> Self {
        PlaybackError::StorageWriteFailure {
            key: key.to_string(),
            reason: format!("{err:#}"),
        }
    }
}
