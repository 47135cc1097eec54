//! Error types.
//!
//! Each subsystem reports failures through its own enum; [`Error`] gathers them for callers that
//! do not care which subsystem failed. [`UserError`] is the subset the
//! [`Navigator`](crate::Navigator) presents to the visitor.

use crate::room::RoomId;
use thiserror::Error;

/// A selection the navigation state machine refuses to act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Please select both current location and destination")]
    Incomplete,

    #[error("Please select different rooms")]
    SameRoom,

    #[error("cannot change rooms while an AR session is active")]
    SessionActive,

    #[error("no room with id {0}")]
    UnknownRoom(RoomId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("immersive AR is not supported on this device")]
    Unsupported,

    /// A session is already being requested or running.
    #[error("an AR session is already {0}")]
    AlreadyRunning(&'static str),

    #[error("AR session request failed: {0}")]
    RequestFailed(String),

    #[error("no AR session is active")]
    NotActive,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("the model has no vertices to align")]
    NoModelVertices,

    #[error("need at least 2 room/model correspondences, found {found}")]
    InsufficientCorrespondences { found: usize },
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("room payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("room payload is neither a list nor an object with a `rooms` list")]
    UnexpectedShape,

    #[error("room directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("failed to load model from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("gave up loading {path} after {attempts} attempts")]
    Exhausted { path: String, attempts: u32 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors shown to the visitor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("AR system initializing... Please try again in a moment.")]
    NotReady,

    #[error("{0}")]
    Other(String),
}

/// Wayfinder error type
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_messages() {
        insta::assert_snapshot!(
            SelectionError::Incomplete,
            @"Please select both current location and destination"
        );
        insta::assert_snapshot!(SelectionError::SameRoom, @"Please select different rooms");
        insta::assert_snapshot!(
            UserError::NotReady,
            @"AR system initializing... Please try again in a moment."
        );
    }

    #[test]
    fn user_errors_keep_the_underlying_message() {
        let user: UserError = SessionError::Unsupported.into();
        assert_eq!(
            user.to_string(),
            "immersive AR is not supported on this device"
        );
    }

    #[test]
    fn top_level_conversion() {
        fn fails() -> Result<()> {
            Err(AlignmentError::InsufficientCorrespondences { found: 1 })?
        }
        assert!(matches!(
            fails(),
            Err(Error::Alignment(AlignmentError::InsufficientCorrespondences { found: 1 }))
        ));
    }
}
