use std::path::PathBuf;

/// Errors raised by the shared MusAI utilities
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid instrument class '{0}' (expected an integer in 0..=16)")]
    InvalidClass(String),

    #[error("Class {0} (Sound Effects) is always excluded and cannot be required")]
    RequiredSoundEffects(u8),

    #[error("Required class {0} is not in the allowed class set")]
    RequiredNotAllowed(u8),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
