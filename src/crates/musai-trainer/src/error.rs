use std::path::PathBuf;

/// Trainer errors
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("Dataset holds {tokens} tokens, more than {required} are needed")]
    DatasetTooSmall { tokens: usize, required: usize },

    #[error("No token files found in {0}")]
    EmptyDataset(PathBuf),

    #[error("Malformed binidx file {path}: {message}")]
    Binidx { path: PathBuf, message: String },

    #[error("Checkpoint not found: {0}")]
    MissingCheckpoint(PathBuf),

    #[error("Training command `{command}` failed: {message}")]
    Backend { command: String, message: String },

    #[error(transparent)]
    Tokenizer(#[from] musai_tokenizer::TokenizerError),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TrainerError {
    pub fn binidx(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TrainerError::Binidx {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn backend(command: impl Into<String>, message: impl Into<String>) -> Self {
        TrainerError::Backend {
            command: command.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;
