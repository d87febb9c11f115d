use std::path::PathBuf;

/// Tokenizer errors
#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("Failed to parse MIDI: {0}")]
    MidiParse(#[from] midly::Error),

    #[error("SMPTE timecode timing is not supported, only metrical timing")]
    UnsupportedTiming,

    #[error("Track {track} runs past the last representable tick")]
    TickOverflow { track: usize },

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("Token id {id} is outside the vocabulary (size {size})")]
    UnknownId { id: u32, size: usize },

    #[error("Malformed token sequence at index {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("Token params not found at {0}")]
    MissingParams(PathBuf),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] musai_core::CoreError),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TokenizerError {
    pub fn decode(index: usize, message: impl Into<String>) -> Self {
        TokenizerError::Decode {
            index,
            message: message.into(),
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        TokenizerError::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
