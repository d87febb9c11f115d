//! MIDI to token conversion for MusAI
//!
//! A MIDI file goes through four steps before it lands in the corpus:
//!
//! 1. [`Score::from_file`] parses it into tracks of notes, a tempo map and time signatures
//! 2. [`Preprocessor::process`] drops disallowed classes and out-of-range notes, merges
//!    tracks per class and checks the required classes and the minimum length
//! 3. [`MidiTokenizer::encode`] quantizes the score and writes it as REMI+ or MMM tokens
//! 4. the ids are saved as a [`TokenFile`], and [`Bpe`] can later compress the corpus
//!
//! # Examples
//!
//! ```
//! use musai_tokenizer::{Algorithm, MidiTokenizer, Note, Score, TokenizerConfig, Track};
//!
//! let mut score = Score::new(480);
//! let mut piano = Track::new(0, false);
//! piano.notes.push(Note::new(0, 480, 60, 100));
//! score.tracks.push(piano);
//!
//! let tokenizer = MidiTokenizer::new(TokenizerConfig::default(), Algorithm::Remi).unwrap();
//! let tokens = tokenizer.tokenize(&score).unwrap();
//! assert_eq!(
//!     tokens[..4],
//!     ["Bar_None", "TimeSig_4/4", "Position_0", "Tempo_122"]
//! );
//!
//! let ids = tokenizer.encode(&score).unwrap();
//! let decoded = tokenizer.decode(&ids).unwrap();
//! assert_eq!(decoded.tracks[0].notes, vec![Note::new(0, 8, 60, 100)]);
//! ```

pub mod bpe;
pub mod chord;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod dispatch;
pub mod error;
pub mod midi;
pub mod mmm;
pub mod params;
pub mod pipeline;
pub mod remi;
pub mod timeline;
pub mod tokenizer;
pub mod track;
pub mod vocab;
pub mod writer;

pub use bpe::{Bpe, Merge};
pub use config::{Algorithm, TokenizerConfig};
pub use corpus::{load_tokens, save_tokens, TokenFile};
pub use dispatch::{Dispatcher, ExecutionMode, FileResult, Outcome};
pub use error::{Result, TokenizerError};
pub use midi::{Note, Score, TempoChange, TimeSignature, Track};
pub use params::{TokenParams, TOKEN_PARAMS_NAME};
pub use pipeline::{extract, learn_and_apply_bpe, ExtractOptions, ExtractSummary, BPE_DIR};
pub use tokenizer::MidiTokenizer;
pub use track::{Preprocessor, Rejection};
pub use vocab::Vocab;
pub use writer::{save_midi, write_midi};
