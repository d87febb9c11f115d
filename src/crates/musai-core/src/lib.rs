//! Core types and utilities for the MusAI pipeline
//!
//! This crate holds what both the tokenizer and the trainer need: the General MIDI
//! instrument class table, class filters used to select tracks, glob matching for
//! collecting input files and the shared logging setup.
//!
//! # Examples
//!
//! ```
//! use musai_core::{ClassFilter, ClassSet, InstrumentClass};
//!
//! let allowed = ClassSet::parse_list("0,3,4,16").unwrap();
//! let required = ClassSet::parse_list("16").unwrap();
//! let filter = ClassFilter::new(allowed, required).unwrap();
//!
//! assert!(filter.allows(InstrumentClass::of(33, false)));
//! assert!(!filter.allows(InstrumentClass::of(122, false)));
//! ```

pub mod classes;
pub mod error;
pub mod glob;
pub mod instruments;
pub mod logging;

pub use classes::{ClassFilter, ClassSet};
pub use error::{CoreError, Result};
pub use glob::{collect_files, GlobPattern};
pub use instruments::{gm_program_name, InstrumentClass, DRUMS, NUM_CLASSES, SOUND_EFFECTS};
pub use logging::init_logging;
