use musai_core::{ClassFilter, ClassSet, InstrumentClass};
use std::fmt;

use crate::config::TokenizerConfig;
use crate::midi::{Score, Track};

/// Groups of classes whose tracks are merged into one track per class
pub const MERGED_CLASSES: [u8; 9] = [
    1, 14, 16, // percussion and drums
    10, 11, // synths
    5, 6, // strings
    3, 4, // guitar and bass
];

/// Why a file was left out of the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    LowResolution { ticks_per_beat: u32, minimum: u32 },
    NoTracks,
    MissingClasses(ClassSet),
    TooShort { beats: u32, minimum: u32 },
    UnsupportedTimeSignature { numerator: u8, denominator: u8 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::LowResolution { ticks_per_beat, minimum } => {
                write!(f, "{} ticks per beat, at least {} needed", ticks_per_beat, minimum)
            }
            Rejection::NoTracks => write!(f, "no tracks left after filtering"),
            Rejection::MissingClasses(classes) => write!(f, "missing required classes {}", classes),
            Rejection::TooShort { beats, minimum } => {
                write!(f, "{} beats long, at least {} needed", beats, minimum)
            }
            Rejection::UnsupportedTimeSignature { numerator, denominator } => {
                write!(f, "unsupported time signature {}/{}", numerator, denominator)
            }
        }
    }
}

/// Cleans a parsed score before tokenization
///
/// Drops the tracks of classes the filter does not allow, out-of-range pitches and
/// duplicate notes, merges tracks of the merge groups, then checks the required
/// classes and the minimum length.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    filter: ClassFilter,
    min_beats: u32,
    merge: bool,
    config: TokenizerConfig,
}

impl Preprocessor {
    pub fn new(config: &TokenizerConfig, filter: ClassFilter, min_beats: u32, merge: bool) -> Self {
        Self {
            filter,
            min_beats,
            merge,
            config: config.clone(),
        }
    }

    pub fn filter(&self) -> &ClassFilter {
        &self.filter
    }

    pub fn process(&self, mut score: Score) -> Result<Score, Rejection> {
        let minimum = self.config.min_ticks_per_beat();
        if score.ticks_per_beat < minimum {
            return Err(Rejection::LowResolution {
                ticks_per_beat: score.ticks_per_beat,
                minimum,
            });
        }

        if self.config.time_signatures {
            if let Some(ts) = score
                .time_signatures
                .iter()
                .find(|ts| !self.config.time_signature_supported(ts.numerator, ts.denominator))
            {
                return Err(Rejection::UnsupportedTimeSignature {
                    numerator: ts.numerator,
                    denominator: ts.denominator,
                });
            }
        }

        score.tracks.retain(|track| self.filter.allows(track.class()));

        for track in &mut score.tracks {
            track.notes.retain(|n| self.config.pitch_contains(n.pitch));
            dedup_notes(track);
        }
        score.tracks.retain(|track| !track.notes.is_empty());

        if self.merge {
            merge_tracks_per_class(&mut score, &MERGED_CLASSES);
        }
        score.tracks.sort_by_key(|t| t.program_key());

        if score.tracks.is_empty() {
            return Err(Rejection::NoTracks);
        }

        let present = score.present_classes();
        if !self.filter.accepts(&present) {
            return Err(Rejection::MissingClasses(present.missing_from(&self.filter.required())));
        }

        let beats = score.length_beats();
        if beats < self.min_beats {
            return Err(Rejection::TooShort {
                beats,
                minimum: self.min_beats,
            });
        }

        Ok(score)
    }
}

/// Keep one note per (onset, pitch), the first one in sorted order
fn dedup_notes(track: &mut Track) {
    track.sort_notes();
    track.notes.dedup_by(|b, a| a.start == b.start && a.pitch == b.pitch);
}

/// Merge, for each listed class, every track of that class into its first track
pub fn merge_tracks_per_class(score: &mut Score, classes: &[u8]) {
    for class in classes.iter().filter_map(|&c| InstrumentClass::new(c)) {
        let indices: Vec<usize> = score
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.class() == class)
            .map(|(i, _)| i)
            .collect();

        let Some((&first, rest)) = indices.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        // Remove from the back so the remaining indices stay valid
        let mut merged_notes = Vec::new();
        for &idx in rest.iter().rev() {
            merged_notes.extend(score.tracks.remove(idx).notes);
        }

        let target = &mut score.tracks[first];
        target.notes.extend(merged_notes);
        dedup_notes(target);
    }
}
