//! Token vocabulary: `Type_Value` strings mapped to dense integer ids

use std::collections::HashMap;

use crate::chord::CHORD_QUALITIES;
use crate::config::{Algorithm, TokenizerConfig};
use crate::error::{Result, TokenizerError};

pub const PAD: &str = "PAD_None";
pub const BOS: &str = "BOS_None";
pub const EOS: &str = "EOS_None";
pub const MASK: &str = "MASK_None";

/// Special tokens, always ids 0 to 3
pub const SPECIAL_TOKENS: [&str; 4] = [PAD, BOS, EOS, MASK];

pub const BAR: &str = "Bar_None";
pub const TRACK_START: &str = "Track_Start";
pub const TRACK_END: &str = "Track_End";
pub const BAR_START: &str = "Bar_Start";
pub const BAR_END: &str = "Bar_End";

/// Split a token into its type and value at the first underscore
pub fn split_token(token: &str) -> (&str, &str) {
    token.split_once('_').unwrap_or((token, ""))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    tokens: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Vocab {
    /// Build the base vocabulary of an algorithm from a configuration
    pub fn build(config: &TokenizerConfig, algorithm: Algorithm) -> Self {
        let mut tokens: Vec<String> = SPECIAL_TOKENS.iter().map(|s| s.to_string()).collect();
        let bar_units = config.max_bar_units();

        match algorithm {
            Algorithm::Remi => {
                tokens.push(BAR.to_string());
                tokens.extend((0..bar_units).map(|p| format!("Position_{}", p)));
            }
            Algorithm::Mmm => {
                tokens.extend([TRACK_START, TRACK_END, BAR_START, BAR_END].map(String::from));
                tokens.extend((1..bar_units).map(|t| format!("TimeShift_{}", t)));
            }
        }

        let (low, high) = config.pitch_range;
        tokens.extend((low..=high).map(|p| format!("Pitch_{}", p)));
        tokens.extend(config.velocities().iter().map(|v| format!("Velocity_{}", v)));
        tokens.extend(config.durations().iter().map(|d| format!("Duration_{}", d)));
        tokens.push("Program_-1".to_string());
        tokens.extend((0..=127).map(|p| format!("Program_{}", p)));

        if config.chords {
            tokens.extend(CHORD_QUALITIES.iter().map(|(name, _)| format!("Chord_{}", name)));
        }
        if config.tempos {
            tokens.extend(config.tempo_bins().iter().map(|t| format!("Tempo_{}", t)));
        }
        if config.time_signatures {
            for &den in &config.time_signature_denominators {
                for num in 1..=config.max_numerator {
                    tokens.push(format!("TimeSig_{}/{}", num, den));
                }
            }
        }

        Vocab::from_tokens(tokens)
    }

    /// Rebuild a vocabulary from a stored token list, keeping its id order
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let ids = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Vocab { tokens, ids }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn id(&self, token: &str) -> Result<u32> {
        self.ids
            .get(token)
            .copied()
            .ok_or_else(|| TokenizerError::UnknownToken(token.to_string()))
    }

    pub fn token(&self, id: u32) -> Result<&str> {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .ok_or(TokenizerError::UnknownId {
                id,
                size: self.tokens.len(),
            })
    }

    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<u32>> {
        tokens.iter().map(|t| self.id(t.as_ref())).collect()
    }

    pub fn decode(&self, ids: &[u32]) -> Result<Vec<&str>> {
        ids.iter().map(|&id| self.token(id)).collect()
    }

    pub fn eos_id(&self) -> u32 {
        2
    }

    /// Number of leading ids reserved for special tokens
    pub fn special_count(&self) -> u32 {
        SPECIAL_TOKENS.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_tokens_first() {
        for algorithm in [Algorithm::Remi, Algorithm::Mmm] {
            let vocab = Vocab::build(&TokenizerConfig::default(), algorithm);
            assert_eq!(vocab.id(PAD).unwrap(), 0);
            assert_eq!(vocab.id(EOS).unwrap(), vocab.eos_id());
            assert_eq!(vocab.id(MASK).unwrap(), 3);
        }
    }

    #[test]
    fn test_algorithm_specific_tokens() {
        let config = TokenizerConfig::default();
        let remi = Vocab::build(&config, Algorithm::Remi);
        let mmm = Vocab::build(&config, Algorithm::Mmm);

        assert!(remi.id(BAR).is_ok());
        assert!(remi.id("Position_191").is_ok());
        assert!(remi.id(TRACK_START).is_err());
        assert!(mmm.id(TRACK_START).is_ok());
        assert!(mmm.id("TimeShift_191").is_ok());
        assert!(mmm.id("Position_0").is_err());
    }

    #[test]
    fn test_ids_are_dense_and_unique() {
        let vocab = Vocab::build(&TokenizerConfig::default(), Algorithm::Remi);
        for (i, token) in vocab.tokens().iter().enumerate() {
            assert_eq!(vocab.id(token).unwrap(), i as u32);
        }
        assert!(vocab.id("Program_-1").is_ok());
        assert!(vocab.id("Duration_12.0.4").is_ok());
        assert!(vocab.id("TimeSig_7/8").is_ok());
        assert!(vocab.id("Chord_maj").is_ok());
    }

    #[test]
    fn test_unknown_lookups() {
        let vocab = Vocab::build(&TokenizerConfig::default(), Algorithm::Mmm);
        assert!(matches!(vocab.id("Pitch_10"), Err(TokenizerError::UnknownToken(_))));
        assert!(matches!(
            vocab.token(vocab.len() as u32),
            Err(TokenizerError::UnknownId { .. })
        ));
    }

    #[test]
    fn test_split_token() {
        assert_eq!(split_token("Program_-1"), ("Program", "-1"));
        assert_eq!(split_token("Duration_1.4.8"), ("Duration", "1.4.8"));
        assert_eq!(split_token("Bar_None"), ("Bar", "None"));
    }
}
