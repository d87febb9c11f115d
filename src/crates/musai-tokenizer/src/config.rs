use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TokenizerError};

/// Tokenization algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "UPPERCASE")]
pub enum Algorithm {
    /// REMI+: bar/position grid, one program token per note
    Remi,
    /// Multi-Track Music Machine: one token block per track
    Mmm,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Remi => write!(f, "REMI"),
            Algorithm::Mmm => write!(f, "MMM"),
        }
    }
}

/// Sampling resolution for a span of beats, used to build duration tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatRes {
    pub start: u32,
    pub end: u32,
    pub res: u32,
}

/// A duration value: `beats + pos / res` beats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationValue {
    pub beats: u32,
    pub pos: u32,
    pub res: u32,
}

impl DurationValue {
    /// Length in time units of `1 / max_res` beat
    pub fn units(&self, max_res: u32) -> u32 {
        self.beats * max_res + self.pos * max_res / self.res
    }
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.beats, self.pos, self.res)
    }
}

/// Parameters of the token vocabulary and of the time/velocity/tempo quantization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub pitch_range: (u8, u8),
    pub beat_res: Vec<BeatRes>,
    pub nb_velocities: u8,
    pub nb_tempos: u32,
    pub tempo_range: (u32, u32),
    pub time_signature_denominators: Vec<u8>,
    pub max_numerator: u8,
    pub chords: bool,
    pub tempos: bool,
    pub time_signatures: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            pitch_range: (21, 108),
            beat_res: vec![
                BeatRes { start: 0, end: 4, res: 8 },
                BeatRes { start: 4, end: 12, res: 4 },
            ],
            nb_velocities: 24,
            nb_tempos: 24,
            tempo_range: (40, 250),
            time_signature_denominators: vec![2, 4, 8],
            max_numerator: 12,
            chords: true,
            tempos: true,
            time_signatures: true,
        }
    }
}

impl TokenizerConfig {
    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.pitch_range;
        if low > high || high > 127 {
            return Err(TokenizerError::Config(format!(
                "invalid pitch range {}..={}",
                low, high
            )));
        }
        if self.beat_res.is_empty() || self.beat_res.iter().any(|b| b.res == 0 || b.start >= b.end) {
            return Err(TokenizerError::Config("invalid beat resolution".to_string()));
        }
        // Bars of every supported signature must span a whole number of positions
        if self
            .time_signature_denominators
            .iter()
            .any(|&d| d == 0 || (4 * self.max_res()) % d as u32 != 0)
        {
            return Err(TokenizerError::Config(format!(
                "beat resolution {} cannot express every time signature denominator",
                self.max_res()
            )));
        }
        if self.nb_velocities == 0 || (self.tempos && self.nb_tempos < 2) {
            return Err(TokenizerError::Config("empty velocity or tempo bins".to_string()));
        }
        if self.tempo_range.0 == 0 || self.tempo_range.0 >= self.tempo_range.1 {
            return Err(TokenizerError::Config("invalid tempo range".to_string()));
        }
        if self.max_numerator == 0
            || self.time_signature_denominators.is_empty()
            || self.time_signature_denominators.iter().any(|d| !d.is_power_of_two())
        {
            return Err(TokenizerError::Config("invalid time signature range".to_string()));
        }
        Ok(())
    }

    /// Samples per beat used for positions: the finest beat resolution
    pub fn max_res(&self) -> u32 {
        self.beat_res.iter().map(|b| b.res).max().unwrap_or(8)
    }

    /// Smallest `ticks_per_beat` a file may have to be quantized without loss
    pub fn min_ticks_per_beat(&self) -> u32 {
        self.max_res() * 4
    }

    pub fn pitch_contains(&self, pitch: u8) -> bool {
        pitch >= self.pitch_range.0 && pitch <= self.pitch_range.1
    }

    /// Velocity bins: `floor(i * 127 / n)` for `i` in `1..=n`
    pub fn velocities(&self) -> Vec<u8> {
        let n = self.nb_velocities as u32;
        (1..=n).map(|i| (i * 127 / n) as u8).collect()
    }

    /// Tempo bins, evenly spaced over the tempo range and rounded to whole BPM
    pub fn tempo_bins(&self) -> Vec<u32> {
        let (low, high) = self.tempo_range;
        let steps = self.nb_tempos.max(2) - 1;
        let mut bins: Vec<u32> = (0..=steps)
            .map(|i| {
                let value = low as f64 + (high - low) as f64 * i as f64 / steps as f64;
                value.round() as u32
            })
            .collect();
        bins.dedup();
        bins
    }

    /// Every duration value, ascending, without the zero duration
    pub fn durations(&self) -> Vec<DurationValue> {
        let mut durations = Vec::new();
        for span in &self.beat_res {
            for beats in span.start..span.end {
                for pos in 0..span.res {
                    if beats == 0 && pos == 0 {
                        continue;
                    }
                    durations.push(DurationValue {
                        beats,
                        pos,
                        res: span.res,
                    });
                }
            }
        }
        if let Some(last) = self.beat_res.iter().max_by_key(|b| b.end) {
            durations.push(DurationValue {
                beats: last.end,
                pos: 0,
                res: last.res,
            });
        }
        durations
    }

    pub fn time_signature_supported(&self, numerator: u8, denominator: u8) -> bool {
        numerator >= 1
            && numerator <= self.max_numerator
            && self.time_signature_denominators.contains(&denominator)
    }

    /// Longest bar, in position units
    pub fn max_bar_units(&self) -> u32 {
        let min_den = self
            .time_signature_denominators
            .iter()
            .copied()
            .min()
            .unwrap_or(4) as u32;
        if self.time_signatures {
            self.max_numerator as u32 * 4 * self.max_res() / min_den
        } else {
            4 * self.max_res()
        }
    }
}

/// Index of the value closest to `target`, ties going to the lower value
pub fn nearest<T: Copy>(values: &[T], target: f64, as_f64: impl Fn(T) -> f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, v) in values.iter().enumerate() {
        let dist = (as_f64(*v) - target).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TokenizerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_res(), 8);
        assert_eq!(config.min_ticks_per_beat(), 32);
    }

    #[test]
    fn test_velocity_bins() {
        let bins = TokenizerConfig::default().velocities();
        assert_eq!(bins.len(), 24);
        assert_eq!(bins[0], 5);
        assert_eq!(bins[23], 127);
        assert!(bins.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_tempo_bins() {
        let bins = TokenizerConfig::default().tempo_bins();
        assert_eq!(bins.len(), 24);
        assert_eq!(bins[0], 40);
        assert_eq!(*bins.last().unwrap(), 250);
    }

    #[test]
    fn test_duration_table() {
        let config = TokenizerConfig::default();
        let durations = config.durations();
        // 31 eighth-beat steps below 4 beats, 32 quarter-beat steps up to 12, plus 12 beats
        assert_eq!(durations.len(), 31 + 32 + 1);
        assert_eq!(durations[0].to_string(), "0.1.8");
        assert_eq!(durations[0].units(8), 1);
        assert_eq!(durations.last().unwrap().to_string(), "12.0.4");
        assert_eq!(durations.last().unwrap().units(8), 96);
        let units: Vec<u32> = durations.iter().map(|d| d.units(8)).collect();
        assert!(units.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_nearest_prefers_lower_on_tie() {
        let values = [10u32, 20, 30];
        assert_eq!(nearest(&values, 15.0, |v| v as f64), 0);
        assert_eq!(nearest(&values, 26.0, |v| v as f64), 2);
        assert_eq!(nearest(&values, 100.0, |v| v as f64), 2);
    }

    #[test]
    fn test_time_signature_support() {
        let config = TokenizerConfig::default();
        assert!(config.time_signature_supported(4, 4));
        assert!(config.time_signature_supported(7, 8));
        assert!(!config.time_signature_supported(4, 16));
        assert!(!config.time_signature_supported(13, 4));
        assert_eq!(config.max_bar_units(), 12 * 4 * 8 / 2);
    }
}
