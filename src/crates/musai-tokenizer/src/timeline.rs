//! Bar layout and value quantization shared by the REMI and MMM encoders
//!
//! Encoders work on a score resampled to `max_res` ticks per beat, so one tick is one
//! position unit.

use crate::config::{nearest, DurationValue, TokenizerConfig};
use crate::midi::{Score, TimeSignature};

/// One bar of the time grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bar {
    pub start: u32,
    pub len: u32,
    pub numerator: u8,
    pub denominator: u8,
    /// First bar, or the signature differs from the previous bar's
    pub signature_changed: bool,
}

impl Bar {
    pub fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// Lay out bars from tick 0 until the bar containing `until`
///
/// A time signature change takes effect at the first bar starting at or after it.
/// Without time signature tokens every bar is 4/4.
pub fn bar_layout(score: &Score, until: u32, use_signatures: bool) -> Vec<Bar> {
    let res = score.ticks_per_beat;
    let default = TimeSignature::new(0, 4, 4);
    let signatures: &[TimeSignature] = if use_signatures {
        &score.time_signatures
    } else {
        &[]
    };

    let mut bars: Vec<Bar> = Vec::new();
    let mut current = signatures.first().copied().unwrap_or(default);
    let mut next = 1;
    let mut start = 0;

    loop {
        while next < signatures.len() && signatures[next].time <= start {
            current = signatures[next];
            next += 1;
        }

        let signature_changed = bars.last().map_or(true, |prev| {
            prev.numerator != current.numerator || prev.denominator != current.denominator
        });
        let len = current.bar_ticks(res).max(1);
        bars.push(Bar {
            start,
            len,
            numerator: current.numerator,
            denominator: current.denominator,
            signature_changed,
        });

        start += len;
        if start > until {
            break;
        }
    }

    bars
}

/// Maps raw velocities, durations and tempos onto the vocabulary's bins
#[derive(Debug, Clone)]
pub struct Quantizer {
    velocities: Vec<u8>,
    durations: Vec<DurationValue>,
    duration_units: Vec<u32>,
    tempos: Vec<u32>,
    res: u32,
}

impl Quantizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        let res = config.max_res();
        let durations = config.durations();
        Quantizer {
            velocities: config.velocities(),
            duration_units: durations.iter().map(|d| d.units(res)).collect(),
            durations,
            tempos: config.tempo_bins(),
            res,
        }
    }

    pub fn velocity(&self, velocity: u8) -> u8 {
        self.velocities[nearest(&self.velocities, velocity as f64, |v| v as f64)]
    }

    pub fn duration(&self, units: u32) -> DurationValue {
        self.durations[nearest(&self.duration_units, units as f64, |u| u as f64)]
    }

    pub fn tempo(&self, bpm: f64) -> u32 {
        self.tempos[nearest(&self.tempos, bpm, |t| t as f64)]
    }

    /// Units of a `beats.pos.res` duration value
    pub fn parse_duration(&self, value: &str) -> Option<u32> {
        let mut parts = value.split('.').map(|p| p.parse::<u32>().ok());
        let beats = parts.next()??;
        let pos = parts.next()??;
        let res = parts.next()??;
        if res == 0 || parts.next().is_some() {
            return None;
        }
        Some(DurationValue { beats, pos, res }.units(self.res))
    }
}

/// `(program, is_drum)` from a `Program_` token value
pub fn parse_program(value: &str) -> Option<(u8, bool)> {
    match value.parse::<i16>().ok()? {
        -1 => Some((0, true)),
        p @ 0..=127 => Some((p as u8, false)),
        _ => None,
    }
}

/// `(numerator, denominator)` from a `TimeSig_` token value
pub fn parse_time_signature(value: &str) -> Option<(u8, u8)> {
    let (num, den) = value.split_once('/')?;
    let num = num.parse().ok()?;
    let den = den.parse().ok()?;
    (num > 0 && den > 0).then_some((num, den))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_layout_with_signature_change() {
        let mut score = Score::new(8);
        score.time_signatures = vec![TimeSignature::new(0, 4, 4), TimeSignature::new(40, 3, 4)];

        let bars = bar_layout(&score, 100, true);
        let starts: Vec<u32> = bars.iter().map(|b| b.start).collect();
        // 4/4 bars of 32 units, the change at 40 applies from the bar at 64
        assert_eq!(starts, vec![0, 32, 64, 88]);
        assert!(bars[0].signature_changed);
        assert!(!bars[1].signature_changed);
        assert!(bars[2].signature_changed);
        assert_eq!(bars[2].len, 24);
        assert_eq!(bars.last().unwrap().end(), 112);
    }

    #[test]
    fn test_bar_layout_ignores_signatures_when_disabled() {
        let mut score = Score::new(8);
        score.time_signatures = vec![TimeSignature::new(0, 3, 4)];
        let bars = bar_layout(&score, 0, false);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].len, 32);
    }

    #[test]
    fn test_quantizer() {
        let q = Quantizer::new(&TokenizerConfig::default());
        assert_eq!(q.velocity(100), 100);
        assert_eq!(q.velocity(0), 5);
        assert_eq!(q.duration(8).to_string(), "1.0.8");
        assert_eq!(q.duration(33).to_string(), "4.0.4");
        assert_eq!(q.duration(1000).to_string(), "12.0.4");
        assert_eq!(q.tempo(250.0), 250);
        assert_eq!(q.parse_duration("4.2.4"), Some(36));
        assert_eq!(q.parse_duration("4.2"), None);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_program("-1"), Some((0, true)));
        assert_eq!(parse_program("33"), Some((33, false)));
        assert_eq!(parse_program("128"), None);
        assert_eq!(parse_time_signature("6/8"), Some((6, 8)));
        assert_eq!(parse_time_signature("6"), None);
    }
}
