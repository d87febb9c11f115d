//! REMI+ encoding: a bar/position grid shared by all tracks
//!
//! ```text
//! Bar_None TimeSig_4/4 Position_0 Tempo_122 Chord_maj
//!   Program_0 Pitch_60 Velocity_100 Duration_1.0.8
//!   Program_0 Pitch_64 Velocity_100 Duration_1.0.8 ...
//! ```

use std::collections::BTreeMap;

use crate::chord::detect_chord;
use crate::config::TokenizerConfig;
use crate::error::{Result, TokenizerError};
use crate::midi::{Note, Score, TempoChange, TimeSignature, Track};
use crate::timeline::{bar_layout, parse_program, parse_time_signature, Quantizer};
use crate::vocab::{split_token, BAR};

/// Encode a score already resampled to `config.max_res()` ticks per beat
pub fn encode(score: &Score, config: &TokenizerConfig) -> Result<Vec<String>> {
    let Some(last_onset) = score.last_onset() else {
        return Ok(Vec::new());
    };
    let quantizer = Quantizer::new(config);
    let bars = bar_layout(score, last_onset, config.time_signatures);

    let mut events: Vec<(i16, &Note)> = score
        .tracks
        .iter()
        .flat_map(|t| t.notes.iter().map(move |n| (t.program_key(), n)))
        .collect();
    events.sort_by_key(|(program, n)| (n.start, *program, n.pitch, n.end));

    let mut tokens = Vec::new();
    let mut last_tempo: Option<u32> = None;
    let mut idx = 0;

    for bar in &bars {
        tokens.push(BAR.to_string());
        if config.time_signatures && bar.signature_changed {
            tokens.push(format!("TimeSig_{}/{}", bar.numerator, bar.denominator));
        }

        while idx < events.len() && events[idx].1.start < bar.end() {
            let onset = events[idx].1.start;
            let group_len = events[idx..]
                .iter()
                .take_while(|(_, n)| n.start == onset)
                .count();
            let group = &events[idx..idx + group_len];
            idx += group_len;

            tokens.push(format!("Position_{}", onset - bar.start));

            if config.tempos {
                let tempo = quantizer.tempo(score.tempo_at(onset));
                if last_tempo != Some(tempo) {
                    tokens.push(format!("Tempo_{}", tempo));
                    last_tempo = Some(tempo);
                }
            }

            // Group is sorted by program, walk it one program at a time
            let mut start = 0;
            while start < group.len() {
                let program = group[start].0;
                let end = start
                    + group[start..]
                        .iter()
                        .take_while(|(p, _)| *p == program)
                        .count();
                let notes: Vec<&Note> = group[start..end].iter().map(|(_, n)| *n).collect();

                if config.chords && program >= 0 {
                    if let Some(quality) = detect_chord(&notes) {
                        tokens.push(format!("Chord_{}", quality));
                    }
                }

                for note in notes {
                    tokens.push(format!("Program_{}", program));
                    tokens.push(format!("Pitch_{}", note.pitch));
                    tokens.push(format!("Velocity_{}", quantizer.velocity(note.velocity)));
                    tokens.push(format!("Duration_{}", quantizer.duration(note.duration())));
                }
                start = end;
            }
        }
    }

    Ok(tokens)
}

/// Decode REMI+ tokens into a score at `config.max_res()` ticks per beat
pub fn decode<S: AsRef<str>>(tokens: &[S], config: &TokenizerConfig) -> Result<Score> {
    let res = config.max_res();
    let quantizer = Quantizer::new(config);

    let mut score = Score::new(res);
    score.tempos.clear();
    score.time_signatures.clear();

    let mut tracks: BTreeMap<i16, Track> = BTreeMap::new();
    let mut signature = TimeSignature::new(0, 4, 4);
    let mut bar_start: Option<u32> = None;
    let mut time = 0;
    let mut program: (u8, bool) = (0, false);
    let mut pitch: Option<u8> = None;
    let mut velocity: Option<u8> = None;

    for (index, token) in tokens.iter().enumerate() {
        let (kind, value) = split_token(token.as_ref());
        let bad_value = || TokenizerError::decode(index, format!("bad value in {}", token.as_ref()));

        match kind {
            "Bar" => {
                let start = bar_start.map_or(0, |s| s + signature.bar_ticks(res));
                bar_start = Some(start);
                time = start;
            }
            "TimeSig" => {
                let (num, den) = parse_time_signature(value).ok_or_else(bad_value)?;
                signature = TimeSignature::new(bar_start.unwrap_or(0), num, den);
                score.time_signatures.push(signature);
            }
            "Position" => {
                let start = bar_start
                    .ok_or_else(|| TokenizerError::decode(index, "Position before the first Bar"))?;
                time = start + value.parse::<u32>().map_err(|_| bad_value())?;
            }
            "Tempo" => {
                let bpm = value.parse::<f64>().map_err(|_| bad_value())?;
                score.tempos.push(TempoChange { time, bpm });
            }
            "Program" => program = parse_program(value).ok_or_else(bad_value)?,
            "Pitch" => pitch = Some(value.parse().map_err(|_| bad_value())?),
            "Velocity" => {
                if pitch.is_none() {
                    return Err(TokenizerError::decode(index, "Velocity without Pitch"));
                }
                velocity = Some(value.parse().map_err(|_| bad_value())?);
            }
            "Duration" => {
                let (Some(p), Some(v)) = (pitch.take(), velocity.take()) else {
                    return Err(TokenizerError::decode(index, "Duration without Pitch and Velocity"));
                };
                let units = quantizer.parse_duration(value).ok_or_else(bad_value)?;
                let key = if program.1 { -1 } else { program.0 as i16 };
                tracks
                    .entry(key)
                    .or_insert_with(|| Track::new(program.0, program.1))
                    .notes
                    .push(Note::new(time, time + units, p, v));
            }
            "Chord" | "PAD" | "BOS" | "EOS" | "MASK" => {}
            _ => {
                return Err(TokenizerError::decode(
                    index,
                    format!("unexpected token {}", token.as_ref()),
                ))
            }
        }
    }

    score.tracks = tracks
        .into_values()
        .map(|mut t| {
            t.sort_notes();
            t
        })
        .collect();
    score.normalize_meta();
    Ok(score)
}
