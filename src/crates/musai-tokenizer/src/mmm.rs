//! MMM (Multi-Track Music Machine) encoding: tracks are serialized one after another,
//! each as a sequence of bars with time shifts between onsets
//!
//! ```text
//! Track_Start Program_0
//!   Bar_Start TimeSig_4/4 Tempo_122 Pitch_60 Velocity_100 Duration_1.0.8
//!     TimeShift_8 Pitch_62 ... Bar_End
//!   Bar_Start ... Bar_End
//! Track_End
//! ```

use crate::chord::detect_chord;
use crate::config::TokenizerConfig;
use crate::error::{Result, TokenizerError};
use crate::midi::{Note, Score, TempoChange, TimeSignature, Track};
use crate::timeline::{bar_layout, parse_program, parse_time_signature, Quantizer};
use crate::vocab::{split_token, BAR_END, BAR_START, TRACK_END, TRACK_START};

/// Encode a score already resampled to `config.max_res()` ticks per beat
pub fn encode(score: &Score, config: &TokenizerConfig) -> Result<Vec<String>> {
    let Some(last_onset) = score.last_onset() else {
        return Ok(Vec::new());
    };
    let quantizer = Quantizer::new(config);
    let bars = bar_layout(score, last_onset, config.time_signatures);
    let mut tokens = Vec::new();

    for (track_idx, track) in score.tracks.iter().enumerate() {
        tokens.push(TRACK_START.to_string());
        tokens.push(format!("Program_{}", track.program_key()));

        let mut notes: Vec<&Note> = track.notes.iter().collect();
        notes.sort_by_key(|n| (n.start, n.pitch, n.end));
        let mut idx = 0;
        let mut last_tempo: Option<u32> = None;

        for bar in &bars {
            tokens.push(BAR_START.to_string());
            if config.time_signatures && bar.signature_changed {
                tokens.push(format!("TimeSig_{}/{}", bar.numerator, bar.denominator));
            }

            let mut cursor = bar.start;
            while idx < notes.len() && notes[idx].start < bar.end() {
                let onset = notes[idx].start;
                let group_len = notes[idx..].iter().take_while(|n| n.start == onset).count();
                let group = &notes[idx..idx + group_len];
                idx += group_len;

                if onset > cursor {
                    tokens.push(format!("TimeShift_{}", onset - cursor));
                    cursor = onset;
                }

                // The tempo map travels with the first track only
                if config.tempos && track_idx == 0 {
                    let tempo = quantizer.tempo(score.tempo_at(onset));
                    if last_tempo != Some(tempo) {
                        tokens.push(format!("Tempo_{}", tempo));
                        last_tempo = Some(tempo);
                    }
                }

                if config.chords && !track.is_drum {
                    if let Some(quality) = detect_chord(group) {
                        tokens.push(format!("Chord_{}", quality));
                    }
                }

                for note in group {
                    tokens.push(format!("Pitch_{}", note.pitch));
                    tokens.push(format!("Velocity_{}", quantizer.velocity(note.velocity)));
                    tokens.push(format!("Duration_{}", quantizer.duration(note.duration())));
                }
            }

            tokens.push(BAR_END.to_string());
        }

        tokens.push(TRACK_END.to_string());
    }

    Ok(tokens)
}

/// Decode MMM tokens into a score at `config.max_res()` ticks per beat
pub fn decode<S: AsRef<str>>(tokens: &[S], config: &TokenizerConfig) -> Result<Score> {
    let res = config.max_res();
    let quantizer = Quantizer::new(config);

    let mut score = Score::new(res);
    score.tempos.clear();
    score.time_signatures.clear();

    let mut current: Option<Track> = None;
    let mut signature = TimeSignature::new(0, 4, 4);
    let mut bar_start: Option<u32> = None;
    let mut time = 0;
    let mut pitch: Option<u8> = None;
    let mut velocity: Option<u8> = None;

    for (index, token) in tokens.iter().enumerate() {
        let token = token.as_ref();
        let (kind, value) = split_token(token);
        let bad_value = || TokenizerError::decode(index, format!("bad value in {}", token));
        let no_track = || TokenizerError::decode(index, format!("{} outside of a track", token));

        match (kind, value) {
            ("Track", "Start") => {
                if let Some(track) = current.take() {
                    score.tracks.push(track);
                }
                current = Some(Track::new(0, false));
                signature = TimeSignature::new(0, 4, 4);
                bar_start = None;
                time = 0;
            }
            ("Track", "End") => {
                score.tracks.push(current.take().ok_or_else(no_track)?);
            }
            ("Program", _) => {
                let (program, is_drum) = parse_program(value).ok_or_else(bad_value)?;
                let track = current.as_mut().ok_or_else(no_track)?;
                track.program = program;
                track.is_drum = is_drum;
            }
            ("Bar", "Start") => {
                let start = bar_start.map_or(0, |s| s + signature.bar_ticks(res));
                bar_start = Some(start);
                time = start;
            }
            ("Bar", "End") => {}
            ("TimeSig", _) => {
                let (num, den) = parse_time_signature(value).ok_or_else(bad_value)?;
                signature = TimeSignature::new(bar_start.unwrap_or(0), num, den);
                score.time_signatures.push(signature);
            }
            ("TimeShift", _) => {
                time += value.parse::<u32>().map_err(|_| bad_value())?;
            }
            ("Tempo", _) => {
                let bpm = value.parse::<f64>().map_err(|_| bad_value())?;
                score.tempos.push(TempoChange { time, bpm });
            }
            ("Pitch", _) => pitch = Some(value.parse().map_err(|_| bad_value())?),
            ("Velocity", _) => {
                if pitch.is_none() {
                    return Err(TokenizerError::decode(index, "Velocity without Pitch"));
                }
                velocity = Some(value.parse().map_err(|_| bad_value())?);
            }
            ("Duration", _) => {
                let (Some(p), Some(v)) = (pitch.take(), velocity.take()) else {
                    return Err(TokenizerError::decode(index, "Duration without Pitch and Velocity"));
                };
                let units = quantizer.parse_duration(value).ok_or_else(bad_value)?;
                current
                    .as_mut()
                    .ok_or_else(no_track)?
                    .notes
                    .push(Note::new(time, time + units, p, v));
            }
            ("Chord" | "PAD" | "BOS" | "EOS" | "MASK", _) => {}
            _ => {
                return Err(TokenizerError::decode(index, format!("unexpected token {}", token)))
            }
        }
    }

    // A truncated sequence (generation cut short) still yields its last track
    if let Some(track) = current.take() {
        score.tracks.push(track);
    }
    for track in &mut score.tracks {
        track.sort_notes();
    }
    score.normalize_meta();
    Ok(score)
}
