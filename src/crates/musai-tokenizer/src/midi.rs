use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use musai_core::{ClassSet, InstrumentClass};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use crate::error::{Result, TokenizerError};

/// Default tempo when a file carries none: 120 BPM
pub const DEFAULT_BPM: f64 = 120.0;

/// Channel 10 (index 9) is reserved for percussion in General MIDI
pub const DRUM_CHANNEL: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub start: u32,
    pub end: u32,
    pub pitch: u8,
    pub velocity: u8,
}

impl Note {
    pub fn new(start: u32, end: u32, pitch: u8, velocity: u8) -> Self {
        Note {
            start,
            end,
            pitch,
            velocity,
        }
    }

    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// One instrument: the notes played with a single program on a single channel
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub program: u8,
    pub is_drum: bool,
    pub name: Option<String>,
    pub notes: Vec<Note>,
}

impl Track {
    pub fn new(program: u8, is_drum: bool) -> Self {
        Track {
            program,
            is_drum,
            name: None,
            notes: Vec::new(),
        }
    }

    pub fn class(&self) -> InstrumentClass {
        InstrumentClass::of(self.program, self.is_drum)
    }

    /// Program as written in tokens: drums are `-1`
    pub fn program_key(&self) -> i16 {
        if self.is_drum {
            -1
        } else {
            self.program as i16
        }
    }

    /// Sort notes by onset then pitch
    pub fn sort_notes(&mut self) {
        self.notes
            .sort_by(|a, b| (a.start, a.pitch, a.end).cmp(&(b.start, b.pitch, b.end)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoChange {
    pub time: u32,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub time: u32,
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(time: u32, numerator: u8, denominator: u8) -> Self {
        TimeSignature {
            time,
            numerator,
            denominator,
        }
    }

    /// Bar length in ticks for a given beat (quarter note) resolution
    pub fn bar_ticks(&self, ticks_per_beat: u32) -> u32 {
        ticks_per_beat * 4 * self.numerator as u32 / self.denominator.max(1) as u32
    }
}

/// A parsed MIDI file: tempo map, time signatures and instrument tracks, in ticks
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub ticks_per_beat: u32,
    pub tempos: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignature>,
    pub tracks: Vec<Track>,
}

impl Score {
    /// An empty score with the default tempo and 4/4 at tick 0
    pub fn new(ticks_per_beat: u32) -> Self {
        Score {
            ticks_per_beat,
            tempos: vec![TempoChange {
                time: 0,
                bpm: DEFAULT_BPM,
            }],
            time_signatures: vec![TimeSignature::new(0, 4, 4)],
            tracks: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;

        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int() as u32,
            Timing::Timecode(..) => return Err(TokenizerError::UnsupportedTiming),
        };

        let mut score = Score {
            ticks_per_beat,
            tempos: Vec::new(),
            time_signatures: Vec::new(),
            tracks: Vec::new(),
        };
        // Instruments keyed by (track, channel, program) so output order is stable
        let mut instruments: BTreeMap<(usize, u8, u8), Track> = BTreeMap::new();

        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut tick: u32 = 0;
            let mut programs = [0u8; 16];
            let mut open: HashMap<(u8, u8), VecDeque<(u32, u8, u8)>> = HashMap::new();
            let mut track_name: Option<String> = None;

            for event in track {
                tick = tick
                    .checked_add(event.delta.as_int())
                    .ok_or(TokenizerError::TickOverflow { track: track_idx })?;

                match event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        let ch = channel.as_int();
                        match message {
                            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                                open.entry((ch, key.as_int()))
                                    .or_default()
                                    .push_back((tick, vel.as_int(), programs[ch as usize]));
                            }
                            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                                let pending = open.get_mut(&(ch, key.as_int())).and_then(VecDeque::pop_front);
                                if let Some((start, velocity, program)) = pending {
                                    push_note(
                                        &mut instruments,
                                        (track_idx, ch, program),
                                        Note::new(start, tick, key.as_int(), velocity),
                                    );
                                }
                            }
                            MidiMessage::ProgramChange { program } => {
                                programs[ch as usize] = program.as_int();
                            }
                            _ => {}
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                        let us_per_beat = tempo.as_int().max(1) as f64;
                        score.tempos.push(TempoChange {
                            time: tick,
                            bpm: 60_000_000.0 / us_per_beat,
                        });
                    }
                    TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow, _, _)) => {
                        let denominator = 1u8.checked_shl(den_pow as u32).unwrap_or(0);
                        score
                            .time_signatures
                            .push(TimeSignature::new(tick, num, denominator));
                    }
                    TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                        if let Ok(name_str) = std::str::from_utf8(name) {
                            // Trim null bytes and padding some sequencers leave behind
                            let cleaned = name_str.trim_end_matches('\0').trim();
                            if !cleaned.is_empty() {
                                track_name = Some(cleaned.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }

            // Notes never released end with their track
            for ((ch, key), pending) in open {
                for (start, velocity, program) in pending {
                    push_note(
                        &mut instruments,
                        (track_idx, ch, program),
                        Note::new(start, tick, key, velocity),
                    );
                }
            }

            if let Some(name) = track_name {
                let range = (track_idx, 0, 0)..=(track_idx, 15, 127);
                for (_, instrument) in instruments.range_mut(range) {
                    instrument.name.get_or_insert_with(|| name.clone());
                }
            }
        }

        score.tracks = instruments
            .into_values()
            .map(|mut track| {
                track.notes.retain(|n| n.end > n.start);
                track.sort_notes();
                track
            })
            .filter(|track| !track.notes.is_empty())
            .collect();
        score.normalize_meta();

        Ok(score)
    }

    /// Sort tempo and time signature maps, keep the last event per tick and make sure
    /// both maps start at tick 0
    pub fn normalize_meta(&mut self) {
        self.tempos.sort_by_key(|t| t.time);
        self.tempos.reverse();
        self.tempos.dedup_by_key(|t| t.time);
        self.tempos.reverse();
        if self.tempos.first().map_or(true, |t| t.time > 0) {
            self.tempos.insert(
                0,
                TempoChange {
                    time: 0,
                    bpm: DEFAULT_BPM,
                },
            );
        }

        self.time_signatures.sort_by_key(|t| t.time);
        self.time_signatures.reverse();
        self.time_signatures.dedup_by_key(|t| t.time);
        self.time_signatures.reverse();
        if self.time_signatures.first().map_or(true, |t| t.time > 0) {
            self.time_signatures.insert(0, TimeSignature::new(0, 4, 4));
        }
    }

    /// Tick at which the last note ends
    pub fn end_tick(&self) -> u32 {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| n.end)
            .max()
            .unwrap_or(0)
    }

    /// Tick of the last note onset
    pub fn last_onset(&self) -> Option<u32> {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| n.start)
            .max()
    }

    /// Length in beats, rounded up
    pub fn length_beats(&self) -> u32 {
        let tpb = self.ticks_per_beat.max(1) as u64;
        ((self.end_tick() as u64 + tpb - 1) / tpb) as u32
    }

    /// Instrument classes of the tracks present
    pub fn present_classes(&self) -> ClassSet {
        self.tracks.iter().map(Track::class).collect()
    }

    /// `(program, is_drum)` for every track, in track order
    pub fn programs(&self) -> Vec<(u8, bool)> {
        self.tracks.iter().map(|t| (t.program, t.is_drum)).collect()
    }

    /// Rescale every time value to a new beat resolution
    ///
    /// Notes keep at least one tick of duration.
    pub fn resample(&self, ticks_per_beat: u32) -> Score {
        let factor = ticks_per_beat as f64 / self.ticks_per_beat.max(1) as f64;
        let scale = |t: u32| (t as f64 * factor).round() as u32;

        let tracks = self
            .tracks
            .iter()
            .map(|track| {
                let mut track = Track {
                    notes: track
                        .notes
                        .iter()
                        .map(|n| {
                            let start = scale(n.start);
                            Note::new(start, scale(n.end).max(start + 1), n.pitch, n.velocity)
                        })
                        .collect(),
                    ..track.clone()
                };
                track.sort_notes();
                track
            })
            .collect();

        let mut score = Score {
            ticks_per_beat,
            tempos: self
                .tempos
                .iter()
                .map(|t| TempoChange {
                    time: scale(t.time),
                    bpm: t.bpm,
                })
                .collect(),
            time_signatures: self
                .time_signatures
                .iter()
                .map(|ts| TimeSignature { time: scale(ts.time), ..*ts })
                .collect(),
            tracks,
        };
        score.normalize_meta();
        score
    }

    /// Tempo in effect at a tick
    pub fn tempo_at(&self, tick: u32) -> f64 {
        self.tempos
            .iter()
            .take_while(|t| t.time <= tick)
            .last()
            .map_or(DEFAULT_BPM, |t| t.bpm)
    }
}

fn push_note(instruments: &mut BTreeMap<(usize, u8, u8), Track>, key: (usize, u8, u8), note: Note) {
    let (_, channel, program) = key;
    instruments
        .entry(key)
        .or_insert_with(|| Track::new(program, channel == DRUM_CHANNEL))
        .notes
        .push(note);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_midi;

    fn sample_score() -> Score {
        let mut score = Score::new(480);
        let mut piano = Track::new(0, false);
        piano.notes = vec![Note::new(0, 480, 60, 100), Note::new(480, 960, 64, 90)];
        let mut drums = Track::new(0, true);
        drums.notes = vec![Note::new(0, 120, 36, 110)];
        score.tracks = vec![drums, piano];
        score.tempos = vec![TempoChange { time: 0, bpm: 100.0 }];
        score.time_signatures = vec![TimeSignature::new(0, 3, 4)];
        score
    }

    #[test]
    fn test_parse_written_file() {
        let bytes = write_midi(&sample_score(), 480).unwrap();
        let parsed = Score::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.ticks_per_beat, 480);
        assert_eq!(parsed.tracks.len(), 2);
        assert!((parsed.tempos[0].bpm - 100.0).abs() < 0.01);
        assert_eq!(parsed.time_signatures[0].numerator, 3);
        assert_eq!(parsed.time_signatures[0].denominator, 4);

        let drums = parsed.tracks.iter().find(|t| t.is_drum).unwrap();
        assert_eq!(drums.notes, vec![Note::new(0, 120, 36, 110)]);

        let piano = parsed.tracks.iter().find(|t| !t.is_drum).unwrap();
        assert_eq!(piano.notes.len(), 2);
        assert_eq!(piano.notes[1], Note::new(480, 960, 64, 90));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            Score::from_bytes(b"not a midi file"),
            Err(TokenizerError::MidiParse(_))
        ));
    }

    #[test]
    fn test_tick_overflow_is_an_error() {
        use midly::num::{u15, u28};
        use midly::{Format, Header, TrackEvent};

        let mut track: Vec<TrackEvent> = (0..17)
            .map(|_| TrackEvent {
                delta: u28::new(0x0FFF_FFFF),
                kind: TrackEventKind::Meta(MetaMessage::Text(b"x")),
            })
            .collect();
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
        smf.tracks.push(track);
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();

        assert!(matches!(
            Score::from_bytes(&bytes),
            Err(TokenizerError::TickOverflow { track: 0 })
        ));
    }

    #[test]
    fn test_length_of_a_score_ending_at_the_last_tick() {
        let mut score = Score::new(480);
        let mut piano = Track::new(0, false);
        piano.notes = vec![Note::new(0, u32::MAX, 60, 100)];
        score.tracks.push(piano);
        assert_eq!(score.length_beats(), u32::MAX / 480 + 1);
    }

    #[test]
    fn test_length_and_classes() {
        let score = sample_score();
        assert_eq!(score.end_tick(), 960);
        assert_eq!(score.length_beats(), 2);
        assert_eq!(score.present_classes().to_string(), "0,16");
        assert_eq!(score.programs(), vec![(0, true), (0, false)]);
    }

    #[test]
    fn test_resample_keeps_minimum_duration() {
        let mut score = Score::new(480);
        let mut track = Track::new(4, false);
        track.notes = vec![Note::new(0, 10, 60, 80), Note::new(240, 720, 62, 80)];
        score.tracks.push(track);

        let resampled = score.resample(8);
        let notes = &resampled.tracks[0].notes;
        assert_eq!(notes[0], Note::new(0, 1, 60, 80));
        assert_eq!(notes[1], Note::new(4, 12, 62, 80));
    }

    #[test]
    fn test_normalize_meta_inserts_defaults() {
        let mut score = Score::new(96);
        score.tempos = vec![TempoChange { time: 96, bpm: 90.0 }];
        score.time_signatures = vec![
            TimeSignature::new(0, 3, 4),
            TimeSignature::new(0, 6, 8),
        ];
        score.normalize_meta();

        assert_eq!(score.tempos[0].time, 0);
        assert_eq!(score.tempos[0].bpm, DEFAULT_BPM);
        assert_eq!(score.time_signatures, vec![TimeSignature::new(0, 6, 8)]);
        assert_eq!(score.tempo_at(200), 90.0);
    }
}
