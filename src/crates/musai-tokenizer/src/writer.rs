//! Standard MIDI File output for decoded scores
//!
//! Format 1: track 0 carries the tempo map and time signatures, then one track per
//! instrument. Drums play on channel 10, other instruments take the remaining channels
//! in turn.

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use musai_core::gm_program_name;
use std::path::Path;

use crate::error::Result;
use crate::midi::{Score, DRUM_CHANNEL};

/// Beat resolution of written files
pub const OUTPUT_TICKS_PER_BEAT: u16 = 384;

/// Serialize a score to MIDI bytes at the given beat resolution
pub fn write_midi(score: &Score, ticks_per_beat: u16) -> Result<Vec<u8>> {
    let score = if score.ticks_per_beat == ticks_per_beat as u32 {
        score.clone()
    } else {
        score.resample(ticks_per_beat as u32)
    };

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_beat)),
    ));

    let mut meta: Vec<(u32, u8, TrackEventKind)> = Vec::new();
    for tempo in &score.tempos {
        let us_per_beat = (60_000_000.0 / tempo.bpm.max(1.0)).round() as u32;
        meta.push((tempo.time, 0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_beat)))));
    }
    for ts in &score.time_signatures {
        let den_pow = ts.denominator.max(1).trailing_zeros() as u8;
        meta.push((
            ts.time,
            0,
            TrackEventKind::Meta(MetaMessage::TimeSignature(ts.numerator, den_pow, 24, 8)),
        ));
    }
    smf.tracks.push(to_track(meta));

    let mut next_channel = 0u8;
    for track in &score.tracks {
        let channel = if track.is_drum {
            DRUM_CHANNEL
        } else {
            let channel = next_channel;
            next_channel = (next_channel + 1) % 16;
            if next_channel == DRUM_CHANNEL {
                next_channel += 1;
            }
            channel
        };
        let channel = u4::new(channel);

        let name = match &track.name {
            Some(name) => name.as_str(),
            None if track.is_drum => "Drums",
            None => gm_program_name(track.program),
        };

        // Order within a tick: name and program first, note-offs before note-ons
        let mut events: Vec<(u32, u8, TrackEventKind)> =
            vec![(0, 0, TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())))];
        if !track.is_drum {
            events.push((
                0,
                0,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::new(track.program & 0x7f),
                    },
                },
            ));
        }
        for note in &track.notes {
            let key = u7::new(note.pitch & 0x7f);
            events.push((
                note.start,
                2,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key,
                        vel: u7::new(note.velocity.clamp(1, 127)),
                    },
                },
            ));
            events.push((
                note.end,
                1,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff { key, vel: u7::new(0) },
                },
            ));
        }
        smf.tracks.push(to_track(events));
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

/// Write a score to a `.mid` file at [`OUTPUT_TICKS_PER_BEAT`]
pub fn save_midi(score: &Score, path: &Path) -> Result<()> {
    let bytes = write_midi(score, OUTPUT_TICKS_PER_BEAT)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Sort absolute-tick events and convert them to a delta-timed track
fn to_track<'a>(mut events: Vec<(u32, u8, TrackEventKind<'a>)>) -> Vec<TrackEvent<'a>> {
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0;
    for (tick, _, kind) in events {
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{Note, TempoChange, TimeSignature, Track};

    fn score() -> Score {
        let mut score = Score::new(8);
        score.tempos = vec![TempoChange { time: 0, bpm: 90.0 }];
        score.time_signatures = vec![TimeSignature::new(0, 4, 4), TimeSignature::new(32, 6, 8)];

        let mut drums = Track::new(0, true);
        drums.notes = vec![Note::new(0, 1, 36, 100)];
        let mut piano = Track::new(0, false);
        // Repeated pitch: the first note ends where the second starts
        piano.notes = vec![Note::new(0, 8, 60, 100), Note::new(8, 16, 60, 90)];
        let mut bass = Track::new(33, false);
        bass.notes = vec![Note::new(4, 12, 40, 84)];
        score.tracks = vec![drums, piano, bass];
        score
    }

    #[test]
    fn test_written_file_reads_back() {
        let bytes = write_midi(&score(), OUTPUT_TICKS_PER_BEAT).unwrap();
        let parsed = Score::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.ticks_per_beat, 384);
        assert_eq!(parsed.time_signatures[1], TimeSignature::new(32 * 48, 6, 8));
        assert!((parsed.tempos[0].bpm - 90.0).abs() < 0.01);
        assert_eq!(parsed.programs(), vec![(0, true), (0, false), (33, false)]);

        let piano = &parsed.tracks[1];
        assert_eq!(
            piano.notes,
            vec![Note::new(0, 384, 60, 100), Note::new(384, 768, 60, 90)]
        );
    }

    #[test]
    fn test_channels_skip_percussion() {
        let mut score = Score::new(8);
        for program in 0..12 {
            let mut track = Track::new(program, false);
            track.notes = vec![Note::new(0, 1, 60, 100)];
            score.tracks.push(track);
        }
        let bytes = write_midi(&score, 8).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        for track in &smf.tracks[1..] {
            for event in track {
                if let TrackEventKind::Midi { channel, .. } = event.kind {
                    assert_ne!(channel.as_int(), DRUM_CHANNEL);
                }
            }
        }
    }

    #[test]
    fn test_save_midi() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.mid");
        save_midi(&score(), &path).unwrap();
        assert_eq!(Score::from_file(&path).unwrap().tracks.len(), 3);
    }
}
