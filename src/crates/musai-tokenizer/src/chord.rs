//! Chord detection on notes sharing an onset

use crate::midi::Note;

/// Chord qualities and their intervals from the lowest note
pub const CHORD_QUALITIES: [(&str, &[u8]); 9] = [
    ("maj", &[0, 4, 7]),
    ("min", &[0, 3, 7]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("sus2", &[0, 2, 7]),
    ("sus4", &[0, 5, 7]),
    ("7dom", &[0, 4, 7, 10]),
    ("7maj", &[0, 4, 7, 11]),
    ("7min", &[0, 3, 7, 10]),
];

/// Detect the chord formed by notes starting together
///
/// Pitch classes are taken relative to the lowest note; at least three distinct
/// classes are needed.
pub fn detect_chord(notes: &[&Note]) -> Option<&'static str> {
    let root = notes.iter().map(|n| n.pitch).min()?;
    let mut intervals: Vec<u8> = notes.iter().map(|n| (n.pitch - root) % 12).collect();
    intervals.sort_unstable();
    intervals.dedup();

    if intervals.len() < 3 {
        return None;
    }

    CHORD_QUALITIES
        .iter()
        .find(|(_, template)| *template == intervals.as_slice())
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(pitches: &[u8]) -> Option<&'static str> {
        let notes: Vec<Note> = pitches.iter().map(|&p| Note::new(0, 8, p, 100)).collect();
        let refs: Vec<&Note> = notes.iter().collect();
        detect_chord(&refs)
    }

    #[test]
    fn test_triads() {
        assert_eq!(detect(&[60, 64, 67]), Some("maj"));
        assert_eq!(detect(&[57, 60, 64]), Some("min"));
        assert_eq!(detect(&[59, 62, 65]), Some("dim"));
        assert_eq!(detect(&[60, 62, 67]), Some("sus2"));
    }

    #[test]
    fn test_octave_doubling_and_sevenths() {
        assert_eq!(detect(&[48, 60, 64, 67, 72]), Some("maj"));
        assert_eq!(detect(&[55, 59, 62, 65]), Some("7dom"));
        assert_eq!(detect(&[60, 64, 67, 71]), Some("7maj"));
    }

    #[test]
    fn test_no_chord() {
        assert_eq!(detect(&[60, 64]), None);
        assert_eq!(detect(&[60, 61, 62]), None);
        assert_eq!(detect(&[]), None);
    }
}
