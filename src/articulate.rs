//! Articulation inferrer. Runs after the DP on consecutive monophonic
//! frames and labels transitions as hammer-on, pull-off, slide, or tap.
//! Labels live on a side channel; positions are never altered.

use crate::config::ScorerWeights;
use crate::types::{Articulation, MappedFrame};

/// One label per frame: the articulation of the transition *into* that
/// frame. Index 0 is always None.
pub fn infer_articulations(
    mapped: &[MappedFrame],
    w: &ScorerWeights,
    disabled: bool,
) -> Vec<Option<Articulation>> {
    let mut labels: Vec<Option<Articulation>> = vec![None; mapped.len()];
    if disabled {
        return labels;
    }

    // A transition is legato-joined when both frames are monophonic on
    // the same string within the time threshold. A re-articulation at
    // the same fret gets no glyph but is still joined, so it does not
    // break a tapping run.
    let mut joined = vec![false; mapped.len()];
    for i in 1..mapped.len() {
        let prev = &mapped[i - 1];
        let curr = &mapped[i];
        if prev.positions.len() != 1 || curr.positions.len() != 1 {
            continue;
        }
        let p = prev.positions[0].position;
        let c = curr.positions[0].position;
        if p.string != c.string {
            continue;
        }
        let gap = curr.frame.start_beat - prev.frame.end_beat();
        if gap > w.legato_time_threshold {
            continue;
        }
        joined[i] = true;
        let diff = c.fret as i32 - p.fret as i32;
        labels[i] = match diff {
            0 => None, // re-articulation, neither
            1..=2 => Some(Articulation::HammerOn),
            -2..=-1 => Some(Articulation::PullOff),
            d if d > 2 => Some(Articulation::SlideUp),
            _ => Some(Articulation::SlideDown),
        };
    }

    upgrade_tap_runs(mapped, w, &joined, &mut labels);
    labels
}

/// A maximal run of legato-joined same-string notes long enough and
/// wide enough that one fretting hand cannot cover it becomes a tapping
/// run: its interior transitions turn into taps.
fn upgrade_tap_runs(
    mapped: &[MappedFrame],
    w: &ScorerWeights,
    joined: &[bool],
    labels: &mut [Option<Articulation>],
) {
    let mut i = 0;
    while i < mapped.len() {
        // A run starts at i and extends while transitions stay joined.
        let mut end = i;
        while end + 1 < mapped.len() && joined[end + 1] {
            end += 1;
        }
        let run_len = end - i + 1;
        if run_len >= w.tapping_run_threshold {
            let frets: Vec<u8> = mapped[i..=end]
                .iter()
                .map(|m| m.positions[0].position.fret)
                .collect();
            let stretch = frets.iter().max().unwrap() - frets.iter().min().unwrap();
            if stretch > w.unplayable_fret_span {
                for label in labels.iter_mut().take(end + 1).skip(i + 1) {
                    *label = Some(Articulation::Tap);
                }
            }
        }
        i = end + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChosenPosition, Frame, NoteEvent, Position, ShapeSignature};

    /// One monophonic mapped frame at the given spot on the neck.
    fn mono(start: f64, duration: f64, string: usize, fret: u8) -> MappedFrame {
        let event = NoteEvent {
            pitch: 60,
            start_beat: start,
            duration_beats: duration,
            velocity: 80,
        };
        let positions = vec![ChosenPosition {
            position: Position::new(string, fret),
            event,
        }];
        let signature = ShapeSignature::of(&positions);
        MappedFrame {
            frame: Frame {
                start_beat: start,
                events: vec![event],
            },
            positions,
            signature,
        }
    }

    #[test]
    fn test_hammer_on_and_pull_off() {
        let w = ScorerWeights::default();
        let mapped = vec![
            mono(0.0, 0.25, 2, 5),
            mono(0.25, 0.25, 2, 7),
            mono(0.5, 0.25, 2, 5),
        ];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[0], None);
        assert_eq!(labels[1], Some(Articulation::HammerOn));
        assert_eq!(labels[2], Some(Articulation::PullOff));
    }

    #[test]
    fn test_slides_past_two_frets() {
        let w = ScorerWeights::default();
        let mapped = vec![
            mono(0.0, 0.25, 2, 5),
            mono(0.25, 0.25, 2, 9),
            mono(0.5, 0.25, 2, 3),
        ];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], Some(Articulation::SlideUp));
        assert_eq!(labels[2], Some(Articulation::SlideDown));
    }

    #[test]
    fn test_same_fret_is_rearticulation() {
        let w = ScorerWeights::default();
        let mapped = vec![mono(0.0, 0.25, 2, 5), mono(0.25, 0.25, 2, 5)];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], None);
    }

    #[test]
    fn test_gap_beyond_threshold_breaks_legato() {
        let w = ScorerWeights::default(); // threshold 0.125
        let mapped = vec![mono(0.0, 0.25, 2, 5), mono(1.0, 0.25, 2, 7)];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], None);
    }

    #[test]
    fn test_string_change_breaks_legato() {
        let w = ScorerWeights::default();
        let mapped = vec![mono(0.0, 0.25, 2, 5), mono(0.25, 0.25, 3, 7)];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], None);
    }

    #[test]
    fn test_chords_never_labelled() {
        let w = ScorerWeights::default();
        let mut chord = mono(0.25, 0.25, 2, 7);
        let second = ChosenPosition {
            position: Position::new(3, 7),
            event: chord.positions[0].event,
        };
        chord.positions.push(second);
        let mapped = vec![mono(0.0, 0.25, 2, 5), chord];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], None);
    }

    #[test]
    fn test_disabled_emits_nothing() {
        let w = ScorerWeights::default();
        let mapped = vec![mono(0.0, 0.25, 2, 5), mono(0.25, 0.25, 2, 7)];
        let labels = infer_articulations(&mapped, &w, true);
        assert!(labels.iter().all(|l| l.is_none()));
    }

    #[test]
    fn test_tap_run_upgrade() {
        let mut w = ScorerWeights::default();
        w.tapping_run_threshold = 4;
        // Four legato-joined notes spanning 12 frets on one string.
        let mapped = vec![
            mono(0.0, 0.25, 2, 2),
            mono(0.25, 0.25, 2, 4),
            mono(0.5, 0.25, 2, 12),
            mono(0.75, 0.25, 2, 14),
        ];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], Some(Articulation::Tap));
        assert_eq!(labels[2], Some(Articulation::Tap));
        assert_eq!(labels[3], Some(Articulation::Tap));
    }

    #[test]
    fn test_rearticulation_does_not_break_a_tap_run() {
        let mut w = ScorerWeights::default();
        w.tapping_run_threshold = 4;
        // Frets 2, 4, 4, 14: the repeated 4 gets no glyph of its own,
        // but the four notes are one continuous legato run spanning 12
        // frets, so every transition upgrades to a tap.
        let mapped = vec![
            mono(0.0, 0.25, 2, 2),
            mono(0.25, 0.25, 2, 4),
            mono(0.5, 0.25, 2, 4),
            mono(0.75, 0.25, 2, 14),
        ];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], Some(Articulation::Tap));
        assert_eq!(labels[2], Some(Articulation::Tap));
        assert_eq!(labels[3], Some(Articulation::Tap));
    }

    #[test]
    fn test_narrow_run_stays_legato() {
        let mut w = ScorerWeights::default();
        w.tapping_run_threshold = 4;
        // Long enough, but the hand covers a 3-fret stretch fine.
        let mapped = vec![
            mono(0.0, 0.25, 2, 5),
            mono(0.25, 0.25, 2, 6),
            mono(0.5, 0.25, 2, 7),
            mono(0.75, 0.25, 2, 8),
        ];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], Some(Articulation::HammerOn));
        assert_eq!(labels[3], Some(Articulation::HammerOn));
    }

    #[test]
    fn test_short_run_stays_legato() {
        let w = ScorerWeights::default(); // threshold 6
        let mapped = vec![
            mono(0.0, 0.25, 2, 2),
            mono(0.25, 0.25, 2, 4),
            mono(0.5, 0.25, 2, 12),
        ];
        let labels = infer_articulations(&mapped, &w, false);
        assert_eq!(labels[1], Some(Articulation::HammerOn));
        assert_eq!(labels[2], Some(Articulation::SlideUp));
    }
}
