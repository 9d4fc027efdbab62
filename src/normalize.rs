//! Event normaliser — the staged pipeline between a reader and the
//! solver. Quantises, dedupes, transposes, range-clips, and groups
//! simultaneous notes into chord frames.

use crate::config::{MapperConfig, PitchMode};
use crate::fretboard::Fretboard;
use crate::types::{pitch_name, Frame, NoteEvent, RunSummary};
use log::debug;

/// Run every configured stage and group the survivors into frames.
/// Output frames are strictly ordered by start_beat; events within a
/// frame are sorted by ascending pitch.
pub fn normalize(
    events: &[NoteEvent],
    fb: &Fretboard,
    cfg: &MapperConfig,
    summary: &mut RunSummary,
) -> Vec<Frame> {
    let res = cfg.quantization_resolution;
    let mut keyed: Vec<(i64, NoteEvent)> = Vec::with_capacity(events.len());

    for ev in events {
        let mut e = *ev;

        // 1. Nudge — shift the whole stream on the grid's quarter-beat
        //    skeleton before anything else looks at onsets.
        if cfg.nudge != 0 {
            e.start_beat = (e.start_beat + cfg.nudge as f64 * 0.25).max(0.0);
        }

        // 2. Transpose.
        let shifted = e.pitch as i32 + cfg.transpose;

        // 3. Range constraint. Unplayable pitches never reach the DP:
        //    fold by octaves when configured, otherwise drop.
        let pitch = match constrain(shifted, fb, cfg.pitch_mode) {
            Constrained::Kept(p) => p,
            Constrained::Folded(p) => {
                summary.notes_folded += 1;
                debug!(
                    "folded {} to {} at beat {:.3}",
                    friendly(shifted),
                    pitch_name(p),
                    e.start_beat
                );
                p
            }
            Constrained::Dropped => {
                summary.notes_dropped += 1;
                debug!(
                    "dropped unplayable {} at beat {:.3}",
                    friendly(shifted),
                    e.start_beat
                );
                continue;
            }
        };
        e.pitch = pitch;

        // 4. Optional quantisation pre-pass: snap the stored onset, not
        //    just the grouping key.
        if cfg.pre_quantize {
            e.start_beat = (e.start_beat / res).round() * res;
        }

        let cell = (e.start_beat / res).round() as i64;
        keyed.push((cell, e));
    }

    // Deterministic order: grid cell, then pitch, then longest first so
    // merges keep the longest-ringing duplicate.
    keyed.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.pitch.cmp(&b.1.pitch))
            .then(
                b.1.duration_beats
                    .partial_cmp(&a.1.duration_beats)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(
                a.1.start_beat
                    .partial_cmp(&b.1.start_beat)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    // 5. Frame grouping (always), with the optional per-frame reductions.
    let mut frames: Vec<Frame> = Vec::new();
    let mut i = 0;
    while i < keyed.len() {
        let cell = keyed[i].0;
        let mut members: Vec<NoteEvent> = Vec::new();
        while i < keyed.len() && keyed[i].0 == cell {
            members.push(keyed[i].1);
            i += 1;
        }

        if cfg.mono_lowest_only && members.len() > 1 {
            // Sorted by pitch: the lowest is first.
            members.truncate(1);
        }

        if cfg.dedupe {
            let before = members.len();
            members.dedup_by_key(|e| e.pitch);
            summary.notes_merged += (before - members.len()) as u32;
        }

        let start_beat = members
            .iter()
            .map(|e| e.start_beat)
            .fold(f64::INFINITY, f64::min);
        frames.push(Frame {
            start_beat,
            events: members,
        });
    }
    frames
}

enum Constrained {
    Kept(u8),
    Folded(u8),
    Dropped,
}

fn constrain(pitch: i32, fb: &Fretboard, mode: PitchMode) -> Constrained {
    let (lo, hi) = fb.pitch_range();
    let (lo, hi) = (lo as i32, hi as i32);
    if (lo..=hi).contains(&pitch) {
        return Constrained::Kept(pitch as u8);
    }
    if mode == PitchMode::Normalize {
        let mut p = pitch;
        while p < lo {
            p += 12;
        }
        while p > hi {
            p -= 12;
        }
        // A span narrower than an octave can step over the window.
        if (lo..=hi).contains(&p) {
            return Constrained::Folded(p as u8);
        }
    }
    Constrained::Dropped
}

fn friendly(pitch: i32) -> String {
    if (0..=127).contains(&pitch) {
        pitch_name(pitch as u8)
    } else {
        format!("pitch {}", pitch)
    }
}
