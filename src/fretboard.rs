use crate::error::{FretmapError, Result};
use crate::tuning::{Tuning, PRESETS};
use crate::types::{NoteEvent, Pitch, Position};
use serde::Serialize;

/// Tuned fretboard: pitch grid derived from a tuning, a capo, and a
/// maximum fret. Enumerates candidate positions per pitch.
#[derive(Debug, Clone)]
pub struct Fretboard {
    tuning: Tuning,
    max_fret: u8,
    /// When set, every pitch is forced onto this one string (0-based).
    single_string: Option<usize>,
}

impl Fretboard {
    pub fn new(tuning: Tuning, max_fret: u8, single_string: Option<usize>) -> Result<Self> {
        if tuning.open_strings.is_empty() {
            return Err(FretmapError::ConfigInvalid("tuning has no strings".into()));
        }
        if max_fret == 0 || max_fret > 36 {
            return Err(FretmapError::ConfigInvalid(format!(
                "max_fret {} out of range (1-36)",
                max_fret
            )));
        }
        if tuning.capo > max_fret {
            return Err(FretmapError::ConfigInvalid(format!(
                "capo {} exceeds max_fret {}",
                tuning.capo, max_fret
            )));
        }
        if let Some(s) = single_string {
            if s >= tuning.num_strings() {
                return Err(FretmapError::ConfigInvalid(format!(
                    "single_string {} exceeds string count {}",
                    s + 1,
                    tuning.num_strings()
                )));
            }
        }
        Ok(Fretboard {
            tuning,
            max_fret,
            single_string,
        })
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn num_strings(&self) -> usize {
        self.tuning.num_strings()
    }

    pub fn max_fret(&self) -> u8 {
        self.max_fret
    }

    /// Sounding pitch of a string at fret 0 (capo included).
    pub fn open_pitch(&self, string: usize) -> Pitch {
        self.tuning.open_strings[string] + self.tuning.capo
    }

    pub fn pitch_at(&self, pos: Position) -> Pitch {
        self.open_pitch(pos.string) + pos.fret
    }

    /// Strings candidate positions may use: all of them, or just the
    /// constrained one.
    fn allowed_strings(&self) -> std::ops::Range<usize> {
        match self.single_string {
            Some(s) => s..s + 1,
            None => 0..self.num_strings(),
        }
    }

    /// All positions sounding the given pitch, ordered by ascending
    /// string index. Empty if the pitch is unplayable.
    pub fn positions_for(&self, pitch: Pitch) -> Vec<Position> {
        let mut positions = Vec::new();
        for string in self.allowed_strings() {
            let open = self.open_pitch(string);
            if pitch >= open && pitch - open <= self.max_fret {
                positions.push(Position::new(string, pitch - open));
            }
        }
        positions
    }

    /// (lowest, highest) reachable pitch, honouring the single-string
    /// constraint when one is set.
    pub fn pitch_range(&self) -> (Pitch, Pitch) {
        let lo = self
            .allowed_strings()
            .map(|s| self.open_pitch(s))
            .min()
            .unwrap();
        let hi = self
            .allowed_strings()
            .map(|s| self.open_pitch(s))
            .max()
            .unwrap()
            + self.max_fret;
        (lo, hi)
    }

    pub fn in_range(&self, pitch: Pitch) -> bool {
        let (lo, hi) = self.pitch_range();
        pitch >= lo && pitch <= hi
    }
}

// ─── Tuning coverage analysis ───────────────────────────────────────────────

/// How well one preset covers an event stream's pitch span.
#[derive(Debug, Clone, Serialize)]
pub struct TuningCoverage {
    pub tuning: String,
    /// Events playable without any shift.
    pub covered: usize,
    pub total: usize,
    /// Octave shift (semitones, multiple of 12) maximising coverage.
    pub best_transpose: i32,
    /// Events playable after applying best_transpose.
    pub covered_at_best: usize,
}

impl TuningCoverage {
    pub fn fully_covered(&self) -> bool {
        self.covered == self.total
    }
}

/// Summarise which presets in the catalogue cover the event pitch span,
/// at the given neck length. Presets are reported in catalogue order.
pub fn analyze(events: &[NoteEvent], max_fret: u8) -> Vec<TuningCoverage> {
    PRESETS
        .iter()
        .map(|t| {
            let fb = Fretboard::new(t.clone(), max_fret, None)
                .expect("catalogue presets are valid");
            let total = events.len();
            let in_range = |shift: i32| {
                events
                    .iter()
                    .filter(|e| {
                        let p = e.pitch as i32 + shift;
                        (0..=127).contains(&p) && fb.in_range(p as u8)
                    })
                    .count()
            };
            let covered = in_range(0);
            let mut best_transpose: i32 = 0;
            let mut covered_at_best = covered;
            for shift in (-36..=36).step_by(12) {
                let c = in_range(shift);
                // Strict improvement, so 0 wins ties and then the
                // smallest magnitude shift.
                if c > covered_at_best
                    || (c == covered_at_best && shift.abs() < best_transpose.abs())
                {
                    best_transpose = shift;
                    covered_at_best = c;
                }
            }
            TuningCoverage {
                tuning: t.name.clone(),
                covered,
                total,
                best_transpose,
                covered_at_best,
            }
        })
        .collect()
}
