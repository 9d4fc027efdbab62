//! Chord-shape oracle — scores a set of positions played together.
//! Returns None for shapes no hand can hold; otherwise a non-negative
//! shape cost (higher is worse).

use crate::config::ScorerWeights;
use crate::fretboard::Fretboard;
use crate::types::{ChosenPosition, ShapeSignature};

pub struct Oracle<'a> {
    fb: &'a Fretboard,
    w: &'a ScorerWeights,
}

impl<'a> Oracle<'a> {
    pub fn new(fb: &'a Fretboard, w: &'a ScorerWeights) -> Self {
        Oracle { fb, w }
    }

    /// Fret extent the hand must cover. Open strings stay out of the
    /// span iff ignore_open; otherwise they anchor it at the nut.
    fn span(&self, sig: &ShapeSignature, any_open: bool) -> u8 {
        if sig.fretted_count == 0 {
            return 0;
        }
        let min = if !self.w.ignore_open && any_open {
            0
        } else {
            sig.min_fret
        };
        sig.max_fret - min
    }

    /// INFEASIBLE (None) when two positions share a string or the span
    /// exceeds unplayable_fret_span. Otherwise the shape cost.
    pub fn shape_cost(&self, positions: &[ChosenPosition], sig: &ShapeSignature) -> Option<f64> {
        if sig.strings.windows(2).any(|w| w[0] == w[1]) {
            return None;
        }
        let any_open = positions.iter().any(|p| p.position.is_open());
        let span = self.span(sig, any_open);
        if span > self.w.unplayable_fret_span {
            return None;
        }

        let mut cost = self.w.high_fret_penalty * sig.max_fret as f64;
        cost += self.w.fret_span_penalty * span as f64;

        // Fretting high up on the thick strings is awkward; the lower
        // half of the string set pays extra per fret.
        let lower_half_start = (self.fb.num_strings() + 1) / 2;
        for p in positions {
            if !p.position.is_open() && p.position.string >= lower_half_start {
                cost += self.w.low_string_high_fret_multiplier * p.position.fret as f64;
            }
        }

        if sig.fretted_count >= 2 && sig.min_fret == sig.max_fret {
            cost += self.w.barre_penalty - self.w.barre_bonus;
        }

        if self.w.prefer_open {
            for p in positions {
                if !p.position.is_open()
                    && self
                        .fb
                        .positions_for(p.event.pitch)
                        .iter()
                        .any(|q| q.is_open())
                {
                    cost += self.w.fretted_open_penalty;
                }
            }
        }

        if sig.fretted_count > 0
            && sig.min_fret >= self.w.sweet_spot_low
            && sig.max_fret <= self.w.sweet_spot_high
        {
            cost -= self.w.sweet_spot_bonus;
        }

        Some(cost.max(0.0))
    }
}
