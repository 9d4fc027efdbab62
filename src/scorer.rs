//! Position scorer — the pairwise cost between consecutive chosen
//! frames. Pure function of (weights, two frames); the very first frame
//! of a piece (and the first after a rest) pays no transition cost.

use crate::config::ScorerWeights;
use crate::types::{ChosenPosition, ShapeSignature};

/// Mean fret of the hand anchor. Opens are left out when ignore_open,
/// otherwise they pull the centroid toward the nut. A frame with no
/// contributing positions sits at the nut.
pub fn centroid_fret(positions: &[ChosenPosition], ignore_open: bool) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for p in positions {
        if p.position.is_open() && ignore_open {
            continue;
        }
        sum += p.position.fret as f64;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Cost of moving the hand from `prev` to `curr`. None when the
/// neighbour span gate rejects the pair outright.
pub fn transition_cost(
    prev: (&[ChosenPosition], &ShapeSignature),
    curr: (&[ChosenPosition], &ShapeSignature),
    w: &ScorerWeights,
) -> Option<f64> {
    let (prev_pos, prev_sig) = prev;
    let (curr_pos, curr_sig) = curr;

    if w.count_fret_span_across_neighbors {
        let mut min_fret = u8::MAX;
        let mut max_fret = 0u8;
        let mut any = false;
        for p in prev_pos.iter().chain(curr_pos.iter()) {
            if p.position.is_open() && w.ignore_open {
                continue;
            }
            any = true;
            min_fret = min_fret.min(p.position.fret);
            max_fret = max_fret.max(p.position.fret);
        }
        if any && max_fret - min_fret > w.unplayable_fret_span {
            return None;
        }
    }

    let movement = w.movement_penalty
        * (centroid_fret(prev_pos, w.ignore_open) - centroid_fret(curr_pos, w.ignore_open)).abs();

    let switched = curr_sig
        .strings
        .iter()
        .filter(|s| !prev_sig.strings.contains(s))
        .count();
    let mut cost = movement + w.string_switch_penalty * switched as f64;

    // A string held in prev and not re-struck keeps ringing.
    let held = prev_sig
        .strings
        .iter()
        .any(|s| !curr_sig.strings.contains(s));
    if held {
        cost -= w.let_ring_bonus;
    }

    Some(cost.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NoteEvent, Position};

    fn chosen(positions: &[(usize, u8)]) -> (Vec<ChosenPosition>, ShapeSignature) {
        let ps: Vec<ChosenPosition> = positions
            .iter()
            .map(|&(string, fret)| ChosenPosition {
                position: Position::new(string, fret),
                event: NoteEvent {
                    pitch: 60,
                    start_beat: 0.0,
                    duration_beats: 0.25,
                    velocity: 80,
                },
            })
            .collect();
        let sig = ShapeSignature::of(&ps);
        (ps, sig)
    }

    fn cost(prev: &[(usize, u8)], curr: &[(usize, u8)], w: &ScorerWeights) -> Option<f64> {
        let (pp, ps) = chosen(prev);
        let (cp, cs) = chosen(curr);
        transition_cost((&pp, &ps), (&cp, &cs), w)
    }

    #[test]
    fn test_centroid_ignores_opens_by_default() {
        let (ps, _) = chosen(&[(0, 0), (2, 5), (3, 7)]);
        assert!((centroid_fret(&ps, true) - 6.0).abs() < 1e-12);
        assert!((centroid_fret(&ps, false) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_staying_put_costs_nothing() {
        let w = ScorerWeights::default();
        let c = cost(&[(2, 5)], &[(2, 7)], &w).unwrap();
        let far = cost(&[(2, 5)], &[(2, 15)], &w).unwrap();
        assert!(far > c, "near={}, far={}", c, far);
    }

    #[test]
    fn test_string_switch_counted() {
        let mut w = ScorerWeights::default();
        w.movement_penalty = 0.0;
        w.let_ring_bonus = 0.0;
        let same = cost(&[(2, 5)], &[(2, 5)], &w).unwrap();
        let other = cost(&[(2, 5)], &[(3, 5)], &w).unwrap();
        assert!((same - 0.0).abs() < 1e-12);
        assert!((other - w.string_switch_penalty).abs() < 1e-12);
    }

    #[test]
    fn test_let_ring_discount() {
        let mut w = ScorerWeights::default();
        w.movement_penalty = 0.0;
        // Chord shrinks to one of its own strings: the other keeps
        // ringing, so the pair is cheaper than an exact repeat.
        let repeat = cost(&[(2, 5), (3, 5)], &[(2, 5), (3, 5)], &w).unwrap();
        let shrink = cost(&[(2, 5), (3, 5)], &[(2, 5)], &w).unwrap();
        assert!(shrink < repeat, "shrink={}, repeat={}", shrink, repeat);
    }

    #[test]
    fn test_neighbor_span_gate() {
        let mut w = ScorerWeights::default();
        w.count_fret_span_across_neighbors = true;
        assert!(cost(&[(2, 2)], &[(3, 9)], &w).is_none());
        w.count_fret_span_across_neighbors = false;
        assert!(cost(&[(2, 2)], &[(3, 9)], &w).is_some());
    }

    #[test]
    fn test_cost_never_negative() {
        let mut w = ScorerWeights::default();
        w.let_ring_bonus = 50.0;
        let c = cost(&[(2, 5), (3, 5)], &[(2, 5)], &w).unwrap();
        assert!(c >= 0.0);
    }
}
