//! Frame DP solver. Builds per-frame candidate position-sets from the
//! fretboard, gates them through the chord-shape oracle, then runs a
//! forward DP over frames picking the minimum-cost path:
//!
//!   best[i][c] = shape(c) + min over c' of (best[i-1][c'] + transition(c', c))
//!
//! Unplayable frames become rests and the DP restarts after them, seeded
//! with the minimum cumulative cost so far.

use crate::config::MapperConfig;
use crate::fretboard::Fretboard;
use crate::scorer::transition_cost;
use crate::shape::Oracle;
use crate::types::{
    pitch_name, ChosenPosition, Frame, MappedFrame, RunSummary, ShapeSignature,
};
use itertools::Itertools;
use log::info;
use std::collections::HashSet;

/// Candidate sets beyond this many lowest-shape-cost entries are pruned.
/// Hand geometry keeps feasible sets far smaller in practice; the bound
/// only matters for pathological wide chords.
const BEAM_WIDTH: usize = 64;

#[derive(Debug, Clone)]
struct Candidate {
    positions: Vec<ChosenPosition>,
    signature: ShapeSignature,
    shape_cost: f64,
}

enum Layer {
    Rest,
    Notes {
        candidates: Vec<Candidate>,
        best: Vec<f64>,
        back: Vec<Option<usize>>,
    },
}

/// All feasible ChosenFrames for one frame, in deterministic tie-break
/// order: lower max fret first, then lower string-set lexicographically.
fn enumerate_candidates(frame: &Frame, fb: &Fretboard, oracle: &Oracle) -> Vec<Candidate> {
    let per_event: Vec<Vec<crate::types::Position>> = frame
        .events
        .iter()
        .map(|e| fb.positions_for(e.pitch))
        .collect();
    if per_event.iter().any(|p| p.is_empty()) {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for combo in per_event.iter().map(|v| v.iter().copied()).multi_cartesian_product() {
        let positions: Vec<ChosenPosition> = combo
            .into_iter()
            .zip(frame.events.iter())
            .map(|(position, &event)| ChosenPosition { position, event })
            .collect();
        let signature = ShapeSignature::of(&positions);
        if let Some(shape_cost) = oracle.shape_cost(&positions, &signature) {
            candidates.push(Candidate {
                positions,
                signature,
                shape_cost,
            });
        }
    }

    candidates.sort_by(|a, b| {
        a.signature
            .max_fret
            .cmp(&b.signature.max_fret)
            .then_with(|| a.signature.strings.cmp(&b.signature.strings))
            .then_with(|| a.signature.min_fret.cmp(&b.signature.min_fret))
    });

    if candidates.len() > BEAM_WIDTH {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&i, &j| {
            candidates[i]
                .shape_cost
                .partial_cmp(&candidates[j].shape_cost)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(i.cmp(&j))
        });
        let keep: HashSet<usize> = order.into_iter().take(BEAM_WIDTH).collect();
        let mut i = 0;
        candidates.retain(|_| {
            let kept = keep.contains(&i);
            i += 1;
            kept
        });
    }
    candidates
}

/// First index holding the minimum value. Candidates are pre-sorted by
/// the tie-break order, so equal costs resolve deterministically.
fn argmin(costs: &[f64]) -> usize {
    let mut best = 0;
    for (i, &c) in costs.iter().enumerate() {
        if c < costs[best] {
            best = i;
        }
    }
    best
}

fn describe(frame: &Frame) -> String {
    frame
        .events
        .iter()
        .map(|e| pitch_name(e.pitch))
        .collect::<Vec<_>>()
        .join("+")
}

/// Map every frame to a ChosenFrame (or a rest). The result is ordered
/// like the input and carries one position per event.
pub fn solve(
    frames: &[Frame],
    fb: &Fretboard,
    cfg: &MapperConfig,
    summary: &mut RunSummary,
) -> Vec<MappedFrame> {
    let oracle = Oracle::new(fb, &cfg.weights);
    let mut layers: Vec<Layer> = Vec::with_capacity(frames.len());
    // Index of the previous Notes layer, None right after a rest (or at
    // the start) — transitions never cross a rest.
    let mut prev_notes: Option<usize> = None;
    let mut segment_base = 0.0f64;

    for frame in frames {
        let candidates = enumerate_candidates(frame, fb, &oracle);

        let (best, back) = if candidates.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            match prev_notes {
                None => (
                    candidates
                        .iter()
                        .map(|c| segment_base + c.shape_cost)
                        .collect::<Vec<f64>>(),
                    vec![None; candidates.len()],
                ),
                Some(pi) => {
                    let (prev_cands, prev_best) = match &layers[pi] {
                        Layer::Notes {
                            candidates, best, ..
                        } => (candidates, best),
                        Layer::Rest => unreachable!("prev_notes points at a Notes layer"),
                    };
                    let mut best = vec![f64::INFINITY; candidates.len()];
                    let mut back = vec![None; candidates.len()];
                    for (ci, c) in candidates.iter().enumerate() {
                        for (pi2, p) in prev_cands.iter().enumerate() {
                            if !prev_best[pi2].is_finite() {
                                continue;
                            }
                            let trans = match transition_cost(
                                (&p.positions, &p.signature),
                                (&c.positions, &c.signature),
                                &cfg.weights,
                            ) {
                                Some(t) => t,
                                None => continue,
                            };
                            let total = prev_best[pi2] + trans + c.shape_cost;
                            if total < best[ci] {
                                best[ci] = total;
                                back[ci] = Some(pi2);
                            }
                        }
                    }
                    (best, back)
                }
            }
        };

        let reachable = best.iter().any(|c| c.is_finite());
        if !reachable {
            // No feasible ChosenFrame (or none reachable through the
            // neighbour gate): emit a rest and reseed the DP.
            info!(
                "unplayable chord at beat {:.3}: {}",
                frame.start_beat,
                describe(frame)
            );
            summary.chords_unplayable += 1;
            if let Some(pi) = prev_notes {
                if let Layer::Notes { best, .. } = &layers[pi] {
                    segment_base = best[argmin(best)];
                }
            }
            layers.push(Layer::Rest);
            prev_notes = None;
            continue;
        }

        layers.push(Layer::Notes {
            candidates,
            best,
            back,
        });
        prev_notes = Some(layers.len() - 1);
    }

    // Back-trace. Rests cut the piece into segments; each segment is
    // traced from its own arg-min tail.
    let mut picked: Vec<Option<usize>> = vec![None; layers.len()];
    let mut link: Option<usize> = None;
    for i in (0..layers.len()).rev() {
        match &layers[i] {
            Layer::Rest => link = None,
            Layer::Notes { best, back, .. } => {
                let idx = link.unwrap_or_else(|| argmin(best));
                picked[i] = Some(idx);
                link = back[idx];
            }
        }
    }

    frames
        .iter()
        .zip(layers.iter())
        .zip(picked.iter())
        .map(|((frame, layer), pick)| match (layer, pick) {
            (Layer::Notes { candidates, .. }, Some(idx)) => {
                let c = &candidates[*idx];
                MappedFrame {
                    frame: frame.clone(),
                    positions: c.positions.clone(),
                    signature: c.signature.clone(),
                }
            }
            _ => MappedFrame::rest(frame.clone()),
        })
        .collect()
}
