//! ASCII tab renderer. One measure per system: header comment lines,
//! then one row per string (highest-sounding first), cells packed on a
//! logarithmic column schedule so early-beat density survives and
//! trailing sustain gets exponentially less space.

use crate::config::MapperConfig;
use crate::tuning::{preset, Tuning};
use crate::types::{Articulation, MappedFrame, Piece};
use std::collections::BTreeMap;

/// Curvature of the column schedule. Shared with the parser's inverse.
pub const LAYOUT_ALPHA: f64 = 0.2;

/// Column for grid slot k of K across a measure body of `width` cells:
/// round(W · log(1 + k·α) / log(1 + (K−1)·α)), W leaving room for a
/// two-digit fret in the last slot.
pub fn column_for_slot(slot: usize, slots_per_measure: usize, width: usize) -> usize {
    if slot == 0 || slots_per_measure < 2 {
        return 0;
    }
    let w = width.saturating_sub(2) as f64;
    let denom = (1.0 + (slots_per_measure - 1) as f64 * LAYOUT_ALPHA).ln();
    let col = w * (1.0 + slot as f64 * LAYOUT_ALPHA).ln() / denom;
    col.round() as usize
}

/// Inverse of [column_for_slot], clamped to the measure.
pub fn slot_for_column(col: usize, slots_per_measure: usize, width: usize) -> usize {
    if col == 0 || slots_per_measure < 2 {
        return 0;
    }
    let w = width.saturating_sub(2) as f64;
    if w <= 0.0 {
        return 0;
    }
    let denom = (1.0 + (slots_per_measure - 1) as f64 * LAYOUT_ALPHA).ln();
    let slot = ((denom * col as f64 / w).exp() - 1.0) / LAYOUT_ALPHA;
    (slot.round() as usize).min(slots_per_measure - 1)
}

/// Header value for the Tuning line: the preset name when the open
/// strings still match it, otherwise the explicit note list.
fn tuning_header(tuning: &Tuning) -> String {
    match preset(&tuning.name) {
        Some(p) if p.open_strings == tuning.open_strings => tuning.name.clone(),
        _ => tuning.note_list(),
    }
}

/// Render mapped frames as ASCII tab.
pub fn render(
    piece: &Piece,
    mapped: &[MappedFrame],
    labels: &[Option<Articulation>],
    tuning: &Tuning,
    cfg: &MapperConfig,
) -> String {
    let width = cfg.max_line_width;
    let res = cfg.quantization_resolution;
    let beats_per_measure = piece.beats_per_measure();
    let slots_per_measure = ((beats_per_measure / res).round() as usize).max(1);
    let n_strings = tuning.num_strings();

    let mut out = String::new();
    if let Some(title) = &piece.title {
        out.push_str(&format!("// Title: {}\n", title));
    }
    out.push_str(&format!("// Tempo: {}\n", piece.tempo_bpm));
    out.push_str(&format!(
        "// Time: {}/{}\n",
        piece.time_signature.0, piece.time_signature.1
    ));
    out.push_str(&format!("// Tuning: {}\n", tuning_header(tuning)));
    out.push('\n');

    // Bucket frames into (measure, slot), keeping frame order within a
    // slot (simultaneous notes share a column).
    let mut measures: BTreeMap<usize, BTreeMap<usize, Vec<usize>>> = BTreeMap::new();
    for (i, m) in mapped.iter().enumerate() {
        // Same cell arithmetic as the normaliser's frame grouping, so a
        // frame never straddles the measure boundary its cell is in.
        let cell = (m.frame.start_beat.max(0.0) / res).round() as usize;
        let measure = cell / slots_per_measure;
        let slot = cell % slots_per_measure;
        measures.entry(measure).or_default().entry(slot).or_default().push(i);
    }
    let last_measure = measures.keys().next_back().copied().unwrap_or(0);

    let labels_text: Vec<String> = (0..n_strings).map(|s| tuning.string_label(s)).collect();
    let label_width = labels_text.iter().map(|l| l.len()).max().unwrap_or(1);

    for measure in 0..=last_measure {
        let mut rows: Vec<Vec<char>> = vec![vec!['-'; width]; n_strings];
        let mut shift = 0usize; // accumulated multi-digit spill
        let mut next_free = 0usize;

        if let Some(slots) = measures.get(&measure) {
            for (&slot, frame_indices) in slots {
                let base = column_for_slot(slot, slots_per_measure, width);
                let mut col = (base + shift).max(next_free);
                let has_label = frame_indices
                    .iter()
                    .any(|&i| labels[i].is_some() && mapped[i].positions.len() == 1);
                if has_label && col == 0 {
                    col = 1;
                }
                let mut widest = 1usize;
                for &i in frame_indices {
                    let m = &mapped[i];
                    for p in &m.positions {
                        let digits: Vec<char> = p.position.fret.to_string().chars().collect();
                        widest = widest.max(digits.len());
                        let row = &mut rows[p.position.string];
                        grow(row, col + digits.len());
                        for (d, ch) in digits.iter().enumerate() {
                            row[col + d] = *ch;
                        }
                        if m.positions.len() == 1 {
                            if let Some(art) = labels[i] {
                                grow(row, col);
                                if row[col - 1] == '-' {
                                    row[col - 1] = art.glyph();
                                }
                            }
                        }
                    }
                }
                shift += widest - 1;
                next_free = col + widest + 1;
            }
        }

        let body_width = rows.iter().map(|r| r.len()).max().unwrap_or(width).max(width);
        for (s, row) in rows.iter_mut().enumerate() {
            grow(row, body_width);
            out.push_str(&format!(
                "{:<label_width$}|{}|\n",
                labels_text[s],
                row.iter().collect::<String>()
            ));
        }
        out.push('\n');
    }
    out
}

fn grow(row: &mut Vec<char>, len: usize) {
    while row.len() < len {
        row.push('-');
    }
}
