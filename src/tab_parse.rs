//! ASCII tab parser — re-materialises note events from tab text.
//!
//! Reads the `//` header lines (Title, Tempo, Time, Tuning), then one
//! system per blank-line-separated block of rows. Rhythm comes from
//! column spacing: tabs produced by this system carry headers and are
//! inverted through the logarithmic layout schedule; headerless tabs
//! fall back to a linear column→beat mapping. Malformed input rejects
//! the whole file with one diagnostic naming the offending line/column.

use crate::config::MapperConfig;
use crate::error::{FretmapError, Result};
use crate::tab_render::slot_for_column;
use crate::tuning::{parse_tuning, preset, Tuning};
use crate::types::{
    Articulation, NoteEvent, Piece, DEFAULT_TEMPO_BPM, DEFAULT_TIME_SIGNATURE, DEFAULT_VELOCITY,
};
use log::trace;

/// Parse result: the piece plus the articulation token attached to each
/// event (aligned with `piece.events`).
#[derive(Debug)]
pub struct ParsedTab {
    pub piece: Piece,
    pub articulations: Vec<Option<Articulation>>,
}

#[derive(Debug, Clone, Copy)]
struct RawNote {
    string: usize,
    fret: u8,
    start_beat: f64,
    articulation: Option<Articulation>,
}

struct Header {
    title: Option<String>,
    tempo_bpm: f64,
    time_signature: (u8, u8),
    tuning: Option<Tuning>,
    /// Any header line at all marks the tab as produced by this system.
    present: bool,
}

fn parse_headers(text: &str, path: &str) -> Result<Header> {
    let mut header = Header {
        title: None,
        tempo_bpm: DEFAULT_TEMPO_BPM,
        time_signature: DEFAULT_TIME_SIGNATURE,
        tuning: None,
        present: false,
    };
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        let Some(body) = line.strip_prefix("//") else {
            continue;
        };
        header.present = true;
        let Some((key, value)) = body.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Title" => header.title = Some(value.to_string()),
            "Tempo" => {
                header.tempo_bpm = value.parse().map_err(|_| {
                    FretmapError::malformed(path, lineno + 1, 1, format!("bad tempo \"{}\"", value))
                })?;
                if !(header.tempo_bpm.is_finite() && header.tempo_bpm > 0.0) {
                    return Err(FretmapError::malformed(
                        path,
                        lineno + 1,
                        1,
                        format!("bad tempo \"{}\"", value),
                    ));
                }
            }
            "Time" => {
                let parsed = value.split_once('/').and_then(|(n, d)| {
                    Some((n.trim().parse::<u8>().ok()?, d.trim().parse::<u8>().ok()?))
                });
                match parsed {
                    Some((n, d)) if n > 0 && d > 0 => header.time_signature = (n, d),
                    _ => {
                        return Err(FretmapError::malformed(
                            path,
                            lineno + 1,
                            1,
                            format!("bad time signature \"{}\"", value),
                        ))
                    }
                }
            }
            "Tuning" => {
                let tuning = parse_tuning(value).map_err(|e| {
                    FretmapError::malformed(path, lineno + 1, 1, e.to_string())
                })?;
                header.tuning = Some(tuning);
            }
            _ => {} // unknown headers pass through
        }
    }
    Ok(header)
}

/// One system: consecutive non-blank, non-header lines.
struct SystemRow<'a> {
    lineno: usize,
    /// Cell text after the label's '|'.
    content: &'a str,
    /// 1-based column where content starts, for diagnostics.
    content_col: usize,
}

fn collect_systems<'a>(text: &'a str, path: &str) -> Result<Vec<Vec<SystemRow<'a>>>> {
    let mut systems: Vec<Vec<SystemRow>> = Vec::new();
    let mut current: Vec<SystemRow> = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        if line.starts_with("//") || line.is_empty() {
            if !current.is_empty() {
                systems.push(std::mem::take(&mut current));
            }
            continue;
        }
        let Some(bar) = line.find('|') else {
            return Err(FretmapError::malformed(
                path,
                lineno + 1,
                1,
                "expected a string row like \"e|---\"",
            ));
        };
        current.push(SystemRow {
            lineno: lineno + 1,
            content: &line[bar + 1..],
            content_col: bar + 2,
        });
    }
    if !current.is_empty() {
        systems.push(current);
    }
    Ok(systems)
}

/// Split a row's content at the bar positions of the reference row.
/// Returns (segment text, 0-based offset of segment within content).
fn segments<'a>(content: &'a str, bars: &[usize]) -> Vec<(&'a str, usize)> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for &b in bars {
        out.push((&content[start..b], start));
        start = b + 1;
    }
    if start < content.len() {
        out.push((&content[start..], start));
    }
    out
}

pub fn parse(text: &str, path: &str, cfg: &MapperConfig) -> Result<ParsedTab> {
    let header = parse_headers(text, path)?;
    let tuning = header
        .tuning
        .clone()
        .unwrap_or_else(|| preset("standard").expect("standard preset exists"));
    let n_strings = tuning.num_strings();
    let capo = cfg.tuning.capo;
    let res = cfg.quantization_resolution;

    let beats_per_measure =
        header.time_signature.0 as f64 * 4.0 / header.time_signature.1 as f64;
    let slots_per_measure = ((beats_per_measure / res).round() as usize).max(1);

    let systems = collect_systems(text, path)?;
    let mut notes: Vec<RawNote> = Vec::new();
    let mut measure_base = 0usize;

    for system in &systems {
        if system.len() != n_strings {
            return Err(FretmapError::malformed(
                path,
                system[0].lineno,
                1,
                format!(
                    "system has {} rows, tuning \"{}\" needs {}",
                    system.len(),
                    tuning.name,
                    n_strings
                ),
            ));
        }
        let reference = &system[0];
        for row in system.iter() {
            if let Some(bad) = row.content.char_indices().find(|(_, c)| !c.is_ascii()) {
                return Err(FretmapError::malformed(
                    path,
                    row.lineno,
                    row.content_col + bad.0,
                    format!("stray character '{}'", bad.1),
                ));
            }
        }
        for row in system.iter().skip(1) {
            if row.content.len() != reference.content.len() {
                return Err(FretmapError::malformed(
                    path,
                    row.lineno,
                    row.content_col + row.content.len(),
                    "unequal row lengths within a system",
                ));
            }
        }
        let bars: Vec<usize> = reference
            .content
            .char_indices()
            .filter(|&(_, c)| c == '|')
            .map(|(i, _)| i)
            .collect();
        for row in system.iter().skip(1) {
            for (i, c) in row.content.char_indices() {
                let here = c == '|';
                let there = bars.binary_search(&i).is_ok();
                if here != there {
                    return Err(FretmapError::malformed(
                        path,
                        row.lineno,
                        row.content_col + i,
                        "measure bars misaligned across rows",
                    ));
                }
            }
        }

        let n_measures = segments(reference.content, &bars).len();
        for (string, row) in system.iter().enumerate() {
            for (seg_idx, (seg, seg_off)) in segments(row.content, &bars).into_iter().enumerate()
            {
                scan_segment(
                    seg,
                    seg_off,
                    row,
                    string,
                    measure_base + seg_idx,
                    beats_per_measure,
                    slots_per_measure,
                    header.present,
                    path,
                    &mut notes,
                )?;
            }
        }
        measure_base += n_measures;
    }

    trace!("parsed {} notes over {} measures", notes.len(), measure_base);

    // Sort into event order, then derive durations: a note rings until
    // the next note on the same string, bounded by the end of the piece.
    notes.sort_by(|a, b| {
        a.start_beat
            .partial_cmp(&b.start_beat)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.string.cmp(&b.string))
            .then(a.fret.cmp(&b.fret))
    });
    let piece_end = measure_base.max(1) as f64 * beats_per_measure;

    let mut events = Vec::with_capacity(notes.len());
    let mut articulations = Vec::with_capacity(notes.len());
    for (i, n) in notes.iter().enumerate() {
        let sounding = tuning.open_strings[n.string] as i32 + capo as i32 + n.fret as i32;
        if sounding > 127 {
            return Err(FretmapError::malformed(
                path,
                1,
                1,
                format!("fret {} on string {} is past the top of MIDI", n.fret, n.string + 1),
            ));
        }
        let duration = if cfg.staccato {
            0.125
        } else {
            let next_same_string = notes[i + 1..]
                .iter()
                .find(|m| m.string == n.string && m.start_beat > n.start_beat)
                .map(|m| m.start_beat);
            (next_same_string.unwrap_or(piece_end) - n.start_beat).max(res)
        };
        events.push(NoteEvent {
            pitch: sounding as u8,
            start_beat: n.start_beat,
            duration_beats: duration,
            velocity: DEFAULT_VELOCITY,
        });
        articulations.push(n.articulation);
    }

    let mut piece = Piece::from_events(events);
    piece.title = header.title;
    piece.tempo_bpm = header.tempo_bpm;
    piece.time_signature = header.time_signature;
    Ok(ParsedTab {
        piece,
        articulations,
    })
}

#[allow(clippy::too_many_arguments)]
fn scan_segment(
    seg: &str,
    seg_off: usize,
    row: &SystemRow,
    string: usize,
    measure: usize,
    beats_per_measure: f64,
    slots_per_measure: usize,
    log_layout: bool,
    path: &str,
    notes: &mut Vec<RawNote>,
) -> Result<()> {
    let chars: Vec<char> = seg.chars().collect();
    let width = chars.len();
    let mut pending_art: Option<Articulation> = None;
    let mut i = 0usize;
    while i < width {
        let c = chars[i];
        if c == '-' {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut fret: u32 = 0;
            while i < width && chars[i].is_ascii_digit() {
                fret = fret * 10 + chars[i].to_digit(10).unwrap();
                i += 1;
            }
            if fret > u8::MAX as u32 {
                return Err(FretmapError::malformed(
                    path,
                    row.lineno,
                    row.content_col + seg_off + start,
                    format!("fret {} out of range", fret),
                ));
            }
            let offset = if log_layout {
                slot_for_column(start, slots_per_measure, width) as f64
                    * (beats_per_measure / slots_per_measure as f64)
            } else {
                start as f64 / width as f64 * beats_per_measure
            };
            notes.push(RawNote {
                string,
                fret: fret as u8,
                start_beat: measure as f64 * beats_per_measure + offset,
                articulation: pending_art.take(),
            });
            continue;
        }
        if let Some(art) = Articulation::from_glyph(c) {
            let attached = i + 1 < width && chars[i + 1].is_ascii_digit();
            if !attached {
                return Err(FretmapError::malformed(
                    path,
                    row.lineno,
                    row.content_col + seg_off + i,
                    format!("articulation '{}' is not attached to a fret", c),
                ));
            }
            pending_art = Some(art);
            i += 1;
            continue;
        }
        return Err(FretmapError::malformed(
            path,
            row.lineno,
            row.content_col + seg_off + i,
            format!("stray character '{}'", c),
        ));
    }
    Ok(())
}
