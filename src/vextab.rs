//! VexTab surface: `tabstave` blocks of `fret/string` tokens. String
//! numbers are 1-based from the highest-sounding string, chords join
//! members with '.', duration tokens (:w :h :q :8 :16 :32) are sticky,
//! and `##` is a rest.

use crate::config::MapperConfig;
use crate::error::{FretmapError, Result};
use crate::tuning::Tuning;
use crate::types::{MappedFrame, NoteEvent, Piece, DEFAULT_VELOCITY};

const DURATIONS: [(f64, &str); 6] = [
    (4.0, ":w"),
    (2.0, ":h"),
    (1.0, ":q"),
    (0.5, ":8"),
    (0.25, ":16"),
    (0.125, ":32"),
];

fn duration_token(beats: f64) -> &'static str {
    DURATIONS
        .iter()
        .min_by(|a, b| {
            (a.0 - beats)
                .abs()
                .partial_cmp(&(b.0 - beats).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|&(_, t)| t)
        .unwrap_or(":8")
}

fn duration_beats(token: &str) -> Option<f64> {
    DURATIONS.iter().find(|&&(_, t)| t == token).map(|&(b, _)| b)
}

// ─── Writing ────────────────────────────────────────────────────────────────

pub fn render(piece: &Piece, mapped: &[MappedFrame]) -> String {
    let mut out = String::new();
    if let Some(title) = &piece.title {
        out.push_str(&format!("options tempo={}\n", piece.tempo_bpm.round() as u32));
        out.push_str(&format!("% {}\n", title));
    } else {
        out.push_str(&format!("options tempo={}\n", piece.tempo_bpm.round() as u32));
    }
    out.push_str("tabstave notation=false tablature=true\n");

    let beats_per_measure = piece.beats_per_measure();
    let mut tokens: Vec<String> = Vec::new();
    let mut last_dur = "";
    let mut measure = 0usize;

    for (i, m) in mapped.iter().enumerate() {
        while m.frame.start_beat - (measure + 1) as f64 * beats_per_measure > -1e-6 {
            measure += 1;
            tokens.push("|".into());
        }
        // Gap to the next frame decides the notated value; the last
        // frame falls back to its own sounding length.
        let gap = mapped
            .get(i + 1)
            .map(|n| n.frame.start_beat - m.frame.start_beat)
            .unwrap_or_else(|| m.frame.min_duration());
        let dur = duration_token(gap);
        if dur != last_dur {
            tokens.push(dur.into());
            last_dur = dur;
        }
        if m.is_rest() {
            tokens.push("##".into());
            continue;
        }
        let mut notes: Vec<String> = m
            .positions
            .iter()
            .map(|p| format!("{}/{}", p.position.fret, p.position.string + 1))
            .collect();
        if notes.len() == 1 {
            tokens.push(notes.remove(0));
        } else {
            tokens.push(format!("({})", notes.join(".")));
        }
    }

    if !tokens.is_empty() {
        out.push_str("notes ");
        out.push_str(&tokens.join(" "));
        out.push('\n');
    }
    out
}

// ─── Reading ────────────────────────────────────────────────────────────────

fn parse_fret_string(token: &str, tuning: &Tuning, path: &str, line: usize) -> Result<(u8, usize)> {
    let bad = || {
        FretmapError::malformed(path, line, 1, format!("bad vextab token \"{}\"", token))
    };
    let (fret, string) = token.split_once('/').ok_or_else(bad)?;
    let fret: u8 = fret.trim().parse().map_err(|_| bad())?;
    let string: usize = string.trim().parse().map_err(|_| bad())?;
    if string == 0 || string > tuning.num_strings() {
        return Err(FretmapError::malformed(
            path,
            line,
            1,
            format!("string {} out of range for {}-string tuning", string, tuning.num_strings()),
        ));
    }
    Ok((fret, string - 1))
}

/// Minimal reader for `notes` lines. Rhythm comes from the sticky
/// duration tokens (default an eighth), melody runs strictly forward.
pub fn parse(text: &str, path: &str, cfg: &MapperConfig) -> Result<Piece> {
    let tuning = &cfg.tuning;
    let mut events: Vec<NoteEvent> = Vec::new();
    let mut clock = 0.0f64;
    let mut dur = 0.5f64;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let Some(body) = line.strip_prefix("notes ") else {
            continue;
        };
        for token in body.split_whitespace() {
            if token.starts_with(':') {
                dur = duration_beats(token).ok_or_else(|| {
                    FretmapError::malformed(
                        path,
                        lineno + 1,
                        1,
                        format!("unknown duration \"{}\"", token),
                    )
                })?;
                continue;
            }
            if token == "|" || token.starts_with('=') {
                continue; // barlines carry no time of their own
            }
            if token == "##" {
                clock += dur;
                continue;
            }
            let members: Vec<&str> = if let Some(inner) =
                token.strip_prefix('(').and_then(|t| t.strip_suffix(')'))
            {
                inner.split('.').collect()
            } else {
                vec![token]
            };
            for member in members {
                let (fret, string) = parse_fret_string(member, tuning, path, lineno + 1)?;
                let pitch = tuning.open_strings[string] as i32 + tuning.capo as i32 + fret as i32;
                if pitch > 127 {
                    return Err(FretmapError::malformed(
                        path,
                        lineno + 1,
                        1,
                        format!("fret {} on string {} is past the top of MIDI", fret, string + 1),
                    ));
                }
                events.push(NoteEvent {
                    pitch: pitch as u8,
                    start_beat: clock,
                    duration_beats: dur,
                    velocity: DEFAULT_VELOCITY,
                });
            }
            clock += dur;
        }
    }
    Ok(Piece::from_events(events))
}
