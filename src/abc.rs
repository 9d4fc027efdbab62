//! Minimal single-voice ABC notation surface.
//!
//! Reads and writes the subset the transcriber needs: X/T/Q/M/L/K
//! headers, note letters with ^/_/= accidentals and ,/' octave marks,
//! integer and fractional lengths, z rests, [..] chords, | bars. Key
//! signatures ride along as metadata; accidentals must be explicit.

use crate::error::{FretmapError, Result};
use crate::types::{NoteEvent, Piece, DEFAULT_VELOCITY};

/// Default unit note length when no L: field is present (an eighth).
const DEFAULT_UNIT_BEATS: f64 = 0.5;

// ─── Reading ────────────────────────────────────────────────────────────────

pub fn parse(text: &str, path: &str) -> Result<Piece> {
    let mut piece = Piece::from_events(Vec::new());
    let mut unit_beats = DEFAULT_UNIT_BEATS;
    let mut in_body = false;
    let mut clock = 0.0f64;

    for (lineno, raw) in text.lines().enumerate() {
        let line = match raw.split_once('%') {
            Some((before, _)) => before.trim_end(),
            None => raw.trim_end(),
        };
        if line.is_empty() {
            continue;
        }

        // Header fields look like "K: G"; K ends the header section.
        if !in_body {
            if let Some((key, value)) = header_field(line) {
                match key {
                    'X' => {}
                    'T' => piece.title = Some(value.to_string()),
                    'M' => piece.time_signature = parse_meter(value, path, lineno + 1)?,
                    'L' => {
                        unit_beats = parse_fraction(value).map(|f| f * 4.0).ok_or_else(|| {
                            FretmapError::malformed(
                                path,
                                lineno + 1,
                                1,
                                format!("bad unit length \"{}\"", value),
                            )
                        })?
                    }
                    'Q' => piece.tempo_bpm = parse_tempo(value, path, lineno + 1)?,
                    'K' => in_body = true, // key is metadata only
                    _ => {}
                }
                continue;
            }
            // Tolerate tune bodies with no K: line.
            in_body = true;
        }

        parse_body_line(line, lineno + 1, unit_beats, &mut clock, &mut piece.events, path)?;
    }

    piece.events.sort_by(|a, b| {
        a.start_beat
            .partial_cmp(&b.start_beat)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.pitch.cmp(&b.pitch))
    });
    Ok(piece)
}

fn header_field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let key = chars.next()?;
    if !key.is_ascii_alphabetic() || chars.next() != Some(':') {
        return None;
    }
    Some((key.to_ascii_uppercase(), line[2..].trim()))
}

fn parse_meter(value: &str, path: &str, line: usize) -> Result<(u8, u8)> {
    match value {
        "C" => return Ok((4, 4)),
        "C|" => return Ok((2, 2)),
        _ => {}
    }
    value
        .split_once('/')
        .and_then(|(n, d)| Some((n.trim().parse().ok()?, d.trim().parse().ok()?)))
        .filter(|&(n, d): &(u8, u8)| n > 0 && d > 0)
        .ok_or_else(|| {
            FretmapError::malformed(path, line, 1, format!("bad meter \"{}\"", value))
        })
}

/// "1/4=120" (that note value at 120 per minute) or a bare "120".
fn parse_tempo(value: &str, path: &str, line: usize) -> Result<f64> {
    let bpm = match value.split_once('=') {
        Some((frac, rate)) => {
            let f = parse_fraction(frac.trim());
            let r: Option<f64> = rate.trim().parse().ok();
            match (f, r) {
                (Some(f), Some(r)) => Some(r * f * 4.0),
                _ => None,
            }
        }
        None => value.trim().parse().ok(),
    };
    bpm.filter(|b| b.is_finite() && *b > 0.0).ok_or_else(|| {
        FretmapError::malformed(path, line, 1, format!("bad tempo \"{}\"", value))
    })
}

fn parse_fraction(s: &str) -> Option<f64> {
    let (n, d) = s.split_once('/')?;
    let n: f64 = n.trim().parse().ok()?;
    let d: f64 = d.trim().parse().ok()?;
    if d > 0.0 {
        Some(n / d)
    } else {
        None
    }
}

struct Scanner<'a> {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    path: &'a str,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.idx += 1;
        }
        c
    }

    fn error(&self, message: String) -> FretmapError {
        FretmapError::malformed(self.path, self.line, self.idx + 1, message)
    }

    /// Accidentals + letter + octave marks → MIDI pitch.
    fn note(&mut self) -> Result<u8> {
        let mut accidental = 0i32;
        while let Some(c) = self.peek() {
            match c {
                '^' => accidental += 1,
                '_' => accidental -= 1,
                '=' => {}
                _ => break,
            }
            self.bump();
        }
        let letter = self.bump().ok_or_else(|| self.error("expected a note".into()))?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            other => return Err(self.error(format!("not a note letter: '{}'", other))),
        };
        // Uppercase C..B is the middle-C octave; lowercase the one above.
        let mut midi = 60 + base + if letter.is_ascii_lowercase() { 12 } else { 0 };
        while let Some(c) = self.peek() {
            match c {
                ',' => midi -= 12,
                '\'' => midi += 12,
                _ => break,
            }
            self.bump();
        }
        midi += accidental;
        if (0..=127).contains(&midi) {
            Ok(midi as u8)
        } else {
            Err(self.error(format!("pitch out of range ({})", midi)))
        }
    }

    /// Length suffix: "2", "3/2", "/2", "/", "//". Defaults to 1.
    fn length(&mut self) -> f64 {
        let mut num = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            num.push(self.bump().unwrap());
        }
        let mut value: f64 = num.parse().unwrap_or(1.0);
        while self.peek() == Some('/') {
            self.bump();
            let mut den = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                den.push(self.bump().unwrap());
            }
            value /= den.parse().unwrap_or(2.0);
        }
        value
    }
}

fn parse_body_line(
    line: &str,
    lineno: usize,
    unit_beats: f64,
    clock: &mut f64,
    events: &mut Vec<NoteEvent>,
    path: &str,
) -> Result<()> {
    let mut s = Scanner {
        chars: line.chars().collect(),
        idx: 0,
        line: lineno,
        path,
    };
    while let Some(c) = s.peek() {
        match c {
            ' ' | '\t' | '|' | ':' | ']' | '\\' => {
                s.bump();
            }
            'z' | 'Z' | 'x' => {
                s.bump();
                *clock += unit_beats * s.length();
            }
            '[' => {
                s.bump();
                // "[|" and "[:" are barline decorations, not chords.
                if matches!(s.peek(), Some('|') | Some(':')) {
                    continue;
                }
                let mut chord_len = 0.0f64;
                let mut members = Vec::new();
                loop {
                    match s.peek() {
                        Some(']') => {
                            s.bump();
                            break;
                        }
                        Some(' ') => {
                            s.bump();
                        }
                        Some(_) => {
                            let pitch = s.note()?;
                            let len = unit_beats * s.length();
                            members.push((pitch, len));
                            chord_len = chord_len.max(len);
                        }
                        None => return Err(s.error("unterminated chord".into())),
                    }
                }
                // A length after the bracket scales every member.
                let outer = s.length();
                for (pitch, len) in members {
                    events.push(NoteEvent {
                        pitch,
                        start_beat: *clock,
                        duration_beats: len * outer,
                        velocity: DEFAULT_VELOCITY,
                    });
                }
                *clock += chord_len * outer;
            }
            'A'..='G' | 'a'..='g' | '^' | '_' | '=' => {
                let pitch = s.note()?;
                let duration = unit_beats * s.length();
                events.push(NoteEvent {
                    pitch,
                    start_beat: *clock,
                    duration_beats: duration,
                    velocity: DEFAULT_VELOCITY,
                });
                *clock += duration;
            }
            other => return Err(s.error(format!("unsupported ABC token '{}'", other))),
        }
    }
    Ok(())
}

// ─── Writing ────────────────────────────────────────────────────────────────

fn note_text(pitch: u8) -> String {
    const SHARPS: [&str; 12] = [
        "C", "^C", "D", "^D", "E", "F", "^F", "G", "^G", "A", "^A", "B",
    ];
    let pc = (pitch % 12) as usize;
    let (accidental, letter) = match SHARPS[pc].strip_prefix('^') {
        Some(l) => ("^", l),
        None => ("", SHARPS[pc]),
    };
    let octave = pitch as i32 / 12 - 1; // 4 = the uppercase octave
    let mut out = String::from(accidental);
    if octave >= 5 {
        out.push_str(&letter.to_lowercase());
        for _ in 5..octave {
            out.push('\'');
        }
    } else {
        out.push_str(letter);
        for _ in octave..4 {
            out.push(',');
        }
    }
    out
}

/// Length as a multiplier of the unit: "" (1), "2", "3/2", "/2", "/4".
fn length_text(duration: f64, unit: f64) -> String {
    let m = duration / unit;
    for den in [1u32, 2, 4, 8] {
        let num = m * den as f64;
        if (num - num.round()).abs() < 1e-6 && num.round() >= 1.0 {
            let num = num.round() as u32;
            let g = gcd(num, den);
            let (num, den) = (num / g, den / g);
            return match (num, den) {
                (1, 1) => String::new(),
                (n, 1) => n.to_string(),
                (1, d) => format!("/{}", d),
                (n, d) => format!("{}/{}", n, d),
            };
        }
    }
    String::new()
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

pub fn render(piece: &Piece) -> String {
    let unit = DEFAULT_UNIT_BEATS;
    let mut out = String::from("X: 1\n");
    if let Some(title) = &piece.title {
        out.push_str(&format!("T: {}\n", title));
    }
    out.push_str(&format!(
        "M: {}/{}\n",
        piece.time_signature.0, piece.time_signature.1
    ));
    out.push_str("L: 1/8\n");
    out.push_str(&format!("Q: 1/4={}\n", piece.tempo_bpm.round() as u32));
    out.push_str("K: C\n");

    let beats_per_measure = piece.beats_per_measure();
    let mut clock = 0.0f64;
    let mut measure = 0usize;
    let mut body = String::new();
    let mut i = 0;
    let events = &piece.events;
    while i < events.len() {
        // Everything sharing this onset is one chord.
        let start = events[i].start_beat;
        let mut j = i;
        while j < events.len() && (events[j].start_beat - start).abs() < 1e-6 {
            j += 1;
        }

        if start - clock > 1e-6 {
            body.push_str(&format!("z{} ", length_text(start - clock, unit)));
        }
        let chunk: Vec<&NoteEvent> = events[i..j].iter().collect();
        if chunk.len() == 1 {
            body.push_str(&format!(
                "{}{} ",
                note_text(chunk[0].pitch),
                length_text(chunk[0].duration_beats, unit)
            ));
        } else {
            body.push('[');
            for e in &chunk {
                body.push_str(&note_text(e.pitch));
                body.push_str(&length_text(e.duration_beats, unit));
            }
            body.push_str("] ");
        }
        let advance = chunk
            .iter()
            .map(|e| e.duration_beats)
            .fold(0.0f64, f64::max);
        clock = start + advance;

        while clock - (measure + 1) as f64 * beats_per_measure > -1e-6 {
            measure += 1;
            body.push_str("| ");
            if measure % 4 == 0 {
                body.push('\n');
            }
        }
        i = j;
    }
    out.push_str(body.trim_end());
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scale() {
        let abc = "X: 1\nT: Scale\nM: 4/4\nL: 1/8\nQ: 1/4=120\nK: C\nC D E F | G A B c |\n";
        let piece = parse(abc, "scale.abc").unwrap();
        assert_eq!(piece.title.as_deref(), Some("Scale"));
        assert!((piece.tempo_bpm - 120.0).abs() < 1e-9);
        let pitches: Vec<u8> = piece.events.iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![60, 62, 64, 65, 67, 69, 71, 72]);
        // Eighths at L:1/8.
        assert!((piece.events[0].duration_beats - 0.5).abs() < 1e-9);
        assert!((piece.events[1].start_beat - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_accidentals_and_octaves() {
        let abc = "K: C\n^F, _B c'2\n";
        let piece = parse(abc, "t.abc").unwrap();
        let pitches: Vec<u8> = piece.events.iter().map(|e| e.pitch).collect();
        assert_eq!(pitches, vec![54, 70, 84]); // F#3, Bb4, C6
        assert!((piece.events[2].duration_beats - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_lengths() {
        let abc = "K: C\nC2 D/2 E3/2 F/\n";
        let piece = parse(abc, "t.abc").unwrap();
        let durations: Vec<f64> = piece.events.iter().map(|e| e.duration_beats).collect();
        assert!((durations[0] - 1.0).abs() < 1e-9);
        assert!((durations[1] - 0.25).abs() < 1e-9);
        assert!((durations[2] - 0.75).abs() < 1e-9);
        assert!((durations[3] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rest_advances_clock() {
        let abc = "K: C\nC z2 D\n";
        let piece = parse(abc, "t.abc").unwrap();
        assert!((piece.events[1].start_beat - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_chord() {
        let abc = "K: C\n[CEG]2 c\n";
        let piece = parse(abc, "t.abc").unwrap();
        assert_eq!(piece.events.len(), 4);
        assert!(piece.events[..3]
            .iter()
            .all(|e| (e.start_beat - 0.0).abs() < 1e-9));
        // Bracket length scales the whole chord: one unit * 2 = 1 beat.
        assert!((piece.events[0].duration_beats - 1.0).abs() < 1e-9);
        assert!((piece.events[3].start_beat - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse("K: C\nC D ? E\n", "t.abc").unwrap_err();
        match err {
            FretmapError::InputMalformed { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, 5);
            }
            other => panic!("wrong error: {}", other),
        }
    }

    #[test]
    fn test_roundtrip() {
        let mut piece = Piece::from_events(vec![
            NoteEvent {
                pitch: 64,
                start_beat: 0.0,
                duration_beats: 0.5,
                velocity: 80,
            },
            NoteEvent {
                pitch: 67,
                start_beat: 0.5,
                duration_beats: 0.5,
                velocity: 80,
            },
            NoteEvent {
                pitch: 71,
                start_beat: 1.5,
                duration_beats: 1.0,
                velocity: 80,
            },
        ]);
        piece.title = Some("Roundtrip".into());
        let text = render(&piece);
        let back = parse(&text, "rt.abc").unwrap();
        assert_eq!(back.title.as_deref(), Some("Roundtrip"));
        assert_eq!(back.events.len(), 3);
        for (a, b) in back.events.iter().zip(piece.events.iter()) {
            assert_eq!(a.pitch, b.pitch);
            assert!((a.start_beat - b.start_beat).abs() < 1e-6);
            assert!((a.duration_beats - b.duration_beats).abs() < 1e-6);
        }
    }

    #[test]
    fn test_render_low_notes_use_commas() {
        let piece = Piece::from_events(vec![NoteEvent {
            pitch: 40,
            start_beat: 0.0,
            duration_beats: 0.5,
            velocity: 80,
        }]);
        let text = render(&piece);
        assert!(text.contains("E,,"), "{}", text);
    }
}
