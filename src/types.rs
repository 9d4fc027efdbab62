use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Pitch ──────────────────────────────────────────────────────────────────

/// Semitone index in the universal chromatic scale: 0 = C-1, 69 = A4.
/// Identical to a MIDI note number.
pub type Pitch = u8;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// "E2", "F#3", "A4" — sharps only, octave -1 through 9.
pub fn pitch_name(pitch: Pitch) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

/// Parse a note name like "E2", "f#3", "Bb1", "C-1". Returns None on
/// anything else.
pub fn parse_pitch(s: &str) -> Option<Pitch> {
    let s = s.trim();
    let mut chars = s.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let mut semitone: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest: String = chars.collect();
    let octave_str = if let Some(r) = rest.strip_prefix('#') {
        semitone += 1;
        r
    } else if let Some(r) = rest.strip_prefix('b') {
        semitone -= 1;
        r
    } else {
        &rest
    };
    let octave: i32 = octave_str.parse().ok()?;
    let midi = (octave + 1) * 12 + semitone;
    if (0..=127).contains(&midi) {
        Some(midi as u8)
    } else {
        None
    }
}

// ─── Events and frames ──────────────────────────────────────────────────────

/// One sounded note. Immutable once emitted by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: Pitch,
    /// Absolute onset in beats (quarter note = 1.0).
    pub start_beat: f64,
    pub duration_beats: f64,
    /// MIDI velocity, 0-127.
    pub velocity: u8,
}

impl NoteEvent {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:.3}", pitch_name(self.pitch), self.start_beat)
    }
}

/// Maximal set of events sharing a quantised start time. Frames are
/// strictly ordered by start_beat and never overlap in start_beat.
#[derive(Debug, Clone)]
pub struct Frame {
    pub start_beat: f64,
    /// Non-empty, sorted by ascending pitch.
    pub events: Vec<NoteEvent>,
}

impl Frame {
    /// Duration of the shortest member — the window used for
    /// articulation timing.
    pub fn min_duration(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.duration_beats)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.min_duration()
    }
}

// ─── Fretboard positions ────────────────────────────────────────────────────

/// A place on the neck. String 0 is the highest-sounding string;
/// fret 0 is the open string (or the capo, when one is set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub string: usize,
    pub fret: u8,
}

impl Position {
    pub fn new(string: usize, fret: u8) -> Self {
        Position { string, fret }
    }

    pub fn is_open(&self) -> bool {
        self.fret == 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.string, self.fret)
    }
}

/// A position assigned to a specific event by the solver.
#[derive(Debug, Clone, Copy)]
pub struct ChosenPosition {
    pub position: Position,
    pub event: NoteEvent,
}

impl fmt::Display for ChosenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.position, pitch_name(self.event.pitch))
    }
}

/// Cached geometry of a chosen frame: fret extent among fretted
/// positions, how many are fretted, and which strings are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeSignature {
    /// Lowest fret among fretted positions; 0 when none are fretted.
    pub min_fret: u8,
    /// Highest fret among fretted positions; 0 when none are fretted.
    pub max_fret: u8,
    pub fretted_count: usize,
    /// Sorted ascending.
    pub strings: Vec<usize>,
}

impl ShapeSignature {
    pub fn of(positions: &[ChosenPosition]) -> Self {
        let mut min_fret = u8::MAX;
        let mut max_fret = 0u8;
        let mut fretted_count = 0;
        let mut strings: Vec<usize> = Vec::with_capacity(positions.len());
        for p in positions {
            strings.push(p.position.string);
            if !p.position.is_open() {
                fretted_count += 1;
                min_fret = min_fret.min(p.position.fret);
                max_fret = max_fret.max(p.position.fret);
            }
        }
        if fretted_count == 0 {
            min_fret = 0;
        }
        strings.sort_unstable();
        ShapeSignature {
            min_fret,
            max_fret,
            fretted_count,
            strings,
        }
    }
}

/// A frame after the solver has run. Empty positions mean the frame was
/// unplayable and is emitted as a rest, timing preserved.
#[derive(Debug, Clone)]
pub struct MappedFrame {
    pub frame: Frame,
    /// One entry per frame event, pairwise-distinct strings. Empty = rest.
    pub positions: Vec<ChosenPosition>,
    pub signature: ShapeSignature,
}

impl MappedFrame {
    pub fn rest(frame: Frame) -> Self {
        MappedFrame {
            frame,
            positions: Vec::new(),
            signature: ShapeSignature::of(&[]),
        }
    }

    pub fn is_rest(&self) -> bool {
        self.positions.is_empty()
    }
}

// ─── Articulation ───────────────────────────────────────────────────────────

/// Label attached to the transition between two consecutive monophonic
/// frames. Never alters positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Articulation {
    HammerOn,
    PullOff,
    SlideUp,
    SlideDown,
    Tap,
}

impl Articulation {
    pub fn glyph(&self) -> char {
        match self {
            Articulation::HammerOn => 'h',
            Articulation::PullOff => 'p',
            Articulation::SlideUp => '/',
            Articulation::SlideDown => '\\',
            Articulation::Tap => 't',
        }
    }

    pub fn from_glyph(c: char) -> Option<Self> {
        match c {
            'h' => Some(Articulation::HammerOn),
            'p' => Some(Articulation::PullOff),
            '/' => Some(Articulation::SlideUp),
            '\\' => Some(Articulation::SlideDown),
            't' => Some(Articulation::Tap),
            _ => None,
        }
    }
}

// ─── Piece ──────────────────────────────────────────────────────────────────

pub const DEFAULT_TEMPO_BPM: f64 = 120.0;
pub const DEFAULT_TIME_SIGNATURE: (u8, u8) = (4, 4);
pub const DEFAULT_VELOCITY: u8 = 80;

/// A bounded sequence of events plus the metadata every reader can
/// supply (defaults otherwise: 120 BPM, 4/4).
#[derive(Debug, Clone)]
pub struct Piece {
    pub title: Option<String>,
    pub tempo_bpm: f64,
    pub time_signature: (u8, u8),
    pub events: Vec<NoteEvent>,
}

impl Piece {
    pub fn from_events(events: Vec<NoteEvent>) -> Self {
        Piece {
            title: None,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            time_signature: DEFAULT_TIME_SIGNATURE,
            events,
        }
    }

    /// Beats per measure under this time signature (quarter note = 1.0).
    pub fn beats_per_measure(&self) -> f64 {
        let (num, den) = self.time_signature;
        num as f64 * 4.0 / den as f64
    }
}

// ─── Run summary ────────────────────────────────────────────────────────────

/// Per-run diagnostic sink. Threaded through normalisation and solving;
/// no process-wide state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub notes_dropped: u32,
    pub notes_folded: u32,
    pub notes_merged: u32,
    pub chords_unplayable: u32,
}

impl RunSummary {
    /// One final diagnostic line ("3 notes dropped, 1 chord unplayable"),
    /// or None when the run was clean.
    pub fn line(&self) -> Option<String> {
        fn count(n: u32, noun: &str, rest: &str) -> String {
            let s = if n == 1 { "" } else { "s" };
            format!("{} {}{} {}", n, noun, s, rest)
        }
        let mut parts = Vec::new();
        if self.notes_dropped > 0 {
            parts.push(count(self.notes_dropped, "note", "dropped"));
        }
        if self.notes_folded > 0 {
            parts.push(count(self.notes_folded, "note", "octave-folded"));
        }
        if self.notes_merged > 0 {
            parts.push(count(self.notes_merged, "note", "merged"));
        }
        if self.chords_unplayable > 0 {
            parts.push(count(self.chords_unplayable, "chord", "unplayable"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}
