//! Tuning tables — open-string pitches, capo, and the preset catalogue.

use crate::error::{FretmapError, Result};
use crate::types::{parse_pitch, pitch_name, Pitch};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Ordered open-string pitches, index 0 = highest-sounding string,
/// plus a capo offset applied to every open string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    pub name: String,
    /// MIDI note numbers, highest-sounding first.
    pub open_strings: Vec<Pitch>,
    /// Non-negative fret offset applied to every open string.
    pub capo: u8,
}

impl Tuning {
    pub fn new(name: &str, open_strings: Vec<Pitch>) -> Self {
        Tuning {
            name: name.to_string(),
            open_strings,
            capo: 0,
        }
    }

    pub fn num_strings(&self) -> usize {
        self.open_strings.len()
    }

    /// Keep only the N highest-sounding strings.
    pub fn top_strings(mut self, n: usize) -> Result<Self> {
        if n == 0 || n > self.open_strings.len() {
            return Err(FretmapError::ConfigInvalid(format!(
                "num_strings {} out of range for {}-string tuning \"{}\"",
                n,
                self.open_strings.len(),
                self.name
            )));
        }
        self.open_strings.truncate(n);
        Ok(self)
    }

    /// Row label for a tab system, high to low: e, B, G, D, A, E on a
    /// standard guitar. The top string is lowercased when its letter
    /// recurs further down the set.
    pub fn string_label(&self, string: usize) -> String {
        let pitch = self.open_strings[string];
        let name = pitch_name(pitch);
        let letter: String = name.chars().take_while(|c| !c.is_ascii_digit() && *c != '-').collect();
        let recurs = self
            .open_strings
            .iter()
            .enumerate()
            .any(|(i, &p)| i != string && p % 12 == pitch % 12);
        if string == 0 && recurs {
            letter.to_lowercase()
        } else {
            letter
        }
    }

    /// Space-separated note list, highest first: "E4 B3 G3 D3 A2 E2".
    pub fn note_list(&self) -> String {
        self.open_strings
            .iter()
            .map(|&p| pitch_name(p))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ─── Preset catalogue ───────────────────────────────────────────────────────

pub static PRESETS: Lazy<Vec<Tuning>> = Lazy::new(|| {
    vec![
        // MIDI note numbers, highest-sounding string first.
        //                           E4  B3  G3  D3  A2  E2
        Tuning::new("standard", vec![64, 59, 55, 50, 45, 40]),
        Tuning::new("drop-d", vec![64, 59, 55, 50, 45, 38]),
        Tuning::new("dadgad", vec![62, 57, 55, 50, 45, 38]),
        Tuning::new("open-g", vec![62, 59, 55, 50, 43, 38]),
        Tuning::new("half-step-down", vec![63, 58, 54, 49, 44, 39]),
        Tuning::new("seven-string", vec![64, 59, 55, 50, 45, 40, 35]),
        Tuning::new("bass", vec![43, 38, 33, 28]),
        Tuning::new("bass-5", vec![43, 38, 33, 28, 23]),
        Tuning::new("ukulele", vec![69, 64, 60, 67]),
    ]
});

pub fn preset(name: &str) -> Option<Tuning> {
    let needle = name.trim().to_lowercase().replace('_', "-");
    PRESETS.iter().find(|t| t.name == needle).cloned()
}

/// Resolve a tuning spec: a preset name, or an explicit space-separated
/// note list highest-sounding first ("E4 B3 G3 D3 A2 E2").
pub fn parse_tuning(spec: &str) -> Result<Tuning> {
    if let Some(t) = preset(spec) {
        return Ok(t);
    }
    let notes: Vec<&str> = spec.split_whitespace().collect();
    if notes.len() < 2 {
        return Err(FretmapError::ConfigInvalid(format!(
            "unknown tuning \"{}\" (not a preset, not a note list)",
            spec
        )));
    }
    let mut open_strings = Vec::with_capacity(notes.len());
    for n in &notes {
        let pitch = parse_pitch(n).ok_or_else(|| {
            FretmapError::ConfigInvalid(format!("bad note \"{}\" in tuning \"{}\"", n, spec))
        })?;
        open_strings.push(pitch);
    }
    for w in open_strings.windows(2) {
        if w[0] <= w[1] {
            return Err(FretmapError::ConfigInvalid(format!(
                "tuning \"{}\" is not ordered highest-sounding first",
                spec
            )));
        }
    }
    Ok(Tuning::new("custom", open_strings))
}
