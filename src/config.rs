//! The mapper's configuration bag — built once at startup, validated,
//! then passed by reference through every mapper call. Nothing mutates
//! it during a run.

use crate::error::{FretmapError, Result};
use crate::tuning::Tuning;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grid resolutions the normaliser accepts, in beats.
pub const GRID_RESOLUTIONS: [f64; 6] = [0.0125, 0.0625, 0.125, 0.25, 0.5, 1.0];

/// What to do with events outside the fretboard's pitch range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PitchMode {
    /// Drop the event.
    Drop,
    /// Fold by ±12 semitones until in range; drop if that never lands.
    Normalize,
}

/// Penalty weights consulted by the chord-shape oracle and the position
/// scorer. All costs are penalties: higher is worse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScorerWeights {
    /// Per-fret-of-span cost added to a chord shape.
    pub fret_span_penalty: f64,
    /// Cost per fret of centroid movement between consecutive frames.
    pub movement_penalty: f64,
    /// Cost per string sounded that the previous frame did not use.
    pub string_switch_penalty: f64,
    /// Cost per fret of the shape's highest fretted fret.
    pub high_fret_penalty: f64,
    /// Extra per-fret cost for fretting high on a low (thick) string.
    pub low_string_high_fret_multiplier: f64,
    /// Fretted-fret span beyond which a shape is rejected outright.
    pub unplayable_fret_span: u8,
    /// Exclude open strings from span and centroid computations.
    pub ignore_open: bool,
    pub sweet_spot_bonus: f64,
    pub sweet_spot_low: u8,
    pub sweet_spot_high: u8,
    /// Barres score barre_penalty - barre_bonus net (either sign).
    pub barre_bonus: f64,
    pub barre_penalty: f64,
    /// Awarded when a string held in the previous frame keeps ringing.
    pub let_ring_bonus: f64,
    /// Penalise fretting a note that had an unused open-string alternative.
    pub prefer_open: bool,
    pub fretted_open_penalty: f64,
    /// Apply the span gate to the union of two consecutive frames.
    pub count_fret_span_across_neighbors: bool,
    /// Max gap (beats) between note end and next onset for legato labels.
    pub legato_time_threshold: f64,
    /// Minimum run length before legato runs upgrade to tapping.
    pub tapping_run_threshold: usize,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        ScorerWeights {
            fret_span_penalty: 0.25,
            movement_penalty: 1.0,
            string_switch_penalty: 0.25,
            high_fret_penalty: 0.1,
            low_string_high_fret_multiplier: 0.15,
            unplayable_fret_span: 4,
            ignore_open: true,
            sweet_spot_bonus: 0.5,
            sweet_spot_low: 0,
            sweet_spot_high: 5,
            barre_bonus: 0.75,
            barre_penalty: 0.25,
            let_ring_bonus: 0.25,
            prefer_open: false,
            fretted_open_penalty: 0.5,
            count_fret_span_across_neighbors: false,
            legato_time_threshold: 0.125,
            tapping_run_threshold: 6,
        }
    }
}

impl ScorerWeights {
    /// Load weights from a JSON file; absent keys keep their defaults,
    /// unknown keys are a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| FretmapError::InputUnreadable {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&data).map_err(|e| {
            FretmapError::ConfigInvalid(format!("weights file {}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweet_spot_low > self.sweet_spot_high {
            return Err(FretmapError::ConfigInvalid(format!(
                "sweet_spot_low {} > sweet_spot_high {}",
                self.sweet_spot_low, self.sweet_spot_high
            )));
        }
        if self.unplayable_fret_span == 0 {
            return Err(FretmapError::ConfigInvalid(
                "unplayable_fret_span must be at least 1".into(),
            ));
        }
        for (name, v) in [
            ("fret_span_penalty", self.fret_span_penalty),
            ("movement_penalty", self.movement_penalty),
            ("string_switch_penalty", self.string_switch_penalty),
            ("high_fret_penalty", self.high_fret_penalty),
            (
                "low_string_high_fret_multiplier",
                self.low_string_high_fret_multiplier,
            ),
            ("sweet_spot_bonus", self.sweet_spot_bonus),
            ("barre_bonus", self.barre_bonus),
            ("barre_penalty", self.barre_penalty),
            ("let_ring_bonus", self.let_ring_bonus),
            ("fretted_open_penalty", self.fretted_open_penalty),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(FretmapError::ConfigInvalid(format!(
                    "{} must be a non-negative finite number, got {}",
                    name, v
                )));
            }
        }
        if !self.legato_time_threshold.is_finite() || self.legato_time_threshold < 0.0 {
            return Err(FretmapError::ConfigInvalid(format!(
                "legato_time_threshold must be non-negative, got {}",
                self.legato_time_threshold
            )));
        }
        if self.tapping_run_threshold < 3 {
            return Err(FretmapError::ConfigInvalid(
                "tapping_run_threshold below 3 would tag ordinary legato pairs".into(),
            ));
        }
        Ok(())
    }
}

/// Everything the mapper needs, assembled once by the caller.
#[derive(Debug, Clone)]
pub struct MapperConfig {
    pub tuning: Tuning,
    pub max_fret: u8,
    /// 0-based string index; forces every position onto one string.
    pub single_string: Option<usize>,

    // Normaliser stages.
    /// Shift all onsets right by nudge * 0.25 beats before framing.
    pub nudge: i32,
    pub transpose: i32,
    pub pitch_mode: PitchMode,
    pub mono_lowest_only: bool,
    pub dedupe: bool,
    pub pre_quantize: bool,
    pub quantization_resolution: f64,

    // Output shaping.
    pub no_articulations: bool,
    pub staccato: bool,
    pub max_line_width: usize,

    pub weights: ScorerWeights,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            tuning: crate::tuning::preset("standard").expect("standard preset exists"),
            max_fret: 22,
            single_string: None,
            nudge: 0,
            transpose: 0,
            pitch_mode: PitchMode::Drop,
            mono_lowest_only: false,
            dedupe: false,
            pre_quantize: false,
            quantization_resolution: 0.125,
            no_articulations: false,
            staccato: false,
            max_line_width: 40,
            weights: ScorerWeights::default(),
        }
    }
}

impl MapperConfig {
    /// Reject contradictions before any frames are processed.
    pub fn validate(&self) -> Result<()> {
        if !GRID_RESOLUTIONS
            .iter()
            .any(|&r| (r - self.quantization_resolution).abs() < 1e-9)
        {
            return Err(FretmapError::ConfigInvalid(format!(
                "quantization_resolution {} not one of {:?}",
                self.quantization_resolution, GRID_RESOLUTIONS
            )));
        }
        if self.max_line_width < 8 {
            return Err(FretmapError::ConfigInvalid(format!(
                "max_line_width {} too narrow for a measure",
                self.max_line_width
            )));
        }
        if self.max_fret == 0 || self.max_fret > 36 {
            return Err(FretmapError::ConfigInvalid(format!(
                "max_fret {} out of range (1-36)",
                self.max_fret
            )));
        }
        if self.tuning.capo > self.max_fret {
            return Err(FretmapError::ConfigInvalid(format!(
                "capo {} exceeds max_fret {}",
                self.tuning.capo, self.max_fret
            )));
        }
        if let Some(s) = self.single_string {
            if s >= self.tuning.num_strings() {
                return Err(FretmapError::ConfigInvalid(format!(
                    "single_string {} exceeds string count {}",
                    s + 1,
                    self.tuning.num_strings()
                )));
            }
        }
        self.weights.validate()
    }
}
