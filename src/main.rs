use fretmap::articulate::infer_articulations;
use fretmap::config::{MapperConfig, PitchMode, ScorerWeights};
use fretmap::error::{FretmapError, Result};
use fretmap::formats::{self, InputKind, OutputKind};
use fretmap::fretboard::{analyze, Fretboard};
use fretmap::normalize::normalize;
use fretmap::solver::solve;
use fretmap::tuning::parse_tuning;
use fretmap::types::{NoteEvent, RunSummary};
use fretmap::{abc, midi, tab_render, vextab};

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fretmap")]
#[command(about = "Transcribes note events into fretted-string tablature, and back")]
struct Cli {
    /// Input file; format by extension (.mid, .abc, .vex, .tab)
    input: PathBuf,

    /// Output file; format by extension (.tab, .mid, .abc, .vex).
    /// Not needed with --analyze.
    output: Option<PathBuf>,

    /// Report which tuning presets cover the input's pitch span, then exit
    #[arg(long)]
    analyze: bool,

    /// Emit the --analyze report as JSON
    #[arg(long)]
    analyze_json: bool,

    // ─── Fretboard geometry ─────────────────────────────────────────
    /// Tuning preset name, or a note list highest string first
    /// ("E4 B3 G3 D3 A2 E2")
    #[arg(long, default_value = "standard")]
    tuning: String,

    /// Capo fret, applied to every open string
    #[arg(long, default_value_t = 0)]
    capo: u8,

    /// Use only the N highest-sounding strings of the tuning
    #[arg(long)]
    num_strings: Option<usize>,

    #[arg(long, default_value_t = 22)]
    max_fret: u8,

    /// Force every note onto one string (1-based, 1 = highest-sounding)
    #[arg(long)]
    single_string: Option<usize>,

    // ─── Event normalisation ────────────────────────────────────────
    /// Shift all onsets right by nudge * 0.25 beats before framing
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    nudge: i32,

    /// Select one 1-based track of a multi-track input
    #[arg(long)]
    track: Option<usize>,

    /// Transpose in semitones (signed)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    transpose: i32,

    /// Keep out-of-range pitches instead of only dropping them
    #[arg(long)]
    constrain_pitch: bool,

    /// What --constrain-pitch does with an out-of-range pitch
    #[arg(long, value_enum, default_value = "normalize")]
    pitch_mode: PitchMode,

    /// Reduce simultaneous notes to the lowest pitch
    #[arg(long)]
    mono_lowest_only: bool,

    /// Collapse identical pitches within a frame
    #[arg(long)]
    dedupe: bool,

    /// Snap onsets to the grid before framing
    #[arg(long)]
    pre_quantize: bool,

    /// Frame grid in beats: 0.0125, 0.0625, 0.125, 0.25, 0.5 or 1.0
    #[arg(long, default_value_t = 0.125)]
    quantization_resolution: f64,

    // ─── Output shaping ─────────────────────────────────────────────
    /// Skip hammer-on / pull-off / slide / tap inference
    #[arg(long)]
    no_articulations: bool,

    /// Force 1/8-beat durations when re-materialising tab
    #[arg(long)]
    staccato: bool,

    /// ASCII tab measure width in characters
    #[arg(long, default_value_t = 40)]
    max_line_width: usize,

    // ─── Scorer weights ─────────────────────────────────────────────
    /// JSON file of scorer weights; absent keys keep defaults, CLI
    /// flags below override the file
    #[arg(long)]
    weights: Option<PathBuf>,

    #[arg(long)]
    fret_span_penalty: Option<f64>,
    #[arg(long)]
    movement_penalty: Option<f64>,
    #[arg(long)]
    string_switch_penalty: Option<f64>,
    #[arg(long)]
    high_fret_penalty: Option<f64>,
    #[arg(long)]
    low_string_high_fret_multiplier: Option<f64>,
    #[arg(long)]
    unplayable_fret_span: Option<u8>,
    /// Leave open strings out of span and centroid computations
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    ignore_open: Option<bool>,
    #[arg(long)]
    sweet_spot_bonus: Option<f64>,
    #[arg(long)]
    sweet_spot_low: Option<u8>,
    #[arg(long)]
    sweet_spot_high: Option<u8>,
    #[arg(long)]
    barre_bonus: Option<f64>,
    #[arg(long)]
    barre_penalty: Option<f64>,
    #[arg(long)]
    let_ring_bonus: Option<f64>,
    /// Penalise fretting a note that had an open-string alternative
    #[arg(long)]
    prefer_open: bool,
    #[arg(long)]
    fretted_open_penalty: Option<f64>,
    /// Apply the fret-span gate across consecutive frames
    #[arg(long)]
    count_fret_span_across_neighbors: bool,
    #[arg(long)]
    legato_time_threshold: Option<f64>,
    #[arg(long)]
    tapping_run_threshold: Option<usize>,
}

fn build_config(cli: &Cli) -> Result<MapperConfig> {
    let mut tuning = parse_tuning(&cli.tuning)?;
    if let Some(n) = cli.num_strings {
        tuning = tuning.top_strings(n)?;
    }
    tuning.capo = cli.capo;

    let single_string = match cli.single_string {
        Some(0) => {
            return Err(FretmapError::ConfigInvalid(
                "single_string is 1-based; 0 names no string".into(),
            ))
        }
        Some(s) => Some(s - 1),
        None => None,
    };

    let mut weights = match &cli.weights {
        Some(path) => ScorerWeights::load(path)?,
        None => ScorerWeights::default(),
    };
    macro_rules! override_weight {
        ($($field:ident),* $(,)?) => {
            $(if let Some(v) = cli.$field {
                weights.$field = v;
            })*
        };
    }
    override_weight!(
        fret_span_penalty,
        movement_penalty,
        string_switch_penalty,
        high_fret_penalty,
        low_string_high_fret_multiplier,
        unplayable_fret_span,
        ignore_open,
        sweet_spot_bonus,
        sweet_spot_low,
        sweet_spot_high,
        barre_bonus,
        barre_penalty,
        let_ring_bonus,
        fretted_open_penalty,
        legato_time_threshold,
        tapping_run_threshold,
    );
    if cli.prefer_open {
        weights.prefer_open = true;
    }
    if cli.count_fret_span_across_neighbors {
        weights.count_fret_span_across_neighbors = true;
    }

    let cfg = MapperConfig {
        tuning,
        max_fret: cli.max_fret,
        single_string,
        nudge: cli.nudge,
        transpose: cli.transpose,
        pitch_mode: if cli.constrain_pitch {
            cli.pitch_mode
        } else {
            PitchMode::Drop
        },
        mono_lowest_only: cli.mono_lowest_only,
        dedupe: cli.dedupe,
        pre_quantize: cli.pre_quantize,
        quantization_resolution: cli.quantization_resolution,
        no_articulations: cli.no_articulations,
        staccato: cli.staccato,
        max_line_width: cli.max_line_width,
        weights,
    };
    cfg.validate()?;
    Ok(cfg)
}

fn print_analysis(events: &[NoteEvent], max_fret: u8, as_json: bool) -> Result<()> {
    let report = analyze(events, max_fret);
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).expect("report serialises")
        );
        return Ok(());
    }
    for cov in &report {
        let mut line = format!("{:<16} {}/{} covered", cov.tuning, cov.covered, cov.total);
        if !cov.fully_covered() && cov.best_transpose != 0 {
            line.push_str(&format!(
                " ({}/{} with transpose {})",
                cov.covered_at_best, cov.total, cov.best_transpose
            ));
        }
        println!("{}", line);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = build_config(cli)?;

    let input_kind = InputKind::from_path(&cli.input).ok_or_else(|| {
        FretmapError::Unsupported(format!(
            "{}: unrecognised input extension",
            cli.input.display()
        ))
    })?;
    let piece = formats::read(&cli.input, input_kind, &cfg, cli.track)?;
    info!(
        "read {} ({} events, {:.0} BPM, {}/{})",
        cli.input.display(),
        piece.events.len(),
        piece.tempo_bpm,
        piece.time_signature.0,
        piece.time_signature.1
    );

    if cli.analyze || cli.analyze_json {
        return print_analysis(&piece.events, cfg.max_fret, cli.analyze_json);
    }

    let output = cli.output.as_ref().ok_or_else(|| {
        FretmapError::ConfigInvalid("an output path is required unless --analyze".into())
    })?;
    let output_kind = OutputKind::from_path(output).ok_or_else(|| {
        FretmapError::Unsupported(format!(
            "{}: unrecognised output extension",
            output.display()
        ))
    })?;

    let fb = Fretboard::new(cfg.tuning.clone(), cfg.max_fret, cfg.single_string)?;
    let mut summary = RunSummary::default();
    let frames = normalize(&piece.events, &fb, &cfg, &mut summary);
    info!(
        "{} frames on {} ({} strings, capo {})",
        frames.len(),
        fb.tuning().name,
        fb.num_strings(),
        fb.tuning().capo
    );

    match output_kind {
        OutputKind::AsciiTab | OutputKind::VexTab => {
            let mapped = solve(&frames, &fb, &cfg, &mut summary);
            let labels = infer_articulations(&mapped, &cfg.weights, cfg.no_articulations);
            let text = match output_kind {
                OutputKind::AsciiTab => {
                    tab_render::render(&piece, &mapped, &labels, fb.tuning(), &cfg)
                }
                _ => vextab::render(&piece, &mapped),
            };
            std::fs::write(output, text)?;
        }
        OutputKind::Midi => {
            let mut out_piece = piece.clone();
            out_piece.events = frames.iter().flat_map(|f| f.events.clone()).collect();
            midi::write(output, &out_piece)?;
        }
        OutputKind::Abc => {
            let mut out_piece = piece.clone();
            out_piece.events = frames.iter().flat_map(|f| f.events.clone()).collect();
            std::fs::write(output, abc::render(&out_piece))?;
        }
    }

    info!("wrote {}", output.display());
    if let Some(line) = summary.line() {
        info!("{}", line);
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
