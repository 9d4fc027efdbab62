//! End-to-end tests for the transcription pipeline:
//!   events → normalise → frame DP → articulations → tab → parse back
//!
//! Covers the concrete scenarios (single-string scale, open-string
//! preference, unplayable clusters, sweet-spot steering, tab round-trip,
//! articulation labelling) and the quantified invariants of the mapper.

use fretmap::articulate::infer_articulations;
use fretmap::config::{MapperConfig, PitchMode};
use fretmap::fretboard::Fretboard;
use fretmap::normalize::normalize;
use fretmap::solver::solve;
use fretmap::tab_parse;
use fretmap::tab_render;
use fretmap::tuning::preset;
use fretmap::types::{
    Articulation, MappedFrame, NoteEvent, Piece, RunSummary,
};

// ─── Helpers ───────────────────────────────────────────────────────────────

fn ev(pitch: u8, start: f64, duration: f64) -> NoteEvent {
    NoteEvent {
        pitch,
        start_beat: start,
        duration_beats: duration,
        velocity: 96,
    }
}

/// Evenly spaced monophonic line.
fn line(pitches: &[u8], spacing: f64) -> Vec<NoteEvent> {
    pitches
        .iter()
        .enumerate()
        .map(|(i, &p)| ev(p, i as f64 * spacing, spacing))
        .collect()
}

struct Run {
    mapped: Vec<MappedFrame>,
    labels: Vec<Option<Articulation>>,
    summary: RunSummary,
    fretboard: Fretboard,
}

fn run_pipeline(events: &[NoteEvent], cfg: &MapperConfig) -> Run {
    let fretboard =
        Fretboard::new(cfg.tuning.clone(), cfg.max_fret, cfg.single_string).unwrap();
    let mut summary = RunSummary::default();
    let frames = normalize(events, &fretboard, cfg, &mut summary);
    let mapped = solve(&frames, &fretboard, cfg, &mut summary);
    let labels = infer_articulations(&mapped, &cfg.weights, cfg.no_articulations);
    Run {
        mapped,
        labels,
        summary,
        fretboard,
    }
}

fn positions(run: &Run) -> Vec<(usize, u8)> {
    run.mapped
        .iter()
        .flat_map(|m| {
            m.positions
                .iter()
                .map(|p| (p.position.string, p.position.fret))
        })
        .collect()
}

fn render_tab(events: &[NoteEvent], cfg: &MapperConfig) -> String {
    let run = run_pipeline(events, cfg);
    let piece = Piece::from_events(events.to_vec());
    tab_render::render(
        &piece,
        &run.mapped,
        &run.labels,
        run.fretboard.tuning(),
        cfg,
    )
}

// ─── Scenarios ─────────────────────────────────────────────────────────────

#[test]
fn scenario_single_string_scale() {
    // C4 D4 E4 F4 G4 forced onto the G string: one position each, and
    // the close transitions come out as hammer-ons.
    let mut cfg = MapperConfig::default();
    cfg.single_string = Some(2);
    let events = line(&[60, 62, 64, 65, 67], 0.25);
    let run = run_pipeline(&events, &cfg);

    assert_eq!(
        positions(&run),
        vec![(2, 5), (2, 7), (2, 9), (2, 10), (2, 12)]
    );
    assert_eq!(run.labels[3], Some(Articulation::HammerOn), "E4 -> F4");
    assert_eq!(run.labels[4], Some(Articulation::HammerOn), "F4 -> G4");
}

#[test]
fn scenario_open_string_preferred() {
    // The lowest open E of standard tuning stays an open string.
    let cfg = MapperConfig::default();
    let run = run_pipeline(&[ev(40, 0.0, 1.0)], &cfg);
    assert_eq!(positions(&run), vec![(5, 0)]);
}

#[test]
fn scenario_unplayable_cluster_becomes_rest() {
    // {C4, C#4, D4} has no assignment with distinct strings inside a
    // 4-fret span; the frame rests and its neighbours are untouched.
    let cfg = MapperConfig::default();
    let mut events = vec![ev(60, 1.0, 0.5), ev(61, 1.0, 0.5), ev(62, 1.0, 0.5)];
    events.insert(0, ev(64, 0.0, 0.5));
    events.push(ev(64, 2.0, 0.5));
    let run = run_pipeline(&events, &cfg);

    assert_eq!(run.mapped.len(), 3);
    assert!(!run.mapped[0].is_rest());
    assert!(run.mapped[1].is_rest(), "cluster frame should rest");
    assert!(!run.mapped[2].is_rest());
    assert!((run.mapped[1].frame.start_beat - 1.0).abs() < 1e-9, "timing preserved");
    assert_eq!(run.summary.chords_unplayable, 1);
    assert_eq!(run.summary.line().unwrap(), "1 chord unplayable");
}

#[test]
fn scenario_sweet_spot_steering() {
    // F#3 cannot sit on the open G string (one semitone below it); it
    // lands on the D string, fret 4 — under the default sweet spot and
    // with a widened one alike.
    let cfg = MapperConfig::default();
    let run = run_pipeline(&[ev(54, 0.0, 0.5)], &cfg);
    assert_eq!(positions(&run), vec![(3, 4)]);

    let mut widened = MapperConfig::default();
    widened.weights.sweet_spot_high = 8;
    let run = run_pipeline(&[ev(54, 0.0, 0.5)], &widened);
    assert_eq!(positions(&run), vec![(3, 4)]);
}

#[test]
fn scenario_prefer_open_picks_the_open_string() {
    // With prefer_open and opens counted, a lone E4 goes to the open
    // top string rather than a fretted unison.
    let mut cfg = MapperConfig::default();
    cfg.weights.ignore_open = false;
    cfg.weights.prefer_open = true;
    let run = run_pipeline(&[ev(64, 0.0, 0.5)], &cfg);
    assert_eq!(positions(&run), vec![(0, 0)]);
}

#[test]
fn scenario_tab_round_trip() {
    // Render three notes to tab, parse the text back: identical pitch
    // sequence, onsets within half a grid cell.
    let cfg = MapperConfig::default();
    let events = vec![ev(64, 0.0, 0.5), ev(67, 0.5, 0.5), ev(71, 1.0, 1.0)];
    let tab = render_tab(&events, &cfg);

    let parsed = tab_parse::parse(&tab, "roundtrip.tab", &cfg).unwrap();
    let pitches: Vec<u8> = parsed.piece.events.iter().map(|e| e.pitch).collect();
    assert_eq!(pitches, vec![64, 67, 71]);
    for (parsed, original) in parsed.piece.events.iter().zip(events.iter()) {
        assert!(
            (parsed.start_beat - original.start_beat).abs() <= 0.125 + 1e-9,
            "onset {} drifted to {}",
            original.start_beat,
            parsed.start_beat
        );
    }
}

#[test]
fn scenario_articulation_labels() {
    // Close, rising, same-string notes label as h h.
    let cfg = MapperConfig::default();
    let events = vec![ev(69, 0.0, 0.25), ev(71, 0.1, 0.25), ev(72, 0.2, 0.25)];
    let run = run_pipeline(&events, &cfg);

    assert_eq!(run.mapped.len(), 3);
    let strings: Vec<usize> = run
        .mapped
        .iter()
        .map(|m| m.positions[0].position.string)
        .collect();
    assert!(strings.windows(2).all(|w| w[0] == w[1]), "one string: {:?}", strings);
    assert_eq!(run.labels[1], Some(Articulation::HammerOn));
    assert_eq!(run.labels[2], Some(Articulation::HammerOn));

    let tab = render_tab(&events, &cfg);
    assert!(tab.contains('h'), "glyph should reach the tab:\n{}", tab);
}

// ─── Quantified invariants ─────────────────────────────────────────────────

/// A two-hand-ish chord progression plus a melody, all in range.
fn mixed_material() -> Vec<NoteEvent> {
    let mut events = Vec::new();
    // C major, G major, A minor triads on successive beats
    for (beat, triad) in [
        (0.0, [48u8, 52, 55]),
        (1.0, [43, 47, 50]),
        (2.0, [45, 48, 52]),
    ] {
        for p in triad {
            events.push(ev(p, beat, 1.0));
        }
    }
    // then a line
    events.extend(line(&[60, 62, 64, 65, 67, 69], 0.25).into_iter().map(|mut e| {
        e.start_beat += 3.0;
        e
    }));
    events
}

#[test]
fn invariant_positions_sound_their_pitch() {
    let cfg = MapperConfig::default();
    let run = run_pipeline(&mixed_material(), &cfg);
    for m in &run.mapped {
        for p in &m.positions {
            assert_eq!(
                run.fretboard.pitch_at(p.position),
                p.event.pitch,
                "position {} does not sound {}",
                p.position,
                p.event.pitch
            );
        }
    }
}

#[test]
fn invariant_strings_pairwise_distinct() {
    let cfg = MapperConfig::default();
    let run = run_pipeline(&mixed_material(), &cfg);
    for m in &run.mapped {
        let mut strings: Vec<usize> =
            m.positions.iter().map(|p| p.position.string).collect();
        let n = strings.len();
        strings.sort_unstable();
        strings.dedup();
        assert_eq!(strings.len(), n, "doubled string at beat {}", m.frame.start_beat);
    }
}

#[test]
fn invariant_span_bounded() {
    let cfg = MapperConfig::default();
    let run = run_pipeline(&mixed_material(), &cfg);
    for m in &run.mapped {
        if m.signature.fretted_count > 0 {
            let span = m.signature.max_fret - m.signature.min_fret;
            assert!(
                span <= cfg.weights.unplayable_fret_span,
                "span {} at beat {}",
                span,
                m.frame.start_beat
            );
        }
    }
}

#[test]
fn invariant_deterministic_output() {
    let cfg = MapperConfig::default();
    let events = mixed_material();
    let a = render_tab(&events, &cfg);
    let b = render_tab(&events, &cfg);
    assert_eq!(a, b, "same input and config must give byte-identical tab");
}

#[test]
fn invariant_articulations_never_move_positions() {
    let mut with = MapperConfig::default();
    with.no_articulations = false;
    let mut without = MapperConfig::default();
    without.no_articulations = true;

    let events = mixed_material();
    let run_with = run_pipeline(&events, &with);
    let run_without = run_pipeline(&events, &without);
    assert_eq!(positions(&run_with), positions(&run_without));
    assert!(run_without.labels.iter().all(|l| l.is_none()));
}

#[test]
fn invariant_high_fret_penalty_monotone() {
    let events = line(&[64, 67, 69, 71, 72, 74], 0.5);
    let mut last_max: Option<u8> = None;
    for penalty in [0.0, 0.1, 0.5, 2.0, 10.0] {
        let mut cfg = MapperConfig::default();
        cfg.weights.high_fret_penalty = penalty;
        let run = run_pipeline(&events, &cfg);
        let max_fret = positions(&run).iter().map(|&(_, f)| f).max().unwrap();
        if let Some(prev) = last_max {
            assert!(
                max_fret <= prev,
                "penalty {} raised max fret {} -> {}",
                penalty,
                prev,
                max_fret
            );
        }
        last_max = Some(max_fret);
    }
}

// ─── Normalisation and configuration edges ─────────────────────────────────

#[test]
fn out_of_range_notes_reported_not_fatal() {
    let cfg = MapperConfig::default();
    let mut events = line(&[60, 62], 0.5);
    events.push(ev(20, 1.0, 0.5)); // far below any string
    let run = run_pipeline(&events, &cfg);
    assert_eq!(run.summary.notes_dropped, 1);
    assert_eq!(run.mapped.len(), 2);
}

#[test]
fn octave_folding_keeps_the_note() {
    let mut cfg = MapperConfig::default();
    cfg.pitch_mode = PitchMode::Normalize;
    let run = run_pipeline(&[ev(20, 0.0, 0.5)], &cfg);
    assert_eq!(run.summary.notes_dropped, 0);
    assert_eq!(run.summary.notes_folded, 1);
    assert_eq!(run.mapped.len(), 1);
    assert!(!run.mapped[0].is_rest());
    assert_eq!(run.mapped[0].positions[0].event.pitch % 12, 20 % 12);
}

#[test]
fn contradictory_config_rejected_before_processing() {
    let mut cfg = MapperConfig::default();
    cfg.weights.sweet_spot_low = 10;
    cfg.weights.sweet_spot_high = 2;
    assert!(cfg.validate().is_err());

    // Geometry contradictions surface when the fretboard is built.
    let cfg = MapperConfig::default();
    assert!(Fretboard::new(cfg.tuning.clone(), cfg.max_fret, Some(17)).is_err());
}

#[test]
fn alternate_tuning_end_to_end() {
    // Drop-D: a low D is playable and lands on the open 6th string.
    let mut cfg = MapperConfig::default();
    cfg.tuning = preset("drop-d").unwrap();
    let run = run_pipeline(&[ev(38, 0.0, 1.0)], &cfg);
    assert_eq!(positions(&run), vec![(5, 0)]);

    let tab = render_tab(&[ev(38, 0.0, 1.0)], &cfg);
    assert!(tab.contains("// Tuning: drop-d"), "{}", tab);
}

#[test]
fn capo_shifts_written_frets() {
    // With a capo on 2, D3 (50) is the open 4th string.
    let mut cfg = MapperConfig::default();
    cfg.tuning.capo = 2;
    let run = run_pipeline(&[ev(52, 0.0, 1.0)], &cfg);
    assert_eq!(positions(&run), vec![(3, 0)]);
}

#[test]
fn parsed_tab_maps_back_through_the_solver() {
    // Full circle: tab text → events → mapper → tab text. The second
    // rendering of a tab this system produced is identical.
    let cfg = MapperConfig::default();
    let events = line(&[64, 65, 67, 69], 0.5);
    let tab1 = render_tab(&events, &cfg);
    let parsed = tab_parse::parse(&tab1, "circle.tab", &cfg).unwrap();
    let tab2 = render_tab(&parsed.piece.events, &cfg);
    let parsed2 = tab_parse::parse(&tab2, "circle2.tab", &cfg).unwrap();
    let p1: Vec<u8> = parsed.piece.events.iter().map(|e| e.pitch).collect();
    let p2: Vec<u8> = parsed2.piece.events.iter().map(|e| e.pitch).collect();
    assert_eq!(p1, p2);
}
