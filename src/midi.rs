//! Standard MIDI File reader and writer.
//!
//! Reading pairs NoteOn/NoteOff into NoteEvents in beat time
//! (ticks / PPQ); the first Tempo and TimeSignature metas become piece
//! metadata. Writing emits a two-track SMF: meta track, then notes.

use crate::error::{FretmapError, Result};
use crate::types::{NoteEvent, Piece, DEFAULT_TEMPO_BPM};
use log::debug;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::collections::HashMap;
use std::path::Path;

/// MIDI ticks per quarter note on the write side.
const PPQ: u16 = 480;

pub fn read(path: &Path, track: Option<usize>) -> Result<Piece> {
    let bytes = std::fs::read(path).map_err(|e| FretmapError::InputUnreadable {
        path: path.display().to_string(),
        source: e,
    })?;
    let display = path.display().to_string();
    let smf = Smf::parse(&bytes).map_err(|e| {
        FretmapError::malformed(&display, 1, 1, format!("not a valid MIDI file: {}", e))
    })?;

    let ppq = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as f64,
        Timing::Timecode(..) => {
            return Err(FretmapError::Unsupported(format!(
                "{}: SMPTE-timed MIDI is not supported",
                display
            )))
        }
    };

    if let Some(t) = track {
        if t == 0 || t > smf.tracks.len() {
            return Err(FretmapError::ConfigInvalid(format!(
                "track {} out of range, {} has {} tracks",
                t,
                display,
                smf.tracks.len()
            )));
        }
    }

    let mut piece = Piece::from_events(Vec::new());
    let mut tempo_seen = false;
    let mut timesig_seen = false;

    for (ti, trk) in smf.tracks.iter().enumerate() {
        // --track is 1-based; metadata is read from every track.
        let selected = track.map_or(true, |t| t == ti + 1);
        let mut ticks: u64 = 0;
        let mut open: HashMap<(u8, u8), (f64, u8)> = HashMap::new();

        for ev in trk {
            ticks += ev.delta.as_int() as u64;
            let beat = ticks as f64 / ppq;
            match ev.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    if !tempo_seen {
                        piece.tempo_bpm = 60_000_000.0 / us_per_quarter.as_int() as f64;
                        tempo_seen = true;
                    }
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_log2, _, _)) => {
                    if !timesig_seen && num > 0 && den_log2 <= 5 {
                        piece.time_signature = (num, 1u8 << den_log2);
                        timesig_seen = true;
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    if piece.title.is_none() {
                        let name = String::from_utf8_lossy(name).trim().to_string();
                        if !name.is_empty() {
                            piece.title = Some(name);
                        }
                    }
                }
                TrackEventKind::Midi { channel, message } if selected => match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.insert(
                            (channel.as_int(), key.as_int()),
                            (beat, vel.as_int()),
                        );
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        if let Some((start, vel)) =
                            open.remove(&(channel.as_int(), key.as_int()))
                        {
                            piece.events.push(NoteEvent {
                                pitch: key.as_int(),
                                start_beat: start,
                                duration_beats: (beat - start).max(0.0),
                                velocity: vel,
                            });
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Notes still sounding at end-of-track get closed there.
        let end_beat = ticks as f64 / ppq;
        for ((_, key), (start, vel)) in open {
            debug!("track {}: note {} never released, closing at track end", ti + 1, key);
            piece.events.push(NoteEvent {
                pitch: key,
                start_beat: start,
                duration_beats: (end_beat - start).max(0.0),
                velocity: vel,
            });
        }
    }

    piece.events.sort_by(|a, b| {
        a.start_beat
            .partial_cmp(&b.start_beat)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.pitch.cmp(&b.pitch))
    });
    Ok(piece)
}

fn beats_to_ticks(beats: f64) -> u64 {
    (beats * PPQ as f64).round().max(0.0) as u64
}

pub fn write(path: &Path, piece: &Piece) -> Result<()> {
    let mut meta_track: Vec<TrackEvent> = Vec::new();
    if let Some(title) = &piece.title {
        meta_track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(title.as_bytes())),
        });
    }
    let bpm = if piece.tempo_bpm > 0.0 {
        piece.tempo_bpm
    } else {
        DEFAULT_TEMPO_BPM
    };
    meta_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
            (60_000_000.0 / bpm).round() as u32,
        ))),
    });
    let den_log2 = match piece.time_signature.1 {
        2 => 1,
        4 => 2,
        8 => 3,
        16 => 4,
        32 => 5,
        _ => 2,
    };
    meta_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
            piece.time_signature.0,
            den_log2,
            24,
            8,
        )),
    });
    meta_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    // (tick, is_on, key, vel); offs sort before ons at the same tick so
    // repeated pitches re-strike instead of cancelling.
    let mut switches: Vec<(u64, bool, u8, u8)> = Vec::new();
    for e in &piece.events {
        let on = beats_to_ticks(e.start_beat);
        let off = beats_to_ticks(e.end_beat()).max(on + 1);
        switches.push((on, true, e.pitch, e.velocity.min(127)));
        switches.push((off, false, e.pitch, 0));
    }
    switches.sort_by_key(|&(tick, is_on, key, _)| (tick, is_on, key));

    let mut note_track: Vec<TrackEvent> = Vec::new();
    let channel = u4::new(0);
    let mut last_tick = 0u64;
    for (tick, is_on, key, vel) in switches {
        let delta = (tick - last_tick) as u32;
        last_tick = tick;
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::new(key.min(127)),
                vel: u7::new(vel.min(127)),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key.min(127)),
                vel: u7::new(0),
            }
        };
        note_track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi { channel, message },
        });
    }
    note_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::Parallel, Timing::Metrical(u15::new(PPQ))),
        tracks: vec![meta_track, note_track],
    };
    smf.save(path)?;
    Ok(())
}
