//! Format dispatch: file extension → tagged input/output kind, and the
//! read side of the pipeline. Writers take different inputs (events vs.
//! mapped frames), so the write dispatch lives with the caller.

use crate::config::MapperConfig;
use crate::error::{FretmapError, Result};
use crate::tab_parse::ParsedTab;
use crate::types::Piece;
use crate::{abc, midi, tab_parse, vextab};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Midi,
    Abc,
    VexTab,
    AsciiTab,
    /// Recognised so the message can say what to do about it; decoding
    /// audio to pitches is an external front-end's job.
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Midi,
    Abc,
    VexTab,
    AsciiTab,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match extension(path).as_str() {
            "mid" | "midi" => Some(InputKind::Midi),
            "abc" => Some(InputKind::Abc),
            "vex" | "vextab" => Some(InputKind::VexTab),
            "tab" | "txt" => Some(InputKind::AsciiTab),
            "wav" | "mp3" | "ogg" | "flac" | "aiff" => Some(InputKind::Audio),
            _ => None,
        }
    }
}

impl OutputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match extension(path).as_str() {
            "mid" | "midi" => Some(OutputKind::Midi),
            "abc" => Some(OutputKind::Abc),
            "vex" | "vextab" => Some(OutputKind::VexTab),
            "tab" | "txt" => Some(OutputKind::AsciiTab),
            _ => None,
        }
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| FretmapError::InputUnreadable {
        path: path.display().to_string(),
        source: e,
    })
}

/// Read a piece from any supported input. Tab articulation tokens are
/// parsed and validated but only the events travel on.
pub fn read(path: &Path, kind: InputKind, cfg: &MapperConfig, track: Option<usize>) -> Result<Piece> {
    let display = path.display().to_string();
    match kind {
        InputKind::Midi => midi::read(path, track),
        InputKind::Abc => abc::parse(&read_text(path)?, &display),
        InputKind::VexTab => vextab::parse(&read_text(path)?, &display, cfg),
        InputKind::AsciiTab => {
            let ParsedTab { piece, .. } = tab_parse::parse(&read_text(path)?, &display, cfg)?;
            Ok(piece)
        }
        InputKind::Audio => Err(FretmapError::Unsupported(format!(
            "{}: raw audio input needs an external pitch front-end; decode to MIDI first",
            display
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_kind_by_extension() {
        assert_eq!(InputKind::from_path(Path::new("a.mid")), Some(InputKind::Midi));
        assert_eq!(InputKind::from_path(Path::new("a.MIDI")), Some(InputKind::Midi));
        assert_eq!(InputKind::from_path(Path::new("a.abc")), Some(InputKind::Abc));
        assert_eq!(InputKind::from_path(Path::new("a.vex")), Some(InputKind::VexTab));
        assert_eq!(InputKind::from_path(Path::new("a.tab")), Some(InputKind::AsciiTab));
        assert_eq!(InputKind::from_path(Path::new("a.wav")), Some(InputKind::Audio));
        assert_eq!(InputKind::from_path(Path::new("a.pdf")), None);
        assert_eq!(InputKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_output_kind_excludes_audio() {
        assert_eq!(OutputKind::from_path(Path::new("a.tab")), Some(OutputKind::AsciiTab));
        assert_eq!(OutputKind::from_path(Path::new("a.wav")), None);
    }

    #[test]
    fn test_audio_read_is_refused() {
        let cfg = MapperConfig::default();
        let err = read(Path::new("riff.wav"), InputKind::Audio, &cfg, None).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("decode to MIDI"), "{}", err);
    }
}
