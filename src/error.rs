use thiserror::Error;

/// Fatal error taxonomy. Per-event and per-frame conditions are not
/// errors — they are counted in the run summary and logged.
#[derive(Debug, Error)]
pub enum FretmapError {
    /// Contradiction within penalty weights or geometry. Rejected before
    /// any frames are processed.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Unparseable input, with the offending location.
    #[error("{path}:{line}:{column}: {message}")]
    InputMalformed {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// The input file could not be opened or read at all.
    #[error("cannot read {path}: {source}")]
    InputUnreadable {
        path: String,
        source: std::io::Error,
    },

    /// Format not handled on this side of the pipeline (e.g. raw audio,
    /// which is decoded by an external front-end).
    #[error("{0}")]
    Unsupported(String),

    /// Disk failure while writing output.
    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FretmapError {
    /// Process exit code: 1 user error, 2 parse error, 3 output I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            FretmapError::ConfigInvalid(_)
            | FretmapError::InputUnreadable { .. }
            | FretmapError::Unsupported(_) => 1,
            FretmapError::InputMalformed { .. } => 2,
            FretmapError::Io(_) => 3,
        }
    }

    pub fn malformed(path: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
        FretmapError::InputMalformed {
            path: path.to_string(),
            line,
            column,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FretmapError>;
