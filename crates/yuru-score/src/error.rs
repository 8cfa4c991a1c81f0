use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading score files and archives.
///
/// Most public score operations report failure softly (zero scores, a
/// synthetic end of track, `false`); these errors travel between the
/// internal helpers and are logged where they get collapsed.
#[derive(Error, Debug)]
pub enum Error {
    /// Input/Output error when reading files
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A chunk header did not carry the expected identifier
    ///
    /// Standard MIDI files start with an `MThd` chunk followed by `MTrk`
    /// chunks. Anything else at those positions is rejected.
    #[error("Invalid chunk: expected '{expected}', found {found:?}")]
    InvalidChunk {
        /// Identifier that was expected at this position
        expected: &'static str,
        /// Bytes actually found
        found: [u8; 4],
    },

    /// SMPTE-style time division in an SMF header
    #[error("Unsupported time division: {0:#06x}")]
    UnsupportedDivision(u16),

    /// A meta event code outside the 0x00..=0x7F range
    #[error("Unsupported meta event: {0:#04x}")]
    UnsupportedMetaEvent(u8),

    /// A data byte appeared before any status byte in a track
    #[error("Data byte {0:#04x} without running status")]
    MissingRunningStatus(u8),

    /// Requested score index does not exist
    #[error("Score index {index} out of range ({count} scores)")]
    ScoreOutOfRange {
        /// Requested index
        index: usize,
        /// Number of scores available
        count: usize,
    },

    /// Requested archive entry does not exist
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// File extension is not handled by any parser
    #[error("Unsupported file: {0}")]
    UnsupportedFile(PathBuf),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
