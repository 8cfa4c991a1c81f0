//! Error types for SFZ parsing and playback.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or playing an SFZ instrument.
///
/// Most of these never reach the caller of a [`Filter`](yuru_score::filter::Filter)
/// method: an invalid opcode drops the enclosing region, a missing render
/// channel drops the note. They are logged where they are collapsed.
#[derive(Error, Debug)]
pub enum Error {
    /// Input/Output error when reading files
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File not found
    ///
    /// Raised for the SFZ file itself and for samples referenced by a
    /// `sample=` opcode.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// An opcode value could not be parsed
    ///
    /// For example `lokey=H4` (not a note name) or `offset=12k`.
    #[error("Invalid value for opcode '{opcode}': '{value}'")]
    InvalidValue {
        /// Opcode name as written in the file
        opcode: String,
        /// Value as written in the file
        value: String,
    },

    /// An opcode value parsed but lies outside the opcode's bounds
    ///
    /// For example `hikey=128`.
    #[error("Value out of range for opcode '{opcode}': '{value}'")]
    OutOfRange {
        /// Opcode name as written in the file
        opcode: String,
        /// Value as written in the file
        value: String,
    },

    /// Every render channel is in use
    #[error("No free render channel")]
    NoRenderChannel,
}

/// Result type for SFZ operations
pub type Result<T> = std::result::Result<T, Error>;
