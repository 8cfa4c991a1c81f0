//! Locating PCM data inside sample files.
//!
//! Samples are streamed as raw 48 kHz 16-bit stereo frames. A WAV file in
//! that format contributes its `data` chunk; any other file is taken as raw
//! PCM from its first byte to its last.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::Path;

/// Sample rate of streamed PCM.
pub const SAMPLE_RATE: u32 = 48_000;
/// Bits per sample value.
pub const BIT_DEPTH: u16 = 16;
/// Interleaved channels per frame.
pub const CHANNEL_COUNT: u16 = 2;

/// Where the PCM data of a sample file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WavInfo {
    /// Byte offset of the first PCM frame
    pub pcm_offset: u64,
    /// Length of the PCM data in bytes
    pub pcm_size: u64,
    /// Whether the file carried a usable WAV header
    pub is_wave: bool,
}

/// Probe `path` for its PCM data.
///
/// Only the file itself can make this fail; a header in another format just
/// falls back to raw PCM.
pub fn probe(path: impl AsRef<Path>) -> Result<WavInfo> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let file_size = path.metadata()?.len();
    let raw = WavInfo {
        pcm_offset: 0,
        pcm_size: file_size,
        is_wave: false,
    };

    let reader = match hound::WavReader::new(BufReader::new(File::open(path)?)) {
        Ok(reader) => reader,
        Err(e) => {
            log::debug!("{}: not a wave file ({}), reading as raw pcm", path.display(), e);
            return Ok(raw);
        }
    };

    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE
        || spec.channels != CHANNEL_COUNT
        || spec.bits_per_sample != BIT_DEPTH
        || spec.sample_format != hound::SampleFormat::Int
    {
        log::warn!(
            "{}: unsupported format {} Hz {} ch {} bit, reading as raw pcm",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );
        return Ok(raw);
    }

    let pcm_size = u64::from(reader.len()) * u64::from(BIT_DEPTH / 8);
    // the header reader stops at the first byte of the data chunk
    let pcm_offset = reader.into_inner().stream_position()?;
    log::trace!("{}: pcm at {} ({} bytes)", path.display(), pcm_offset, pcm_size);
    Ok(WavInfo {
        pcm_offset,
        pcm_size,
        is_wave: true,
    })
}
