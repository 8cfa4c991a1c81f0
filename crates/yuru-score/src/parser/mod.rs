//! Score parsers.
//!
//! Every supported score format is exposed through the [`ScoreParser`] trait,
//! which turns a file into a stream of [`MidiMessage`]s with relative delta
//! times. [`ParserFactory`] picks the right implementation for a path.

mod factory;
mod playlist;
mod smf;
mod text;

pub use factory::{create_playlist, file_type, ParserFactory, ScoreFileType, PLAYLIST_NAME};
pub use playlist::{PlaylistEntry, PlaylistParser};
pub use smf::{merge_step, MergeStep, SmfParser, TrackData};
pub use text::{rhythm_tick, Music, Rhythm, TextScoreParser, TEXT_ROOT_TICK};

use crate::midi::MidiMessage;

/// Number of tracks addressable by the track mask.
pub const MAX_TRACK: u32 = 32;

/// A source of scores.
///
/// A parser may hold several scores (a playlist, a text file with several
/// `#MUSIC_START` blocks). [`ScoreParser::load_score`] selects one and
/// rewinds it; [`ScoreParser::midi_message`] then yields its events in order.
pub trait ScoreParser {
    /// Ticks per quarter note of the loaded score.
    fn root_tick(&self) -> u16;

    /// File name shown to the user.
    fn file_name(&self) -> String;

    fn number_of_scores(&self) -> usize;

    /// Select score `index` and rewind it.
    ///
    /// Returns `false` when the index is out of range or the score cannot be
    /// read.
    fn load_score(&mut self, index: usize) -> bool;

    /// Title of score `index`, empty when out of range.
    fn title(&self, index: usize) -> String;

    /// Next event of the loaded score.
    ///
    /// Once the score is exhausted (or when nothing is loaded) every call
    /// returns an End Of Track meta event with a zero delta time.
    fn midi_message(&mut self) -> MidiMessage;

    /// Current track enable mask.
    fn play_track(&self) -> u32;

    /// Replace the track enable mask. Applied on the next `load_score`.
    fn set_play_track(&mut self, mask: u32) -> bool;

    /// Enable one track in the mask.
    fn set_enable_track(&mut self, track: u32) -> bool {
        if track >= MAX_TRACK {
            return false;
        }
        let mask = self.play_track() | (1 << track);
        self.set_play_track(mask)
    }

    /// Disable one track in the mask.
    fn set_disable_track(&mut self, track: u32) -> bool {
        if track >= MAX_TRACK {
            return false;
        }
        let mask = self.play_track() & !(1 << track);
        self.set_play_track(mask)
    }
}

/// Parse the leading integer of `s` the way `atoi` does.
///
/// Leading whitespace and an optional sign are accepted, parsing stops at the
/// first non-digit. Returns `None` when no digit was found.
pub(crate) fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value = digits[..end]
        .bytes()
        .fold(0i64, |acc, b| acc.saturating_mul(10).saturating_add(i64::from(b - b'0')));
    Some(if negative { -value } else { value })
}
