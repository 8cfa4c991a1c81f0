//! Score side of Yuru instruments.
//!
//! An instrument is a chain of filters driven by a poll loop. This crate
//! provides:
//! - Score parsers for Standard MIDI Files, text scores and `.m3u` playlists
//! - [`time_keeper::TimeKeeper`] for tick to millisecond scheduling
//! - The [`filter::Filter`] contract and the score-driven filters
//!   [`filter::ScoreFilter`], [`filter::ScoreSrc`] and
//!   [`filter::CorrectToneFilter`]
//! - Byte-level readers for plain files and tar archives
//!
//! # Example
//!
//! ```no_run
//! use yuru_score::filter::{Filter, NullFilter, ScoreSrc};
//!
//! let mut src = ScoreSrc::new("songs/", true, NullFilter);
//! if src.begin() {
//!     loop {
//!         src.update();
//!     }
//! }
//! ```

pub mod error;
pub mod filter;
pub mod io;
pub mod midi;
pub mod parser;
pub mod path_utils;
pub mod time_keeper;

pub use error::{Error, Result};
pub use midi::MidiMessage;
pub use parser::{ParserFactory, ScoreParser};
