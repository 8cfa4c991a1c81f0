//! SFZ sampler for Yuru instruments.
//!
//! [`SfzParser`] tokenizes SFZ files, with `#include` and `#define`
//! support, and reports headers and opcodes to an [`SfzHandler`].
//! [`SfzInstrument::load`] turns them into [`Region`]s laid out over the
//! PCM data of their samples. [`SfzSink`] is the filter at the end of an
//! instrument chain: it starts a voice per note and streams the region's
//! PCM into a [`PcmRenderer`].
//!
//! # Example
//!
//! ```no_run
//! use yuru_score::filter::{Filter, ScoreSrc};
//! use yuru_sfz::SfzSink;
//!
//! let mut src = ScoreSrc::new("songs/", true, SfzSink::new("piano/piano.sfz"));
//! if src.begin() {
//!     loop {
//!         src.update();
//!         let frame = src.inner_mut().renderer_mut().render();
//!         # let _ = frame;
//!     }
//! }
//! ```

pub mod error;
pub mod opcodes;
pub mod parser;
pub mod region;
pub mod renderer;
pub mod sink;
pub mod wav;

pub use error::{Error, Result};
pub use opcodes::LoopMode;
pub use parser::{SfzHandler, SfzParser};
pub use region::{KeySwitch, Region, SfzInstrument};
pub use renderer::{PcmMixer, PcmRenderer};
pub use sink::SfzSink;
