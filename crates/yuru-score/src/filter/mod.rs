//! The instrument filter chain.
//!
//! An instrument is a chain of [`Filter`]s. Each filter handles the calls it
//! cares about and forwards everything else to the next one; the last link is
//! a sink that produces sound, or [`NullFilter`].
//!
//! Filters are generic over the next link, so a chain is a single nested
//! value owned by the outermost filter.

mod correct_tone;
mod score_filter;
mod score_src;
mod sequencer;

pub use correct_tone::CorrectToneFilter;
pub use score_filter::{NoteStatus, PlayingNote, ScoreFilter};
pub use score_src::ScoreSrc;
pub use sequencer::PlayState;

use crate::midi::{CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PROGRAM_CHANGE};

/// Identifier of a filter parameter.
pub type ParamId = u32;

/// Output level of a sound-producing sink.
pub const PARAMID_OUTPUT_LEVEL: ParamId = 0;

/// Parameters of score-driven filters.
pub const PARAMID_NUMBER_OF_SCORES: ParamId = (b'G' as ParamId) << 8;
pub const PARAMID_ENABLE_TRACK: ParamId = PARAMID_NUMBER_OF_SCORES + 1;
pub const PARAMID_DISABLE_TRACK: ParamId = PARAMID_NUMBER_OF_SCORES + 2;
pub const PARAMID_TRACK_MASK: ParamId = PARAMID_NUMBER_OF_SCORES + 3;
pub const PARAMID_SCORE: ParamId = PARAMID_NUMBER_OF_SCORES + 4;
pub const PARAMID_SCORE_NAME: ParamId = PARAMID_NUMBER_OF_SCORES + 5;
pub const PARAMID_STATUS: ParamId = PARAMID_NUMBER_OF_SCORES + 6;

// System real-time and common messages
pub const MIDI_SONG_POSITION_POINTER: u8 = 0xF2;
pub const MIDI_SONG_SELECT: u8 = 0xF3;
pub const MIDI_START: u8 = 0xFA;
pub const MIDI_CONTINUE: u8 = 0xFB;
pub const MIDI_STOP: u8 = 0xFC;

/// Number of MIDI channels.
pub const MIDI_CHANNELS: u8 = 16;

/// Value of a filter parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One link of an instrument chain.
///
/// Every operation reports success as a `bool`; failures never panic.
pub trait Filter {
    /// Prepare the filter and the rest of the chain.
    fn begin(&mut self) -> bool;

    /// Poll once from the driver loop. Must not block.
    fn update(&mut self);

    /// Whether some filter in the chain handles `param_id`.
    fn is_available(&self, param_id: ParamId) -> bool;

    /// Read a parameter, `None` when no filter in the chain handles it.
    fn get_param(&self, param_id: ParamId) -> Option<ParamValue>;

    /// Write a parameter.
    fn set_param(&mut self, param_id: ParamId, value: i64) -> bool;

    fn send_note_on(&mut self, note: u8, velocity: u8, channel: u8) -> bool;

    fn send_note_off(&mut self, note: u8, velocity: u8, channel: u8) -> bool;

    fn send_control_change(&mut self, _control: u8, _value: u8, _channel: u8) -> bool {
        true
    }

    fn send_program_change(&mut self, _program: u8, _channel: u8) -> bool {
        true
    }

    /// Jump to a position counted in MIDI beats (sixteenth notes).
    fn send_song_position_pointer(&mut self, _beats: u16) -> bool {
        true
    }

    fn send_song_select(&mut self, _song: u8) -> bool {
        true
    }

    fn send_start(&mut self) -> bool {
        true
    }

    fn send_continue(&mut self) -> bool {
        true
    }

    fn send_stop(&mut self) -> bool {
        true
    }

    /// Handle a raw MIDI message.
    ///
    /// Channel voice and transport messages are routed to the matching
    /// `send_*` call. Anything else is refused.
    fn send_midi_message(&mut self, msg: &[u8]) -> bool {
        dispatch_midi_message(self, msg).unwrap_or(false)
    }
}

/// Route a raw MIDI message to the matching [`Filter`] call.
///
/// Returns `None` when the message is not recognised or too short.
pub fn dispatch_midi_message<F: Filter + ?Sized>(filter: &mut F, msg: &[u8]) -> Option<bool> {
    let status = *msg.first()?;
    let data = |index: usize| msg.get(index).map(|byte| byte & 0x7F);
    let channel = status & 0x0F;

    let handled = match status {
        MIDI_SONG_POSITION_POINTER => {
            let beats = u16::from(data(1)?) | (u16::from(data(2)?) << 7);
            filter.send_song_position_pointer(beats)
        }
        MIDI_SONG_SELECT => filter.send_song_select(data(1)?),
        MIDI_START => filter.send_start(),
        MIDI_CONTINUE => filter.send_continue(),
        MIDI_STOP => filter.send_stop(),
        s if s & 0xF0 == NOTE_OFF => filter.send_note_off(data(1)?, data(2)?, channel),
        s if s & 0xF0 == NOTE_ON => filter.send_note_on(data(1)?, data(2)?, channel),
        s if s & 0xF0 == CONTROL_CHANGE => filter.send_control_change(data(1)?, data(2)?, channel),
        s if s & 0xF0 == PROGRAM_CHANGE => filter.send_program_change(data(1)?, channel),
        _ => return None,
    };
    Some(handled)
}

/// The end of a chain. Accepts notes and handles no parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFilter;

impl Filter for NullFilter {
    fn begin(&mut self) -> bool {
        true
    }

    fn update(&mut self) {}

    fn is_available(&self, _param_id: ParamId) -> bool {
        false
    }

    fn get_param(&self, _param_id: ParamId) -> Option<ParamValue> {
        None
    }

    fn set_param(&mut self, _param_id: ParamId, _value: i64) -> bool {
        false
    }

    fn send_note_on(&mut self, _note: u8, _velocity: u8, _channel: u8) -> bool {
        true
    }

    fn send_note_off(&mut self, _note: u8, _velocity: u8, _channel: u8) -> bool {
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A chain end that records what reaches it.

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Event {
        NoteOn(u8, u8, u8),
        NoteOff(u8, u8, u8),
        ControlChange(u8, u8, u8),
        SongPosition(u16),
        SongSelect(u8),
        Start,
        Continue,
        Stop,
    }

    #[derive(Debug, Default)]
    pub struct Recorder {
        pub events: Vec<Event>,
        pub begun: bool,
    }

    impl Recorder {
        pub fn notes(&self) -> Vec<Event> {
            self.events
                .iter()
                .copied()
                .filter(|e| matches!(e, Event::NoteOn(..) | Event::NoteOff(..)))
                .collect()
        }
    }

    impl Filter for Recorder {
        fn begin(&mut self) -> bool {
            self.begun = true;
            true
        }

        fn update(&mut self) {}

        fn is_available(&self, _param_id: ParamId) -> bool {
            false
        }

        fn get_param(&self, _param_id: ParamId) -> Option<ParamValue> {
            None
        }

        fn set_param(&mut self, _param_id: ParamId, _value: i64) -> bool {
            false
        }

        fn send_note_on(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
            self.events.push(Event::NoteOn(note, velocity, channel));
            true
        }

        fn send_note_off(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
            self.events.push(Event::NoteOff(note, velocity, channel));
            true
        }

        fn send_control_change(&mut self, control: u8, value: u8, channel: u8) -> bool {
            self.events.push(Event::ControlChange(control, value, channel));
            true
        }

        fn send_song_position_pointer(&mut self, beats: u16) -> bool {
            self.events.push(Event::SongPosition(beats));
            true
        }

        fn send_song_select(&mut self, song: u8) -> bool {
            self.events.push(Event::SongSelect(song));
            true
        }

        fn send_start(&mut self) -> bool {
            self.events.push(Event::Start);
            true
        }

        fn send_continue(&mut self) -> bool {
            self.events.push(Event::Continue);
            true
        }

        fn send_stop(&mut self) -> bool {
            self.events.push(Event::Stop);
            true
        }
    }
}
