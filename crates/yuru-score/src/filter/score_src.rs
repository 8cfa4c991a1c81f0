//! Plays scores through the chain on their own clock.

use super::score_filter::{mtc_full_message, ScoreFilter};
use super::sequencer::{PlayState, Sequencer, Step};
use super::{Filter, ParamId, ParamValue, PARAMID_SCORE, PARAMID_STATUS};
use crate::midi::{MidiMessage, CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PROGRAM_CHANGE};
use crate::time_keeper::{mtc_to_ms, Clock, SystemClock};

/// Score player.
///
/// Every [`Filter::update`] releases the events of the selected score whose
/// time has come. Notes go through a [`ScoreFilter`], so pausing silences and
/// resuming restarts the notes that were sounding.
///
/// With `auto_start` playback begins as soon as a score is selected, and a
/// finished score is followed by the next one, wrapping to the first.
#[derive(Debug)]
pub struct ScoreSrc<F, C = SystemClock> {
    score: ScoreFilter<F>,
    seq: Sequencer,
    clock: C,
    auto_play: bool,
}

impl<F: Filter> ScoreSrc<F, SystemClock> {
    pub fn new(path: impl Into<String>, auto_start: bool, next: F) -> Self {
        Self::with_clock(path, auto_start, next, SystemClock::new())
    }
}

impl<F: Filter, C: Clock> ScoreSrc<F, C> {
    pub fn with_clock(path: impl Into<String>, auto_start: bool, next: F, clock: C) -> Self {
        Self {
            score: ScoreFilter::new(path, next),
            seq: Sequencer::new(auto_start),
            clock,
            auto_play: auto_start,
        }
    }

    pub fn score_filter(&self) -> &ScoreFilter<F> {
        &self.score
    }

    pub fn inner(&self) -> &F {
        self.score.inner()
    }

    pub fn inner_mut(&mut self) -> &mut F {
        self.score.inner_mut()
    }

    pub fn play_state(&self) -> PlayState {
        self.seq.play_state()
    }

    /// Select score `index` and rewind playback to its start.
    pub fn select_score(&mut self, index: usize) -> bool {
        if !self.score.set_score_index(index) {
            return false;
        }
        self.seq.restart(self.score.root_tick());
        true
    }

    /// Jump to the score time of an MTC full frame.
    pub fn send_mtc_full_message(&mut self, hr: u8, mn: u8, sc: u8, fr: u8) -> bool {
        let target = mtc_to_ms(hr, mn, sc, fr);
        log::debug!("mtc locate {} ms", target);
        self.seq.time_keeper_mut().reschedule_time(target);
        true
    }

    fn select_next_score(&mut self) {
        let count = self.score.number_of_scores();
        if count == 0 {
            return;
        }
        let next = (self.score.score_index() + 1) % count;
        if self.select_score(next) {
            log::info!("next score {} \"{}\"", next, self.score.title(next));
        }
    }

    fn execute_midi_event(&mut self, message: &MidiMessage) {
        let channel = message.channel();
        let (data1, data2) = (message.data_byte1, message.data_byte2);
        match message.message_type() {
            NOTE_OFF => {
                self.score.send_note_off(data1, data2, channel);
            }
            NOTE_ON if data2 == 0 => {
                self.score.send_note_off(data1, data2, channel);
            }
            NOTE_ON => {
                self.score.send_note_on(data1, data2, channel);
            }
            CONTROL_CHANGE => {
                self.score.send_control_change(data1, data2, channel);
            }
            PROGRAM_CHANGE => {
                self.score.send_program_change(data1, channel);
            }
            status => log::trace!("unused channel message {:02x}", status),
        }
    }
}

impl<F: Filter, C: Clock> Filter for ScoreSrc<F, C> {
    fn begin(&mut self) -> bool {
        self.score.begin() && self.select_score(0)
    }

    fn update(&mut self) {
        if self.seq.play_state() == PlayState::EndScore {
            if self.auto_play {
                self.select_next_score();
            }
            return;
        }

        match self.seq.poll(&mut self.score, self.clock.millis()) {
            Step::Idle => {}
            Step::Paused => self.score.pause_all_notes(),
            Step::Resumed => self.score.resume_all_notes(),
            Step::Due(message) => {
                if !message.is_meta() && !message.is_sysex() {
                    self.execute_midi_event(&message);
                }
            }
        }
        self.score.update();
    }

    fn is_available(&self, param_id: ParamId) -> bool {
        param_id == PARAMID_STATUS || self.score.is_available(param_id)
    }

    fn get_param(&self, param_id: ParamId) -> Option<ParamValue> {
        match param_id {
            PARAMID_STATUS => Some(ParamValue::Int(self.seq.play_state().as_param())),
            _ => self.score.get_param(param_id),
        }
    }

    fn set_param(&mut self, param_id: ParamId, value: i64) -> bool {
        match param_id {
            PARAMID_STATUS => match PlayState::from_param(value) {
                Some(state) => self.seq.set_play_state(state),
                None => false,
            },
            PARAMID_SCORE => usize::try_from(value).is_ok_and(|index| self.select_score(index)),
            _ => self.score.set_param(param_id, value),
        }
    }

    fn send_note_on(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
        self.score.send_note_on(note, velocity, channel)
    }

    fn send_note_off(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
        self.score.send_note_off(note, velocity, channel)
    }

    fn send_control_change(&mut self, control: u8, value: u8, channel: u8) -> bool {
        self.score.send_control_change(control, value, channel)
    }

    fn send_program_change(&mut self, program: u8, channel: u8) -> bool {
        self.score.send_program_change(program, channel)
    }

    fn send_song_position_pointer(&mut self, beats: u16) -> bool {
        self.score.send_song_position_pointer(beats)
    }

    fn send_song_select(&mut self, song: u8) -> bool {
        self.score.send_song_select(song)
    }

    fn send_start(&mut self) -> bool {
        self.score.send_start()
    }

    fn send_continue(&mut self) -> bool {
        self.score.send_continue()
    }

    fn send_stop(&mut self) -> bool {
        self.score.send_stop()
    }

    fn send_midi_message(&mut self, msg: &[u8]) -> bool {
        match mtc_full_message(msg) {
            Some((hr, mn, sc, fr)) => self.send_mtc_full_message(hr, mn, sc, fr),
            None => self.score.send_midi_message(msg),
        }
    }
}
