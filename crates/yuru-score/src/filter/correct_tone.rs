//! Plays the score's note whatever key is pressed.

use super::score_filter::{mtc_full_message, ScoreFilter};
use super::sequencer::{PlayState, Sequencer, Step};
use super::{Filter, ParamId, ParamValue, MIDI_CHANNELS, PARAMID_SCORE, PARAMID_STATUS};
use crate::midi::{is_note_number, MidiMessage, NOTE_NUMBER_MAX, NOTE_OFF, NOTE_ON};
use crate::time_keeper::{Clock, SystemClock};

/// Replaces incoming notes with the note the score expects.
///
/// The score runs on its own clock and only registers which note is current.
/// Any incoming note-on sounds the registered note instead, and while a key
/// is held the sounding note follows the score.
#[derive(Debug)]
pub struct CorrectToneFilter<F, C = SystemClock> {
    score: ScoreFilter<F>,
    seq: Sequencer,
    clock: C,
    /// Latest note event of the score
    registered: MidiMessage,
    /// Note event currently sounding
    playing: MidiMessage,
    note_playing: bool,
}

impl<F: Filter> CorrectToneFilter<F, SystemClock> {
    pub fn new(path: impl Into<String>, auto_start: bool, next: F) -> Self {
        Self::with_clock(path, auto_start, next, SystemClock::new())
    }
}

impl<F: Filter, C: Clock> CorrectToneFilter<F, C> {
    pub fn with_clock(path: impl Into<String>, auto_start: bool, next: F, clock: C) -> Self {
        Self {
            score: ScoreFilter::new(path, next),
            seq: Sequencer::new(auto_start),
            clock,
            registered: MidiMessage::default(),
            playing: MidiMessage::default(),
            note_playing: false,
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

    pub fn is_note_playing(&self) -> bool {
        self.note_playing
    }

    pub fn select_score(&mut self, index: usize) -> bool {
        if !self.score.set_score_index(index) {
            return false;
        }
        self.seq.restart(self.score.root_tick());
        self.registered = MidiMessage::default();
        self.playing = MidiMessage::default();
        true
    }

    fn register_note(&mut self) {
        match self.seq.poll(&mut self.score, self.clock.millis()) {
            Step::Idle | Step::Resumed => {}
            Step::Paused => {
                if self.note_playing && is_note_number(i32::from(self.playing.data_byte1)) {
                    let m = &self.playing;
                    self.score.send_note_off(m.data_byte1, m.data_byte2, m.channel());
                }
            }
            Step::Due(message) => {
                if message.is_meta() || message.is_sysex() {
                    return;
                }
                match message.message_type() {
                    NOTE_ON | NOTE_OFF => {
                        log::trace!("registered {:02x} {}", message.status_byte, message.data_byte1);
                        self.registered = message;
                    }
                    status => log::trace!("unused channel message {:02x}", status),
                }
            }
        }
    }

    fn play_note(&mut self) {
        if self.note_playing {
            self.change_playing_note();
            return;
        }
        let m = &self.registered;
        if m.message_type() == NOTE_ON {
            self.score.send_note_on(m.data_byte1, m.data_byte2, m.channel());
        }
        self.playing = self.registered.clone();
        self.note_playing = true;
    }

    fn stop_note(&mut self) {
        if !self.note_playing {
            return;
        }
        let m = &self.playing;
        if is_note_number(i32::from(m.data_byte1)) {
            self.score.send_note_off(m.data_byte1, m.data_byte2, m.channel());
        }
        self.note_playing = false;
    }

    /// Follow the score while a key is held.
    fn change_playing_note(&mut self) {
        let (playing, registered) = (&self.playing, &self.registered);
        if playing.status_byte == registered.status_byte && playing.data_byte1 == registered.data_byte1 {
            return;
        }
        if is_note_number(i32::from(playing.data_byte1))
            && playing.message_type() == NOTE_ON
            && registered.message_type() == NOTE_ON
        {
            self.score
                .send_note_off(playing.data_byte1, playing.data_byte2, playing.channel());
        }
        if is_note_number(i32::from(registered.data_byte1)) {
            match registered.message_type() {
                NOTE_ON if self.seq.play_state() == PlayState::Playing => {
                    self.score
                        .send_note_on(registered.data_byte1, registered.data_byte2, registered.channel());
                }
                NOTE_OFF => {
                    self.score
                        .send_note_off(registered.data_byte1, registered.data_byte2, registered.channel());
                }
                _ => {}
            }
        }
        self.playing = self.registered.clone();
    }
}

impl<F: Filter, C: Clock> Filter for CorrectToneFilter<F, C> {
    fn begin(&mut self) -> bool {
        self.score.begin() && self.select_score(0)
    }

    fn update(&mut self) {
        if !self.score.is_parser_available() {
            log::trace!("{}: parser is not available", self.score.path());
        } else if self.score.number_of_scores() > 0 {
            self.register_note();
        }
        if self.note_playing {
            self.change_playing_note();
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

    /// Sound the registered note. The incoming note only acts as a trigger.
    fn send_note_on(&mut self, note: u8, _velocity: u8, channel: u8) -> bool {
        if note > NOTE_NUMBER_MAX || channel >= MIDI_CHANNELS {
            return false;
        }
        self.play_note();
        true
    }

    fn send_note_off(&mut self, note: u8, _velocity: u8, channel: u8) -> bool {
        if note > NOTE_NUMBER_MAX || channel >= MIDI_CHANNELS {
            return false;
        }
        self.stop_note();
        true
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
        if let Some((hr, mn, sc, fr)) = mtc_full_message(msg) {
            return self.score.send_mtc_full_message(hr, mn, sc, fr);
        }
        match super::dispatch_midi_message(self, msg) {
            Some(handled) => handled,
            None => self.score.send_midi_message(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Event, Recorder};
    use super::*;
    use crate::time_keeper::ManualClock;
    use std::fs;

    const SCORE: &str = "#MUSIC_START\n60;62;\n#MUSIC_END\n";

    fn filter(dir: &std::path::Path, auto_start: bool) -> (CorrectToneFilter<Recorder, ManualClock>, ManualClock) {
        let path = dir.join("score.txt");
        fs::write(&path, SCORE).unwrap();
        let clock = ManualClock::new();
        let mut filter = CorrectToneFilter::with_clock(
            path.to_str().unwrap(),
            auto_start,
            Recorder::default(),
            clock.clone(),
        );
        assert!(filter.begin());
        (filter, clock)
    }

    fn run(filter: &mut CorrectToneFilter<Recorder, ManualClock>, clock: &ManualClock, until: u32) {
        while clock.millis() < until {
            filter.update();
            clock.advance(10);
        }
        filter.update();
    }

    #[test]
    fn test_any_key_plays_score_note() {
        let dir = tempfile::tempdir().unwrap();
        let (mut filter, clock) = filter(dir.path(), true);

        run(&mut filter, &clock, 100);
        assert!(filter.inner().events.is_empty());

        assert!(filter.send_note_on(30, 100, 0));
        assert!(filter.is_note_playing());
        assert_eq!(filter.inner().notes(), vec![Event::NoteOn(60, 64, 0)]);

        // the held note follows the score
        run(&mut filter, &clock, 600);
        assert_eq!(
            filter.inner().notes(),
            vec![
                Event::NoteOn(60, 64, 0),
                Event::NoteOff(60, 64, 0),
                Event::NoteOn(62, 64, 0),
            ]
        );

        assert!(filter.send_note_off(30, 0, 0));
        assert!(!filter.is_note_playing());
        run(&mut filter, &clock, 1_200);
        assert_eq!(filter.inner().notes()[3], Event::NoteOff(62, 64, 0));
        assert_eq!(filter.inner().notes().len(), 4);
        assert_eq!(filter.play_state(), PlayState::EndScore);
    }

    #[test]
    fn test_rejects_invalid_notes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut filter, _clock) = filter(dir.path(), true);
        assert!(!filter.send_note_on(128, 100, 0));
        assert!(!filter.send_note_on(60, 100, 16));
        assert!(!filter.send_note_off(200, 0, 0));
        assert!(!filter.is_note_playing());
    }

    #[test]
    fn test_pause_releases_note() {
        let dir = tempfile::tempdir().unwrap();
        let (mut filter, clock) = filter(dir.path(), false);
        assert_eq!(filter.get_param(PARAMID_STATUS), Some(ParamValue::Int(0)));

        run(&mut filter, &clock, 300);
        assert!(filter.send_note_on(64, 100, 0));
        assert!(filter.inner().events.is_empty());

        assert!(filter.set_param(PARAMID_STATUS, 1));
        run(&mut filter, &clock, 400);
        assert_eq!(filter.inner().notes(), vec![Event::NoteOn(60, 64, 0)]);

        assert!(filter.set_param(PARAMID_STATUS, 0));
        run(&mut filter, &clock, 450);
        assert_eq!(
            filter.inner().notes(),
            vec![Event::NoteOn(60, 64, 0), Event::NoteOff(60, 64, 0)]
        );
    }

    #[test]
    fn test_raw_messages() {
        let dir = tempfile::tempdir().unwrap();
        let (mut filter, clock) = filter(dir.path(), true);
        run(&mut filter, &clock, 100);
        assert!(filter.send_midi_message(&[0x90, 48, 100]));
        assert!(filter.send_midi_message(&[0x80, 48, 0]));
        assert_eq!(
            filter.inner().notes(),
            vec![Event::NoteOn(60, 64, 0), Event::NoteOff(60, 64, 0)]
        );
    }
}
