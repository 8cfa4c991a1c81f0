//! Score-aware base of the score consumers.

use super::{
    dispatch_midi_message, Filter, ParamId, ParamValue, MIDI_CHANNELS, PARAMID_DISABLE_TRACK,
    PARAMID_ENABLE_TRACK, PARAMID_NUMBER_OF_SCORES, PARAMID_SCORE, PARAMID_SCORE_NAME,
    PARAMID_TRACK_MASK,
};
use crate::midi::{MidiMessage, CC_ALL_NOTES_OFF, NOTE_NUMBER_MAX, SYSEX_EVENT, SYSEX_ESCAPE};
use crate::parser::{ParserFactory, ScoreParser, MAX_TRACK};

/// Root tick reported before any score is selected.
pub const DEFAULT_ROOT_TICK: u16 = 960;

/// Length of an MTC full frame message `F0 7F 7F 01 01 hr mn sc fr F7`.
const MTC_FULL_MESSAGE_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteStatus {
    Pause,
    Play,
    End,
}

/// A note forwarded by a [`ScoreFilter`] and not released yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayingNote {
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
    pub stat: NoteStatus,
}

/// Owns a score parser and tracks the notes it forwards.
///
/// Notes passing through are remembered so that transport messages can
/// silence, pause and resume them. Slots of released notes are reused.
pub struct ScoreFilter<F> {
    path: String,
    parser: Option<Box<dyn ScoreParser>>,
    score_index: usize,
    root_tick: u16,
    playing_notes: Vec<PlayingNote>,
    play_track: u32,
    next: F,
}

impl<F: std::fmt::Debug> std::fmt::Debug for ScoreFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreFilter")
            .field("path", &self.path)
            .field("parser", &self.parser.is_some())
            .field("score_index", &self.score_index)
            .field("root_tick", &self.root_tick)
            .field("playing_notes", &self.playing_notes)
            .field("play_track", &self.play_track)
            .field("next", &self.next)
            .finish()
    }
}

impl<F: Filter> ScoreFilter<F> {
    /// Create a filter reading scores from `path` (a score file, playlist or
    /// folder). Nothing is opened before [`Filter::begin`].
    pub fn new(path: impl Into<String>, next: F) -> Self {
        Self {
            path: path.into(),
            parser: None,
            score_index: 0,
            root_tick: DEFAULT_ROOT_TICK,
            playing_notes: Vec::new(),
            play_track: !0,
            next,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn inner(&self) -> &F {
        &self.next
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.next
    }

    pub fn is_parser_available(&self) -> bool {
        self.parser.is_some()
    }

    pub fn number_of_scores(&self) -> usize {
        self.parser.as_ref().map_or(0, |parser| parser.number_of_scores())
    }

    pub fn score_index(&self) -> usize {
        self.score_index
    }

    /// Ticks per quarter note of the selected score.
    pub fn root_tick(&self) -> u16 {
        self.root_tick
    }

    pub fn play_track(&self) -> u32 {
        self.parser.as_ref().map_or(self.play_track, |parser| parser.play_track())
    }

    pub fn playing_notes(&self) -> &[PlayingNote] {
        &self.playing_notes
    }

    /// Title of score `index`, empty without a parser.
    pub fn title(&self, index: usize) -> String {
        self.parser
            .as_ref()
            .map(|parser| parser.title(index))
            .unwrap_or_default()
    }

    /// Load score `index` and make it the current one.
    pub fn set_score_index(&mut self, index: usize) -> bool {
        let Some(parser) = self.parser.as_mut() else {
            log::error!("{}: parser is not available", self.path);
            return false;
        };
        let count = parser.number_of_scores();
        if count == 0 {
            log::error!("{}: no playable score", self.path);
            return false;
        }
        if index >= count {
            log::error!("{}: score {} out of range ({})", self.path, index, count);
            return false;
        }

        self.score_index = index;
        parser.set_play_track(self.play_track);
        if !parser.load_score(index) {
            log::warn!("{}: score {} did not load cleanly", self.path, index);
        }
        self.root_tick = parser.root_tick();
        log::debug!(
            "{}: selected \"{}\", root tick {}",
            self.path,
            parser.title(index),
            self.root_tick
        );
        true
    }

    /// Next event of the selected score, `None` without a parser.
    pub fn midi_message(&mut self) -> Option<MidiMessage> {
        self.parser.as_mut().map(|parser| parser.midi_message())
    }

    /// All-notes-off on every channel and mark the playing notes paused.
    pub fn pause_all_notes(&mut self) {
        self.all_notes_off();
        for e in self.playing_notes.iter_mut().filter(|e| e.stat == NoteStatus::Play) {
            e.stat = NoteStatus::Pause;
        }
    }

    /// All-notes-off on every channel, then restart the paused notes.
    pub fn resume_all_notes(&mut self) {
        self.all_notes_off();
        for i in 0..self.playing_notes.len() {
            let e = self.playing_notes[i];
            if e.stat == NoteStatus::Pause {
                self.next.send_note_on(e.note, e.velocity, e.channel);
                self.playing_notes[i].stat = NoteStatus::Play;
            }
        }
    }

    /// Handle an MTC full frame message. Plain score filters ignore it.
    pub fn send_mtc_full_message(&mut self, hr: u8, mn: u8, sc: u8, fr: u8) -> bool {
        log::trace!(
            "mtc {:02}:{:02}:{:02}:{:02}",
            hr & 0x1F,
            mn & 0x3F,
            sc & 0x3F,
            fr & 0x1F
        );
        true
    }

    fn all_notes_off(&mut self) {
        for channel in 0..MIDI_CHANNELS {
            self.next.send_control_change(CC_ALL_NOTES_OFF, 0, channel);
        }
    }

    fn set_track_mask(&mut self, mask: u32) {
        self.play_track = mask;
        if let Some(parser) = self.parser.as_mut() {
            parser.set_play_track(mask);
        }
    }
}

/// Decode an MTC full frame message into `(hr, mn, sc, fr)`.
pub(crate) fn mtc_full_message(msg: &[u8]) -> Option<(u8, u8, u8, u8)> {
    if msg.len() < MTC_FULL_MESSAGE_LEN || msg[0] != SYSEX_EVENT {
        return None;
    }
    // universal real-time, broadcast, MIDI time code, full message, EOX
    if msg[1] != 0x7F || msg[2] != 0x7F || msg[3] != 0x01 || msg[4] != 0x01 || msg[9] != SYSEX_ESCAPE {
        return None;
    }
    Some((msg[5], msg[6], msg[7], msg[8]))
}

impl<F: Filter> Filter for ScoreFilter<F> {
    /// Open the parser. Fails when the path cannot be opened or holds no score.
    fn begin(&mut self) -> bool {
        let Some(mut parser) = ParserFactory::new().score_parser(&self.path) else {
            log::error!("{}: parser is not available", self.path);
            return false;
        };
        parser.set_play_track(self.play_track);
        let count = parser.number_of_scores();
        self.parser = Some(parser);
        log::debug!("{}: {} scores", self.path, count);
        if count == 0 {
            log::error!("{}: score not found", self.path);
            return false;
        }
        self.next.begin()
    }

    fn update(&mut self) {
        self.next.update();
    }

    fn is_available(&self, param_id: ParamId) -> bool {
        match param_id {
            PARAMID_NUMBER_OF_SCORES | PARAMID_ENABLE_TRACK | PARAMID_DISABLE_TRACK | PARAMID_TRACK_MASK
            | PARAMID_SCORE | PARAMID_SCORE_NAME => true,
            _ => self.next.is_available(param_id),
        }
    }

    fn get_param(&self, param_id: ParamId) -> Option<ParamValue> {
        match param_id {
            PARAMID_NUMBER_OF_SCORES => Some(ParamValue::Int(self.number_of_scores() as i64)),
            PARAMID_ENABLE_TRACK | PARAMID_DISABLE_TRACK | PARAMID_TRACK_MASK => {
                Some(ParamValue::Int(i64::from(self.play_track())))
            }
            PARAMID_SCORE => Some(ParamValue::Int(self.score_index as i64)),
            PARAMID_SCORE_NAME => self
                .parser
                .as_ref()
                .map(|parser| ParamValue::Text(parser.file_name())),
            _ => self.next.get_param(param_id),
        }
    }

    fn set_param(&mut self, param_id: ParamId, value: i64) -> bool {
        match param_id {
            PARAMID_NUMBER_OF_SCORES | PARAMID_SCORE_NAME => false,
            PARAMID_ENABLE_TRACK | PARAMID_DISABLE_TRACK => {
                let Ok(track) = u32::try_from(value) else {
                    return false;
                };
                if track >= MAX_TRACK {
                    return false;
                }
                let mask = if param_id == PARAMID_ENABLE_TRACK {
                    self.play_track | (1 << track)
                } else {
                    self.play_track & !(1 << track)
                };
                self.set_track_mask(mask);
                true
            }
            PARAMID_TRACK_MASK => {
                // the mask is a 32-bit pattern; higher bits are dropped
                self.set_track_mask(value as u32);
                true
            }
            PARAMID_SCORE => usize::try_from(value).is_ok_and(|index| self.set_score_index(index)),
            _ => self.next.set_param(param_id, value),
        }
    }

    fn send_note_on(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
        if note > NOTE_NUMBER_MAX {
            return false;
        }
        if velocity == 0 {
            return self.send_note_off(note, velocity, channel);
        }
        let sounding = self
            .playing_notes
            .iter()
            .any(|e| e.note == note && e.channel == channel && e.stat != NoteStatus::End);
        if sounding {
            return false;
        }

        let entry = PlayingNote {
            note,
            velocity,
            channel,
            stat: NoteStatus::Play,
        };
        match self.playing_notes.iter_mut().find(|e| e.stat == NoteStatus::End) {
            Some(slot) => *slot = entry,
            None => self.playing_notes.push(entry),
        }
        log::trace!("note on {} vel {} ch {}", note, velocity, channel);
        self.next.send_note_on(note, velocity, channel)
    }

    fn send_note_off(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
        if note > NOTE_NUMBER_MAX {
            return false;
        }
        if let Some(e) = self
            .playing_notes
            .iter_mut()
            .find(|e| e.note == note && e.channel == channel)
        {
            e.stat = NoteStatus::End;
        }
        log::trace!("note off {} ch {}", note, channel);
        self.next.send_note_off(note, velocity, channel)
    }

    fn send_control_change(&mut self, control: u8, value: u8, channel: u8) -> bool {
        self.next.send_control_change(control, value, channel)
    }

    fn send_program_change(&mut self, program: u8, channel: u8) -> bool {
        self.next.send_program_change(program, channel)
    }

    /// Release every sounding note, then forward.
    fn send_song_position_pointer(&mut self, beats: u16) -> bool {
        log::debug!("song position {}", beats);
        for i in 0..self.playing_notes.len() {
            let e = self.playing_notes[i];
            if e.stat != NoteStatus::End {
                self.next.send_note_off(e.note, e.velocity, e.channel);
                self.playing_notes[i].stat = NoteStatus::End;
            }
        }
        self.next.send_song_position_pointer(beats)
    }

    /// Select score `song`, then forward.
    fn send_song_select(&mut self, song: u8) -> bool {
        log::debug!("song select {}", song);
        let selected = self.set_score_index(usize::from(song));
        let forwarded = self.next.send_song_select(song);
        selected && forwarded
    }

    fn send_start(&mut self) -> bool {
        self.next.send_start()
    }

    fn send_continue(&mut self) -> bool {
        log::debug!("continue");
        self.resume_all_notes();
        self.next.send_continue()
    }

    fn send_stop(&mut self) -> bool {
        log::debug!("stop");
        self.pause_all_notes();
        self.next.send_stop()
    }

    fn send_midi_message(&mut self, msg: &[u8]) -> bool {
        if let Some((hr, mn, sc, fr)) = mtc_full_message(msg) {
            return self.send_mtc_full_message(hr, mn, sc, fr);
        }
        match dispatch_midi_message(self, msg) {
            Some(handled) => handled,
            None => self.next.send_midi_message(msg),
        }
    }
}
