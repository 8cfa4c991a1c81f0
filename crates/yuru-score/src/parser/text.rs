//! Text score parser.
//!
//! A text score file holds one or more scores:
//!
//! ```text
//! #MUSIC_TITLE:Twinkle
//! #MUSIC_BPM:120
//! #MUSIC_RHYTHM:1
//! #MUSIC_START
//! 60,60,67,67;
//! 69,69,67,;
//! #BPMCHANGE 100
//! 65,65,64,-1;
//! #MUSIC_END
//! ```
//!
//! Each cell lasts one rhythm unit. A number starts a note (and ends the
//! previous one), `-1` (any cell starting with `-`) is a rest and an empty
//! cell sustains. `//` starts a comment. Header lines before `#MUSIC_START`
//! set the initial tempo, tone and rhythm of the score that follows; inline
//! `#BPMCHANGE`, `#RHYTHMCHANGE`, `#TONECHANGE` and `#DELAY` commands change
//! them while streaming.

use super::{leading_int, ScoreParser};
use crate::error::Result;
use crate::io::BufferedFileReader;
use crate::midi::{MidiMessage, DEFAULT_CHANNEL, DEFAULT_VELOCITY};
use crate::path_utils::base_name;
use std::fs::File;

/// Ticks per quarter note of every text score.
pub const TEXT_ROOT_TICK: u16 = 96;

const DEFAULT_TEMPO_BPM: u32 = 120;
const MICROSECONDS_PER_MINUTE: u32 = 60_000_000;

/// Cell length selected by `#MUSIC_RHYTHM:` and `#RHYTHMCHANGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rhythm {
    Quarter = 0,
    Eighth = 1,
    Sixteenth = 2,
    WholeTriplet = 3,
    HalfTriplet = 4,
    QuarterTriplet = 5,
    EighthTriplet = 6,
}

impl Rhythm {
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Quarter),
            1 => Some(Self::Eighth),
            2 => Some(Self::Sixteenth),
            3 => Some(Self::WholeTriplet),
            4 => Some(Self::HalfTriplet),
            5 => Some(Self::QuarterTriplet),
            6 => Some(Self::EighthTriplet),
            _ => None,
        }
    }

    /// Length of one cell in ticks.
    pub fn tick(self) -> u32 {
        let quarter = u32::from(TEXT_ROOT_TICK);
        match self {
            Self::Quarter => quarter,
            Self::Eighth => quarter / 2,
            Self::Sixteenth => quarter / 4,
            Self::WholeTriplet => quarter * 4 / 3,
            Self::HalfTriplet => quarter * 2 / 3,
            Self::QuarterTriplet => quarter / 3,
            Self::EighthTriplet => quarter / 6,
        }
    }
}

/// Cell length in ticks for a raw rhythm value; unknown values count as
/// quarter notes.
pub fn rhythm_tick(value: i64) -> u32 {
    Rhythm::from_value(value).unwrap_or(Rhythm::Quarter).tick()
}

/// Header of one score inside a text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Music {
    /// Offset of the `#MUSIC_START` line.
    pub offset: u64,
    pub title: String,
    /// Beats per minute
    pub tempo: u32,
    pub tone: i64,
    pub rhythm: i64,
}

impl Music {
    fn header_defaults() -> Self {
        Self {
            offset: 0,
            title: String::new(),
            tempo: DEFAULT_TEMPO_BPM,
            tone: 0,
            rhythm: Rhythm::Quarter as i64,
        }
    }
}

/// Streaming state of the loaded score.
#[derive(Debug)]
struct Cursor {
    tempo: u32,
    tone: i64,
    rhythm: i64,
    /// Note currently sounding
    note: Option<u8>,
    /// Ticks since the last emitted event
    duration: u32,
    finished: bool,
}

impl Cursor {
    fn finished() -> Self {
        Self {
            tempo: DEFAULT_TEMPO_BPM,
            tone: 0,
            rhythm: Rhythm::Quarter as i64,
            note: None,
            duration: 0,
            finished: true,
        }
    }

    fn tick(&self) -> u32 {
        rhythm_tick(self.rhythm)
    }

    fn set_tempo_message(&mut self) -> MidiMessage {
        let message = MidiMessage::set_tempo(self.duration, MICROSECONDS_PER_MINUTE / self.tempo);
        self.duration = 0;
        message
    }

    /// Release the sounding note, keeping the stream position.
    fn release(&mut self, note: u8) -> MidiMessage {
        let message = MidiMessage::note_off(self.duration, DEFAULT_CHANNEL, note & 0x7F, DEFAULT_VELOCITY);
        self.note = None;
        self.duration = 0;
        message
    }

    fn end(&mut self) -> MidiMessage {
        self.finished = true;
        let message = MidiMessage::end_of_track(self.duration);
        self.duration = 0;
        message
    }
}

/// Parser for `.txt` score files.
#[derive(Debug)]
pub struct TextScoreParser {
    file_name: String,
    reader: BufferedFileReader<File>,
    musics: Vec<Music>,
    cursor: Cursor,
    play_track: u32,
}

impl TextScoreParser {
    /// Open `path` and index the scores it contains.
    pub fn open(path: &str) -> Result<Self> {
        let reader = BufferedFileReader::new(File::open(path)?)?;
        let mut parser = Self {
            file_name: base_name(path).to_string(),
            reader,
            musics: Vec::new(),
            cursor: Cursor::finished(),
            play_track: !0,
        };
        parser.scan_headers()?;
        log::debug!("{}: {} scores", parser.file_name, parser.musics.len());
        Ok(parser)
    }

    /// Header of score `index`.
    pub fn music(&self, index: usize) -> Option<&Music> {
        self.musics.get(index)
    }

    fn scan_headers(&mut self) -> Result<()> {
        self.reader.seek_to(0)?;
        let mut header = Music::header_defaults();
        while self.reader.available() > 0 {
            let offset = self.reader.position();
            let line = self.reader.read_string_until(b'\n');
            let line = line.trim();
            if let Some(title) = line.strip_prefix("#MUSIC_TITLE:") {
                header.title = title.trim().to_string();
            } else if let Some(value) = line.strip_prefix("#MUSIC_BPM:") {
                if let Some(bpm) = positive(value) {
                    header.tempo = bpm as u32;
                }
            } else if let Some(value) = line.strip_prefix("#MUSIC_TONE:") {
                if let Some(tone) = positive(value) {
                    header.tone = tone;
                }
            } else if let Some(value) = line.strip_prefix("#MUSIC_RHYTHM:") {
                if let Some(rhythm) = positive(value) {
                    header.rhythm = rhythm;
                }
            } else if line == "#MUSIC_START" {
                self.musics.push(Music {
                    offset,
                    ..header.clone()
                });
            } else if line == "#MUSIC_END" {
                header = Music::header_defaults();
            }
        }
        Ok(())
    }

    fn seek_back(&mut self, pos: u64) {
        if let Err(e) = self.reader.seek_to(pos) {
            log::error!("{}: seek failed: {}", self.file_name, e);
            self.cursor.finished = true;
        }
    }

    /// Handle a `#` command line. Returns a message when the command emits one.
    fn command(&mut self, pos: u64) -> Option<MidiMessage> {
        let line = self.reader.read_string_until(b'\n');
        let line = line.trim();
        log::trace!("{}: #{}", self.file_name, line);

        if let Some(value) = line.strip_prefix("BPMCHANGE ") {
            if let Some(bpm) = positive(value) {
                self.cursor.tempo = bpm as u32;
            }
            return Some(self.cursor.set_tempo_message());
        }
        if let Some(value) = line.strip_prefix("TONECHANGE ") {
            if let Some(tone) = leading_int(value) {
                self.cursor.tone = tone;
            }
        } else if let Some(value) = line.strip_prefix("RHYTHMCHANGE ") {
            match leading_int(value) {
                Some(rhythm) => self.cursor.rhythm = rhythm,
                None => log::debug!("{}: ignoring RHYTHMCHANGE {:?}", self.file_name, value),
            }
        } else if let Some(value) = line.strip_prefix("DELAY ") {
            // ticks = ms * ticks/beat * beats/minute / ms/minute
            let delay_ms = leading_int(value).unwrap_or(0).max(0) as u64;
            let ticks = delay_ms * u64::from(TEXT_ROOT_TICK) * u64::from(self.cursor.tempo) / 60_000;
            self.cursor.duration = self.cursor.duration.saturating_add(ticks as u32);
        } else if line == "MUSIC_START" {
            return Some(self.cursor.set_tempo_message());
        } else if line == "MUSIC_END" {
            return Some(match self.cursor.note {
                Some(note) => {
                    self.seek_back(pos);
                    self.cursor.release(note)
                }
                None => self.cursor.end(),
            });
        }
        None
    }

    /// Close a cell with `,` or `;`.
    fn cell(&mut self, note_str: &str) -> Option<MidiMessage> {
        let tick = self.cursor.tick();
        if note_str.is_empty() {
            self.cursor.duration += tick;
            return None;
        }
        if note_str.starts_with('-') {
            return match self.cursor.note {
                Some(note) => {
                    let message = self.cursor.release(note);
                    self.cursor.duration = tick;
                    Some(message)
                }
                None => {
                    self.cursor.duration += tick;
                    None
                }
            };
        }

        let note = (leading_int(note_str).unwrap_or(0) & 0x7F) as u8;
        let message = MidiMessage::note_on(self.cursor.duration, DEFAULT_CHANNEL, note, DEFAULT_VELOCITY);
        self.cursor.note = Some(note);
        self.cursor.duration = tick;
        Some(message)
    }
}

impl ScoreParser for TextScoreParser {
    fn root_tick(&self) -> u16 {
        TEXT_ROOT_TICK
    }

    fn file_name(&self) -> String {
        self.file_name.clone()
    }

    fn number_of_scores(&self) -> usize {
        self.musics.len()
    }

    fn load_score(&mut self, index: usize) -> bool {
        let Some(music) = self.musics.get(index) else {
            log::error!("{}: no score {}", self.file_name, index);
            return false;
        };
        let (offset, tempo, tone, rhythm) = (music.offset, music.tempo, music.tone, music.rhythm);
        if let Err(e) = self.reader.seek_to(offset) {
            log::error!("{}: seek failed: {}", self.file_name, e);
            return false;
        }
        self.cursor = Cursor {
            tempo,
            tone,
            rhythm,
            note: None,
            duration: 0,
            finished: false,
        };
        true
    }

    fn title(&self, index: usize) -> String {
        self.musics
            .get(index)
            .map(|music| music.title.clone())
            .unwrap_or_default()
    }

    fn midi_message(&mut self) -> MidiMessage {
        let mut note_str = String::new();
        while !self.cursor.finished {
            let pos = self.reader.position();
            let Some(ch) = self.reader.read_byte() else {
                return match self.cursor.note {
                    Some(note) => self.cursor.release(note),
                    None => self.cursor.end(),
                };
            };

            match ch {
                c if c.is_ascii_whitespace() => {}
                b'/' => {
                    self.reader.read_string_until(b'\n');
                }
                b'#' => {
                    if let Some(message) = self.command(pos) {
                        return message;
                    }
                }
                b'-' | b'0'..=b'9' => match self.cursor.note {
                    Some(note) => {
                        self.seek_back(pos);
                        return self.cursor.release(note);
                    }
                    None => note_str.push(char::from(ch)),
                },
                b',' | b';' => {
                    let cell = std::mem::take(&mut note_str);
                    if let Some(message) = self.cell(&cell) {
                        return message;
                    }
                }
                _ => {}
            }
        }
        MidiMessage::end_of_track(0)
    }

    fn play_track(&self) -> u32 {
        self.play_track
    }

    fn set_play_track(&mut self, mask: u32) -> bool {
        self.play_track = mask;
        true
    }
}

fn positive(value: &str) -> Option<i64> {
    leading_int(value).filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{NOTE_OFF, NOTE_ON};
    use std::fs;

    fn parser_for(text: &str) -> (tempfile::TempDir, TextScoreParser) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.txt");
        fs::write(&path, text).unwrap();
        let parser = TextScoreParser::open(path.to_str().unwrap()).unwrap();
        (dir, parser)
    }

    #[derive(Debug, PartialEq)]
    enum Ev {
        Tempo(u32, u32),
        On(u32, u8),
        Off(u32, u8),
        End(u32),
    }

    fn next(parser: &mut TextScoreParser) -> Ev {
        let msg = parser.midi_message();
        if msg.is_end_of_track() {
            return Ev::End(msg.delta_time);
        }
        if let Some(tempo) = msg.tempo() {
            return Ev::Tempo(msg.delta_time, tempo);
        }
        match msg.message_type() {
            NOTE_ON => Ev::On(msg.delta_time, msg.data_byte1),
            NOTE_OFF => Ev::Off(msg.delta_time, msg.data_byte1),
            other => panic!("unexpected message type {:#x}", other),
        }
    }

    fn collect(parser: &mut TextScoreParser, count: usize) -> Vec<Ev> {
        (0..count).map(|_| next(parser)).collect()
    }

    #[test]
    fn test_default_header() {
        let (_dir, mut parser) = parser_for("#MUSIC_TITLE:test score1\n#MUSIC_START\n60,-1,,;\n#MUSIC_END\n");
        assert_eq!(parser.number_of_scores(), 1);
        assert_eq!(parser.root_tick(), 96);
        assert_eq!(parser.file_name(), "score.txt");
        assert_eq!(parser.title(0), "test score1");
        assert_eq!(parser.title(1), "");
        assert!(parser.load_score(0));

        assert_eq!(
            collect(&mut parser, 5),
            vec![
                Ev::Tempo(0, 500_000),
                Ev::On(0, 60),
                Ev::Off(96, 60),
                Ev::End(288),
                Ev::End(0),
            ]
        );
    }

    #[test]
    fn test_header_rhythm_and_bpm() {
        let (_dir, mut parser) = parser_for(
            "#MUSIC_TITLE:test score2\n#MUSIC_RHYTHM:1\n#MUSIC_BPM:240\n#MUSIC_START\n60,-1,,;\n#MUSIC_END\n",
        );
        assert!(parser.load_score(0));
        assert_eq!(
            collect(&mut parser, 4),
            vec![Ev::Tempo(0, 250_000), Ev::On(0, 60), Ev::Off(48, 60), Ev::End(144)]
        );
    }

    #[test]
    fn test_inline_changes() {
        let (_dir, mut parser) = parser_for(
            "#MUSIC_TITLE:test score3\n#MUSIC_RHYTHM:1\n#MUSIC_BPM:240\n#MUSIC_START\n\
             60,-1,,;\n#BPMCHANGE 120\n62,-1,,;\n#RHYTHMCHANGE 6\n64,-1,,;\n#MUSIC_END\n",
        );
        assert!(parser.load_score(0));
        assert_eq!(
            collect(&mut parser, 10),
            vec![
                Ev::Tempo(0, 250_000),
                Ev::On(0, 60),
                Ev::Off(48, 60),
                Ev::Tempo(144, 500_000),
                Ev::On(0, 62),
                Ev::Off(48, 62),
                Ev::On(144, 64),
                Ev::Off(16, 64),
                Ev::End(48),
                Ev::End(0),
            ]
        );
    }

    #[test]
    fn test_rest_only_score() {
        let (_dir, mut parser) = parser_for("#MUSIC_TITLE:\n#MUSIC_START\n-1,,,;\n#MUSIC_END\n");
        assert_eq!(parser.title(0), "");
        assert!(parser.load_score(0));
        assert_eq!(collect(&mut parser, 2), vec![Ev::Tempo(0, 500_000), Ev::End(384)]);
    }

    #[test]
    fn test_invalid_header_values_keep_defaults() {
        let (_dir, mut parser) = parser_for(
            "#MUSIC_TITLE:test score5\n#MUSIC_RHYTHM:d\n#MUSIC_BPM:k\n#MUSIC_START\n60,-1,,;\n#MUSIC_END\n",
        );
        assert!(parser.load_score(0));
        assert_eq!(
            collect(&mut parser, 4),
            vec![Ev::Tempo(0, 500_000), Ev::On(0, 60), Ev::Off(96, 60), Ev::End(288)]
        );
    }

    #[test]
    fn test_invalid_inline_changes_are_dropped() {
        let (_dir, mut parser) = parser_for(
            "#MUSIC_RHYTHM:1\n#MUSIC_BPM:240\n#MUSIC_START\n\
             60,-1,,;\n#BPMCHANGE f4\n62,-1,,;\n#RHYTHMCHANGE o\n64,-1,,;\n#MUSIC_END\n",
        );
        assert!(parser.load_score(0));
        assert_eq!(
            collect(&mut parser, 9),
            vec![
                Ev::Tempo(0, 250_000),
                Ev::On(0, 60),
                Ev::Off(48, 60),
                Ev::Tempo(144, 250_000),
                Ev::On(0, 62),
                Ev::Off(48, 62),
                Ev::On(144, 64),
                Ev::Off(48, 64),
                Ev::End(144),
            ]
        );
    }

    #[test]
    fn test_rhythm_table() {
        let expected = [(0, 96), (1, 48), (2, 24), (3, 128), (4, 64), (5, 32), (6, 16), (7, 96), (-1, 96)];
        for (value, tick) in expected {
            assert_eq!(rhythm_tick(value), tick, "rhythm {}", value);
        }

        let mut text = String::from("#MUSIC_BPM:240\n#MUSIC_START\n60,-1;\n");
        for rhythm in [1, 2, 3, 4, 5, 6, 0] {
            text.push_str(&format!("#RHYTHMCHANGE {}\n60,-1;\n", rhythm));
        }
        text.push_str("#MUSIC_END\n");
        let (_dir, mut parser) = parser_for(&text);
        assert!(parser.load_score(0));
        assert_eq!(next(&mut parser), Ev::Tempo(0, 250_000));

        let mut previous_rest = 0;
        for tick in [96, 48, 24, 128, 64, 32, 16, 96] {
            assert_eq!(next(&mut parser), Ev::On(previous_rest, 60));
            assert_eq!(next(&mut parser), Ev::Off(tick, 60));
            previous_rest = tick;
        }
        assert_eq!(next(&mut parser), Ev::End(96));
    }

    #[test]
    fn test_note_straddles_bar_with_delay() {
        let (_dir, mut parser) = parser_for(
            "#MUSIC_TITLE:test score8\n#MUSIC_TONE:2\n#MUSIC_START\n60,-1,60,;\n\
             // straddle bar\n#TONECHANGE 1\n#DELAY 1000\n,-1,,60;\n#MUSIC_END\n",
        );
        assert_eq!(parser.music(0).map(|m| m.tone), Some(2));
        assert!(parser.load_score(0));
        assert_eq!(
            collect(&mut parser, 9),
            vec![
                Ev::Tempo(0, 500_000),
                Ev::On(0, 60),
                Ev::Off(96, 60),
                Ev::On(96, 60),
                Ev::Off(480, 60),
                Ev::On(192, 60),
                Ev::Off(96, 60),
                Ev::End(0),
                Ev::End(0),
            ]
        );
    }

    #[test]
    fn test_missing_music_end() {
        let (_dir, mut parser) =
            parser_for("#MUSIC_START\n60,-1,60,;\n// straddle bar\n#TONECHANGE 1\n,-1,,60;\n");
        assert!(parser.load_score(0));
        assert_eq!(
            collect(&mut parser, 8),
            vec![
                Ev::Tempo(0, 500_000),
                Ev::On(0, 60),
                Ev::Off(96, 60),
                Ev::On(96, 60),
                Ev::Off(288, 60),
                Ev::On(192, 60),
                Ev::Off(96, 60),
                Ev::End(0),
            ]
        );
    }

    #[test]
    fn test_multiple_scores() {
        let (_dir, mut parser) = parser_for(
            "#MUSIC_TITLE:first\n#MUSIC_BPM:60\n#MUSIC_START\n60;\n#MUSIC_END\n\
             #MUSIC_TITLE:second\n#MUSIC_START\n62;\n#MUSIC_END\n",
        );
        assert_eq!(parser.number_of_scores(), 2);
        assert_eq!(parser.title(1), "second");
        assert_eq!(parser.music(1).map(|m| m.tempo), Some(120));
        assert!(!parser.load_score(2));

        assert!(parser.load_score(1));
        assert_eq!(
            collect(&mut parser, 4),
            vec![Ev::Tempo(0, 500_000), Ev::On(0, 62), Ev::Off(96, 62), Ev::End(0)]
        );

        assert!(parser.load_score(0));
        assert_eq!(next(&mut parser), Ev::Tempo(0, 1_000_000));
    }

    #[test]
    fn test_nothing_loaded() {
        let (_dir, mut parser) = parser_for("60,62;\n");
        assert_eq!(parser.number_of_scores(), 0);
        assert_eq!(next(&mut parser), Ev::End(0));
    }
}
