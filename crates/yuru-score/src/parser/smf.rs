//! Standard MIDI File (format 0/1) parser.
//!
//! The header and track chunk table are read when the parser is created;
//! track bodies are decoded lazily while the score is streamed. Tracks are
//! merged into one chronological stream by comparing their pending delta
//! times. In files with two or more tracks, track 0 is the conductor track:
//! its meta events are collected up front and merged with the music tracks
//! by [`merge_step`].

use super::{ScoreParser, MAX_TRACK};
use crate::error::{Error, Result};
use crate::midi::{self, MidiMessage, META_END_OF_TRACK, META_EVENT, META_SET_TEMPO, META_TRACK_NAME};
use crate::path_utils::base_name;
use std::collections::VecDeque;
use std::fs;

const CHUNK_ID_LEN: usize = 4;
const HEADER_ID: &[u8; 4] = b"MThd";
const TRACK_ID: &[u8; 4] = b"MTrk";
const SET_TEMPO_LEN: u32 = 3;

/// Location and identity of one `MTrk` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackData {
    pub track_id: usize,
    /// Offset of the track body in the file
    pub offset: usize,
    /// Length of the track body
    pub size: usize,
    /// Track 0 of a multi-track file
    pub is_conductor: bool,
    pub name: String,
}

/// Decoding position inside one track body.
#[derive(Debug)]
struct TrackCursor {
    pos: usize,
    end: usize,
    running_status: u8,
}

impl TrackCursor {
    fn new(track: &TrackData) -> Self {
        Self {
            pos: track.offset,
            end: track.offset + track.size,
            running_status: 0,
        }
    }

    fn available(&self) -> bool {
        self.pos < self.end
    }

    fn read_byte(&mut self, data: &[u8]) -> Option<u8> {
        if !self.available() {
            return None;
        }
        let byte = data.get(self.pos).copied();
        self.pos += 1;
        byte
    }

    /// Variable-length quantity: 7 bits per byte, MSB set on all but the last.
    fn read_variable_length(&mut self, data: &[u8]) -> u32 {
        let mut value = 0u32;
        while let Some(byte) = self.read_byte(data) {
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
        value
    }

    /// Read a payload of `len` bytes, keeping at most the message capacity.
    fn read_payload(&mut self, data: &[u8], len: u32) -> Vec<u8> {
        let start = self.pos.min(self.end);
        let stop = start.saturating_add(len as usize).min(self.end);
        self.pos = stop;
        let kept = (stop - start).min(midi::SYSEX_MAX_SIZE);
        data.get(start..start + kept).map(<[u8]>::to_vec).unwrap_or_default()
    }

    /// Decode the next event, `Ok(None)` when the track body is exhausted.
    fn next_event(&mut self, data: &[u8]) -> Result<Option<MidiMessage>> {
        if !self.available() {
            return Ok(None);
        }
        let delta_time = self.read_variable_length(data);
        let Some(status_byte) = self.read_byte(data) else {
            return Ok(None);
        };

        let mut message = match status_byte {
            META_EVENT => self.meta_event(data)?,
            midi::SYSEX_EVENT | midi::SYSEX_ESCAPE => {
                let len = self.read_variable_length(data);
                let payload = self.read_payload(data, len);
                MidiMessage {
                    status_byte,
                    event_length: len,
                    data: payload,
                    ..Default::default()
                }
            }
            _ => self.channel_event(data, status_byte)?,
        };
        message.delta_time = delta_time;
        Ok(Some(message))
    }

    fn meta_event(&mut self, data: &[u8]) -> Result<MidiMessage> {
        let event_code = self.read_byte(data).unwrap_or(META_END_OF_TRACK);
        let len = self.read_variable_length(data);
        let payload = match event_code {
            META_SET_TEMPO if len == SET_TEMPO_LEN => self.read_payload(data, len),
            META_END_OF_TRACK => Vec::new(),
            code if code < 0x80 => self.read_payload(data, len),
            code => return Err(Error::UnsupportedMetaEvent(code)),
        };
        Ok(MidiMessage {
            status_byte: META_EVENT,
            event_code,
            event_length: len,
            data: payload,
            ..Default::default()
        })
    }

    fn channel_event(&mut self, data: &[u8], first: u8) -> Result<MidiMessage> {
        let (status_byte, mut data_byte1) = if first & 0x80 != 0 {
            (first, None)
        } else if self.running_status != 0 {
            (self.running_status, Some(first))
        } else {
            return Err(Error::MissingRunningStatus(first));
        };

        if data_byte1.is_none() {
            data_byte1 = self.read_byte(data);
        }
        let data_byte2 = if midi::data_length(status_byte) == 2 {
            self.read_byte(data).unwrap_or(0)
        } else {
            0
        };
        self.running_status = status_byte;

        Ok(MidiMessage {
            status_byte,
            data_byte1: data_byte1.unwrap_or(0),
            data_byte2,
            ..Default::default()
        })
    }
}

/// One music track being merged.
#[derive(Debug)]
struct TrackReader {
    cursor: TrackCursor,
    pending: Option<MidiMessage>,
    at_eot: bool,
}

/// N-way merge of the music tracks.
///
/// The stream ends with an End Of Track whose delta reaches the latest track
/// end.
#[derive(Debug, Default)]
struct TrackMerger {
    readers: Vec<TrackReader>,
    /// Ticks from the last emitted event to the latest finished track end.
    trailing: u32,
}

impl TrackMerger {
    fn next(&mut self, data: &[u8]) -> MidiMessage {
        let mut earliest: Option<usize> = None;

        for index in 0..self.readers.len() {
            let reader = &mut self.readers[index];
            if reader.at_eot {
                continue;
            }
            if reader.pending.is_none() {
                match reader.cursor.next_event(data) {
                    Ok(Some(message)) if message.is_end_of_track() => {
                        reader.at_eot = true;
                        self.trailing = self.trailing.max(message.delta_time);
                        continue;
                    }
                    Ok(Some(message)) => reader.pending = Some(message),
                    Ok(None) => {
                        reader.at_eot = true;
                        continue;
                    }
                    Err(e) => {
                        log::warn!("track decode stopped: {}", e);
                        reader.at_eot = true;
                        continue;
                    }
                }
            }
            let delta = reader.pending.as_ref().map_or(u32::MAX, |m| m.delta_time);
            let is_earlier = match earliest {
                None => true,
                Some(e) => {
                    delta < self.readers[e].pending.as_ref().map_or(u32::MAX, |m| m.delta_time)
                }
            };
            if is_earlier {
                earliest = Some(index);
            }
        }

        let Some(index) = earliest else {
            let end = MidiMessage::end_of_track(self.trailing);
            self.trailing = 0;
            return end;
        };
        let Some(message) = self.readers[index].pending.take() else {
            return MidiMessage::end_of_track(0);
        };

        for reader in &mut self.readers {
            if let Some(pending) = reader.pending.as_mut() {
                pending.delta_time -= message.delta_time;
            }
        }
        self.trailing = self.trailing.saturating_sub(message.delta_time);
        message
    }
}

/// Which stream supplies the next event of a 2-way merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    Conductor,
    Music,
    /// Both streams are finished; the final End Of Track carries this delta.
    End(u32),
}

/// Choose between the head of the conductor list and the head of the music
/// stream.
///
/// Heads that are End Of Track events only mark where their stream ends and
/// are never chosen. On equal delta times the conductor wins so that tempo
/// changes apply before notes at the same tick.
pub fn merge_step(conductor: Option<&MidiMessage>, music: Option<&MidiMessage>) -> MergeStep {
    let live = |head: Option<&MidiMessage>| {
        head.filter(|m| !m.is_end_of_track()).map(|m| m.delta_time)
    };
    match (live(conductor), live(music)) {
        (Some(c), Some(m)) if c <= m => MergeStep::Conductor,
        (Some(_), Some(_)) => MergeStep::Music,
        (Some(_), None) => MergeStep::Conductor,
        (None, Some(_)) => MergeStep::Music,
        (None, None) => {
            let end = |head: Option<&MidiMessage>| head.map_or(0, |m| m.delta_time);
            MergeStep::End(end(conductor).max(end(music)))
        }
    }
}

/// Streaming state of the loaded score.
#[derive(Debug, Default)]
struct Playback {
    music: TrackMerger,
    music_head: Option<MidiMessage>,
    /// Conductor meta events, terminated by an End Of Track marker.
    conductor: VecDeque<MidiMessage>,
    finished: bool,
}

/// Parser for `.mid`/`.midi` files.
#[derive(Debug)]
pub struct SmfParser {
    file_name: String,
    data: Vec<u8>,
    root_tick: u16,
    tracks: Vec<TrackData>,
    title: String,
    play_track: u32,
    playback: Option<Playback>,
}

impl SmfParser {
    /// Read `path` and index its tracks.
    ///
    /// Only I/O failures are errors. A file with a malformed header or an
    /// SMPTE time division yields a parser without scores.
    pub fn open(path: &str) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(Self::from_bytes(base_name(path), data))
    }

    /// Index an SMF image held in memory.
    pub fn from_bytes(file_name: &str, data: Vec<u8>) -> Self {
        let mut parser = Self {
            file_name: file_name.to_string(),
            data,
            root_tick: 0,
            tracks: Vec::new(),
            title: file_name.to_string(),
            play_track: !0,
            playback: None,
        };
        match parser.parse_chunks() {
            Ok(()) => {
                if let Some(name) = parser.first_track_name() {
                    parser.title = name;
                }
                log::debug!(
                    "{}: division {}, {} tracks",
                    parser.file_name,
                    parser.root_tick,
                    parser.tracks.len()
                );
            }
            Err(e) => {
                log::error!("{}: {}", parser.file_name, e);
                parser.tracks.clear();
            }
        }
        parser
    }

    /// Track chunk table.
    pub fn tracks(&self) -> &[TrackData] {
        &self.tracks
    }

    fn parse_chunks(&mut self) -> Result<()> {
        let header = self.data.get(..14).ok_or(Error::InvalidChunk {
            expected: "MThd",
            found: [0; 4],
        })?;
        let id = chunk_id(header);
        if &id != HEADER_ID {
            return Err(Error::InvalidChunk {
                expected: "MThd",
                found: id,
            });
        }
        let length = be_u32(&header[4..8]) as usize;
        let _format = be_u16(&header[8..10]);
        let ntrks = be_u16(&header[10..12]);
        let division = be_u16(&header[12..14]);
        if division & 0x8000 != 0 {
            return Err(Error::UnsupportedDivision(division));
        }
        self.root_tick = division;

        let count = usize::from(ntrks).min(MAX_TRACK as usize);
        let mut pos = 8 + length;
        for track_id in 0..count {
            let chunk = self.data.get(pos..pos + 8).ok_or(Error::InvalidChunk {
                expected: "MTrk",
                found: [0; 4],
            })?;
            let id = chunk_id(chunk);
            if &id != TRACK_ID {
                return Err(Error::InvalidChunk {
                    expected: "MTrk",
                    found: id,
                });
            }
            let size = be_u32(&chunk[4..8]) as usize;
            let offset = pos + 8;
            // Truncated files keep whatever part of the body is present.
            let size = size.min(self.data.len().saturating_sub(offset));
            self.tracks.push(TrackData {
                track_id,
                offset,
                size,
                is_conductor: track_id == 0 && ntrks >= 2,
                name: self.file_name.clone(),
            });
            pos = offset + size;
        }
        Ok(())
    }

    /// Text of the first Track Name meta event of track 0, if it comes before
    /// any channel event.
    fn first_track_name(&self) -> Option<String> {
        let mut cursor = TrackCursor::new(self.tracks.first()?);
        while let Ok(Some(message)) = cursor.next_event(&self.data) {
            if !message.is_meta() || message.is_end_of_track() {
                return None;
            }
            if message.event_code == META_TRACK_NAME {
                let name = String::from_utf8_lossy(&message.data).trim().to_string();
                return (!name.is_empty()).then_some(name);
            }
        }
        None
    }

    fn is_track_enabled(&self, track_id: usize) -> bool {
        track_id < MAX_TRACK as usize && self.play_track & (1 << track_id) != 0
    }

    /// Collect the conductor's meta events with their accumulated delta times.
    fn scan_conductor(&self, track: &TrackData) -> VecDeque<MidiMessage> {
        let mut events = VecDeque::new();
        let mut cursor = TrackCursor::new(track);
        let mut accumulated = 0u32;
        loop {
            match cursor.next_event(&self.data) {
                Ok(Some(mut message)) => {
                    accumulated = accumulated.saturating_add(message.delta_time);
                    if message.is_end_of_track() {
                        events.push_back(MidiMessage::end_of_track(accumulated));
                        break;
                    }
                    if message.is_meta() {
                        message.delta_time = accumulated;
                        accumulated = 0;
                        events.push_back(message);
                    }
                }
                Ok(None) => {
                    events.push_back(MidiMessage::end_of_track(accumulated));
                    break;
                }
                Err(e) => {
                    log::warn!("{}: conductor track: {}", self.file_name, e);
                    events.push_back(MidiMessage::end_of_track(accumulated));
                    break;
                }
            }
        }
        log::debug!("{}: {} conductor events", self.file_name, events.len() - 1);
        events
    }
}

impl ScoreParser for SmfParser {
    fn root_tick(&self) -> u16 {
        self.root_tick
    }

    fn file_name(&self) -> String {
        self.file_name.clone()
    }

    fn number_of_scores(&self) -> usize {
        usize::from(!self.tracks.is_empty())
    }

    fn load_score(&mut self, index: usize) -> bool {
        if index >= self.number_of_scores() {
            log::error!("{}: no score {}", self.file_name, index);
            return false;
        }

        let mut playback = Playback::default();
        for track in &self.tracks {
            if !self.is_track_enabled(track.track_id) {
                continue;
            }
            if track.is_conductor {
                playback.conductor = self.scan_conductor(track);
            } else {
                playback.music.readers.push(TrackReader {
                    cursor: TrackCursor::new(track),
                    pending: None,
                    at_eot: false,
                });
            }
        }
        self.playback = Some(playback);
        true
    }

    fn title(&self, index: usize) -> String {
        if index >= self.number_of_scores() {
            return String::new();
        }
        self.title.clone()
    }

    fn midi_message(&mut self) -> MidiMessage {
        let Some(playback) = self.playback.as_mut() else {
            return MidiMessage::end_of_track(0);
        };
        if playback.finished {
            return MidiMessage::end_of_track(0);
        }
        if playback.music_head.is_none() {
            playback.music_head = Some(playback.music.next(&self.data));
        }

        match merge_step(playback.conductor.front(), playback.music_head.as_ref()) {
            MergeStep::Conductor => {
                let Some(message) = playback.conductor.pop_front() else {
                    return MidiMessage::end_of_track(0);
                };
                if let Some(head) = playback.music_head.as_mut() {
                    head.delta_time = head.delta_time.saturating_sub(message.delta_time);
                }
                message
            }
            MergeStep::Music => {
                let Some(message) = playback.music_head.take() else {
                    return MidiMessage::end_of_track(0);
                };
                if let Some(head) = playback.conductor.front_mut() {
                    head.delta_time = head.delta_time.saturating_sub(message.delta_time);
                }
                message
            }
            MergeStep::End(delta_time) => {
                playback.finished = true;
                MidiMessage::end_of_track(delta_time)
            }
        }
    }

    fn play_track(&self) -> u32 {
        self.play_track
    }

    fn set_play_track(&mut self, mask: u32) -> bool {
        self.play_track = mask;
        true
    }
}

fn chunk_id(bytes: &[u8]) -> [u8; CHUNK_ID_LEN] {
    let mut id = [0u8; CHUNK_ID_LEN];
    id.copy_from_slice(&bytes[..CHUNK_ID_LEN]);
    id
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{NOTE_OFF, NOTE_ON, PROGRAM_CHANGE};

    fn smf(division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&(if tracks.len() > 1 { 1u16 } else { 0u16 }).to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        for body in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    const EOT: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

    fn drain(parser: &mut SmfParser) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        for _ in 0..64 {
            let msg = parser.midi_message();
            let end = msg.is_end_of_track();
            out.push(msg);
            if end {
                break;
            }
        }
        out
    }

    #[test]
    fn test_single_track_with_running_status() {
        let mut track = vec![
            0x00, 0x90, 60, 100, // note on
            0x60, 62, 100, // running status note on
            0x60, 0x80, 60, 0, // note off
            0x00, 62, 0, // running status note off
            0x10, 0xC1, 5, // program change, one data byte
        ];
        track.extend_from_slice(&EOT);
        let mut parser = SmfParser::from_bytes("song.mid", smf(480, &[track]));

        assert_eq!(parser.number_of_scores(), 1);
        assert_eq!(parser.root_tick(), 480);
        assert_eq!(parser.file_name(), "song.mid");
        assert_eq!(parser.title(0), "song.mid");
        assert!(parser.load_score(0));

        let msgs = drain(&mut parser);
        assert_eq!(msgs.len(), 6);
        assert_eq!((msgs[0].status_byte, msgs[0].data_byte1, msgs[0].delta_time), (NOTE_ON, 60, 0));
        assert_eq!((msgs[1].status_byte, msgs[1].data_byte1, msgs[1].delta_time), (NOTE_ON, 62, 0x60));
        assert_eq!((msgs[2].status_byte, msgs[2].data_byte1), (NOTE_OFF, 60));
        assert_eq!((msgs[3].status_byte, msgs[3].data_byte1, msgs[3].data_byte2), (NOTE_OFF, 62, 0));
        assert_eq!(msgs[4].status_byte, PROGRAM_CHANGE | 1);
        assert_eq!(msgs[4].data_byte1, 5);
        assert!(msgs[5].is_end_of_track());

        // exhausted stream keeps answering End Of Track
        let again = parser.midi_message();
        assert!(again.is_end_of_track());
        assert_eq!(again.delta_time, 0);
    }

    #[test]
    fn test_conductor_tempo_is_interleaved() {
        let mut conductor = vec![
            0x00, 0xFF, 0x03, 0x04, b'D', b'e', b'm', b'o', // track name
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000 at 0
            0x81, 0x40, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, // tempo 250000 at 192
        ];
        conductor.extend_from_slice(&EOT);
        let mut music = vec![
            0x00, 0x90, 60, 100, // on at 0
            0x60, 0x80, 60, 0, // off at 96
            0x60, 0x90, 62, 100, // on at 192
            0x81, 0x40, 0x80, 62, 0, // off at 384
        ];
        music.extend_from_slice(&EOT);

        let mut parser = SmfParser::from_bytes("two.mid", smf(96, &[conductor, music]));
        assert!(parser.tracks()[0].is_conductor);
        assert!(!parser.tracks()[1].is_conductor);
        assert_eq!(parser.title(0), "Demo");
        assert!(parser.load_score(0));

        let msgs = drain(&mut parser);
        let summary: Vec<(u32, u8, u8)> = msgs
            .iter()
            .map(|m| (m.delta_time, m.status_byte, if m.is_meta() { m.event_code } else { m.data_byte1 }))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, META_EVENT, META_TRACK_NAME),
                (0, META_EVENT, META_SET_TEMPO),
                (0, NOTE_ON, 60),
                (96, NOTE_OFF, 60),
                (96, META_EVENT, META_SET_TEMPO),
                (0, NOTE_ON, 62),
                (192, NOTE_OFF, 62),
                (0, META_EVENT, META_END_OF_TRACK),
            ]
        );
        assert_eq!(msgs[4].tempo(), Some(250_000));

        let total: u32 = msgs.iter().map(|m| m.delta_time).sum();
        assert_eq!(total, 384);
    }

    #[test]
    fn test_merge_of_music_tracks() {
        let conductor = EOT.to_vec();
        let mut first = vec![0x00, 0x90, 60, 100, 0x81, 0x00, 0x80, 60, 0];
        first.extend_from_slice(&EOT);
        let mut second = vec![0x40, 0x91, 64, 100, 0x40, 0x81, 64, 0];
        second.extend_from_slice(&[0x81, 0x00, 0xFF, 0x2F, 0x00]);
        let mut parser = SmfParser::from_bytes("three.mid", smf(96, &[conductor, first, second]));
        assert!(parser.load_score(0));

        let msgs = drain(&mut parser);
        let deltas: Vec<u32> = msgs.iter().map(|m| m.delta_time).collect();
        // on60@0, on64@64, off60@128, off64@128, end@256
        assert_eq!(deltas, vec![0, 64, 64, 0, 128]);
        assert_eq!(msgs[1].channel(), 1);
        assert!(msgs[4].is_end_of_track());
    }

    #[test]
    fn test_track_mask_disables_tracks() {
        let conductor = EOT.to_vec();
        let mut first = vec![0x00, 0x90, 60, 100];
        first.extend_from_slice(&EOT);
        let mut second = vec![0x00, 0x90, 64, 100];
        second.extend_from_slice(&EOT);
        let mut parser = SmfParser::from_bytes("mask.mid", smf(96, &[conductor, first, second]));

        assert!(parser.set_disable_track(1));
        assert!(!parser.set_disable_track(32));
        assert_eq!(parser.play_track(), !0u32 & !(1 << 1));
        assert!(parser.load_score(0));
        let msgs = drain(&mut parser);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].data_byte1, 64);
    }

    #[test]
    fn test_sysex_is_reported() {
        let mut track = vec![0x00, 0xF0, 0x03, 0x7E, 0x7F, 0xF7, 0x00, 0x90, 60, 100];
        track.extend_from_slice(&EOT);
        let mut parser = SmfParser::from_bytes("sysex.mid", smf(96, &[track]));
        assert!(parser.load_score(0));
        let sysex = parser.midi_message();
        assert!(sysex.is_sysex());
        assert_eq!(sysex.data, vec![0x7E, 0x7F, 0xF7]);
        assert_eq!(parser.midi_message().data_byte1, 60);
    }

    #[test]
    fn test_malformed_files_have_no_scores() {
        let mut bad_header = smf(96, &[EOT.to_vec()]);
        bad_header[0] = b'X';
        let mut parser = SmfParser::from_bytes("bad.mid", bad_header);
        assert_eq!(parser.number_of_scores(), 0);
        assert!(!parser.load_score(0));
        assert!(parser.midi_message().is_end_of_track());

        let smpte = smf(0xE728, &[EOT.to_vec()]);
        assert_eq!(SmfParser::from_bytes("smpte.mid", smpte).number_of_scores(), 0);

        let mut bad_track = smf(96, &[EOT.to_vec()]);
        bad_track[14] = b'X';
        assert_eq!(SmfParser::from_bytes("track.mid", bad_track).number_of_scores(), 0);

        assert_eq!(SmfParser::from_bytes("short.mid", b"MThd".to_vec()).number_of_scores(), 0);
    }

    #[test]
    fn test_unsupported_meta_event_ends_track() {
        let mut track = vec![0x00, 0x90, 60, 100, 0x10, 0xFF, 0x90, 0x00];
        track.extend_from_slice(&EOT);
        let mut parser = SmfParser::from_bytes("meta.mid", smf(96, &[track]));
        assert!(parser.load_score(0));
        assert_eq!(parser.midi_message().data_byte1, 60);
        assert!(parser.midi_message().is_end_of_track());
    }

    #[test]
    fn test_merge_step() {
        let tempo = MidiMessage::set_tempo(10, 500_000);
        let note = MidiMessage::note_on(10, 0, 60, 64);
        let late = MidiMessage::note_on(20, 0, 60, 64);
        let end = MidiMessage::end_of_track(30);

        assert_eq!(merge_step(Some(&tempo), Some(&note)), MergeStep::Conductor);
        assert_eq!(merge_step(Some(&late), Some(&note)), MergeStep::Music);
        assert_eq!(merge_step(Some(&end), Some(&note)), MergeStep::Music);
        assert_eq!(merge_step(Some(&tempo), None), MergeStep::Conductor);
        assert_eq!(merge_step(None, Some(&late)), MergeStep::Music);
        assert_eq!(
            merge_step(Some(&end), Some(&MidiMessage::end_of_track(5))),
            MergeStep::End(30)
        );
        assert_eq!(merge_step(None, None), MergeStep::End(0));
    }

    #[test]
    fn test_open_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.mid");
        let mut track = vec![0x00, 0x90, 60, 100];
        track.extend_from_slice(&EOT);
        fs::write(&path, smf(120, &[track])).unwrap();

        let parser = SmfParser::open(path.to_str().unwrap()).unwrap();
        assert_eq!(parser.file_name(), "file.mid");
        assert_eq!(parser.root_tick(), 120);
        assert!(SmfParser::open("/nonexistent/file.mid").is_err());
    }
}
