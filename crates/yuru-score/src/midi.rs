//! MIDI event representation shared by every score parser.

/// Lowest valid MIDI note number.
pub const NOTE_NUMBER_MIN: u8 = 0x00;
/// Highest valid MIDI note number.
pub const NOTE_NUMBER_MAX: u8 = 0x7F;
/// Marker for "no note".
pub const INVALID_NOTE_NUMBER: u8 = 0xFF;
pub const DEFAULT_VELOCITY: u8 = 64;
pub const DEFAULT_CHANNEL: u8 = 0;
/// Semitones per octave.
pub const PITCH_NUM: i32 = 12;

/// Capacity of the meta/SysEx payload buffer.
pub const SYSEX_MAX_SIZE: usize = 128;

// Channel voice message types (upper nibble of the status byte)
pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLYPHONIC_KEY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND_CHANGE: u8 = 0xE0;
pub const SYSEX_EVENT: u8 = 0xF0;
pub const SYSEX_ESCAPE: u8 = 0xF7;
pub const META_EVENT: u8 = 0xFF;

// Meta event codes
pub const META_SEQUENCE_NUMBER: u8 = 0x00;
pub const META_TEXT: u8 = 0x01;
pub const META_COPYRIGHT: u8 = 0x02;
pub const META_TRACK_NAME: u8 = 0x03;
pub const META_INSTRUMENT_NAME: u8 = 0x04;
pub const META_LYRICS: u8 = 0x05;
pub const META_MARKER: u8 = 0x06;
pub const META_CUE_POINT: u8 = 0x07;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_SET_TEMPO: u8 = 0x51;
pub const META_TIME_SIGNATURE: u8 = 0x58;
pub const META_KEY_SIGNATURE: u8 = 0x59;
pub const META_SEQUENCER_EVENT: u8 = 0x7F;

/// Control change number for "All Notes Off".
pub const CC_ALL_NOTES_OFF: u8 = 0x7B;

/// One event of a score stream.
///
/// `delta_time` is always relative to the previously returned message of the
/// same stream. Meta and SysEx events carry their payload in `data`, which
/// never holds more than [`SYSEX_MAX_SIZE`] bytes; `event_length` keeps the
/// length declared in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiMessage {
    pub delta_time: u32,
    pub status_byte: u8,
    pub data_byte1: u8,
    pub data_byte2: u8,
    pub event_code: u8,
    pub event_length: u32,
    pub data: Vec<u8>,
}

impl MidiMessage {
    pub fn note_on(delta_time: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            delta_time,
            status_byte: NOTE_ON | (channel & 0x0F),
            data_byte1: note,
            data_byte2: velocity,
            ..Default::default()
        }
    }

    pub fn note_off(delta_time: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            delta_time,
            status_byte: NOTE_OFF | (channel & 0x0F),
            data_byte1: note,
            data_byte2: velocity,
            ..Default::default()
        }
    }

    /// Meta event; the payload is truncated to [`SYSEX_MAX_SIZE`].
    pub fn meta(delta_time: u32, event_code: u8, payload: &[u8]) -> Self {
        Self {
            delta_time,
            status_byte: META_EVENT,
            event_code,
            event_length: payload.len() as u32,
            data: payload[..payload.len().min(SYSEX_MAX_SIZE)].to_vec(),
            ..Default::default()
        }
    }

    /// Set Tempo meta event in microseconds per quarter note.
    pub fn set_tempo(delta_time: u32, tempo: u32) -> Self {
        let bytes = tempo.to_be_bytes();
        Self::meta(delta_time, META_SET_TEMPO, &bytes[1..])
    }

    pub fn end_of_track(delta_time: u32) -> Self {
        Self::meta(delta_time, META_END_OF_TRACK, &[])
    }

    /// `true` for meta events.
    pub fn is_meta(&self) -> bool {
        self.status_byte == META_EVENT
    }

    /// `true` for SysEx (`F0`) and escaped SysEx (`F7`) events.
    pub fn is_sysex(&self) -> bool {
        self.status_byte == SYSEX_EVENT || self.status_byte == SYSEX_ESCAPE
    }

    pub fn is_end_of_track(&self) -> bool {
        self.is_meta() && self.event_code == META_END_OF_TRACK
    }

    /// Upper nibble of a channel voice status byte.
    pub fn message_type(&self) -> u8 {
        self.status_byte & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.status_byte & 0x0F
    }

    /// Tempo carried by a Set Tempo event.
    pub fn tempo(&self) -> Option<u32> {
        if !self.is_meta() || self.event_code != META_SET_TEMPO {
            return None;
        }
        Some(self.data.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }
}

/// Number of data bytes following a channel voice status byte.
pub fn data_length(status_byte: u8) -> usize {
    match status_byte & 0xF0 {
        PROGRAM_CHANGE | CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}

/// Whether `note` is a valid MIDI note number.
pub fn is_note_number(note: i32) -> bool {
    (i32::from(NOTE_NUMBER_MIN)..=i32::from(NOTE_NUMBER_MAX)).contains(&note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_tempo_payload() {
        let msg = MidiMessage::set_tempo(0, 500_000);
        assert_eq!(msg.data, vec![0x07, 0xA1, 0x20]);
        assert_eq!(msg.event_length, 3);
        assert_eq!(msg.tempo(), Some(500_000));
        assert!(!msg.is_end_of_track());
    }

    #[test]
    fn test_channel_messages() {
        let on = MidiMessage::note_on(10, 3, 60, 100);
        assert_eq!(on.status_byte, 0x93);
        assert_eq!(on.message_type(), NOTE_ON);
        assert_eq!(on.channel(), 3);
        assert_eq!(on.tempo(), None);

        let off = MidiMessage::note_off(0, 0, 60, 0);
        assert_eq!(off.message_type(), NOTE_OFF);
    }

    #[test]
    fn test_meta_payload_is_capped() {
        let text = vec![b'a'; 200];
        let msg = MidiMessage::meta(0, META_TEXT, &text);
        assert_eq!(msg.event_length, 200);
        assert_eq!(msg.data.len(), SYSEX_MAX_SIZE);
    }

    #[test]
    fn test_data_length() {
        assert_eq!(data_length(0xC5), 1);
        assert_eq!(data_length(0xD0), 1);
        assert_eq!(data_length(0x90), 2);
        assert_eq!(data_length(0xE1), 2);
    }
}
