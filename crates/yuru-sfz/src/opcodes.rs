//! Opcode table and value parsers.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use yuru_score::midi::{NOTE_NUMBER_MAX, PITCH_NUM};

/// Sample playback loop mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play from offset to end once; note-off stops playback
    #[default]
    NoLoop = 0,
    /// Play `count` times through the loop and ignore note-off
    OneShot = 1,
    /// Loop between loop_start and loop_end until note-off
    LoopContinuous = 2,
    /// Loop while the note is held
    LoopSustain = 3,
}

impl LoopMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::NoLoop),
            1 => Some(Self::OneShot),
            2 => Some(Self::LoopContinuous),
            3 => Some(Self::LoopSustain),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoLoop => "no_loop",
            Self::OneShot => "one_shot",
            Self::LoopContinuous => "loop_continuous",
            Self::LoopSustain => "loop_sustain",
        }
    }
}

impl FromStr for LoopMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no_loop" => Ok(Self::NoLoop),
            "one_shot" => Ok(Self::OneShot),
            "loop_continuous" => Ok(Self::LoopContinuous),
            "loop_sustain" => Ok(Self::LoopSustain),
            _ => Err(Error::InvalidValue {
                opcode: "loop_mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opcodes that take part in region building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpcodeId {
    Sample,
    Lokey,
    Hikey,
    Lochan,
    Hichan,
    Lovel,
    Hivel,
    Offset,
    End,
    Count,
    LoopMode,
    LoopStart,
    LoopEnd,
    SwLast,
    SwLokey,
    SwHikey,
    SwDefault,
}

pub(crate) const OPCODE_COUNT: usize = OpcodeId::SwDefault as usize + 1;

impl OpcodeId {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit in [`OpcodeContainer::specified`](crate::region::OpcodeContainer).
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpcodeSpec {
    pub name: &'static str,
    pub id: OpcodeId,
    pub min: u32,
    pub max: u32,
    /// `None` for `sample`, which takes a path
    pub parse: Option<fn(&str) -> Option<i64>>,
}

const fn spec(name: &'static str, id: OpcodeId, min: u32, max: u32, parse: fn(&str) -> Option<i64>) -> OpcodeSpec {
    OpcodeSpec {
        name,
        id,
        min,
        max,
        parse: Some(parse),
    }
}

const NOTE_MAX: u32 = NOTE_NUMBER_MAX as u32;

/// Recognised opcodes. A name may appear more than once (`key` sets both
/// ends of the key range); every matching row is applied.
#[rustfmt::skip]
pub(crate) const OPCODE_SPECS: &[OpcodeSpec] = &[
    OpcodeSpec { name: "sample", id: OpcodeId::Sample, min: 0, max: 0, parse: None },
    spec("hikey",      OpcodeId::Hikey,     0, NOTE_MAX,   notename_value),
    spec("lokey",      OpcodeId::Lokey,     0, NOTE_MAX,   notename_value),
    spec("key",        OpcodeId::Hikey,     0, NOTE_MAX,   notename_value),
    spec("key",        OpcodeId::Lokey,     0, NOTE_MAX,   notename_value),
    spec("lochan",     OpcodeId::Lochan,    1, 16,         uint32_value),
    spec("hichan",     OpcodeId::Hichan,    1, 16,         uint32_value),
    spec("lovel",      OpcodeId::Lovel,     0, 127,        uint32_value),
    spec("hivel",      OpcodeId::Hivel,     0, 127,        uint32_value),
    spec("offset",     OpcodeId::Offset,    0, u32::MAX,   uint32_value),
    spec("end",        OpcodeId::End,       0, u32::MAX,   uint32_value),
    spec("count",      OpcodeId::Count,     0, u32::MAX,   uint32_value),
    spec("loop_mode",  OpcodeId::LoopMode,  0, 3,          loopmode_value),
    spec("loop_start", OpcodeId::LoopStart, 0, u32::MAX,   uint32_value),
    spec("loop_end",   OpcodeId::LoopEnd,   0, u32::MAX,   uint32_value),
    spec("loopmode",   OpcodeId::LoopMode,  0, 3,          loopmode_value),
    spec("loopstart",  OpcodeId::LoopStart, 0, u32::MAX,   uint32_value),
    spec("loopend",    OpcodeId::LoopEnd,   0, u32::MAX,   uint32_value),
    spec("sw_last",    OpcodeId::SwLast,    0, NOTE_MAX,   notename_value),
    spec("sw_lokey",   OpcodeId::SwLokey,   0, NOTE_MAX,   notename_value),
    spec("sw_hikey",   OpcodeId::SwHikey,   0, NOTE_MAX,   notename_value),
    spec("sw_default", OpcodeId::SwDefault, 0, NOTE_MAX,   notename_value),
];

/// Opcodes that are accepted without effect.
pub(crate) const UNSUPPORTED_OPCODES: &[&str] = &[
    "lorand",
    "hirand",
    "seq_length",
    "seq_position",
    "group",
    "off_by",
    "default_path",
];

/// Rows of the opcode table for `name`.
pub(crate) fn lookup(name: &str) -> impl Iterator<Item = &'static OpcodeSpec> + '_ {
    OPCODE_SPECS.iter().filter(move |spec| spec.name == name)
}

/// Split a C-style number into digits and radix: `0x` hex, leading `0` octal.
fn split_radix(s: &str) -> (&str, u32) {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    }
}

fn parse_magnitude(s: &str) -> Option<u64> {
    let (digits, radix) = split_radix(s);
    if !digits.starts_with(|c: char| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

/// Parse an unsigned 32-bit value.
///
/// The whole string must be a number starting with a digit. `0x` selects
/// hexadecimal and a leading `0` octal.
///
/// ```
/// use yuru_sfz::opcodes::parse_uint32;
///
/// assert_eq!(parse_uint32("42"), Some(42));
/// assert_eq!(parse_uint32("0x10"), Some(16));
/// assert_eq!(parse_uint32("-1"), None);
/// ```
pub fn parse_uint32(s: &str) -> Option<u32> {
    if !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    parse_magnitude(s).and_then(|value| u32::try_from(value).ok())
}

/// Parse a signed 32-bit value with an optional sign.
pub fn parse_int32(s: &str) -> Option<i32> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = i64::try_from(parse_magnitude(digits)?).ok()?;
    i32::try_from(if negative { -magnitude } else { magnitude }).ok()
}

/// Parse a MIDI note number or a note name such as `c4`, `F#2` or `Bb-1`.
///
/// Octave 4 holds middle C (60). The result may fall outside 0..=127; the
/// caller checks the range.
///
/// ```
/// use yuru_sfz::opcodes::parse_notename;
///
/// assert_eq!(parse_notename("C-1"), Some(0));
/// assert_eq!(parse_notename("a4"), Some(69));
/// assert_eq!(parse_notename("61"), Some(61));
/// ```
pub fn parse_notename(s: &str) -> Option<i64> {
    // A B C D E F G
    const BASE_NOTE: [i64; 7] = [69, 71, 60, 62, 64, 65, 67];

    if let Some(number) = parse_uint32(s) {
        return Some(i64::from(number));
    }
    let mut chars = s.chars();
    let pitch = chars.next()?.to_ascii_uppercase();
    if !('A'..='G').contains(&pitch) || s.len() < 2 {
        return None;
    }
    let mut note = BASE_NOTE[(pitch as u8 - b'A') as usize];
    let rest = chars.as_str();
    let octave = match rest.as_bytes().first() {
        Some(b'#') => {
            note += 1;
            &rest[1..]
        }
        Some(b'b') => {
            note -= 1;
            &rest[1..]
        }
        _ => rest,
    };
    let octave = i64::from(parse_int32(octave)?);
    Some(note + (octave - 4) * i64::from(PITCH_NUM))
}

fn uint32_value(s: &str) -> Option<i64> {
    parse_uint32(s).map(i64::from)
}

fn notename_value(s: &str) -> Option<i64> {
    parse_notename(s)
}

fn loopmode_value(s: &str) -> Option<i64> {
    s.parse::<LoopMode>().ok().map(|mode| mode as i64)
}
