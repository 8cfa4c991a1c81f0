//! Tick to wall-clock conversion and event scheduling.
//!
//! [`TimeKeeper`] tracks how many ticks of the score have been played and
//! converts tick distances into milliseconds for the current tempo. When the
//! tempo changes, the milliseconds elapsed under the old tempo are folded into
//! a reference point so earlier ticks keep their duration.
//!
//! Times are 32-bit millisecond counters that wrap, like a microcontroller
//! `millis()` clock. [`TimeKeeper::is_scheduled_time`] treats a schedule time
//! just below the wrap point as reached once the clock has wrapped.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// 120 BPM in microseconds per quarter note.
pub const DEFAULT_TEMPO: u32 = 60_000_000 / 120;
pub const DEFAULT_DIVISION: u16 = 96;

const WRAP_SCHEDULE_MIN: u32 = 0xFFFF_FC00;
const WRAP_CURRENT_MAX: u32 = 0x3FF;

/// SMPTE frame rate carried in bits 5-6 of an MTC hour byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtcRate {
    Fps24,
    Fps25,
    /// 30 fps drop frame (29.97 fps)
    Fps30Drop,
    Fps30,
}

impl MtcRate {
    pub fn from_hour_byte(hr: u8) -> Self {
        match (hr >> 5) & 0x03 {
            0 => Self::Fps24,
            1 => Self::Fps25,
            2 => Self::Fps30Drop,
            _ => Self::Fps30,
        }
    }
}

/// Source of the current time in milliseconds.
pub trait Clock {
    fn millis(&self) -> u32;
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.now.get()
    }
}

/// Scheduling state of one playing score.
#[derive(Debug, Clone)]
pub struct TimeKeeper {
    division: u16,
    /// Microseconds per quarter note
    tempo: u32,
    total_tick: u32,
    /// Tick of the last tempo change
    reference_tick: u32,
    /// Milliseconds elapsed up to `reference_tick`
    reference_ms: u32,
    prev_delta_time: u32,
    current_time: u32,
    start_time: u32,
    prev_time: u32,
    schedule_time: u32,
    /// Remaining wait captured by `stop_smf_timer`
    duration: u32,
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeKeeper {
    pub fn new() -> Self {
        Self {
            division: DEFAULT_DIVISION,
            tempo: DEFAULT_TEMPO,
            total_tick: 0,
            reference_tick: 0,
            reference_ms: 0,
            prev_delta_time: 0,
            current_time: 0,
            start_time: 0,
            prev_time: 0,
            schedule_time: 0,
            duration: 0,
        }
    }

    /// Restart the tick count with a new division and tempo.
    pub fn reset(&mut self, division: u16, tempo: u32) {
        self.set_division(division);
        self.set_tempo(tempo);
        self.total_tick = 0;
        self.reference_tick = 0;
        self.reference_ms = 0;
    }

    pub fn division(&self) -> u16 {
        self.division
    }

    pub fn set_division(&mut self, division: u16) {
        self.division = division;
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Change the tempo from the current tick on.
    pub fn set_tempo(&mut self, tempo: u32) {
        let tick = self.total_tick.wrapping_sub(self.reference_tick);
        self.reference_ms = self
            .reference_ms
            .wrapping_add(delta_time_to_ms(self.division, self.tempo, tick));
        self.reference_tick = self.total_tick;
        self.tempo = tempo;
    }

    pub fn total_tick(&self) -> u32 {
        self.total_tick
    }

    /// Advance the played position by `delta_time` ticks.
    pub fn forward(&mut self, delta_time: u32) {
        self.total_tick = self.total_tick.wrapping_add(delta_time);
    }

    /// Milliseconds from the current tick to `delta_time` ticks later.
    pub fn calculate_duration_ms(&self, delta_time: u32) -> u32 {
        let tick = self.total_tick.wrapping_sub(self.reference_tick);
        let last_ms = delta_time_to_ms(self.division, self.tempo, tick);
        let next_ms = delta_time_to_ms(self.division, self.tempo, tick.wrapping_add(delta_time));
        next_ms.wrapping_sub(last_ms)
    }

    /// Score time in milliseconds at `delta_time` ticks after the current tick.
    pub fn calculate_current_ms(&self, delta_time: u32) -> u32 {
        let tick = self.total_tick.wrapping_sub(self.reference_tick);
        self.reference_ms
            .wrapping_add(delta_time_to_ms(self.division, self.tempo, tick.wrapping_add(delta_time)))
    }

    /// Anchor the schedule at the current time.
    pub fn start_smf_timer(&mut self) {
        self.start_time = self.current_time;
        self.prev_time = self.current_time;
        self.schedule_time = self.current_time;
    }

    /// Remember how long the pending event still has to wait.
    pub fn stop_smf_timer(&mut self) {
        self.duration = self.schedule_time.wrapping_sub(self.current_time);
    }

    /// Re-arm the pending event relative to the current time.
    pub fn continue_smf_timer(&mut self) {
        self.schedule_time = self.current_time.wrapping_add(self.duration);
    }

    pub fn set_smf_duration(&mut self, duration: u32) {
        self.duration = duration;
    }

    /// Latch the clock reading used by the scheduling checks.
    pub fn set_current_time(&mut self, now_ms: u32) {
        self.current_time = now_ms;
    }

    pub fn current_time(&self) -> u32 {
        self.current_time
    }

    pub fn start_time(&self) -> u32 {
        self.start_time
    }

    /// Arm the next event `delta_time` ticks after the previous one.
    pub fn set_schedule_time(&mut self, delta_time: u32) {
        self.prev_time = self.schedule_time;
        self.prev_delta_time = delta_time;
        self.schedule_time = self
            .schedule_time
            .wrapping_add(self.calculate_duration_ms(delta_time));
    }

    pub fn schedule_time(&self) -> u32 {
        self.schedule_time
    }

    /// Whether `target_ms` lies before the score time of the armed event.
    pub fn is_before_scheduled_ms(&self, target_ms: u32) -> bool {
        target_ms < self.calculate_current_ms(self.prev_delta_time)
    }

    /// Shift the armed event so that score time `target_ms` is now.
    ///
    /// Only targets before the armed event are honoured.
    pub fn reschedule_time(&mut self, target_ms: u32) {
        if !self.is_before_scheduled_ms(target_ms) {
            return;
        }
        let current_ms = self
            .calculate_current_ms(0)
            .wrapping_add(self.current_time.wrapping_sub(self.prev_time));

        self.schedule_time = if target_ms < current_ms {
            self.schedule_time.wrapping_add(current_ms - target_ms)
        } else {
            self.schedule_time.wrapping_sub(target_ms - current_ms)
        };
    }

    /// Whether the armed event is due.
    pub fn is_scheduled_time(&self) -> bool {
        if self.schedule_time <= self.current_time {
            return true;
        }
        // the clock wrapped past a schedule time near the top of the range
        WRAP_SCHEDULE_MIN < self.schedule_time && self.current_time < WRAP_CURRENT_MAX
    }

    /// Ticks covered by `beats` MIDI beats (sixteenth notes).
    pub fn midi_beat_to_tick(&self, beats: u16) -> u32 {
        u32::from(self.division) * u32::from(beats) / 4
    }
}

/// Convert ticks to milliseconds.
///
/// `division` is either ticks per quarter note, or with the top bit set an
/// SMPTE format (negative frame rate in the high byte, ticks per frame in the
/// low byte). An unusable division returns `delta_time` unchanged.
///
/// # Example
///
/// ```
/// use yuru_score::time_keeper::delta_time_to_ms;
///
/// // 480 ticks at 96 ticks per beat and 120 BPM
/// assert_eq!(delta_time_to_ms(96, 500_000, 480), 2_499);
/// ```
pub fn delta_time_to_ms(division: u16, tempo: u32, delta_time: u32) -> u32 {
    if division == 0 {
        return delta_time;
    }
    let delta = u64::from(delta_time);
    if division & 0x8000 == 0 {
        let per_tick = u64::from(tempo / u32::from(division));
        return (per_tick * delta / 1000) as u32;
    }

    let frame_type = 256 - ((division >> 8) & 0xFF);
    let resolution = u64::from((division & 0xFF).max(1));
    let frame_us = match frame_type {
        24 => 1_000_000 / 24,
        25 => 1_000_000 / 25,
        29 => 1_001_000 / 30,
        30 => 1_000_000 / 30,
        _ => return delta_time,
    };
    (frame_us / resolution * delta / 1000) as u32
}

struct Mtc {
    rate: MtcRate,
    h: u64,
    m: u64,
    s: u64,
    f: u64,
}

impl Mtc {
    fn new(hr: u8, mn: u8, sc: u8, fr: u8) -> Self {
        let rate = MtcRate::from_hour_byte(hr);
        let m = u64::from(mn & 0x3F);
        let s = u64::from(sc & 0x3F);
        let mut f = u64::from(fr & 0x1F);
        // drop-frame numbering skips frames 0 and 1 at the start of most minutes
        if rate == MtcRate::Fps30Drop && s == 0 && m % 10 != 0 && f < 2 {
            f = 2;
        }
        Self {
            rate,
            h: u64::from(hr & 0x1F),
            m,
            s,
            f,
        }
    }

    fn seconds(&self) -> u64 {
        (self.h * 60 + self.m) * 60 + self.s
    }

    fn dropped(&self) -> u64 {
        (self.h * (60 - 6) + self.m - self.m / 10) * 2
    }
}

/// Frame count of an MTC time code.
pub fn mtc_to_frames(hr: u8, mn: u8, sc: u8, fr: u8) -> u32 {
    let mtc = Mtc::new(hr, mn, sc, fr);
    let frames = match mtc.rate {
        MtcRate::Fps24 => mtc.seconds() * 24 + mtc.f,
        MtcRate::Fps25 => mtc.seconds() * 25 + mtc.f,
        MtcRate::Fps30Drop => mtc.seconds() * 30 + mtc.f - mtc.dropped(),
        MtcRate::Fps30 => mtc.seconds() * 30 + mtc.f,
    };
    frames as u32
}

/// Milliseconds of an MTC time code.
pub fn mtc_to_ms(hr: u8, mn: u8, sc: u8, fr: u8) -> u32 {
    let mtc = Mtc::new(hr, mn, sc, fr);
    let frames = u64::from(mtc_to_frames(hr, mn, sc, fr));
    let ms = match mtc.rate {
        MtcRate::Fps24 => 1000 * frames / 24,
        MtcRate::Fps25 => 1000 * frames / 25,
        MtcRate::Fps30Drop => 1001 * frames / 30,
        MtcRate::Fps30 => 1000 * frames / 30,
    };
    ms as u32
}
