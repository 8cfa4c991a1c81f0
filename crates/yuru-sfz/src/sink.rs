//! SFZ sampler at the end of a filter chain.

use crate::error::Result;
use crate::opcodes::LoopMode;
use crate::region::{KeySwitch, Region, SfzInstrument};
use crate::renderer::{PcmMixer, PcmRenderer, FRAME_SIZE, VOLUME_MAX, VOLUME_MIN};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use yuru_score::filter::{Filter, ParamId, ParamValue, MIDI_CHANNELS, PARAMID_OUTPUT_LEVEL};
use yuru_score::midi::{CC_ALL_NOTES_OFF, NOTE_NUMBER_MAX};

/// Frames queued when a voice starts.
pub const PRELOAD_FRAMES: usize = 3;
/// Frames queued per voice on every update.
pub const LOAD_FRAMES: usize = 3;

/// One sounding voice.
#[derive(Debug)]
struct PlaybackUnit {
    note: u8,
    channel: u8,
    /// `None` once stopped; the slot may then be reused
    render_channel: Option<usize>,
    /// Index into the instrument's regions
    region: usize,
    file: Option<BufReader<File>>,
    /// Byte position of `file`
    position: u64,
    /// Completed passes through the loop
    loop_count: u32,
}

impl PlaybackUnit {
    fn is_active(&self) -> bool {
        self.render_channel.is_some()
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(position))?;
        }
        self.position = position;
        Ok(())
    }

    /// Read at most one frame, stopping at `limit`.
    fn read_block(&mut self, limit: u64) -> Result<Vec<u8>> {
        let len = limit.saturating_sub(self.position).min(FRAME_SIZE as u64);
        let mut buffer = Vec::with_capacity(len as usize);
        if let Some(file) = self.file.as_mut() {
            file.by_ref().take(len).read_to_end(&mut buffer)?;
        }
        if (buffer.len() as u64) < len {
            log::warn!("sample ends early at {}", self.position + buffer.len() as u64);
            // treat a short file as reaching the limit
            self.position = limit;
        } else {
            self.position += len;
        }
        Ok(buffer)
    }
}

/// Plays an [`SfzInstrument`] through a [`PcmRenderer`].
///
/// The instrument is loaded by [`Filter::begin`]. Each note-on picks the
/// first region that matches its key switch, channel, key and velocity and
/// starts a voice on a free render channel; [`Filter::update`] keeps every
/// voice's channel fed.
///
/// # Example
///
/// ```no_run
/// use yuru_score::filter::Filter;
/// use yuru_sfz::SfzSink;
///
/// let mut sink = SfzSink::new("piano/piano.sfz");
/// if sink.begin() {
///     sink.send_note_on(60, 100, 0);
///     loop {
///         sink.update();
///         let frame = sink.renderer_mut().render();
///         // hand `frame` to the audio device
///         # let _ = frame;
///     }
/// }
/// ```
#[derive(Debug)]
pub struct SfzSink<R = PcmMixer> {
    path: String,
    instrument: SfzInstrument,
    units: Vec<PlaybackUnit>,
    key_switch: KeySwitch,
    renderer: R,
    /// Output level in tenths of a dB
    volume: i32,
}

impl SfzSink<PcmMixer> {
    pub fn new(sfz_path: impl Into<String>) -> Self {
        Self::with_renderer(sfz_path, PcmMixer::new())
    }
}

impl<R: PcmRenderer> SfzSink<R> {
    pub fn with_renderer(sfz_path: impl Into<String>, renderer: R) -> Self {
        Self {
            path: sfz_path.into(),
            instrument: SfzInstrument::default(),
            units: Vec::new(),
            key_switch: KeySwitch::default(),
            renderer,
            volume: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn instrument(&self) -> &SfzInstrument {
        &self.instrument
    }

    pub fn regions(&self) -> &[Region] {
        &self.instrument.regions
    }

    pub fn key_switch(&self) -> KeySwitch {
        self.key_switch
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Number of voices playing.
    pub fn active_voices(&self) -> usize {
        self.units.iter().filter(|unit| unit.is_active()).count()
    }

    fn is_one_shot_playing(&self, channel: u8) -> bool {
        self.units
            .iter()
            .any(|unit| unit.is_active() && unit.channel == channel && self.instrument.regions[unit.region].is_one_shot())
    }

    fn start_playback(&mut self, region_index: usize, note: u8, channel: u8) -> Result<()> {
        let region = &self.instrument.regions[region_index];
        let mut file = BufReader::new(File::open(&region.sample)?);
        file.seek(SeekFrom::Start(region.offset))?;
        let render_channel = self.renderer.allocate_channel()?;

        let unit = PlaybackUnit {
            note,
            channel,
            render_channel: Some(render_channel),
            region: region_index,
            file: Some(file),
            position: region.offset,
            loop_count: 0,
        };
        let slot = match self.units.iter().position(|unit| !unit.is_active()) {
            Some(slot) => {
                self.units[slot] = unit;
                slot
            }
            None => {
                self.units.push(unit);
                self.units.len() - 1
            }
        };
        log::debug!(
            "play note {} channel {}: region {} on render channel {}",
            note,
            channel,
            region_index + 1,
            render_channel
        );

        self.continue_playback(slot, PRELOAD_FRAMES);
        Ok(())
    }

    fn stop_playback(&mut self, slot: usize) {
        let unit = &mut self.units[slot];
        if let Some(render_channel) = unit.render_channel.take() {
            self.renderer.deallocate_channel(render_channel);
            log::debug!("stop note {} channel {}", unit.note, unit.channel);
        }
        unit.file = None;
    }

    /// Feed up to `frames` frames of a voice to its render channel.
    ///
    /// Before each frame the voice stops at the end of a non-looping region
    /// or wraps to the loop start, and a one-shot voice stops once it has
    /// been through the loop `count` times.
    fn continue_playback(&mut self, slot: usize, frames: usize) {
        for _ in 0..frames {
            let unit = &mut self.units[slot];
            let Some(render_channel) = unit.render_channel else {
                return;
            };
            let region = &self.instrument.regions[unit.region];

            if region.loop_mode == LoopMode::NoLoop {
                if unit.position >= region.end {
                    log::trace!("note {}: end of region", unit.note);
                    self.stop_playback(slot);
                    return;
                }
            } else if unit.position >= region.loop_end {
                if region.loop_start >= region.loop_end {
                    log::trace!("note {}: empty loop", unit.note);
                    self.stop_playback(slot);
                    return;
                }
                if let Err(e) = unit.seek(region.loop_start) {
                    log::error!("{}: {}", region.sample, e);
                    self.stop_playback(slot);
                    return;
                }
                unit.loop_count += 1;
            }

            if region.is_one_shot() && unit.loop_count >= region.count {
                log::trace!("note {}: one shot done", unit.note);
                self.stop_playback(slot);
                return;
            }

            if self.renderer.writable_size(render_channel) < FRAME_SIZE {
                return;
            }
            match unit.read_block(region.read_limit()) {
                Ok(block) => {
                    if !block.is_empty() && !self.renderer.write(render_channel, &block) {
                        log::warn!("render channel {} refused {} bytes", render_channel, block.len());
                    }
                }
                Err(e) => {
                    log::error!("{}: {}", region.sample, e);
                    self.stop_playback(slot);
                    return;
                }
            }
        }
    }

    fn load_sound(&mut self, frames: usize) {
        for slot in 0..self.units.len() {
            if self.units[slot].is_active() {
                self.continue_playback(slot, frames);
            }
        }
    }

    /// Stop every voice on `channel` that note-off can stop.
    fn stop_channel(&mut self, channel: u8) {
        for slot in 0..self.units.len() {
            let unit = &self.units[slot];
            if unit.is_active() && unit.channel == channel && !self.instrument.regions[unit.region].is_one_shot() {
                self.stop_playback(slot);
            }
        }
    }
}

impl<R: PcmRenderer> Filter for SfzSink<R> {
    fn begin(&mut self) -> bool {
        for slot in 0..self.units.len() {
            self.stop_playback(slot);
        }
        self.units.clear();

        self.instrument = match SfzInstrument::load(&self.path) {
            Ok(instrument) => instrument,
            Err(e) => {
                log::error!("{:#}", e);
                return false;
            }
        };
        self.key_switch = self.instrument.key_switch;
        self.renderer.begin()
    }

    fn update(&mut self) {
        self.load_sound(LOAD_FRAMES);
    }

    fn is_available(&self, param_id: ParamId) -> bool {
        param_id == PARAMID_OUTPUT_LEVEL
    }

    fn get_param(&self, param_id: ParamId) -> Option<ParamValue> {
        (param_id == PARAMID_OUTPUT_LEVEL).then_some(ParamValue::Int(i64::from(self.volume)))
    }

    fn set_param(&mut self, param_id: ParamId, value: i64) -> bool {
        if param_id != PARAMID_OUTPUT_LEVEL {
            return false;
        }
        // clamped in i64, so the cast cannot truncate
        self.volume = value.clamp(i64::from(VOLUME_MIN), i64::from(VOLUME_MAX)) as i32;
        self.renderer.set_volume(self.volume, 0, 0);
        true
    }

    fn send_note_on(&mut self, note: u8, velocity: u8, channel: u8) -> bool {
        if note > NOTE_NUMBER_MAX || channel >= MIDI_CHANNELS {
            return false;
        }
        if velocity == 0 {
            return self.send_note_off(note, velocity, channel);
        }
        self.key_switch.press(note);

        if self.is_one_shot_playing(channel) {
            log::debug!("channel {}: one shot playing, note {} ignored", channel, note);
            return true;
        }

        let Some(index) = self
            .instrument
            .find_region(self.key_switch.last, note, velocity, channel)
        else {
            log::debug!("no region for note {} velocity {} channel {}", note, velocity, channel);
            return false;
        };
        if self.instrument.regions[index].silence {
            log::trace!("note {}: silent region", note);
            return true;
        }

        match self.start_playback(index, note, channel) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("note {} dropped: {}", note, e);
                false
            }
        }
    }

    /// Stop the first voice playing `note` on `channel`. One-shot voices
    /// play to completion.
    fn send_note_off(&mut self, note: u8, _velocity: u8, channel: u8) -> bool {
        if note > NOTE_NUMBER_MAX || channel >= MIDI_CHANNELS {
            return false;
        }
        let found = self.units.iter().position(|unit| {
            unit.is_active()
                && unit.note == note
                && unit.channel == channel
                && !self.instrument.regions[unit.region].is_one_shot()
        });
        if let Some(slot) = found {
            self.stop_playback(slot);
        }
        true
    }

    fn send_control_change(&mut self, control: u8, _value: u8, channel: u8) -> bool {
        if channel >= MIDI_CHANNELS {
            return false;
        }
        if control == CC_ALL_NOTES_OFF {
            self.stop_channel(channel);
        }
        true
    }
}
