//! SFZ region model.
//!
//! A [`RegionBuilder`] receives the callbacks of an
//! [`SfzParser`](crate::parser::SfzParser) and turns the `<global>`,
//! `<group>` and `<region>` blocks into a flat list of [`Region`]s.
//!
//! # Inheritance
//!
//! Opcodes flow from `<global>` to `<group>` to `<region>`: each block starts
//! as a copy of its parent, so anything not set locally falls back to the
//! value inherited from above rather than a fixed default. A `<group>` that
//! closes without any `<region>` is itself played as a region.
//!
//! # Validity
//!
//! A value that does not parse or lies out of range, or a sample that does
//! not exist, drops the whole block. A dropped group takes its regions with it.

use crate::error::{Error, Result};
use crate::opcodes::{self, LoopMode, OpcodeId, OpcodeSpec, OPCODE_COUNT, UNSUPPORTED_OPCODES};
use crate::parser::{SfzHandler, SfzParser};
use crate::renderer::BYTES_PER_SAMPLE;
use crate::wav::{self, WavInfo};
use anyhow::Context;
use std::path::Path;
use yuru_score::midi::{INVALID_NOTE_NUMBER, NOTE_NUMBER_MAX, NOTE_NUMBER_MIN};
use yuru_score::path_utils::{folder_path, normalize_path};

/// A playable region, fixed once the instrument is loaded.
///
/// All byte positions are absolute file offsets and satisfy
/// `offset <= loop_start <= loop_end <= end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Path of the sample file
    pub sample: String,
    /// MIDI channel range, 0-based
    pub lochan: u8,
    pub hichan: u8,
    pub lokey: u8,
    pub hikey: u8,
    pub lovel: u8,
    pub hivel: u8,
    /// Key switch that must be the last one pressed, or
    /// [`INVALID_NOTE_NUMBER`] for none
    pub sw_last: u8,
    /// First byte to play
    pub offset: u64,
    /// One past the last byte to play
    pub end: u64,
    /// Passes through the loop in one-shot mode
    pub count: u32,
    pub loop_mode: LoopMode,
    pub loop_start: u64,
    pub loop_end: u64,
    /// PCM extent of the sample file
    pub pcm_offset: u64,
    pub pcm_size: u64,
    /// Set by `end=-1`: the region swallows its notes
    pub silence: bool,
    /// Group the region belongs to, 0 outside any group
    pub group_id: u32,
}

impl Region {
    /// Whether a note matches this region.
    pub fn matches(&self, sw_last: u8, note: u8, velocity: u8, channel: u8) -> bool {
        (self.sw_last == INVALID_NOTE_NUMBER || self.sw_last == sw_last)
            && (self.lochan..=self.hichan).contains(&channel)
            && (self.lokey..=self.hikey).contains(&note)
            && (self.lovel..=self.hivel).contains(&velocity)
    }

    pub fn is_one_shot(&self) -> bool {
        self.loop_mode == LoopMode::OneShot
    }

    /// Where playback of this region stops reading.
    pub fn read_limit(&self) -> u64 {
        match self.loop_mode {
            LoopMode::NoLoop => self.end,
            _ => self.loop_end,
        }
    }

    /// Lay out a region over the PCM data of its sample.
    ///
    /// Positions given in sample frames are clamped to the PCM data and
    /// turned into byte offsets. `end` and `loop_end` name the last frame to
    /// play, inclusive.
    pub(crate) fn layout(container: &OpcodeContainer, sample: String, info: WavInfo) -> Self {
        let size = BYTES_PER_SAMPLE as u64;
        let samples = info.pcm_size / size;
        let value = |id: OpcodeId| u64::from(container.get(id));
        let last_frame = |id: OpcodeId| {
            if samples == 0 {
                0
            } else if container.is_specified(id) {
                info.pcm_offset + (value(id).min(samples - 1) + 1) * size
            } else {
                info.pcm_offset + info.pcm_size
            }
        };
        let byte = |id: OpcodeId| u8::try_from(container.get(id)).unwrap_or(INVALID_NOTE_NUMBER);
        let channel = |id: OpcodeId| u8::try_from(container.get(id).saturating_sub(1)).unwrap_or(0);

        let end = last_frame(OpcodeId::End);
        let offset = (info.pcm_offset + value(OpcodeId::Offset).min(samples) * size).min(end);
        let loop_mode = if container.is_specified(OpcodeId::Count) {
            LoopMode::OneShot
        } else {
            LoopMode::from_u32(container.get(OpcodeId::LoopMode)).unwrap_or_default()
        };
        // offset <= loop_start <= loop_end <= end
        let loop_end = last_frame(OpcodeId::LoopEnd).min(end).max(offset);
        let loop_start = (info.pcm_offset + value(OpcodeId::LoopStart).min(samples) * size)
            .max(offset)
            .min(loop_end);

        Self {
            sample,
            lochan: channel(OpcodeId::Lochan),
            hichan: channel(OpcodeId::Hichan),
            lokey: byte(OpcodeId::Lokey),
            hikey: byte(OpcodeId::Hikey),
            lovel: byte(OpcodeId::Lovel),
            hivel: byte(OpcodeId::Hivel),
            sw_last: byte(OpcodeId::SwLast),
            offset,
            end,
            count: container.get(OpcodeId::Count),
            loop_mode,
            loop_start,
            loop_end,
            pcm_offset: info.pcm_offset,
            pcm_size: info.pcm_size,
            silence: container.silence,
            group_id: container.group_id,
        }
    }
}

/// Opcode values of the block being parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpcodeContainer {
    pub is_valid: bool,
    pub group_id: u32,
    pub sample: String,
    pub silence: bool,
    /// One bit per [`OpcodeId`] set explicitly
    pub specified: u32,
    pub values: [u32; OPCODE_COUNT],
}

impl OpcodeContainer {
    /// The baseline every instrument starts from.
    fn baseline() -> Self {
        let mut container = Self {
            is_valid: true,
            group_id: 0,
            sample: String::new(),
            silence: false,
            specified: 0,
            values: [0; OPCODE_COUNT],
        };
        let invalid = u32::from(INVALID_NOTE_NUMBER);
        for (id, value) in [
            (OpcodeId::Lokey, u32::from(NOTE_NUMBER_MIN)),
            (OpcodeId::Hikey, u32::from(NOTE_NUMBER_MAX)),
            (OpcodeId::Lochan, 1),
            (OpcodeId::Hichan, 16),
            (OpcodeId::Lovel, 0),
            (OpcodeId::Hivel, 127),
            (OpcodeId::SwLokey, u32::from(NOTE_NUMBER_MIN)),
            (OpcodeId::SwHikey, u32::from(NOTE_NUMBER_MAX)),
            (OpcodeId::SwLast, invalid),
            (OpcodeId::Count, 1),
            (OpcodeId::LoopMode, LoopMode::NoLoop as u32),
            (OpcodeId::SwDefault, invalid),
        ] {
            container.values[id.index()] = value;
        }
        container
    }

    pub fn get(&self, id: OpcodeId) -> u32 {
        self.values[id.index()]
    }

    pub fn is_specified(&self, id: OpcodeId) -> bool {
        self.specified & id.bit() != 0
    }
}

/// Key switch range and the last key switch pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySwitch {
    pub lokey: u8,
    pub hikey: u8,
    pub last: u8,
}

impl Default for KeySwitch {
    fn default() -> Self {
        Self {
            lokey: NOTE_NUMBER_MIN,
            hikey: NOTE_NUMBER_MAX,
            last: INVALID_NOTE_NUMBER,
        }
    }
}

impl KeySwitch {
    /// Remember `note` if it lies in the key switch range.
    pub fn press(&mut self, note: u8) {
        if (self.lokey..=self.hikey).contains(&note) {
            self.last = note;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header {
    Global,
    Group,
    Control,
    Region,
    Unsupported,
}

impl Header {
    fn from_name(name: &str) -> Self {
        match name {
            "global" => Self::Global,
            "group" => Self::Group,
            "control" => Self::Control,
            "region" => Self::Region,
            _ => Self::Unsupported,
        }
    }
}

/// Builds regions from parser callbacks.
#[derive(Debug)]
pub struct RegionBuilder {
    /// Folder that sample paths are relative to
    folder: String,
    regions: Vec<Region>,
    global: OpcodeContainer,
    group: OpcodeContainer,
    /// Block being parsed
    region: OpcodeContainer,
    header: Header,
    group_counter: u32,
    /// Regions seen in the current group, `None` outside a group
    regions_in_group: Option<u32>,
    key_switch: KeySwitch,
}

impl RegionBuilder {
    /// Builder for the SFZ file at `sfz_path`.
    pub fn new(sfz_path: &str) -> Self {
        let baseline = OpcodeContainer::baseline();
        Self {
            folder: folder_path(sfz_path).to_string(),
            regions: Vec::new(),
            global: baseline.clone(),
            group: baseline.clone(),
            region: baseline,
            header: Header::Unsupported,
            group_counter: 0,
            regions_in_group: None,
            key_switch: KeySwitch::default(),
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Key switch state declared by the instrument.
    pub fn key_switch(&self) -> KeySwitch {
        self.key_switch
    }

    pub fn finish(self) -> (Vec<Region>, KeySwitch) {
        (self.regions, self.key_switch)
    }

    fn build_region(&self, container: &OpcodeContainer) -> Region {
        let sample = normalize_path(&container.sample);
        let info = match wav::probe(&sample) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("cannot open sample '{}': {}", sample, e);
                WavInfo::default()
            }
        };
        let region = Region::layout(container, sample, info);
        log::debug!(
            "region {}: \"{}\" key {}..={} sw {} offset {} end {} {} x{} loop {}..{}",
            self.regions.len() + 1,
            region.sample,
            region.lokey,
            region.hikey,
            region.sw_last,
            region.offset,
            region.end,
            region.loop_mode,
            region.count,
            region.loop_start,
            region.loop_end
        );
        region
    }

    /// Play a group that closed without regions as a region.
    fn promote_empty_group(&mut self) {
        if self.regions_in_group == Some(0) && self.group.is_valid {
            let region = self.build_region(&self.group);
            self.regions.push(region);
        }
    }

    fn apply(&mut self, spec: &OpcodeSpec, name: &str, value: &str) -> Result<()> {
        let Some(parse) = spec.parse else {
            let sample = normalize_path(&format!("{}{}", self.folder, value.replace('\\', "/")));
            let exists = Path::new(&sample).is_file();
            self.region.sample = sample;
            self.region.specified |= spec.id.bit();
            if !exists {
                return Err(Error::FileNotFound(self.region.sample.clone().into()));
            }
            return Ok(());
        };

        if spec.id == OpcodeId::End && value == "-1" {
            self.region.silence = true;
            return Ok(());
        }
        let parsed = parse(value).ok_or_else(|| Error::InvalidValue {
            opcode: name.to_string(),
            value: value.to_string(),
        })?;
        let value = u32::try_from(parsed)
            .ok()
            .filter(|v| (spec.min..=spec.max).contains(v))
            .ok_or_else(|| Error::OutOfRange {
                opcode: name.to_string(),
                value: value.to_string(),
            })?;

        self.region.values[spec.id.index()] = value;
        self.region.specified |= spec.id.bit();
        let note = u8::try_from(value).unwrap_or(INVALID_NOTE_NUMBER);
        match spec.id {
            OpcodeId::SwLokey => self.key_switch.lokey = note,
            OpcodeId::SwHikey => self.key_switch.hikey = note,
            OpcodeId::SwDefault => self.key_switch.last = note,
            _ => {}
        }
        Ok(())
    }
}

impl SfzHandler for RegionBuilder {
    fn start_sfz(&mut self) {
        let folder = std::mem::take(&mut self.folder);
        *self = Self {
            folder,
            ..Self::new("")
        };
    }

    fn end_sfz(&mut self) {
        self.header = Header::Unsupported;
        self.promote_empty_group();
        self.regions_in_group = None;
    }

    fn start_header(&mut self, name: &str) {
        self.header = Header::from_name(name);
        if self.header != Header::Region {
            self.promote_empty_group();
        }

        match self.header {
            Header::Global => {
                self.region = self.global.clone();
                self.regions_in_group = None;
            }
            Header::Group => {
                self.group_counter += 1;
                self.region = self.global.clone();
                self.region.group_id = self.group_counter;
                self.regions_in_group = Some(0);
            }
            Header::Region => {
                self.region = self.group.clone();
                if let Some(count) = self.regions_in_group.as_mut() {
                    *count += 1;
                }
            }
            Header::Control => self.regions_in_group = None,
            Header::Unsupported => {
                log::warn!("unsupported header <{}>", name);
                self.regions_in_group = None;
            }
        }
    }

    fn end_header(&mut self, _name: &str) {
        match self.header {
            Header::Global => {
                // regions outside any group inherit from global directly
                self.global = self.region.clone();
                self.group = self.region.clone();
            }
            Header::Group => self.group = self.region.clone(),
            Header::Region => {
                if self.region.is_valid {
                    let region = self.build_region(&self.region);
                    self.regions.push(region);
                } else {
                    log::warn!("invalid region dropped");
                }
            }
            Header::Control | Header::Unsupported => {}
        }
    }

    fn opcode(&mut self, name: &str, value: &str) {
        let mut known = false;
        for spec in opcodes::lookup(name) {
            known = true;
            if let Err(e) = self.apply(spec, name, value) {
                log::warn!("<{:?}>: {}", self.header, e);
                self.region.is_valid = false;
            }
        }
        if !known {
            if UNSUPPORTED_OPCODES.contains(&name) {
                log::debug!("unsupported opcode '{}={}'", name, value);
            } else {
                log::debug!("unknown opcode '{}={}'", name, value);
            }
        }
    }
}

/// An SFZ instrument ready to play.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SfzInstrument {
    /// Path to the source SFZ file.
    pub source_file: String,
    /// Regions in declaration order.
    pub regions: Vec<Region>,
    /// Key switch state declared by the instrument.
    pub key_switch: KeySwitch,
}

impl SfzInstrument {
    /// Load the instrument at `sfz_path`.
    ///
    /// Sample paths are resolved against the folder of `sfz_path`, including
    /// those written in included files.
    pub fn load(sfz_path: &str) -> anyhow::Result<Self> {
        let mut builder = RegionBuilder::new(sfz_path);
        SfzParser::new()
            .parse_file(sfz_path, &mut builder)
            .with_context(|| format!("Failed to parse SFZ file: {}", sfz_path))?;
        let (regions, key_switch) = builder.finish();
        log::info!("Loaded {} regions from {}", regions.len(), sfz_path);
        Ok(Self {
            source_file: sfz_path.to_string(),
            regions,
            key_switch,
        })
    }

    /// Build an instrument from SFZ text as if it were read from `sfz_path`.
    pub fn from_text(text: &str, sfz_path: &str) -> Self {
        let mut builder = RegionBuilder::new(sfz_path);
        SfzParser::new().parse_str(text, sfz_path, &mut builder);
        let (regions, key_switch) = builder.finish();
        Self {
            source_file: sfz_path.to_string(),
            regions,
            key_switch,
        }
    }

    /// Get the number of regions in this instrument.
    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    /// First region matching a note, in declaration order.
    pub fn find_region(&self, sw_last: u8, note: u8, velocity: u8, channel: u8) -> Option<usize> {
        self.regions
            .iter()
            .position(|region| region.matches(sw_last, note, velocity, channel))
    }

    /// Get a human-readable info string.
    pub fn info(&self) -> String {
        format!(
            "SFZ Instrument: {} regions from {}",
            self.regions.len(),
            self.source_file
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::tests::write_wav;
    use std::fs;

    fn instrument(dir: &Path, text: &str) -> SfzInstrument {
        fs::write(dir.join("raw.raw"), vec![0u8; 64]).unwrap();
        let path = dir.join("inst.sfz");
        fs::write(&path, text).unwrap();
        SfzInstrument::load(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_lokey_note_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.raw"), vec![0u8; 16]).unwrap();
        let inst = instrument(dir.path(), "<region> sample=test.raw lokey=C-1");
        assert_eq!(inst.num_regions(), 1);
        assert_eq!(inst.regions[0].lokey, 0);
        assert_eq!(inst.regions[0].hikey, 127);
    }

    #[test]
    fn test_end_minus_one_is_silence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.raw"), vec![0u8; 16]).unwrap();
        let inst = instrument(dir.path(), "<region> sample=test.raw end=-1");
        assert_eq!(inst.num_regions(), 1);
        assert!(inst.regions[0].silence);
        // the whole sample stays in range
        assert_eq!(inst.regions[0].end, 16);
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(dir.path(), "<region> sample=raw.raw");
        let region = &inst.regions[0];
        assert_eq!((region.lochan, region.hichan), (0, 15));
        assert_eq!((region.lovel, region.hivel), (0, 127));
        assert_eq!(region.sw_last, INVALID_NOTE_NUMBER);
        assert_eq!(region.loop_mode, LoopMode::NoLoop);
        assert_eq!(region.count, 1);
        assert_eq!((region.offset, region.end), (0, 64));
        assert_eq!((region.loop_start, region.loop_end), (0, 64));
        assert_eq!(region.group_id, 0);
        assert!(region.sample.ends_with("/raw.raw"));
        assert_eq!(inst.key_switch, KeySwitch::default());
    }

    #[test]
    fn test_inheritance() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<global> lovel=10 sample=raw.raw\n\
             <group> lokey=40 hikey=50\n\
             <region>\n\
             <region> hikey=45\n\
             <group> key=c4\n\
             <region> lovel=20\n",
        );
        let ranges: Vec<_> = inst
            .regions
            .iter()
            .map(|r| (r.lokey, r.hikey, r.lovel, r.group_id))
            .collect();
        assert_eq!(ranges, [(40, 50, 10, 1), (40, 45, 10, 1), (60, 60, 20, 2)]);
    }

    #[test]
    fn test_group_without_region() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<group> sample=raw.raw lokey=1 hikey=2\n\
             <group> sample=raw.raw lokey=3\n\
             <region> hikey=4\n\
             <group> sample=raw.raw lokey=5\n",
        );
        let keys: Vec<_> = inst.regions.iter().map(|r| (r.lokey, r.hikey, r.group_id)).collect();
        assert_eq!(keys, [(1, 2, 1), (3, 4, 2), (5, 127, 3)]);
    }

    #[test]
    fn test_invalid_regions_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<region> sample=raw.raw lokey=H4\n\
             <region> sample=raw.raw hikey=128\n\
             <region> sample=missing.raw\n\
             <region> sample=raw.raw loop_mode=bounce\n\
             <region> sample=raw.raw lochan=17\n\
             <region> sample=raw.raw lokey=7\n",
        );
        assert_eq!(inst.num_regions(), 1);
        assert_eq!(inst.regions[0].lokey, 7);
    }

    #[test]
    fn test_invalid_group_drops_its_regions() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<group> lokey=x\n<region> sample=raw.raw\n<group>\n<region> sample=raw.raw\n",
        );
        assert_eq!(inst.num_regions(), 1);
        assert_eq!(inst.regions[0].group_id, 2);
    }

    #[test]
    fn test_unsupported_opcodes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<control> default_path=x/\n<region> sample=raw.raw seq_length=2 lorand=0.5 volume=-3\n",
        );
        assert_eq!(inst.num_regions(), 1);
    }

    #[test]
    fn test_wave_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 100);
        let info = wav::probe(dir.path().join("a.wav")).unwrap();
        let base = info.pcm_offset;

        let inst = instrument(
            dir.path(),
            "<region> sample=a.wav offset=10 end=49 loop_mode=loop_continuous loop_start=20 loop_end=500",
        );
        let region = &inst.regions[0];
        assert_eq!(region.pcm_offset, base);
        assert_eq!(region.pcm_size, 400);
        assert_eq!(region.offset, base + 40);
        assert_eq!(region.end, base + 200);
        assert_eq!(region.loop_mode, LoopMode::LoopContinuous);
        assert_eq!(region.loop_start, base + 80);
        // loop end is clamped to the sample, then to the region end
        assert_eq!(region.loop_end, base + 200);
        assert_eq!(region.read_limit(), base + 200);
    }

    #[test]
    fn test_positions_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<region> sample=raw.raw offset=100 end=1000 loop_start=2 loop_end=3",
        );
        let region = &inst.regions[0];
        // 64 bytes hold 16 frames
        assert_eq!(region.offset, 64);
        assert_eq!(region.end, 64);
        assert_eq!(region.loop_start, 64);
        assert_eq!(region.loop_end, 64);
    }

    #[test]
    fn test_loop_points_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<region> sample=raw.raw end=9 loop_mode=loop_continuous loop_start=12\n\
             <region> sample=raw.raw loop_start=10 loop_end=3\n\
             <region> sample=raw.raw offset=6 loop_start=2 loop_end=4\n\
             <region> sample=raw.raw offset=12 end=5\n",
        );
        assert_eq!(inst.regions.len(), 4);
        let positions: Vec<_> = inst
            .regions
            .iter()
            .map(|r| (r.offset, r.loop_start, r.loop_end, r.end))
            .collect();
        assert_eq!(
            positions,
            vec![(0, 40, 40, 40), (0, 16, 16, 64), (24, 24, 24, 64), (24, 24, 24, 24)]
        );
        for r in &inst.regions {
            assert!(r.offset <= r.loop_start);
            assert!(r.loop_start <= r.loop_end);
            assert!(r.loop_end <= r.end);
            assert!(r.end <= r.pcm_offset + r.pcm_size);
        }
    }

    #[test]
    fn test_count_makes_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<region> sample=raw.raw count=2 loop_mode=loop_sustain\n<region> sample=raw.raw loopmode=one_shot",
        );
        assert_eq!(inst.regions[0].loop_mode, LoopMode::OneShot);
        assert_eq!(inst.regions[0].count, 2);
        assert_eq!(inst.regions[1].loop_mode, LoopMode::OneShot);
        assert_eq!(inst.regions[1].count, 1);
        assert_eq!(inst.regions[1].read_limit(), inst.regions[1].loop_end);
    }

    #[test]
    fn test_key_switch() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<global> sw_lokey=24 sw_hikey=b1 sw_default=c1\n\
             <region> sample=raw.raw sw_last=24\n\
             <region> sample=raw.raw sw_last=25\n",
        );
        assert_eq!(
            inst.key_switch,
            KeySwitch {
                lokey: 24,
                hikey: 35,
                last: 24
            }
        );
        assert_eq!(inst.find_region(24, 60, 100, 0), Some(0));
        assert_eq!(inst.find_region(25, 60, 100, 0), Some(1));
        assert_eq!(inst.find_region(INVALID_NOTE_NUMBER, 60, 100, 0), None);

        let mut key_switch = inst.key_switch;
        key_switch.press(25);
        assert_eq!(key_switch.last, 25);
        key_switch.press(60);
        assert_eq!(key_switch.last, 25);
    }

    #[test]
    fn test_channel_and_velocity_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let inst = instrument(
            dir.path(),
            "<region> sample=raw.raw lochan=2 hichan=3 lovel=64 hivel=100 lokey=10 hikey=20\n\
             <region> sample=raw.raw\n",
        );
        let region = &inst.regions[0];
        assert_eq!((region.lochan, region.hichan), (1, 2));
        assert!(region.matches(INVALID_NOTE_NUMBER, 10, 64, 1));
        assert!(region.matches(INVALID_NOTE_NUMBER, 20, 100, 2));
        assert!(!region.matches(INVALID_NOTE_NUMBER, 9, 64, 1));
        assert!(!region.matches(INVALID_NOTE_NUMBER, 21, 64, 1));
        assert!(!region.matches(INVALID_NOTE_NUMBER, 10, 63, 1));
        assert!(!region.matches(INVALID_NOTE_NUMBER, 10, 101, 1));
        assert!(!region.matches(INVALID_NOTE_NUMBER, 10, 64, 0));
        assert!(!region.matches(INVALID_NOTE_NUMBER, 10, 64, 3));

        // first match wins, the catch-all comes second
        assert_eq!(inst.find_region(INVALID_NOTE_NUMBER, 15, 80, 1), Some(0));
        assert_eq!(inst.find_region(INVALID_NOTE_NUMBER, 15, 80, 0), Some(1));
    }

    #[test]
    fn test_sample_in_include_and_define() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("parts")).unwrap();
        fs::create_dir(dir.path().join("samples")).unwrap();
        fs::write(dir.path().join("samples/x.raw"), vec![0u8; 8]).unwrap();
        fs::write(
            dir.path().join("parts/regions.sfz"),
            "<region> sample=$DIR\\x.raw key=$KEY\n",
        )
        .unwrap();
        let inst = instrument(
            dir.path(),
            "#define $DIR samples\n#define $KEY 62\n#include \"parts/regions.sfz\"\n",
        );
        assert_eq!(inst.num_regions(), 1);
        assert!(inst.regions[0].sample.ends_with("/samples/x.raw"));
        assert_eq!((inst.regions[0].lokey, inst.regions[0].hikey), (62, 62));
    }

    #[test]
    fn test_loading_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 50);
        let text = "<group> sw_default=30\n<region> sample=a.wav loop_mode=loop_continuous\n<group> sample=raw.raw\n";
        let first = instrument(dir.path(), text);
        let second = instrument(dir.path(), text);
        assert_eq!(first.num_regions(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_sfz_file() {
        let err = SfzInstrument::load("/nonexistent/inst.sfz").unwrap_err();
        assert!(err.to_string().contains("Failed to parse SFZ file"));
    }

    #[test]
    fn test_region_without_sample() {
        let inst = SfzInstrument::from_text("<region> lokey=1", "mem.sfz");
        assert_eq!(inst.num_regions(), 1);
        let region = &inst.regions[0];
        assert_eq!((region.pcm_size, region.end, region.loop_end), (0, 0, 0));
        assert!(inst.info().contains("1 regions"));
    }
}
