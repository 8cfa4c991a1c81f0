//! PCM output.
//!
//! Voices write 16-bit stereo PCM into render channels; the renderer mixes
//! the channels into fixed-size frames. [`PcmMixer`] does this in memory so
//! the frames can go to a file, a sound card or a test assertion.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Bytes per stereo frame of 16-bit samples.
pub const BYTES_PER_SAMPLE: usize = 4;
/// Stereo samples per rendered frame (5 ms at 48 kHz).
pub const SAMPLES_PER_FRAME: usize = 240;
/// Bytes per rendered frame.
pub const FRAME_SIZE: usize = SAMPLES_PER_FRAME * BYTES_PER_SAMPLE;
/// Render channels, which bounds the number of simultaneous voices.
pub const RENDER_CHANNELS: usize = 4;
/// Cache of each render channel in bytes.
pub const CACHE_SIZE: usize = 24 * 1024;

/// Output level bounds in tenths of a dB.
pub const VOLUME_MIN: i32 = -1020;
pub const VOLUME_MAX: i32 = 120;

/// Sink for the PCM of active voices.
pub trait PcmRenderer {
    /// Prepare for output.
    fn begin(&mut self) -> bool {
        true
    }

    /// Reserve a render channel for a new voice.
    fn allocate_channel(&mut self) -> Result<usize>;

    /// Release a channel. Data already written may still be played out.
    fn deallocate_channel(&mut self, channel: usize);

    /// Bytes `channel` can accept right now.
    fn writable_size(&self, channel: usize) -> usize;

    /// Queue PCM on `channel`. Refused unless all of `data` fits.
    fn write(&mut self, channel: usize, data: &[u8]) -> bool;

    /// Set the output level in tenths of a dB.
    fn set_volume(&mut self, master: i32, player0: i32, player1: i32);
}

/// Lifecycle of a render channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Unallocated,
    /// Allocated, waiting for its first data
    Allocating,
    Allocated,
    /// Released; fades out on the next frame
    Deallocating,
    /// Faded out; drains silently
    Deallocated,
}

#[derive(Debug, Default)]
struct RenderChannel {
    state: ChannelState,
    cache: VecDeque<u8>,
}

impl RenderChannel {
    fn writable(&self) -> usize {
        // one byte stays free, as in a classic ring buffer
        CACHE_SIZE - 1 - self.cache.len()
    }

    /// Pop up to `len` bytes as samples, zero padded to a full frame.
    fn read_frame(&mut self, len: usize) -> Vec<i16> {
        let mut samples = vec![0i16; FRAME_SIZE / 2];
        let bytes: Vec<u8> = self.cache.drain(..len.min(self.cache.len())).collect();
        for (sample, pair) in samples.iter_mut().zip(bytes.chunks_exact(2)) {
            *sample = i16::from_le_bytes([pair[0], pair[1]]);
        }
        samples
    }
}

/// In-memory mixer over [`RENDER_CHANNELS`] channels.
///
/// Each call to [`PcmMixer::render`] produces one frame of
/// [`SAMPLES_PER_FRAME`] interleaved stereo samples. Only as much data as
/// every busy channel can supply is consumed, so voices stay aligned; the
/// rest of the frame is silence.
#[derive(Debug)]
pub struct PcmMixer {
    channels: Vec<RenderChannel>,
    volume: (i32, i32, i32),
    frames: u64,
}

impl Default for PcmMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl PcmMixer {
    pub fn new() -> Self {
        Self {
            channels: (0..RENDER_CHANNELS).map(|_| RenderChannel::default()).collect(),
            volume: (0, 0, 0),
            frames: 0,
        }
    }

    pub fn channel_state(&self, channel: usize) -> Option<ChannelState> {
        self.channels.get(channel).map(|ch| ch.state)
    }

    /// Bytes queued on `channel`.
    pub fn readable_size(&self, channel: usize) -> usize {
        self.channels.get(channel).map_or(0, |ch| ch.cache.len())
    }

    /// Number of busy channels.
    pub fn active_channels(&self) -> usize {
        self.channels
            .iter()
            .filter(|ch| ch.state != ChannelState::Unallocated)
            .count()
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn volume(&self) -> (i32, i32, i32) {
        self.volume
    }

    /// Mix one frame.
    pub fn render(&mut self) -> Vec<i16> {
        let read_size = self
            .channels
            .iter()
            .filter(|ch| ch.state != ChannelState::Unallocated)
            .map(|ch| ch.cache.len())
            .fold(FRAME_SIZE, usize::min);

        let mut mix = vec![0i16; FRAME_SIZE / 2];
        for (index, ch) in self.channels.iter_mut().enumerate() {
            if ch.state == ChannelState::Unallocated {
                continue;
            }
            let mut src = ch.read_frame(read_size);
            match ch.state {
                ChannelState::Allocated => add_saturating(&mut mix, &src),
                ChannelState::Deallocating => {
                    log::trace!("render channel {} fades out", index);
                    let len = src.len();
                    for (i, sample) in src.iter_mut().enumerate() {
                        *sample = (i32::from(*sample) * (len - i) as i32 / len as i32) as i16;
                    }
                    add_saturating(&mut mix, &src);
                    ch.state = ChannelState::Deallocated;
                }
                _ => {}
            }
            if ch.state == ChannelState::Deallocated && ch.cache.is_empty() {
                ch.state = ChannelState::Unallocated;
            }
        }

        let gain = self.gain();
        if gain != 1.0 {
            for sample in &mut mix {
                *sample = (f32::from(*sample) * gain)
                    .round()
                    .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            }
        }
        self.frames += 1;
        mix
    }

    fn gain(&self) -> f32 {
        let (master, player0, _) = self.volume;
        if master == 0 && player0 == 0 {
            return 1.0;
        }
        10f32.powf((master + player0) as f32 / 200.0)
    }
}

fn add_saturating(mix: &mut [i16], src: &[i16]) {
    for (out, sample) in mix.iter_mut().zip(src) {
        *out = out.saturating_add(*sample);
    }
}

impl PcmRenderer for PcmMixer {
    fn allocate_channel(&mut self) -> Result<usize> {
        let (index, ch) = self
            .channels
            .iter_mut()
            .enumerate()
            .find(|(_, ch)| ch.state == ChannelState::Unallocated)
            .ok_or(Error::NoRenderChannel)?;
        ch.cache.clear();
        ch.state = ChannelState::Allocating;
        log::trace!("render channel {} allocated", index);
        Ok(index)
    }

    fn deallocate_channel(&mut self, channel: usize) {
        if let Some(ch) = self.channels.get_mut(channel) {
            if matches!(ch.state, ChannelState::Allocating | ChannelState::Allocated) {
                ch.state = ChannelState::Deallocating;
            }
        }
    }

    fn writable_size(&self, channel: usize) -> usize {
        match self.channels.get(channel) {
            Some(ch) if ch.state != ChannelState::Unallocated => ch.writable(),
            _ => 0,
        }
    }

    fn write(&mut self, channel: usize, data: &[u8]) -> bool {
        let Some(ch) = self.channels.get_mut(channel) else {
            return false;
        };
        if !matches!(ch.state, ChannelState::Allocating | ChannelState::Allocated) || data.len() > ch.writable() {
            return false;
        }
        if ch.state == ChannelState::Allocating {
            // fade in over the first block
            let count = data.len() / 2;
            for (i, pair) in data.chunks_exact(2).enumerate() {
                let sample = i32::from(i16::from_le_bytes([pair[0], pair[1]]));
                let faded = (sample * i as i32 / count as i32) as i16;
                ch.cache.extend(faded.to_le_bytes());
            }
            ch.cache.extend(data.chunks_exact(2).remainder());
            ch.state = ChannelState::Allocated;
        } else {
            ch.cache.extend(data);
        }
        true
    }

    fn set_volume(&mut self, master: i32, player0: i32, player1: i32) {
        log::debug!("volume {} {} {}", master, player0, player1);
        self.volume = (master, player0, player1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_allocate_all_channels() {
        let mut mixer = PcmMixer::new();
        for expected in 0..RENDER_CHANNELS {
            assert_eq!(mixer.allocate_channel().unwrap(), expected);
        }
        assert!(matches!(mixer.allocate_channel(), Err(Error::NoRenderChannel)));
        assert_eq!(mixer.active_channels(), RENDER_CHANNELS);
    }

    #[test]
    fn test_write_limits() {
        let mut mixer = PcmMixer::new();
        assert!(!mixer.write(0, &[0; 4]));
        assert_eq!(mixer.writable_size(0), 0);

        let ch = mixer.allocate_channel().unwrap();
        assert_eq!(mixer.writable_size(ch), CACHE_SIZE - 1);
        assert!(!mixer.write(ch, &vec![0; CACHE_SIZE]));
        assert!(mixer.write(ch, &vec![0; CACHE_SIZE - 1]));
        assert_eq!(mixer.writable_size(ch), 0);
        assert!(!mixer.write(9, &[0; 4]));
    }

    #[test]
    fn test_first_write_fades_in() {
        let mut mixer = PcmMixer::new();
        let ch = mixer.allocate_channel().unwrap();
        assert!(mixer.write(ch, &pcm(&[100, 100, 100, 100])));
        assert_eq!(mixer.channel_state(ch), Some(ChannelState::Allocated));
        assert!(mixer.write(ch, &pcm(&[100, 100])));

        let frame = mixer.render();
        assert_eq!(&frame[..6], &[0, 25, 50, 75, 100, 100]);
        assert!(frame[6..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_mix_saturates() {
        let mut mixer = PcmMixer::new();
        let a = mixer.allocate_channel().unwrap();
        let b = mixer.allocate_channel().unwrap();
        // skip the fade in
        assert!(mixer.write(a, &pcm(&[0, 0])));
        assert!(mixer.write(b, &pcm(&[0, 0])));
        assert!(mixer.write(a, &pcm(&[30_000, -30_000, 5])));
        assert!(mixer.write(b, &pcm(&[30_000, -30_000, 7])));

        let frame = mixer.render();
        assert_eq!(&frame[..5], &[0, 0, i16::MAX, i16::MIN, 12]);
    }

    #[test]
    fn test_channels_stay_aligned() {
        let mut mixer = PcmMixer::new();
        let a = mixer.allocate_channel().unwrap();
        let b = mixer.allocate_channel().unwrap();
        assert!(mixer.write(a, &vec![0; FRAME_SIZE * 2]));
        assert!(mixer.write(b, &vec![0; 100]));

        mixer.render();
        assert_eq!(mixer.readable_size(a), FRAME_SIZE * 2 - 100);
        assert_eq!(mixer.readable_size(b), 0);
        assert_eq!(mixer.frames(), 1);
    }

    #[test]
    fn test_deallocate_fades_out_and_frees() {
        let mut mixer = PcmMixer::new();
        let ch = mixer.allocate_channel().unwrap();
        assert!(mixer.write(ch, &pcm(&[0])));
        assert!(mixer.write(ch, &pcm(&vec![1000; SAMPLES_PER_FRAME * 2 * 2])));
        mixer.render();
        mixer.render();

        mixer.deallocate_channel(ch);
        assert_eq!(mixer.channel_state(ch), Some(ChannelState::Deallocating));
        assert!(!mixer.write(ch, &pcm(&[1])));
        // the last sample fades from full level, then the channel frees
        let frame = mixer.render();
        assert_eq!(frame[0], 1000);
        assert!(frame[1..].iter().all(|&s| s == 0));
        assert_eq!(mixer.channel_state(ch), Some(ChannelState::Unallocated));
    }

    #[test]
    fn test_fade_out_with_data() {
        let mut mixer = PcmMixer::new();
        let ch = mixer.allocate_channel().unwrap();
        assert!(mixer.write(ch, &pcm(&[0])));
        assert!(mixer.write(ch, &pcm(&vec![1000; SAMPLES_PER_FRAME * 2 * 2])));
        mixer.deallocate_channel(ch);

        let frame = mixer.render();
        // the first value is the padding sample from the fade in
        assert_eq!(frame[1], (1000 * (480 - 1) / 480) as i16);
        assert!(frame[479] < frame[1]);
        // remaining data drains silently
        assert_eq!(mixer.channel_state(ch), Some(ChannelState::Deallocated));
        assert!(mixer.render().iter().all(|&s| s == 0));
        assert!(mixer.render().iter().all(|&s| s == 0));
        assert_eq!(mixer.channel_state(ch), Some(ChannelState::Unallocated));
        assert_eq!(mixer.allocate_channel().unwrap(), ch);
    }

    #[test]
    fn test_volume() {
        let mut mixer = PcmMixer::new();
        let ch = mixer.allocate_channel().unwrap();
        assert!(mixer.write(ch, &pcm(&[0])));
        assert!(mixer.write(ch, &pcm(&[1000])));
        mixer.set_volume(-200, 0, 0);
        assert_eq!(mixer.volume(), (-200, 0, 0));
        let frame = mixer.render();
        assert_eq!(frame[1], 100);
    }
}
