//! Offline rendering of a score through an SFZ instrument.
//!
//! The instrument chain runs against a manual clock that advances by one
//! render frame at a time, so the output is identical on every run and
//! independent of how fast the machine is.

use crate::RenderArgs;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use yuru_score::filter::{Filter, PlayState, ScoreSrc, PARAMID_OUTPUT_LEVEL, PARAMID_STATUS, PARAMID_TRACK_MASK};
use yuru_score::time_keeper::ManualClock;
use yuru_sfz::renderer::SAMPLES_PER_FRAME;
use yuru_sfz::wav::{BIT_DEPTH, CHANNEL_COUNT, SAMPLE_RATE};
use yuru_sfz::SfzSink;

/// Milliseconds covered by one render frame.
const FRAME_MS: u32 = SAMPLES_PER_FRAME as u32 * 1000 / SAMPLE_RATE;
/// Chain polls per frame, so events sharing a tick land in the same frame.
const UPDATES_PER_FRAME: usize = 4;
/// Longest ring-out after the score ends.
const TAIL_MS: u32 = 10_000;

/// Render `args.score` of `args.score_file` to `args.output`.
pub fn render(args: &RenderArgs) -> Result<()> {
    log::info!("Score:  {}", args.score_file);
    log::info!("Sfz:    {}", args.sfz_file);
    log::info!("Output: {}", args.output.display());

    let clock = ManualClock::new();
    let sink = SfzSink::new(args.sfz_file.as_str());
    let mut src = ScoreSrc::with_clock(args.score_file.as_str(), false, sink, clock.clone());
    if !src.begin() {
        anyhow::bail!("Cannot play {} with {}", args.score_file, args.sfz_file);
    }
    // the mask applies when the score is loaded
    if let Some(mask) = args.tracks {
        if !src.set_param(PARAMID_TRACK_MASK, i64::from(mask)) {
            anyhow::bail!("Track mask {:#x} rejected", mask);
        }
    }
    if !src.select_score(args.score) {
        anyhow::bail!("No score {} in {}", args.score, args.score_file);
    }
    if args.volume != 0 && !src.set_param(PARAMID_OUTPUT_LEVEL, args.volume) {
        anyhow::bail!("Output level {} rejected by {}", args.volume, args.sfz_file);
    }
    if !src.set_param(PARAMID_STATUS, PlayState::Playing.as_param()) {
        anyhow::bail!("Cannot start score {}", args.score);
    }

    let spec = hound::WavSpec {
        channels: CHANNEL_COUNT,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BIT_DEPTH,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let max_frames = args.max_seconds.saturating_mul(1000) / FRAME_MS;
    let mut frames = 0u32;
    while frames < max_frames && src.play_state() != PlayState::EndScore {
        for _ in 0..UPDATES_PER_FRAME {
            src.update();
        }
        write_frame(&mut writer, &src.inner_mut().renderer_mut().render())?;
        clock.advance(FRAME_MS);
        frames += 1;
    }
    if src.play_state() != PlayState::EndScore {
        log::warn!("Stopped after {} s", args.max_seconds);
    }

    // let the remaining voices ring out
    let tail_end = frames.saturating_add(TAIL_MS / FRAME_MS).min(max_frames);
    while frames < tail_end && src.inner().renderer().active_channels() > 0 {
        src.inner_mut().update();
        write_frame(&mut writer, &src.inner_mut().renderer_mut().render())?;
        frames += 1;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    log::info!("Rendered {} ms to {}", u64::from(frames) * u64::from(FRAME_MS), args.output.display());
    Ok(())
}

fn write_frame(writer: &mut hound::WavWriter<BufWriter<File>>, frame: &[i16]) -> Result<()> {
    for &sample in frame {
        writer.write_sample(sample)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn args(dir: &Path, score: &str) -> RenderArgs {
        fs::write(dir.join("a.raw"), vec![1u8; 96_000]).unwrap();
        fs::write(dir.join("inst.sfz"), "<region> sample=a.raw").unwrap();
        fs::write(dir.join("song.txt"), score).unwrap();
        RenderArgs {
            score_file: dir.join("song.txt").to_str().unwrap().to_string(),
            sfz_file: dir.join("inst.sfz").to_str().unwrap().to_string(),
            output: dir.join("out.wav"),
            score: 0,
            tracks: None,
            volume: 0,
            max_seconds: 60,
        }
    }

    #[test]
    fn test_render_score() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), "#MUSIC_START\n60;\n#MUSIC_END\n");
        render(&args).unwrap();

        let mut reader = hound::WavReader::open(&args.output).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.channels, CHANNEL_COUNT);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len() % (SAMPLES_PER_FRAME * 2), 0);
        // one quarter note at 120 bpm plus the ring-out
        assert!(samples.len() >= 48_000);
        assert!(samples.iter().any(|&s| s == 0x0101));
    }

    #[test]
    fn test_render_missing_instrument() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(dir.path(), "#MUSIC_START\n60;\n#MUSIC_END\n");
        args.sfz_file = dir.path().join("missing.sfz").to_str().unwrap().to_string();
        assert!(render(&args).is_err());
        assert!(!args.output.exists());
    }

    #[test]
    fn test_render_bad_score_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(dir.path(), "#MUSIC_START\n60;\n#MUSIC_END\n");
        args.score = 3;
        assert!(render(&args).is_err());
    }

    #[test]
    fn test_render_with_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(dir.path(), "#MUSIC_START\n60;\n#MUSIC_END\n");
        args.tracks = Some(1);
        args.volume = -200;
        render(&args).unwrap();

        let mut reader = hound::WavReader::open(&args.output).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        // -20 dB scales 257 down to 26
        assert!(samples.iter().any(|&s| s == 26));
        assert!(samples.iter().all(|&s| s <= 26));
    }

    #[test]
    fn test_render_stops_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(dir.path(), "#MUSIC_START\n60;62;64;65;67;\n#MUSIC_END\n");
        args.max_seconds = 1;
        render(&args).unwrap();

        let reader = hound::WavReader::open(&args.output).unwrap();
        assert_eq!(reader.duration(), SAMPLE_RATE);
    }
}
