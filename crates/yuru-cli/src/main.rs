//! Yuru CLI - the `yuru` command.
//!
//! Inspects score files and SFZ instruments, and renders a score through an
//! SFZ instrument to a WAV file:
//!
//! - **yuru-score**: score parsers, scheduling and the filter chain
//! - **yuru-sfz**: SFZ parsing and the sampler sink

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use yuru_score::io::TarReader;
use yuru_score::{ParserFactory, ScoreParser};
use yuru_sfz::SfzInstrument;

/// Yuru - score player and SFZ sampler
#[derive(Parser, Debug)]
#[command(name = "yuru")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play MIDI and text scores through SFZ instruments", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the scores of a file, playlist or directory
    Scores {
        /// Score file (.mid, .txt, .m3u) or a directory of them
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Print the events of one score
    Dump {
        #[arg(value_name = "PATH")]
        path: String,

        /// Index of the score to dump
        #[arg(short, long, default_value_t = 0)]
        score: usize,
    },

    /// Show the regions of an SFZ instrument
    Sfz {
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// List the members of a tar archive
    Tar {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Render a score through an SFZ instrument to a WAV file
    Render(RenderArgs),
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Score file or directory
    #[arg(value_name = "SCORE")]
    pub score_file: String,

    /// SFZ instrument to play the score with
    #[arg(value_name = "SFZ")]
    pub sfz_file: String,

    /// Output WAV file
    #[arg(short, long, default_value = "out.wav")]
    pub output: PathBuf,

    /// Index of the score to render
    #[arg(short, long, default_value_t = 0)]
    pub score: usize,

    /// Track enable mask, one bit per SMF track
    #[arg(long, value_name = "MASK")]
    pub tracks: Option<u32>,

    /// Output level in tenths of a dB
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub volume: i64,

    /// Stop rendering after this many seconds
    #[arg(long, default_value_t = 600)]
    pub max_seconds: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Scores { path } => list_scores(&path),
        Commands::Dump { path, score } => dump_score(&path, score),
        Commands::Sfz { file } => show_instrument(&file),
        Commands::Tar { file } => list_archive(&file),
        Commands::Render(args) => render::render(&args),
    }
}

fn list_scores(path: &str) -> Result<()> {
    let parser = ParserFactory::new()
        .score_parser(path)
        .with_context(|| format!("No scores in {}", path))?;

    println!("{}: {} scores", parser.file_name(), parser.number_of_scores());
    for index in 0..parser.number_of_scores() {
        println!("{:4}  {}", index, parser.title(index));
    }
    Ok(())
}

fn dump_score(path: &str, score: usize) -> Result<()> {
    let mut parser = ParserFactory::new()
        .score_parser(path)
        .with_context(|| format!("No scores in {}", path))?;
    if !parser.load_score(score) {
        anyhow::bail!("Cannot load score {} of {}", score, path);
    }

    println!("{} [{}] {} ticks per quarter", parser.file_name(), parser.title(score), parser.root_tick());
    let mut tick = 0u64;
    loop {
        let message = parser.midi_message();
        tick += u64::from(message.delta_time);
        if message.is_meta() {
            println!(
                "{:8}  meta {:02x} {:?}",
                tick,
                message.event_code,
                String::from_utf8_lossy(&message.data)
            );
        } else if message.is_sysex() {
            println!("{:8}  sysex {} bytes", tick, message.event_length);
        } else {
            println!(
                "{:8}  {:02x} {:02x} {:02x}",
                tick, message.status_byte, message.data_byte1, message.data_byte2
            );
        }
        if message.is_end_of_track() {
            break;
        }
    }
    Ok(())
}

fn show_instrument(file: &str) -> Result<()> {
    let instrument = SfzInstrument::load(file)?;
    println!("{}", instrument.info());

    let switch = instrument.key_switch;
    if switch.last != yuru_score::midi::INVALID_NOTE_NUMBER {
        println!("key switch {}..{} default {}", switch.lokey, switch.hikey, switch.last);
    }
    for (index, region) in instrument.regions.iter().enumerate() {
        println!(
            "{:4}  key {:3}-{:3} vel {:3}-{:3} ch {:2}-{:2} {} {}{}",
            index + 1,
            region.lokey,
            region.hikey,
            region.lovel,
            region.hivel,
            region.lochan + 1,
            region.hichan + 1,
            region.loop_mode,
            region.sample,
            if region.silence { " (silent)" } else { "" }
        );
    }
    Ok(())
}

fn list_archive(file: &Path) -> Result<()> {
    let reader = TarReader::open(file).with_context(|| format!("Failed to read archive: {}", file.display()))?;
    for entry in reader.entries() {
        println!("{:10}  {:10}  {}", entry.offset, entry.size, entry.name);
    }
    Ok(())
}
