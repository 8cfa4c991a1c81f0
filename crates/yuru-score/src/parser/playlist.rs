//! `.m3u` playlist parser.
//!
//! Every line of a playlist names a score file relative to the playlist's
//! folder. Blank lines and `#` comments are skipped. The scores of all listed
//! files are flattened into one index; the file behind an index is only opened
//! when that score is loaded.

use super::factory::ParserFactory;
use super::ScoreParser;
use crate::error::Result;
use crate::midi::MidiMessage;
use crate::path_utils::{folder_path, join_path, normalize_path};
use std::fs;

/// Playlists referencing playlists are followed this deep.
const MAX_NESTING: usize = 4;

/// One score of the flattened playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Path of the file holding the score
    pub file: String,
    /// Score index inside that file
    pub index: usize,
    pub title: String,
}

/// Parser for `.m3u` playlists and generated folder playlists.
pub struct PlaylistParser {
    entries: Vec<PlaylistEntry>,
    parser: Option<Box<dyn ScoreParser>>,
    play_track: u32,
    depth: usize,
}

impl std::fmt::Debug for PlaylistParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistParser")
            .field("entries", &self.entries)
            .field("loaded", &self.parser.is_some())
            .field("play_track", &self.play_track)
            .finish()
    }
}

impl PlaylistParser {
    /// Read the playlist at `path` and index the scores of every listed file.
    ///
    /// Lines naming files that cannot be opened are logged and skipped.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_nested(path, 0)
    }

    pub(crate) fn open_nested(path: &str, depth: usize) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut playlist = Self {
            entries: Vec::new(),
            parser: None,
            play_track: !0,
            depth,
        };
        if depth >= MAX_NESTING {
            log::warn!("{}: playlists nested too deep", path);
            return Ok(playlist);
        }

        let folder = folder_path(path);
        let factory = ParserFactory::with_depth(depth + 1);
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let score_path = resolve(folder, line);
            let Some(parser) = factory.score_parser(&score_path) else {
                continue;
            };
            for index in 0..parser.number_of_scores() {
                playlist.entries.push(PlaylistEntry {
                    file: score_path.clone(),
                    index,
                    title: parser.title(index),
                });
            }
        }
        log::debug!("{}: {} scores", path, playlist.entries.len());
        Ok(playlist)
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }
}

/// Resolve a playlist line against the playlist folder.
///
/// A leading `/` is dropped when the playlist itself was given by a relative
/// path, so lines stay relative to the storage root.
fn resolve(folder: &str, line: &str) -> String {
    let line = if folder.starts_with('/') {
        line
    } else {
        line.trim_start_matches('/')
    };
    let path = normalize_path(&join_path(folder, line));
    if folder.starts_with('/') {
        path
    } else {
        path.trim_start_matches('/').to_string()
    }
}

impl ScoreParser for PlaylistParser {
    fn root_tick(&self) -> u16 {
        self.parser.as_ref().map_or(0, |parser| parser.root_tick())
    }

    /// File name of the loaded score, empty before a score is loaded.
    fn file_name(&self) -> String {
        self.parser
            .as_ref()
            .map(|parser| parser.file_name())
            .unwrap_or_default()
    }

    fn number_of_scores(&self) -> usize {
        self.entries.len()
    }

    fn load_score(&mut self, index: usize) -> bool {
        let Some(entry) = self.entries.get(index) else {
            log::error!("playlist: no score {}", index);
            return false;
        };
        self.parser = None;
        let Some(mut parser) = ParserFactory::with_depth(self.depth + 1).score_parser(&entry.file) else {
            log::error!("playlist: cannot reopen {}", entry.file);
            return false;
        };
        log::info!(
            "playlist: loading \"{}\" ({}, root tick {})",
            entry.title,
            entry.file,
            parser.root_tick()
        );
        parser.set_play_track(self.play_track);
        let loaded = parser.load_score(entry.index);
        self.parser = Some(parser);
        loaded
    }

    fn title(&self, index: usize) -> String {
        self.entries
            .get(index)
            .map(|entry| entry.title.clone())
            .unwrap_or_default()
    }

    fn midi_message(&mut self) -> MidiMessage {
        match self.parser.as_mut() {
            Some(parser) => parser.midi_message(),
            None => MidiMessage::end_of_track(0),
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
