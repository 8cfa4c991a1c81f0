//! Picks a [`ScoreParser`] for a path.

use super::{PlaylistParser, ScoreParser, SmfParser, TextScoreParser};
use crate::error::{Error, Result};
use crate::path_utils::{base_name, extension, is_hidden, join_path};
use std::fs;
use std::path::Path;

/// Name of the playlist generated inside score folders.
pub const PLAYLIST_NAME: &str = ".playlist.m3u";

/// Kind of score file, decided from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFileType {
    Midi,
    Text,
    Playlist,
    Other,
    /// Name starts with a dot
    Hidden,
}

/// Classify `path` by its file name.
///
/// # Example
///
/// ```
/// use yuru_score::parser::{file_type, ScoreFileType};
///
/// assert_eq!(file_type("songs/Intro.MID"), ScoreFileType::Midi);
/// assert_eq!(file_type("songs/.playlist.m3u"), ScoreFileType::Hidden);
/// ```
pub fn file_type(path: &str) -> ScoreFileType {
    if is_hidden(path) {
        return ScoreFileType::Hidden;
    }
    match extension(path).to_ascii_lowercase().as_str() {
        ".mid" | ".midi" => ScoreFileType::Midi,
        ".txt" => ScoreFileType::Text,
        ".m3u" => ScoreFileType::Playlist,
        _ => ScoreFileType::Other,
    }
}

/// Creates score parsers from paths.
#[derive(Debug, Clone, Default)]
pub struct ParserFactory {
    depth: usize,
}

impl ParserFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_depth(depth: usize) -> Self {
        Self { depth }
    }

    /// Open a parser for `path`.
    ///
    /// A directory is turned into a generated playlist of the MIDI and text
    /// files it contains. Files are dispatched by extension. Returns `None`
    /// (after logging) for unsupported or unreadable paths.
    pub fn score_parser(&self, path: &str) -> Option<Box<dyn ScoreParser>> {
        match self.open(path) {
            Ok(parser) => Some(parser),
            Err(e) => {
                log::error!("{}: {}", path, e);
                None
            }
        }
    }

    fn open(&self, path: &str) -> Result<Box<dyn ScoreParser>> {
        if Path::new(path).is_dir() {
            let playlist = create_playlist(path)?;
            return Ok(Box::new(PlaylistParser::open_nested(&playlist, self.depth)?));
        }
        if !Path::new(path).exists() {
            return Err(Error::FileNotFound(path.into()));
        }
        match file_type(path) {
            ScoreFileType::Midi => Ok(Box::new(SmfParser::open(path)?)),
            ScoreFileType::Text => Ok(Box::new(TextScoreParser::open(path)?)),
            ScoreFileType::Playlist => Ok(Box::new(PlaylistParser::open_nested(path, self.depth)?)),
            ScoreFileType::Other | ScoreFileType::Hidden => Err(Error::UnsupportedFile(path.into())),
        }
    }
}

/// Write `<dir>/.playlist.m3u` listing the MIDI and text files of `dir`.
///
/// The listing is not recursive and sorted by name. Returns the playlist path.
pub fn create_playlist(dir: &str) -> Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match file_type(&name) {
            ScoreFileType::Midi | ScoreFileType::Text => names.push(name),
            ScoreFileType::Other => log::info!("{}: skipping {}", dir, name),
            ScoreFileType::Playlist | ScoreFileType::Hidden => {}
        }
    }
    if names.is_empty() {
        return Err(Error::EntryNotFound(format!("no score files in {}", dir)));
    }
    names.sort();

    let playlist = join_path(dir, PLAYLIST_NAME);
    let mut content = String::new();
    for name in &names {
        content.push_str(base_name(name));
        content.push('\n');
    }
    fs::write(&playlist, content)?;
    log::debug!("{}: {} files", playlist, names.len());
    Ok(playlist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert_eq!(file_type("a.mid"), ScoreFileType::Midi);
        assert_eq!(file_type("dir/a.MIDI"), ScoreFileType::Midi);
        assert_eq!(file_type("a.TxT"), ScoreFileType::Text);
        assert_eq!(file_type("list.m3u"), ScoreFileType::Playlist);
        assert_eq!(file_type("a.wav"), ScoreFileType::Other);
        assert_eq!(file_type("README"), ScoreFileType::Other);
        assert_eq!(file_type("dir/.hidden.mid"), ScoreFileType::Hidden);
        assert_eq!(file_type(".dir/a.mid"), ScoreFileType::Midi);
    }

    #[test]
    fn test_dispatch_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.txt");
        fs::write(&text, "#MUSIC_TITLE:a\n#MUSIC_START\n60;\n#MUSIC_END\n").unwrap();
        let other = dir.path().join("a.wav");
        fs::write(&other, b"RIFF").unwrap();

        let factory = ParserFactory::new();
        let parser = factory.score_parser(text.to_str().unwrap()).unwrap();
        assert_eq!(parser.root_tick(), 96);
        assert_eq!(parser.title(0), "a");

        assert!(factory.score_parser(other.to_str().unwrap()).is_none());
        assert!(factory.score_parser("/nonexistent/a.mid").is_none());
    }

    #[test]
    fn test_directory_becomes_playlist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "#MUSIC_TITLE:b\n#MUSIC_START\n62;\n#MUSIC_END\n").unwrap();
        fs::write(dir.path().join("a.txt"), "#MUSIC_TITLE:a\n#MUSIC_START\n60;\n#MUSIC_END\n").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join(".hidden.txt"), "#MUSIC_START\n").unwrap();
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let path = dir.path().to_str().unwrap();
        let mut parser = ParserFactory::new().score_parser(path).unwrap();
        assert_eq!(parser.number_of_scores(), 2);
        assert_eq!(parser.title(0), "a");
        assert_eq!(parser.title(1), "b");

        let listing = fs::read_to_string(dir.path().join(PLAYLIST_NAME)).unwrap();
        assert_eq!(listing, "a.txt\nb.txt\n");

        assert!(parser.load_score(1));
        parser.midi_message();
        assert_eq!(parser.midi_message().data_byte1, 62);

        // regenerating replaces the previous listing
        let parser = ParserFactory::new().score_parser(path).unwrap();
        assert_eq!(parser.number_of_scores(), 2);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.doc"), b"doc").unwrap();
        assert!(ParserFactory::new().score_parser(dir.path().to_str().unwrap()).is_none());
    }
}
