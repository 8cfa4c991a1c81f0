//! Random access to the members of an uncompressed tar archive.
//!
//! The archive is scanned once to record where each member's data lives;
//! members are then served as bounded streams over their own file handle.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar::Archive;

/// Location of one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// Member path as stored in the archive
    pub name: String,
    /// Byte offset of the member data in the archive file
    pub offset: u64,
    /// Length of the member data
    pub size: u64,
}

/// Index over a tar archive on disk.
#[derive(Debug)]
pub struct TarReader {
    path: PathBuf,
    entries: Vec<TarEntry>,
}

impl TarReader {
    /// Scan the archive at `path` and record its members.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut archive = Archive::new(file);

        let mut entries = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            log::trace!(
                "tar entry '{}' at {} ({} bytes)",
                name,
                entry.raw_file_position(),
                entry.size()
            );
            entries.push(TarEntry {
                name,
                offset: entry.raw_file_position(),
                size: entry.size(),
            });
        }

        log::debug!("{}: {} entries", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    /// All members in archive order.
    pub fn entries(&self) -> &[TarEntry] {
        &self.entries
    }

    /// Open the member called `name`.
    pub fn open_entry(&self, name: &str) -> Result<TarStream<File>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        self.stream(entry.clone())
    }

    /// Open the member at `index`.
    pub fn open_index(&self, index: usize) -> Result<TarStream<File>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| Error::EntryNotFound(format!("#{}", index)))?;
        self.stream(entry.clone())
    }

    fn stream(&self, entry: TarEntry) -> Result<TarStream<File>> {
        let file = File::open(&self.path)?;
        Ok(TarStream::new(file, entry)?)
    }
}

/// A `Read + Seek` view restricted to one archive member.
///
/// Positions are relative to the start of the member.
#[derive(Debug)]
pub struct TarStream<R> {
    inner: R,
    entry: TarEntry,
    pos: u64,
}

impl<R: Read + Seek> TarStream<R> {
    /// Wrap `inner`, which must contain `entry` at its recorded offset.
    pub fn new(mut inner: R, entry: TarEntry) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(entry.offset))?;
        Ok(Self {
            inner,
            entry,
            pos: 0,
        })
    }

    /// Member this stream reads.
    pub fn entry(&self) -> &TarEntry {
        &self.entry
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn size(&self) -> u64 {
        self.entry.size
    }

    pub fn available(&self) -> u64 {
        self.entry.size.saturating_sub(self.pos)
    }

    /// Next byte without consuming it.
    pub fn peek(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte) {
            Ok(1) => {
                self.seek(SeekFrom::Current(-1)).ok()?;
                Some(byte[0])
            }
            _ => None,
        }
    }
}

impl<R: Read + Seek> Read for TarStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = (self.available() as usize).min(buf.len());
        if len == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..len])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for TarStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.entry.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        let target = target
            .filter(|t| *t <= self.entry.size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek outside of tar entry"))?;
        self.inner.seek(SeekFrom::Start(self.entry.offset + target))?;
        self.pos = target;
        Ok(target)
    }
}
