//! Byte-level file access used by the parsers.

mod buffered;
mod tar_reader;

pub use buffered::{BufferedFileReader, DEFAULT_CAPACITY};
pub use tar_reader::{TarEntry, TarReader, TarStream};
