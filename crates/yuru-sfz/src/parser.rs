//! SFZ tokenizer.
//!
//! [`SfzParser`] reads an SFZ document one byte at a time and reports what it
//! finds to an [`SfzHandler`]. It knows nothing about the meaning of headers
//! or opcodes; that is left to the handler.
//!
//! # Supported syntax
//!
//! - `// comment` up to the end of the line, when it starts outside a value
//! - `#include "path"`, resolved against the folder of the root file
//! - `#define $NAME value`, substituted into every later opcode name and value
//! - `<header>` blocks, each closed by the next header or the end of the root file
//! - `opcode=value` pairs, several per line. A value may contain spaces: the
//!   last word before the next `=` is taken as the next opcode name.
//!
//! Every line break ends whatever construct is open, so an opcode value never
//! spans two lines and an unterminated include path is dropped.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use yuru_score::path_utils::{folder_path, normalize_path};

/// How deep `#include` directives may nest before they are ignored.
pub const MAX_INCLUDE_DEPTH: usize = 8;

/// Receives the structure of an SFZ document.
///
/// Callbacks arrive in document order. `start_sfz` and `end_sfz` bracket the
/// root file only; included files are reported inline with the same handler.
pub trait SfzHandler {
    fn start_sfz(&mut self) {}

    fn end_sfz(&mut self) {}

    /// A `<name>` header opens.
    fn start_header(&mut self, name: &str);

    /// The header opened last is closed by the next header or the end of input.
    fn end_header(&mut self, name: &str);

    /// An `opcode=value` pair, with `#define` substitutions already applied.
    fn opcode(&mut self, name: &str, value: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Slash,
    Skip,
    ExpectMacro,
    Macro,
    ExpectIncludePath,
    IncludePath,
    IncludeEscape,
    ExpectDefineName,
    DefineName,
    ExpectDefineValue,
    DefineValue,
    ExpectHeaderName,
    HeaderName,
    Opcode,
    WaitEqual,
    WaitValue,
    Value,
}

/// Streaming SFZ parser.
///
/// # Example
///
/// ```
/// use yuru_sfz::parser::{SfzHandler, SfzParser};
///
/// #[derive(Default)]
/// struct Keys(Vec<String>);
///
/// impl SfzHandler for Keys {
///     fn start_header(&mut self, _name: &str) {}
///     fn end_header(&mut self, _name: &str) {}
///     fn opcode(&mut self, name: &str, value: &str) {
///         if name == "lokey" {
///             self.0.push(value.to_string());
///         }
///     }
/// }
///
/// let mut keys = Keys::default();
/// SfzParser::new().parse_str("#define $K c4\n<region> lokey=$K", "piano.sfz", &mut keys);
/// assert_eq!(keys.0, ["c4"]);
/// ```
#[derive(Debug, Default)]
pub struct SfzParser {
    /// `#define` names (including the `$`) and values, in declaration order
    defines: Vec<(String, String)>,
    /// Header currently open
    header: Option<String>,
    depth: usize,
}

impl SfzParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Definitions collected by the last parse.
    pub fn defines(&self) -> &[(String, String)] {
        &self.defines
    }

    /// Parse the SFZ file at `path`.
    ///
    /// Fails only when the root file cannot be read. Problems inside the
    /// document, including unreadable includes, are logged and skipped.
    pub fn parse_file<H: SfzHandler + ?Sized>(&mut self, path: &str, handler: &mut H) -> Result<()> {
        let data = read_file(path)?;
        log::debug!("parsing '{}'", path);
        self.parse_root(&data, path, handler);
        Ok(())
    }

    /// Parse an SFZ document held in memory.
    ///
    /// `path` names the document; includes are resolved against its folder.
    pub fn parse_str<H: SfzHandler + ?Sized>(&mut self, text: &str, path: &str, handler: &mut H) {
        self.parse_root(text.as_bytes(), path, handler);
    }

    fn parse_root<H: SfzHandler + ?Sized>(&mut self, data: &[u8], root: &str, handler: &mut H) {
        self.defines.clear();
        self.header = None;
        self.depth = 0;

        handler.start_sfz();
        self.parse_document(data, root, handler);
        if let Some(header) = self.header.take() {
            handler.end_header(&header);
        }
        handler.end_sfz();
    }

    fn parse_document<H: SfzHandler + ?Sized>(&mut self, data: &[u8], root: &str, handler: &mut H) {
        let mut state = State::Ready;
        let mut macro_name = Vec::new();
        let mut include_path = Vec::new();
        let mut define_name = Vec::new();
        let mut define_value = Vec::new();
        let mut header_name = Vec::new();
        let mut opcode = Vec::new();
        let mut value = Vec::new();

        // `None` marks the end of input
        for ch in data.iter().copied().map(Some).chain(std::iter::once(None)) {
            match state {
                State::Ready => match ch {
                    Some(b'/') => state = State::Slash,
                    Some(b'#') => {
                        macro_name.clear();
                        state = State::ExpectMacro;
                    }
                    Some(b'<') => {
                        header_name.clear();
                        state = State::ExpectHeaderName;
                    }
                    Some(b) if is_graph(b) => {
                        opcode = vec![b];
                        state = State::Opcode;
                    }
                    _ => {}
                },
                State::Slash => {
                    if ch == Some(b'/') {
                        state = State::Skip;
                    }
                }
                State::Skip => {}
                State::ExpectMacro => {
                    if let Some(b) = ch.filter(|&b| is_printable(b)) {
                        macro_name = vec![b];
                        state = State::Macro;
                    }
                }
                State::Macro => match ch {
                    Some(b) if !b.is_ascii_whitespace() => macro_name.push(b),
                    _ => {
                        state = match macro_name.as_slice() {
                            b"include" => {
                                include_path.clear();
                                State::ExpectIncludePath
                            }
                            b"define" => {
                                define_name.clear();
                                State::ExpectDefineName
                            }
                            other => {
                                log::warn!("unknown directive #{}", text(other));
                                State::Skip
                            }
                        };
                    }
                },
                State::ExpectIncludePath => {
                    if ch == Some(b'"') {
                        include_path.clear();
                        state = State::IncludePath;
                    }
                }
                State::IncludePath => match ch {
                    Some(b'"') => {
                        let path = normalize_path(&format!("{}{}", folder_path(root), text(&include_path)));
                        self.include(&path, root, handler);
                        state = State::Skip;
                    }
                    Some(b'\\') => state = State::IncludeEscape,
                    Some(b) => include_path.push(b),
                    None => {}
                },
                State::IncludeEscape => {
                    if let Some(b) = ch {
                        include_path.push(b);
                    }
                    state = State::IncludePath;
                }
                State::ExpectDefineName => {
                    if ch == Some(b'$') {
                        define_name = vec![b'$'];
                        state = State::DefineName;
                    }
                }
                State::DefineName => match ch {
                    Some(b) if is_graph(b) => define_name.push(b),
                    _ => {
                        define_value.clear();
                        state = State::ExpectDefineValue;
                    }
                },
                State::ExpectDefineValue => {
                    if let Some(b) = ch.filter(|&b| is_graph(b)) {
                        define_value = vec![b];
                        state = State::DefineValue;
                    }
                }
                State::DefineValue => match ch {
                    Some(b) if is_graph(b) => define_value.push(b),
                    _ => {
                        let name = self.replace_defines(&text(&define_name));
                        let value = self.replace_defines(&text(&define_value));
                        log::trace!("define {} {}", name, value);
                        self.defines.push((name, value));
                        state = State::Skip;
                    }
                },
                State::ExpectHeaderName => match ch {
                    Some(b'>') => state = State::Ready,
                    Some(b) if is_graph(b) => {
                        header_name = vec![b];
                        state = State::HeaderName;
                    }
                    _ => {}
                },
                State::HeaderName => match ch {
                    Some(b'>') => {
                        self.switch_header(text(&header_name), handler);
                        state = State::Ready;
                    }
                    Some(b) if is_graph(b) => header_name.push(b),
                    _ => {}
                },
                State::Opcode => match ch {
                    Some(b'=') => state = State::WaitValue,
                    Some(b) if b.is_ascii_whitespace() => state = State::WaitEqual,
                    Some(b) if is_graph(b) => opcode.push(b),
                    _ => {}
                },
                State::WaitEqual => {
                    if ch == Some(b'=') {
                        state = State::WaitValue;
                    }
                }
                State::WaitValue => {
                    if let Some(b) = ch.filter(|b| !b.is_ascii_whitespace()) {
                        value = vec![b];
                        state = State::Value;
                    }
                }
                State::Value => match ch {
                    Some(b'=') => {
                        // `value` holds the rest of this value plus the next opcode name
                        let trimmed = value.trim_ascii();
                        let next = match trimmed.iter().rposition(|b| b.is_ascii_whitespace()) {
                            Some(space) => {
                                self.emit(&opcode, &trimmed[..space], handler);
                                trimmed[space + 1..].to_vec()
                            }
                            None => {
                                self.emit(&opcode, trimmed, handler);
                                trimmed.to_vec()
                            }
                        };
                        opcode = next;
                        state = State::WaitValue;
                    }
                    Some(b'<') => {
                        self.emit(&opcode, &value, handler);
                        header_name.clear();
                        state = State::ExpectHeaderName;
                    }
                    None | Some(b'\r') | Some(b'\n') => {
                        self.emit(&opcode, &value, handler);
                        state = State::Ready;
                    }
                    Some(b) => value.push(b),
                },
            }

            match ch {
                None => break,
                Some(b'\r') | Some(b'\n') => state = State::Ready,
                _ => {}
            }
        }
    }

    fn include<H: SfzHandler + ?Sized>(&mut self, path: &str, root: &str, handler: &mut H) {
        if self.depth >= MAX_INCLUDE_DEPTH {
            log::warn!("include '{}' nested too deep, ignored", path);
            return;
        }
        let data = match read_file(path) {
            Ok(data) => data,
            Err(e) => {
                log::error!("cannot include '{}': {}", path, e);
                return;
            }
        };
        log::debug!("parsing '{}'", path);
        self.depth += 1;
        self.parse_document(&data, root, handler);
        self.depth -= 1;
    }

    fn switch_header<H: SfzHandler + ?Sized>(&mut self, name: String, handler: &mut H) {
        if let Some(previous) = self.header.take() {
            handler.end_header(&previous);
        }
        handler.start_header(&name);
        self.header = Some(name);
    }

    fn emit<H: SfzHandler + ?Sized>(&self, opcode: &[u8], value: &[u8], handler: &mut H) {
        let name = self.replace_defines(&text(opcode));
        let value = self.replace_defines(&text(value.trim_ascii()));
        log::trace!("opcode {}={}", name, value);
        handler.opcode(&name, &value);
    }

    /// Substitute every `$NAME` that names a definition.
    ///
    /// A name runs over ASCII letters, digits and `_`. The first definition
    /// with that exact name wins. Substituted text is not scanned again.
    fn replace_defines(&self, input: &str) -> String {
        let mut output = input.to_string();
        let mut pos = 0;
        while let Some(found) = output[pos..].find('$') {
            let start = pos + found;
            let end = output[start + 1..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .map_or(output.len(), |len| start + 1 + len);
            pos = match self.defines.iter().find(|(name, _)| *name == output[start..end]) {
                Some((_, value)) => {
                    output.replace_range(start..end, value);
                    start + value.len()
                }
                None => start + 1,
            };
        }
        output
    }
}

fn read_file(path: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.into()),
        _ => Error::Io(e),
    })
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_graph(b: u8) -> bool {
    b > b' ' && b != 0x7F
}

fn is_printable(b: u8) -> bool {
    b == b' ' || is_graph(b)
}
