//! String-based path helpers.
//!
//! Score and instrument files reference each other with relative paths that
//! may use either `/` or `\` as separator. These helpers work on plain strings
//! so that the result is identical on every host.

/// Byte index of the last path separator (`/` or `\`).
fn last_separator(path: &str) -> Option<usize> {
    path.rfind(['/', '\\'])
}

/// Get the folder part of a path, including the trailing separator
///
/// # Example
///
/// ```
/// use yuru_score::path_utils::folder_path;
///
/// assert_eq!(folder_path("/path/to.file"), "/path/");
/// assert_eq!(folder_path("to.file"), "");
/// ```
pub fn folder_path(path: &str) -> &str {
    match last_separator(path) {
        Some(sep) => &path[..=sep],
        None => "",
    }
}

/// Get the file name part of a path
///
/// # Example
///
/// ```
/// use yuru_score::path_utils::base_name;
///
/// assert_eq!(base_name("/path/to.file"), "to.file");
/// assert_eq!(base_name("to.file"), "to.file");
/// ```
pub fn base_name(path: &str) -> &str {
    match last_separator(path) {
        Some(sep) => &path[sep + 1..],
        None => path,
    }
}

/// Get the extension of a path, including the leading dot
///
/// Only the file name is inspected, so dots in folder names are ignored.
/// Returns an empty string when the file name has no dot.
pub fn extension(path: &str) -> &str {
    let name = base_name(path);
    match name.rfind('.') {
        Some(dot) => &name[dot..],
        None => "",
    }
}

/// Whether the file name starts with a dot
pub fn is_hidden(path: &str) -> bool {
    base_name(path).starts_with('.')
}

/// Resolve `./` and `../` components
///
/// A leading `./` is dropped, every `/./` collapses to `/`, and every
/// `/../` removes the preceding component. Parent references that climb
/// above the first component leave a leading `/`.
///
/// # Example
///
/// ```
/// use yuru_score::path_utils::normalize_path;
///
/// assert_eq!(normalize_path("./a/./b/../c.sfz"), "a/c.sfz");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut output = path.strip_prefix("./").unwrap_or(path).to_string();

    while let Some(index) = output.find("/./") {
        output.replace_range(index..index + 2, "");
    }

    while let Some(index) = output.find("/../") {
        let parent_end = output[..index].rfind('/').unwrap_or(0);
        output.replace_range(parent_end..index + 3, "");
    }

    output
}

/// Join a directory and a path
///
/// Absolute `path`s are returned unchanged, empty parts are skipped and a
/// separator is inserted only when `dir` does not already end with one.
pub fn join_path(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return dir.to_string();
    }
    if path.starts_with(['/', '\\']) {
        return path.to_string();
    }

    let mut joined = dir.to_string();
    if !dir.ends_with(['/', '\\']) {
        joined.push('/');
    }
    joined.push_str(path);
    joined
}
