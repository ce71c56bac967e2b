use std::path::Path;

/// Splits a path into lowercase components without touching the filesystem.
///
/// Both `/` and `\` separate components so that drive-style paths are
/// understood on every platform. `.` is dropped and `..` pops. Verbatim
/// (`\\?\`, `\\?\UNC\`) and device (`\\.\`) prefixes are removed first so
/// `\\?\C:\Windows` and `C:\Windows` produce the same components.
pub(crate) fn lexical_segments(raw: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for segment in strip_namespace_prefix(raw).split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_lowercase()),
        }
    }
    segments
}

fn strip_namespace_prefix(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    let is_sep = |b: u8| b == b'\\' || b == b'/';
    if bytes.len() < 4 || !(is_sep(bytes[0]) && is_sep(bytes[1]) && is_sep(bytes[3])) {
        return raw;
    }
    match bytes[2] {
        b'?' => {
            let rest = &raw[4..];
            let tail = rest.as_bytes();
            // `\\?\UNC\server\share` keeps only `server\share`.
            if tail.len() >= 4 && tail[..3].eq_ignore_ascii_case(b"unc") && is_sep(tail[3]) {
                &rest[4..]
            } else {
                rest
            }
        }
        b'.' => &raw[4..],
        _ => raw,
    }
}

#[derive(Debug)]
pub(crate) struct PathContext {
    segments_lower: Vec<String>,
    extension: Option<String>,
}

impl PathContext {
    pub(crate) fn new(path: &Path) -> Self {
        Self::from_segments(lexical_segments(&path.to_string_lossy()))
    }

    pub(crate) fn from_segments(segments_lower: Vec<String>) -> Self {
        let extension = segments_lower.last().and_then(|name| extension_of(name));
        Self {
            segments_lower,
            extension,
        }
    }

    pub(crate) fn segments(&self) -> &[String] {
        &self.segments_lower
    }

    pub(crate) fn file_name(&self) -> Option<&str> {
        self.segments_lower.last().map(|s| s.as_str())
    }

    pub(crate) fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Whether `prefix` names this path or one of its ancestors.
    pub(crate) fn starts_with(&self, prefix: &[String]) -> bool {
        starts_with_segments(&self.segments_lower, prefix)
    }

    /// Contiguous match of `sequence` anywhere inside `within`.
    pub(crate) fn contains_sequence(within: &[String], sequence: &[String]) -> bool {
        if sequence.is_empty() {
            return true;
        }
        if sequence.len() > within.len() {
            return false;
        }
        within
            .windows(sequence.len())
            .any(|window| window.iter().zip(sequence).all(|(a, b)| a == b))
    }
}

pub(crate) fn starts_with_segments(path: &[String], prefix: &[String]) -> bool {
    prefix.len() <= path.len() && path.iter().zip(prefix).all(|(a, b)| a == b)
}

/// Extension of a lowercase file name; dot-files like `.bashrc` have none.
pub(crate) fn extension_of(name: &str) -> Option<String> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_string()),
        Some(_) => None,
    }
}
