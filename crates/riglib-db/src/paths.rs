//! Lexical path normalization shared by the store, blacklist and scanner.
//!
//! Stored paths come from different machines, so both `/` and `\` count as
//! separators. Nothing here touches the filesystem.

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Normalizes `path` the way `normpath` does, keeping the separator style of
/// the input (the first separator seen wins).
pub fn normalize_path(path: &str) -> String {
    let separator = path.chars().find(|c| is_separator(*c)).unwrap_or('/');
    normalize_with(path, separator)
}

/// Separator-agnostic key used for path membership checks.
pub fn path_key(path: &str) -> String {
    normalize_with(path, '/')
}

/// Case-folded key used to compare against host scene references.
pub fn reference_key(path: &str) -> String {
    path_key(path).to_lowercase()
}

fn normalize_with(path: &str, separator: char) -> String {
    let path = path.trim();
    if path.is_empty() {
        return String::new();
    }

    let (drive, rest) = split_drive(path);
    let leading = rest.chars().take_while(|c| is_separator(*c)).count();
    let absolute = leading > 0;

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split(is_separator) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push(part);
                }
            }
            _ => parts.push(part),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    normalized.push_str(drive);
    // Two leading separators mark a UNC share or an implementation-defined
    // POSIX root; anything else collapses to one.
    let prefix = if leading == 2 { 2 } else { leading.min(1) };
    for _ in 0..prefix {
        normalized.push(separator);
    }
    let mut first = true;
    for part in parts {
        if !first {
            normalized.push(separator);
        }
        normalized.push_str(part);
        first = false;
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    normalized
}

fn split_drive(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        path.split_at(2)
    } else {
        ("", path)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn collapses_and_resolves() {
        assert_eq!(normalize_path("/rigs//chars/./a/../Apollo.ma"), "/rigs/chars/Apollo.ma");
        assert_eq!(normalize_path("/rigs/"), "/rigs");
        assert_eq!(normalize_path("/../rigs"), "/rigs");
        assert_eq!(normalize_path("../rigs"), "../rigs");
        assert_eq!(normalize_path("."), ".");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn keeps_windows_style() {
        assert_eq!(normalize_path(r"D:\Rigs\\Apollo\..\Artemis.ma"), r"D:\Rigs\Artemis.ma");
        assert_eq!(normalize_path(r"\\server\share\rig.mb"), r"\\server\share\rig.mb");
    }

    #[test]
    fn keys_ignore_separator_style() {
        assert_eq!(path_key(r"D:\Rigs\Apollo.ma"), path_key("D:/Rigs/Apollo.ma"));
        assert_eq!(reference_key(r"D:\Rigs\Apollo.MA"), "d:/rigs/apollo.ma");
    }
}
