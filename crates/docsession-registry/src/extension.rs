//! File extension helpers.

/// Key for factories that apply to every extension.
pub const WILDCARD: &str = "*";

/// Normalize an extension for lookup.
///
/// Lower-cases and prefixes a `.`; `*` and `.*` both become [`WILDCARD`].
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim();
    if trimmed == WILDCARD || trimmed == ".*" {
        return WILDCARD.to_string();
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Full, possibly compound extension of a path, normalized.
///
/// `dir/x.table.json` yields `.table.json`. Leading dots of a hidden file
/// name do not start an extension, so `.bashrc` yields an empty string.
/// Trailing dots are ignored: `a.b.` yields `.b`.
#[must_use]
pub fn extension_of(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = name.trim_start_matches('.').trim_end_matches('.');
    match stem.find('.') {
        Some(idx) if idx + 1 < stem.len() => stem[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Last dot segment of a normalized extension (`.table.json` → `.json`).
pub(crate) fn last_segment(extension: &str) -> &str {
    match extension.rfind('.') {
        Some(idx) => &extension[idx..],
        None => extension,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_extension("JSON"), ".json");
        assert_eq!(normalize_extension(".Txt"), ".txt");
        assert_eq!(normalize_extension("*"), WILDCARD);
        assert_eq!(normalize_extension(".*"), WILDCARD);
    }

    #[test]
    fn test_extension_of_compound() {
        assert_eq!(extension_of("dir/x.table.json"), ".table.json");
        assert_eq!(extension_of("README.MD"), ".md");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("dir.d/file"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_extension_of_ignores_trailing_dots() {
        assert_eq!(extension_of("a.b."), ".b");
        assert_eq!(extension_of("x.table.JSON.."), ".table.json");
        assert_eq!(last_segment(&extension_of("a.b.")), ".b");
        assert_eq!(extension_of("..."), "");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment(".table.json"), ".json");
        assert_eq!(last_segment(".json"), ".json");
        assert_eq!(last_segment(""), "");
    }
}
