/// Normalizes an entity label into its alignment key
///
/// - Trims and lowercases
/// - For URL-shaped labels, strips `resource_prefix` (or everything up to the
///   last `/` when the prefix does not match)
/// - Turns `_` and `-` into spaces
/// - Drops a trailing parenthetical disambiguation such as `(film)`
/// - Collapses whitespace
///
/// # Examples
///
/// ```
/// use trope_atlas::align::normalize_label;
///
/// let prefix = "http://dbpedia.org/resource/";
/// assert_eq!(normalize_label("http://dbpedia.org/resource/Alien_(film)", prefix), "alien");
/// assert_eq!(normalize_label("  The   Matrix ", prefix), "the matrix");
/// ```
pub fn normalize_label(label: &str, resource_prefix: &str) -> String {
    let trimmed = label.trim();

    let name = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        match trimmed.strip_prefix(resource_prefix) {
            Some(rest) if !resource_prefix.is_empty() => rest,
            _ => trimmed.rsplit('/').next().unwrap_or(trimmed),
        }
    } else {
        trimmed
    };

    let spaced: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    collapse_whitespace(strip_disambiguation(spaced.trim()))
}

/// Removes one trailing `( ... )` group, keeping labels that are only a group
fn strip_disambiguation(text: &str) -> &str {
    if !text.ends_with(')') {
        return text;
    }
    match text.rfind('(') {
        Some(open) if open > 0 => text[..open].trim_end(),
        _ => text,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
