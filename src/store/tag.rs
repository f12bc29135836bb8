/// Canonical form of a tag title: whitespace-separated words, each with an
/// uppercase first letter and lowercase remainder, joined by single spaces.
///
/// Returns an empty string for blank input.
pub fn canonicalize_tag(raw: &str) -> String {
    raw.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
