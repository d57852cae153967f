/// Normalize free text into a file-name friendly slug.
///
/// Runs of anything other than ASCII letters and digits collapse to a single
/// separator, leading and trailing separators are dropped, words are joined
/// with `-` and the result is lower-cased.
pub fn slugify(input: &str) -> String {
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_ascii_lowercase()
}
