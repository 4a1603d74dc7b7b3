/// Parse a URL list in the one-per-line format the CLI consumes.
///
/// Lines are trimmed; blank lines and `#` comments are skipped. No URL
/// validation happens here; a malformed entry becomes a per-item fetch
/// failure, not an input error.
pub fn parse_url_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToOwned::to_owned)
        .collect()
}
