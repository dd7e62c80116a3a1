/// Drops markdown emphasis and heading characters and trims the result.
pub fn strip_markup(line: &str) -> String {
    line.chars()
        .filter(|c| *c != '*' && *c != '#')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Joins `lines` with `\n` after dropping whitespace-only lines at both ends.
pub fn join_trimmed_lines(lines: &[&str]) -> String {
    let is_blank = |line: &&str| line.trim().is_empty();
    let start = lines.iter().position(|l| !is_blank(l));
    let end = lines.iter().rposition(|l| !is_blank(l));

    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Replaces the first occurrence of `needle`. Returns `None` when it does not occur.
pub fn replace_first(haystack: &str, needle: &str, replacement: &str) -> Option<String> {
    if needle.is_empty() {
        return None;
    }
    let start = haystack.find(needle)?;
    let mut out = String::with_capacity(haystack.len() - needle.len() + replacement.len());
    out.push_str(&haystack[..start]);
    out.push_str(replacement);
    out.push_str(&haystack[start + needle.len()..]);
    Some(out)
}
