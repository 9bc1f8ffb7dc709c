//! Backslash escaping of structural keywords in free text.
//!
//! Descriptions are prose, but a description line that happens to start with `Given`
//! or `|` would be read back as structure. [`escape`] prefixes such lines with a
//! backslash; [`unescape`] removes exactly that backslash again.

/// Line-start tokens that carry meaning in feature text.
const KEYWORDS: [&str; 20] = [
    "#",
    "@",
    "|",
    "\"\"\"",
    "```",
    "Feature:",
    "Background:",
    "Scenario:",
    "Scenario Outline:",
    "Scenario Template:",
    "Example:",
    "Examples:",
    "Scenarios:",
    "Rule:",
    "Given",
    "When",
    "Then",
    "And",
    "But",
    "*",
];

fn starts_with_keyword(text: &str) -> bool {
    KEYWORDS.iter().any(|k| text.starts_with(k))
}

fn split_indent(line: &str) -> (&str, &str) {
    let body = line.trim_start();
    line.split_at(line.len() - body.len())
}

/// Prefix every line that starts with a keyword with `\`.
pub fn escape(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let (indent, body) = split_indent(line);
            if starts_with_keyword(body) {
                format!("{}\\{}", indent, body)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`escape`]: drop one `\` in front of a line-start keyword.
pub fn unescape(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let (indent, body) = split_indent(line);
            match body.strip_prefix('\\') {
                Some(rest) if starts_with_keyword(rest) => format!("{}{}", indent, rest),
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
