//! Line classification for feature text.
//!
//! Feature files are line oriented: every line is classified on its own, the parser
//! then decides whether the kind is acceptable in its current state.

/// Keywords that open a scenario. Longest first so prefixes don't shadow them.
pub const SCENARIO_KEYWORDS: [&str; 4] =
    ["Scenario Outline", "Scenario Template", "Scenario", "Example"];

pub const EXAMPLES_KEYWORDS: [&str; 2] = ["Examples", "Scenarios"];

pub const STEP_KEYWORDS: [&str; 6] = ["Given", "When", "Then", "And", "But", "*"];

pub const DOC_STRING_DELIMITERS: [&str; 2] = ["\"\"\"", "```"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Empty,
    Comment,
    TagLine,
    FeatureLine,
    BackgroundLine,
    ScenarioLine,
    ExamplesLine,
    StepLine,
    /// `| a | b |`
    TableRow,
    /// Starts with `|` but is not closed by one
    MalformedRow,
    DocStringSeparator,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// 1-based line number
    pub line: usize,
    /// 1-based column of the first non-blank character
    pub column: usize,
    /// Line as written, without the line terminator
    pub raw: &'a str,
    /// Line without surrounding whitespace
    pub text: &'a str,
    /// Matched keyword (without a trailing colon) or doc string delimiter
    pub keyword: &'a str,
    /// Text after the keyword
    pub rest: &'a str,
}

/// Split text into classified lines.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    text.split('\n')
        .enumerate()
        .map(|(i, raw)| classify(i + 1, raw.strip_suffix('\r').unwrap_or(raw)))
        .collect()
}

fn classify<'a>(line: usize, raw: &'a str) -> Token<'a> {
    let trimmed_start = raw.trim_start();
    let column = raw[..raw.len() - trimmed_start.len()].chars().count() + 1;
    let text = trimmed_start.trim_end();

    let token = |kind: TokenKind, keyword: &'a str, rest: &'a str| Token {
        kind,
        line,
        column,
        raw,
        text,
        keyword,
        rest: rest.trim(),
    };

    if text.is_empty() {
        return token(TokenKind::Empty, "", "");
    }
    if text.starts_with('#') {
        return token(TokenKind::Comment, "", text);
    }
    if text.starts_with('@') {
        return token(TokenKind::TagLine, "", text);
    }
    if let Some(delimiter) = DOC_STRING_DELIMITERS.iter().find(|d| text.starts_with(**d)) {
        return token(TokenKind::DocStringSeparator, *delimiter, &text[delimiter.len()..]);
    }
    if text.starts_with('|') {
        let kind = if text.len() > 1 && text.ends_with('|') {
            TokenKind::TableRow
        } else {
            TokenKind::MalformedRow
        };
        return token(kind, "", text);
    }
    if let Some(rest) = after_colon(text, "Feature") {
        return token(TokenKind::FeatureLine, "Feature", rest);
    }
    if let Some(rest) = after_colon(text, "Background") {
        return token(TokenKind::BackgroundLine, "Background", rest);
    }
    for keyword in EXAMPLES_KEYWORDS {
        if let Some(rest) = after_colon(text, keyword) {
            return token(TokenKind::ExamplesLine, keyword, rest);
        }
    }
    for keyword in SCENARIO_KEYWORDS {
        if let Some(rest) = after_colon(text, keyword) {
            return token(TokenKind::ScenarioLine, keyword, rest);
        }
    }
    for keyword in STEP_KEYWORDS {
        match text.strip_prefix(keyword) {
            Some(rest) if rest.starts_with([' ', '\t']) => {
                return token(TokenKind::StepLine, keyword, rest);
            }
            _ => {}
        }
    }
    token(TokenKind::Other, "", text)
}

fn after_colon<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    text.strip_prefix(keyword)?.strip_prefix(':')
}

/// Split a table row into trimmed cells. `\|`, `\\` and `\n` are cell escapes.
pub fn split_cells(row: &str) -> Vec<String> {
    let inner = row
        .strip_prefix('|')
        .and_then(|r| r.strip_suffix('|'))
        .unwrap_or(row);

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('|') => cell.push('|'),
                Some('n') => cell.push('\n'),
                Some('\\') => cell.push('\\'),
                Some(other) => {
                    cell.push('\\');
                    cell.push(other);
                }
                None => cell.push('\\'),
            },
            '|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}
