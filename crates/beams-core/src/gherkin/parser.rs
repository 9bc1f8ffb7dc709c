//! Recursive-descent parser producing [`ScenarioDocument`]s.
//!
//! The parser never stops at the first problem: an unexpected line is reported and
//! skipped, so every offending line yields exactly one [`ParseError`]. A document with
//! any error is rejected as a whole.

use super::token::{split_cells, tokenize, Token, TokenKind};
use crate::model::ScenarioKind;

/// 1-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    fn of(token: &Token<'_>) -> Self {
        Self {
            line: token.line,
            column: token.column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Tag name without the leading `@`
    pub name: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Comment line without surrounding whitespace, `#` included
    pub text: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocString {
    pub delimiter: String,
    pub media_type: Option<String>,
    pub content: String,
    pub location: Location,
    /// Line of the closing delimiter
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepArgument {
    DataTable(DataTable),
    DocString(DocString),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub keyword: String,
    pub text: String,
    pub location: Location,
    pub argument: Option<StepArgument>,
}

impl Step {
    /// Last line occupied by the step, including its table or doc string.
    pub fn end_line(&self) -> usize {
        match &self.argument {
            Some(StepArgument::DataTable(table)) => table
                .rows
                .last()
                .map_or(self.location.line, |r| r.location.line),
            Some(StepArgument::DocString(doc)) => doc.end_line,
            None => self.location.line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Examples {
    pub tags: Vec<Tag>,
    pub keyword: String,
    pub name: String,
    pub description: String,
    pub location: Location,
    pub header: Option<TableRow>,
    pub body: Vec<TableRow>,
}

impl Examples {
    pub fn end_line(&self) -> usize {
        self.body
            .last()
            .or(self.header.as_ref())
            .map_or(self.location.line, |r| r.location.line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub tags: Vec<Tag>,
    pub keyword: String,
    pub name: String,
    /// Description lines as written, indentation included
    pub description: String,
    /// Last line of the description, if there is one
    pub description_end: Option<usize>,
    pub location: Location,
    pub steps: Vec<Step>,
    pub examples: Vec<Examples>,
}

impl Scenario {
    pub fn kind(&self) -> ScenarioKind {
        ScenarioKind::from_keyword(&self.keyword)
    }

    /// Line after which the body (steps and examples) starts.
    pub fn body_start(&self) -> usize {
        self.description_end.unwrap_or(self.location.line)
    }

    /// Last line of the body: the last example row, or the end of the last step.
    pub fn body_end(&self) -> usize {
        match (self.examples.last(), self.steps.last()) {
            (Some(examples), _) => examples.end_line(),
            (None, Some(step)) => step.end_line(),
            (None, None) => self.body_start(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub keyword: String,
    pub name: String,
    pub description: String,
    pub description_end: Option<usize>,
    pub location: Location,
    pub steps: Vec<Step>,
}

impl Background {
    pub fn body_start(&self) -> usize {
        self.description_end.unwrap_or(self.location.line)
    }

    pub fn body_end(&self) -> usize {
        self.steps.last().map_or(self.body_start(), Step::end_line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureChild {
    Background(Background),
    Scenario(Scenario),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub tags: Vec<Tag>,
    pub keyword: String,
    pub name: String,
    pub description: String,
    pub location: Location,
    pub children: Vec<FeatureChild>,
}

impl Feature {
    pub fn background(&self) -> Option<&Background> {
        self.children.iter().find_map(|c| match c {
            FeatureChild::Background(b) => Some(b),
            FeatureChild::Scenario(_) => None,
        })
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.children.iter().filter_map(|c| match c {
            FeatureChild::Scenario(s) => Some(s),
            FeatureChild::Background(_) => None,
        })
    }
}

/// Structured form of one feature file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDocument {
    /// Path of the buffer this document was parsed from
    pub uri: String,
    /// `None` for a file without a `Feature:` line
    pub feature: Option<Feature>,
    pub comments: Vec<Comment>,
}

/// A located structural error.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub location: Location,
    /// Offending text; empty at end of file
    pub token: String,
    pub message: String,
}

const BEFORE_FEATURE: &str = "#EOF, #TagLine, #FeatureLine, #Comment, #Empty";
const AFTER_TAGS: &str = "#TagLine, #FeatureLine, #ScenarioLine, #ExamplesLine, #Comment, #Empty";
const FEATURE_BODY: &str = "#EOF, #Comment, #BackgroundLine, #TagLine, #ScenarioLine, #Empty";
const IN_STEPS: &str =
    "#EOF, #StepLine, #TableRow, #DocStringSeparator, #TagLine, #ScenarioLine, #ExamplesLine, #Comment, #Empty";

/// Parse a single feature file.
pub fn parse_document(uri: &str, text: &str) -> Result<ScenarioDocument, Vec<ParseError>> {
    let mut parser = Parser {
        tokens: tokenize(text),
        pos: 0,
        errors: Vec::new(),
        comments: Vec::new(),
    };
    let feature = parser.parse_feature();
    if parser.errors.is_empty() {
        Ok(ScenarioDocument {
            uri: uri.to_string(),
            feature,
            comments: parser.comments,
        })
    } else {
        Err(parser.errors)
    }
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    errors: Vec<ParseError>,
    comments: Vec<Comment>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    /// Skip blank lines and collect comments.
    fn skip_trivia(&mut self) {
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Empty => {}
                TokenKind::Comment => self.comments.push(Comment {
                    text: token.text.to_string(),
                    location: Location::of(&token),
                }),
                _ => break,
            }
            self.pos += 1;
        }
    }

    /// Next token that is not blank, a comment or a tag line.
    fn next_significant(&self) -> Option<Token<'a>> {
        self.tokens[self.pos..]
            .iter()
            .find(|t| {
                !matches!(
                    t.kind,
                    TokenKind::Empty | TokenKind::Comment | TokenKind::TagLine
                )
            })
            .copied()
    }

    fn unexpected(&mut self, token: Token<'a>, expected: &str) {
        self.errors.push(ParseError {
            location: Location::of(&token),
            token: token.text.to_string(),
            message: format!(
                "({}:{}): expected: {}, got '{}'",
                token.line, token.column, expected, token.text
            ),
        });
        self.pos += 1;
    }

    fn unexpected_eof(&mut self, expected: &str) {
        let line = self.tokens.len();
        self.errors.push(ParseError {
            location: Location { line, column: 1 },
            token: String::new(),
            message: format!("({}:1): unexpected end of file, expected: {}", line, expected),
        });
    }

    fn parse_tags(&mut self) -> Vec<Tag> {
        let mut tags = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(token) if token.kind == TokenKind::TagLine => {
                    self.pos += 1;
                    for word in token.text.split_whitespace() {
                        if word.starts_with('#') {
                            break;
                        }
                        match word.strip_prefix('@') {
                            Some(name) if !name.is_empty() => tags.push(Tag {
                                name: name.to_string(),
                                location: Location::of(&token),
                            }),
                            _ => self.errors.push(ParseError {
                                location: Location::of(&token),
                                token: token.text.to_string(),
                                message: format!(
                                    "({}:{}): a tag may not contain whitespace, got '{}'",
                                    token.line, token.column, token.text
                                ),
                            }),
                        }
                    }
                }
                _ => return tags,
            }
        }
    }

    /// Description lines up to the next structural line. Returns the text and its
    /// last line.
    fn parse_description(&mut self) -> (String, Option<usize>) {
        self.skip_trivia();
        let mut lines: Vec<&str> = Vec::new();
        let mut kept = 0;
        let mut end = None;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Other => {
                    lines.push(token.raw);
                    kept = lines.len();
                    end = Some(token.line);
                }
                TokenKind::Empty if !lines.is_empty() => lines.push(token.raw),
                _ => break,
            }
            self.pos += 1;
        }
        lines.truncate(kept);
        (lines.join("\n"), end)
    }

    fn parse_feature(&mut self) -> Option<Feature> {
        loop {
            let tags = self.parse_tags();
            let Some(token) = self.peek() else {
                if !tags.is_empty() {
                    self.unexpected_eof(AFTER_TAGS);
                }
                return None;
            };
            if token.kind != TokenKind::FeatureLine {
                self.unexpected(token, BEFORE_FEATURE);
                continue;
            }
            self.pos += 1;
            let (description, _) = self.parse_description();
            let children = self.parse_children();
            return Some(Feature {
                tags,
                keyword: token.keyword.to_string(),
                name: token.rest.to_string(),
                description,
                location: Location::of(&token),
                children,
            });
        }
    }

    fn parse_children(&mut self) -> Vec<FeatureChild> {
        let mut children = Vec::new();
        loop {
            let tags = self.parse_tags();
            let Some(token) = self.peek() else {
                if !tags.is_empty() {
                    self.unexpected_eof(AFTER_TAGS);
                }
                return children;
            };
            match token.kind {
                TokenKind::BackgroundLine if tags.is_empty() && children.is_empty() => {
                    self.pos += 1;
                    children.push(FeatureChild::Background(self.parse_background(token)));
                }
                TokenKind::ScenarioLine => {
                    self.pos += 1;
                    children.push(FeatureChild::Scenario(self.parse_scenario(tags, token)));
                }
                _ => self.unexpected(token, FEATURE_BODY),
            }
        }
    }

    fn parse_background(&mut self, token: Token<'a>) -> Background {
        let (description, description_end) = self.parse_description();
        Background {
            keyword: token.keyword.to_string(),
            name: token.rest.to_string(),
            description,
            description_end,
            location: Location::of(&token),
            steps: self.parse_steps(),
        }
    }

    fn parse_scenario(&mut self, tags: Vec<Tag>, token: Token<'a>) -> Scenario {
        let (description, description_end) = self.parse_description();
        let steps = self.parse_steps();
        let mut examples = Vec::new();
        while let Some(next) = self.next_significant() {
            if next.kind != TokenKind::ExamplesLine {
                break;
            }
            let tags = self.parse_tags();
            self.pos += 1;
            examples.push(self.parse_examples(tags, next));
        }
        Scenario {
            tags,
            keyword: token.keyword.to_string(),
            name: token.rest.to_string(),
            description,
            description_end,
            location: Location::of(&token),
            steps,
            examples,
        }
    }

    fn parse_examples(&mut self, tags: Vec<Tag>, token: Token<'a>) -> Examples {
        let (description, _) = self.parse_description();
        let mut rows = self.parse_table().into_iter();
        Examples {
            tags,
            keyword: token.keyword.to_string(),
            name: token.rest.to_string(),
            description,
            location: Location::of(&token),
            header: rows.next(),
            body: rows.collect(),
        }
    }

    fn parse_steps(&mut self) -> Vec<Step> {
        let mut steps = Vec::new();
        loop {
            self.skip_trivia();
            let Some(token) = self.peek() else {
                return steps;
            };
            match token.kind {
                TokenKind::StepLine => {
                    self.pos += 1;
                    let argument = self.parse_step_argument();
                    steps.push(Step {
                        keyword: token.keyword.to_string(),
                        text: token.rest.to_string(),
                        location: Location::of(&token),
                        argument,
                    });
                }
                TokenKind::TableRow
                | TokenKind::MalformedRow
                | TokenKind::DocStringSeparator
                | TokenKind::Other => self.unexpected(token, IN_STEPS),
                _ => return steps,
            }
        }
    }

    fn parse_step_argument(&mut self) -> Option<StepArgument> {
        self.skip_trivia();
        match self.peek()?.kind {
            TokenKind::TableRow | TokenKind::MalformedRow => {
                let rows = self.parse_table();
                if rows.is_empty() {
                    None
                } else {
                    Some(StepArgument::DataTable(DataTable { rows }))
                }
            }
            TokenKind::DocStringSeparator => self.parse_doc_string().map(StepArgument::DocString),
            _ => None,
        }
    }

    fn parse_table(&mut self) -> Vec<TableRow> {
        let mut rows: Vec<TableRow> = Vec::new();
        loop {
            self.skip_trivia();
            let Some(token) = self.peek() else {
                return rows;
            };
            match token.kind {
                TokenKind::TableRow => {
                    self.pos += 1;
                    let cells = split_cells(token.text);
                    let width = rows.first().map(|r| r.cells.len());
                    if width.is_some_and(|w| w != cells.len()) {
                        self.errors.push(ParseError {
                            location: Location::of(&token),
                            token: token.text.to_string(),
                            message: format!(
                                "({}:{}): inconsistent cell count within the table, got '{}'",
                                token.line, token.column, token.text
                            ),
                        });
                    } else {
                        rows.push(TableRow {
                            cells,
                            location: Location::of(&token),
                        });
                    }
                }
                TokenKind::MalformedRow => {
                    self.pos += 1;
                    self.errors.push(ParseError {
                        location: Location::of(&token),
                        token: token.text.to_string(),
                        message: format!(
                            "({}:{}): unterminated table row, got '{}'",
                            token.line, token.column, token.text
                        ),
                    });
                }
                _ => return rows,
            }
        }
    }

    fn parse_doc_string(&mut self) -> Option<DocString> {
        let open = self.peek()?;
        self.pos += 1;
        let indent = open.column - 1;
        let mut content: Vec<&str> = Vec::new();
        while let Some(token) = self.peek() {
            self.pos += 1;
            if token.kind == TokenKind::DocStringSeparator && token.keyword == open.keyword {
                return Some(DocString {
                    delimiter: open.keyword.to_string(),
                    media_type: Some(open.rest.to_string()).filter(|m| !m.is_empty()),
                    content: content.join("\n"),
                    location: Location::of(&open),
                    end_line: token.line,
                });
            }
            content.push(strip_indent(token.raw, indent));
        }
        self.errors.push(ParseError {
            location: Location::of(&open),
            token: open.text.to_string(),
            message: format!(
                "({}:{}): unterminated doc string, got '{}'",
                open.line, open.column, open.text
            ),
        });
        None
    }
}

/// Remove up to `indent` leading whitespace characters.
fn strip_indent(line: &str, indent: usize) -> &str {
    let cut = line
        .char_indices()
        .take(indent)
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    &line[cut..]
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = "Feature: Login\n\n\
        @smoke @BUG-1\n\
        Scenario: valid user\n\
        \tUsers with an account\n\
        \tcan sign in\n\
        \tGiven a user\n\
        \tWhen they sign in\n\
        \t| name | pass |\n\
        \t| bob  | x    |\n\
        \n\
        @BUG-2\n\
        Scenario Outline: many\n\
        \tGiven <n>\n\
        \tExamples:\n\
        \t\t| n |\n\
        \t\t| 1 |\n";

    fn feature(text: &str) -> Feature {
        parse_document("/Login/Login.feature", text)
            .unwrap()
            .feature
            .unwrap()
    }

    #[test]
    fn test_parse_scenarios_and_tags() {
        let f = feature(LOGIN);
        assert_eq!(f.name, "Login");
        let scenarios: Vec<&Scenario> = f.scenarios().collect();
        assert_eq!(scenarios.len(), 2);

        let first = scenarios[0];
        let tags: Vec<&str> = first.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tags, vec!["smoke", "BUG-1"]);
        assert_eq!(first.kind(), ScenarioKind::Scenario);
        assert_eq!(first.description, "\tUsers with an account\n\tcan sign in");
        assert_eq!(first.body_start(), 6);
        assert_eq!(first.body_end(), 10);

        let second = scenarios[1];
        assert_eq!(second.kind(), ScenarioKind::Outline);
        assert_eq!(second.body_start(), 13);
        assert_eq!(second.body_end(), 17);
        assert_eq!(second.examples[0].header.as_ref().unwrap().cells, vec!["n"]);
    }

    #[test]
    fn test_background_and_comments() {
        let text = "Feature: F\n\n#@BUG-9\nBackground: setup\n\tGiven x\n\n@BUG-1\nScenario: s\n\tGiven y\n";
        let doc = parse_document("/F/F.feature", text).unwrap();
        let f = doc.feature.unwrap();
        let background = f.background().unwrap();
        assert_eq!(background.name, "setup");
        assert_eq!(background.body_end(), 5);
        assert_eq!(doc.comments[0].text, "#@BUG-9");
        assert_eq!(doc.comments[0].location.line, 3);
    }

    #[test]
    fn test_doc_string_extends_step() {
        let text = "Feature: F\nScenario: s\n\tGiven text\n\t\t\"\"\"\n\t\tline one\n\t\t\"\"\"\n";
        let f = feature(text);
        let scenario = f.scenarios().next().unwrap();
        assert_eq!(scenario.body_end(), 6);
        match &scenario.steps[0].argument {
            Some(StepArgument::DocString(doc)) => assert_eq!(doc.content, "line one"),
            other => panic!("expected doc string, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_table_row_is_one_error() {
        let text = "Feature: F\nScenario: s\n\tGiven x\n\t| a | b |\n\t| 1 | 2\n";
        let errors = parse_document("/F/F.feature", text).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location, Location { line: 5, column: 2 });
        assert_eq!(errors[0].token, "| 1 | 2");
    }

    #[test]
    fn test_prose_between_steps_is_error() {
        let text = "Feature: F\nScenario: s\n\tGiven x\n\tsome prose\n\tThen y\n";
        let errors = parse_document("/F/F.feature", text).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            format!("(4:2): expected: {}, got 'some prose'", IN_STEPS)
        );
    }

    #[test]
    fn test_inconsistent_cells() {
        let text = "Feature: F\nScenario: s\n\tGiven x\n\t| a | b |\n\t| 1 |\n";
        let errors = parse_document("/F/F.feature", text).unwrap_err();
        assert!(errors[0].message.contains("inconsistent cell count"));
    }

    #[test]
    fn test_unterminated_doc_string() {
        let text = "Feature: F\nScenario: s\n\tGiven x\n\t\"\"\"\n\tnever closed\n";
        let errors = parse_document("/F/F.feature", text).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location.line, 4);
    }

    #[test]
    fn test_empty_file_has_no_feature() {
        let doc = parse_document("/F/F.feature", "").unwrap();
        assert!(doc.feature.is_none());
    }

    #[test]
    fn test_escaped_keyword_stays_in_description() {
        let text = "Feature: F\nScenario: s\n\t\\Given it is prose\n\tGiven real step\n";
        let f = feature(text);
        let scenario = f.scenarios().next().unwrap();
        assert_eq!(scenario.description, "\t\\Given it is prose");
        assert_eq!(scenario.steps.len(), 1);
    }

    #[test]
    fn test_text_before_feature_is_error() {
        let errors = parse_document("/F/F.feature", "hello\nFeature: F\n").unwrap_err();
        assert_eq!(errors[0].location.line, 1);
    }
}
