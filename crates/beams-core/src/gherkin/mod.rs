//! Structured-text codec for feature files.
//!
//! - `token` - line classification
//! - `parser` - text to [`ScenarioDocument`], with located errors
//! - `render` - remote records to text
//! - `escape` - keyword escaping for free text

pub mod escape;
pub mod parser;
pub mod render;
pub mod token;

pub use escape::{escape, unescape};
pub use parser::{
    parse_document, Background, Comment, Feature, FeatureChild, Location, ParseError, Scenario,
    ScenarioDocument, Step, StepArgument, Tag,
};
pub use render::{
    decode_description, encode_description, extract_body, render_background, render_feature,
    render_scenario,
};

use serde::Serialize;

/// 0-based, end-exclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

/// A parse error mapped back to the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub range: Range,
    pub message: String,
}

impl Diagnostic {
    /// Convert a 1-based error location. The range covers the offending token.
    pub fn from_error(path: &str, error: &ParseError) -> Self {
        let line = error.location.line.saturating_sub(1);
        let column = error.location.column.saturating_sub(1);
        Self {
            path: path.to_string(),
            range: Range {
                start_line: line,
                start_column: column,
                end_line: line,
                end_column: column + error.token.chars().count(),
            },
            message: error.message.clone(),
        }
    }
}

/// Result of parsing a set of buffers.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// One per buffer that parsed cleanly, in input order
    pub documents: Vec<ScenarioDocument>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_errors: bool,
}

/// Parse named buffers. A buffer with errors contributes diagnostics and no document.
///
/// A feature file always belongs to a folder, so a buffer without a `Feature:` line
/// is an error here even though it is a valid empty document.
pub fn parse_features<'a, I>(sources: I) -> ParseOutcome
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut outcome = ParseOutcome::default();
    for (path, text) in sources {
        match parse_document(path, text) {
            Ok(document) if document.feature.is_none() => {
                outcome.has_errors = true;
                outcome
                    .diagnostics
                    .push(Diagnostic::from_error(path, &missing_feature(text)));
            }
            Ok(document) => outcome.documents.push(document),
            Err(errors) => {
                outcome.has_errors = true;
                outcome
                    .diagnostics
                    .extend(errors.iter().map(|e| Diagnostic::from_error(path, e)));
            }
        }
    }
    outcome
}

/// Error at end of file for a buffer that never declares its feature.
fn missing_feature(text: &str) -> ParseError {
    ParseError {
        location: Location {
            line: text.lines().count() + 1,
            column: 1,
        },
        token: String::new(),
        message: "unexpected end of file, expected: #FeatureLine".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_features_splits_documents_and_diagnostics() {
        let good = "Feature: A\nScenario: s\n\tGiven x\n";
        let bad = "Feature: B\nScenario: s\n\tGiven x\n\t| a | b |\n\t| 1 | 2\n";
        let outcome = parse_features([("/A/A.feature", good), ("/B/B.feature", bad)]);

        assert!(outcome.has_errors);
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].uri, "/A/A.feature");
        assert_eq!(outcome.diagnostics.len(), 1);

        let diagnostic = &outcome.diagnostics[0];
        assert_eq!(diagnostic.path, "/B/B.feature");
        assert_eq!(
            diagnostic.range,
            Range {
                start_line: 4,
                start_column: 1,
                end_line: 4,
                end_column: 8,
            }
        );
    }

    #[test]
    fn test_parse_features_empty_input() {
        let outcome = parse_features(std::iter::empty());
        assert!(!outcome.has_errors);
        assert!(outcome.documents.is_empty());
    }

    #[test]
    fn test_parse_features_requires_feature_line() {
        let outcome = parse_features([("/A/A.feature", "# all gone\n")]);
        assert!(outcome.has_errors);
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].path, "/A/A.feature");
        assert_eq!(outcome.diagnostics[0].range.start_line, 1);
        assert!(outcome.diagnostics[0].message.contains("#FeatureLine"));
    }

    #[test]
    fn test_rendered_description_survives_parse() {
        let description = "Given this line is prose\nsecond line";
        let text = format!(
            "Feature: F\n\n@BUG-123 @smoke\nScenario: s\n{}\n\tGiven step\n",
            encode_description(description)
        );
        let document = parse_document("/F/F.feature", &text).unwrap();
        let feature = document.feature.unwrap();
        let scenario = feature.scenarios().next().unwrap();
        assert_eq!(scenario.steps.len(), 1);
        assert_eq!(decode_description(&scenario.description), description);
    }
}
