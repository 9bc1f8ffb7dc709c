//! Remote records to feature text, and the description transforms in both directions.

use super::escape::{escape, unescape};
use crate::fields::CustomFieldMap;
use crate::model::IssueRecord;

/// Prefix every line with one tab.
pub fn indent(text: &str) -> String {
    format!("\t{}", text.replace('\n', "\n\t"))
}

/// Description as written into feature text: escaped, one tab per line.
pub fn encode_description(description: &str) -> String {
    indent(&escape(description))
}

/// Description as stored remotely: one leading tab stripped per line, trimmed,
/// unescaped.
pub fn decode_description(raw: &str) -> String {
    let stripped = raw
        .split('\n')
        .map(|line| line.strip_prefix('\t').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");
    unescape(stripped.trim())
}

/// Lines `start..end` of `text` (0-based start, exclusive end), each with one leading
/// tab removed. Blank lines in front of the first body line are dropped.
pub fn extract_body(text: &str, start: usize, end: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let end = end.min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end]
        .iter()
        .copied()
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .skip_while(|l| l.trim().is_empty())
        .map(|l| l.strip_prefix('\t').unwrap_or(l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_body(out: &mut String, description: Option<&str>, steps: Option<&str>) {
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        out.push_str(&encode_description(description));
        out.push('\n');
    }
    if let Some(steps) = steps.filter(|s| !s.is_empty()) {
        out.push_str(&indent(steps));
        out.push('\n');
    }
}

/// One tagged scenario block ending in a newline.
pub fn render_scenario(issue: &IssueRecord, fields: &CustomFieldMap) -> String {
    let tags: Vec<String> = issue
        .fields
        .labels
        .iter()
        .chain(std::iter::once(&issue.key))
        .map(|l| format!("@{}", l))
        .collect();
    let kind = issue.scenario_kind(fields).unwrap_or_default();

    let mut out = format!(
        "{}\n{}: {}\n",
        tags.join(" "),
        kind.keyword(),
        issue.fields.summary
    );
    push_body(
        &mut out,
        issue.fields.description.as_deref(),
        issue.scenario_steps(fields),
    );
    out
}

/// Background block for a precondition. Its key rides in a `#@KEY` comment.
pub fn render_background(precondition: &IssueRecord, fields: &CustomFieldMap) -> String {
    let mut out = format!(
        "#@{}\nBackground: {}\n",
        precondition.key, precondition.fields.summary
    );
    push_body(
        &mut out,
        precondition.fields.description.as_deref(),
        precondition.conditions(fields),
    );
    out
}

/// Complete feature file of a folder. `scenarios` must already be in rank order.
pub fn render_feature(
    folder_name: &str,
    background: Option<&IssueRecord>,
    scenarios: &[IssueRecord],
    fields: &CustomFieldMap,
) -> String {
    let blocks: Vec<String> = background
        .map(|b| render_background(b, fields))
        .into_iter()
        .chain(scenarios.iter().map(|s| render_scenario(s, fields)))
        .collect();
    format!("Feature: {}\n\n{}", folder_name, blocks.join("\n"))
}
