//! Custom-field map: logical field names resolved to per-installation identifiers.
//!
//! The remote schema only exposes test type, repository path, step text and the
//! precondition fields through opaque `customfield_NNNNN` ids. The map is resolved
//! once per session and passed explicitly into every encode/decode routine.

use crate::model::{IssueRecord, ScenarioKind, TEXT_TEST_TYPE};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Custom field not found on the remote: {0}")]
    Missing(&'static str),
}

/// Logical custom fields the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomField {
    /// Select field: "Cucumber", "Manual", "Generic"
    TestType,
    /// Text field: the folder path a test lives in
    TestRepositoryPath,
    /// Select field: "Scenario" or "Scenario Outline"
    ScenarioType,
    /// Text field: scenario steps
    ScenarioSteps,
    /// Select field: precondition flavour
    PreconditionType,
    /// Text field: precondition steps
    Conditions,
}

impl CustomField {
    pub const ALL: [CustomField; 6] = [
        CustomField::TestType,
        CustomField::TestRepositoryPath,
        CustomField::ScenarioType,
        CustomField::ScenarioSteps,
        CustomField::PreconditionType,
        CustomField::Conditions,
    ];

    /// Display name used to find the field during discovery.
    pub fn display_name(self) -> &'static str {
        match self {
            CustomField::TestType => "Test Type",
            CustomField::TestRepositoryPath => "Test Repository Path",
            CustomField::ScenarioType => "Cucumber Test Type",
            CustomField::ScenarioSteps => "Cucumber Scenario",
            CustomField::PreconditionType => "Pre-Condition Type",
            CustomField::Conditions => "Conditions",
        }
    }
}

/// Immutable lookup table from logical field to remote identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFieldMap {
    ids: HashMap<CustomField, String>,
}

impl CustomFieldMap {
    /// Resolve every logical field from a discovery listing.
    pub fn resolve<'a, I>(descriptors: I) -> Result<Self, FieldError>
    where
        I: IntoIterator<Item = &'a crate::model::FieldDescriptor>,
    {
        let by_name: HashMap<&str, &str> = descriptors
            .into_iter()
            .map(|d| (d.name.as_str(), d.id.as_str()))
            .collect();

        let mut ids = HashMap::new();
        for field in CustomField::ALL {
            let id = by_name
                .get(field.display_name())
                .ok_or(FieldError::Missing(field.display_name()))?;
            ids.insert(field, (*id).to_string());
        }
        Ok(Self { ids })
    }

    /// Build a map from explicit pairs. Fields left out resolve to their display name.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (CustomField, String)>) -> Self {
        let mut ids: HashMap<CustomField, String> = CustomField::ALL
            .iter()
            .map(|f| (*f, f.display_name().to_string()))
            .collect();
        ids.extend(pairs);
        Self { ids }
    }

    /// Remote identifier of a logical field.
    pub fn id(&self, field: CustomField) -> &str {
        self.ids
            .get(&field)
            .map(String::as_str)
            .unwrap_or(field.display_name())
    }
}

/// Read access to custom-field values by logical name.
pub trait FieldAccess {
    fn custom_value(&self, fields: &CustomFieldMap, field: CustomField) -> Option<&Value>;

    /// Text value, or the `value` member of a select option.
    fn custom_text(&self, fields: &CustomFieldMap, field: CustomField) -> Option<&str> {
        match self.custom_value(fields, field)? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(option) => option.get("value").and_then(Value::as_str),
            _ => None,
        }
    }
}

impl FieldAccess for IssueRecord {
    fn custom_value(&self, fields: &CustomFieldMap, field: CustomField) -> Option<&Value> {
        self.fields
            .custom
            .get(fields.id(field))
            .filter(|v| !v.is_null())
    }
}

impl IssueRecord {
    /// Repository path of a test. Empty means the test is orphaned.
    pub fn repository_path<'a>(&'a self, fields: &CustomFieldMap) -> &'a str {
        self.custom_text(fields, CustomField::TestRepositoryPath)
            .unwrap_or("")
    }

    /// Stored scenario kind; `None` when the test is not text-based.
    pub fn scenario_kind(&self, fields: &CustomFieldMap) -> Option<ScenarioKind> {
        self.custom_text(fields, CustomField::ScenarioType)
            .map(ScenarioKind::from_keyword)
    }

    /// Scenario steps of a test.
    pub fn scenario_steps<'a>(&'a self, fields: &CustomFieldMap) -> Option<&'a str> {
        self.custom_text(fields, CustomField::ScenarioSteps)
    }

    /// Steps of a precondition.
    pub fn conditions<'a>(&'a self, fields: &CustomFieldMap) -> Option<&'a str> {
        self.custom_text(fields, CustomField::Conditions)
    }

    /// Whether this is a text-based precondition.
    pub fn is_text_precondition(&self, fields: &CustomFieldMap) -> bool {
        self.custom_text(fields, CustomField::PreconditionType) == Some(TEXT_TEST_TYPE)
    }
}

/// Select-option value as the remote expects it: `{"value": "..."}`.
pub fn option_value(value: &str) -> Value {
    serde_json::json!({ "value": value })
}
