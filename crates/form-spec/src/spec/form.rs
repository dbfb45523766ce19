use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::spec::field::{FieldDescriptor, FieldType};

/// Ordered field list plus form level flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FormConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Puts every field in read-only mode.
    #[serde(default)]
    pub disabled: bool,
    pub fields: Vec<FieldDescriptor>,
}

impl FormConfiguration {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("Untitled form")
    }

    /// JSON Schema describing the configuration file format.
    pub fn json_schema() -> serde_json::Value {
        schemars::schema_for!(FormConfiguration).to_value()
    }

    /// Lints the configuration, returning every issue found.
    pub fn check(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();
        let names: BTreeSet<&str> = self.fields.iter().map(|field| field.name.as_str()).collect();

        for field in &self.fields {
            if field.name.trim().is_empty() {
                issues.push(ConfigIssue::error(&field.name, IssueKind::EmptyName));
            } else if !seen.insert(field.name.as_str()) {
                issues.push(ConfigIssue::error(&field.name, IssueKind::DuplicateName));
            }

            if let Some(cols) = field.cols
                && !(1..=6).contains(&cols)
            {
                issues.push(ConfigIssue::error(&field.name, IssueKind::ColsOutOfRange(cols)));
            }

            if let Some(expression) = field.rendering_condition.as_deref()
                && !expression.trim().is_empty()
            {
                match Condition::parse(expression) {
                    Ok(condition) => {
                        for reference in condition.references() {
                            if !references_known_field(&reference, &names) {
                                issues.push(ConfigIssue::error(
                                    &field.name,
                                    IssueKind::UnknownReference(reference),
                                ));
                            }
                        }
                    }
                    Err(err) => issues.push(ConfigIssue::error(
                        &field.name,
                        IssueKind::MalformedCondition(err.to_string()),
                    )),
                }
            }

            if field.kind.is_choice() && field.options.is_empty() {
                issues.push(ConfigIssue::error(&field.name, IssueKind::MissingOptions));
            }

            if let (Some(min), Some(max)) = (field.min_checked, field.max_checked)
                && min > max
            {
                issues.push(ConfigIssue::error(
                    &field.name,
                    IssueKind::CheckedBoundsInverted { min, max },
                ));
            }

            if field.kind == FieldType::Relation
                && field
                    .api_endpoint
                    .as_deref()
                    .is_none_or(|endpoint| endpoint.trim().is_empty())
            {
                issues.push(ConfigIssue::warning(&field.name, IssueKind::MissingEndpoint));
            }
        }

        issues
    }
}

/// A reference matches a field when it names it exactly or addresses into it.
fn references_known_field(reference: &str, names: &BTreeSet<&str>) -> bool {
    if names.contains(reference) {
        return true;
    }
    names.iter().any(|name| {
        reference
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum IssueKind {
    EmptyName,
    DuplicateName,
    ColsOutOfRange(u8),
    MalformedCondition(String),
    UnknownReference(String),
    MissingOptions,
    CheckedBoundsInverted { min: usize, max: usize },
    MissingEndpoint,
}

/// One finding reported by [`FormConfiguration::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub field: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl ConfigIssue {
    fn error(field: &str, kind: IssueKind) -> Self {
        Self {
            field: field.to_string(),
            severity: Severity::Error,
            kind,
        }
    }

    fn warning(field: &str, kind: IssueKind) -> Self {
        Self {
            field: field.to_string(),
            severity: Severity::Warning,
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: field '{}': ", level, self.field)?;
        match &self.kind {
            IssueKind::EmptyName => write!(f, "name is empty"),
            IssueKind::DuplicateName => write!(f, "name is used by another field"),
            IssueKind::ColsOutOfRange(cols) => write!(f, "cols {} is outside 1..=6", cols),
            IssueKind::MalformedCondition(reason) => {
                write!(f, "rendering condition does not parse: {}", reason)
            }
            IssueKind::UnknownReference(name) => {
                write!(f, "rendering condition references unknown field '{}'", name)
            }
            IssueKind::MissingOptions => write!(f, "choice field has no options"),
            IssueKind::CheckedBoundsInverted { min, max } => {
                write!(f, "minChecked {} exceeds maxChecked {}", min, max)
            }
            IssueKind::MissingEndpoint => write!(f, "relation field has no apiEndpoint"),
        }
    }
}
