//! Turns field descriptors into one composite validator.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Serialize;
use serde_json::{Number, Value};

use crate::messages::{MessageKey, Messages};
use crate::spec::field::{FieldDescriptor, FieldType};
use crate::values::{ValueMap, as_text, is_empty};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("url pattern")
});

static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("phone pattern"));

/// First violated message per field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` unless the field already has one.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|field, _| keep(field));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(field, message)| (field.as_str(), message.as_str()))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, String)> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut errors = FieldErrors::new();
        for (field, message) in iter {
            errors.insert(field, message);
        }
        errors
    }
}

/// Constraint family a field is checked against.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Free text, optionally pattern checked when non-empty.
    Text {
        min_length: usize,
        format: Option<TextFormat>,
    },
    Number,
    /// Single pick from a list (select, radio, country, single relation).
    Choice,
    Date,
    Phone,
    /// Multiple picks (multi-checkbox, multiple relation).
    Selection { min: usize, max: Option<usize> },
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Email,
    Url,
}

/// Compiled rule for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub kind: RuleKind,
}

/// The type to rule table. Every field type maps to exactly one rule kind.
pub fn rule_kind(field: &FieldDescriptor) -> RuleKind {
    match field.kind {
        FieldType::Text | FieldType::Textarea => RuleKind::Text {
            min_length: field.min_length.unwrap_or(1),
            format: None,
        },
        FieldType::Url => RuleKind::Text {
            min_length: field.min_length.unwrap_or(1),
            format: Some(TextFormat::Url),
        },
        FieldType::Email => RuleKind::Text {
            min_length: 1,
            format: Some(TextFormat::Email),
        },
        FieldType::Number => RuleKind::Number,
        FieldType::Select
        | FieldType::Radio
        | FieldType::Country
        | FieldType::PreferredCountry => RuleKind::Choice,
        FieldType::Date => RuleKind::Date,
        FieldType::Phone => RuleKind::Phone,
        FieldType::MultiCheckbox => RuleKind::Selection {
            min: field.min_checked.unwrap_or(1),
            max: field.max_checked,
        },
        FieldType::Image => RuleKind::File,
        FieldType::Relation if field.multiple => RuleKind::Selection { min: 1, max: None },
        FieldType::Relation => RuleKind::Choice,
    }
}

impl FieldRule {
    /// Conditional fields are always compiled optional; their requiredness
    /// is enforced at submit time against live visibility.
    pub fn from_descriptor(field: &FieldDescriptor) -> Self {
        Self {
            name: field.name.clone(),
            label: field.label.clone(),
            required: field.required && !field.is_conditional(),
            kind: rule_kind(field),
        }
    }

    /// Checks `value`, returning the coerced value or the first violation.
    pub fn check(&self, value: Option<&Value>, messages: &Messages) -> Result<Value, String> {
        let value = value.unwrap_or(&Value::Null);
        let required = || messages.render(MessageKey::Required, &self.label);
        let invalid = |key| messages.render(key, &self.label);

        match &self.kind {
            RuleKind::Text { min_length, format } => {
                let text = as_text(value).ok_or_else(|| invalid(MessageKey::InvalidValue))?;
                if text.trim().is_empty() {
                    return if self.required { Err(required()) } else { Ok(Value::String(text)) };
                }
                if self.required && text.chars().count() < *min_length {
                    return Err(required());
                }
                match format {
                    Some(TextFormat::Email) if !EMAIL.is_match(text.trim()) => {
                        Err(invalid(MessageKey::InvalidEmail))
                    }
                    Some(TextFormat::Url) if !URL.is_match(text.trim()) => {
                        Err(invalid(MessageKey::InvalidUrl))
                    }
                    _ => Ok(Value::String(text)),
                }
            }
            RuleKind::Number => {
                if let Value::Number(number) = value {
                    return Ok(Value::Number(number.clone()));
                }
                let text = as_text(value).ok_or_else(|| invalid(MessageKey::InvalidNumber))?;
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return if self.required { Err(required()) } else { Ok(Value::Null) };
                }
                parse_number(trimmed)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(MessageKey::InvalidNumber))
            }
            RuleKind::Choice => {
                let text = as_text(value).ok_or_else(|| invalid(MessageKey::InvalidValue))?;
                if self.required && text.trim().is_empty() {
                    return Err(required());
                }
                Ok(value.clone())
            }
            RuleKind::Date => match value {
                Value::Null => {
                    if self.required { Err(required()) } else { Ok(Value::Null) }
                }
                Value::String(text) if text.trim().is_empty() => {
                    if self.required { Err(required()) } else { Ok(Value::Null) }
                }
                Value::String(text) if is_date(text.trim()) => Ok(Value::String(text.trim().to_string())),
                _ => Err(invalid(MessageKey::InvalidDate)),
            },
            RuleKind::Phone => {
                let text = as_text(value).ok_or_else(|| invalid(MessageKey::InvalidPhone))?;
                let compact = compact_phone(&text);
                if compact.is_empty() {
                    return if self.required { Err(required()) } else { Ok(Value::String(String::new())) };
                }
                if E164.is_match(&compact) {
                    Ok(Value::String(compact))
                } else {
                    Err(invalid(MessageKey::InvalidPhone))
                }
            }
            RuleKind::Selection { min, max } => {
                let items = match value {
                    Value::Null => Vec::new(),
                    Value::String(text) if text.trim().is_empty() => Vec::new(),
                    Value::Array(items) => items.clone(),
                    _ => return Err(invalid(MessageKey::InvalidValue)),
                };
                if self.required {
                    if items.len() < *min {
                        return Err(if *min <= 1 {
                            required()
                        } else {
                            messages.render_count(MessageKey::MinChecked, &self.label, *min)
                        });
                    }
                    if let Some(max) = max
                        && items.len() > *max
                    {
                        return Err(messages.render_count(MessageKey::MaxChecked, &self.label, *max));
                    }
                }
                Ok(Value::Array(items))
            }
            RuleKind::File => {
                if self.required && is_empty(value) {
                    return Err(required());
                }
                Ok(value.clone())
            }
        }
    }
}

/// Composite validator for a whole form.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: Vec<FieldRule>,
    messages: Messages,
}

/// Compiles the field list with the default message catalog.
pub fn compile(fields: &[FieldDescriptor]) -> Validator {
    compile_with(fields, Messages::default())
}

pub fn compile_with(fields: &[FieldDescriptor], messages: Messages) -> Validator {
    Validator {
        rules: fields.iter().map(FieldRule::from_descriptor).collect(),
        messages,
    }
}

impl Validator {
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Validates every field, returning the coerced mapping on success.
    ///
    /// Keys not described by any rule are passed through untouched.
    pub fn validate(&self, values: &ValueMap) -> Result<ValueMap, FieldErrors> {
        let mut coerced = values.clone();
        let mut errors = FieldErrors::new();
        for rule in &self.rules {
            match rule.check(values.get(&rule.name), &self.messages) {
                Ok(value) => {
                    coerced.insert(rule.name.clone(), value);
                }
                Err(message) => errors.insert(rule.name.clone(), message),
            }
        }
        if errors.is_empty() { Ok(coerced) } else { Err(errors) }
    }
}

/// Integers stay integers so `"42"` becomes `42`, not `42.0`.
fn parse_number(text: &str) -> Option<Number> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Number::from(integer));
    }
    let float = text.parse::<f64>().ok().filter(|value| value.is_finite())?;
    if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        return Some(Number::from(float as i64));
    }
    Number::from_f64(float)
}

fn is_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(text).is_ok()
}

fn compact_phone(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect()
}
