use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input kinds understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum FieldType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "textarea")]
    Textarea,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "radio")]
    Radio,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "country")]
    Country,
    #[serde(rename = "preferred_country")]
    PreferredCountry,
    #[serde(rename = "multi-checkbox", alias = "multi_checkbox")]
    MultiCheckbox,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "relation")]
    Relation,
}

impl FieldType {
    pub const ALL: [FieldType; 14] = [
        FieldType::Text,
        FieldType::Email,
        FieldType::Number,
        FieldType::Url,
        FieldType::Textarea,
        FieldType::Select,
        FieldType::Radio,
        FieldType::Date,
        FieldType::Phone,
        FieldType::Country,
        FieldType::PreferredCountry,
        FieldType::MultiCheckbox,
        FieldType::Image,
        FieldType::Relation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Number => "number",
            FieldType::Url => "url",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Date => "date",
            FieldType::Phone => "phone",
            FieldType::Country => "country",
            FieldType::PreferredCountry => "preferred_country",
            FieldType::MultiCheckbox => "multi-checkbox",
            FieldType::Image => "image",
            FieldType::Relation => "relation",
        }
    }

    /// Kinds whose value is picked from a list of options.
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::Radio | FieldType::MultiCheckbox
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{label, value}` entry of a select, radio or checkbox group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldOption {
    pub label: String,
    #[serde(deserialize_with = "scalar_as_string")]
    #[schemars(with = "String")]
    pub value: String,
}

impl FieldOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Declarative description of one form input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_checked: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_checked: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering_condition: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Width on a six column grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    /// Upper bound in bytes for the picked image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_path: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: false,
            min_length: None,
            min_checked: None,
            max_checked: None,
            options: Vec::new(),
            rendering_condition: None,
            disabled: false,
            placeholder: None,
            description: None,
            cols: None,
            api_endpoint: None,
            query_params: BTreeMap::new(),
            label_field: None,
            value_field: None,
            multiple: false,
            aspect_ratio: None,
            max_file_size: None,
            upload_path: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, L, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (L, V)>,
        L: Into<String>,
        V: Into<String>,
    {
        self.options = options
            .into_iter()
            .map(|(label, value)| FieldOption::new(label, value))
            .collect();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.rendering_condition = Some(condition.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    /// True when the field carries a non-blank rendering condition.
    pub fn is_conditional(&self) -> bool {
        self.rendering_condition
            .as_deref()
            .is_some_and(|condition| !condition.trim().is_empty())
    }

    /// Whether the field holds a list of values rather than a scalar.
    pub fn holds_list(&self) -> bool {
        match self.kind {
            FieldType::MultiCheckbox => true,
            FieldType::Relation => self.multiple,
            _ => false,
        }
    }

    /// Value a field holds before the user touches it.
    pub fn empty_value(&self) -> Value {
        if self.holds_list() {
            return Value::Array(Vec::new());
        }
        match self.kind {
            FieldType::Number | FieldType::Date | FieldType::Image => Value::Null,
            _ => Value::String(String::new()),
        }
    }

    pub fn label_field(&self) -> &str {
        self.label_field.as_deref().unwrap_or("name")
    }

    pub fn value_field(&self) -> &str {
        self.value_field.as_deref().unwrap_or("id")
    }

    /// Layout width clamped to the six column grid; full width by default.
    pub fn layout_cols(&self) -> u8 {
        self.cols.map(|cols| cols.clamp(1, 6)).unwrap_or(6)
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "option value must be a string or number, got {}",
            other
        ))),
    }
}
