//! Validation message catalog backed by handlebars templates.

use std::collections::BTreeMap;

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("unknown message key '{0}'")]
    UnknownKey(String),
    #[error("invalid template for '{key}': {source}")]
    Template {
        key: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}

/// Identifies one validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    Required,
    InvalidNumber,
    InvalidEmail,
    InvalidUrl,
    InvalidPhone,
    InvalidDate,
    InvalidValue,
    MinChecked,
    MaxChecked,
}

impl MessageKey {
    pub const ALL: [MessageKey; 9] = [
        MessageKey::Required,
        MessageKey::InvalidNumber,
        MessageKey::InvalidEmail,
        MessageKey::InvalidUrl,
        MessageKey::InvalidPhone,
        MessageKey::InvalidDate,
        MessageKey::InvalidValue,
        MessageKey::MinChecked,
        MessageKey::MaxChecked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Required => "required",
            MessageKey::InvalidNumber => "invalid_number",
            MessageKey::InvalidEmail => "invalid_email",
            MessageKey::InvalidUrl => "invalid_url",
            MessageKey::InvalidPhone => "invalid_phone",
            MessageKey::InvalidDate => "invalid_date",
            MessageKey::InvalidValue => "invalid_value",
            MessageKey::MinChecked => "min_checked",
            MessageKey::MaxChecked => "max_checked",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            MessageKey::Required => "{{label}} is required",
            MessageKey::InvalidNumber => "Invalid number",
            MessageKey::InvalidEmail => "Invalid email address",
            MessageKey::InvalidUrl => "Invalid URL",
            MessageKey::InvalidPhone => "Invalid phone number",
            MessageKey::InvalidDate => "Invalid date",
            MessageKey::InvalidValue => "Invalid value for {{label}}",
            MessageKey::MinChecked => "Select at least {{count}} option(s) for {{label}}",
            MessageKey::MaxChecked => "Select at most {{count}} option(s) for {{label}}",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

#[derive(Serialize)]
struct MessageData<'a> {
    label: &'a str,
    count: Option<usize>,
}

/// Registry of message templates; defaults can be overridden per host.
#[derive(Debug, Clone)]
pub struct Messages {
    registry: Handlebars<'static>,
}

impl Default for Messages {
    fn default() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for key in MessageKey::ALL {
            // Built-in templates are static and known to parse.
            let _ = registry.register_template_string(key.as_str(), key.default_template());
        }
        Self { registry }
    }
}

impl Messages {
    /// Default catalog with `overrides` (message key -> template) applied.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, MessageError> {
        let mut messages = Self::default();
        for (name, template) in overrides {
            let key =
                MessageKey::from_name(name).ok_or_else(|| MessageError::UnknownKey(name.clone()))?;
            messages.set(key, template)?;
        }
        Ok(messages)
    }

    pub fn set(&mut self, key: MessageKey, template: &str) -> Result<(), MessageError> {
        self.registry
            .register_template_string(key.as_str(), template)
            .map_err(|source| MessageError::Template {
                key: key.as_str().to_string(),
                source: Box::new(source),
            })
    }

    pub fn render(&self, key: MessageKey, label: &str) -> String {
        self.render_with(key, label, None)
    }

    pub fn render_count(&self, key: MessageKey, label: &str, count: usize) -> String {
        self.render_with(key, label, Some(count))
    }

    fn render_with(&self, key: MessageKey, label: &str, count: Option<usize>) -> String {
        let data = MessageData { label, count };
        self.registry
            .render(key.as_str(), &data)
            .unwrap_or_else(|err| {
                tracing::warn!(key = key.as_str(), error = %err, "message template failed to render");
                format!("{} is invalid", label)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_required_message_uses_label() {
        let messages = Messages::default();
        assert_eq!(
            messages.render(MessageKey::Required, "First name"),
            "First name is required"
        );
        assert_eq!(
            messages.render_count(MessageKey::MinChecked, "Intakes", 2),
            "Select at least 2 option(s) for Intakes"
        );
    }

    #[test]
    fn labels_are_not_html_escaped() {
        let messages = Messages::default();
        assert_eq!(
            messages.render(MessageKey::Required, "Father's name & surname"),
            "Father's name & surname is required"
        );
    }

    #[test]
    fn overrides_replace_templates() {
        let overrides = BTreeMap::from([("required".to_string(), "Please fill {{label}}".to_string())]);
        let messages = Messages::with_overrides(&overrides).expect("overrides");
        assert_eq!(messages.render(MessageKey::Required, "Email"), "Please fill Email");
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let overrides = BTreeMap::from([("nope".to_string(), "x".to_string())]);
        assert!(matches!(
            Messages::with_overrides(&overrides),
            Err(MessageError::UnknownKey(key)) if key == "nope"
        ));
    }
}
