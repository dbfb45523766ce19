use std::fmt::Write;

use form_spec::{
    Control, ControlOption, FieldErrors, FieldType, FormError, Notification, RenderedForm,
    ValueMap, Widget,
};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: field prompts only.
    Clean,
    /// Verbose output: visible fields, current values and option lists.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints prompts and outcomes while a form is filled from the terminal.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_values_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_values_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_values_json,
        }
    }

    pub fn show_header(&mut self, form: &RenderedForm) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", form.title);
        if form.disabled {
            println!("This form is read-only; nothing can be filled in.");
        }
        self.header_printed = true;
    }

    pub fn show_status(&self, form: &RenderedForm) {
        if !self.verbosity.is_verbose() {
            return;
        }
        println!("Visible fields:");
        for control in &form.controls {
            let mut entry = format!(" - {} ({})", control.name, control.label);
            if control.required {
                entry.push_str(" [required]");
            }
            if control.disabled {
                entry.push_str(" [disabled]");
            }
            println!("{}", entry);
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.title);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        if let Some(description) = &prompt.description {
            println!("{}", description);
        }
        if self.verbosity.is_verbose() && !prompt.choices.is_empty() {
            println!("Choices: {}", prompt.choices.join(", "));
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if let Some(debug) = &error.debug_message {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_input_error(&self, error: &FormError) {
        eprintln!("Input rejected: {}", error);
    }

    pub fn show_field_errors(&self, errors: &FieldErrors) {
        eprintln!("Validation errors:");
        for (field, message) in errors.iter() {
            eprintln!("  {}: {}", field, message);
        }
    }

    pub fn show_notifications(&self, notifications: &[Notification]) {
        for notification in notifications {
            eprintln!("Still needed: {}", notification.message);
        }
    }

    pub fn show_completion(&self, values: &ValueMap) {
        println!("Done ✅");
        match serde_cbor::to_vec(values) {
            Ok(bytes) => {
                println!("Values (CBOR hex): {}", encode_hex(&bytes));
            }
            Err(err) => {
                eprintln!("Failed to serialize values to CBOR: {}", err);
            }
        }
        if self.show_values_json {
            match serde_json::to_string_pretty(values) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => {
                    eprintln!("Failed to serialize values to JSON: {}", err);
                }
            }
        }
    }
}

/// Options offered by a control, if it is a choice widget.
pub fn control_options(control: &Control) -> &[ControlOption] {
    match &control.widget {
        Widget::Select { options }
        | Widget::Radio { options }
        | Widget::CheckboxGroup { options }
        | Widget::RelationSelect { options, .. }
        | Widget::RelationChecklist { options, .. } => options,
        _ => &[],
    }
}

/// Whether the control collects a list of values.
pub fn is_multi_valued(control: &Control) -> bool {
    matches!(
        control.widget,
        Widget::CheckboxGroup { .. } | Widget::RelationChecklist { .. }
    )
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<String>,
}

impl PromptContext {
    pub fn new(control: &Control, index: usize, total: usize) -> Self {
        let choices: Vec<String> = control_options(control)
            .iter()
            .map(|option| format!("{} ({})", option.label, option.value))
            .collect();
        Self {
            index: index.max(1),
            total,
            title: control.label.clone(),
            description: control.description.clone(),
            required: control.required,
            hint: hint(control),
            choices,
        }
    }
}

fn hint(control: &Control) -> Option<String> {
    let values = || {
        control_options(control)
            .iter()
            .map(|option| option.value.as_str())
            .collect::<Vec<_>>()
    };
    match control.kind {
        FieldType::Number => Some("(number)".to_string()),
        FieldType::Email => Some("(email address)".to_string()),
        FieldType::Url => Some("(https://...)".to_string()),
        FieldType::Date => Some("(YYYY-MM-DD)".to_string()),
        FieldType::Phone => Some("(+<country code><number>)".to_string()),
        FieldType::Image => Some("(uploaded file id)".to_string()),
        FieldType::Country | FieldType::PreferredCountry => {
            Some("(ISO country code, e.g. NP)".to_string())
        }
        FieldType::MultiCheckbox => Some(format!("(comma separated: {})", values().join("/"))),
        FieldType::Relation if values().is_empty() => match &control.widget {
            Widget::RelationSelect { view, .. } | Widget::RelationChecklist { view, .. } => {
                view.message().map(|message| format!("({})", message))
            }
            _ => None,
        },
        FieldType::Relation if is_multi_valued(control) => {
            Some(format!("(comma separated: {})", values().join("/")))
        }
        FieldType::Select | FieldType::Radio | FieldType::Relation => {
            Some(format!("({})", values().join("/")))
        }
        FieldType::Text | FieldType::Textarea => None,
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(&mut encoded, "{:02x}", byte).expect("writing to string cannot fail");
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encoding_is_lowercase_pairs() {
        assert_eq!(encode_hex(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
