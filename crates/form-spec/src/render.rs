//! Field renderer registry and the framework-neutral control tree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::countries::{self, Country, OfferedCountries};
use crate::error::FormError;
use crate::relation::{RelationField, RelationStatus};
use crate::spec::field::{FieldDescriptor, FieldType};
use crate::state::FormState;
use crate::values::{display, loose_eq};

/// A user edit delivered to a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    /// Typed text.
    Text(String),
    /// Pick of one option value.
    Select(String),
    /// Check or uncheck one option value.
    Toggle(String),
    /// Identifier returned by the image pick/crop flow; `None` clears it.
    File(Option<String>),
    Date(Option<String>),
    Phone(String),
    /// Raw value, e.g. replayed from stored answers.
    Value(Value),
}

impl FieldInput {
    fn kind_name(&self) -> &'static str {
        match self {
            FieldInput::Text(_) => "text",
            FieldInput::Select(_) => "select",
            FieldInput::Toggle(_) => "toggle",
            FieldInput::File(_) => "file",
            FieldInput::Date(_) => "date",
            FieldInput::Phone(_) => "phone",
            FieldInput::Value(_) => "value",
        }
    }
}

/// How the control is wired to form state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// Plain input registered by name.
    Registered,
    /// Composite widget driven through value + change callback.
    Controlled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlOption {
    pub label: String,
    pub value: String,
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
}

/// Display state of a relation control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationView {
    Loading,
    Ready,
    NoEndpoint,
    NoResults,
}

impl RelationView {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            RelationView::Loading => Some("Loading..."),
            RelationView::Ready => None,
            RelationView::NoEndpoint => Some("No data source configured"),
            RelationView::NoResults => Some("No options available"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    Input {
        input_type: &'static str,
    },
    TextArea,
    Select {
        options: Vec<ControlOption>,
    },
    Radio {
        options: Vec<ControlOption>,
    },
    CheckboxGroup {
        options: Vec<ControlOption>,
    },
    DatePicker,
    PhoneInput,
    ImagePicker {
        file_id: Option<String>,
        preview_url: Option<String>,
        aspect_ratio: Option<f64>,
        max_file_size: Option<u64>,
        upload_path: Option<String>,
    },
    RelationSelect {
        view: RelationView,
        options: Vec<ControlOption>,
    },
    RelationChecklist {
        view: RelationView,
        options: Vec<ControlOption>,
    },
}

/// One rendered, bound input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(flatten)]
    pub widget: Widget,
    pub binding: Binding,
    pub value: Value,
    pub required: bool,
    pub disabled: bool,
    pub cols: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything a renderer may read while drawing one field.
pub struct RenderContext<'a> {
    pub state: &'a FormState,
    pub form_disabled: bool,
    pub relation: Option<&'a RelationField>,
}

impl RenderContext<'_> {
    fn value(&self, field: &FieldDescriptor) -> Value {
        self.state
            .value(&field.name)
            .cloned()
            .unwrap_or_else(|| field.empty_value())
    }

    /// Control with the shared attributes filled in from the descriptor and state.
    pub fn base(&self, field: &FieldDescriptor, widget: Widget, binding: Binding) -> Control {
        Control {
            name: field.name.clone(),
            label: field.label.clone(),
            kind: field.kind,
            widget,
            binding,
            value: self.value(field),
            required: field.required,
            disabled: field.disabled || self.form_disabled,
            cols: field.layout_cols(),
            error: self.state.error(&field.name).map(str::to_string),
            placeholder: field.placeholder.clone(),
            description: field.description.clone(),
        }
    }
}

/// Draws one field type and applies edits to it.
pub trait FieldRenderer: Send + Sync {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control;

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError>;
}

fn unsupported(field: &FieldDescriptor, input: &FieldInput) -> FormError {
    FormError::UnsupportedInput {
        field: field.name.clone(),
        kind: field.kind,
        input: input.kind_name(),
    }
}

fn static_options(field: &FieldDescriptor, current: &Value) -> Vec<ControlOption> {
    field
        .options
        .iter()
        .map(|option| ControlOption {
            label: option.label.clone(),
            value: option.value.clone(),
            selected: is_selected(current, &option.value),
            flag: None,
        })
        .collect()
}

fn is_selected(current: &Value, option: &str) -> bool {
    let option = Value::String(option.to_string());
    match current {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, &option)),
        Value::Null => false,
        scalar => !display(scalar).is_empty() && loose_eq(scalar, &option),
    }
}

/// Adds or removes `option` from a list value.
fn toggled(current: Option<&Value>, option: &str) -> Value {
    let mut items = match current {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let wanted = Value::String(option.to_string());
    if let Some(position) = items.iter().position(|item| loose_eq(item, &wanted)) {
        items.remove(position);
    } else {
        items.push(wanted);
    }
    Value::Array(items)
}

/// text, email, number and url inputs.
pub struct TextRenderer {
    input_type: &'static str,
}

impl TextRenderer {
    pub fn new(input_type: &'static str) -> Self {
        Self { input_type }
    }
}

impl FieldRenderer for TextRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        ctx.base(
            field,
            Widget::Input {
                input_type: self.input_type,
            },
            Binding::Registered,
        )
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        match input {
            FieldInput::Text(text) => state.set_value(&field.name, Value::String(text)),
            FieldInput::Value(value) => state.set_value(&field.name, value),
            other => return Err(unsupported(field, &other)),
        }
        Ok(())
    }
}

pub struct TextAreaRenderer;

impl FieldRenderer for TextAreaRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        ctx.base(field, Widget::TextArea, Binding::Registered)
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        TextRenderer::new("text").apply(field, state, input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceStyle {
    Select,
    Radio,
}

/// Select and radio groups over the declared options.
pub struct ChoiceRenderer {
    style: ChoiceStyle,
}

impl ChoiceRenderer {
    pub fn new(style: ChoiceStyle) -> Self {
        Self { style }
    }
}

/// Sets a single pick and clears the field's error right away.
fn apply_pick(
    field: &FieldDescriptor,
    state: &mut FormState,
    input: FieldInput,
) -> Result<(), FormError> {
    let value = match input {
        FieldInput::Select(value) | FieldInput::Text(value) => Value::String(value),
        FieldInput::Value(value) => value,
        other => return Err(unsupported(field, &other)),
    };
    state.set_value(&field.name, value);
    state.clear_error(&field.name);
    Ok(())
}

impl FieldRenderer for ChoiceRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        let options = static_options(field, &ctx.value(field));
        let widget = match self.style {
            ChoiceStyle::Select => Widget::Select { options },
            ChoiceStyle::Radio => Widget::Radio { options },
        };
        ctx.base(field, widget, Binding::Registered)
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        apply_pick(field, state, input)
    }
}

/// Country pickers; every option carries its flag glyph.
pub enum CountryRenderer {
    /// The fixed ISO country table.
    All,
    /// Countries offered by the agency, supplied by the host.
    Offered(Arc<dyn OfferedCountries>),
}

impl CountryRenderer {
    fn countries(&self) -> Vec<Country> {
        match self {
            CountryRenderer::All => countries::all().collect(),
            CountryRenderer::Offered(source) => source.offered_countries(),
        }
    }
}

impl FieldRenderer for CountryRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        let current = ctx.value(field);
        let options = self
            .countries()
            .into_iter()
            .map(|country| ControlOption {
                selected: is_selected(&current, &country.code),
                flag: Some(country.flag()),
                label: country.name,
                value: country.code,
            })
            .collect();
        ctx.base(field, Widget::Select { options }, Binding::Registered)
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        apply_pick(field, state, input)
    }
}

/// Independent checkboxes writing into one array value.
pub struct CheckboxGroupRenderer;

/// Toggles one value; the error clears once something is selected.
fn apply_toggle(
    field: &FieldDescriptor,
    state: &mut FormState,
    input: FieldInput,
) -> Result<(), FormError> {
    let next = match input {
        FieldInput::Toggle(option) => toggled(state.value(&field.name), &option),
        FieldInput::Value(value @ Value::Array(_)) => value,
        other => return Err(unsupported(field, &other)),
    };
    let selected = next.as_array().is_some_and(|items| !items.is_empty());
    state.set_value(&field.name, next);
    if selected {
        state.clear_error(&field.name);
    }
    Ok(())
}

impl FieldRenderer for CheckboxGroupRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        let options = static_options(field, &ctx.value(field));
        ctx.base(field, Widget::CheckboxGroup { options }, Binding::Registered)
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        apply_toggle(field, state, input)
    }
}

pub struct DateRenderer;

impl FieldRenderer for DateRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        ctx.base(field, Widget::DatePicker, Binding::Controlled)
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        let value = match input {
            FieldInput::Date(date) => date.map(Value::String).unwrap_or(Value::Null),
            FieldInput::Text(text) if text.trim().is_empty() => Value::Null,
            FieldInput::Text(text) => Value::String(text),
            FieldInput::Value(value) => value,
            other => return Err(unsupported(field, &other)),
        };
        state.set_value(&field.name, value);
        Ok(())
    }
}

pub struct PhoneRenderer;

impl FieldRenderer for PhoneRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        ctx.base(field, Widget::PhoneInput, Binding::Controlled)
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        let value = match input {
            FieldInput::Phone(number) | FieldInput::Text(number) => Value::String(number),
            FieldInput::Value(value) => value,
            other => return Err(unsupported(field, &other)),
        };
        state.set_value(&field.name, value);
        Ok(())
    }
}

/// Stores only the identifier produced by the external pick/crop flow.
pub struct ImageRenderer {
    preview_base_url: Option<String>,
}

impl ImageRenderer {
    pub fn new(preview_base_url: Option<String>) -> Self {
        Self { preview_base_url }
    }

    pub fn preview_url(&self, file_id: &str) -> String {
        match &self.preview_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), file_id),
            None => file_id.to_string(),
        }
    }
}

impl FieldRenderer for ImageRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        let file_id = match ctx.value(field) {
            Value::Null => None,
            value => Some(display(&value)).filter(|id| !id.is_empty()),
        };
        let preview_url = file_id.as_deref().map(|id| self.preview_url(id));
        ctx.base(
            field,
            Widget::ImagePicker {
                file_id,
                preview_url,
                aspect_ratio: field.aspect_ratio,
                max_file_size: field.max_file_size,
                upload_path: field.upload_path.clone(),
            },
            Binding::Controlled,
        )
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        let value = match input {
            FieldInput::File(Some(id)) if !id.trim().is_empty() => Value::String(id),
            FieldInput::File(_) => Value::Null,
            FieldInput::Value(value) => value,
            other => return Err(unsupported(field, &other)),
        };
        state.set_value(&field.name, value);
        Ok(())
    }
}

/// Dropdown or checklist over options resolved from the field's endpoint.
pub struct RelationRenderer;

impl FieldRenderer for RelationRenderer {
    fn render(&self, field: &FieldDescriptor, ctx: &RenderContext<'_>) -> Control {
        let current = ctx.value(field);
        let (view, options) = match ctx.relation.map(RelationField::status) {
            Some(RelationStatus::Ready { options }) if options.is_empty() => {
                (RelationView::NoResults, Vec::new())
            }
            Some(RelationStatus::Ready { options }) => (
                RelationView::Ready,
                options
                    .iter()
                    .map(|option| ControlOption {
                        label: option.label.clone(),
                        value: option.value.clone(),
                        selected: is_selected(&current, &option.value),
                        flag: None,
                    })
                    .collect(),
            ),
            Some(RelationStatus::NoEndpoint) => (RelationView::NoEndpoint, Vec::new()),
            Some(RelationStatus::Loading) | Some(RelationStatus::Unmounted) | None => {
                (RelationView::Loading, Vec::new())
            }
        };

        let widget = if field.multiple {
            Widget::RelationChecklist { view, options }
        } else {
            Widget::RelationSelect { view, options }
        };
        let mut control = ctx.base(field, widget, Binding::Registered);
        if view == RelationView::Loading {
            control.disabled = true;
            control.placeholder = view.message().map(str::to_string);
        }
        control
    }

    fn apply(
        &self,
        field: &FieldDescriptor,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        if field.multiple {
            apply_toggle(field, state, input)
        } else {
            apply_pick(field, state, input)
        }
    }
}

/// Renderer lookup by field type.
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: BTreeMap<FieldType, Arc<dyn FieldRenderer>>,
}

/// Collaborators the default renderers need.
#[derive(Clone, Default)]
pub struct RegistryOptions {
    pub offered_countries: Option<Arc<dyn OfferedCountries>>,
    pub image_base_url: Option<String>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::with_defaults(RegistryOptions::default())
    }
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("kinds", &self.renderers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RendererRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// Registers a renderer for every field type.
    pub fn with_defaults(options: RegistryOptions) -> Self {
        let mut registry = Self::empty();
        registry.register(FieldType::Text, TextRenderer::new("text"));
        registry.register(FieldType::Email, TextRenderer::new("email"));
        registry.register(FieldType::Number, TextRenderer::new("number"));
        registry.register(FieldType::Url, TextRenderer::new("url"));
        registry.register(FieldType::Textarea, TextAreaRenderer);
        registry.register(FieldType::Select, ChoiceRenderer::new(ChoiceStyle::Select));
        registry.register(FieldType::Radio, ChoiceRenderer::new(ChoiceStyle::Radio));
        registry.register(FieldType::Date, DateRenderer);
        registry.register(FieldType::Phone, PhoneRenderer);
        registry.register(FieldType::Country, CountryRenderer::All);
        registry.register(
            FieldType::PreferredCountry,
            match options.offered_countries {
                Some(source) => CountryRenderer::Offered(source),
                None => CountryRenderer::All,
            },
        );
        registry.register(FieldType::MultiCheckbox, CheckboxGroupRenderer);
        registry.register(FieldType::Image, ImageRenderer::new(options.image_base_url));
        registry.register(FieldType::Relation, RelationRenderer);
        registry
    }

    /// Replaces the renderer for `kind`.
    pub fn register(&mut self, kind: FieldType, renderer: impl FieldRenderer + 'static) {
        self.renderers.insert(kind, Arc::new(renderer));
    }

    pub fn get(&self, kind: FieldType) -> Option<&dyn FieldRenderer> {
        self.renderers.get(&kind).map(|renderer| renderer.as_ref())
    }

    pub fn render(
        &self,
        field: &FieldDescriptor,
        ctx: &RenderContext<'_>,
    ) -> Result<Control, FormError> {
        let renderer = self
            .get(field.kind)
            .ok_or(FormError::MissingRenderer(field.kind))?;
        Ok(renderer.render(field, ctx))
    }

    /// Applies `input` unless the field or the whole form is disabled.
    pub fn apply(
        &self,
        field: &FieldDescriptor,
        form_disabled: bool,
        state: &mut FormState,
        input: FieldInput,
    ) -> Result<(), FormError> {
        if field.disabled || form_disabled {
            return Err(FormError::Disabled(field.name.clone()));
        }
        let renderer = self
            .get(field.kind)
            .ok_or(FormError::MissingRenderer(field.kind))?;
        renderer.apply(field, state, input)
    }
}

/// A rendered form: visible controls in declared order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub disabled: bool,
    pub dirty: bool,
    pub controls: Vec<Control>,
}

impl RenderedForm {
    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|control| control.name == name)
    }
}

/// Structured JSON for UI hosts.
pub fn render_json_ui(form: &RenderedForm) -> Value {
    serde_json::to_value(form).unwrap_or_else(|err| json!({ "error": err.to_string() }))
}

/// Human-friendly text rendering.
pub fn render_text(form: &RenderedForm) -> String {
    let mut lines = Vec::new();
    match &form.id {
        Some(id) => lines.push(format!("Form: {} ({})", form.title, id)),
        None => lines.push(format!("Form: {}", form.title)),
    }
    if form.disabled {
        lines.push("Read-only".to_string());
    }

    for control in &form.controls {
        let mut entry = format!(" - {} ({}) <{}>", control.name, control.label, control.kind);
        if control.required {
            entry.push_str(" [required]");
        }
        if control.disabled {
            entry.push_str(" [disabled]");
        }
        let shown = shown_value(control);
        if !shown.is_empty() {
            entry.push_str(&format!(" = {}", shown));
        }
        lines.push(entry);

        match &control.widget {
            Widget::Select { options } | Widget::Radio { options } => {
                if control.kind == FieldType::Select || control.kind == FieldType::Radio {
                    lines.push(format!("   options: {}", option_summary(options)));
                }
            }
            Widget::CheckboxGroup { options } => {
                lines.push(format!("   options: {}", option_summary(options)));
            }
            Widget::RelationSelect { view, options } | Widget::RelationChecklist { view, options } => {
                match view.message() {
                    Some(message) => lines.push(format!("   {}", message)),
                    None => lines.push(format!("   options: {}", option_summary(options))),
                }
            }
            Widget::ImagePicker {
                preview_url: Some(url),
                ..
            } => lines.push(format!("   preview: {}", url)),
            _ => {}
        }
        if let Some(description) = &control.description {
            lines.push(format!("   {}", description));
        }
        if let Some(error) = &control.error {
            lines.push(format!("   ! {}", error));
        }
    }

    lines.join("\n")
}

fn shown_value(control: &Control) -> String {
    match &control.value {
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        other => display(other),
    }
}

fn option_summary(options: &[ControlOption]) -> String {
    options
        .iter()
        .map(|option| {
            if option.selected {
                format!("[x] {}", option.label)
            } else {
                format!("[ ] {}", option.label)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationOption;
    use crate::spec::form::FormConfiguration;
    use crate::values::ValueMap;
    use serde_json::json;

    fn state_for(fields: &[FieldDescriptor]) -> FormState {
        FormState::new(&FormConfiguration::new(fields.to_vec()), &ValueMap::new())
    }

    fn ctx(state: &FormState) -> RenderContext<'_> {
        RenderContext {
            state,
            form_disabled: false,
            relation: None,
        }
    }

    #[test]
    fn every_type_has_a_default_renderer() {
        let registry = RendererRegistry::default();
        for kind in FieldType::ALL {
            assert!(registry.get(kind).is_some(), "missing renderer for {}", kind);
        }
    }

    #[test]
    fn select_change_clears_error() {
        let field = FieldDescriptor::new("intake", "Intake", FieldType::Select)
            .with_options([("Feb", "feb"), ("Jul", "jul")]);
        let mut state = state_for(std::slice::from_ref(&field));
        state.set_error("intake", "Intake is required");
        RendererRegistry::default()
            .apply(&field, false, &mut state, FieldInput::Select("jul".into()))
            .expect("apply");
        assert_eq!(state.value("intake"), Some(&json!("jul")));
        assert!(state.error("intake").is_none());

        let control = RendererRegistry::default()
            .render(&field, &ctx(&state))
            .expect("render");
        match control.widget {
            Widget::Select { options } => {
                assert_eq!(options[0].value, "feb");
                assert!(!options[0].selected);
                assert!(options[1].selected);
            }
            other => panic!("unexpected widget {:?}", other),
        }
    }

    #[test]
    fn checkbox_toggle_adds_and_removes() {
        let field = FieldDescriptor::new("docs", "Documents", FieldType::MultiCheckbox)
            .with_options([("Passport", "passport"), ("Transcript", "transcript")]);
        let registry = RendererRegistry::default();
        let mut state = state_for(std::slice::from_ref(&field));
        state.set_error("docs", "Documents is required");

        registry
            .apply(&field, false, &mut state, FieldInput::Toggle("passport".into()))
            .expect("toggle on");
        assert_eq!(state.value("docs"), Some(&json!(["passport"])));
        assert!(state.error("docs").is_none());

        state.set_error("docs", "Documents is required");
        registry
            .apply(&field, false, &mut state, FieldInput::Toggle("passport".into()))
            .expect("toggle off");
        assert_eq!(state.value("docs"), Some(&json!([])));
        assert_eq!(state.error("docs"), Some("Documents is required"));
    }

    #[test]
    fn disabled_fields_reject_input() {
        let mut field = FieldDescriptor::new("name", "Name", FieldType::Text);
        let registry = RendererRegistry::default();
        let mut state = state_for(std::slice::from_ref(&field));
        assert_eq!(
            registry.apply(&field, true, &mut state, FieldInput::Text("x".into())),
            Err(FormError::Disabled("name".into()))
        );
        field.disabled = true;
        let control = registry.render(&field, &ctx(&state)).expect("render");
        assert!(control.disabled);
    }

    #[test]
    fn date_and_phone_use_controlled_binding() {
        let registry = RendererRegistry::default();
        let date = FieldDescriptor::new("dob", "Date of birth", FieldType::Date);
        let phone = FieldDescriptor::new("mobile", "Mobile", FieldType::Phone);
        let text = FieldDescriptor::new("city", "City", FieldType::Text);
        let state = state_for(&[date.clone(), phone.clone(), text.clone()]);
        let ctx = ctx(&state);
        assert_eq!(registry.render(&date, &ctx).unwrap().binding, Binding::Controlled);
        assert_eq!(registry.render(&phone, &ctx).unwrap().binding, Binding::Controlled);
        assert_eq!(registry.render(&text, &ctx).unwrap().binding, Binding::Registered);
    }

    #[test]
    fn mismatched_input_is_rejected() {
        let field = FieldDescriptor::new("city", "City", FieldType::Text);
        let mut state = state_for(std::slice::from_ref(&field));
        let result =
            RendererRegistry::default().apply(&field, false, &mut state, FieldInput::Toggle("x".into()));
        assert!(matches!(
            result,
            Err(FormError::UnsupportedInput { input: "toggle", .. })
        ));
    }

    #[test]
    fn country_options_carry_flags() {
        let field = FieldDescriptor::new("nationality", "Nationality", FieldType::Country);
        let mut state = state_for(std::slice::from_ref(&field));
        state.set_value("nationality", json!("NP"));
        let control = RendererRegistry::default()
            .render(&field, &ctx(&state))
            .expect("render");
        let Widget::Select { options } = control.widget else {
            panic!("country renders as select");
        };
        let nepal = options.iter().find(|option| option.value == "NP").expect("NP");
        assert!(nepal.selected);
        assert_eq!(nepal.flag.as_deref(), Some("\u{1F1F3}\u{1F1F5}"));
    }

    #[test]
    fn preferred_country_uses_offered_collaborator() {
        let offered = crate::countries::StaticOfferedCountries::from_codes(["AU", "CA"]);
        let registry = RendererRegistry::with_defaults(RegistryOptions {
            offered_countries: Some(offered.shared()),
            image_base_url: None,
        });
        let field = FieldDescriptor::new("destination", "Destination", FieldType::PreferredCountry);
        let state = state_for(std::slice::from_ref(&field));
        let control = registry.render(&field, &ctx(&state)).expect("render");
        let Widget::Select { options } = control.widget else {
            panic!("preferred country renders as select");
        };
        let labels: Vec<_> = options.iter().map(|option| option.label.as_str()).collect();
        assert_eq!(labels, vec!["Australia", "Canada"]);
    }

    #[test]
    fn image_keeps_identifier_and_builds_preview() {
        let registry = RendererRegistry::with_defaults(RegistryOptions {
            offered_countries: None,
            image_base_url: Some("https://cdn.example/files/".into()),
        });
        let field = FieldDescriptor::new("avatar", "Photo", FieldType::Image);
        let mut state = state_for(std::slice::from_ref(&field));
        registry
            .apply(&field, false, &mut state, FieldInput::File(Some("f_19".into())))
            .expect("apply");
        let control = registry.render(&field, &ctx(&state)).expect("render");
        match control.widget {
            Widget::ImagePicker {
                file_id,
                preview_url,
                ..
            } => {
                assert_eq!(file_id.as_deref(), Some("f_19"));
                assert_eq!(preview_url.as_deref(), Some("https://cdn.example/files/f_19"));
            }
            other => panic!("unexpected widget {:?}", other),
        }
    }

    #[test]
    fn relation_views_distinguish_empty_states() {
        let registry = RendererRegistry::default();
        let field = FieldDescriptor::new("course", "Course", FieldType::Relation)
            .with_endpoint("/courses");
        let state = state_for(std::slice::from_ref(&field));

        let mut controller = RelationField::new("course");
        let ticket = controller.mount(&field).expect("ticket");
        let loading = registry
            .render(
                &field,
                &RenderContext {
                    state: &state,
                    form_disabled: false,
                    relation: Some(&controller),
                },
            )
            .expect("render");
        assert!(loading.disabled);
        assert_eq!(loading.placeholder.as_deref(), Some("Loading..."));

        controller.complete(&ticket, Vec::new());
        let empty = registry
            .render(
                &field,
                &RenderContext {
                    state: &state,
                    form_disabled: false,
                    relation: Some(&controller),
                },
            )
            .expect("render");
        assert!(matches!(
            empty.widget,
            Widget::RelationSelect {
                view: RelationView::NoResults,
                ..
            }
        ));

        let mut unconfigured = RelationField::new("course");
        let bare = FieldDescriptor::new("course", "Course", FieldType::Relation);
        unconfigured.mount(&bare);
        let none = registry
            .render(
                &bare,
                &RenderContext {
                    state: &state,
                    form_disabled: false,
                    relation: Some(&unconfigured),
                },
            )
            .expect("render");
        assert!(matches!(
            none.widget,
            Widget::RelationSelect {
                view: RelationView::NoEndpoint,
                ..
            }
        ));
    }

    #[test]
    fn relation_multiple_renders_checklist() {
        let registry = RendererRegistry::default();
        let mut field = FieldDescriptor::new("courses", "Courses", FieldType::Relation)
            .with_endpoint("/courses");
        field.multiple = true;
        let mut state = state_for(std::slice::from_ref(&field));
        state.set_value("courses", json!(["2"]));
        let mut controller = RelationField::new("courses");
        let ticket = controller.mount(&field).expect("ticket");
        controller.complete(
            &ticket,
            vec![
                RelationOption {
                    label: "MBA".into(),
                    value: "1".into(),
                    raw: json!({}),
                },
                RelationOption {
                    label: "MSc".into(),
                    value: "2".into(),
                    raw: json!({}),
                },
            ],
        );
        let control = registry
            .render(
                &field,
                &RenderContext {
                    state: &state,
                    form_disabled: false,
                    relation: Some(&controller),
                },
            )
            .expect("render");
        let Widget::RelationChecklist { view, options } = control.widget else {
            panic!("multiple relation renders as checklist");
        };
        assert_eq!(view, RelationView::Ready);
        assert!(!options[0].selected);
        assert!(options[1].selected);
    }
}
