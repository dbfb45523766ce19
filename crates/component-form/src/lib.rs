use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use form_spec::{
    Form, FormConfiguration, FormError, MessageError, Messages, RegistryOptions,
    RendererRegistry, StaticOfferedCountries, SubmitError, ValueMap, compile_with,
    normalize_options, render_json_ui as spec_render_json_ui, render_text as spec_render_text,
};

const DEFAULT_CONFIG: &str = include_str!("../../form-spec/tests/fixtures/student_contact.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("form '{0}' is not available")]
    FormUnavailable(String),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("invalid message override: {0}")]
    Messages(#[from] MessageError),
    #[error("render failed: {0}")]
    Render(#[from] FormError),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    form_config_json: Option<String>,
}

/// Host supplied context shared by the render and submit entry points.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct HostContext {
    /// Pre-fetched relation payloads keyed by field name.
    relations: BTreeMap<String, Value>,
    offered_countries: Option<Vec<String>>,
    image_base_url: Option<String>,
    messages: BTreeMap<String, String>,
}

fn load_configuration(config_json: &str) -> Result<FormConfiguration, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let form_json = config.form_config_json.as_deref().unwrap_or(DEFAULT_CONFIG);

    serde_json::from_str(form_json).map_err(ComponentError::ConfigParse)
}

fn ensure_form(form_id: &str, config_json: &str) -> Result<FormConfiguration, ComponentError> {
    let config = load_configuration(config_json)?;
    if config.id.as_deref().unwrap_or_default() != form_id {
        Err(ComponentError::FormUnavailable(form_id.to_string()))
    } else {
        Ok(config)
    }
}

fn parse_context(ctx_json: &str) -> HostContext {
    serde_json::from_str(ctx_json).unwrap_or_default()
}

fn parse_values(values_json: &str) -> ValueMap {
    match serde_json::from_str(values_json) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Mounts the form and feeds it whatever the host already fetched.
fn mount(
    config: FormConfiguration,
    ctx: &HostContext,
    values: &ValueMap,
) -> Result<Form, ComponentError> {
    let registry = RendererRegistry::with_defaults(RegistryOptions {
        offered_countries: ctx
            .offered_countries
            .as_ref()
            .map(|codes| StaticOfferedCountries::from_codes(codes).shared()),
        image_base_url: ctx.image_base_url.clone(),
    });
    let mut form = Form::with_initial_values(config, values)
        .with_registry(registry)
        .with_messages(Messages::with_overrides(&ctx.messages)?);

    for ticket in form.pending_fetches() {
        match ctx.relations.get(&ticket.field) {
            Some(body) => {
                let options = normalize_options(
                    body,
                    &ticket.request.label_field,
                    &ticket.request.value_field,
                );
                form.complete_fetch(&ticket, options);
            }
            None => debug!(field = %ticket.field, "no relation payload in context"),
        }
    }
    Ok(form)
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

pub fn describe(form_id: &str, config_json: &str) -> String {
    respond(
        ensure_form(form_id, config_json)
            .and_then(|config| serde_json::to_value(config).map_err(ComponentError::JsonEncode)),
    )
}

/// Configuration lint: `{"valid": bool, "issues": [...]}`.
pub fn check(form_id: &str, config_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|config| {
        let issues = config.check();
        let valid = !issues.iter().any(|issue| issue.is_error());
        let issues = serde_json::to_value(issues).map_err(ComponentError::JsonEncode)?;
        Ok(json!({ "valid": valid, "issues": issues }))
    }))
}

/// JSON Schema of the configuration format.
pub fn schema() -> String {
    respond(Ok(FormConfiguration::json_schema()))
}

/// Runs only the compiled field rules, ignoring visibility.
pub fn validate_values(form_id: &str, config_json: &str, values_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|config| {
        let values: ValueMap =
            serde_json::from_str(values_json).map_err(ComponentError::ConfigParse)?;
        let validator = compile_with(&config.fields, Messages::default());
        Ok(match validator.validate(&values) {
            Ok(coerced) => json!({ "valid": true, "values": coerced }),
            Err(errors) => json!({ "valid": false, "errors": errors }),
        })
    }))
}

pub fn render_json_ui(form_id: &str, config_json: &str, ctx_json: &str, values_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|config| {
        let form = mount(config, &parse_context(ctx_json), &parse_values(values_json))?;
        Ok(spec_render_json_ui(&form.render()?))
    }))
}

pub fn render_text(form_id: &str, config_json: &str, ctx_json: &str, values_json: &str) -> String {
    respond_string(ensure_form(form_id, config_json).and_then(|config| {
        let form = mount(config, &parse_context(ctx_json), &parse_values(values_json))?;
        Ok(spec_render_text(&form.render()?))
    }))
}

fn submission_error(err: &SubmitError) -> Value {
    json!({
        "status": "error",
        "phase": err.phase(),
        "errors": err.errors(),
    })
}

/// Two-phase submit; on success the coerced values come back under `values`.
pub fn submit(form_id: &str, config_json: &str, ctx_json: &str, values_json: &str) -> String {
    respond(ensure_form(form_id, config_json).and_then(|config| {
        let mut form = mount(config, &parse_context(ctx_json), &parse_values(values_json))?;
        Ok(match form.submit(|values| values) {
            Ok(values) => json!({ "status": "submitted", "values": values }),
            Err(err) => submission_error(&err),
        })
    }))
}

/// Early warning for conditionally required fields that are still empty.
pub fn attempt_submission(
    form_id: &str,
    config_json: &str,
    ctx_json: &str,
    values_json: &str,
) -> String {
    respond(ensure_form(form_id, config_json).and_then(|config| {
        let form = mount(config, &parse_context(ctx_json), &parse_values(values_json))?;
        let notifications =
            serde_json::to_value(form.attempt_submission()).map_err(ComponentError::JsonEncode)?;
        Ok(json!({ "notifications": notifications }))
    }))
}
