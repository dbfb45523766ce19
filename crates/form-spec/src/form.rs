//! The form orchestrator: owns state, drives rendering and gates submission.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::compile::{FieldErrors, Validator, compile_with};
use crate::condition::evaluate_condition;
use crate::error::{FormError, SubmitError};
use crate::messages::{MessageKey, Messages};
use crate::relation::{FetchTicket, OptionSource, RelationField, RelationOption, resolve_options};
use crate::render::{FieldInput, RenderContext, RenderedForm, RendererRegistry};
use crate::spec::field::{FieldDescriptor, FieldType};
use crate::spec::form::FormConfiguration;
use crate::state::FormState;
use crate::values::{ValueMap, is_empty};

pub type VisibilityMap = BTreeMap<String, bool>;

/// Transient warning raised by [`Form::attempt_submission`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub field: String,
    pub message: String,
}

/// A mounted form.
#[derive(Debug)]
pub struct Form {
    config: FormConfiguration,
    validator: Validator,
    registry: RendererRegistry,
    state: FormState,
    relations: BTreeMap<String, RelationField>,
}

impl Form {
    pub fn new(config: FormConfiguration) -> Self {
        Self::with_initial_values(config, &ValueMap::new())
    }

    /// Mounts the form in edit mode, seeded with `initial`.
    pub fn with_initial_values(config: FormConfiguration, initial: &ValueMap) -> Self {
        let validator = compile_with(&config.fields, Messages::default());
        let state = FormState::new(&config, initial);
        let mut form = Self {
            config,
            validator,
            registry: RendererRegistry::default(),
            state,
            relations: BTreeMap::new(),
        };
        form.sync_relations();
        form
    }

    pub fn with_registry(mut self, registry: RendererRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.validator = compile_with(&self.config.fields, messages);
        self
    }

    pub fn config(&self) -> &FormConfiguration {
        &self.config
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn values(&self) -> &ValueMap {
        self.state.values()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn relation(&self, name: &str) -> Option<&RelationField> {
        self.relations.get(name)
    }

    /// Unconditional fields are always visible; gated ones follow their
    /// condition against the latest values.
    pub fn is_visible(&self, field: &FieldDescriptor) -> bool {
        match &field.rendering_condition {
            Some(expr) if field.is_conditional() => evaluate_condition(expr, self.state.values()),
            _ => true,
        }
    }

    pub fn visibility(&self) -> VisibilityMap {
        self.config
            .fields
            .iter()
            .map(|field| (field.name.clone(), self.is_visible(field)))
            .collect()
    }

    pub fn visible_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.config.fields.iter().filter(|field| self.is_visible(field))
    }

    /// Renders visible fields in declared order.
    pub fn render(&self) -> Result<RenderedForm, FormError> {
        let mut controls = Vec::new();
        for field in self.visible_fields() {
            let ctx = RenderContext {
                state: &self.state,
                form_disabled: self.config.disabled,
                relation: self.relations.get(&field.name),
            };
            controls.push(self.registry.render(field, &ctx)?);
        }
        Ok(RenderedForm {
            id: self.config.id.clone(),
            title: self.config.display_title().to_string(),
            disabled: self.config.disabled,
            dirty: self.state.is_form_dirty(),
            controls,
        })
    }

    /// Applies one user edit, then re-syncs relation fields whose visibility
    /// may have changed.
    pub fn input(&mut self, name: &str, input: FieldInput) -> Result<(), FormError> {
        let field = self
            .config
            .field(name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        if !self.is_visible(field) {
            return Err(FormError::Hidden(name.to_string()));
        }
        if self
            .relations
            .get(name)
            .is_some_and(RelationField::is_loading)
        {
            return Err(FormError::Disabled(name.to_string()));
        }
        self.registry
            .apply(field, self.config.disabled, &mut self.state, input)?;
        self.sync_relations();
        Ok(())
    }

    /// Mounts visible relation fields and unmounts hidden ones.
    fn sync_relations(&mut self) {
        let visibility = self.visibility();
        for field in &self.config.fields {
            if field.kind != FieldType::Relation {
                continue;
            }
            let visible = visibility.get(&field.name).copied().unwrap_or(false);
            let controller = self
                .relations
                .entry(field.name.clone())
                .or_insert_with(|| RelationField::new(field.name.clone()));
            if visible {
                if let Some(ticket) = controller.mount(field) {
                    debug!(field = %field.name, endpoint = %ticket.request.endpoint, "relation fetch started");
                }
            } else if controller.is_mounted() {
                controller.unmount();
            }
        }
        self.relations
            .retain(|name, _| self.config.field(name).is_some_and(|field| field.kind == FieldType::Relation));
    }

    /// Fetches that have been started and not yet completed.
    pub fn pending_fetches(&self) -> Vec<FetchTicket> {
        self.relations.values().filter_map(RelationField::pending).collect()
    }

    /// Delivers a fetch result; stale or orphaned tickets are dropped.
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, options: Vec<RelationOption>) -> bool {
        match self.relations.get_mut(&ticket.field) {
            Some(controller) => controller.complete(ticket, options),
            None => false,
        }
    }

    /// Resolves every pending relation fetch concurrently through `source`.
    pub async fn load_relations(&mut self, source: &dyn OptionSource) {
        let tickets = self.pending_fetches();
        if tickets.is_empty() {
            return;
        }
        let results = join_all(
            tickets
                .iter()
                .map(|ticket| resolve_options(source, &ticket.request)),
        )
        .await;
        for (ticket, options) in tickets.iter().zip(results) {
            self.complete_fetch(ticket, options);
        }
    }

    /// Two-phase validation; `on_valid` runs with the coerced values only
    /// when both phases pass.
    pub fn submit<F, R>(&mut self, on_valid: F) -> Result<R, SubmitError>
    where
        F: FnOnce(ValueMap) -> R,
    {
        let visibility = self.visibility();
        let coerced = match self.check_schema(&visibility) {
            Ok(coerced) => coerced,
            Err(errors) => {
                debug!(count = errors.len(), "submission blocked by field rules");
                self.state.replace_errors(errors.clone());
                return Err(SubmitError::Invalid(errors));
            }
        };

        let missing: FieldErrors = self
            .missing_conditionals(&visibility, &coerced)
            .into_iter()
            .map(|notice| (notice.field, notice.message))
            .collect();
        if !missing.is_empty() {
            debug!(count = missing.len(), "submission blocked by conditional requirements");
            self.state.replace_errors(missing.clone());
            return Err(SubmitError::ConditionallyRequired(missing));
        }

        self.state.replace_errors(FieldErrors::new());
        Ok(on_valid(coerced))
    }

    /// The conditional-requiredness scan alone, without touching state.
    pub fn attempt_submission(&self) -> Vec<Notification> {
        self.missing_conditionals(&self.visibility(), self.state.values())
    }

    /// Back to the mounted values with errors cleared.
    pub fn reset(&mut self) {
        self.state.reset();
        self.sync_relations();
    }

    /// Swaps in a new field list, keeping the values of surviving fields.
    pub fn set_configuration(&mut self, config: FormConfiguration) {
        let messages = self.validator.messages().clone();
        self.validator = compile_with(&config.fields, messages);
        self.state.adopt(&config);
        self.config = config;
        self.sync_relations();
    }

    /// Runs the compiled rules. Violations on hidden fields are dropped and
    /// those fields keep their raw value.
    fn check_schema(&self, visibility: &VisibilityMap) -> Result<ValueMap, FieldErrors> {
        let values = self.state.values();
        let mut coerced = values.clone();
        let mut errors = FieldErrors::new();
        for rule in self.validator.rules() {
            match rule.check(values.get(&rule.name), self.validator.messages()) {
                Ok(value) => {
                    coerced.insert(rule.name.clone(), value);
                }
                Err(message) if visibility.get(&rule.name).copied().unwrap_or(true) => {
                    errors.insert(rule.name.clone(), message);
                }
                Err(_) => {}
            }
        }
        if errors.is_empty() { Ok(coerced) } else { Err(errors) }
    }

    /// Visible, required, gated fields that are empty in `values`. Submit
    /// passes the coerced map so values that coerce to nothing count as empty.
    fn missing_conditionals(
        &self,
        visibility: &VisibilityMap,
        values: &ValueMap,
    ) -> Vec<Notification> {
        self.config
            .fields
            .iter()
            .filter(|field| field.is_conditional() && field.required)
            .filter(|field| visibility.get(&field.name).copied().unwrap_or(false))
            .filter(|field| values.get(&field.name).is_none_or(is_empty))
            .map(|field| Notification {
                field: field.name.clone(),
                message: self
                    .validator
                    .messages()
                    .render(MessageKey::Required, &field.label),
            })
            .collect()
    }
}

/// Submits `values` against `config` in one shot, returning the coerced
/// values or the blocking errors.
pub fn submit_values(config: FormConfiguration, values: &ValueMap) -> Result<ValueMap, SubmitError> {
    Form::with_initial_values(config, values).submit(|coerced| coerced)
}

/// Convenience for hosts that hold raw JSON.
pub fn value_map(value: &Value) -> ValueMap {
    value.as_object().cloned().unwrap_or_default()
}
