use std::collections::BTreeSet;

use serde_json::Value;

use crate::compile::FieldErrors;
use crate::spec::form::FormConfiguration;
use crate::values::ValueMap;

/// Values, errors and touch tracking for one mounted form.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    values: ValueMap,
    initial: ValueMap,
    errors: FieldErrors,
    touched: BTreeSet<String>,
}

impl FormState {
    /// Seeds every field with its empty value, overlaid with `initial`.
    ///
    /// Keys in `initial` that no field describes are kept so nested data
    /// loaded in edit mode stays addressable by conditions.
    pub fn new(config: &FormConfiguration, initial: &ValueMap) -> Self {
        let mut values = ValueMap::new();
        for field in &config.fields {
            values.insert(field.name.clone(), field.empty_value());
        }
        for (name, value) in initial {
            values.insert(name.clone(), value.clone());
        }
        Self {
            initial: values.clone(),
            values,
            errors: FieldErrors::new(),
            touched: BTreeSet::new(),
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name)
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.contains(name)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.values.get(name) != self.initial.get(name)
    }

    pub fn is_form_dirty(&self) -> bool {
        self.values != self.initial
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        self.touched.insert(name.to_string());
        self.values.insert(name.to_string(), value);
    }

    pub fn set_error(&mut self, name: &str, message: impl Into<String>) {
        self.errors.remove(name);
        self.errors.insert(name, message);
    }

    pub fn clear_error(&mut self, name: &str) {
        self.errors.remove(name);
    }

    pub fn replace_errors(&mut self, errors: FieldErrors) {
        self.errors = errors;
    }

    /// Back to the values the form was mounted with.
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.errors.clear();
        self.touched.clear();
    }

    /// Adopts a new field list: new fields get their empty value and the
    /// current values of surviving fields are kept, unless the field now
    /// holds a list where it held a scalar (or the reverse).
    pub(crate) fn adopt(&mut self, config: &FormConfiguration) {
        for field in &config.fields {
            let fits = |map: &ValueMap| {
                map.get(&field.name)
                    .is_some_and(|value| value.is_array() == field.holds_list())
            };
            if !fits(&self.values) {
                self.values.insert(field.name.clone(), field.empty_value());
            }
            if !fits(&self.initial) {
                self.initial.insert(field.name.clone(), field.empty_value());
            }
        }
        self.errors.retain(|name| config.field(name).is_some());
    }
}
