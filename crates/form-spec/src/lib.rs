#![allow(missing_docs)]

pub mod compile;
pub mod condition;
pub mod countries;
pub mod error;
pub mod form;
pub mod messages;
pub mod relation;
pub mod render;
pub mod spec;
pub mod state;
pub mod values;

pub use compile::{FieldErrors, FieldRule, RuleKind, Validator, compile, compile_with};
pub use condition::{Condition, ConditionError, evaluate_condition};
pub use countries::{Country, OfferedCountries, StaticOfferedCountries};
pub use error::{FormError, SubmitError};
pub use form::{Form, Notification, VisibilityMap, submit_values, value_map};
pub use messages::{MessageError, MessageKey, Messages};
pub use relation::{
    CachedOptionSource, FetchTicket, HttpOptionSource, HttpSourceConfig, OptionSource,
    RelationField, RelationOption, RelationRequest, RelationStatus, ResolveError,
    normalize_options, resolve_options,
};
pub use render::{
    Binding, Control, ControlOption, FieldInput, FieldRenderer, RegistryOptions, RelationView,
    RenderContext, RenderedForm, RendererRegistry, Widget, render_json_ui, render_text,
};
pub use spec::{
    ConfigIssue, FieldDescriptor, FieldOption, FieldType, FormConfiguration, IssueKind, Severity,
};
pub use state::FormState;
pub use values::ValueMap;
