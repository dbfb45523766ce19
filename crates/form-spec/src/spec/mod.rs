pub mod field;
pub mod form;

pub use field::{FieldDescriptor, FieldOption, FieldType};
pub use form::{ConfigIssue, FormConfiguration, IssueKind, Severity};
