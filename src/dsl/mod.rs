//! Flow documents: schema, parsing/export and validation.

pub mod parser;
pub mod schema;
pub mod validator;

pub use parser::{compute_mappings, export_flow, load_flow, parse_flow, FlowFormat};
pub use schema::*;
pub use validator::{
    declared_branch_labels, validate_flow, Diagnostic, DiagnosticLevel, ValidationReport,
};
