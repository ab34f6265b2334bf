//! SQL templating: Jinja-style rendering with strict undefined handling,
//! plus the legacy `{name}` substitution style.

pub mod engine;
pub mod params;

pub use engine::{referenced_variables, undefined_variables, TemplateError, TemplateRenderer};
pub use params::{apply_parameters, parameter_names};
