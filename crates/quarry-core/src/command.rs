//! Command pattern skeleton
//!
//! Every mutation exposes `validate()` and `run()`. `validate()` accumulates
//! all recoverable input faults into one composite error so callers can fix
//! everything in a single round-trip; `run()` executes atomically inside the
//! request's transactional session.

use crate::error::{ErrorEnvelope, ErrorKind, FieldMessages, QuarryError};
use thiserror::Error;

/// Composite validation failure carrying every field-level fault found.
#[derive(Debug, Clone)]
pub struct CommandInvalid {
    message: String,
    fields: FieldMessages,
}

impl CommandInvalid {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: FieldMessages::new(),
        }
    }

    /// Append a message under a field path (e.g. `"metadata.yaml.type"`).
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    /// Merge another accumulator into this one.
    pub fn extend(&mut self, other: FieldMessages) {
        for (field, messages) in other {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Field-path keyed messages. A field never appears without at least one
    /// message attached.
    pub fn normalized_messages(&self) -> FieldMessages {
        self.fields
            .iter()
            .filter(|(_, msgs)| !msgs.is_empty())
            .map(|(field, msgs)| (field.clone(), msgs.clone()))
            .collect()
    }
}

impl std::fmt::Display for CommandInvalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for (field, messages) in &self.fields {
            for message in messages {
                write!(f, "\n  {field}: {message}")?;
            }
        }
        Ok(())
    }
}

/// Error surface for commands. `Invalid` is a user-input fault aggregating
/// field messages; `Forbidden` is an authorization denial; the rest map to
/// system faults.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Invalid(CommandInvalid),

    /// Accumulated taxonomy items from parameter or connection validation,
    /// surfaced together so the caller can fix them in one round-trip.
    #[error("{}", .0.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<QuarryError>),

    #[error("{0}")]
    Forbidden(QuarryError),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{0}")]
    Domain(QuarryError),

    #[error("{0}")]
    Exception(#[from] anyhow::Error),
}

impl CommandError {
    /// One-shot constructor for a single-field `Invalid`.
    pub fn invalid(
        message: impl Into<String>,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let mut invalid = CommandInvalid::new(message);
        invalid.add(field, detail);
        CommandError::Invalid(invalid)
    }

    /// Serialize to the wire envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            CommandError::Invalid(invalid) => {
                let errors = invalid
                    .normalized_messages()
                    .into_iter()
                    .flat_map(|(field, messages)| {
                        messages.into_iter().map(move |message| {
                            QuarryError::new(
                                ErrorKind::InvalidPayloadSchema,
                                format!("{field}: {message}"),
                            )
                        })
                    })
                    .collect();
                ErrorEnvelope::new(errors)
            }
            CommandError::Validation(errors) => ErrorEnvelope::new(errors.clone()),
            CommandError::Forbidden(err) | CommandError::Domain(err) => {
                ErrorEnvelope::single(err.clone())
            }
            CommandError::NotFound { kind, name } => ErrorEnvelope::single(QuarryError::new(
                ErrorKind::ObjectDoesNotExist,
                format!("{kind} not found: {name}"),
            )),
            CommandError::Exception(err) => ErrorEnvelope::single(QuarryError::new(
                ErrorKind::GenericBackend,
                err.to_string(),
            )),
        }
    }
}

impl From<CommandInvalid> for CommandError {
    fn from(invalid: CommandInvalid) -> Self {
        CommandError::Invalid(invalid)
    }
}

/// A mutation with the two-phase shape. `validate()` never mutates persisted
/// state; `run()` validates first when invoked directly.
#[async_trait::async_trait]
pub trait Command {
    type Output;

    fn validate(&mut self) -> Result<(), CommandError>;

    async fn run(&mut self) -> Result<Self::Output, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_messages_skip_empty_fields() {
        let mut invalid = CommandInvalid::new("Error importing bundle");
        invalid.add("metadata.yaml.type", "Must be equal to Database.");
        invalid.fields.insert("phantom".to_string(), Vec::new());
        let normalized = invalid.normalized_messages();
        assert_eq!(normalized.len(), 1);
        assert_eq!(
            normalized["metadata.yaml.type"],
            vec!["Must be equal to Database.".to_string()]
        );
    }

    #[test]
    fn invalid_accumulates_across_fields() {
        let mut invalid = CommandInvalid::new("Error importing dataset");
        invalid.add("datasets/a.yaml.table_name", "Missing data for required field.");
        invalid.add("datasets/a.yaml.table_name", "Length must be between 1 and 250.");
        invalid.add("datasets/b.yaml.uuid", "Not a valid UUID.");
        let normalized = invalid.normalized_messages();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized["datasets/a.yaml.table_name"].len(), 2);
    }

    #[test]
    fn invalid_envelope_maps_to_payload_schema_errors() {
        let err = CommandError::invalid("bad", "metadata.yaml.version", "Unsupported version");
        let envelope = err.to_envelope();
        assert_eq!(envelope.errors.len(), 1);
        assert_eq!(envelope.errors[0].error_type, ErrorKind::InvalidPayloadSchema);
        assert_eq!(envelope.status(), 400);
    }
}
