//! Curated example content seeding
//!
//! Example bundles ship with a `__SQLALCHEMY_EXAMPLES_URI__` placeholder
//! instead of a real connection string; seeding rewrites it from
//! configuration and imports with permission checks bypassed, since the
//! unsafe-connection policy would otherwise block the seed databases.

use crate::document::BundleContents;
use crate::import::{ImportBundleCommand, ImportSummary};
use quarry_core::auth::AuthorizationGate;
use quarry_core::command::{Command, CommandError};
use quarry_core::config::QuarryConfig;
use quarry_core::dao::MetadataStore;

pub const EXAMPLES_URI_PLACEHOLDER: &str = "__SQLALCHEMY_EXAMPLES_URI__";

/// Load a curated example bundle into the local instance.
pub struct ImportExamplesCommand<'a> {
    store: &'a dyn MetadataStore,
    gate: &'a dyn AuthorizationGate,
    config: &'a QuarryConfig,
    contents: BundleContents,
    overwrite: bool,
}

impl<'a> ImportExamplesCommand<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        gate: &'a dyn AuthorizationGate,
        config: &'a QuarryConfig,
        contents: BundleContents,
    ) -> Self {
        Self {
            store,
            gate,
            config,
            contents,
            overwrite: true,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn rewritten_contents(&self) -> Result<BundleContents, CommandError> {
        let examples_uri = self
            .config
            .sqlalchemy_examples_uri
            .as_deref()
            .ok_or_else(|| {
                CommandError::invalid(
                    "Error importing examples",
                    "SQLALCHEMY_EXAMPLES_URI",
                    "Examples connection string is not configured.",
                )
            })?;
        Ok(self
            .contents
            .iter()
            .map(|(filename, text)| {
                (
                    filename.clone(),
                    text.replace(EXAMPLES_URI_PLACEHOLDER, examples_uri),
                )
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl Command for ImportExamplesCommand<'_> {
    type Output = ImportSummary;

    fn validate(&mut self) -> Result<(), CommandError> {
        ImportBundleCommand::new(self.store, self.gate, self.rewritten_contents()?)
            .overwrite(self.overwrite)
            .ignore_permissions(true)
            .validate()
    }

    async fn run(&mut self) -> Result<ImportSummary, CommandError> {
        tracing::info!(files = self.contents.len(), "seeding example content");
        ImportBundleCommand::new(self.store, self.gate, self.rewritten_contents()?)
            .overwrite(self.overwrite)
            .ignore_permissions(true)
            .run()
            .await
    }
}
