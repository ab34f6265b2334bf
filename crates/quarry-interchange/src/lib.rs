//! Bundle import and export
//!
//! Entities travel between instances as bundles: a flat map of YAML
//! documents keyed by filename, with a `metadata.yaml` header naming the
//! bundle version and root entity type. Documents reference each other by
//! UUID, so a bundle is position-independent and survives re-import into
//! an instance with different row ids.
//!
//! Import resolves the dependency graph (databases before datasets before
//! charts before dashboards), runs inside one metadata transaction, and
//! accumulates all schema errors into a single
//! [`CommandError::Invalid`](quarry_core::command::CommandError::Invalid)
//! so callers can fix everything in one round trip.

pub mod document;
pub mod examples_seed;
pub mod export;
pub mod import;
pub mod importers;
pub mod schema;

pub use document::{
    BundleContents, BundleMetadata, ChartDoc, ColumnDoc, DashboardDoc, DatabaseDoc, DatasetDoc,
    EntityKind, MetricDoc, SavedQueryDoc, SshTunnelDoc, BUNDLE_VERSION, METADATA_FILE_NAME,
};
pub use examples_seed::{ImportExamplesCommand, EXAMPLES_URI_PLACEHOLDER};
pub use export::{ExportBundleCommand, ExportFiles};
pub use import::{BundleCredentials, ImportBundleCommand, ImportSummary};
pub use schema::MetadataError;
