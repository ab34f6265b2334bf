//! Quarry core: error taxonomy, logical entities, DAO seams, command
//! skeleton, authorization gate, and configuration.
//!
//! Everything downstream — engine specs, the transpiler, the interchange
//! layer, and the validation commands — builds on the types defined here.

pub mod auth;
pub mod command;
pub mod config;
pub mod dao;
pub mod error;
pub mod memstore;
pub mod model;
pub mod secrets;

pub use auth::{AllowAllGate, AuthorizationGate};
pub use command::{Command, CommandError, CommandInvalid};
pub use config::{FeatureFlags, QuarryConfig};
pub use dao::{DaoError, DaoResult, MetadataSession, MetadataStore};
pub use error::{ErrorEnvelope, ErrorKind, ErrorLevel, QuarryError};
pub use memstore::{MemStore, StoreSnapshot};
pub use model::{
    Chart, Column, Dashboard, Database, Dataset, DatasetKind, Metric, SavedQuery, SshTunnel, User,
};
pub use secrets::{SecretCipher, PASSWORD_MASK};
