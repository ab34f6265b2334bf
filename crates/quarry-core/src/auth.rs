//! Authorization gate
//!
//! A thin abstract interface checked at the edges of every command. The
//! policy behind it is pluggable and orthogonal to the core; commands only
//! consume the capability answers.

use crate::command::CommandInvalid;
use crate::error::{ErrorKind, QuarryError};
use crate::model::User;
use serde::{Deserialize, Serialize};

/// Capability checks the core consumes. Defaults are deliberately closed.
pub trait AuthorizationGate: Send + Sync {
    /// Generic capability check, e.g. `can_access("can_write", "Dataset")`.
    fn can_access(&self, verb: &str, object_kind: &str) -> bool;

    fn is_admin(&self) -> bool {
        false
    }

    /// The request-scoped principal, when one is present.
    fn current_user(&self) -> Option<User> {
        None
    }

    fn get_user_by_id(&self, _id: i64) -> Option<User> {
        None
    }
}

/// Permissive gate used for curated example seeding and tests.
#[derive(Debug, Clone, Default)]
pub struct AllowAllGate {
    pub user: Option<User>,
}

impl AllowAllGate {
    pub fn with_user(user: User) -> Self {
        Self { user: Some(user) }
    }
}

impl AuthorizationGate for AllowAllGate {
    fn can_access(&self, _verb: &str, _object_kind: &str) -> bool {
        true
    }

    fn is_admin(&self) -> bool {
        true
    }

    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }

    fn get_user_by_id(&self, id: i64) -> Option<User> {
        self.user.clone().filter(|u| u.id == id)
    }
}

/// Fail unless the caller is an admin or a member of the owner set.
pub fn raise_for_ownership(
    gate: &dyn AuthorizationGate,
    owners: &[i64],
) -> Result<(), QuarryError> {
    if gate.is_admin() {
        return Ok(());
    }
    let user = gate.current_user();
    match user {
        Some(user) if owners.contains(&user.id) => Ok(()),
        _ => Err(QuarryError::new(
            ErrorKind::MissingOwnership,
            "You don't have the rights to alter this object",
        )),
    }
}

/// Compose the owner set for a create/update command.
///
/// - No owners supplied and `default_to_user`: the current user is the sole
///   owner.
/// - Owners supplied by an admin: the supplied list is authoritative.
/// - Owners supplied by a non-admin: union-ed with the current user, so the
///   caller cannot remove themselves while editing.
///
/// Unknown user ids accumulate into the returned validation error.
pub fn populate_owner_list(
    gate: &dyn AuthorizationGate,
    supplied: Option<&[i64]>,
    default_to_user: bool,
) -> Result<Vec<i64>, CommandInvalid> {
    let mut owners: Vec<i64> = Vec::new();
    let mut invalid = CommandInvalid::new("Owners are invalid");

    match supplied {
        None | Some([]) => {
            if default_to_user {
                if let Some(user) = gate.current_user() {
                    owners.push(user.id);
                }
            }
        }
        Some(ids) => {
            for &id in ids {
                if gate.get_user_by_id(id).is_none() {
                    invalid.add("owners", format!("User {id} does not exist"));
                } else if !owners.contains(&id) {
                    owners.push(id);
                }
            }
            if !gate.is_admin() {
                if let Some(user) = gate.current_user() {
                    if !owners.contains(&user.id) {
                        owners.push(user.id);
                    }
                }
            }
        }
    }

    if invalid.is_empty() {
        Ok(owners)
    } else {
        Err(invalid)
    }
}

/// Kinds of tags. Only user-defined tags are mutable through the write path;
/// the rest are managed internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Custom,
    Type,
    Owner,
    FavoritedBy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub kind: TagKind,
}

/// Whether the caller may add or remove tags on the given object kind.
pub fn can_write_tags(gate: &dyn AuthorizationGate, object_kind: &str) -> bool {
    gate.can_access("can_write", "Tag") || gate.can_access("can_tag", object_kind)
}

/// Resolve the custom tags to apply during a create/update command.
///
/// Invalid ids surface as a validation error on `tags`; system-kind tags are
/// dropped from the write path with a log line, matching the rule that only
/// user tags are user-mutable.
pub fn validate_tag_update(
    gate: &dyn AuthorizationGate,
    object_kind: &str,
    tag_ids: &[i64],
    lookup: &dyn Fn(i64) -> Option<Tag>,
) -> Result<Vec<Tag>, CommandInvalid> {
    let mut invalid = CommandInvalid::new("Tags are invalid");
    if !tag_ids.is_empty() && !can_write_tags(gate, object_kind) {
        invalid.add("tags", "You do not have permission to modify tags");
        return Err(invalid);
    }

    let mut tags = Vec::new();
    for &id in tag_ids {
        match lookup(id) {
            None => invalid.add("tags", format!("Tag {id} not found")),
            Some(tag) if tag.kind == TagKind::Custom => tags.push(tag),
            Some(tag) => {
                tracing::info!(tag = %tag.name, "ignoring system tag on write path");
            }
        }
    }

    if invalid.is_empty() {
        Ok(tags)
    } else {
        Err(invalid)
    }
}
