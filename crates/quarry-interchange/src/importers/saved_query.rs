//! Saved query importer

use crate::document::SavedQueryDoc;
use crate::importers::ImportContext;
use quarry_core::command::CommandError;
use quarry_core::model::{Database, SavedQuery};

pub fn import_saved_query(
    ctx: &mut ImportContext<'_>,
    doc: SavedQueryDoc,
    database: &Database,
) -> Result<SavedQuery, CommandError> {
    let existing = ctx.session.saved_queries().find_by_uuid(doc.uuid);
    if let Some(existing) = &existing {
        if !ctx.overwrite {
            return Ok(existing.clone());
        }
    } else {
        ctx.check_can_create("SavedQuery")?;
    }

    let query = SavedQuery {
        id: existing.and_then(|e| e.id),
        uuid: doc.uuid,
        label: doc.label,
        schema: doc.schema,
        sql: doc.sql,
        db_id: database.id,
    };

    ctx.session
        .saved_queries()
        .upsert(query)
        .map_err(|err| CommandError::Exception(err.into()))
}
