use rusqlite::{Connection, params};

use agora_types::models::Caller;

use crate::StoreError;

/// Records the caller's current summary so author joins resolve.
/// Identity itself is owned by the external provider.
pub(crate) fn upsert(conn: &Connection, caller: &Caller) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO users (id, name, image, role) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, image = excluded.image, role = excluded.role",
        params![
            caller.id.to_string(),
            caller.name,
            caller.image,
            caller.role.as_str()
        ],
    )?;
    Ok(())
}
