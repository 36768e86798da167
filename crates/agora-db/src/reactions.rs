use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::debug;
use uuid::Uuid;

use agora_types::api::ReactionAction;
use agora_types::models::{Caller, ReactionMap, StreamId, aggregate_reactions};

use crate::models::{self, ReactionRow, opt_uuid_at, uuid_at};
use crate::{Database, StoreError, users};

/// Longest emoji token accepted, in bytes. Covers ZWJ sequences.
pub const MAX_EMOJI_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct ToggleOutcome {
    pub action: ReactionAction,
    /// Stream owning the message, for scoping change notifications.
    pub stream: StreamId,
    /// Aggregated state after the toggle.
    pub reactions: ReactionMap,
}

impl Database {
    /// Toggle a reaction: removes if it exists, inserts if not.
    ///
    /// Runs inside an IMMEDIATE transaction, so concurrent toggles of the
    /// same (message, user, emoji) serialize on the write lock; the UNIQUE
    /// constraint backs this up for writers outside this process.
    pub fn toggle_reaction(
        &self,
        caller: &Caller,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<ToggleOutcome, StoreError> {
        let emoji = validate_emoji(emoji)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let stream = message_stream(&tx, message_id)?;
            users::upsert(&tx, caller)?;

            let mid = message_id.to_string();
            let uid = caller.id.to_string();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    params![mid, uid, emoji],
                    |row| row.get(0),
                )
                .optional()?;

            let action = if let Some(existing_id) = existing {
                tx.execute("DELETE FROM reactions WHERE id = ?1", [&existing_id])?;
                ReactionAction::Removed
            } else {
                tx.execute(
                    "INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        Uuid::new_v4().to_string(),
                        mid,
                        uid,
                        emoji,
                        models::format_timestamp(models::now())
                    ],
                )?;
                ReactionAction::Added
            };

            let reactions = load_for_messages(&tx, &[message_id])?
                .remove(&message_id)
                .unwrap_or_default();
            tx.commit()?;

            debug!("{} {:?} {} on {}", caller.name, action, emoji, message_id);
            Ok(ToggleOutcome {
                action,
                stream,
                reactions,
            })
        })
    }

    /// Aggregated reactions for one message, recomputed from the ledger rows.
    pub fn list_reactions(&self, message_id: Uuid) -> Result<ReactionMap, StoreError> {
        self.with_conn(|conn| {
            message_stream(conn, message_id)?;
            Ok(load_for_messages(conn, &[message_id])?
                .remove(&message_id)
                .unwrap_or_default())
        })
    }
}

fn validate_emoji(emoji: &str) -> Result<&str, StoreError> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(StoreError::validation("Emoji is required"));
    }
    if emoji.len() > MAX_EMOJI_BYTES {
        return Err(StoreError::validation("Emoji is too long"));
    }
    Ok(emoji)
}

fn message_stream(conn: &Connection, message_id: Uuid) -> Result<StreamId, StoreError> {
    let (channel_id, thread_id) = conn
        .query_row(
            "SELECT channel_id, thread_id FROM messages WHERE id = ?1",
            [message_id.to_string()],
            |row| Ok((opt_uuid_at(row, 0)?, opt_uuid_at(row, 1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("Message"))?;

    match (channel_id, thread_id) {
        (Some(id), None) => Ok(StreamId::Channel(id)),
        (None, Some(id)) => Ok(StreamId::Thread(id)),
        _ => Err(anyhow::anyhow!("message {} has no single owning stream", message_id).into()),
    }
}

/// Batch-fetch and aggregate reactions for a set of message IDs.
/// Messages without reactions are absent from the result.
pub(crate) fn load_for_messages(
    conn: &Connection,
    message_ids: &[Uuid],
) -> Result<HashMap<Uuid, ReactionMap>, StoreError> {
    if message_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, user_id, emoji FROM reactions WHERE message_id IN ({})",
        placeholders.join(", ")
    );

    let ids: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok(ReactionRow {
                message_id: uuid_at(row, 0)?,
                user_id: uuid_at(row, 1)?,
                emoji: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: HashMap<Uuid, Vec<&ReactionRow>> = HashMap::new();
    for row in &rows {
        grouped.entry(row.message_id).or_default().push(row);
    }

    Ok(grouped
        .into_iter()
        .map(|(message_id, rows)| {
            let map = aggregate_reactions(rows.iter().map(|r| (r.emoji.as_str(), r.user_id)));
            (message_id, map)
        })
        .collect())
}
