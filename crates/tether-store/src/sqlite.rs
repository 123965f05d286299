//! SQLite-backed `LinkStore` implementation with durable persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tether_core::{GuildId, LinkId, TextChannelId, VoiceChannelId};

use crate::{LinkStore, LinkStoreError, StoreResult, VoiceTextLink};

const SELECT_COLUMNS: &str =
    "id, guild_id, voice_channel_id, text_channel_id, created_at, updated_at";

/// Persistent SQLite store holding one row per voice/text link.
#[derive(Debug)]
pub struct SqliteLinkStore {
    db_path: PathBuf,
}

impl SqliteLinkStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS voice_text_links (
                id TEXT PRIMARY KEY,
                guild_id TEXT NOT NULL,
                voice_channel_id TEXT NOT NULL,
                text_channel_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_links_guild_voice
                ON voice_text_links (guild_id, voice_channel_id);
            "#,
        )?;
        Ok(())
    }
}

type LinkRow = (String, String, String, String, String, String);

fn link_from_row(row: LinkRow) -> StoreResult<VoiceTextLink> {
    let (id, guild_id, voice_channel_id, text_channel_id, created_at, updated_at) = row;
    VoiceTextLink::rebuild(
        LinkId::new(id),
        GuildId::new(guild_id),
        VoiceChannelId::new(voice_channel_id),
        TextChannelId::new(text_channel_id),
        parse_timestamp(&created_at)?,
        parse_timestamp(&updated_at)?,
    )
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn read_link_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn find_by_voice_channel(
        &self,
        guild: &GuildId,
        voice: &VoiceChannelId,
    ) -> StoreResult<Option<VoiceTextLink>> {
        let connection = self.open_connection()?;
        let row: Option<LinkRow> = connection
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM voice_text_links \
                     WHERE guild_id = ?1 AND voice_channel_id = ?2"
                ),
                params![guild.as_str(), voice.as_str()],
                read_link_row,
            )
            .optional()?;

        row.map(link_from_row).transpose()
    }

    async fn find_by_text_channel(
        &self,
        guild: &GuildId,
        text: &TextChannelId,
    ) -> StoreResult<Option<VoiceTextLink>> {
        let connection = self.open_connection()?;
        let row: Option<LinkRow> = connection
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM voice_text_links \
                     WHERE guild_id = ?1 AND text_channel_id = ?2"
                ),
                params![guild.as_str(), text.as_str()],
                read_link_row,
            )
            .optional()?;

        row.map(link_from_row).transpose()
    }

    async fn find_all(&self) -> StoreResult<Vec<VoiceTextLink>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM voice_text_links ORDER BY created_at, id"
        ))?;
        let rows = statement.query_map([], read_link_row)?;

        let mut links = Vec::new();
        for row in rows {
            links.push(link_from_row(row?)?);
        }
        Ok(links)
    }

    async fn save(&self, link: &VoiceTextLink) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = transaction.execute(
            r#"
            INSERT INTO voice_text_links (
                id, guild_id, voice_channel_id, text_channel_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                text_channel_id = excluded.text_channel_id,
                updated_at = excluded.updated_at
            "#,
            params![
                link.id().as_str(),
                link.guild_id().as_str(),
                link.voice_channel_id().as_str(),
                link.text_channel_id().as_str(),
                link.created_at().to_rfc3339(),
                link.updated_at().to_rfc3339(),
            ],
        );

        match result {
            // The unique (guild_id, voice_channel_id) index rejects a second
            // link with a different id for the same voice channel.
            Err(error) if is_constraint_violation(&error) => {
                return Err(LinkStoreError::DuplicateLink {
                    guild: link.guild_id().to_string(),
                    voice: link.voice_channel_id().to_string(),
                });
            }
            other => {
                other?;
            }
        }

        transaction.commit()?;
        Ok(())
    }

    async fn delete(&self, id: &LinkId) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = transaction.execute(
            "DELETE FROM voice_text_links WHERE id = ?1",
            params![id.as_str()],
        )?;
        if removed == 0 {
            return Err(LinkStoreError::LinkNotFound(id.to_string()));
        }

        transaction.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteLinkStore;
    use crate::{LinkStore, LinkStoreError, VoiceTextLink};
    use std::time::Duration;
    use tempfile::tempdir;
    use tether_core::{GuildId, LinkId, TextChannelId, VoiceChannelId};

    fn link(guild: &str, voice: &str, text: &str) -> VoiceTextLink {
        VoiceTextLink::new(
            GuildId::new(guild),
            VoiceChannelId::new(voice),
            TextChannelId::new(text),
        )
        .expect("valid link")
    }

    #[tokio::test]
    async fn persists_links_across_reopen() {
        let temp = tempdir().expect("create tempdir");
        let db_path = temp.path().join("links.sqlite");

        let saved = link("g-1", "v-1", "t-1");
        {
            let store = SqliteLinkStore::new(&db_path).expect("create store");
            store.save(&saved).await.expect("save");
        }

        let reopened = SqliteLinkStore::new(&db_path).expect("reopen store");
        let found = reopened
            .find_by_voice_channel(&GuildId::new("g-1"), &VoiceChannelId::new("v-1"))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.id(), saved.id());
        assert_eq!(found.text_channel_id().as_str(), "t-1");
        assert_eq!(found.created_at(), saved.created_at());
    }

    #[tokio::test]
    async fn upsert_updates_text_channel_and_timestamp_only() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLinkStore::new(temp.path().join("links.sqlite")).expect("create store");

        let mut saved = link("g-1", "v-1", "t-1");
        store.save(&saved).await.expect("save");

        std::thread::sleep(Duration::from_millis(5));
        saved
            .change_text_channel(TextChannelId::new("t-2"))
            .expect("rebind");
        store.save(&saved).await.expect("resave");

        let all = store.find_all().await.expect("find all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), saved.id());
        assert_eq!(all[0].text_channel_id().as_str(), "t-2");
        assert!(all[0].updated_at() > all[0].created_at());
    }

    #[tokio::test]
    async fn rejects_second_link_for_same_voice_channel() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLinkStore::new(temp.path().join("links.sqlite")).expect("create store");

        store.save(&link("g-1", "v-1", "t-1")).await.expect("save");
        let error = store
            .save(&link("g-1", "v-1", "t-9"))
            .await
            .expect_err("duplicate voice channel");
        assert!(matches!(error, LinkStoreError::DuplicateLink { .. }));
    }

    #[tokio::test]
    async fn find_all_returns_links_oldest_first() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLinkStore::new(temp.path().join("links.sqlite")).expect("create store");

        let first = link("g-1", "v-1", "t-1");
        store.save(&first).await.expect("save first");
        std::thread::sleep(Duration::from_millis(5));
        let second = link("g-1", "v-2", "t-2");
        store.save(&second).await.expect("save second");

        let all = store.find_all().await.expect("find all");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), first.id());
        assert_eq!(all[1].id(), second.id());
    }

    #[tokio::test]
    async fn delete_removes_row_and_reports_missing_ids() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteLinkStore::new(temp.path().join("links.sqlite")).expect("create store");

        let saved = link("g-1", "v-1", "t-1");
        store.save(&saved).await.expect("save");
        store.delete(saved.id()).await.expect("delete");

        let error = store.delete(saved.id()).await.expect_err("already deleted");
        assert!(matches!(error, LinkStoreError::LinkNotFound(_)));
        let error = store
            .delete(&LinkId::new("missing"))
            .await
            .expect_err("unknown id");
        assert!(matches!(error, LinkStoreError::LinkNotFound(_)));
    }
}
