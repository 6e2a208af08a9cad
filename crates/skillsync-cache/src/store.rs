//! SQLite implementation of ILocalStore
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                   |
//! |----------------------|----------|--------------------------------------------|
//! | CollectionId         | TEXT     | `.as_str()` / `CollectionId::new()`        |
//! | EventTime            | TEXT + INTEGER | vendor-shaped JSON plus epoch millis for range queries |
//! | vendor timestamps    | INTEGER  | epoch millis, compared for last-writer-wins |
//! | local write times    | TEXT     | RFC 3339 via `to_rfc3339()`                |
//! | ExtensionPayload     | TEXT     | serde_json                                 |
//! | Vec<String>          | TEXT     | serde_json array                           |
//!
//! Write gating lives in SQL: every item upsert is an
//! `INSERT .. ON CONFLICT DO UPDATE .. WHERE` whose condition accepts the
//! incoming row only if either timestamp is NULL or incoming >= stored.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use skillsync_core::domain::{
    drive::{DOCUMENT_MIME, SPREADSHEET_MIME},
    newtypes::{CollectionId, TimeRange},
    CalendarEvent, Change, CollectionKind, ContentKind, ContentRef, Document, DriveFile,
    EventTime, ExtensionPayload, RemoteCollection, Spreadsheet,
};
use skillsync_core::ports::{ApplyStats, Coverage, FileFilter, ILocalStore, StoreTotals};

use crate::CacheError;

/// SQLite-based implementation of the local store port
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Creates a new store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

fn to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>, CacheError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| CacheError::SerializationError(format!("timestamp out of range: {}", ms)))
}

fn opt_from_ms(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, CacheError> {
    ms.map(from_ms).transpose()
}

/// Parse an RFC 3339 datetime string into a `DateTime<Utc>`
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("invalid datetime '{}': {}", s, e)))
}

fn parse_payload(s: &str) -> Result<ExtensionPayload, CacheError> {
    Ok(ExtensionPayload::new(serde_json::from_str(s)?))
}

fn collection_from_row(row: &SqliteRow) -> Result<RemoteCollection, CacheError> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    Ok(RemoteCollection {
        id: CollectionId::new(id).map_err(|e| CacheError::SerializationError(e.to_string()))?,
        kind: CollectionKind::parse(&kind).ok_or_else(|| {
            CacheError::SerializationError(format!("unknown collection kind: {}", kind))
        })?,
        summary: row.try_get("summary")?,
        time_zone: row.try_get("time_zone")?,
        access_role: row.try_get("access_role")?,
        primary: row.try_get("is_primary")?,
        hidden: row.try_get("hidden")?,
        selected: row.try_get("selected")?,
        payload: parse_payload(row.try_get("raw_json")?)?,
        synced_at: parse_datetime(row.try_get("synced_at")?)?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<CalendarEvent, CacheError> {
    let calendar_id: String = row.try_get("calendar_id")?;
    let start: EventTime = serde_json::from_str(row.try_get("start_json")?)?;
    let end: EventTime = serde_json::from_str(row.try_get("end_json")?)?;
    Ok(CalendarEvent {
        calendar_id: CollectionId::new(calendar_id)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        id: row.try_get("id")?,
        summary: row.try_get("summary")?,
        status: row.try_get("status")?,
        start,
        end,
        updated: opt_from_ms(row.try_get("updated_ms")?)?,
        payload: parse_payload(row.try_get("raw_json")?)?,
        synced_at: parse_datetime(row.try_get("synced_at")?)?,
    })
}

fn file_from_row(row: &SqliteRow) -> Result<DriveFile, CacheError> {
    Ok(DriveFile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        mime_type: row.try_get("mime_type")?,
        modified_time: opt_from_ms(row.try_get("modified_ms")?)?,
        size: row.try_get("size_bytes")?,
        parents: serde_json::from_str(row.try_get("parents_json")?)?,
        trashed: row.try_get("trashed")?,
        payload: parse_payload(row.try_get("raw_json")?)?,
        synced_at: parse_datetime(row.try_get("synced_at")?)?,
    })
}

const EVENT_COLUMNS: &str = "calendar_id, id, summary, status, start_json, end_json, \
     updated_ms, raw_json, synced_at";

const FILE_COLUMNS: &str =
    "id, name, mime_type, modified_ms, size_bytes, parents_json, trashed, raw_json, synced_at";

// ============================================================================
// Batch writers (run inside a caller-owned transaction)
// ============================================================================

async fn upsert_event(conn: &mut SqliteConnection, event: &CalendarEvent) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO events (calendar_id, id, summary, status, start_ms, end_ms,
                            start_json, end_json, all_day, updated_ms, raw_json, synced_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (calendar_id, id) DO UPDATE SET
            summary = excluded.summary,
            status = excluded.status,
            start_ms = excluded.start_ms,
            end_ms = excluded.end_ms,
            start_json = excluded.start_json,
            end_json = excluded.end_json,
            all_day = excluded.all_day,
            updated_ms = excluded.updated_ms,
            raw_json = excluded.raw_json,
            synced_at = excluded.synced_at
        WHERE excluded.updated_ms IS NULL
           OR events.updated_ms IS NULL
           OR excluded.updated_ms >= events.updated_ms
        "#,
    )
    .bind(event.calendar_id.as_str())
    .bind(&event.id)
    .bind(&event.summary)
    .bind(&event.status)
    .bind(to_ms(event.start_ts()))
    .bind(to_ms(event.end_ts()))
    .bind(serde_json::to_string(&event.start)?)
    .bind(serde_json::to_string(&event.end)?)
    .bind(event.start.is_all_day())
    .bind(event.updated.map(to_ms))
    .bind(serde_json::to_string(&event.payload)?)
    .bind(event.synced_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("upsert event {}", event.id))?;

    Ok(result.rows_affected() > 0)
}

async fn delete_event(
    conn: &mut SqliteConnection,
    calendar_id: &CollectionId,
    event_id: &str,
    updated: Option<DateTime<Utc>>,
) -> Result<bool> {
    let updated_ms = updated.map(to_ms);
    let result = sqlx::query(
        "DELETE FROM events WHERE calendar_id = ? AND id = ? \
         AND (? IS NULL OR updated_ms IS NULL OR updated_ms <= ?)",
    )
    .bind(calendar_id.as_str())
    .bind(event_id)
    .bind(updated_ms)
    .bind(updated_ms)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("delete event {}", event_id))?;

    Ok(result.rows_affected() > 0)
}

async fn upsert_file(conn: &mut SqliteConnection, file: &DriveFile) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO files (id, name, mime_type, modified_ms, size_bytes, parents_json,
                           trashed, raw_json, synced_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            mime_type = excluded.mime_type,
            modified_ms = excluded.modified_ms,
            size_bytes = excluded.size_bytes,
            parents_json = excluded.parents_json,
            trashed = excluded.trashed,
            raw_json = excluded.raw_json,
            synced_at = excluded.synced_at
        WHERE excluded.modified_ms IS NULL
           OR files.modified_ms IS NULL
           OR excluded.modified_ms >= files.modified_ms
        "#,
    )
    .bind(&file.id)
    .bind(&file.name)
    .bind(&file.mime_type)
    .bind(file.modified_time.map(to_ms))
    .bind(file.size)
    .bind(serde_json::to_string(&file.parents)?)
    .bind(file.trashed)
    .bind(serde_json::to_string(&file.payload)?)
    .bind(file.synced_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("upsert file {}", file.id))?;

    Ok(result.rows_affected() > 0)
}

async fn delete_file(
    conn: &mut SqliteConnection,
    file_id: &str,
    updated: Option<DateTime<Utc>>,
) -> Result<bool> {
    let updated_ms = updated.map(to_ms);
    let result = sqlx::query(
        "DELETE FROM files WHERE id = ? \
         AND (? IS NULL OR modified_ms IS NULL OR modified_ms <= ?)",
    )
    .bind(file_id)
    .bind(updated_ms)
    .bind(updated_ms)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("delete file {}", file_id))?;

    if result.rows_affected() > 0 {
        sqlx::query("DELETE FROM spreadsheets WHERE id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    // --- collections ---

    async fn upsert_collections(&self, collections: &[RemoteCollection]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for collection in collections {
            sqlx::query(
                r#"
                INSERT INTO collections (id, kind, summary, time_zone, access_role, is_primary,
                                         hidden, selected, raw_json, synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    kind = excluded.kind,
                    summary = excluded.summary,
                    time_zone = excluded.time_zone,
                    access_role = excluded.access_role,
                    is_primary = excluded.is_primary,
                    hidden = excluded.hidden,
                    selected = excluded.selected,
                    raw_json = excluded.raw_json,
                    synced_at = excluded.synced_at
                "#,
            )
            .bind(collection.id.as_str())
            .bind(collection.kind.as_str())
            .bind(&collection.summary)
            .bind(&collection.time_zone)
            .bind(&collection.access_role)
            .bind(collection.primary)
            .bind(collection.hidden)
            .bind(collection.selected)
            .bind(serde_json::to_string(&collection.payload)?)
            .bind(collection.synced_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert collection {}", collection.id))?;
        }

        tx.commit().await?;
        tracing::trace!(count = collections.len(), "Upserted collections");
        Ok(())
    }

    async fn mark_collection_removed(&self, id: &CollectionId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collections SET hidden = 1, selected = 0, synced_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_collections(&self) -> Result<Vec<RemoteCollection>> {
        let rows = sqlx::query("SELECT * FROM collections ORDER BY is_primary DESC, summary, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| collection_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn get_collection(&self, id: &CollectionId) -> Result<Option<RemoteCollection>> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(collection_from_row).transpose()?)
    }

    // --- events ---

    async fn apply_event_changes(
        &self,
        calendar_id: &CollectionId,
        changes: &[Change<CalendarEvent>],
    ) -> Result<ApplyStats> {
        let mut stats = ApplyStats::default();
        let mut tx = self.pool.begin().await?;

        for change in changes {
            match change {
                Change::Upsert(event) => {
                    if upsert_event(&mut tx, event).await? {
                        stats.upserted += 1;
                    } else {
                        stats.skipped_stale += 1;
                    }
                }
                Change::Removed { id, updated } => {
                    if delete_event(&mut tx, calendar_id, id, *updated).await? {
                        stats.deleted += 1;
                    }
                }
            }
        }

        tx.commit().await?;
        tracing::trace!(
            calendar_id = %calendar_id,
            upserted = stats.upserted,
            skipped_stale = stats.skipped_stale,
            deleted = stats.deleted,
            "Applied event page"
        );
        Ok(stats)
    }

    async fn get_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>> {
        let sql = format!(
            "SELECT {} FROM events WHERE calendar_id = ? AND id = ?",
            EVENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(calendar_id.as_str())
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(event_from_row).transpose()?)
    }

    async fn query_events(
        &self,
        calendar_id: &CollectionId,
        range: &TimeRange,
    ) -> Result<Vec<CalendarEvent>> {
        let start = to_ms(range.start());
        let end = to_ms(range.end());
        // Zero-length events match when they sit inside the range
        let sql = format!(
            "SELECT {} FROM events WHERE calendar_id = ? AND start_ms < ? \
             AND (end_ms > ? OR (end_ms = start_ms AND start_ms >= ?)) \
             ORDER BY start_ms, id",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(calendar_id.as_str())
            .bind(end)
            .bind(start)
            .bind(start)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| event_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn event_coverage(&self, calendar_id: &CollectionId) -> Result<Option<Coverage>> {
        let (earliest, latest, count): (Option<i64>, Option<i64>, i64) = sqlx::query_as(
            "SELECT MIN(start_ms), MAX(end_ms), COUNT(*) FROM events WHERE calendar_id = ?",
        )
        .bind(calendar_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        match (earliest, latest) {
            (Some(earliest), Some(latest)) if count > 0 => Ok(Some(Coverage {
                earliest_start: from_ms(earliest)?,
                latest_end: from_ms(latest)?,
                item_count: count as u64,
            })),
            _ => Ok(None),
        }
    }

    async fn prune_events(
        &self,
        calendar_id: &CollectionId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE calendar_id = ? AND end_ms < ?")
            .bind(calendar_id.as_str())
            .bind(to_ms(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- drive ---

    async fn apply_file_changes(&self, changes: &[Change<DriveFile>]) -> Result<ApplyStats> {
        let mut stats = ApplyStats::default();
        let mut tx = self.pool.begin().await?;

        for change in changes {
            match change {
                Change::Upsert(file) => {
                    if upsert_file(&mut tx, file).await? {
                        stats.upserted += 1;
                    } else {
                        stats.skipped_stale += 1;
                    }
                }
                Change::Removed { id, updated } => {
                    if delete_file(&mut tx, id, *updated).await? {
                        stats.deleted += 1;
                    }
                }
            }
        }

        tx.commit().await?;
        tracing::trace!(
            upserted = stats.upserted,
            skipped_stale = stats.skipped_stale,
            deleted = stats.deleted,
            "Applied file page"
        );
        Ok(stats)
    }

    async fn get_file(&self, file_id: &str) -> Result<Option<DriveFile>> {
        let sql = format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(file_from_row).transpose()?)
    }

    async fn list_files(&self, filter: &FileFilter) -> Result<Vec<DriveFile>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM files WHERE 1 = 1", FILE_COLUMNS));

        if !filter.include_trashed {
            qb.push(" AND trashed = 0");
        }
        if let Some(fragment) = &filter.name_contains {
            qb.push(" AND LOWER(name) LIKE ")
                .push_bind(format!("%{}%", fragment.to_lowercase()));
        }
        if let Some(mime) = &filter.mime_type {
            qb.push(" AND mime_type = ").push_bind(mime.clone());
        }
        if let Some(since) = filter.modified_after {
            qb.push(" AND modified_ms > ").push_bind(to_ms(since));
        }
        qb.push(" ORDER BY modified_ms DESC, id");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| file_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn prune_files(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM files WHERE modified_ms IS NOT NULL AND modified_ms < ?")
            .bind(to_ms(cutoff))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM spreadsheets WHERE id NOT IN (SELECT id FROM files)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id NOT IN (SELECT id FROM files)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM content_unavailable WHERE file_id NOT IN (SELECT id FROM files)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn files_needing_content(&self, limit: u32) -> Result<Vec<ContentRef>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id, f.mime_type, f.modified_ms
            FROM files f
            LEFT JOIN spreadsheets s ON s.id = f.id
            LEFT JOIN documents d ON d.id = f.id
            LEFT JOIN content_unavailable u
                ON u.file_id = f.id AND u.modified_ms IS f.modified_ms
            WHERE f.trashed = 0 AND u.file_id IS NULL AND (
                (f.mime_type = ? AND (s.id IS NULL OR (f.modified_ms IS NOT NULL
                    AND (s.modified_ms IS NULL OR s.modified_ms < f.modified_ms))))
                OR
                (f.mime_type = ? AND (d.id IS NULL OR (f.modified_ms IS NOT NULL
                    AND (d.modified_ms IS NULL OR d.modified_ms < f.modified_ms))))
            )
            ORDER BY f.modified_ms DESC, f.id
            LIMIT ?
            "#,
        )
        .bind(SPREADSHEET_MIME)
        .bind(DOCUMENT_MIME)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut refs = Vec::with_capacity(rows.len());
        for row in &rows {
            let mime: String = row.try_get("mime_type")?;
            let Some(kind) = ContentKind::from_mime(&mime) else {
                continue;
            };
            refs.push(ContentRef {
                file_id: row.try_get("id")?,
                kind,
                modified_time: opt_from_ms(row.try_get("modified_ms")?)?,
            });
        }
        Ok(refs)
    }

    async fn mark_content_unavailable(&self, item: &ContentRef, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_unavailable (file_id, modified_ms, reason, marked_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (file_id) DO UPDATE SET
                modified_ms = excluded.modified_ms,
                reason = excluded.reason,
                marked_at = excluded.marked_at
            "#,
        )
        .bind(&item.file_id)
        .bind(item.modified_time.map(to_ms))
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_spreadsheet(&self, spreadsheet: &Spreadsheet) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO spreadsheets (id, title, modified_ms, sheet_titles_json, raw_json, synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                modified_ms = excluded.modified_ms,
                sheet_titles_json = excluded.sheet_titles_json,
                raw_json = excluded.raw_json,
                synced_at = excluded.synced_at
            WHERE excluded.modified_ms IS NULL
               OR spreadsheets.modified_ms IS NULL
               OR excluded.modified_ms >= spreadsheets.modified_ms
            "#,
        )
        .bind(&spreadsheet.id)
        .bind(&spreadsheet.title)
        .bind(spreadsheet.modified_time.map(to_ms))
        .bind(serde_json::to_string(&spreadsheet.sheet_titles)?)
        .bind(serde_json::to_string(&spreadsheet.payload)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_document(&self, document: &Document) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, title, modified_ms, body_text, raw_json, synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                modified_ms = excluded.modified_ms,
                body_text = excluded.body_text,
                raw_json = excluded.raw_json,
                synced_at = excluded.synced_at
            WHERE excluded.modified_ms IS NULL
               OR documents.modified_ms IS NULL
               OR excluded.modified_ms >= documents.modified_ms
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(document.modified_time.map(to_ms))
        .bind(&document.body_text)
        .bind(serde_json::to_string(&document.payload)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_spreadsheet(&self, id: &str) -> Result<Option<Spreadsheet>> {
        let row = sqlx::query(
            "SELECT id, title, modified_ms, sheet_titles_json, raw_json FROM spreadsheets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Spreadsheet {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            modified_time: opt_from_ms(row.try_get("modified_ms")?)?,
            sheet_titles: serde_json::from_str(row.try_get("sheet_titles_json")?)?,
            payload: parse_payload(row.try_get("raw_json")?)?,
        }))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, modified_ms, body_text, raw_json FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Document {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            modified_time: opt_from_ms(row.try_get("modified_ms")?)?,
            body_text: row.try_get("body_text")?,
            payload: parse_payload(row.try_get("raw_json")?)?,
        }))
    }

    // --- sync state ---

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_state (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("set sync state {}", key))?;

        tracing::trace!(key, "Stored sync state");
        Ok(())
    }

    async fn delete_state(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        tracing::trace!(key, "Cleared sync state");
        Ok(())
    }

    // --- statistics ---

    async fn totals(&self) -> Result<StoreTotals> {
        let (collections, events, files, spreadsheets, documents): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT (SELECT COUNT(*) FROM collections), (SELECT COUNT(*) FROM events), \
                 (SELECT COUNT(*) FROM files), (SELECT COUNT(*) FROM spreadsheets), \
                 (SELECT COUNT(*) FROM documents)",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreTotals {
            collections: collections as u64,
            events: events as u64,
            files: files as u64,
            spreadsheets: spreadsheets as u64,
            documents: documents as u64,
        })
    }
}
