use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{Document, Fields, Value, split_document_path};
use crate::store::{DocumentStore, Page, SetMode};

/// SQLite-backed document store for offline runs.
///
/// Every document is one row keyed by its full path; fields are kept as
/// JSON. Listing pages through a collection in document id order, using
/// the last id of a page as the continuation token.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

struct RawDocument {
    path: String,
    doc_id: String,
    fields: String,
    created_at: String,
    updated_at: String,
}

impl RawDocument {
    fn into_document(self) -> Result<Document> {
        let fields: Fields = serde_json::from_str(&self.fields)
            .with_context(|| format!("Corrupt fields for document {}", self.path))?;
        Ok(Document {
            id: self.doc_id,
            create_time: Some(parse_ts(&self.created_at)?),
            update_time: Some(parse_ts(&self.updated_at)?),
            path: self.path,
            fields,
        })
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in local store: {s}"))?
        .with_timezone(&Utc))
}

/// JSON has no NaN or infinity, so such doubles could be written but never read back.
fn ensure_finite(fields: &Fields, path: &str) -> Result<()> {
    fn check(key: &str, value: &Value, path: &str) -> Result<()> {
        match value {
            Value::Double(d) if !d.is_finite() => {
                bail!("Cannot store non-finite number {d} in field '{key}' of {path}")
            }
            Value::GeoPoint {
                latitude,
                longitude,
            } if !latitude.is_finite() || !longitude.is_finite() => {
                bail!("Cannot store non-finite geo point in field '{key}' of {path}")
            }
            Value::Map(inner) => ensure_finite(inner, path),
            Value::Array(items) => items.iter().try_for_each(|v| check(key, v, path)),
            _ => Ok(()),
        }
    }

    fields.iter().try_for_each(|(k, v)| check(k, v, path))
}

/// Replace every `ServerTimestamp` sentinel with `now`.
fn resolve_server_timestamps(fields: &Fields, now: DateTime<Utc>) -> Fields {
    fn resolve(value: &Value, now: DateTime<Utc>) -> Value {
        match value {
            Value::ServerTimestamp => Value::Timestamp(now),
            Value::Map(inner) => Value::Map(resolve_server_timestamps(inner, now)),
            Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, now)).collect()),
            other => other.clone(),
        }
    }

    fields
        .iter()
        .map(|(k, v)| (k.clone(), resolve(v, now)))
        .collect()
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open local store: {}", path.display()))?;
        Self::migrate(&conn)?;
        Ok(LocalStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(LocalStore {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                    path TEXT PRIMARY KEY,
                    collection TEXT NOT NULL,
                    doc_id TEXT NOT NULL,
                    fields TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, doc_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Local store connection lock poisoned"))
    }

    fn raw_from_row(row: &rusqlite::Row) -> rusqlite::Result<RawDocument> {
        Ok(RawDocument {
            path: row.get(0)?,
            doc_id: row.get(1)?,
            fields: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    pub fn list_page(
        &self,
        collection: &str,
        page_size: usize,
        after: Option<&str>,
    ) -> Result<Page> {
        if page_size == 0 {
            bail!("Page size must be greater than 0");
        }
        // One extra row tells us whether another page follows.
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX - 1) + 1;

        let raws = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT path, doc_id, fields, created_at, updated_at FROM documents
                 WHERE collection = ?1 AND doc_id > ?2
                 ORDER BY doc_id
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(
                    params![collection, after.unwrap_or(""), limit],
                    Self::raw_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut documents = raws
            .into_iter()
            .map(RawDocument::into_document)
            .collect::<Result<Vec<_>>>()?;

        let next_page_token = if documents.len() > page_size {
            documents.truncate(page_size);
            documents.last().map(|d| d.id.clone())
        } else {
            None
        };

        Ok(Page {
            documents,
            next_page_token,
        })
    }

    pub fn get(&self, path: &str) -> Result<Option<Document>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT path, doc_id, fields, created_at, updated_at FROM documents WHERE path = ?1",
                params![path],
                Self::raw_from_row,
            )
            .optional()?
        };
        raw.map(RawDocument::into_document).transpose()
    }

    pub fn set(&self, path: &str, fields: &Fields, mode: SetMode) -> Result<()> {
        let (collection, doc_id) = split_document_path(path)?;
        ensure_finite(fields, path)?;
        let now = Utc::now();
        let resolved = resolve_server_timestamps(fields, now);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT fields FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;

        let stored = match (mode, existing) {
            (SetMode::Merge, Some(json)) => {
                let mut current: Fields = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt fields for document {path}"))?;
                current.extend(resolved);
                current
            }
            _ => resolved,
        };

        tx.execute(
            "INSERT INTO documents (path, collection, doc_id, fields, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(path) DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at",
            params![
                path,
                collection,
                doc_id,
                serde_json::to_string(&stored)?,
                format_ts(now)
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn add(&self, collection: &str, fields: &Fields) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let path = format!("{collection}/{id}");
        self.set(&path, fields, SetMode::Overwrite)?;
        Ok(id)
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn list_documents(
        &self,
        collection: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page> {
        self.list_page(collection, page_size, page_token)
    }

    async fn get_document(&self, path: &str) -> Result<Option<Document>> {
        self.get(path)
    }

    async fn set_document(&self, path: &str, fields: &Fields, mode: SetMode) -> Result<()> {
        self.set(path, fields, mode)
    }

    async fn add_document(&self, collection: &str, fields: &Fields) -> Result<String> {
        self.add(collection, fields)
    }
}
