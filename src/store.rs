//! Document record persistence.
//!
//! The lifecycle only needs three operations, captured by [`RecordStore`].
//! Writes are whole-record and last-write-wins; the lifecycle's run leases
//! make sure only one run writes a given document at a time.

use crate::document::{Document, DocumentId, DocumentStatus};
use crate::error::{FailureKind, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for [`Document`] records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record in `processing` and return it with its id.
    async fn create(&self, filename: &str, source: &str) -> Result<Document, StoreError>;

    async fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// Overwrite the stored record with `doc`.
    async fn save(&self, doc: &Document) -> Result<(), StoreError>;
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Process-local store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<DocumentId, Document>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, filename: &str, source: &str) -> Result<Document, StoreError> {
        let id = DocumentId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let doc = Document::new(id, filename, source);
        self.docs.write().await.insert(id, doc.clone());
        Ok(doc)
    }

    async fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.read().await.get(&id).cloned())
    }

    async fn save(&self, doc: &Document) -> Result<(), StoreError> {
        self.docs.write().await.insert(doc.id, doc.clone());
        Ok(())
    }
}

// ── SQLite ───────────────────────────────────────────────────────────────

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    source TEXT NOT NULL,
    status TEXT NOT NULL,
    structured_data TEXT,
    error_message TEXT,
    error_kind TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
"#;

/// SQLite-backed store. Queries run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        filename: row.get(1)?,
        source: row.get(2)?,
        status: row.get(3)?,
        structured_data: row.get(4)?,
        error_message: row.get(5)?,
        error_kind: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// A `documents` row before its text columns are parsed.
struct RawRow {
    id: i64,
    filename: String,
    source: String,
    status: String,
    structured_data: Option<String>,
    error_message: Option<String>,
    error_kind: Option<String>,
    created_at: String,
}

impl RawRow {
    fn into_document(self) -> Result<Document, StoreError> {
        let id = DocumentId(self.id as u64);
        let corrupt = |detail: String| StoreError::Corrupt { id, detail };

        let status = DocumentStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let structured_data = self
            .structured_data
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| corrupt(format!("structured_data: {e}")))?;
        let error_kind = match self.error_kind {
            Some(k) => Some(
                FailureKind::parse(&k).ok_or_else(|| corrupt(format!("unknown error kind '{k}'")))?,
            ),
            None => None,
        };
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(format!("created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Document {
            id,
            filename: self.filename,
            source: self.source,
            status,
            structured_data,
            error_message: self.error_message,
            error_kind,
            created_at,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create(&self, filename: &str, source: &str) -> Result<Document, StoreError> {
        let filename = filename.to_string();
        let source = source.to_string();
        self.with_conn(move |conn| {
            let mut doc = Document::new(DocumentId(0), filename, source);
            conn.execute(
                "INSERT INTO documents (filename, source, status, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    doc.filename,
                    doc.source,
                    doc.status.as_str(),
                    doc.created_at.to_rfc3339()
                ],
            )?;
            doc.id = DocumentId(conn.last_insert_rowid() as u64);
            debug!("Created document {} ({})", doc.id, doc.filename);
            Ok(doc)
        })
        .await
    }

    async fn get(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, filename, source, status, structured_data, error_message, error_kind, created_at
                     FROM documents WHERE id = ?1",
                    params![id.0 as i64],
                    read_row,
                )
                .optional()?;
            row.map(RawRow::into_document).transpose()
        })
        .await
    }

    async fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let doc = doc.clone();
        let data = doc
            .structured_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                id: doc.id,
                detail: e.to_string(),
            })?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, filename, source, status, structured_data, error_message, error_kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    filename = excluded.filename,
                    source = excluded.source,
                    status = excluded.status,
                    structured_data = excluded.structured_data,
                    error_message = excluded.error_message,
                    error_kind = excluded.error_kind",
                params![
                    doc.id.0 as i64,
                    doc.filename,
                    doc.source,
                    doc.status.as_str(),
                    data,
                    doc.error_message,
                    doc.error_kind.map(|k| k.as_str()),
                    doc.created_at.to_rfc3339()
                ],
            )?;
            debug!("Saved document {} as {}", doc.id, doc.status);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use serde_json::json;

    async fn lifecycle_roundtrip(store: &dyn RecordStore) {
        let mut doc = store.create("bill.pdf", "/tmp/bill.pdf").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);

        let other = store.create("other.pdf", "/tmp/other.pdf").await.unwrap();
        assert_ne!(doc.id, other.id);

        doc.complete(json!({"summary": {"Utilities": 42.5}}));
        store.save(&doc).await.unwrap();
        let loaded = store.get(doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Completed);
        assert_eq!(loaded.structured_data, doc.structured_data);
        assert!(loaded.is_consistent());

        doc.begin_run();
        doc.fail(&PipelineError::InputTooShort { chars: 2, min: 10 });
        store.save(&doc).await.unwrap();
        let loaded = store.get(doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Failed);
        assert_eq!(loaded.error_kind, Some(FailureKind::InputTooShort));
        assert!(loaded.structured_data.is_none());
        assert!(loaded.is_consistent());

        assert!(store.get(DocumentId(9_999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        lifecycle_roundtrip(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_store_roundtrip() {
        lifecycle_roundtrip(&SqliteStore::in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let mut doc = store.create("a.pdf", "a.pdf").await.unwrap();
            doc.complete(json!([1, 2, 3]));
            store.save(&doc).await.unwrap();
            doc.id
        };

        let store = SqliteStore::open(&path).unwrap();
        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.structured_data, Some(json!([1, 2, 3])));
        assert_eq!(doc.filename, "a.pdf");
    }

    #[tokio::test]
    async fn corrupt_status_is_reported() {
        let store = SqliteStore::in_memory().unwrap();
        let doc = store.create("a.pdf", "a.pdf").await.unwrap();
        let id = doc.id;
        store
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE documents SET status = 'archived' WHERE id = ?1",
                    params![id.0 as i64],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(
            store.get(id).await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
