//! SQLite-backed [`VectorStore`].
//!
//! The store owns one directory. Inside it lives `store.sqlite` (plus the
//! WAL side files), holding a single `fragments` table keyed by
//! `(collection, id)`. Embeddings are stored as little-endian f32 BLOBs and
//! searched by brute-force cosine distance, which is plenty for a personal
//! document set.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

use super::{check_upsert_args, embed_checked, rank, QueryResult, VectorStore};
use crate::embedding::{blob_to_vec, vec_to_blob, Embedder};
use crate::models::Metadata;

/// Database file name inside the store directory.
pub const STORE_FILE: &str = "store.sqlite";

/// Directory entries the store creates and may therefore delete.
const OWNED_ENTRIES: [&str; 4] = [
    STORE_FILE,
    "store.sqlite-wal",
    "store.sqlite-shm",
    "store.sqlite-journal",
];

/// Aggregate view of a collection, for `docsort stats`.
#[derive(Debug, Clone, Default)]
pub struct StoreSummary {
    pub fragments: i64,
    pub files: i64,
    pub models: Vec<String>,
    pub last_updated: Option<i64>,
}

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    embedder: Box<dyn Embedder>,
}

impl SqliteStore {
    /// Open (creating on first use) the store in `dir`.
    pub async fn open(dir: &Path, collection: &str, embedder: Box<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        let db_path = dir.join(STORE_FILE);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open store: {}", db_path.display()))?;

        migrate(&pool).await?;
        debug!(path = %db_path.display(), collection, "opened store");

        Ok(Self {
            pool,
            collection: collection.to_string(),
            embedder,
        })
    }

    /// Fragment, file and model counts for the collection.
    pub async fn summary(&self) -> Result<StoreSummary> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS fragments,
                   COUNT(DISTINCT json_extract(metadata_json, '$.source')) AS files,
                   MAX(updated_at) AS last_updated
            FROM fragments WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;

        let models: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT model FROM fragments WHERE collection = ? ORDER BY model",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(StoreSummary {
            fragments: row.get("fragments"),
            files: row.get("files"),
            models,
            last_updated: row.get("last_updated"),
        })
    }

    /// Fail when the collection holds vectors from another model or of
    /// another size; distances against them would be meaningless.
    async fn check_embedder(&self) -> Result<()> {
        let foreign: Option<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT model, dims, COUNT(*) FROM fragments
            WHERE collection = ? AND (model <> ? OR dims <> ?)
            GROUP BY model, dims
            ORDER BY COUNT(*) DESC
            LIMIT 1
            "#,
        )
        .bind(&self.collection)
        .bind(self.embedder.model_name())
        .bind(self.embedder.dims() as i64)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((model, dims, count)) = foreign {
            bail!(
                "collection '{}' has {} fragments embedded with '{}' ({} dims), but the configured \
                 embedder is '{}' ({} dims); rebuild with `docsort build --fresh-build`",
                self.collection,
                count,
                model,
                dims,
                self.embedder.model_name(),
                self.embedder.dims()
            );
        }
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fragments (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<()> {
        check_upsert_args(ids, documents, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }

        let vectors = embed_checked(self.embedder.as_ref(), documents).await?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (((id, document), metadata), vector) in
            ids.iter().zip(documents).zip(metadatas).zip(&vectors)
        {
            sqlx::query(
                r#"
                INSERT INTO fragments
                    (collection, id, document, metadata_json, embedding, model, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(id)
            .bind(document)
            .bind(serde_json::to_string(metadata)?)
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, query_texts: &[String], n_results: usize) -> Result<QueryResult> {
        self.check_embedder().await?;
        let query_vecs = embed_checked(self.embedder.as_ref(), query_texts).await?;

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM fragments WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let document: String = row.get("document");
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for fragment {}", id))?;
            stored.push((id, document, metadata, blob_to_vec(&blob)));
        }

        let iter = stored
            .iter()
            .map(|(id, doc, meta, vec)| (id.as_str(), doc.as_str(), meta, vec.as_slice()));
        Ok(rank(&query_vecs, iter, n_results))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// Delete a persisted store directory.
///
/// Returns `Ok(false)` when there is nothing to delete. Refuses (without
/// deleting anything) when `dir` is not a directory or holds entries the
/// store did not create.
pub fn wipe_persisted_store(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    if !dir.is_dir() {
        bail!("Refusing to wipe {}: not a directory", dir.display());
    }

    let mut foreign = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read store directory: {}", dir.display()))?
    {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !OWNED_ENTRIES.contains(&name.as_str()) {
            foreign.push(name);
        }
    }
    if !foreign.is_empty() {
        foreign.sort();
        bail!(
            "Refusing to wipe {}: it contains entries not created by the store: {}",
            dir.display(),
            foreign.join(", ")
        );
    }

    std::fs::remove_dir_all(dir)
        .with_context(|| format!("Failed to remove store directory: {}", dir.display()))?;
    info!(path = %dir.display(), "wiped knowledge store");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::retrieve::retrieve;
    use serde_json::Value;
    use tempfile::TempDir;

    fn meta(source: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("source".into(), Value::from(source));
        m
    }

    async fn open(dir: &Path) -> SqliteStore {
        SqliteStore::open(dir, "test_collection", Box::new(HashEmbedder::new(64)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp.path().join("store")).await;
        let ids = vec!["a-chunk-0".to_string(), "a-chunk-1".to_string()];
        let docs = vec!["tax invoice".to_string(), "holiday photos".to_string()];
        let metas = vec![meta("/a"), meta("/a")];

        store.upsert(&ids, &docs, &metas).await.unwrap();
        store.upsert(&ids, &docs, &metas).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn query_returns_nearest_first_and_persists() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        {
            let store = open(&dir).await;
            store
                .upsert(
                    &["tax".into(), "photos".into()],
                    &["invoice tax payment".into(), "beach sunset photos".into()],
                    &[meta("/docs/finance/tax.txt"), meta("/docs/pictures/notes.txt")],
                )
                .await
                .unwrap();
            store.close().await;
        }

        let store = open(&dir).await;
        let result = store.query(&["tax invoice".to_string()], 5).await.unwrap();
        assert_eq!(result.ids.len(), 1);
        assert_eq!(result.ids[0], vec!["tax".to_string(), "photos".to_string()]);
        assert_eq!(result.metadatas[0][0]["source"], Value::from("/docs/finance/tax.txt"));
        assert!(result.distances[0][0] <= result.distances[0][1]);
    }

    /// Same vectors as the hash embedder, under another model name.
    struct RenamedEmbedder(HashEmbedder);

    #[async_trait]
    impl Embedder for RenamedEmbedder {
        fn model_name(&self) -> &str {
            "renamed"
        }
        fn dims(&self) -> usize {
            self.0.dims()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.embed(texts).await
        }
    }

    async fn filled_store(dir: &Path, embedder: Box<dyn Embedder>) {
        let store = SqliteStore::open(dir, "test_collection", embedder).await.unwrap();
        store
            .upsert(
                &["tax".into(), "beach".into()],
                &["invoice tax payment".into(), "beach sunset photos".into()],
                &[meta("/docs/finance/tax.txt"), meta("/docs/pictures/beach.txt")],
            )
            .await
            .unwrap();
        store.close().await;
    }

    #[tokio::test]
    async fn query_refuses_vectors_of_another_size() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        filled_store(&dir, Box::new(HashEmbedder::new(384))).await;

        let store = SqliteStore::open(&dir, "test_collection", Box::new(HashEmbedder::new(768)))
            .await
            .unwrap();
        let err = store.query(&["tax invoice".to_string()], 3).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("384") && msg.contains("768"), "{}", msg);
        assert!(msg.contains("--fresh-build"), "{}", msg);

        let hits = retrieve(&store, "tax invoice payment", 3, 5).await;
        assert!(hits.is_none(), "mismatched vectors must not be ranked: {:?}", hits);
    }

    #[tokio::test]
    async fn query_refuses_vectors_of_another_model() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        filled_store(&dir, Box::new(HashEmbedder::new(64))).await;

        let store = SqliteStore::open(
            &dir,
            "test_collection",
            Box::new(RenamedEmbedder(HashEmbedder::new(64))),
        )
        .await
        .unwrap();
        let err = store.query(&["tax".to_string()], 3).await.unwrap_err();
        assert!(err.to_string().contains("'hash'"), "{}", err);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn summary_counts_distinct_sources() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp.path().join("store")).await;
        store
            .upsert(
                &["a-0".into(), "a-1".into(), "b-0".into()],
                &["one".into(), "two".into(), "three".into()],
                &[meta("/a"), meta("/a"), meta("/b")],
            )
            .await
            .unwrap();
        let summary = store.summary().await.unwrap();
        assert_eq!(summary.fragments, 3);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.models, vec!["hash".to_string()]);
        assert!(summary.last_updated.is_some());
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let a = SqliteStore::open(&dir, "a", Box::new(HashEmbedder::new(8))).await.unwrap();
        a.upsert(&["x".into()], &["x".into()], &[Metadata::new()])
            .await
            .unwrap();
        a.close().await;
        let b = SqliteStore::open(&dir, "b", Box::new(HashEmbedder::new(8))).await.unwrap();
        assert_eq!(b.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wipe_removes_owned_store() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        open(&dir).await.close().await;
        assert!(dir.join(STORE_FILE).exists());

        assert!(wipe_persisted_store(&dir).unwrap());
        assert!(!dir.exists());
        assert!(!wipe_persisted_store(&dir).unwrap());
    }

    #[test]
    fn wipe_refuses_foreign_entries() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("thesis.docx"), b"precious").unwrap();
        let err = wipe_persisted_store(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("thesis.docx"));
        assert!(tmp.path().join("thesis.docx").exists());
    }
}
