//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the knowledge base seen by the build and
//! organize pipelines: a named collection of text fragments keyed by ID,
//! each with metadata and an embedding computed by the store's own
//! [`Embedder`](crate::embedding::Embedder).
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorStore::upsert) | Insert or replace fragments by ID (last writer wins) |
//! | [`query`](VectorStore::query) | Nearest fragments per query text, ascending distance |
//! | [`count`](VectorStore::count) | Number of fragments in the collection |
//!
//! Implementations: [`SqliteStore`] (persistent) and [`InMemoryStore`].

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::{wipe_persisted_store, SqliteStore, StoreSummary, STORE_FILE};

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::config::{Config, MAX_STORE_BATCH};
use crate::embedding::{cosine_distance, create_embedder, Embedder};
use crate::models::Metadata;

/// Results of [`VectorStore::query`]. Each field holds one inner list per
/// query text; inner lists are parallel and sorted by ascending distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Metadata>>,
    pub distances: Vec<Vec<f32>>,
}

impl QueryResult {
    fn push(&mut self, hits: Vec<Hit<'_>>) {
        self.ids.push(hits.iter().map(|h| h.id.to_string()).collect());
        self.documents
            .push(hits.iter().map(|h| h.document.to_string()).collect());
        self.metadatas
            .push(hits.iter().map(|h| h.metadata.clone()).collect());
        self.distances.push(hits.iter().map(|h| h.distance).collect());
    }
}

/// A persisted, named collection of embedded fragments.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection name.
    fn collection(&self) -> &str;

    /// Insert or replace fragments. `ids`, `documents` and `metadatas` are
    /// parallel and at most [`MAX_STORE_BATCH`] long.
    async fn upsert(&self, ids: &[String], documents: &[String], metadatas: &[Metadata])
        -> Result<()>;

    /// Up to `n_results` nearest fragments for each query text.
    async fn query(&self, query_texts: &[String], n_results: usize) -> Result<QueryResult>;

    /// Number of fragments in the collection.
    async fn count(&self) -> Result<usize>;
}

/// Open the persistent store described by `config`, with the configured
/// embedding provider.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let embedder = create_embedder(&config.embedding)?;
    SqliteStore::open(&config.store.path, &config.store.collection, embedder).await
}

/// Reject upsert arguments that no store accepts.
pub fn check_upsert_args(ids: &[String], documents: &[String], metadatas: &[Metadata]) -> Result<()> {
    if ids.len() != documents.len() || ids.len() != metadatas.len() {
        bail!(
            "upsert arguments differ in length: {} ids, {} documents, {} metadatas",
            ids.len(),
            documents.len(),
            metadatas.len()
        );
    }
    if ids.len() > MAX_STORE_BATCH {
        bail!(
            "upsert of {} fragments exceeds the store limit of {}",
            ids.len(),
            MAX_STORE_BATCH
        );
    }
    Ok(())
}

/// Embed `texts`, insisting on one vector per text of exactly
/// `embedder.dims()` components.
pub async fn embed_checked(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        bail!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        );
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dims()) {
        bail!(
            "embedding model '{}' returned {}-dimensional vectors, but embedding.dims is {}",
            embedder.model_name(),
            v.len(),
            embedder.dims()
        );
    }
    Ok(vectors)
}

/// Run a store call under `timeout_secs`.
pub async fn with_timeout<T, F>(timeout_secs: u64, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
        Ok(result) => result,
        Err(_) => bail!("store {} timed out after {}s", what, timeout_secs),
    }
}

/// A scored candidate borrowed from a store's rows.
struct Hit<'a> {
    id: &'a str,
    document: &'a str,
    metadata: &'a Metadata,
    distance: f32,
}

/// Brute-force nearest neighbours shared by both stores.
///
/// `rows` yields `(id, document, metadata, vector)`; ties in distance are
/// broken by ID so results are deterministic.
fn rank<'a, I>(query_vecs: &[Vec<f32>], rows: I, n_results: usize) -> QueryResult
where
    I: Iterator<Item = (&'a str, &'a str, &'a Metadata, &'a [f32])> + Clone,
{
    let mut result = QueryResult::default();
    for query_vec in query_vecs {
        let mut hits: Vec<Hit<'a>> = rows
            .clone()
            .map(|(id, document, metadata, vector)| Hit {
                id,
                document,
                metadata,
                distance: cosine_distance(query_vec, vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(b.id))
        });
        hits.truncate(n_results);
        result.push(hits);
    }
    result
}
