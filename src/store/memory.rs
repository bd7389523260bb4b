//! In-memory [`VectorStore`] for tests and dry runs.
//!
//! Fragments live in a `BTreeMap` behind `std::sync::RwLock`; queries are
//! brute-force cosine distance, same as [`SqliteStore`](super::SqliteStore).

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{check_upsert_args, embed_checked, rank, QueryResult, VectorStore};
use crate::embedding::Embedder;
use crate::models::Metadata;

struct StoredFragment {
    document: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    collection: String,
    embedder: Box<dyn Embedder>,
    fragments: RwLock<BTreeMap<String, StoredFragment>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>, embedder: Box<dyn Embedder>) -> Self {
        Self {
            collection: collection.into(),
            embedder,
            fragments: RwLock::new(BTreeMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
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
        let vectors = embed_checked(self.embedder.as_ref(), documents).await?;
        let mut fragments = self.fragments.write().map_err(poisoned)?;
        for (((id, document), metadata), vector) in
            ids.iter().zip(documents).zip(metadatas).zip(vectors)
        {
            fragments.insert(
                id.clone(),
                StoredFragment {
                    document: document.clone(),
                    metadata: metadata.clone(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn query(&self, query_texts: &[String], n_results: usize) -> Result<QueryResult> {
        let query_vecs = embed_checked(self.embedder.as_ref(), query_texts).await?;
        let fragments = self.fragments.read().map_err(poisoned)?;
        let iter = fragments.iter().map(|(id, f)| {
            (
                id.as_str(),
                f.document.as_str(),
                &f.metadata,
                f.vector.as_slice(),
            )
        });
        Ok(rank(&query_vecs, iter, n_results))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.fragments.read().map_err(poisoned)?.len())
    }
}
