//! Context retrieval for the organize workflow.

use tracing::{debug, warn};

use crate::models::RetrievedFragment;
use crate::store::{self, VectorStore};

/// Nearest fragments to `query`, ascending by distance.
///
/// Returns `None` when the store call fails or times out; callers treat that
/// as "no relevant context". Asking for more results than the collection
/// holds returns everything.
pub async fn retrieve(
    store: &dyn VectorStore,
    query: &str,
    n_results: usize,
    timeout_secs: u64,
) -> Option<Vec<RetrievedFragment>> {
    let result = store::with_timeout(
        timeout_secs,
        "query",
        store.query(&[query.to_string()], n_results),
    )
    .await;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            warn!(collection = store.collection(), error = %e, "retrieval failed");
            return None;
        }
    };

    let (Some(documents), Some(metadatas), Some(distances)) = (
        result.documents.into_iter().next(),
        result.metadatas.into_iter().next(),
        result.distances.into_iter().next(),
    ) else {
        return Some(Vec::new());
    };

    let mut fragments: Vec<RetrievedFragment> = documents
        .into_iter()
        .zip(metadatas)
        .zip(distances)
        .map(|((text, metadata), distance)| RetrievedFragment {
            text,
            metadata,
            distance,
        })
        .collect();
    fragments.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fragments.truncate(n_results);
    debug!(hits = fragments.len(), "retrieved context");
    Some(fragments)
}
