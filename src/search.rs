//! Retrieval inspection (`docsort search`).
//!
//! Runs the same retrieval the organize workflow uses and prints what came
//! back, so a user can check what context the agent will see.

use anyhow::Result;

use crate::config::Config;
use crate::models::RetrievedFragment;
use crate::retrieve::retrieve;
use crate::store;

/// Characters of fragment text shown per result.
const SNIPPET_CHARS: usize = 160;

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let store = store::open_store(config).await?;
    let k = limit.unwrap_or(config.retrieval.n_results).max(1);
    let hits = retrieve(&store, query, k, config.store.timeout_secs).await;
    store.close().await;

    let Some(hits) = hits else {
        anyhow::bail!("retrieval failed; see the log for details");
    };
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        print!("{}", format_hit(i + 1, hit));
    }
    Ok(())
}

fn format_hit(rank: usize, hit: &RetrievedFragment) -> String {
    let snippet: String = hit
        .text
        .chars()
        .take(SNIPPET_CHARS)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    format!(
        "{}. [{:.4}] {}\n    {}\n",
        rank,
        hit.distance,
        hit.source().unwrap_or("Unknown location"),
        snippet.trim()
    )
}
