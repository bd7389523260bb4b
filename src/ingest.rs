//! Knowledge-base build pipeline.
//!
//! Walks target directories, extracts and chunks every supported file, and
//! upserts the chunks into the vector store in batches of
//! `ingest.batch_size`. Chunks accumulate across files, so batch boundaries
//! do not follow file boundaries.
//!
//! Nothing here is fatal per file or per batch: unsupported and empty files
//! are skipped and counted, and a rejected batch is logged and counted while
//! the remaining batches proceed. Because chunk IDs are deterministic,
//! re-running over unchanged files leaves the collection size unchanged.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::prepare;
use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::models::PreparedFile;
use crate::store::{self, VectorStore};

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Counters reported at the end of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub directories: usize,
    pub directories_skipped: usize,
    pub files_scanned: usize,
    pub files_ingested: usize,
    pub files_skipped: usize,
    pub chunks_prepared: usize,
    pub chunks_upserted: usize,
    pub batches_ok: usize,
    pub batches_failed: usize,
}

/// List the files under `root` in sorted order, honoring the configured
/// exclude globs.
pub fn collect_files(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(config.ingest.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&patterns)?;

    let walker = WalkDir::new(root)
        .follow_links(config.ingest.follow_symlinks)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            debug!(path = %path.display(), "excluded");
            continue;
        }
        files.push(path.to_path_buf());
    }
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Chunks waiting to be upserted.
struct Batcher<'a> {
    store: &'a dyn VectorStore,
    batch_size: usize,
    timeout_secs: u64,
    pending: PreparedFile,
    batch_number: usize,
}

impl<'a> Batcher<'a> {
    async fn push(&mut self, prepared: PreparedFile, stats: &mut IngestStats) {
        self.pending.ids.extend(prepared.ids);
        self.pending.documents.extend(prepared.documents);
        self.pending.metadatas.extend(prepared.metadatas);
        while self.pending.len() >= self.batch_size {
            self.flush_one(stats).await;
        }
    }

    async fn finish(&mut self, stats: &mut IngestStats) {
        while !self.pending.is_empty() {
            self.flush_one(stats).await;
        }
    }

    async fn flush_one(&mut self, stats: &mut IngestStats) {
        let n = self.batch_size.min(self.pending.len());
        let ids: Vec<String> = self.pending.ids.drain(..n).collect();
        let documents: Vec<String> = self.pending.documents.drain(..n).collect();
        let metadatas: Vec<_> = self.pending.metadatas.drain(..n).collect();
        self.batch_number += 1;

        let result = store::with_timeout(
            self.timeout_secs,
            "upsert",
            self.store.upsert(&ids, &documents, &metadatas),
        )
        .await;
        match result {
            Ok(()) => {
                stats.batches_ok += 1;
                stats.chunks_upserted += n;
                info!("ingested batch {} ({} fragments)", self.batch_number, n);
            }
            Err(e) => {
                stats.batches_failed += 1;
                warn!(batch = self.batch_number, fragments = n, error = %e, "batch upsert failed");
            }
        }
    }
}

/// Ingest every supported file under each of `dirs` into `store`.
pub async fn ingest_directories(
    config: &Config,
    registry: &ExtractorRegistry,
    store: &dyn VectorStore,
    dirs: &[PathBuf],
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    let mut batcher = Batcher {
        store,
        batch_size: config.ingest.batch_size.max(1),
        timeout_secs: config.store.timeout_secs,
        pending: PreparedFile::default(),
        batch_number: 0,
    };

    for dir in dirs {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "not a directory, skipping");
            stats.directories_skipped += 1;
            continue;
        }
        let root = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        info!(path = %root.display(), "scanning");
        stats.directories += 1;

        for path in collect_files(&root, config)? {
            stats.files_scanned += 1;
            let prepared = prepare(registry, &path, &config.chunking);
            if prepared.is_empty() {
                debug!(path = %path.display(), "nothing to ingest");
                stats.files_skipped += 1;
                continue;
            }
            stats.files_ingested += 1;
            stats.chunks_prepared += prepared.len();
            batcher.push(prepared, &mut stats).await;
        }
    }
    batcher.finish(&mut stats).await;

    Ok(stats)
}

/// `docsort build`: optionally wipe the store, ingest, and print a summary.
pub async fn run_build(config: &Config, dirs: &[PathBuf], fresh_build: bool) -> Result<()> {
    let dirs: Vec<PathBuf> = if dirs.is_empty() {
        config.ingest.default_directories.clone()
    } else {
        dirs.to_vec()
    };
    if dirs.is_empty() {
        anyhow::bail!("No directories to ingest: pass DIR arguments or set ingest.default_directories");
    }

    if fresh_build && store::wipe_persisted_store(&config.store.path)? {
        println!("wiped {}", config.store.path.display());
    }

    let store = store::open_store(config).await?;
    let registry = ExtractorRegistry::with_defaults();
    let stats = ingest_directories(config, &registry, &store, &dirs).await?;
    let total = store::with_timeout(config.store.timeout_secs, "count", store.count()).await?;
    store.close().await;

    println!("build {}", config.store.collection);
    println!("  directories: {}", stats.directories);
    if stats.directories_skipped > 0 {
        println!("  directories skipped: {}", stats.directories_skipped);
    }
    println!("  files scanned: {}", stats.files_scanned);
    println!("  files ingested: {}", stats.files_ingested);
    println!("  files skipped: {}", stats.files_skipped);
    println!("  fragments upserted: {}", stats.chunks_upserted);
    println!("  batches: {} ok, {} failed", stats.batches_ok, stats.batches_failed);
    println!("  collection size: {}", total);
    println!("ok");
    Ok(())
}
