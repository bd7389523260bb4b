//! TOML configuration.
//!
//! The configuration is loaded once at process start by [`load_config`] and
//! passed by reference into every component. Nothing reads it from global
//! state. Every section except `[store]` has defaults, so a minimal file is:
//!
//! ```toml
//! [store]
//! path = "./data/store"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Largest number of records the SQLite store accepts in a single upsert call.
pub const MAX_STORE_BATCH: usize = 5461;

/// Placeholders the prompt template must contain.
pub const TEMPLATE_PLACEHOLDERS: [&str; 3] = ["{file_name}", "{file_content}", "{rag_context}"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory owned exclusively by the vector store.
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_collection() -> String {
    "file_organization_knowledge".to_string()
}
fn default_store_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Directories scanned by `docsort build` when none are given.
    #[serde(default)]
    pub default_directories: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            default_directories: Vec::new(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_batch_size() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_content_prefix_chars")]
    pub content_prefix_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
            content_prefix_chars: default_content_prefix_chars(),
        }
    }
}

fn default_n_results() -> usize {
    3
}
fn default_content_prefix_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_agent_model")]
    pub model: String,
    #[serde(default = "default_agent_url")]
    pub url: String,
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_agent_model(),
            url: default_agent_url(),
            timeout_secs: default_agent_timeout_secs(),
            prompt_template: default_prompt_template(),
        }
    }
}

fn default_agent_model() -> String {
    "gemma3".to_string()
}
fn default_agent_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_agent_timeout_secs() -> u64 {
    120
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are an expert file organization agent. Your task is to decide the best folder path for a given file based on its content and context from the existing file system.

**Constraints:**
- You can only suggest a 'move' action.
- The destination path must be a valid absolute path structure (e.g., 'C:/Users/UserName/Documents/Reports' or '/home/username/Documents/Reports').
- Do not suggest deleting the file.
- **You must only suggest a folder that already exists based on the file paths provided in the context.**

**File to Organize:**
- Name: {file_name}
- Content Snippet: "{file_content}"

**Relevant Context from Existing Files (from RAG search):**
{rag_context}

Based on all the information above, what is the single best destination folder for this file? Respond with only the full destination path and nothing else.
"#;

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

impl Config {
    /// A config pointing at `store_path` with every other section defaulted.
    pub fn with_store_path(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                path: store_path.into(),
                collection: default_collection(),
                timeout_secs: default_store_timeout_secs(),
            },
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }

    // Validate chunking
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!(
            "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.max_chars
        );
    }

    // Validate ingest
    if config.ingest.batch_size == 0 || config.ingest.batch_size > MAX_STORE_BATCH {
        bail!("ingest.batch_size must be in [1, {}]", MAX_STORE_BATCH);
    }

    // Validate retrieval
    if config.retrieval.n_results < 1 {
        bail!("retrieval.n_results must be >= 1");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "ollama" | "local" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, ollama, or local.",
            other
        ),
    }

    // Validate agent
    for placeholder in TEMPLATE_PLACEHOLDERS {
        if !config.agent.prompt_template.contains(placeholder) {
            bail!("agent.prompt_template is missing the {} placeholder", placeholder);
        }
    }

    Ok(())
}

/// Render the config file written by `docsort init`.
pub fn default_config_toml(store_path: &Path) -> String {
    format!(
        r#"# docsort configuration

[store]
# Directory owned by the vector store. `docsort build --fresh-build` deletes it.
path = "{store}"
collection = "{collection}"
timeout_secs = {store_timeout}

[embedding]
# hash (offline, default) | ollama | local (requires --features local-embeddings-fastembed)
provider = "hash"
# model = "nomic-embed-text"
dims = {dims}
# url = "http://localhost:11434"

[chunking]
max_chars = {max_chars}
overlap_chars = {overlap_chars}

[ingest]
batch_size = {batch_size}
# Scanned by `docsort build` when no directories are given, e.g.
# default_directories = ["/home/username/Documents"]
default_directories = []
exclude_globs = []
follow_symlinks = false

[retrieval]
n_results = {n_results}
content_prefix_chars = {prefix}

[agent]
# Must match a model you have pulled in Ollama.
model = "{model}"
url = "{url}"
timeout_secs = {agent_timeout}
prompt_template = """
{template}"""
"#,
        store = store_path.display().to_string().replace('\\', "/"),
        collection = default_collection(),
        store_timeout = default_store_timeout_secs(),
        dims = default_dims(),
        max_chars = default_max_chars(),
        overlap_chars = default_overlap_chars(),
        batch_size = default_batch_size(),
        n_results = default_n_results(),
        prefix = default_content_prefix_chars(),
        model = default_agent_model(),
        url = default_agent_url(),
        agent_timeout = default_agent_timeout_secs(),
        template = DEFAULT_PROMPT_TEMPLATE,
    )
}

/// Write a default config file for `docsort init`.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let store_path = path
        .parent()
        .map(|p| p.join("..").join("data").join("store"))
        .unwrap_or_else(|| PathBuf::from("./data/store"));
    std::fs::write(path, default_config_toml(&store_path))
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
