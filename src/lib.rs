//! # docsort
//!
//! A local-first agentic file organizer.
//!
//! docsort runs two pipelines over one vector store:
//!
//! - **build**: extract text from existing documents, split it into
//!   overlapping chunks, and upsert the chunks (keyed by a deterministic ID)
//!   into the store;
//! - **organize**: retrieve the fragments nearest to a new file, ask a
//!   language model which existing folder the file belongs in, check the
//!   answer's shape, and move the file after confirmation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌──────────────┐
//! │ Extractors │──▶│ Chunker │──▶│ Vector store │
//! │ text / PDF │   └─────────┘   │ (SQLite)     │
//! └────────────┘                 └──────┬───────┘
//!                                       │ retrieve
//!                                       ▼
//!   ┌───────┐   ┌───────────┐   ┌───────────┐   ┌───────┐
//!   │ Mover │◀──│ Validator │◀──│   Agent   │◀──│Prompt │
//!   └───────┘   └───────────┘   │ (Ollama)  │   └───────┘
//!                               └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Extractor registry (text, PDF) |
//! | [`chunk`] | Structural text chunking |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`store`] | Vector store trait, SQLite and in-memory stores |
//! | [`ingest`] | Build pipeline |
//! | [`retrieve`] | Nearest-fragment retrieval |
//! | [`prompt`] | Prompt rendering |
//! | [`agent`] | Decision agent boundary |
//! | [`validate`] | Suggestion shape checks |
//! | [`mover`] | Safe file moves |
//! | [`organize`] | Organize workflow and confirmation |
//! | [`search`] | `docsort search` |
//! | [`stats`] | `docsort stats` |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod mover;
pub mod organize;
pub mod prompt;
pub mod retrieve;
pub mod search;
pub mod stats;
pub mod store;
pub mod validate;
