//! The organize workflow: retrieve → decide → validate → confirm → move.
//!
//! Each stage reports what it did on stdout. Only the move itself can
//! change the filesystem, and only after the user (or `--force`) confirms.

use anyhow::{anyhow, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::agent::{DecisionAgent, OllamaAgent};
use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::mover::{MoveError, SafeMover};
use crate::prompt::{build_prompt, FileInfo};
use crate::retrieve::retrieve;
use crate::store::{self, VectorStore};
use crate::validate::{validate_suggestion, Rejection};

// ============ Confirmation ============

/// Asks the user to approve a move.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Reads a yes/no answer from stdin. Without a terminal on stdin the answer
/// is "no".
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        if !atty::is(atty::Stream::Stdin) {
            println!("stdin is not a terminal; treating as declined (use --force to skip confirmation)");
            return Ok(false);
        }
        print!("{} [y/N]: ", question);
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

/// Approves everything (`--force`).
pub struct AutoConfirm;

impl Prompter for AutoConfirm {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        println!("--force: proceeding without confirmation");
        Ok(true)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

// ============ Workflow ============

/// How one organize run ended.
#[derive(Debug)]
pub enum OrganizeOutcome {
    /// The file now lives at this path.
    Moved(PathBuf),
    /// Nothing to decide on: missing file, no extractor, or empty content.
    Skipped(String),
    /// The agent's answer failed validation.
    Rejected(Rejection),
    /// The user said no.
    Declined,
    /// The move was refused or failed; see the error.
    MoveFailed(MoveError),
}

pub struct Organizer<'a> {
    pub config: &'a Config,
    pub registry: &'a ExtractorRegistry,
    pub store: &'a dyn VectorStore,
    pub agent: &'a dyn DecisionAgent,
    pub mover: SafeMover,
}

impl<'a> Organizer<'a> {
    pub async fn organize(&self, file: &Path, prompter: &mut dyn Prompter) -> OrganizeOutcome {
        if !file.is_file() {
            println!("error: the file '{}' does not exist", file.display());
            return OrganizeOutcome::Skipped(format!("{} does not exist", file.display()));
        }
        let src = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());

        let Some(extractor) = self.registry.for_path(&src) else {
            println!("no extractor for '{}', skipping", src.display());
            return OrganizeOutcome::Skipped("unsupported file type".into());
        };
        let content = extractor.extract_content(&src);
        if content.trim().is_empty() {
            println!("could not extract content from '{}', skipping", src.display());
            return OrganizeOutcome::Skipped("empty content".into());
        }

        println!("retrieving context");
        let retrieval = &self.config.retrieval;
        let fragments = match retrieve(
            self.store,
            &content,
            retrieval.n_results,
            self.config.store.timeout_secs,
        )
        .await
        {
            Some(fragments) => fragments,
            None => {
                println!("  retrieval failed, continuing without context");
                Vec::new()
            }
        };
        for f in &fragments {
            println!(
                "  {:.4}  {}",
                f.distance,
                f.source().unwrap_or("Unknown location")
            );
        }

        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let info = FileInfo::new(name, &content, retrieval.content_prefix_chars);
        let prompt = build_prompt(&self.config.agent.prompt_template, &info, &fragments);

        println!("asking agent");
        let answer = self.agent.suggest(&prompt).await;
        println!("  suggestion: {}", answer.trim());

        let destination = match validate_suggestion(&answer) {
            Ok(destination) => destination,
            Err(rejection) => {
                println!("invalid destination ({}), no action taken", rejection);
                return OrganizeOutcome::Rejected(rejection);
            }
        };
        if let Some(original) = &destination.corrected_from {
            println!("  suggestion names a file ({}), using its folder", original);
            println!("  corrected: {}", destination.folder);
        }

        let dest_dir = destination.path();
        let target = match self.mover.check(&src, &dest_dir) {
            Ok(target) => target,
            Err(e) => {
                println!("cannot move: {}", e);
                return OrganizeOutcome::MoveFailed(e);
            }
        };

        println!("proposed move:");
        println!("  {}", src.display());
        println!("  -> {}", target.display());
        let approved = match prompter.confirm("Proceed with file move?") {
            Ok(approved) => approved,
            Err(e) => {
                warn!(error = %e, "confirmation failed");
                false
            }
        };
        if !approved {
            println!("declined, no action taken");
            return OrganizeOutcome::Declined;
        }

        match self.mover.move_into(&src, &dest_dir) {
            Ok(moved) => {
                info!(from = %src.display(), to = %moved.display(), "moved");
                println!("moved {}", moved.display());
                OrganizeOutcome::Moved(moved)
            }
            Err(e) => {
                println!("move failed: {}", e);
                OrganizeOutcome::MoveFailed(e)
            }
        }
    }
}

/// `docsort organize FILE [--force]`.
pub async fn run_organize(config: &Config, file: &Path, force: bool) -> Result<OrganizeOutcome> {
    let store = store::open_store(config).await?;
    let agent = OllamaAgent::new(&config.agent)?;
    let registry = ExtractorRegistry::with_defaults();
    let organizer = Organizer {
        config,
        registry: &registry,
        store: &store,
        agent: &agent,
        mover: SafeMover::new(),
    };

    let mut terminal = TerminalPrompter;
    let mut auto = AutoConfirm;
    let prompter: &mut dyn Prompter = if force { &mut auto } else { &mut terminal };
    let outcome = organizer.organize(file, prompter).await;
    store.close().await;

    match outcome {
        OrganizeOutcome::MoveFailed(e) => Err(anyhow!(e)),
        other => Ok(other),
    }
}
