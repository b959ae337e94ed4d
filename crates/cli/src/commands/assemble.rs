//! `orgchat assemble` — Offline context assembly from JSON files.
//!
//! The history file is an array of `{ "role": ..., "content": ... }`,
//! oldest first. The retrieval file is an array of strings or
//! `{ "content": ..., "similarity": ... }` objects.

use std::path::Path;

use orgchat_chat::{AssembledContext, AssemblyReport, ContextAssembler};
use orgchat_config::{AppConfig, BudgetProfile};
use orgchat_core::{Message, RetrievalChunk, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    role: Role,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChunkEntry {
    Text(String),
    Chunk(RetrievalChunk),
}

impl From<ChunkEntry> for RetrievalChunk {
    fn from(entry: ChunkEntry) -> Self {
        match entry {
            ChunkEntry::Text(content) => RetrievalChunk {
                content,
                similarity: 0.0,
            },
            ChunkEntry::Chunk(chunk) => chunk,
        }
    }
}

#[derive(Serialize)]
struct Output<'a> {
    messages: Vec<OutputEntry<'a>>,
    report: &'a AssemblyReport,
}

#[derive(Serialize)]
struct OutputEntry<'a> {
    role: Role,
    content: &'a str,
}

pub async fn run(
    history: &Path,
    retrieval: Option<&Path>,
    pinned: bool,
    profile: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let assembled = assemble_files(&config, history, retrieval, pinned, profile)?;

    let output = Output {
        messages: assembled
            .messages
            .iter()
            .map(|m| OutputEntry {
                role: m.role,
                content: &m.content,
            })
            .collect(),
        report: &assembled.report,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Assemble from files using `config`, with an optional profile override.
pub fn assemble_files(
    config: &AppConfig,
    history: &Path,
    retrieval: Option<&Path>,
    pinned: bool,
    profile: Option<&str>,
) -> Result<AssembledContext, Box<dyn std::error::Error>> {
    let mut context = config.context.clone();
    if let Some(name) = profile {
        context.profile = BudgetProfile::parse(name)
            .ok_or_else(|| format!("Unknown profile '{name}' (expected compact, extended, or custom)"))?;
    }

    let history: Vec<HistoryEntry> = read_json(history)?;
    let history: Vec<Message> = history
        .into_iter()
        .map(|entry| Message::new(entry.role, entry.content))
        .collect();

    let chunks: Vec<RetrievalChunk> = match retrieval {
        Some(path) => read_json::<Vec<ChunkEntry>>(path)?
            .into_iter()
            .map(RetrievalChunk::from)
            .collect(),
        None => Vec::new(),
    };

    let assembler = ContextAssembler::from_config(&context, &config.retrieval);
    Ok(assembler.assemble(&history, &chunks, pinned))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let value = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid JSON in {}: {e}", path.display()))?;
    Ok(value)
}
