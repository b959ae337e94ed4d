//! Context assembly — picks the history window and injects retrieval text.
//!
//! 1. **Retrieval entry** (matched document chunks): one leading system
//!    message, included whenever there is chunk text, not counted against
//!    the budget
//! 2. **Conversation history** (stored turns): the longest suffix whose
//!    estimated cost fits the active budget
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs. The synthetic retrieval entry
//! carries a fixed ID and timestamp so identical inputs produce identical
//! output.

use crate::context::token;
use chrono::{DateTime, Utc};
use orgchat_config::{ContextConfig, RetrievalConfig};
use orgchat_core::message::{Message, Role};
use orgchat_core::retrieval::RetrievalChunk;
use serde::{Deserialize, Serialize};

/// ID of the synthetic system entry carrying retrieval text.
pub const RETRIEVAL_ENTRY_ID: &str = "retrieval-context";

// ── Types ─────────────────────────────────────────────────────────────────

/// The two history budgets, selected per request by the conversation's
/// `pinned` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Budget for unpinned conversations.
    pub default: usize,
    /// Budget for pinned conversations.
    pub pinned: usize,
}

impl ContextBudget {
    /// {default 2000, pinned 1000}
    pub const COMPACT: Self = Self {
        default: 2000,
        pinned: 1000,
    };

    /// {default 4096, pinned 2048}
    pub const EXTENDED: Self = Self {
        default: 4096,
        pinned: 2048,
    };

    pub fn new(default: usize, pinned: usize) -> Self {
        Self { default, pinned }
    }

    /// The active budget for a conversation.
    pub fn for_mode(&self, pinned: bool) -> usize {
        if pinned { self.pinned } else { self.default }
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::COMPACT
    }
}

impl From<&ContextConfig> for ContextBudget {
    fn from(config: &ContextConfig) -> Self {
        let (default, pinned) = config.budgets();
        Self { default, pinned }
    }
}

/// How retrieval chunks are rendered into the leading system entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalInjection {
    pub enabled: bool,
    /// Text placed before the joined chunks.
    pub preamble: String,
    /// Placed between consecutive chunks.
    pub separator: String,
}

impl Default for RetrievalInjection {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalInjection {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            enabled: config.enabled,
            preamble: config.preamble.clone(),
            separator: config.separator.clone(),
        }
    }
}

impl RetrievalInjection {
    /// A disabled injection; chunks are ignored.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Render the system entry text, `None` when disabled or when the
    /// joined chunk text is empty.
    pub fn render(&self, chunks: &[RetrievalChunk]) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let joined = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator);
        if joined.is_empty() {
            return None;
        }

        Some(format!("{}{}", self.preamble, joined))
    }
}

/// The selected history suffix: `history[start..]`, costing `tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    /// Index of the oldest included message; equals `history.len()` when
    /// nothing fits.
    pub start: usize,
    /// Estimated cost of the included messages.
    pub tokens: usize,
}

impl HistoryWindow {
    /// Number of included messages out of `history_len`.
    pub fn included(&self, history_len: usize) -> usize {
        history_len - self.start
    }
}

/// What one assembly did, for logging and the preview endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyReport {
    /// The active budget.
    pub budget: usize,
    /// Whether the pinned budget was active.
    pub pinned: bool,
    /// Estimated cost of the included history (never above `budget`).
    pub history_tokens: usize,
    /// Estimated cost of the retrieval entry; outside the budget.
    pub retrieval_tokens: usize,
    pub messages_included: usize,
    pub messages_dropped: usize,
    pub chunks_injected: usize,
}

impl AssemblyReport {
    /// Combined estimate of everything submitted.
    pub fn total_tokens(&self) -> usize {
        self.history_tokens + self.retrieval_tokens
    }
}

/// The assembled context, ready for the completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Optional retrieval entry, then the history suffix oldest to newest.
    pub messages: Vec<Message>,
    pub report: AssemblyReport,
}

// ── Selection ─────────────────────────────────────────────────────────────

/// Greedy suffix selection.
///
/// Walks `history` newest to oldest and stops at the first message whose
/// cost would push the running total above `budget`. Older messages are
/// never considered after that, even if they would fit, so the result is
/// always a contiguous suffix. A message exactly filling the remaining
/// budget is included. There is no minimum: an oversized newest message
/// yields an empty window.
pub fn select_history(history: &[Message], budget: usize) -> HistoryWindow {
    let mut start = history.len();
    let mut tokens = 0;

    for (i, msg) in history.iter().enumerate().rev() {
        let cost = token::estimate_tokens(&msg.content);
        if tokens + cost > budget {
            break;
        }
        tokens += cost;
        start = i;
    }

    HistoryWindow { start, tokens }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    budget: ContextBudget,
    injection: RetrievalInjection,
}

impl ContextAssembler {
    pub fn new(budget: ContextBudget, injection: RetrievalInjection) -> Self {
        Self { budget, injection }
    }

    pub fn from_config(context: &ContextConfig, retrieval: &RetrievalConfig) -> Self {
        Self::new(context.into(), retrieval.into())
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    pub fn injection(&self) -> &RetrievalInjection {
        &self.injection
    }

    /// Assemble the context for one completion call.
    ///
    /// `history` must be in ascending creation order. Budget accounting
    /// covers the history only; the retrieval entry's cost is reported in
    /// [`AssemblyReport::retrieval_tokens`] but never trims history.
    pub fn assemble(
        &self,
        history: &[Message],
        retrieval: &[RetrievalChunk],
        pinned: bool,
    ) -> AssembledContext {
        let budget = self.budget.for_mode(pinned);
        let window = select_history(history, budget);
        let included = window.included(history.len());

        let mut messages = Vec::with_capacity(included + 1);
        let mut retrieval_tokens = 0;
        let mut chunks_injected = 0;

        if let Some(text) = self.injection.render(retrieval) {
            retrieval_tokens = token::estimate_tokens(&text);
            chunks_injected = retrieval.len();
            messages.push(retrieval_entry(text));
        }

        messages.extend_from_slice(&history[window.start..]);

        let report = AssemblyReport {
            budget,
            pinned,
            history_tokens: window.tokens,
            retrieval_tokens,
            messages_included: included,
            messages_dropped: window.start,
            chunks_injected,
        };

        tracing::debug!(
            budget,
            pinned,
            history_tokens = report.history_tokens,
            retrieval_tokens,
            included,
            dropped = report.messages_dropped,
            chunks = chunks_injected,
            "Assembled context"
        );

        AssembledContext { messages, report }
    }
}

fn retrieval_entry(content: String) -> Message {
    Message {
        id: RETRIEVAL_ENTRY_ID.to_string(),
        role: Role::System,
        content,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
