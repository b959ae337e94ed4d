//! Context assembly, chat turns, and document ingestion for orgchat.
//!
//! The [`context`] module is pure and synchronous. [`ChatService`] and
//! [`IngestService`] wire it to the stores and the provider.

pub mod chunking;
pub mod context;
pub mod ingest;
pub mod service;

pub use chunking::split_into_chunks;
pub use context::{
    AssembledContext, AssemblyReport, ContextAssembler, ContextBudget, HistoryWindow,
    RetrievalInjection, estimate_tokens, select_history, text_length,
};
pub use ingest::{DocumentFormat, IngestReport, IngestRequest, IngestService};
pub use service::{ChatOptions, ChatReply, ChatService, EMPTY_REPLY_FALLBACK};
