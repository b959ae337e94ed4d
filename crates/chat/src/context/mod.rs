//! Context window assembly.
//!
//! Turns a conversation's full history plus optional retrieval chunks into
//! the exact message list submitted to the model.
//!
//! | Part | Source | Trim Strategy |
//! |------|--------|---------------|
//! | Retrieval entry | Matched document chunks | Never trimmed, not budgeted |
//! | Conversation history | Stored messages | Oldest dropped, stops at first overflow |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyReport, ContextAssembler, ContextBudget, HistoryWindow,
    RETRIEVAL_ENTRY_ID, RetrievalInjection, select_history,
};
pub use token::{estimate_messages_tokens, estimate_tokens, text_length};
