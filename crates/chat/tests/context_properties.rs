//! Property tests for token estimation and history selection.

use orgchat_chat::context::{ContextAssembler, ContextBudget, RetrievalInjection};
use orgchat_chat::{estimate_tokens, select_history};
use orgchat_core::{Message, RetrievalChunk, Role};
use proptest::prelude::*;

fn arb_message() -> impl Strategy<Value = Message> {
    (
        prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::System)],
        "[a-zA-Z0-9 .,!?é日😀]{0,400}",
    )
        .prop_map(|(role, content)| Message::new(role, content))
}

fn arb_history() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec(arb_message(), 0..24)
}

proptest! {
    #[test]
    fn estimate_is_ceil_of_quarter_length(text in "\\PC{0,300}") {
        let units = text.encode_utf16().count();
        prop_assert_eq!(estimate_tokens(&text), (units + 3) / 4);
        prop_assert_eq!(estimate_tokens(&text) == 0, text.is_empty());
    }

    #[test]
    fn selection_is_a_contiguous_suffix_within_budget(
        history in arb_history(),
        budget in 0usize..1500,
    ) {
        let window = select_history(&history, budget);
        prop_assert!(window.start <= history.len());
        prop_assert!(window.tokens <= budget);

        let suffix_cost: usize = history[window.start..]
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();
        prop_assert_eq!(suffix_cost, window.tokens);

        // The walk stopped because the next older message overflowed.
        if window.start > 0 {
            let next = estimate_tokens(&history[window.start - 1].content);
            prop_assert!(window.tokens + next > budget);
        }
    }

    #[test]
    fn newest_message_included_iff_it_fits(
        history in arb_history(),
        budget in 0usize..200,
    ) {
        prop_assume!(!history.is_empty());
        let window = select_history(&history, budget);
        let newest = estimate_tokens(&history[history.len() - 1].content);
        prop_assert_eq!(window.start < history.len(), newest <= budget);
    }

    #[test]
    fn larger_budget_never_drops_messages(
        history in arb_history(),
        small in 0usize..1000,
        extra in 0usize..1000,
    ) {
        let narrow = select_history(&history, small);
        let wide = select_history(&history, small + extra);
        prop_assert!(wide.start <= narrow.start);
    }

    #[test]
    fn inclusion_monotonic_across_named_budgets(
        history in arb_history(),
        a in 1usize..3000,
        b in 1usize..3000,
    ) {
        let asm = ContextAssembler::new(ContextBudget::new(a, b), RetrievalInjection::disabled());
        let default = asm.assemble(&history, &[], false).report.messages_included;
        let pinned = asm.assemble(&history, &[], true).report.messages_included;
        if b >= a {
            prop_assert!(pinned >= default);
        }
        if a >= b {
            prop_assert!(default >= pinned);
        }
    }

    #[test]
    fn assembly_is_idempotent(
        history in arb_history(),
        chunks in prop::collection::vec("[a-z ]{0,40}", 0..4),
        pinned in any::<bool>(),
    ) {
        let retrieval: Vec<RetrievalChunk> =
            chunks.iter().map(|c| RetrievalChunk::new(c.clone(), 0.8)).collect();
        let asm = ContextAssembler::default();
        prop_assert_eq!(
            asm.assemble(&history, &retrieval, pinned),
            asm.assemble(&history, &retrieval, pinned)
        );
    }

    #[test]
    fn output_is_history_suffix_after_optional_system_entry(
        history in arb_history(),
        chunks in prop::collection::vec("[a-z]{1,20}", 0..4),
    ) {
        let retrieval: Vec<RetrievalChunk> =
            chunks.iter().map(|c| RetrievalChunk::new(c.clone(), 0.8)).collect();
        let out = ContextAssembler::default().assemble(&history, &retrieval, false);

        let skip = usize::from(!retrieval.is_empty());
        let tail = &out.messages[skip..];
        prop_assert_eq!(tail, &history[history.len() - tail.len()..]);
        prop_assert_eq!(out.report.messages_included + out.report.messages_dropped, history.len());
    }
}
