//! Built-in block, modifier, and composition catalog.
//!
//! These functions return fresh values on every call; the process-wide copy
//! lives in [`Registry::builtin()`](super::Registry::builtin).

use super::{Block, Composition, Context, Modifier, Tier};

/// Built-in blocks, in catalog order.
pub fn default_blocks() -> Vec<Block> {
    vec![
        Block::new(
            "role",
            "Role",
            Tier::Locked,
            "You are a knowledgeable assistant for a professional services team. \
             You help staff answer questions, review documents, and prepare \
             client-facing material.",
        )
        .with_description("Who the model is and who it works for.")
        .with_variant(
            Context::Questions,
            "You are a knowledgeable assistant answering questions from the team's \
             project records, skills catalog, and customer profiles.",
        )
        .with_variant(
            Context::Chat,
            "You are a helpful conversational assistant for a professional services \
             team.",
        )
        .with_variant(
            Context::ContractAnalysis,
            "You are a meticulous contract analyst reviewing agreements on behalf of \
             a professional services firm.",
        )
        .with_variant(
            Context::SkillSummary,
            "You write short, factual summaries of staff skills for an internal \
             directory.",
        )
        .with_variant(
            Context::CustomerProfile,
            "You prepare concise customer briefings for account managers.",
        ),
        Block::new(
            "grounding",
            "Grounding",
            Tier::Caution,
            "Base every statement on the supplied records. If the records do not \
             contain the answer, say so plainly instead of guessing.",
        )
        .with_description("Keeps answers tied to the provided source material.")
        .with_variant(
            Context::Chat,
            "When the conversation refers to records you were given, stay faithful \
             to them. Say so when you do not know.",
        ),
        Block::new(
            "quality_rules",
            "Quality Rules",
            Tier::Caution,
            "Be accurate, specific, and concise. Prefer concrete facts such as names, \
             dates, and amounts over generalities. Do not repeat the question back.",
        )
        .with_description("Baseline accuracy and concision rules."),
        Block::new("risk_flags", "Risk Flags", Tier::Open, "")
            .with_description("Contract-specific risk guidance; empty elsewhere.")
            .with_variant(
                Context::ContractAnalysis,
                "Flag clauses that create unusual liability, auto-renewal, \
                 exclusivity, or termination risk. Quote the clause and explain the \
                 risk in one sentence.",
            ),
        Block::new(
            "confidentiality",
            "Confidentiality",
            Tier::Locked,
            "Never reveal internal cost rates, margins, or personal contact details \
             unless they already appear in the request.",
        )
        .with_description("Data the model must not disclose."),
        Block::new("tone", "Tone", Tier::Open, "Use a professional, neutral tone.")
            .with_description("Voice and register.")
            .with_variant(
                Context::Chat,
                "Use a friendly, professional tone. Keep replies short unless the \
                 user asks for detail.",
            ),
        Block::new(
            "output_format",
            "Output Format",
            Tier::Open,
            "Answer in plain prose.",
        )
        .with_description("Shape of the response.")
        .with_variant(
            Context::Questions,
            "Answer in one or two short paragraphs. Use a bullet list only when \
             enumerating three or more items.",
        )
        .with_variant(
            Context::ContractAnalysis,
            "Structure the answer as: Summary, Key Terms, Risks, Recommended \
             Follow-ups.",
        )
        .with_variant(
            Context::SkillSummary,
            "Write a single paragraph of at most 80 words suitable for a skills \
             directory.",
        )
        .with_variant(
            Context::CustomerProfile,
            "Produce three sections: Overview, Engagement History, Open \
             Opportunities.",
        ),
    ]
}

/// Built-in mode and domain modifiers.
pub fn default_modifiers() -> Vec<Modifier> {
    vec![
        Modifier::mode(
            "mode_bulk",
            "Bulk",
            "You are processing many items in one pass. Be terse: one line per item, \
             no preamble.",
        )
        .with_description("High-volume batch processing."),
        Modifier::mode(
            "mode_detailed",
            "Detailed",
            "The reader wants depth. Explain your reasoning and include supporting \
             detail for each point.",
        ),
        Modifier::mode(
            "mode_draft",
            "Draft",
            "This is a first draft for internal review. Mark open questions with \
             [TBD] rather than guessing.",
        ),
        Modifier::domain(
            "domain_legal",
            "Legal",
            "Use precise legal terminology. Distinguish obligations (shall) from \
             permissions (may).",
        )
        .with_tier(Tier::Caution),
        Modifier::domain(
            "domain_finance",
            "Finance",
            "State currencies and periods explicitly. Round amounts consistently and \
             note assumptions behind any figure.",
        ),
        Modifier::domain(
            "domain_technical",
            "Technical",
            "Assume a technical reader. Name specific technologies and versions \
             where the records provide them.",
        ),
        Modifier::domain(
            "domain_healthcare",
            "Healthcare",
            "Treat any patient information as sensitive and never include it in \
             the answer.",
        )
        .with_tier(Tier::Locked),
    ]
}

/// Built-in compositions, one per context.
pub fn default_compositions() -> Vec<Composition> {
    vec![
        Composition::new(
            Context::Questions,
            &[
                "role",
                "grounding",
                "quality_rules",
                "confidentiality",
                "output_format",
            ],
        )
        .with_modes()
        .with_domains(),
        Composition::new(Context::Chat, &["role", "grounding", "tone", "confidentiality"])
            .with_modes()
            .with_domains(),
        Composition::new(
            Context::ContractAnalysis,
            &[
                "role",
                "grounding",
                "quality_rules",
                "risk_flags",
                "confidentiality",
                "output_format",
            ],
        )
        .with_modes()
        .with_domains(),
        Composition::new(
            Context::SkillSummary,
            &["role", "quality_rules", "output_format"],
        )
        .with_modes(),
        Composition::new(
            Context::CustomerProfile,
            &["role", "grounding", "confidentiality", "tone", "output_format"],
        )
        .with_domains(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_context_has_a_composition() {
        let compositions = default_compositions();
        for context in Context::ALL {
            assert!(
                compositions.iter().any(|c| c.context == context),
                "missing composition for {context}"
            );
        }
    }

    #[test]
    fn compositions_only_reference_known_blocks() {
        let blocks = default_blocks();
        for composition in default_compositions() {
            for id in &composition.block_ids {
                assert!(
                    blocks.iter().any(|b| &b.id == id),
                    "{} references unknown block {id}",
                    composition.context
                );
            }
        }
    }

    #[test]
    fn risk_flags_only_speaks_in_contract_analysis() {
        let blocks = default_blocks();
        let risk = blocks.iter().find(|b| b.id == "risk_flags").unwrap();
        assert!(risk.text_for("questions").is_empty());
        assert!(risk.text_for("contract_analysis").contains("liability"));
    }
}
