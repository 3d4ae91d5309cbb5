use anyhow::anyhow;
use std::path::Path;

use reviewq_core::mutation::{MutationKind, SkipReason};
use reviewq_core::types::CardId;
use reviewq_server::engine::{Callbacks, MutationOutcome};

use super::{block_on, connect};
use crate::output::print_json;

pub fn run(
    config: &Path,
    offline: bool,
    id: &str,
    kind: MutationKind,
    json: bool,
) -> anyhow::Result<()> {
    if let MutationKind::Override { reason } | MutationKind::Escalate { reason } = &kind {
        if reason.trim().is_empty() {
            return Err(anyhow!("--reason cannot be empty"));
        }
    }
    let verb = past_tense(&kind);
    let engine = connect(config, offline)?;
    let card = CardId::from(id);
    let outcome = block_on(engine.mutate(card.clone(), kind, Callbacks::new()))??;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        MutationOutcome::Settled { card } => {
            println!("{verb} {} ({})", card.id, card.objective_status);
        }
        MutationOutcome::Skipped { reason } => {
            let why = match reason {
                SkipReason::InFlight => "another change to it is still in flight",
                SkipReason::AlreadyResolved => "it was already resolved",
            };
            println!("skipped {card}: {why}");
        }
    }
    Ok(())
}

fn past_tense(kind: &MutationKind) -> &'static str {
    match kind {
        MutationKind::Approve => "approved",
        MutationKind::Override { .. } => "overrode",
        MutationKind::Edit { .. } => "edited",
        MutationKind::Escalate { .. } => "escalated",
    }
}
