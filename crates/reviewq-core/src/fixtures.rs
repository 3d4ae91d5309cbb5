//! Card and page builders shared by the unit tests in this crate.

use chrono::{TimeZone, Utc};

use crate::aggregate::{EfficiencyStats, GlobalStatus, NavigationCount, StatsSnapshot};
use crate::types::{ActionCard, CardId, ObjectiveId, ObjectiveStatus, QueuePage, RiskLevel, Sender};

pub(crate) fn card(id: &str, risk: RiskLevel, confidence: u8) -> ActionCard {
    let ts = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    ActionCard {
        id: CardId::from(id),
        objective_id: ObjectiveId::from(format!("obj-{id}")),
        objective_status: ObjectiveStatus::WaitingOnYou,
        risk_level: risk,
        category: "email".into(),
        confidence,
        summary: format!("summary {id}"),
        proposed_action: format!("reply to {id}"),
        sender: Sender {
            name: "Ada".into(),
            email: None,
            organization: None,
        },
        related_items: vec![],
        created_at: ts,
        updated_at: ts,
        uncertain: false,
        escalated: false,
    }
}

pub(crate) fn pending(id: &str) -> ActionCard {
    card(id, RiskLevel::Medium, 85)
}

pub(crate) fn page(cards: Vec<ActionCard>) -> QueuePage {
    QueuePage::new(cards)
}

pub(crate) fn stats(needs_decision: u32, urgent_threshold: u32) -> StatsSnapshot {
    let counts = NavigationCount {
        needs_decision,
        ..Default::default()
    };
    StatsSnapshot {
        global_status: GlobalStatus::derive(counts.needs_decision, urgent_threshold),
        navigation_counts: counts,
        efficiency_stats: EfficiencyStats::new(4, 10),
    }
}
