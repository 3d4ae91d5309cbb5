//! Aggregate projector: navigation counts, efficiency, and the global banner.
//!
//! Every function here is a pure transition over [`StatsSnapshot`]. The
//! banner is never written directly; it is re-derived from
//! `needs_decision` whenever the counts change, so the two cannot disagree.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{QueuePage, ViewBucket};

// ---------------------------------------------------------------------------
// NavigationCount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationCount {
    #[serde(default)]
    pub needs_decision: u32,
    #[serde(default)]
    pub waiting_on_others: u32,
    #[serde(default, rename = "handledByAI")]
    pub handled_by_ai: u32,
    #[serde(default)]
    pub scheduled_done: u32,
    #[serde(default)]
    pub muted: u32,
}

impl NavigationCount {
    pub fn get(&self, bucket: ViewBucket) -> u32 {
        match bucket {
            ViewBucket::NeedsDecision => self.needs_decision,
            ViewBucket::WaitingOnOthers => self.waiting_on_others,
            ViewBucket::Handled => self.handled_by_ai,
            ViewBucket::Scheduled => self.scheduled_done,
            ViewBucket::Muted => self.muted,
        }
    }

    fn slot_mut(&mut self, bucket: ViewBucket) -> &mut u32 {
        match bucket {
            ViewBucket::NeedsDecision => &mut self.needs_decision,
            ViewBucket::WaitingOnOthers => &mut self.waiting_on_others,
            ViewBucket::Handled => &mut self.handled_by_ai,
            ViewBucket::Scheduled => &mut self.scheduled_done,
            ViewBucket::Muted => &mut self.muted,
        }
    }

    pub fn increment(&mut self, bucket: ViewBucket) {
        let slot = self.slot_mut(bucket);
        *slot = slot.saturating_add(1);
    }

    /// Floors at zero.
    pub fn decrement(&mut self, bucket: ViewBucket) {
        let slot = self.slot_mut(bucket);
        *slot = slot.saturating_sub(1);
    }
}

// ---------------------------------------------------------------------------
// EfficiencyStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyStats {
    pub handled_autonomously: u32,
    pub total_today: u32,
    #[serde(default)]
    pub percentage: u8,
}

impl EfficiencyStats {
    pub fn new(handled_autonomously: u32, total_today: u32) -> Self {
        Self {
            handled_autonomously,
            total_today,
            percentage: percentage(handled_autonomously, total_today),
        }
    }

    /// Re-derive `percentage` from the two counters.
    pub fn recompute(&mut self) {
        self.percentage = percentage(self.handled_autonomously, self.total_today);
    }
}

fn percentage(handled: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(handled) * 100.0 / f64::from(total)).round();
    pct.min(100.0) as u8
}

// ---------------------------------------------------------------------------
// GlobalStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalStatusKind {
    AllClear,
    PendingDecisions,
    Urgent,
}

impl GlobalStatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalStatusKind::AllClear => "all_clear",
            GlobalStatusKind::PendingDecisions => "pending_decisions",
            GlobalStatusKind::Urgent => "urgent",
        }
    }
}

impl fmt::Display for GlobalStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatus {
    pub status: GlobalStatusKind,
    pub pending_count: u32,
    pub message: String,
}

impl GlobalStatus {
    /// The banner for a given `needs_decision` count.
    ///
    /// `0` is all-clear; anything at or above `urgent_threshold` is urgent.
    pub fn derive(needs_decision: u32, urgent_threshold: u32) -> Self {
        let status = if needs_decision == 0 {
            GlobalStatusKind::AllClear
        } else if needs_decision < urgent_threshold {
            GlobalStatusKind::PendingDecisions
        } else {
            GlobalStatusKind::Urgent
        };
        let message = match (status, needs_decision) {
            (GlobalStatusKind::AllClear, _) => {
                "All clear. Nothing needs your decision right now.".to_string()
            }
            (GlobalStatusKind::PendingDecisions, 1) => "1 decision is waiting for you".to_string(),
            (GlobalStatusKind::PendingDecisions, n) => format!("{n} decisions are waiting for you"),
            (GlobalStatusKind::Urgent, n) => format!("{n} decisions need your attention now"),
        };
        Self {
            status,
            pending_count: needs_decision,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// StatsSnapshot
// ---------------------------------------------------------------------------

/// Result of `getStats`, and the value cached under the stats key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub navigation_counts: NavigationCount,
    pub efficiency_stats: EfficiencyStats,
    pub global_status: GlobalStatus,
}

impl StatsSnapshot {
    pub fn from_counts(counts: NavigationCount, urgent_threshold: u32) -> Self {
        Self {
            global_status: GlobalStatus::derive(counts.needs_decision, urgent_threshold),
            navigation_counts: counts,
            efficiency_stats: EfficiencyStats::default(),
        }
    }

    /// Normalize a server-reported snapshot: the server's counters win, the
    /// derived percentage and banner are recomputed from them.
    pub fn reconciled(mut self, urgent_threshold: u32) -> Self {
        self.efficiency_stats.recompute();
        self.refresh_status(urgent_threshold);
        self
    }

    /// Replace the counters with ones reported alongside a queue page.
    pub fn apply_counts(&mut self, counts: NavigationCount, urgent_threshold: u32) {
        self.navigation_counts = counts;
        self.refresh_status(urgent_threshold);
    }

    /// A card left `bucket`. With `credit_handled`, it is counted as handled.
    pub fn remove_card(&mut self, bucket: ViewBucket, credit_handled: bool, urgent_threshold: u32) {
        self.navigation_counts.decrement(bucket);
        if credit_handled {
            self.navigation_counts.increment(ViewBucket::Handled);
        }
        self.refresh_status(urgent_threshold);
    }

    /// A card moved between buckets.
    pub fn move_card(&mut self, from: ViewBucket, to: ViewBucket, urgent_threshold: u32) {
        if from == to {
            return;
        }
        self.navigation_counts.decrement(from);
        self.navigation_counts.increment(to);
        self.refresh_status(urgent_threshold);
    }

    fn refresh_status(&mut self, urgent_threshold: u32) {
        self.global_status =
            GlobalStatus::derive(self.navigation_counts.needs_decision, urgent_threshold);
    }
}

// ---------------------------------------------------------------------------
// Drift detection
// ---------------------------------------------------------------------------

/// A bucket whose reported count disagrees with the unfiltered list cached
/// for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Drift {
    pub bucket: ViewBucket,
    pub counted: u32,
    pub listed: usize,
}

/// Compare `counts` against every unfiltered list in `lists`.
pub fn detect_drift<'a>(
    counts: &NavigationCount,
    lists: impl IntoIterator<Item = (ViewBucket, &'a QueuePage)>,
) -> Vec<Drift> {
    let mut drift: Vec<Drift> = lists
        .into_iter()
        .filter_map(|(bucket, page)| {
            let counted = counts.get(bucket);
            let listed = page.cards.len();
            (counted as usize != listed).then_some(Drift {
                bucket,
                counted,
                listed,
            })
        })
        .collect();
    drift.sort_by_key(|d| d.bucket);
    drift
}
