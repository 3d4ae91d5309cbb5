use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aggregate::NavigationCount;
use crate::error::ReviewError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub String);

impl CardId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectiveId(pub String);

impl ObjectiveId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectiveId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectiveId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// RiskLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(RiskLevel::High),
            "medium" => Ok(RiskLevel::Medium),
            "low" => Ok(RiskLevel::Low),
            _ => Err(ReviewError::InvalidRisk(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectiveStatus / ViewBucket
// ---------------------------------------------------------------------------

/// Lifecycle of the objective that owns a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    WaitingOnYou,
    WaitingOnOthers,
    Handled,
    Scheduled,
    Muted,
}

impl ObjectiveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectiveStatus::WaitingOnYou => "waiting_on_you",
            ObjectiveStatus::WaitingOnOthers => "waiting_on_others",
            ObjectiveStatus::Handled => "handled",
            ObjectiveStatus::Scheduled => "scheduled",
            ObjectiveStatus::Muted => "muted",
        }
    }

    pub fn bucket(self) -> ViewBucket {
        match self {
            ObjectiveStatus::WaitingOnYou => ViewBucket::NeedsDecision,
            ObjectiveStatus::WaitingOnOthers => ViewBucket::WaitingOnOthers,
            ObjectiveStatus::Handled => ViewBucket::Handled,
            ObjectiveStatus::Scheduled => ViewBucket::Scheduled,
            ObjectiveStatus::Muted => ViewBucket::Muted,
        }
    }
}

impl fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectiveStatus {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_on_you" => Ok(ObjectiveStatus::WaitingOnYou),
            "waiting_on_others" => Ok(ObjectiveStatus::WaitingOnOthers),
            "handled" => Ok(ObjectiveStatus::Handled),
            "scheduled" => Ok(ObjectiveStatus::Scheduled),
            "muted" => Ok(ObjectiveStatus::Muted),
            _ => Err(ReviewError::InvalidStatus(s.to_string())),
        }
    }
}

/// The view a card is listed under. Always derived from [`ObjectiveStatus`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ViewBucket {
    #[default]
    NeedsDecision,
    WaitingOnOthers,
    Handled,
    Scheduled,
    Muted,
}

impl ViewBucket {
    pub fn all() -> &'static [ViewBucket] {
        &[
            ViewBucket::NeedsDecision,
            ViewBucket::WaitingOnOthers,
            ViewBucket::Handled,
            ViewBucket::Scheduled,
            ViewBucket::Muted,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewBucket::NeedsDecision => "needs_decision",
            ViewBucket::WaitingOnOthers => "waiting_on_others",
            ViewBucket::Handled => "handled",
            ViewBucket::Scheduled => "scheduled",
            ViewBucket::Muted => "muted",
        }
    }
}

impl fmt::Display for ViewBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViewBucket {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_decision" => Ok(ViewBucket::NeedsDecision),
            "waiting_on_others" => Ok(ViewBucket::WaitingOnOthers),
            "handled" => Ok(ViewBucket::Handled),
            "scheduled" => Ok(ViewBucket::Scheduled),
            "muted" => Ok(ViewBucket::Muted),
            _ => Err(ReviewError::InvalidBucket(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// QueueFilter
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QueueFilter {
    #[default]
    All,
    HighRisk,
    LowConfidence,
}

impl QueueFilter {
    pub fn all() -> &'static [QueueFilter] {
        &[
            QueueFilter::All,
            QueueFilter::HighRisk,
            QueueFilter::LowConfidence,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueFilter::All => "all",
            QueueFilter::HighRisk => "high_risk",
            QueueFilter::LowConfidence => "low_confidence",
        }
    }

    /// Whether `card` would be listed under this filter.
    ///
    /// `low_confidence_threshold` is exclusive: a card at exactly the
    /// threshold is not low-confidence unless it is flagged uncertain.
    pub fn matches(self, card: &ActionCard, low_confidence_threshold: u8) -> bool {
        match self {
            QueueFilter::All => true,
            QueueFilter::HighRisk => card.risk_level == RiskLevel::High,
            QueueFilter::LowConfidence => {
                card.uncertain || card.confidence < low_confidence_threshold
            }
        }
    }
}

impl fmt::Display for QueueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueFilter {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(QueueFilter::All),
            "high_risk" => Ok(QueueFilter::HighRisk),
            "low_confidence" => Ok(QueueFilter::LowConfidence),
            _ => Err(ReviewError::InvalidFilter(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionCard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedItem {
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A unit of AI-proposed work awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCard {
    pub id: CardId,
    pub objective_id: ObjectiveId,
    pub objective_status: ObjectiveStatus,
    pub risk_level: RiskLevel,
    pub category: String,
    /// 0–100.
    pub confidence: u8,
    pub summary: String,
    pub proposed_action: String,
    pub sender: Sender,
    #[serde(default)]
    pub related_items: Vec<RelatedItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub uncertain: bool,
    #[serde(default)]
    pub escalated: bool,
}

impl ActionCard {
    pub fn bucket(&self) -> ViewBucket {
        self.objective_status.bucket()
    }
}

// ---------------------------------------------------------------------------
// QueuePage
// ---------------------------------------------------------------------------

/// One `listQueue` result: the cards for a `(status, filter)` slice plus the
/// bucket counts the service reported alongside them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePage {
    pub cards: Vec<ActionCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<NavigationCount>,
}

impl QueuePage {
    pub fn new(cards: Vec<ActionCard>) -> Self {
        Self { cards, counts: None }
    }

    pub fn position(&self, id: &CardId) -> Option<usize> {
        self.cards.iter().position(|c| &c.id == id)
    }

    pub fn contains(&self, id: &CardId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &CardId) -> Option<&ActionCard> {
        self.cards.iter().find(|c| &c.id == id)
    }
}

// ---------------------------------------------------------------------------
// ConversationThread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Contact,
    Assistant,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub author: String,
    pub role: MessageRole,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationThread {
    pub objective_id: ObjectiveId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::card;

    #[test]
    fn waiting_on_you_projects_to_needs_decision() {
        assert_eq!(
            ObjectiveStatus::WaitingOnYou.bucket(),
            ViewBucket::NeedsDecision
        );
        assert_eq!(ObjectiveStatus::Muted.bucket(), ViewBucket::Muted);
    }

    #[test]
    fn bucket_round_trips_through_str() {
        for b in ViewBucket::all() {
            assert_eq!(b.as_str().parse::<ViewBucket>().unwrap(), *b);
        }
        assert!("waiting_on_you".parse::<ViewBucket>().is_err());
    }

    #[test]
    fn high_risk_filter_matches_only_high() {
        let high = card("a", RiskLevel::High, 90);
        let low = card("b", RiskLevel::Low, 90);
        assert!(QueueFilter::HighRisk.matches(&high, 70));
        assert!(!QueueFilter::HighRisk.matches(&low, 70));
        assert!(QueueFilter::All.matches(&low, 70));
    }

    #[test]
    fn low_confidence_threshold_is_exclusive() {
        let at = card("a", RiskLevel::Low, 70);
        let below = card("b", RiskLevel::Low, 69);
        assert!(!QueueFilter::LowConfidence.matches(&at, 70));
        assert!(QueueFilter::LowConfidence.matches(&below, 70));
    }

    #[test]
    fn uncertain_cards_count_as_low_confidence() {
        let mut c = card("a", RiskLevel::Low, 95);
        c.uncertain = true;
        assert!(QueueFilter::LowConfidence.matches(&c, 70));
    }

    #[test]
    fn card_deserializes_camel_case_and_defaults_flags() {
        let json = r#"{
            "id": "c1",
            "objectiveId": "o1",
            "objectiveStatus": "waiting_on_you",
            "riskLevel": "medium",
            "category": "email",
            "confidence": 81,
            "summary": "Reply to invoice",
            "proposedAction": "Thanks, paid.",
            "sender": {"name": "Bob"},
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        }"#;
        let c: ActionCard = serde_json::from_str(json).unwrap();
        assert_eq!(c.id.as_str(), "c1");
        assert_eq!(c.bucket(), ViewBucket::NeedsDecision);
        assert!(!c.uncertain);
        assert!(!c.escalated);
        assert!(c.related_items.is_empty());
    }
}
