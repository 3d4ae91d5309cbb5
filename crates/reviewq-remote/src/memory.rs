//! An in-process queue service: the offline demo backend and the test double
//! for the engine.
//!
//! It behaves like the real service (buckets move, counts follow) and adds
//! hooks for tests: scripted failures per operation, a gate that holds every
//! call until it is reopened, and call counters.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::watch;

use reviewq_core::aggregate::{EfficiencyStats, NavigationCount, StatsSnapshot};
use reviewq_core::types::{
    ActionCard, CardId, ConversationMessage, ConversationThread, MessageRole, ObjectiveId,
    ObjectiveStatus, QueueFilter, QueuePage, RelatedItem, RiskLevel, Sender, ViewBucket,
};

use crate::error::RemoteError;
use crate::{QueueService, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListQueue,
    Approve,
    Override,
    Edit,
    Escalate,
    Stats,
    Conversation,
}

impl Op {
    pub const ALL: [Op; 7] = [
        Op::ListQueue,
        Op::Approve,
        Op::Override,
        Op::Edit,
        Op::Escalate,
        Op::Stats,
        Op::Conversation,
    ];
}

#[derive(Debug, Default)]
struct MemoryState {
    cards: Vec<ActionCard>,
    /// Overridden cards leave every bucket.
    overridden: Vec<ActionCard>,
    conversations: HashMap<ObjectiveId, ConversationThread>,
    handled_today: u32,
    total_today: u32,
    failures: HashMap<Op, VecDeque<RemoteError>>,
    calls: HashMap<Op, usize>,
    token: Option<String>,
}

#[derive(Debug)]
pub struct InMemoryQueueService {
    state: Mutex<MemoryState>,
    gates: HashMap<Op, watch::Sender<bool>>,
    low_confidence_threshold: u8,
    urgent_threshold: u32,
    escalate_to: ObjectiveStatus,
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::with_cards(Vec::new())
    }
}

impl InMemoryQueueService {
    pub fn with_cards(cards: Vec<ActionCard>) -> Self {
        let total_today = cards.len() as u32;
        Self {
            state: Mutex::new(MemoryState {
                cards,
                total_today,
                token: Some("in-memory".to_string()),
                ..Default::default()
            }),
            gates: Op::ALL.iter().map(|op| (*op, watch::Sender::new(true))).collect(),
            low_confidence_threshold: 70,
            urgent_threshold: 5,
            escalate_to: ObjectiveStatus::WaitingOnOthers,
        }
    }

    pub fn with_thresholds(mut self, low_confidence: u8, urgent: u32) -> Self {
        self.low_confidence_threshold = low_confidence;
        self.urgent_threshold = urgent;
        self
    }

    /// Where escalated cards end up. Defaults to `waiting_on_others`.
    pub fn escalating_to(mut self, status: ObjectiveStatus) -> Self {
        self.escalate_to = status;
        self
    }

    pub fn with_conversation(self, thread: ConversationThread) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.conversations.insert(thread.objective_id.clone(), thread);
        }
        self
    }

    /// A small, realistic queue for `reviewq --offline`.
    pub fn demo() -> Self {
        let now = Utc::now();
        let card = |id: &str,
                    risk: RiskLevel,
                    confidence: u8,
                    status: ObjectiveStatus,
                    sender: &str,
                    summary: &str,
                    action: &str| {
            let created = now - ChronoDuration::minutes(confidence as i64);
            ActionCard {
                id: CardId::from(id),
                objective_id: ObjectiveId::from(format!("obj-{id}")),
                objective_status: status,
                risk_level: risk,
                category: "email".into(),
                confidence,
                summary: summary.into(),
                proposed_action: action.into(),
                sender: Sender {
                    name: sender.into(),
                    email: Some(format!("{}@example.com", sender.to_lowercase())),
                    organization: None,
                },
                related_items: vec![RelatedItem {
                    kind: "thread".into(),
                    id: format!("thr-{id}"),
                    title: None,
                }],
                created_at: created,
                updated_at: created,
                uncertain: confidence < 50,
                escalated: false,
            }
        };
        let cards = vec![
            card(
                "c-101",
                RiskLevel::High,
                58,
                ObjectiveStatus::WaitingOnYou,
                "Priya",
                "Vendor asks to move contract signing to Thursday",
                "Thursday works for us. I'll send the revised draft by Wednesday noon.",
            ),
            card(
                "c-102",
                RiskLevel::Medium,
                88,
                ObjectiveStatus::WaitingOnYou,
                "Marco",
                "Team offsite dinner headcount",
                "Count me in, no dietary restrictions.",
            ),
            card(
                "c-103",
                RiskLevel::Low,
                95,
                ObjectiveStatus::WaitingOnYou,
                "Lena",
                "Newsletter unsubscribe confirmation",
                "Archive without reply.",
            ),
            card(
                "c-104",
                RiskLevel::Medium,
                41,
                ObjectiveStatus::WaitingOnYou,
                "Tomasz",
                "Invoice discrepancy on March statement",
                "Thanks for flagging. Could you send the line items for the second charge?",
            ),
            card(
                "c-105",
                RiskLevel::Low,
                92,
                ObjectiveStatus::WaitingOnOthers,
                "Grace",
                "Waiting on legal review of NDA",
                "Follow up Monday if no response.",
            ),
            card(
                "c-106",
                RiskLevel::Low,
                97,
                ObjectiveStatus::Handled,
                "Noah",
                "Meeting room booking confirmed",
                "Accepted calendar invite.",
            ),
        ];
        let thread = ConversationThread {
            objective_id: ObjectiveId::from("obj-c-101"),
            subject: Some("Contract signing".into()),
            messages: vec![
                ConversationMessage {
                    id: "m1".into(),
                    author: "Priya".into(),
                    role: MessageRole::Contact,
                    body: "Could we push signing to Thursday? Our counsel is out until then."
                        .into(),
                    sent_at: now - ChronoDuration::hours(2),
                },
                ConversationMessage {
                    id: "m2".into(),
                    author: "assistant".into(),
                    role: MessageRole::Assistant,
                    body: "Drafted a reply accepting Thursday and committing to a revised draft."
                        .into(),
                    sent_at: now - ChronoDuration::hours(1),
                },
            ],
        };
        let svc = Self::with_cards(cards).with_conversation(thread);
        if let Ok(mut s) = svc.state.lock() {
            s.handled_today = 7;
            s.total_today = 12;
        }
        svc
    }

    // -----------------------------------------------------------------------
    // Test hooks
    // -----------------------------------------------------------------------

    /// The next call to `op` fails with `err`. Queued failures are consumed
    /// in order.
    pub fn fail_next(&self, op: Op, err: RemoteError) {
        if let Ok(mut s) = self.state.lock() {
            s.failures.entry(op).or_default().push_back(err);
        }
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Hold every call at its start until [`resume`](Self::resume).
    pub fn pause(&self) {
        for gate in self.gates.values() {
            gate.send_replace(false);
        }
    }

    pub fn resume(&self) {
        for gate in self.gates.values() {
            gate.send_replace(true);
        }
    }

    pub fn pause_op(&self, op: Op) {
        if let Some(gate) = self.gates.get(&op) {
            gate.send_replace(false);
        }
    }

    pub fn resume_op(&self, op: Op) {
        if let Some(gate) = self.gates.get(&op) {
            gate.send_replace(true);
        }
    }

    pub fn card(&self, id: &CardId) -> Option<ActionCard> {
        let s = self.state.lock().ok()?;
        s.cards.iter().find(|c| &c.id == id).cloned()
    }

    pub fn insert(&self, card: ActionCard) {
        if let Ok(mut s) = self.state.lock() {
            s.total_today += 1;
            s.cards.push(card);
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn enter(&self, op: Op) -> Result<()> {
        if let Some(gate) = self.gates.get(&op) {
            let mut open = gate.subscribe();
            let _ = open.wait_for(|open| *open).await;
        }
        let mut s = self.lock()?;
        *s.calls.entry(op).or_default() += 1;
        if s.token.is_none() {
            return Err(RemoteError::Unauthorized("no session".into()));
        }
        match s.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| RemoteError::Server {
                status: 500,
                message: "in-memory state poisoned".into(),
            })
    }

    fn counts(cards: &[ActionCard]) -> NavigationCount {
        let mut counts = NavigationCount::default();
        for c in cards {
            counts.increment(c.bucket());
        }
        counts
    }

    fn update<F>(&self, id: &CardId, f: F) -> Result<ActionCard>
    where
        F: FnOnce(&mut MemoryState, usize) -> Result<ActionCard>,
    {
        let mut s = self.lock()?;
        let idx = s
            .cards
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| RemoteError::Validation(format!("card {id} not found")))?;
        f(&mut *s, idx)
    }
}

fn require_pending(card: &ActionCard) -> Result<()> {
    if card.bucket() != ViewBucket::NeedsDecision {
        return Err(RemoteError::Conflict(format!(
            "card {} is {}, not waiting on you",
            card.id, card.objective_status
        )));
    }
    Ok(())
}

fn require_reason(reason: &str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(RemoteError::Validation("a reason is required".into()));
    }
    Ok(())
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn list_queue(&self, status: ViewBucket, filter: QueueFilter) -> Result<QueuePage> {
        self.enter(Op::ListQueue).await?;
        let s = self.lock()?;
        let cards = s
            .cards
            .iter()
            .filter(|c| c.bucket() == status && filter.matches(c, self.low_confidence_threshold))
            .cloned()
            .collect();
        Ok(QueuePage {
            cards,
            counts: Some(Self::counts(&s.cards)),
        })
    }

    async fn approve(&self, id: &CardId) -> Result<ActionCard> {
        self.enter(Op::Approve).await?;
        self.update(id, |s, i| {
            require_pending(&s.cards[i])?;
            let card = &mut s.cards[i];
            card.objective_status = ObjectiveStatus::Handled;
            card.updated_at = Utc::now();
            let card = card.clone();
            s.handled_today += 1;
            Ok(card)
        })
    }

    async fn override_card(&self, id: &CardId, reason: &str) -> Result<ActionCard> {
        self.enter(Op::Override).await?;
        require_reason(reason)?;
        self.update(id, |s, i| {
            require_pending(&s.cards[i])?;
            let mut card = s.cards.remove(i);
            card.updated_at = Utc::now();
            s.overridden.push(card.clone());
            Ok(card)
        })
    }

    async fn edit(&self, id: &CardId, content: &str) -> Result<ActionCard> {
        self.enter(Op::Edit).await?;
        if content.trim().is_empty() {
            return Err(RemoteError::Validation(
                "proposed action cannot be empty".into(),
            ));
        }
        self.update(id, |s, i| {
            let card = &mut s.cards[i];
            card.proposed_action = content.to_string();
            card.updated_at = Utc::now();
            Ok(card.clone())
        })
    }

    async fn escalate(&self, id: &CardId, reason: &str) -> Result<ActionCard> {
        self.enter(Op::Escalate).await?;
        require_reason(reason)?;
        let to = self.escalate_to;
        self.update(id, |s, i| {
            let card = &mut s.cards[i];
            card.escalated = true;
            card.objective_status = to;
            card.updated_at = Utc::now();
            Ok(card.clone())
        })
    }

    async fn get_stats(&self) -> Result<StatsSnapshot> {
        self.enter(Op::Stats).await?;
        let s = self.lock()?;
        let mut stats = StatsSnapshot::from_counts(Self::counts(&s.cards), self.urgent_threshold);
        stats.efficiency_stats = EfficiencyStats::new(s.handled_today, s.total_today);
        Ok(stats)
    }

    async fn get_conversation(&self, objective: &ObjectiveId) -> Result<ConversationThread> {
        self.enter(Op::Conversation).await?;
        let s = self.lock()?;
        Ok(s.conversations
            .get(objective)
            .cloned()
            .unwrap_or_else(|| ConversationThread {
                objective_id: objective.clone(),
                subject: None,
                messages: Vec::new(),
            }))
    }

    fn invalidate_session(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.token = None;
        }
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut s) = self.state.lock() {
            s.token = token;
        }
    }

    fn has_session(&self) -> bool {
        self.state.lock().map(|s| s.token.is_some()).unwrap_or(false)
    }
}
