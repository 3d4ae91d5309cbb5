use serde::{Deserialize, Serialize};

use crate::cache::QueueKey;
use crate::types::{ActionCard, CardId, ObjectiveId, QueueFilter, QueuePage, ViewBucket};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCard {
    pub card_id: CardId,
    pub objective_id: ObjectiveId,
}

impl From<&ActionCard> for SelectedCard {
    fn from(card: &ActionCard) -> Self {
        Self {
            card_id: card.id.clone(),
            objective_id: card.objective_id.clone(),
        }
    }
}

/// Active view, active filter, and the selected card/objective pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub view: ViewBucket,
    pub filter: QueueFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<SelectedCard>,
}

impl Selection {
    /// The queue key the presentation layer is subscribed to.
    pub fn queue_key(&self) -> QueueKey {
        QueueKey::new(self.view, self.filter)
    }

    /// Returns `true` if the view changed. The selection is cleared.
    pub fn set_view(&mut self, view: ViewBucket) -> bool {
        if self.view == view {
            return false;
        }
        self.view = view;
        self.selected = None;
        true
    }

    /// Returns `true` if the filter changed. The selection is cleared.
    pub fn set_filter(&mut self, filter: QueueFilter) -> bool {
        if self.filter == filter {
            return false;
        }
        self.filter = filter;
        self.selected = None;
        true
    }

    pub fn select(&mut self, card: &ActionCard) {
        self.selected = Some(SelectedCard::from(card));
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected_card(&self) -> Option<&CardId> {
        self.selected.as_ref().map(|s| &s.card_id)
    }

    /// The Conversation Linker's key.
    pub fn objective(&self) -> Option<&ObjectiveId> {
        self.selected.as_ref().map(|s| &s.objective_id)
    }

    /// `removed` just left `before` (the list as it was when the card was
    /// still in it). If it was the selected card, move to its successor,
    /// else its predecessor, else clear. Returns `true` if the selection
    /// changed.
    pub fn after_removal(&mut self, removed: &CardId, before: &QueuePage) -> bool {
        if self.selected_card() != Some(removed) {
            return false;
        }
        let Some(pos) = before.position(removed) else {
            self.selected = None;
            return true;
        };
        let next = before
            .cards
            .get(pos + 1)
            .or_else(|| pos.checked_sub(1).and_then(|p| before.cards.get(p)));
        self.selected = next.map(SelectedCard::from);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{page, pending};

    fn selecting(id: &str) -> Selection {
        let mut s = Selection::default();
        s.select(&pending(id));
        s
    }

    #[test]
    fn defaults_to_needs_decision_all() {
        let s = Selection::default();
        assert_eq!(
            s.queue_key(),
            QueueKey::new(ViewBucket::NeedsDecision, QueueFilter::All)
        );
        assert!(s.selected.is_none());
    }

    #[test]
    fn select_links_objective() {
        let s = selecting("c1");
        assert_eq!(s.selected_card().unwrap().as_str(), "c1");
        assert_eq!(s.objective().unwrap().as_str(), "obj-c1");
    }

    #[test]
    fn changing_view_or_filter_clears_selection() {
        let mut s = selecting("c1");
        assert!(s.set_view(ViewBucket::Muted));
        assert!(s.selected.is_none());

        let mut s = selecting("c1");
        assert!(!s.set_filter(QueueFilter::All));
        assert!(s.selected.is_some());
        assert!(s.set_filter(QueueFilter::HighRisk));
        assert!(s.selected.is_none());
        assert_eq!(s.queue_key().filter, QueueFilter::HighRisk);
    }

    #[test]
    fn removal_moves_to_next_card() {
        let list = page(vec![pending("a"), pending("b"), pending("c")]);
        let mut s = selecting("b");
        assert!(s.after_removal(&CardId::from("b"), &list));
        assert_eq!(s.selected_card().unwrap().as_str(), "c");
    }

    #[test]
    fn removal_of_last_card_moves_back() {
        let list = page(vec![pending("a"), pending("b")]);
        let mut s = selecting("b");
        s.after_removal(&CardId::from("b"), &list);
        assert_eq!(s.selected_card().unwrap().as_str(), "a");
        assert_eq!(s.objective().unwrap().as_str(), "obj-a");
    }

    #[test]
    fn removal_of_only_card_clears() {
        let list = page(vec![pending("a")]);
        let mut s = selecting("a");
        s.after_removal(&CardId::from("a"), &list);
        assert!(s.selected.is_none());
    }

    #[test]
    fn removal_of_other_card_keeps_selection() {
        let list = page(vec![pending("a"), pending("b")]);
        let mut s = selecting("a");
        assert!(!s.after_removal(&CardId::from("b"), &list));
        assert_eq!(s.selected_card().unwrap().as_str(), "a");
    }
}
