use std::sync::Arc;

use async_trait::async_trait;
use domain::{DraftId, PendingOrderDraft};
use tokio::sync::RwLock;

use crate::{Result, store::DraftStore};

/// In-memory draft store for testing.
///
/// Behaves like the file store but forgets everything when dropped.
/// Clones share the same slot.
#[derive(Clone, Default)]
pub struct InMemoryDraftStore {
    slot: Arc<RwLock<Option<PendingOrderDraft>>>,
    saves: Arc<RwLock<usize>>,
}

impl InMemoryDraftStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `draft`.
    pub fn with_draft(draft: PendingOrderDraft) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(draft))),
            saves: Arc::default(),
        }
    }

    /// Returns true if a draft is stored.
    pub async fn has_draft(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Returns how many times `save` has been called.
    pub async fn save_count(&self) -> usize {
        *self.saves.read().await
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn save(&self, draft: &PendingOrderDraft) -> Result<()> {
        *self.slot.write().await = Some(draft.clone());
        *self.saves.write().await += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<PendingOrderDraft>> {
        Ok(self.slot.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.slot.write().await.take();
        Ok(())
    }

    async fn clear_if(&self, draft_id: DraftId) -> Result<bool> {
        let mut slot = self.slot.write().await;
        if slot.as_ref().is_some_and(|d| d.draft_id == draft_id) {
            slot.take();
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DeliveryTarget, Money, OrderLine};

    fn draft(restaurant: &str) -> PendingOrderDraft {
        PendingOrderDraft::new(
            restaurant,
            vec![OrderLine::new("pizza", "Margherita", 1, Money::from_cents(500))],
            DeliveryTarget::new("1 Main St"),
            "+15550100",
        )
    }

    #[tokio::test]
    async fn test_empty_store_loads_none() {
        let store = InMemoryDraftStore::new();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.has_draft().await);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryDraftStore::new();
        store.save(&draft("first")).await.unwrap();
        let second = draft("second");
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(second));
        assert_eq!(store.save_count().await, 2);
    }

    #[tokio::test]
    async fn test_load_does_not_remove() {
        let store = InMemoryDraftStore::with_draft(draft("r"));
        assert!(store.load().await.unwrap().is_some());
        assert!(store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = InMemoryDraftStore::with_draft(draft("r"));
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_if_keeps_newer_draft() {
        let store = InMemoryDraftStore::new();
        let old = draft("old");
        let newer = draft("newer");
        store.save(&newer).await.unwrap();

        assert!(!store.clear_if(old.draft_id).await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(newer.clone()));

        assert!(store.clear_if(newer.draft_id).await.unwrap());
        assert!(!store.has_draft().await);
    }

    #[tokio::test]
    async fn test_clones_share_slot() {
        let store = InMemoryDraftStore::new();
        let other = store.clone();
        store.save(&draft("r")).await.unwrap();
        assert!(other.has_draft().await);
    }
}
