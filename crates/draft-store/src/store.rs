use async_trait::async_trait;
use domain::{DraftId, PendingOrderDraft};

use crate::Result;

/// Narrow interface over the single pending-draft slot.
///
/// Implementations must be thread-safe (Send + Sync) so a store can be shared
/// between an active payment session and the return-flow reconciler.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Stores the draft, replacing any previous one (last write wins).
    async fn save(&self, draft: &PendingOrderDraft) -> Result<()>;

    /// Returns the stored draft without removing it.
    async fn load(&self) -> Result<Option<PendingOrderDraft>>;

    /// Deletes the stored draft. Clearing an empty store is a no-op.
    async fn clear(&self) -> Result<()>;

    /// Deletes the stored draft only if it is `draft_id`.
    ///
    /// Returns whether a draft was removed. A newer draft saved by a later
    /// checkout is left in place.
    async fn clear_if(&self, draft_id: DraftId) -> Result<bool>;
}

#[async_trait]
impl<T: DraftStore + ?Sized> DraftStore for std::sync::Arc<T> {
    async fn save(&self, draft: &PendingOrderDraft) -> Result<()> {
        (**self).save(draft).await
    }

    async fn load(&self) -> Result<Option<PendingOrderDraft>> {
        (**self).load().await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }

    async fn clear_if(&self, draft_id: DraftId) -> Result<bool> {
        (**self).clear_if(draft_id).await
    }
}
