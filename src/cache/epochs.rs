//! Invalidation epochs that keep a slow cache fill from resurrecting a view
//! that was invalidated while the fill was loading it.
//!
//! Every invalidation bumps the epoch of the post's stripe before deleting
//! the entry. A fill snapshots the epoch before it reads the store and only
//! keeps its entry if the epoch is unchanged once the entry is written.
//! Posts share stripes, so a bump on one post can cost a neighbour one
//! skipped fill; it never lets a stale one through.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::types::PostId;

const STRIPES: usize = 1024;

#[derive(Debug)]
pub struct FillEpochs {
    stripes: Box<[AtomicU64]>,
}

/// Epoch observed by a fill before it read the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket {
    post_id: PostId,
    epoch: u64,
}

impl FillTicket {
    pub(crate) fn post_id(&self) -> PostId {
        self.post_id
    }
}

impl Default for FillEpochs {
    fn default() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl FillEpochs {
    pub fn ticket(&self, post_id: PostId) -> FillTicket {
        FillTicket {
            post_id,
            epoch: self.stripe(post_id).load(Ordering::SeqCst),
        }
    }

    /// Called before the entry is deleted.
    pub fn bump(&self, post_id: PostId) {
        self.stripe(post_id).fetch_add(1, Ordering::SeqCst);
    }

    /// Whether an invalidation of the ticket's post started since it was taken.
    pub fn is_current(&self, ticket: FillTicket) -> bool {
        self.stripe(ticket.post_id).load(Ordering::SeqCst) == ticket.epoch
    }

    fn stripe(&self, post_id: PostId) -> &AtomicU64 {
        let index = (post_id.get() as u64 % STRIPES as u64) as usize;
        &self.stripes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_outdates_earlier_tickets_only() {
        let epochs = FillEpochs::default();
        let before = epochs.ticket(PostId::new(7));
        assert!(epochs.is_current(before));

        epochs.bump(PostId::new(7));
        assert!(!epochs.is_current(before));
        assert!(epochs.is_current(epochs.ticket(PostId::new(7))));
    }

    #[test]
    fn other_stripes_are_untouched() {
        let epochs = FillEpochs::default();
        let ticket = epochs.ticket(PostId::new(1));
        epochs.bump(PostId::new(2));
        assert!(epochs.is_current(ticket));
    }

    #[test]
    fn negative_ids_map_to_a_stripe() {
        let epochs = FillEpochs::default();
        let ticket = epochs.ticket(PostId::new(-5));
        epochs.bump(PostId::new(-5));
        assert!(!epochs.is_current(ticket));
    }
}
