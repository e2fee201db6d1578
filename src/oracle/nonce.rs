//! Transaction sequence counter for the signing wallet

use std::sync::atomic::{AtomicU64, Ordering};

/// Next nonce to use for the configured signer.
///
/// Seeded from `eth_getTransactionCount`, advanced when a nonce is taken for a
/// submission (before the send resolves), and reset from the chain after a
/// sequencing conflict. Concurrent submitters under the same signer still need
/// external serialization: the tracker only guarantees that two takes never
/// return the same value.
#[derive(Debug)]
pub struct NonceTracker {
    next: AtomicU64,
}

impl NonceTracker {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Take the current nonce and advance the counter
    pub fn take(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Replace the counter with the chain's authoritative count
    pub fn reset(&self, chain_count: u64) {
        self.next.store(chain_count, Ordering::SeqCst);
    }

    /// Give back `nonce` if nothing was taken after it. Returns whether it was released.
    pub fn release(&self, nonce: u64) -> bool {
        self.next
            .compare_exchange(
                nonce.saturating_add(1),
                nonce,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Whether a node error means the submitted nonce was stale, reused or out of order
pub fn is_sequence_conflict(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("nonce")
        || message.contains("already known")
        || message.contains("replacement transaction underpriced")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_hands_out_increasing_nonces() {
        let tracker = NonceTracker::new(41);
        assert_eq!(tracker.take(), 41);
        assert_eq!(tracker.take(), 42);
        assert_eq!(tracker.current(), 43);
    }

    #[test]
    fn reset_overrides_optimistic_value() {
        let tracker = NonceTracker::new(10);
        tracker.take();
        tracker.take();
        tracker.reset(11);
        assert_eq!(tracker.take(), 11);
    }

    #[test]
    fn release_only_rolls_back_the_latest_take() {
        let tracker = NonceTracker::new(5);
        let first = tracker.take();
        let second = tracker.take();
        assert!(!tracker.release(first));
        assert!(tracker.release(second));
        assert_eq!(tracker.current(), 6);
    }

    #[test]
    fn detects_node_conflict_messages() {
        assert!(is_sequence_conflict(
            "(code: -32000, message: nonce too low, data: None)"
        ));
        assert!(is_sequence_conflict("NONCE_EXPIRED"));
        assert!(is_sequence_conflict("already known"));
        assert!(is_sequence_conflict("replacement transaction underpriced"));
        assert!(!is_sequence_conflict("insufficient funds for gas * price + value"));
        assert!(!is_sequence_conflict("execution reverted"));
    }
}
