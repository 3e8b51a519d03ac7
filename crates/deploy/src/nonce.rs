//! Nonce sequencing for pipelined submission.
//!
//! The network orders an account's transactions by nonce, not by the order in
//! which they confirm. Handing out nonces from a local counter seeded once at
//! the start of a run is what lets the pipeline submit several transactions
//! back-to-back without waiting on each receipt.

use alloy_core::primitives::Address;

use crate::{client::ChainClient, errors::DeployError};

/// Step name reported when the base nonce cannot be read.
const BASE_NONCE_STEP: &str = "base-nonce";

/// Monotonic nonce counter for a single pipeline run.
///
/// Values are `base, base + 1, base + 2, ...` with no gaps and no repeats.
#[derive(Debug)]
pub struct NonceSequencer {
    base: u64,
    next: u64,
}

impl NonceSequencer {
    /// Create a sequencer starting at `base`.
    pub fn new(base: u64) -> Self {
        Self { base, next: base }
    }

    /// Seed a sequencer from the account's pending transaction count.
    pub async fn capture<C: ChainClient>(
        client: &C,
        account: Address,
    ) -> Result<Self, DeployError> {
        let base = client
            .transaction_count(account)
            .await
            .map_err(|e| {
                DeployError::pipeline(BASE_NONCE_STEP, format!("failed to read nonce: {e}"))
            })?;

        tracing::info!(account = %account, base_nonce = base, "Captured base nonce");

        Ok(Self::new(base))
    }

    /// The nonce this sequencer was seeded with.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Take the next nonce.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        nonce
    }

    /// Check the account's observed pending count against the nonce about to be used.
    ///
    /// Any divergence means something else used the account during the run.
    /// The caller must abort rather than renumber, since later nonces may
    /// already be in flight.
    pub async fn ensure_in_sync<C: ChainClient>(
        &self,
        client: &C,
        account: Address,
        step: &str,
    ) -> Result<(), DeployError> {
        let observed = client
            .transaction_count(account)
            .await
            .map_err(|e| DeployError::pipeline(step, format!("failed to read nonce: {e}")))?;

        if observed != self.next {
            tracing::error!(
                step,
                expected = self.next,
                observed,
                "Account nonce diverged from sequencer"
            );
            return Err(DeployError::NonceConflict {
                step: step.to_string(),
                expected: self.next,
                observed: Some(observed),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_has_no_gaps_or_repeats() {
        let mut seq = NonceSequencer::new(7);
        let issued: Vec<u64> = (0..5).map(|_| seq.next()).collect();

        assert_eq!(issued, vec![7, 8, 9, 10, 11]);
        assert_eq!(seq.base(), 7);
        assert_eq!(seq.next(), 12);
    }
}
