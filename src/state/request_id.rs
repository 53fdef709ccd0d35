use std::sync::atomic::{AtomicU64, Ordering};

// Odd multiplier spreads consecutive sequence numbers over all 128 bits.
const SEQ_SPREAD: u128 = 0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c835;

/// Issues per-request correlation ids: a per-process random seed mixed with a
/// sequence number, laid out as a version-4 UUID.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    issued: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::with_seed(fastrand::u128(..))
    }

    #[must_use]
    pub(crate) fn with_seed(seed: u128) -> Self {
        Self {
            seed,
            issued: AtomicU64::new(0),
        }
    }

    /// Number of ids handed out so far.
    pub(crate) fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub(crate) fn next_id(&self) -> uuid::Uuid {
        let seq = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let mixed = self.seed ^ u128::from(seq).wrapping_mul(SEQ_SPREAD);
        uuid::Builder::from_random_bytes(mixed.to_be_bytes()).into_uuid()
    }
}
