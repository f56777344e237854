use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::format_request_seq_hex;

/// Issues `chatcmpl-` ids that are unique per process and not guessable
/// across restarts.
pub(crate) struct RequestIdGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            seed: fastrand::u64(..),
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_completion_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format_request_seq_hex("chatcmpl-", self.seed ^ seq)
    }
}
