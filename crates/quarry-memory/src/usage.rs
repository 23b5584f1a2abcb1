use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts embedding requests and tokens billed by a remote provider.
///
/// Owned by the caller and shared with providers through an `Arc`; nothing
/// is tracked globally. [`UsageTracker::reset`] returns the totals it
/// cleared, so a caller can report per-run usage.
#[derive(Debug, Default)]
pub struct UsageTracker {
    requests: AtomicU64,
    texts: AtomicU64,
    prompt_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

/// Point-in-time copy of the counters in a [`UsageTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Successful provider requests.
    pub requests: u64,
    /// Texts embedded across those requests.
    pub texts: u64,
    /// Prompt tokens reported by the provider.
    pub prompt_tokens: u64,
    /// Total tokens reported by the provider.
    pub total_tokens: u64,
}

impl UsageTracker {
    /// Create a tracker with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful request covering `texts` inputs.
    pub fn record(&self, texts: u64, prompt_tokens: u64, total_tokens: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.texts.fetch_add(texts, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.total_tokens.fetch_add(total_tokens, Ordering::Relaxed);
    }

    /// Current totals, without clearing them.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            texts: self.texts.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters, returning their values just before.
    pub fn reset(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.swap(0, Ordering::Relaxed),
            texts: self.texts.swap(0, Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.swap(0, Ordering::Relaxed),
            total_tokens: self.total_tokens.swap(0, Ordering::Relaxed),
        }
    }
}
