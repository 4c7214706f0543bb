// ---------------------------------------------------------------------------
// Request Coordinator
// ---------------------------------------------------------------------------
//
// Owns a single abortable-request slot. Starting a new request cancels the
// previous one's token; a continuation must hold the current generation to
// be allowed to commit its result. This enforces "at most one
// authoritative in-flight request" by cancellation, not queuing.
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RequestCoordinator {
    slot: Mutex<Option<CancellationToken>>,
    generation: AtomicU64,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any outstanding request and open a new slot. Returns the new
    /// request's token and its generation.
    pub fn begin(&self) -> (CancellationToken, u64) {
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.slot.lock().unwrap().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        (token, generation)
    }

    /// Whether `generation` still owns the slot — no newer request has
    /// begun since it was handed out.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Cancel the outstanding request, if any, without starting a new one.
    /// Any continuation holding an older generation is invalidated.
    pub fn cancel(&self) {
        if let Some(token) = self.slot.lock().unwrap().take() {
            token.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
