//! Process-local mutual exclusion around the dequeue claim.
//!
//! Only serializes consumers sharing one `WorkQueue`. Consumers in other
//! processes are kept apart by the store's atomic claim, not by this.

use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct ClaimGuard {
    lock: Mutex<()>,
}

impl ClaimGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the guard. Hold the returned handle only across the claim.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        let start = Instant::now();
        let held = self.lock.lock().await;
        let waited = start.elapsed();
        if !waited.is_zero() {
            tracing::trace!(wait_us = waited.as_micros() as u64, "claim guard acquired");
        }
        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_one_holder_at_a_time() {
        let guard = Arc::new(ClaimGuard::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _held = guard.acquire().await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
