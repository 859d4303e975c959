//! Bulkhead: a concurrent-execution cap with a bounded waiting queue.
//!
//! Admission takes the first open path: an active slot, then a queue slot
//! (parking the caller until an active slot frees), then rejection. Queued
//! callers are promoted first-come-first-served; a cancelled waiter releases
//! its queue slot before returning and its operation is never invoked.

use crate::context::Context;
use crate::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Callback fired with the bulkhead's name on rejection.
pub type OnBulkheadFull = Arc<dyn Fn(&str) + Send + Sync>;

/// Bulkhead configuration. A zero `max_concurrent` is replaced with the
/// default; a zero `max_queue_size` is honored and disables queueing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Omit the bulkhead from an assembled executor when false.
    pub enabled: bool,
    /// Identifier reported to callbacks and logs.
    pub name: String,
    /// Cap on concurrently executing operations.
    pub max_concurrent: usize,
    /// Cap on callers parked waiting for an active slot.
    pub max_queue_size: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "default".to_string(),
            max_concurrent: 10,
            max_queue_size: 100,
        }
    }
}

/// Concurrency-limiting bulkhead. Cloning shares the slots and queue.
#[derive(Clone)]
pub struct Bulkhead {
    config: BulkheadConfig,
    active: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    on_full: Option<OnBulkheadFull>,
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("config", &self.config)
            .field("available", &self.available())
            .finish()
    }
}

impl Bulkhead {
    /// Create a bulkhead from `config`. `max_concurrent == 0` takes the
    /// default; `max_queue_size == 0` means rejection as soon as the active
    /// set is full.
    pub fn new(mut config: BulkheadConfig) -> Self {
        let defaults = BulkheadConfig::default();
        if config.name.is_empty() {
            config.name = defaults.name;
        }
        if config.max_concurrent == 0 {
            config.max_concurrent = defaults.max_concurrent;
        }

        let active = Arc::new(Semaphore::new(config.max_concurrent));
        let queue = Arc::new(Semaphore::new(config.max_queue_size));
        Self { config, active, queue, on_full: None }
    }

    /// Attach a callback fired on every rejection.
    pub fn with_on_full<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_full = Some(Arc::new(callback));
        self
    }

    /// The bulkhead's identifier.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Unoccupied active slots at the time of the read. Diagnostic snapshot;
    /// concurrent admissions may race it.
    pub fn available(&self) -> usize {
        self.active.available_permits()
    }

    /// Admit the caller (running immediately, or after queueing), run `op`,
    /// and release the slot. Returns [`ResilienceError::BulkheadFull`]
    /// without invoking `op` when the active set and queue are both full, or
    /// the handle's error if cancellation lands while queued.
    pub async fn execute<T, E, Fut, Op>(
        &self,
        ctx: &Context,
        op: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce(Context) -> Fut + Send,
    {
        let permit = match self.active.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                let queued = match self.queue.try_acquire() {
                    Ok(queued) => queued,
                    Err(_) => {
                        tracing::warn!(
                            name = %self.config.name,
                            max_concurrent = self.config.max_concurrent,
                            max_queue_size = self.config.max_queue_size,
                            "bulkhead at capacity"
                        );
                        if let Some(callback) = &self.on_full {
                            callback(&self.config.name);
                        }
                        return Err(ResilienceError::BulkheadFull);
                    }
                };

                // Parked: wait for an active slot, abandoning the wait (and
                // the queue slot) on cancellation.
                let acquired = tokio::select! {
                    acquired = self.active.acquire() => acquired,
                    _ = ctx.done() => {
                        drop(queued);
                        return Err(ctx.error().unwrap_or(ResilienceError::Canceled));
                    }
                };
                drop(queued);
                acquired.expect("bulkhead semaphore is never closed")
            }
        };

        let result = op(ctx.clone()).await;
        drop(permit);
        result
    }
}
