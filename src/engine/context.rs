//! Execution state owned by one class-scope
//!
//! Built when the orchestrator enters a class node and dropped once the
//! class has finished. Nothing here is shared across class-scopes or
//! across engine runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::common::{Error, Result};
use crate::discovery::{TestNode, UniqueId};
use crate::model::Verdict;

/// Latch released once every child scenario counted down
#[derive(Debug)]
pub struct Countdown {
    remaining: watch::Sender<usize>,
}

impl Countdown {
    pub fn new(count: usize) -> Self {
        let (remaining, _) = watch::channel(count);
        Self { remaining }
    }

    pub fn count_down(&self) {
        self.remaining.send_modify(|count| *count = count.saturating_sub(1));
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Resolves when the count reaches zero
    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives in self, so the channel cannot close while waiting
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

/// Counts down when dropped, so a scenario task always releases the latch
#[derive(Debug)]
pub struct CountdownGuard(Arc<Countdown>);

impl Drop for CountdownGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

/// Gate, latch and in-flight set of one class-scope
#[derive(Debug)]
pub struct ClassExecutionContext {
    node: Arc<TestNode>,
    capacity: usize,
    gate: Arc<Semaphore>,
    countdown: Arc<Countdown>,
    in_flight: Mutex<HashSet<UniqueId>>,
    worst: Mutex<Option<Verdict>>,
}

impl ClassExecutionContext {
    /// `capacity` concurrent scenarios, `children` scenarios to wait for
    pub fn new(node: Arc<TestNode>, capacity: usize, children: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            node,
            capacity,
            gate: Arc::new(Semaphore::new(capacity)),
            countdown: Arc::new(Countdown::new(children)),
            in_flight: Mutex::new(HashSet::new()),
            worst: Mutex::new(None),
        }
    }

    pub fn node(&self) -> &TestNode {
        &self.node
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal(format!("gate of {} closed", self.node.id)))
    }

    /// A guard counting this scope down once
    pub fn countdown_guard(&self) -> CountdownGuard {
        CountdownGuard(Arc::clone(&self.countdown))
    }

    pub async fn wait_all(&self) {
        self.countdown.wait().await
    }

    pub fn remaining(&self) -> usize {
        self.countdown.remaining()
    }

    /// Record a scenario as running; returns how many are in flight
    pub fn enter(&self, id: &UniqueId) -> usize {
        let mut in_flight = lock(&self.in_flight);
        in_flight.insert(id.clone());
        in_flight.len()
    }

    /// Record a scenario as done; false if it already left
    pub fn leave(&self, id: &UniqueId, verdict: Verdict) -> bool {
        let removed = lock(&self.in_flight).remove(id);
        self.record(verdict);
        removed
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Fold a scenario verdict into the class verdict
    pub fn record(&self, verdict: Verdict) {
        let mut worst = lock(&self.worst);
        *worst = Some(worst.map_or(verdict, |w| w.max(verdict)));
    }

    /// Worst recorded verdict; an empty class passes
    pub fn verdict(&self) -> Verdict {
        lock(&self.worst).unwrap_or(Verdict::Success)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::descriptor::build_class_node;
    use std::time::Duration;

    fn context(capacity: usize, children: usize) -> Arc<ClassExecutionContext> {
        let node = build_class_node(&UniqueId::engine("chutney"), "a.A", Vec::new());
        Arc::new(ClassExecutionContext::new(Arc::new(node), capacity, children))
    }

    #[tokio::test]
    async fn test_countdown_releases_at_zero() {
        let ctx = context(1, 2);
        let first = ctx.countdown_guard();
        let second = ctx.countdown_guard();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.wait_all().await })
        };

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(ctx.remaining(), 1);

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_scope_does_not_wait() {
        let ctx = context(1, 0);
        tokio::time::timeout(Duration::from_millis(100), ctx.wait_all()).await.unwrap();
        assert_eq!(ctx.verdict(), Verdict::Success);
    }

    #[tokio::test]
    async fn test_gate_capacity() {
        let ctx = context(2, 3);
        let a = ctx.acquire().await.unwrap();
        let _b = ctx.acquire().await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(20), ctx.acquire()).await.is_err());
        drop(a);
        assert!(tokio::time::timeout(Duration::from_millis(100), ctx.acquire()).await.is_ok());
    }

    #[test]
    fn test_worst_verdict_and_in_flight() {
        let ctx = context(0, 0);
        assert_eq!(ctx.capacity(), 1);

        let id = UniqueId::engine("chutney").append("scenario", "s");
        assert_eq!(ctx.enter(&id), 1);
        assert!(ctx.leave(&id, Verdict::Failure));
        assert!(!ctx.leave(&id, Verdict::Success));
        assert_eq!(ctx.in_flight(), 0);
        assert_eq!(ctx.verdict(), Verdict::Failure);
    }
}
