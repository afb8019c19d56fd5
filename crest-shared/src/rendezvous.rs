use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

/// Why a waiter left the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The round reached its capacity; every waiter of the generation left together.
    Complete,
    /// The round exceeded its timeout and was released fail-open.
    TimedOut,
    /// The barrier was cancelled because the run is stopping.
    Cancelled,
    /// Capacity is 0 or 1, so there was nothing to wait for.
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    /// Generation the caller joined.
    pub generation: u64,
    pub release: Release,
}

impl Arrival {
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.release == Release::TimedOut
    }
}

/// Consistent view of the barrier counters, read under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendezvousSnapshot {
    pub capacity: Option<usize>,
    pub arrived: usize,
    pub generation: u64,
    pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    #[error("rendezvous `{name}`: capacity must be >= 0 (got {capacity})")]
    InvalidCapacity { name: String, capacity: i64 },

    #[error("rendezvous `{name}` has no configured capacity")]
    NotConfigured { name: String },
}

/// Reusable rendezvous point for virtual-user tasks.
///
/// Tasks call [`RendezvousBarrier::arrive`] and stay suspended until `capacity` tasks
/// have arrived in the same generation, at which point all of them are released at
/// once and the barrier starts a new generation. Every round is bounded by an
/// optional timeout: a stalled round is released fail-open so a shrinking task
/// population can never hang the run.
#[derive(Debug)]
pub struct RendezvousBarrier {
    name: String,
    default_timeout: Option<Duration>,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: Option<usize>,
    arrived: usize,
    generation: u64,
    cancelled: bool,
    /// Broadcast for the waiters of the current generation.
    round: watch::Sender<Option<Release>>,
}

impl Inner {
    /// Ends the current generation and wakes all of its waiters.
    fn release(&mut self, release: Release) -> u64 {
        let generation = self.generation;
        let (next, _) = watch::channel(None);
        let round = std::mem::replace(&mut self.round, next);

        self.arrived = 0;
        self.generation = self.generation.wrapping_add(1);
        round.send_replace(Some(release));

        generation
    }
}

impl RendezvousBarrier {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Creates a barrier whose rounds time out after `timeout` unless `arrive`
    /// supplies its own limit.
    pub fn with_timeout(name: impl Into<String>, timeout: Duration) -> Self {
        Self::build(name.into(), Some(timeout))
    }

    fn build(name: String, default_timeout: Option<Duration>) -> Self {
        let (round, _) = watch::channel(None);
        Self {
            name,
            default_timeout,
            inner: Mutex::new(Inner {
                capacity: None,
                arrived: 0,
                generation: 0,
                cancelled: false,
                round,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> RendezvousSnapshot {
        let inner = self.lock();
        RendezvousSnapshot {
            capacity: inner.capacity,
            arrived: inner.arrived,
            generation: inner.generation,
            cancelled: inner.cancelled,
        }
    }

    /// Sets the number of arrivals that releases a round.
    ///
    /// The new capacity applies to the round in progress: lowering it to the number
    /// of tasks already waiting releases them immediately.
    pub fn configure(&self, capacity: i64) -> Result<(), RendezvousError> {
        let capacity =
            usize::try_from(capacity).map_err(|_| RendezvousError::InvalidCapacity {
                name: self.name.clone(),
                capacity,
            })?;

        let mut inner = self.lock();
        inner.capacity = Some(capacity);

        if inner.arrived > 0 && inner.arrived >= capacity {
            let arrived = inner.arrived;
            let generation = inner.release(Release::Complete);
            drop(inner);
            debug!(
                rendezvous = %self.name,
                generation,
                arrived,
                capacity,
                "capacity lowered below waiting tasks; round released"
            );
        }

        Ok(())
    }

    /// Registers an arrival and waits for the round to be released.
    ///
    /// `timeout` overrides the barrier's default timeout for this call.
    pub async fn arrive(&self, timeout: Option<Duration>) -> Result<Arrival, RendezvousError> {
        let (mut rx, generation) = {
            let mut inner = self.lock();

            let capacity = inner.capacity.ok_or_else(|| RendezvousError::NotConfigured {
                name: self.name.clone(),
            })?;

            if inner.cancelled {
                return Ok(Arrival {
                    generation: inner.generation,
                    release: Release::Cancelled,
                });
            }

            if capacity <= 1 {
                return Ok(Arrival {
                    generation: inner.generation,
                    release: Release::Immediate,
                });
            }

            inner.arrived += 1;
            if inner.arrived >= capacity {
                let generation = inner.release(Release::Complete);
                drop(inner);
                debug!(rendezvous = %self.name, generation, capacity, "rendezvous released");
                return Ok(Arrival {
                    generation,
                    release: Release::Complete,
                });
            }

            (inner.round.subscribe(), inner.generation)
        };

        let mut pending = PendingArrival {
            barrier: self,
            generation,
            armed: true,
        };

        let release = match timeout.or(self.default_timeout) {
            None => wait_released(&mut rx).await,
            Some(limit) => {
                let waited = tokio::time::timeout(limit, wait_released(&mut rx)).await;
                match waited {
                    Ok(release) => release,
                    Err(_) => self.expire(generation, limit, &rx),
                }
            }
        };
        pending.armed = false;

        Ok(Arrival {
            generation,
            release,
        })
    }

    /// Fail-open release of a round whose timer fired.
    fn expire(
        &self,
        generation: u64,
        limit: Duration,
        rx: &watch::Receiver<Option<Release>>,
    ) -> Release {
        let mut inner = self.lock();

        if inner.generation != generation {
            // Another waiter (or the last arrival) released the round while our timer fired.
            let released = *rx.borrow();
            return released.unwrap_or(Release::Complete);
        }

        let arrived = inner.arrived;
        let capacity = inner.capacity;
        inner.release(Release::TimedOut);
        drop(inner);

        warn!(
            rendezvous = %self.name,
            generation,
            arrived,
            capacity = ?capacity,
            timeout = ?limit,
            "rendezvous timed out; releasing waiters"
        );

        Release::TimedOut
    }

    /// Releases every waiting task and makes later arrivals return immediately.
    pub fn cancel_all(&self) {
        let mut inner = self.lock();
        let first = !inner.cancelled;
        inner.cancelled = true;

        let waiting = inner.arrived;
        if waiting > 0 {
            inner.release(Release::Cancelled);
        }
        drop(inner);

        if first {
            debug!(rendezvous = %self.name, waiting, "rendezvous cancelled");
        }
    }
}

/// Withdraws an arrival whose `arrive` future was dropped before its round ended,
/// so the abandoned slot never counts toward a release.
struct PendingArrival<'a> {
    barrier: &'a RendezvousBarrier,
    generation: u64,
    armed: bool,
}

impl Drop for PendingArrival<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.barrier.lock();
        if inner.generation == self.generation && inner.arrived > 0 {
            inner.arrived -= 1;
            let arrived = inner.arrived;
            drop(inner);
            debug!(
                rendezvous = %self.barrier.name,
                generation = self.generation,
                arrived,
                "abandoned arrival withdrawn"
            );
        }
    }
}

async fn wait_released(rx: &mut watch::Receiver<Option<Release>>) -> Release {
    let released = rx.wait_for(Option::is_some).await.map(|state| *state);
    match released {
        Ok(release) => release.unwrap_or(Release::Cancelled),
        // The sender is replaced on every release, so a closed channel still carries
        // the outcome of our generation.
        Err(_) => {
            let last = *rx.borrow();
            last.unwrap_or(Release::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    fn barrier(capacity: i64) -> Arc<RendezvousBarrier> {
        let b = RendezvousBarrier::new("test");
        if let Err(err) = b.configure(capacity) {
            panic!("configure failed: {err}");
        }
        Arc::new(b)
    }

    fn spawn_arrival(
        b: &Arc<RendezvousBarrier>,
        limit: Option<Duration>,
    ) -> JoinHandle<Result<Arrival, RendezvousError>> {
        let b = b.clone();
        tokio::spawn(async move { b.arrive(limit).await })
    }

    async fn join(handle: JoinHandle<Result<Arrival, RendezvousError>>) -> Arrival {
        match timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(Ok(arrival))) => arrival,
            Ok(Ok(Err(err))) => panic!("arrive failed: {err}"),
            Ok(Err(err)) => panic!("task panicked: {err}"),
            Err(_) => panic!("arrival never released"),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn small_capacity_never_suspends() {
        for capacity in [0, 1] {
            let b = barrier(capacity);
            for _ in 0..3 {
                match b.arrive(None).await {
                    Ok(arrival) => assert_eq!(arrival.release, Release::Immediate),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            assert_eq!(b.snapshot().arrived, 0);
        }
    }

    #[tokio::test]
    async fn arrive_without_capacity_is_rejected() {
        let b = RendezvousBarrier::new("unset");
        match b.arrive(None).await {
            Ok(_) => panic!("expected error"),
            Err(err) => assert!(matches!(err, RendezvousError::NotConfigured { .. })),
        }
    }

    #[test]
    fn negative_capacity_is_rejected() {
        let b = RendezvousBarrier::new("neg");
        match b.configure(-1) {
            Ok(()) => panic!("expected error"),
            Err(err) => assert!(matches!(
                err,
                RendezvousError::InvalidCapacity { capacity: -1, .. }
            )),
        }
        assert_eq!(b.snapshot().capacity, None);
    }

    #[tokio::test]
    async fn holds_until_last_arrival() {
        let b = barrier(3);

        let first = spawn_arrival(&b, None);
        let second = spawn_arrival(&b, None);
        settle().await;

        assert_eq!(b.snapshot().arrived, 2);
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        let third = spawn_arrival(&b, None);
        let arrivals = [join(first).await, join(second).await, join(third).await];

        for arrival in arrivals {
            assert_eq!(arrival.generation, 0);
            assert_eq!(arrival.release, Release::Complete);
        }

        let snap = b.snapshot();
        assert_eq!(snap.arrived, 0);
        assert_eq!(snap.generation, 1);
    }

    #[tokio::test]
    async fn generation_advances_once_per_round() {
        let b = barrier(2);

        for round in 0..3u64 {
            let a = spawn_arrival(&b, None);
            let c = spawn_arrival(&b, None);
            let (a, c) = (join(a).await, join(c).await);
            assert_eq!(a.generation, round);
            assert_eq!(c.generation, round);
            assert_eq!(b.snapshot().generation, round + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_releases_round_fail_open() {
        let b = barrier(5);
        let started = tokio::time::Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| spawn_arrival(&b, Some(Duration::from_secs(2))))
            .collect();

        for handle in handles {
            let arrival = join(handle).await;
            assert!(arrival.timed_out());
            assert_eq!(arrival.generation, 0);
        }
        assert!(started.elapsed() >= Duration::from_secs(2));

        let snap = b.snapshot();
        assert_eq!(snap.arrived, 0);
        assert_eq!(snap.generation, 1);

        // Fresh round after the fail-open release.
        if let Err(err) = b.configure(2) {
            panic!("configure failed: {err}");
        }
        let a = spawn_arrival(&b, None);
        let c = spawn_arrival(&b, None);
        assert_eq!(join(a).await.release, Release::Complete);
        assert_eq!(join(c).await.release, Release::Complete);
        assert_eq!(b.snapshot().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_applies_when_arrive_has_none() {
        let b = RendezvousBarrier::with_timeout("default", Duration::from_millis(500));
        if let Err(err) = b.configure(3) {
            panic!("configure failed: {err}");
        }
        let b = Arc::new(b);

        let arrival = join(spawn_arrival(&b, None)).await;
        assert_eq!(arrival.release, Release::TimedOut);
    }

    #[tokio::test]
    async fn lowering_capacity_releases_waiting_round() {
        let b = barrier(4);

        let first = spawn_arrival(&b, None);
        let second = spawn_arrival(&b, None);
        settle().await;
        assert_eq!(b.snapshot().arrived, 2);

        if let Err(err) = b.configure(2) {
            panic!("configure failed: {err}");
        }

        assert_eq!(join(first).await.release, Release::Complete);
        assert_eq!(join(second).await.release, Release::Complete);
        assert_eq!(b.snapshot().generation, 1);
    }

    #[tokio::test]
    async fn raising_capacity_keeps_round_waiting() {
        let b = barrier(2);

        let first = spawn_arrival(&b, None);
        settle().await;

        if let Err(err) = b.configure(3) {
            panic!("configure failed: {err}");
        }

        let second = spawn_arrival(&b, None);
        settle().await;
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        let third = spawn_arrival(&b, None);
        for handle in [first, second, third] {
            assert_eq!(join(handle).await.release, Release::Complete);
        }
    }

    #[tokio::test]
    async fn cancel_all_releases_waiters_and_short_circuits() {
        let b = barrier(10);

        let handles: Vec<_> = (0..4).map(|_| spawn_arrival(&b, None)).collect();
        settle().await;
        assert_eq!(b.snapshot().arrived, 4);

        b.cancel_all();
        b.cancel_all();

        for handle in handles {
            assert_eq!(join(handle).await.release, Release::Cancelled);
        }

        match b.arrive(None).await {
            Ok(arrival) => assert_eq!(arrival.release, Release::Cancelled),
            Err(err) => panic!("unexpected error: {err}"),
        }

        let snap = b.snapshot();
        assert!(snap.cancelled);
        assert_eq!(snap.arrived, 0);
        assert_eq!(snap.generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_arrival_does_not_count_toward_release() {
        let b = barrier(3);

        let abandoned = timeout(Duration::from_millis(10), b.arrive(None)).await;
        assert!(abandoned.is_err(), "arrival should still be parked");
        assert_eq!(b.snapshot().arrived, 0);

        let first = spawn_arrival(&b, None);
        let second = spawn_arrival(&b, None);
        settle().await;
        assert_eq!(b.snapshot().arrived, 2);
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        let third = spawn_arrival(&b, None);
        for handle in [first, second, third] {
            let arrival = join(handle).await;
            assert_eq!(arrival.release, Release::Complete);
            assert_eq!(arrival.generation, 0);
        }
        assert_eq!(b.snapshot().generation, 1);
    }

    #[tokio::test]
    async fn aborted_waiter_leaves_the_round() {
        let b = barrier(2);

        let parked = spawn_arrival(&b, None);
        settle().await;
        assert_eq!(b.snapshot().arrived, 1);

        parked.abort();
        match parked.await {
            Err(err) => assert!(err.is_cancelled(), "{err}"),
            Ok(res) => panic!("expected cancellation, got {res:?}"),
        }
        let snap = b.snapshot();
        assert_eq!(snap.arrived, 0);
        assert_eq!(snap.generation, 0);

        let first = spawn_arrival(&b, None);
        settle().await;
        assert!(!first.is_finished());

        let second = spawn_arrival(&b, None);
        assert_eq!(join(first).await.release, Release::Complete);
        assert_eq!(join(second).await.release, Release::Complete);
    }

    #[tokio::test]
    async fn released_arrivals_do_not_touch_the_next_round() {
        let b = barrier(2);

        let a = spawn_arrival(&b, None);
        let c = spawn_arrival(&b, None);
        join(a).await;
        join(c).await;

        let next = spawn_arrival(&b, None);
        settle().await;
        assert_eq!(b.snapshot().arrived, 1);
        assert!(!next.is_finished());
        next.abort();
    }
}
