use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::rendezvous::{Arrival, RendezvousBarrier, RendezvousError};

/// Named rendezvous barriers for one test run.
///
/// A run owns one registry and hands it to every task explicitly; dropping the
/// registry at the end of the run drops every barrier with it.
#[derive(Debug, Default)]
pub struct RendezvousGroups {
    groups: DashMap<String, Arc<RendezvousBarrier>>,
    default_timeout: Option<Duration>,
    cancelled: AtomicBool,
}

impl RendezvousGroups {
    /// Registry whose barriers time out after `timeout` by default.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Returns the barrier registered under `name`, creating an unconfigured one if needed.
    pub fn group(&self, name: &str) -> Arc<RendezvousBarrier> {
        if let Some(existing) = self.groups.get(name) {
            return existing.clone();
        }

        let barrier = self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(match self.default_timeout {
                    Some(timeout) => RendezvousBarrier::with_timeout(name, timeout),
                    None => RendezvousBarrier::new(name),
                })
            })
            .clone();

        // A group created after the run was stopped must not block anyone.
        if self.cancelled.load(Ordering::Acquire) {
            barrier.cancel_all();
        }

        barrier
    }

    pub fn configure(
        &self,
        name: &str,
        capacity: i64,
    ) -> Result<Arc<RendezvousBarrier>, RendezvousError> {
        let barrier = self.group(name);
        barrier.configure(capacity)?;
        Ok(barrier)
    }

    pub async fn arrive(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Arrival, RendezvousError> {
        let barrier = self.group(name);
        barrier.arrive(timeout).await
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Cancels every barrier in the registry. Safe to call more than once.
    pub fn cancel_all(&self) {
        self.cancelled.store(true, Ordering::Release);

        let barriers: Vec<Arc<RendezvousBarrier>> =
            self.groups.iter().map(|e| e.value().clone()).collect();
        for barrier in barriers {
            barrier.cancel_all();
        }
    }
}
