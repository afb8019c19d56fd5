use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crest_shared::RendezvousGroups;
use tokio::sync::Notify;
use tracing::info;

/// Run-wide stop signal.
///
/// Stopping ends the shape clock and releases every barrier group so no task
/// stays parked in a rendezvous after the run is over.
#[derive(Debug)]
pub struct RunControl {
    stopped: AtomicBool,
    notify: Notify,
    groups: Arc<RendezvousGroups>,
}

impl RunControl {
    pub fn new(groups: Arc<RendezvousGroups>) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
            groups,
        }
    }

    pub fn groups(&self) -> &Arc<RendezvousGroups> {
        &self.groups
    }

    /// Returns `true` for the call that actually stopped the run.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        info!("run stop requested");
        self.groups.cancel_all();
        self.notify.notify_waiters();
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Resolves once [`RunControl::stop`] has been called.
    pub async fn stopped(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new(Arc::new(RendezvousGroups::default()))
    }
}
