mod groups;
mod rendezvous;

pub use groups::RendezvousGroups;
pub use rendezvous::{Arrival, Release, RendezvousBarrier, RendezvousError, RendezvousSnapshot};
