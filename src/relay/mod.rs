//! Message relaying: correlation bookkeeping, the blocked-sender set,
//! commands, and the per-update router that ties them together.

pub mod blacklist;
pub mod commands;
pub mod router;
pub mod store;

pub use blacklist::Blacklist;
pub use router::{RelayRouter, RelaySettings};
pub use store::{CorrelationStore, MessageOrigin};
