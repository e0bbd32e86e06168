//! Live subscriptions and best-effort broadcast of incoming records.
//!
//! This module provides in-process fan-out of validated records:
//! - A registry mapping interest keys (a record type, or the wildcard) to
//!   the listeners registered under them
//! - A dispatch worker that pushes each record to every matching listener,
//!   waiting a bounded time per listener before dropping
//! - Subscription handles whose cancellation removes them from the registry
//!   asynchronously
//!
//! Delivery is at-most-once. A listener that is not connected never sees
//! records it missed, and a listener whose queue stays full loses records.
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new(SubscriptionConfig::default())?;
//!
//! // Listen for clicks only
//! let handle = manager.subscribe(["click"]);
//!
//! manager.publish(Record::new("1", "click", 1000))?;
//!
//! while let Ok(record) = handle.recv() {
//!     println!("Got record: {:?}", record);
//! }
//! ```

mod broadcast;
mod manager;
mod registry;
mod types;

pub use broadcast::{BroadcastStats, Broadcaster};
pub use manager::SubscriptionManager;
pub use registry::{Listeners, SubscriptionRegistry};
pub use types::{
    interest_keys, InterestKey, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionState,
};
