//! Request coalescing.
//!
//! [`CoalescionService`] merges concurrent calls that share a key into a single run of the
//! underlying operation and gives every caller its own copy of the result, made by a
//! [`Replicate`] strategy. [`Body`] is a single-read byte stream with a matching replicator,
//! [`RequestKey`] builds keys from a method and resource locator.

mod body;
mod config;
mod error;
mod key;
mod replicate;
mod service;
mod stats;

pub use body::{Body, BodyReplicator};
pub use config::CoalescionServiceConfig;
pub use error::{Error, ReplicateError};
pub use key::RequestKey;
pub use replicate::{CloneReplicator, Replicate};
pub use service::CoalescionService;
pub use stats::CoalescionStats;
