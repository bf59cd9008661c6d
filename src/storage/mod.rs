//! Durable storage for feed baselines.
//!
//! Baselines are written as one JSON document per store path and replaced
//! atomically on every save. See [`StateStore`].

mod snapshot;

pub use snapshot::{PersistedSnapshot, ReferencePost, StateStore, StoreError, SNAPSHOT_VERSION};
