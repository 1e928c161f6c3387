//! cellrep-models: value types exchanged between an auctioneer and a cell.
//!
//! Everything here is plain data: the resource ledger used to score cells,
//! the LRP/Task work items and their identity keys, the root filesystem
//! capability lookup, and the helpers that rebuild work items from
//! container tags.
//!
//! # Wire format
//!
//! All types serialize to JSON with the Go-style field names existing
//! peers use (`MemoryMB`, `RootFs`, `LRPs`, ...). LRP and Task records are
//! flat objects: the identity key, placement constraint and resource are
//! three named fields in Rust but are merged into one JSON object.

pub mod convert;
pub mod error;
pub mod resources;
pub mod rootfs;
pub mod work;

pub use convert::{Tags, actual_lrp_key_from_tags, lrp_container_guid};
pub use error::{ModelError, ModelResult};
pub use resources::{Resource, Resources};
pub use rootfs::{PRELOADED_ROOTFS_SCHEME, RootFsProvider, RootFsProviders, StackPathMap};
pub use work::{ActualLrpInstanceKey, ActualLrpKey, Lrp, PlacementConstraint, Task, Work, WorkItem};

/// Deserialize a list that a peer may encode as JSON `null`.
#[doc(hidden)]
pub fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let value: Option<Vec<T>> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
