//! The per-round snapshot of a cell and the bid score derived from it.
//!
//! A `CellState` is fetched once per auction round and then owned by the
//! single worker running that round. `add_lrp`/`add_task` mutate it
//! speculatively so later placements in the same round see the earlier
//! ones; the snapshot is discarded when the round ends.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cellrep_models::{Lrp, Resource, Resources, RootFsProviders, Task, null_as_empty};

use crate::matcher;

/// Capacity, workload, and capabilities a cell reports to the auctioneer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    #[serde(rename = "RootFSProviders", default)]
    pub root_fs_providers: RootFsProviders,
    #[serde(rename = "AvailableResources", default)]
    pub available_resources: Resources,
    #[serde(rename = "TotalResources", default)]
    pub total_resources: Resources,
    #[serde(rename = "LRPs", default, deserialize_with = "null_as_empty")]
    pub lrps: Vec<Lrp>,
    #[serde(rename = "Tasks", default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<Task>,
    #[serde(rename = "StartingContainerCount", default)]
    pub starting_container_count: i32,
    #[serde(rename = "Zone", default)]
    pub zone: String,
    #[serde(rename = "Evacuating", default)]
    pub evacuating: bool,
    #[serde(rename = "VolumeDrivers", default, deserialize_with = "null_as_empty")]
    pub volume_drivers: Vec<String>,
    #[serde(rename = "PlacementTags", default, deserialize_with = "null_as_empty")]
    pub placement_tags: Vec<String>,
    #[serde(rename = "OptionalPlacementTags", default, deserialize_with = "null_as_empty")]
    pub optional_placement_tags: Vec<String>,
}

/// One or more resource dimensions that cannot hold a requested item.
///
/// Dimension names are kept sorted so the message is deterministic.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq)]
#[error("{}", describe(.problems))]
pub struct InsufficientResourcesError {
    pub problems: BTreeSet<&'static str>,
}

fn describe(problems: &BTreeSet<&'static str>) -> String {
    if problems.is_empty() {
        return "insufficient resources".to_string();
    }
    let names: Vec<&str> = problems.iter().copied().collect();
    format!("insufficient resources: {}", names.join(", "))
}

impl CellState {
    pub fn new(root_fs_providers: RootFsProviders, available: Resources, total: Resources) -> Self {
        Self {
            root_fs_providers,
            available_resources: available,
            total_resources: total,
            ..Self::default()
        }
    }

    /// Record a speculative LRP placement: debit capacity, count one more
    /// starting container, and keep a copy of the LRP. Not idempotent.
    pub fn add_lrp(&mut self, lrp: &Lrp) {
        self.available_resources.subtract(&lrp.resource);
        self.starting_container_count += 1;
        self.lrps.push(lrp.clone());
    }

    /// Task counterpart of [`CellState::add_lrp`].
    pub fn add_task(&mut self, task: &Task) {
        self.available_resources.subtract(&task.resource);
        self.starting_container_count += 1;
        self.tasks.push(task.clone());
    }

    /// Check every dimension and report all the ones that fall short.
    pub fn resource_match(&self, res: &Resource) -> Result<(), InsufficientResourcesError> {
        let mut problems = BTreeSet::new();

        if self.available_resources.disk_mb < res.disk_mb {
            problems.insert("disk");
        }
        if self.available_resources.memory_mb < res.memory_mb {
            problems.insert("memory");
        }
        if self.available_resources.containers < 1 {
            problems.insert("containers");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(InsufficientResourcesError { problems })
        }
    }

    /// Bid score for placing `res` here; lower is a better fit.
    ///
    /// Utilization after a hypothetical placement plus a penalty per
    /// container the cell is already starting. The snapshot itself is not
    /// modified.
    pub fn compute_score(&self, res: &Resource, starting_container_weight: f64) -> f64 {
        let mut remaining = self.available_resources;
        remaining.subtract(res);
        let starting_container_score = f64::from(self.starting_container_count) * starting_container_weight;
        remaining.compute_score(&self.total_resources) + starting_container_score
    }

    pub fn match_root_fs(&self, root_fs: &str) -> bool {
        matcher::match_root_fs(&self.root_fs_providers, root_fs)
    }

    pub fn match_volume_drivers(&self, volume_drivers: &[String]) -> bool {
        matcher::match_volume_drivers(volume_drivers, &self.volume_drivers)
    }

    pub fn match_placement_tags(&self, desired: &[String]) -> bool {
        matcher::match_placement_tags(desired, &self.placement_tags, &self.optional_placement_tags)
    }
}
