//! Work items (LRPs and Tasks), their identity keys, and the `Work` batch.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::null_as_empty;
use crate::resources::Resource;

/// Identity of one LRP instance slot: process guid, index, and domain.
///
/// Issued and validated by the upstream data store; the cell treats it as
/// opaque apart from [`ActualLrpKey::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ActualLrpKey {
    pub process_guid: String,
    pub index: i32,
    pub domain: String,
}

impl ActualLrpKey {
    pub fn new(process_guid: impl Into<String>, index: i32, domain: impl Into<String>) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
            domain: domain.into(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.process_guid.is_empty() {
            return Err(ModelError::InvalidKey("process_guid".to_string()));
        }
        if self.domain.is_empty() {
            return Err(ModelError::InvalidKey("domain".to_string()));
        }
        if self.index < 0 {
            return Err(ModelError::InvalidKey("index".to_string()));
        }
        Ok(())
    }
}

/// Identity of the running container backing an LRP instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ActualLrpInstanceKey {
    pub instance_guid: String,
    pub cell_id: String,
}

impl ActualLrpInstanceKey {
    pub fn new(instance_guid: impl Into<String>, cell_id: impl Into<String>) -> Self {
        Self {
            instance_guid: instance_guid.into(),
            cell_id: cell_id.into(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.instance_guid.is_empty() {
            return Err(ModelError::InvalidKey("instance_guid".to_string()));
        }
        if self.cell_id.is_empty() {
            return Err(ModelError::InvalidKey("cell_id".to_string()));
        }
        Ok(())
    }
}

/// What a work item requires from the cell it lands on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConstraint {
    #[serde(rename = "PlacementTags", deserialize_with = "null_as_empty")]
    pub placement_tags: Vec<String>,
    #[serde(rename = "VolumeDrivers", deserialize_with = "null_as_empty")]
    pub volume_drivers: Vec<String>,
    #[serde(rename = "RootFs")]
    pub root_fs: String,
}

impl PlacementConstraint {
    pub fn new(root_fs: impl Into<String>, placement_tags: Vec<String>, volume_drivers: Vec<String>) -> Self {
        Self {
            placement_tags,
            volume_drivers,
            root_fs: root_fs.into(),
        }
    }

    /// A constraint must name a root filesystem.
    pub fn valid(&self) -> bool {
        !self.root_fs.is_empty()
    }
}

/// Common view over LRPs and Tasks used when matching and debiting.
pub trait WorkItem {
    fn identifier(&self) -> String;
    fn resource(&self) -> &Resource;
    fn placement_constraint(&self) -> &PlacementConstraint;
}

/// One LRP instance to start.
///
/// Encodes as a single flat JSON object carrying the key, constraint, and
/// resource fields side by side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lrp {
    #[serde(flatten)]
    pub key: ActualLrpKey,
    #[serde(flatten)]
    pub placement_constraint: PlacementConstraint,
    #[serde(flatten)]
    pub resource: Resource,
}

impl Lrp {
    pub fn new(key: ActualLrpKey, resource: Resource, placement_constraint: PlacementConstraint) -> Self {
        Self {
            key,
            placement_constraint,
            resource,
        }
    }
}

impl WorkItem for Lrp {
    /// `"{process_guid}.{index}"`.
    fn identifier(&self) -> String {
        format!("{}.{}", self.key.process_guid, self.key.index)
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn placement_constraint(&self) -> &PlacementConstraint {
        &self.placement_constraint
    }
}

/// One task to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "TaskGuid", default)]
    pub task_guid: String,
    #[serde(rename = "Domain", default)]
    pub domain: String,
    #[serde(flatten)]
    pub placement_constraint: PlacementConstraint,
    #[serde(flatten)]
    pub resource: Resource,
}

impl Task {
    pub fn new(
        task_guid: impl Into<String>,
        domain: impl Into<String>,
        resource: Resource,
        placement_constraint: PlacementConstraint,
    ) -> Self {
        Self {
            task_guid: task_guid.into(),
            domain: domain.into(),
            placement_constraint,
            resource,
        }
    }
}

impl WorkItem for Task {
    fn identifier(&self) -> String {
        self.task_guid.clone()
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn placement_constraint(&self) -> &PlacementConstraint {
        &self.placement_constraint
    }
}

/// A batch of LRPs and Tasks.
///
/// The same shape carries two meanings on the wire: as a `Perform` request
/// it is the work to start, and as the `Perform` response it is only the
/// subset of that work which failed to start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    #[serde(rename = "LRPs", default, deserialize_with = "null_as_empty")]
    pub lrps: Vec<Lrp>,
    #[serde(rename = "Tasks", default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<Task>,
}

impl Work {
    pub fn is_empty(&self) -> bool {
        self.lrps.is_empty() && self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lrps.len() + self.tasks.len()
    }
}
