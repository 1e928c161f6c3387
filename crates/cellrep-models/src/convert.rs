//! Conversions between container runtime metadata and work items.
//!
//! Containers started for auction work carry string tags identifying the
//! LRP or Task they run. These helpers name those containers and rebuild
//! keys from their tags.

use std::collections::HashMap;

use crate::error::{ModelError, ModelResult};
use crate::work::ActualLrpKey;

/// Container tags as stored by the runtime.
pub type Tags = HashMap<String, String>;

pub const LIFECYCLE_TAG: &str = "lifecycle";
pub const DOMAIN_TAG: &str = "domain";

pub const TASK_LIFECYCLE: &str = "task";
pub const LRP_LIFECYCLE: &str = "lrp";

pub const PROCESS_GUID_TAG: &str = "process-guid";
pub const INSTANCE_GUID_TAG: &str = "instance-guid";
pub const PROCESS_INDEX_TAG: &str = "process-index";

/// Rebuild the LRP key of a container from its tags.
pub fn actual_lrp_key_from_tags(tags: Option<&Tags>) -> ModelResult<ActualLrpKey> {
    let tags = tags.ok_or(ModelError::ContainerMissingTags)?;

    let index = tag(tags, PROCESS_INDEX_TAG)
        .parse::<i32>()
        .map_err(|_| ModelError::InvalidProcessIndex)?;

    let key = ActualLrpKey::new(tag(tags, PROCESS_GUID_TAG), index, tag(tags, DOMAIN_TAG));
    key.validate()?;
    Ok(key)
}

/// Guid of the container running an LRP instance.
pub fn lrp_container_guid(process_guid: &str, instance_guid: &str) -> String {
    format!("{process_guid}-{instance_guid}")
}

fn tag<'a>(tags: &'a Tags, name: &str) -> &'a str {
    tags.get(name).map(String::as_str).unwrap_or_default()
}
