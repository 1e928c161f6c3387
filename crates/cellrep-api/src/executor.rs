//! The container runtime seam and an in-memory simulation of it.
//!
//! The cell representative never talks to a container runtime directly.
//! It goes through [`Executor`], which a real deployment backs with its
//! runtime client and tests and simulations back with [`SimExecutor`].

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cellrep_models::{Resources, Tags};

use crate::error::{RepError, RepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Reserved,
    Initializing,
    Created,
    Running,
    Completed,
}

impl ContainerState {
    /// Reserved, initializing, and created containers still count against
    /// the cell's starting-container penalty.
    pub fn is_starting(self) -> bool {
        matches!(
            self,
            ContainerState::Reserved | ContainerState::Initializing | ContainerState::Created
        )
    }
}

/// What a container is allocated with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResource {
    pub memory_mb: i32,
    pub disk_mb: i32,
    pub root_fs_path: String,
}

impl ContainerResource {
    pub fn new(memory_mb: i32, disk_mb: i32, root_fs_path: impl Into<String>) -> Self {
        Self {
            memory_mb,
            disk_mb,
            root_fs_path: root_fs_path.into(),
        }
    }

    pub fn valid(&self) -> bool {
        self.memory_mb >= 0 && self.disk_mb >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub guid: String,
    pub state: ContainerState,
    #[serde(flatten)]
    pub resource: ContainerResource,
    /// `None` when the runtime lost or never recorded the tags.
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub guid: String,
    pub resource: ContainerResource,
    pub tags: Tags,
}

impl AllocationRequest {
    pub fn new(guid: impl Into<String>, resource: ContainerResource, tags: Tags) -> Self {
        Self {
            guid: guid.into(),
            resource,
            tags,
        }
    }
}

/// A request the executor refused, with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationFailure {
    pub request: AllocationRequest,
    pub message: String,
}

/// Container runtime operations the cell representative needs.
pub trait Executor: Send + Sync {
    fn healthy(&self) -> bool;

    fn list_containers(&self) -> RepResult<Vec<Container>>;

    fn total_resources(&self) -> RepResult<Resources>;

    fn remaining_resources(&self) -> RepResult<Resources>;

    fn volume_drivers(&self) -> RepResult<Vec<String>>;

    /// Reserve containers. Requests that cannot be honoured come back as
    /// failures; an `Err` means nothing was attempted.
    fn allocate_containers(&self, requests: Vec<AllocationRequest>) -> RepResult<Vec<AllocationFailure>>;

    fn stop_container(&self, guid: &str) -> RepResult<()>;

    fn delete_container(&self, guid: &str) -> RepResult<()>;

    /// Drop every container. Only meaningful for simulations.
    fn reset(&self) -> RepResult<()>;
}

const GUID_NOT_AVAILABLE: &str = "container guid not available";
const INSUFFICIENT_RESOURCES: &str = "insufficient resources to allocate container";
const INVALID_RESOURCE: &str = "invalid container resource";

#[derive(Debug)]
struct SimInner {
    healthy: bool,
    containers: BTreeMap<String, Container>,
}

/// Executor that keeps containers in memory and debits a fixed capacity.
#[derive(Debug)]
pub struct SimExecutor {
    capacity: Resources,
    volume_drivers: Vec<String>,
    inner: Mutex<SimInner>,
}

impl SimExecutor {
    pub fn new(capacity: Resources, volume_drivers: Vec<String>) -> Self {
        Self {
            capacity,
            volume_drivers,
            inner: Mutex::new(SimInner {
                healthy: true,
                containers: BTreeMap::new(),
            }),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }

    /// Move a container to `state`, as a runtime would while it boots.
    pub fn transition(&self, guid: &str, state: ContainerState) -> RepResult<()> {
        let mut inner = self.lock();
        let container = inner
            .containers
            .get_mut(guid)
            .ok_or_else(|| RepError::ContainerNotFound(guid.to_string()))?;
        container.state = state;
        Ok(())
    }

    /// Insert a container as-is, bypassing allocation checks.
    pub fn insert_container(&self, container: Container) {
        self.lock().containers.insert(container.guid.clone(), container);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remaining(&self, containers: &BTreeMap<String, Container>) -> Resources {
        let mut remaining = self.capacity;
        for container in containers.values() {
            remaining.memory_mb = remaining.memory_mb.saturating_sub(container.resource.memory_mb);
            remaining.disk_mb = remaining.disk_mb.saturating_sub(container.resource.disk_mb);
            remaining.containers = remaining.containers.saturating_sub(1);
        }
        remaining
    }
}

impl Executor for SimExecutor {
    fn healthy(&self) -> bool {
        self.lock().healthy
    }

    fn list_containers(&self) -> RepResult<Vec<Container>> {
        Ok(self.lock().containers.values().cloned().collect())
    }

    fn total_resources(&self) -> RepResult<Resources> {
        Ok(self.capacity)
    }

    fn remaining_resources(&self) -> RepResult<Resources> {
        let inner = self.lock();
        Ok(self.remaining(&inner.containers))
    }

    fn volume_drivers(&self) -> RepResult<Vec<String>> {
        Ok(self.volume_drivers.clone())
    }

    fn allocate_containers(&self, requests: Vec<AllocationRequest>) -> RepResult<Vec<AllocationFailure>> {
        let mut inner = self.lock();
        let mut failures = Vec::new();

        for request in requests {
            if inner.containers.contains_key(&request.guid) {
                failures.push(AllocationFailure {
                    request,
                    message: GUID_NOT_AVAILABLE.to_string(),
                });
                continue;
            }

            if !request.resource.valid() {
                failures.push(AllocationFailure {
                    request,
                    message: INVALID_RESOURCE.to_string(),
                });
                continue;
            }

            let remaining = self.remaining(&inner.containers);
            if remaining.containers < 1
                || remaining.memory_mb < request.resource.memory_mb
                || remaining.disk_mb < request.resource.disk_mb
            {
                failures.push(AllocationFailure {
                    request,
                    message: INSUFFICIENT_RESOURCES.to_string(),
                });
                continue;
            }

            debug!(guid = %request.guid, memory_mb = request.resource.memory_mb, "reserved container");
            inner.containers.insert(
                request.guid.clone(),
                Container {
                    guid: request.guid,
                    state: ContainerState::Reserved,
                    resource: request.resource,
                    tags: Some(request.tags),
                },
            );
        }

        Ok(failures)
    }

    fn stop_container(&self, guid: &str) -> RepResult<()> {
        self.transition(guid, ContainerState::Completed)
    }

    fn delete_container(&self, guid: &str) -> RepResult<()> {
        self.lock()
            .containers
            .remove(guid)
            .map(|_| ())
            .ok_or_else(|| RepError::ContainerNotFound(guid.to_string()))
    }

    fn reset(&self) -> RepResult<()> {
        let mut inner = self.lock();
        info!(dropped = inner.containers.len(), "reset simulated executor");
        inner.containers.clear();
        inner.healthy = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(guid: &str, memory_mb: i32) -> AllocationRequest {
        AllocationRequest::new(guid, ContainerResource::new(memory_mb, 10, "/rootfs"), Tags::new())
    }

    #[test]
    fn allocation_debits_capacity() {
        let executor = SimExecutor::new(Resources::new(100, 100, 3), vec![]);
        let failures = executor.allocate_containers(vec![request("a", 60)]).unwrap();
        assert!(failures.is_empty());
        assert_eq!(executor.remaining_resources().unwrap(), Resources::new(40, 90, 2));
        assert_eq!(executor.total_resources().unwrap(), Resources::new(100, 100, 3));

        let containers = executor.list_containers().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].state, ContainerState::Reserved);
    }

    #[test]
    fn allocation_reports_failures_per_request() {
        let executor = SimExecutor::new(Resources::new(100, 100, 3), vec![]);
        let failures = executor
            .allocate_containers(vec![request("a", 60), request("b", 60), request("a", 1)])
            .unwrap();

        let messages: Vec<_> = failures.iter().map(|f| (f.request.guid.as_str(), f.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![("b", INSUFFICIENT_RESOURCES), ("a", GUID_NOT_AVAILABLE)]
        );
    }

    #[test]
    fn negative_requests_are_refused() {
        let executor = SimExecutor::new(Resources::new(100, 100, 3), vec![]);
        let failures = executor
            .allocate_containers(vec![
                request("neg", -500),
                AllocationRequest::new("min", ContainerResource::new(i32::MIN, i32::MIN, ""), Tags::new()),
            ])
            .unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.message == INVALID_RESOURCE));
        assert_eq!(executor.remaining_resources().unwrap(), Resources::new(100, 100, 3));
    }

    #[test]
    fn remaining_never_overflows() {
        let executor = SimExecutor::new(Resources::new(100, 100, 3), vec![]);
        executor.insert_container(Container {
            guid: "bad".to_string(),
            state: ContainerState::Running,
            resource: ContainerResource::new(i32::MIN, i32::MAX, ""),
            tags: None,
        });
        executor.insert_container(Container {
            guid: "worse".to_string(),
            state: ContainerState::Running,
            resource: ContainerResource::new(i32::MIN, i32::MAX, ""),
            tags: None,
        });
        let remaining = executor.remaining_resources().unwrap();
        assert_eq!(remaining.memory_mb, i32::MAX);
        assert_eq!(remaining.disk_mb, i32::MIN);
        assert_eq!(remaining.containers, 1);
    }

    #[test]
    fn stop_delete_and_reset() {
        let executor = SimExecutor::new(Resources::new(100, 100, 3), vec!["nfs".to_string()]);
        executor.allocate_containers(vec![request("a", 1), request("b", 1)]).unwrap();

        executor.stop_container("a").unwrap();
        assert_eq!(executor.list_containers().unwrap()[0].state, ContainerState::Completed);

        executor.delete_container("b").unwrap();
        assert!(matches!(executor.delete_container("b"), Err(RepError::ContainerNotFound(_))));
        assert!(matches!(executor.stop_container("zzz"), Err(RepError::ContainerNotFound(_))));

        executor.set_healthy(false);
        executor.reset().unwrap();
        assert!(executor.healthy());
        assert!(executor.list_containers().unwrap().is_empty());
        assert_eq!(executor.volume_drivers().unwrap(), vec!["nfs".to_string()]);
    }

    #[test]
    fn starting_states() {
        assert!(ContainerState::Reserved.is_starting());
        assert!(ContainerState::Initializing.is_starting());
        assert!(ContainerState::Created.is_starting());
        assert!(!ContainerState::Running.is_starting());
        assert!(!ContainerState::Completed.is_starting());
    }
}
