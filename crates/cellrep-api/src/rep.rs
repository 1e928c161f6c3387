//! The cell representative: answers auction state queries and turns won
//! work into container allocations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use cellrep_models::convert::{
    DOMAIN_TAG, INSTANCE_GUID_TAG, LIFECYCLE_TAG, LRP_LIFECYCLE, PROCESS_GUID_TAG, PROCESS_INDEX_TAG,
    TASK_LIFECYCLE,
};
use cellrep_models::{
    Lrp, PlacementConstraint, Resource, RootFsProviders, StackPathMap, Tags, Task, Work,
    actual_lrp_key_from_tags, lrp_container_guid,
};
use cellrep_placement::CellState;

use crate::error::{RepError, RepResult};
use crate::executor::{AllocationRequest, ContainerResource, Executor};

/// Shared evacuation switch. Once set, the cell refuses new work.
#[derive(Debug, Clone, Default)]
pub struct EvacuationFlag(Arc<AtomicBool>);

impl EvacuationFlag {
    pub fn evacuating(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_evacuating(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Static facts about the cell, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct CellSettings {
    pub cell_id: String,
    pub zone: String,
    pub stack_path_map: StackPathMap,
    /// URL schemes for which any rootfs is accepted (e.g. `docker`).
    pub arbitrary_root_fs_schemes: Vec<String>,
    pub placement_tags: Vec<String>,
    pub optional_placement_tags: Vec<String>,
}

pub struct AuctionCellRep {
    settings: CellSettings,
    root_fs_providers: RootFsProviders,
    executor: Arc<dyn Executor>,
    evacuation: EvacuationFlag,
    generate_instance_guid: fn() -> String,
}

fn new_instance_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl AuctionCellRep {
    pub fn new(settings: CellSettings, executor: Arc<dyn Executor>, evacuation: EvacuationFlag) -> Self {
        let root_fs_providers =
            RootFsProviders::new(&settings.stack_path_map, &settings.arbitrary_root_fs_schemes);
        Self {
            settings,
            root_fs_providers,
            executor,
            evacuation,
            generate_instance_guid: new_instance_guid,
        }
    }

    /// Replace the instance guid source, for deterministic tests.
    pub fn with_instance_guids(mut self, generate: fn() -> String) -> Self {
        self.generate_instance_guid = generate;
        self
    }

    pub fn cell_id(&self) -> &str {
        &self.settings.cell_id
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn evacuation(&self) -> &EvacuationFlag {
        &self.evacuation
    }

    /// Snapshot the cell for an auction round.
    ///
    /// LRPs and tasks are rebuilt from container tags without their rootfs
    /// or placement constraints; the auctioneer only needs their footprint.
    pub fn state(&self) -> RepResult<CellState> {
        if !self.executor.healthy() {
            error!(cell = %self.settings.cell_id, "cell failed executor health check");
            return Err(RepError::CellUnhealthy);
        }

        let containers = self.executor.list_containers()?;
        let total = self.executor.total_resources()?;
        let available = self.executor.remaining_resources()?;
        let volume_drivers = self.executor.volume_drivers()?;

        let mut lrps = Vec::new();
        let mut tasks = Vec::new();
        let mut starting_container_count = 0;

        for container in &containers {
            if container.state.is_starting() {
                starting_container_count += 1;
            }

            let Some(tags) = container.tags.as_ref() else {
                warn!(guid = %container.guid, "container has no tags");
                continue;
            };

            let resource = Resource::new(container.resource.memory_mb, container.resource.disk_mb, 0);
            match tags.get(LIFECYCLE_TAG).map(String::as_str) {
                Some(LRP_LIFECYCLE) => match actual_lrp_key_from_tags(Some(tags)) {
                    Ok(key) => lrps.push(Lrp::new(key, resource, PlacementConstraint::default())),
                    Err(e) => warn!(guid = %container.guid, error = %e, "failed to extract lrp key"),
                },
                Some(TASK_LIFECYCLE) => {
                    let domain = tags.get(DOMAIN_TAG).cloned().unwrap_or_default();
                    tasks.push(Task::new(
                        container.guid.clone(),
                        domain,
                        resource,
                        PlacementConstraint::default(),
                    ));
                }
                _ => {}
            }
        }

        let state = CellState {
            root_fs_providers: self.root_fs_providers.clone(),
            available_resources: available,
            total_resources: total,
            lrps,
            tasks,
            starting_container_count,
            zone: self.settings.zone.clone(),
            evacuating: self.evacuation.evacuating(),
            volume_drivers,
            placement_tags: self.settings.placement_tags.clone(),
            optional_placement_tags: self.settings.optional_placement_tags.clone(),
        };

        info!(
            available = ?state.available_resources,
            total = ?state.total_resources,
            lrps = state.lrps.len(),
            zone = %state.zone,
            evacuating = state.evacuating,
            "provided cell state"
        );
        Ok(state)
    }

    /// Start the given work and return the part that could not be started.
    pub fn perform(&self, work: Work) -> RepResult<Work> {
        if self.evacuation.evacuating() {
            info!(items = work.len(), "evacuating, rejecting all work");
            return Ok(work);
        }

        let mut failed = Work::default();

        if !work.lrps.is_empty() {
            let (requests, by_guid, untranslated) = self.lrp_requests(&work.lrps);
            if !untranslated.is_empty() {
                info!(count = untranslated.len(), "failed to translate lrps to containers");
                failed.lrps = untranslated;
            }

            match self.executor.allocate_containers(requests) {
                Ok(failures) => {
                    for failure in failures {
                        error!(guid = %failure.request.guid, reason = %failure.message, "lrp container allocation failed");
                        if let Some(lrp) = by_guid.get(&failure.request.guid) {
                            failed.lrps.push((*lrp).clone());
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "lrp container allocation request failed");
                    failed.lrps = work.lrps.clone();
                }
            }
        }

        if !work.tasks.is_empty() {
            let (requests, by_guid, untranslated) = self.task_requests(&work.tasks);
            if !untranslated.is_empty() {
                info!(count = untranslated.len(), "failed to translate tasks to containers");
                failed.tasks = untranslated;
            }

            match self.executor.allocate_containers(requests) {
                Ok(failures) => {
                    for failure in failures {
                        error!(guid = %failure.request.guid, reason = %failure.message, "task container allocation failed");
                        if let Some(task) = by_guid.get(&failure.request.guid) {
                            failed.tasks.push((*task).clone());
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "task container allocation request failed");
                    failed.tasks = work.tasks.clone();
                }
            }
        }

        Ok(failed)
    }

    fn lrp_requests<'a>(&self, lrps: &'a [Lrp]) -> (Vec<AllocationRequest>, HashMap<String, &'a Lrp>, Vec<Lrp>) {
        let mut requests = Vec::with_capacity(lrps.len());
        let mut by_guid = HashMap::with_capacity(lrps.len());
        let mut untranslated = Vec::new();

        for lrp in lrps {
            if !lrp.resource.valid() {
                warn!(lrp = %lrp.key.process_guid, resource = ?lrp.resource, "invalid resource");
                untranslated.push(lrp.clone());
                continue;
            }

            let instance_guid = (self.generate_instance_guid)();

            let root_fs_path = match self
                .settings
                .stack_path_map
                .path_for_root_fs(&lrp.placement_constraint.root_fs)
            {
                Ok(path) => path,
                Err(e) => {
                    warn!(lrp = %lrp.key.process_guid, error = %e, "cannot resolve rootfs");
                    untranslated.push(lrp.clone());
                    continue;
                }
            };

            let tags = Tags::from([
                (DOMAIN_TAG.to_string(), lrp.key.domain.clone()),
                (PROCESS_GUID_TAG.to_string(), lrp.key.process_guid.clone()),
                (PROCESS_INDEX_TAG.to_string(), lrp.key.index.to_string()),
                (LIFECYCLE_TAG.to_string(), LRP_LIFECYCLE.to_string()),
                (INSTANCE_GUID_TAG.to_string(), instance_guid.clone()),
            ]);

            let container_guid = lrp_container_guid(&lrp.key.process_guid, &instance_guid);
            by_guid.insert(container_guid.clone(), lrp);
            requests.push(AllocationRequest::new(
                container_guid,
                ContainerResource::new(lrp.resource.memory_mb, lrp.resource.disk_mb, root_fs_path),
                tags,
            ));
        }

        (requests, by_guid, untranslated)
    }

    fn task_requests<'a>(&self, tasks: &'a [Task]) -> (Vec<AllocationRequest>, HashMap<String, &'a Task>, Vec<Task>) {
        let mut requests = Vec::with_capacity(tasks.len());
        let mut by_guid = HashMap::with_capacity(tasks.len());
        let mut untranslated = Vec::new();

        for task in tasks {
            by_guid.insert(task.task_guid.clone(), task);

            if !task.resource.valid() {
                warn!(task = %task.task_guid, resource = ?task.resource, "invalid resource");
                untranslated.push(task.clone());
                continue;
            }

            let root_fs_path = match self
                .settings
                .stack_path_map
                .path_for_root_fs(&task.placement_constraint.root_fs)
            {
                Ok(path) => path,
                Err(e) => {
                    warn!(task = %task.task_guid, error = %e, "cannot resolve rootfs");
                    untranslated.push(task.clone());
                    continue;
                }
            };

            let tags = Tags::from([
                (LIFECYCLE_TAG.to_string(), TASK_LIFECYCLE.to_string()),
                (DOMAIN_TAG.to_string(), task.domain.clone()),
            ]);

            requests.push(AllocationRequest::new(
                task.task_guid.clone(),
                ContainerResource::new(task.resource.memory_mb, task.resource.disk_mb, root_fs_path),
                tags,
            ));
        }

        (requests, by_guid, untranslated)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    use cellrep_models::{ActualLrpKey, Resources};

    use super::*;
    use crate::executor::{AllocationFailure, Container, ContainerState, SimExecutor};

    static GUIDS: AtomicUsize = AtomicUsize::new(0);

    fn sequential_guid() -> String {
        format!("ig-{}", GUIDS.fetch_add(1, Ordering::SeqCst))
    }

    fn settings() -> CellSettings {
        CellSettings {
            cell_id: "cell-1".to_string(),
            zone: "z1".to_string(),
            stack_path_map: StackPathMap(BTreeMap::from([(
                "cflinuxfs2".to_string(),
                "/var/vcap/packages/cflinuxfs2/rootfs".to_string(),
            )])),
            arbitrary_root_fs_schemes: vec!["docker".to_string()],
            placement_tags: vec!["gpu".to_string()],
            optional_placement_tags: vec![],
        }
    }

    fn rep(executor: Arc<SimExecutor>) -> AuctionCellRep {
        AuctionCellRep::new(settings(), executor, EvacuationFlag::default()).with_instance_guids(sequential_guid)
    }

    fn lrp(guid: &str, root_fs: &str, memory_mb: i32) -> Lrp {
        Lrp::new(
            ActualLrpKey::new(guid, 0, "domain"),
            Resource::new(memory_mb, 10, 0),
            PlacementConstraint::new(root_fs, vec![], vec![]),
        )
    }

    fn task(guid: &str, root_fs: &str) -> Task {
        Task::new(guid, "domain", Resource::new(10, 10, 0), PlacementConstraint::new(root_fs, vec![], vec![]))
    }

    #[test]
    fn unhealthy_cell_has_no_state() {
        let executor = Arc::new(SimExecutor::new(Resources::new(100, 100, 10), vec![]));
        executor.set_healthy(false);
        let err = rep(executor).state().unwrap_err();
        assert_eq!(err.to_string(), "internal cell healthcheck failed");
    }

    #[test]
    fn state_rebuilds_work_from_tags() {
        let executor = Arc::new(SimExecutor::new(Resources::new(1000, 1000, 10), vec!["nfs".to_string()]));
        let rep = rep(executor.clone());

        let failed = rep
            .perform(Work {
                lrps: vec![lrp("pg-1", "preloaded:cflinuxfs2", 100)],
                tasks: vec![task("tg-1", "docker:///busybox")],
            })
            .unwrap();
        assert!(failed.is_empty());

        executor.insert_container(Container {
            guid: "untagged".to_string(),
            state: ContainerState::Running,
            resource: ContainerResource::new(5, 5, ""),
            tags: None,
        });
        executor.insert_container(Container {
            guid: "bad-index".to_string(),
            state: ContainerState::Created,
            resource: ContainerResource::new(5, 5, ""),
            tags: Some(Tags::from([
                (LIFECYCLE_TAG.to_string(), LRP_LIFECYCLE.to_string()),
                (PROCESS_INDEX_TAG.to_string(), "x".to_string()),
            ])),
        });

        let state = rep.state().unwrap();
        assert_eq!(state.lrps.len(), 1);
        assert_eq!(state.lrps[0].key.process_guid, "pg-1");
        assert_eq!(state.lrps[0].resource.memory_mb, 100);
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].task_guid, "tg-1");
        assert_eq!(state.tasks[0].domain, "domain");
        // Two reserved containers plus the created one with a bad index.
        assert_eq!(state.starting_container_count, 3);
        assert_eq!(state.zone, "z1");
        assert_eq!(state.volume_drivers, vec!["nfs".to_string()]);
        assert_eq!(state.placement_tags, vec!["gpu".to_string()]);
        assert_eq!(state.total_resources, Resources::new(1000, 1000, 10));
        assert!(state.match_root_fs("preloaded:cflinuxfs2"));
        assert!(state.match_root_fs("docker:///anything"));
        assert!(!state.evacuating);
    }

    #[test]
    fn allocated_lrps_are_tagged_with_instance_guid() {
        let executor = Arc::new(SimExecutor::new(Resources::new(1000, 1000, 10), vec![]));
        rep(executor.clone())
            .perform(Work {
                lrps: vec![lrp("pg-1", "preloaded:cflinuxfs2", 100)],
                tasks: vec![],
            })
            .unwrap();

        let containers = executor.list_containers().unwrap();
        let container = &containers[0];
        let tags = container.tags.as_ref().unwrap();
        assert_eq!(container.guid, lrp_container_guid("pg-1", &tags[INSTANCE_GUID_TAG]));
        assert_eq!(tags[PROCESS_GUID_TAG], "pg-1");
        assert_eq!(tags[PROCESS_INDEX_TAG], "0");
        assert_eq!(container.resource.root_fs_path, "/var/vcap/packages/cflinuxfs2/rootfs");
    }

    #[test]
    fn untranslatable_and_refused_work_is_returned() {
        let executor = Arc::new(SimExecutor::new(Resources::new(150, 1000, 10), vec![]));
        let rep = rep(executor);

        let failed = rep
            .perform(Work {
                lrps: vec![
                    lrp("fits", "preloaded:cflinuxfs2", 100),
                    lrp("unknown-stack", "preloaded:windows", 10),
                    lrp("too-big", "preloaded:cflinuxfs2", 100),
                ],
                tasks: vec![task("bad-url", "::"), task("ok", "")],
            })
            .unwrap();

        let lrp_guids: Vec<_> = failed.lrps.iter().map(|l| l.key.process_guid.as_str()).collect();
        assert_eq!(lrp_guids, vec!["unknown-stack", "too-big"]);
        let task_guids: Vec<_> = failed.tasks.iter().map(|t| t.task_guid.as_str()).collect();
        assert_eq!(task_guids, vec!["bad-url"]);
    }

    #[test]
    fn negative_resources_are_returned_and_leave_capacity_alone() {
        let executor = Arc::new(SimExecutor::new(Resources::new(1000, 1000, 10), vec![]));
        let rep = rep(executor.clone());

        let mut negative = lrp("negative", "preloaded:cflinuxfs2", -500);
        negative.resource.disk_mb = -500;
        let mut min = task("min", "");
        min.resource.memory_mb = i32::MIN;

        let failed = rep
            .perform(Work {
                lrps: vec![negative.clone()],
                tasks: vec![min.clone()],
            })
            .unwrap();
        assert_eq!(failed.lrps, vec![negative]);
        assert_eq!(failed.tasks, vec![min]);
        assert!(executor.list_containers().unwrap().is_empty());

        let state = rep.state().unwrap();
        assert_eq!(state.available_resources, state.total_resources);
        assert_eq!(state.available_resources, Resources::new(1000, 1000, 10));
    }

    #[test]
    fn evacuating_cell_rejects_everything() {
        let executor = Arc::new(SimExecutor::new(Resources::new(1000, 1000, 10), vec![]));
        let rep = rep(executor.clone());
        rep.evacuation().set_evacuating();

        let work = Work {
            lrps: vec![lrp("pg-1", "preloaded:cflinuxfs2", 1)],
            tasks: vec![task("tg-1", "")],
        };
        assert_eq!(rep.perform(work.clone()).unwrap(), work);
        assert!(executor.list_containers().unwrap().is_empty());
        assert!(rep.state().unwrap().evacuating);
    }

    struct BrokenExecutor;

    impl Executor for BrokenExecutor {
        fn healthy(&self) -> bool {
            true
        }
        fn list_containers(&self) -> RepResult<Vec<Container>> {
            Err(RepError::Executor("down".to_string()))
        }
        fn total_resources(&self) -> RepResult<Resources> {
            Ok(Resources::default())
        }
        fn remaining_resources(&self) -> RepResult<Resources> {
            Ok(Resources::default())
        }
        fn volume_drivers(&self) -> RepResult<Vec<String>> {
            Ok(vec![])
        }
        fn allocate_containers(&self, _: Vec<AllocationRequest>) -> RepResult<Vec<AllocationFailure>> {
            Err(RepError::Executor("down".to_string()))
        }
        fn stop_container(&self, _: &str) -> RepResult<()> {
            Ok(())
        }
        fn delete_container(&self, _: &str) -> RepResult<()> {
            Ok(())
        }
        fn reset(&self) -> RepResult<()> {
            Ok(())
        }
    }

    #[test]
    fn executor_errors_fail_whole_batches() {
        let rep = AuctionCellRep::new(settings(), Arc::new(BrokenExecutor), EvacuationFlag::default());

        let work = Work {
            lrps: vec![lrp("pg-1", "preloaded:cflinuxfs2", 1), lrp("pg-2", "preloaded:nope", 1)],
            tasks: vec![task("tg-1", "")],
        };
        assert_eq!(rep.perform(work.clone()).unwrap(), work);
        assert!(matches!(rep.state(), Err(RepError::Executor(_))));
    }
}
