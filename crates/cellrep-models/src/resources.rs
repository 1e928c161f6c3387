//! Resource ledger: demand descriptors, capacity, and utilization scoring.

use serde::{Deserialize, Serialize};

/// Resources a single work item asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i32,
    #[serde(rename = "DiskMB")]
    pub disk_mb: i32,
    #[serde(rename = "MaxPids")]
    pub max_pids: i32,
}

impl Resource {
    pub fn new(memory_mb: i32, disk_mb: i32, max_pids: i32) -> Self {
        Self {
            memory_mb,
            disk_mb,
            max_pids,
        }
    }

    /// A demand is valid when neither memory nor disk is negative.
    pub fn valid(&self) -> bool {
        self.disk_mb >= 0 && self.memory_mb >= 0
    }
}

/// Capacity of a cell, either total or currently available.
///
/// `Copy` gives every holder an independent value; there is no shared
/// ownership of a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i32,
    #[serde(rename = "DiskMB")]
    pub disk_mb: i32,
    #[serde(rename = "Containers")]
    pub containers: i32,
}

impl Resources {
    pub fn new(memory_mb: i32, disk_mb: i32, containers: i32) -> Self {
        Self {
            memory_mb,
            disk_mb,
            containers,
        }
    }

    /// Debit one placement. Always consumes exactly one container slot and
    /// never clamps, so the ledger may go negative during in-round
    /// simulation. `max_pids` is not tracked.
    pub fn subtract(&mut self, res: &Resource) {
        self.memory_mb -= res.memory_mb;
        self.disk_mb -= res.disk_mb;
        self.containers -= 1;
    }

    /// Mean utilization across memory, disk, and containers.
    ///
    /// `0.0` means idle on every axis, `1.0` means saturated on every axis.
    /// A `total` with any non-positive axis has no meaningful utilization
    /// and scores `f64::INFINITY`, which loses every minimum-score ranking.
    pub fn compute_score(&self, total: &Resources) -> f64 {
        if total.memory_mb <= 0 || total.disk_mb <= 0 || total.containers <= 0 {
            return f64::INFINITY;
        }

        let used_memory = 1.0 - f64::from(self.memory_mb) / f64::from(total.memory_mb);
        let used_disk = 1.0 - f64::from(self.disk_mb) / f64::from(total.disk_mb);
        let used_containers = 1.0 - f64::from(self.containers) / f64::from(total.containers);
        (used_memory + used_disk + used_containers) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_debits_one_container_regardless_of_size() {
        let mut r = Resources::new(1000, 2000, 10);
        r.subtract(&Resource::new(100, 200, 50));
        assert_eq!(r, Resources::new(900, 1800, 9));

        r.subtract(&Resource::new(0, 0, 0));
        assert_eq!(r.containers, 8);
    }

    #[test]
    fn subtract_may_go_negative() {
        let mut r = Resources::new(10, 10, 0);
        r.subtract(&Resource::new(50, 60, 0));
        assert_eq!(r, Resources::new(-40, -50, -1));
    }

    #[test]
    fn copies_are_independent() {
        let original = Resources::new(100, 100, 2);
        let mut copy = original;
        copy.subtract(&Resource::new(10, 10, 0));
        assert_eq!(original, Resources::new(100, 100, 2));
        assert_eq!(copy, Resources::new(90, 90, 1));
    }

    #[test]
    fn score_is_zero_when_idle_and_one_when_full() {
        let total = Resources::new(1000, 2000, 10);
        assert_eq!(total.compute_score(&total), 0.0);
        assert_eq!(Resources::new(0, 0, 0).compute_score(&total), 1.0);
    }

    #[test]
    fn score_is_mean_of_axes() {
        let total = Resources::new(1000, 2000, 10);
        let available = Resources::new(500, 2000, 10);
        let score = available.compute_score(&total);
        assert!((score - 0.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_total_scores_infinity() {
        let available = Resources::new(0, 0, 0);
        assert_eq!(available.compute_score(&Resources::new(0, 100, 1)), f64::INFINITY);
        assert_eq!(available.compute_score(&Resources::new(100, 0, 1)), f64::INFINITY);
        assert_eq!(available.compute_score(&Resources::new(100, 100, 0)), f64::INFINITY);
    }

    #[test]
    fn resource_validity() {
        assert!(Resource::new(0, 0, 0).valid());
        assert!(!Resource::new(-1, 0, 0).valid());
        assert!(!Resource::new(0, -1, 0).valid());
    }

    #[test]
    fn json_uses_go_field_names() {
        let json = serde_json::to_value(Resources::new(1, 2, 3)).unwrap();
        assert_eq!(json, serde_json::json!({"MemoryMB": 1, "DiskMB": 2, "Containers": 3}));
    }
}
