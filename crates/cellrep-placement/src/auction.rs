//! A single auction round over cell snapshots.
//!
//! The round owns one `CellState` per cell, fetched at the start of the
//! round. Each placement filters the cells by constraints and capacity,
//! picks the lowest bid score, and debits the winner's snapshot so the
//! next placement in the same round sees it. Nothing is shared between
//! rounds: parallel rounds each hold their own snapshots.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use cellrep_models::{Lrp, Task, Work, WorkItem};

use crate::cell_state::CellState;
use crate::error::{PlacementError, PlacementResult};

/// Where a work item landed and the score it won with.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub cell_id: String,
    pub score: f64,
}

/// Per-round arena of cell snapshots and the work assigned to each.
#[derive(Debug, Clone)]
pub struct AuctionRound {
    cells: BTreeMap<String, CellState>,
    assigned: BTreeMap<String, Work>,
    starting_container_weight: f64,
}

impl AuctionRound {
    /// Start a round from freshly fetched snapshots keyed by cell id.
    pub fn new(cells: BTreeMap<String, CellState>, starting_container_weight: f64) -> Self {
        Self {
            cells,
            assigned: BTreeMap::new(),
            starting_container_weight,
        }
    }

    pub fn cell(&self, cell_id: &str) -> Option<&CellState> {
        self.cells.get(cell_id)
    }

    /// Place an LRP on the best-fitting cell and record it there.
    pub fn place_lrp(&mut self, lrp: &Lrp) -> PlacementResult<Placement> {
        let placement = self.select(lrp)?;
        if let Some(cell) = self.cells.get_mut(&placement.cell_id) {
            cell.add_lrp(lrp);
        }
        self.assigned
            .entry(placement.cell_id.clone())
            .or_default()
            .lrps
            .push(lrp.clone());
        Ok(placement)
    }

    /// Place a task on the best-fitting cell and record it there.
    pub fn place_task(&mut self, task: &Task) -> PlacementResult<Placement> {
        let placement = self.select(task)?;
        if let Some(cell) = self.cells.get_mut(&placement.cell_id) {
            cell.add_task(task);
        }
        self.assigned
            .entry(placement.cell_id.clone())
            .or_default()
            .tasks
            .push(task.clone());
        Ok(placement)
    }

    /// Work to send to each cell's `perform` endpoint.
    pub fn into_work(self) -> BTreeMap<String, Work> {
        self.assigned
    }

    fn select<W: WorkItem>(&self, item: &W) -> PlacementResult<Placement> {
        let constraint = item.placement_constraint();
        let resource = item.resource();

        let mut first_rejection: Option<PlacementError> = None;
        let mut best: Option<Placement> = None;

        for (cell_id, cell) in &self.cells {
            if cell.evacuating {
                continue;
            }

            let verdict = if !cell.match_root_fs(&constraint.root_fs) {
                Err(PlacementError::IncompatibleRootFs)
            } else if !cell.match_volume_drivers(&constraint.volume_drivers) {
                Err(PlacementError::VolumeDriverMismatch)
            } else if !cell.match_placement_tags(&constraint.placement_tags) {
                Err(PlacementError::PlacementTagMismatch)
            } else {
                cell.resource_match(resource).map_err(PlacementError::from)
            };

            if let Err(e) = verdict {
                debug!(cell = %cell_id, item = %item.identifier(), reason = %e, "cell rejected");
                first_rejection.get_or_insert(e);
                continue;
            }

            let score = cell.compute_score(resource, self.starting_container_weight);
            if !score.is_finite() {
                debug!(cell = %cell_id, "cell reports no total capacity");
                continue;
            }

            if best.as_ref().is_none_or(|b| score < b.score) {
                best = Some(Placement {
                    cell_id: cell_id.clone(),
                    score,
                });
            }
        }

        match best {
            Some(placement) => {
                info!(
                    item = %item.identifier(),
                    cell = %placement.cell_id,
                    score = placement.score,
                    "placed work"
                );
                Ok(placement)
            }
            None => {
                let err = first_rejection.unwrap_or(PlacementError::NoCellsAvailable);
                warn!(item = %item.identifier(), error = %err, "could not place work");
                Err(err)
            }
        }
    }
}
