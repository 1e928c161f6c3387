//! cellrep-placement: deciding whether, and how well, work fits a cell.
//!
//! This crate holds the pure placement logic shared by both ends of the
//! auction protocol. A cell uses it to validate incoming work; an
//! auctioneer uses it to filter and rank the `CellState` snapshots it
//! fetched from many cells.
//!
//! # Components
//!
//! - **`matcher`**: Rootfs, volume-driver, and placement-tag predicates
//! - **`cell_state`**: The per-round cell snapshot and its bid score
//! - **`auction`**: One auction round over a set of owned snapshots

pub mod auction;
pub mod cell_state;
pub mod error;
pub mod matcher;

pub use auction::{AuctionRound, Placement};
pub use cell_state::{CellState, InsufficientResourcesError};
pub use error::{PlacementError, PlacementResult};
pub use matcher::{match_placement_tags, match_root_fs, match_volume_drivers};
