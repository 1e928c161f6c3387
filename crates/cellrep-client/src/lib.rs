//! cellrep-client: the auctioneer's view of a cell.
//!
//! An auctioneer builds one [`ClientFactory`] at startup and asks it for a
//! [`CellClient`] per cell per round. Creating a client does no network
//! I/O; each client call is exactly one HTTP request with one timeout and
//! no retries.
//!
//! # Connection selection
//!
//! Cells announce a bare address and, optionally, a `rep_url` that may be
//! `https`. [`TlsConfig::pick_url`] decides which one to use given whether
//! TLS is required and whether client certificates are configured.

pub mod client;
pub mod error;
pub mod routes;
pub mod tls;

pub use client::{CellClient, ClientFactory};
pub use error::{ClientError, ClientResult};
pub use routes::{INSECURE_ROUTES, Route, RouteMethod, SECURE_ROUTES};
pub use tls::TlsConfig;
