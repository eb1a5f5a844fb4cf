//! iEndorse endorsement period tracker
//!
//! Maintains, per (user, endorsed entity) pair, a history of disjoint time
//! periods during which the user endorsed that entity, annotated with rank
//! positions over time, and derives cumulative totals: days endorsed, days
//! in the top 5, days in the top 10.
//!
//! ## Services
//!
//! - **Tracker**: period lifecycle (start/end/position) and cumulative reads
//! - **Admin**: backdating, historical period inserts, corrective edits,
//!   referral bonus days, account purge
//! - **Storage**: MongoDB-backed histories keyed by `userId_entityType_entityId`,
//!   with an in-memory store for dev mode and tests

pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod tracker;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use tracker::{CumulativeTotals, EndorsementTracker};
pub use types::{Result, TrackerError};
