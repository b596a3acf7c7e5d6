//! RunMaster: a personal running log served over MCP.
//!
//! Runs come from Strava (via OAuth), from GPX files, or are typed in by
//! hand. Strava activities are normalized from whatever unit shape the API
//! returned into kilometers and minutes, and every run gets a `M:SS` pace.
//! The log is held in memory for the lifetime of one session.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod gpx_import;
pub mod models;
pub mod normalize;
pub mod oauth;
pub mod server;
pub mod session;
pub mod strava;
